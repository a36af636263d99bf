//! SMTP submission client.
//!
//! This crate provides the pieces papillon needs to hand one message to a
//! submission server:
//!
//! - Plain TCP, implicit TLS and STARTTLS connections
//! - `AUTH PLAIN` / `AUTH LOGIN`
//! - Envelope commands, DATA with dot-stuffing, QUIT
//! - A MIME builder producing `multipart/alternative` HTML + text messages
//!
//! # Example
//!
//! ```no_run
//! use papillon_common::config::SocketTimeouts;
//! use papillon_smtp::SmtpClient;
//!
//! # async fn example() -> Result<(), papillon_smtp::ClientError> {
//! let mut client =
//!     SmtpClient::connect("smtp.example.com", 587, false, false, SocketTimeouts::default()).await?;
//! client.read_greeting().await?.ensure_success()?;
//! client.ehlo("example.com").await?.ensure_success()?;
//! client.authenticate("user", "secret").await?;
//! client.mail_from("news@example.com").await?.ensure_success()?;
//! client.rcpt_to("reader@example.org").await?.ensure_success()?;
//! client.data().await?;
//! client.send_data(b"Subject: Hi\r\n\r\nHello").await?.ensure_success()?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod message;
mod response;

pub use client::{SmtpClient, dot_stuff};
pub use error::{ClientError, Result};
pub use message::{MessageBuilder, encode_header_word, html_to_text};
pub use response::{Response, ResponseLine};
