//! Shared building blocks for the papillon bulk mailer.
//!
//! - [`message`]: the per-recipient message handed to the dispatch engine
//! - [`config`]: credentials, rate limiting, timeouts and sent-folder settings
//! - [`net`]: plain / TLS stream used by both protocol clients
//! - [`logging`]: subscriber setup shared by the binary and tests

pub mod config;
pub mod logging;
pub mod message;
pub mod net;

pub use message::OutboundMessage;
pub use tracing;
