//! Error types for the IMAP client.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server answered `NO`.
    #[error("{command} refused: {message}")]
    No { command: String, message: String },

    /// The server answered `BAD`.
    #[error("{command} rejected as malformed: {message}")]
    Bad { command: String, message: String },

    /// The server sent `BYE` and is closing the connection.
    #[error("Server closed the session: {0}")]
    Bye(String),

    #[error("Failed to parse IMAP response: {0}")]
    Parse(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, ImapError>;
