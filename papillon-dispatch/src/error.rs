//! Typed errors for a dispatch run.
//!
//! Failures fall into three groups:
//! - per-recipient transmission failures, recorded and skipped past
//! - replication failures, reported as a warning on a delivered recipient
//! - fatal failures, which stop the run

use papillon_imap::ImapError;
use papillon_smtp::ClientError;
use thiserror::Error;

/// Why a single message could not be submitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransmissionError {
    /// Permanent refusal (5xx) of the sender, a recipient or the content.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Transient refusal (4xx).
    #[error("Temporarily refused: {0}")]
    Temporary(String),

    /// The server refused the account credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server spoke something other than SMTP.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransmissionError {
    /// Whether this failure would repeat for every remaining recipient.
    ///
    /// Only refused credentials qualify. Timeouts and connection problems are
    /// charged to the message that hit them.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<ClientError> for TransmissionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AuthenticationFailed { code, message } => {
                Self::Authentication(format!("{code} {message}"))
            }
            ClientError::SmtpError { code, message } if (400..500).contains(&code) => {
                Self::Temporary(format!("{code} {message}"))
            }
            ClientError::SmtpError { code, message } => Self::Rejected(format!("{code} {message}")),
            ClientError::Timeout(step) => Self::Timeout(step),
            ClientError::Io(err) => Self::Connection(err.to_string()),
            ClientError::TlsError(err) => Self::Connection(format!("TLS: {err}")),
            ClientError::ConnectionClosed => {
                Self::Connection("connection closed unexpectedly".to_string())
            }
            ClientError::ParseError(err) => Self::Protocol(err),
        }
    }
}

/// Why a delivered message could not be filed in the sent mailbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplicationError {
    /// No mailbox matched the label or any known fallback.
    #[error("No sent mailbox matching '{label}'")]
    NotFound { label: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server answered `NO` or `BAD`.
    #[error("Refused: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<ImapError> for ReplicationError {
    fn from(err: ImapError) -> Self {
        match err {
            ImapError::Io(err) => Self::Connection(err.to_string()),
            ImapError::Tls(err) => Self::Connection(format!("TLS: {err}")),
            ImapError::ConnectionClosed => {
                Self::Connection("connection closed unexpectedly".to_string())
            }
            ImapError::Timeout(step) => Self::Timeout(step),
            err @ (ImapError::No { .. } | ImapError::Bad { .. } | ImapError::Bye(_)) => {
                Self::Rejected(err.to_string())
            }
            ImapError::Parse(err) => Self::Protocol(err),
        }
    }
}

/// The recipient feed could not produce the next message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// A contact row has no usable `email` field.
    #[error("Contact {index} has no email address")]
    MissingEmail { index: usize },

    /// An address field would break out of its SMTP command or header line.
    #[error("Contact {index} has an invalid {field} address: {value:?}")]
    InvalidAddress {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("{0}")]
    Other(String),
}

/// A failure that stopped the run before the feed was exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalDispatchError {
    #[error("Recipient feed failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Transmission cannot continue: {0}")]
    Transmission(TransmissionError),
}
