//! Configuration types for a dispatch run.
//!
//! Everything here is owned by the caller and re-supplied for each run:
//!
//! - [`credentials`]: the mail-server account used for sending
//! - [`rate_limit`]: the sender-side throughput policy
//! - [`timeouts`]: socket timeouts shared by the SMTP and IMAP clients
//! - [`sent_folder`]: whether and where to mirror sent messages

pub mod credentials;
pub mod rate_limit;
pub mod sent_folder;
pub mod timeouts;

pub use credentials::ServerCredentials;
pub use rate_limit::RateLimitPolicy;
pub use sent_folder::SentFolderSettings;
pub use timeouts::SocketTimeouts;

use thiserror::Error;

/// A configuration value that cannot be used for a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("{field} must not be empty")]
    Missing { field: &'static str },
}
