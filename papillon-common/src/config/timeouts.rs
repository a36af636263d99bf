//! Socket timeouts for the outbound SMTP and IMAP clients.
//!
//! Every network step a client performs is wrapped in one of these bounds.
//! A step that runs past its bound fails the current message only.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketTimeouts {
    /// Timeout for TCP connect plus TLS handshake.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for a single command / response exchange.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    /// Timeout for transferring message content (SMTP DATA, IMAP APPEND).
    ///
    /// Default: 120 seconds
    #[serde(default = "default_data_secs")]
    pub data_secs: u64,
}

impl Default for SocketTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            command_secs: default_command_secs(),
            data_secs: default_data_secs(),
        }
    }
}

const fn default_connect_secs() -> u64 {
    30
}

const fn default_command_secs() -> u64 {
    30
}

const fn default_data_secs() -> u64 {
    120
}

impl SocketTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}
