use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Account used to submit messages.
///
/// Borrowed by the dispatch engine for the whole run. The IMAP replicator
/// logs in with the same username and password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredentials {
    pub host: String,
    pub port: u16,
    /// Connect with TLS from the first byte (usually port 465). When `false`
    /// the client connects in plain text and upgrades with STARTTLS if the
    /// server offers it.
    #[serde(default, alias = "secure")]
    pub use_implicit_tls: bool,
    pub username: String,
    pub password: String,
    #[serde(alias = "sender_name")]
    pub sender_display_name: String,
    #[serde(alias = "sender_email")]
    pub sender_address: String,
    #[serde(default, alias = "reply_to_email")]
    pub reply_to_address: String,
    /// Skip certificate validation. Only meant for local test servers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ServerCredentials {
    /// `host:port` for socket connects.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Formatted `From` value, e.g. `"Papillon" <news@example.com>`.
    #[must_use]
    pub fn from_header(&self) -> String {
        if self.sender_display_name.is_empty() {
            format!("<{}>", self.sender_address)
        } else {
            let name = self.sender_display_name.replace('"', "'");
            format!("\"{name}\" <{}>", self.sender_address)
        }
    }

    /// Domain part of the sender address, used for EHLO and Message-IDs.
    #[must_use]
    pub fn sender_domain(&self) -> &str {
        self.sender_address
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first required field that
    /// is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing { field: "host" });
        }
        if self.sender_address.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "sender_address",
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_implicit_tls", &self.use_implicit_tls)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender_display_name", &self.sender_display_name)
            .field("sender_address", &self.sender_address)
            .field("reply_to_address", &self.reply_to_address)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}
