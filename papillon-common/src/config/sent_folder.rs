use serde::{Deserialize, Serialize};

/// Whether and where to mirror each sent message over IMAP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentFolderSettings {
    #[serde(default, alias = "save_to_sent")]
    pub enabled: bool,

    /// Mailbox label to look for before falling back to provider conventions.
    #[serde(default = "default_label")]
    pub label: String,

    /// IMAP host. Defaults to the SMTP host when absent.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_implicit_tls")]
    pub use_implicit_tls: bool,
}

impl Default for SentFolderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            label: default_label(),
            host: None,
            port: default_port(),
            use_implicit_tls: default_implicit_tls(),
        }
    }
}

fn default_label() -> String {
    "Sent".to_string()
}

const fn default_port() -> u16 {
    993
}

const fn default_implicit_tls() -> bool {
    true
}

impl SentFolderSettings {
    /// IMAP host to use, falling back to `smtp_host`.
    #[must_use]
    pub fn host_or<'a>(&'a self, smtp_host: &'a str) -> &'a str {
        self.host.as_deref().unwrap_or(smtp_host)
    }
}
