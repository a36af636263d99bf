//! Filing delivered messages in the account's sent mailbox.

use async_trait::async_trait;
use papillon_common::config::{SentFolderSettings, ServerCredentials, SocketTimeouts};
use papillon_imap::ImapClient;

use crate::{
    error::ReplicationError,
    mailbox::{MailboxTree, Resolution, resolve},
};

/// Where a message copy was filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTo {
    pub mailbox: String,
}

/// Stores a copy of a submitted message for the sending account.
#[async_trait]
pub trait SentFolder: Send + Sync {
    /// # Errors
    ///
    /// [`ReplicationError::NotFound`] when no sent mailbox could be located;
    /// any other variant when filing the copy failed.
    async fn save_to_sent(
        &self,
        credentials: &ServerCredentials,
        raw: &[u8],
    ) -> Result<SavedTo, ReplicationError>;
}

/// IMAP-backed sent folder.
///
/// Each save lists the account's mailboxes on one connection, resolves the
/// sent mailbox, and appends on a second connection. Both sessions are
/// logged out whether or not their work succeeded.
#[derive(Debug, Clone)]
pub struct ImapSentFolder {
    settings: SentFolderSettings,
    timeouts: SocketTimeouts,
}

impl ImapSentFolder {
    #[must_use]
    pub const fn new(settings: SentFolderSettings, timeouts: SocketTimeouts) -> Self {
        Self { settings, timeouts }
    }

    async fn open(&self, credentials: &ServerCredentials) -> Result<ImapClient, ReplicationError> {
        let host = self.settings.host_or(&credentials.host);
        let mut client = ImapClient::connect(
            host,
            self.settings.port,
            self.settings.use_implicit_tls,
            credentials.accept_invalid_certs,
            self.timeouts.clone(),
        )
        .await?;

        client.read_greeting().await?;
        client
            .login(&credentials.username, &credentials.password)
            .await?;
        Ok(client)
    }

    /// Lists the account's mailboxes and resolves the configured label.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing session fails.
    #[tracing::instrument(name = "imap_discover", skip_all, fields(label = %self.settings.label))]
    pub async fn discover(
        &self,
        credentials: &ServerCredentials,
    ) -> Result<Resolution, ReplicationError> {
        let mut client = self.open(credentials).await?;
        let listing = client.list().await;
        logout(&mut client).await;

        let tree = MailboxTree::from_listing(&listing?);
        Ok(resolve(&self.settings.label, &tree))
    }

    /// Appends `raw` to `mailbox`, marked `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected or the append is
    /// refused.
    #[tracing::instrument(name = "imap_replicate", skip_all, fields(%mailbox))]
    pub async fn replicate(
        &self,
        credentials: &ServerCredentials,
        mailbox: &str,
        raw: &[u8],
    ) -> Result<(), ReplicationError> {
        let mut client = self.open(credentials).await?;

        let appended = async {
            client.select(mailbox).await?;
            client.append(mailbox, &["\\Seen"], raw).await
        }
        .await;
        logout(&mut client).await;

        appended?;
        tracing::debug!(bytes = raw.len(), "Message filed");
        Ok(())
    }
}

async fn logout(client: &mut ImapClient) {
    if let Err(err) = client.logout().await {
        tracing::debug!(%err, "IMAP logout failed");
    }
}

#[async_trait]
impl SentFolder for ImapSentFolder {
    async fn save_to_sent(
        &self,
        credentials: &ServerCredentials,
        raw: &[u8],
    ) -> Result<SavedTo, ReplicationError> {
        let Resolution::Resolved(mailbox) = self.discover(credentials).await? else {
            return Err(ReplicationError::NotFound {
                label: self.settings.label.clone(),
            });
        };

        self.replicate(credentials, &mailbox, raw).await?;
        Ok(SavedTo { mailbox })
    }
}
