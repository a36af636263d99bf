use std::collections::BTreeSet;

use papillon_common::{
    OutboundMessage,
    config::{ConfigError, RateLimitPolicy, SentFolderSettings, ServerCredentials, SocketTimeouts},
};
use papillon_dispatch::{
    CancelSignal, Contact, DispatchReport, Dispatcher, FeedError, ImapSentFolder,
    PersonalizedFeed, ProgressEvent, RecipientFeed, SmtpTransmitter, Template,
    feed::missing_variables,
};
use serde::Deserialize;

/// Everything needed for one dispatch run.
///
/// ```ron
/// (
///     server: (
///         host: "smtp.example.com",
///         port: 587,
///         username: "news@example.com",
///         password: "secret",
///         sender_display_name: "Example News",
///         sender_address: "news@example.com",
///     ),
///     rate_limit: (max_per_minute: 20),
///     sent_folder: (enabled: true),
///     template: (
///         subject: "Hello {{name}}",
///         body: "Hi {{ name }},\nthanks for subscribing.",
///     ),
///     contacts: [
///         {"email": "ada@example.org", "name": "Ada"},
///     ],
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Campaign {
    #[serde(alias = "smtp")]
    pub server: ServerCredentials,

    #[serde(default, alias = "rate_limiting")]
    pub rate_limit: RateLimitPolicy,

    #[serde(default)]
    pub timeouts: SocketTimeouts,

    #[serde(default)]
    pub sent_folder: SentFolderSettings,

    pub template: Template,

    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl Campaign {
    /// # Errors
    ///
    /// Returns the first problem found in the server or rate limit settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.rate_limit.validate()
    }

    /// Every column name used by at least one contact.
    #[must_use]
    pub fn headers(&self) -> BTreeSet<&str> {
        self.contacts
            .iter()
            .flat_map(|contact| contact.keys().map(String::as_str))
            .collect()
    }

    /// Template variables that no contact column provides. These are sent
    /// verbatim.
    #[must_use]
    pub fn missing_variables(&self) -> Vec<String> {
        let headers: Vec<&str> = self.headers().into_iter().collect();
        missing_variables(
            &format!("{}\n{}", self.template.subject, self.template.body),
            &headers,
        )
    }

    #[must_use]
    pub fn feed(&self) -> PersonalizedFeed {
        PersonalizedFeed::new(self.template.clone(), self.contacts.clone())
    }

    /// Renders every message without sending anything.
    #[must_use]
    pub fn preview(&self) -> Vec<Result<OutboundMessage, FeedError>> {
        let mut feed = self.feed();
        std::iter::from_fn(|| feed.next_message()).collect()
    }

    /// Sends the campaign.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the settings are unusable; delivery
    /// problems are reported in the [`DispatchReport`].
    pub async fn run<P>(
        &self,
        cancel: CancelSignal,
        on_progress: P,
    ) -> Result<DispatchReport, ConfigError>
    where
        P: FnMut(ProgressEvent) + Send,
    {
        let dispatcher = Dispatcher::new(SmtpTransmitter::new(self.timeouts.clone()))
            .with_cancel_signal(cancel);

        let dispatcher = if self.sent_folder.enabled {
            tracing::info!(
                label = %self.sent_folder.label,
                host = %self.sent_folder.host_or(&self.server.host),
                "Copies will be filed in the sent mailbox"
            );
            dispatcher.with_sent_folder(ImapSentFolder::new(
                self.sent_folder.clone(),
                self.timeouts.clone(),
            ))
        } else {
            dispatcher
        };

        dispatcher
            .run(&self.server, &self.rate_limit, self.feed(), on_progress)
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const CAMPAIGN: &str = r#"(
        smtp: (
            host: "smtp.example.com",
            port: 465,
            secure: true,
            username: "news@example.com",
            password: "secret",
            sender_name: "Example News",
            sender_email: "news@example.com",
        ),
        rate_limiting: (max_per_minute: 20, delay_between_emails: 500),
        sent_folder: (save_to_sent: true),
        template: (
            subject: "Hello {{name}}",
            body: "Hi {{ name }} from {{ company }}",
            signature: Some("<i>News</i>"),
        ),
        contacts: [
            {"email": "ada@example.org", "name": "Ada"},
            {"email": "bob@example.org", "name": "Bob", "plan": "pro"},
        ],
    )"#;

    #[test]
    fn test_deserialize_campaign() {
        let campaign: Campaign = ron::from_str(CAMPAIGN).unwrap();

        assert!(campaign.server.use_implicit_tls);
        assert_eq!(campaign.rate_limit.max_per_minute, 20);
        assert_eq!(campaign.rate_limit.delay_between_messages_ms, 500);
        assert_eq!(campaign.rate_limit.max_per_hour, 500);
        assert!(campaign.sent_folder.enabled);
        assert_eq!(campaign.sent_folder.label, "Sent");
        assert_eq!(campaign.contacts.len(), 2);
        assert!(campaign.validate().is_ok());
    }

    #[test]
    fn test_missing_variables() {
        let campaign: Campaign = ron::from_str(CAMPAIGN).unwrap();

        assert_eq!(
            campaign.headers().into_iter().collect::<Vec<_>>(),
            vec!["email", "name", "plan"]
        );
        assert_eq!(campaign.missing_variables(), vec!["company".to_string()]);
    }

    #[test]
    fn test_preview() {
        let campaign: Campaign = ron::from_str(CAMPAIGN).unwrap();
        let messages = campaign.preview();

        assert_eq!(messages.len(), 2);
        let first = messages[0].as_ref().unwrap();
        assert_eq!(first.subject, "Hello Ada");
        assert!(first.body.starts_with("Hi Ada from {{ company }}"));
        assert!(first.body.ends_with("<i>News</i>"));
    }
}
