use serde::{Deserialize, Serialize};

/// A single, fully personalised message destined for one recipient.
///
/// Produced one-per-recipient by a feed; the dispatch engine never mutates
/// it. `body` is HTML markup. When `text` is `None` the SMTP layer derives a
/// plain-text alternative from the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            text: None,
            reply_to: None,
            cc: None,
            bcc: None,
        }
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    #[must_use]
    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    #[must_use]
    pub fn with_bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc = Some(bcc.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Every envelope recipient of this message: the primary recipient
    /// followed by Cc and Bcc, in that order.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.recipient.as_str())
            .chain(self.cc.as_deref())
            .chain(self.bcc.as_deref())
            .filter(|address| !address.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_recipients_order() {
        let message = OutboundMessage::new("to@example.com", "Hi", "<p>Hi</p>")
            .with_cc("cc@example.com")
            .with_bcc("bcc@example.com");

        let recipients: Vec<_> = message.envelope_recipients().collect();
        assert_eq!(
            recipients,
            vec!["to@example.com", "cc@example.com", "bcc@example.com"]
        );
    }

    #[test]
    fn test_envelope_recipients_skips_blank() {
        let message = OutboundMessage::new("to@example.com", "Hi", "").with_cc("  ");
        assert_eq!(message.envelope_recipients().count(), 1);
    }
}
