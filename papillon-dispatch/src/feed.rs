//! Recipient feeds and `{{field}}` personalisation.
//!
//! A feed yields one ready-to-send [`OutboundMessage`] per recipient, in send
//! order. [`PersonalizedFeed`] builds those messages from a [`Template`] and a
//! list of contact rows.

use std::{collections::BTreeMap, fmt, sync::LazyLock};

use papillon_common::OutboundMessage;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

#[allow(clippy::unwrap_used, reason = "pattern is a literal")]
static VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").unwrap());

const SIGNATURE_DIVIDER: &str = r#"<div class="signature-divider" style="margin-top: 20px; margin-bottom: 20px; border-top: 1px solid #eaeaea;"></div>"#;

/// Ordered source of messages for one dispatch run.
pub trait RecipientFeed: Send {
    /// Number of messages the feed will yield in total.
    fn total(&self) -> usize;

    /// The next message, `None` once exhausted. An `Err` is fatal to the run.
    fn next_message(&mut self) -> Option<Result<OutboundMessage, FeedError>>;
}

impl RecipientFeed for std::vec::IntoIter<OutboundMessage> {
    fn total(&self) -> usize {
        self.len()
    }

    fn next_message(&mut self) -> Option<Result<OutboundMessage, FeedError>> {
        self.next().map(Ok)
    }
}

/// A single cell of a contact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// One recipient's fields, keyed by column header.
pub type Contact = BTreeMap<String, FieldValue>;

/// Replaces each `{{ key }}` with the contact's value for the trimmed key.
///
/// Tokens without a matching field, or whose value renders empty, are kept
/// verbatim so they stay visible in the output.
#[must_use]
pub fn substitute(template: &str, contact: &Contact) -> String {
    VARIABLE
        .replace_all(template, |captures: &Captures<'_>| {
            let key = captures[1].trim();
            contact
                .get(key)
                .map(ToString::to_string)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Distinct variable names used by `template`, in order of first use.
#[must_use]
pub fn template_variables(template: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    for captures in VARIABLE.captures_iter(template) {
        let name = captures[1].trim();
        if !variables.iter().any(|known| known == name) {
            variables.push(name.to_string());
        }
    }
    variables
}

/// Variables used by `template` that no column in `headers` provides.
#[must_use]
pub fn missing_variables(template: &str, headers: &[&str]) -> Vec<String> {
    template_variables(template)
        .into_iter()
        .filter(|variable| !headers.contains(&variable.as_str()))
        .collect()
}

/// Campaign message template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub subject: String,
    /// Body text. Newlines become `<br/>`; other markup passes through.
    pub body: String,
    /// HTML appended below a divider when present.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
}

impl Template {
    /// Personalises the template for one contact. `None` when the contact
    /// has no email address.
    #[must_use]
    pub fn render(&self, contact: &Contact) -> Option<OutboundMessage> {
        let recipient = contact_email(contact)?;

        // Subjects are a single header line.
        let subject = substitute(&self.subject, contact).replace(['\r', '\n'], " ");

        let mut body = substitute(&self.body.replace('\n', "<br/>"), contact);
        if let Some(signature) = self.signature.as_deref().filter(|s| !s.trim().is_empty()) {
            body.push_str(SIGNATURE_DIVIDER);
            body.push_str(signature);
        }

        let optional = |field: &Option<String>| {
            field
                .as_deref()
                .map(|value| substitute(value, contact).trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Some(OutboundMessage {
            recipient,
            subject,
            body,
            text: None,
            reply_to: optional(&self.reply_to),
            cc: optional(&self.cc),
            bcc: optional(&self.bcc),
        })
    }

    /// Variables used anywhere in the subject or body.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        template_variables(&format!("{}\n{}", self.subject, self.body))
    }
}

fn contact_email(contact: &Contact) -> Option<String> {
    contact
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("email"))
        .map(|(_, value)| value.to_string().trim().to_string())
        .filter(|email| !email.is_empty())
}

/// Feed that personalises a template for each contact as it is pulled.
#[derive(Debug, Clone)]
pub struct PersonalizedFeed {
    template: Template,
    contacts: std::vec::IntoIter<Contact>,
    total: usize,
    index: usize,
}

impl PersonalizedFeed {
    #[must_use]
    pub fn new(template: Template, contacts: Vec<Contact>) -> Self {
        Self {
            template,
            total: contacts.len(),
            contacts: contacts.into_iter(),
            index: 0,
        }
    }
}

impl RecipientFeed for PersonalizedFeed {
    fn total(&self) -> usize {
        self.total
    }

    fn next_message(&mut self) -> Option<Result<OutboundMessage, FeedError>> {
        let contact = self.contacts.next()?;
        let index = self.index;
        self.index += 1;

        let Some(message) = self.template.render(&contact) else {
            return Some(Err(FeedError::MissingEmail { index }));
        };

        let fields = [
            ("email", Some(&message.recipient)),
            ("cc", message.cc.as_ref()),
            ("bcc", message.bcc.as_ref()),
            ("reply_to", message.reply_to.as_ref()),
        ];
        for (field, value) in fields {
            if let Some(value) = value.filter(|value| !is_plain_address(value)) {
                return Some(Err(FeedError::InvalidAddress {
                    index,
                    field,
                    value: value.clone(),
                }));
            }
        }

        Some(Ok(message))
    }
}

/// Addresses are written inside `<...>` on SMTP command lines and as header
/// values, so they must not carry line breaks or angle brackets.
fn is_plain_address(value: &str) -> bool {
    !value.contains(['\r', '\n', '<', '>'])
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn contact(fields: &[(&str, FieldValue)]) -> Contact {
        fields
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_substitute() {
        let row = contact(&[
            ("name", "Ada".into()),
            ("visits", FieldValue::Integer(3)),
            ("empty", "".into()),
        ]);

        assert_eq!(
            substitute("Hi {{ name }}, visit #{{visits}}", &row),
            "Hi Ada, visit #3"
        );
        assert_eq!(substitute("{{unknown}} {{ empty }}", &row), "{{unknown}} {{ empty }}");
    }

    #[test]
    fn test_template_variables() {
        assert_eq!(
            template_variables("{{ name }} {{company}} {{name}}"),
            vec!["name".to_string(), "company".to_string()]
        );
        assert_eq!(
            missing_variables("{{ name }} {{company}}", &["email", "name"]),
            vec!["company".to_string()]
        );
    }

    #[test]
    fn test_render() {
        let template = Template {
            subject: "News for {{name}}".to_string(),
            body: "Hello {{ name }}\nBye".to_string(),
            signature: Some("<b>The team</b>".to_string()),
            cc: Some("{{manager}}".to_string()),
            ..Template::default()
        };
        let row = contact(&[
            ("email", "ada@example.com".into()),
            ("name", "Ada".into()),
        ]);

        let message = template.render(&row).unwrap();
        assert_eq!(message.recipient, "ada@example.com");
        assert_eq!(message.subject, "News for Ada");
        assert_eq!(
            message.body,
            format!("Hello Ada<br/>Bye{SIGNATURE_DIVIDER}<b>The team</b>")
        );
        // Unresolved placeholders are not valid addresses but are kept as-is.
        assert_eq!(message.cc.as_deref(), Some("{{manager}}"));
        assert_eq!(message.bcc, None);
    }

    #[test]
    fn test_subject_stays_single_line() {
        let template = Template {
            subject: "{{title}}".to_string(),
            body: String::new(),
            ..Template::default()
        };
        let row = contact(&[
            ("email", "a@example.com".into()),
            ("title", "one\r\nBcc: evil@example.com".into()),
        ]);

        let message = template.render(&row).unwrap();
        assert!(!message.subject.contains('\n'));
    }

    #[test]
    fn test_feed_missing_email() {
        let template = Template {
            subject: "s".to_string(),
            body: "b".to_string(),
            ..Template::default()
        };
        let mut feed = PersonalizedFeed::new(
            template,
            vec![
                contact(&[("Email", " a@example.com ".into())]),
                contact(&[("name", "nobody".into())]),
            ],
        );

        assert_eq!(feed.total(), 2);
        assert_eq!(
            feed.next_message().unwrap().unwrap().recipient,
            "a@example.com"
        );
        assert_eq!(
            feed.next_message().unwrap(),
            Err(FeedError::MissingEmail { index: 1 })
        );
        assert!(feed.next_message().is_none());
    }

    #[test]
    fn test_feed_rejects_line_breaks_in_addresses() {
        let template = Template {
            subject: "s".to_string(),
            body: "b".to_string(),
            cc: Some("{{manager}}".to_string()),
            ..Template::default()
        };
        let mut feed = PersonalizedFeed::new(
            template,
            vec![
                contact(&[(
                    "email",
                    "ada@example.org>\r\nRCPT TO:<victim@evil.test".into(),
                )]),
                contact(&[
                    ("email", "bob@example.org".into()),
                    ("manager", "carol@example.org\nBcc: x@evil.test".into()),
                ]),
                contact(&[
                    ("email", "dave@example.org".into()),
                    ("manager", "erin@example.org".into()),
                ]),
            ],
        );

        assert_eq!(
            feed.next_message().unwrap(),
            Err(FeedError::InvalidAddress {
                index: 0,
                field: "email",
                value: "ada@example.org>\r\nRCPT TO:<victim@evil.test".to_string(),
            })
        );
        assert!(matches!(
            feed.next_message().unwrap(),
            Err(FeedError::InvalidAddress { index: 1, field: "cc", .. })
        ));
        let message = feed.next_message().unwrap().unwrap();
        assert_eq!(message.cc.as_deref(), Some("erin@example.org"));
    }

    #[test]
    fn test_contact_from_ron() {
        let row: Contact =
            ron::from_str(r#"{"email": "a@example.com", "age": 42, "vip": true, "score": 1.5}"#)
                .unwrap();
        assert_eq!(row["age"], FieldValue::Integer(42));
        assert_eq!(row["vip"], FieldValue::Bool(true));
        assert_eq!(row["score"].to_string(), "1.5");
    }
}
