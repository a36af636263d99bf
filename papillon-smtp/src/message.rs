//! MIME message builder for HTML mail with a plain-text alternative.

use std::{fmt::Write, sync::LazyLock};

use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;

use crate::error::{ClientError, Result};

#[allow(clippy::unwrap_used, reason = "pattern is a literal")]
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

#[allow(clippy::unwrap_used, reason = "pattern is a literal")]
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Derives a plain-text rendering of an HTML body: `<br>` variants become
/// newlines and every other tag is dropped.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    TAG.replace_all(&with_breaks, "").into_owned()
}

/// RFC 2047 `B` encoding for header values that are not plain ASCII.
#[must_use]
pub fn encode_header_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

/// Builder for a `multipart/alternative` message.
///
/// # Examples
///
/// ```
/// use papillon_smtp::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("\"News\" <news@example.com>")
///     .to("reader@example.org")
///     .subject("Hello")
///     .html("<p>Hello<br/>there</p>")
///     .build()?;
///
/// assert!(message.contains("multipart/alternative"));
/// # Ok::<(), papillon_smtp::ClientError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    reply_to: Option<String>,
    subject: Option<String>,
    message_id: Option<String>,
    date: Option<String>,
    html: String,
    text: Option<String>,
    boundary: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Adds a recipient to the To header.
    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    /// Adds a recipient to the Cc header.
    #[must_use]
    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(email.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, email: impl Into<String>) -> Self {
        self.reply_to = Some(email.into());
        self
    }

    /// Sets the Subject header, encoding it when it is not ASCII.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the Message-ID; angle brackets are added if missing.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.message_id = Some(if id.starts_with('<') {
            id
        } else {
            format!("<{id}>")
        });
        self
    }

    /// Overrides the Date header. Defaults to the current UTC time.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Sets the plain-text alternative. Derived from the HTML when unset.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Fixes the MIME boundary instead of generating one.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] if any header value contains a
    /// line break.
    pub fn build(self) -> Result<String> {
        let boundary = self
            .boundary
            .clone()
            .unwrap_or_else(|| format!("----=_Part_{}", ulid::Ulid::new()));
        let text = self.text.clone().unwrap_or_else(|| html_to_text(&self.html));
        let date = self
            .date
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().to_rfc2822());

        let mut message = String::with_capacity(self.html.len() * 2 + 1024);

        if let Some(from) = &self.from {
            push_header(&mut message, "From", from)?;
        }
        if !self.to.is_empty() {
            push_header(&mut message, "To", &self.to.join(", "))?;
        }
        if !self.cc.is_empty() {
            push_header(&mut message, "Cc", &self.cc.join(", "))?;
        }
        if let Some(reply_to) = self.reply_to.as_deref().filter(|r| !r.is_empty()) {
            push_header(&mut message, "Reply-To", reply_to)?;
        }
        if let Some(subject) = &self.subject {
            ensure_single_line("Subject", subject)?;
            push_header(&mut message, "Subject", &encode_header_word(subject))?;
        }
        push_header(&mut message, "Date", &date)?;
        if let Some(id) = &self.message_id {
            push_header(&mut message, "Message-ID", id)?;
        }
        push_header(&mut message, "MIME-Version", "1.0")?;
        push_header(
            &mut message,
            "Content-Type",
            &format!("multipart/alternative; boundary=\"{boundary}\""),
        )?;

        message.push_str("\r\n");
        push_part(&mut message, &boundary, "text/plain", &text);
        push_part(&mut message, &boundary, "text/html", &self.html);
        let _ = write!(message, "--{boundary}--\r\n");

        Ok(message)
    }
}

/// A header value must stay on its own line.
fn ensure_single_line(name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(ClientError::ParseError(format!(
            "{name} header contains a line break: {value:?}"
        )));
    }
    Ok(())
}

fn push_header(message: &mut String, name: &str, value: &str) -> Result<()> {
    ensure_single_line(name, value)?;
    // Writing into a String cannot fail.
    let _ = write!(message, "{name}: {value}\r\n");
    Ok(())
}

fn push_part(message: &mut String, boundary: &str, content_type: &str, content: &str) {
    let _ = write!(
        message,
        "--{boundary}\r\nContent-Type: {content_type}; charset=utf-8\r\nContent-Transfer-Encoding: base64\r\n\r\n"
    );

    let encoded = STANDARD.encode(content);
    for chunk in encoded.as_bytes().chunks(76) {
        message.push_str(&String::from_utf8_lossy(chunk));
        message.push_str("\r\n");
    }
}
