//! Message submission.

use async_trait::async_trait;
use papillon_common::{
    OutboundMessage,
    config::{ServerCredentials, SocketTimeouts},
};
use papillon_smtp::{ClientError, MessageBuilder, SmtpClient};

use crate::error::TransmissionError;

/// A message the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Identifier the message was submitted under (its Message-ID).
    pub delivery_id: String,
    /// The exact bytes submitted, for filing in the sent mailbox.
    pub raw: Vec<u8>,
}

/// Submits one message on behalf of the account in `credentials`.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransmissionError`]; see [`TransmissionError::is_fatal`]
    /// for which ones stop the run.
    async fn send(
        &self,
        credentials: &ServerCredentials,
        message: &OutboundMessage,
    ) -> Result<Transmission, TransmissionError>;
}

/// Transmitter opening one SMTP session per message.
#[derive(Debug, Clone, Default)]
pub struct SmtpTransmitter {
    timeouts: SocketTimeouts,
}

impl SmtpTransmitter {
    #[must_use]
    pub const fn new(timeouts: SocketTimeouts) -> Self {
        Self { timeouts }
    }

    /// Renders `message` as it will be submitted, returning its Message-ID
    /// and the raw RFC 5322 text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] if a header value would span more
    /// than one line.
    pub fn compose(
        credentials: &ServerCredentials,
        message: &OutboundMessage,
    ) -> Result<(String, String), ClientError> {
        let message_id = format!("<{}@{}>", ulid::Ulid::new(), credentials.sender_domain());
        let reply_to = message
            .reply_to
            .as_deref()
            .filter(|reply_to| !reply_to.trim().is_empty())
            .unwrap_or(&credentials.reply_to_address);

        let mut builder = MessageBuilder::new()
            .from(credentials.from_header())
            .to(&message.recipient)
            .reply_to(reply_to)
            .subject(&message.subject)
            .message_id(&message_id)
            .html(&message.body);

        if let Some(cc) = message.cc.as_deref().filter(|cc| !cc.trim().is_empty()) {
            builder = builder.cc(cc);
        }
        if let Some(text) = &message.text {
            builder = builder.text(text);
        }

        Ok((message_id, builder.build()?))
    }

    #[tracing::instrument(
        name = "smtp_submit",
        skip_all,
        fields(host = %credentials.host, port = credentials.port)
    )]
    async fn submit(
        &self,
        credentials: &ServerCredentials,
        message: &OutboundMessage,
        raw: &[u8],
    ) -> Result<(), ClientError> {
        let mut client = SmtpClient::connect(
            &credentials.host,
            credentials.port,
            credentials.use_implicit_tls,
            credentials.accept_invalid_certs,
            self.timeouts.clone(),
        )
        .await?;

        client.read_greeting().await?.ensure_success()?;

        let domain = credentials.sender_domain();
        client.ehlo(domain).await?.ensure_success()?;

        if !client.is_tls() && client.supports("STARTTLS") {
            client.starttls().await?;
            client.ehlo(domain).await?.ensure_success()?;
            tracing::debug!("Upgraded connection with STARTTLS");
        }

        if !credentials.username.is_empty() {
            client
                .authenticate(&credentials.username, &credentials.password)
                .await?;
        }

        client
            .mail_from(&credentials.sender_address)
            .await?
            .ensure_success()?;
        for recipient in message.envelope_recipients() {
            client.rcpt_to(recipient).await?.ensure_success()?;
        }

        client.data().await?;
        client.send_data(raw).await?.ensure_success()?;

        // The message is already accepted at this point.
        if let Err(err) = client.quit().await {
            tracing::debug!(%err, "QUIT failed after the message was accepted");
        }

        Ok(())
    }
}

#[async_trait]
impl Transmitter for SmtpTransmitter {
    async fn send(
        &self,
        credentials: &ServerCredentials,
        message: &OutboundMessage,
    ) -> Result<Transmission, TransmissionError> {
        let (delivery_id, raw) = Self::compose(credentials, message)?;
        let raw = raw.into_bytes();

        self.submit(credentials, message, &raw).await?;

        Ok(Transmission { delivery_id, raw })
    }
}
