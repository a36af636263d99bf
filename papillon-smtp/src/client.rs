//! SMTP client implementation with support for implicit TLS and STARTTLS.

use std::{future::Future, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use papillon_common::{config::SocketTimeouts, net::Connection};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Longest response line accepted before the server is considered broken.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// An SMTP client for sending commands and receiving responses.
pub struct SmtpClient {
    stream: Option<BufReader<Connection>>,
    server_domain: String,
    accept_invalid_certs: bool,
    timeouts: SocketTimeouts,
    extensions: Vec<String>,
}

impl SmtpClient {
    /// Connects to `host:port`, using TLS from the first byte when
    /// `implicit_tls` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or TLS handshake fails or times out.
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        accept_invalid_certs: bool,
        timeouts: SocketTimeouts,
    ) -> Result<Self> {
        let connection =
            Connection::open(host, port, implicit_tls, accept_invalid_certs, timeouts.connect())
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::TimedOut => ClientError::Timeout(e.to_string()),
                    _ => ClientError::Io(e),
                })?;

        Ok(Self {
            stream: Some(BufReader::new(connection)),
            server_domain: host.to_string(),
            accept_invalid_certs,
            timeouts,
            extensions: Vec::new(),
        })
    }

    /// Returns `true` once the connection is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.get_ref().is_tls())
    }

    /// Extensions advertised in the last EHLO reply, upper-cased.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns `true` if the server advertised the given EHLO keyword.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extensions.iter().any(|ext| {
            ext.split_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
        })
    }

    /// SASL mechanisms from the `AUTH` extension line.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extensions
            .iter()
            .filter_map(|ext| {
                ext.strip_prefix("AUTH ")
                    .or_else(|| ext.strip_prefix("AUTH="))
            })
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect()
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or times out.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        let timeout = self.timeouts.command();
        bounded(timeout, "greeting", self.read_response()).await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails or times out.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let timeout = self.timeouts.command();
        let verb = command.split_whitespace().next().unwrap_or_default().to_string();
        bounded(timeout, &verb, async {
            self.write_all(format!("{command}\r\n").as_bytes()).await?;
            self.read_response().await
        })
        .await
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            self.extensions = response
                .lines
                .iter()
                .skip(1)
                .map(|line| line.trim().to_uppercase())
                .collect();
        }
        Ok(response)
    }

    /// Sends STARTTLS and upgrades the connection to TLS on a 220 reply.
    ///
    /// Extensions are cleared; callers must EHLO again afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is refused or the TLS upgrade fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?.ensure_success()?;

        let stream = self.stream.take().ok_or(ClientError::ConnectionClosed)?;
        let upgrade = stream
            .into_inner()
            .upgrade(&self.server_domain, self.accept_invalid_certs);
        let connection = tokio::time::timeout(self.timeouts.connect(), upgrade)
            .await
            .map_err(|_| ClientError::Timeout("TLS handshake".to_string()))?
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        self.stream = Some(BufReader::new(connection));
        self.extensions.clear();
        Ok(response)
    }

    /// Authenticates with `AUTH PLAIN` when offered, otherwise `AUTH LOGIN`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthenticationFailed` when the server rejects
    /// the credentials.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let mechanisms = self.auth_mechanisms();
        let use_login = !mechanisms.is_empty()
            && !mechanisms.iter().any(|m| m == "PLAIN")
            && mechanisms.iter().any(|m| m == "LOGIN");

        let response = if use_login {
            self.auth_login(username, password).await?
        } else {
            self.auth_plain(username, password).await?
        };

        if response.is_success() {
            tracing::debug!(mechanism = if use_login { "LOGIN" } else { "PLAIN" }, "Authenticated");
            Ok(())
        } else {
            Err(ClientError::AuthenticationFailed {
                code: response.code,
                message: response.message(),
            })
        }
    }

    async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.command(&format!("AUTH PLAIN {token}")).await
    }

    async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let response = self.command("AUTH LOGIN").await?;
        if !response.is_intermediate() {
            return Ok(response);
        }

        let response = self.command(&STANDARD.encode(username)).await?;
        if !response.is_intermediate() {
            return Ok(response);
        }

        self.command(&STANDARD.encode(password)).await
    }

    /// Sends MAIL FROM command.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] without sending anything if
    /// `from` is not a bare address, or an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        ensure_bare_address("MAIL FROM", from)?;
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Sends RCPT TO command.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] without sending anything if `to`
    /// is not a bare address, or an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        ensure_bare_address("RCPT TO", to)?;
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA and expects a 354 continuation.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer with 3xx.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await?.ensure_intermediate()
    }

    /// Sends the message content, dot-stuffed and terminated by `.`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the data timeout elapses.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<Response> {
        let timeout = self.timeouts.data();
        let mut payload = dot_stuff(data);
        payload.extend_from_slice(b".\r\n");

        bounded(timeout, "message data", async {
            self.write_all(&payload).await?;
            self.read_response().await
        })
        .await
    }

    /// Sends QUIT command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
        stream.get_mut().write_all(data).await?;
        stream.get_mut().flush().await?;
        Ok(())
    }

    /// Reads a complete, possibly multi-line, response.
    async fn read_response(&mut self) -> Result<Response> {
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = stream.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            if buf.len() > MAX_LINE_LENGTH {
                return Err(ClientError::ParseError(format!(
                    "Response line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }

            let text = String::from_utf8_lossy(&buf);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }

            tracing::trace!(line = %text, "smtp <");
            let line = Response::parse_line(text)?;
            let is_last = line.is_last;
            lines.push(line);
            if is_last {
                return Response::from_lines(lines);
            }
        }
    }
}

/// Envelope addresses go inside `<...>` on a single command line.
fn ensure_bare_address(command: &str, address: &str) -> Result<()> {
    if address.contains(['\r', '\n', '<', '>']) {
        return Err(ClientError::ParseError(format!(
            "{command} address contains a line break or angle bracket: {address:?}"
        )));
    }
    Ok(())
}

async fn bounded<T>(
    timeout: Duration,
    step: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ClientError::Timeout(format!("{step} timed out after {timeout:?}")))?
}

/// Normalises line endings to CRLF, doubles leading dots, and makes sure the
/// payload ends with CRLF.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 64);
    let mut at_line_start = true;
    let mut previous = 0u8;

    for &byte in data {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
        previous = byte;
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}
