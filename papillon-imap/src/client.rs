//! Tagged-command IMAP client.

use std::{future::Future, time::Duration};

use papillon_common::{config::SocketTimeouts, net::Connection};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use super::{
    error::{ImapError, Result},
    response::{ListedMailbox, Status, TaggedResponse, parse_list_line, quote},
};

/// Longest logical response line accepted, literals included.
const MAX_LINE_LENGTH: usize = 256 * 1024;

/// A single IMAP session. Commands are issued one at a time and each one is
/// read through to its tagged completion before the next is sent.
pub struct ImapClient {
    stream: BufReader<Connection>,
    timeouts: SocketTimeouts,
    next_tag: u32,
}

impl ImapClient {
    /// Connects to `host:port`, with TLS from the first byte when
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
                    std::io::ErrorKind::TimedOut => ImapError::Timeout(e.to_string()),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                        ImapError::Tls(e.to_string())
                    }
                    _ => ImapError::Io(e),
                })?;

        Ok(Self {
            stream: BufReader::new(connection),
            timeouts,
            next_tag: 0,
        })
    }

    /// Reads the untagged server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the server greets with `BYE`, sends something that
    /// is not a greeting, or does not answer in time.
    pub async fn read_greeting(&mut self) -> Result<TaggedResponse> {
        let timeout = self.timeouts.command();
        bounded(timeout, "greeting", async {
            let line = self.read_line().await?;
            let greeting = TaggedResponse::parse(&line)
                .filter(|greeting| greeting.tag == "*")
                .ok_or_else(|| ImapError::Parse(format!("Unexpected greeting: '{line}'")))?;
            greeting.ensure_ok("greeting")
        })
        .await
    }

    /// Authenticates with `LOGIN`.
    ///
    /// # Errors
    ///
    /// Returns `ImapError::No` when the credentials are refused.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = format!("LOGIN {} {}", quote(username), quote(password));
        self.run("LOGIN", &command).await?;
        Ok(())
    }

    /// Lists every mailbox visible to the session (`LIST "" "*"`).
    ///
    /// Entries the parser cannot make sense of are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn list(&mut self) -> Result<Vec<ListedMailbox>> {
        let (untagged, _) = self.run("LIST", "LIST \"\" \"*\"").await?;

        Ok(untagged
            .iter()
            .filter(|line| {
                line.get(..7)
                    .is_some_and(|head| head.eq_ignore_ascii_case("* LIST "))
            })
            .filter_map(|line| match parse_list_line(line) {
                Ok(mailbox) => Some(mailbox),
                Err(err) => {
                    tracing::warn!(%err, "Skipping LIST entry");
                    None
                }
            })
            .collect())
    }

    /// Opens `mailbox` read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(&mut self, mailbox: &str) -> Result<()> {
        let command = format!("SELECT {}", encode_mailbox(mailbox));
        self.run("SELECT", &command).await?;
        Ok(())
    }

    /// Appends `message` to `mailbox` with the given flags, sending the
    /// message as a synchronising literal.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses the literal or the append, or
    /// the data timeout elapses.
    pub async fn append(&mut self, mailbox: &str, flags: &[&str], message: &[u8]) -> Result<()> {
        let tag = self.tag();
        let command = format!(
            "{tag} APPEND {} ({}) {{{}}}\r\n",
            encode_mailbox(mailbox),
            flags.join(" "),
            message.len()
        );
        let timeout = self.timeouts.data();

        bounded(timeout, "APPEND", async {
            tracing::trace!(line = %command.trim_end(), "imap >");
            self.write_all(command.as_bytes()).await?;

            loop {
                let line = self.read_line().await?;
                if line.starts_with('+') {
                    break;
                }
                if let Some(response) =
                    TaggedResponse::parse(&line).filter(|response| response.tag == tag)
                {
                    // Refused before the literal was accepted.
                    response.ensure_ok("APPEND")?;
                    return Err(ImapError::Parse(format!(
                        "APPEND completed without accepting the message: '{line}'"
                    )));
                }
            }

            let mut payload = Vec::with_capacity(message.len() + 2);
            payload.extend_from_slice(message);
            payload.extend_from_slice(b"\r\n");
            self.write_all(&payload).await?;

            self.read_completion(&tag, "APPEND").await.map(|_| ())
        })
        .await
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge the logout.
    pub async fn logout(&mut self) -> Result<()> {
        self.run("LOGOUT", "LOGOUT").await?;
        Ok(())
    }

    /// Sends one tagged command and reads through to its completion,
    /// returning the untagged lines received along the way.
    async fn run(&mut self, name: &str, command: &str) -> Result<(Vec<String>, TaggedResponse)> {
        let tag = self.tag();
        let timeout = self.timeouts.command();

        bounded(timeout, name, async {
            if name == "LOGIN" {
                tracing::trace!(line = %format!("{tag} LOGIN ***"), "imap >");
            } else {
                tracing::trace!(line = %format!("{tag} {command}"), "imap >");
            }
            self.write_all(format!("{tag} {command}\r\n").as_bytes())
                .await?;
            self.read_completion(&tag, name).await
        })
        .await
    }

    async fn read_completion(
        &mut self,
        tag: &str,
        name: &str,
    ) -> Result<(Vec<String>, TaggedResponse)> {
        let mut untagged = Vec::new();

        loop {
            let line = self.read_line().await?;
            match TaggedResponse::parse(&line) {
                Some(response) if response.tag == tag => {
                    let response = response.ensure_ok(name)?;
                    return Ok((untagged, response));
                }
                Some(response) if response.tag == "*" && response.status == Status::Bye => {
                    // LOGOUT answers with an untagged BYE before its tagged OK.
                    if name != "LOGOUT" {
                        tracing::warn!(text = %response.text, "Server sent BYE");
                    }
                    untagged.push(line);
                }
                _ => untagged.push(line),
            }
        }
    }

    fn tag(&mut self) -> String {
        self.next_tag += 1;
        format!("A{:04}", self.next_tag)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads one logical response line. Literals (`{N}`) are read inline and
    /// substituted as quoted strings, so callers only ever see single lines.
    async fn read_line(&mut self) -> Result<String> {
        let mut logical = String::new();

        loop {
            let mut buf = Vec::new();
            let n = self.stream.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                return Err(ImapError::ConnectionClosed);
            }

            let text = String::from_utf8_lossy(&buf);
            let text = text.trim_end_matches(['\r', '\n']);
            tracing::trace!(line = %text, "imap <");

            match literal_length(text) {
                Some((prefix, length)) => {
                    if logical.len() + length > MAX_LINE_LENGTH {
                        return Err(ImapError::Parse(format!(
                            "Response exceeds {MAX_LINE_LENGTH} bytes"
                        )));
                    }
                    let mut literal = vec![0u8; length];
                    self.stream.read_exact(&mut literal).await?;

                    logical.push_str(prefix);
                    logical.push_str(&quote(&String::from_utf8_lossy(&literal)));
                }
                None => {
                    logical.push_str(text);
                    if logical.len() > MAX_LINE_LENGTH {
                        return Err(ImapError::Parse(format!(
                            "Response exceeds {MAX_LINE_LENGTH} bytes"
                        )));
                    }
                    return Ok(logical);
                }
            }
        }
    }
}

/// Splits `... {N}` into the text before the literal marker and `N`.
fn literal_length(line: &str) -> Option<(&str, usize)> {
    let body = line.strip_suffix('}')?;
    let open = body.rfind('{')?;
    let digits = body[open + 1..].trim_end_matches('+');
    let length = digits.parse().ok()?;
    Some((&line[..open], length))
}

fn encode_mailbox(mailbox: &str) -> String {
    quote(&utf7_imap::encode_utf7_imap(mailbox.to_string()))
}

async fn bounded<T>(
    timeout: Duration,
    step: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ImapError::Timeout(format!("{step} timed out after {timeout:?}")))?
}
