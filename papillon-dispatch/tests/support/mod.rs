//! Local mock mail servers for end-to-end dispatch tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use papillon_common::config::{SentFolderSettings, ServerCredentials, SocketTimeouts};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

/// What a mock SMTP server accepted.
#[derive(Debug, Clone, Default)]
pub struct SmtpLog {
    pub sessions: usize,
    pub commands: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SmtpBehaviour {
    /// Answer AUTH with 535.
    pub reject_auth: bool,
    /// Recipients answered with 550 at RCPT TO.
    pub reject_recipients: Vec<String>,
}

/// Starts an SMTP server that accepts any number of sessions.
pub async fn smtp_server(behaviour: SmtpBehaviour) -> (u16, Arc<Mutex<SmtpLog>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(SmtpLog::default()));

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            server_log.lock().unwrap().sessions += 1;
            tokio::spawn(smtp_session(socket, behaviour.clone(), server_log.clone()));
        }
    });

    (port, log)
}

async fn smtp_session(socket: TcpStream, behaviour: SmtpBehaviour, log: Arc<Mutex<SmtpLog>>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    write.write_all(b"220 mock ESMTP ready\r\n").await.unwrap();

    let mut line = String::new();
    let mut data: Option<String> = None;
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return;
        }

        if data.is_some() {
            if line == ".\r\n" {
                let message = data.take().unwrap_or_default();
                log.lock().unwrap().messages.push(message);
                write.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
            } else if let Some(message) = data.as_mut() {
                message.push_str(&line);
            }
            continue;
        }

        let command = line.trim_end().to_string();
        log.lock().unwrap().commands.push(command.clone());
        let upper = command.to_uppercase();

        let reply = if upper.starts_with("EHLO") {
            "250-mock greets you\r\n250 AUTH PLAIN LOGIN\r\n".to_string()
        } else if upper.starts_with("AUTH") {
            if behaviour.reject_auth {
                "535 5.7.8 Authentication credentials invalid\r\n".to_string()
            } else {
                "235 2.7.0 Authentication successful\r\n".to_string()
            }
        } else if upper.starts_with("MAIL FROM") {
            "250 OK\r\n".to_string()
        } else if upper.starts_with("RCPT TO") {
            let rejected = behaviour
                .reject_recipients
                .iter()
                .any(|r| command.contains(r.as_str()));
            if rejected {
                "550 5.1.1 No such user\r\n".to_string()
            } else {
                "250 OK\r\n".to_string()
            }
        } else if upper == "DATA" {
            data = Some(String::new());
            "354 End data with <CR><LF>.<CR><LF>\r\n".to_string()
        } else if upper == "QUIT" {
            write.write_all(b"221 Bye\r\n").await.unwrap();
            return;
        } else {
            "500 unrecognised\r\n".to_string()
        };

        write.write_all(reply.as_bytes()).await.unwrap();
    }
}

/// What a mock IMAP server saw.
#[derive(Debug, Clone, Default)]
pub struct ImapLog {
    pub sessions: usize,
    pub commands: Vec<String>,
    pub appended: Vec<(String, String)>,
}

/// Starts an IMAP server whose `LIST` reply contains `listing` lines
/// (without the `* LIST ` prefix).
pub async fn imap_server(listing: Vec<&'static str>) -> (u16, Arc<Mutex<ImapLog>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(ImapLog::default()));

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            server_log.lock().unwrap().sessions += 1;
            tokio::spawn(imap_session(socket, listing.clone(), server_log.clone()));
        }
    });

    (port, log)
}

async fn imap_session(socket: TcpStream, listing: Vec<&'static str>, log: Arc<Mutex<ImapLog>>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    write.write_all(b"* OK mock IMAP4rev1 ready\r\n").await.unwrap();

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return;
        }
        let command = line.trim_end().to_string();
        log.lock().unwrap().commands.push(command.clone());

        let mut parts = command.splitn(3, ' ');
        let tag = parts.next().unwrap_or_default().to_string();
        let verb = parts.next().unwrap_or_default().to_uppercase();
        let rest = parts.next().unwrap_or_default().to_string();

        let reply = match verb.as_str() {
            "LOGIN" => format!("{tag} OK LOGIN completed\r\n"),
            "LIST" => {
                let mut reply: String = listing
                    .iter()
                    .map(|entry| format!("* LIST {entry}\r\n"))
                    .collect();
                reply.push_str(&format!("{tag} OK LIST completed\r\n"));
                reply
            }
            "SELECT" => format!("* 0 EXISTS\r\n{tag} OK [READ-WRITE] SELECT completed\r\n"),
            "APPEND" => {
                let (mailbox, length) = rest.rsplit_once(" (").map_or((String::new(), 0), |(mailbox, tail)| {
                    let length = tail
                        .rsplit_once('{')
                        .and_then(|(_, n)| n.strip_suffix('}'))
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(0);
                    (mailbox.trim_matches('"').to_string(), length)
                });
                write.write_all(b"+ Ready for literal data\r\n").await.unwrap();
                let mut literal = vec![0u8; length + 2];
                reader.read_exact(&mut literal).await.unwrap();
                literal.truncate(length);
                log.lock()
                    .unwrap()
                    .appended
                    .push((mailbox, String::from_utf8_lossy(&literal).into_owned()));
                format!("{tag} OK APPEND completed\r\n")
            }
            "LOGOUT" => {
                write
                    .write_all(format!("* BYE\r\n{tag} OK LOGOUT completed\r\n").as_bytes())
                    .await
                    .unwrap();
                return;
            }
            _ => format!("{tag} BAD unknown command\r\n"),
        };

        write.write_all(reply.as_bytes()).await.unwrap();
    }
}

pub fn credentials(smtp_port: u16) -> ServerCredentials {
    ServerCredentials {
        host: "127.0.0.1".to_string(),
        port: smtp_port,
        use_implicit_tls: false,
        username: "news".to_string(),
        password: "secret".to_string(),
        sender_display_name: "Newsletter".to_string(),
        sender_address: "news@example.com".to_string(),
        reply_to_address: "replies@example.com".to_string(),
        accept_invalid_certs: false,
    }
}

pub fn sent_folder_settings(imap_port: u16) -> SentFolderSettings {
    SentFolderSettings {
        enabled: true,
        label: "Sent".to_string(),
        host: None,
        port: imap_port,
        use_implicit_tls: false,
    }
}

pub fn timeouts() -> SocketTimeouts {
    SocketTimeouts {
        connect_secs: 5,
        command_secs: 5,
        data_secs: 5,
    }
}
