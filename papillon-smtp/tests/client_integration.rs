//! End-to-end tests for the SMTP client against a scripted local server.

use std::time::Duration;

use papillon_common::config::SocketTimeouts;
use papillon_smtp::{ClientError, SmtpClient};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::mpsc,
};

/// Accepts one connection and answers each command from `script`, which maps
/// a command prefix to the raw reply. Received lines are forwarded on the
/// returned channel.
async fn scripted_server(
    script: Vec<(&'static str, &'static str)>,
) -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        write.write_all(b"220 mock ESMTP ready\r\n").await.unwrap();

        let mut in_data = false;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let trimmed = line.trim_end().to_string();
            let _ = tx.send(trimmed.clone());

            if in_data {
                if trimmed == "." {
                    in_data = false;
                    write.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
                }
                continue;
            }

            let reply = script
                .iter()
                .find(|(prefix, _)| trimmed.starts_with(prefix))
                .map_or("500 unrecognised\r\n", |(_, reply)| *reply);
            if trimmed == "DATA" && reply.starts_with("354") {
                in_data = true;
            }
            write.write_all(reply.as_bytes()).await.unwrap();
            if trimmed == "QUIT" {
                break;
            }
        }
    });

    (port, rx)
}

fn timeouts() -> SocketTimeouts {
    SocketTimeouts {
        connect_secs: 5,
        command_secs: 5,
        data_secs: 5,
    }
}

const HAPPY_PATH: &[(&str, &str)] = &[
    (
        "EHLO",
        "250-mock greets you\r\n250-SIZE 10000000\r\n250 AUTH LOGIN PLAIN\r\n",
    ),
    ("AUTH PLAIN", "235 2.7.0 Authentication successful\r\n"),
    ("MAIL FROM", "250 OK\r\n"),
    ("RCPT TO", "250 OK\r\n"),
    ("DATA", "354 End data with <CR><LF>.<CR><LF>\r\n"),
    ("QUIT", "221 Bye\r\n"),
];

#[tokio::test]
async fn test_full_submission() {
    let (port, mut received) = scripted_server(HAPPY_PATH.to_vec()).await;

    let mut client = SmtpClient::connect("127.0.0.1", port, false, false, timeouts())
        .await
        .unwrap();
    assert_eq!(client.read_greeting().await.unwrap().code, 220);

    client.ehlo("example.com").await.unwrap().ensure_success().unwrap();
    assert!(client.supports("SIZE"));
    assert_eq!(client.auth_mechanisms(), vec!["LOGIN", "PLAIN"]);

    client.authenticate("user", "secret").await.unwrap();
    client.mail_from("news@example.com").await.unwrap().ensure_success().unwrap();
    client.rcpt_to("reader@example.org").await.unwrap().ensure_success().unwrap();
    client.data().await.unwrap();
    let accepted = client
        .send_data(b"Subject: Hi\r\n\r\n.leading dot\r\n")
        .await
        .unwrap();
    assert_eq!(accepted.code, 250);
    assert_eq!(client.quit().await.unwrap().code, 221);

    let mut lines = Vec::new();
    while let Ok(line) = received.try_recv() {
        lines.push(line);
    }
    assert!(lines.contains(&"AUTH PLAIN AHVzZXIAc2VjcmV0".to_string()));
    assert!(lines.contains(&"..leading dot".to_string()));
    assert!(lines.contains(&"RCPT TO:<reader@example.org>".to_string()));
}

#[tokio::test]
async fn test_authentication_rejected() {
    let script = vec![
        ("EHLO", "250-mock\r\n250 AUTH PLAIN\r\n"),
        ("AUTH PLAIN", "535 5.7.8 Authentication credentials invalid\r\n"),
    ];
    let (port, _received) = scripted_server(script).await;

    let mut client = SmtpClient::connect("127.0.0.1", port, false, false, timeouts())
        .await
        .unwrap();
    client.read_greeting().await.unwrap();
    client.ehlo("example.com").await.unwrap();

    let err = client.authenticate("user", "wrong").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::AuthenticationFailed { code: 535, .. }
    ));
}

#[tokio::test]
async fn test_auth_login_when_plain_not_offered() {
    let script = vec![
        ("EHLO", "250-mock\r\n250 AUTH LOGIN\r\n"),
        ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
        ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
        ("c2VjcmV0", "235 OK\r\n"),
    ];
    let (port, _received) = scripted_server(script).await;

    let mut client = SmtpClient::connect("127.0.0.1", port, false, false, timeouts())
        .await
        .unwrap();
    client.read_greeting().await.unwrap();
    client.ehlo("example.com").await.unwrap();
    client.authenticate("user", "secret").await.unwrap();
}

#[tokio::test]
async fn test_recipient_rejected() {
    let script = vec![
        ("EHLO", "250 mock\r\n"),
        ("MAIL FROM", "250 OK\r\n"),
        ("RCPT TO", "550 5.1.1 No such user\r\n"),
    ];
    let (port, _received) = scripted_server(script).await;

    let mut client = SmtpClient::connect("127.0.0.1", port, false, false, timeouts())
        .await
        .unwrap();
    client.read_greeting().await.unwrap();
    client.ehlo("example.com").await.unwrap();
    client.mail_from("news@example.com").await.unwrap();

    let response = client.rcpt_to("ghost@example.org").await.unwrap();
    assert!(response.is_permanent_error());
    assert_eq!(response.into_error().code(), Some(550));
}

#[tokio::test]
async fn test_command_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // Accept but never greet.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut client = SmtpClient::connect(
        "127.0.0.1",
        port,
        false,
        false,
        SocketTimeouts {
            connect_secs: 5,
            command_secs: 1,
            data_secs: 1,
        },
    )
    .await
    .unwrap();

    let err = client.read_greeting().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
}

#[tokio::test]
async fn test_line_break_in_envelope_address_refused() {
    let (port, mut received) = scripted_server(HAPPY_PATH.to_vec()).await;

    let mut client = SmtpClient::connect("127.0.0.1", port, false, false, timeouts())
        .await
        .unwrap();
    client.read_greeting().await.unwrap();
    client.ehlo("example.com").await.unwrap();

    let err = client
        .mail_from("news@example.com>\r\nRSET")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ParseError(_)));

    client.mail_from("news@example.com").await.unwrap();
    let err = client
        .rcpt_to("ada@example.org>\r\nRCPT TO:<victim@evil.test")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ParseError(_)));
    assert_eq!(client.quit().await.unwrap().code, 221);

    let mut lines = Vec::new();
    while let Ok(line) = received.try_recv() {
        lines.push(line);
    }
    assert!(!lines.iter().any(|line| line.contains("evil.test")));
    assert!(!lines.iter().any(|line| line == "RSET"));
    assert_eq!(
        lines.iter().filter(|line| line.starts_with("MAIL FROM")).count(),
        1
    );
}
