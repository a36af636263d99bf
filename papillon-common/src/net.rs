//! Client-side stream shared by the SMTP and IMAP clients.
//!
//! A [`Connection`] is either a plain TCP stream or a TLS stream on top of
//! one. It can start out encrypted (implicit TLS) or be upgraded in place
//! after a STARTTLS exchange.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

/// An outbound connection that can be either plain TCP or TLS-wrapped.
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    /// Opens a TCP connection to `host:port`, wrapping it in TLS straight away
    /// when `implicit_tls` is set. The whole operation is bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the connect or handshake fails, or
    /// [`io::ErrorKind::TimedOut`] if it does not finish in time.
    pub async fn open(
        host: &str,
        port: u16,
        implicit_tls: bool,
        accept_invalid_certs: bool,
        timeout: Duration,
    ) -> io::Result<Self> {
        let connect = async {
            let stream = TcpStream::connect((host, port)).await?;
            let connection = Self::Plain(stream);
            if implicit_tls {
                connection.upgrade(host, accept_invalid_certs).await
            } else {
                Ok(connection)
            }
        };

        tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {host}:{port} timed out after {timeout:?}"),
                )
            })?
    }

    /// Upgrades a plain connection to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails, the domain is not a valid
    /// server name, or the connection is already encrypted.
    pub async fn upgrade(self, domain: &str, accept_invalid_certs: bool) -> io::Result<Self> {
        match self {
            Self::Plain(stream) => {
                let connector = connector(accept_invalid_certs)?;
                let server_name = ServerName::try_from(domain.to_string()).map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid domain: {e}"))
                })?;

                let tls_stream = connector.connect(server_name, stream).await?;
                Ok(Self::Tls(Box::new(tls_stream)))
            }
            Self::Tls(_) => Err(io::Error::other("Connection is already TLS")),
        }
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

fn connector(accept_invalid_certs: bool) -> io::Result<TlsConnector> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|e| io::Error::other(format!("Failed to add certificate: {e}")))?;
    }
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        tracing::warn!("TLS certificate validation is disabled for this connection");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts every certificate. Only reachable through `accept_invalid_certs`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}
