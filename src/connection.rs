//! Internal module for opening the byte stream to an IMAP server.
//!
//! Implicit TLS (IMAPS) by default; plain TCP when the credentials disable TLS.

use crate::config::Credentials;
use crate::error::ConnError;
use rustls::ClientConfig;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// Byte stream a session runs over.
pub(crate) trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug> ImapStream for T {}

/// Type-erased stream, so TLS and plain connections share one session type.
pub(crate) type BoxedStream = Box<dyn ImapStream>;

/// Opens a TCP connection and, if requested, performs the TLS handshake.
#[instrument(
    name = "connection::establish",
    skip_all,
    fields(
        imap_host = %credentials.host,
        port = credentials.port,
        use_tls = credentials.use_tls
    )
)]
pub(crate) async fn establish(credentials: &Credentials) -> Result<BoxedStream, ConnError> {
    let target_addr = credentials.server_address();

    if !credentials.use_tls {
        let tcp_stream = connect_tcp(&target_addr).await?;
        return Ok(Box::new(tcp_stream));
    }

    let connector = create_tls_connector();
    let server_name = parse_server_name(&credentials.host)?;
    let tcp_stream = connect_tcp(&target_addr).await?;

    debug!("Performing TLS handshake");

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| ConnError::Tls {
            target: target_addr,
            source,
        })?;

    Ok(Box::new(tls_stream))
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let mut root_cert_store = rustls::RootCertStore::empty();
    root_cert_store.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName, ConnError> {
    rustls::ServerName::try_from(host).map_err(|source| ConnError::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

/// Direct TCP connection.
#[instrument(name = "connection::tcp_connect", skip_all)]
async fn connect_tcp(target_addr: &str) -> Result<TcpStream, ConnError> {
    debug!(target = %target_addr, "Establishing TCP connection");

    TcpStream::connect(target_addr)
        .await
        .map_err(|source| ConnError::Network {
            target: target_addr.to_string(),
            source,
        })
}
