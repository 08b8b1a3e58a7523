//! TLS certificate loading and handshakes.
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConnection, StreamOwned};
use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

/// Loads the certificate chain from a PEM file.
///
/// # Errors
/// Returns an error when the file cannot be opened or holds no
/// certificates.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, String> {
    let file =
        File::open(Path::new(path)).map_err(|e| format!("failed to open cert file {path:?}: {e}"))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to parse certs in {path:?}: {e}"))?;
    if certs.is_empty() {
        return Err(format!("no certificates found in {path:?}"));
    }
    Ok(certs)
}

/// Loads the first private key from a PEM file.
///
/// # Errors
/// Returns an error when the file cannot be opened or holds no key.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, String> {
    let file =
        File::open(Path::new(path)).map_err(|e| format!("failed to open key file {path:?}: {e}"))?;
    let mut reader = BufReader::new(file);
    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| format!("failed to parse key in {path:?}: {e}"))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            None => break,
            _ => {}
        }
    }
    Err(format!("no private key found in {path:?}"))
}

/// Builds the shared TLS context from the configured certificate and key.
/// The context is read-only after this and shared by every session.
///
/// # Errors
/// Returns an error when loading fails or the key does not match the
/// certificate.
pub fn build_server_config(
    cert_path: &str,
    key_path: &str,
) -> Result<Arc<rustls::ServerConfig>, String> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("bad certificate/key pair: {e}"))?;
    Ok(Arc::new(config))
}

/// Runs the server-side handshake on a freshly accepted socket and returns
/// the established session stream.
///
/// # Errors
/// Returns an error when the session cannot be created or the handshake
/// fails.
pub fn accept(
    config: &Arc<rustls::ServerConfig>,
    sock: TcpStream,
) -> Result<StreamOwned<ServerConnection, TcpStream>, std::io::Error> {
    let conn = ServerConnection::new(Arc::clone(config))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut stream = StreamOwned::new(conn, sock);
    while stream.conn.is_handshaking() {
        stream.conn.complete_io(&mut stream.sock)?;
    }
    Ok(stream)
}
