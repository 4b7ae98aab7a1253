//! TLS context construction and per-session TLS state.
//!
//! The server context is built once from [`TlsConfig`] and shared by every
//! session. Each session then owns a [`TlsSession`], a rustls
//! [`ServerConnection`] driven directly against the non-blocking socket.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{NoServerSessionStorage, WebPkiClientVerifier};
use rustls::{
    CertificateError, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConnection,
    SignatureScheme, SupportedProtocolVersion,
};
use tracing::{debug, error, info, warn};

use crate::config::{TlsConfig, TlsVersion};
use crate::error::TlsError;
use crate::reactor::Socket;

/// The only application protocol offered.
pub const ALPN_H2: &[u8] = b"h2";

/// Build the shared server context.
pub fn build_server_config(config: &TlsConfig) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let provider = Arc::new(select_provider(config)?);
    let versions = protocol_versions(config.min_version, config.max_version)?;

    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)?;
    let builder = match &config.verify_client_cacert {
        Some(cacert) => {
            builder.with_client_cert_verifier(client_verifier(cacert, config, provider)?)
        }
        None => builder.with_no_client_auth(),
    };

    let certs = load_certs(&config.cert)?;
    let key = load_private_key(&config.private_key)?;
    let mut server_config = builder.with_single_cert(certs, key)?;

    server_config.alpn_protocols = vec![ALPN_H2.to_vec()];
    server_config.ignore_client_order = true;
    if !config.session_resumption {
        server_config.send_tls13_tickets = 0;
        server_config.session_storage = Arc::new(NoServerSessionStorage {});
    }
    if let Some(path) = &config.sslkeylog {
        server_config.key_log = Arc::new(KeyLogFile::open(path)?);
        warn!(path = %path.display(), "TLS key logging enabled");
    }

    info!(
        min_version = %config.min_version,
        max_version = %config.max_version,
        mutual = config.verify_client_cacert.is_some(),
        "TLS context ready"
    );
    Ok(Arc::new(server_config))
}

fn select_provider(config: &TlsConfig) -> Result<CryptoProvider, TlsError> {
    let mut provider = rustls::crypto::ring::default_provider();

    if !config.cipher_suites.is_empty() {
        provider.cipher_suites = config
            .cipher_suites
            .iter()
            .map(|name| {
                let wanted = suite_name(name);
                provider
                    .cipher_suites
                    .iter()
                    .find(|suite| format!("{:?}", suite.suite()).eq_ignore_ascii_case(&wanted))
                    .copied()
                    .ok_or_else(|| TlsError::UnknownCipherSuite(name.clone()))
            })
            .collect::<Result<_, _>>()?;
    }

    if !config.kx_groups.is_empty() {
        provider.kx_groups = config
            .kx_groups
            .iter()
            .map(|name| {
                let wanted = group_name(name);
                provider
                    .kx_groups
                    .iter()
                    .find(|group| format!("{:?}", group.name()).eq_ignore_ascii_case(wanted))
                    .copied()
                    .ok_or_else(|| TlsError::UnknownKxGroup(name.clone()))
            })
            .collect::<Result<_, _>>()?;
    }

    Ok(provider)
}

/// Accept the IANA TLS 1.3 spelling (`TLS_AES_256_GCM_SHA384`) as well as rustls'.
fn suite_name(name: &str) -> String {
    match name.strip_prefix("TLS_") {
        Some(rest) if rest.starts_with("AES_") || rest.starts_with("CHACHA20_") => {
            format!("TLS13_{rest}")
        }
        _ => name.to_string(),
    }
}

fn group_name(name: &str) -> &str {
    match name {
        "P-256" | "prime256v1" => "secp256r1",
        "P-384" => "secp384r1",
        other => other,
    }
}

fn protocol_versions(
    min: TlsVersion,
    max: TlsVersion,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    let versions: Vec<&'static SupportedProtocolVersion> = [
        (TlsVersion::Tls12, &rustls::version::TLS12),
        (TlsVersion::Tls13, &rustls::version::TLS13),
    ]
    .into_iter()
    .filter(|(version, _)| (min..=max).contains(version))
    .map(|(_, supported)| supported)
    .collect();

    if versions.is_empty() {
        return Err(TlsError::NoProtocolVersion {
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(versions)
}

fn client_verifier(
    cacert: &Path,
    config: &TlsConfig,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn ClientCertVerifier>, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(cacert)? {
        roots.add(cert)?;
    }

    let mut builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
    if !config.verify_client {
        builder = builder.allow_unauthenticated();
    }
    let verifier = builder.build()?;

    if config.allow_expired_client_cert {
        Ok(Arc::new(AllowExpiredClientCert { inner: verifier }))
    } else {
        Ok(verifier)
    }
}

/// Client verifier that tolerates an expired leaf. The chain is still
/// checked in full, as of the instant the certificate expired.
#[derive(Debug)]
struct AllowExpiredClientCert {
    inner: Arc<dyn ClientCertVerifier>,
}

impl ClientCertVerifier for AllowExpiredClientCert {
    fn offer_client_auth(&self) -> bool {
        self.inner.offer_client_auth()
    }

    fn client_auth_mandatory(&self) -> bool {
        self.inner.client_auth_mandatory()
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        match self.inner.verify_client_cert(end_entity, intermediates, now) {
            Err(rustls::Error::InvalidCertificate(CertificateError::ExpiredContext {
                not_after,
                ..
            })) => {
                error!("Client certificate has expired, accepting it as configured");
                self.inner.verify_client_cert(end_entity, intermediates, not_after)
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// NSS key log format, appended to a file.
#[derive(Debug)]
struct KeyLogFile {
    file: Mutex<File>,
}

impl KeyLogFile {
    fn open(path: &Path) -> Result<Self, TlsError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| TlsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl rustls::KeyLog for KeyLogFile {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let line = format!("{label} {} {}\n", hex(client_random), hex(secret));
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!(error = %e, "Failed to write TLS key log");
                }
            }
            Err(_) => warn!("TLS key log file lock poisoned"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let io_err = |source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let io_err = |source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(io_err)?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Progress of a non-blocking handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Complete,
    /// Wait for the socket to become readable, then call again.
    WantRead,
    /// Wait for the socket to become writable, then call again.
    WantWrite,
}

/// Adapts a [`Socket`] to the blocking-style traits rustls reads and writes
/// records through. `WouldBlock` passes straight through.
struct SocketIo<'a>(&'a dyn Socket);

impl Read for SocketIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for SocketIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Server side of one TLS connection.
pub struct TlsSession {
    conn: ServerConnection,
    context: String,
}

impl TlsSession {
    /// `context` identifies the session in logs, e.g. `sbi-h2-server:3`.
    pub fn new(config: Arc<rustls::ServerConfig>, context: String) -> Result<Self, rustls::Error> {
        Ok(Self {
            conn: ServerConnection::new(config)?,
            context,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }

    /// True while encrypted records are waiting for the socket.
    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    /// Advance the handshake as far as the socket allows.
    pub fn handshake(&mut self, socket: &dyn Socket) -> io::Result<Handshake> {
        loop {
            if self.conn.wants_write() && !self.flush(socket)? {
                return Ok(Handshake::WantWrite);
            }
            if !self.conn.is_handshaking() {
                debug!(
                    context = %self.context,
                    version = ?self.conn.protocol_version(),
                    suite = ?self.conn.negotiated_cipher_suite().map(|s| s.suite()),
                    "TLS handshake complete"
                );
                return Ok(Handshake::Complete);
            }
            match self.conn.read_tls(&mut SocketIo(socket)) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed during TLS handshake",
                    ))
                }
                Ok(_) => self.process_packets(socket)?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Handshake::WantRead),
                Err(e) => return Err(e),
            }
        }
    }

    /// Read decrypted bytes. `Ok(0)` means the peer closed.
    pub fn read(&mut self, socket: &dyn Socket, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
            match self.conn.read_tls(&mut SocketIo(socket))? {
                0 => return Ok(0),
                _ => self.process_packets(socket)?,
            }
        }
    }

    /// Encrypt and send. Returns how much plaintext was taken; records the
    /// socket could not absorb stay buffered until the next [`flush`](Self::flush).
    pub fn write(&mut self, socket: &dyn Socket, data: &[u8]) -> io::Result<usize> {
        if !self.flush(socket)? {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let taken = self.conn.writer().write(data)?;
        self.flush(socket)?;
        Ok(taken)
    }

    /// Push buffered records to the socket. `Ok(false)` when the socket is full.
    pub fn flush(&mut self, socket: &dyn Socket) -> io::Result<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut SocketIo(socket)) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Plaintext already decrypted but not yet read. The socket will not
    /// signal readiness for it.
    pub fn has_buffered_plaintext(&mut self) -> bool {
        self.conn
            .process_new_packets()
            .is_ok_and(|state| state.plaintext_bytes_to_read() > 0)
    }

    fn process_packets(&mut self, socket: &dyn Socket) -> io::Result<()> {
        if let Err(e) = self.conn.process_new_packets() {
            // Best effort: let the alert out before the session is torn down
            let _ = self.conn.write_tls(&mut SocketIo(socket));
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("context", &self.context)
            .field("handshaking", &self.conn.is_handshaking())
            .finish()
    }
}
