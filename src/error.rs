//! Error types for each layer of the server.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::h2_codec::{error_code, CodecError};
use crate::hpack::HpackError;
use crate::query::QueryError;

/// Connection-level protocol failures reported by the framing engine.
/// Stream-level problems never surface here; the engine resets the stream itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Compression(#[from] HpackError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("flow control error: {0}")]
    FlowControl(String),
    #[error("stream {0} cannot carry a response")]
    StreamNotWritable(u32),
}

impl EngineError {
    /// The HTTP/2 error code for the GOAWAY announcing this failure.
    pub fn error_code(&self) -> u32 {
        match self {
            EngineError::Codec(e) => e.error_code(),
            EngineError::Compression(_) => error_code::COMPRESSION_ERROR,
            EngineError::Protocol(_) => error_code::PROTOCOL_ERROR,
            EngineError::FlowControl(_) => error_code::FLOW_CONTROL_ERROR,
            EngineError::StreamNotWritable(_) => error_code::INTERNAL_ERROR,
        }
    }
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session pool exhausted")]
    PoolExhausted,
    #[error("session no longer exists")]
    Stale,
    #[error("stream id {stream_id} is lower than last stream id {last_stream_id}")]
    StreamOrder { stream_id: u32, last_stream_id: u32 },
    #[error("write queue exceeds {limit} bytes")]
    WriteQueueFull { limit: usize },
    #[error("connection closed by peer")]
    PeerClosed,
    #[error("framing engine: {0}")]
    Engine(#[from] EngineError),
    #[error("TLS: {0}")]
    Tls(#[from] rustls::Error),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Peer resets are routine and are not worth an error-level log line.
    pub fn is_peer_reset(&self) -> bool {
        match self {
            SessionError::PeerClosed => true,
            SessionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Errors raised while building a request on a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream pool exhausted")]
    PoolExhausted,
    #[error("stream no longer exists")]
    Stale,
    #[error("duplicate pseudo-header {0}")]
    DuplicatePseudoHeader(String),
    #[error(transparent)]
    TooManyQueryParams(#[from] QueryError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from the response emitter.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("status {0} is out of range")]
    InvalidStatus(u16),
    #[error("no status string for {0}")]
    UnmappedStatus(u16),
    #[error("stream no longer exists")]
    StaleStream,
    #[error("session no longer exists")]
    StaleSession,
    #[error("framing engine rejected the response: {0}")]
    Engine(#[from] EngineError),
    #[error("flush failed, session closed: {0}")]
    Flush(#[from] SessionError),
}

/// Failure reported by the application request handler.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// TLS context construction errors.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),
    #[error("unknown cipher suite {0}")]
    UnknownCipherSuite(String),
    #[error("unknown key exchange group {0}")]
    UnknownKxGroup(String),
    #[error("no TLS protocol version between {min} and {max}")]
    NoProtocolVersion { min: String, max: String },
    #[error("client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from [`start`](crate::server::start).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
