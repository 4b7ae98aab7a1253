//! sbi-h2-server: a single-threaded HTTP/2 server transport
//!
//! Accepts TCP connections (optionally TLS with ALPN `h2`), runs the HTTP/2
//! framing state machine for each of them and hands every complete request to
//! an application callback. Responses go back out as HEADERS plus DATA frames
//! sliced straight from the response body.
//!
//! # Features
//!
//! - **Sessions and Streams**: fixed-capacity pools addressed by generational
//!   handles, so a late response to a vanished stream is rejected, not misrouted
//! - **Sans-I/O Framing**: [`FrameEngine`] turns bytes into [`FrameEvent`]s and
//!   responses into bytes; the reactor only moves bytes
//! - **Zero-Copy Bodies**: DATA payloads are [`bytes::Bytes`] slices of the body
//! - **Write-Queue Backpressure**: write interest is held only while bytes are queued
//! - **TLS**: rustls with TLS 1.3 by default, optional mutual TLS, key logging
//! - **Graceful Shutdown**: GOAWAY to every peer, then stop
//!
//! # Quick Start
//!
//! ```no_run
//! use sbi_h2_server::{
//!     start, HandlerError, Request, Response, Server, ServerConfig, StatusCode, StreamHandle,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let server = Server::new(ServerConfig::default());
//!         let hello = |server: &mut Server, _request: Request, stream: StreamHandle| {
//!             let response = Response::new(StatusCode::Ok).with_body("hello");
//!             server
//!                 .send_and_free(stream, response)
//!                 .map_err(|e| HandlerError::new(e.to_string()))
//!         };
//!         let handle = start(server, hello).await?;
//!
//!         tokio::signal::ctrl_c().await?;
//!         handle.graceful_shutdown();
//!         handle.stop();
//!         Ok::<_, Box<dyn std::error::Error>>(())
//!     })
//!     .await
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`h2_codec`] and [`hpack`]: frame parsing/encoding and header compression
//! - [`engine`]: per-connection protocol state, flow control, response slicing
//! - [`session`], [`stream`], [`handlers`], [`response`]: the server proper
//! - [`reactor`]: tokio tasks that wait on socket readiness
//! - [`tls`]: rustls context and per-session TLS state

pub mod config;
pub mod engine;
pub mod error;
pub mod h2_codec;
pub mod handlers;
pub mod hpack;
pub mod pool;
pub mod query;
pub mod reactor;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod status;
pub mod stream;
pub mod tls;

pub use config::{ServerConfig, TlsConfig, TlsVersion};
pub use engine::{FrameEngine, FrameEvent, PeerSettings, StreamState};
pub use error::{
    ConfigError, EngineError, HandlerError, ResponseError, ServerError, SessionError, StreamError,
    TlsError,
};
pub use h2_codec::{
    error_code, flags, frame_type, settings_id, CodecError, H2Codec, H2Event, H2FrameHeader,
    CONNECTION_PREFACE, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, MAX_ALLOWED_FRAME_SIZE,
    MAX_HEADER_BLOCK_SIZE,
};
pub use hpack::{H2Header, HpackDecoder, HpackEncoder, HpackError};
pub use pool::{Handle, Pool};
pub use query::{decompose, DecomposedPath, QueryError, MAX_QUERY_PARAMS};
pub use reactor::Socket;
pub use request::{HeaderMap, Request, Response};
pub use server::{start, RequestHandler, Server, ServerHandle, SessionHandle, StreamHandle};
pub use session::Session;
pub use status::StatusCode;
pub use stream::Stream;
pub use tls::{Handshake, TlsSession};
