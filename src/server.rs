//! Server state and lifecycle.
//!
//! [`Server`] owns the session and stream pools, the TLS context and the
//! application handler. It is driven single-threaded: [`start`] shares it as
//! `Rc<RefCell<Server>>` between the listener task and one task per session,
//! all spawned on the caller's [`LocalSet`](tokio::task::LocalSet).

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{HandlerError, ResponseError, ServerError};
use crate::pool::{Handle, Pool};
use crate::reactor;
use crate::request::{Request, Response};
use crate::session::Session;
use crate::stream::Stream;

pub type SessionHandle = Handle<Session>;
pub type StreamHandle = Handle<Stream>;

/// Application callback, invoked once per complete request.
///
/// The handler may answer right away with [`Server::send_response`], or keep
/// the [`StreamHandle`] and answer later through the [`ServerHandle`]. A stale
/// handle (the stream or its session went away meanwhile) is rejected, never
/// dereferenced.
pub trait RequestHandler {
    fn handle(
        &self,
        server: &mut Server,
        request: Request,
        stream: StreamHandle,
    ) -> Result<(), HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut Server, Request, StreamHandle) -> Result<(), HandlerError>,
{
    fn handle(
        &self,
        server: &mut Server,
        request: Request,
        stream: StreamHandle,
    ) -> Result<(), HandlerError> {
        self(server, request, stream)
    }
}

pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) sessions: Pool<Session>,
    pub(crate) streams: Pool<Stream>,
    pub(crate) tls: Option<Arc<rustls::ServerConfig>>,
    pub(crate) handler: Option<Rc<dyn RequestHandler>>,
    /// Scratch buffer for socket reads, shared by every session
    pub(crate) read_buf: Vec<u8>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: Pool::with_capacity(config.max_sessions),
            streams: Pool::with_capacity(config.max_streams),
            read_buf: vec![0; config.read_buffer_size],
            tls: None,
            handler: None,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn set_handler(&mut self, handler: impl RequestHandler + 'static) {
        self.handler = Some(Rc::new(handler));
    }

    /// Install a TLS context. Sessions opened afterwards handshake first.
    pub fn set_tls_context(&mut self, context: Arc<rustls::ServerConfig>) {
        self.tls = Some(context);
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn session(&self, handle: SessionHandle) -> Option<&Session> {
        self.sessions.get(handle)
    }

    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.handles()
    }

    /// Announce shutdown to every peer: one GOAWAY(NO_ERROR) per session
    /// naming its last stream. Sessions stay open so in-flight streams can
    /// finish; failures are logged, never fatal here.
    pub fn graceful_shutdown(&mut self) {
        info!(sessions = self.sessions.len(), "Graceful shutdown");
        for handle in self.sessions.handles() {
            self.session_goaway(handle);
        }
    }

    /// Close every session and drop the TLS context.
    pub fn stop(&mut self) {
        info!(sessions = self.sessions.len(), "Stopping server");
        self.close_all();
        self.tls = None;
    }
}

/// Running server returned by [`start`].
pub struct ServerHandle {
    server: Rc<RefCell<Server>>,
    local_addr: SocketAddr,
    listener: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn graceful_shutdown(&self) {
        self.server.borrow_mut().graceful_shutdown();
    }

    /// Stop accepting, close every session and drop the TLS context.
    pub fn stop(&self) {
        self.listener.abort();
        self.server.borrow_mut().stop();
    }

    /// Answer a request whose handler deferred the response.
    pub fn send_response(
        &self,
        stream: StreamHandle,
        response: &Response,
    ) -> Result<(), ResponseError> {
        self.server.borrow_mut().send_response(stream, response)
    }

    pub fn send_and_free(
        &self,
        stream: StreamHandle,
        response: Response,
    ) -> Result<(), ResponseError> {
        self.server.borrow_mut().send_and_free(stream, response)
    }

    /// Run `f` with exclusive access to the server state.
    pub fn with<R>(&self, f: impl FnOnce(&mut Server) -> R) -> R {
        f(&mut self.server.borrow_mut())
    }
}

/// Bind the listener and start serving on the current
/// [`LocalSet`](tokio::task::LocalSet).
///
/// When the configuration carries a `[tls]` table the TLS context is built
/// first, and a failure there aborts startup before anything is bound.
pub async fn start(
    mut server: Server,
    handler: impl RequestHandler + 'static,
) -> Result<ServerHandle, ServerError> {
    server.config.validate()?;
    if let Some(tls) = &server.config.tls {
        let context = crate::tls::build_server_config(tls)?;
        server.set_tls_context(context);
    }
    server.set_handler(handler);

    let addr = server.config.listen.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(
        addr = %local_addr,
        tls = server.tls_enabled(),
        max_sessions = server.config.max_sessions,
        max_streams = server.config.max_streams,
        "HTTP/2 server listening"
    );

    let server = Rc::new(RefCell::new(server));
    let listener = reactor::spawn_listener(server.clone(), listener);
    Ok(ServerHandle {
        server,
        local_addr,
        listener,
    })
}
