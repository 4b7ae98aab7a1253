//! Per-connection state and the session manager.
//!
//! A [`Session`] couples one accepted socket with its optional TLS state, its
//! framing engine and a FIFO write queue. Bytes produced by the engine are
//! queued, and the socket is only watched for writability while the queue is
//! non-empty.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::engine::{FrameEngine, FrameEvent, PeerSettings};
use crate::error::SessionError;
use crate::h2_codec::{error_code, settings_id};
use crate::reactor::Socket;
use crate::server::{Server, SessionHandle, StreamHandle};
use crate::tls::{Handshake, TlsSession};

pub struct Session {
    handle: SessionHandle,
    socket: Rc<dyn Socket>,
    peer: SocketAddr,
    pub(crate) tls: Option<TlsSession>,
    pub(crate) engine: FrameEngine,
    write_queue: VecDeque<Bytes>,
    queued_bytes: usize,
    write_interest: bool,
    waker: Rc<Notify>,
    /// Live streams by HTTP/2 stream id
    pub(crate) streams: HashMap<u32, StreamHandle>,
    pub(crate) last_stream_id: u32,
}

impl Session {
    fn new(
        handle: SessionHandle,
        socket: Rc<dyn Socket>,
        peer: SocketAddr,
        tls: Option<TlsSession>,
    ) -> Self {
        Self {
            handle,
            socket,
            peer,
            tls,
            engine: FrameEngine::new(),
            write_queue: VecDeque::new(),
            queued_bytes: 0,
            write_interest: false,
            waker: Rc::new(Notify::new()),
            streams: HashMap::new(),
            last_stream_id: 0,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Highest stream id opened on this session.
    pub fn last_stream_id(&self) -> u32 {
        self.last_stream_id
    }

    /// What the peer has advertised in SETTINGS so far.
    pub fn peer_settings(&self) -> &PeerSettings {
        self.engine.peer_settings()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, stream_id: u32) -> Option<StreamHandle> {
        self.streams.get(&stream_id).copied()
    }

    /// True while the socket is registered for writability.
    pub fn write_interest(&self) -> bool {
        self.write_interest
    }

    pub fn queued_buffers(&self) -> usize {
        self.write_queue.len()
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn tls_context(&self) -> Option<&str> {
        self.tls.as_ref().map(TlsSession::context)
    }

    /// Wakes the task driving this session when its registrations change.
    pub fn waker(&self) -> Rc<Notify> {
        self.waker.clone()
    }

    /// Append to the write queue, registering write interest on the
    /// empty to non-empty transition.
    pub(crate) fn enqueue(&mut self, buf: Bytes, limit: usize) -> Result<(), SessionError> {
        if self.queued_bytes + buf.len() > limit {
            return Err(SessionError::WriteQueueFull { limit });
        }
        self.enqueue_unbounded(buf);
        Ok(())
    }

    fn enqueue_unbounded(&mut self, buf: Bytes) {
        self.queued_bytes += buf.len();
        self.write_queue.push_back(buf);
        self.register_write();
    }

    fn register_write(&mut self) {
        if !self.write_interest {
            self.write_interest = true;
            self.waker.notify_one();
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.tls {
            Some(tls) => tls.read(&*self.socket, buf),
            None => self.socket.try_read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.tls {
            Some(tls) => tls.write(&*self.socket, buf),
            None => self.socket.try_write(buf),
        }
    }

    /// Flush TLS records left over from an earlier write. `Ok(false)` while
    /// the socket is still full.
    fn flush_tls(&mut self) -> io::Result<bool> {
        match &mut self.tls {
            Some(tls) => tls.flush(&*self.socket),
            None => Ok(true),
        }
    }

    fn tls_wants_write(&self) -> bool {
        self.tls.as_ref().is_some_and(TlsSession::wants_write)
    }

    /// Write the head of the queue once. A partial write keeps the remainder
    /// at the head so ordering is preserved.
    fn write_once(&mut self) -> io::Result<()> {
        if !self.flush_tls()? {
            return Ok(());
        }
        let Some(buf) = self.write_queue.pop_front() else {
            return Ok(());
        };
        self.queued_bytes -= buf.len();

        let result = self.write(&buf);
        let rest = match &result {
            Ok(n) => buf.slice(*n..),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => buf,
            Err(_) => Bytes::new(),
        };
        if !rest.is_empty() {
            self.queued_bytes += rest.len();
            self.write_queue.push_front(rest);
        }
        match result {
            Err(e) if e.kind() != io::ErrorKind::WouldBlock => Err(e),
            _ => Ok(()),
        }
    }

    /// Write as much of the queue as the socket takes right now.
    fn drain_best_effort(&mut self) {
        while !self.write_queue.is_empty() {
            let before = self.queued_bytes;
            if self.write_once().is_err() || self.queued_bytes == before {
                break;
            }
        }
        let _ = self.flush_tls();
    }

    /// Whether buffered TLS plaintext is waiting. The socket will not
    /// report readiness for it.
    pub(crate) fn has_buffered_input(&mut self) -> bool {
        self.tls
            .as_mut()
            .is_some_and(TlsSession::has_buffered_plaintext)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("peer", &self.peer)
            .field("tls", &self.tls)
            .field("streams", &self.streams.len())
            .field("last_stream_id", &self.last_stream_id)
            .field("queued_bytes", &self.queued_bytes)
            .finish()
    }
}

/// Snapshot the reactor needs before it waits on a session.
pub(crate) struct PollState {
    pub waker: Rc<Notify>,
    pub write_interest: bool,
    pub buffered_input: bool,
}

impl Server {
    /// Register an accepted connection. With a TLS context installed the
    /// session gets its own TLS state, tagged with the slot it lives in.
    pub fn open_session(
        &mut self,
        socket: Rc<dyn Socket>,
        peer: SocketAddr,
    ) -> Result<SessionHandle, SessionError> {
        let tls = self.tls.clone();
        let handle = self
            .sessions
            .try_insert_with(|handle| {
                let tls = match tls {
                    Some(config) => Some(TlsSession::new(
                        config,
                        format!("sbi-h2-server:{}", handle.index()),
                    )?),
                    None => None,
                };
                Ok::<_, SessionError>(Session::new(handle, socket, peer, tls))
            })
            .ok_or(SessionError::PoolExhausted)??;

        debug!(peer = %peer, sessions = self.sessions.len(), "Session added");
        Ok(handle)
    }

    /// Advance the TLS handshake, if the session has one.
    pub fn session_handshake(&mut self, handle: SessionHandle) -> Result<Handshake, SessionError> {
        let session = self.sessions.get_mut(handle).ok_or(SessionError::Stale)?;
        match &mut session.tls {
            Some(tls) => {
                let step = tls.handshake(&*session.socket)?;
                if step == Handshake::Complete && tls.alpn_protocol() != Some(crate::tls::ALPN_H2) {
                    warn!(peer = %session.peer, "Client did not negotiate h2 over ALPN");
                }
                Ok(step)
            }
            None => Ok(Handshake::Complete),
        }
    }

    /// Queue the server connection preface.
    pub fn session_start(&mut self, handle: SessionHandle) -> Result<(), SessionError> {
        let max_streams = self.streams.capacity() as u32;
        let session = self.sessions.get_mut(handle).ok_or(SessionError::Stale)?;
        session
            .engine
            .submit_settings(&[(settings_id::MAX_CONCURRENT_STREAMS, max_streams)]);
        self.session_send(handle)
    }

    /// Move everything the engine has produced into the write queue, then
    /// dispatch the stream closes the send side reported.
    pub(crate) fn session_send(&mut self, handle: SessionHandle) -> Result<(), SessionError> {
        let limit = self.config.max_write_queue_bytes;
        let session = self.sessions.get_mut(handle).ok_or(SessionError::Stale)?;
        while let Some(chunk) = session.engine.mem_send() {
            if let Err(e) = session.enqueue(chunk.clone(), limit) {
                session.engine.unsend(chunk);
                return Err(e);
            }
        }
        let closed = session.engine.take_closed();
        if !closed.is_empty() {
            self.dispatch_frame_events(handle, closed)?;
        }
        Ok(())
    }

    /// Read readiness. Any error closes the session.
    pub fn on_readable(&mut self, handle: SessionHandle) {
        if let Err(e) = self.read_session(handle) {
            self.fail_session(handle, e);
        }
    }

    fn read_session(&mut self, handle: SessionHandle) -> Result<(), SessionError> {
        let mut buf = std::mem::take(&mut self.read_buf);
        let result = self.read_and_feed(handle, &mut buf);
        self.read_buf = buf;
        let events = match result? {
            Some(events) => events,
            None => return Ok(()),
        };

        self.dispatch_frame_events(handle, events)?;

        let Some(session) = self.sessions.get_mut(handle) else {
            return Ok(());
        };
        if session.tls_wants_write() {
            session.register_write();
        }
        if session.engine.want_write() {
            self.session_send(handle)?;
        }
        Ok(())
    }

    /// `Ok(None)` when the read would block.
    fn read_and_feed(
        &mut self,
        handle: SessionHandle,
        buf: &mut [u8],
    ) -> Result<Option<Vec<FrameEvent>>, SessionError> {
        let session = self.sessions.get_mut(handle).ok_or(SessionError::Stale)?;
        let n = match session.read(buf) {
            Ok(0) => return Err(SessionError::PeerClosed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match session.engine.recv(&buf[..n]) {
            Ok(events) => Ok(Some(events)),
            Err(e) => {
                warn!(peer = %session.peer, error = %e, "Connection error, sending GOAWAY");
                let last = session.engine.last_peer_stream_id();
                session.engine.submit_goaway(last, e.error_code());
                // The session is going away; the notice is queued past the limit
                while let Some(chunk) = session.engine.mem_send() {
                    session.enqueue_unbounded(chunk);
                }
                session.drain_best_effort();
                Err(e.into())
            }
        }
    }

    /// Write readiness: flush one queued buffer, and drop write interest
    /// once nothing is left.
    pub fn on_writable(&mut self, handle: SessionHandle) {
        let Some(session) = self.sessions.get_mut(handle) else {
            return;
        };
        if let Err(e) = session.write_once() {
            self.fail_session(handle, e.into());
            return;
        }
        if session.write_queue.is_empty() && !session.tls_wants_write() {
            session.write_interest = false;
        }
    }

    pub(crate) fn fail_session(&mut self, handle: SessionHandle, error: SessionError) {
        let Some(session) = self.sessions.get(handle) else {
            return;
        };
        if error.is_peer_reset() {
            debug!(peer = %session.peer, error = %error, "Peer closed the connection");
        } else {
            error!(peer = %session.peer, error = %error, "Session failed");
        }
        self.close_session(handle);
    }

    /// Tear a session down: free its streams and TLS state, empty the write
    /// queue and wake its task so the socket is dropped.
    pub fn close_session(&mut self, handle: SessionHandle) {
        let Some(mut session) = self.sessions.remove(handle) else {
            error!(session = ?handle, "Session already closed");
            return;
        };
        for (_, stream) in session.streams.drain() {
            self.streams.remove(stream);
        }
        session.tls = None;
        session.write_queue.clear();
        session.queued_bytes = 0;
        session.write_interest = false;
        session.waker.notify_one();
        debug!(
            peer = %session.peer,
            sessions = self.sessions.len(),
            "Session removed"
        );
    }

    pub fn close_all(&mut self) {
        for handle in self.sessions.handles() {
            self.close_session(handle);
        }
    }

    pub(crate) fn session_goaway(&mut self, handle: SessionHandle) {
        let Some(session) = self.sessions.get_mut(handle) else {
            return;
        };
        let last_stream_id = session.last_stream_id;
        session
            .engine
            .submit_goaway(last_stream_id, error_code::NO_ERROR);
        debug!(peer = %session.peer, last_stream_id, "GOAWAY sent");
        if let Err(e) = self.session_send(handle) {
            error!(error = %e, "Failed to queue GOAWAY, closing session");
            if self.sessions.contains(handle) {
                self.close_session(handle);
            }
        }
    }

    pub(crate) fn poll_state(&mut self, handle: SessionHandle) -> Option<PollState> {
        let session = self.sessions.get_mut(handle)?;
        Some(PollState {
            waker: session.waker.clone(),
            write_interest: session.write_interest,
            buffered_input: session.has_buffered_input(),
        })
    }
}
