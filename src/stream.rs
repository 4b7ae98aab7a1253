//! Per-stream request assembly and the stream manager.

use tracing::{debug, error};

use crate::engine::StreamState;
use crate::error::{SessionError, StreamError};
use crate::query;
use crate::request::Request;
use crate::server::{Server, SessionHandle, StreamHandle};

/// One client-initiated stream and the request being built on it.
#[derive(Debug)]
pub struct Stream {
    handle: StreamHandle,
    session: SessionHandle,
    stream_id: u32,
    pub(crate) request: Request,
    /// Body exceeded the limit; the request will be dropped
    pub(crate) overflow: bool,
    pub(crate) continue_sent: bool,
}

impl Stream {
    fn new(handle: StreamHandle, session: SessionHandle, stream_id: u32) -> Self {
        Self {
            handle,
            session,
            stream_id,
            request: Request::default(),
            overflow: false,
            continue_sent: false,
        }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn session(&self) -> SessionHandle {
        self.session
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// The request as assembled so far. Empty once it was handed to the
    /// application.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_overflow(&self) -> bool {
        self.overflow
    }
}

impl Server {
    /// Open a stream for a new request header block. Stream ids must grow
    /// strictly within a session; a lower or repeated id is a session error.
    pub(crate) fn stream_open(
        &mut self,
        session: SessionHandle,
        stream_id: u32,
    ) -> Result<StreamHandle, StreamError> {
        let entry = self
            .sessions
            .get_mut(session)
            .ok_or(StreamError::Session(SessionError::Stale))?;
        if stream_id <= entry.last_stream_id {
            return Err(SessionError::StreamOrder {
                stream_id,
                last_stream_id: entry.last_stream_id,
            }
            .into());
        }
        entry.last_stream_id = stream_id;

        let handle = self
            .streams
            .insert_with(|handle| Stream::new(handle, session, stream_id))
            .ok_or(StreamError::PoolExhausted)?;
        entry.streams.insert(stream_id, handle);

        debug!(
            peer = %entry.peer(),
            stream_id,
            streams = self.streams.len(),
            "Stream added"
        );
        Ok(handle)
    }

    /// Free a stream and unlink it from its session. A stale handle is a no-op.
    pub(crate) fn stream_close(&mut self, handle: StreamHandle) {
        let Some(stream) = self.streams.remove(handle) else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(stream.session) {
            session.streams.remove(&stream.stream_id);
        }
        debug!(stream_id = stream.stream_id, streams = self.streams.len(), "Stream removed");
    }

    pub fn stream(&self, handle: StreamHandle) -> Option<&Stream> {
        self.streams.get(handle)
    }

    /// Look a stream up by its HTTP/2 id within a session.
    pub fn stream_find(&self, session: SessionHandle, stream_id: u32) -> Option<StreamHandle> {
        self.sessions.get(session)?.stream(stream_id)
    }

    /// Protocol state of the stream, as the framing engine sees it.
    pub fn stream_state(&self, handle: StreamHandle) -> Option<StreamState> {
        let stream = self.streams.get(handle)?;
        let session = self.sessions.get(stream.session)?;
        Some(session.engine.stream_state(stream.stream_id))
    }

    /// Append a DATA chunk to the request body. Past `max_body_size`, or when
    /// memory cannot be reserved, the stream is flagged as overflowed and
    /// later chunks are ignored.
    pub(crate) fn stream_append_body(&mut self, handle: StreamHandle, data: &[u8]) {
        let limit = self.config.max_body_size;
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        if stream.overflow || data.is_empty() {
            return;
        }

        let body = &mut stream.request.body;
        let within_limit = body.len() + data.len() <= limit;
        if !within_limit || body.try_reserve_exact(data.len()).is_err() {
            error!(
                stream_id = stream.stream_id,
                size = body.len(),
                chunk = data.len(),
                limit,
                "Request body overflow"
            );
            stream.overflow = true;
            return;
        }
        body.extend_from_slice(data);
    }

    /// Record one decoded header field on the request.
    ///
    /// `:path` is split into path and query parameters, `:method` is kept
    /// as is, and every other field lands in the header map. Empty values
    /// are ignored.
    pub(crate) fn stream_set_header(
        &mut self,
        handle: StreamHandle,
        name: &str,
        value: &str,
    ) -> Result<(), StreamError> {
        if value.is_empty() {
            return Ok(());
        }
        let stream = self.streams.get_mut(handle).ok_or(StreamError::Stale)?;
        let request = &mut stream.request;

        match name {
            ":path" => {
                if request.path.is_some() {
                    return Err(StreamError::DuplicatePseudoHeader(name.to_string()));
                }
                let decomposed = query::decompose(value)?;
                request.path = Some(decomposed.path);
                request.params = decomposed.params;
            }
            ":method" => {
                if request.method.is_some() {
                    return Err(StreamError::DuplicatePseudoHeader(name.to_string()));
                }
                request.method = Some(value.to_string());
            }
            _ => {
                request.headers.insert(name, value);
            }
        }
        Ok(())
    }
}
