//! Reactions to the events the framing engine decodes.
//!
//! Events are dispatched in wire order. Once a handler closes the session the
//! rest of the batch is discarded.

use tracing::{debug, error, info, warn};

use crate::engine::FrameEvent;
use crate::error::{SessionError, StreamError};
use crate::h2_codec::{error_code, frame_type};
use crate::hpack::H2Header;
use crate::request::Response;
use crate::server::{Server, SessionHandle, StreamHandle};
use crate::status::StatusCode;

impl Server {
    /// Handle a batch of engine events for one session. An `Err` is fatal
    /// for the session; the caller tears it down.
    pub(crate) fn dispatch_frame_events(
        &mut self,
        session: SessionHandle,
        events: Vec<FrameEvent>,
    ) -> Result<(), SessionError> {
        for event in events {
            if !self.sessions.contains(session) {
                break;
            }
            self.on_frame_event(session, event)?;
        }
        Ok(())
    }

    fn on_frame_event(
        &mut self,
        session: SessionHandle,
        event: FrameEvent,
    ) -> Result<(), SessionError> {
        match event {
            FrameEvent::BeginFrame {
                frame_type,
                stream_id,
            } => self.on_begin_frame(session, frame_type, stream_id)?,
            FrameEvent::BeginHeaders { stream_id } => self.on_begin_headers(session, stream_id)?,
            FrameEvent::Header {
                stream_id,
                name,
                value,
            } => self.on_header(session, stream_id, &name, &value),
            FrameEvent::HeadersComplete { stream_id, initial } => {
                if initial {
                    self.on_request_headers(session, stream_id);
                }
            }
            FrameEvent::DataChunk { stream_id, data } => {
                if let Some(stream) = self.stream_find(session, stream_id) {
                    self.stream_append_body(stream, &data);
                }
            }
            FrameEvent::EndOfStream { stream_id } => self.on_request(session, stream_id),
            FrameEvent::Settings {
                ack,
                max_concurrent_streams,
                enable_push,
            } => {
                if !ack {
                    debug!(?max_concurrent_streams, ?enable_push, "SETTINGS received");
                }
            }
            FrameEvent::GoAway {
                last_stream_id,
                error_code,
            } => {
                info!(peer = %self.peer_of(session), last_stream_id, error_code, "GOAWAY received");
            }
            FrameEvent::Reset {
                stream_id,
                error_code,
            } => {
                info!(peer = %self.peer_of(session), stream_id, error_code, "RST_STREAM received");
            }
            FrameEvent::Ping { ack } => {
                if ack {
                    info!(peer = %self.peer_of(session), "PING ack received");
                }
            }
            FrameEvent::PushPromise {
                stream_id,
                promised_stream_id,
            } => {
                info!(stream_id, promised_stream_id, "PUSH_PROMISE received");
            }
            FrameEvent::StreamClose {
                stream_id,
                error_code,
            } => self.on_stream_close(session, stream_id, error_code),
            FrameEvent::InvalidFrame {
                stream_id,
                error_code,
                reason,
            } => {
                error!(
                    peer = %self.peer_of(session),
                    stream_id,
                    error_code,
                    reason = %reason,
                    "Invalid frame"
                );
            }
            FrameEvent::InvalidHeader {
                stream_id,
                name,
                value,
            } => {
                error!(
                    peer = %self.peer_of(session),
                    stream_id,
                    name = %name,
                    value = %value,
                    "Invalid header"
                );
            }
        }
        Ok(())
    }

    fn peer_of(&self, session: SessionHandle) -> String {
        self.sessions
            .get(session)
            .map_or_else(String::new, |s| s.peer().to_string())
    }

    /// A HEADERS frame on a stream the session no longer tracks must not go
    /// below the highest id seen so far. The highest id itself may still
    /// carry trailers after the stream was reset.
    fn on_begin_frame(
        &mut self,
        session: SessionHandle,
        frame: u8,
        stream_id: u32,
    ) -> Result<(), SessionError> {
        if frame != frame_type::HEADERS {
            return Ok(());
        }
        let entry = self.sessions.get(session).ok_or(SessionError::Stale)?;
        if entry.stream(stream_id).is_none() && stream_id < entry.last_stream_id {
            error!(
                peer = %entry.peer(),
                stream_id,
                last_stream_id = entry.last_stream_id,
                "Invalid stream id"
            );
            return Err(SessionError::StreamOrder {
                stream_id,
                last_stream_id: entry.last_stream_id,
            });
        }
        Ok(())
    }

    fn on_begin_headers(
        &mut self,
        session: SessionHandle,
        stream_id: u32,
    ) -> Result<(), SessionError> {
        match self.stream_open(session, stream_id) {
            Ok(_) => Ok(()),
            Err(StreamError::PoolExhausted) => {
                warn!(
                    stream_id,
                    capacity = self.streams.capacity(),
                    "Stream pool exhausted, refusing stream"
                );
                self.reset_stream(session, stream_id, error_code::REFUSED_STREAM);
                Ok(())
            }
            Err(StreamError::Session(e)) => Err(e),
            Err(e) => {
                error!(stream_id, error = %e, "Failed to open stream");
                Ok(())
            }
        }
    }

    fn on_header(&mut self, session: SessionHandle, stream_id: u32, name: &str, value: &str) {
        let Some(stream) = self.stream_find(session, stream_id) else {
            return;
        };
        match self.stream_set_header(stream, name, value) {
            Ok(()) => {}
            Err(e @ StreamError::TooManyQueryParams(_)) => {
                error!(stream_id, error = %e, "Rejecting request");
                self.reset_stream(session, stream_id, error_code::INTERNAL_ERROR);
            }
            Err(e) => {
                error!(stream_id, error = %e, "Rejecting request");
                self.reset_stream(session, stream_id, error_code::PROTOCOL_ERROR);
            }
        }
    }

    /// First header block complete. Answers `Expect: 100-continue` once.
    fn on_request_headers(&mut self, session: SessionHandle, stream_id: u32) {
        let Some(handle) = self.stream_find(session, stream_id) else {
            return;
        };
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        let expects_continue = stream
            .request
            .headers
            .get("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
        if !expects_continue || stream.continue_sent {
            return;
        }
        stream.continue_sent = true;

        let Some(entry) = self.sessions.get_mut(session) else {
            return;
        };
        let interim = [H2Header::new(":status", StatusCode::Continue.as_str())];
        if let Err(e) = entry.engine.submit_headers(stream_id, &interim, false) {
            error!(stream_id, error = %e, "Failed to send 100 Continue");
            self.reset_stream(session, stream_id, error_code::INTERNAL_ERROR);
        }
    }

    /// The peer half-closed the stream: hand the request to the application.
    fn on_request(&mut self, session: SessionHandle, stream_id: u32) {
        let Some(handle) = self.stream_find(session, stream_id) else {
            return;
        };
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        if stream.overflow {
            error!(
                peer = %self.peer_of(session),
                stream_id,
                "Request dropped, body overflowed"
            );
            return;
        }
        let request = std::mem::take(&mut stream.request);
        debug!(
            stream_id,
            method = request.method(),
            path = request.path(),
            params = request.params.len(),
            content_length = request.content_length(),
            "Request received"
        );

        let Some(handler) = self.handler.clone() else {
            warn!(stream_id, "No request handler installed");
            return;
        };
        if let Err(e) = handler.handle(self, request, handle) {
            warn!(stream_id, error = %e, "Request handler failed");
            self.fail_request(handle, &e.to_string());
        }
    }

    fn fail_request(&mut self, stream: StreamHandle, detail: &str) {
        let response = Response::problem(StatusCode::InternalServerError, detail);
        if let Err(e) = self.send_and_free(stream, response) {
            debug!(error = %e, "Could not answer failed request");
        }
    }

    fn on_stream_close(&mut self, session: SessionHandle, stream_id: u32, code: u32) {
        if code != error_code::NO_ERROR {
            if let Some(entry) = self.sessions.get_mut(session) {
                entry.engine.submit_rst_stream(stream_id, code);
            }
        }
        if let Some(stream) = self.stream_find(session, stream_id) {
            self.stream_close(stream);
        }
    }

    /// Reset a stream and free it right away, so later events of the same
    /// batch find nothing to act on.
    pub(crate) fn reset_stream(&mut self, session: SessionHandle, stream_id: u32, code: u32) {
        if let Some(entry) = self.sessions.get_mut(session) {
            entry.engine.submit_rst_stream(stream_id, code);
        }
        if let Some(stream) = self.stream_find(session, stream_id) {
            self.stream_close(stream);
        }
    }
}
