//! Per-connection HTTP/2 framing engine.
//!
//! Owns the frame codec, both HPACK contexts and the protocol state of every
//! stream on one connection. Bytes go in through [`FrameEngine::recv`], which
//! returns a flat list of [`FrameEvent`]s for the session layer to dispatch.
//! Outbound frames are produced as [`Bytes`] chunks by
//! [`FrameEngine::mem_send`].
//!
//! Response bodies are never copied. A submitted body is held here and sliced
//! into DATA frame payloads as the peer's flow-control windows allow.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use crate::error::EngineError;
use crate::h2_codec::{
    error_code, frame_type, settings_id, H2Codec, H2Event, DEFAULT_MAX_FRAME_SIZE,
    MAX_ALLOWED_FRAME_SIZE,
};
use crate::hpack::{H2Header, HpackDecoder, HpackEncoder};

/// Initial flow-control window for connections and streams (RFC 7540 Section 6.9.2).
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Pseudo-headers a request header block may carry.
const REQUEST_PSEUDO_HEADERS: [&str; 4] = [":method", ":path", ":scheme", ":authority"];

/// Protocol state of one stream, server side.
///
/// ```text
///   Idle --HEADERS--> Open --END_STREAM recv--> HalfClosedRemote
///                       \                            |
///                        \--RST / END_STREAM sent--> Closed <--+
/// ```
///
/// When the final frame of the response goes out while the stream is still
/// `Open`, the engine resets it with NO_ERROR instead of leaving it half open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
    Closed,
}

/// Decoded protocol events, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A HEADERS frame is about to be processed.
    BeginFrame { frame_type: u8, stream_id: u32 },
    /// The peer opened a new stream with a request header block.
    BeginHeaders { stream_id: u32 },
    /// One validated field of a request header block.
    Header { stream_id: u32, name: String, value: String },
    /// A header block finished. `initial` is false for trailers.
    HeadersComplete { stream_id: u32, initial: bool },
    DataChunk { stream_id: u32, data: Bytes },
    /// The peer half-closed the stream; the request is complete.
    EndOfStream { stream_id: u32 },
    /// Peer SETTINGS. The values are only present when the frame carried them.
    Settings {
        ack: bool,
        max_concurrent_streams: Option<u32>,
        enable_push: Option<bool>,
    },
    GoAway { last_stream_id: u32, error_code: u32 },
    Reset { stream_id: u32, error_code: u32 },
    Ping { ack: bool },
    PushPromise { stream_id: u32, promised_stream_id: u32 },
    /// The stream is gone, for whatever reason. Emitted exactly once per opened stream.
    StreamClose { stream_id: u32, error_code: u32 },
    /// A frame broke stream-level rules. The stream (if any) has been reset.
    InvalidFrame { stream_id: u32, error_code: u32, reason: String },
    /// A header field was malformed and has been dropped.
    InvalidHeader { stream_id: u32, name: String, value: String },
}

/// Settings the peer has advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSettings {
    pub max_concurrent_streams: Option<u32>,
    pub enable_push: bool,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: None,
            enable_push: true,
            initial_window_size: DEFAULT_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug)]
struct PendingBody {
    data: Bytes,
    offset: usize,
}

#[derive(Debug)]
struct StreamEntry {
    state: StreamState,
    send_window: i64,
    recv_unacked: u32,
    /// A final (non-1xx) response has been submitted
    response_started: bool,
    body: Option<PendingBody>,
}

impl StreamEntry {
    fn new(initial_window_size: u32) -> Self {
        Self {
            state: StreamState::Open,
            send_window: i64::from(initial_window_size),
            recv_unacked: 0,
            response_started: false,
            body: None,
        }
    }
}

/// Server-side HTTP/2 engine for one connection.
#[derive(Debug)]
pub struct FrameEngine {
    codec: H2Codec,
    decoder: HpackDecoder,
    encoder: HpackEncoder,
    streams: HashMap<u32, StreamEntry>,
    last_peer_stream_id: u32,
    peer: PeerSettings,
    send_window: i64,
    recv_unacked: u32,
    outbound: VecDeque<Bytes>,
    /// Streams with body bytes waiting for window
    data_queue: VecDeque<u32>,
    /// StreamClose events produced by the send side
    closed: Vec<FrameEvent>,
    goaway_last_stream_id: Option<u32>,
}

impl Default for FrameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEngine {
    pub fn new() -> Self {
        Self {
            codec: H2Codec::new(),
            decoder: HpackDecoder::new(),
            encoder: HpackEncoder::new(),
            streams: HashMap::new(),
            last_peer_stream_id: 0,
            peer: PeerSettings::default(),
            send_window: i64::from(DEFAULT_WINDOW_SIZE),
            recv_unacked: 0,
            outbound: VecDeque::new(),
            data_queue: VecDeque::new(),
            closed: Vec::new(),
            goaway_last_stream_id: None,
        }
    }

    pub fn peer_settings(&self) -> &PeerSettings {
        &self.peer
    }

    /// Highest stream id the peer has opened.
    pub fn last_peer_stream_id(&self) -> u32 {
        self.last_peer_stream_id
    }

    pub fn stream_state(&self, stream_id: u32) -> StreamState {
        match self.streams.get(&stream_id) {
            Some(entry) => entry.state,
            None if stream_id != 0 && stream_id <= self.last_peer_stream_id => StreamState::Closed,
            None => StreamState::Idle,
        }
    }

    /// Number of streams not yet closed.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    // ------------------------------------------------------------------
    // Receive side
    // ------------------------------------------------------------------

    /// Feed bytes read from the connection.
    ///
    /// An `Err` is a connection error; the caller should send GOAWAY with
    /// [`EngineError::error_code`] and tear the session down.
    pub fn recv(&mut self, data: &[u8]) -> Result<Vec<FrameEvent>, EngineError> {
        let frames = self.codec.process(data)?;
        let mut events = Vec::with_capacity(frames.len());
        for frame in frames {
            self.on_frame(frame, &mut events)?;
        }
        Ok(events)
    }

    fn on_frame(
        &mut self,
        frame: H2Event,
        events: &mut Vec<FrameEvent>,
    ) -> Result<(), EngineError> {
        match frame {
            H2Event::Headers { stream_id, header_block, end_stream } => {
                self.on_headers(stream_id, &header_block, end_stream, events)
            }
            H2Event::Data { stream_id, data, end_stream, flow_controlled_len } => {
                self.on_data(stream_id, data, end_stream, flow_controlled_len, events)
            }
            H2Event::StreamReset { stream_id, error_code } => {
                if stream_id == 0 {
                    return Err(EngineError::Protocol("RST_STREAM on stream 0".into()));
                }
                if self.stream_state(stream_id) == StreamState::Idle {
                    return Err(EngineError::Protocol(format!(
                        "RST_STREAM on idle stream {stream_id}"
                    )));
                }
                events.push(FrameEvent::Reset { stream_id, error_code });
                if self.streams.remove(&stream_id).is_some() {
                    self.data_queue.retain(|id| *id != stream_id);
                    events.push(FrameEvent::StreamClose { stream_id, error_code });
                }
                Ok(())
            }
            H2Event::Settings { ack, settings } => self.on_settings(ack, settings, events),
            H2Event::GoAway { last_stream_id, error_code } => {
                events.push(FrameEvent::GoAway { last_stream_id, error_code });
                Ok(())
            }
            H2Event::WindowUpdate { stream_id, increment } => {
                self.on_window_update(stream_id, increment, events)
            }
            H2Event::Ping { ack, data } => {
                if !ack {
                    self.queue(H2Codec::create_ping_ack(data));
                }
                events.push(FrameEvent::Ping { ack });
                Ok(())
            }
            H2Event::PushPromise { stream_id, promised_stream_id } => {
                events.push(FrameEvent::PushPromise { stream_id, promised_stream_id });
                Ok(())
            }
        }
    }

    fn on_headers(
        &mut self,
        stream_id: u32,
        header_block: &[u8],
        end_stream: bool,
        events: &mut Vec<FrameEvent>,
    ) -> Result<(), EngineError> {
        if stream_id == 0 {
            return Err(EngineError::Protocol("HEADERS on stream 0".into()));
        }
        events.push(FrameEvent::BeginFrame {
            frame_type: frame_type::HEADERS,
            stream_id,
        });

        // Decode even if the stream is rejected below; the dynamic table must stay in sync.
        let headers = self.decoder.decode(header_block)?;

        match self.stream_state(stream_id) {
            StreamState::Idle => {
                self.open_stream(stream_id, headers, end_stream, events);
            }
            StreamState::Open if end_stream => {
                // Trailers: accepted, fields ignored
                events.push(FrameEvent::HeadersComplete { stream_id, initial: false });
                self.end_remote(stream_id, events);
            }
            StreamState::Open => {
                self.invalid_frame(
                    stream_id,
                    error_code::PROTOCOL_ERROR,
                    "second header block without END_STREAM",
                    events,
                );
            }
            StreamState::HalfClosedRemote | StreamState::Closed => {
                self.invalid_frame(
                    stream_id,
                    error_code::STREAM_CLOSED,
                    "HEADERS on closed stream",
                    events,
                );
            }
        }
        Ok(())
    }

    fn open_stream(
        &mut self,
        stream_id: u32,
        headers: Vec<H2Header>,
        end_stream: bool,
        events: &mut Vec<FrameEvent>,
    ) {
        if stream_id % 2 == 0 {
            self.invalid_frame(
                stream_id,
                error_code::PROTOCOL_ERROR,
                "client opened an even stream id",
                events,
            );
            return;
        }
        self.last_peer_stream_id = stream_id;

        if self.goaway_last_stream_id.is_some_and(|last| stream_id > last) {
            tracing::debug!(stream_id, "Refusing stream opened after GOAWAY");
            self.queue(H2Codec::create_rst_stream(stream_id, error_code::REFUSED_STREAM));
            return;
        }

        self.streams
            .insert(stream_id, StreamEntry::new(self.peer.initial_window_size));
        events.push(FrameEvent::BeginHeaders { stream_id });

        let mut pseudo_seen: Vec<String> = Vec::with_capacity(REQUEST_PSEUDO_HEADERS.len());
        let mut regular_seen = false;
        for header in headers {
            let malformed = header.name.is_empty()
                || header.name.bytes().any(|b| b.is_ascii_uppercase())
                || (header.is_pseudo()
                    && (regular_seen
                        || !REQUEST_PSEUDO_HEADERS.contains(&header.name.as_str())
                        || pseudo_seen.contains(&header.name)));
            if malformed {
                events.push(FrameEvent::InvalidHeader {
                    stream_id,
                    name: header.name,
                    value: header.value,
                });
                continue;
            }
            if header.is_pseudo() {
                pseudo_seen.push(header.name.clone());
            } else {
                regular_seen = true;
            }
            events.push(FrameEvent::Header {
                stream_id,
                name: header.name,
                value: header.value,
            });
        }

        let has = |name: &str| pseudo_seen.iter().any(|seen| seen == name);
        if !has(":method") || !has(":path") {
            self.invalid_frame(
                stream_id,
                error_code::PROTOCOL_ERROR,
                "request without :method or :path",
                events,
            );
            return;
        }

        events.push(FrameEvent::HeadersComplete { stream_id, initial: true });
        if end_stream {
            self.end_remote(stream_id, events);
        }
    }

    fn on_data(
        &mut self,
        stream_id: u32,
        data: Vec<u8>,
        end_stream: bool,
        flow_controlled_len: u32,
        events: &mut Vec<FrameEvent>,
    ) -> Result<(), EngineError> {
        if stream_id == 0 {
            return Err(EngineError::Protocol("DATA on stream 0".into()));
        }

        self.recv_unacked += flow_controlled_len;
        if self.recv_unacked >= DEFAULT_WINDOW_SIZE / 2 {
            let increment = std::mem::take(&mut self.recv_unacked);
            self.queue(H2Codec::create_window_update(0, increment));
        }

        let state = self.stream_state(stream_id);
        match state {
            StreamState::Open => {
                let mut stream_increment = 0;
                if let Some(entry) = self.streams.get_mut(&stream_id) {
                    entry.recv_unacked += flow_controlled_len;
                    if !end_stream && entry.recv_unacked >= DEFAULT_WINDOW_SIZE / 2 {
                        stream_increment = std::mem::take(&mut entry.recv_unacked);
                    }
                }
                if stream_increment > 0 {
                    self.queue(H2Codec::create_window_update(stream_id, stream_increment));
                }
                if !data.is_empty() {
                    events.push(FrameEvent::DataChunk {
                        stream_id,
                        data: Bytes::from(data),
                    });
                }
                if end_stream {
                    self.end_remote(stream_id, events);
                }
            }
            StreamState::HalfClosedRemote => {
                self.invalid_frame(
                    stream_id,
                    error_code::STREAM_CLOSED,
                    "DATA after END_STREAM",
                    events,
                );
            }
            StreamState::Closed => {
                // Frames already in flight when we reset the stream
                tracing::debug!(
                    stream_id,
                    len = flow_controlled_len,
                    "Ignoring DATA on closed stream"
                );
            }
            StreamState::Idle => {
                return Err(EngineError::Protocol(format!("DATA on idle stream {stream_id}")));
            }
        }
        Ok(())
    }

    fn on_settings(
        &mut self,
        ack: bool,
        settings: Vec<(u16, u32)>,
        events: &mut Vec<FrameEvent>,
    ) -> Result<(), EngineError> {
        if ack {
            events.push(FrameEvent::Settings {
                ack: true,
                max_concurrent_streams: None,
                enable_push: None,
            });
            return Ok(());
        }

        let mut max_concurrent_streams = None;
        let mut enable_push = None;
        for (id, value) in settings {
            match id {
                settings_id::ENABLE_PUSH => {
                    if value > 1 {
                        return Err(EngineError::Protocol(format!(
                            "SETTINGS_ENABLE_PUSH = {value}"
                        )));
                    }
                    self.peer.enable_push = value == 1;
                    enable_push = Some(value == 1);
                }
                settings_id::MAX_CONCURRENT_STREAMS => {
                    self.peer.max_concurrent_streams = Some(value);
                    max_concurrent_streams = Some(value);
                }
                settings_id::INITIAL_WINDOW_SIZE => {
                    if i64::from(value) > MAX_WINDOW_SIZE {
                        return Err(EngineError::FlowControl(format!(
                            "SETTINGS_INITIAL_WINDOW_SIZE = {value}"
                        )));
                    }
                    let delta = i64::from(value) - i64::from(self.peer.initial_window_size);
                    for entry in self.streams.values_mut() {
                        entry.send_window += delta;
                        if entry.send_window > MAX_WINDOW_SIZE {
                            return Err(EngineError::FlowControl("stream window overflow".into()));
                        }
                    }
                    self.peer.initial_window_size = value;
                }
                settings_id::MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_ALLOWED_FRAME_SIZE).contains(&value) {
                        return Err(EngineError::Protocol(format!(
                            "SETTINGS_MAX_FRAME_SIZE = {value}"
                        )));
                    }
                    self.peer.max_frame_size = value;
                }
                // HEADER_TABLE_SIZE, MAX_HEADER_LIST_SIZE and unknown ids
                _ => {}
            }
        }

        self.queue(H2Codec::create_settings_ack());
        events.push(FrameEvent::Settings {
            ack: false,
            max_concurrent_streams,
            enable_push,
        });
        Ok(())
    }

    fn on_window_update(
        &mut self,
        stream_id: u32,
        increment: u32,
        events: &mut Vec<FrameEvent>,
    ) -> Result<(), EngineError> {
        if stream_id == 0 {
            if increment == 0 {
                return Err(EngineError::Protocol("WINDOW_UPDATE with zero increment".into()));
            }
            self.send_window += i64::from(increment);
            if self.send_window > MAX_WINDOW_SIZE {
                return Err(EngineError::FlowControl("connection window overflow".into()));
            }
            return Ok(());
        }

        if increment == 0 {
            self.invalid_frame(
                stream_id,
                error_code::PROTOCOL_ERROR,
                "WINDOW_UPDATE with zero increment",
                events,
            );
            return Ok(());
        }
        let overflow = match self.streams.get_mut(&stream_id) {
            Some(entry) => {
                entry.send_window += i64::from(increment);
                entry.send_window > MAX_WINDOW_SIZE
            }
            None => false,
        };
        if overflow {
            self.invalid_frame(
                stream_id,
                error_code::FLOW_CONTROL_ERROR,
                "stream window overflow",
                events,
            );
        }
        Ok(())
    }

    fn end_remote(&mut self, stream_id: u32, events: &mut Vec<FrameEvent>) {
        if let Some(entry) = self.streams.get_mut(&stream_id) {
            entry.state = StreamState::HalfClosedRemote;
            events.push(FrameEvent::EndOfStream { stream_id });
        }
    }

    /// Report a stream error and reset the stream.
    fn invalid_frame(
        &mut self,
        stream_id: u32,
        code: u32,
        reason: &str,
        events: &mut Vec<FrameEvent>,
    ) {
        events.push(FrameEvent::InvalidFrame {
            stream_id,
            error_code: code,
            reason: reason.to_string(),
        });
        self.queue(H2Codec::create_rst_stream(stream_id, code));
        if self.streams.remove(&stream_id).is_some() {
            self.data_queue.retain(|id| *id != stream_id);
            events.push(FrameEvent::StreamClose { stream_id, error_code: code });
        }
    }

    // ------------------------------------------------------------------
    // Send side
    // ------------------------------------------------------------------

    pub fn submit_settings(&mut self, settings: &[(u16, u32)]) {
        self.queue(H2Codec::create_settings(settings));
    }

    /// Submit a header block on its own: a 1xx interim response, or a final
    /// response without a body when `end_stream` is set.
    pub fn submit_headers(
        &mut self,
        stream_id: u32,
        headers: &[H2Header],
        end_stream: bool,
    ) -> Result<(), EngineError> {
        let informational = headers
            .first()
            .is_some_and(|h| h.name == ":status" && h.value.starts_with('1'));
        let entry = self.writable_stream(stream_id)?;
        if !informational {
            entry.response_started = true;
        }
        self.write_header_block(stream_id, headers, end_stream && !informational);
        if end_stream && !informational {
            self.end_local(stream_id);
        }
        Ok(())
    }

    /// Submit a final response. The body is emitted as DATA frames as flow
    /// control allows, the last one carrying END_STREAM.
    pub fn submit_response(
        &mut self,
        stream_id: u32,
        headers: &[H2Header],
        body: Option<Bytes>,
    ) -> Result<(), EngineError> {
        let body = body.filter(|data| !data.is_empty());
        let entry = self.writable_stream(stream_id)?;
        entry.response_started = true;
        match body {
            None => {
                self.write_header_block(stream_id, headers, true);
                self.end_local(stream_id);
            }
            Some(data) => {
                entry.body = Some(PendingBody { data, offset: 0 });
                self.write_header_block(stream_id, headers, false);
                self.data_queue.push_back(stream_id);
            }
        }
        Ok(())
    }

    /// Reset a stream. Ignored for streams that are already closed.
    pub fn submit_rst_stream(&mut self, stream_id: u32, code: u32) {
        if self.streams.remove(&stream_id).is_none() {
            tracing::trace!(stream_id, "RST_STREAM for closed stream dropped");
            return;
        }
        self.data_queue.retain(|id| *id != stream_id);
        self.queue(H2Codec::create_rst_stream(stream_id, code));
        self.closed.push(FrameEvent::StreamClose {
            stream_id,
            error_code: code,
        });
    }

    /// Announce connection shutdown. Streams above `last_stream_id` that the
    /// peer opens from now on are refused.
    pub fn submit_goaway(&mut self, last_stream_id: u32, code: u32) {
        self.goaway_last_stream_id = Some(
            self.goaway_last_stream_id
                .map_or(last_stream_id, |previous| previous.min(last_stream_id)),
        );
        self.queue(H2Codec::create_goaway(last_stream_id, code));
    }

    /// True when [`mem_send`](Self::mem_send) has something to hand out.
    pub fn want_write(&self) -> bool {
        !self.outbound.is_empty()
            || (self.send_window > 0
                && self.data_queue.iter().any(|id| {
                    self.streams
                        .get(id)
                        .is_some_and(|entry| entry.send_window > 0)
                }))
    }

    /// Next outbound chunk. DATA payloads are slices of the response body.
    pub fn mem_send(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            self.flush_data();
        }
        self.outbound.pop_front()
    }

    /// Put back a chunk taken by [`mem_send`](Self::mem_send) that could not
    /// be written. It is handed out again first.
    pub fn unsend(&mut self, chunk: Bytes) {
        self.outbound.push_front(chunk);
    }

    /// StreamClose events for streams the send side finished or reset.
    pub fn take_closed(&mut self) -> Vec<FrameEvent> {
        std::mem::take(&mut self.closed)
    }

    fn queue(&mut self, frame: Vec<u8>) {
        self.outbound.push_back(Bytes::from(frame));
    }

    fn writable_stream(&mut self, stream_id: u32) -> Result<&mut StreamEntry, EngineError> {
        match self.streams.get_mut(&stream_id) {
            Some(entry) if !entry.response_started => Ok(entry),
            _ => Err(EngineError::StreamNotWritable(stream_id)),
        }
    }

    fn write_header_block(&mut self, stream_id: u32, headers: &[H2Header], end_stream: bool) {
        let block = self.encoder.encode(headers);
        let max = self.peer.max_frame_size as usize;
        if block.len() <= max {
            self.queue(H2Codec::create_headers_frame(stream_id, &block, end_stream, true));
            return;
        }

        let (first, mut rest) = block.split_at(max);
        self.queue(H2Codec::create_headers_frame(stream_id, first, end_stream, false));
        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(rest.len().min(max));
            self.queue(H2Codec::create_continuation_frame(stream_id, chunk, tail.is_empty()));
            rest = tail;
        }
    }

    /// Our side sent END_STREAM.
    fn end_local(&mut self, stream_id: u32) {
        let Some(entry) = self.streams.remove(&stream_id) else {
            return;
        };
        if entry.state == StreamState::Open {
            // The peer never half-closed; reset instead of leaving the stream dangling
            self.queue(H2Codec::create_rst_stream(stream_id, error_code::NO_ERROR));
        }
        self.closed.push(FrameEvent::StreamClose {
            stream_id,
            error_code: error_code::NO_ERROR,
        });
    }

    /// Move as much pending body data into DATA frames as the windows allow.
    /// Streams take turns, one frame each.
    fn flush_data(&mut self) {
        let mut blocked = 0;
        while self.send_window > 0 && blocked < self.data_queue.len() {
            let Some(stream_id) = self.data_queue.pop_front() else {
                break;
            };
            let max_frame = i64::from(self.peer.max_frame_size);
            let Some(entry) = self.streams.get_mut(&stream_id) else {
                continue;
            };
            let Some(body) = entry.body.as_mut() else {
                continue;
            };

            let remaining = (body.data.len() - body.offset) as i64;
            let len = remaining
                .min(entry.send_window)
                .min(self.send_window)
                .min(max_frame);
            if len <= 0 {
                self.data_queue.push_back(stream_id);
                blocked += 1;
                continue;
            }

            let len = len as usize;
            let payload = body.data.slice(body.offset..body.offset + len);
            body.offset += len;
            let end_stream = body.offset == body.data.len();
            if end_stream {
                entry.body = None;
            }
            entry.send_window -= len as i64;
            self.send_window -= len as i64;

            let header = H2Codec::create_data_frame_header(stream_id, len as u32, end_stream);
            self.outbound.push_back(Bytes::copy_from_slice(&header));
            self.outbound.push_back(payload);
            blocked = 0;

            if end_stream {
                self.end_local(stream_id);
            } else {
                self.data_queue.push_back(stream_id);
            }
        }
    }
}
