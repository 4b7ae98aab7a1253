//! HTTP/2 frame codec for the server side of a connection.
//!
//! A sans-I/O frame parser and a set of frame builders. The parser turns raw
//! bytes into [`H2Event`]s and knows nothing about stream state; that lives in
//! the [`engine`](crate::engine). What it does enforce is framing-level
//! correctness:
//! 1. The client connection preface must arrive first and match exactly
//! 2. Frames may not exceed the local maximum frame size
//! 3. A header block split across CONTINUATION frames may not be interleaved
//! 4. Padding and priority fields are stripped from DATA/HEADERS payloads
//!
//! Reference: RFC 7540 (HTTP/2)

use thiserror::Error;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[allow(dead_code)]
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
#[allow(dead_code)]
pub mod flags {
    pub const ACK: u8 = 0x1;
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
#[allow(dead_code)]
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
#[allow(dead_code)]
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

/// Size of every frame header on the wire.
pub const FRAME_HEADER_LEN: usize = 9;

/// Initial SETTINGS_MAX_FRAME_SIZE (RFC 7540 Section 6.5.2).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Largest value a peer may advertise for SETTINGS_MAX_FRAME_SIZE.
pub const MAX_ALLOWED_FRAME_SIZE: u32 = 16_777_215;

/// Maximum accumulated header block size (256 KB).
/// Prevents unbounded memory growth from malicious/buggy CONTINUATION floods.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Framing errors. All of them are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid connection preface")]
    InvalidPreface,
    #[error("frame of {length} bytes exceeds max frame size {max}")]
    FrameTooLarge { length: u32, max: u32 },
    #[error("Header block too large ({size} bytes, max {max})")]
    HeaderBlockTooLarge { size: usize, max: usize },
    #[error("CONTINUATION for stream {got} but pending headers on stream {pending}")]
    ContinuationStreamMismatch { got: u32, pending: u32 },
    #[error("Unexpected CONTINUATION frame for stream {0}")]
    UnexpectedContinuation(u32),
    #[error("expected CONTINUATION for stream {pending}, got frame type {frame_type:#x}")]
    ExpectedContinuation { pending: u32, frame_type: u8 },
    #[error("{0} frame too short")]
    FrameTooShort(&'static str),
    #[error("PADDED {0} frame with no payload")]
    EmptyPadded(&'static str),
    #[error("Invalid padding length in {0} frame")]
    InvalidPadding(&'static str),
    #[error("PRIORITY HEADERS frame with insufficient data")]
    ShortPriority,
    #[error("SETTINGS frame length {0} is not a multiple of 6")]
    SettingsLength(usize),
}

impl CodecError {
    /// Error code to carry in the GOAWAY sent before tearing the connection down.
    pub fn error_code(&self) -> u32 {
        match self {
            CodecError::FrameTooLarge { .. }
            | CodecError::FrameTooShort(_)
            | CodecError::SettingsLength(_) => error_code::FRAME_SIZE_ERROR,
            _ => error_code::PROTOCOL_ERROR,
        }
    }
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone)]
pub struct H2FrameHeader {
    pub length: u32,      // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,   // 31 bits (high bit reserved)
}

impl H2FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFFFFFF;

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    /// Check if END_STREAM flag is set
    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    /// Check if END_HEADERS flag is set
    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    /// Check if ACK flag is set (SETTINGS and PING only)
    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
}

/// Events emitted by the codec when parsing frames
#[derive(Debug)]
pub enum H2Event {
    /// A complete header block (CONTINUATION frames already folded in)
    Headers {
        stream_id: u32,
        header_block: Vec<u8>,  // HPACK-encoded headers
        end_stream: bool,
    },
    /// Data for a stream
    Data {
        stream_id: u32,
        data: Vec<u8>,
        end_stream: bool,
        /// Full frame payload length, padding included. This is what the
        /// peer charged against its flow-control window.
        flow_controlled_len: u32,
    },
    /// Stream was reset (RST_STREAM)
    StreamReset {
        stream_id: u32,
        error_code: u32,
    },
    /// Connection-level GOAWAY
    GoAway {
        last_stream_id: u32,
        error_code: u32,
    },
    /// Settings frame (connection-level)
    Settings {
        ack: bool,
        /// Parsed settings: (identifier, value) pairs. Empty for ACK frames.
        settings: Vec<(u16, u32)>,
    },
    /// Window update
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    /// Ping (connection-level)
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    /// PUSH_PROMISE. Clients never legitimately send these.
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
    },
}

/// HTTP/2 frame parser for the server side of a connection.
#[derive(Debug)]
pub struct H2Codec {
    /// Buffer for incomplete frames
    buffer: Vec<u8>,
    /// Connection preface received (or not expected at all)
    preface_received: bool,
    /// Largest frame payload we accept
    max_frame_size: u32,
    /// Stream ID with pending header block (waiting for CONTINUATION + END_HEADERS)
    pending_headers_stream: Option<u32>,
    /// END_STREAM flag from the HEADERS frame that started the pending header block
    pending_headers_end_stream: bool,
    /// Accumulated header block data across HEADERS + CONTINUATION frames
    pending_header_block: Vec<u8>,
}

impl Default for H2Codec {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            preface_received: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            pending_headers_stream: None,
            pending_headers_end_stream: false,
            pending_header_block: Vec::new(),
        }
    }
}

impl H2Codec {
    /// Codec for the server side: the client preface must come first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec for a byte stream that carries no preface, such as the frames a
    /// server writes back to its client.
    pub fn without_preface() -> Self {
        Self {
            preface_received: true,
            ..Self::default()
        }
    }

    pub fn preface_received(&self) -> bool {
        self.preface_received
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size.clamp(DEFAULT_MAX_FRAME_SIZE, MAX_ALLOWED_FRAME_SIZE);
    }

    /// Process incoming data and return parsed events.
    ///
    /// This is the main entry point - feed raw bytes and get back events.
    /// Partial frames are buffered until the rest arrives.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<H2Event>, CodecError> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();

        if !self.preface_received {
            let seen = self.buffer.len().min(CONNECTION_PREFACE.len());
            if self.buffer[..seen] != CONNECTION_PREFACE[..seen] {
                return Err(CodecError::InvalidPreface);
            }
            if seen < CONNECTION_PREFACE.len() {
                return Ok(events);
            }
            self.buffer.drain(..CONNECTION_PREFACE.len());
            self.preface_received = true;
        }

        loop {
            let header = match H2FrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => break,
            };

            if header.length > self.max_frame_size {
                return Err(CodecError::FrameTooLarge {
                    length: header.length,
                    max: self.max_frame_size,
                });
            }

            let total_size = header.total_size();
            if self.buffer.len() < total_size {
                break;
            }

            // self.buffer keeps [..total_size], the remainder holds the next frames
            let remainder = self.buffer.split_off(total_size);
            let mut payload = std::mem::replace(&mut self.buffer, remainder);
            payload.drain(..FRAME_HEADER_LEN);

            if let Some(event) = self.parse_frame(&header, payload)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Parse a single frame and return an event if applicable
    fn parse_frame(
        &mut self,
        header: &H2FrameHeader,
        payload: Vec<u8>,
    ) -> Result<Option<H2Event>, CodecError> {
        if let Some(pending) = self.pending_headers_stream {
            if header.frame_type != frame_type::CONTINUATION {
                return Err(CodecError::ExpectedContinuation {
                    pending,
                    frame_type: header.frame_type,
                });
            }
        }

        match header.frame_type {
            frame_type::DATA => {
                let flow_controlled_len = header.length;
                let data = strip_padding("DATA", header, payload)?;
                Ok(Some(H2Event::Data {
                    stream_id: header.stream_id,
                    data,
                    end_stream: header.is_end_stream(),
                    flow_controlled_len,
                }))
            }
            frame_type::HEADERS => {
                let header_block = self.extract_headers_payload(header, payload)?;
                if header.is_end_headers() {
                    return Ok(Some(H2Event::Headers {
                        stream_id: header.stream_id,
                        header_block,
                        end_stream: header.is_end_stream(),
                    }));
                }
                if header_block.len() > MAX_HEADER_BLOCK_SIZE {
                    return Err(CodecError::HeaderBlockTooLarge {
                        size: header_block.len(),
                        max: MAX_HEADER_BLOCK_SIZE,
                    });
                }
                self.pending_headers_stream = Some(header.stream_id);
                self.pending_headers_end_stream = header.is_end_stream();
                self.pending_header_block = header_block;
                Ok(None)
            }
            frame_type::CONTINUATION => {
                let pending = self
                    .pending_headers_stream
                    .ok_or(CodecError::UnexpectedContinuation(header.stream_id))?;
                if pending != header.stream_id {
                    return Err(CodecError::ContinuationStreamMismatch {
                        got: header.stream_id,
                        pending,
                    });
                }
                let new_size = self.pending_header_block.len() + payload.len();
                if new_size > MAX_HEADER_BLOCK_SIZE {
                    self.pending_headers_stream = None;
                    self.pending_header_block.clear();
                    return Err(CodecError::HeaderBlockTooLarge {
                        size: new_size,
                        max: MAX_HEADER_BLOCK_SIZE,
                    });
                }
                self.pending_header_block.extend_from_slice(&payload);
                if !header.is_end_headers() {
                    return Ok(None);
                }
                let header_block = std::mem::take(&mut self.pending_header_block);
                let end_stream = self.pending_headers_end_stream;
                self.pending_headers_stream = None;
                self.pending_headers_end_stream = false;
                Ok(Some(H2Event::Headers {
                    stream_id: header.stream_id,
                    header_block,
                    end_stream,
                }))
            }
            frame_type::RST_STREAM => {
                if payload.len() < 4 {
                    return Err(CodecError::FrameTooShort("RST_STREAM"));
                }
                Ok(Some(H2Event::StreamReset {
                    stream_id: header.stream_id,
                    error_code: read_u32(&payload),
                }))
            }
            frame_type::SETTINGS => {
                let ack = header.is_ack();
                if payload.len() % 6 != 0 || (ack && !payload.is_empty()) {
                    return Err(CodecError::SettingsLength(payload.len()));
                }
                let settings = payload
                    .chunks_exact(6)
                    .map(|entry| (u16::from_be_bytes([entry[0], entry[1]]), read_u32(&entry[2..])))
                    .collect();
                Ok(Some(H2Event::Settings { ack, settings }))
            }
            frame_type::GOAWAY => {
                if payload.len() < 8 {
                    return Err(CodecError::FrameTooShort("GOAWAY"));
                }
                Ok(Some(H2Event::GoAway {
                    last_stream_id: read_u32(&payload) & 0x7FFFFFFF,
                    error_code: read_u32(&payload[4..]),
                }))
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() < 4 {
                    return Err(CodecError::FrameTooShort("WINDOW_UPDATE"));
                }
                Ok(Some(H2Event::WindowUpdate {
                    stream_id: header.stream_id,
                    increment: read_u32(&payload) & 0x7FFFFFFF,
                }))
            }
            frame_type::PING => {
                if payload.len() < 8 {
                    return Err(CodecError::FrameTooShort("PING"));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload[..8]);
                Ok(Some(H2Event::Ping { ack: header.is_ack(), data }))
            }
            frame_type::PUSH_PROMISE => {
                let block = strip_padding("PUSH_PROMISE", header, payload)?;
                if block.len() < 4 {
                    return Err(CodecError::FrameTooShort("PUSH_PROMISE"));
                }
                Ok(Some(H2Event::PushPromise {
                    stream_id: header.stream_id,
                    promised_stream_id: read_u32(&block) & 0x7FFFFFFF,
                }))
            }
            // PRIORITY and unknown frame types carry nothing we act on
            _ => Ok(None),
        }
    }

    /// Extract HEADERS payload, handling PADDED and PRIORITY flags.
    /// Takes ownership of the payload Vec to avoid re-copying.
    fn extract_headers_payload(
        &self,
        header: &H2FrameHeader,
        mut payload: Vec<u8>,
    ) -> Result<Vec<u8>, CodecError> {
        let mut offset = 0;
        let mut end = payload.len();

        if header.flags & flags::PADDED != 0 {
            if payload.is_empty() {
                return Err(CodecError::EmptyPadded("HEADERS"));
            }
            let pad_length = payload[0] as usize;
            offset = 1;
            if pad_length >= payload.len() - offset {
                return Err(CodecError::InvalidPadding("HEADERS"));
            }
            end = payload.len() - pad_length;
        }

        if header.flags & flags::PRIORITY != 0 {
            if end - offset < 5 {
                return Err(CodecError::ShortPriority);
            }
            offset += 5; // Skip stream dependency (4 bytes) + weight (1 byte)
        }

        if offset == 0 && end == payload.len() {
            return Ok(payload);
        }

        payload.truncate(end);
        payload.drain(..offset);
        Ok(payload)
    }

    /// Create a RST_STREAM frame
    pub fn create_rst_stream(stream_id: u32, error_code: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 4);
        write_frame_header(&mut frame, 4, frame_type::RST_STREAM, 0, stream_id);
        frame.extend_from_slice(&error_code.to_be_bytes());
        frame
    }

    /// Create a GOAWAY frame
    pub fn create_goaway(last_stream_id: u32, error_code: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 8);
        write_frame_header(&mut frame, 8, frame_type::GOAWAY, 0, 0);
        frame.extend_from_slice(&(last_stream_id & 0x7FFFFFFF).to_be_bytes());
        frame.extend_from_slice(&error_code.to_be_bytes());
        frame
    }

    /// Create a SETTINGS ACK frame
    pub fn create_settings_ack() -> Vec<u8> {
        vec![
            0, 0, 0,  // Length: 0
            frame_type::SETTINGS,
            flags::ACK,
            0, 0, 0, 0,  // Stream ID: 0
        ]
    }

    /// Create a SETTINGS frame carrying the given (identifier, value) pairs.
    /// An empty slice yields a frame that keeps every default.
    pub fn create_settings(settings: &[(u16, u32)]) -> Vec<u8> {
        let length = (settings.len() * 6) as u32;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + length as usize);
        write_frame_header(&mut frame, length, frame_type::SETTINGS, 0, 0);
        for (id, value) in settings {
            frame.extend_from_slice(&id.to_be_bytes());
            frame.extend_from_slice(&value.to_be_bytes());
        }
        frame
    }

    /// Create a PING ACK frame echoing the peer's opaque data
    pub fn create_ping_ack(data: [u8; 8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 8);
        write_frame_header(&mut frame, 8, frame_type::PING, flags::ACK, 0);
        frame.extend_from_slice(&data);
        frame
    }

    /// Create a WINDOW_UPDATE frame to replenish flow control window
    /// stream_id=0 updates connection-level window, otherwise stream-level
    pub fn create_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 4);
        write_frame_header(&mut frame, 4, frame_type::WINDOW_UPDATE, 0, stream_id);
        frame.extend_from_slice(&(increment & 0x7FFFFFFF).to_be_bytes());
        frame
    }

    /// Create a HEADERS frame carrying (part of) an encoded header block
    pub fn create_headers_frame(
        stream_id: u32,
        payload: &[u8],
        end_stream: bool,
        end_headers: bool,
    ) -> Vec<u8> {
        let mut flags_byte = 0;
        if end_stream {
            flags_byte |= flags::END_STREAM;
        }
        if end_headers {
            flags_byte |= flags::END_HEADERS;
        }
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        write_frame_header(
            &mut frame,
            payload.len() as u32,
            frame_type::HEADERS,
            flags_byte,
            stream_id,
        );
        frame.extend_from_slice(payload);
        frame
    }

    /// Create a CONTINUATION frame to continue a header block
    /// end_headers: true if this is the final frame in the header block sequence
    pub fn create_continuation_frame(stream_id: u32, payload: &[u8], end_headers: bool) -> Vec<u8> {
        let flags_byte = if end_headers { flags::END_HEADERS } else { 0 };
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        write_frame_header(
            &mut frame,
            payload.len() as u32,
            frame_type::CONTINUATION,
            flags_byte,
            stream_id,
        );
        frame.extend_from_slice(payload);
        frame
    }

    /// Create only the 9-byte header of a DATA frame. The payload is written
    /// separately so that it can stay in the caller's buffer.
    pub fn create_data_frame_header(
        stream_id: u32,
        length: u32,
        end_stream: bool,
    ) -> [u8; FRAME_HEADER_LEN] {
        let flags_byte = if end_stream { flags::END_STREAM } else { 0 };
        let id = (stream_id & 0x7FFFFFFF).to_be_bytes();
        [
            (length >> 16) as u8,
            (length >> 8) as u8,
            length as u8,
            frame_type::DATA,
            flags_byte,
            id[0], id[1], id[2], id[3],
        ]
    }
}

fn write_frame_header(buf: &mut Vec<u8>, length: u32, frame_type: u8, flags: u8, stream_id: u32) {
    buf.push((length >> 16) as u8);
    buf.push((length >> 8) as u8);
    buf.push(length as u8);
    buf.push(frame_type);
    buf.push(flags);
    buf.extend_from_slice(&(stream_id & 0x7FFFFFFF).to_be_bytes());
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Strip the PADDED prefix and trailer from a DATA or PUSH_PROMISE payload.
fn strip_padding(
    kind: &'static str,
    header: &H2FrameHeader,
    mut payload: Vec<u8>,
) -> Result<Vec<u8>, CodecError> {
    if header.flags & flags::PADDED == 0 {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(CodecError::EmptyPadded(kind));
    }
    let pad_length = payload[0] as usize;
    if pad_length >= payload.len() {
        return Err(CodecError::InvalidPadding(kind));
    }
    payload.truncate(payload.len() - pad_length);
    payload.remove(0);
    Ok(payload)
}
