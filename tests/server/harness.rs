//! In-memory socket and a minimal HTTP/2 client for driving a `Server`
//! without the network.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use sbi_h2_server::{
    H2Codec, H2Event, H2Header, HandlerError, HpackDecoder, HpackEncoder, Request, Server,
    ServerConfig, SessionHandle, Socket, StreamHandle, CONNECTION_PREFACE,
};

/// Socket double. Reads drain `inbound`; writes append to `written`, up to
/// an optional budget of bytes per test step.
#[derive(Default)]
pub struct MockSocket {
    inbound: RefCell<VecDeque<u8>>,
    written: RefCell<Vec<u8>>,
    write_budget: Cell<Option<usize>>,
    eof: Cell<bool>,
    write_calls: Cell<usize>,
}

impl MockSocket {
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.borrow_mut().extend(bytes);
    }

    pub fn close_inbound(&self) {
        self.eof.set(true);
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.written.borrow_mut())
    }

    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.write_budget.set(budget);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.get()
    }
}

impl Socket for MockSocket {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.borrow_mut();
        if inbound.is_empty() {
            return if self.eof.get() {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls.set(self.write_calls.get() + 1);
        let n = match self.write_budget.get() {
            None => buf.len(),
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => {
                let n = budget.min(buf.len());
                self.write_budget.set(Some(budget - n));
                n
            }
        };
        self.written.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Frames as the client sees them, header blocks already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Headers {
        stream_id: u32,
        headers: Vec<H2Header>,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Vec<u8>,
        end_stream: bool,
    },
    Settings {
        ack: bool,
        settings: Vec<(u16, u32)>,
    },
    GoAway {
        last_stream_id: u32,
        error_code: u32,
    },
    Reset {
        stream_id: u32,
        error_code: u32,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Ping {
        ack: bool,
    },
}

impl Frame {
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Frame::Headers { headers, .. } => headers
                .iter()
                .find(|h| h.name == name)
                .map(|h| h.value.as_str()),
            _ => None,
        }
    }
}

pub struct TestClient {
    encoder: HpackEncoder,
    decoder: HpackDecoder,
    codec: H2Codec,
}

impl Default for TestClient {
    fn default() -> Self {
        Self {
            encoder: HpackEncoder::new(),
            decoder: HpackDecoder::new(),
            codec: H2Codec::without_preface(),
        }
    }
}

impl TestClient {
    /// Client preface followed by an empty SETTINGS frame.
    pub fn preface(&self) -> Vec<u8> {
        let mut bytes = CONNECTION_PREFACE.to_vec();
        bytes.extend_from_slice(&H2Codec::create_settings(&[]));
        bytes
    }

    pub fn headers(
        &mut self,
        stream_id: u32,
        fields: &[(&str, &str)],
        end_stream: bool,
    ) -> Vec<u8> {
        let headers: Vec<H2Header> = fields
            .iter()
            .map(|(name, value)| H2Header::new(*name, *value))
            .collect();
        let block = self.encoder.encode(&headers);
        H2Codec::create_headers_frame(stream_id, &block, end_stream, true)
    }

    pub fn data(&self, stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
        let mut frame =
            H2Codec::create_data_frame_header(stream_id, data.len() as u32, end_stream).to_vec();
        frame.extend_from_slice(data);
        frame
    }

    /// A complete request: HEADERS, then DATA when there is a body.
    pub fn request(
        &mut self,
        stream_id: u32,
        method: &str,
        path: &str,
        extra: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Vec<u8> {
        let mut fields = vec![
            (":method", method),
            (":scheme", "http"),
            (":authority", "localhost"),
            (":path", path),
        ];
        fields.extend_from_slice(extra);
        let mut bytes = self.headers(stream_id, &fields, body.is_none());
        if let Some(body) = body {
            bytes.extend(self.data(stream_id, body, true));
        }
        bytes
    }

    /// Parse whatever the server wrote.
    pub fn read(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.codec
            .process(bytes)
            .unwrap()
            .into_iter()
            .map(|event| match event {
                H2Event::Headers {
                    stream_id,
                    header_block,
                    end_stream,
                } => Frame::Headers {
                    stream_id,
                    headers: self.decoder.decode(&header_block).unwrap(),
                    end_stream,
                },
                H2Event::Data {
                    stream_id,
                    data,
                    end_stream,
                    ..
                } => Frame::Data {
                    stream_id,
                    data,
                    end_stream,
                },
                H2Event::Settings { ack, settings } => Frame::Settings { ack, settings },
                H2Event::GoAway {
                    last_stream_id,
                    error_code,
                } => Frame::GoAway {
                    last_stream_id,
                    error_code,
                },
                H2Event::StreamReset {
                    stream_id,
                    error_code,
                } => Frame::Reset {
                    stream_id,
                    error_code,
                },
                H2Event::WindowUpdate {
                    stream_id,
                    increment,
                } => Frame::WindowUpdate {
                    stream_id,
                    increment,
                },
                H2Event::Ping { ack, .. } => Frame::Ping { ack },
                H2Event::PushPromise { .. } => panic!("server must not push"),
            })
            .collect()
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        max_sessions: 4,
        max_streams: 8,
        read_buffer_size: 4096,
        max_body_size: 1024,
        server_name: "sbi-test".to_string(),
        ..ServerConfig::default()
    }
}

pub type Received = Rc<RefCell<Vec<(Request, StreamHandle)>>>;

/// Handler that records every request and answers nothing.
pub fn recording_handler(
    received: Received,
) -> impl Fn(&mut Server, Request, StreamHandle) -> Result<(), HandlerError> {
    move |_server: &mut Server,
          request: Request,
          stream: StreamHandle|
          -> Result<(), HandlerError> {
        received.borrow_mut().push((request, stream));
        Ok(())
    }
}

/// One server, one session over a [`MockSocket`], one client.
pub struct Harness {
    pub server: Server,
    pub socket: Rc<MockSocket>,
    pub session: SessionHandle,
    pub client: TestClient,
}

impl Harness {
    pub fn new(config: ServerConfig) -> Self {
        let mut server = Server::new(config);
        let socket = Rc::new(MockSocket::default());
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        let session = server.open_session(socket.clone(), peer).unwrap();
        server.session_start(session).unwrap();
        Self {
            server,
            socket,
            session,
            client: TestClient::default(),
        }
    }

    /// A harness whose handler records requests.
    pub fn recording(config: ServerConfig) -> (Self, Received) {
        let received = Received::default();
        let mut harness = Self::new(config);
        harness.server.set_handler(recording_handler(received.clone()));
        (harness, received)
    }

    /// Deliver bytes to the server and run one readable event.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.socket.push_inbound(bytes);
        self.server.on_readable(self.session);
    }

    /// Handshake from the client side, discarding the server's preface.
    pub fn connect(&mut self) {
        let preface = self.client.preface();
        self.feed(&preface);
        self.exchange();
    }

    pub fn session_alive(&self) -> bool {
        self.server.session(self.session).is_some()
    }

    pub fn write_interest(&self) -> bool {
        self.server
            .session(self.session)
            .is_some_and(|s| s.write_interest())
    }

    /// Run writable events until the server stops asking for them.
    pub fn flush(&mut self) {
        for _ in 0..1000 {
            if !self.write_interest() {
                return;
            }
            self.server.on_writable(self.session);
        }
        panic!("write interest never cleared");
    }

    /// Flush, then parse everything written so far.
    pub fn exchange(&mut self) -> Vec<Frame> {
        self.flush();
        let written = self.socket.take_written();
        self.client.read(&written)
    }
}
