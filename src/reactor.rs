//! Readiness-driven I/O loop.
//!
//! One listener task accepts connections; each accepted connection gets a
//! task that waits for read readiness, for write readiness while the session
//! has write interest, and for its session's wake-up signal. All tasks run on
//! one thread and take turns borrowing the shared [`Server`].

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::SessionError;
use crate::server::{Server, SessionHandle};
use crate::tls::Handshake;

/// Non-blocking byte transport under a session. Both calls return
/// `WouldBlock` instead of waiting.
pub trait Socket {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl Socket for TcpStream {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub(crate) fn spawn_listener(server: Rc<RefCell<Server>>, listener: TcpListener) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::task::spawn_local(serve_connection(server.clone(), stream, peer));
                }
                Err(e) => {
                    error!(error = %e, "accept() failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    })
}

async fn serve_connection(server: Rc<RefCell<Server>>, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }
    let stream = Rc::new(stream);

    let opened = server.borrow_mut().open_session(stream.clone(), peer);
    let handle = match opened {
        Ok(handle) => handle,
        Err(e) => {
            error!(peer = %peer, error = %e, "Rejecting connection");
            return;
        }
    };

    if let Err(e) = handshake(&server, &stream, handle).await {
        server.borrow_mut().fail_session(handle, e);
        return;
    }

    let started = server.borrow_mut().session_start(handle);
    if let Err(e) = started {
        server.borrow_mut().fail_session(handle, e);
        return;
    }

    drive_session(&server, &stream, handle).await;
    debug!(peer = %peer, "Connection task finished");
}

async fn handshake(
    server: &RefCell<Server>,
    stream: &TcpStream,
    handle: SessionHandle,
) -> Result<(), SessionError> {
    loop {
        let step = server.borrow_mut().session_handshake(handle)?;
        match step {
            Handshake::Complete => return Ok(()),
            Handshake::WantRead => stream.readable().await?,
            Handshake::WantWrite => stream.writable().await?,
        }
    }
}

async fn drive_session(server: &RefCell<Server>, stream: &TcpStream, handle: SessionHandle) {
    loop {
        let state = server.borrow_mut().poll_state(handle);
        let Some(state) = state else {
            break;
        };
        if state.buffered_input {
            server.borrow_mut().on_readable(handle);
            continue;
        }

        tokio::select! {
            _ = state.waker.notified() => {}
            ready = stream.readable() => match ready {
                Ok(()) => server.borrow_mut().on_readable(handle),
                Err(e) => server.borrow_mut().fail_session(handle, e.into()),
            },
            ready = stream.writable(), if state.write_interest => match ready {
                Ok(()) => server.borrow_mut().on_writable(handle),
                Err(e) => server.borrow_mut().fail_session(handle, e.into()),
            },
        }
    }
}
