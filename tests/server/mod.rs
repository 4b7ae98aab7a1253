//! Session, stream and response behaviour, driven over in-memory sockets
//! plus one loopback run through the real reactor.

mod harness;
