//! TLS context construction and handshakes over an in-memory wire.


mod handshake;
