use std::io::Write;
use std::sync::Arc;

use rustls::ClientConnection;
use sbi_h2_server::tls::build_server_config;
use sbi_h2_server::{Handshake, TlsConfig, TlsSession};

use super::pki::{client_plaintext, Pki, Wire};

fn server_session(config: &TlsConfig) -> TlsSession {
    let context = build_server_config(config).unwrap();
    TlsSession::new(Arc::clone(&context), "sbi-h2-server:0".to_string()).unwrap()
}

/// Pump both sides until the handshake settles. `Err` carries whichever side
/// gave up first.
fn drive(
    server: &mut TlsSession,
    client: &mut ClientConnection,
    wire: &Wire,
) -> Result<(), String> {
    for _ in 0..16 {
        wire.from_client(client);
        let step = server.handshake(wire).map_err(|e| format!("server: {e}"))?;
        wire.to_client(client).map_err(|e| format!("client: {e}"))?;
        if step == Handshake::Complete && !client.is_handshaking() {
            return Ok(());
        }
    }
    Err("handshake did not finish".to_string())
}

#[test]
fn test_handshake_negotiates_h2_over_tls13() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();

    assert!(server.is_handshaking());
    drive(&mut server, &mut client, &wire).unwrap();

    assert!(!server.is_handshaking());
    assert_eq!(server.alpn_protocol(), Some(&b"h2"[..]));
    assert_eq!(client.protocol_version(), Some(rustls::ProtocolVersion::TLSv1_3));
    assert_eq!(
        client.negotiated_cipher_suite().map(|s| s.suite()),
        Some(rustls::CipherSuite::TLS13_AES_256_GCM_SHA384)
    );
    assert_eq!(server.context(), "sbi-h2-server:0");
}

#[test]
fn test_application_data_round_trip() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();
    drive(&mut server, &mut client, &wire).unwrap();

    client.writer().write_all(b"client hello").unwrap();
    wire.from_client(&mut client);
    let mut buf = [0u8; 64];
    let n = server.read(&wire, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"client hello");

    // Nothing more to read
    let err = server.read(&wire, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);

    let taken = server.write(&wire, b"server reply").unwrap();
    assert_eq!(taken, 12);
    assert!(!server.wants_write());
    wire.to_client(&mut client).unwrap();
    assert_eq!(client_plaintext(&mut client), b"server reply");
}

#[test]
fn test_clean_close_reads_as_eof() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();
    drive(&mut server, &mut client, &wire).unwrap();

    client.send_close_notify();
    wire.from_client(&mut client);
    let mut buf = [0u8; 16];
    assert_eq!(server.read(&wire, &mut buf).unwrap(), 0);
}

#[test]
fn test_client_without_alpn_still_connects() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client(&[]);
    let wire = Wire::default();

    drive(&mut server, &mut client, &wire).unwrap();
    assert_eq!(server.alpn_protocol(), None);
}

#[test]
fn test_http11_only_client_is_rejected() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client(&[b"http/1.1"]);
    let wire = Wire::default();

    let err = drive(&mut server, &mut client, &wire).unwrap_err();
    assert!(err.starts_with("server:"), "{err}");
}

#[test]
fn test_tls12_client_rejected_by_default() {
    let pki = Pki::new();
    let mut server = server_session(&pki.tls_config());
    let mut client = pki.client_with(&[b"h2"], &[&rustls::version::TLS12], None);
    let wire = Wire::default();

    assert!(drive(&mut server, &mut client, &wire).is_err());
}

#[test]
fn test_tls12_allowed_when_configured() {
    let pki = Pki::new();
    let config = TlsConfig {
        min_version: sbi_h2_server::TlsVersion::Tls12,
        cipher_suites: Vec::new(),
        ..pki.tls_config()
    };
    let mut server = server_session(&config);
    let mut client = pki.client_with(&[b"h2"], &[&rustls::version::TLS12], None);
    let wire = Wire::default();

    drive(&mut server, &mut client, &wire).unwrap();
    assert_eq!(client.protocol_version(), Some(rustls::ProtocolVersion::TLSv1_2));
}

#[test]
fn test_mutual_tls_requires_client_certificate() {
    let pki = Pki::new();
    let mut server = server_session(&pki.mutual_tls_config());
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();

    assert!(drive(&mut server, &mut client, &wire).is_err());
}

#[test]
fn test_mutual_tls_accepts_issued_client() {
    let pki = Pki::new();
    let identity = pki.client_cert(|_| {});
    let mut server = server_session(&pki.mutual_tls_config());
    let mut client = pki.client_with(&[b"h2"], rustls::DEFAULT_VERSIONS, Some(&identity));
    let wire = Wire::default();

    drive(&mut server, &mut client, &wire).unwrap();
}

#[test]
fn test_optional_client_certificate() {
    let pki = Pki::new();
    let config = TlsConfig {
        verify_client: false,
        ..pki.mutual_tls_config()
    };
    let mut server = server_session(&config);
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();

    drive(&mut server, &mut client, &wire).unwrap();
}

fn expired(params: &mut rcgen::CertificateParams) {
    params.not_before = rcgen::date_time_ymd(2019, 1, 1);
    params.not_after = rcgen::date_time_ymd(2020, 1, 1);
}

#[test]
fn test_expired_client_certificate_rejected() {
    let pki = Pki::new();
    let identity = pki.client_cert(expired);
    let mut server = server_session(&pki.mutual_tls_config());
    let mut client = pki.client_with(&[b"h2"], rustls::DEFAULT_VERSIONS, Some(&identity));
    let wire = Wire::default();

    assert!(drive(&mut server, &mut client, &wire).is_err());
}

#[test]
fn test_expired_client_certificate_allowed_when_configured() {
    let pki = Pki::new();
    let identity = pki.client_cert(expired);
    let config = TlsConfig {
        allow_expired_client_cert: true,
        ..pki.mutual_tls_config()
    };
    let mut server = server_session(&config);
    let mut client = pki.client_with(&[b"h2"], rustls::DEFAULT_VERSIONS, Some(&identity));
    let wire = Wire::default();

    drive(&mut server, &mut client, &wire).unwrap();
}

#[test]
fn test_key_log_written() {
    let pki = Pki::new();
    let keylog = pki.path("keys.log");
    let config = TlsConfig {
        sslkeylog: Some(keylog.clone()),
        ..pki.tls_config()
    };
    let mut server = server_session(&config);
    let mut client = pki.client(&[b"h2"]);
    let wire = Wire::default();
    drive(&mut server, &mut client, &wire).unwrap();

    let log = std::fs::read_to_string(&keylog).unwrap();
    let labels: Vec<&str> = log.lines().filter_map(|l| l.split(' ').next()).collect();
    assert!(labels.contains(&"CLIENT_HANDSHAKE_TRAFFIC_SECRET"));
    assert!(labels.contains(&"SERVER_TRAFFIC_SECRET_0"));
    for line in log.lines() {
        assert_eq!(line.split(' ').count(), 3, "{line}");
    }
}
