//! Response-side header compression, the way the emitter uses it

use sbi_h2_server::{H2Header, HpackDecoder, HpackEncoder};

fn response_block(content_length: &str) -> Vec<H2Header> {
    vec![
        H2Header::new(":status", "200"),
        H2Header::new("server", "sbi-h2-server"),
        H2Header::new("date", "Sun, 06 Nov 1994 08:49:37 GMT"),
        H2Header::new("content-length", content_length),
        H2Header::new("content-type", "application/json"),
        H2Header::new("3gpp-sbi-target-apiroot", "https://udm.5gc.mnc001.mcc001.3gppnetwork.org"),
    ]
}

#[test]
fn test_status_200_is_a_single_static_index() {
    let mut encoder = HpackEncoder::new();
    let block = encoder.encode(&[H2Header::new(":status", "200")]);
    assert_eq!(block, vec![0x88]);
}

#[test]
fn test_response_block_keeps_order_and_values() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();
    let headers = response_block("42");

    let decoded = decoder.decode(&encoder.encode(&headers)).unwrap();
    assert_eq!(decoded, headers);
    assert!(decoded[0].is_pseudo());
    assert!(decoded[1..].iter().all(|h| !h.is_pseudo()));
}

#[test]
fn test_repeated_fields_shrink_on_one_connection() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();

    let first = encoder.encode(&response_block("42"));
    let second = encoder.encode(&response_block("42"));
    assert!(second.len() < first.len(), "{} >= {}", second.len(), first.len());

    // The decoder follows the same table
    assert_eq!(decoder.decode(&first).unwrap(), response_block("42"));
    assert_eq!(decoder.decode(&second).unwrap(), response_block("42"));
}

#[test]
fn test_changing_field_between_responses() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();

    for length in ["0", "17", "65535"] {
        let decoded = decoder.decode(&encoder.encode(&response_block(length))).unwrap();
        assert_eq!(decoded[3], H2Header::new("content-length", length));
    }
}

#[test]
fn test_large_field_value() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();
    let token = "a".repeat(8192);
    let headers = vec![
        H2Header::new(":status", "401"),
        H2Header::new("www-authenticate", format!("Bearer error=\"invalid_token\", token={token}")),
    ];

    let decoded = decoder.decode(&encoder.encode(&headers)).unwrap();
    assert_eq!(decoded, headers);
}

#[test]
fn test_empty_value_and_repeated_names() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();
    let headers = vec![
        H2Header::new(":status", "204"),
        H2Header::new("x-empty", ""),
        H2Header::new("3gpp-sbi-correlation-info", "imsi-001010000000001"),
        H2Header::new("3gpp-sbi-correlation-info", "msisdn-15551234567"),
    ];

    let decoded = decoder.decode(&encoder.encode(&headers)).unwrap();
    assert_eq!(decoded, headers);
}

#[test]
fn test_empty_header_list() {
    let mut encoder = HpackEncoder::new();
    let block = encoder.encode(&[]);
    assert!(block.is_empty());
    assert!(HpackDecoder::new().decode(&block).unwrap().is_empty());
}
