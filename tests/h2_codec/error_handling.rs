//! Tests for H2Codec error handling

use sbi_h2_server::{error_code, CodecError, H2Codec, H2Event};

#[test]
fn test_window_update_too_short_returns_error() {
    let mut codec = H2Codec::without_preface();

    let frame = vec![0, 0, 2, 8, 0, 0, 0, 0, 1, 0, 0];

    let result = codec.process(&frame);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("WINDOW_UPDATE"));
}

#[test]
fn test_ping_too_short_returns_error() {
    let mut codec = H2Codec::without_preface();

    let frame = vec![0, 0, 4, 6, 0, 0, 0, 0, 0, 1, 2, 3, 4];

    let err = codec.process(&frame).unwrap_err();
    assert!(err.to_string().contains("PING"));
    assert_eq!(err.error_code(), error_code::FRAME_SIZE_ERROR);
}

#[test]
fn test_goaway_too_short_returns_error() {
    let mut codec = H2Codec::without_preface();

    let frame = vec![0, 0, 4, 7, 0, 0, 0, 0, 0, 0, 0, 0, 5];

    let result = codec.process(&frame);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("GOAWAY"));
}

#[test]
fn test_rst_stream_too_short_returns_error() {
    let mut codec = H2Codec::without_preface();

    let frame = vec![0, 0, 2, 3, 0, 0, 0, 0, 1, 0, 0];

    let result = codec.process(&frame);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("RST_STREAM"));
}

#[test]
fn test_settings_length_not_multiple_of_six() {
    let mut codec = H2Codec::without_preface();

    let frame = vec![0, 0, 4, 4, 0, 0, 0, 0, 0, 0, 3, 0, 0];

    let err = codec.process(&frame).unwrap_err();
    assert_eq!(err, CodecError::SettingsLength(4));
    assert_eq!(err.error_code(), error_code::FRAME_SIZE_ERROR);
}

#[test]
fn test_padded_data_frame_invalid_padding() {
    let mut codec = H2Codec::without_preface();

    // PADDED DATA frame with padding exceeding payload
    let mut frame = vec![0, 0, 6, 0, 0x8, 0, 0, 0, 1]; // length 6
    frame.push(10); // Pad length 10 > payload (only 5 bytes after pad length)
    frame.extend_from_slice(b"hello");

    let err = codec.process(&frame).unwrap_err();
    assert!(err.to_string().contains("Invalid padding"));
    assert_eq!(err.error_code(), error_code::PROTOCOL_ERROR);
}

#[test]
fn test_bad_preface_is_rejected_early() {
    let mut codec = H2Codec::new();

    // An HTTP/1.1 request line diverges from the preface at the first byte
    let err = codec.process(b"GET / HTTP/1.1\r\n").unwrap_err();
    assert_eq!(err, CodecError::InvalidPreface);
}

#[test]
fn test_headers_with_priority_flag() {
    let mut codec = H2Codec::without_preface();

    // HEADERS with PRIORITY flag
    let mut frame = vec![0, 0, 7, 1, 0x24, 0, 0, 0, 1];
    frame.extend_from_slice(&[0, 0, 0, 0]); // Dependency
    frame.push(255); // Weight
    frame.extend_from_slice(&[0x82, 0x86]); // Header block

    let events = codec.process(&frame).unwrap();
    assert_eq!(events.len(), 1);

    match &events[0] {
        H2Event::Headers { header_block, .. } => {
            // Should extract only the header block, skipping priority bytes
            assert_eq!(header_block, &[0x82, 0x86]);
        }
        _ => panic!("Expected Headers event"),
    }
}

#[test]
fn test_short_priority_block_returns_error() {
    let mut codec = H2Codec::without_preface();

    // PRIORITY flag set but only 3 bytes of payload
    let frame = vec![0, 0, 3, 1, 0x24, 0, 0, 0, 1, 0, 0, 0];

    let err = codec.process(&frame).unwrap_err();
    assert_eq!(err, CodecError::ShortPriority);
}
