//! Frame headers of the frames the server writes

use sbi_h2_server::{
    error_code, flags, frame_type, H2Codec, H2FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN,
};

#[test]
fn test_response_data_frame_header() {
    let bytes = H2Codec::create_data_frame_header(7, DEFAULT_MAX_FRAME_SIZE, false);
    let header = H2FrameHeader::parse(&bytes).unwrap();

    assert_eq!(header.length, DEFAULT_MAX_FRAME_SIZE);
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.stream_id, 7);
    assert!(!header.is_end_stream());
    assert_eq!(header.total_size(), FRAME_HEADER_LEN + DEFAULT_MAX_FRAME_SIZE as usize);
}

#[test]
fn test_final_data_frame_carries_end_stream() {
    let bytes = H2Codec::create_data_frame_header(7, 0, true);
    let header = H2FrameHeader::parse(&bytes).unwrap();
    assert_eq!(header.length, 0);
    assert!(header.is_end_stream());
}

#[test]
fn test_interim_headers_frame_keeps_stream_open() {
    let frame = H2Codec::create_headers_frame(1, &[0x08, 0x03, b'1', b'0', b'0'], false, true);
    let header = H2FrameHeader::parse(&frame).unwrap();

    assert_eq!(header.frame_type, frame_type::HEADERS);
    assert!(header.is_end_headers());
    assert!(!header.is_end_stream());
    assert_eq!(header.total_size(), frame.len());
}

#[test]
fn test_refused_stream_reset() {
    let frame = H2Codec::create_rst_stream(0x8000_0003, error_code::REFUSED_STREAM);
    let header = H2FrameHeader::parse(&frame).unwrap();

    assert_eq!(header.frame_type, frame_type::RST_STREAM);
    assert_eq!(header.stream_id, 3, "reserved bit never goes on the wire");
    assert_eq!(frame[FRAME_HEADER_LEN..], error_code::REFUSED_STREAM.to_be_bytes());
}

#[test]
fn test_goaway_is_connection_level() {
    let frame = H2Codec::create_goaway(21, error_code::NO_ERROR);
    let header = H2FrameHeader::parse(&frame).unwrap();

    assert_eq!(header.frame_type, frame_type::GOAWAY);
    assert_eq!(header.stream_id, 0);
    assert_eq!(header.length, 8);
    assert_eq!(header.flags, 0);
}

#[test]
fn test_settings_ack_header() {
    let header = H2FrameHeader::parse(&H2Codec::create_settings_ack()).unwrap();
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert_eq!(header.flags, flags::ACK);
    assert!(header.is_ack());
    assert_eq!(header.length, 0);
}

#[test]
fn test_header_needs_all_nine_bytes() {
    let bytes = H2Codec::create_data_frame_header(1, 5, true);
    assert!(H2FrameHeader::parse(&bytes[..FRAME_HEADER_LEN - 1]).is_none());
    assert!(H2FrameHeader::parse(&bytes).is_some());
}
