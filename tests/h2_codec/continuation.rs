//! Request header blocks split across HEADERS and CONTINUATION frames

use sbi_h2_server::{
    flags, frame_type, CodecError, H2Codec, H2Event, H2Header, HpackDecoder, HpackEncoder,
    MAX_ALLOWED_FRAME_SIZE, MAX_HEADER_BLOCK_SIZE,
};

/// A request with a bearer token large enough to need several frames.
fn large_request() -> Vec<H2Header> {
    vec![
        H2Header::new(":method", "GET"),
        H2Header::new(":scheme", "https"),
        H2Header::new(":authority", "udm.5gc.local"),
        H2Header::new(":path", "/nudm-sdm/v2/imsi-001010000000001/am-data"),
        H2Header::new("authorization", format!("Bearer {}", "t".repeat(40_000))),
    ]
}

/// Cut a header block into HEADERS plus CONTINUATION frames of `chunk` bytes.
fn split_block(stream_id: u32, block: &[u8], chunk: usize, end_stream: bool) -> Vec<u8> {
    let mut pieces = block.chunks(chunk);
    let first = pieces.next().unwrap_or_default();
    let rest: Vec<&[u8]> = pieces.collect();
    let mut out = H2Codec::create_headers_frame(stream_id, first, end_stream, rest.is_empty());
    for (i, piece) in rest.iter().enumerate() {
        out.extend(H2Codec::create_continuation_frame(stream_id, piece, i + 1 == rest.len()));
    }
    out
}

#[test]
fn test_large_request_block_is_reassembled() {
    let headers = large_request();
    let block = HpackEncoder::new().encode(&headers);
    let wire = split_block(1, &block, 16_384, true);

    let events = H2Codec::without_preface().process(&wire).unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        H2Event::Headers { stream_id, header_block, end_stream } => {
            assert_eq!(*stream_id, 1);
            assert!(*end_stream, "END_STREAM comes from the HEADERS frame");
            assert_eq!(header_block, &block);
            assert_eq!(HpackDecoder::new().decode(header_block).unwrap(), headers);
        }
        other => panic!("Expected Headers, got {other:?}"),
    }
}

#[test]
fn test_block_split_across_reads() {
    let block = HpackEncoder::new().encode(&large_request());
    let wire = split_block(3, &block, 4096, false);

    let mut codec = H2Codec::without_preface();
    let mut events = Vec::new();
    for read in wire.chunks(1000) {
        events.extend(codec.process(read).unwrap());
    }
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], H2Event::Headers { stream_id: 3, end_stream: false, .. }));
}

#[test]
fn test_next_request_after_reassembly() {
    let mut encoder = HpackEncoder::new();
    let mut wire = split_block(1, &encoder.encode(&large_request()), 8192, true);
    let small = encoder.encode(&[H2Header::new(":method", "GET")]);
    wire.extend(H2Codec::create_headers_frame(3, &small, true, true));

    let events = H2Codec::without_preface().process(&wire).unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        H2Event::Headers { stream_id: 3, header_block, .. } if *header_block == small
    ));
}

#[test]
fn test_continuation_for_another_stream() {
    let mut wire = H2Codec::create_headers_frame(1, &[0x82, 0x86], false, false);
    wire.extend(H2Codec::create_continuation_frame(3, &[0x84], true));

    let err = H2Codec::without_preface().process(&wire).unwrap_err();
    assert_eq!(err, CodecError::ContinuationStreamMismatch { got: 3, pending: 1 });
}

#[test]
fn test_continuation_without_headers() {
    let wire = H2Codec::create_continuation_frame(5, &[0x82], true);
    assert_eq!(
        H2Codec::without_preface().process(&wire).unwrap_err(),
        CodecError::UnexpectedContinuation(5)
    );
}

#[test]
fn test_body_before_header_block_ends() {
    let mut wire = H2Codec::create_headers_frame(1, &[0x83, 0x86], false, false);
    wire.extend(H2Codec::create_data_frame_header(1, 2, true));
    wire.extend_from_slice(b"{}");

    assert_eq!(
        H2Codec::without_preface().process(&wire).unwrap_err(),
        CodecError::ExpectedContinuation { pending: 1, frame_type: frame_type::DATA }
    );
}

#[test]
fn test_continuation_flood_is_bounded() {
    let mut codec = H2Codec::without_preface();
    codec.set_max_frame_size(MAX_ALLOWED_FRAME_SIZE);

    let piece = vec![0x86; 64 * 1024];
    let mut wire = H2Codec::create_headers_frame(1, &piece, false, false);
    for _ in 0..MAX_HEADER_BLOCK_SIZE / piece.len() {
        wire.extend(H2Codec::create_continuation_frame(1, &piece, false));
    }

    let err = codec.process(&wire).unwrap_err();
    assert!(matches!(err, CodecError::HeaderBlockTooLarge { max: MAX_HEADER_BLOCK_SIZE, .. }));
}

#[test]
fn test_end_headers_flag_on_last_frame_only() {
    let block = HpackEncoder::new().encode(&large_request());
    let wire = split_block(1, &block, 16_384, false);

    let mut offset = 0;
    let mut end_flags = Vec::new();
    while offset < wire.len() {
        let len =
            u32::from_be_bytes([0, wire[offset], wire[offset + 1], wire[offset + 2]]) as usize;
        end_flags.push(wire[offset + 4] & flags::END_HEADERS != 0);
        offset += 9 + len;
    }
    assert!(end_flags.len() >= 3);
    assert_eq!(end_flags.iter().filter(|f| **f).count(), 1);
    assert!(end_flags[end_flags.len() - 1]);
}
