use manualmatic_core::protocol::{
    encode_frame, CommandRecord, FrameDecoder, FrameError, ETX, STX,
};
use pretty_assertions::assert_eq;

/// Feed bytes, collecting records and diagnostics in order
fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Result<CommandRecord, FrameError>> {
    bytes
        .iter()
        .filter_map(|&b| match decoder.push(b) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        })
        .collect()
}

fn record(code: &str, payload: &str) -> CommandRecord {
    CommandRecord::new(code, payload)
}

#[test]
fn test_single_frame() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, b"\x02s 1.25\x03");
    assert_eq!(events, vec![Ok(record("s ", "1.25"))]);
    assert!(!decoder.in_frame());
}

#[test]
fn test_back_to_back_frames() {
    let mut decoder = FrameDecoder::new();
    let mut bytes = encode_frame("b", "");
    bytes.extend(encode_frame("J0", "-0.1"));
    bytes.extend(encode_frame("E4", ""));
    let events = feed(&mut decoder, &bytes);
    assert_eq!(
        events,
        vec![
            Ok(record("b ", "")),
            Ok(record("J0", "-0.1")),
            Ok(record("E4", "")),
        ]
    );
}

#[test]
fn test_frame_split_across_reads() {
    let mut decoder = FrameDecoder::new();
    assert!(feed(&mut decoder, b"\x02f 1.").is_empty());
    assert!(decoder.in_frame());
    assert_eq!(feed(&mut decoder, b"5\x03"), vec![Ok(record("f ", "1.5"))]);
}

#[test]
fn test_truncated_frame_resyncs() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, b"\x02J0 1\x02n0\x03");
    assert_eq!(events, vec![Err(FrameError::Truncated), Ok(record("n0", ""))]);
}

#[test]
fn test_empty_frame_is_too_short() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, &[STX, ETX]);
    assert_eq!(events, vec![Err(FrameError::TooShort)]);
    assert!(!decoder.in_frame());
}

#[test]
fn test_unexpected_bytes_outside_frame() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, &[ETX, b'x', STX, b'b', b' ', ETX]);
    assert_eq!(
        events,
        vec![
            Err(FrameError::UnexpectedEtx),
            Err(FrameError::UnexpectedCharacter(b'x')),
            Ok(record("b ", "")),
        ]
    );
}

#[test]
fn test_too_long_frame_is_dropped() {
    let mut decoder = FrameDecoder::new();
    let mut bytes = vec![STX];
    bytes.extend(std::iter::repeat(b'9').take(24));
    bytes.push(ETX);
    bytes.extend(encode_frame("b", ""));

    let events = feed(&mut decoder, &bytes);
    // Two bytes past the 22 byte limit, then the next frame decodes normally
    assert_eq!(
        events,
        vec![
            Err(FrameError::TooLong),
            Err(FrameError::TooLong),
            Ok(record("b ", "")),
        ]
    );
}

#[test]
fn test_max_length_frame_is_accepted() {
    let mut decoder = FrameDecoder::new();
    let payload = "12345678901234567890";
    let events = feed(&mut decoder, &encode_frame("DD", payload));
    assert_eq!(events, vec![Ok(record("DD", payload))]);
}

#[test]
fn test_trailing_nuls_trimmed() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, b"\x02DDhello\x00\x00\x03");
    assert_eq!(events, vec![Ok(record("DD", "hello"))]);
}

#[test]
fn test_high_bytes_decode_as_latin1() {
    let mut decoder = FrameDecoder::new();
    let events = feed(&mut decoder, &encode_frame("DD", "90\u{b0}"));
    assert_eq!(events, vec![Ok(record("DD", "90\u{b0}"))]);
}

#[test]
fn test_reset_drops_partial_frame() {
    let mut decoder = FrameDecoder::new();
    feed(&mut decoder, b"\x02J0 12");
    decoder.reset();
    assert_eq!(feed(&mut decoder, &[ETX]), vec![Err(FrameError::UnexpectedEtx)]);
}
