//! RESP2 decoder and encoder
//!
//! Decoding works incrementally against a growable buffer: a first pass
//! scans for the end of one complete frame (validating tags and lengths on
//! the way), and only then is the frame consumed. Partial data is never
//! consumed, so the caller can keep appending socket reads to the same
//! buffer until a frame completes.

use super::{Frame, FrameError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Decode one frame from the buffer.
///
/// Returns Ok(Some(frame)) if a complete frame was decoded,
/// Ok(None) if more data is needed,
/// Err(e) if the data is malformed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
    match frame_end(buf, 0)? {
        Some(_) => parse(buf).map(Some),
        None => Ok(None),
    }
}

/// Encode a frame to bytes
pub fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::new();
    encode_to(&mut buf, frame);
    buf.freeze()
}

/// Encode a frame into an existing buffer
pub fn encode_to(buf: &mut BytesMut, frame: &Frame) {
    match frame {
        Frame::Simple(text) => {
            buf.put_u8(b'+');
            buf.put_slice(text.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Error(text) => {
            buf.put_u8(b'-');
            buf.put_slice(text.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Integer(value) => {
            buf.put_u8(b':');
            buf.put_slice(value.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Bulk(data) => {
            buf.put_u8(b'$');
            buf.put_slice(data.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Frame::NullBulk => {
            buf.put_slice(b"$-1\r\n");
        }
        Frame::Array(items) => {
            buf.put_u8(b'*');
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for item in items {
                encode_to(buf, item);
            }
        }
    }
}

/// Array-of-bulk encoding of a command's argument vector.
///
/// Used both to propagate writes to replicas and to account replication
/// offsets; the "$" lengths are raw byte lengths, never character counts.
pub fn command_bytes(args: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 * (args.len() + 1));
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }
    buf.freeze()
}

/// Find the index just past one complete frame starting at `start`.
///
/// Returns Ok(None) when the buffer holds only a prefix of the frame.
/// Malformed tags and lengths are reported even before the frame completes.
fn frame_end(buf: &[u8], start: usize) -> Result<Option<usize>, FrameError> {
    let Some(&prefix) = buf.get(start) else {
        return Ok(None);
    };
    match prefix {
        b'+' | b'-' | b':' => Ok(line_end(buf, start + 1)),
        b'$' => {
            let Some(after_len) = line_end(buf, start + 1) else {
                return Ok(None);
            };
            let len = parse_length(&buf[start + 1..after_len - 2])?;
            if len == -1 {
                return Ok(Some(after_len));
            }
            let end = after_len + len as usize + 2;
            if buf.len() < end {
                return Ok(None);
            }
            if &buf[end - 2..end] != CRLF {
                return Err(FrameError::BadTerminator);
            }
            Ok(Some(end))
        }
        b'*' => {
            let Some(after_count) = line_end(buf, start + 1) else {
                return Ok(None);
            };
            let count = parse_length(&buf[start + 1..after_count - 2])?;
            let mut pos = after_count;
            if count > 0 {
                for _ in 0..count {
                    match frame_end(buf, pos)? {
                        Some(next) => pos = next,
                        None => return Ok(None),
                    }
                }
            }
            Ok(Some(pos))
        }
        other => Err(FrameError::InvalidPrefix(other)),
    }
}

/// Index just past the CRLF of the line starting at `start`, if present
fn line_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

/// Consume one frame known to be complete (checked by `frame_end`)
fn parse(buf: &mut BytesMut) -> Result<Frame, FrameError> {
    let Some(&prefix) = buf.first() else {
        return Err(FrameError::BadTerminator);
    };
    buf.advance(1);
    match prefix {
        b'+' => Ok(Frame::Simple(take_text(buf)?)),
        b'-' => Ok(Frame::Error(take_text(buf)?)),
        b':' => {
            let text = take_text(buf)?;
            let value = text
                .parse()
                .map_err(|_| FrameError::InvalidInteger(text))?;
            Ok(Frame::Integer(value))
        }
        b'$' => {
            let len = parse_length(&take_line(buf)?)?;
            if len == -1 {
                return Ok(Frame::NullBulk);
            }
            let data = buf.split_to(len as usize).freeze();
            if buf.len() < 2 || &buf[..2] != CRLF {
                return Err(FrameError::BadTerminator);
            }
            buf.advance(2);
            Ok(Frame::Bulk(data))
        }
        b'*' => {
            let count = parse_length(&take_line(buf)?)?;
            if count == -1 {
                return Ok(Frame::NullBulk);
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(parse(buf)?);
            }
            Ok(Frame::Array(items))
        }
        other => Err(FrameError::InvalidPrefix(other)),
    }
}

/// Split off one CRLF-terminated line, returned without the CRLF
fn take_line(buf: &mut BytesMut) -> Result<BytesMut, FrameError> {
    let nl = buf
        .windows(2)
        .position(|window| window == CRLF)
        .ok_or(FrameError::BadTerminator)?;
    let line = buf.split_to(nl);
    buf.advance(2);
    Ok(line)
}

/// Split off one line and require it to be UTF-8 text
fn take_text(buf: &mut BytesMut) -> Result<String, FrameError> {
    let line = take_line(buf)?;
    String::from_utf8(line.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

/// Parse a "$" or "*" length; -1 marks the null frame
fn parse_length(line: &[u8]) -> Result<i64, FrameError> {
    let text = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
    let value: i64 = text
        .parse()
        .map_err(|_| FrameError::InvalidLength(text.to_string()))?;
    if value < -1 {
        return Err(FrameError::InvalidLength(text.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_string() {
        let mut buf = BytesMut::from("+OK\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Simple("OK".to_string())));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_error() {
        let mut buf = BytesMut::from("-ERR something went wrong\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Error("ERR something went wrong".to_string())));
    }

    #[test]
    fn test_decode_integer() {
        let mut buf = BytesMut::from(":1000\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Integer(1000)));
    }

    #[test]
    fn test_decode_bulk_string() {
        let mut buf = BytesMut::from("$6\r\nfoobar\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Bulk(Bytes::from("foobar"))));
    }

    #[test]
    fn test_decode_null_bulk() {
        let mut buf = BytesMut::from("$-1\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::NullBulk));
    }

    #[test]
    fn test_decode_command_array() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        let frame = decode(&mut buf).unwrap();
        assert_eq!(
            frame,
            Some(Frame::Array(vec![
                Frame::Bulk(Bytes::from("foo")),
                Frame::Bulk(Bytes::from("bar")),
            ]))
        );
    }

    #[test]
    fn test_decode_incomplete_returns_none() {
        for partial in ["", "*", "*2\r\n", "*2\r\n$3\r\nfo", "$6\r\nfoo", "+PON"] {
            let mut buf = BytesMut::from(partial);
            assert_eq!(decode(&mut buf).unwrap(), None, "partial input {partial:?}");
            assert_eq!(buf.len(), partial.len(), "partial input must not be consumed");
        }
    }

    #[test]
    fn test_decode_invalid_prefix() {
        let mut buf = BytesMut::from("hello\r\n");
        assert_eq!(decode(&mut buf), Err(FrameError::InvalidPrefix(b'h')));
    }

    #[test]
    fn test_decode_invalid_length() {
        let mut buf = BytesMut::from("$abc\r\nxxx\r\n");
        assert!(matches!(decode(&mut buf), Err(FrameError::InvalidLength(_))));

        let mut buf = BytesMut::from("*-3\r\n");
        assert!(matches!(decode(&mut buf), Err(FrameError::InvalidLength(_))));
    }

    #[test]
    fn test_decode_missing_terminator() {
        let mut buf = BytesMut::from("$3\r\nfooXX");
        assert_eq!(decode(&mut buf), Err(FrameError::BadTerminator));
    }

    #[test]
    fn test_decode_consumes_one_frame_only() {
        let mut buf = BytesMut::from("+PONG\r\n+OK\r\n");
        assert_eq!(decode(&mut buf).unwrap(), Some(Frame::simple("PONG")));
        assert_eq!(decode(&mut buf).unwrap(), Some(Frame::simple("OK")));
        assert_eq!(decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_simple_string() {
        assert_eq!(encode(&Frame::simple("OK")), Bytes::from("+OK\r\n"));
    }

    #[test]
    fn test_encode_null_bulk() {
        assert_eq!(encode(&Frame::NullBulk), Bytes::from("$-1\r\n"));
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(encode(&Frame::integer(3)), Bytes::from(":3\r\n"));
    }

    #[test]
    fn test_round_trip_binary_and_empty_elements() {
        // Zero-length and non-UTF-8 payloads must survive unchanged.
        let args = vec![
            Bytes::from_static(b"SET"),
            Bytes::new(),
            Bytes::from_static(&[0x00, 0xff, 0x0d, 0x0a, 0x80]),
        ];
        let frame = Frame::Array(args.iter().cloned().map(Frame::Bulk).collect());

        let mut buf = BytesMut::from(&encode(&frame)[..]);
        assert_eq!(decode(&mut buf).unwrap(), Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_command_bytes_matches_frame_encoding() {
        let args = vec![
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"foo"),
            Bytes::from_static(b"bar"),
        ];
        let bytes = command_bytes(&args);
        assert_eq!(&bytes[..], b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(bytes.len(), 31);

        let frame = Frame::Array(args.into_iter().map(Frame::Bulk).collect());
        assert_eq!(bytes, encode(&frame));
    }
}
