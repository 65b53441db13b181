//! Session framing: `u16` big-endian body length, then the body.
//!
//! A zero-length body is a heartbeat and carries nothing else.

use crate::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_LEN: usize = 2;
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

/// One unit received on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Heartbeat,
    Body(Bytes),
}

/// Prefix `body` with its length
pub fn encode_frame(body: &[u8]) -> CodecResult<Bytes> {
    if body.len() > MAX_FRAME_BODY {
        return Err(CodecError::too_large(body.len(), MAX_FRAME_BODY, "frame body"));
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.put_u16(body.len() as u16);
    buf.put_slice(body);
    Ok(buf.freeze())
}

pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(&[0, 0])
}

/// Split every complete frame off the front of `input`.
///
/// Returns the frames and the number of bytes they occupied; a trailing
/// partial frame is left for the next read.
pub fn split_frames(input: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;

    while input.len() - consumed >= FRAME_HEADER_LEN {
        let len = u16::from_be_bytes([input[consumed], input[consumed + 1]]) as usize;
        let start = consumed + FRAME_HEADER_LEN;
        if input.len() - start < len {
            break;
        }
        frames.push(if len == 0 {
            Frame::Heartbeat
        } else {
            Frame::Body(Bytes::copy_from_slice(&input[start..start + len]))
        });
        consumed = start + len;
    }

    (frames, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_prefix() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(&frame[..], &[0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let body = vec![0u8; MAX_FRAME_BODY + 1];
        assert!(encode_frame(&body).is_err());
        assert!(encode_frame(&body[..MAX_FRAME_BODY]).is_ok());
    }

    #[test]
    fn test_split_keeps_partial_tail() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(b"one").unwrap());
        stream.extend_from_slice(&heartbeat_frame());
        stream.extend_from_slice(&encode_frame(b"two").unwrap());
        let full = stream.len();
        stream.extend_from_slice(&[0, 9, 1, 2]);

        let (frames, consumed) = split_frames(&stream);
        assert_eq!(consumed, full);
        assert_eq!(
            frames,
            vec![
                Frame::Body(Bytes::from_static(b"one")),
                Frame::Heartbeat,
                Frame::Body(Bytes::from_static(b"two")),
            ]
        );
    }

    #[test]
    fn test_split_needs_whole_header() {
        assert_eq!(split_frames(&[0]), (vec![], 0));
        assert_eq!(split_frames(&[]), (vec![], 0));
    }
}
