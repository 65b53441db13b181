//! Routing body carried by a Running session.
//!
//! Layout: `source:u32, destination:u32, message_id:u16`, then the payload
//! prefixed with the variable-length size marker.

use crate::field::{Decoder, Encoder};
use crate::frame::encode_frame;
use crate::CodecResult;
use bytes::Bytes;
use types::{ActorId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEnvelope {
    pub source: ActorId,
    pub destination: ActorId,
    pub message_id: MessageId,
    pub payload: Bytes,
}

impl ProxyEnvelope {
    pub fn new(source: ActorId, destination: ActorId, message_id: MessageId, payload: Bytes) -> Self {
        Self {
            source,
            destination,
            message_id,
            payload,
        }
    }

    pub fn encode_body(&self) -> Bytes {
        let mut enc = Encoder::with_capacity(10 + 9 + self.payload.len());
        enc.put_u32(self.source.raw());
        enc.put_u32(self.destination.raw());
        enc.put_u16(self.message_id);
        enc.put_blob(&self.payload);
        enc.finish()
    }

    /// Body plus session frame header, ready for the socket
    pub fn to_frame(&self) -> CodecResult<Bytes> {
        encode_frame(&self.encode_body())
    }

    pub fn from_body(body: &[u8]) -> CodecResult<Self> {
        let mut dec = Decoder::new(body);
        let source = ActorId::new(dec.get_u32()?);
        let destination = ActorId::new(dec.get_u32()?);
        let message_id = dec.get_u16()?;
        let payload = Bytes::copy_from_slice(dec.get_blob()?);
        dec.finish("proxy envelope")?;
        Ok(Self {
            source,
            destination,
            message_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{split_frames, Frame};
    use crate::CodecError;

    #[test]
    fn test_body_layout() {
        let env = ProxyEnvelope::new(ActorId::new(1), ActorId::new(2), 0x0A0B, Bytes::from_static(b"hi"));
        let body = env.encode_body();
        assert_eq!(&body[..], &[0, 0, 0, 1, 0, 0, 0, 2, 0x0A, 0x0B, 2, b'h', b'i']);
        assert_eq!(ProxyEnvelope::from_body(&body).unwrap(), env);
    }

    #[test]
    fn test_frame_wraps_body() {
        let env = ProxyEnvelope::new(ActorId::new(7), ActorId::new(9), 3, Bytes::new());
        let frame = env.to_frame().unwrap();
        let (frames, consumed) = split_frames(&frame);
        assert_eq!(consumed, frame.len());
        match &frames[..] {
            [Frame::Body(body)] => assert_eq!(ProxyEnvelope::from_body(body).unwrap(), env),
            other => panic!("unexpected frames {other:?}"),
        }
    }

    #[test]
    fn test_short_body_is_truncated() {
        assert!(matches!(
            ProxyEnvelope::from_body(&[0, 0, 0, 1, 0, 0]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_payload_length_overrun() {
        let body = [0, 0, 0, 1, 0, 0, 0, 2, 0, 1, 5, b'x'];
        assert!(matches!(
            ProxyEnvelope::from_body(&body),
            Err(CodecError::Truncated { context: "blob", .. })
        ));
    }
}
