//! Session authentication payloads.
//!
//! The connecting side sends a [`Handshake`] listing the actor ids it hosts,
//! a unix timestamp and a signature keyed by the shared secret. The
//! accepting side answers with a [`HandshakeAck`] carrying its own ids.

use crate::field::{Decode, Decoder, Encode, Encoder};
use crate::CodecResult;
use sha3::{Digest, Sha3_256};
use types::ActorId;

/// Lower-case hex SHA3-256 over the decimal ids, the decimal timestamp and
/// the secret, concatenated in that order.
pub fn sign(actor_ids: &[ActorId], timestamp: i64, secret: &str) -> String {
    let mut hasher = Sha3_256::new();
    for id in actor_ids {
        hasher.update(id.raw().to_string().as_bytes());
    }
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub actor_ids: Vec<ActorId>,
    pub timestamp: i64,
    pub signature: String,
}

impl Handshake {
    pub fn signed(actor_ids: Vec<ActorId>, timestamp: i64, secret: &str) -> Self {
        let signature = sign(&actor_ids, timestamp, secret);
        Self {
            actor_ids,
            timestamp,
            signature,
        }
    }

    pub fn verify(&self, secret: &str) -> bool {
        let expected = sign(&self.actor_ids, self.timestamp, secret);
        constant_time_eq(expected.as_bytes(), self.signature.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Encode for Handshake {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_seq(&self.actor_ids)?;
        enc.put_i64(self.timestamp);
        enc.put_str(&self.signature)
    }
}

impl Decode for Handshake {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            actor_ids: dec.get_seq()?,
            timestamp: dec.get_i64()?,
            signature: dec.get_str()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAck {
    pub success: bool,
    pub actor_ids: Vec<ActorId>,
}

impl HandshakeAck {
    pub fn accepted(actor_ids: Vec<ActorId>) -> Self {
        Self {
            success: true,
            actor_ids,
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            actor_ids: Vec::new(),
        }
    }
}

impl Encode for HandshakeAck {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_u8(self.success as u8);
        enc.put_seq(&self.actor_ids)
    }
}

impl Decode for HandshakeAck {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        let success = dec.get_u8()? != 0;
        // A bare rejection may omit the id list
        let actor_ids = if dec.remaining() == 0 {
            Vec::new()
        } else {
            dec.get_seq()?
        };
        Ok(Self { success, actor_ids })
    }
}
