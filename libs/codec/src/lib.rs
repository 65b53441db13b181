//! # Skein Wire Codec
//!
//! ## Purpose
//!
//! Everything that turns runtime values into bytes for a peer session and
//! back again. Two framing layers are involved:
//!
//! - **Session framing** ([`frame`]): each unit on a TCP session is a 2-byte
//!   big-endian length followed by that many body bytes. A zero-length body
//!   is a heartbeat.
//! - **Field encoding** ([`field`]): fixed-width integers are big-endian,
//!   strings and sequences carry a 2-byte element count, and opaque payloads
//!   carry a variable-length size marker ([`varsize`]).
//!
//! On top of those sit the two structured bodies the proxy exchanges: the
//! routing [`envelope`] and the authentication [`handshake`].
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/actors (proxy sessions)
//!     ↑           ↓
//! ActorId     frames, envelopes, handshakes
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling (belongs in `network`)
//! - Routing decisions (belongs in the proxy actor)

pub mod envelope;
pub mod error;
pub mod field;
pub mod frame;
pub mod handshake;
pub mod varsize;

pub use envelope::ProxyEnvelope;
pub use error::{CodecError, CodecResult};
pub use field::{from_bytes, to_bytes, Decode, Decoder, Encode, Encoder, RawPayload};
pub use frame::{encode_frame, heartbeat_frame, split_frames, Frame, FRAME_HEADER_LEN, MAX_FRAME_BODY};
pub use handshake::{sign, Handshake, HandshakeAck};
pub use varsize::{read_var_size, var_size_len, write_var_size};
