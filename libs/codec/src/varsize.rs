//! Variable-length size marker
//!
//! | value range               | encoding                      |
//! |---------------------------|-------------------------------|
//! | `0 ..= 0xFC`              | 1 byte, the value itself      |
//! | `0xFD ..= 0xFFFF`         | `0xFD` + 2-byte big-endian    |
//! | `0x1_0000 ..= 0xFFFF_FFFF`| `0xFE` + 4-byte big-endian    |
//! | larger                    | `0xFF` + 8-byte big-endian    |
//!
//! Used wherever a payload length must precede the payload so that several
//! payloads can be concatenated without an outer frame.

use crate::{CodecError, CodecResult};
use bytes::BufMut;

pub const MAX_INLINE: u64 = 0xFC;
pub const MARKER_U16: u8 = 0xFD;
pub const MARKER_U32: u8 = 0xFE;
pub const MARKER_U64: u8 = 0xFF;

/// Number of bytes `value` occupies once encoded
pub fn var_size_len(value: u64) -> usize {
    if value <= MAX_INLINE {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

pub fn write_var_size<B: BufMut>(buf: &mut B, value: u64) {
    if value <= MAX_INLINE {
        buf.put_u8(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.put_u8(MARKER_U16);
        buf.put_u16(value as u16);
    } else if value <= u32::MAX as u64 {
        buf.put_u8(MARKER_U32);
        buf.put_u32(value as u32);
    } else {
        buf.put_u8(MARKER_U64);
        buf.put_u64(value);
    }
}

/// Decode a size marker from the front of `input`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_var_size(input: &[u8]) -> CodecResult<(u64, usize)> {
    let marker = *input
        .first()
        .ok_or_else(|| CodecError::truncated(1, 0, "size marker"))?;

    let width = match marker {
        MARKER_U16 => 2,
        MARKER_U32 => 4,
        MARKER_U64 => 8,
        inline => return Ok((inline as u64, 1)),
    };

    let body = input
        .get(1..1 + width)
        .ok_or_else(|| CodecError::truncated(1 + width, input.len(), "size marker"))?;

    let value = body.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((value, 1 + width))
}
