//! Field encoding
//!
//! Fixed-width integers are written big-endian. Strings and sequences are
//! prefixed with a `u16` count (bytes for strings, elements for sequences).
//! Opaque blobs are prefixed with the variable-length size marker so that
//! their length is self-describing.
//!
//! Types opt in through [`Encode`] / [`Decode`]; [`to_bytes`] and
//! [`from_bytes`] are the usual entry points.

use crate::varsize::{read_var_size, write_var_size};
use crate::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};
use types::ActorId;

/// Largest count a `u16` prefix can carry
pub const MAX_COUNT: usize = u16::MAX as usize;

pub trait Encode {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()>;
}

pub trait Decode: Sized {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self>;
}

/// Encode a value into a fresh buffer
pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> CodecResult<Bytes> {
    let mut enc = Encoder::new();
    value.encode(&mut enc)?;
    Ok(enc.finish())
}

/// Decode a value that must occupy the whole input
pub fn from_bytes<T: Decode>(input: &[u8]) -> CodecResult<T> {
    let mut dec = Decoder::new(input);
    let value = T::decode(&mut dec)?;
    dec.finish(std::any::type_name::<T>())?;
    Ok(value)
}

/// Append-only big-endian writer
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    /// Write a `u16` element count
    pub fn put_count(&mut self, count: usize, context: &'static str) -> CodecResult<()> {
        if count > MAX_COUNT {
            return Err(CodecError::too_large(count, MAX_COUNT, context));
        }
        self.buf.put_u16(count as u16);
        Ok(())
    }

    pub fn put_str(&mut self, s: &str) -> CodecResult<()> {
        self.put_count(s.len(), "string")?;
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    pub fn put_seq<T: Encode>(&mut self, items: &[T]) -> CodecResult<()> {
        self.put_count(items.len(), "sequence")?;
        for item in items {
            item.encode(self)?;
        }
        Ok(())
    }

    pub fn put_var_size(&mut self, value: u64) {
        write_var_size(&mut self.buf, value);
    }

    /// Size-marker prefixed opaque bytes
    pub fn put_blob(&mut self, data: &[u8]) {
        self.put_var_size(data.len() as u64);
        self.buf.put_slice(data);
    }

    /// Bytes written verbatim, no prefix
    pub fn put_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn put<T: Encode + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        value.encode(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a borrowed input
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

macro_rules! get_fixed {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> CodecResult<$ty> {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            let raw = self.take(WIDTH, stringify!($ty))?;
            let mut bytes = [0u8; WIDTH];
            bytes.copy_from_slice(raw);
            Ok(<$ty>::from_be_bytes(bytes))
        }
    };
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::truncated(n, self.remaining(), context));
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    get_fixed!(get_u8, u8);
    get_fixed!(get_u16, u16);
    get_fixed!(get_u32, u32);
    get_fixed!(get_u64, u64);
    get_fixed!(get_i8, i8);
    get_fixed!(get_i16, i16);
    get_fixed!(get_i32, i32);
    get_fixed!(get_i64, i64);

    pub fn get_bool(&mut self) -> CodecResult<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_count(&mut self) -> CodecResult<usize> {
        Ok(self.get_u16()? as usize)
    }

    pub fn get_str(&mut self) -> CodecResult<String> {
        let len = self.get_count()?;
        let raw = self.take(len, "string")?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn get_seq<T: Decode>(&mut self) -> CodecResult<Vec<T>> {
        let count = self.get_count()?;
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    pub fn get_var_size(&mut self) -> CodecResult<u64> {
        let (value, used) = read_var_size(&self.input[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    pub fn get_blob(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.get_var_size()?;
        let len = usize::try_from(len)
            .map_err(|_| CodecError::too_large(usize::MAX, self.remaining(), "blob"))?;
        self.take(len, "blob")
    }

    /// Consume everything left
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.input[self.pos..];
        self.pos = self.input.len();
        slice
    }

    pub fn get<T: Decode>(&mut self) -> CodecResult<T> {
        T::decode(self)
    }

    /// Fail if any input is left
    pub fn finish(self, context: &'static str) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(CodecError::TrailingBytes { remaining, context }),
        }
    }
}

macro_rules! impl_fixed {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Encode for $ty {
            fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
                enc.$put(*self);
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
                dec.$get()
            }
        }
    };
}

impl_fixed!(u8, put_u8, get_u8);
impl_fixed!(u16, put_u16, get_u16);
impl_fixed!(u32, put_u32, get_u32);
impl_fixed!(u64, put_u64, get_u64);
impl_fixed!(i8, put_i8, get_i8);
impl_fixed!(i16, put_i16, get_i16);
impl_fixed!(i32, put_i32, get_i32);
impl_fixed!(i64, put_i64, get_i64);
impl_fixed!(bool, put_bool, get_bool);

impl Encode for str {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_str(self)
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_str(self)
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        dec.get_str()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_seq(self)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        dec.get_seq()
    }
}

impl Encode for ActorId {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_u32(self.raw());
        Ok(())
    }
}

impl Decode for ActorId {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(ActorId::new(dec.get_u32()?))
    }
}

impl Encode for Bytes {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_blob(self);
        Ok(())
    }
}

impl Decode for Bytes {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Bytes::copy_from_slice(dec.get_blob()?))
    }
}

/// Already-encoded bytes, written and read without any prefix
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload(pub Bytes);

impl Encode for RawPayload {
    fn encode(&self, enc: &mut Encoder) -> CodecResult<()> {
        enc.put_raw(&self.0);
        Ok(())
    }
}

impl Decode for RawPayload {
    fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(RawPayload(Bytes::copy_from_slice(dec.rest())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut enc = Encoder::new();
        enc.put_u16(0x0102);
        enc.put_i32(-2);
        assert_eq!(&enc.finish()[..], &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_string_has_u16_prefix() {
        let bytes = to_bytes("hey").unwrap();
        assert_eq!(&bytes[..], &[0, 3, b'h', b'e', b'y']);
        assert_eq!(from_bytes::<String>(&bytes).unwrap(), "hey");
    }

    #[test]
    fn test_sequence_of_actor_ids() {
        let ids = vec![ActorId::new(1), ActorId::new(300)];
        let bytes = to_bytes(&ids).unwrap();
        assert_eq!(&bytes[..], &[0, 2, 0, 0, 0, 1, 0, 0, 1, 44]);
        assert_eq!(from_bytes::<Vec<ActorId>>(&bytes).unwrap(), ids);
    }

    #[test]
    fn test_oversized_string_rejected() {
        let long = "x".repeat(MAX_COUNT + 1);
        assert!(matches!(
            to_bytes(long.as_str()),
            Err(CodecError::TooLarge { context: "string", .. })
        ));
    }

    #[test]
    fn test_truncated_and_trailing_input() {
        assert!(matches!(
            from_bytes::<u32>(&[0, 1]),
            Err(CodecError::Truncated { need: 4, got: 2, .. })
        ));
        assert!(matches!(
            from_bytes::<u8>(&[1, 2]),
            Err(CodecError::TrailingBytes { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(
            from_bytes::<String>(&[0, 2, 0xC3, 0x28]),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn test_blob_uses_size_marker() {
        let payload = Bytes::from(vec![7u8; 300]);
        let bytes = to_bytes(&payload).unwrap();
        assert_eq!(&bytes[..3], &[0xFD, 0x01, 0x2C]);
        assert_eq!(from_bytes::<Bytes>(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_raw_payload_is_verbatim() {
        let raw = RawPayload(Bytes::from_static(b"abc"));
        assert_eq!(&to_bytes(&raw).unwrap()[..], b"abc");
        assert_eq!(from_bytes::<RawPayload>(b"abc").unwrap(), raw);
    }
}
