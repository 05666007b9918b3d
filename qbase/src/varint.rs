//! QUIC variable-length integer encoding.
//!
//! See [section-16](https://www.rfc-editor.org/rfc/rfc9000.html#section-16)
//! of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for more details.

use bytes::{Buf, BufMut};
use nom::{IResult, Parser, error::ErrorKind as NomErrorKind};

/// The largest value a variable-length integer can encode, `2^62 - 1`.
pub const VARINT_MAX: u64 = (1 << 62) - 1;

/// A QUIC variable-length integer, guaranteed to be in `0..=VARINT_MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

/// Raised when a value does not fit in a [`VarInt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is too large for a QUIC variable-length integer")]
pub struct VarIntBoundsError(pub u64);

impl VarInt {
    /// The zero value.
    pub const ZERO: VarInt = VarInt(0);

    /// Build a [`VarInt`] from a `u64`, failing if it exceeds [`VARINT_MAX`].
    pub const fn from_u64(value: u64) -> Result<Self, VarIntBoundsError> {
        if value > VARINT_MAX {
            Err(VarIntBoundsError(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Build a [`VarInt`] from a `u32`; this can never overflow.
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    /// Return the inner `u64` value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// The number of bytes needed to encode this value: 1, 2, 4, or 8.
    pub const fn encoding_size(self) -> usize {
        match self.0 {
            0..=0x3f => 1,
            0x40..=0x3fff => 2,
            0x4000..=0x3fff_ffff => 4,
            _ => 8,
        }
    }
}

impl From<u8> for VarInt {
    fn from(value: u8) -> Self {
        Self(value as u64)
    }
}

impl From<u16> for VarInt {
    fn from(value: u16) -> Self {
        Self(value as u64)
    }
}

impl From<u32> for VarInt {
    fn from(value: u32) -> Self {
        Self(value as u64)
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntBoundsError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_u64(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = VarIntBoundsError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::from_u64(value as u64)
    }
}

impl From<VarInt> for u64 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl From<VarInt> for usize {
    fn from(value: VarInt) -> Self {
        value.0 as usize
    }
}

/// Parse a [`VarInt`] from a byte slice, [nom](https://docs.rs/nom/latest/nom/) parser style.
pub fn be_varint(input: &[u8]) -> IResult<&[u8], VarInt> {
    let first = *input
        .first()
        .ok_or(nom::Err::Incomplete(nom::Needed::new(1)))?;
    let len = 1usize << (first >> 6);
    if input.len() < len {
        return Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())));
    }
    let mut value = (first & 0x3f) as u64;
    for &byte in &input[1..len] {
        value = (value << 8) | byte as u64;
    }
    Ok((&input[len..], VarInt(value)))
}

/// Parse a [`VarInt`] and fail with a nom [`nom::error::Error`] of the given kind on truncation,
/// useful when composing with other nom combinators that need a concrete error type.
pub fn be_varint_with<'i>(
    kind: NomErrorKind,
) -> impl FnMut(&'i [u8]) -> IResult<&'i [u8], VarInt> {
    move |input| {
        be_varint
            .parse(input)
            .map_err(|_| nom::Err::Error(nom::error::Error::new(input, kind)))
    }
}

/// Write [`VarInt`]s into a [`bytes::BufMut`].
pub trait WriteVarInt {
    /// Encode `value` using the minimal number of bytes.
    fn put_varint(&mut self, value: &VarInt);
}

impl<T: BufMut> WriteVarInt for T {
    fn put_varint(&mut self, value: &VarInt) {
        let v = value.0;
        match value.encoding_size() {
            1 => self.put_u8(v as u8),
            2 => self.put_u16(v as u16 | 0x4000),
            4 => self.put_u32(v as u32 | 0x8000_0000),
            8 => self.put_u64(v | 0xc000_0000_0000_0000),
            _ => unreachable!(),
        }
    }
}

/// Read a single [`VarInt`] from a [`bytes::Buf`], consuming the bytes.
pub fn get_varint(buf: &mut impl Buf) -> Option<VarInt> {
    if !buf.has_remaining() {
        return None;
    }
    let chunk = buf.chunk();
    let (_, value) = be_varint(chunk).ok()?;
    let len = VarInt(value.0).encoding_size();
    buf.advance(len);
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for v in [0u64, 1, 63, 64, 16383, 16384, 0x3fff_ffff, 0x4000_0000, VARINT_MAX] {
            let vi = VarInt::from_u64(v).unwrap();
            let mut buf = bytes::BytesMut::new();
            buf.put_varint(&vi);
            assert_eq!(buf.len(), vi.encoding_size());
            let (rest, parsed) = be_varint(&buf).unwrap();
            assert!(rest.is_empty());
            assert_eq!(parsed.into_inner(), v);
        }
    }

    #[test]
    fn minimal_length() {
        assert_eq!(VarInt::from_u32(0).encoding_size(), 1);
        assert_eq!(VarInt::from_u32(0x3f).encoding_size(), 1);
        assert_eq!(VarInt::from_u32(0x40).encoding_size(), 2);
        assert_eq!(VarInt::from_u32(0x3fff).encoding_size(), 2);
        assert_eq!(VarInt::from_u32(0x4000).encoding_size(), 4);
        assert_eq!(VarInt::from_u32(0x3fff_ffff).encoding_size(), 4);
        assert_eq!(VarInt::from_u64(0x4000_0000).unwrap().encoding_size(), 8);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(VarInt::from_u64(VARINT_MAX + 1).is_err());
    }

    #[test]
    fn incomplete_input() {
        assert!(be_varint(&[]).is_err());
        assert!(be_varint(&[0xc0]).is_err());
    }
}
