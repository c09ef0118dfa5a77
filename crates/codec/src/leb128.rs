//! Wire primitives: LEB128 and zig-zag
//!
//! Little-endian base-128 with the continuation bit in the MSB, as in
//! the DWARF spec. Unsigned LEB128 carries lengths, counts and tag
//! indices (bounded to u64); East integers are unbounded, so their
//! zig-zag magnitude is carried as an arbitrary-length LEB128 over a
//! `BigUint`. Signed 64-bit quantities (datetime millis) use the usual
//! `(n << 1) ^ (n >> 63)` mapping.

use east_core::{Error, ErrorKind, Result};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Signed, Zero};

/// A cursor over wire bytes. Every read is bounds-checked; running off
/// the end is a `DecodingError`.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_finished(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// The unread remainder of the input.
    pub fn tail(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Skip bytes already consumed through [`ByteReader::tail`].
    pub fn advance(&mut self, len: usize) -> Result<()> {
        self.read_exact(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| truncated("byte"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| truncated("bytes"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Unsigned LEB128, at most 64 bits of payload.
    pub fn read_uleb(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(Error::new(
                    ErrorKind::DecodingError,
                    "LEB128 value overruns 64 bits",
                ));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// A length prefix. Rejects lengths that could not possibly fit in
    /// the remaining input, so corrupted prefixes fail before any
    /// allocation.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_uleb()?;
        let len = usize::try_from(len)
            .map_err(|_| Error::new(ErrorKind::DecodingError, "impossible length"))?;
        if len > self.remaining() {
            return Err(Error::new(
                ErrorKind::DecodingError,
                format!("length {} exceeds remaining {} bytes", len, self.remaining()),
            ));
        }
        Ok(len)
    }

    /// Unbounded zig-zag LEB128, producing an arbitrary-precision
    /// integer.
    pub fn read_zigzag_big(&mut self) -> Result<BigInt> {
        let mut magnitude = BigUint::zero();
        let mut shift: u64 = 0;
        const MAX_BITS: u64 = 1 << 20;
        loop {
            let byte = self.read_u8()?;
            if shift > MAX_BITS {
                return Err(Error::new(
                    ErrorKind::DecodingError,
                    "integer exceeds the codec's bit budget",
                ));
            }
            magnitude |= BigUint::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        // Undo zig-zag: even magnitudes are non-negative.
        let value = if (&magnitude & BigUint::one()).is_zero() {
            BigInt::from_biguint(Sign::Plus, magnitude >> 1)
        } else {
            -BigInt::from_biguint(Sign::Plus, (magnitude + BigUint::one()) >> 1)
        };
        Ok(value)
    }

    /// Zig-zag LEB128 bounded to i64.
    pub fn read_zigzag_i64(&mut self) -> Result<i64> {
        let encoded = self.read_uleb()?;
        Ok(((encoded >> 1) as i64) ^ -((encoded & 1) as i64))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_exact(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.read_exact(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::new(ErrorKind::DecodingError, "invalid UTF-8 in string"))
    }
}

fn truncated(what: &str) -> Error {
    Error::new(
        ErrorKind::DecodingError,
        format!("truncated input while reading {}", what),
    )
}

pub fn write_uleb(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub fn write_len(len: usize, out: &mut Vec<u8>) {
    write_uleb(len as u64, out);
}

/// Unbounded zig-zag LEB128 of an arbitrary-precision integer.
pub fn write_zigzag_big(value: &BigInt, out: &mut Vec<u8>) {
    let mut magnitude: BigUint = if value.is_negative() {
        ((-value).magnitude() << 1u32) - BigUint::one()
    } else {
        value.magnitude() << 1u32
    };
    loop {
        let low: u8 = (&magnitude & BigUint::from(0x7fu8))
            .try_into()
            .expect("masked to 7 bits");
        magnitude >>= 7;
        if magnitude.is_zero() {
            out.push(low);
            break;
        }
        out.push(low | 0x80);
    }
}

pub fn write_zigzag_i64(value: i64, out: &mut Vec<u8>) {
    let encoded = ((value << 1) ^ (value >> 63)) as u64;
    write_uleb(encoded, out);
}

pub fn write_string(s: &str, out: &mut Vec<u8>) {
    write_len(s.len(), out);
    out.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn roundtrip_big(n: BigInt) {
        let mut out = Vec::new();
        write_zigzag_big(&n, &mut out);
        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.read_zigzag_big().unwrap(), n);
        assert!(reader.is_finished());
    }

    #[test]
    fn test_uleb_known_bytes() {
        let mut out = Vec::new();
        write_uleb(624485, &mut out);
        // The DWARF spec example.
        assert_eq!(out, vec![0xe5, 0x8e, 0x26]);
        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.read_uleb().unwrap(), 624485);
    }

    #[test]
    fn test_zigzag_small_values() {
        // 0, -1, 1, -2, 2 map to 0, 1, 2, 3, 4.
        for (value, encoded) in [(0i64, 0u8), (-1, 1), (1, 2), (-2, 3), (2, 4)] {
            let mut out = Vec::new();
            write_zigzag_i64(value, &mut out);
            assert_eq!(out, vec![encoded], "zig-zag of {}", value);
        }
    }

    #[test]
    fn test_bigint_roundtrip_around_u64_boundary() {
        for offset in -1i64..=1 {
            let base = BigInt::from(2u8).pow(64);
            roundtrip_big(&base + offset);
            roundtrip_big(-(&base + offset));
        }
        roundtrip_big(BigInt::from(0));
        roundtrip_big(BigInt::parse_bytes(b"-170141183460469231731687303715884105728", 10).unwrap());
    }

    #[test]
    fn test_big_and_small_encodings_agree() {
        // The unbounded writer must produce the same bytes as the i64
        // writer for values both can express.
        for value in [0i64, 1, -1, 63, -64, 1000, -1000, i64::MAX, i64::MIN] {
            let mut big = Vec::new();
            write_zigzag_big(&BigInt::from(value), &mut big);
            let mut small = Vec::new();
            write_zigzag_i64(value, &mut small);
            assert_eq!(big, small, "encodings diverge for {}", value);
        }
    }

    #[test]
    fn test_truncated_leb_is_error() {
        // Continuation bit set but no next byte.
        let mut reader = ByteReader::new(&[0x80]);
        assert!(reader.read_uleb().is_err());
    }

    #[test]
    fn test_leb_overrun_is_error() {
        let bytes = [0xff; 11];
        let mut reader = ByteReader::new(&bytes);
        assert!(reader.read_uleb().is_err());
    }

    #[test]
    fn test_impossible_length_rejected() {
        let mut out = Vec::new();
        write_len(1000, &mut out);
        out.push(0);
        let mut reader = ByteReader::new(&out);
        let err = reader.read_len().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }

    #[test]
    fn test_string_roundtrip_with_multibyte() {
        let mut out = Vec::new();
        write_string("héllo 🌍", &mut out);
        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.read_string().unwrap(), "héllo 🌍");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut out = Vec::new();
        write_len(2, &mut out);
        out.extend_from_slice(&[0xff, 0xfe]);
        let mut reader = ByteReader::new(&out);
        let err = reader.read_string().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }
}
