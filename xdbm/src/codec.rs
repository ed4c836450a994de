//! Byte encoding for keys, values and on-disk records.
//!
//! Everything stored through the record manager is turned into bytes with a
//! [`Codec`]. Multi-byte integers are big-endian; variable-length fields are
//! prefixed with a `u32` length.

#![allow(clippy::cast_possible_truncation)]

use crate::types::EntryId;

/// Errors that can occur while decoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a field was complete.
    UnexpectedEof { needed: usize, remaining: usize },
    /// The bytes are not valid UTF-8.
    InvalidUtf8,
    /// A fixed-width field had the wrong length.
    InvalidLength { expected: usize, actual: usize },
    /// An enum tag byte has no meaning.
    InvalidTag(u8),
    /// Bytes were left over after decoding.
    TrailingBytes(usize),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { needed, remaining } => write!(
                f,
                "unexpected end of input: needed {needed} bytes, {remaining} remaining"
            ),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Self::InvalidLength { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            Self::InvalidTag(tag) => write!(f, "invalid tag byte 0x{tag:02x}"),
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes after record"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Conversion between a value and its stored bytes.
pub trait Codec: Sized {
    /// Append the encoded form of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a value from exactly `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

impl Codec for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

impl Codec for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl Codec for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(Self::from_be_bytes(array))
    }
}

impl Codec for () {
    fn encode(&self, _out: &mut Vec<u8>) {}

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(bytes.len()))
        }
    }
}

impl Codec for EntryId {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let array: [u8; 16] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

/// Appends big-endian fields to a buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a length-prefixed string.
    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a length-prefixed encoded value.
    pub fn put_encoded<T: Codec>(&mut self, value: &T) {
        let start = self.buf.len();
        self.put_u32(0);
        value.encode(&mut self.buf);
        let len = (self.buf.len() - start - 4) as u32;
        self.buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads big-endian fields from a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.bytes.len() - self.pos;
        if n > remaining {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        u64::decode(bytes)
    }

    pub fn get_str(&mut self) -> Result<String, CodecError> {
        let len = self.get_u32()? as usize;
        String::decode(self.take(len)?)
    }

    pub fn get_decoded<T: Codec>(&mut self) -> Result<T, CodecError> {
        let len = self.get_u32()? as usize;
        T::decode(self.take(len)?)
    }

    /// Read an element count, rejecting counts the remaining input cannot
    /// hold when each element takes at least `min_size` bytes.
    pub fn get_count(&mut self, min_size: usize) -> Result<usize, CodecError> {
        let count = self.get_u32()? as usize;
        let needed = count.saturating_mul(min_size);
        let remaining = self.bytes.len() - self.pos;
        if needed > remaining {
            return Err(CodecError::UnexpectedEof { needed, remaining });
        }
        Ok(count)
    }

    /// Fail unless every byte has been consumed.
    pub const fn finish(&self) -> Result<(), CodecError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining == 0 {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_is_big_endian() {
        assert_eq!(258u64.to_bytes(), vec![0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(u64::decode(&[0, 0, 0, 0, 0, 0, 1, 2]), Ok(258));
        assert!(u64::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut writer = ByteWriter::new();
        writer.put_str("hello");
        let mut bytes = writer.into_bytes();
        bytes.truncate(6);

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(
            reader.get_str(),
            Err(CodecError::UnexpectedEof {
                needed: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_mixed_fields() {
        let mut writer = ByteWriter::new();
        writer.put_u8(7);
        writer.put_encoded(&"key".to_string());
        writer.put_u64(42);
        let bytes = writer.into_bytes();

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.get_u8(), Ok(7));
        assert_eq!(reader.get_decoded::<String>(), Ok("key".to_string()));
        assert_eq!(reader.get_u64(), Ok(42));
        assert_eq!(reader.finish(), Ok(()));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(String::decode(&[0xff, 0xfe]), Err(CodecError::InvalidUtf8));
    }
}
