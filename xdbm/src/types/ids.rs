//! Entry identifiers.
//!
//! Indices map attribute values to the entries holding them. An entry is
//! named by a fixed-width [`EntryId`] so reverse tables can order ids with
//! a plain byte comparison.

use std::fmt;

/// A unique identifier for a directory entry.
///
/// Wraps a 16-byte array. The inner field is public to allow direct access
/// to the bytes when needed for serialization or storage operations.
///
/// # Invariants
///
/// - The ID is exactly 16 bytes.
/// - Ordering is lexicographic over the bytes, so ids built with
///   [`EntryId::from_u64`] sort numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId(pub [u8; 16]);

impl EntryId {
    /// Create an entry ID from a string.
    ///
    /// Uses the first 16 bytes of the string, zero-padded if shorter.
    /// Truncates if longer than 16 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use xdbm::types::EntryId;
    /// let id = EntryId::from_string("entry1");
    /// assert_eq!(&id.0[..6], b"entry1");
    /// ```
    #[must_use]
    pub fn from_string(s: &str) -> Self {
        let mut bytes = [0u8; 16];
        let src = s.as_bytes();
        let len = src.len().min(16);
        bytes[..len].copy_from_slice(&src[..len]);
        Self(bytes)
    }

    /// Create an entry ID from a sequence number.
    ///
    /// The number is stored big-endian in the last 8 bytes so that byte
    /// order and numeric order agree.
    #[must_use]
    pub fn from_u64(n: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Get the underlying byte array.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Printable ids are shown as text, everything else as hex
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.trim_end_matches('\0').chars().all(|c| !c.is_control()) => {
                write!(f, "{}", s.trim_end_matches('\0'))
            }
            _ => {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<[u8; 16]> for EntryId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl From<EntryId> for [u8; 16] {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_pads_and_truncates() {
        let short = EntryId::from_string("abc");
        assert_eq!(&short.0[..3], b"abc");
        assert!(short.0[3..].iter().all(|&b| b == 0));

        let long = EntryId::from_string("0123456789abcdefXYZ");
        assert_eq!(&long.0, b"0123456789abcdef");
    }

    #[test]
    fn test_from_u64_orders_numerically() {
        assert!(EntryId::from_u64(2) < EntryId::from_u64(10));
        assert!(EntryId::from_u64(255) < EntryId::from_u64(256));
    }

    #[test]
    fn test_display() {
        assert_eq!(EntryId::from_string("entry7").to_string(), "entry7");
        let numeric = EntryId::from_u64(1).to_string();
        assert_eq!(numeric, "00000000000000000000000000000001");
    }
}
