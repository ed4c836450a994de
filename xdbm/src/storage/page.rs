//! Page types and constants for the block store.
//!
//! The store uses 8KB pages as the fundamental unit of I/O. A cached page
//! also tracks whether it was modified since it was last logged (`dirty`)
//! and how many committed transactions touched it that have not yet been
//! written back to the data file (`transaction_count`).
//!
//! # Invariants
//!
//! - A page with `transaction_count > 0` keeps its identity: it cannot be
//!   given a new page id or recycled until a checkpoint brings the count
//!   back to zero.
//! - `transaction_count` never goes below zero.

use std::fmt;

/// Page size in bytes (8KB).
pub const PAGE_SIZE: usize = 8192;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// A page identifier (0-indexed page number).
pub type PageId = u64;

/// Page type identifiers stored in page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// Superblock (page 0 only)
    Superblock = 0x01,
    /// One page of a record chain
    Record = 0x02,
    /// Free page (on free list)
    Free = 0x03,
}

impl TryFrom<u8> for PageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Superblock),
            0x02 => Ok(Self::Record),
            0x03 => Ok(Self::Free),
            _ => Err(value),
        }
    }
}

/// Common page header present at the start of every page (except superblock).
///
/// Layout:
/// - `page_type`: 1 byte
/// - `flags`: 1 byte
/// - `checksum`: 4 bytes (CRC32, big-endian)
/// - `reserved`: 2 bytes
///
/// Total: 8 bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub flags: u8,
    pub checksum: u32,
}

impl PageHeader {
    /// Size of the page header in bytes.
    pub const SIZE: usize = 8;

    /// Usable space in a page after the header.
    pub const USABLE_SPACE: usize = PAGE_SIZE - Self::SIZE;

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.page_type as u8;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Deserialize a header from bytes.
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Result<Self, PageError> {
        let page_type = PageType::try_from(bytes[0]).map_err(PageError::InvalidPageType)?;
        Ok(Self {
            page_type,
            flags: bytes[1],
            checksum: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        })
    }
}

/// A cached page: its id, its bytes and its bookkeeping.
pub struct Page {
    id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    dirty: bool,
    transaction_count: u32,
}

impl Page {
    /// Create a new zeroed page with the given id.
    #[must_use]
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: Box::new([0u8; PAGE_SIZE]),
            dirty: false,
            transaction_count: 0,
        }
    }

    /// Create a clean page holding a copy of `bytes`.
    #[must_use]
    pub fn from_bytes(id: PageId, bytes: &[u8; PAGE_SIZE]) -> Self {
        let mut page = Self::new(id);
        page.data.copy_from_slice(bytes);
        page
    }

    #[must_use]
    pub const fn id(&self) -> PageId {
        self.id
    }

    /// Give this page buffer a new identity.
    ///
    /// Clears the contents and the dirty flag.
    ///
    /// # Errors
    ///
    /// Fails while committed changes to the old identity are still waiting
    /// to be written back.
    pub fn set_id(&mut self, id: PageId) -> Result<(), PageError> {
        if self.transaction_count > 0 {
            return Err(PageError::InFlight {
                page_id: self.id,
                transaction_count: self.transaction_count,
            });
        }
        self.id = id;
        self.data.fill(0);
        self.dirty = false;
        Ok(())
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub const fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub const fn set_clean(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub const fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    /// Whether a committed change to this page is still only in the log.
    #[must_use]
    pub const fn is_in_transaction(&self) -> bool {
        self.transaction_count > 0
    }

    pub const fn increment_transaction_count(&mut self) {
        self.transaction_count += 1;
    }

    /// Record that one logged transaction touching this page was written back.
    ///
    /// # Errors
    ///
    /// Fails if no transaction was outstanding.
    pub const fn decrement_transaction_count(&mut self) -> Result<(), PageError> {
        if self.transaction_count == 0 {
            return Err(PageError::TransactionCountUnderflow(self.id));
        }
        self.transaction_count -= 1;
        Ok(())
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Mutable access to the raw bytes for loading from disk.
    ///
    /// Does not mark the page dirty.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Zero the page. Marks the page dirty.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.dirty = true;
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
        self.dirty = true;
    }

    /// Read a u16 (big-endian) at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a u16 (big-endian) at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    /// Read a u32 (big-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Write a u32 (big-endian) at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    /// Read a u64 (big-endian) at the given offset.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_be_bytes(bytes)
    }

    /// Write a u64 (big-endian) at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    /// Parse the page header.
    pub fn header(&self) -> Result<PageHeader, PageError> {
        let mut bytes = [0u8; PageHeader::SIZE];
        bytes.copy_from_slice(&self.data[..PageHeader::SIZE]);
        PageHeader::from_bytes(bytes)
    }

    /// Start the page with a fresh header of the given type.
    pub fn write_header(&mut self, page_type: PageType) {
        let header = PageHeader {
            page_type,
            flags: 0,
            checksum: 0,
        };
        self.write_bytes(0, &header.to_bytes());
    }

    /// Compute CRC32 checksum of the page data (excluding the checksum field itself).
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[0..2]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[6..]);
        hasher.finalize()
    }

    /// Store the checksum in the header. Does not change the dirty flag.
    pub fn stamp_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.data[2..6].copy_from_slice(&checksum.to_be_bytes());
    }

    /// Check the stored checksum against the contents.
    pub fn verify_checksum(&self) -> Result<(), PageError> {
        let expected = self.read_u32(2);
        let actual = self.compute_checksum();
        if expected == actual {
            Ok(())
        } else {
            Err(PageError::ChecksumMismatch {
                page_id: self.id,
                expected,
                actual,
            })
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("dirty", &self.dirty)
            .field("transaction_count", &self.transaction_count)
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

/// Errors related to page operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Invalid page type byte.
    InvalidPageType(u8),
    /// Checksum mismatch.
    ChecksumMismatch {
        page_id: PageId,
        expected: u32,
        actual: u32,
    },
    /// The page still has committed changes waiting for write-back.
    InFlight {
        page_id: PageId,
        transaction_count: u32,
    },
    /// More write-backs were recorded than transactions.
    TransactionCountUnderflow(PageId),
}

impl PageError {
    /// Whether the error is a bookkeeping violation rather than bad data.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::InFlight { .. } | Self::TransactionCountUnderflow(_)
        )
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPageType(v) => write!(f, "invalid page type: 0x{v:02x}"),
            Self::ChecksumMismatch {
                page_id,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch on page {page_id}: expected {expected}, got {actual}"
            ),
            Self::InFlight {
                page_id,
                transaction_count,
            } => write!(
                f,
                "page {page_id} has {transaction_count} unflushed transactions"
            ),
            Self::TransactionCountUnderflow(page_id) => {
                write!(f, "page {page_id} transaction count would go below zero")
            }
        }
    }
}

impl std::error::Error for PageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_header_roundtrip() {
        let header = PageHeader {
            page_type: PageType::Record,
            flags: 0x42,
            checksum: 0xDEAD_BEEF,
        };

        let restored = PageHeader::from_bytes(header.to_bytes()).expect("should parse");
        assert_eq!(restored, header);
    }

    #[test]
    fn test_page_read_write_big_endian() {
        let mut page = Page::new(3);
        assert!(!page.is_dirty());

        page.write_u16(10, 0x0102);
        assert_eq!(page.read_bytes(10, 2), &[0x01, 0x02]);
        assert!(page.is_dirty());

        page.write_u32(100, 0x1234_5678);
        assert_eq!(page.read_u32(100), 0x1234_5678);
        assert_eq!(page.read_u8(100), 0x12);

        page.write_u64(200, 0x0102_0304_0506_0708);
        assert_eq!(page.read_u64(200), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_transaction_count_guards_identity() {
        let mut page = Page::new(7);
        page.increment_transaction_count();
        assert!(page.is_in_transaction());

        let err = page.set_id(8).expect_err("in-flight page keeps its id");
        assert!(err.is_illegal_state());
        assert_eq!(page.id(), 7);

        page.decrement_transaction_count().expect("one outstanding");
        page.set_id(8).expect("page is idle");
        assert_eq!(page.id(), 8);

        assert_eq!(
            page.decrement_transaction_count(),
            Err(PageError::TransactionCountUnderflow(8))
        );
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut page = Page::new(1);
        page.write_header(PageType::Record);
        page.write_bytes(64, b"payload");
        page.stamp_checksum();
        page.verify_checksum().expect("fresh checksum");

        page.write_u8(64, b'P');
        assert!(matches!(
            page.verify_checksum(),
            Err(PageError::ChecksumMismatch { page_id: 1, .. })
        ));
    }

    #[test]
    fn test_page_type_conversion() {
        assert_eq!(PageType::try_from(0x01), Ok(PageType::Superblock));
        assert_eq!(PageType::try_from(0x02), Ok(PageType::Record));
        assert!(PageType::try_from(0xFF).is_err());
    }
}
