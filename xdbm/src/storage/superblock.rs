//! Superblock structure and serialization.
//!
//! The superblock occupies page 0 and contains metadata about the store file.
//! It goes through the block cache like any other page, so its changes are
//! logged and rolled back together with the records they describe.

// PAGE_SIZE is a compile-time constant that fits in u32.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::page::{PAGE_SIZE, Page, PageId};

/// Magic number identifying a store file: "XDBMFILE"
pub const MAGIC: [u8; 8] = *b"XDBMFILE";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Page size as u32 for storage in superblock.
const PAGE_SIZE_U32: u32 = PAGE_SIZE as u32;

/// Superblock field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const PAGE_SIZE: usize = 12;
    pub const TOTAL_PAGE_COUNT: usize = 16;
    pub const FREE_LIST_HEAD: usize = 24;
    pub const FREE_PAGE_COUNT: usize = 32;
    pub const DIRECTORY_RECORD: usize = 40;
    pub const NEXT_TXN_ID: usize = 48;
    // 56-8191: reserved
}

/// The superblock contains all metadata about the store file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Format version number.
    pub format_version: u32,
    /// Page size in bytes (should always be `PAGE_SIZE`).
    pub page_size: u32,
    /// Number of pages handed out so far, including page 0.
    pub total_page_count: u64,
    /// Head of the free page list, 0 when empty.
    pub free_list_head: PageId,
    /// Number of pages on the free list.
    pub free_page_count: u64,
    /// Record holding the named-root directory, 0 when no root was ever set.
    pub directory_record: u64,
    /// Next transaction ID to assign.
    pub next_txn_id: u64,
}

impl Superblock {
    /// Create a new superblock with default values for a fresh store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            page_size: PAGE_SIZE_U32,
            total_page_count: 1,
            free_list_head: 0,
            free_page_count: 0,
            directory_record: 0,
            next_txn_id: 1,
        }
    }

    /// Serialize the superblock into page 0.
    pub fn write_to(&self, page: &mut Page) {
        page.write_bytes(offsets::MAGIC, &MAGIC);
        page.write_u32(offsets::FORMAT_VERSION, self.format_version);
        page.write_u32(offsets::PAGE_SIZE, self.page_size);
        page.write_u64(offsets::TOTAL_PAGE_COUNT, self.total_page_count);
        page.write_u64(offsets::FREE_LIST_HEAD, self.free_list_head);
        page.write_u64(offsets::FREE_PAGE_COUNT, self.free_page_count);
        page.write_u64(offsets::DIRECTORY_RECORD, self.directory_record);
        page.write_u64(offsets::NEXT_TXN_ID, self.next_txn_id);
    }

    /// Deserialize a superblock from a page.
    pub fn from_page(page: &Page) -> Result<Self, SuperblockError> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(page.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(SuperblockError::InvalidMagic(magic));
        }

        let format_version = page.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(SuperblockError::UnsupportedVersion(format_version));
        }

        let page_size = page.read_u32(offsets::PAGE_SIZE);
        if page_size != PAGE_SIZE_U32 {
            return Err(SuperblockError::InvalidPageSize(page_size));
        }

        let total_page_count = page.read_u64(offsets::TOTAL_PAGE_COUNT);
        let free_list_head = page.read_u64(offsets::FREE_LIST_HEAD);
        if total_page_count == 0 || free_list_head >= total_page_count {
            return Err(SuperblockError::InvalidFreeList {
                head: free_list_head,
                total_pages: total_page_count,
            });
        }

        Ok(Self {
            format_version,
            page_size,
            total_page_count,
            free_list_head,
            free_page_count: page.read_u64(offsets::FREE_PAGE_COUNT),
            directory_record: page.read_u64(offsets::DIRECTORY_RECORD),
            next_txn_id: page.read_u64(offsets::NEXT_TXN_ID),
        })
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when reading a superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuperblockError {
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Invalid page size.
    InvalidPageSize(u32),
    /// The free list head points past the end of the file.
    InvalidFreeList { head: PageId, total_pages: u64 },
}

impl std::fmt::Display for SuperblockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::InvalidPageSize(s) => write!(f, "invalid page size: {s}"),
            Self::InvalidFreeList { head, total_pages } => write!(
                f,
                "free list head {head} outside file of {total_pages} pages"
            ),
        }
    }
}

impl std::error::Error for SuperblockError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_roundtrip() {
        let mut sb = Superblock::new();
        sb.total_page_count = 128;
        sb.free_list_head = 15;
        sb.free_page_count = 3;
        sb.directory_record = 9;
        sb.next_txn_id = 42;

        let mut page = Page::new(0);
        sb.write_to(&mut page);
        let restored = Superblock::from_page(&page).expect("should parse");

        assert_eq!(restored, sb);
        assert_eq!(page.read_bytes(0, 8), b"XDBMFILE");
    }

    #[test]
    fn test_superblock_invalid_magic() {
        let mut page = Page::new(0);
        page.write_bytes(0, b"BADMAGIC");

        let result = Superblock::from_page(&page);
        assert!(matches!(result, Err(SuperblockError::InvalidMagic(_))));
    }

    #[test]
    fn test_superblock_rejects_dangling_free_list() {
        let mut sb = Superblock::new();
        sb.free_list_head = 4;

        let mut page = Page::new(0);
        sb.write_to(&mut page);
        assert_eq!(
            Superblock::from_page(&page),
            Err(SuperblockError::InvalidFreeList {
                head: 4,
                total_pages: 1
            })
        );
    }
}
