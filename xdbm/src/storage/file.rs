//! Store file I/O operations.
//!
//! This module handles reading and writing whole pages of the data file.
//! It knows nothing about caching or transactions; the block store decides
//! when a page may be written.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageId};
use crate::storage::superblock::{Superblock, SuperblockError};

/// A store file handle with low-level page I/O operations.
pub struct DatabaseFile {
    file: File,
    path: PathBuf,
}

impl DatabaseFile {
    /// Create a new store file at the given path holding a fresh superblock.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, FileError> {
        if path.exists() {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(FileError::Io)?;

        let mut page = Page::new(0);
        Superblock::new().write_to(&mut page);
        file.write_all(page.as_bytes()).map_err(FileError::Io)?;
        file.sync_all().map_err(FileError::Io)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store file and validate its superblock.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        let mut db = Self {
            file,
            path: path.to_path_buf(),
        };
        let page = db.read_page(0)?;
        Superblock::from_page(&page).map_err(FileError::Superblock)?;
        Ok(db)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole pages currently in the file.
    pub fn page_count(&self) -> Result<u64, FileError> {
        let len = self.file.metadata().map_err(FileError::Io)?.len();
        Ok(len / PAGE_SIZE_U64)
    }

    /// Read a page from the file.
    ///
    /// Returns an error if the page lies beyond the end of the file.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page, FileError> {
        let mut page = Page::new(page_id);
        self.read_into(&mut page)?;
        Ok(page)
    }

    /// Fill `page` with the on-disk contents of `page.id()`.
    pub fn read_into(&mut self, page: &mut Page) -> Result<(), FileError> {
        let page_id = page.id();
        let total_pages = self.page_count()?;
        if page_id >= total_pages {
            return Err(FileError::PageOutOfBounds {
                page_id,
                total_pages,
            });
        }

        self.file
            .seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))
            .map_err(FileError::Io)?;
        self.file
            .read_exact(page.as_bytes_mut())
            .map_err(FileError::Io)
    }

    /// Write a page image to the file, extending it when needed.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<(), FileError> {
        self.file
            .seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))
            .map_err(FileError::Io)?;
        self.file.write_all(data).map_err(FileError::Io)
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), FileError> {
        self.file.sync_all().map_err(FileError::Io)
    }
}

/// Errors that can occur during file operations.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// Superblock error.
    Superblock(SuperblockError),
    /// Page out of bounds.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
            Self::Superblock(e) => write!(f, "superblock error: {e}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => write!(
                f,
                "page {page_id} out of bounds (total pages: {total_pages})"
            ),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Superblock(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");

        let db = DatabaseFile::create(&path).expect("should create");
        assert_eq!(db.page_count().expect("count"), 1);
        drop(db);

        let mut db = DatabaseFile::open(&path).expect("should open");
        let page = db.read_page(0).expect("superblock page");
        let sb = Superblock::from_page(&page).expect("valid superblock");
        assert_eq!(sb.total_page_count, 1);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        DatabaseFile::create(&path).expect("should create");

        assert!(matches!(
            DatabaseFile::create(&path),
            Err(FileError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_write_extends_and_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let mut db = DatabaseFile::create(&path).expect("should create");

        let data = [0x5Au8; PAGE_SIZE];
        db.write_page(3, &data).expect("write");
        assert_eq!(db.page_count().expect("count"), 4);

        let page = db.read_page(3).expect("read");
        assert_eq!(page.as_bytes(), &data);
        assert!(matches!(
            db.read_page(4),
            Err(FileError::PageOutOfBounds {
                page_id: 4,
                total_pages: 4
            })
        ));
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("foreign.db");
        std::fs::write(&path, vec![7u8; PAGE_SIZE]).expect("write foreign file");

        assert!(matches!(
            DatabaseFile::open(&path),
            Err(FileError::Superblock(SuperblockError::InvalidMagic(_)))
        ));
    }
}
