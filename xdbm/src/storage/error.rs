//! Errors reported by the record manager and the layers below it.

use crate::codec::CodecError;
use crate::storage::file::FileError;
use crate::storage::log::LogError;
use crate::storage::page::{PageError, PageId};
use crate::storage::recman::RecordId;
use crate::storage::superblock::SuperblockError;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error.
    Io(std::io::Error),
    /// Page out of bounds.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
    /// Superblock error.
    Superblock(SuperblockError),
    /// Log error other than I/O.
    Log(LogError),
    /// Page contents failed validation.
    Corruption(String),
    /// No live record under this id.
    RecordNotFound(RecordId),
    /// Bookkeeping violation or an operation issued in the wrong state.
    IllegalState(String),
    /// The record manager was closed.
    Closed,
}

impl StoreError {
    #[must_use]
    pub const fn is_io_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Log(LogError::Io(_)))
    }

    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_) | Self::Closed)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => write!(
                f,
                "page {page_id} out of bounds (total pages: {total_pages})"
            ),
            Self::Superblock(e) => write!(f, "superblock error: {e}"),
            Self::Log(e) => write!(f, "transaction log error: {e}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::RecordNotFound(recid) => write!(f, "record {recid} not found"),
            Self::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Self::Closed => write!(f, "record manager is closed"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Superblock(e) => Some(e),
            Self::Log(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FileError> for StoreError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => Self::Io(e),
            FileError::Superblock(e) => Self::Superblock(e),
            FileError::PageOutOfBounds {
                page_id,
                total_pages,
            } => Self::PageOutOfBounds {
                page_id,
                total_pages,
            },
            FileError::AlreadyExists(path) => {
                Self::IllegalState(format!("file already exists: {}", path.display()))
            }
        }
    }
}

impl From<LogError> for StoreError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Io(e) => Self::Io(e),
            other => Self::Log(other),
        }
    }
}

impl From<PageError> for StoreError {
    fn from(e: PageError) -> Self {
        if e.is_illegal_state() {
            Self::IllegalState(e.to_string())
        } else {
            Self::Corruption(e.to_string())
        }
    }
}

impl From<SuperblockError> for StoreError {
    fn from(e: SuperblockError) -> Self {
        Self::Superblock(e)
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        Self::Corruption(e.to_string())
    }
}
