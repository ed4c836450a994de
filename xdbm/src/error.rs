//! Crate-level error type.
//!
//! Every layer above the raw storage files reports failures through
//! [`Error`]. The storage layer has its own [`StoreError`] which is wrapped
//! here, so callers can tell an I/O failure apart from a misuse of the API
//! without matching on every variant.

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::storage::StoreError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by trees, tables, indices and cursors.
#[derive(Debug)]
pub enum Error {
    /// The record manager or one of its files failed.
    Store(StoreError),
    /// A stored record could not be decoded.
    Codec(CodecError),
    /// `get()` was called on a cursor that is not positioned on an element.
    InvalidPosition,
    /// The cursor was closed. `cause` carries the reason given to `close_with`.
    CursorClosed { cause: Option<String> },
    /// An insert without replacement hit an existing key.
    DuplicateKey,
    /// A persisted tree was ordered by a different comparator than the one supplied.
    ComparatorMismatch { expected: String, found: String },
    /// A persisted table does not match the layout it was reopened with.
    TableMismatch { table: String, message: String },
    /// The table was closed.
    TableClosed(String),
    /// Configuration could not be loaded.
    Config(ConfigError),
}

impl Error {
    /// Whether this error comes from the filesystem (read, write, sync, truncate).
    #[must_use]
    pub const fn is_io_failure(&self) -> bool {
        match self {
            Self::Store(e) => e.is_io_failure(),
            _ => false,
        }
    }

    /// Whether this error reports an operation issued in a state that cannot serve it.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        match self {
            Self::Store(e) => e.is_illegal_state(),
            Self::InvalidPosition | Self::CursorClosed { .. } | Self::TableClosed(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::InvalidPosition => write!(f, "cursor is not positioned on an element"),
            Self::CursorClosed { cause: Some(cause) } => write!(f, "cursor closed: {cause}"),
            Self::CursorClosed { cause: None } => write!(f, "cursor closed"),
            Self::DuplicateKey => write!(f, "key already present"),
            Self::ComparatorMismatch { expected, found } => write!(
                f,
                "tree was built with comparator '{found}', opened with '{expected}'"
            ),
            Self::TableMismatch { table, message } => write!(f, "table {table}: {message}"),
            Self::TableClosed(name) => write!(f, "table {name} is closed"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let io = Error::Store(StoreError::Io(std::io::Error::other("disk gone")));
        assert!(io.is_io_failure());
        assert!(!io.is_illegal_state());

        assert!(Error::InvalidPosition.is_illegal_state());
        assert!(Error::CursorClosed { cause: None }.is_illegal_state());
        assert!(Error::Store(StoreError::Closed).is_illegal_state());
        assert!(!Error::DuplicateKey.is_illegal_state());
    }

    #[test]
    fn test_cursor_closed_display_keeps_cause() {
        let e = Error::CursorClosed {
            cause: Some("search abandoned".to_string()),
        };
        assert_eq!(e.to_string(), "cursor closed: search abandoned");
    }
}
