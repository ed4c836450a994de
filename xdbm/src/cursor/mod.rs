//! The cursor protocol shared by trees, duplicate containers and tables.
//!
//! A cursor is a single-threaded traversal handle. It starts unpositioned,
//! is positioned with [`before_first`](Cursor::before_first),
//! [`after_last`](Cursor::after_last), [`before`](Cursor::before) or
//! [`after`](Cursor::after), and moves with [`next`](Cursor::next) and
//! [`previous`](Cursor::previous). Positioning always lands *between*
//! elements, so the first move after it yields a neighbour of that gap.
//!
//! # States
//!
//! ```text
//! unpositioned -> positioned (forward | backward) -> exhausted
//!        \______________________\_____________________\___> closed
//! ```
//!
//! - `get()` succeeds only while positioned on an element; otherwise it
//!   fails with [`Error::InvalidPosition`].
//! - `close()` is idempotent. Every other operation on a closed cursor fails
//!   with [`Error::CursorClosed`].
//! - Cursors do not take snapshots. A cursor over a tree re-seeks to its
//!   last key when the tree changes between two moves.

mod empty;
mod filter;
mod list;
mod tree;

pub use empty::EmptyCursor;
pub use filter::{FilteringEnumeration, ResultFilter};
pub use list::ListCursor;
pub use tree::{KeyCursor, TupleCursor};

use crate::error::{Error, Result};

/// Bidirectional traversal over an ordered sequence of elements.
pub trait Cursor {
    type Element: Clone;

    /// Position before the first element.
    fn before_first(&mut self) -> Result<()>;

    /// Position after the last element.
    fn after_last(&mut self) -> Result<()>;

    /// Position just before `element`, or where it would be.
    fn before(&mut self, element: &Self::Element) -> Result<()>;

    /// Position just after `element`, or where it would be.
    fn after(&mut self, element: &Self::Element) -> Result<()>;

    /// Move onto the first element. Returns false when there is none.
    fn first(&mut self) -> Result<bool> {
        self.before_first()?;
        self.next()
    }

    /// Move onto the last element. Returns false when there is none.
    fn last(&mut self) -> Result<bool> {
        self.after_last()?;
        self.previous()
    }

    /// Advance to the next element. Returns false once exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Step back to the previous element. Returns false once exhausted.
    fn previous(&mut self) -> Result<bool>;

    /// Whether [`get`](Cursor::get) would succeed.
    fn available(&self) -> bool;

    /// The element the cursor is positioned on.
    fn get(&self) -> Result<Self::Element>;

    /// Close the cursor. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Close the cursor, recording why. Later calls report `cause`.
    fn close_with(&mut self, cause: &str) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Movement direction of the last successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Unknown,
    Forward,
    Backward,
}

/// Closed flag plus the cause given when closing.
#[derive(Debug, Clone, Default)]
pub struct ClosedGuard {
    closed: bool,
    cause: Option<String>,
}

impl ClosedGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            closed: false,
            cause: None,
        }
    }

    /// Fail with [`Error::CursorClosed`] once closed.
    pub fn check(&self) -> Result<()> {
        if self.closed {
            Err(Error::CursorClosed {
                cause: self.cause.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Mark closed. Returns false if it already was; the first cause sticks.
    pub fn close(&mut self, cause: Option<&str>) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.cause = cause.map(str::to_string);
        true
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}
