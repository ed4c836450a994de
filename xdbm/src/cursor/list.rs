//! Cursor over an in-memory sorted list.

use std::sync::Arc;

use crate::comparator::{self, Comparator};
use crate::cursor::{ClosedGuard, Cursor};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Between `items[i - 1]` and `items[i]`.
    Gap(usize),
    /// On `items[i]`.
    On(usize),
}

/// A cursor over values already sorted by `comparator`.
///
/// Backs the inline form of a duplicates container.
pub struct ListCursor<T> {
    items: Vec<T>,
    comparator: Arc<dyn Comparator<T>>,
    position: Position,
    guard: ClosedGuard,
}

impl<T> std::fmt::Debug for ListCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListCursor")
            .field("len", &self.items.len())
            .field("position", &self.position)
            .field("closed", &self.guard.is_closed())
            .finish()
    }
}

impl<T: Clone> ListCursor<T> {
    /// `items` must already be sorted by `comparator`.
    #[must_use]
    pub fn new(items: Vec<T>, comparator: Arc<dyn Comparator<T>>) -> Self {
        Self {
            items,
            comparator,
            position: Position::Gap(0),
            guard: ClosedGuard::new(),
        }
    }

    /// A cursor over exactly one element.
    #[must_use]
    pub fn singleton(item: T, comparator: Arc<dyn Comparator<T>>) -> Self {
        Self::new(vec![item], comparator)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Cursor for ListCursor<T> {
    type Element = T;

    fn before_first(&mut self) -> Result<()> {
        self.guard.check()?;
        self.position = Position::Gap(0);
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        self.guard.check()?;
        self.position = Position::Gap(self.items.len());
        Ok(())
    }

    fn before(&mut self, element: &T) -> Result<()> {
        self.guard.check()?;
        let idx = comparator::lower_bound(&self.items, element, |v| v, &*self.comparator);
        self.position = Position::Gap(idx);
        Ok(())
    }

    fn after(&mut self, element: &T) -> Result<()> {
        self.guard.check()?;
        let idx = comparator::upper_bound(&self.items, element, |v| v, &*self.comparator);
        self.position = Position::Gap(idx);
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        self.guard.check()?;
        let candidate = match self.position {
            Position::Gap(i) => i,
            Position::On(i) => i + 1,
        };
        if candidate < self.items.len() {
            self.position = Position::On(candidate);
            Ok(true)
        } else {
            self.position = Position::Gap(self.items.len());
            Ok(false)
        }
    }

    fn previous(&mut self) -> Result<bool> {
        self.guard.check()?;
        let upper = match self.position {
            Position::Gap(i) | Position::On(i) => i,
        };
        if upper > 0 {
            self.position = Position::On(upper - 1);
            Ok(true)
        } else {
            self.position = Position::Gap(0);
            Ok(false)
        }
    }

    fn available(&self) -> bool {
        !self.guard.is_closed() && matches!(self.position, Position::On(_))
    }

    fn get(&self) -> Result<T> {
        self.guard.check()?;
        match self.position {
            Position::On(i) => Ok(self.items[i].clone()),
            Position::Gap(_) => Err(Error::InvalidPosition),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.guard.close(None);
        Ok(())
    }

    fn close_with(&mut self, cause: &str) -> Result<()> {
        self.guard.close(Some(cause));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalOrder;

    fn cursor(items: &[u64]) -> ListCursor<u64> {
        ListCursor::new(items.to_vec(), Arc::new(NaturalOrder))
    }

    fn drain_forward(cursor: &mut ListCursor<u64>) -> Vec<u64> {
        let mut out = Vec::new();
        while cursor.next().expect("next") {
            out.push(cursor.get().expect("get"));
        }
        out
    }

    #[test]
    fn test_walks_and_reverses_without_repeating() {
        let mut c = cursor(&[1, 3, 5, 7]);
        assert!(c.next().expect("next"));
        assert!(c.next().expect("next"));
        assert_eq!(c.get().expect("get"), 3);
        assert!(c.previous().expect("previous"));
        assert_eq!(c.get().expect("get"), 1);
        assert!(!c.previous().expect("previous"));
        assert!(matches!(c.get(), Err(Error::InvalidPosition)));
        assert_eq!(drain_forward(&mut c), vec![1, 3, 5, 7]);
        assert!(c.previous().expect("previous from end"));
        assert_eq!(c.get().expect("get"), 7);
    }

    #[test]
    fn test_before_and_after_land_in_gaps() {
        let mut c = cursor(&[1, 3, 5, 7]);
        c.before(&5).expect("before");
        assert_eq!(drain_forward(&mut c), vec![5, 7]);

        c.after(&5).expect("after");
        assert_eq!(drain_forward(&mut c), vec![7]);

        c.after(&4).expect("after absent");
        assert!(c.previous().expect("previous"));
        assert_eq!(c.get().expect("get"), 3);
    }

    #[test]
    fn test_first_last_singleton() {
        let mut c = ListCursor::singleton(42u64, Arc::new(NaturalOrder));
        assert!(c.first().expect("first"));
        assert_eq!(c.get().expect("get"), 42);
        assert!(c.last().expect("last"));
        assert_eq!(c.get().expect("get"), 42);
        assert!(!c.next().expect("next"));

        c.after_last().expect("after last");
        assert!(!c.next().expect("next"));
        assert!(!c.available());
    }

    #[test]
    fn test_closed_cursor_rejects_moves() {
        let mut c = cursor(&[1]);
        c.close_with("abandoned").expect("close");
        assert!(c.is_closed());
        assert!(matches!(
            c.before_first(),
            Err(Error::CursorClosed { cause: Some(_) })
        ));
    }
}
