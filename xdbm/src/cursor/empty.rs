use std::marker::PhantomData;

use crate::cursor::{ClosedGuard, Cursor};
use crate::error::{Error, Result};

/// A cursor over nothing.
#[derive(Debug)]
pub struct EmptyCursor<T> {
    guard: ClosedGuard,
    _elements: PhantomData<fn() -> T>,
}

impl<T> EmptyCursor<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            guard: ClosedGuard::new(),
            _elements: PhantomData,
        }
    }
}

impl<T> Default for EmptyCursor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Cursor for EmptyCursor<T> {
    type Element = T;

    fn before_first(&mut self) -> Result<()> {
        self.guard.check()
    }

    fn after_last(&mut self) -> Result<()> {
        self.guard.check()
    }

    fn before(&mut self, _element: &T) -> Result<()> {
        self.guard.check()
    }

    fn after(&mut self, _element: &T) -> Result<()> {
        self.guard.check()
    }

    fn next(&mut self) -> Result<bool> {
        self.guard.check()?;
        Ok(false)
    }

    fn previous(&mut self) -> Result<bool> {
        self.guard.check()?;
        Ok(false)
    }

    fn available(&self) -> bool {
        false
    }

    fn get(&self) -> Result<T> {
        self.guard.check()?;
        Err(Error::InvalidPosition)
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
