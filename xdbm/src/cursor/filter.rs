//! Filtering enumeration over any cursor.
//!
//! Search code above the storage layer wraps an index cursor in a
//! [`FilteringEnumeration`] to drop candidates that fail further checks.
//! The enumeration always holds the next accepted element, so
//! [`has_more`](FilteringEnumeration::has_more) is exact.

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// A predicate applied to each element pulled from the decorated cursor.
pub trait ResultFilter<T> {
    /// Whether `element` should be returned.
    fn accept(&self, element: &T) -> Result<bool>;
}

impl<T, F> ResultFilter<T> for F
where
    F: Fn(&T) -> bool,
{
    fn accept(&self, element: &T) -> Result<bool> {
        Ok(self(element))
    }
}

/// Yields the elements of a cursor that pass every filter, in cursor order.
///
/// Filters run in the order they were given and stop at the first
/// rejection. When the decorated cursor runs out it is closed.
pub struct FilteringEnumeration<C: Cursor> {
    decorated: C,
    filters: Vec<Box<dyn ResultFilter<C::Element>>>,
    prefetched: Option<C::Element>,
    /// Error hit while prefetching, reported by the following call.
    deferred: Option<Error>,
    closed: bool,
}

impl<C: Cursor> std::fmt::Debug for FilteringEnumeration<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteringEnumeration")
            .field("filters", &self.filters.len())
            .field("has_more", &self.prefetched.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<C: Cursor> FilteringEnumeration<C> {
    /// Wrap `decorated` without filters.
    pub fn new(decorated: C) -> Result<Self> {
        Self::with_filters(decorated, Vec::new())
    }

    /// Wrap `decorated` and prefetch the first accepted element.
    pub fn with_filters(
        decorated: C,
        filters: Vec<Box<dyn ResultFilter<C::Element>>>,
    ) -> Result<Self> {
        let mut enumeration = Self {
            decorated,
            filters,
            prefetched: None,
            deferred: None,
            closed: false,
        };
        enumeration.prefetch()?;
        Ok(enumeration)
    }

    /// Whether another accepted element is waiting.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.prefetched.is_some() || self.deferred.is_some()
    }

    #[must_use]
    pub const fn decorated(&self) -> &C {
        &self.decorated
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the enumeration and the decorated cursor.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.prefetched = None;
        self.decorated.close()
    }

    /// Close early, recording why.
    pub fn abandon(&mut self, cause: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.prefetched = None;
        self.decorated.close_with(cause)
    }

    fn accepts(&self, element: &C::Element) -> Result<bool> {
        for filter in &self.filters {
            if !filter.accept(element)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn prefetch(&mut self) -> Result<()> {
        while self.decorated.next()? {
            let candidate = self.decorated.get()?;
            if self.accepts(&candidate)? {
                self.prefetched = Some(candidate);
                return Ok(());
            }
        }
        self.prefetched = None;
        self.close()
    }
}

impl<C: Cursor> Iterator for FilteringEnumeration<C> {
    type Item = Result<C::Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        let current = self.prefetched.take()?;
        if let Err(e) = self.prefetch() {
            tracing::debug!("filtering enumeration failed to prefetch: {e}");
            self.deferred = Some(e);
        }
        Some(Ok(current))
    }
}
