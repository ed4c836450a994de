//! Orderings for keys and duplicate values.
//!
//! Trees, tables and cursors never compare keys with `==` or `Ord`
//! directly. They go through a [`Comparator`], so an attribute index can
//! order its keys case-insensitively while still storing the original
//! spelling. A comparator's [`name`](Comparator::name) is persisted with
//! every tree and checked when the tree is reopened.

use std::cmp::Ordering;

/// A total order over `T`.
pub trait Comparator<T: ?Sized>: Send + Sync {
    fn compare(&self, a: &T, b: &T) -> Ordering;

    /// Stable name recorded alongside persisted trees.
    fn name(&self) -> &str;

    fn equal(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// Orders values by their `Ord` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord + ?Sized> Comparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "natural"
    }
}

/// Orders strings ignoring case: `"Foo"` and `"foo"` are the same key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseIgnoreString;

impl Comparator<String> for CaseIgnoreString {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        a.chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase))
    }

    fn name(&self) -> &str {
        "case-ignore"
    }
}

/// A comparator backed by a closure.
pub struct FnComparator<F> {
    name: String,
    compare: F,
}

impl<F> FnComparator<F> {
    pub fn new(name: impl Into<String>, compare: F) -> Self {
        Self {
            name: name.into(),
            compare,
        }
    }
}

impl<F> std::fmt::Debug for FnComparator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComparator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T, F> Comparator<T> for FnComparator<F>
where
    T: ?Sized,
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.compare)(a, b)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Binary search `items` for `target` under `comparator`.
///
/// Same contract as [`slice::binary_search_by`]: `Ok(i)` when found,
/// `Err(i)` with the insertion point otherwise.
pub fn search<T, U>(
    items: &[U],
    target: &T,
    key: impl Fn(&U) -> &T,
    comparator: &dyn Comparator<T>,
) -> Result<usize, usize> {
    items.binary_search_by(|item| comparator.compare(key(item), target))
}

/// Index of the first item not less than `target`.
pub fn lower_bound<T, U>(
    items: &[U],
    target: &T,
    key: impl Fn(&U) -> &T,
    comparator: &dyn Comparator<T>,
) -> usize {
    items.partition_point(|item| comparator.compare(key(item), target) == Ordering::Less)
}

/// Index of the first item greater than `target`.
pub fn upper_bound<T, U>(
    items: &[U],
    target: &T,
    key: impl Fn(&U) -> &T,
    comparator: &dyn Comparator<T>,
) -> usize {
    items.partition_point(|item| comparator.compare(key(item), target) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_ignore() {
        let cmp = CaseIgnoreString;
        assert_eq!(
            cmp.compare(&"Foo".to_string(), &"fOO".to_string()),
            Ordering::Equal
        );
        assert_eq!(
            cmp.compare(&"apple".to_string(), &"Banana".to_string()),
            Ordering::Less
        );
    }

    #[test]
    fn test_fn_comparator_reverse() {
        let cmp = FnComparator::new("reverse", |a: &u64, b: &u64| b.cmp(a));
        assert_eq!(Comparator::<u64>::compare(&cmp, &1, &2), Ordering::Greater);
        assert_eq!(Comparator::<u64>::name(&cmp), "reverse");
    }

    #[test]
    fn test_bounds() {
        let items = vec![1u64, 3, 3, 5];
        let cmp = NaturalOrder;
        assert_eq!(lower_bound(&items, &3, |x| x, &cmp), 1);
        assert_eq!(upper_bound(&items, &3, |x| x, &cmp), 3);
        assert_eq!(lower_bound(&items, &6, |x| x, &cmp), 4);
        assert_eq!(search(&items, &4, |x| x, &cmp), Err(3));
    }
}
