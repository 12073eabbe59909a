//! Half-open index ranges over ID lists.
//!
//! Large ID lists are processed batch by batch: each run names an
//! `[start, finish)` window, and [`select`] narrows the list to it. Both ends
//! clamp to the list length and an inverted window is simply empty.

use std::fmt;

/// Returns `ids[start..finish]`, clamped to `ids.len()`.
///
/// Yields an empty slice whenever `start >= finish` after clamping.
///
/// ```
/// use record_fetcher::fetch::select;
///
/// let ids = ["a", "b", "c", "d"];
/// assert_eq!(select(&ids, 1, 3), &["b", "c"]);
/// assert_eq!(select(&ids, 2, 100), &["c", "d"]);
/// assert!(select(&ids, 3, 1).is_empty());
/// ```
#[must_use]
pub fn select<T>(ids: &[T], start: usize, finish: usize) -> &[T] {
    let len = ids.len();
    let start = start.min(len);
    let finish = finish.min(len);
    if start >= finish {
        return &[];
    }
    &ids[start..finish]
}

/// An `[start, finish)` window requested for one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    /// First index, inclusive.
    pub start: usize,
    /// End index, exclusive.
    pub finish: usize,
}

impl IndexRange {
    /// Creates a range; no validation, see [`select`] for the clamping rules.
    #[must_use]
    pub fn new(start: usize, finish: usize) -> Self {
        Self { start, finish }
    }

    /// The whole of a list of `len` IDs.
    #[must_use]
    pub fn full(len: usize) -> Self {
        Self::new(0, len)
    }

    /// Applies this range to `ids`.
    #[must_use]
    pub fn select<'a, T>(&self, ids: &'a [T]) -> &'a [T] {
        select(ids, self.start, self.finish)
    }

    /// Label used in batch file names: `range-{start}-{last}` with `last` inclusive.
    #[must_use]
    pub fn label(&self) -> String {
        format!("range-{}-{}", self.start, self.finish.saturating_sub(1))
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.finish)
    }
}
