//! Utility functions and helper types.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Comparator for any `Ord` type, ascending.
pub fn natural_order<T: Ord>() -> impl Fn(&T, &T) -> Ordering + Send + Sync + Clone {
    |a: &T, b: &T| a.cmp(b)
}

/// Comparator for any `Ord` type, descending.
pub fn reverse_order<T: Ord>() -> impl Fn(&T, &T) -> Ordering + Send + Sync + Clone {
    |a: &T, b: &T| b.cmp(a)
}

/// Reverse an existing comparator.
pub fn reversed<T, C>(cmp: C) -> impl Fn(&T, &T) -> Ordering + Send + Sync
where
    C: Fn(&T, &T) -> Ordering + Send + Sync,
{
    move |a: &T, b: &T| cmp(b, a)
}

/// Compare items by a key extracted with `f`.
pub fn by_key<T, K, F>(f: F) -> impl Fn(&T, &T) -> Ordering + Send + Sync
where
    K: Ord,
    F: Fn(&T) -> K + Send + Sync,
{
    move |a: &T, b: &T| f(a).cmp(&f(b))
}

/// A fixed buffer whose items are handed out once each, in index order, to any
/// number of concurrent callers.
///
/// The cursor is advanced with a compare-and-swap, so claiming is lock-free; each slot
/// is only ever locked by the single caller that won its index, so the per-slot lock
/// never contends.
///
/// Building one moves every item into a fresh allocation of `Mutex<Option<T>>`
/// slots, each slightly larger than `T`.
pub(crate) struct Slots<T> {
    items: Box<[Mutex<Option<T>>]>,
    cursor: AtomicUsize,
}

impl<T> Slots<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter().map(|item| Mutex::new(Some(item))).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Take the next unclaimed item, or `None` once all have been handed out.
    pub(crate) fn claim(&self) -> Option<T> {
        let len = self.items.len();
        let index = self
            .cursor
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |i| {
                (i < len).then_some(i + 1)
            })
            .ok()?;
        self.items[index].lock().take()
    }

    /// Number of items not yet claimed
    pub(crate) fn remaining(&self) -> usize {
        self.items
            .len()
            .saturating_sub(self.cursor.load(AtomicOrdering::Acquire))
    }
}
