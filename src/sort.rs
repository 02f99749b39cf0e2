//! Parallel in-place merge sort.
//!
//! The slice is split in half recursively; the left half is sorted on a scoped thread
//! while the current thread sorts the right half, each with half of the remaining
//! parallel budget. Once the budget reaches 1, or a piece is no longer than the
//! threshold, the piece is sorted with the standard comparison sort.
//!
//! Halves are merged in place without an auxiliary buffer: every out-of-order element
//! of the right half is rotated into position, shifting the intervening left elements
//! one slot to the right. That is O(n * k) for a run of k out-of-order elements. The
//! trade is no extra allocation in exchange for a slower worst-case merge.
//!
//! Tie order is unspecified.

use std::cmp::Ordering;
use std::panic;
use std::thread;

/// Default piece size at or below which the merge sort stops splitting.
pub const PARALLEL_SORT_THRESHOLD: usize = 1 << 12;

/// Sort `slice` in place using up to `parallelism` threads.
///
/// Pieces of `threshold` items or fewer are sorted sequentially. Fan-out depth is
/// bounded by `log2(parallelism)`, so at most `parallelism - 1` extra threads run at
/// once.
///
/// A panic in `cmp` on any thread propagates to the caller with its original payload.
///
/// # Examples
///
/// ```rust
/// use parastream::sort::parallel_merge_sort;
///
/// let mut items: Vec<u32> = (0..10_000).rev().collect();
/// parallel_merge_sort(&mut items, &|a: &u32, b: &u32| a.cmp(b), 4, 1024);
/// assert!(items.windows(2).all(|w| w[0] <= w[1]));
/// ```
pub fn parallel_merge_sort<T, C>(slice: &mut [T], cmp: &C, parallelism: usize, threshold: usize)
where
    T: Send,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    if slice.len() <= threshold.max(1) || parallelism <= 1 {
        slice.sort_unstable_by(cmp);
        return;
    }

    let mid = slice.len() / 2;
    let budget = parallelism / 2;
    let (left, right) = slice.split_at_mut(mid);

    thread::scope(|scope| {
        let handle = scope.spawn(|| parallel_merge_sort(left, cmp, budget, threshold));
        parallel_merge_sort(right, cmp, budget, threshold);
        if let Err(payload) = handle.join() {
            panic::resume_unwind(payload);
        }
    });

    merge_sorted_halves(slice, mid, cmp);
}

/// Merge the sorted runs `slice[..mid]` and `slice[mid..]` in place.
///
/// Returns the number of single-slot shifts performed; zero when the runs were
/// already in order.
pub(crate) fn merge_sorted_halves<T, C>(slice: &mut [T], mid: usize, cmp: &C) -> usize
where
    C: Fn(&T, &T) -> Ordering,
{
    if mid == 0 || mid >= slice.len() {
        return 0;
    }
    if cmp(&slice[mid - 1], &slice[mid]) != Ordering::Greater {
        return 0;
    }

    let (mut i, mut j, mut mid) = (0, mid, mid);
    let mut moves = 0;
    while i < mid && j < slice.len() {
        if cmp(&slice[i], &slice[j]) != Ordering::Greater {
            i += 1;
        } else {
            slice[i..=j].rotate_right(1);
            moves += j - i;
            i += 1;
            j += 1;
            mid += 1;
        }
    }
    moves
}
