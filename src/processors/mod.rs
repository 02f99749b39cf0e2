//! Stage implementations for the parastream library.
//!
//! A stage is a producer that wraps an upstream producer with a transformation.
//! Stages never buffer more than they must and hold no reference to their consumer.
//!
//! Every counter a stage keeps is atomic, so sharing a stage between fan-out workers
//! is always memory safe. What sharing means for ordering is documented per stage.

pub mod combinators;
pub mod sorted;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::Producer;

pub use combinators::{Chain, Distinct, FlatMap};
pub use sorted::Sorted;

/// Spend one unit of `counter`, returning false once it is already zero.
fn spend(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

/// Passes through items that satisfy a predicate.
pub struct Filter<P, F> {
    upstream: P,
    predicate: F,
}

impl<P, F> Filter<P, F> {
    /// Create a new filter stage
    pub fn new(upstream: P, predicate: F) -> Self {
        Self {
            upstream,
            predicate,
        }
    }
}

#[async_trait]
impl<P, F> Producer for Filter<P, F>
where
    P: Producer,
    F: Fn(&P::Item) -> bool + Send + Sync,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        loop {
            let item = self.upstream.next().await?;
            if (self.predicate)(&item) {
                return Some(item);
            }
        }
    }
}

/// Passes through at most `n` items that satisfy a predicate.
///
/// Each pull spends one unit of the quota before searching for a match. Once the
/// quota is spent, or the upstream has ended, the stage ends for good and never
/// pulls upstream again.
pub struct FilterN<P, F> {
    upstream: P,
    predicate: F,
    quota: AtomicUsize,
    exhausted: AtomicBool,
}

impl<P, F> FilterN<P, F> {
    /// Create a new bounded filter stage
    pub fn new(upstream: P, n: usize, predicate: F) -> Self {
        Self {
            upstream,
            predicate,
            quota: AtomicUsize::new(n),
            exhausted: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<P, F> Producer for FilterN<P, F>
where
    P: Producer,
    F: Fn(&P::Item) -> bool + Send + Sync,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        if self.exhausted.load(Ordering::Acquire) || !spend(&self.quota) {
            return None;
        }
        loop {
            match self.upstream.next().await {
                Some(item) if (self.predicate)(&item) => return Some(item),
                Some(_) => continue,
                None => {
                    self.exhausted.store(true, Ordering::Release);
                    return None;
                }
            }
        }
    }
}

/// Applies a function to every item, one output per input.
pub struct Map<P, F> {
    upstream: P,
    f: F,
}

impl<P, F> Map<P, F> {
    /// Create a new map stage
    pub fn new(upstream: P, f: F) -> Self {
        Self { upstream, f }
    }
}

#[async_trait]
impl<P, F, U> Producer for Map<P, F>
where
    P: Producer,
    F: Fn(P::Item) -> U + Send + Sync,
    U: Send + 'static,
{
    type Item = U;

    async fn next(&self) -> Option<Self::Item> {
        self.upstream.next().await.map(&self.f)
    }
}

/// Yields at most `n` items in total, then ends.
///
/// The quota is decremented atomically before each upstream pull, so workers
/// sharing one `Take` never receive more than `n` items between them. With a
/// quota of zero the upstream is never pulled.
pub struct Take<P> {
    upstream: P,
    remaining: AtomicUsize,
}

impl<P> Take<P> {
    /// Create a new take stage
    pub fn new(upstream: P, n: usize) -> Self {
        Self {
            upstream,
            remaining: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl<P: Producer> Producer for Take<P> {
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        if !spend(&self.remaining) {
            return None;
        }
        self.upstream.next().await
    }
}

/// Discards the first `n` upstream items, then passes everything through.
///
/// The discard count is exact across concurrent pullers, but which items get
/// discarded is only meaningful when the stage is consumed by a single caller.
pub struct Skip<P> {
    upstream: P,
    remaining: AtomicUsize,
}

impl<P> Skip<P> {
    /// Create a new skip stage
    pub fn new(upstream: P, n: usize) -> Self {
        Self {
            upstream,
            remaining: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl<P: Producer> Producer for Skip<P> {
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        while spend(&self.remaining) {
            self.upstream.next().await?;
        }
        self.upstream.next().await
    }
}

/// Calls an observer on every item as it passes.
///
/// Under parallel consumption the observer runs on several workers at once and must
/// synchronize any shared state it touches.
pub struct Peek<P, F> {
    upstream: P,
    observer: F,
}

impl<P, F> Peek<P, F> {
    /// Create a new peek stage
    pub fn new(upstream: P, observer: F) -> Self {
        Self { upstream, observer }
    }
}

#[async_trait]
impl<P, F> Producer for Peek<P, F>
where
    P: Producer,
    F: Fn(&P::Item) + Send + Sync,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        let item = self.upstream.next().await?;
        (self.observer)(&item);
        Some(item)
    }
}
