//! Stages that keep state beyond a counter: flat-map, distinct and concatenation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as TokioMutex;

use crate::core::Producer;
use crate::pipeline::Stream;

/// Replaces every upstream item with the items of a nested stream.
///
/// Each nested stream is drained completely before the next upstream item is
/// pulled. The nested stream being drained is held behind an async lock, so
/// concurrent pullers take turns. A nested stream that never ends starves the
/// outer stream; nothing here guards against that. The parallelism degree of a
/// nested stream is ignored.
pub struct FlatMap<P, F, Q> {
    upstream: P,
    mapper: F,
    current: TokioMutex<Option<Q>>,
}

impl<P, F, Q> FlatMap<P, F, Q> {
    /// Create a new flat-map stage
    pub fn new(upstream: P, mapper: F) -> Self {
        Self {
            upstream,
            mapper,
            current: TokioMutex::new(None),
        }
    }
}

#[async_trait]
impl<P, F, Q> Producer for FlatMap<P, F, Q>
where
    P: Producer,
    F: Fn(P::Item) -> Stream<Q> + Send + Sync,
    Q: Producer,
{
    type Item = Q::Item;

    async fn next(&self) -> Option<Self::Item> {
        let mut current = self.current.lock().await;
        loop {
            if let Some(nested) = current.as_ref() {
                if let Some(item) = nested.next().await {
                    return Some(item);
                }
            }
            let item = self.upstream.next().await;
            *current = Some((self.mapper)(item?).into_producer());
        }
    }
}

/// Suppresses items equal to one already yielded.
///
/// Every distinct item is cloned into a seen-set that grows for as long as the
/// stage lives. The set is lock-protected, so concurrent pullers never yield the
/// same value twice, but "first occurrence" only has its usual meaning when the
/// stage is consumed with a parallelism degree of 1.
pub struct Distinct<P: Producer> {
    upstream: P,
    seen: Mutex<HashSet<P::Item>>,
}

impl<P: Producer> Distinct<P> {
    /// Create a new distinct stage
    pub fn new(upstream: P) -> Self {
        Self {
            upstream,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl<P> Producer for Distinct<P>
where
    P: Producer,
    P::Item: Eq + Hash + Clone,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        loop {
            let item = self.upstream.next().await?;
            if self.seen.lock().insert(item.clone()) {
                return Some(item);
            }
        }
    }
}

/// Yields every item of `first`, then every item of `second`.
///
/// `second` is not pulled until `first` has ended, and `first` is not pulled again
/// after that.
pub struct Chain<P1, P2> {
    first: P1,
    second: P2,
    first_done: AtomicBool,
}

impl<P1, P2> Chain<P1, P2> {
    /// Create a new chain stage
    pub fn new(first: P1, second: P2) -> Self {
        Self {
            first,
            second,
            first_done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<P1, P2> Producer for Chain<P1, P2>
where
    P1: Producer,
    P2: Producer<Item = P1::Item>,
{
    type Item = P1::Item;

    async fn next(&self) -> Option<Self::Item> {
        if !self.first_done.load(Ordering::Acquire) {
            if let Some(item) = self.first.next().await {
                return Some(item);
            }
            self.first_done.store(true, Ordering::Release);
        }
        self.second.next().await
    }
}
