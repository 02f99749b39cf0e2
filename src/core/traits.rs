//! Core traits for the stream system.
//!
//! This module defines the pull abstraction every source and stage implements, and the
//! comparator contract used by sorting and min/max.
//!
//! A pipeline is built top-down (source, then stages) but pulled bottom-up: a terminal
//! operation asks the last stage for its next item, which asks its upstream, down to
//! the source.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

/// A producer yields items on demand.
///
/// Producers are pull-based and shared: `next` takes `&self`, so a parallel terminal
/// operation can hand one producer to several workers that all pull from it at once.
/// Each implementation documents whether concurrent pulling is safe in the sense of
/// its ordering guarantees; memory safety is always enforced by the `Sync` bound.
///
/// Once `next` has returned `None` it must keep returning `None`.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use parastream::core::Producer;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct CounterSource {
///     current: AtomicU64,
///     max: u64,
/// }
///
/// #[async_trait]
/// impl Producer for CounterSource {
///     type Item = u64;
///
///     async fn next(&self) -> Option<Self::Item> {
///         let value = self.current.fetch_add(1, Ordering::Relaxed);
///         (value <= self.max).then_some(value)
///     }
/// }
/// ```
#[async_trait]
pub trait Producer: Send + Sync {
    /// The type of items this producer yields
    type Item: Send + 'static;

    /// Pull the next item, or `None` once the producer is exhausted.
    async fn next(&self) -> Option<Self::Item>;
}

#[async_trait]
impl<P> Producer for Arc<P>
where
    P: Producer + ?Sized,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        (**self).next().await
    }
}

#[async_trait]
impl<P> Producer for Box<P>
where
    P: Producer + ?Sized,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        (**self).next().await
    }
}

/// A pure ordering function over two items.
///
/// Implementors must behave like a total order: `cmp(a, a)` is `Equal`,
/// `cmp(a, b)` is `cmp(b, a).reverse()`, and the relation is transitive. This is
/// assumed, not checked; a comparator that breaks it produces an unspecified order.
///
/// Any `Fn(&T, &T) -> Ordering + Send + Sync` is a comparator.
pub trait Comparator<T>: Fn(&T, &T) -> Ordering + Send + Sync {}

impl<T, F> Comparator<T> for F where F: Fn(&T, &T) -> Ordering + Send + Sync {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct Countdown {
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl Producer for Countdown {
        type Item = usize;

        async fn next(&self) -> Option<usize> {
            self.remaining
                .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |n| {
                    n.checked_sub(1)
                })
                .ok()
        }
    }

    #[tokio::test]
    async fn test_shared_producer_through_arc() {
        let producer = Arc::new(Countdown {
            remaining: AtomicUsize::new(3),
        });
        let other = producer.clone();

        assert_eq!(producer.next().await, Some(3));
        assert_eq!(other.next().await, Some(2));
        assert_eq!(producer.next().await, Some(1));
        assert_eq!(other.next().await, None);
        assert_eq!(producer.next().await, None);
    }

    #[tokio::test]
    async fn test_boxed_dyn_producer() {
        let producer: Box<dyn Producer<Item = usize>> = Box::new(Countdown {
            remaining: AtomicUsize::new(1),
        });
        assert_eq!(producer.next().await, Some(1));
        assert_eq!(producer.next().await, None);
    }

    #[test]
    fn test_closure_is_comparator() {
        fn sort_with<C: Comparator<i32>>(items: &mut [i32], cmp: C) {
            items.sort_by(|a, b| cmp(a, b));
        }

        let mut items = vec![3, 1, 2];
        sort_with(&mut items, |a: &i32, b: &i32| b.cmp(a));
        assert_eq!(items, vec![3, 2, 1]);
    }
}
