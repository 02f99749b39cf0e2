//! The sort stage.
//!
//! Sorting is the one stage that must see its whole input before yielding anything.
//! The first pull drains the upstream (fanning out when the upstream was declared
//! parallel), sorts the buffer, and every pull after that claims the next sorted
//! item through an atomic cursor.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::core::{Comparator, Error, Producer};
use crate::pipeline::terminal;
use crate::sort::parallel_merge_sort;
use crate::tracing_support::debug_event;
use crate::util::Slots;

/// Yields the upstream's items ordered by a comparator.
///
/// The upstream is materialized exactly once, behind a one-shot gate, no matter how
/// many workers make the first pull at the same time. When `parallelism` is above 1
/// the drain fans out and the buffer is sorted with
/// [`parallel_merge_sort`](crate::sort::parallel_merge_sort), starting from the blocking pool;
/// otherwise it is sorted in place with the standard comparison sort. Tie order is
/// unspecified either way.
///
/// The whole stream is buffered in memory, and while the sorted buffer is moved into
/// its claim slots both copies are alive at once.
///
/// A panic in the comparator or in an upstream closure during materialization is
/// resumed, with its original payload, in the first puller to observe it. The gate
/// stays closed afterwards: the upstream is never drained a second time, and every
/// later pull panics too.
pub struct Sorted<P: Producer, C> {
    upstream: Arc<P>,
    comparator: Arc<C>,
    parallelism: usize,
    threshold: usize,
    result_buffer: usize,
    buffer: OnceCell<Buffer<P::Item>>,
    panic: Mutex<Option<Box<dyn Any + Send>>>,
}

enum Buffer<T> {
    Ready(Slots<T>),
    Failed,
}

impl<P: Producer, C> Sorted<P, C> {
    /// Create a new sort stage
    pub fn new(
        upstream: P,
        comparator: C,
        parallelism: usize,
        threshold: usize,
        result_buffer: usize,
    ) -> Self {
        Self {
            upstream: Arc::new(upstream),
            comparator: Arc::new(comparator),
            parallelism: parallelism.max(1),
            threshold,
            result_buffer: result_buffer.max(1),
            buffer: OnceCell::new(),
            panic: Mutex::new(None),
        }
    }
}

impl<P, C> Sorted<P, C>
where
    P: Producer + 'static,
    C: Comparator<P::Item> + 'static,
{
    async fn materialize(&self) -> Buffer<P::Item> {
        match AssertUnwindSafe(self.sort_upstream()).catch_unwind().await {
            Ok(slots) => Buffer::Ready(slots),
            Err(payload) => {
                *self.panic.lock() = Some(payload);
                Buffer::Failed
            }
        }
    }

    async fn sort_upstream(&self) -> Slots<P::Item> {
        let mut items = terminal::drain(
            "sorted",
            self.upstream.clone(),
            self.parallelism,
            self.result_buffer,
        )
        .await
        .unwrap_or_else(|err| err.resume());

        let parallel = self.parallelism > 1 && items.len() > self.threshold;
        debug_event!(len = items.len(), parallel, "sorting materialized stream");
        #[cfg(feature = "metrics")]
        crate::metrics::record_sort(items.len(), parallel);

        if parallel {
            let comparator = self.comparator.clone();
            let (parallelism, threshold) = (self.parallelism, self.threshold);
            items = tokio::task::spawn_blocking(move || {
                parallel_merge_sort(&mut items, &*comparator, parallelism, threshold);
                items
            })
            .await
            .unwrap_or_else(|err| Error::from(err).resume());
        } else {
            items.sort_unstable_by(&*self.comparator);
        }
        Slots::new(items)
    }
}

#[async_trait]
impl<P, C> Producer for Sorted<P, C>
where
    P: Producer + 'static,
    C: Comparator<P::Item> + 'static,
{
    type Item = P::Item;

    async fn next(&self) -> Option<Self::Item> {
        match self.buffer.get_or_init(|| self.materialize()).await {
            Buffer::Ready(slots) => slots.claim(),
            Buffer::Failed => {
                let payload = self.panic.lock().take();
                match payload {
                    Some(payload) => panic::resume_unwind(payload),
                    None => panic!("sort stage failed on an earlier pull"),
                }
            }
        }
    }
}
