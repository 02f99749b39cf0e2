//! Terminal operations: the execution engine.
//!
//! Every terminal operation consumes a [`Stream`] and drives its root producer to
//! exhaustion. With a parallelism degree of 1 it pulls in a loop on the calling task
//! and preserves encounter order. With a degree `p > 1` it fans out: `p` tokio tasks
//! each pull the *same* shared producer until it ends, keep a partial result, and the
//! caller waits for all of them before combining the partials (fan-in).
//!
//! Nothing is cancelled. A panicking closure fails only the worker it ran on; its
//! siblings keep pulling until the producer ends, and the terminal then reports the
//! first failure as [`Error::Worker`](crate::core::Error::Worker).

use futures::future::join_all;
use std::cmp::Ordering;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Stream;
use crate::core::{Comparator, Producer, Result};
use crate::tracing_support::{debug_event, warn_event};

#[cfg_attr(
    not(any(feature = "tracing", feature = "metrics")),
    allow(unused_variables)
)]
fn begin(operation: &'static str, parallelism: usize) {
    debug_event!(operation, parallelism, "running terminal operation");
    #[cfg(feature = "metrics")]
    {
        crate::metrics::record_terminal(operation, parallelism);
        if parallelism > 1 {
            crate::metrics::record_workers(operation, parallelism);
        }
    }
}

/// Spawn `workers` tasks, each running `worker` against the shared producer.
fn spawn_workers<P, F, Fut>(producer: &Arc<P>, workers: usize, worker: F) -> Vec<JoinHandle<Fut::Output>>
where
    F: Fn(Arc<P>) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    (0..workers)
        .map(|_| tokio::spawn(worker(producer.clone())))
        .collect()
}

/// Wait for every worker, then report the first failure if there was one.
#[cfg_attr(
    not(any(feature = "tracing", feature = "metrics")),
    allow(unused_variables)
)]
async fn join_workers<R>(operation: &'static str, handles: Vec<JoinHandle<R>>) -> Result<Vec<R>> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut failure = None;
    for result in join_all(handles).await {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                warn_event!(operation, error = %err, "stream worker failed");
                #[cfg(feature = "metrics")]
                crate::metrics::record_worker_failure(operation);
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }
    }
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(outputs),
    }
}

/// Pull every item out of `producer`.
///
/// Callers record their own run, so the sort stage can drain through here without
/// counting as a terminal operation.
///
/// With `parallelism > 1` the workers push onto a bounded channel of `capacity`
/// slots; the channel closes when the last worker drops its sender, and the result
/// is whatever interleaving the workers produced.
pub(crate) async fn drain<P>(
    operation: &'static str,
    producer: Arc<P>,
    parallelism: usize,
    capacity: usize,
) -> Result<Vec<P::Item>>
where
    P: Producer + 'static,
{
    if parallelism <= 1 {
        let mut items = Vec::new();
        while let Some(item) = producer.next().await {
            items.push(item);
        }
        return Ok(items);
    }

    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let handles = spawn_workers(&producer, parallelism, |producer| {
        let tx = tx.clone();
        async move {
            while let Some(item) = producer.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        }
    });
    drop(tx);

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    join_workers(operation, handles).await?;
    Ok(items)
}

impl<P> Stream<P>
where
    P: Producer + 'static,
{
    /// Call `consumer` on every item.
    ///
    /// In parallel, `consumer` runs on several workers at once, in no particular
    /// order; it must synchronize any shared state it touches.
    pub async fn for_each<F>(self, consumer: F) -> Result<()>
    where
        F: Fn(P::Item) + Send + Sync + 'static,
    {
        let parallelism = self.parallelism();
        begin("for_each", parallelism);
        if parallelism <= 1 {
            while let Some(item) = self.producer.next().await {
                consumer(item);
            }
            return Ok(());
        }

        let producer = Arc::new(self.producer);
        let consumer = Arc::new(consumer);
        let handles = spawn_workers(&producer, parallelism, |producer| {
            let consumer = consumer.clone();
            async move {
                while let Some(item) = producer.next().await {
                    consumer(item);
                }
            }
        });
        join_workers("for_each", handles).await?;
        Ok(())
    }

    /// Collect every item into a vector.
    ///
    /// In encounter order at degree 1; in parallel the result is a permutation.
    pub async fn to_vec(self) -> Result<Vec<P::Item>> {
        let capacity = self.config.result_buffer_len();
        begin("to_vec", self.config.parallelism);
        drain(
            "to_vec",
            Arc::new(self.producer),
            self.config.parallelism,
            capacity,
        )
        .await
    }

    /// Collect every item into any `FromIterator` collection
    pub async fn collect<B>(self) -> Result<B>
    where
        B: FromIterator<P::Item>,
    {
        Ok(self.to_vec().await?.into_iter().collect())
    }

    /// Fold every item into a result.
    ///
    /// Each worker folds its own items starting from a clone of `identity` with
    /// `accumulator`; the partial results are then folded into `identity` with
    /// `combiner` in the order they arrive. The value is independent of how items
    /// were split between workers only if `accumulator` and `combiner` are
    /// associative and `identity` is a true identity for both.
    pub async fn reduce_with<A, Acc, Comb>(
        self,
        identity: A,
        accumulator: Acc,
        combiner: Comb,
    ) -> Result<A>
    where
        A: Clone + Send + 'static,
        Acc: Fn(A, P::Item) -> A + Send + Sync + 'static,
        Comb: Fn(A, A) -> A + Send,
    {
        self.fold_partials("reduce", move || identity.clone(), accumulator, combiner)
            .await
    }

    /// Fold every item with one associative operation, used both to accumulate and
    /// to combine partial results.
    pub async fn reduce<F>(self, identity: P::Item, op: F) -> Result<P::Item>
    where
        P::Item: Clone,
        F: Fn(P::Item, P::Item) -> P::Item + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let combine = op.clone();
        self.reduce_with(identity, move |acc, item| op(acc, item), move |a, b| combine(a, b))
            .await
    }

    /// Fold every item in encounter order on the calling task, ignoring the
    /// declared parallelism.
    pub async fn fold_sequential<A, F>(self, identity: A, accumulator: F) -> A
    where
        F: Fn(A, P::Item) -> A,
    {
        begin("fold_sequential", 1);
        let mut result = identity;
        while let Some(item) = self.producer.next().await {
            result = accumulator(result, item);
        }
        result
    }

    /// Count the items
    pub async fn count(self) -> Result<usize> {
        self.fold_partials("count", || 0usize, |n, _| n + 1, |a, b| a + b)
            .await
    }

    /// Whether every item satisfies `predicate`; `true` for an empty stream.
    ///
    /// Stops at the first failing item. In parallel the stop is best effort: other
    /// workers check a shared flag before each evaluation, so a few extra items may
    /// still be tested after the deciding one.
    pub async fn all_match<F>(self, predicate: F) -> Result<bool>
    where
        F: Fn(&P::Item) -> bool + Send + Sync + 'static,
    {
        let found = self.find_deciding("all_match", predicate, false).await?;
        Ok(!found)
    }

    /// Whether any item satisfies `predicate`; `false` for an empty stream.
    ///
    /// Stops at the first matching item, with the same best-effort caveat as
    /// [`all_match`](Stream::all_match).
    pub async fn any_match<F>(self, predicate: F) -> Result<bool>
    where
        F: Fn(&P::Item) -> bool + Send + Sync + 'static,
    {
        self.find_deciding("any_match", predicate, true).await
    }

    /// Whether no item satisfies `predicate`; `true` for an empty stream.
    pub async fn none_match<F>(self, predicate: F) -> Result<bool>
    where
        F: Fn(&P::Item) -> bool + Send + Sync + 'static,
    {
        Ok(!self.any_match(predicate).await?)
    }

    /// The smallest item under `comparator`, or `None` for an empty stream.
    ///
    /// At degree 1 the first of several equal minima wins.
    pub async fn min_by<C>(self, comparator: C) -> Result<Option<P::Item>>
    where
        C: Comparator<P::Item> + 'static,
    {
        self.best_by("min_by", move |candidate, best| {
            comparator(candidate, best) == Ordering::Less
        })
        .await
    }

    /// The largest item under `comparator`, or `None` for an empty stream.
    ///
    /// At degree 1 the first of several equal maxima wins.
    pub async fn max_by<C>(self, comparator: C) -> Result<Option<P::Item>>
    where
        C: Comparator<P::Item> + 'static,
    {
        self.best_by("max_by", move |candidate, best| {
            comparator(candidate, best) == Ordering::Greater
        })
        .await
    }

    /// The smallest item, or `None` for an empty stream
    pub async fn min(self) -> Result<Option<P::Item>>
    where
        P::Item: Ord,
    {
        self.min_by(|a: &P::Item, b: &P::Item| a.cmp(b)).await
    }

    /// The largest item, or `None` for an empty stream
    pub async fn max(self) -> Result<Option<P::Item>>
    where
        P::Item: Ord,
    {
        self.max_by(|a: &P::Item, b: &P::Item| a.cmp(b)).await
    }

    async fn fold_partials<A, I, Acc, Comb>(
        self,
        operation: &'static str,
        init: I,
        accumulator: Acc,
        combiner: Comb,
    ) -> Result<A>
    where
        A: Send + 'static,
        I: Fn() -> A,
        Acc: Fn(A, P::Item) -> A + Send + Sync + 'static,
        Comb: Fn(A, A) -> A,
    {
        let parallelism = self.parallelism();
        begin(operation, parallelism);
        if parallelism <= 1 {
            let mut result = init();
            while let Some(item) = self.producer.next().await {
                result = accumulator(result, item);
            }
            return Ok(result);
        }

        let producer = Arc::new(self.producer);
        let accumulator = Arc::new(accumulator);
        let (tx, mut rx) = mpsc::channel(parallelism);
        let handles = spawn_workers(&producer, parallelism, |producer| {
            let (tx, accumulator, mut partial) = (tx.clone(), accumulator.clone(), init());
            async move {
                while let Some(item) = producer.next().await {
                    partial = accumulator(partial, item);
                }
                // the receiver outlives every worker
                let _ = tx.send(partial).await;
            }
        });
        drop(tx);

        let mut result = init();
        while let Some(partial) = rx.recv().await {
            result = combiner(result, partial);
        }
        join_workers(operation, handles).await?;
        Ok(result)
    }

    async fn best_by<B>(self, operation: &'static str, better: B) -> Result<Option<P::Item>>
    where
        B: Fn(&P::Item, &P::Item) -> bool + Send + Sync + 'static,
    {
        let better = Arc::new(better);
        let keep = better.clone();
        self.fold_partials(
            operation,
            || None::<P::Item>,
            move |best, item| match best {
                Some(best) if !keep(&item, &best) => Some(best),
                _ => Some(item),
            },
            move |left: Option<P::Item>, right: Option<P::Item>| match (left, right) {
                (Some(left), Some(right)) if better(&right, &left) => Some(right),
                (Some(left), _) => Some(left),
                (None, right) => right,
            },
        )
        .await
    }

    /// Pull until an item whose predicate result equals `decisive` is found.
    async fn find_deciding<F>(
        self,
        operation: &'static str,
        predicate: F,
        decisive: bool,
    ) -> Result<bool>
    where
        F: Fn(&P::Item) -> bool + Send + Sync + 'static,
    {
        let parallelism = self.parallelism();
        begin(operation, parallelism);
        if parallelism <= 1 {
            while let Some(item) = self.producer.next().await {
                if predicate(&item) == decisive {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let producer = Arc::new(self.producer);
        let predicate = Arc::new(predicate);
        let done = CancellationToken::new();
        let found = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(&producer, parallelism, |producer| {
            let (predicate, done, found) = (predicate.clone(), done.clone(), found.clone());
            async move {
                while let Some(item) = producer.next().await {
                    if done.is_cancelled() {
                        return;
                    }
                    if predicate(&item) == decisive {
                        let _ = found.compare_exchange(
                            false,
                            true,
                            AtomicOrdering::AcqRel,
                            AtomicOrdering::Acquire,
                        );
                        done.cancel();
                        return;
                    }
                }
            }
        });
        join_workers(operation, handles).await?;
        Ok(found.load(AtomicOrdering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use crate::core::Error;
    use crate::{generate, of, range};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sorted(mut items: Vec<i64>) -> Vec<i64> {
        items.sort();
        items
    }

    #[tokio::test]
    async fn test_to_vec_sequential_preserves_order() {
        let items = vec![5, 3, 9, 1, 7];
        assert_eq!(of(items.clone()).to_vec().await.unwrap(), items);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_to_vec_parallel_is_permutation() {
        let items: Vec<i64> = (0..5000).rev().collect();
        for parallelism in [2, 3, 8] {
            let got = of(items.clone()).parallel(parallelism).to_vec().await.unwrap();
            assert_eq!(sorted(got), sorted(items.clone()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_to_vec_parallel_with_tiny_result_buffer() {
        let got = range(0, 1000).parallel(4).result_buffer(1).to_vec().await.unwrap();
        assert_eq!(sorted(got), (0..1000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_collect_into_set() {
        let set: HashSet<i64> = of(vec![1, 1, 2]).collect().await.unwrap();
        assert_eq!(set, HashSet::from([1, 2]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_for_each_visits_every_item() {
        for parallelism in [1, 4] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            range(0, 100)
                .parallel(parallelism)
                .for_each(move |x| sink.lock().push(x))
                .await
                .unwrap();
            assert_eq!(sorted(seen.lock().clone()), (0..100).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_reduce_examples() {
        let sum = of(vec![1, 2, 3, 4, 5]).parallel(2).reduce(0, |a, b| a + b);
        assert_eq!(sum.await.unwrap(), 15);

        let product = of(vec![1, 2, 3, 4, 5]).parallel(3).reduce(1, |a, b| a * b);
        assert_eq!(product.await.unwrap(), 120);

        let factorial = range(1, 9).reduce(1, |a, b| a * b);
        assert_eq!(factorial.await.unwrap(), 40320);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reduce_with_is_partition_independent() {
        let expected: i64 = (0..10_000).sum();
        for parallelism in 1..=8 {
            let total = range(0, 10_000)
                .parallel(parallelism)
                .reduce_with(0i64, |acc, x| acc + x, |a, b| a + b)
                .await
                .unwrap();
            assert_eq!(total, expected);
        }
    }

    #[tokio::test]
    async fn test_reduce_with_changes_type() {
        let lengths = of(vec!["a", "bb", "ccc"])
            .parallel(2)
            .reduce_with(0usize, |acc, s: &str| acc + s.len(), |a, b| a + b)
            .await
            .unwrap();
        assert_eq!(lengths, 6);
    }

    #[tokio::test]
    async fn test_fold_sequential_ignores_parallelism() {
        let joined = of(vec!["a", "b", "c"])
            .parallel(4)
            .fold_sequential(String::new(), |mut acc, s| {
                acc.push_str(s);
                acc
            })
            .await;
        assert_eq!(joined, "abc");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_count() {
        assert_eq!(range(0, 0).count().await.unwrap(), 0);
        assert_eq!(range(0, 1234).count().await.unwrap(), 1234);
        assert_eq!(range(0, 1234).parallel(4).count().await.unwrap(), 1234);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_match_on_empty_stream_skips_predicate() {
        for parallelism in [1, 4] {
            let calls = Arc::new(AtomicUsize::new(0));
            let (c1, c2, c3) = (calls.clone(), calls.clone(), calls.clone());

            let all = range(0, 0)
                .parallel(parallelism)
                .all_match(move |_| {
                    c1.fetch_add(1, Ordering::SeqCst);
                    false
                })
                .await
                .unwrap();
            let any = range(0, 0)
                .parallel(parallelism)
                .any_match(move |_| {
                    c2.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .await
                .unwrap();
            let none = range(0, 0)
                .parallel(parallelism)
                .none_match(move |_| {
                    c3.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .await
                .unwrap();

            assert!(all);
            assert!(!any);
            assert!(none);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_match_results() {
        for parallelism in [1, 4] {
            let all_small = range(0, 10_000).parallel(parallelism).all_match(|x| *x < 10_000);
            assert!(all_small.await.unwrap());

            let all_even = range(0, 10_000).parallel(parallelism).all_match(|x| x % 2 == 0);
            assert!(!all_even.await.unwrap());

            let any_big = range(0, 10_000).parallel(parallelism).any_match(|x| *x == 9_999);
            assert!(any_big.await.unwrap());

            let any_negative = range(0, 10_000).parallel(parallelism).any_match(|x| *x < 0);
            assert!(!any_negative.await.unwrap());

            let none_negative = range(0, 100).parallel(parallelism).none_match(|x| *x < 0);
            assert!(none_negative.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_any_match_stops_at_first_match_sequentially() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let found = range(0, 100)
            .any_match(move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                *x == 3
            })
            .await
            .unwrap();
        assert!(found);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_match_stops_early() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let found = range(0, 1_000_000)
            .parallel(4)
            .any_match(move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                *x == 10
            })
            .await
            .unwrap();
        assert!(found);
        assert!(calls.load(Ordering::SeqCst) < 10_000);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let all_small = range(0, 1_000_000)
            .parallel(4)
            .all_match(move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                *x < 5
            })
            .await
            .unwrap();
        assert!(!all_small);
        assert!(calls.load(Ordering::SeqCst) < 10_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_min_max_seed_from_first_item() {
        for parallelism in [1, 3] {
            let positives = || of(vec![7i64, 3, 9, 4]).parallel(parallelism);
            assert_eq!(positives().min().await.unwrap(), Some(3));
            assert_eq!(positives().max().await.unwrap(), Some(9));

            let negatives = || of(vec![-7i64, -3, -9, -4]).parallel(parallelism);
            assert_eq!(negatives().min().await.unwrap(), Some(-9));
            assert_eq!(negatives().max().await.unwrap(), Some(-3));

            assert_eq!(of(Vec::<i64>::new()).parallel(parallelism).min().await.unwrap(), None);
            assert_eq!(of(Vec::<i64>::new()).parallel(parallelism).max().await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_min_by_keeps_first_of_equal_items() {
        let words = of(vec!["bb", "aa", "c", "d"]);
        let shortest = words.min_by(|a: &&str, b: &&str| a.len().cmp(&b.len()));
        assert_eq!(shortest.await.unwrap(), Some("c"));

        let words = of(vec!["bb", "aa", "c", "d"]);
        let longest = words.max_by(|a: &&str, b: &&str| a.len().cmp(&b.len()));
        assert_eq!(longest.await.unwrap(), Some("bb"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_panic_is_reported_after_siblings_finish() {
        let visited = Arc::new(AtomicUsize::new(0));
        let counter = visited.clone();
        let result = range(0, 1000)
            .parallel(4)
            .for_each(move |x| {
                if x == 500 {
                    panic!("bad item");
                }
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
        assert!(err.is_panic());
        assert_eq!(visited.load(Ordering::SeqCst), 999);
    }

    #[tokio::test]
    async fn test_generator_with_limit() {
        let next = Arc::new(AtomicUsize::new(0));
        let rolls = generate(move || Some(next.fetch_add(1, Ordering::SeqCst) % 6 + 1))
            .limit(5)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(rolls, vec![1, 2, 3, 4, 5]);
    }
}
