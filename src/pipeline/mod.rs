//! Stream composition.
//!
//! A [`Stream`] owns the root producer of a pipeline together with its
//! [`StreamConfig`]. Every combinator consumes the stream and returns a new one that
//! wraps the old producer, so pipelines are immutable by construction and the
//! configuration, including the parallelism degree, flows through each stage.
//!
//! Nothing runs until a terminal operation (see [`terminal`]) pulls the pipeline.

pub mod terminal;

use futures_core::Stream as AsyncStream;
use std::cmp::Ordering;
use std::hash::Hash;
use tokio::sync::mpsc;

use crate::core::{Comparator, Error, Producer, Result};
use crate::processors::{
    Chain, Distinct, Filter, FilterN, FlatMap, Map, Peek, Skip, Sorted, Take,
};
use crate::sort::PARALLEL_SORT_THRESHOLD;
use crate::sources::{ChannelSource, FnSource, RangeSource, StreamSource, VecSource};

/// Configuration for stream execution
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StreamConfig {
    /// Number of concurrent workers a terminal operation uses
    pub parallelism: usize,
    /// Slice length at or below which the parallel merge sort stops splitting
    pub sort_threshold: usize,
    /// Capacity of the fan-in result channel; `None` sizes it to `parallelism`
    pub result_buffer: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            sort_threshold: PARALLEL_SORT_THRESHOLD,
            result_buffer: None,
        }
    }
}

impl StreamConfig {
    /// Check that the configuration can drive a terminal operation
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(Error::config("parallelism must be at least 1"));
        }
        if self.result_buffer == Some(0) {
            return Err(Error::config("result buffer must hold at least one item"));
        }
        Ok(())
    }

    /// Effective capacity of the fan-in result channel
    pub fn result_buffer_len(&self) -> usize {
        self.result_buffer.unwrap_or(self.parallelism).max(1)
    }
}

/// A lazily evaluated pipeline rooted at producer `P`.
pub struct Stream<P> {
    producer: P,
    config: StreamConfig,
}

impl<P: Producer> Stream<P> {
    /// Create a sequential stream from any producer
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            config: StreamConfig::default(),
        }
    }

    /// Replace the configuration, rejecting an invalid one
    pub fn with_config(mut self, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Get the current configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get the declared parallelism degree
    pub fn parallelism(&self) -> usize {
        self.config.parallelism
    }

    /// Get the root producer
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Unwrap the root producer, dropping the configuration
    pub fn into_producer(self) -> P {
        self.producer
    }

    /// Set the number of workers terminal operations fan out to.
    ///
    /// Values below 1 are treated as 1. Stages between here and the terminal
    /// operation do not parallelize themselves; only the final consumption does.
    /// Any degree above 1 gives up encounter order for `for_each`, `to_vec` and the
    /// order in which `reduce` combines partial results.
    pub fn parallel(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism.max(1);
        self
    }

    /// Set the slice length at or below which sorting stops splitting
    pub fn sort_threshold(mut self, threshold: usize) -> Self {
        self.config.sort_threshold = threshold;
        self
    }

    /// Set the capacity of the fan-in result channel (at least 1)
    pub fn result_buffer(mut self, capacity: usize) -> Self {
        self.config.result_buffer = Some(capacity.max(1));
        self
    }

    fn stage<Q, F>(self, build: F) -> Stream<Q>
    where
        F: FnOnce(P) -> Q,
    {
        let Stream { producer, config } = self;
        Stream {
            producer: build(producer),
            config,
        }
    }

    /// Keep only the items that satisfy `predicate`
    pub fn filter<F>(self, predicate: F) -> Stream<Filter<P, F>>
    where
        F: Fn(&P::Item) -> bool + Send + Sync,
    {
        self.stage(|upstream| Filter::new(upstream, predicate))
    }

    /// Keep at most `n` items that satisfy `predicate`
    pub fn filter_n<F>(self, n: usize, predicate: F) -> Stream<FilterN<P, F>>
    where
        F: Fn(&P::Item) -> bool + Send + Sync,
    {
        self.stage(|upstream| FilterN::new(upstream, n, predicate))
    }

    /// Transform every item, possibly into another type
    pub fn map<F, U>(self, f: F) -> Stream<Map<P, F>>
    where
        F: Fn(P::Item) -> U + Send + Sync,
        U: Send + 'static,
    {
        self.stage(|upstream| Map::new(upstream, f))
    }

    /// Yield at most the first `n` items
    pub fn take(self, n: usize) -> Stream<Take<P>> {
        self.stage(|upstream| Take::new(upstream, n))
    }

    /// Alias for [`take`](Stream::take)
    pub fn limit(self, max_size: usize) -> Stream<Take<P>> {
        self.take(max_size)
    }

    /// Discard the first `n` items
    pub fn skip(self, n: usize) -> Stream<Skip<P>> {
        self.stage(|upstream| Skip::new(upstream, n))
    }

    /// Observe every item as it is pulled through
    pub fn peek<F>(self, observer: F) -> Stream<Peek<P, F>>
    where
        F: Fn(&P::Item) + Send + Sync,
    {
        self.stage(|upstream| Peek::new(upstream, observer))
    }

    /// Replace every item with the items of the stream `mapper` returns for it
    pub fn flat_map<F, Q>(self, mapper: F) -> Stream<FlatMap<P, F, Q>>
    where
        F: Fn(P::Item) -> Stream<Q> + Send + Sync,
        Q: Producer,
    {
        self.stage(|upstream| FlatMap::new(upstream, mapper))
    }

    /// Drop items equal to one already yielded
    pub fn distinct(self) -> Stream<Distinct<P>>
    where
        P::Item: Eq + Hash + Clone,
    {
        self.stage(Distinct::new)
    }

    /// Yield this stream's items followed by `other`'s.
    ///
    /// The result's degree is the larger of the two.
    pub fn concat<Q>(self, other: Stream<Q>) -> Stream<Chain<P, Q>>
    where
        Q: Producer<Item = P::Item>,
    {
        let parallelism = self.config.parallelism.max(other.config.parallelism);
        let mut stream = self.stage(|first| Chain::new(first, other.producer));
        stream.config.parallelism = parallelism;
        stream
    }

    /// Sort the stream with `comparator`.
    ///
    /// This stream's degree drives materialization and sorting; the sorted stream
    /// itself is sequential so that it yields in order. Call
    /// [`parallel`](Stream::parallel) again to consume it with several workers.
    pub fn sorted_by<C>(self, comparator: C) -> Stream<Sorted<P, C>>
    where
        C: Comparator<P::Item>,
    {
        let parallelism = self.config.parallelism;
        let threshold = self.config.sort_threshold;
        let result_buffer = self.config.result_buffer_len();
        let mut stream = self.stage(|upstream| {
            Sorted::new(upstream, comparator, parallelism, threshold, result_buffer)
        });
        stream.config.parallelism = 1;
        stream
    }

    /// Sort the stream by the items' natural order
    #[allow(clippy::type_complexity)]
    pub fn sorted(self) -> Stream<Sorted<P, fn(&P::Item, &P::Item) -> Ordering>>
    where
        P::Item: Ord,
    {
        self.sorted_by(<P::Item as Ord>::cmp as fn(&P::Item, &P::Item) -> Ordering)
    }
}

impl<T: Send + 'static> Stream<VecSource<T>> {
    /// Create a stream over the items of a vector
    pub fn of(items: Vec<T>) -> Self {
        Stream::new(VecSource::new(items))
    }
}

impl Stream<RangeSource> {
    /// Create a stream over the integers in `[start, end)`
    pub fn range(start: i64, end: i64) -> Self {
        Stream::new(RangeSource::new(start..end))
    }
}

impl<T: Send + 'static> Stream<ChannelSource<T>> {
    /// Create a stream that drains a channel until it is closed
    pub fn from_channel(receiver: mpsc::Receiver<T>) -> Self {
        Stream::new(ChannelSource::new(receiver))
    }
}

impl<F, T> Stream<FnSource<F>>
where
    F: Fn() -> Option<T> + Send + Sync,
    T: Send + 'static,
{
    /// Create a stream from a generator; `None` ends it
    pub fn generate(f: F) -> Self {
        Stream::new(FnSource::new(f))
    }
}

impl<S> Stream<StreamSource<S>>
where
    S: AsyncStream + Unpin + Send,
    S::Item: Send + 'static,
{
    /// Create a stream that pulls from an asynchronous stream
    pub fn from_stream(stream: S) -> Self {
        Stream::new(StreamSource::new(stream))
    }
}

/// Create a stream over the items of a vector
pub fn of<T: Send + 'static>(items: Vec<T>) -> Stream<VecSource<T>> {
    Stream::of(items)
}

/// Create a stream over the integers in `[start, end)`
pub fn range(start: i64, end: i64) -> Stream<RangeSource> {
    Stream::range(start, end)
}

/// Create a stream from a generator; `None` ends it
pub fn generate<F, T>(f: F) -> Stream<FnSource<F>>
where
    F: Fn() -> Option<T> + Send + Sync,
    T: Send + 'static,
{
    Stream::generate(f)
}

/// Create a stream that drains a channel until it is closed
pub fn from_channel<T: Send + 'static>(receiver: mpsc::Receiver<T>) -> Stream<ChannelSource<T>> {
    Stream::from_channel(receiver)
}

/// Create a stream that pulls from an asynchronous stream
pub fn from_stream<S>(stream: S) -> Stream<StreamSource<S>>
where
    S: AsyncStream + Unpin + Send,
    S::Item: Send + 'static,
{
    Stream::from_stream(stream)
}

/// Concatenate two streams; see [`Stream::concat`]
pub fn concat<P, Q>(first: Stream<P>, second: Stream<Q>) -> Stream<Chain<P, Q>>
where
    P: Producer,
    Q: Producer<Item = P::Item>,
{
    first.concat(second)
}
