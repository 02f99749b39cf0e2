//! Source implementations for the parastream library.
//!
//! Sources sit at the root of a pipeline. Each one documents whether it may be
//! pulled by several fan-out workers at once.

use async_trait::async_trait;
use futures_core::Stream as AsyncStream;
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio_stream::StreamExt;

use crate::core::Producer;
use crate::util::Slots;

/// A source that yields the items of a vector, in order.
///
/// Items are claimed through an atomic cursor, so any number of workers can pull
/// from one `VecSource` without external locking; each item is handed out exactly
/// once.
///
/// Each item is moved into its own lock-guarded slot, so building the source
/// allocates a second buffer of the input's length, and the input's allocation stays
/// alive until the move has finished.
pub struct VecSource<T> {
    slots: Slots<T>,
}

impl<T> VecSource<T> {
    /// Create a new vector source
    pub fn new(items: Vec<T>) -> Self {
        Self {
            slots: Slots::new(items),
        }
    }

    /// Get the number of items not yet pulled
    pub fn remaining(&self) -> usize {
        self.slots.remaining()
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for VecSource<T> {
    type Item = T;

    async fn next(&self) -> Option<Self::Item> {
        self.slots.claim()
    }
}

/// A source that yields the integers in `[start, end)`.
///
/// The cursor is guarded by a mutex, so workers sharing one range take turns
/// advancing it.
pub struct RangeSource {
    cursor: Mutex<i64>,
    end: i64,
}

impl RangeSource {
    /// Create a new range source
    pub fn new(range: Range<i64>) -> Self {
        Self {
            cursor: Mutex::new(range.start),
            end: range.end,
        }
    }
}

#[async_trait]
impl Producer for RangeSource {
    type Item = i64;

    async fn next(&self) -> Option<Self::Item> {
        let mut cursor = self.cursor.lock();
        if *cursor >= self.end {
            return None;
        }
        let item = *cursor;
        *cursor += 1;
        Some(item)
    }
}

/// A source that drains the receiving half of a channel.
///
/// `next` waits until an item arrives or every sender has been dropped; the source
/// ends once the channel is closed and empty. Concurrent pullers queue on the
/// receiver, and each item goes to exactly one of them.
pub struct ChannelSource<T> {
    receiver: TokioMutex<mpsc::Receiver<T>>,
}

impl<T> ChannelSource<T> {
    /// Create a new channel source
    pub fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self {
            receiver: TokioMutex::new(receiver),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for ChannelSource<T> {
    type Item = T;

    async fn next(&self) -> Option<Self::Item> {
        self.receiver.lock().await.recv().await
    }
}

/// A source backed by a generator function.
///
/// The generator returns `Some(item)` while it has more and `None` when it is done,
/// after which it is never called again. Calls are not serialized: under parallel
/// consumption the generator runs on several workers at once, and the `Sync` bound
/// leaves any coordination to the caller.
pub struct FnSource<F> {
    f: F,
    done: AtomicBool,
}

impl<F> FnSource<F> {
    /// Create a new generator source
    pub fn new(f: F) -> Self {
        Self {
            f,
            done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<F, T> Producer for FnSource<F>
where
    F: Fn() -> Option<T> + Send + Sync,
    T: Send + 'static,
{
    type Item = T;

    async fn next(&self) -> Option<Self::Item> {
        if self.done.load(Ordering::Acquire) {
            return None;
        }
        let item = (self.f)();
        if item.is_none() {
            self.done.store(true, Ordering::Release);
        }
        item
    }
}

/// A source that pulls from an asynchronous stream.
///
/// The stream is polled under an async mutex, so concurrent pullers take turns.
pub struct StreamSource<S> {
    stream: TokioMutex<S>,
    done: AtomicBool,
}

impl<S> StreamSource<S> {
    /// Create a new stream source
    pub fn new(stream: S) -> Self {
        Self {
            stream: TokioMutex::new(stream),
            done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S> Producer for StreamSource<S>
where
    S: AsyncStream + Unpin + Send,
    S::Item: Send + 'static,
{
    type Item = S::Item;

    async fn next(&self) -> Option<Self::Item> {
        if self.done.load(Ordering::Acquire) {
            return None;
        }
        let item = self.stream.lock().await.next().await;
        if item.is_none() {
            self.done.store(true, Ordering::Release);
        }
        item
    }
}
