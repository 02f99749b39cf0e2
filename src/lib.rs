//! # Lazy, pull-based streams with data-parallel terminal operations
//!
//! This crate builds lazily evaluated pipelines over finite or generated sequences,
//! in the style of Java streams, and runs them either sequentially or fanned out over
//! a fixed number of tokio tasks.
//!
//! ## Core Concepts
//!
//! - **Producer**: Yields the next item on demand, `None` once exhausted
//! - **Stage**: A producer wrapping an upstream producer (filter, map, take, sorted, ...)
//! - **Stream**: The root producer of a pipeline plus its configuration
//! - **Terminal operation**: Drives the pipeline to exhaustion and returns a result
//!
//! Declaring a parallelism degree `p` with [`Stream::parallel`] makes the terminal
//! operation spawn `p` workers that all pull the same shared pipeline, keep partial
//! results, and combine them once every worker has finished. Encounter order is only
//! preserved at degree 1.
//!
//! ## Example
//!
//! ```rust
//! use parastream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sum_of_even_squares = range(1, 101)
//!         .parallel(4)
//!         .filter(|x| x % 2 == 0)
//!         .map(|x| x * x)
//!         .reduce(0, |a, b| a + b)
//!         .await?;
//!     assert_eq!(sum_of_even_squares, 171_700);
//!
//!     let top_three = of(vec![5, 1, 4, 2, 3]).sorted().limit(3).to_vec().await?;
//!     assert_eq!(top_three, vec![1, 2, 3]);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod pipeline;
pub mod processors;
pub mod sort;
pub mod sources;
pub mod util;

mod tracing_support;

#[cfg(feature = "metrics")]
mod metrics;

// Re-export commonly used items
pub mod prelude {
    pub use crate::core::{Comparator, Error, Producer, Result};
    pub use crate::pipeline::{
        concat, from_channel, from_stream, generate, of, range, Stream, StreamConfig,
    };
    pub use crate::util::{by_key, natural_order, reverse_order, reversed};
}

pub use crate::core::{Error, Result};
pub use pipeline::{concat, from_channel, from_stream, generate, of, range, Stream, StreamConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
