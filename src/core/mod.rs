//! Core traits and types for the parastream library.
//!
//! This module contains the pull abstraction, the comparator contract and the
//! error types that define the stream processing model.

pub mod error;
pub mod traits;

// Re-export core items
pub use error::{Error, Result};
pub use traits::{Comparator, Producer};
