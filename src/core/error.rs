//! Error types for stream execution.
//!
//! Producers never fail: end-of-stream is the only signal a pull can return.
//! Errors only surface at the terminal boundary, where fan-out workers are joined.

use std::panic;

use thiserror::Error;
use tokio::task::JoinError;

/// The main error type for terminal operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A fan-out worker did not run to completion.
    ///
    /// Either a user-supplied closure panicked inside the worker, or the runtime
    /// cancelled the task while shutting down. Sibling workers are not halted; the
    /// terminal reports the first failure once every worker has finished.
    #[error("stream worker failed: {0}")]
    Worker(#[from] JoinError),

    /// A stream configuration was rejected by [`StreamConfig::validate`].
    ///
    /// [`StreamConfig::validate`]: crate::pipeline::StreamConfig::validate
    #[error("invalid stream configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error with a message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    /// Returns true if a user closure panicked inside a worker.
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Worker(e) if e.is_panic())
    }

    /// Re-raise this error as a panic in the current thread.
    ///
    /// Used where an error cannot be returned, such as from inside
    /// [`Producer::next`](crate::core::Producer::next). A worker panic is resumed with
    /// its original payload.
    pub(crate) fn resume(self) -> ! {
        match self {
            Error::Worker(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            other => panic!("{}", other),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("parallelism must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid stream configuration: parallelism must be at least 1"
        );
        assert!(!err.is_panic());
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err: Error = handle.await.unwrap_err().into();
        assert!(err.is_panic());
        assert!(err.to_string().starts_with("stream worker failed"));
    }
}
