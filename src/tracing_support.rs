//! Logging hooks.
//!
//! With the `tracing` feature these forward to the `tracing` macros; without it they
//! expand to nothing, so call sites need no `cfg` attributes of their own.

macro_rules! debug_event {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)*);
        }
    };
}

macro_rules! warn_event {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)*);
        }
    };
}

pub(crate) use debug_event;
pub(crate) use warn_event;
