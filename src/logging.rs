//! Crate-internal logging macros.
//!
//! With the `tracing` feature every macro forwards to the matching `tracing` macro under the
//! `event_history` target. Without it the arguments are only borrowed, so call sites compile the
//! same way and cost nothing at runtime.
//!
//! Call sites stick to `field = value` pairs followed by a string literal; format arguments in the
//! message are not supported by the no-op expansion.

macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::error!(target: "event_history", $($arg)*);
        #[cfg(not(feature = "tracing"))]
        $crate::__discard_fields!($($arg)*);
    }};
}

macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::warn!(target: "event_history", $($arg)*);
        #[cfg(not(feature = "tracing"))]
        $crate::__discard_fields!($($arg)*);
    }};
}

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::info!(target: "event_history", $($arg)*);
        #[cfg(not(feature = "tracing"))]
        $crate::__discard_fields!($($arg)*);
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "event_history", $($arg)*);
        #[cfg(not(feature = "tracing"))]
        $crate::__discard_fields!($($arg)*);
    }};
}

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::trace!(target: "event_history", $($arg)*);
        #[cfg(not(feature = "tracing"))]
        $crate::__discard_fields!($($arg)*);
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __discard_fields {
    ($field:ident = % $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        $crate::__discard_fields!($($rest)*);
    }};
    ($field:ident = ? $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        $crate::__discard_fields!($($rest)*);
    }};
    ($field:ident = $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        $crate::__discard_fields!($($rest)*);
    }};
    ($lit:literal $($rest:tt)*) => {};
    () => {};
}
