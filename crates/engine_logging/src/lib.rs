#![deny(missing_docs)]
//! Shared logging utilities for the news pipeline workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Lines logged from a
//! partition worker thread are prefixed with the partition index.

use std::cell::Cell;
use std::fmt;

thread_local! {
    /// Thread-local storage for the partition the current worker thread runs.
    static PARTITION: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Marks the current thread as the worker for `partition`.
/// Workers call this once before processing their slice.
pub fn set_partition(partition: usize) {
    PARTITION.with(|v| v.set(Some(partition)));
}

/// Clears the partition marker of the current thread.
pub fn clear_partition() {
    PARTITION.with(|v| v.set(None));
}

/// Retrieves the partition index of the current thread, if any.
pub fn current_partition() -> Option<usize> {
    PARTITION.with(|v| v.get())
}

/// Log line prefix naming the current partition; empty outside workers.
#[doc(hidden)]
pub struct PartitionPrefix;

impl fmt::Display for PartitionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match current_partition() {
            Some(partition) => write!(f, "partition={partition} "),
            None => Ok(()),
        }
    }
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::PartitionPrefix, format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::PartitionPrefix, format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::PartitionPrefix, format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::PartitionPrefix, format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::PartitionPrefix, format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
