#![deny(missing_docs)]
//! Shared logging utilities for the tender search workspace.
//!
//! This crate provides the `tender_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Log lines emitted
//! through the macros are prefixed with the search correlation id of the
//! current thread, when one has been set.

use std::cell::RefCell;

thread_local! {
    /// Correlation id of the search the current thread is working on.
    static SEARCH_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets the search correlation id used to prefix log lines on this thread.
///
/// Pass `None` to clear it once the thread is no longer working on a search.
pub fn set_search_context(search_id: Option<&str>) {
    SEARCH_CONTEXT.with(|ctx| *ctx.borrow_mut() = search_id.map(ToOwned::to_owned));
}

/// Returns the search correlation id set for this thread, if any.
pub fn search_context() -> Option<String> {
    SEARCH_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Formats the `[search_id] ` prefix for the current thread.
///
/// Returns an empty string when no context is set. Used by the macros below.
#[doc(hidden)]
pub fn context_prefix() -> String {
    SEARCH_CONTEXT.with(|ctx| match ctx.borrow().as_deref() {
        Some(id) => format!("[{id}] "),
        None => String::new(),
    })
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! tender_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! tender_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! tender_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! tender_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! tender_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
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
