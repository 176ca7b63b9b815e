//! Module-gated logging macros.
//!
//! A module opts in by defining two constants and importing the macros from the
//! crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "formcoach::relay";
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("connected to {}", url);
//! ```
//!
//! Every line is emitted under `LOG_TARGET`, so `RUST_LOG=formcoach::relay=debug`
//! narrows output to one subsystem, while `ENABLE_LOGS = false` silences a noisy
//! module at compile time.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

/// Errors are never gated by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        log::error!(target: LOG_TARGET, $($arg)*);
    }};
}
