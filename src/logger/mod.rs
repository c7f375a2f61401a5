//! Tagged console logging
//!
//! ```rust
//! use vesting_preview::logger::{self, LogTag};
//!
//! logger::info(LogTag::Cache, "Durable cache ready");
//! logger::debug(LogTag::Dedup, "Collapsed request"); // only with --debug-dedup
//! ```
//!
//! Call [`init`] once at startup with the logging section of the config, then
//! [`init_from_args`] if command-line debug flags should be honoured.

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

use crate::config::LoggingConfig;

/// Initialize the logger from the loaded configuration
pub fn init(logging: &LoggingConfig) {
    config::init_from_config(logging);
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, shown only when debug is enabled for `tag`
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level, shown only with --verbose or --verbose-<tag>
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}
