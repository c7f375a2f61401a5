use super::core::log_internal;
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::config::LoggingConfig;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Runtime filter settings for the logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub debug_tags: HashSet<String>,
    pub verbose_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

pub(super) fn init_from_config(logging: &LoggingConfig) {
    let mut config = LoggerConfig::default();
    if let Some(level) = LogLevel::parse(&logging.min_level) {
        config.min_level = level;
    }
    config.debug_tags = logging
        .debug_tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect();
    if !config.debug_tags.is_empty() && config.min_level < LogLevel::Debug {
        config.min_level = LogLevel::Debug;
    }
    let unknown = unknown_tags(&config.debug_tags);
    set_logger_config(config);
    warn_unknown_tags(&unknown);
}

/// Apply `--debug-<tag>`, `--verbose`, `--verbose-<tag>` and `--quiet` flags
pub fn init_from_args<I, S>(args: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config = get_logger_config();
    let mut requested = HashSet::new();
    for arg in args {
        let arg = arg.as_ref();
        if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--quiet" {
            config.min_level = LogLevel::Error;
        } else if let Some(tag) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(tag.to_lowercase());
            requested.insert(tag.to_lowercase());
            if config.min_level < LogLevel::Debug {
                config.min_level = LogLevel::Debug;
            }
        } else if let Some(tag) = arg.strip_prefix("--verbose-") {
            config.verbose_tags.insert(tag.to_lowercase());
            requested.insert(tag.to_lowercase());
        }
    }
    set_logger_config(config);
    warn_unknown_tags(&unknown_tags(&requested));
}

/// Requested tag keys that match no `LogTag` (and are not `all`), sorted
pub(super) fn unknown_tags(tags: &HashSet<String>) -> Vec<String> {
    let mut unknown: Vec<String> = tags
        .iter()
        .filter(|tag| tag.as_str() != "all")
        .filter(|tag| !LogTag::all().iter().any(|known| known.to_debug_key() == tag.as_str()))
        .cloned()
        .collect();
    unknown.sort();
    unknown
}

fn warn_unknown_tags(unknown: &[String]) {
    if unknown.is_empty() {
        return;
    }
    let known: Vec<&str> = LogTag::all().iter().map(|tag| tag.to_debug_key()).collect();
    log_internal(
        LogTag::Config,
        LogLevel::Warning,
        &format!(
            "Ignoring unknown log tags: {} (known: {})",
            unknown.join(", "),
            known.join(", ")
        ),
    );
}

pub(super) fn is_debug_enabled_for_tag(config: &LoggerConfig, tag: &LogTag) -> bool {
    config.debug_tags.contains(tag.to_debug_key()) || config.debug_tags.contains("all")
}

pub(super) fn is_verbose_enabled_for_tag(config: &LoggerConfig, tag: &LogTag) -> bool {
    config.verbose_tags.contains(tag.to_debug_key())
}
