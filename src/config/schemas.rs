// Configuration sections for the preview engine and its caching tiers

use crate::config_struct;
use crate::core::constants::*;

config_struct! {
    /// Caching tier switches and storage settings
    pub struct CacheConfig {
        /// Use the SQLite store; when false the bounded in-memory map is used
        durable_enabled: bool = true,

        /// SQLite file backing the durable cache
        database_path: String = DEFAULT_CACHE_DATABASE.to_string(),

        /// Entry limit of the in-memory fallback (LRU eviction)
        memory_capacity: usize = DEFAULT_MEMORY_CAPACITY,

        /// Window during which identical requests collapse into one fetch
        dedup_window_ms: u64 = DEFAULT_DEDUP_WINDOW_MS,

        /// Emit Cache-Control directives for data responses
        http_cache_enabled: bool = true,
    }
}

config_struct! {
    /// Staleness budgets per data category
    pub struct FreshnessConfig {
        project_config_fresh_secs: u64 = PROJECT_CONFIG_FRESH_SECS,
        project_config_stale_secs: u64 = PROJECT_CONFIG_STALE_SECS,
        global_state_fresh_secs: u64 = GLOBAL_STATE_FRESH_SECS,
        global_state_stale_secs: u64 = GLOBAL_STATE_STALE_SECS,
        user_claim_fresh_secs: u64 = USER_CLAIM_FRESH_SECS,
        user_claim_stale_secs: u64 = USER_CLAIM_STALE_SECS,
        /// Per-wallet data stays private unless explicitly opened up
        user_claim_public: bool = false,
        immutable_max_age_secs: u64 = IMMUTABLE_MAX_AGE_SECS,
    }
}

config_struct! {
    /// Intermediate API serving raw contract values
    pub struct SourceConfig {
        base_url: String = "http://127.0.0.1:3000/api".to_string(),
        timeout_secs: u64 = DEFAULT_SOURCE_TIMEOUT_SECS,
    }
}

config_struct! {
    pub struct ProjectorConfig {
        /// Name of the dedicated projection thread
        worker_name: String = "timeline-projector".to_string(),
    }
}

config_struct! {
    pub struct LoggingConfig {
        /// error | warning | info | debug | verbose
        min_level: String = "info".to_string(),

        /// Tags with debug output enabled, e.g. ["cache", "dedup"]
        debug_tags: Vec<String> = Vec::new(),
    }
}

config_struct! {
    /// Root configuration, built once at startup and passed by reference
    pub struct Config {
        cache: CacheConfig = CacheConfig::default(),
        freshness: FreshnessConfig = FreshnessConfig::default(),
        source: SourceConfig = SourceConfig::default(),
        projector: ProjectorConfig = ProjectorConfig::default(),
        logging: LoggingConfig = LoggingConfig::default(),
    }
}
