// Contract arithmetic
pub const BPS_SCALE: f64 = 10_000.0;
pub const SECONDS_PER_DAY: i64 = 86_400;

// Freshness budgets (seconds)
pub const PROJECT_CONFIG_FRESH_SECS: u64 = 86_400;
pub const PROJECT_CONFIG_STALE_SECS: u64 = 172_800;
pub const GLOBAL_STATE_FRESH_SECS: u64 = 3_600;
pub const GLOBAL_STATE_STALE_SECS: u64 = 7_200;
pub const USER_CLAIM_FRESH_SECS: u64 = 3_600;
pub const USER_CLAIM_STALE_SECS: u64 = 3_600;
pub const IMMUTABLE_MAX_AGE_SECS: u64 = 31_536_000;

// Request collapsing
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 2_000;

// Durable cache
pub const DEFAULT_CACHE_DATABASE: &str = "data/vesting_cache.db";
pub const DEFAULT_MEMORY_CAPACITY: usize = 1_024;

// Data source
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;
