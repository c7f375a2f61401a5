/// Subsystem a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Vesting,
    Projector,
    Freshness,
    Dedup,
    Cache,
    Source,
}

impl LogTag {
    /// Key used by `--debug-<key>` flags and `logging.debug_tags`
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Vesting => "vesting",
            LogTag::Projector => "projector",
            LogTag::Freshness => "freshness",
            LogTag::Dedup => "dedup",
            LogTag::Cache => "cache",
            LogTag::Source => "source",
        }
    }

    pub fn to_plain_string(&self) -> String {
        self.to_debug_key().to_uppercase()
    }

    pub fn all() -> [LogTag; 8] {
        [
            LogTag::System,
            LogTag::Config,
            LogTag::Vesting,
            LogTag::Projector,
            LogTag::Freshness,
            LogTag::Dedup,
            LogTag::Cache,
            LogTag::Source,
        ]
    }
}
