//! Freshness policy table
//!
//! One closed [`DataCategory`] enum dispatched through a single table keeps
//! the staleness contract auditable in one place. The durable cache and the
//! HTTP layer both derive their budgets from the same [`FreshnessPolicy`], so
//! they cannot disagree about how stale a value may be.

use crate::config::Config;
use crate::core::{PreviewError, PreviewResult};
use crate::logger::{self, LogTag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataCategory {
    ProjectConfig,
    GlobalState,
    UserClaim,
    /// Static assets, HTTP responses only
    Immutable,
    /// Non-cacheable HTTP responses
    NoCache,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::ProjectConfig => "projectConfig",
            DataCategory::GlobalState => "globalState",
            DataCategory::UserClaim => "userClaim",
            DataCategory::Immutable => "immutable",
            DataCategory::NoCache => "noCache",
        }
    }

    pub fn all() -> [DataCategory; 5] {
        [
            DataCategory::ProjectConfig,
            DataCategory::GlobalState,
            DataCategory::UserClaim,
            DataCategory::Immutable,
            DataCategory::NoCache,
        ]
    }

    /// Categories backed by on-chain data (and thus by the durable cache)
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            DataCategory::ProjectConfig | DataCategory::GlobalState | DataCategory::UserClaim
        )
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataCategory::all()
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PreviewError::Config(format!("Unknown freshness category: {}", s)))
    }
}

/// Staleness budget for one category. `stale_seconds` is measured from the
/// store time, so the stale-but-servable window is `stale - fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessPolicy {
    pub fresh_seconds: u64,
    pub stale_seconds: u64,
    pub is_public: bool,
}

impl FreshnessPolicy {
    pub fn fresh_for(&self) -> Duration {
        Duration::from_secs(self.fresh_seconds)
    }

    pub fn servable_for(&self) -> Duration {
        Duration::from_secs(self.stale_seconds.max(self.fresh_seconds))
    }

    /// Seconds a value may be served past its fresh window; zero when private
    pub fn stale_window_seconds(&self) -> u64 {
        if self.is_public {
            self.stale_seconds.saturating_sub(self.fresh_seconds)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDirectives {
    pub max_age: u64,
    pub stale_while_revalidate: u64,
    pub visibility: Visibility,
    pub immutable: bool,
    pub no_store: bool,
}

impl HttpDirectives {
    pub fn no_cache() -> Self {
        Self {
            max_age: 0,
            stale_while_revalidate: 0,
            visibility: Visibility::Private,
            immutable: false,
            no_store: true,
        }
    }

    /// Render as a `Cache-Control` header value
    pub fn header_value(&self) -> String {
        if self.no_store {
            return "no-cache, no-store, must-revalidate".to_string();
        }

        let mut parts = vec![
            match self.visibility {
                Visibility::Public => "public".to_string(),
                Visibility::Private => "private".to_string(),
            },
            format!("max-age={}", self.max_age),
        ];
        if self.stale_while_revalidate > 0 {
            parts.push(format!("stale-while-revalidate={}", self.stale_while_revalidate));
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        parts.join(", ")
    }
}

/// Map a policy onto HTTP cache directives
pub fn to_http_directives(policy: &FreshnessPolicy) -> HttpDirectives {
    HttpDirectives {
        max_age: policy.fresh_seconds,
        stale_while_revalidate: policy.stale_window_seconds(),
        visibility: if policy.is_public {
            Visibility::Public
        } else {
            Visibility::Private
        },
        immutable: false,
        no_store: false,
    }
}

/// Policy lookup built once from configuration
#[derive(Debug, Clone)]
pub struct FreshnessTable {
    policies: HashMap<DataCategory, FreshnessPolicy>,
    http_cache_enabled: bool,
}

impl FreshnessTable {
    pub fn from_config(config: &Config) -> PreviewResult<Self> {
        config.validate()?;
        let f = &config.freshness;

        let mut policies = HashMap::new();
        policies.insert(
            DataCategory::ProjectConfig,
            FreshnessPolicy {
                fresh_seconds: f.project_config_fresh_secs,
                stale_seconds: f.project_config_stale_secs,
                is_public: true,
            },
        );
        policies.insert(
            DataCategory::GlobalState,
            FreshnessPolicy {
                fresh_seconds: f.global_state_fresh_secs,
                stale_seconds: f.global_state_stale_secs,
                is_public: true,
            },
        );
        policies.insert(
            DataCategory::UserClaim,
            FreshnessPolicy {
                fresh_seconds: f.user_claim_fresh_secs,
                stale_seconds: f.user_claim_stale_secs,
                is_public: f.user_claim_public,
            },
        );
        policies.insert(
            DataCategory::Immutable,
            FreshnessPolicy {
                fresh_seconds: f.immutable_max_age_secs,
                stale_seconds: f.immutable_max_age_secs,
                is_public: true,
            },
        );
        policies.insert(
            DataCategory::NoCache,
            FreshnessPolicy {
                fresh_seconds: 0,
                stale_seconds: 0,
                is_public: false,
            },
        );

        let table = Self {
            policies,
            http_cache_enabled: config.cache.http_cache_enabled,
        };
        for category in DataCategory::all() {
            let policy = table.resolve(category)?;
            logger::debug(
                LogTag::Freshness,
                &format!(
                    "{} fresh={}s stale={}s public={}",
                    category, policy.fresh_seconds, policy.stale_seconds, policy.is_public
                ),
            );
        }
        Ok(table)
    }

    pub fn resolve(&self, category: DataCategory) -> PreviewResult<FreshnessPolicy> {
        self.policies.get(&category).copied().ok_or_else(|| {
            PreviewError::Config(format!("No freshness policy for category {}", category))
        })
    }

    pub fn resolve_name(&self, name: &str) -> PreviewResult<FreshnessPolicy> {
        self.resolve(name.parse()?)
    }

    /// Cache directives for responses of `category`
    pub fn directives(&self, category: DataCategory) -> PreviewResult<HttpDirectives> {
        let policy = self.resolve(category)?;
        let directives = match category {
            DataCategory::NoCache => HttpDirectives::no_cache(),
            DataCategory::Immutable => HttpDirectives {
                immutable: true,
                ..to_http_directives(&policy)
            },
            _ if !self.http_cache_enabled => HttpDirectives::no_cache(),
            _ => to_http_directives(&policy),
        };
        Ok(directives)
    }
}

/// Category-prefixed cache key: `project:<id>`, `global:<id>`,
/// `user:<id>:<wallet>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Project { project_id: String },
    Global { project_id: String },
    User { project_id: String, wallet: String },
}

fn key_segment(name: &str, value: &str) -> PreviewResult<String> {
    let value = value.trim();
    if value.is_empty() || value.contains(':') {
        return Err(PreviewError::InvalidParameter(format!(
            "{} must be non-empty and must not contain ':' (got '{}')",
            name, value
        )));
    }
    Ok(value.to_string())
}

impl CacheKey {
    pub fn project(project_id: &str) -> PreviewResult<Self> {
        Ok(CacheKey::Project {
            project_id: key_segment("project id", project_id)?,
        })
    }

    pub fn global(project_id: &str) -> PreviewResult<Self> {
        Ok(CacheKey::Global {
            project_id: key_segment("project id", project_id)?,
        })
    }

    pub fn user(project_id: &str, wallet: &str) -> PreviewResult<Self> {
        Ok(CacheKey::User {
            project_id: key_segment("project id", project_id)?,
            wallet: key_segment("wallet", wallet)?,
        })
    }

    pub fn category(&self) -> DataCategory {
        match self {
            CacheKey::Project { .. } => DataCategory::ProjectConfig,
            CacheKey::Global { .. } => DataCategory::GlobalState,
            CacheKey::User { .. } => DataCategory::UserClaim,
        }
    }

    pub fn parse(key: &str) -> PreviewResult<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            ["project", id] => CacheKey::project(id),
            ["global", id] => CacheKey::global(id),
            ["user", id, wallet] => CacheKey::user(id, wallet),
            _ => Err(PreviewError::InvalidParameter(format!("Malformed cache key: {}", key))),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Project { project_id } => write!(f, "project:{}", project_id),
            CacheKey::Global { project_id } => write!(f, "global:{}", project_id),
            CacheKey::User { project_id, wallet } => write!(f, "user:{}:{}", project_id, wallet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FreshnessTable {
        FreshnessTable::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_default_policies() {
        let table = table();
        assert_eq!(
            table.resolve(DataCategory::ProjectConfig).unwrap(),
            FreshnessPolicy {
                fresh_seconds: 86_400,
                stale_seconds: 172_800,
                is_public: true
            }
        );
        assert_eq!(
            table.resolve(DataCategory::GlobalState).unwrap(),
            FreshnessPolicy {
                fresh_seconds: 3_600,
                stale_seconds: 7_200,
                is_public: true
            }
        );
        let user = table.resolve(DataCategory::UserClaim).unwrap();
        assert!(!user.is_public);
        assert_eq!(user.stale_window_seconds(), 0);
    }

    #[test]
    fn test_directives_and_headers() {
        let table = table();

        let project = table.directives(DataCategory::ProjectConfig).unwrap();
        assert_eq!(project.max_age, 86_400);
        assert_eq!(project.stale_while_revalidate, 86_400);
        assert_eq!(project.visibility, Visibility::Public);
        assert_eq!(
            project.header_value(),
            "public, max-age=86400, stale-while-revalidate=86400"
        );

        let global = table.directives(DataCategory::GlobalState).unwrap();
        assert_eq!(global.header_value(), "public, max-age=3600, stale-while-revalidate=3600");

        let user = table.directives(DataCategory::UserClaim).unwrap();
        assert_eq!(user.stale_while_revalidate, 0);
        assert_eq!(user.header_value(), "private, max-age=3600");

        assert_eq!(
            table.directives(DataCategory::Immutable).unwrap().header_value(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(
            table.directives(DataCategory::NoCache).unwrap().header_value(),
            "no-cache, no-store, must-revalidate"
        );
    }

    #[test]
    fn test_private_stale_window_clamped() {
        let policy = FreshnessPolicy {
            fresh_seconds: 60,
            stale_seconds: 600,
            is_public: false,
        };
        assert_eq!(to_http_directives(&policy).stale_while_revalidate, 0);
    }

    #[test]
    fn test_http_tier_switch() {
        let mut config = Config::default();
        config.cache.http_cache_enabled = false;
        let table = FreshnessTable::from_config(&config).unwrap();
        assert!(table.directives(DataCategory::GlobalState).unwrap().no_store);
        assert!(table.directives(DataCategory::Immutable).unwrap().immutable);
    }

    #[test]
    fn test_unknown_category_is_config_error() {
        let table = table();
        assert!(table.resolve_name("globalState").is_ok());
        let err = table.resolve_name("walletBalances").unwrap_err();
        assert!(err.is_critical());
    }

    #[test]
    fn test_cache_keys() {
        let key = CacheKey::user("alpha", "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").unwrap();
        assert_eq!(
            key.to_string(),
            "user:alpha:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"
        );
        assert_eq!(key.category(), DataCategory::UserClaim);
        assert_eq!(CacheKey::parse(&key.to_string()).unwrap(), key);

        assert_eq!(CacheKey::project("alpha").unwrap().to_string(), "project:alpha");
        assert_eq!(CacheKey::global("alpha").unwrap().to_string(), "global:alpha");
        assert!(CacheKey::project("a:b").is_err());
        assert!(CacheKey::user("alpha", " ").is_err());
        assert!(CacheKey::parse("balance:alpha").is_err());
    }
}
