use crate::core::{PreviewError, PreviewResult};
use crate::freshness::FreshnessPolicy;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Servability of an entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// now < fresh_until
    Fresh,
    /// fresh_until <= now < stale_until
    Stale,
    /// now >= stale_until, not servable
    Expired,
}

/// Stored value with its freshness bounds.
/// Invariant: `stored_at <= fresh_until <= stale_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// JSON-encoded value
    pub value: String,
    pub stored_at: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub stale_until: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh for `fresh_secs`, servable until `stale_secs` after `stored_at`.
    /// A stale bound shorter than the fresh bound is raised to it.
    pub fn with_ttl(
        key: &str,
        value: String,
        stored_at: DateTime<Utc>,
        fresh_secs: u64,
        stale_secs: u64,
    ) -> Self {
        let fresh_until = stored_at + secs(fresh_secs);
        let stale_until = stored_at + secs(stale_secs.max(fresh_secs));
        Self {
            key: key.to_string(),
            value,
            stored_at,
            fresh_until,
            stale_until,
        }
    }

    /// Bounds taken from a category policy; private policies get no stale window
    pub fn from_policy(
        key: &str,
        value: String,
        stored_at: DateTime<Utc>,
        policy: &FreshnessPolicy,
    ) -> Self {
        Self::with_ttl(
            key,
            value,
            stored_at,
            policy.fresh_seconds,
            policy.fresh_seconds + policy.stale_window_seconds(),
        )
    }

    pub fn encode<T: Serialize>(
        key: &str,
        value: &T,
        stored_at: DateTime<Utc>,
        policy: &FreshnessPolicy,
    ) -> PreviewResult<Self> {
        Ok(Self::from_policy(key, serde_json::to_string(value)?, stored_at, policy))
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> EntryState {
        if now < self.fresh_until {
            EntryState::Fresh
        } else if now < self.stale_until {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> PreviewResult<T> {
        serde_json::from_str(&self.value).map_err(|e| {
            PreviewError::Serialization(format!("Cached value for {} is unreadable: {}", self.key, e))
        })
    }
}

// TTLs beyond a century are treated as a century
const MAX_TTL_SECS: i64 = 100 * 365 * 86_400;

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(MAX_TTL_SECS).min(MAX_TTL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let entry = CacheEntry::with_ttl("global:alpha", "1".to_string(), t0(), 3_600, 7_200);
        assert!(entry.stored_at <= entry.fresh_until && entry.fresh_until <= entry.stale_until);

        assert_eq!(entry.state_at(t0()), EntryState::Fresh);
        assert_eq!(entry.state_at(t0() + Duration::seconds(3_599)), EntryState::Fresh);
        assert_eq!(entry.state_at(t0() + Duration::seconds(3_600)), EntryState::Stale);
        assert_eq!(entry.state_at(t0() + Duration::seconds(7_199)), EntryState::Stale);
        assert_eq!(entry.state_at(t0() + Duration::seconds(7_200)), EntryState::Expired);
    }

    #[test]
    fn test_private_policy_never_stale() {
        let policy = FreshnessPolicy {
            fresh_seconds: 3_600,
            stale_seconds: 7_200,
            is_public: false,
        };
        let entry = CacheEntry::from_policy("user:a:w", "1".to_string(), t0(), &policy);
        assert_eq!(entry.fresh_until, entry.stale_until);
        assert_eq!(entry.state_at(t0() + Duration::seconds(3_600)), EntryState::Expired);
    }

    #[test]
    fn test_stale_bound_never_below_fresh() {
        let entry = CacheEntry::with_ttl("k", "1".to_string(), t0(), 100, 10);
        assert_eq!(entry.fresh_until, entry.stale_until);
    }

    #[test]
    fn test_decode_reports_key() {
        let entry = CacheEntry::with_ttl("project:alpha", "not json".to_string(), t0(), 1, 1);
        let err = entry.decode::<u32>().unwrap_err();
        assert!(err.to_string().contains("project:alpha"));
    }
}
