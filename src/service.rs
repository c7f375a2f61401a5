//! Data service feeding the vesting engine
//!
//! Every read goes through the same tiers: the request deduplicator collapses
//! identical concurrent calls, the durable cache serves per the category's
//! freshness policy, and only then is the data source consulted. Results carry
//! the HTTP directives of their category so an outer layer can decorate
//! responses without recomputing policy.

use crate::cache::{Cached, DurableCache, ServedFrom};
use crate::config::Config;
use crate::core::PreviewResult;
use crate::dedup::RequestDeduplicator;
use crate::freshness::{CacheKey, DataCategory, FreshnessTable, HttpDirectives};
use crate::logger::{self, LogTag};
use crate::source::DataSource;
use crate::vesting::{
    compute_metrics, current_day, GlobalState, ProjectConfig, ProjectionRequest,
    SimulationOverrides, Timeline, TimelineProjector, UserClaim, VestingMetrics,
    VestingParameters,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Value plus provenance and the directives for its category
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub value: T,
    pub origin: ServedFrom,
    pub stored_at: DateTime<Utc>,
    pub directives: HttpDirectives,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStates {
    pub project_config: ServedFrom,
    pub global_state: ServedFrom,
    pub user_claim: ServedFrom,
}

impl DataStates {
    /// True when any input was served past its fresh window
    pub fn any_stale(&self) -> bool {
        [self.project_config, self.global_state, self.user_claim].contains(&ServedFrom::Stale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingPreview {
    /// `None` when a newer preview for the same wallet superseded this one
    pub timeline: Option<Timeline>,
    pub today: VestingMetrics,
    pub current_day: u32,
    pub max_token_amount: f64,
    pub data_states: DataStates,
}

pub struct VestingDataService {
    table: FreshnessTable,
    cache: Arc<DurableCache>,
    source: Arc<dyn DataSource>,
    configs: RequestDeduplicator<Cached<ProjectConfig>>,
    globals: RequestDeduplicator<Cached<GlobalState>>,
    claims: RequestDeduplicator<Cached<UserClaim>>,
    projector: TimelineProjector,
}

impl VestingDataService {
    pub fn new(config: &Config, source: Arc<dyn DataSource>) -> PreviewResult<Self> {
        let cache = Arc::new(DurableCache::from_config(&config.cache));
        Self::with_cache(config, source, cache)
    }

    pub fn with_cache(
        config: &Config,
        source: Arc<dyn DataSource>,
        cache: Arc<DurableCache>,
    ) -> PreviewResult<Self> {
        let table = FreshnessTable::from_config(config)?;
        let projector = TimelineProjector::spawn(&config.projector)?;

        logger::info(
            LogTag::System,
            &format!(
                "Vesting data service ready (source={}, cache={})",
                source.name(),
                cache.backend_name()
            ),
        );

        Ok(Self {
            table,
            cache,
            source,
            configs: RequestDeduplicator::from_config(&config.cache),
            globals: RequestDeduplicator::from_config(&config.cache),
            claims: RequestDeduplicator::from_config(&config.cache),
            projector,
        })
    }

    pub fn cache(&self) -> &Arc<DurableCache> {
        &self.cache
    }

    pub fn freshness(&self) -> &FreshnessTable {
        &self.table
    }

    pub fn projector(&self) -> &TimelineProjector {
        &self.projector
    }

    pub async fn project_config(&self, project_id: &str) -> PreviewResult<Served<ProjectConfig>> {
        let key = CacheKey::project(project_id)?.to_string();
        let policy = self.table.resolve(DataCategory::ProjectConfig)?;
        let cache = Arc::clone(&self.cache);
        let source = Arc::clone(&self.source);
        let project_id = project_id.to_string();

        let cached = self
            .configs
            .dedupe(&key, {
                let key = key.clone();
                move || async move {
                    cache
                        .get_or_fetch(&key, &policy, move || async move {
                            source.fetch_project_config(&project_id).await
                        })
                        .await
                }
            })
            .await?;
        self.serve(cached, DataCategory::ProjectConfig)
    }

    pub async fn global_state(&self, project_id: &str) -> PreviewResult<Served<GlobalState>> {
        let key = CacheKey::global(project_id)?.to_string();
        let policy = self.table.resolve(DataCategory::GlobalState)?;
        let cache = Arc::clone(&self.cache);
        let source = Arc::clone(&self.source);
        let project_id = project_id.to_string();

        let cached = self
            .globals
            .dedupe(&key, {
                let key = key.clone();
                move || async move {
                    cache
                        .get_or_fetch(&key, &policy, move || async move {
                            source.fetch_global_state(&project_id).await
                        })
                        .await
                }
            })
            .await?;
        self.serve(cached, DataCategory::GlobalState)
    }

    pub async fn user_claim(&self, project_id: &str, wallet: &str) -> PreviewResult<Served<UserClaim>> {
        let key = CacheKey::user(project_id, wallet)?.to_string();
        let policy = self.table.resolve(DataCategory::UserClaim)?;
        let cache = Arc::clone(&self.cache);
        let source = Arc::clone(&self.source);
        let project_id = project_id.to_string();
        let wallet = wallet.to_string();

        let cached = self
            .claims
            .dedupe(&key, {
                let key = key.clone();
                move || async move {
                    cache
                        .get_or_fetch(&key, &policy, move || async move {
                            source.fetch_user_claim(&project_id, &wallet).await
                        })
                        .await
                }
            })
            .await?;
        self.serve(cached, DataCategory::UserClaim)
    }

    fn serve<T>(&self, cached: Cached<T>, category: DataCategory) -> PreviewResult<Served<T>> {
        Ok(Served {
            value: cached.value,
            origin: cached.origin,
            stored_at: cached.stored_at,
            directives: self.table.directives(category)?,
        })
    }

    /// Fetch all three inputs, apply `overrides`, and project the unlock
    /// window. `today` is computed inline so it is available even when the
    /// projection is superseded.
    pub async fn preview(
        &self,
        project_id: &str,
        wallet: &str,
        overrides: &SimulationOverrides,
        now: DateTime<Utc>,
    ) -> PreviewResult<VestingPreview> {
        let (config, global, claim) = tokio::try_join!(
            self.project_config(project_id),
            self.global_state(project_id),
            self.user_claim(project_id, wallet),
        )?;

        let data_states = DataStates {
            project_config: config.origin,
            global_state: global.origin,
            user_claim: claim.origin,
        };
        if data_states.any_stale() {
            logger::debug(
                LogTag::Vesting,
                &format!("Preview for {} uses stale inputs: {:?}", project_id, data_states),
            );
        }

        let project = overrides.apply_to_config(&config.value);
        let global = overrides.apply_to_global(&global.value);
        let max_token_amount = overrides.apply_to_amount(claim.value.max_token_amount);

        let day = current_day(project.unlock_start, now, project.unlock_duration_days);
        let today = compute_metrics(&VestingParameters::from_sources(
            max_token_amount,
            &project,
            &global,
            day,
        ));

        // Supersession is scoped to this wallet's previews
        let caller = CacheKey::user(project_id, wallet)?.to_string();
        let start_date = project.unlock_start.map(|start| start.date_naive());
        let timeline = self
            .projector
            .project(&caller, ProjectionRequest {
                max_token_amount,
                config: Some(project),
                global_state: Some(global),
                start_date,
            })
            .await?;

        if timeline.is_none() {
            logger::debug(
                LogTag::Projector,
                &format!("Preview projection for {} was superseded", project_id),
            );
        }

        Ok(VestingPreview {
            timeline,
            today,
            current_day: day,
            max_token_amount,
            data_states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryStore};
    use crate::core::PreviewError;
    use crate::freshness::Visibility;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct MockSource {
        config_calls: AtomicUsize,
        global_calls: AtomicUsize,
        claim_calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl MockSource {
        fn check(&self) -> PreviewResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(PreviewError::source_unavailable("mock", "offline"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DataSource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_project_config(&self, project_id: &str) -> PreviewResult<ProjectConfig> {
            self.config_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.check()?;
            Ok(ProjectConfig {
                project_id: project_id.to_string(),
                base_token_claim_bps: 0,
                unlock_duration_days: 90,
                early_vest_ratio_min_bps: 2_000,
                early_vest_ratio_max_bps: 6_000,
                unlock_start: Some(t0() - Duration::days(45)),
            })
        }

        async fn fetch_global_state(&self, _project_id: &str) -> PreviewResult<GlobalState> {
            self.global_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(GlobalState {
                total_loyalty: 0.0,
                total_loyalty_ineligible: 0.0,
                token_amount: 76_880_160.0,
            })
        }

        async fn fetch_user_claim(&self, _project_id: &str, wallet: &str) -> PreviewResult<UserClaim> {
            self.claim_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if wallet == "unknown" {
                return Err(PreviewError::NotFound(format!("wallet {}", wallet)));
            }
            Ok(UserClaim {
                wallet: wallet.to_string(),
                max_token_amount: 10_000.0,
                claimed_amount: 0.0,
                has_early_vested: false,
            })
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.cache.durable_enabled = false;
        config.cache.dedup_window_ms = 50;
        config
    }

    fn setup() -> (VestingDataService, Arc<MockSource>, Arc<ManualClock>) {
        let source = Arc::new(MockSource::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = Arc::new(DurableCache::new(Arc::new(MemoryStore::new(64)), clock.clone()));
        let service = VestingDataService::with_cache(&test_config(), source.clone(), cache).unwrap();
        (service, source, clock)
    }

    #[tokio::test]
    async fn test_concurrent_reads_hit_source_once() {
        let (service, source, _clock) = setup();
        let (a, b) = tokio::join!(service.project_config("alpha"), service.project_config("alpha"));

        assert_eq!(a.unwrap().value, b.unwrap().value);
        assert_eq!(source.config_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_read_after_window() {
        let (service, source, _clock) = setup();
        let first = service.project_config("alpha").await.unwrap();
        assert_eq!(first.origin, ServedFrom::Origin);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let second = service.project_config("alpha").await.unwrap();
        assert_eq!(second.origin, ServedFrom::Fresh);
        assert_eq!(source.config_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.directives.visibility, Visibility::Public);
        assert_eq!(second.directives.max_age, 86_400);
    }

    #[tokio::test]
    async fn test_stale_value_served_when_source_down() {
        let (service, source, clock) = setup();
        service.global_state("alpha").await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::seconds(3_700));
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let served = service.global_state("alpha").await.unwrap();
        assert_eq!(served.origin, ServedFrom::Stale);
        assert_eq!(served.value.token_amount, 76_880_160.0);
    }

    #[tokio::test]
    async fn test_private_claim_not_served_stale() {
        let (service, source, clock) = setup();
        service.user_claim("alpha", "w1").await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::seconds(3_600));
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let err = service.user_claim("alpha", "w1").await.unwrap_err();
        assert!(err.is_source_failure());
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_invalid_parameter() {
        let (service, _source, _clock) = setup();
        let err = service.user_claim("alpha", "unknown").await.unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[tokio::test]
    async fn test_malformed_key_rejected_before_source() {
        let (service, source, _clock) = setup();
        assert!(service.project_config("").await.is_err());
        assert!(service.user_claim("alpha", "a:b").await.is_err());
        assert_eq!(source.config_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.claim_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preview_assembles_timeline() {
        let (service, _source, _clock) = setup();
        let preview = service
            .preview("alpha", "w1", &SimulationOverrides::default(), t0())
            .await
            .unwrap();

        assert_eq!(preview.current_day, 45);
        assert!((preview.today.vested - 5_000.0).abs() < 1e-6);
        let timeline = preview.timeline.unwrap();
        assert_eq!(timeline.len(), 91);
        assert_eq!(timeline.at_day(45).unwrap().metrics, preview.today);
        assert_eq!(preview.data_states.user_claim, ServedFrom::Origin);
        assert!(!preview.data_states.any_stale());
    }

    #[tokio::test]
    async fn test_preview_applies_overrides() {
        let (service, _source, _clock) = setup();
        let overrides = SimulationOverrides {
            max_token_amount: Some(20_000.0),
            unlock_duration_days: Some(30),
            ..Default::default()
        };
        let preview = service.preview("alpha", "w1", &overrides, t0()).await.unwrap();

        assert_eq!(preview.max_token_amount, 20_000.0);
        assert_eq!(preview.current_day, 30);
        assert!(preview.today.is_unlock_complete);
        assert_eq!(preview.timeline.unwrap().len(), 31);
    }

    #[tokio::test]
    async fn test_concurrent_previews_for_different_wallets() {
        let (service, _source, _clock) = setup();
        let overrides = SimulationOverrides {
            unlock_duration_days: Some(50_000),
            ..Default::default()
        };

        let (a, b) = tokio::join!(
            service.preview("alpha", "wallet-a", &overrides, t0()),
            service.preview("alpha", "wallet-b", &overrides, t0()),
        );

        let a = a.unwrap().timeline.expect("wallet-a preview was cancelled");
        let b = b.unwrap().timeline.expect("wallet-b preview was cancelled");
        assert_eq!(a.len(), 50_001);
        assert_eq!(b.len(), 50_001);
    }

    #[tokio::test]
    async fn test_http_cache_disabled_yields_no_cache() {
        let mut config = test_config();
        config.cache.http_cache_enabled = false;
        let service = VestingDataService::new(&config, Arc::new(MockSource::default())).unwrap();

        let served = service.global_state("alpha").await.unwrap();
        assert!(served.directives.no_store);
    }
}
