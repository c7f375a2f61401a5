// Value shapes for the vesting engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inputs for one day of the vesting computation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingParameters {
    pub max_token_amount: f64,
    pub base_token_claim_bps: u32,
    pub unlock_duration_days: u32,
    pub early_vest_ratio_min_bps: u32,
    pub early_vest_ratio_max_bps: u32,
    pub day_t: u32,
    pub total_loyalty: f64,
    pub total_loyalty_ineligible: f64,
    /// Total amount deposited into the pool
    pub token_amount: f64,
}

/// Per-day vesting result
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingMetrics {
    pub base: f64,
    pub bonus: f64,
    pub vested: f64,
    pub unlocked: f64,
    pub locked: f64,
    /// 0..=1
    pub early_vest_ratio: f64,
    pub early_vest_ratio_percent: f64,
    pub early_vestable_bonus: f64,
    pub forfeited: f64,
    pub loyalty_bonus: f64,
    pub total_if_early_claim: f64,
    pub total_if_wait: f64,
    pub is_unlock_complete: bool,
}

/// Project-level contract configuration (changes rarely)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_id: String,
    pub base_token_claim_bps: u32,
    pub unlock_duration_days: u32,
    pub early_vest_ratio_min_bps: u32,
    pub early_vest_ratio_max_bps: u32,
    /// Unlock window start; absent until the project schedules its unlock
    #[serde(default)]
    pub unlock_start: Option<DateTime<Utc>>,
}

/// Pool-wide aggregates, a point-in-time snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub total_loyalty: f64,
    pub total_loyalty_ineligible: f64,
    pub token_amount: f64,
}

/// Per-wallet claim state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaim {
    pub wallet: String,
    pub max_token_amount: f64,
    #[serde(default)]
    pub claimed_amount: f64,
    #[serde(default)]
    pub has_early_vested: bool,
}

/// User-editable replacements applied on top of fetched values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOverrides {
    pub max_token_amount: Option<f64>,
    pub base_token_claim_bps: Option<u32>,
    pub unlock_duration_days: Option<u32>,
    pub early_vest_ratio_min_bps: Option<u32>,
    pub early_vest_ratio_max_bps: Option<u32>,
    pub total_loyalty: Option<f64>,
    pub total_loyalty_ineligible: Option<f64>,
    pub token_amount: Option<f64>,
}

impl SimulationOverrides {
    pub fn is_empty(&self) -> bool {
        *self == SimulationOverrides::default()
    }

    /// Copy of `config` with overridden fields replaced
    pub fn apply_to_config(&self, config: &ProjectConfig) -> ProjectConfig {
        ProjectConfig {
            project_id: config.project_id.clone(),
            base_token_claim_bps: self.base_token_claim_bps.unwrap_or(config.base_token_claim_bps),
            unlock_duration_days: self.unlock_duration_days.unwrap_or(config.unlock_duration_days),
            early_vest_ratio_min_bps: self
                .early_vest_ratio_min_bps
                .unwrap_or(config.early_vest_ratio_min_bps),
            early_vest_ratio_max_bps: self
                .early_vest_ratio_max_bps
                .unwrap_or(config.early_vest_ratio_max_bps),
            unlock_start: config.unlock_start,
        }
    }

    pub fn apply_to_global(&self, global: &GlobalState) -> GlobalState {
        GlobalState {
            total_loyalty: self.total_loyalty.unwrap_or(global.total_loyalty),
            total_loyalty_ineligible: self
                .total_loyalty_ineligible
                .unwrap_or(global.total_loyalty_ineligible),
            token_amount: self.token_amount.unwrap_or(global.token_amount),
        }
    }

    pub fn apply_to_amount(&self, max_token_amount: f64) -> f64 {
        self.max_token_amount.unwrap_or(max_token_amount)
    }
}

impl VestingParameters {
    /// Assemble parameters for `day_t` from the three fetched shapes
    pub fn from_sources(
        max_token_amount: f64,
        config: &ProjectConfig,
        global: &GlobalState,
        day_t: u32,
    ) -> Self {
        Self {
            max_token_amount,
            base_token_claim_bps: config.base_token_claim_bps,
            unlock_duration_days: config.unlock_duration_days,
            early_vest_ratio_min_bps: config.early_vest_ratio_min_bps,
            early_vest_ratio_max_bps: config.early_vest_ratio_max_bps,
            day_t,
            total_loyalty: global.total_loyalty,
            total_loyalty_ineligible: global.total_loyalty_ineligible,
            token_amount: global.token_amount,
        }
    }
}
