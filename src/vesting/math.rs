//! Per-day vesting arithmetic
//!
//! Mirrors the contract's basis-point accounting on a 10_000 scale. All
//! quantities are `f64`; the only guards are the documented ones (zero-length
//! window, empty eligible pool, post-unlock state), and `locked` never goes
//! negative.

use super::types::{VestingMetrics, VestingParameters};
use crate::core::constants::{BPS_SCALE, SECONDS_PER_DAY};
use chrono::{DateTime, Utc};

/// Compute the vesting metrics for `params.day_t`
pub fn compute_metrics(params: &VestingParameters) -> VestingMetrics {
    let max_amount = params.max_token_amount;
    let duration = params.unlock_duration_days;
    let day = params.day_t;

    let base = max_amount * params.base_token_claim_bps as f64 / BPS_SCALE;
    let bonus = max_amount - base;

    let is_unlock_complete = day >= duration;

    // Capped at the full bonus so days past the window cannot over-vest
    let vested = if is_unlock_complete {
        bonus
    } else {
        (bonus * day as f64 / duration as f64).min(bonus)
    };

    let unlocked = base + vested;
    let locked = (max_amount - unlocked).max(0.0);

    let loyalty_bonus = loyalty_share(
        max_amount,
        params.total_loyalty,
        params.token_amount - params.total_loyalty_ineligible,
    );

    let (early_vest_ratio, early_vestable_bonus, forfeited) = if !is_unlock_complete && locked > 0.0 {
        let ratio = interpolate_ratio(
            params.early_vest_ratio_min_bps,
            params.early_vest_ratio_max_bps,
            day,
            duration,
        );
        let early_vestable = locked * ratio;
        (ratio, early_vestable, locked - early_vestable)
    } else {
        (0.0, 0.0, 0.0)
    };

    let total_if_wait = max_amount + loyalty_bonus;
    let total_if_early_claim = if is_unlock_complete {
        total_if_wait
    } else {
        unlocked + early_vestable_bonus
    };

    VestingMetrics {
        base,
        bonus,
        vested,
        unlocked,
        locked,
        early_vest_ratio,
        early_vest_ratio_percent: early_vest_ratio * 100.0,
        early_vestable_bonus,
        forfeited,
        loyalty_bonus,
        total_if_early_claim,
        total_if_wait,
        is_unlock_complete,
    }
}

/// Wallet's pro-rata share of the loyalty pool; zero when nothing is eligible
fn loyalty_share(max_amount: f64, total_loyalty: f64, eligible_pool: f64) -> f64 {
    if eligible_pool > 0.0 {
        max_amount * total_loyalty / eligible_pool
    } else {
        0.0
    }
}

/// Early-vest ratio in 0..=1, linear from min (day 0) to max (last day).
/// Callers guarantee `day < duration`, so `duration > 0`.
fn interpolate_ratio(min_bps: u32, max_bps: u32, day: u32, duration: u32) -> f64 {
    let min = min_bps as f64;
    let max = max_bps as f64;
    let progress = day as f64 / duration as f64;
    (min + (max - min) * progress) / BPS_SCALE
}

/// Whole days elapsed since `unlock_start`, clamped to `[0, duration]`.
/// Before the unlock is scheduled the window is considered not started.
pub fn current_day(unlock_start: Option<DateTime<Utc>>, now: DateTime<Utc>, duration: u32) -> u32 {
    let Some(start) = unlock_start else {
        return 0;
    };
    let elapsed_days = (now - start).num_seconds().div_euclid(SECONDS_PER_DAY);
    elapsed_days.clamp(0, duration as i64) as u32
}
