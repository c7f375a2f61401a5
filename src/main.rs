use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use comfy_table::{modifiers, presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::sync::Arc;
use vesting_preview::cache::DurableCache;
use vesting_preview::config::{load_config_from_path, Config, CONFIG_FILE_PATH};
use vesting_preview::freshness::{DataCategory, FreshnessTable};
use vesting_preview::logger::{self, LogTag};
use vesting_preview::service::{VestingDataService, VestingPreview};
use vesting_preview::source::HttpSource;
use vesting_preview::vesting::{compute_metrics, SimulationOverrides, VestingParameters};

#[derive(Parser)]
#[command(name = "vesting-preview")]
#[command(about = "Preview token vesting schedules from cached on-chain state", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Project the unlock window for a wallet
    Timeline(TimelineArgs),
    /// Compute a single day's metrics from explicit parameters
    Metrics(MetricsArgs),
    /// Print the Cache-Control value of every category
    Policies,
    /// Remove non-servable entries from the cache store
    Purge,
}

#[derive(Args)]
struct TimelineArgs {
    #[arg(long)]
    project: String,

    #[arg(long)]
    wallet: String,

    /// Simulate a different allocation
    #[arg(long)]
    amount: Option<f64>,

    /// Simulate a different unlock duration in days
    #[arg(long)]
    duration: Option<u32>,

    /// Date of day 0 when the project has no scheduled unlock (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Show every Nth day (current and final day are always shown)
    #[arg(long, default_value_t = 1)]
    every: u32,

    /// Print the preview as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MetricsArgs {
    #[arg(long)]
    max_amount: f64,

    #[arg(long, default_value_t = 0)]
    base_bps: u32,

    #[arg(long)]
    duration: u32,

    #[arg(long, default_value_t = 0)]
    min_bps: u32,

    #[arg(long, default_value_t = 0)]
    max_bps: u32,

    #[arg(long)]
    day: u32,

    #[arg(long, default_value_t = 0.0)]
    total_loyalty: f64,

    #[arg(long, default_value_t = 0.0)]
    ineligible: f64,

    #[arg(long, default_value_t = 0.0)]
    token_amount: f64,
}

fn is_logger_flag(arg: &str) -> bool {
    arg == "--verbose" || arg == "--quiet" || arg.starts_with("--debug-") || arg.starts_with("--verbose-")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logger flags are consumed before clap sees the arguments
    let (log_flags, args): (Vec<String>, Vec<String>) =
        std::env::args().partition(|arg| is_logger_flag(arg));
    let cli = Cli::parse_from(args);

    let config = load_config_from_path(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    logger::init(&config.logging);
    logger::init_from_args(&log_flags);

    match cli.command {
        Command::Timeline(args) => run_timeline(&config, args).await,
        Command::Metrics(args) => run_metrics(args),
        Command::Policies => run_policies(&config),
        Command::Purge => run_purge(&config),
    }
}

async fn run_timeline(config: &Config, args: TimelineArgs) -> Result<()> {
    let source = Arc::new(HttpSource::new(&config.source)?);
    let service = VestingDataService::new(config, source)?;
    let overrides = SimulationOverrides {
        max_token_amount: args.amount,
        unlock_duration_days: args.duration,
        ..Default::default()
    };

    let preview = match service.preview(&args.project, &args.wallet, &overrides, Utc::now()).await {
        Ok(preview) => preview,
        Err(e) if e.is_source_failure() => {
            logger::error(
                LogTag::Source,
                &format!("No cached data and the source is unavailable: {}", e),
            );
            return Err(e.into());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Preview failed")),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    print_preview(&preview, args.start, args.every.max(1));
    Ok(())
}

fn print_preview(preview: &VestingPreview, start: Option<NaiveDate>, every: u32) {
    let Some(timeline) = preview.timeline.as_ref() else {
        println!("Projection superseded by a newer request");
        return;
    };
    if timeline.is_empty() {
        println!("Nothing to project: allocation is empty or the project is not configured");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["Day", "Date", "Unlocked", "Locked", "Early %", "If claim now", "If wait"]
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    let last_day = timeline.final_entry().map(|e| e.day).unwrap_or(0);
    for entry in timeline.iter() {
        let is_today = entry.day == preview.current_day;
        if entry.day % every != 0 && !is_today && entry.day != last_day {
            continue;
        }

        let date = entry
            .date
            .or_else(|| start.and_then(|s| s.checked_add_signed(Duration::days(entry.day as i64))))
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let m = &entry.metrics;
        let day_cell = if is_today {
            Cell::new(format!("{} *", entry.day)).fg(Color::Green)
        } else {
            Cell::new(entry.day)
        };

        table.add_row(vec![
            day_cell,
            Cell::new(date),
            Cell::new(format!("{:.4}", m.unlocked)),
            Cell::new(format!("{:.4}", m.locked)),
            Cell::new(format!("{:.2}", m.early_vest_ratio_percent)),
            Cell::new(format!("{:.4}", m.total_if_early_claim)),
            Cell::new(format!("{:.4}", m.total_if_wait)),
        ]);
    }

    println!("{}", table);
    println!(
        "Day {} of {}: {} unlocked, {} claimable early, {} if waiting",
        preview.current_day,
        last_day,
        format!("{:.4}", preview.today.unlocked).bold(),
        format!("{:.4}", preview.today.total_if_early_claim).bold(),
        format!("{:.4}", preview.today.total_if_wait).bold()
    );
    if preview.data_states.any_stale() {
        println!("{}", "Some inputs were served stale; a refresh is in progress".yellow());
    }
}

fn run_metrics(args: MetricsArgs) -> Result<()> {
    let metrics = compute_metrics(&VestingParameters {
        max_token_amount: args.max_amount,
        base_token_claim_bps: args.base_bps,
        unlock_duration_days: args.duration,
        early_vest_ratio_min_bps: args.min_bps,
        early_vest_ratio_max_bps: args.max_bps,
        day_t: args.day,
        total_loyalty: args.total_loyalty,
        total_loyalty_ineligible: args.ineligible,
        token_amount: args.token_amount,
    });
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn run_policies(config: &Config) -> Result<()> {
    let table_source = FreshnessTable::from_config(config)?;

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(vec!["Category", "Fresh (s)", "Stale (s)", "Public", "Cache-Control"]);
    for category in DataCategory::all() {
        let policy = table_source.resolve(category)?;
        let directives = table_source.directives(category)?;
        table.add_row(vec![
            Cell::new(category),
            Cell::new(policy.fresh_seconds),
            Cell::new(policy.stale_seconds),
            Cell::new(policy.is_public),
            Cell::new(directives.header_value()),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_purge(config: &Config) -> Result<()> {
    let cache = DurableCache::from_config(&config.cache);
    let removed = cache.purge_expired()?;
    println!(
        "Removed {} expired entries from the {} store ({} remaining)",
        removed,
        cache.backend_name(),
        cache.len()?
    );
    Ok(())
}
