//! forecast-feed: forecast data pipeline for the sailing simulator.
//!
//! Subcommands:
//! 1. `prefetch` downloads and builds a run of forecast hours for offline use
//! 2. `stats` prints cache statistics (`--json` for machine output)
//! 3. `cleanup` applies the expiry and size policies
//! 4. `watch` runs both providers against a once-per-second clock

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use common::config::PipelineConfig;
use current_mesh::UnstructuredMeshSource;
use forecast_cache::{CacheManager, CacheStats};
use forecast_window::ForecastLoader;
use noaa_client::NoaaClient;
use providers::{current_provider, weather_provider};
use wind_grid::RegularGridSource;

/// Forecast data pipeline: cache, prefetch and live window.
#[derive(Parser)]
#[command(name = "forecast-feed", about = "Wind and current forecast pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download and build forecast hours into the cache.
    Prefetch {
        /// Start time in UTC, "YYYY-MM-DD HH:MM" (default: now).
        #[arg(long)]
        start: Option<String>,
        /// Number of hourly slices (default: window size).
        #[arg(long)]
        hours: Option<usize>,
        #[arg(long, conflicts_with = "current_only")]
        wind_only: bool,
        #[arg(long)]
        current_only: bool,
    },
    /// Print cache statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Remove expired files, then enforce the size limit.
    Cleanup,
    /// Tick both providers once per second and log samples at one point.
    Watch {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Stop after this many ticks (default: until Ctrl+C).
        #[arg(long)]
        ticks: Option<u64>,
        /// Simulation start in UTC (default: now).
        #[arg(long)]
        start: Option<String>,
    },
}

const START_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

fn parse_start(raw: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    let Some(raw) = raw else {
        return Ok(Utc::now());
    };
    START_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .map(|naive| naive.and_utc())
        .with_context(|| format!("could not parse start time '{}'", raw))
}

fn open_cache(cfg: &PipelineConfig) -> anyhow::Result<Arc<CacheManager>> {
    let cache = CacheManager::open(&cfg.cache.dir)
        .with_context(|| format!("opening cache at {}", cfg.cache.dir.display()))?;
    Ok(Arc::new(cache))
}

fn transport(cfg: &PipelineConfig) -> anyhow::Result<Arc<NoaaClient>> {
    let client = NoaaClient::new(Duration::from_secs(cfg.retry.request_timeout_secs))?;
    Ok(Arc::new(client))
}

/// Expiry first, then LRU down to the size budget.
fn apply_cache_policy(cfg: &PipelineConfig, cache: &CacheManager) -> (usize, usize) {
    let expired = cache.enforce_expiry(cfg.cache.expiry_days);
    let evicted = cache.enforce_size_limit(cfg.cache.max_size_bytes());
    (expired, evicted)
}

fn render_stats(stats: &CacheStats, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(stats)?);
    }
    Ok(stats.to_string())
}

fn print_stats(cfg: &PipelineConfig, cache: &CacheManager, json: bool) -> anyhow::Result<()> {
    let stats = cache
        .stats()
        .with_limits(cfg.cache.max_size_gb, cfg.cache.expiry_days);
    println!("{}", render_stats(&stats, json)?);
    Ok(())
}

/// Load `hours` consecutive slices through `loader`, carrying the shared
/// artifact forward. Returns (ok, failed).
async fn prefetch_with<L: ForecastLoader>(
    label: &str,
    loader: &L,
    start: DateTime<Utc>,
    hours: usize,
) -> (usize, usize) {
    use forecast_window::ForecastField;

    info!("Prefetching {} for {} hours from {}", label, hours, start.format("%Y-%m-%d %H:%M"));
    let mut shared = None;
    let (mut ok, mut failed) = (0, 0);
    for offset in 0..hours {
        let target = start + chrono::Duration::hours(offset as i64);
        match loader.load(target, shared.clone()).await {
            Ok(field) => {
                if shared.is_none() {
                    shared = field.shared();
                }
                ok += 1;
                info!("  {} hour {} ({}): OK", label, offset, target.format("%Y-%m-%d %H:%M"));
            }
            Err(e) => {
                failed += 1;
                warn!("  {} hour {} ({}): FAILED: {}", label, offset, target.format("%Y-%m-%d %H:%M"), e);
            }
        }
    }
    (ok, failed)
}

async fn run_prefetch(
    cfg: &PipelineConfig,
    start: DateTime<Utc>,
    hours: usize,
    wind: bool,
    current: bool,
) -> anyhow::Result<bool> {
    let cache = open_cache(cfg)?;
    let client = transport(cfg)?;
    let mut failed = 0;

    if wind {
        let loader = RegularGridSource::from_config(cfg, Arc::clone(&cache), Arc::clone(&client));
        let (ok, bad) = prefetch_with("wind", &loader, start, hours).await;
        info!("Wind: {} ok, {} failed", ok, bad);
        failed += bad;
    }
    if current {
        let loader = UnstructuredMeshSource::from_config(cfg, Arc::clone(&cache), Arc::clone(&client));
        let (ok, bad) = prefetch_with("current", &loader, start, hours).await;
        info!("Current: {} ok, {} failed", ok, bad);
        failed += bad;
    }

    let (expired, evicted) = apply_cache_policy(cfg, &cache);
    info!("Cache cleanup: {} expired, {} evicted for size", expired, evicted);
    print_stats(cfg, &cache, false)?;
    Ok(failed == 0)
}

async fn run_watch(
    cfg: &PipelineConfig,
    lat: f64,
    lon: f64,
    ticks: Option<u64>,
    start: DateTime<Utc>,
) -> anyhow::Result<()> {
    let cache = open_cache(cfg)?;
    let client = transport(cfg)?;
    let wind = weather_provider(cfg, Arc::clone(&cache), Arc::clone(&client), start)?;
    let current = current_provider(cfg, cache, client);
    wind.initialize(start);
    current.initialize(start);

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        let sim_time = start + chrono::Duration::seconds(tick as i64);
        wind.update(sim_time);
        current.update(sim_time);
        let w = wind.get(sim_time, lat, lon);
        let c = current.get(sim_time, lat, lon);
        let wp = wind.load_progress();
        let cp = current.load_progress();
        info!(
            "{} wind {:.0}° {:.1} kt | current {:.0}° {:.2} kt | loaded wind {}/{} current {}/{}",
            sim_time.format("%H:%M:%S"),
            w.direction_deg,
            w.speed_kts,
            c.direction_to_deg(),
            c.speed_kts(),
            wp.loaded,
            wp.total,
            cp.loaded,
            cp.total
        );

        tick += 1;
        if ticks.is_some_and(|n| tick >= n) {
            break;
        }
    }

    wind.stop().await;
    current.stop().await;
    info!("Providers stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "forecast_feed=info,forecast_cache=info,noaa_client=info,forecast_window=info,wind_grid=info,current_mesh=info,providers=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Cache: {} (expiry {}d, limit {:.1} GB){}",
        cfg.cache.dir.display(),
        cfg.cache.expiry_days,
        cfg.cache.max_size_gb,
        if cfg.offline { ", offline" } else { "" }
    );

    match cli.command {
        Command::Prefetch {
            start,
            hours,
            wind_only,
            current_only,
        } => {
            let start = parse_start(start.as_deref())?;
            let hours = hours.unwrap_or(cfg.window.hours);
            let ok = run_prefetch(&cfg, start, hours, !current_only, !wind_only).await?;
            if !ok {
                error!("Some forecast hours failed to prefetch");
                std::process::exit(1);
            }
        }
        Command::Stats { json } => {
            let cache = open_cache(&cfg)?;
            print_stats(&cfg, &cache, json)?;
        }
        Command::Cleanup => {
            let cache = open_cache(&cfg)?;
            let (expired, evicted) = apply_cache_policy(&cfg, &cache);
            println!("Removed {} expired and {} over-budget files", expired, evicted);
            print_stats(&cfg, &cache, false)?;
        }
        Command::Watch {
            lat,
            lon,
            ticks,
            start,
        } => {
            let start = parse_start(start.as_deref())?;
            run_watch(&cfg, lat, lon, ticks, start).await?;
        }
    }
    Ok(())
}
