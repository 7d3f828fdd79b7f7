//! Configuration loader: defaults, .env, forecast.toml, then environment.

use std::path::{Path, PathBuf};

use common::config::PipelineConfig;
use common::Error;

const DEFAULT_CONFIG_FILE: &str = "forecast.toml";

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if !(parsed >= 0.0) || !parsed.is_finite() {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_positive_i64(raw: &str, env_name: &str) -> Result<i64, Error> {
    let parsed = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed <= 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &PipelineConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.cache.expiry_days <= 0 {
        issues.push("cache.expiry_days must be > 0".into());
    }
    if !(config.cache.max_size_gb > 0.0) {
        issues.push("cache.max_size_gb must be > 0".into());
    }

    if config.window.hours == 0 {
        issues.push("window.hours must be > 0".into());
    }
    if config.window.priority_hours > config.window.hours {
        issues.push("window.priority_hours must be <= window.hours".into());
    }
    if !(config.window.preload_margin_hours > 0.0) {
        issues.push("window.preload_margin_hours must be > 0".into());
    }
    if config.window.preload_margin_hours >= config.window.hours as f64 {
        issues.push("window.preload_margin_hours must be < window.hours".into());
    }
    if !(config.window.load_throttle_secs >= 0.0) {
        issues.push("window.load_throttle_secs must be >= 0".into());
    }
    if config.window.idle_poll_ms == 0 {
        issues.push("window.idle_poll_ms must be > 0".into());
    }

    if config.retry.max_attempts == 0 {
        issues.push("retry.max_attempts must be > 0".into());
    }
    if !(config.retry.delay_secs >= 0.0) {
        issues.push("retry.delay_secs must be >= 0".into());
    }
    if config.retry.request_timeout_secs == 0 {
        issues.push("retry.request_timeout_secs must be > 0".into());
    }

    if config.wind.max_cycles_back == 0 {
        issues.push("wind.max_cycles_back must be > 0".into());
    }
    if config.wind.max_forecast_hour < 0 {
        issues.push("wind.max_forecast_hour must be >= 0".into());
    }
    if config.wind.max_forecast_hour > 99 {
        issues.push("wind.max_forecast_hour must fit two digits (<= 99)".into());
    }
    if config.current.model_cycles.is_empty() {
        issues.push("current.model_cycles must contain at least one hour".into());
    }
    if config.current.model_cycles.iter().any(|h| *h > 23) {
        issues.push("current.model_cycles hours must be in 0..=23".into());
    }
    if config.current.days_back == 0 {
        issues.push("current.days_back must be > 0".into());
    }
    if config.current.max_forecast_hour < 0 {
        issues.push("current.max_forecast_hour must be >= 0".into());
    }

    if config.area.min_lat >= config.area.max_lat || config.area.min_lon >= config.area.max_lon {
        issues.push("area min bounds must be below max bounds".into());
    }

    if let Some(name) = config.scenario.as_deref() {
        if name != "None" && !name.is_empty() && !config.scenarios.contains_key(name) {
            issues.push(format!(
                "scenario '{}' is not defined (known: {})",
                name,
                config.scenarios.keys().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(issues.join("; ")))
    }
}

/// Apply environment overrides. `lookup` is `std::env::var` in production.
fn apply_env_overrides(
    config: &mut PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(dir) = lookup("FORECAST_CACHE_DIR") {
        if !dir.trim().is_empty() {
            config.cache.dir = PathBuf::from(dir.trim());
        }
    }
    if let Some(raw) = lookup("FORECAST_OFFLINE") {
        config.offline = parse_bool(&raw);
    }
    if let Some(name) = lookup("FORECAST_SCENARIO") {
        let name = name.trim();
        config.scenario = if name.is_empty() || name == "None" {
            None
        } else {
            Some(name.to_string())
        };
    }
    if let Some(raw) = lookup("FORECAST_MAX_CACHE_GB") {
        config.cache.max_size_gb = parse_non_negative_f64(&raw, "FORECAST_MAX_CACHE_GB")?;
    }
    if let Some(raw) = lookup("FORECAST_CACHE_EXPIRY_DAYS") {
        config.cache.expiry_days = parse_positive_i64(&raw, "FORECAST_CACHE_EXPIRY_DAYS")?;
    }
    if let Some(raw) = lookup("FORECAST_WINDOW_HOURS") {
        let hours = parse_positive_i64(&raw, "FORECAST_WINDOW_HOURS")?;
        config.window.hours = hours as usize;
        config.window.priority_hours = config.window.priority_hours.min(config.window.hours);
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<PipelineConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

pub fn load_config() -> Result<PipelineConfig, Error> {
    // 1. .env from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced by the config file when one exists.
    let config_path = std::env::var("FORECAST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = if config_path.exists() {
        tracing::debug!("Loading {}", config_path.display());
        read_config_file(&config_path)?
    } else {
        PipelineConfig::default()
    };

    // 3. Environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;
    Ok(config)
}
