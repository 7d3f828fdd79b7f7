//! Pipeline configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// On-disk forecast cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Sliding forecast window shared by both field types.
    #[serde(default)]
    pub window: WindowConfig,

    /// Network retry policy for upstream downloads.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Regular-grid wind model (HRRR).
    #[serde(default)]
    pub wind: WindSourceConfig,

    /// Unstructured-mesh current model (SFBOFS).
    #[serde(default)]
    pub current: CurrentSourceConfig,

    /// Never touch the network; only cached hours load.
    #[serde(default)]
    pub offline: bool,

    /// Values returned when neither a scenario nor forecast data applies.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Simulated area, used by spatially varying scenarios.
    #[serde(default)]
    pub area: AreaConfig,

    /// Active wind scenario, by name (must exist in `scenarios`).
    #[serde(default)]
    pub scenario: Option<String>,

    /// Named wind scenarios.
    #[serde(default = "default_scenarios")]
    pub scenarios: BTreeMap<String, WindScenarioConfig>,

    /// Fixed current replacing forecast data when set.
    #[serde(default)]
    pub current_override: Option<CurrentOverrideConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: f64,
}

impl CacheConfig {
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of hourly slots held in memory.
    #[serde(default = "default_window_hours")]
    pub hours: usize,
    /// Slots queued immediately on initialize.
    #[serde(default = "default_priority_hours")]
    pub priority_hours: usize,
    /// Slide the window once less than this remains before the last slot.
    #[serde(default = "default_preload_margin_hours")]
    pub preload_margin_hours: f64,
    /// Pause between load attempts.
    #[serde(default = "default_load_throttle_secs")]
    pub load_throttle_secs: f64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindSourceConfig {
    #[serde(default = "default_wind_base_url")]
    pub base_url: String,
    #[serde(default = "default_wind_url_template")]
    pub url_template: String,
    /// Hourly model cycles searched backward from now.
    #[serde(default = "default_max_cycles_back")]
    pub max_cycles_back: u32,
    #[serde(default = "default_max_forecast_hour")]
    pub max_forecast_hour: i64,
    /// U/V are relative to the grid axes and are rotated to true east/north
    /// on decode. True for HRRR (resolution flags bit 5).
    #[serde(default = "default_grid_relative_winds")]
    pub grid_relative_winds: bool,
    #[serde(default)]
    pub projection: LambertConfig,
}

/// Lambert conformal conic grid definition (spherical earth).
///
/// Defaults describe the HRRR CONUS 3 km grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambertConfig {
    #[serde(default = "default_lambert_latin")]
    pub latin1: f64,
    #[serde(default = "default_lambert_latin")]
    pub latin2: f64,
    /// Orientation longitude (LoV), degrees east.
    #[serde(default = "default_lambert_lov")]
    pub lov: f64,
    /// Latitude/longitude of grid point (0, 0).
    #[serde(default = "default_lambert_la1")]
    pub la1: f64,
    #[serde(default = "default_lambert_lo1")]
    pub lo1: f64,
    /// Grid spacing in meters.
    #[serde(default = "default_lambert_dx")]
    pub dx: f64,
    #[serde(default = "default_lambert_dx")]
    pub dy: f64,
    #[serde(default = "default_earth_radius")]
    pub earth_radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSourceConfig {
    #[serde(default = "default_current_base_url")]
    pub base_url: String,
    #[serde(default = "default_current_url_template")]
    pub url_template: String,
    /// Model issue hours (UTC).
    #[serde(default = "default_model_cycles")]
    pub model_cycles: Vec<u32>,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default = "default_max_forecast_hour")]
    pub max_forecast_hour: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_direction")]
    pub wind_direction_deg: f64,
    #[serde(default = "default_fallback_speed")]
    pub wind_speed_kts: f64,
    #[serde(default)]
    pub current_u_ms: f64,
    #[serde(default)]
    pub current_v_ms: f64,
}

/// Bounding box of the simulated area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaConfig {
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
}

impl AreaConfig {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

/// Deterministic wind override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindScenarioConfig {
    Constant {
        wind_direction: f64,
        wind_speed: f64,
    },
    /// Direction oscillates `± delta_degrees` over `period_seconds`.
    Variable {
        wind_direction: f64,
        wind_speed: f64,
        delta_degrees: f64,
        period_seconds: f64,
    },
    /// Lighter wind near the edges of the simulated area.
    Spatial {
        #[serde(default = "default_spatial_direction")]
        wind_direction: f64,
        #[serde(default = "default_spatial_speed")]
        wind_speed: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentOverrideConfig {
    pub u_ms: f64,
    pub v_ms: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}
fn default_expiry_days() -> i64 {
    7
}
fn default_max_size_gb() -> f64 {
    5.0
}
fn default_window_hours() -> usize {
    6
}
fn default_priority_hours() -> usize {
    2
}
fn default_preload_margin_hours() -> f64 {
    0.5
}
fn default_load_throttle_secs() -> f64 {
    3.0
}
fn default_idle_poll_ms() -> u64 {
    500
}
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> f64 {
    5.0
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_wind_base_url() -> String {
    "https://noaa-hrrr-bdp-pds.s3.amazonaws.com".into()
}
fn default_wind_url_template() -> String {
    "{base}/hrrr.{date}/conus/hrrr.t{cycle}z.wrfsfcf{fh2}.grib2".into()
}
fn default_max_cycles_back() -> u32 {
    72
}
fn default_max_forecast_hour() -> i64 {
    48
}
fn default_grid_relative_winds() -> bool {
    true
}
fn default_lambert_latin() -> f64 {
    38.5
}
fn default_lambert_lov() -> f64 {
    262.5
}
fn default_lambert_la1() -> f64 {
    21.138123
}
fn default_lambert_lo1() -> f64 {
    237.280472
}
fn default_lambert_dx() -> f64 {
    3000.0
}
fn default_earth_radius() -> f64 {
    6_371_229.0
}
fn default_current_base_url() -> String {
    "https://noaa-nos-ofs-pds.s3.amazonaws.com".into()
}
fn default_current_url_template() -> String {
    "{base}/sfbofs/netcdf/{year}/{month}/{day}/sfbofs.t{cycle}z.{date}.fields.f{fh3}.nc".into()
}
fn default_model_cycles() -> Vec<u32> {
    vec![3, 9, 15, 21]
}
fn default_days_back() -> u32 {
    3
}
fn default_fallback_direction() -> f64 {
    315.0
}
fn default_fallback_speed() -> f64 {
    10.0
}
fn default_min_lat() -> f64 {
    37.40
}
fn default_max_lat() -> f64 {
    38.20
}
fn default_min_lon() -> f64 {
    -122.60
}
fn default_max_lon() -> f64 {
    -122.00
}
fn default_spatial_direction() -> f64 {
    315.0
}
fn default_spatial_speed() -> f64 {
    15.0
}

fn default_scenarios() -> BTreeMap<String, WindScenarioConfig> {
    let mut m = BTreeMap::new();
    m.insert(
        "Light Wind".into(),
        WindScenarioConfig::Constant {
            wind_direction: 270.0,
            wind_speed: 5.0,
        },
    );
    m.insert(
        "Moderate Wind".into(),
        WindScenarioConfig::Constant {
            wind_direction: 315.0,
            wind_speed: 12.0,
        },
    );
    m.insert(
        "Heavy Wind".into(),
        WindScenarioConfig::Constant {
            wind_direction: 315.0,
            wind_speed: 25.0,
        },
    );
    m.insert(
        "Variable Wind".into(),
        WindScenarioConfig::Variable {
            wind_direction: 315.0,
            wind_speed: 15.0,
            delta_degrees: 20.0,
            period_seconds: 300.0,
        },
    );
    m.insert(
        "Spatial Wind".into(),
        WindScenarioConfig::Spatial {
            wind_direction: default_spatial_direction(),
            wind_speed: default_spatial_speed(),
        },
    );
    m
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            window: WindowConfig::default(),
            retry: RetryConfig::default(),
            wind: WindSourceConfig::default(),
            current: CurrentSourceConfig::default(),
            offline: false,
            fallback: FallbackConfig::default(),
            area: AreaConfig::default(),
            scenario: None,
            scenarios: default_scenarios(),
            current_override: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            expiry_days: default_expiry_days(),
            max_size_gb: default_max_size_gb(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            hours: default_window_hours(),
            priority_hours: default_priority_hours(),
            preload_margin_hours: default_preload_margin_hours(),
            load_throttle_secs: default_load_throttle_secs(),
            idle_poll_ms: default_idle_poll_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for WindSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_wind_base_url(),
            url_template: default_wind_url_template(),
            max_cycles_back: default_max_cycles_back(),
            max_forecast_hour: default_max_forecast_hour(),
            grid_relative_winds: default_grid_relative_winds(),
            projection: LambertConfig::default(),
        }
    }
}

impl Default for LambertConfig {
    fn default() -> Self {
        Self {
            latin1: default_lambert_latin(),
            latin2: default_lambert_latin(),
            lov: default_lambert_lov(),
            la1: default_lambert_la1(),
            lo1: default_lambert_lo1(),
            dx: default_lambert_dx(),
            dy: default_lambert_dx(),
            earth_radius: default_earth_radius(),
        }
    }
}

impl Default for CurrentSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_current_base_url(),
            url_template: default_current_url_template(),
            model_cycles: default_model_cycles(),
            days_back: default_days_back(),
            max_forecast_hour: default_max_forecast_hour(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            wind_direction_deg: default_fallback_direction(),
            wind_speed_kts: default_fallback_speed(),
            current_u_ms: 0.0,
            current_v_ms: 0.0,
        }
    }
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            min_lat: default_min_lat(),
            max_lat: default_max_lat(),
            min_lon: default_min_lon(),
            max_lon: default_max_lon(),
        }
    }
}
