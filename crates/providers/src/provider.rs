//! Fallback chain: scenario override, then forecast window, then default.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::config::PipelineConfig;
use common::{CurrentSample, GeoPoint, Result, WindSample};
use current_mesh::UnstructuredMeshSource;
use forecast_cache::CacheManager;
use forecast_window::{ForecastField, ForecastLoader, ForecastWindowManager, LoadProgress, WindowSettings};
use noaa_client::{NoaaClient, Transport};
use tracing::info;
use wind_grid::RegularGridSource;

use crate::scenario::{current_override, wind_scenario, Scenario};

type SampleOf<L> = <<L as ForecastLoader>::Field as ForecastField>::Sample;

/// Answers every query for one field type.
pub struct FieldProvider<L: ForecastLoader> {
    window: ForecastWindowManager<L>,
    scenario: Option<Box<dyn Scenario<SampleOf<L>>>>,
    fallback: SampleOf<L>,
}

pub type WeatherProvider<T = NoaaClient> = FieldProvider<RegularGridSource<T>>;
pub type CurrentProvider<T = NoaaClient> = FieldProvider<UnstructuredMeshSource<T>>;

impl<L: ForecastLoader> FieldProvider<L> {
    pub fn new(window: ForecastWindowManager<L>, fallback: SampleOf<L>) -> Self {
        Self {
            window,
            scenario: None,
            fallback,
        }
    }

    pub fn with_scenario(mut self, scenario: Option<Box<dyn Scenario<SampleOf<L>>>>) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn has_scenario(&self) -> bool {
        self.scenario.is_some()
    }

    pub fn window(&self) -> &ForecastWindowManager<L> {
        &self.window
    }

    pub fn fallback(&self) -> &SampleOf<L> {
        &self.fallback
    }

    /// Start loading forecast hours from `start_time`. The window loads even
    /// under a scenario so that clearing the override has data behind it.
    pub fn initialize(&self, start_time: DateTime<Utc>) {
        self.window.initialize(start_time);
    }

    pub fn get(&self, time: DateTime<Utc>, lat: f64, lon: f64) -> SampleOf<L> {
        if let Some(scenario) = &self.scenario {
            return scenario.sample(time, lat, lon);
        }
        self.window
            .get_value(time, lat, lon)
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn get_batch(&self, time: DateTime<Utc>, points: &[GeoPoint]) -> Vec<SampleOf<L>> {
        if let Some(scenario) = &self.scenario {
            return points.iter().map(|p| scenario.sample(time, p.lat, p.lon)).collect();
        }
        self.window
            .get_value_batch(time, points)
            .unwrap_or_else(|| vec![self.fallback.clone(); points.len()])
    }

    /// Once per simulation tick.
    pub fn update(&self, sim_time: DateTime<Utc>) {
        self.window.update_window(sim_time);
    }

    pub fn load_progress(&self) -> LoadProgress {
        self.window.get_load_progress()
    }

    pub async fn stop(&self) {
        self.window.stop().await;
    }
}

/// Wind provider wired from config: HRRR loader, configured scenario, and
/// fallback wind.
pub fn weather_provider<T: Transport>(
    cfg: &PipelineConfig,
    cache: Arc<CacheManager>,
    transport: Arc<T>,
    start_time: DateTime<Utc>,
) -> Result<WeatherProvider<T>> {
    let scenario = wind_scenario(cfg, start_time)?;
    if let Some(name) = cfg.scenario.as_deref().filter(|_| scenario.is_some()) {
        info!("Wind scenario override active: {}", name);
    }
    let loader = RegularGridSource::from_config(cfg, cache, transport);
    let window = ForecastWindowManager::new("wind", loader, WindowSettings::from_config(&cfg.window));
    let fallback = WindSample::new(cfg.fallback.wind_direction_deg, cfg.fallback.wind_speed_kts);
    Ok(FieldProvider::new(window, fallback).with_scenario(scenario))
}

/// Current provider wired from config: SFBOFS loader, optional constant
/// override, and fallback current.
pub fn current_provider<T: Transport>(
    cfg: &PipelineConfig,
    cache: Arc<CacheManager>,
    transport: Arc<T>,
) -> CurrentProvider<T> {
    let scenario = current_override(cfg);
    if scenario.is_some() {
        info!("Current override active");
    }
    let loader = UnstructuredMeshSource::from_config(cfg, cache, transport);
    let window = ForecastWindowManager::new("current", loader, WindowSettings::from_config(&cfg.window));
    let fallback = CurrentSample::new(cfg.fallback.current_u_ms, cfg.fallback.current_v_ms);
    FieldProvider::new(window, fallback).with_scenario(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ConstantWind;
    use chrono::TimeZone;
    use common::Blend;
    use noaa_client::FetchError;
    use std::path::Path;
    use std::time::Duration;

    /// Uniform wind whose speed encodes the hour it is valid for.
    struct HourField {
        valid: DateTime<Utc>,
    }

    impl ForecastField for HourField {
        type Sample = WindSample;
        type Shared = ();

        fn valid_time(&self) -> DateTime<Utc> {
            self.valid
        }

        fn sample(&self, _lat: f64, _lon: f64) -> WindSample {
            WindSample::new(90.0, self.valid.format("%H").to_string().parse().unwrap_or(0.0))
        }
    }

    struct HourLoader;

    impl ForecastLoader for HourLoader {
        type Field = HourField;

        async fn load(&self, target: DateTime<Utc>, _shared: Option<()>) -> Result<HourField> {
            Ok(HourField { valid: target })
        }
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 30, h, m, 0).unwrap()
    }

    fn settings(hours: usize) -> WindowSettings {
        WindowSettings {
            hours,
            priority_hours: hours,
            preload_margin: chrono::Duration::minutes(30),
            load_throttle: Duration::from_millis(1),
            idle_poll: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(2),
        }
    }

    fn fallback() -> WindSample {
        WindSample::new(315.0, 10.0)
    }

    async fn wait_loaded<L: ForecastLoader>(p: &FieldProvider<L>, n: usize) {
        for _ in 0..400 {
            if p.load_progress().loaded >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("only {} hours loaded", p.load_progress().loaded);
    }

    #[tokio::test]
    async fn test_default_before_any_hour_is_ready() {
        let p = FieldProvider::new(ForecastWindowManager::new("wind", HourLoader, settings(2)), fallback());
        assert_eq!(p.get(t(12, 0), 37.8, -122.4), fallback());
        assert_eq!(p.get_batch(t(12, 0), &[GeoPoint::new(37.8, -122.4); 3]), vec![fallback(); 3]);
        assert_eq!(p.load_progress().total, 0);
    }

    #[tokio::test]
    async fn test_window_value_once_loaded() {
        let p = FieldProvider::new(ForecastWindowManager::new("wind", HourLoader, settings(3)), fallback());
        p.initialize(t(12, 0));
        wait_loaded(&p, 3).await;

        assert_eq!(p.get(t(13, 0), 37.8, -122.4), WindSample::new(90.0, 13.0));
        let mid = p.get(t(13, 30), 37.8, -122.4);
        assert_eq!(mid, WindSample::new(90.0, 13.0).blend(&WindSample::new(90.0, 14.0), 0.5));

        let pts = [GeoPoint::new(37.8, -122.4), GeoPoint::new(37.7, -122.3)];
        assert_eq!(p.get_batch(t(13, 30), &pts), vec![mid; 2]);
        p.stop().await;
    }

    #[tokio::test]
    async fn test_scenario_takes_priority() {
        let scenario = ConstantWind {
            direction_deg: 180.0,
            speed_kts: 7.0,
        };
        let p = FieldProvider::new(ForecastWindowManager::new("wind", HourLoader, settings(2)), fallback())
            .with_scenario(Some(Box::new(scenario) as Box<dyn Scenario<WindSample>>));
        p.initialize(t(12, 0));
        wait_loaded(&p, 2).await;

        assert!(p.has_scenario());
        assert_eq!(p.get(t(12, 0), 0.0, 0.0), WindSample::new(180.0, 7.0));
        assert_eq!(p.get_batch(t(12, 0), &[GeoPoint::new(0.0, 0.0)]), vec![WindSample::new(180.0, 7.0)]);
        p.stop().await;
    }

    #[tokio::test]
    async fn test_update_slides_window() {
        let p = FieldProvider::new(ForecastWindowManager::new("wind", HourLoader, settings(2)), fallback());
        p.initialize(t(12, 0));
        p.update(t(12, 10));
        assert_eq!(p.window().slots()[0].valid_time, t(12, 0));
        p.update(t(12, 45));
        assert_eq!(p.window().slots()[0].valid_time, t(13, 0));
        assert_eq!(p.load_progress().total, 2);
        p.stop().await;
        assert!(!p.window().is_running());
    }

    struct NoNetwork;

    impl Transport for NoNetwork {
        async fn download(&self, url: &str, _dest: &Path) -> std::result::Result<u64, FetchError> {
            Err(FetchError::NotFound(url.to_string()))
        }
    }

    #[tokio::test]
    async fn test_config_wiring() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheManager::open(tmp.path()).unwrap());
        let mut cfg = PipelineConfig::default();
        cfg.scenario = Some("Light Wind".into());
        cfg.fallback.current_u_ms = 0.3;

        let wind = weather_provider(&cfg, Arc::clone(&cache), Arc::new(NoNetwork), t(12, 0)).unwrap();
        assert_eq!(wind.get(t(12, 0), 37.8, -122.4), WindSample::new(270.0, 5.0));

        let current = current_provider(&cfg, cache, Arc::new(NoNetwork));
        assert!(!current.has_scenario());
        assert_eq!(current.get(t(12, 0), 37.8, -122.4), CurrentSample::new(0.3, 0.0));
        assert_eq!(current.window().name(), "current");
    }
}
