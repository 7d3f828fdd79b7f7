//! Deterministic overrides for what-if runs and tests.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use common::config::{AreaConfig, PipelineConfig, WindScenarioConfig};
use common::{CurrentSample, Error, Result, WindSample};

/// A field defined by formula rather than by forecast data.
pub trait Scenario<S>: Send + Sync + 'static {
    fn sample(&self, time: DateTime<Utc>, lat: f64, lon: f64) -> S;
}

/// Same wind everywhere, always.
#[derive(Debug, Clone, Copy)]
pub struct ConstantWind {
    pub direction_deg: f64,
    pub speed_kts: f64,
}

impl Scenario<WindSample> for ConstantWind {
    fn sample(&self, _time: DateTime<Utc>, _lat: f64, _lon: f64) -> WindSample {
        WindSample::new(self.direction_deg, self.speed_kts)
    }
}

/// Direction swings `base ± delta·sin(2π·t/period)`, `t` measured from
/// `anchor`. Speed is constant.
#[derive(Debug, Clone, Copy)]
pub struct VariableWind {
    pub base_direction_deg: f64,
    pub speed_kts: f64,
    pub delta_deg: f64,
    pub period_secs: f64,
    pub anchor: DateTime<Utc>,
}

impl Scenario<WindSample> for VariableWind {
    fn sample(&self, time: DateTime<Utc>, _lat: f64, _lon: f64) -> WindSample {
        if self.period_secs <= 0.0 {
            return WindSample::new(self.base_direction_deg.rem_euclid(360.0), self.speed_kts);
        }
        let elapsed = (time - self.anchor).num_milliseconds() as f64 / 1000.0;
        let phase = elapsed.rem_euclid(self.period_secs) / self.period_secs;
        let direction = self.base_direction_deg + self.delta_deg * (2.0 * PI * phase).sin();
        WindSample::new(direction.rem_euclid(360.0), self.speed_kts)
    }
}

/// 30% less wind per axis in the outer band of the area (beyond 40% of the
/// area's extent from its centre).
#[derive(Debug, Clone)]
pub struct SpatialWind {
    pub direction_deg: f64,
    pub speed_kts: f64,
    pub area: AreaConfig,
}

const EDGE_BAND: f64 = 0.4;
const EDGE_FACTOR: f64 = 0.7;

impl Scenario<WindSample> for SpatialWind {
    fn sample(&self, _time: DateTime<Utc>, lat: f64, lon: f64) -> WindSample {
        let (center_lat, center_lon) = self.area.center();
        let mut factor = 1.0;
        if (lat - center_lat).abs() > self.area.height_deg() * EDGE_BAND {
            factor *= EDGE_FACTOR;
        }
        if (lon - center_lon).abs() > self.area.width_deg() * EDGE_BAND {
            factor *= EDGE_FACTOR;
        }
        WindSample::new(self.direction_deg, self.speed_kts * factor)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantCurrent(pub CurrentSample);

impl Scenario<CurrentSample> for ConstantCurrent {
    fn sample(&self, _time: DateTime<Utc>, _lat: f64, _lon: f64) -> CurrentSample {
        self.0
    }
}

/// The configured wind scenario, if one is selected. `anchor` is the time
/// oscillating scenarios count from (usually the session start).
///
/// The name "None" means no scenario; any other unknown name is a config
/// error.
pub fn wind_scenario(
    cfg: &PipelineConfig,
    anchor: DateTime<Utc>,
) -> Result<Option<Box<dyn Scenario<WindSample>>>> {
    let name = match cfg.scenario.as_deref() {
        None | Some("None") | Some("") => return Ok(None),
        Some(name) => name,
    };
    let entry = cfg
        .scenarios
        .get(name)
        .ok_or_else(|| Error::Config(format!("unknown scenario '{}'", name)))?;

    let scenario: Box<dyn Scenario<WindSample>> = match *entry {
        WindScenarioConfig::Constant {
            wind_direction,
            wind_speed,
        } => Box::new(ConstantWind {
            direction_deg: wind_direction,
            speed_kts: wind_speed,
        }),
        WindScenarioConfig::Variable {
            wind_direction,
            wind_speed,
            delta_degrees,
            period_seconds,
        } => Box::new(VariableWind {
            base_direction_deg: wind_direction,
            speed_kts: wind_speed,
            delta_deg: delta_degrees,
            period_secs: period_seconds,
            anchor,
        }),
        WindScenarioConfig::Spatial {
            wind_direction,
            wind_speed,
        } => Box::new(SpatialWind {
            direction_deg: wind_direction,
            speed_kts: wind_speed,
            area: cfg.area.clone(),
        }),
    };
    Ok(Some(scenario))
}

pub fn current_override(cfg: &PipelineConfig) -> Option<Box<dyn Scenario<CurrentSample>>> {
    cfg.current_override.as_ref().map(|o| {
        Box::new(ConstantCurrent(CurrentSample::new(o.u_ms, o.v_ms))) as Box<dyn Scenario<CurrentSample>>
    })
}
