//! Query facades the simulation talks to.
//!
//! Each provider answers every query: scenario override first, then the
//! forecast window, then a static default. Nothing here returns an error to
//! the caller at query time.

pub mod provider;
pub mod scenario;

pub use provider::{current_provider, weather_provider, CurrentProvider, FieldProvider, WeatherProvider};
pub use scenario::{
    current_override, wind_scenario, ConstantCurrent, ConstantWind, Scenario, SpatialWind, VariableWind,
};
