//! Sliding window of hourly forecast slots with one background loader.
//!
//! The manager is generic over a [`ForecastLoader`]; wind and current each
//! get their own instance. Queries bracket the requested time between the
//! nearest Ready slots and blend the two samples.

pub mod field;
pub mod manager;
pub mod slot;

pub use field::{ForecastField, ForecastLoader};
pub use manager::{ForecastWindowManager, LoadProgress, WindowSettings};
pub use slot::{SlotInfo, SlotStatus};
