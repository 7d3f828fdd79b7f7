//! Decoded mesh payload.

use chrono::{DateTime, Utc};
use common::{Error, Result};

/// Element-centre coordinates (lon in 0..360) and surface-layer velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPayload {
    pub lonc: Vec<f64>,
    pub latc: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    /// From the file when it records one.
    pub valid_time: Option<DateTime<Utc>>,
}

impl MeshPayload {
    pub fn len(&self) -> usize {
        self.lonc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lonc.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if n < 3 {
            return Err(Error::Decode(format!("mesh has {} elements; need at least 3", n)));
        }
        for (name, len) in [("latc", self.latc.len()), ("u", self.u.len()), ("v", self.v.len())] {
            if len != n {
                return Err(Error::Decode(format!(
                    "{} has {} values, expected {}",
                    name, len, n
                )));
            }
        }
        Ok(())
    }
}
