//! Slot state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// `Empty -> Loading -> Ready`. A failed load returns the slot to Empty;
/// only a window slide removes a Ready slot.
#[derive(Debug)]
pub(crate) enum SlotState<F> {
    Empty,
    Loading,
    Ready(Arc<F>),
}

#[derive(Debug)]
pub(crate) struct Slot<F> {
    pub hour_index: u64,
    pub valid_time: DateTime<Utc>,
    pub state: SlotState<F>,
    /// Set once the worker has picked the slot up; never cleared.
    pub attempted: bool,
}

impl<F> Slot<F> {
    pub fn empty(hour_index: u64, valid_time: DateTime<Utc>) -> Self {
        Self {
            hour_index,
            valid_time,
            state: SlotState::Empty,
            attempted: false,
        }
    }

    pub fn ready(&self) -> Option<&Arc<F>> {
        match &self.state {
            SlotState::Ready(field) => Some(field),
            _ => None,
        }
    }

    pub fn is_loadable(&self) -> bool {
        matches!(self.state, SlotState::Empty) && !self.attempted
    }

    pub fn info(&self) -> SlotInfo {
        SlotInfo {
            hour_index: self.hour_index,
            valid_time: self.valid_time,
            status: match self.state {
                SlotState::Empty => SlotStatus::Empty,
                SlotState::Loading => SlotStatus::Loading,
                SlotState::Ready(_) => SlotStatus::Ready,
            },
            attempted: self.attempted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    Empty,
    Loading,
    Ready,
}

/// Read-only snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub hour_index: u64,
    pub valid_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub attempted: bool,
}
