use serde::{Deserialize, Serialize};

/// One slot of a groove table: timing and velocity nudges as percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GrooveStep {
    /// Percent of the note duration to shift the start by, -100..100.
    pub time_offset: f64,
    /// Percent to scale the velocity by, -100..100.
    pub velocity_offset: f64,
}

impl GrooveStep {
    pub fn new(time_offset: f64, velocity_offset: f64) -> Self {
        Self { time_offset, velocity_offset }.clamped()
    }

    pub fn clamped(self) -> Self {
        Self {
            time_offset: clamp_finite(self.time_offset, -100.0, 100.0),
            velocity_offset: clamp_finite(self.velocity_offset, -100.0, 100.0),
        }
    }
}

pub(crate) fn clamp_finite(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_finite() { v.clamp(lo, hi) } else { 0.0f64.clamp(lo, hi) }
}

pub(crate) fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}
