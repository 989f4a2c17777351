use fastrand::Rng;

use crate::model::groove::GrooveStep;
use crate::model::note::NoteSeriesEntry;
use crate::model::track::TrackSettings;

use super::timing::swing_percent;

/// Timing and velocity of one note after groove, swing and volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroovedNote {
    pub time_ms: f64,
    /// 0 means the note is inaudible and should not be sent.
    pub velocity: u8,
    pub duration_ms: f64,
}

/// Where a note sits before groove is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSlot {
    pub time_ms: f64,
    pub duration_ms: f64,
    /// Length of the grid step the note starts on; swing is a share of it.
    pub grid_ms: f64,
    pub global_step: u64,
}

/// Per-track groove table with swing as fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrooveEngine {
    steps: Vec<GrooveStep>,
    swing: f64,
}

impl GrooveEngine {
    pub fn new(steps: Vec<GrooveStep>, swing: f64) -> Self {
        Self { steps, swing }
    }

    pub fn from_settings(settings: &TrackSettings) -> Self {
        Self::new(settings.groove.clone(), settings.swing)
    }

    /// Largest share of a note's length, in percent, that any groove slot
    /// moves it earlier by.
    pub fn max_rush_pct(&self) -> f64 {
        self.steps.iter().map(|s| -s.time_offset).fold(0.0, f64::max)
    }

    /// Time shift for a slot: groove slots move by a share of the note,
    /// swing by a share of the grid step.
    fn offset_ms(&self, slot: &NoteSlot) -> f64 {
        match self.slot(slot.global_step) {
            Some(step) => slot.duration_ms * step.time_offset / 100.0,
            None => slot.grid_ms * swing_percent(self.swing, slot.global_step) / 100.0,
        }
    }

    fn velocity_offset_pct(&self, global_step: u64) -> f64 {
        self.slot(global_step).map(|s| s.velocity_offset).unwrap_or(0.0)
    }

    fn slot(&self, global_step: u64) -> Option<&GrooveStep> {
        if self.steps.is_empty() {
            return None;
        }
        self.steps.get((global_step % self.steps.len() as u64) as usize)
    }

    /// Shifts the start and shortens the note by the same amount. Velocity
    /// is re-randomized within the entry's span, scaled by the groove slot,
    /// then by the track volume.
    pub fn apply(&self, slot: NoteSlot, entry: &NoteSeriesEntry, volume: u32, rng: &mut Rng) -> GroovedNote {
        let offset = self.offset_ms(&slot);

        let span = entry.velocity_span as u32;
        let base = entry.velocity as u32 + if span > 0 { rng.u32(0..=span) } else { 0 };
        let grooved = (base as f64 * (1.0 + self.velocity_offset_pct(slot.global_step) / 100.0))
            .round()
            .clamp(1.0, 127.0);
        let velocity = (grooved * volume as f64 / 100.0).round().clamp(0.0, 127.0) as u8;

        GroovedNote {
            time_ms: slot.time_ms + offset,
            velocity,
            duration_ms: (slot.duration_ms - offset.abs()).max(0.0),
        }
    }
}
