use crate::console;
use crate::model::track::{SettingsDiff, TrackSettings, TrackSettingsPatch};

use super::queue::ScheduledNoteEvent;
use super::scheduler::{ScheduleContext, TrackScheduler};

/// A track owns its settings value and its scheduler. Updates replace the
/// settings wholesale and hand the scheduler a diff.
#[derive(Debug, Clone)]
pub struct Track {
    id: usize,
    settings: TrackSettings,
    pub(crate) scheduler: TrackScheduler,
}

impl Track {
    pub fn new(id: usize, settings: TrackSettings, seed: u64) -> Self {
        let settings = settings.clamped();
        let scheduler = TrackScheduler::new(&settings, seed);
        Self { id, settings, scheduler }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn settings(&self) -> &TrackSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &TrackScheduler {
        &self.scheduler
    }

    pub(crate) fn schedule(&mut self, ctx: &ScheduleContext<'_>, lookahead_end: f64) -> Vec<ScheduledNoteEvent> {
        self.scheduler.schedule_events(&self.settings, ctx, lookahead_end)
    }

    /// Merges `patch`, clamps every field and flags the scheduler.
    pub fn update_settings(&mut self, patch: &TrackSettingsPatch) -> SettingsDiff {
        let (next, diff) = self.settings.apply(patch);
        if clamped_away(patch, &next) {
            console::info(format!("{}: settings clamped to valid ranges", next.name));
        }
        self.scheduler.on_settings_changed(&diff, &next);
        self.settings = next;
        diff
    }
}

fn clamped_away(patch: &TrackSettingsPatch, applied: &TrackSettings) -> bool {
    let differs = |given: Option<f64>, got: f64| given.is_some_and(|v| v != got);
    patch.channel.is_some_and(|v| v != applied.channel)
        || patch.step_resolution.is_some_and(|v| v != applied.step_resolution)
        || patch.play_multiplier.is_some_and(|v| v != applied.play_multiplier)
        || patch.probability.is_some_and(|v| v != applied.probability)
        || patch.volume.is_some_and(|v| v != applied.volume)
        || patch.resync_interval.is_some_and(|v| v != applied.resync_interval)
        || differs(patch.swing, applied.swing)
        || differs(patch.speed_multiplier, applied.speed_multiplier)
        || differs(patch.max_duration_factor, applied.max_duration_factor)
        || patch.trigger.as_ref().is_some_and(|t| *t != applied.trigger)
        || patch.groove.as_ref().is_some_and(|g| *g != applied.groove)
        || patch.note_series.as_ref().is_some_and(|s| *s != applied.note_series)
}
