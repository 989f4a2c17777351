use serde::{Deserialize, Serialize};

use super::groove::{clamp_finite, finite_or, GrooveStep};
use super::note::{ArpMode, NoteSeriesEntry};
use super::pattern::TriggerSettings;

/// Supported step resolutions, in steps per 4/4 bar.
pub const STEP_RESOLUTIONS: [u32; 10] = [1, 2, 4, 8, 12, 16, 24, 32, 48, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlayOrder {
    #[default]
    Forward,
    Backward,
    Random,
    /// Random walk: one entry up or down, wrapping.
    RandomAdjacent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    pub name: String,
    /// MIDI channel, 1..=16.
    pub channel: u8,
    /// Steps per 4/4 bar, one of `STEP_RESOLUTIONS`.
    pub step_resolution: u32,
    pub trigger: TriggerSettings,
    pub groove: Vec<GrooveStep>,
    /// Percent of the note duration odd steps are delayed by when no groove is set.
    pub swing: f64,
    pub speed_multiplier: f64,
    pub play_multiplier: u32,
    /// Percent chance that a firing step plays at all.
    pub probability: u8,
    pub conform_notes: bool,
    pub arp_mode: ArpMode,
    pub play_order: PlayOrder,
    /// Bars between forced resyncs; 0 disables.
    pub resync_interval: u32,
    pub is_active: bool,
    /// Percent, 0..=200.
    pub volume: u32,
    pub tie_note_series_to_pattern: bool,
    pub use_max_duration: bool,
    pub max_duration_factor: f64,
    pub note_series: Vec<NoteSeriesEntry>,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            channel: 1,
            step_resolution: 16,
            trigger: TriggerSettings::Init,
            groove: Vec::new(),
            swing: 0.0,
            speed_multiplier: 1.0,
            play_multiplier: 1,
            probability: 100,
            conform_notes: false,
            arp_mode: ArpMode::Off,
            play_order: PlayOrder::Forward,
            resync_interval: 0,
            is_active: true,
            volume: 100,
            tie_note_series_to_pattern: false,
            use_max_duration: false,
            max_duration_factor: 1.0,
            note_series: vec![NoteSeriesEntry::default()],
        }
    }
}

impl TrackSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn clamped(&self) -> Self {
        Self {
            name: self.name.clone(),
            channel: self.channel.clamp(1, 16),
            step_resolution: nearest_resolution(self.step_resolution),
            trigger: self.trigger.clamped(),
            groove: self.groove.iter().map(|g| g.clamped()).collect(),
            swing: clamp_finite(self.swing, 0.0, 100.0),
            speed_multiplier: clamp_finite(finite_or(self.speed_multiplier, 1.0), 0.125, 8.0),
            play_multiplier: self.play_multiplier.clamp(1, 16),
            probability: self.probability.min(100),
            conform_notes: self.conform_notes,
            arp_mode: self.arp_mode,
            play_order: self.play_order,
            resync_interval: self.resync_interval.min(64),
            is_active: self.is_active,
            volume: self.volume.min(200),
            tie_note_series_to_pattern: self.tie_note_series_to_pattern,
            use_max_duration: self.use_max_duration,
            max_duration_factor: clamp_finite(finite_or(self.max_duration_factor, 1.0), 0.1, 8.0),
            note_series: self.note_series.iter().map(|e| e.clamped()).collect(),
        }
    }

    /// Merges `patch` into a copy of these settings, clamps the result and
    /// reports which parts changed.
    pub fn apply(&self, patch: &TrackSettingsPatch) -> (TrackSettings, SettingsDiff) {
        let mut next = self.clone();
        patch.merge_into(&mut next);
        let next = next.clamped();
        let diff = SettingsDiff::between(self, &next);
        (next, diff)
    }

    /// These settings with the step grid and note series shape of `grid`:
    /// what a track plays between a deferred edit and the next bar.
    pub fn keeping_grid_of(&self, grid: &TrackSettings) -> TrackSettings {
        let note_series = if self.note_series.len() == grid.note_series.len() {
            self.note_series
                .iter()
                .zip(&grid.note_series)
                .map(|(new, old)| NoteSeriesEntry {
                    a_value: old.a_value,
                    b_value: old.b_value,
                    arp_mode: old.arp_mode,
                    play_multiplier: old.play_multiplier,
                    wonky_arp: old.wonky_arp,
                    ..new.clone()
                })
                .collect()
        } else {
            grid.note_series.clone()
        };
        TrackSettings {
            trigger: grid.trigger.clone(),
            step_resolution: grid.step_resolution,
            speed_multiplier: grid.speed_multiplier,
            play_multiplier: grid.play_multiplier,
            arp_mode: grid.arp_mode,
            play_order: grid.play_order,
            tie_note_series_to_pattern: grid.tie_note_series_to_pattern,
            note_series,
            ..self.clone()
        }
    }

    /// Steps of this track per quarter note, before the speed multiplier.
    pub fn steps_per_beat(&self) -> f64 {
        self.step_resolution.max(1) as f64 / 4.0
    }
}

fn nearest_resolution(r: u32) -> u32 {
    STEP_RESOLUTIONS
        .iter()
        .copied()
        .min_by_key(|candidate| candidate.abs_diff(r))
        .unwrap_or(16)
}

/// Partial track update: `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackSettingsPatch {
    pub name: Option<String>,
    pub channel: Option<u8>,
    pub step_resolution: Option<u32>,
    pub trigger: Option<TriggerSettings>,
    pub groove: Option<Vec<GrooveStep>>,
    pub swing: Option<f64>,
    pub speed_multiplier: Option<f64>,
    pub play_multiplier: Option<u32>,
    pub probability: Option<u8>,
    pub conform_notes: Option<bool>,
    pub arp_mode: Option<ArpMode>,
    pub play_order: Option<PlayOrder>,
    pub resync_interval: Option<u32>,
    pub is_active: Option<bool>,
    pub volume: Option<u32>,
    pub tie_note_series_to_pattern: Option<bool>,
    pub use_max_duration: Option<bool>,
    pub max_duration_factor: Option<f64>,
    pub note_series: Option<Vec<NoteSeriesEntry>>,
}

impl TrackSettingsPatch {
    fn merge_into(&self, s: &mut TrackSettings) {
        if let Some(v) = &self.name { s.name = v.clone(); }
        if let Some(v) = self.channel { s.channel = v; }
        if let Some(v) = self.step_resolution { s.step_resolution = v; }
        if let Some(v) = &self.trigger { s.trigger = v.clone(); }
        if let Some(v) = &self.groove { s.groove = v.clone(); }
        if let Some(v) = self.swing { s.swing = v; }
        if let Some(v) = self.speed_multiplier { s.speed_multiplier = v; }
        if let Some(v) = self.play_multiplier { s.play_multiplier = v; }
        if let Some(v) = self.probability { s.probability = v; }
        if let Some(v) = self.conform_notes { s.conform_notes = v; }
        if let Some(v) = self.arp_mode { s.arp_mode = v; }
        if let Some(v) = self.play_order { s.play_order = v; }
        if let Some(v) = self.resync_interval { s.resync_interval = v; }
        if let Some(v) = self.is_active { s.is_active = v; }
        if let Some(v) = self.volume { s.volume = v; }
        if let Some(v) = self.tie_note_series_to_pattern { s.tie_note_series_to_pattern = v; }
        if let Some(v) = self.use_max_duration { s.use_max_duration = v; }
        if let Some(v) = self.max_duration_factor { s.max_duration_factor = v; }
        if let Some(v) = &self.note_series { s.note_series = v.clone(); }
    }
}

impl From<&TrackSettings> for TrackSettingsPatch {
    /// A patch that sets every field, used when a whole song is reloaded.
    fn from(s: &TrackSettings) -> Self {
        Self {
            name: Some(s.name.clone()),
            channel: Some(s.channel),
            step_resolution: Some(s.step_resolution),
            trigger: Some(s.trigger.clone()),
            groove: Some(s.groove.clone()),
            swing: Some(s.swing),
            speed_multiplier: Some(s.speed_multiplier),
            play_multiplier: Some(s.play_multiplier),
            probability: Some(s.probability),
            conform_notes: Some(s.conform_notes),
            arp_mode: Some(s.arp_mode),
            play_order: Some(s.play_order),
            resync_interval: Some(s.resync_interval),
            is_active: Some(s.is_active),
            volume: Some(s.volume),
            tie_note_series_to_pattern: Some(s.tie_note_series_to_pattern),
            use_max_duration: Some(s.use_max_duration),
            max_duration_factor: Some(s.max_duration_factor),
            note_series: Some(s.note_series.clone()),
        }
    }
}

/// What a settings update touched. The scheduler defers anything that moves
/// the step grid or the pattern to the next bar boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsDiff {
    pub trigger: bool,
    /// Step resolution, speed multiplier or play multiplier.
    pub timing: bool,
    /// Note series length, play order, arp shape or the pattern tie.
    pub note_series_shape: bool,
    pub groove: bool,
    /// Anything else: velocities, pitches, channel, volume, probability.
    pub performance: bool,
}

impl SettingsDiff {
    pub fn between(old: &TrackSettings, new: &TrackSettings) -> Self {
        let shape = |s: &TrackSettings| {
            (
                s.note_series.len(),
                s.play_order,
                s.tie_note_series_to_pattern,
                s.arp_mode,
                s.note_series
                    .iter()
                    .map(|e| (e.a_value, e.b_value, e.arp_mode, e.play_multiplier, e.wonky_arp))
                    .collect::<Vec<_>>(),
            )
        };
        let trigger = old.trigger != new.trigger;
        let timing = old.step_resolution != new.step_resolution
            || old.speed_multiplier != new.speed_multiplier
            || old.play_multiplier != new.play_multiplier;
        let note_series_shape = shape(old) != shape(new);
        let groove = old.groove != new.groove || old.swing != new.swing;
        let performance = !trigger
            && !timing
            && !note_series_shape
            && !groove
            && old != new;
        Self { trigger, timing, note_series_shape, groove, performance }
    }

    pub fn needs_rebuild(&self) -> bool {
        self.trigger
    }

    pub fn needs_resync(&self) -> bool {
        self.trigger || self.timing || self.note_series_shape
    }

    pub fn is_empty(&self) -> bool {
        *self == SettingsDiff::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_given_fields() {
        let base = TrackSettings::new("Bass");
        let patch = TrackSettingsPatch { volume: Some(150), ..Default::default() };
        let (next, diff) = base.apply(&patch);
        assert_eq!(next.volume, 150);
        assert_eq!(next.name, "Bass");
        assert!(diff.performance);
        assert!(!diff.needs_resync());
    }

    #[test]
    fn patch_values_are_clamped() {
        let base = TrackSettings::default();
        let patch = TrackSettingsPatch {
            channel: Some(0),
            volume: Some(999),
            speed_multiplier: Some(f64::NAN),
            step_resolution: Some(15),
            swing: Some(-10.0),
            ..Default::default()
        };
        let (next, _) = base.apply(&patch);
        assert_eq!(next.channel, 1);
        assert_eq!(next.volume, 200);
        assert_eq!(next.speed_multiplier, 1.0);
        assert_eq!(next.step_resolution, 16);
        assert_eq!(next.swing, 0.0);
    }

    #[test]
    fn trigger_change_requests_rebuild_and_resync() {
        let base = TrackSettings::default();
        let patch = TrackSettingsPatch {
            trigger: Some(TriggerSettings::binary([8])),
            ..Default::default()
        };
        let (_, diff) = base.apply(&patch);
        assert!(diff.needs_rebuild());
        assert!(diff.needs_resync());
    }

    #[test]
    fn speed_change_requests_resync_only() {
        let base = TrackSettings::default();
        let patch = TrackSettingsPatch { speed_multiplier: Some(2.0), ..Default::default() };
        let (_, diff) = base.apply(&patch);
        assert!(!diff.needs_rebuild());
        assert!(diff.needs_resync());
    }

    #[test]
    fn root_note_edit_is_not_a_shape_change() {
        let base = TrackSettings::default();
        let mut series = base.note_series.clone();
        series[0].root_note = 40;
        let patch = TrackSettingsPatch { note_series: Some(series), ..Default::default() };
        let (next, diff) = base.apply(&patch);
        assert_eq!(next.note_series[0].root_note, 40);
        assert!(!diff.needs_resync());
        assert!(diff.performance);
    }

    #[test]
    fn identical_patch_is_empty_diff() {
        let base = TrackSettings::new("Lead");
        let (_, diff) = base.apply(&TrackSettingsPatch::from(&base));
        assert!(diff.is_empty());
    }

    #[test]
    fn keeping_grid_takes_new_performance_values() {
        let old = TrackSettings { play_multiplier: 1, ..TrackSettings::new("Arp") };
        let mut series = old.note_series.clone();
        series[0].root_note = 48;
        series[0].wonky_arp = true;
        let (new, _) = old.apply(&TrackSettingsPatch {
            play_multiplier: Some(3),
            volume: Some(80),
            note_series: Some(series),
            ..Default::default()
        });

        let playing = new.keeping_grid_of(&old);
        assert_eq!(playing.play_multiplier, 1);
        assert_eq!(playing.volume, 80);
        assert_eq!(playing.note_series[0].root_note, 48);
        assert!(!playing.note_series[0].wonky_arp);
    }

    #[test]
    fn steps_per_beat_follows_resolution() {
        let mut s = TrackSettings::default();
        assert_eq!(s.steps_per_beat(), 4.0);
        s.step_resolution = 8;
        assert_eq!(s.steps_per_beat(), 2.0);
        s.step_resolution = 12;
        assert_eq!(s.steps_per_beat(), 3.0);
    }
}
