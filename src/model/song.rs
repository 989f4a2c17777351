use std::fmt;

use serde::{Deserialize, Serialize};

use super::groove::{clamp_finite, finite_or};
use super::harmony::{Harmony, ProgressionStep, ScaleType};
use super::track::TrackSettings;

/// Time signature (numerator/denominator). Tempo always counts quarter
/// notes, so a bar lasts `numerator * 4 / denominator` beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self { numerator, denominator }.clamped()
    }

    pub fn four_four() -> Self {
        Self { numerator: 4, denominator: 4 }
    }

    pub fn clamped(self) -> Self {
        let denominator = match self.denominator {
            0 | 1 => 1,
            2 | 3 => 2,
            4..=5 => 4,
            6..=11 => 8,
            _ => 16,
        };
        Self { numerator: self.numerator.clamp(1, 16), denominator }
    }

    /// Quarter-note beats per bar.
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator.max(1) as f64 * 4.0 / self.denominator.max(1) as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Global sequencer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub key: u8,
    pub scale: ScaleType,
    pub transposition: i8,
    pub progression: Vec<ProgressionStep>,
    /// How far ahead of the playhead tracks are scheduled.
    pub lookahead_ms: f64,
    /// Events further than this behind the playhead are dropped.
    pub late_tolerance_ms: f64,
    /// Forward MIDI clock pulses to the sink.
    pub send_clock: bool,
    /// Seed for every track's random source.
    pub seed: u64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            time_signature: TimeSignature::four_four(),
            key: 0,
            scale: ScaleType::Major,
            transposition: 0,
            progression: Vec::new(),
            lookahead_ms: 100.0,
            late_tolerance_ms: 10.0,
            send_clock: false,
            seed: 0x5eed,
        }
    }
}

impl SequencerSettings {
    pub fn clamped(&self) -> Self {
        Self {
            bpm: clamp_finite(finite_or(self.bpm, 120.0), 20.0, 300.0),
            time_signature: self.time_signature.clamped(),
            key: self.key % 12,
            scale: self.scale,
            transposition: self.transposition.clamp(-24, 24),
            progression: self.progression.iter().map(|p| p.clamped()).collect(),
            lookahead_ms: clamp_finite(self.lookahead_ms, 10.0, 1000.0),
            late_tolerance_ms: clamp_finite(self.late_tolerance_ms, 0.0, 100.0),
            send_clock: self.send_clock,
            seed: self.seed,
        }
    }

    pub fn harmony(&self) -> Harmony {
        Harmony { key: self.key, scale: self.scale, transposition: self.transposition }
    }

    pub fn apply(&self, patch: &SequencerSettingsPatch) -> SequencerSettings {
        let mut next = self.clone();
        if let Some(v) = patch.bpm { next.bpm = v; }
        if let Some(v) = patch.time_signature { next.time_signature = v; }
        if let Some(v) = patch.key { next.key = v; }
        if let Some(v) = patch.scale { next.scale = v; }
        if let Some(v) = patch.transposition { next.transposition = v; }
        if let Some(v) = &patch.progression { next.progression = v.clone(); }
        if let Some(v) = patch.lookahead_ms { next.lookahead_ms = v; }
        if let Some(v) = patch.late_tolerance_ms { next.late_tolerance_ms = v; }
        if let Some(v) = patch.send_clock { next.send_clock = v; }
        if let Some(v) = patch.seed { next.seed = v; }
        next.clamped()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SequencerSettingsPatch {
    pub bpm: Option<f64>,
    pub time_signature: Option<TimeSignature>,
    pub key: Option<u8>,
    pub scale: Option<ScaleType>,
    pub transposition: Option<i8>,
    pub progression: Option<Vec<ProgressionStep>>,
    pub lookahead_ms: Option<f64>,
    pub late_tolerance_ms: Option<f64>,
    pub send_clock: Option<bool>,
    pub seed: Option<u64>,
}

impl From<&SequencerSettings> for SequencerSettingsPatch {
    fn from(s: &SequencerSettings) -> Self {
        Self {
            bpm: Some(s.bpm),
            time_signature: Some(s.time_signature),
            key: Some(s.key),
            scale: Some(s.scale),
            transposition: Some(s.transposition),
            progression: Some(s.progression.clone()),
            lookahead_ms: Some(s.lookahead_ms),
            late_tolerance_ms: Some(s.late_tolerance_ms),
            send_clock: Some(s.send_clock),
            // a reloaded seed would only take effect for new tracks
            seed: None,
        }
    }
}

/// Everything needed to set up a sequencer: global settings plus tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Song {
    #[serde(flatten)]
    pub settings: SequencerSettings,
    pub tracks: Vec<TrackSettings>,
}

impl Song {
    pub fn clamped(&self) -> Song {
        Song {
            settings: self.settings.clamped(),
            tracks: self.tracks.iter().map(|t| t.clamped()).collect(),
        }
    }

    pub fn list(&self) -> String {
        if self.tracks.is_empty() {
            return "[no tracks]".to_string();
        }
        let mut out = String::new();
        for (i, t) in self.tracks.iter().enumerate() {
            out.push_str(&format!(
                "{:>2} {}  ch{} {} steps/bar x{} {}\n",
                i + 1,
                t.name,
                t.channel,
                t.step_resolution,
                t.speed_multiplier,
                if t.is_active { "on" } else { "off" },
            ));
        }
        out
    }
}
