use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArpMode {
    #[default]
    Off,
    Up,
    Down,
    UpDownInclusive,
    UpDownExclusive,
    DownUpInclusive,
    DownUpExclusive,
    /// Chord pitches in the order the chord engine produced them.
    Order,
    Random,
    /// All pitches together on each sub-step.
    Chord,
    OutsideIn,
    InsideOut,
    Converge,
    Diverge,
    Thumb,
    Pinky,
}

impl ArpMode {
    pub fn is_off(&self) -> bool {
        matches!(self, ArpMode::Off)
    }
}

/// One entry of a track's note series: a chord recipe plus performance
/// settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteSeriesEntry {
    pub root_note: u8,
    pub number_of_notes: u8,
    pub inversion: i8,
    pub velocity: u8,
    pub velocity_span: u8,
    pub pitch_span: i8,
    pub spread: i8,
    /// Per-pitch chance to sound, percent.
    pub probability: u8,
    /// Sounds on the `a_value`-th of every `b_value` cycles.
    pub a_value: u32,
    pub b_value: u32,
    pub arp_mode: ArpMode,
    pub play_multiplier: u32,
    pub wonky_arp: bool,
}

impl Default for NoteSeriesEntry {
    fn default() -> Self {
        Self {
            root_note: 60,
            number_of_notes: 1,
            inversion: 0,
            velocity: 100,
            velocity_span: 0,
            pitch_span: 0,
            spread: 0,
            probability: 100,
            a_value: 1,
            b_value: 1,
            arp_mode: ArpMode::Off,
            play_multiplier: 1,
            wonky_arp: false,
        }
    }
}

impl NoteSeriesEntry {
    pub fn note(root_note: u8, velocity: u8) -> Self {
        Self { root_note, velocity, ..Self::default() }.clamped()
    }

    pub fn clamped(&self) -> Self {
        let b_value = self.b_value.clamp(1, 16);
        Self {
            root_note: self.root_note.min(127),
            number_of_notes: self.number_of_notes.clamp(1, 8),
            inversion: self.inversion.clamp(-5, 5),
            velocity: self.velocity.clamp(1, 127),
            velocity_span: self.velocity_span.min(126),
            pitch_span: self.pitch_span.clamp(-24, 24),
            spread: self.spread.clamp(-9, 9),
            probability: self.probability.min(100),
            a_value: self.a_value.clamp(1, b_value),
            b_value,
            arp_mode: self.arp_mode,
            play_multiplier: self.play_multiplier.clamp(1, 16),
            wonky_arp: self.wonky_arp,
        }
    }
}
