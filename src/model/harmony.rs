use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleType {
    #[default]
    Chromatic,
    Major,
    Minor,

    // Major modes
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,

    HarmonicMinor,
    MelodicMinor,

    MajorPentatonic,
    MinorPentatonic,
    Blues,

    WholeTone,
    DiminishedHalfWhole,
    HungarianMinor,
    Hirajoshi,
}

impl ScaleType {
    const ALL: [ScaleType; 17] = [
        ScaleType::Chromatic,
        ScaleType::Major,
        ScaleType::Minor,
        ScaleType::Dorian,
        ScaleType::Phrygian,
        ScaleType::Lydian,
        ScaleType::Mixolydian,
        ScaleType::Locrian,
        ScaleType::HarmonicMinor,
        ScaleType::MelodicMinor,
        ScaleType::MajorPentatonic,
        ScaleType::MinorPentatonic,
        ScaleType::Blues,
        ScaleType::WholeTone,
        ScaleType::DiminishedHalfWhole,
        ScaleType::HungarianMinor,
        ScaleType::Hirajoshi,
    ];

    /// Lookup by numeric id; unknown ids clamp to the last scale.
    pub fn from_id(id: usize) -> ScaleType {
        Self::ALL[id.min(Self::ALL.len() - 1)]
    }

    pub fn id(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ScaleType::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            ScaleType::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleType::Minor => &[0, 2, 3, 5, 7, 8, 10],

            ScaleType::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleType::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleType::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleType::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleType::Locrian => &[0, 1, 3, 5, 6, 8, 10],

            ScaleType::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleType::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],

            ScaleType::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleType::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleType::Blues => &[0, 3, 5, 6, 7, 10],

            ScaleType::WholeTone => &[0, 2, 4, 6, 8, 10],
            ScaleType::DiminishedHalfWhole => &[0, 1, 3, 4, 6, 7, 9, 10],
            ScaleType::HungarianMinor => &[0, 2, 3, 6, 7, 8, 11],
            ScaleType::Hirajoshi => &[0, 2, 3, 7, 8],
        }
    }
}

/// Key, scale and transposition in effect at some point of the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Harmony {
    /// Pitch class of the tonic, 0 = C.
    pub key: u8,
    pub scale: ScaleType,
    pub transposition: i8,
}

impl Default for Harmony {
    fn default() -> Self {
        Self { key: 0, scale: ScaleType::Chromatic, transposition: 0 }
    }
}

/// One entry of a scale progression: `bars` bars of `key`/`scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionStep {
    pub key: u8,
    pub scale: ScaleType,
    pub bars: u32,
}

impl Default for ProgressionStep {
    fn default() -> Self {
        Self { key: 0, scale: ScaleType::Major, bars: 1 }
    }
}

impl ProgressionStep {
    pub fn clamped(self) -> Self {
        Self { key: self.key % 12, scale: self.scale, bars: self.bars.clamp(1, 256) }
    }
}

/// Harmony at `bar`, cycling through `progression`; an empty progression
/// falls back to `fallback`.
pub fn harmony_at_bar(progression: &[ProgressionStep], fallback: Harmony, bar: u64) -> Harmony {
    let total: u64 = progression.iter().map(|p| p.bars.max(1) as u64).sum();
    if total == 0 {
        return fallback;
    }
    let mut offset = bar % total;
    for step in progression {
        let bars = step.bars.max(1) as u64;
        if offset < bars {
            return Harmony { key: step.key, scale: step.scale, transposition: fallback.transposition };
        }
        offset -= bars;
    }
    fallback
}
