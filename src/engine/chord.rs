use crate::model::harmony::{Harmony, ScaleType};

/// Chord recipe handed to a `ChordEngine`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordOptions {
    pub number_of_notes: u8,
    pub inversion: i8,
    pub spread: i8,
    /// Stack in this scale; `None` stacks chromatically.
    pub scale: Option<(u8, ScaleType)>,
}

/// Chord lookup and scale conforming, treated by the engine as pure
/// functions.
pub trait ChordEngine {
    /// Chord pitches for `root`, in voicing order.
    fn generate_chord(&self, root: u8, options: &ChordOptions) -> Vec<u8>;

    /// `pitch` transposed, then moved to the nearest note of `scale` in
    /// `key`.
    fn conform_pitch(&self, pitch: u8, key: u8, scale: ScaleType, transposition: i8) -> u8;

    fn conform_to(&self, pitch: u8, harmony: &Harmony) -> u8 {
        self.conform_pitch(pitch, harmony.key, harmony.scale, harmony.transposition)
    }
}

/// Semitone offsets of stacked thirds used without a scale: a major
/// ninth-style stack that keeps extending by alternating thirds.
const CHROMATIC_STACK: [i32; 8] = [0, 4, 7, 11, 14, 17, 21, 24];

/// Stacked-thirds chords. With a scale, every other scale degree is stacked
/// on the root's degree; without one, `CHROMATIC_STACK` is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackedChords;

impl StackedChords {
    fn stack(&self, root: u8, options: &ChordOptions) -> Vec<i32> {
        let count = options.number_of_notes.clamp(1, 8) as usize;
        match options.scale {
            Some((key, scale)) if scale != ScaleType::Chromatic => {
                let intervals = scale.intervals();
                let len = intervals.len() as i32;
                let root = quantize(root as i32, key, scale);
                let rel = root - key as i32;
                let octave = rel.div_euclid(12);
                let pc = rel.rem_euclid(12) as u8;
                let degree = intervals.iter().position(|&i| i == pc).unwrap_or(0) as i32;
                (0..count as i32)
                    .map(|k| {
                        let d = degree + 2 * k;
                        let (o, i) = (d.div_euclid(len), d.rem_euclid(len));
                        key as i32 + (octave + o) * 12 + intervals[i as usize] as i32
                    })
                    .collect()
            }
            _ => CHROMATIC_STACK[..count].iter().map(|i| root as i32 + i).collect(),
        }
    }
}

impl ChordEngine for StackedChords {
    fn generate_chord(&self, root: u8, options: &ChordOptions) -> Vec<u8> {
        let mut notes = self.stack(root, options);

        // inversion: lowest note up an octave, or highest down, per step
        for _ in 0..options.inversion.max(0) {
            notes.sort_unstable();
            if let Some(low) = notes.first_mut() {
                *low += 12;
            }
        }
        for _ in 0..options.inversion.min(0).unsigned_abs() {
            notes.sort_unstable();
            if let Some(high) = notes.last_mut() {
                *high -= 12;
            }
        }
        notes.sort_unstable();

        // spread opens the voicing: every other note moves by 1..=3 octaves
        if options.spread != 0 && notes.len() > 1 {
            let octaves = (options.spread.unsigned_abs() as i32 + 2) / 3;
            let shift = 12 * octaves * options.spread.signum() as i32;
            for (i, n) in notes.iter_mut().enumerate() {
                if i % 2 == 1 {
                    *n += shift;
                }
            }
            notes.sort_unstable();
        }

        let mut out: Vec<u8> = notes.into_iter().map(fold_into_midi).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn conform_pitch(&self, pitch: u8, key: u8, scale: ScaleType, transposition: i8) -> u8 {
        let p = fold_into_midi(pitch as i32 + transposition as i32);
        fold_into_midi(quantize(p as i32, key, scale))
    }
}

/// Nearest pitch of `scale` in `key`; ties resolve downwards.
pub fn quantize(pitch: i32, key: u8, scale: ScaleType) -> i32 {
    let intervals = scale.intervals();
    let in_scale = |p: i32| intervals.contains(&((p - key as i32).rem_euclid(12) as u8));
    (0..12)
        .find_map(|d| {
            if in_scale(pitch - d) {
                Some(pitch - d)
            } else if in_scale(pitch + d) {
                Some(pitch + d)
            } else {
                None
            }
        })
        .unwrap_or(pitch)
}

/// Moves a pitch by octaves until it is a valid MIDI note.
fn fold_into_midi(mut p: i32) -> u8 {
    while p < 0 {
        p += 12;
    }
    while p > 127 {
        p -= 12;
    }
    p as u8
}
