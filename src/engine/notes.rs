//! Note series traversal and note expansion for one track.

use fastrand::Rng;

use crate::model::harmony::Harmony;
use crate::model::note::{ArpMode, NoteSeriesEntry};
use crate::model::track::{PlayOrder, TrackSettings};

use super::arpeggio::expand;
use super::chord::{ChordEngine, ChordOptions};
use super::groove::{GrooveEngine, NoteSlot};
use super::queue::ScheduledNoteEvent;

/// Where and how long one firing step sounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub time_ms: f64,
    /// Length of one track step.
    pub step_ms: f64,
    /// Length of the note; the step length unless max duration is on.
    pub duration_ms: f64,
    pub global_step: u64,
    /// Index of this step among the pattern's firing steps.
    pub trigger_ordinal: usize,
    pub harmony: Harmony,
}

#[derive(Debug, Clone, Default)]
pub struct NoteSeriesSequencer {
    /// Per-entry a:b counters, 1-based.
    counters: Vec<u32>,
    position: Option<usize>,
    arp_cursor: usize,
}

impl NoteSeriesSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the first entry with fresh counters.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.position = None;
        self.arp_cursor = 0;
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Picks the entry for this firing step, runs its a:b gate and, when it
    /// sounds, expands it into note events.
    pub fn play_step(
        &mut self,
        settings: &TrackSettings,
        groove: &GrooveEngine,
        chords: &dyn ChordEngine,
        ctx: &StepContext,
        rng: &mut Rng,
    ) -> Vec<ScheduledNoteEvent> {
        let len = settings.note_series.len();
        if len == 0 {
            return Vec::new();
        }
        let index = if settings.tie_note_series_to_pattern {
            ctx.trigger_ordinal % len
        } else {
            self.advance(settings.play_order, len, rng)
        };
        if !self.gate(index, &settings.note_series[index], len) {
            return Vec::new();
        }

        let entry = &settings.note_series[index];
        let pitches = self.chord_for(entry, settings.conform_notes, chords, ctx, rng);
        if pitches.is_empty() {
            return Vec::new();
        }

        let mode = if entry.arp_mode.is_off() { settings.arp_mode } else { entry.arp_mode };
        let multiplier = (settings.play_multiplier.max(1) * entry.play_multiplier.max(1)) as usize;
        let channel = settings.channel.clamp(1, 16) - 1;
        let emit = |events: &mut Vec<ScheduledNoteEvent>, rng: &mut Rng, slot: NoteSlot, group: &[u8]| {
            let note = groove.apply(slot, entry, settings.volume, rng);
            if note.velocity == 0 {
                return;
            }
            events.extend(group.iter().map(|&pitch| ScheduledNoteEvent {
                time_ms: note.time_ms,
                duration_ms: note.duration_ms,
                channel,
                pitch: pitch.min(127),
                velocity: note.velocity,
            }));
        };

        let mut events = Vec::new();
        if mode.is_off() {
            // ratchet: the whole chord, `multiplier` times
            let sub = ctx.duration_ms / multiplier as f64;
            let grid_ms = ctx.step_ms / multiplier as f64;
            for r in 0..multiplier {
                let slot = NoteSlot {
                    time_ms: ctx.time_ms + r as f64 * sub,
                    duration_ms: sub,
                    grid_ms,
                    global_step: ctx.global_step + r as u64,
                };
                emit(&mut events, rng, slot, &pitches);
            }
            return events;
        }

        let sequence: Vec<Vec<u8>> = match mode {
            ArpMode::Chord => vec![expand(&pitches, mode, rng)],
            _ => expand(&pitches, mode, rng).into_iter().map(|p| vec![p]).collect(),
        };
        let seq_len = sequence.len();

        if entry.wonky_arp {
            let count = seq_len * multiplier;
            let sub = ctx.duration_ms / count as f64;
            for i in 0..count {
                let slot = sub_step(ctx, i, sub);
                emit(&mut events, rng, slot, &sequence[i % seq_len]);
            }
        } else {
            let sub = ctx.step_ms / multiplier as f64;
            let count = ((ctx.duration_ms / sub).round() as usize).max(1);
            for i in 0..count {
                let group = &sequence[(self.arp_cursor + i) % seq_len];
                emit(&mut events, rng, sub_step(ctx, i, sub), group);
            }
            self.arp_cursor = (self.arp_cursor + count) % seq_len;
        }
        events
    }

    fn advance(&mut self, order: PlayOrder, len: usize, rng: &mut Rng) -> usize {
        let next = match (order, self.position.map(|p| p % len)) {
            (PlayOrder::Forward, None) | (PlayOrder::RandomAdjacent, None) => 0,
            (PlayOrder::Backward, None) => len - 1,
            (PlayOrder::Random, _) => rng.usize(..len),
            (PlayOrder::Forward, Some(p)) => (p + 1) % len,
            (PlayOrder::Backward, Some(p)) => (p + len - 1) % len,
            (PlayOrder::RandomAdjacent, Some(p)) => {
                if len == 1 {
                    0
                } else if rng.bool() {
                    (p + 1) % len
                } else {
                    (p + len - 1) % len
                }
            }
        };
        self.position = Some(next);
        next
    }

    /// Sounds when the entry's counter equals `a_value`; the counter cycles
    /// through `1..=b_value` either way.
    fn gate(&mut self, index: usize, entry: &NoteSeriesEntry, len: usize) -> bool {
        self.counters.resize(len, 1);
        let b = entry.b_value.max(1);
        let count = self.counters[index].clamp(1, b);
        self.counters[index] = count % b + 1;
        count == entry.a_value
    }

    fn chord_for(
        &self,
        entry: &NoteSeriesEntry,
        conform: bool,
        chords: &dyn ChordEngine,
        ctx: &StepContext,
        rng: &mut Rng,
    ) -> Vec<u8> {
        let span = entry.pitch_span as i32;
        let offset = if span == 0 { 0 } else { rng.i32(span.min(0)..=span.max(0)) };
        let root = (entry.root_note as i32 + offset).clamp(0, 127) as u8;

        let options = ChordOptions {
            number_of_notes: entry.number_of_notes,
            inversion: entry.inversion,
            spread: entry.spread,
            scale: conform.then_some((ctx.harmony.key, ctx.harmony.scale)),
        };
        let mut pitches = chords.generate_chord(root, &options);
        if conform {
            for p in pitches.iter_mut() {
                *p = chords.conform_to(*p, &ctx.harmony);
            }
        }
        if entry.probability < 100 {
            pitches.retain(|_| rng.u8(..100) < entry.probability);
        }
        pitches
    }
}

/// The `i`-th arpeggio sub-step of `sub` ms within a step.
fn sub_step(ctx: &StepContext, i: usize, sub: f64) -> NoteSlot {
    NoteSlot {
        time_ms: ctx.time_ms + i as f64 * sub,
        duration_ms: sub,
        grid_ms: sub,
        global_step: ctx.global_step + i as u64,
    }
}
