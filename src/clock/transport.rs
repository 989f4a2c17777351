//! Global transport: bar/beat/tick position and MIDI-clock ticks.
//!
//! Position is a pure function of transport time (ms since `start`), tempo
//! and time signature; the tick counter only drives `ClockEvent`s. Tempo and
//! time-signature changes re-anchor the mapping so elapsed position is never
//! rewritten.

use crate::model::song::TimeSignature;

/// Position resolution, pulses per quarter note.
pub const PPQ: u32 = 96;
/// MIDI clock pulses per quarter note.
pub const MIDI_CLOCK_PPQ: u32 = 24;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportPosition {
    pub bar: u64,
    pub beat: u32,
    pub tick: u32,
    /// Sixteenth notes since the start.
    pub total_steps: u64,
}

impl TransportPosition {
    pub fn is_bar_start(&self) -> bool {
        self.beat == 0 && self.tick == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    /// One MIDI clock pulse.
    Tick,
    /// Every 24 pulses. `drift_ms` is the measured inter-quarter time minus
    /// the nominal one; diagnostic only.
    QuarterNote { index: u64, drift_ms: f64 },
    BarChange { bar: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct TempoAnchor {
    ms: f64,
    beats: f64,
}

#[derive(Debug, Clone, Copy)]
struct BarAnchor {
    bar: u64,
    beats: f64,
}

/// A bar start in transport time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarBoundary {
    pub bar: u64,
    /// Quarter-note beats since transport zero.
    pub beats: f64,
    pub time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct TransportClock {
    state: ClockState,
    bpm: f64,
    time_signature: TimeSignature,
    /// Time-source reading captured by `start`.
    origin: f64,
    tempo: TempoAnchor,
    bars: BarAnchor,
    last_check: f64,
    accumulated: f64,
    ticks: u64,
    quarter_index: u64,
    last_quarter_at: f64,
    last_bar: u64,
}

impl TransportClock {
    pub fn new(bpm: f64, time_signature: TimeSignature) -> Self {
        Self {
            state: ClockState::Stopped,
            bpm,
            time_signature,
            origin: 0.0,
            tempo: TempoAnchor { ms: 0.0, beats: 0.0 },
            bars: BarAnchor { bar: 0, beats: 0.0 },
            last_check: 0.0,
            accumulated: 0.0,
            ticks: 0,
            quarter_index: 0,
            last_quarter_at: 0.0,
            last_bar: 0,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Milliseconds per MIDI clock pulse at the current tempo.
    pub fn tick_interval_ms(&self) -> f64 {
        60_000.0 / (self.bpm * MIDI_CLOCK_PPQ as f64)
    }

    pub fn beat_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Captures `now` as transport time zero and resets every accumulator.
    /// Returns the events for position zero.
    pub fn start(&mut self, now: f64) -> Vec<ClockEvent> {
        let (bpm, ts) = (self.bpm, self.time_signature);
        *self = TransportClock::new(bpm, ts);
        self.origin = now;
        self.state = ClockState::Running;
        vec![
            ClockEvent::QuarterNote { index: 0, drift_ms: 0.0 },
            ClockEvent::BarChange { bar: 0 },
        ]
    }

    pub fn stop(&mut self) {
        let (bpm, ts) = (self.bpm, self.time_signature);
        *self = TransportClock::new(bpm, ts);
    }

    /// Transport time for a time-source reading; 0 while stopped.
    pub fn transport_time(&self, now: f64) -> f64 {
        match self.state {
            ClockState::Running => (now - self.origin).max(0.0),
            ClockState::Stopped => 0.0,
        }
    }

    /// Consumes elapsed time in whole MIDI clock intervals.
    pub fn advance(&mut self, now: f64) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        if !self.is_running() {
            return events;
        }
        let t = self.transport_time(now);
        self.accumulated += (t - self.last_check).max(0.0);
        self.last_check = t;

        let interval = self.tick_interval_ms();
        while self.accumulated >= interval {
            self.accumulated -= interval;
            self.ticks += 1;
            events.push(ClockEvent::Tick);
            if self.ticks % MIDI_CLOCK_PPQ as u64 == 0 {
                self.quarter_index += 1;
                let drift_ms = (t - self.last_quarter_at) - self.beat_ms();
                self.last_quarter_at = t;
                events.push(ClockEvent::QuarterNote { index: self.quarter_index, drift_ms });
            }
        }

        let bar = self.position_at(t).bar;
        while self.last_bar < bar {
            self.last_bar += 1;
            events.push(ClockEvent::BarChange { bar: self.last_bar });
        }
        events
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Position at a time-source reading; zero while stopped.
    pub fn position(&self, now: f64) -> TransportPosition {
        if !self.is_running() {
            return TransportPosition::default();
        }
        self.position_at(self.transport_time(now))
    }

    pub fn beats_at(&self, transport_ms: f64) -> f64 {
        self.tempo.beats + (transport_ms - self.tempo.ms) * self.bpm / 60_000.0
    }

    pub fn time_at_beats(&self, beats: f64) -> f64 {
        self.tempo.ms + (beats - self.tempo.beats) * 60_000.0 / self.bpm
    }

    /// Position at a transport time. Pure: never reads the tick counter.
    pub fn position_at(&self, transport_ms: f64) -> TransportPosition {
        let beats = self.beats_at(transport_ms).max(0.0);
        let bpb = self.time_signature.beats_per_bar();
        let rel = (beats - self.bars.beats).max(0.0);
        let whole_bars = (rel / bpb + EPS).floor();
        let in_bar = (rel - whole_bars * bpb).max(0.0);
        let beat = (in_bar + EPS).floor();
        let tick = ((in_bar - beat).max(0.0) * PPQ as f64 + EPS).floor();
        TransportPosition {
            bar: self.bars.bar + whole_bars as u64,
            beat: beat as u32,
            tick: (tick as u32).min(PPQ - 1),
            total_steps: (beats * 4.0 + EPS).floor() as u64,
        }
    }

    /// The first bar start at or after `transport_ms`.
    pub fn bar_start_at_or_after(&self, transport_ms: f64) -> BarBoundary {
        let bpb = self.time_signature.beats_per_bar();
        let rel = (self.beats_at(transport_ms) - self.bars.beats) / bpb;
        let k = (rel - EPS).ceil().max(0.0);
        let beats = self.bars.beats + k * bpb;
        BarBoundary {
            bar: self.bars.bar + k as u64,
            beats,
            time_ms: self.time_at_beats(beats),
        }
    }

    /// Applies a new tempo from transport time `now` on.
    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        if self.is_running() {
            let t = self.transport_time(now);
            self.tempo = TempoAnchor { ms: t, beats: self.beats_at(t) };
        }
        self.bpm = bpm;
    }

    /// Applies a new time signature; the current bar keeps its number and
    /// takes the new length.
    pub fn set_time_signature(&mut self, time_signature: TimeSignature, now: f64) {
        if self.is_running() {
            let t = self.transport_time(now);
            let bpb = self.time_signature.beats_per_bar();
            let rel = (self.beats_at(t) - self.bars.beats).max(0.0);
            let k = (rel / bpb + EPS).floor();
            self.bars = BarAnchor { bar: self.bars.bar + k as u64, beats: self.bars.beats + k * bpb };
        }
        self.time_signature = time_signature;
    }
}
