//! Per-track lookahead scheduling.
//!
//! A track walks its trigger pattern one step at a time on the transport's
//! beat grid, so a tempo change moves its remaining steps with the clock.
//! Changes that move the step grid are deferred to the next bar start, where
//! the step position is recomputed from the absolute transport position so
//! the track stays phase-locked to the shared clock.

use fastrand::Rng;

use crate::clock::transport::BarBoundary;
use crate::clock::TransportClock;
use crate::console;
use crate::model::harmony::{harmony_at_bar, Harmony};
use crate::model::song::SequencerSettings;
use crate::model::track::{SettingsDiff, TrackSettings};
use crate::pattern::TriggerPattern;

use super::chord::ChordEngine;
use super::groove::GrooveEngine;
use super::notes::{NoteSeriesSequencer, StepContext};
use super::queue::ScheduledNoteEvent;
use super::timing::{max_duration_ms, step_beats};

const EPS: f64 = 1e-6;

/// Shared state a track reads while scheduling.
pub struct ScheduleContext<'a> {
    pub clock: &'a TransportClock,
    pub settings: &'a SequencerSettings,
    pub chords: &'a dyn ChordEngine,
}

impl ScheduleContext<'_> {
    pub fn harmony_at(&self, transport_ms: f64) -> Harmony {
        let bar = self.clock.position_at(transport_ms).bar;
        harmony_at_bar(&self.settings.progression, self.settings.harmony(), bar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No trigger pattern built.
    Idle,
    Scheduled,
}

#[derive(Debug, Clone)]
pub struct TrackScheduler {
    /// Settings steps are played with. Grid changes reach it at resync.
    playing: TrackSettings,
    pattern: TriggerPattern,
    /// Beat of the last resync and steps placed since.
    grid_start: f64,
    grid_steps: u64,
    step_beats: f64,
    current_step: usize,
    global_step: u64,
    last_step_beat: Option<f64>,
    /// Transport time `arm` was called with.
    join_ms: f64,
    /// False until the first resync after `arm`; nothing plays meanwhile.
    aligned: bool,
    last_resync_bar: Option<u64>,
    pending_resync: bool,
    pending_rebuild: bool,
    rng: Rng,
    groove: GrooveEngine,
    notes: NoteSeriesSequencer,
}

impl TrackScheduler {
    pub fn new(settings: &TrackSettings, seed: u64) -> Self {
        Self {
            playing: settings.clone(),
            pattern: TriggerPattern::build(&settings.trigger),
            grid_start: 0.0,
            grid_steps: 0,
            step_beats: step_beats(settings.steps_per_beat(), settings.speed_multiplier),
            current_step: 0,
            global_step: 0,
            last_step_beat: None,
            join_ms: 0.0,
            aligned: false,
            last_resync_bar: None,
            pending_resync: false,
            pending_rebuild: false,
            rng: Rng::with_seed(seed),
            groove: GrooveEngine::from_settings(settings),
            notes: NoteSeriesSequencer::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.pattern.is_empty() {
            SchedulerState::Idle
        } else {
            SchedulerState::Scheduled
        }
    }

    pub fn pattern(&self) -> &TriggerPattern {
        &self.pattern
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Transport beat of the step placed next.
    pub fn next_beat(&self) -> f64 {
        self.grid_start + self.grid_steps as f64 * self.step_beats
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn pending_resync(&self) -> bool {
        self.pending_resync
    }

    pub fn pending_rebuild(&self) -> bool {
        self.pending_rebuild
    }

    /// Prepares the track to join at the first bar start at or after
    /// `transport_ms`. Used by `start` and by tracks added while playing.
    pub fn arm(&mut self, transport_ms: f64) {
        self.join_ms = transport_ms;
        self.last_step_beat = None;
        self.last_resync_bar = None;
        self.aligned = false;
        self.pending_rebuild = true;
        self.pending_resync = true;
    }

    /// Records which parts of the settings changed. Grid-moving changes wait
    /// for the next bar; everything else applies to the next placed step.
    pub fn on_settings_changed(&mut self, diff: &SettingsDiff, settings: &TrackSettings) {
        if diff.needs_rebuild() {
            self.pending_rebuild = true;
        }
        if diff.needs_resync() {
            self.pending_resync = true;
        }
        self.playing = if self.pending_resync || self.pending_rebuild {
            settings.keeping_grid_of(&self.playing)
        } else {
            settings.clone()
        };
        if diff.groove {
            self.groove = GrooveEngine::from_settings(settings);
        }
    }

    /// Global tempo or meter changed.
    pub fn request_resync(&mut self) {
        self.pending_resync = true;
    }

    /// Places every step whose earliest possible note falls before
    /// `lookahead_end` and returns the notes they produce.
    pub fn schedule_events(
        &mut self,
        settings: &TrackSettings,
        ctx: &ScheduleContext<'_>,
        lookahead_end: f64,
    ) -> Vec<ScheduledNoteEvent> {
        let mut events = Vec::new();
        while self.next_time(ctx.clock) - self.rush_ms(ctx.clock) < lookahead_end {
            if self.maybe_resync(settings, ctx) {
                continue;
            }
            self.place_step(ctx, &mut events);
        }
        events
    }

    fn next_time(&self, clock: &TransportClock) -> f64 {
        if self.aligned {
            clock.time_at_beats(self.next_beat())
        } else {
            self.join_ms
        }
    }

    fn step_ms(&self, clock: &TransportClock) -> f64 {
        self.step_beats * clock.beat_ms()
    }

    /// How far ahead of its step a note of this track can start.
    fn rush_ms(&self, clock: &TransportClock) -> f64 {
        let pct = self.groove.max_rush_pct();
        if pct <= 0.0 {
            return 0.0;
        }
        let step_ms = self.step_ms(clock);
        let longest = if self.playing.use_max_duration {
            let factor = self.playing.max_duration_factor;
            max_duration_ms(factor, self.pattern.len().max(1), step_ms, clock.bpm()).max(step_ms)
        } else {
            step_ms
        };
        longest * pct / 100.0
    }

    /// Resyncs at the next bar start when something is pending and the
    /// step about to be placed would reach it.
    fn maybe_resync(&mut self, settings: &TrackSettings, ctx: &ScheduleContext<'_>) -> bool {
        let from = match self.last_step_beat {
            Some(beat) if self.aligned => ctx.clock.time_at_beats(beat) + EPS,
            _ => self.next_time(ctx.clock),
        };
        let boundary = ctx.clock.bar_start_at_or_after(from);
        if self.last_resync_bar == Some(boundary.bar) {
            return false;
        }
        let periodic = settings.resync_interval > 0
            && boundary.bar % settings.resync_interval as u64 == 0;
        let wanted = !self.aligned || self.pending_resync || self.pending_rebuild || periodic;
        if !wanted {
            return false;
        }
        if self.aligned && self.next_beat() < boundary.beats - EPS {
            return false;
        }
        self.resync_at(settings, ctx, boundary);
        true
    }

    fn resync_at(&mut self, settings: &TrackSettings, ctx: &ScheduleContext<'_>, boundary: BarBoundary) {
        if self.pending_rebuild || !self.aligned {
            self.pattern = TriggerPattern::build(&settings.trigger);
        }
        self.playing = settings.clone();
        self.step_beats = step_beats(settings.steps_per_beat(), settings.speed_multiplier);

        let beats = boundary.beats.max(0.0);
        let absolute = (beats / self.step_beats + EPS).floor() as u64;
        self.global_step = absolute;
        self.current_step = match self.pattern.len() {
            0 => 0,
            len => (absolute % len as u64) as usize,
        };
        self.grid_start = beats;
        self.grid_steps = 0;
        self.last_resync_bar = Some(boundary.bar);
        self.aligned = true;
        self.pending_resync = false;
        self.pending_rebuild = false;
        self.notes.reset();
        self.groove = GrooveEngine::from_settings(settings);
        console::debug(format!(
            "{}: resync at bar {} step {} ({:.1}ms/step)",
            settings.name,
            boundary.bar,
            self.current_step,
            self.step_ms(ctx.clock)
        ));
    }

    fn place_step(&mut self, ctx: &ScheduleContext<'_>, events: &mut Vec<ScheduledNoteEvent>) {
        let step = self.current_step;
        let beat = self.next_beat();
        let time_ms = ctx.clock.time_at_beats(beat);
        let step_ms = self.step_ms(ctx.clock);
        let settings = &self.playing;

        let fires = settings.is_active && self.pattern.should_trigger(step);
        if fires && roll(&mut self.rng, settings.probability) {
            let duration_ms = if settings.use_max_duration {
                max_duration_ms(
                    settings.max_duration_factor,
                    self.pattern.steps_until_next_trigger(step),
                    step_ms,
                    ctx.clock.bpm(),
                )
            } else {
                step_ms
            };
            let step_ctx = StepContext {
                time_ms,
                step_ms,
                duration_ms,
                global_step: self.global_step,
                trigger_ordinal: self.pattern.trigger_ordinal(step).unwrap_or(0),
                harmony: ctx.harmony_at(time_ms),
            };
            let notes = self.notes.play_step(settings, &self.groove, ctx.chords, &step_ctx, &mut self.rng);
            events.extend(notes.into_iter().map(not_before_zero));
        }

        self.last_step_beat = Some(beat);
        self.current_step = match self.pattern.len() {
            0 => 0,
            len => (step + 1) % len,
        };
        self.grid_steps += 1;
        self.global_step += 1;
    }
}

fn roll(rng: &mut Rng, probability: u8) -> bool {
    probability >= 100 || rng.u8(..100) < probability
}

/// A note rushed before transport zero starts at zero and keeps its end.
fn not_before_zero(mut event: ScheduledNoteEvent) -> ScheduledNoteEvent {
    if event.time_ms < 0.0 {
        event.duration_ms = (event.duration_ms + event.time_ms).max(0.0);
        event.time_ms = 0.0;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::chord::StackedChords;
    use crate::model::groove::GrooveStep;
    use crate::model::note::{ArpMode, NoteSeriesEntry};
    use crate::model::pattern::TriggerSettings;
    use crate::model::song::TimeSignature;
    use crate::model::track::TrackSettingsPatch;

    struct Rig {
        clock: TransportClock,
        settings: SequencerSettings,
    }

    impl Rig {
        fn new(bpm: f64) -> Self {
            let mut clock = TransportClock::new(bpm, TimeSignature::four_four());
            clock.start(0.0);
            Self { clock, settings: SequencerSettings { bpm, ..SequencerSettings::default() } }
        }

        fn run(&self, sched: &mut TrackScheduler, track: &TrackSettings, until: f64) -> Vec<ScheduledNoteEvent> {
            let ctx = ScheduleContext { clock: &self.clock, settings: &self.settings, chords: &StackedChords };
            sched.schedule_events(track, &ctx, until)
        }
    }

    fn kick(trigger: TriggerSettings) -> TrackSettings {
        TrackSettings {
            trigger,
            note_series: vec![NoteSeriesEntry::note(36, 100)],
            ..TrackSettings::new("kick")
        }
    }

    fn armed(track: &TrackSettings) -> TrackScheduler {
        let mut s = TrackScheduler::new(track, 1);
        s.arm(0.0);
        s
    }

    fn times(events: &[ScheduledNoteEvent]) -> Vec<f64> {
        events.iter().map(|e| e.time_ms).collect()
    }

    #[test]
    fn quarter_notes_from_single_nibble() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([8]));
        let mut s = armed(&track);
        let ev = rig.run(&mut s, &track, 4_000.0);
        assert_eq!(times(&ev), vec![0.0, 500.0, 1_000.0, 1_500.0, 2_000.0, 2_500.0, 3_000.0, 3_500.0]);
        assert!(ev.iter().all(|e| e.duration_ms == 125.0 && e.pitch == 36 && e.velocity == 100));
    }

    #[test]
    fn lookahead_is_incremental() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([15, 15, 15, 15]));
        let mut s = armed(&track);
        let first = rig.run(&mut s, &track, 300.0);
        assert_eq!(times(&first), vec![0.0, 125.0, 250.0]);
        let second = rig.run(&mut s, &track, 600.0);
        assert_eq!(times(&second), vec![375.0, 500.0]);
        assert_eq!(s.next_beat(), 1.25);
    }

    #[test]
    fn init_pattern_is_idle_and_silent() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::Init);
        let mut s = armed(&track);
        assert!(rig.run(&mut s, &track, 2_000.0).is_empty());
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(s.global_step() > 0);
    }

    #[test]
    fn inactive_track_keeps_position() {
        let rig = Rig::new(120.0);
        let track = TrackSettings { is_active: false, ..kick(TriggerSettings::binary([15, 15])) };
        let mut s = armed(&track);
        assert!(rig.run(&mut s, &track, 1_000.0).is_empty());
        assert_eq!(s.global_step(), 8);
        assert_eq!(s.current_step(), 0);
    }

    #[test]
    fn pattern_change_waits_for_bar() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([15, 15, 15, 15]));
        let mut s = armed(&track);
        rig.run(&mut s, &track, 700.0);

        let (next, diff) = track.apply(&TrackSettingsPatch {
            trigger: Some(TriggerSettings::binary([8, 0, 0, 0])),
            ..Default::default()
        });
        s.on_settings_changed(&diff, &next);
        assert!(s.pending_rebuild());

        let ev = rig.run(&mut s, &next, 4_000.0);
        let t = times(&ev);
        // old pattern plays out the bar, new one starts at 2000
        assert_eq!(t.iter().filter(|x| **x < 2_000.0).count(), 10);
        assert_eq!(t.iter().filter(|x| **x >= 2_000.0).copied().collect::<Vec<_>>(), vec![2_000.0]);
        assert!(!s.pending_rebuild());
    }

    #[test]
    fn resync_derives_step_from_transport() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::euclidean(12, 3, 0));
        let mut s = armed(&track);
        rig.run(&mut s, &track, 1_900.0);
        s.request_resync();
        rig.run(&mut s, &track, 2_001.0);
        // bar 1 starts at beat 4 = step 16; 16 mod 12
        assert_eq!(s.global_step(), 17);
        assert_eq!(s.current_step(), 5);
    }

    #[test]
    fn speed_change_applies_at_bar() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([15]));
        let mut s = armed(&track);
        rig.run(&mut s, &track, 1_000.0);
        let (next, diff) = track.apply(&TrackSettingsPatch { speed_multiplier: Some(2.0), ..Default::default() });
        s.on_settings_changed(&diff, &next);
        let ev = rig.run(&mut s, &next, 2_200.0);
        let t = times(&ev);
        assert_eq!(&t[..8], &[1_000.0, 1_125.0, 1_250.0, 1_375.0, 1_500.0, 1_625.0, 1_750.0, 1_875.0]);
        assert_eq!(&t[8..], &[2_000.0, 2_062.5, 2_125.0, 2_187.5]);
    }

    #[test]
    fn tempo_change_moves_remaining_steps_with_the_clock() {
        let mut rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([8]));
        let mut s = armed(&track);
        assert_eq!(times(&rig.run(&mut s, &track, 1_100.0)), vec![0.0, 500.0, 1_000.0]);

        rig.clock.set_bpm(60.0, 1_000.0);
        rig.settings.bpm = 60.0;
        s.request_resync();
        // beat 3 at 2000, bar 1 at 3000, beat 5 at 4000
        assert_eq!(times(&rig.run(&mut s, &track, 4_100.0)), vec![2_000.0, 3_000.0, 4_000.0]);
    }

    #[test]
    fn rushed_notes_are_placed_early_enough() {
        let rig = Rig::new(120.0);
        let track = TrackSettings {
            step_resolution: 4,
            groove: vec![GrooveStep::new(-30.0, 0.0)],
            ..kick(TriggerSettings::binary([15]))
        };
        let mut s = armed(&track);
        let first = rig.run(&mut s, &track, 100.0);
        // step 0 would start at -150
        assert_eq!(times(&first), vec![0.0]);
        assert_eq!(first[0].duration_ms, 200.0);
        assert_eq!(times(&rig.run(&mut s, &track, 400.0)), vec![350.0]);
    }

    #[test]
    fn multiplier_change_waits_for_bar_but_volume_does_not() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([8]));
        let mut s = armed(&track);
        rig.run(&mut s, &track, 700.0);

        let (next, diff) = track.apply(&TrackSettingsPatch {
            play_multiplier: Some(2),
            volume: Some(50),
            ..Default::default()
        });
        s.on_settings_changed(&diff, &next);
        let ev = rig.run(&mut s, &next, 2_100.0);
        assert_eq!(times(&ev), vec![1_000.0, 1_500.0, 2_000.0, 2_062.5]);
        assert!(ev.iter().all(|e| e.velocity == 50));
    }

    #[test]
    fn wonky_arp_change_waits_for_bar() {
        let rig = Rig::new(120.0);
        let chord = NoteSeriesEntry { number_of_notes: 3, arp_mode: ArpMode::Up, ..NoteSeriesEntry::note(60, 100) };
        let track = TrackSettings { note_series: vec![chord.clone()], ..kick(TriggerSettings::binary([8])) };
        let mut s = armed(&track);
        rig.run(&mut s, &track, 700.0);

        let wonky = NoteSeriesEntry { wonky_arp: true, ..chord };
        let (next, diff) = track.apply(&TrackSettingsPatch { note_series: Some(vec![wonky]), ..Default::default() });
        s.on_settings_changed(&diff, &next);
        let t = times(&rig.run(&mut s, &next, 2_100.0));
        assert_eq!(t.iter().filter(|x| **x < 2_000.0).copied().collect::<Vec<_>>(), vec![1_000.0, 1_500.0]);
        assert_eq!(t.iter().filter(|x| **x >= 2_000.0).count(), 3);
    }

    #[test]
    fn armed_late_joins_next_bar() {
        let rig = Rig::new(120.0);
        let track = kick(TriggerSettings::binary([8]));
        let mut s = TrackScheduler::new(&track, 1);
        s.arm(700.0);
        let ev = rig.run(&mut s, &track, 2_600.0);
        assert_eq!(times(&ev), vec![2_000.0, 2_500.0]);
    }

    #[test]
    fn max_duration_reaches_next_trigger() {
        let rig = Rig::new(120.0);
        let track = TrackSettings { use_max_duration: true, ..kick(TriggerSettings::steps([0, 4])) };
        let mut s = armed(&track);
        let ev = rig.run(&mut s, &track, 1_000.0);
        let pulse = 500.0 / 24.0;
        assert!((ev[0].duration_ms - (500.0 - pulse)).abs() < 1e-9);
        assert!((ev[1].duration_ms - (1_500.0 - pulse)).abs() < 1e-9);
    }

    #[test]
    fn zero_probability_track_is_silent_but_advances() {
        let rig = Rig::new(120.0);
        let track = TrackSettings { probability: 0, ..kick(TriggerSettings::binary([15])) };
        let mut s = armed(&track);
        assert!(rig.run(&mut s, &track, 1_000.0).is_empty());
        assert_eq!(s.global_step(), 8);
    }

    #[test]
    fn periodic_resync_resets_ratio_counters() {
        let rig = Rig::new(120.0);
        let entry = NoteSeriesEntry { a_value: 1, b_value: 3, ..NoteSeriesEntry::note(36, 100) };
        let base = TrackSettings { note_series: vec![entry], ..kick(TriggerSettings::binary([15])) };

        // 16 steps per bar: without a resync step 16 lands on counter 2
        let mut s = armed(&base);
        assert!(!times(&rig.run(&mut s, &base, 2_100.0)).contains(&2_000.0));

        let track = TrackSettings { resync_interval: 1, ..base };
        let mut s = armed(&track);
        let t = times(&rig.run(&mut s, &track, 2_100.0));
        assert!(t.contains(&1_875.0));
        assert!(t.contains(&2_000.0));
    }
}
