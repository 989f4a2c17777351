//! Sequencer orchestration: one transport clock, many tracks, one event
//! queue, one sink.
//!
//! Everything runs on the caller's thread. A driver calls `tick` once per
//! loop iteration and hands control back to the time source between
//! iterations; `run_for` is the stock driver.

pub mod arpeggio;
pub mod chord;
pub mod groove;
pub mod notes;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod timing;
pub mod track;

use crate::clock::{ClockEvent, TimeSource, TransportClock, TransportPosition};
use crate::console;
use crate::error::EngineError;
use crate::model::harmony::{harmony_at_bar, Harmony};
use crate::model::song::{SequencerSettings, SequencerSettingsPatch, Song};
use crate::model::track::{SettingsDiff, TrackSettings, TrackSettingsPatch};

use chord::{ChordEngine, StackedChords};
use queue::{EventQueue, NoteMessage, QueuedNote};
use scheduler::ScheduleContext;
use sink::NoteSink;
use track::Track;

/// Quarter-note drift above this is logged.
const DRIFT_LOG_MS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveNote {
    track: usize,
    channel: u8,
    pitch: u8,
}

pub struct Sequencer {
    settings: SequencerSettings,
    clock: TransportClock,
    time: Box<dyn TimeSource>,
    sink: Box<dyn NoteSink>,
    chords: Box<dyn ChordEngine>,
    tracks: Vec<Track>,
    next_id: usize,
    queue: EventQueue,
    active: Vec<ActiveNote>,
    playing: bool,
}

impl Sequencer {
    pub fn new(settings: SequencerSettings, time: Box<dyn TimeSource>, sink: Box<dyn NoteSink>) -> Self {
        let settings = settings.clamped();
        Self {
            clock: TransportClock::new(settings.bpm, settings.time_signature),
            settings,
            time,
            sink,
            chords: Box::new(StackedChords),
            tracks: Vec::new(),
            next_id: 0,
            queue: EventQueue::new(),
            active: Vec::new(),
            playing: false,
        }
    }

    /// A sequencer with every track of `song` added.
    pub fn from_song(song: &Song, time: Box<dyn TimeSource>, sink: Box<dyn NoteSink>) -> Self {
        let mut seq = Self::new(song.settings.clone(), time, sink);
        for t in &song.tracks {
            seq.add_track(t.clone());
        }
        seq
    }

    pub fn with_chord_engine(mut self, chords: Box<dyn ChordEngine>) -> Self {
        self.chords = chords;
        self
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: usize) -> Result<&Track, EngineError> {
        self.tracks.iter().find(|t| t.id() == id).ok_or(EngineError::UnknownTrack(id))
    }

    fn track_mut(&mut self, id: usize) -> Result<&mut Track, EngineError> {
        self.tracks.iter_mut().find(|t| t.id() == id).ok_or(EngineError::UnknownTrack(id))
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Messages still waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Adds a track and returns its id. While playing, the track joins at
    /// the next bar start.
    pub fn add_track(&mut self, settings: TrackSettings) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let mut track = Track::new(id, settings, track_seed(self.settings.seed, id));
        if self.playing {
            let now = self.clock.transport_time(self.time.now());
            track.scheduler.arm(now);
        }
        console::debug(format!("track {} added: {}", id, track.settings().name));
        self.tracks.push(track);
        id
    }

    /// Removes a track, dropping its queued events and releasing its
    /// sounding notes.
    pub fn remove_track(&mut self, id: usize) -> Result<(), EngineError> {
        let pos = self.tracks.iter().position(|t| t.id() == id).ok_or(EngineError::UnknownTrack(id))?;
        self.tracks.remove(pos);
        self.queue.remove_track(id);
        let (released, kept): (Vec<ActiveNote>, Vec<ActiveNote>) =
            std::mem::take(&mut self.active).into_iter().partition(|n| n.track == id);
        self.active = kept;
        for n in released {
            self.sink.note_off(n.channel, n.pitch);
        }
        Ok(())
    }

    pub fn update_track_settings(&mut self, id: usize, patch: &TrackSettingsPatch) -> Result<SettingsDiff, EngineError> {
        Ok(self.track_mut(id)?.update_settings(patch))
    }

    /// Applies global changes. Tempo and meter changes take effect on the
    /// clock at once; tracks follow the new tempo from their next step and
    /// recompute their step position at their next bar.
    pub fn update_settings(&mut self, patch: &SequencerSettingsPatch) {
        let next = self.settings.apply(patch);
        let now = self.time.now();
        let mut regrid = false;
        if next.bpm != self.settings.bpm {
            self.clock.set_bpm(next.bpm, now);
            regrid = true;
        }
        if next.time_signature != self.settings.time_signature {
            self.clock.set_time_signature(next.time_signature, now);
            regrid = true;
        }
        if regrid {
            for t in &mut self.tracks {
                t.scheduler.request_resync();
            }
        }
        if patch.bpm.is_some_and(|b| b != next.bpm)
            || patch.key.is_some_and(|k| k != next.key)
            || patch.transposition.is_some_and(|t| t != next.transposition)
            || patch.time_signature.is_some_and(|ts| ts != next.time_signature)
        {
            console::info("global settings clamped to valid ranges");
        }
        self.settings = next;
    }

    /// Starts the clock, aligns every track to bar 0 and fills the first
    /// lookahead window so the downbeat is not missed.
    pub fn start(&mut self) {
        if self.playing {
            return;
        }
        let events = self.clock.start(self.time.now());
        self.playing = true;
        self.queue.clear();
        self.active.clear();
        self.sink.transport_start();
        for t in &mut self.tracks {
            t.scheduler.arm(0.0);
        }
        for e in events {
            self.on_clock_event(e);
        }
        self.schedule_until(0.0, self.settings.lookahead_ms);
        self.flush(0.0);
        console::info(format!("playing at {} BPM, {}", self.settings.bpm, self.settings.time_signature));
    }

    /// Halts the clock and releases everything still sounding. Safe to call
    /// repeatedly.
    pub fn stop(&mut self) {
        let was_playing = self.playing;
        self.playing = false;
        self.queue.clear();
        for n in std::mem::take(&mut self.active) {
            self.sink.note_off(n.channel, n.pitch);
        }
        if was_playing {
            self.clock.stop();
            self.sink.all_notes_off();
            self.sink.transport_stop();
            console::info("stopped");
        }
    }

    /// One iteration of the scheduling loop.
    pub fn tick(&mut self) {
        if !self.playing {
            return;
        }
        let source_now = self.time.now();
        for e in self.clock.advance(source_now) {
            self.on_clock_event(e);
        }
        let now = self.clock.transport_time(source_now);
        self.schedule_until(now, now + self.settings.lookahead_ms);
        self.flush(now);
    }

    /// Drives `tick` for `duration_ms` of time-source time, yielding
    /// `poll_ms` between iterations.
    pub fn run_for(&mut self, duration_ms: f64, poll_ms: f64) {
        let end = self.time.now() + duration_ms.max(0.0);
        let poll = poll_ms.max(0.1);
        while self.playing {
            let now = self.time.now();
            if now >= end {
                break;
            }
            self.tick();
            self.time.yield_until((now + poll).min(end));
        }
    }

    pub fn current_position(&self) -> TransportPosition {
        self.clock.position(self.time.now())
    }

    /// Pitches currently sounding on a track.
    pub fn active_notes(&self, id: usize) -> Result<Vec<u8>, EngineError> {
        self.track(id)?;
        Ok(self.active.iter().filter(|n| n.track == id).map(|n| n.pitch).collect())
    }

    /// Key and scale in effect at the current bar.
    pub fn current_scale(&self) -> Harmony {
        harmony_at_bar(&self.settings.progression, self.settings.harmony(), self.current_position().bar)
    }

    /// Brings the running sequencer in line with `song`. Tracks are matched
    /// by position: existing ones are patched, extra ones added, missing
    /// ones removed.
    pub fn apply_song(&mut self, song: &Song) {
        self.update_settings(&SequencerSettingsPatch::from(&song.settings));
        let ids: Vec<usize> = self.tracks.iter().map(|t| t.id()).collect();
        for (i, settings) in song.tracks.iter().enumerate() {
            match ids.get(i) {
                Some(&id) => {
                    if let Err(e) = self.update_track_settings(id, &TrackSettingsPatch::from(settings)) {
                        console::warn(e.to_string());
                    }
                }
                None => {
                    self.add_track(settings.clone());
                }
            }
        }
        for &id in ids.iter().skip(song.tracks.len()) {
            if let Err(e) = self.remove_track(id) {
                console::warn(e.to_string());
            }
        }
        console::info(format!("song applied: {} track(s)", self.tracks.len()));
    }

    fn on_clock_event(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::Tick => {
                if self.settings.send_clock {
                    self.sink.clock_pulse();
                }
            }
            ClockEvent::QuarterNote { index, drift_ms } => {
                if drift_ms.abs() > DRIFT_LOG_MS {
                    console::debug(format!("quarter {} drift {:+.2}ms", index, drift_ms));
                }
            }
            ClockEvent::BarChange { bar } => console::debug(format!("bar {}", bar)),
        }
    }

    fn schedule_until(&mut self, now: f64, lookahead_end: f64) {
        let ctx = ScheduleContext {
            clock: &self.clock,
            settings: &self.settings,
            chords: self.chords.as_ref(),
        };
        for track in self.tracks.iter_mut() {
            for event in track.schedule(&ctx, lookahead_end) {
                if let Err(e) = self.queue.push(track.id(), event, now, self.settings.late_tolerance_ms) {
                    console::warn(format!("{}: {}", track.settings().name, e));
                }
            }
        }
    }

    fn flush(&mut self, now: f64) {
        while let Some(msg) = self.queue.pop_due(now) {
            self.deliver(msg);
        }
    }

    fn deliver(&mut self, msg: QueuedNote) {
        let channel = msg.channel.min(15);
        let pitch = msg.pitch.min(127);
        match msg.message {
            NoteMessage::On { velocity } => {
                self.sink.note_on(channel, pitch, velocity.min(127));
                self.active.push(ActiveNote { track: msg.track, channel, pitch });
            }
            NoteMessage::Off => {
                let sounding = ActiveNote { track: msg.track, channel, pitch };
                if let Some(i) = self.active.iter().position(|n| *n == sounding) {
                    self.active.remove(i);
                }
                self.sink.note_off(channel, pitch);
            }
        }
    }
}

fn track_seed(seed: u64, id: usize) -> u64 {
    seed.wrapping_add((id as u64 + 1).wrapping_mul(12345))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::harmony::{ProgressionStep, ScaleType};
    use crate::model::note::NoteSeriesEntry;
    use crate::model::pattern::TriggerSettings;
    use sink::{RecordingSink, SinkEvent};

    fn rig(settings: SequencerSettings) -> (Sequencer, ManualClock, RecordingSink<ManualClock>) {
        let clock = ManualClock::new();
        let sink = RecordingSink::new(clock.clone());
        let seq = Sequencer::new(settings, Box::new(clock.clone()), Box::new(sink.clone()));
        (seq, clock, sink)
    }

    fn kick(trigger: TriggerSettings) -> TrackSettings {
        TrackSettings {
            trigger,
            note_series: vec![NoteSeriesEntry::note(36, 100)],
            ..TrackSettings::new("kick")
        }
    }

    #[test]
    fn start_plays_the_downbeat_immediately() {
        let (mut seq, _clock, sink) = rig(SequencerSettings::default());
        seq.add_track(kick(TriggerSettings::binary([8])));
        seq.start();
        let log = sink.messages();
        assert_eq!(log[0].event, SinkEvent::Start);
        assert_eq!(log[1].event, SinkEvent::NoteOn { channel: 0, pitch: 36, velocity: 100 });
        assert_eq!(seq.active_notes(0).unwrap(), vec![36]);
    }

    #[test]
    fn stop_releases_notes_and_is_idempotent() {
        let (mut seq, clock, sink) = rig(SequencerSettings::default());
        seq.add_track(kick(TriggerSettings::binary([8])));
        seq.start();
        clock.advance(50.0);
        seq.tick();
        seq.stop();
        seq.stop();
        let events: Vec<SinkEvent> = sink.messages().into_iter().map(|m| m.event).collect();
        assert_eq!(
            &events[events.len() - 3..],
            &[SinkEvent::NoteOff { channel: 0, pitch: 36 }, SinkEvent::AllNotesOff, SinkEvent::Stop]
        );
        assert_eq!(seq.pending_events(), 0);
        assert!(!seq.is_playing());
        assert!(seq.active_notes(0).unwrap().is_empty());
    }

    #[test]
    fn unknown_track_is_an_error() {
        let (mut seq, _, _) = rig(SequencerSettings::default());
        assert_eq!(seq.active_notes(4), Err(EngineError::UnknownTrack(4)));
        assert!(seq.update_track_settings(9, &TrackSettingsPatch::default()).is_err());
        assert!(seq.remove_track(1).is_err());
    }

    #[test]
    fn clock_pulses_forwarded_when_enabled() {
        // 125 BPM: one pulse every 20 ms
        let (mut seq, clock, sink) = rig(SequencerSettings { bpm: 125.0, send_clock: true, ..Default::default() });
        seq.start();
        clock.advance(480.0);
        seq.tick();
        let pulses = sink.messages().iter().filter(|m| m.event == SinkEvent::Clock).count();
        assert_eq!(pulses, 24);
    }

    #[test]
    fn track_added_while_playing_waits_for_bar() {
        let (mut seq, clock, sink) = rig(SequencerSettings::default());
        seq.start();
        clock.advance(700.0);
        seq.tick();
        seq.add_track(kick(TriggerSettings::binary([8])));
        seq.run_for(1_400.0, 1.0);
        let ons = sink.note_ons();
        assert_eq!(ons.len(), 1);
        assert_eq!(ons[0].at_ms, 2_000.0);
    }

    #[test]
    fn remove_track_silences_it() {
        let (mut seq, clock, sink) = rig(SequencerSettings::default());
        let id = seq.add_track(kick(TriggerSettings::binary([8])));
        seq.start();
        clock.advance(10.0);
        seq.tick();
        seq.remove_track(id).unwrap();
        seq.run_for(1_000.0, 1.0);
        assert_eq!(sink.note_ons().len(), 1);
        assert_eq!(sink.messages().last().map(|m| m.event), Some(SinkEvent::NoteOff { channel: 0, pitch: 36 }));
        assert_eq!(seq.pending_events(), 0);
    }

    #[test]
    fn tempo_change_keeps_tracks_on_the_beat() {
        let (mut seq, _clock, sink) = rig(SequencerSettings::default());
        seq.add_track(kick(TriggerSettings::binary([8])));
        seq.start();
        seq.run_for(1_000.0, 1.0);
        seq.update_settings(&SequencerSettingsPatch { bpm: Some(60.0), ..Default::default() });
        seq.run_for(3_100.0, 1.0);
        let times: Vec<f64> = sink.note_ons().iter().map(|m| m.at_ms).collect();
        assert_eq!(times, vec![0.0, 500.0, 1_000.0, 2_000.0, 3_000.0, 4_000.0]);
        for t in &times[2..] {
            let p = seq.clock().position_at(*t);
            assert_eq!(p.tick, 0, "{} ms is off the beat", t);
        }
    }

    #[test]
    fn current_scale_follows_progression() {
        let settings = SequencerSettings {
            progression: vec![
                ProgressionStep { key: 0, scale: ScaleType::Major, bars: 1 },
                ProgressionStep { key: 9, scale: ScaleType::Minor, bars: 1 },
            ],
            ..Default::default()
        };
        let (mut seq, clock, _) = rig(settings);
        seq.start();
        assert_eq!(seq.current_scale().key, 0);
        clock.advance(2_100.0);
        seq.tick();
        assert_eq!(seq.current_scale().scale, ScaleType::Minor);
        assert_eq!(seq.current_position().bar, 1);
    }

    #[test]
    fn apply_song_adds_patches_and_removes() {
        let (mut seq, _, _) = rig(SequencerSettings::default());
        seq.add_track(kick(TriggerSettings::binary([8])));
        seq.add_track(TrackSettings::new("hat"));
        let song = Song {
            settings: SequencerSettings { bpm: 90.0, ..Default::default() },
            tracks: vec![TrackSettings { volume: 50, ..kick(TriggerSettings::binary([8])) }],
        };
        seq.apply_song(&song);
        assert_eq!(seq.settings().bpm, 90.0);
        assert_eq!(seq.tracks().len(), 1);
        assert_eq!(seq.track(0).unwrap().settings().volume, 50);
        assert!(seq.track(1).is_err());
    }
}
