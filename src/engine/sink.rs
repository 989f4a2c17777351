//! Output side of the engine. Channels are 0..=15, pitches and velocities
//! 0..=127; the sequencer clamps before calling.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::clock::TimeSource;
use crate::console;

pub trait NoteSink {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, pitch: u8);
    fn clock_pulse(&mut self) {}
    fn transport_start(&mut self) {}
    fn transport_stop(&mut self) {}
    /// Panic button: silence everything still sounding downstream.
    fn all_notes_off(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NoteSink for NullSink {
    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {}
    fn note_off(&mut self, _channel: u8, _pitch: u8) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    Clock,
    Start,
    Stop,
    AllNotesOff,
}

/// A sink message stamped with the time source's reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SinkMessage {
    pub at_ms: f64,
    #[serde(flatten)]
    pub event: SinkEvent,
}

impl SinkMessage {
    pub fn is_note_on(&self) -> bool {
        matches!(self.event, SinkEvent::NoteOn { .. })
    }
}

/// Keeps every message in memory. Clones share the log.
#[derive(Debug, Clone)]
pub struct RecordingSink<T> {
    time: T,
    log: Rc<RefCell<Vec<SinkMessage>>>,
}

impl<T: TimeSource> RecordingSink<T> {
    pub fn new(time: T) -> Self {
        Self { time, log: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn messages(&self) -> Vec<SinkMessage> {
        self.log.borrow().clone()
    }

    pub fn note_ons(&self) -> Vec<SinkMessage> {
        self.log.borrow().iter().filter(|m| m.is_note_on()).copied().collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, event: SinkEvent) {
        let at_ms = self.time.now();
        self.log.borrow_mut().push(SinkMessage { at_ms, event });
    }
}

impl<T: TimeSource> NoteSink for RecordingSink<T> {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.record(SinkEvent::NoteOn { channel, pitch, velocity });
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        self.record(SinkEvent::NoteOff { channel, pitch });
    }

    fn clock_pulse(&mut self) {
        self.record(SinkEvent::Clock);
    }

    fn transport_start(&mut self) {
        self.record(SinkEvent::Start);
    }

    fn transport_stop(&mut self) {
        self.record(SinkEvent::Stop);
    }

    fn all_notes_off(&mut self) {
        self.record(SinkEvent::AllNotesOff);
    }
}

/// Writes one JSON object per message.
pub struct JsonLinesSink<W, T> {
    out: W,
    time: T,
    failed: bool,
}

impl<W: Write, T: TimeSource> JsonLinesSink<W, T> {
    pub fn new(out: W, time: T) -> Self {
        Self { out, time, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: SinkEvent) {
        let msg = SinkMessage { at_ms: self.time.now(), event };
        let res = serde_json::to_writer(&mut self.out, &msg)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(e) = res {
            // report once; a closed pipe would otherwise flood stderr
            if !self.failed {
                console::error(format!("sink write failed: {}", e));
                self.failed = true;
            }
        }
    }
}

impl<W: Write, T: TimeSource> NoteSink for JsonLinesSink<W, T> {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.emit(SinkEvent::NoteOn { channel, pitch, velocity });
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        self.emit(SinkEvent::NoteOff { channel, pitch });
    }

    fn clock_pulse(&mut self) {
        self.emit(SinkEvent::Clock);
    }

    fn transport_start(&mut self) {
        self.emit(SinkEvent::Start);
    }

    fn transport_stop(&mut self) {
        self.emit(SinkEvent::Stop);
        let _ = self.out.flush();
    }

    fn all_notes_off(&mut self) {
        self.emit(SinkEvent::AllNotesOff);
    }
}
