use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::EngineError;

/// One sounding note produced by a track: a note-on at `time_ms` and a
/// note-off `duration_ms` later. Channel is 0-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNoteEvent {
    pub time_ms: f64,
    pub duration_ms: f64,
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

impl ScheduledNoteEvent {
    pub fn end_ms(&self) -> f64 {
        self.time_ms + self.duration_ms.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteMessage {
    On { velocity: u8 },
    Off,
}

/// A due sink message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedNote {
    pub at_ms: f64,
    pub track: usize,
    pub channel: u8,
    pub pitch: u8,
    pub message: NoteMessage,
    seq: u64,
}

impl QueuedNote {
    fn rank(&self) -> u8 {
        match self.message {
            NoteMessage::Off => 0,
            NoteMessage::On { .. } => 1,
        }
    }
}

impl Eq for QueuedNote {}

impl Ord for QueuedNote {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at_ms
            .total_cmp(&other.at_ms)
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueuedNote {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Global event queue. Pops in due-time order; at equal times note-offs go
/// first so a retrigger of the same pitch is not cut by its predecessor.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueuedNote>>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the on/off pair for `event`. Events starting more than
    /// `tolerance_ms` before `now_ms` are refused.
    pub fn push(
        &mut self,
        track: usize,
        event: ScheduledNoteEvent,
        now_ms: f64,
        tolerance_ms: f64,
    ) -> Result<(), EngineError> {
        let late_ms = now_ms - event.time_ms;
        if late_ms > tolerance_ms {
            return Err(EngineError::EventInPast {
                channel: event.channel,
                pitch: event.pitch,
                due_ms: event.time_ms,
                late_ms,
            });
        }
        self.insert(track, &event, event.time_ms, NoteMessage::On { velocity: event.velocity });
        self.insert(track, &event, event.end_ms(), NoteMessage::Off);
        Ok(())
    }

    fn insert(&mut self, track: usize, event: &ScheduledNoteEvent, at_ms: f64, message: NoteMessage) {
        self.seq += 1;
        self.heap.push(Reverse(QueuedNote {
            at_ms,
            track,
            channel: event.channel,
            pitch: event.pitch,
            message,
            seq: self.seq,
        }));
    }

    /// Next message due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: f64) -> Option<QueuedNote> {
        match self.heap.peek() {
            Some(Reverse(next)) if next.at_ms <= now_ms => self.heap.pop().map(|Reverse(n)| n),
            _ => None,
        }
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(n)| n.at_ms)
    }

    /// Drops every queued message of `track`.
    pub fn remove_track(&mut self, track: usize) {
        self.heap.retain(|Reverse(n)| n.track != track);
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
