use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("no track with id {0}")]
    UnknownTrack(usize),
    #[error("note {pitch} on channel {channel} due at {due_ms:.1}ms is {late_ms:.1}ms in the past; dropped")]
    EventInPast {
        channel: u8,
        pitch: u8,
        due_ms: f64,
        late_ms: f64,
    },
}
