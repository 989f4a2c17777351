//! Real-time step-sequencer core: a transport clock, per-track lookahead
//! schedulers and note expansion, driven cooperatively and emitting timed
//! note events to a sink.

pub mod clock;
pub mod console;
pub mod engine;
pub mod error;
pub mod model;
pub mod pattern;
pub mod storage;

pub use engine::Sequencer;
pub use error::EngineError;
