pub mod source;
pub mod transport;

pub use source::{ManualClock, SystemClock, TimeSource};
pub use transport::{ClockEvent, TransportClock, TransportPosition};
