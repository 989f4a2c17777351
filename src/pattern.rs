pub mod euclid;
pub mod trigger;

pub use trigger::TriggerPattern;
