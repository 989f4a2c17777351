//! Minimal publish/subscribe logging.
//!
//! The scheduling loop must never block or fail on output, so engine code
//! publishes messages here instead of printing. Subscribers (tests, a host
//! UI) drain them at their own pace; with no subscribers, messages at or
//! above the configured level go to stderr.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn from_u8(v: u8) -> Level {
        match v {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: Level,
    pub text: String,
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
static STDERR_LEVEL: AtomicU8 = AtomicU8::new(Level::Warn as u8);
static SUBSCRIBERS: Lazy<Mutex<Vec<(usize, Sender<LogMessage>)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// A subscription to console log messages.
///
/// Dropping this value unsubscribes it.
pub struct Subscription {
    id: usize,
    rx: Receiver<LogMessage>,
}

impl Subscription {
    pub fn drain(&self) -> Vec<LogMessage> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = SUBSCRIBERS.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|(id, _)| *id != self.id);
    }
}

pub fn subscribe() -> Subscription {
    let (tx, rx) = mpsc::channel();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    SUBSCRIBERS
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .push((id, tx));
    Subscription { id, rx }
}

/// Lowest level written to stderr when nobody is subscribed.
pub fn set_level(level: Level) {
    STDERR_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> Level {
    Level::from_u8(STDERR_LEVEL.load(Ordering::Relaxed))
}

pub fn debug(msg: impl Into<String>) {
    publish(Level::Debug, msg.into());
}

pub fn info(msg: impl Into<String>) {
    publish(Level::Info, msg.into());
}

pub fn warn(msg: impl Into<String>) {
    publish(Level::Warn, msg.into());
}

pub fn error(msg: impl Into<String>) {
    publish(Level::Error, msg.into());
}

fn publish(level: Level, text: String) {
    let message = LogMessage { level, text };

    let mut subs = SUBSCRIBERS.lock().unwrap_or_else(|p| p.into_inner());
    if subs.is_empty() {
        if message.level >= self::level() {
            eprintln!("{}", message.text);
        }
        return;
    }

    // Broadcast to all subscribers; drop any that have gone away.
    subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_receives_warn_messages() {
        let sub = subscribe();
        warn("hello");

        let msgs = sub.drain();
        assert!(msgs.iter().any(|m| m.level == Level::Warn && m.text == "hello"));
    }

    #[test]
    fn subscribers_see_debug_regardless_of_stderr_level() {
        let sub = subscribe();
        debug("resync track 3");

        let msgs = sub.drain();
        assert!(msgs
            .iter()
            .any(|m| m.level == Level::Debug && m.text == "resync track 3"));
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert_eq!(Level::from_u8(Level::Info as u8), Level::Info);
    }
}
