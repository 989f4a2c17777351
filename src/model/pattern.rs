use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Which steps of a track fire. The built, immutable form lives in
/// `pattern::trigger::TriggerPattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TriggerSettings {
    /// Never fires.
    #[default]
    Init,
    /// 4-bit numbers, most significant bit first; `None` is a 4-step rest.
    Binary(Vec<Option<u8>>),
    Euclidean { length: u32, hits: u32, shift: u32 },
    /// Active step indices of a fixed 16-step bar.
    Step(BTreeSet<u8>),
}

impl TriggerSettings {
    pub fn binary(nibbles: impl IntoIterator<Item = u8>) -> Self {
        TriggerSettings::Binary(nibbles.into_iter().map(Some).collect())
    }

    pub fn euclidean(length: u32, hits: u32, shift: u32) -> Self {
        TriggerSettings::Euclidean { length, hits, shift }.clamped()
    }

    pub fn steps(indices: impl IntoIterator<Item = u8>) -> Self {
        TriggerSettings::Step(indices.into_iter().collect::<BTreeSet<u8>>()).clamped()
    }

    /// Forces every payload into its valid range: nibbles to 4 bits,
    /// `hits <= length`, `shift < length`, step indices below 16.
    pub fn clamped(&self) -> Self {
        match self {
            TriggerSettings::Init => TriggerSettings::Init,
            TriggerSettings::Binary(nibbles) => {
                TriggerSettings::Binary(nibbles.iter().map(|n| n.map(|v| v & 0x0f)).collect())
            }
            TriggerSettings::Euclidean { length, hits, shift } => {
                let length = (*length).clamp(1, 64);
                TriggerSettings::Euclidean {
                    length,
                    hits: (*hits).min(length),
                    shift: shift % length,
                }
            }
            TriggerSettings::Step(indices) => {
                TriggerSettings::Step(indices.iter().copied().filter(|i| *i < 16).collect())
            }
        }
    }
}
