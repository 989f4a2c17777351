use crate::model::pattern::TriggerSettings;

use super::euclid::euclidean;

/// Step count of a `Step` pattern.
pub const STEP_PATTERN_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Init,
    Binary,
    Euclidean,
    Step,
}

/// Built, immutable form of `TriggerSettings`: which steps of one pattern
/// cycle fire. Gaps between firing steps and firing ordinals are
/// precomputed at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPattern {
    kind: TriggerKind,
    steps: Vec<bool>,
    /// For each step, distance to the next firing step (wrapping).
    gaps: Vec<usize>,
    /// For each firing step, its index among the firing steps.
    ordinals: Vec<Option<usize>>,
    hits: usize,
}

impl TriggerPattern {
    pub fn build(settings: &TriggerSettings) -> Self {
        match settings.clamped() {
            TriggerSettings::Init => Self::init(),
            TriggerSettings::Binary(nibbles) => Self::from_steps(TriggerKind::Binary, expand_nibbles(&nibbles)),
            TriggerSettings::Euclidean { length, hits, shift } => Self::from_steps(
                TriggerKind::Euclidean,
                euclidean(length as usize, hits as usize, shift as usize),
            ),
            TriggerSettings::Step(indices) => {
                let mut steps = vec![false; STEP_PATTERN_LENGTH];
                for i in indices {
                    steps[i as usize] = true;
                }
                Self::from_steps(TriggerKind::Step, steps)
            }
        }
    }

    /// The pattern that never fires.
    pub fn init() -> Self {
        Self::from_steps(TriggerKind::Init, Vec::new())
    }

    fn from_steps(kind: TriggerKind, steps: Vec<bool>) -> Self {
        let len = steps.len();
        let hits = steps.iter().filter(|s| **s).count();

        let mut ordinals = vec![None; len];
        let mut n = 0;
        for (i, fires) in steps.iter().enumerate() {
            if *fires {
                ordinals[i] = Some(n);
                n += 1;
            }
        }

        let gaps = (0..len)
            .map(|i| {
                (1..=len)
                    .find(|d| steps[(i + d) % len])
                    .unwrap_or(len)
            })
            .collect();

        Self { kind, steps, gaps, ordinals, hits }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    /// Pattern period in steps; 0 for `Init`.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn hit_count(&self) -> usize {
        self.hits
    }

    pub fn should_trigger(&self, step: usize) -> bool {
        match self.len() {
            0 => false,
            len => self.steps[step % len],
        }
    }

    /// Steps from `step` to the next firing step, wrapping past the end of
    /// the pattern. A lone firing step is `len()` away from itself.
    pub fn steps_until_next_trigger(&self, step: usize) -> usize {
        match self.len() {
            0 => 1,
            len => self.gaps[step % len],
        }
    }

    /// Index of `step` among the pattern's firing steps.
    pub fn trigger_ordinal(&self, step: usize) -> Option<usize> {
        match self.len() {
            0 => None,
            len => self.ordinals[step % len],
        }
    }

    pub fn render(&self) -> String {
        self.steps.iter().map(|&b| if b { 'x' } else { '.' }).collect()
    }
}

impl Default for TriggerPattern {
    fn default() -> Self {
        Self::init()
    }
}

/// Each number contributes four steps, most significant bit first. A missing
/// number is a four-step rest.
fn expand_nibbles(nibbles: &[Option<u8>]) -> Vec<bool> {
    nibbles
        .iter()
        .flat_map(|n| {
            let bits = n.unwrap_or(0);
            (0..4).rev().map(move |b| bits & (1 << b) != 0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_never_fires() {
        let p = TriggerPattern::build(&TriggerSettings::Init);
        assert_eq!(p.len(), 0);
        assert!(!p.should_trigger(0));
        assert!(!p.should_trigger(17));
        assert_eq!(p.trigger_ordinal(0), None);
    }

    #[test]
    fn binary_expands_msb_first() {
        let p = TriggerPattern::build(&TriggerSettings::binary([8, 5]));
        assert_eq!(p.render(), "x....x.x");
        assert_eq!(p.kind(), TriggerKind::Binary);
        assert!(p.should_trigger(8));
    }

    #[test]
    fn binary_rest_keeps_addressing() {
        let p = TriggerPattern::build(&TriggerSettings::Binary(vec![Some(8), None, Some(1)]));
        assert_eq!(p.len(), 12);
        assert_eq!(p.render(), "x..........x");
        assert!(p.should_trigger(11));
    }

    #[test]
    fn euclidean_spreads_hits() {
        let p = TriggerPattern::build(&TriggerSettings::euclidean(16, 4, 0));
        assert_eq!(p.hit_count(), 4);
        assert_eq!(p.render(), "x...x...x...x...");
        let shifted = TriggerPattern::build(&TriggerSettings::euclidean(16, 4, 1));
        assert_eq!(shifted.render(), "...x...x...x...x");
    }

    #[test]
    fn euclidean_extremes() {
        let none = TriggerPattern::build(&TriggerSettings::euclidean(8, 0, 0));
        assert!((0..8).all(|i| !none.should_trigger(i)));
        let all = TriggerPattern::build(&TriggerSettings::euclidean(8, 8, 0));
        assert!((0..8).all(|i| all.should_trigger(i)));
    }

    #[test]
    fn step_pattern_has_fixed_length() {
        let p = TriggerPattern::build(&TriggerSettings::steps([0, 3, 15]));
        assert_eq!(p.len(), 16);
        assert!(p.should_trigger(3));
        assert!(p.should_trigger(15));
        assert!(!p.should_trigger(4));
    }

    #[test]
    fn gaps_wrap_around_the_last_hit() {
        let p = TriggerPattern::build(&TriggerSettings::steps([0, 4, 10]));
        assert_eq!(p.steps_until_next_trigger(0), 4);
        assert_eq!(p.steps_until_next_trigger(4), 6);
        assert_eq!(p.steps_until_next_trigger(10), 6);

        let single = TriggerPattern::build(&TriggerSettings::binary([8]));
        assert_eq!(single.steps_until_next_trigger(0), 4);
    }

    #[test]
    fn ordinals_count_firing_steps() {
        let p = TriggerPattern::build(&TriggerSettings::steps([2, 5, 9]));
        assert_eq!(p.trigger_ordinal(2), Some(0));
        assert_eq!(p.trigger_ordinal(5), Some(1));
        assert_eq!(p.trigger_ordinal(9), Some(2));
        assert_eq!(p.trigger_ordinal(3), None);
        assert_eq!(p.trigger_ordinal(18), Some(0));
    }
}
