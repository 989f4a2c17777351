//! Chord to arpeggio expansion.

use fastrand::Rng;

use crate::model::note::ArpMode;

/// Orders `pitches` for playback in `mode`. `Order` and `Random` keep the
/// input's pitches as given (Random shuffles them); every other mode works on
/// the chord sorted ascending. `Chord` returns the sorted chord, meant to be
/// played as one group. `Off` returns the input unchanged.
pub fn expand(pitches: &[u8], mode: ArpMode, rng: &mut Rng) -> Vec<u8> {
    let mut sorted = pitches.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return sorted;
    }

    match mode {
        ArpMode::Off | ArpMode::Order => pitches.to_vec(),
        ArpMode::Random => {
            let mut out = pitches.to_vec();
            rng.shuffle(&mut out);
            out
        }
        ArpMode::Up | ArpMode::Chord => sorted,
        ArpMode::Down => sorted.into_iter().rev().collect(),
        ArpMode::UpDownInclusive => there_and_back(&sorted, true),
        ArpMode::UpDownExclusive => there_and_back(&sorted, false),
        ArpMode::DownUpInclusive => {
            let down: Vec<u8> = sorted.into_iter().rev().collect();
            there_and_back(&down, true)
        }
        ArpMode::DownUpExclusive => {
            let down: Vec<u8> = sorted.into_iter().rev().collect();
            there_and_back(&down, false)
        }
        ArpMode::OutsideIn => interleave_ends(&sorted, false),
        ArpMode::Converge => interleave_ends(&sorted, true),
        ArpMode::Diverge => interleave_ends(&sorted, false).into_iter().rev().collect(),
        ArpMode::InsideOut => interleave_ends(&sorted, true).into_iter().rev().collect(),
        ArpMode::Thumb => {
            let low = sorted[0];
            if n == 1 {
                return sorted;
            }
            sorted[1..].iter().flat_map(|&p| [low, p]).collect()
        }
        ArpMode::Pinky => {
            let high = sorted[n - 1];
            if n == 1 {
                return sorted;
            }
            sorted[..n - 1].iter().flat_map(|&p| [p, high]).collect()
        }
    }
}

/// `seq` then back again. Inclusive repeats both turning points.
fn there_and_back(seq: &[u8], inclusive: bool) -> Vec<u8> {
    let mut out = seq.to_vec();
    if inclusive {
        out.extend(seq.iter().rev());
    } else if seq.len() > 2 {
        out.extend(seq[1..seq.len() - 1].iter().rev());
    }
    out
}

/// Alternates between the outer ends, working inwards. The middle note of
/// an odd-length chord appears once.
fn interleave_ends(sorted: &[u8], high_first: bool) -> Vec<u8> {
    let n = sorted.len();
    let mut out = Vec::with_capacity(n);
    let (mut lo, mut hi) = (0usize, n - 1);
    while lo <= hi {
        if lo == hi {
            out.push(sorted[lo]);
            break;
        }
        if high_first {
            out.extend([sorted[hi], sorted[lo]]);
        } else {
            out.extend([sorted[lo], sorted[hi]]);
        }
        lo += 1;
        hi -= 1;
    }
    out
}
