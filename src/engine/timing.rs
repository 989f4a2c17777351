use crate::clock::transport::MIDI_CLOCK_PPQ;

// --- Step timing helpers (pure, testable) ---

/// Length of one track step in quarter-note beats. Independent of tempo.
pub fn step_beats(steps_per_beat: f64, speed_multiplier: f64) -> f64 {
    1.0 / steps_per_beat.max(f64::EPSILON) / speed_multiplier.max(f64::EPSILON)
}

/// One MIDI clock pulse in ms.
pub fn clock_interval_ms(bpm: f64) -> f64 {
    60_000.0 / (bpm * MIDI_CLOCK_PPQ as f64)
}

/// Swing offset percentage for a step: only odd steps are delayed.
pub fn swing_percent(swing: f64, global_step: u64) -> f64 {
    if global_step % 2 == 1 { swing } else { 0.0 }
}

/// Note length when the note should last until the next firing step.
/// With a factor of exactly 1 the note ends one clock pulse early so the
/// retrigger never overlaps it.
pub fn max_duration_ms(factor: f64, steps_to_next: usize, step_ms: f64, bpm: f64) -> f64 {
    let full = factor * steps_to_next as f64 * step_ms;
    let trimmed = if factor == 1.0 { full - clock_interval_ms(bpm) } else { full };
    trimmed.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_beats_ignore_tempo() {
        assert_eq!(step_beats(4.0, 1.0), 0.25);
        assert_eq!(step_beats(4.0, 2.0), 0.125);
        assert_eq!(step_beats(1.0, 0.5), 2.0);
    }

    #[test]
    fn swing_only_touches_odd_steps() {
        assert_eq!(swing_percent(10.0, 0), 0.0);
        assert_eq!(swing_percent(10.0, 1), 10.0);
        assert_eq!(swing_percent(10.0, 6), 0.0);
    }

    #[test]
    fn max_duration_trims_a_pulse_at_unity() {
        let pulse = clock_interval_ms(120.0);
        assert!((max_duration_ms(1.0, 4, 125.0, 120.0) - (500.0 - pulse)).abs() < 1e-9);
        assert!((max_duration_ms(0.5, 4, 125.0, 120.0) - 250.0).abs() < 1e-9);
    }
}
