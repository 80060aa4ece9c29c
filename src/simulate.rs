//! Deterministic observation generator.
//!
//! Plays the observed system forward from a known state and records what a
//! perfect detector would have seen, together with the ground-truth states.

use crate::observation::{
    BlinkObservation, FRAMES_PER_SECOND, INTERVAL_MAX_FRAMES, INTERVAL_MIN_FRAMES,
};
use crate::recovery::is_blink;
use crate::xorshift::{float_range, Xorshift};

#[derive(Clone, Debug)]
pub struct BlinkRun {
    pub observations: Vec<BlinkObservation>,
    /// State just before the first blink's output.
    pub first_blink_state: Xorshift,
    /// State just before the last blink's output.
    pub last_blink_state: Xorshift,
    pub final_state: Xorshift,
}

/// Records `count` player blinks. Every tick the player draws one output
/// and each of `actor_count` actors draws one after it. The first gap counts
/// `warmup_ticks` extra ticks.
pub fn simulate_blinks(
    start: Xorshift,
    count: usize,
    actor_count: usize,
    warmup_ticks: u64,
) -> BlinkRun {
    let mut rng = start;
    let mut observations = Vec::with_capacity(count);
    let mut first = None;
    let mut last = start;
    let mut gap = warmup_ticks;
    while observations.len() < count {
        let before = rng;
        let r = rng.next_u32();
        rng.advance(actor_count as u64);
        gap += 1;
        if is_blink(r) {
            observations.push(BlinkObservation {
                double: r & 1 == 1,
                gap,
            });
            first.get_or_insert(before);
            last = before;
            gap = 0;
        }
    }
    BlinkRun {
        observations,
        first_blink_state: first.unwrap_or(start),
        last_blink_state: last,
        final_state: rng,
    }
}

#[derive(Clone, Debug)]
pub struct IntervalRun {
    /// Warm-up value followed by one duration per output.
    pub intervals: Vec<f64>,
    pub final_state: Xorshift,
}

/// Records `count` actor wait times, each observed `latency` seconds short.
pub fn simulate_intervals(start: Xorshift, count: usize, latency: f64) -> IntervalRun {
    let mut rng = start;
    let mut intervals = Vec::with_capacity(count + 1);
    intervals.push(1.0);
    for _ in 0..count {
        let frames = float_range(rng.next_u32(), INTERVAL_MIN_FRAMES, INTERVAL_MAX_FRAMES);
        intervals.push(frames / FRAMES_PER_SECOND - latency);
    }
    IntervalRun {
        intervals,
        final_state: rng,
    }
}

#[derive(Clone, Debug)]
pub struct NoisyRun {
    /// Blink eligibility of each observed tick.
    pub timeline: Vec<bool>,
    pub extras: u64,
    /// Total advances from the starting state.
    pub advances: u64,
    pub final_state: Xorshift,
}

/// Skips `offset` outputs, then observes `ticks` player ticks. Before each
/// tick `inject(tick, &state)` decides whether an unobserved actor draws
/// one output first.
pub fn simulate_noisy<F>(start: Xorshift, offset: u64, ticks: usize, mut inject: F) -> NoisyRun
where
    F: FnMut(usize, &Xorshift) -> bool,
{
    let mut rng = start;
    rng.advance(offset);
    let mut timeline = Vec::with_capacity(ticks);
    let mut extras = 0;
    for tick in 0..ticks {
        if inject(tick, &rng) {
            rng.next_u32();
            extras += 1;
        }
        timeline.push(is_blink(rng.next_u32()));
    }
    NoisyRun {
        timeline,
        extras,
        advances: offset + ticks as u64 + extras,
        final_state: rng,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blink_gaps_count_ticks() {
        let start = Xorshift::new(11, 22, 33, 44);
        let run = simulate_blinks(start, 20, 0, 3);
        assert_eq!(run.observations.len(), 20);
        let total: u64 = run.observations.iter().map(|o| o.gap).sum();
        let mut check = start;
        check.advance(total - 3);
        assert_eq!(check, run.final_state);
        let mut last = run.last_blink_state;
        assert!(is_blink(last.next_u32()));
        assert_eq!(last, run.final_state);
    }

    #[test]
    fn actors_consume_outputs() {
        let start = Xorshift::new(1, 1, 1, 1);
        let run = simulate_blinks(start, 5, 2, 0);
        let ticks: u64 = run.observations.iter().map(|o| o.gap).sum();
        let mut check = start;
        check.advance(ticks * 3);
        assert_eq!(check, run.final_state);
    }

    #[test]
    fn noisy_counts_extras() {
        let run = simulate_noisy(Xorshift::new(5, 4, 3, 2), 10, 50, |t, _| t % 10 == 5);
        assert_eq!(run.extras, 5);
        assert_eq!(run.advances, 65);
        assert_eq!(run.timeline.len(), 50);
    }
}
