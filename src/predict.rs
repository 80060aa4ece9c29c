//! Forward tracking of a known state: upcoming blinks with their timing,
//! uncontrolled actor wait times and values derived from single outputs.

use crate::error::{RecoveryError, Result};
use crate::recovery::is_blink;
use crate::xorshift::Xorshift;
use serde::Serialize;

/// Seconds per player tick.
pub const PLAYER_TICK_SECONDS: f64 = 1.017;
/// Seconds added to every uncontrolled actor wait.
pub const INTERVAL_OFFSET_SECONDS: f64 = 0.285;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BlinkKind {
    None,
    Single,
    Double,
}

impl BlinkKind {
    pub fn from_output(r: u32) -> Self {
        match (is_blink(r), r & 1) {
            (false, _) => BlinkKind::None,
            (true, 0) => BlinkKind::Single,
            (true, _) => BlinkKind::Double,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PredictedBlink {
    /// Advances since the schedule's starting state, counting this tick.
    pub advance: u64,
    pub output: u32,
    pub kind: BlinkKind,
    /// Seconds from the start of the schedule.
    pub at: f64,
}

/// Endless per-tick predictions for the player, starting at the next output.
#[derive(Clone, Debug)]
pub struct BlinkSchedule {
    rng: Xorshift,
    advance: u64,
    tick: u64,
    tick_seconds: f64,
    actor_count: u64,
}

impl BlinkSchedule {
    pub fn new(state: Xorshift, tick_seconds: f64) -> Self {
        Self {
            rng: state,
            advance: 0,
            tick: 0,
            tick_seconds,
            actor_count: 0,
        }
    }

    /// Each tick additionally consumes one output per actor after the player's.
    pub fn with_actors(mut self, actor_count: usize) -> Self {
        self.actor_count = actor_count as u64;
        self
    }

    pub fn state(&self) -> &Xorshift {
        &self.rng
    }
}

impl Iterator for BlinkSchedule {
    type Item = PredictedBlink;

    fn next(&mut self) -> Option<Self::Item> {
        let output = self.rng.next_u32();
        self.rng.advance(self.actor_count);
        self.advance += 1 + self.actor_count;
        self.tick += 1;
        Some(PredictedBlink {
            advance: self.advance,
            output,
            kind: BlinkKind::from_output(output),
            at: self.tick as f64 * self.tick_seconds,
        })
    }
}

/// Endless waits of an uncontrolled actor, one output each:
/// `range_float(3, 12) + offset` seconds. Items are `(wait, cumulative)`.
#[derive(Clone, Debug)]
pub struct IntervalSchedule {
    rng: Xorshift,
    elapsed: f64,
    offset: f64,
}

impl IntervalSchedule {
    pub fn new(state: Xorshift, offset: f64) -> Self {
        Self {
            rng: state,
            elapsed: 0.0,
            offset,
        }
    }
}

impl Iterator for IntervalSchedule {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let wait = self.rng.range_float(3.0, 12.0) + self.offset;
        self.elapsed += wait;
        Some((wait, self.elapsed))
    }
}

/// Whole ticks covering `elapsed` seconds, rounded up.
pub fn ticks_elapsed(elapsed: f64, tick_seconds: f64) -> u64 {
    if elapsed <= 0.0 || tick_seconds <= 0.0 {
        return 0;
    }
    (elapsed / tick_seconds).ceil() as u64
}

/// Trainer identifiers derived from one output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TrainerIds {
    /// Six-digit displayed ID.
    pub g7tid: u32,
    pub tid: u16,
    pub sid: u16,
}

impl TrainerIds {
    pub fn from_output(r: u32) -> Self {
        let g7 = ((r as u64 % 0xFFFF_FFFF + 0x8000_0000) & 0xFFFF_FFFF) % 1_000_000;
        Self {
            g7tid: g7 as u32,
            tid: (r & 0xFFFF) as u16,
            sid: (r >> 16) as u16,
        }
    }
}

/// Walks backward from `state` until an output yields `g7tid`. Returns the
/// number of backward steps and the state reached.
pub fn find_backward(state: &Xorshift, g7tid: u32, limit: u64) -> Result<(u64, Xorshift, TrainerIds)> {
    let mut rng = *state;
    for step in 1..=limit {
        let ids = TrainerIds::from_output(rng.prev_u32());
        if ids.g7tid == g7tid {
            return Ok((step, rng, ids));
        }
    }
    Err(RecoveryError::Reidentification(format!(
        "trainer id {:06} not found within {} steps back",
        g7tid, limit
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_generator() {
        let start = Xorshift::new(0x12345678, 0x9ABCDEF0, 0x0F0F0F0F, 0xFF00FF00);
        let mut rng = start;
        let predicted: Vec<_> = BlinkSchedule::new(start, PLAYER_TICK_SECONDS).take(50).collect();
        for (i, p) in predicted.iter().enumerate() {
            let r = rng.next_u32();
            assert_eq!(p.output, r);
            assert_eq!(p.advance, i as u64 + 1);
            assert_eq!(p.kind, BlinkKind::from_output(r));
            assert!((p.at - (i + 1) as f64 * PLAYER_TICK_SECONDS).abs() < 1e-9);
        }
    }

    #[test]
    fn schedule_skips_actor_outputs() {
        let start = Xorshift::new(1, 2, 3, 4);
        let mut rng = start;
        let mut schedule = BlinkSchedule::new(start, 1.0).with_actors(2);
        for _ in 0..10 {
            let p = schedule.next().unwrap();
            let r = rng.next_u32();
            rng.advance(2);
            assert_eq!(p.output, r);
        }
        assert_eq!(schedule.state(), &rng);
    }

    #[test]
    fn blink_kinds() {
        assert_eq!(BlinkKind::from_output(0x10), BlinkKind::Single);
        assert_eq!(BlinkKind::from_output(0x11), BlinkKind::Double);
        assert_eq!(BlinkKind::from_output(0x12), BlinkKind::None);
    }

    #[test]
    fn interval_waits_in_range() {
        let waits: Vec<_> = IntervalSchedule::new(Xorshift::new(9, 8, 7, 6), INTERVAL_OFFSET_SECONDS)
            .take(100)
            .collect();
        let mut total = 0.0;
        for (wait, at) in waits {
            assert!((3.0 + INTERVAL_OFFSET_SECONDS..=12.0 + INTERVAL_OFFSET_SECONDS).contains(&wait));
            total += wait;
            assert!((at - total).abs() < 1e-9);
        }
    }

    #[test]
    fn tick_rounding() {
        assert_eq!(ticks_elapsed(0.0, 1.017), 0);
        assert_eq!(ticks_elapsed(1.0, 1.017), 1);
        assert_eq!(ticks_elapsed(2.1, 1.017), 3);
    }

    #[test]
    fn trainer_ids() {
        let ids = TrainerIds::from_output(0x1234_5678);
        assert_eq!(ids.tid, 0x5678);
        assert_eq!(ids.sid, 0x1234);
        assert_eq!(ids.g7tid, ((0x1234_5678u64 + 0x8000_0000) % 1_000_000) as u32);
        // the modulus folds 0xFFFFFFFF onto zero
        assert_eq!(TrainerIds::from_output(0xFFFF_FFFF).g7tid, (0x8000_0000u64 % 1_000_000) as u32);
    }

    #[test]
    fn finds_id_walking_back() {
        let start = Xorshift::new(0xAAAA5555, 0x12121212, 0x0F0F0F0F, 0x33CC33CC);
        let mut rng = start;
        rng.advance(300);
        // output 120 steps before the end
        let mut earlier = rng;
        earlier.retreat(119);
        let target = TrainerIds::from_output(earlier.prev_u32());
        let (steps, state, ids) = find_backward(&rng, target.g7tid, 10_000).unwrap();
        assert_eq!(ids.g7tid, target.g7tid);
        assert!(steps <= 120);
        let mut check = state;
        check.advance(steps);
        assert_eq!(check, rng);
    }
}
