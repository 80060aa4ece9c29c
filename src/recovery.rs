// Copyright (c) 2024, The xorshift-recover Project Authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright
//       notice, this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above
//       copyright notice, this list of conditions and the following disclaimer
//       in the documentation and/or other materials provided with the
//       distribution.
//
//     * Neither the name of the copyright holder nor the names of its
//       contributors may be used to endorse or promote products derived from
//       this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # State Recovery
//!
//! Recovers the full generator state from a run of observations: the
//! observations are encoded as GF(2) equations, solved, and the candidate
//! is only accepted once re-simulating it reproduces every observation.

use crate::error::{RecoveryError, Result};
use crate::gf2::{solve, TransitionModel};
use crate::observation::{
    validate_durations, BlinkObservation, ObservationEncoder, FRAMES_PER_SECOND,
    INTERVAL_MAX_FRAMES, INTERVAL_MIN_FRAMES,
};
use crate::xorshift::{float_range, Xorshift};
use log::{debug, info, warn};

/// Bits 1..3 of an output must be clear for a blink to happen.
pub const BLINK_MASK: u32 = 0b1110;

#[inline]
pub fn is_blink(output: u32) -> bool {
    output & BLINK_MASK == 0
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoverySettings {
    /// Blinks (after the warm-up) encoded into the equation system.
    pub blink_rows: usize,
    /// Safe interval samples encoded into the equation system.
    pub safe_samples: usize,
    /// Seconds added to every observed interval to undo capture latency.
    pub latency_correction: f64,
    /// Largest accepted difference between an observed and predicted interval.
    pub interval_tolerance: f64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            blink_rows: 39,
            safe_samples: 36,
            latency_correction: 0.048,
            interval_tolerance: 0.1,
        }
    }
}

/// A validated state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recovered {
    /// State positioned so that its next output is the last observed event.
    pub state: Xorshift,
    /// Steps between the solved state and `state`.
    pub advances: u64,
    /// Actor distance under which the observations were reproduced.
    pub distance: usize,
}

pub struct StateRecovery {
    model: TransitionModel,
    settings: RecoverySettings,
}

impl Default for StateRecovery {
    fn default() -> Self {
        Self::new(RecoverySettings::default())
    }
}

impl StateRecovery {
    pub fn new(settings: RecoverySettings) -> Self {
        Self {
            model: TransitionModel::new(),
            settings,
        }
    }

    /// Recovers the state from player blinks.
    ///
    /// The first observation's gap is discarded. With `actor_count`
    /// uncontrolled actors each tick consumes `actor_count + 1` outputs.
    /// A zero gap is accepted; it repeats the previous blink's equations and
    /// such input is then settled by validation.
    pub fn recover_from_blinks(
        &self,
        observations: &[BlinkObservation],
        actor_count: usize,
    ) -> Result<Recovered> {
        let rows = self.settings.blink_rows;
        if observations.len() < rows + 1 {
            return Err(RecoveryError::InputContract(format!(
                "need at least {} blinks, got {}",
                rows + 1,
                observations.len()
            )));
        }
        let stride = actor_count as u64 + 1;
        let mut gaps = Vec::with_capacity(observations.len() - 1);
        for obs in &observations[1..] {
            let scaled = obs
                .gap
                .checked_mul(stride)
                .ok_or("blink gap overflows the advance counter")?;
            gaps.push(scaled);
        }
        let span = gaps
            .iter()
            .try_fold(0u64, |acc, &g| acc.checked_add(g))
            .ok_or("observed span overflows the advance counter")?;
        let flags: Vec<bool> = observations.iter().map(|o| o.double).collect();

        let system = ObservationEncoder::new(&self.model).blink_system(&flags, &gaps, rows)?;
        let candidate = solve(system)?;
        debug!("blink candidate {}", candidate);

        for distance in 0..=actor_count {
            if blinks_match(&candidate, span, stride, distance as u64, &flags) {
                let advances = span + distance as u64;
                let mut state = candidate;
                state.advance(advances);
                info!(
                    "recovered state {} from {} blinks (distance {})",
                    state,
                    observations.len(),
                    distance
                );
                return Ok(Recovered {
                    state,
                    advances,
                    distance,
                });
            }
        }
        warn!("candidate {} does not reproduce the observed blinks", candidate);
        Err(RecoveryError::RecoveryValidation { candidate })
    }

    /// Recovers the state from the wait times between an uncontrolled
    /// actor's blinks, one generator step per interval. The first interval
    /// is discarded.
    pub fn recover_from_intervals(&self, intervals: &[f64]) -> Result<Recovered> {
        validate_durations(intervals)?;
        if intervals.len() < 2 {
            return Err(RecoveryError::InputContract(
                "need at least two intervals".into(),
            ));
        }
        let corrected: Vec<f64> = intervals[1..]
            .iter()
            .map(|d| d + self.settings.latency_correction)
            .collect();

        let samples = ObservationEncoder::new(&self.model)
            .interval_system(&corrected, self.settings.safe_samples)?;
        debug!(
            "using {} safe intervals, skipped {}",
            samples.indices.len(),
            samples.skipped
        );
        let candidate = solve(samples.equations)?;

        let mut rng = candidate;
        let tolerance = self.settings.interval_tolerance;
        let mismatch = corrected.iter().position(|&observed| {
            let predicted =
                float_range(rng.next_u32(), INTERVAL_MIN_FRAMES, INTERVAL_MAX_FRAMES)
                    / FRAMES_PER_SECOND;
            (observed - predicted).abs() >= tolerance
        });
        if let Some(i) = mismatch {
            warn!("candidate {} mispredicts interval {}", candidate, i);
            return Err(RecoveryError::RecoveryValidation { candidate });
        }

        let advances = corrected.len() as u64;
        let mut state = candidate;
        state.advance(advances);
        info!("recovered state {} from {} intervals", state, intervals.len());
        Ok(Recovered {
            state,
            advances,
            distance: 0,
        })
    }
}

/// Replays `span` outputs and checks that the blink-eligible outputs seen by
/// the player (every `stride`-th output from `distance`) carry exactly the
/// observed flags, the last observation excluded.
fn blinks_match(candidate: &Xorshift, span: u64, stride: u64, distance: u64, flags: &[bool]) -> bool {
    let mut rng = *candidate;
    let mut expected = flags[..flags.len() - 1].iter();
    for i in 0..span {
        let r = rng.next_u32();
        if i % stride != distance || !is_blink(r) {
            continue;
        }
        match expected.next() {
            Some(&double) if double == (r & 1 == 1) => {}
            _ => return false,
        }
    }
    expected.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(start: Xorshift, count: usize) -> Vec<BlinkObservation> {
        let mut rng = start;
        let mut out = Vec::new();
        let mut gap = 5;
        while out.len() < count {
            let r = rng.next_u32();
            gap += 1;
            if is_blink(r) {
                out.push(BlinkObservation {
                    double: r & 1 == 1,
                    gap,
                });
                gap = 0;
            }
        }
        out
    }

    #[test]
    fn too_few_blinks_is_input_error() {
        let rec = StateRecovery::default();
        let obs = observe(Xorshift::new(1, 2, 3, 4), 10);
        assert!(matches!(
            rec.recover_from_blinks(&obs, 0),
            Err(RecoveryError::InputContract(_))
        ));
    }

    #[test]
    fn zero_gap_reaches_the_solver() {
        let rec = StateRecovery::default();
        let mut obs = observe(Xorshift::new(5, 6, 7, 8), 40);
        obs[7].gap = 0;
        let res = rec.recover_from_blinks(&obs, 0);
        assert!(matches!(
            res,
            Err(RecoveryError::RecoveryValidation { .. }) | Err(RecoveryError::MatrixSingular { .. })
        ));
    }

    #[test]
    fn zero_warmup_gap_is_fine() {
        let truth = Xorshift::new(0x0F1E2D3C, 0x4B5A6978, 0x8796A5B4, 0xC3D2E1F0);
        let mut obs = observe(truth, 40);
        obs[0].gap = 0;
        assert!(StateRecovery::default().recover_from_blinks(&obs, 0).is_ok());
    }

    #[test]
    fn recovers_blinks_without_actors() {
        let truth = Xorshift::new(0x12345678, 0x9ABCDEF0, 0x0F0F0F0F, 0xFF00FF00);
        let obs = observe(truth, 40);
        let rec = StateRecovery::default();
        let recovered = rec.recover_from_blinks(&obs, 0).unwrap();
        // the first blink is the first output of the solved state
        let mut expected = truth;
        let mut steps = 0u64;
        while !is_blink(expected.next_u32()) {
            steps += 1;
        }
        expected.prev_u32();
        expected.advance(recovered.advances);
        assert_eq!(recovered.state, expected);
        assert_eq!(recovered.distance, 0);
        assert!(steps < 1000);
    }

    #[test]
    fn corrupted_flag_fails_validation() {
        let truth = Xorshift::new(0xDEADBEEF, 0x13579BDF, 0x2468ACE0, 0x0BADF00D);
        let mut obs = observe(truth, 45);
        // flip a flag that is not part of the equation system
        obs[42].double = !obs[42].double;
        let rec = StateRecovery::default();
        assert!(matches!(
            rec.recover_from_blinks(&obs, 0),
            Err(RecoveryError::RecoveryValidation { .. })
        ));
    }

    #[test]
    fn too_few_intervals_is_input_error() {
        let rec = StateRecovery::default();
        assert!(rec.recover_from_intervals(&[4.0]).is_err());
        assert!(rec.recover_from_intervals(&[4.0; 20]).is_err());
        assert!(rec.recover_from_intervals(&[4.0, f64::NAN]).is_err());
    }
}
