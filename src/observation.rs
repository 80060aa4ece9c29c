//! Turns side-channel observations into GF(2) equations.
//!
//! Two kinds of samples are supported. Blink samples carry the low output
//! nibble directly: a blink only happens when bits 1..3 of the output are
//! zero and bit 0 tells whether it was a double blink. Interval samples are
//! wait times derived from the 23-bit float mantissa of an output, of which
//! the top nibble can be recovered as long as the sample does not sit close
//! to a nibble boundary.

use crate::error::{RecoveryError, Result};
use crate::gf2::{output_rows, EquationSystem, TransitionModel};
use crate::xorshift::FLOAT_MASK;
use log::debug;
use serde::{Deserialize, Serialize};

/// One detected blink and the ticks elapsed since the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlinkObservation {
    pub double: bool,
    pub gap: u64,
}

/// Frame rate the interval durations were generated against.
pub const FRAMES_PER_SECOND: f64 = 30.0;
/// Float range (in frames) of a single interval.
pub const INTERVAL_MIN_FRAMES: f64 = 100.0;
pub const INTERVAL_MAX_FRAMES: f64 = 370.0;
/// Highest mantissa bit an interval sample reveals.
pub const INTERVAL_TOP_BIT: usize = 22;
const NIBBLE_SHIFT: u32 = 19;

/// Durations (seconds) bracketing every nibble boundary of the interval
/// range by 0.1 s. A duration whose insertion point is odd sits inside one
/// of these brackets and may decode to the neighbouring nibble.
pub static SAFETY_BOUNDARIES: [f64; 33] = [
    0.0,
    3.4333333333333336,
    3.795832327504833,
    3.995832327504833,
    4.358332394560066,
    4.558332394560066,
    4.9208324616153,
    5.120832461615299,
    5.483332528670533,
    5.683332528670532,
    6.045832595725767,
    6.2458325957257665,
    6.608332662781,
    6.808332662780999,
    7.170832729836233,
    7.370832729836232,
    7.733332796891467,
    7.933332796891467,
    8.2958328639467,
    8.4958328639467,
    8.858332931001934,
    9.058332931001933,
    9.420832998057167,
    9.620832998057166,
    9.9833330651124,
    10.1833330651124,
    10.545833132167635,
    10.745833132167634,
    11.108333199222866,
    11.308333199222865,
    11.6708332662781,
    11.8708332662781,
    12.233333333333334,
];

/// Expands blink flags into `[0, 0, 0, double]` groups, oldest first.
pub fn blink_nibbles(flags: &[bool]) -> Vec<bool> {
    flags
        .iter()
        .flat_map(|&double| [false, false, false, double])
        .collect()
}

/// Inverse of [`crate::xorshift::float_range`] on the mantissa.
pub fn reverse_float_range(value: f64, lo: f64, hi: f64) -> u32 {
    let norm = (hi - value) / (hi - lo);
    ((norm * 8_388_607.0) as i64 & FLOAT_MASK as i64) as u32
}

/// The top mantissa nibble encoded by an interval duration in seconds.
pub fn interval_nibble(duration: f64) -> u8 {
    let frames = duration * FRAMES_PER_SECOND;
    (reverse_float_range(frames, INTERVAL_MIN_FRAMES, INTERVAL_MAX_FRAMES) >> NIBBLE_SHIFT) as u8
}

/// Whether `duration` is far enough from a nibble boundary to be trusted.
pub fn is_safe(duration: f64) -> bool {
    SAFETY_BOUNDARIES.partition_point(|&b| b <= duration) % 2 == 0
}

pub fn validate_durations(durations: &[f64]) -> Result<()> {
    for (i, d) in durations.iter().enumerate() {
        if !d.is_finite() || *d < 0.0 {
            return Err(RecoveryError::InputContract(format!(
                "interval {} is {}, expected a finite non-negative duration",
                i, d
            )));
        }
    }
    Ok(())
}

/// Safe interval samples and the equations they produced.
#[derive(Debug)]
pub struct SafeSamples {
    pub equations: EquationSystem,
    /// Positions of the accepted samples in the input.
    pub indices: Vec<usize>,
    pub skipped: usize,
}

pub struct ObservationEncoder<'a> {
    model: &'a TransitionModel,
}

impl<'a> ObservationEncoder<'a> {
    pub fn new(model: &'a TransitionModel) -> Self {
        Self { model }
    }

    /// Equations for `row_count` blinks. `gaps[i]` is the number of
    /// generator steps between blink `i` and blink `i + 1`.
    pub fn blink_system(
        &self,
        flags: &[bool],
        gaps: &[u64],
        row_count: usize,
    ) -> Result<EquationSystem> {
        if flags.len() < row_count {
            return Err(RecoveryError::InputContract(format!(
                "need {} blinks, got {}",
                row_count,
                flags.len()
            )));
        }
        let rows = self.model.reference_rows(gaps, row_count)?;
        EquationSystem::from_parts(&rows, &blink_nibbles(&flags[..row_count]))
    }

    /// Walks the samples oldest first, one generator step per sample, and
    /// keeps the first `count` safe ones.
    pub fn interval_system(&self, durations: &[f64], count: usize) -> Result<SafeSamples> {
        validate_durations(durations)?;
        let step = self.model.step_matrix();
        let mut base = step.clone();
        let mut equations = EquationSystem::with_capacity(4 * count);
        let mut indices = Vec::with_capacity(count);
        let mut skipped = 0;

        for (i, &d) in durations.iter().enumerate() {
            if indices.len() == count {
                break;
            }
            if is_safe(d) {
                let nibble = interval_nibble(d);
                let rows = output_rows(&base, INTERVAL_TOP_BIT);
                equations.extend(
                    rows.iter()
                        .enumerate()
                        .map(|(b, &row)| (row, (nibble >> (3 - b)) & 1 == 1)),
                );
                indices.push(i);
            } else {
                debug!("skipping interval {} ({:.4}s) near a nibble boundary", i, d);
                skipped += 1;
            }
            base = base.mul(step);
        }

        if indices.len() < count {
            return Err(RecoveryError::InputContract(format!(
                "only {} safe intervals out of {}, need {}",
                indices.len(),
                durations.len(),
                count
            )));
        }
        Ok(SafeSamples {
            equations,
            indices,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xorshift::float_range;

    #[test]
    fn nibbles_are_zero_padded() {
        assert_eq!(
            blink_nibbles(&[true, false]),
            vec![false, false, false, true, false, false, false, false]
        );
    }

    #[test]
    fn nibble_of_generated_interval() {
        for word in [0u32, 0x0012_3456, 0x0040_0000, 0x007F_FFFF, 0x0065_4321] {
            let d = float_range(word, INTERVAL_MIN_FRAMES, INTERVAL_MAX_FRAMES) / FRAMES_PER_SECOND;
            if is_safe(d) {
                assert_eq!(interval_nibble(d), ((word & FLOAT_MASK) >> 19) as u8);
            }
        }
    }

    #[test]
    fn safety_brackets() {
        assert!(!is_safe(1.0));
        assert!(is_safe(3.5));
        assert!(!is_safe(3.9));
        assert!(is_safe(4.1));
        assert!(!is_safe(12.3));
        assert!(SAFETY_BOUNDARIES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reverse_float_range_truncates() {
        assert_eq!(reverse_float_range(370.0, 100.0, 370.0), 0);
        assert_eq!(reverse_float_range(100.0, 100.0, 370.0), FLOAT_MASK);
        // just past the top of the range truncates toward zero
        assert_eq!(reverse_float_range(370.00001, 100.0, 370.0), 0);
        // further out it wraps like a two's complement mask
        assert_eq!(reverse_float_range(370.001, 100.0, 370.0), 0x7F_FFE1);
    }

    #[test]
    fn durations_must_be_finite() {
        assert!(validate_durations(&[1.0, 2.0]).is_ok());
        assert!(validate_durations(&[1.0, f64::NAN]).is_err());
        assert!(validate_durations(&[-0.5]).is_err());
        assert!(validate_durations(&[f64::INFINITY]).is_err());
    }

    #[test]
    fn blink_system_has_four_rows_per_blink() {
        let model = TransitionModel::new();
        let enc = ObservationEncoder::new(&model);
        let flags = vec![false; 10];
        let gaps = vec![4u64; 10];
        let system = enc.blink_system(&flags, &gaps, 10).unwrap();
        assert_eq!(system.len(), 40);
        assert!(enc.blink_system(&flags[..5], &gaps, 10).is_err());
    }

    #[test]
    fn interval_system_skips_unsafe() {
        let model = TransitionModel::new();
        let enc = ObservationEncoder::new(&model);
        let durations = [3.5, 3.9, 4.1, 1.0, 5.3];
        let samples = enc.interval_system(&durations, 3).unwrap();
        assert_eq!(samples.indices, vec![0, 2, 4]);
        assert_eq!(samples.skipped, 2);
        assert_eq!(samples.equations.len(), 12);
        assert!(enc.interval_system(&durations, 4).is_err());
    }
}
