//! The generator step as a linear map on the 128-bit state vector.

use super::matrix::{BitMatrix, BitRow};
use crate::error::{RecoveryError, Result};
use crate::xorshift::Xorshift;

pub const STATE_BITS: usize = 128;
const WORD_BITS: usize = 32;

/// Holds `Tr`, the 128x128 matrix of one generator step.
#[derive(Clone, Debug)]
pub struct TransitionModel {
    step: BitMatrix,
}

impl Default for TransitionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionModel {
    pub fn new() -> Self {
        let z = BitMatrix::zero(WORD_BITS);
        let i = BitMatrix::identity(WORD_BITS);
        // t = s0 ^ (s0 << 11); t ^ (t >> 8)
        let mix_s0 = i
            .xor(&BitMatrix::shifted_identity(WORD_BITS, -8))
            .mul(&i.xor(&BitMatrix::shifted_identity(WORD_BITS, 11)));
        // s3 ^ (s3 >> 19)
        let mix_s3 = i.xor(&BitMatrix::shifted_identity(WORD_BITS, -19));
        let step = BitMatrix::from_blocks([
            [&z, &i, &z, &z],
            [&z, &z, &i, &z],
            [&z, &z, &z, &i],
            [&mix_s0, &z, &z, &mix_s3],
        ]);
        Self { step }
    }

    pub fn step_matrix(&self) -> &BitMatrix {
        &self.step
    }

    /// `Tr^n`.
    pub fn advance_by(&self, n: u64) -> BitMatrix {
        power(&self.step, n)
    }

    /// Applies `m` to a generator state.
    pub fn apply(m: &BitMatrix, state: &Xorshift) -> Xorshift {
        Xorshift::from_bits(m.apply(state.to_bits()))
    }

    /// For each of the first `row_count` intervals, records the four rows
    /// describing the low nibble of the next output and then advances the
    /// working matrix by that interval. The result is `4 * row_count` rows.
    pub fn reference_rows(&self, intervals: &[u64], row_count: usize) -> Result<BitMatrix> {
        if intervals.len() < row_count {
            return Err(RecoveryError::InputContract(format!(
                "need {} intervals for the reference matrix, got {}",
                row_count,
                intervals.len()
            )));
        }
        let mut base = self.step.clone();
        let mut rows = Vec::with_capacity(4 * row_count);
        for &interval in &intervals[..row_count] {
            rows.extend(output_rows(&base, 3));
            base = base.mul(&self.advance_by(interval));
        }
        Ok(BitMatrix::from_rows(STATE_BITS, rows))
    }
}

/// `m^n` by square-and-multiply. GF(2) matrix powers commute with each other
/// so this is bit-identical to `n` successive multiplications.
pub fn power(m: &BitMatrix, mut n: u64) -> BitMatrix {
    let mut result = BitMatrix::identity(m.height());
    let mut base = m.clone();
    while n > 0 {
        if n & 1 == 1 {
            result = result.mul(&base);
        }
        n >>= 1;
        if n > 0 {
            base = base.mul(&base);
        }
    }
    result
}

/// The four rows of a state transition matrix giving output (`s3`) bits
/// `top_bit`, `top_bit - 1`, `top_bit - 2`, `top_bit - 3`.
pub fn output_rows(m: &BitMatrix, top_bit: usize) -> [BitRow; 4] {
    debug_assert!((3..WORD_BITS).contains(&top_bit));
    let first = STATE_BITS - 1 - top_bit;
    [m.row(first), m.row(first + 1), m.row(first + 2), m.row(first + 3)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn one_step_matches_generator() {
        let model = TransitionModel::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let s = Xorshift::new(rng.gen(), rng.gen(), rng.gen(), rng.gen());
            let mut expected = s;
            expected.next_u32();
            assert_eq!(TransitionModel::apply(model.step_matrix(), &s), expected);
        }
    }

    #[test]
    fn powers_match_sequential_steps() {
        let model = TransitionModel::new();
        let s = Xorshift::new(0x12345678, 0x9ABCDEF0, 0x0F0F0F0F, 0xFF00FF00);
        let mut sequential = model.step_matrix().clone();
        for n in 1..=64u64 {
            let mut expected = s;
            expected.advance(n);
            let m = model.advance_by(n);
            assert_eq!(m, sequential, "power differs at n = {}", n);
            assert_eq!(TransitionModel::apply(&m, &s), expected);
            sequential = sequential.mul(model.step_matrix());
        }
        assert_eq!(TransitionModel::apply(&model.advance_by(0), &s), s);
    }

    #[test]
    fn reference_rows_predict_output_nibbles() {
        let model = TransitionModel::new();
        let s = Xorshift::new(0xCAFEBABE, 0x01234567, 0x89ABCDEF, 0x55AA55AA);
        let intervals = [3u64, 1, 7, 12];
        let rows = model.reference_rows(&intervals, 4).unwrap();
        assert_eq!(rows.height(), 16);

        let mut live = s;
        let mut out = live.next_u32();
        for (i, &gap) in intervals.iter().enumerate() {
            for b in 0..4 {
                let predicted = (rows.row(4 * i + b) & s.to_bits()).count_ones() & 1;
                assert_eq!(predicted, (out >> (3 - b)) & 1);
            }
            for _ in 0..gap {
                out = live.next_u32();
            }
        }
    }

    #[test]
    fn reference_rows_rejects_short_input() {
        let model = TransitionModel::new();
        assert!(model.reference_rows(&[1, 2], 3).is_err());
    }
}
