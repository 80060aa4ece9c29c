//! Gauss-Jordan elimination over GF(2) for the 128 unknown state bits.

use super::matrix::{BitMatrix, BitRow};
use super::transition::STATE_BITS;
use crate::error::{RecoveryError, Result};
use crate::xorshift::Xorshift;
use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Equation {
    pub coeffs: BitRow,
    pub rhs: bool,
}

/// Linear equations over the state bits, built per recovery attempt and
/// consumed by [`solve`].
#[derive(Clone, Debug, Default)]
pub struct EquationSystem {
    equations: Vec<Equation>,
}

impl EquationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            equations: Vec::with_capacity(n),
        }
    }

    /// Pairs coefficient rows with right-hand-side bits.
    pub fn from_parts(matrix: &BitMatrix, rhs: &[bool]) -> Result<Self> {
        if matrix.width() != STATE_BITS {
            return Err(RecoveryError::InputContract(format!(
                "coefficient rows must be {} bits wide, got {}",
                STATE_BITS,
                matrix.width()
            )));
        }
        if rhs.len() < matrix.height() {
            return Err(RecoveryError::InputContract(format!(
                "{} coefficient rows but only {} observed bits",
                matrix.height(),
                rhs.len()
            )));
        }
        Ok(Self {
            equations: matrix
                .rows()
                .iter()
                .zip(rhs)
                .map(|(&coeffs, &rhs)| Equation { coeffs, rhs })
                .collect(),
        })
    }

    pub fn push(&mut self, coeffs: BitRow, rhs: bool) {
        self.equations.push(Equation { coeffs, rhs });
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = (BitRow, bool)>) {
        self.equations
            .extend(rows.into_iter().map(|(coeffs, rhs)| Equation { coeffs, rhs }));
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }
}

#[inline]
fn column_mask(c: usize) -> BitRow {
    1 << (STATE_BITS - 1 - c)
}

/// Solves the system for the generator state.
///
/// Every column must find a pivot; the first column without one yields
/// [`RecoveryError::MatrixSingular`].
pub fn solve(system: EquationSystem) -> Result<Xorshift> {
    let mut eqs = system.equations;
    let height = eqs.len();

    // forward elimination
    for c in 0..STATE_BITS {
        let mask = column_mask(c);
        let found = (c..height).find(|&r| eqs[r].coeffs & mask != 0);
        let Some(p) = found else {
            return Err(RecoveryError::MatrixSingular { column: c, rank: c });
        };
        eqs.swap(c, p);
        let pivot = eqs[c];
        for eq in eqs[c + 1..].iter_mut() {
            if eq.coeffs & mask != 0 {
                eq.coeffs ^= pivot.coeffs;
                eq.rhs ^= pivot.rhs;
            }
        }
    }

    let inconsistent = eqs[STATE_BITS..].iter().filter(|eq| eq.rhs).count();
    if inconsistent > 0 {
        debug!(
            "{} of {} surplus equations are inconsistent",
            inconsistent,
            height - STATE_BITS
        );
    }

    // back substitution
    for c in (1..STATE_BITS).rev() {
        let mask = column_mask(c);
        let pivot = eqs[c];
        for eq in eqs[..c].iter_mut() {
            if eq.coeffs & mask != 0 {
                eq.coeffs ^= pivot.coeffs;
                eq.rhs ^= pivot.rhs;
            }
        }
    }

    let bits = eqs[..STATE_BITS]
        .iter()
        .enumerate()
        .fold(0, |acc: BitRow, (c, eq)| {
            if eq.rhs {
                acc | column_mask(c)
            } else {
                acc
            }
        });
    debug!("solved {} equations for state bits {:032X}", height, bits);
    Ok(Xorshift::from_bits(bits))
}
