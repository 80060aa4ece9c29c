//! Dense bit matrices over GF(2), at most 128 columns wide.

use std::fmt;

/// One matrix row; column `c` of a `w`-wide row lives at bit `w - 1 - c`.
pub type BitRow = u128;

pub const MAX_WIDTH: usize = 128;

#[derive(Clone, PartialEq, Eq)]
pub struct BitMatrix {
    width: usize,
    rows: Vec<BitRow>,
}

impl BitMatrix {
    pub fn zero(size: usize) -> Self {
        Self::with_shape(size, size)
    }

    pub fn with_shape(height: usize, width: usize) -> Self {
        assert!(width <= MAX_WIDTH, "bit matrix wider than {} columns", MAX_WIDTH);
        Self {
            width,
            rows: vec![0; height],
        }
    }

    pub fn identity(size: usize) -> Self {
        Self::shifted_identity(size, 0)
    }

    /// Identity with its diagonal displaced: entry `(i, i + k)` is set.
    ///
    /// Applied to a word, `k > 0` shifts toward the high-order end
    /// (`x << k`) and `k < 0` toward the low-order end (`x >> -k`).
    pub fn shifted_identity(size: usize, k: isize) -> Self {
        let mut m = Self::zero(size);
        for i in 0..size {
            let c = i as isize + k;
            if c >= 0 && (c as usize) < size {
                m.set(i, c as usize);
            }
        }
        m
    }

    /// Builds a square matrix from a square grid of equally sized square
    /// blocks; `grid[i][j]` maps input block `j` into output block `i`.
    pub fn from_blocks<const N: usize>(grid: [[&BitMatrix; N]; N]) -> Self {
        let block = grid[0][0].height();
        let mut out = Self::zero(block * N);
        for (bi, block_row) in grid.iter().enumerate() {
            for (bj, b) in block_row.iter().enumerate() {
                assert!(
                    b.height() == block && b.width == block,
                    "blocks must be {}x{}",
                    block,
                    block
                );
                let shift = (N - 1 - bj) * block;
                for (r, &row) in b.rows.iter().enumerate() {
                    out.rows[bi * block + r] |= row << shift;
                }
            }
        }
        out
    }

    /// Collects rows into a matrix of the given width.
    pub fn from_rows(width: usize, rows: Vec<BitRow>) -> Self {
        assert!(width <= MAX_WIDTH, "bit matrix wider than {} columns", MAX_WIDTH);
        Self { width, rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[BitRow] {
        &self.rows
    }

    pub fn row(&self, r: usize) -> BitRow {
        self.rows[r]
    }

    #[inline]
    fn mask(&self, c: usize) -> BitRow {
        1 << (self.width - 1 - c)
    }

    pub fn get(&self, r: usize, c: usize) -> bool {
        self.rows[r] & self.mask(c) != 0
    }

    pub fn set(&mut self, r: usize, c: usize) {
        let m = self.mask(c);
        self.rows[r] |= m;
    }

    /// Element-wise addition mod 2.
    pub fn xor(&self, other: &BitMatrix) -> BitMatrix {
        assert_eq!(self.width, other.width);
        assert_eq!(self.height(), other.height());
        BitMatrix {
            width: self.width,
            rows: self
                .rows
                .iter()
                .zip(&other.rows)
                .map(|(a, b)| a ^ b)
                .collect(),
        }
    }

    /// Matrix product mod 2.
    pub fn mul(&self, other: &BitMatrix) -> BitMatrix {
        assert_eq!(self.width, other.height(), "dimension mismatch in mul");
        let mut out = BitMatrix::with_shape(self.height(), other.width);
        for (dst, &row) in out.rows.iter_mut().zip(&self.rows) {
            let mut acc = 0;
            let mut bits = row;
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                acc ^= other.rows[self.width - 1 - bit];
                bits &= bits - 1;
            }
            *dst = acc;
        }
        out
    }

    /// Matrix times column vector; the vector uses the same column layout
    /// as a row and output row `r` lands at bit `height - 1 - r`.
    pub fn apply(&self, v: BitRow) -> BitRow {
        let h = self.height();
        self.rows
            .iter()
            .enumerate()
            .fold(0, |acc, (r, &row)| {
                acc | (((row & v).count_ones() & 1) as BitRow) << (h - 1 - r)
            })
    }
}

impl fmt::Debug for BitMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BitMatrix {}x{}", self.height(), self.width)?;
        for row in &self.rows {
            writeln!(f, "{:0width$b}", row, width = self.width)?;
        }
        Ok(())
    }
}
