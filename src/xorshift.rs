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

//! # Xorshift128 Generator
//!
//! The 128-bit generator tracked by this crate: four 32-bit words with the
//! shift triple 11/8/19. Besides the forward step this module provides the
//! exact inverse step and the integer/float range conversions the observed
//! system applies to raw outputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest value of the 23-bit mantissa used by the float conversions.
pub const FLOAT_MASK: u32 = 0x7F_FFFF;
const FLOAT_DIVISOR: f64 = 8_388_607.0;

/// Internal state of the generator, `s0..s3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xorshift {
    state: [u32; 4],
}

impl Xorshift {
    pub const fn new(s0: u32, s1: u32, s2: u32, s3: u32) -> Self {
        Self {
            state: [s0, s1, s2, s3],
        }
    }

    pub const fn from_words(state: [u32; 4]) -> Self {
        Self { state }
    }

    /// Builds a state from its 128-bit vector, `s0` in the high word.
    pub fn from_bits(bits: u128) -> Self {
        Self::new(
            (bits >> 96) as u32,
            (bits >> 64) as u32,
            (bits >> 32) as u32,
            bits as u32,
        )
    }

    pub fn to_bits(&self) -> u128 {
        let [s0, s1, s2, s3] = self.state;
        (s0 as u128) << 96 | (s1 as u128) << 64 | (s2 as u128) << 32 | s3 as u128
    }

    pub fn state(&self) -> [u32; 4] {
        self.state
    }

    /// Advances one step and returns the new `s3`.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let [s0, s1, s2, s3] = self.state;
        let t = s0 ^ (s0 << 11);
        let n = t ^ (t >> 8) ^ s3 ^ (s3 >> 19);
        self.state = [s1, s2, s3, n];
        n
    }

    /// Undoes one step and returns the restored `s3`.
    #[inline]
    pub fn prev_u32(&mut self) -> u32 {
        let [s1, s2, s3, n] = self.state;
        // n ^ s3 ^ (s3 >> 19) == t ^ (t >> 8)
        let mut t = n ^ s3 ^ (s3 >> 19);
        t ^= t >> 8;
        t ^= t >> 16;
        // t == s0 ^ (s0 << 11)
        let mut s0 = t;
        s0 ^= s0 << 11;
        s0 ^= s0 << 22;
        self.state = [s0, s1, s2, s3];
        s3
    }

    pub fn advance(&mut self, n: u64) {
        for _ in 0..n {
            self.next_u32();
        }
    }

    pub fn retreat(&mut self, n: u64) {
        for _ in 0..n {
            self.prev_u32();
        }
    }

    /// Lazily yields the next `n` outputs, stepping `self` as they are consumed.
    pub fn outputs(&mut self, n: usize) -> impl Iterator<Item = u32> + '_ {
        (0..n).map(move |_| self.next_u32())
    }

    /// Lazily yields `n` outputs walking backward.
    pub fn outputs_backward(&mut self, n: usize) -> impl Iterator<Item = u32> + '_ {
        (0..n).map(move |_| self.prev_u32())
    }

    /// Next output mapped into `[lo, hi)`.
    pub fn range(&mut self, lo: u32, hi: u32) -> u32 {
        int_range(self.next_u32(), lo, hi)
    }

    /// Next output mapped into `[0, 1]`.
    pub fn rand_float(&mut self) -> f64 {
        unit_float(self.next_u32())
    }

    /// Next output mapped onto the float range, see [`float_range`].
    pub fn range_float(&mut self, lo: f64, hi: f64) -> f64 {
        float_range(self.next_u32(), lo, hi)
    }

    /// The four words as `0x`-prefixed hex.
    pub fn words_hex(&self) -> [String; 4] {
        self.state.map(|w| format!("0x{:08X}", w))
    }

    /// The `(s0 << 32 | s1, s2 << 32 | s3)` pair form.
    pub fn pairs(&self) -> (u64, u64) {
        let [s0, s1, s2, s3] = self.state;
        (
            (s0 as u64) << 32 | s1 as u64,
            (s2 as u64) << 32 | s3 as u64,
        )
    }

    pub fn pairs_hex(&self) -> [String; 2] {
        let (hi, lo) = self.pairs();
        [format!("0x{:016X}", hi), format!("0x{:016X}", lo)]
    }
}

/// `lo + word % (hi - lo)`.
#[inline]
pub fn int_range(word: u32, lo: u32, hi: u32) -> u32 {
    lo + word % (hi - lo)
}

#[inline]
pub fn unit_float(word: u32) -> f64 {
    (word & FLOAT_MASK) as f64 / FLOAT_DIVISOR
}

/// `f * lo + (1 - f) * hi`. Note the orientation: a zero mantissa gives `hi`.
#[inline]
pub fn float_range(word: u32, lo: f64, hi: f64) -> f64 {
    let f = unit_float(word);
    f * lo + (1.0 - f) * hi
}

impl fmt::Display for Xorshift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s0, s1, s2, s3] = self.state;
        write!(f, "0x{:08X} 0x{:08X} 0x{:08X} 0x{:08X}", s0, s1, s2, s3)
    }
}

fn parse_word(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid state word {:?}: {}", s, e))
}

impl FromStr for Xorshift {
    type Err = String;

    /// Accepts four 32-bit words or two 64-bit pairs, whitespace or comma
    /// separated, decimal or `0x` hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|p| !p.is_empty())
            .collect();
        match parts.len() {
            4 => {
                let mut words = [0u32; 4];
                for (slot, part) in words.iter_mut().zip(&parts) {
                    let v = parse_word(part)?;
                    *slot = u32::try_from(v)
                        .map_err(|_| format!("state word {:?} exceeds 32 bits", part))?;
                }
                Ok(Self::from_words(words))
            }
            2 => {
                let hi = parse_word(parts[0])?;
                let lo = parse_word(parts[1])?;
                Ok(Self::from_bits((hi as u128) << 64 | lo as u128))
            }
            n => Err(format!("expected 4 words or 2 pairs, got {} values", n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: Xorshift = Xorshift {
        state: [0x12345678, 0x9ABCDEF0, 0x0F0F0F0F, 0xFF00FF00],
    };

    #[test]
    fn golden_step() {
        let mut rng = FIXTURE;
        let out = rng.next_u32();
        assert_eq!(out, 0x4F37F10E);
        assert_eq!(rng.state(), [0x9ABCDEF0, 0x0F0F0F0F, 0xFF00FF00, 0x4F37F10E]);
    }

    #[test]
    fn prev_inverts_next() {
        let mut rng = FIXTURE;
        for _ in 0..1000 {
            let before = rng;
            rng.next_u32();
            let mut back = rng;
            back.prev_u32();
            assert_eq!(back, before);
        }
        let mut rng = FIXTURE;
        for _ in 0..1000 {
            let before = rng;
            rng.prev_u32();
            let mut fwd = rng;
            fwd.next_u32();
            assert_eq!(fwd, before);
        }
    }

    #[test]
    fn prev_returns_earlier_output() {
        let mut rng = FIXTURE;
        let outs: Vec<u32> = rng.outputs(5).collect();
        // walking back from the end yields the outputs before the last one
        let back: Vec<u32> = rng.outputs_backward(4).collect();
        assert_eq!(back, vec![outs[3], outs[2], outs[1], outs[0]]);
    }

    #[test]
    fn outputs_is_lazy() {
        let mut rng = FIXTURE;
        {
            let mut it = rng.outputs(10);
            it.next();
            it.next();
        }
        let mut expected = FIXTURE;
        expected.advance(2);
        assert_eq!(rng, expected);
    }

    #[test]
    fn float_range_orientation() {
        assert_eq!(float_range(0, 100.0, 370.0), 370.0);
        assert_eq!(float_range(FLOAT_MASK, 100.0, 370.0), 100.0);
        assert_eq!(unit_float(0xFFFF_FFFF), 1.0);
        assert_eq!(int_range(17, 3, 8), 3 + 17 % 5);
    }

    #[test]
    fn printable_forms() {
        assert_eq!(
            FIXTURE.words_hex(),
            ["0x12345678", "0x9ABCDEF0", "0x0F0F0F0F", "0xFF00FF00"]
        );
        assert_eq!(
            FIXTURE.pairs_hex(),
            ["0x123456789ABCDEF0", "0x0F0F0F0FFF00FF00"]
        );
        assert_eq!(
            FIXTURE.to_string(),
            "0x12345678 0x9ABCDEF0 0x0F0F0F0F 0xFF00FF00"
        );
    }

    #[test]
    fn parse_words_and_pairs() {
        let words: Xorshift = "0x12345678 0x9ABCDEF0 0x0F0F0F0F 0xFF00FF00".parse().unwrap();
        assert_eq!(words, FIXTURE);
        let pairs: Xorshift = "0x123456789ABCDEF0, 0x0F0F0F0FFF00FF00".parse().unwrap();
        assert_eq!(pairs, FIXTURE);
        assert!("1 2 3".parse::<Xorshift>().is_err());
        assert!("0x1FFFFFFFF 0 0 0".parse::<Xorshift>().is_err());
    }

    #[test]
    fn bits_round_trip_word_order() {
        let bits = FIXTURE.to_bits();
        assert_eq!((bits >> 96) as u32, 0x12345678);
        assert_eq!(bits as u32, 0xFF00FF00);
        assert_eq!(Xorshift::from_bits(bits), FIXTURE);
    }
}
