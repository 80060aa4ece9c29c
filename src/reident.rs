//! Reidentification: finding how far a known state has advanced from a
//! short, later observation.
//!
//! All searches replay the generator from the known state up to the upper
//! search bound and compare the predicted blink pattern against the
//! observed one. Cancellation is polled between actor distances and every
//! few thousand outputs or offsets within one; a cancelled search fails
//! rather than returning whatever it had seen so far.

use crate::error::{RecoveryError, Result};
use crate::recovery::is_blink;
use crate::xorshift::Xorshift;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CANCEL_POLL: usize = 4096;

/// Half-open range of advances `[min, max)` to search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchBounds {
    min: u64,
    max: u64,
}

impl SearchBounds {
    /// Orders the bounds if given reversed.
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn span(&self) -> u64 {
        self.max.saturating_sub(self.min)
    }
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self::new(0, 1_000_000)
    }
}

/// Shared flag a caller can raise to abort a running search.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reidentified {
    /// The known state advanced by `advances`.
    pub state: Xorshift,
    pub advances: u64,
    pub distance: usize,
    /// Unobserved advances inferred by the noisy search.
    pub extras: u64,
}

/// Fixed-length shift register of bits, newest bit in the lowest position.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BitWindow {
    len: usize,
    limbs: Vec<u64>,
}

impl BitWindow {
    fn new(len: usize) -> Self {
        Self {
            len,
            limbs: vec![0; len.div_ceil(64).max(1)],
        }
    }

    fn from_bits(bits: &[bool]) -> Self {
        let mut w = Self::new(bits.len());
        for &b in bits {
            w.push(b);
        }
        w
    }

    fn push(&mut self, bit: bool) {
        for i in (1..self.limbs.len()).rev() {
            self.limbs[i] = (self.limbs[i] << 1) | (self.limbs[i - 1] >> 63);
        }
        self.limbs[0] = (self.limbs[0] << 1) | bit as u64;
        let top_bits = self.len - 64 * (self.limbs.len() - 1);
        if top_bits < 64 {
            let last = self.limbs.len() - 1;
            self.limbs[last] &= (1u64 << top_bits) - 1;
        }
    }
}

/// Boolean timeline `1 (0^(g-1) 1)*` from raw tick gaps, the first
/// (warm-up) gap dropped. A zero gap contributes a lone `1`.
///
/// Fails when the timeline would be longer than `limit` ticks.
pub fn timeline_from_gaps(raw_gaps: &[u64], limit: u64) -> Result<Vec<bool>> {
    let gaps = raw_gaps.get(1..).unwrap_or(&[]);
    let ticks = gaps
        .iter()
        .try_fold(1u64, |acc, &g| acc.checked_add(g.max(1)))
        .filter(|&t| t <= limit)
        .ok_or_else(|| {
            RecoveryError::InputContract(format!(
                "observed gaps span more than {} ticks",
                limit
            ))
        })?;
    let mut timeline = Vec::with_capacity(ticks as usize);
    timeline.push(true);
    for &g in gaps {
        timeline.extend(std::iter::repeat(false).take(g.saturating_sub(1) as usize));
        timeline.push(true);
    }
    Ok(timeline)
}

pub struct Reidentifier {
    bounds: SearchBounds,
    actor_count: usize,
    cancel: Option<CancelFlag>,
}

impl Reidentifier {
    pub fn new(bounds: SearchBounds) -> Self {
        Self {
            bounds: SearchBounds::new(bounds.min, bounds.max),
            actor_count: 0,
            cancel: None,
        }
    }

    pub fn with_actors(mut self, actor_count: usize) -> Self {
        self.actor_count = actor_count;
        self
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => {
                Err(RecoveryError::Reidentification("search cancelled".into()))
            }
            _ => Ok(()),
        }
    }

    /// Matches the observed blink types (single/double, oldest first)
    /// against the player's blink-eligible outputs. `advances` is the index
    /// of the output that produced the last observed blink.
    pub fn by_blinks(&self, state: &Xorshift, flags: &[bool]) -> Result<Reidentified> {
        if flags.is_empty() {
            return Err(RecoveryError::InputContract("no blinks observed".into()));
        }
        if flags.len() < 64 && (1u64 << flags.len()) < self.bounds.span() {
            return Err(RecoveryError::InputContract(format!(
                "{} blinks cannot single out one of {} advances",
                flags.len(),
                self.bounds.span()
            )));
        }
        self.scan(state, &BitWindow::from_bits(flags), true)
    }

    /// Matches the observed blink timing (raw tick gaps, warm-up first)
    /// against the dense eligibility pattern of the player's outputs.
    /// Timing that spans more ticks than the upper bound is rejected.
    pub fn by_intervals(&self, state: &Xorshift, raw_gaps: &[u64]) -> Result<Reidentified> {
        let timeline = timeline_from_gaps(raw_gaps, self.bounds.max)?;
        self.scan(state, &BitWindow::from_bits(&timeline), false)
    }

    fn scan(&self, state: &Xorshift, pattern: &BitWindow, blinks_only: bool) -> Result<Reidentified> {
        let stride = self.actor_count as u64 + 1;
        for distance in 0..=self.actor_count {
            self.check_cancel()?;
            let mut rng = *state;
            let mut window = BitWindow::new(pattern.len);
            let mut filled = 0;
            for idx in 0..self.bounds.max {
                if idx > 0 && idx % CANCEL_POLL as u64 == 0 {
                    self.check_cancel()?;
                }
                let r = rng.next_u32();
                if idx % stride != distance as u64 {
                    continue;
                }
                let bit = if blinks_only {
                    if !is_blink(r) {
                        continue;
                    }
                    r & 1 == 1
                } else {
                    is_blink(r)
                };
                window.push(bit);
                filled += 1;
                if filled >= pattern.len && idx >= self.bounds.min && window == *pattern {
                    info!("found at advances {}, distance {}", idx, distance);
                    let mut found = *state;
                    found.advance(idx);
                    return Ok(Reidentified {
                        state: found,
                        advances: idx,
                        distance,
                        extras: 0,
                    });
                }
            }
            debug!("no match at distance {}", distance);
        }
        Err(RecoveryError::Reidentification(format!(
            "no match within advances {}..{}",
            self.bounds.min, self.bounds.max
        )))
    }

    /// Reidentifies while an unobserved actor injects extra advances between
    /// observed ticks. Each trial offset aligns the observed timeline
    /// greedily against the predicted eligibility bits, counting every
    /// skipped prediction as one extra advance; the trial with the fewest
    /// extras wins, the earliest offset on ties.
    pub fn noisy(&self, state: &Xorshift, timeline: &[bool]) -> Result<Reidentified> {
        if timeline.is_empty() {
            return Err(RecoveryError::InputContract("empty timeline".into()));
        }
        let observed = timeline.len();
        let window = observed * 4 / 3;
        let span = self.bounds.span() as usize;
        if span <= window {
            return Err(RecoveryError::InputContract(format!(
                "search span {} is shorter than the {}-tick alignment window",
                span, window
            )));
        }

        let mut rng = *state;
        rng.advance(self.bounds.min);
        let predicted: Vec<bool> = rng.outputs(span).map(is_blink).collect();

        let mut best: Option<(u64, usize)> = None;
        for offset in 0..span - window {
            if offset % CANCEL_POLL == 0 {
                self.check_cancel()?;
            }
            let Some(extras) = align(timeline, &predicted[offset..offset + window]) else {
                continue;
            };
            if best.map_or(true, |(e, _)| extras < e) {
                best = Some((extras, offset));
            }
        }

        let (extras, offset) = best.ok_or_else(|| {
            RecoveryError::Reidentification(format!(
                "timeline does not align anywhere within advances {}..{}",
                self.bounds.min, self.bounds.max
            ))
        })?;
        let advances = self.bounds.min + offset as u64 + extras + observed as u64;
        info!(
            "noisy match at offset {} with {} extra advances",
            self.bounds.min + offset as u64,
            extras
        );
        let mut found = *state;
        found.advance(advances);
        Ok(Reidentified {
            state: found,
            advances,
            distance: 0,
            extras,
        })
    }
}

/// Greedy left-to-right embedding of `observed` into `predicted`; returns
/// the number of skipped predictions, or `None` if `predicted` runs out.
fn align(observed: &[bool], predicted: &[bool]) -> Option<u64> {
    let mut j = 0;
    let mut extras = 0;
    for &bit in observed {
        while j < predicted.len() && predicted[j] != bit {
            extras += 1;
            j += 1;
        }
        if j == predicted.len() {
            return None;
        }
        j += 1;
    }
    Some(extras)
}
