use crate::predict::{INTERVAL_OFFSET_SECONDS, PLAYER_TICK_SECONDS};
use crate::recovery::RecoverySettings;
use crate::reident::SearchBounds;
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchConfig {
    pub bounds: SearchBounds,
    /// Upper bound for the noisy search, which is far more expensive.
    pub noisy_max: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bounds: SearchBounds::new(0, 1_000_000),
            noisy_max: 100_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingConfig {
    pub tick_seconds: f64,
    pub interval_offset: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_seconds: PLAYER_TICK_SECONDS,
            interval_offset: INTERVAL_OFFSET_SECONDS,
        }
    }
}

/// Unified configuration structure parsed from a TOML file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub recovery: RecoverySettings,
    pub search: SearchConfig,
    pub timing: TimingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML string. Missing keys keep their defaults.
    pub fn from_toml(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        #[derive(Deserialize, Default)]
        #[serde(deny_unknown_fields)]
        struct Root {
            recovery: Option<RecoverySection>,
            search: Option<SearchSection>,
            timing: Option<TimingSection>,
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RecoverySection {
            blink_rows: Option<usize>,
            safe_samples: Option<usize>,
            latency_correction: Option<f64>,
            interval_tolerance: Option<f64>,
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct SearchSection {
            min: Option<u64>,
            max: Option<u64>,
            noisy_max: Option<u64>,
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct TimingSection {
            tick_seconds: Option<f64>,
            interval_offset: Option<f64>,
        }

        let raw: Root = toml::from_str(s)?;
        let mut cfg = AppConfig::default();
        if let Some(r) = raw.recovery {
            let d = &mut cfg.recovery;
            d.blink_rows = r.blink_rows.unwrap_or(d.blink_rows);
            d.safe_samples = r.safe_samples.unwrap_or(d.safe_samples);
            d.latency_correction = r.latency_correction.unwrap_or(d.latency_correction);
            d.interval_tolerance = r.interval_tolerance.unwrap_or(d.interval_tolerance);
        }
        if let Some(s) = raw.search {
            let d = &mut cfg.search;
            d.bounds = SearchBounds::new(
                s.min.unwrap_or(d.bounds.min()),
                s.max.unwrap_or(d.bounds.max()),
            );
            d.noisy_max = s.noisy_max.unwrap_or(d.noisy_max);
        }
        if let Some(t) = raw.timing {
            let d = &mut cfg.timing;
            d.tick_seconds = t.tick_seconds.unwrap_or(d.tick_seconds);
            d.interval_offset = t.interval_offset.unwrap_or(d.interval_offset);
        }
        Ok(cfg)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        let r = &self.recovery;
        // 4 equations per sample, 128 unknowns
        if r.blink_rows * 4 < 128 {
            return Err(format!("blink_rows {} gives fewer than 128 equations", r.blink_rows));
        }
        if r.safe_samples * 4 < 128 {
            return Err(format!(
                "safe_samples {} gives fewer than 128 equations",
                r.safe_samples
            ));
        }
        if !r.latency_correction.is_finite() {
            return Err("latency_correction must be finite".into());
        }
        if !(r.interval_tolerance > 0.0) {
            return Err("interval_tolerance must be positive".into());
        }
        if self.search.bounds.span() == 0 {
            return Err("search range is empty".into());
        }
        if !(self.timing.tick_seconds > 0.0) {
            return Err("tick_seconds must be positive".into());
        }
        Ok(())
    }
}
