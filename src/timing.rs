use anyhow::{ensure, Context, Result};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::Serialize;

use crate::model::TimingPattern;

/// Short, medium, long and very long bands. Weights sum to 100.
pub const DEFAULT_PATTERNS: [TimingPattern; 4] = [
    TimingPattern::new(30, 60, 40),
    TimingPattern::new(60, 120, 30),
    TimingPattern::new(120, 180, 20),
    TimingPattern::new(180, 240, 10),
];

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub patterns: Vec<TimingPattern>,
    /// Symmetric integer jitter, in seconds, added to every inter-action sample.
    pub jitter_secs: i64,
    pub press_micros_min: u64,
    pub press_micros_max: u64,
    pub double_tap_probability: f64,
    pub misclick_probability: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.to_vec(),
            jitter_secs: 5,
            press_micros_min: 30_000,
            press_micros_max: 80_000,
            double_tap_probability: 0.08,
            misclick_probability: 0.03,
        }
    }
}

fn validate_patterns(patterns: &[TimingPattern], jitter_secs: i64) -> Result<()> {
    ensure!(!patterns.is_empty(), "timing pattern table must not be empty");
    ensure!(jitter_secs >= 0, "jitter_secs must be >= 0");

    for (idx, p) in patterns.iter().enumerate() {
        ensure!(p.weight > 0, "timing pattern {idx} must have a positive weight");
        ensure!(
            p.min_seconds < p.max_seconds,
            "timing pattern {idx}: min_seconds must be < max_seconds"
        );
        ensure!(
            p.min_seconds - jitter_secs >= 1,
            "timing pattern {idx}: min_seconds minus jitter must be at least 1s"
        );
    }

    Ok(())
}

/// Weighted choice over `patterns`.
///
/// Draws uniformly from `[0, total_weight)` and returns the first index whose cumulative
/// weight exceeds the draw, so earlier entries win ties. Returns 0 for a table whose
/// total weight is zero.
pub fn pick_pattern<R: Rng + ?Sized>(patterns: &[TimingPattern], rng: &mut R) -> usize {
    let total: u64 = patterns.iter().map(|p| u64::from(p.weight)).sum();
    if total == 0 {
        return 0;
    }

    let draw = rng.gen_range(0..total);
    let mut cumulative = 0u64;
    for (idx, p) in patterns.iter().enumerate() {
        cumulative += u64::from(p.weight);
        if draw < cumulative {
            return idx;
        }
    }
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterSample {
    pub pattern: usize,
    pub seconds: i64,
}

#[derive(Debug, Clone)]
pub struct TimingModel {
    patterns: Vec<TimingPattern>,
    jitter_secs: i64,
    press: Uniform<u64>,
    double_tap: Bernoulli,
    misclick: Bernoulli,
}

impl TimingModel {
    pub fn new(cfg: TimingConfig) -> Result<Self> {
        validate_patterns(&cfg.patterns, cfg.jitter_secs)?;
        ensure!(
            cfg.press_micros_min < cfg.press_micros_max,
            "press_micros_min must be < press_micros_max"
        );

        let double_tap = Bernoulli::new(cfg.double_tap_probability)
            .context("double_tap_probability must be between 0.0 and 1.0")?;
        let misclick = Bernoulli::new(cfg.misclick_probability)
            .context("misclick_probability must be between 0.0 and 1.0")?;

        Ok(Self {
            patterns: cfg.patterns,
            jitter_secs: cfg.jitter_secs,
            press: Uniform::new(cfg.press_micros_min, cfg.press_micros_max),
            double_tap,
            misclick,
        })
    }

    pub fn patterns(&self) -> &[TimingPattern] {
        &self.patterns
    }

    /// Weighted band, uniform second within the band, then `±jitter_secs`.
    pub fn sample_inter<R: Rng + ?Sized>(&self, rng: &mut R) -> InterSample {
        let pattern = pick_pattern(&self.patterns, rng);
        let band = self.patterns[pattern];
        let base = rng.gen_range(band.min_seconds..band.max_seconds);
        let jitter = rng.gen_range(-self.jitter_secs..=self.jitter_secs);
        InterSample {
            pattern,
            seconds: base + jitter,
        }
    }

    pub fn sample_inter_seconds<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        self.sample_inter(rng).seconds
    }

    /// Key-press dwell time.
    pub fn sample_press_duration_micros<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.press.sample(rng)
    }

    pub fn should_double_tap<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.double_tap.sample(rng)
    }

    pub fn should_misclick<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.misclick.sample(rng)
    }
}
