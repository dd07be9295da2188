//! Bootstrap confidence intervals over a bet ledger.
//!
//! Bets are resampled with replacement to estimate the sampling spread of
//! win rate and yield, which says how much of a backtest's result could be
//! luck.
//!
//! # Example
//!
//! ```ignore
//! use sports_edge_backtest::betting::{BootstrapConfig, BootstrapResampler};
//!
//! let resampler = BootstrapResampler::new(BootstrapConfig::default().with_seed(7));
//! if let Some(win_rate) = resampler.bootstrap_win_rate(&report.bets) {
//!     println!("{:.1}% [{:.1}%, {:.1}%]",
//!         win_rate.point_estimate * 100.0,
//!         win_rate.ci_lower * 100.0,
//!         win_rate.ci_upper * 100.0);
//! }
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::engine::{Bet, BetOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of resamples.
    pub n_iterations: usize,
    /// Interval coverage, e.g. 0.95.
    pub confidence_level: f64,
    /// Fixed seed for reproducible intervals; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_iterations: 2_000,
            confidence_level: 0.95,
            seed: None,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub fn new(n_iterations: usize, confidence_level: f64) -> Self {
        Self {
            n_iterations,
            confidence_level,
            seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Percentile interval around a ledger statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Statistic on the original ledger.
    pub point_estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub standard_error: f64,
    /// Mean of resampled statistics minus the point estimate.
    pub bias: f64,
}

impl BootstrapResult {
    #[must_use]
    pub fn ci_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }

    /// Returns true if `value` lies outside the interval.
    #[must_use]
    pub fn excludes(&self, value: f64) -> bool {
        value < self.ci_lower || value > self.ci_upper
    }
}

/// Intervals for the headline ledger statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapMetrics {
    pub win_rate: BootstrapResult,
    /// Net P&L per unit staked.
    pub yield_on_turnover: BootstrapResult,
}

pub struct BootstrapResampler {
    config: BootstrapConfig,
}

impl BootstrapResampler {
    #[must_use]
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Resamples `bets` and evaluates `statistic` on each resample.
    ///
    /// Returns `None` for an empty ledger or zero iterations.
    pub fn bootstrap_statistic<F>(&self, bets: &[Bet], statistic: F) -> Option<BootstrapResult>
    where
        F: Fn(&[&Bet]) -> f64,
    {
        if bets.is_empty() || self.config.n_iterations == 0 {
            return None;
        }

        let original: Vec<&Bet> = bets.iter().collect();
        let point_estimate = statistic(&original);

        let mut rng = self.rng();
        let mut sample: Vec<&Bet> = Vec::with_capacity(bets.len());
        let mut distribution: Vec<f64> = (0..self.config.n_iterations)
            .map(|_| {
                sample.clear();
                sample.extend((0..bets.len()).map(|_| &bets[rng.gen_range(0..bets.len())]));
                statistic(&sample)
            })
            .collect();
        distribution.sort_by(f64::total_cmp);

        let (ci_lower, ci_upper) = percentile_ci(&distribution, self.config.confidence_level);
        let n = distribution.len() as f64;
        let mean = distribution.iter().sum::<f64>() / n;
        let variance = distribution.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / (distribution.len() - 1).max(1) as f64;

        Some(BootstrapResult {
            point_estimate,
            ci_lower,
            ci_upper,
            standard_error: variance.sqrt(),
            bias: mean - point_estimate,
        })
    }

    #[must_use]
    pub fn bootstrap_win_rate(&self, bets: &[Bet]) -> Option<BootstrapResult> {
        self.bootstrap_statistic(bets, |sample| {
            let wins = sample
                .iter()
                .filter(|b| b.outcome == BetOutcome::Win)
                .count();
            wins as f64 / sample.len() as f64
        })
    }

    #[must_use]
    pub fn bootstrap_yield(&self, bets: &[Bet]) -> Option<BootstrapResult> {
        self.bootstrap_statistic(bets, |sample| {
            let staked: Decimal = sample.iter().map(|b| b.stake).sum();
            let pnl: Decimal = sample.iter().map(|b| b.pnl).sum();
            if staked > Decimal::ZERO {
                f64::try_from(pnl / staked).unwrap_or(0.0)
            } else {
                0.0
            }
        })
    }

    /// Win rate and yield intervals, or `None` for an empty ledger.
    #[must_use]
    pub fn bootstrap_all(&self, bets: &[Bet]) -> Option<BootstrapMetrics> {
        Some(BootstrapMetrics {
            win_rate: self.bootstrap_win_rate(bets)?,
            yield_on_turnover: self.bootstrap_yield(bets)?,
        })
    }
}

/// Percentile interval from a sorted distribution.
#[must_use]
pub fn percentile_ci(sorted: &[f64], confidence_level: f64) -> (f64, f64) {
    match sorted {
        [] => (0.0, 0.0),
        [only] => (*only, *only),
        _ => {
            let n = sorted.len();
            let alpha = (1.0 - confidence_level).clamp(0.0, 1.0);
            let lower = ((alpha / 2.0) * n as f64).floor() as usize;
            let upper = ((1.0 - alpha / 2.0) * n as f64).ceil() as usize;
            let lower = lower.min(n - 1);
            let upper = upper.min(n - 1).max(lower);
            (sorted[lower], sorted[upper])
        }
    }
}
