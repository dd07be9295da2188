use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub split: SplitConfig,
    pub leakage: LeakageConfig,
    pub ensemble: EnsembleConfig,
    pub validation: ValidationConfig,
    pub backtest: BacktestConfig,
}

/// How observations are partitioned into chronological folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Expanding training window, contiguous test windows.
    WalkForward {
        n_splits: usize,
        min_train_size: usize,
    },
    /// Train on seasons `1..=k`, test on season `k+1`.
    SeasonBased,
    /// Fixed-length training window sliding by `step_size`.
    SlidingWindow {
        window_size: usize,
        step_size: usize,
        test_size: usize,
        #[serde(default = "default_min_test_size")]
        min_test_size: usize,
    },
}

fn default_min_test_size() -> usize {
    50
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self::WalkForward {
            n_splits: 5,
            min_train_size: 100,
        }
    }
}

impl SplitStrategy {
    /// Short name for logs and reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::WalkForward { .. } => "walk_forward",
            Self::SeasonBased => "season_based",
            Self::SlidingWindow { .. } => "sliding_window",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub strategy: SplitStrategy,
    /// Chronologically last share of each training window held out for
    /// ensemble weighting.
    pub validation_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::default(),
            validation_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakageConfig {
    /// Lowercase substrings that suggest a feature reveals the outcome.
    pub suspicious_tokens: Vec<String>,
    /// Share of rows in each of the earliest and latest slices.
    pub stationarity_slice_fraction: f64,
    /// KS p-value below which a feature is flagged as drifting.
    pub stationarity_alpha: f64,
    /// Minimum finite values per slice for the KS test.
    pub min_stationarity_samples: usize,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self {
            suspicious_tokens: [
                "final_score",
                "actual_winner",
                "margin",
                "home_score",
                "away_score",
                "total_points",
                "winner",
                "result",
                "outcome",
                "covered",
            ]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
            stationarity_slice_fraction: 0.3,
            stationarity_alpha: 0.05,
            min_stationarity_samples: 20,
        }
    }
}

/// Weight optimizer selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Grid for small ensembles, projected gradient otherwise.
    #[default]
    Auto,
    /// Exhaustive simplex lattice search.
    Grid,
    /// Projected gradient descent on the simplex.
    ProjectedGradient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub solver: SolverKind,
    /// Lattice step for grid search.
    pub grid_resolution: f64,
    /// Largest ensemble `Auto` solves by grid search.
    pub max_grid_models: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::Auto,
            grid_resolution: 0.1,
            max_grid_models: 4,
            max_iterations: 500,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub calibration_bins: usize,
    pub n_permutations: usize,
    /// Seed for the permutation stream; fixed so reports are reproducible.
    pub seed: u64,
    pub significance_level: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            calibration_bins: 10,
            n_permutations: 1_000,
            seed: 42,
            significance_level: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_bankroll: Decimal,
    /// Fraction of full Kelly to stake, in (0, 1].
    pub kelly_multiplier: f64,
    /// Minimum win probability of the chosen side.
    pub min_probability_threshold: f64,
    /// Kelly fractions at or below this are treated as no bet.
    pub min_fraction: f64,
    /// Optional cap on stake as a fraction of the current balance.
    pub max_stake_fraction: Option<f64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: Decimal::new(10_000, 0),
            kelly_multiplier: 0.25,
            min_probability_threshold: 0.5,
            min_fraction: 1e-9,
            max_stake_fraction: None,
        }
    }
}

impl BacktestConfig {
    /// Sets the starting bankroll.
    #[must_use]
    pub fn with_initial_bankroll(mut self, bankroll: Decimal) -> Self {
        self.initial_bankroll = bankroll;
        self
    }

    /// Sets the Kelly multiplier.
    #[must_use]
    pub fn with_kelly_multiplier(mut self, multiplier: f64) -> Self {
        self.kelly_multiplier = multiplier;
        self
    }

    /// Sets the minimum side probability.
    #[must_use]
    pub fn with_min_probability(mut self, threshold: f64) -> Self {
        self.min_probability_threshold = threshold;
        self
    }

    /// Caps each stake at a fraction of the current balance.
    #[must_use]
    pub fn with_max_stake_fraction(mut self, cap: f64) -> Self {
        self.max_stake_fraction = Some(cap);
        self
    }
}
