//! Walk-forward evaluation of a model ensemble.
//!
//! # Flow
//!
//! 1. Advisory checks on feature names and feature stationarity
//! 2. Plan chronological folds and discard any that leak
//! 3. Per fold (in parallel): hold out the latest slice of the training
//!    window, train and weight the ensemble, predict the test window
//! 4. Score the merged held-out predictions
//! 5. Replay the same predictions through the Kelly backtester
//!
//! Nothing short of bad input aborts a run. Unusable folds, models and bets
//! are listed in [`EvaluationReport::skipped`].

use std::fmt;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sports_edge_core::{
    DataIntegrityError, EngineConfig, EvaluationError, ModelFactory, Observation, OutOfFoldPrediction, Split,
};

use crate::betting::{BacktestReport, Backtester, BetCandidate};
use crate::ensemble::{DroppedModel, EnsembleCombiner, EnsembleWeights, LabeledSet};
use crate::split::{FeatureWarning, LeakageGuard, SplitPlan, SplitPlanner, StationarityReport};
use crate::stats::{StatisticalValidator, ValidationReport};

/// Where in the pipeline something was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    /// A planned split failed the leakage check.
    Split,
    /// A fold could not produce test predictions.
    Fold,
    /// A model was dropped from one fold's ensemble.
    Model,
    /// An observation was not bet on.
    Bet,
}

impl fmt::Display for SkipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Split => "split",
            Self::Fold => "fold",
            Self::Model => "model",
            Self::Bet => "bet",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub stage: SkipStage,
    /// Split index, model name or observation id.
    pub subject: String,
    pub reason: String,
}

impl SkipRecord {
    fn new(stage: SkipStage, subject: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            stage,
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}

/// One fold that produced test predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub split_index: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub weights: EnsembleWeights,
    pub dropped: Vec<DroppedModel>,
    pub validation_log_loss: f64,
}

/// Ensemble probability for one held-out observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldOutPrediction {
    pub observation_id: String,
    pub date: DateTime<Utc>,
    pub probability: f64,
    pub label: bool,
    /// Fold that produced the prediction.
    pub split_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Name of the split strategy.
    pub strategy: String,
    pub folds: Vec<FoldResult>,
    /// Held-out predictions in date order, one per observation.
    pub predictions: Vec<HeldOutPrediction>,
    /// Per-model validation probabilities from every fold.
    pub out_of_fold: Vec<OutOfFoldPrediction>,
    pub validation: ValidationReport,
    pub backtest: BacktestReport,
    pub feature_warnings: Vec<FeatureWarning>,
    pub stationarity: Vec<StationarityReport>,
    pub plan_warnings: Vec<String>,
    pub skipped: Vec<SkipRecord>,
}

impl EvaluationReport {
    /// Skip records from one stage.
    pub fn skipped_at(&self, stage: SkipStage) -> impl Iterator<Item = &SkipRecord> {
        self.skipped.iter().filter(move |s| s.stage == stage)
    }
}

/// Output of one successful fold.
struct FoldOutput {
    result: FoldResult,
    /// `(observation index, probability)` for the test window.
    predictions: Vec<(usize, f64)>,
    out_of_fold: Vec<OutOfFoldPrediction>,
}

/// Runs split planning, ensemble training, validation and backtesting.
#[derive(Debug, Clone, Default)]
pub struct EvaluationPipeline {
    config: EngineConfig,
    feature_names: Option<Vec<String>>,
}

impl EvaluationPipeline {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            feature_names: None,
        }
    }

    /// Names feature columns for leakage and stationarity checks.
    #[must_use]
    pub fn with_feature_names<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.feature_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plans folds with the configured strategy and evaluates them.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Data`] for empty or ragged input, a plan
    /// the strategy cannot build, or a bad validation fraction, and
    /// [`EvaluationError::Backtest`] for an unusable backtest configuration.
    pub fn run(
        &self,
        observations: &[Observation],
        factory: &dyn ModelFactory,
    ) -> Result<EvaluationReport, EvaluationError> {
        check_feature_widths(observations)?;
        let plan = SplitPlanner::plan(observations, &self.config.split.strategy)?;
        self.evaluate_plan(observations, plan, factory)
    }

    /// Evaluates an already planned set of folds.
    ///
    /// Splits are still checked for leakage; violating ones are skipped.
    ///
    /// # Errors
    ///
    /// Same conditions as [`EvaluationPipeline::run`], minus planning.
    pub fn evaluate_plan(
        &self,
        observations: &[Observation],
        plan: SplitPlan,
        factory: &dyn ModelFactory,
    ) -> Result<EvaluationReport, EvaluationError> {
        check_feature_widths(observations)?;
        let fraction = self.config.split.validation_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(DataIntegrityError::InvalidParameter {
                name: "validation_fraction",
                reason: format!("{fraction} is outside (0, 1)"),
            }
            .into());
        }
        // Rejected before any fold is trained.
        let backtester = Backtester::new(self.config.backtest.clone())?;

        let guard = LeakageGuard::new(self.config.leakage.clone());
        let (feature_warnings, stationarity) = self.advisory_checks(&guard, observations);

        let mut skipped = Vec::new();
        let mut splits = Vec::with_capacity(plan.splits.len());
        for split in plan.splits {
            match guard.check(&split, observations) {
                Ok(()) => splits.push(split),
                Err(violation) => {
                    warn!(split = split.split_index, %violation, "discarding split");
                    skipped.push(SkipRecord::new(
                        SkipStage::Split,
                        split.split_index.to_string(),
                        violation,
                    ));
                }
            }
        }

        let outputs: Vec<Result<FoldOutput, String>> = splits
            .par_iter()
            .map(|split| self.evaluate_fold(split, observations, factory))
            .collect();

        let mut folds = Vec::new();
        let mut out_of_fold = Vec::new();
        let mut held_out: Vec<Option<(f64, usize)>> = vec![None; observations.len()];
        for (split, output) in splits.iter().zip(outputs) {
            match output {
                Ok(output) => {
                    for model in &output.result.dropped {
                        skipped.push(SkipRecord::new(
                            SkipStage::Model,
                            model.name.clone(),
                            format!("split {}: {}", split.split_index, model.reason),
                        ));
                    }
                    for (index, probability) in output.predictions {
                        if held_out[index].is_none() {
                            held_out[index] = Some((probability, split.split_index));
                        }
                    }
                    out_of_fold.extend(output.out_of_fold);
                    folds.push(output.result);
                }
                Err(reason) => {
                    warn!(split = split.split_index, %reason, "fold skipped");
                    skipped.push(SkipRecord::new(
                        SkipStage::Fold,
                        split.split_index.to_string(),
                        reason,
                    ));
                }
            }
        }

        let mut order: Vec<usize> = (0..observations.len())
            .filter(|&i| held_out[i].is_some())
            .collect();
        order.sort_by_key(|&i| observations[i].date);

        let mut predictions = Vec::with_capacity(order.len());
        let mut labels = Vec::with_capacity(order.len());
        let mut probabilities = Vec::with_capacity(order.len());
        let mut market = Vec::with_capacity(order.len());
        let mut candidates = Vec::with_capacity(order.len());
        for &i in &order {
            let Some((probability, split_index)) = held_out[i] else {
                continue;
            };
            let obs = &observations[i];
            labels.push(obs.label);
            probabilities.push(probability);
            market.push(obs.market_probability());
            candidates.push(BetCandidate::from_observation(obs, probability));
            predictions.push(HeldOutPrediction {
                observation_id: obs.id.clone(),
                date: obs.date,
                probability,
                label: obs.label,
                split_index,
            });
        }

        let validator = StatisticalValidator::new(self.config.validation.clone());
        let validation = validator.evaluate(&labels, &probabilities, &market);

        let backtest = backtester.run(&candidates)?;
        skipped.extend(backtest.skipped.iter().map(|skip| {
            SkipRecord::new(SkipStage::Bet, skip.observation_id.clone(), skip.reason)
        }));

        info!(
            strategy = self.config.split.strategy.name(),
            folds = folds.len(),
            predictions = predictions.len(),
            bets = backtest.bets.len(),
            skipped = skipped.len(),
            "evaluation complete"
        );

        Ok(EvaluationReport {
            strategy: self.config.split.strategy.name().to_string(),
            folds,
            predictions,
            out_of_fold,
            validation,
            backtest,
            feature_warnings,
            stationarity,
            plan_warnings: plan.warnings,
            skipped,
        })
    }

    fn advisory_checks(
        &self,
        guard: &LeakageGuard,
        observations: &[Observation],
    ) -> (Vec<FeatureWarning>, Vec<StationarityReport>) {
        let width = observations.first().map_or(0, |o| o.features.len());
        let names: Vec<String> = match &self.feature_names {
            Some(names) => names.clone(),
            None => (0..width).map(|j| format!("feature_{j}")).collect(),
        };

        let mut chronological: Vec<&Observation> = observations.iter().collect();
        chronological.sort_by_key(|o| o.date);
        let matrix: Vec<Vec<f64>> = chronological.iter().map(|o| o.features.clone()).collect();

        (
            guard.check_features(&names),
            guard.check_stationarity(&matrix, &names),
        )
    }

    fn evaluate_fold(
        &self,
        split: &Split,
        observations: &[Observation],
        factory: &dyn ModelFactory,
    ) -> Result<FoldOutput, String> {
        let n_train = split.train_indices.len();
        if n_train < 2 {
            return Err(format!(
                "training window of {n_train} cannot be divided into fit and validation sets"
            ));
        }
        let n_validation = ((n_train as f64 * self.config.split.validation_fraction).round()
            as usize)
            .clamp(1, n_train - 1);
        let (fit_indices, validation_indices) =
            split.train_indices.split_at(n_train - n_validation);

        let train = LabeledSet::from_indices(observations, fit_indices);
        let validation = LabeledSet::from_indices(observations, validation_indices);
        let test = LabeledSet::from_indices(observations, &split.test_indices);

        let combiner = EnsembleCombiner::new(self.config.ensemble.clone());
        let ensemble = combiner
            .train_and_weight(&train, &validation, factory.build())
            .map_err(|e| e.to_string())?;
        let probabilities = ensemble.predict(&test.features).map_err(|e| e.to_string())?;

        Ok(FoldOutput {
            result: FoldResult {
                split_index: split.split_index,
                train_size: train.len(),
                validation_size: validation.len(),
                test_size: test.len(),
                weights: ensemble.weights().clone(),
                dropped: ensemble.dropped().to_vec(),
                validation_log_loss: ensemble.validation_log_loss(),
            },
            predictions: split
                .test_indices
                .iter()
                .copied()
                .zip(probabilities)
                .collect(),
            out_of_fold: ensemble.out_of_fold().to_vec(),
        })
    }
}

fn check_feature_widths(observations: &[Observation]) -> Result<(), DataIntegrityError> {
    let Some(first) = observations.first() else {
        return Err(DataIntegrityError::Empty);
    };
    let expected = first.features.len();
    match observations.iter().find(|o| o.features.len() != expected) {
        Some(obs) => Err(DataIntegrityError::RaggedFeatures {
            id: obs.id.clone(),
            expected,
            found: obs.features.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::SkipReason;
    use crate::ensemble::combiner::test_models::{base_rate, faulty, feature, Fault};
    use chrono::{Duration, TimeZone};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use sports_edge_core::{BacktestError, ModelHandle, SplitStrategy};
    use std::collections::HashSet;

    fn games(n: usize, seed: u64) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let x: f64 = rng.gen_range(-1.0..1.0);
                let p = 1.0 / (1.0 + (-3.0 * x).exp());
                let label = rng.gen::<f64>() < p;
                Observation::new(format!("g{i}"), start + Duration::days(i as i64), vec![x], label)
                    .with_odds(1.91)
                    .with_opposing_odds(1.91)
            })
            .collect()
    }

    fn signal_models() -> Vec<Box<dyn ModelHandle>> {
        vec![feature("signal", 3.0), base_rate("prior")]
    }

    fn walk_forward_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.split.strategy = SplitStrategy::WalkForward {
            n_splits: 5,
            min_train_size: 100,
        };
        config.validation.n_permutations = 200;
        config
    }

    // ============================================
    // End-to-end runs
    // ============================================

    #[test]
    fn walk_forward_run_scores_every_test_window() {
        let observations = games(300, 1);
        let report = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &signal_models)
            .unwrap();

        assert_eq!(report.strategy, "walk_forward");
        assert_eq!(report.folds.len(), 5);
        let tested: usize = report.folds.iter().map(|f| f.test_size).sum();
        assert_eq!(report.predictions.len(), tested);
        assert_eq!(report.validation.n, tested);

        for fold in &report.folds {
            assert!((fold.weights.sum() - 1.0).abs() < 1e-9);
            assert!(fold.validation_size >= 1);
        }
        assert!(report.predictions.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(report.validation.roc_auc.value().unwrap() > 0.6);
        assert!(report.skipped_at(SkipStage::Split).next().is_none());
        assert!(report.skipped_at(SkipStage::Fold).next().is_none());
    }

    #[test]
    fn backtest_replays_held_out_predictions() {
        let observations = games(300, 2);
        let report = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &signal_models)
            .unwrap();

        let backtest = &report.backtest;
        assert_eq!(
            backtest.bets.len() + backtest.skipped.len(),
            report.predictions.len()
        );
        assert_eq!(report.skipped_at(SkipStage::Bet).count(), backtest.skipped.len());
        assert_eq!(backtest.history.len(), backtest.bets.len() + 1);
    }

    #[test]
    fn runs_are_reproducible() {
        let observations = games(240, 3);
        let pipeline = EvaluationPipeline::new(walk_forward_config());
        let a = pipeline.run(&observations, &signal_models).unwrap();
        let b = pipeline.run(&observations, &signal_models).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_test_windows_keep_first_prediction() {
        let observations = games(260, 4);
        let mut config = walk_forward_config();
        config.split.strategy = SplitStrategy::SlidingWindow {
            window_size: 100,
            step_size: 20,
            test_size: 40,
            min_test_size: 10,
        };
        let report = EvaluationPipeline::new(config)
            .run(&observations, &signal_models)
            .unwrap();

        let ids: HashSet<&str> = report
            .predictions
            .iter()
            .map(|p| p.observation_id.as_str())
            .collect();
        assert_eq!(ids.len(), report.predictions.len());
        let tested: usize = report.folds.iter().map(|f| f.test_size).sum();
        assert!(report.predictions.len() < tested);

        // g130 is in the test window of the first fold covering it.
        let g130 = report
            .predictions
            .iter()
            .find(|p| p.observation_id == "g130")
            .unwrap();
        assert_eq!(g130.split_index, 0);
    }

    // ============================================
    // Skips and failures
    // ============================================

    #[test]
    fn leaking_split_is_discarded_and_recorded() {
        let observations = games(200, 5);
        let plan = SplitPlan {
            splits: vec![
                Split {
                    split_index: 0,
                    train_indices: (0..120).collect(),
                    test_indices: (120..160).collect(),
                },
                Split {
                    split_index: 1,
                    train_indices: (40..200).collect(),
                    test_indices: (0..40).collect(),
                },
            ],
            warnings: Vec::new(),
        };
        let report = EvaluationPipeline::new(walk_forward_config())
            .evaluate_plan(&observations, plan, &signal_models)
            .unwrap();

        assert_eq!(report.folds.len(), 1);
        let skipped: Vec<&SkipRecord> = report.skipped_at(SkipStage::Split).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].subject, "1");
        assert!(report.predictions.iter().all(|p| p.split_index == 0));
    }

    #[test]
    fn failing_model_is_dropped_per_fold() {
        let observations = games(300, 6);
        let factory = || vec![feature("signal", 3.0), faulty("broken", Fault::Fit)];
        let report = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &factory)
            .unwrap();

        assert_eq!(report.folds.len(), 5);
        let dropped: Vec<&SkipRecord> = report.skipped_at(SkipStage::Model).collect();
        assert_eq!(dropped.len(), 5);
        assert!(dropped.iter().all(|s| s.subject == "broken"));
        for fold in &report.folds {
            assert_eq!(fold.weights.get("signal"), Some(1.0));
        }
    }

    #[test]
    fn fold_without_usable_models_is_skipped_not_fatal() {
        let observations = games(300, 7);
        let factory = || vec![faulty("a", Fault::Fit), faulty("b", Fault::Predict)];
        let report = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &factory)
            .unwrap();

        assert!(report.folds.is_empty());
        assert_eq!(report.skipped_at(SkipStage::Fold).count(), 5);
        assert!(report.predictions.is_empty());
        assert_eq!(report.validation.n, 0);
        assert!(report.backtest.bets.is_empty());
    }

    #[test]
    fn observations_without_odds_are_not_bet() {
        let observations: Vec<Observation> = games(300, 8)
            .into_iter()
            .map(|mut o| {
                o.decimal_odds = None;
                o.opposing_odds = None;
                o
            })
            .collect();
        let report = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &signal_models)
            .unwrap();

        assert!(report.backtest.bets.is_empty());
        assert!(report
            .backtest
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::NoOdds));
        assert!(report.validation.vegas.is_none());
    }

    // ============================================
    // Input checks
    // ============================================

    #[test]
    fn ragged_features_are_rejected() {
        let mut observations = games(150, 9);
        observations[42].features.push(0.0);
        let err = EvaluationPipeline::new(walk_forward_config())
            .run(&observations, &signal_models)
            .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Data(DataIntegrityError::RaggedFeatures {
                id: "g42".to_string(),
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = EvaluationPipeline::default()
            .run(&[], &signal_models)
            .unwrap_err();
        assert_eq!(err, EvaluationError::Data(DataIntegrityError::Empty));
    }

    #[test]
    fn validation_fraction_must_be_a_proper_fraction() {
        let mut config = walk_forward_config();
        config.split.validation_fraction = 1.0;
        let err = EvaluationPipeline::new(config)
            .run(&games(300, 10), &signal_models)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Data(DataIntegrityError::InvalidParameter {
                name: "validation_fraction",
                ..
            })
        ));
    }

    #[test]
    fn bad_backtest_config_is_a_config_error() {
        let mut config = walk_forward_config();
        config.backtest.kelly_multiplier = 1.5;
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let factory = || -> Vec<Box<dyn ModelHandle>> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            signal_models()
        };
        let err = EvaluationPipeline::new(config)
            .run(&games(300, 12), &factory)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Backtest(BacktestError::InvalidConfig { .. })
        ));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn suspicious_feature_names_are_reported() {
        let report = EvaluationPipeline::new(walk_forward_config())
            .with_feature_names(["final_score_margin"])
            .run(&games(300, 11), &signal_models)
            .unwrap();
        assert_eq!(report.feature_warnings.len(), 1);
        assert_eq!(report.stationarity.len(), 1);
        assert_eq!(report.stationarity[0].feature, "final_score_margin");
    }
}
