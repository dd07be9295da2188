//! Walk-forward evaluation, statistical validation and Kelly backtesting
//! for probabilistic sports forecasts.

pub mod betting;
pub mod data_provider;
pub mod ensemble;
pub mod pipeline;
pub mod split;
pub mod stats;

pub use betting::{
    BacktestReport, BacktestSummary, Backtester, Bet, BetCandidate, BetOutcome, BetSide,
    BootstrapConfig, BootstrapMetrics, BootstrapResampler, BootstrapResult, SkipReason,
    SkippedBet,
};
pub use data_provider::{ObservationCsv, PredictionCsv, PredictionRecord};
pub use ensemble::{EnsembleCombiner, EnsembleWeights, LabeledSet, TrainedEnsemble};
pub use pipeline::{
    EvaluationPipeline, EvaluationReport, FoldResult, HeldOutPrediction, SkipRecord, SkipStage,
};
pub use split::{LeakageGuard, SplitPlan, SplitPlanner};
pub use stats::{StatisticalValidator, ValidationReport};
