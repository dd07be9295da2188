//! Kelly-staked bankroll replay over held-out predictions.

pub mod bootstrap;
pub mod engine;
pub mod ledger;
pub mod metrics;

pub use bootstrap::{
    percentile_ci, BootstrapConfig, BootstrapMetrics, BootstrapResampler, BootstrapResult,
};
pub use engine::{
    BacktestReport, Backtester, BankrollState, Bet, BetCandidate, BetOutcome, BetSide,
    SkipReason, SkippedBet, StepOutcome,
};
pub use ledger::{write_ledger, write_ledger_csv, LEDGER_HEADER};
pub use metrics::{calculate_max_drawdown, BacktestSummary};
