//! CLI commands for forecast validation and backtesting.

pub mod backtest;
pub mod evaluate;
pub mod kelly;
pub mod output;
pub mod validate;

pub use backtest::{run_backtest, BacktestArgs};
pub use evaluate::{run_evaluate, EvaluateArgs};
pub use kelly::{run_kelly, KellyArgs};
pub use validate::{run_validate, ValidateArgs};
