use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use super::engine::{Bet, BetOutcome, BetSide};

pub const LEDGER_HEADER: [&str; 9] = [
    "observation_id",
    "date",
    "side",
    "probability",
    "decimal_odds",
    "stake",
    "outcome",
    "pnl",
    "balance_after",
];

/// Writes settled bets as CSV, one row per bet in ledger order.
///
/// # Errors
/// Returns error if writing to `writer` fails
pub fn write_ledger<W: Write>(writer: W, bets: &[Bet]) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(LEDGER_HEADER)?;

    for bet in bets {
        writer.write_record(&[
            bet.observation_id.clone(),
            bet.date.to_rfc3339(),
            match bet.side {
                BetSide::Modeled => "modeled",
                BetSide::Opposing => "opposing",
            }
            .to_string(),
            bet.probability.to_string(),
            bet.decimal_odds.to_string(),
            bet.stake.to_string(),
            match bet.outcome {
                BetOutcome::Win => "win",
                BetOutcome::Loss => "loss",
            }
            .to_string(),
            bet.pnl.to_string(),
            bet.balance_after.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the ledger to a file at `path`.
///
/// # Errors
/// Returns error if the file cannot be created or writing fails
pub fn write_ledger_csv(path: impl AsRef<Path>, bets: &[Bet]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create ledger file: {}", path.display()))?;
    write_ledger(file, bets)
        .with_context(|| format!("Failed to write ledger: {}", path.display()))
}
