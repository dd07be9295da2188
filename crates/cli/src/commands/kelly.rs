//! One-off Kelly stake calculation.

use anyhow::{anyhow, Result};
use clap::Args;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use sports_edge_core::kelly::{expected_value, implied_probability};
use sports_edge_core::KellyStaker;

use super::output::{banner, emit, section, OutputFormat, RULE};

/// Arguments for the kelly command.
#[derive(Args, Debug, Clone)]
pub struct KellyArgs {
    /// Model win probability, in [0, 1]
    #[arg(short, long)]
    pub probability: f64,

    /// Decimal odds offered, above 1.0
    #[arg(short, long)]
    pub odds: f64,

    /// Fraction of full Kelly to stake (default: 0.25)
    #[arg(short, long, default_value = "0.25")]
    pub multiplier: f64,

    /// Bankroll to size a concrete stake against
    #[arg(short, long)]
    pub bankroll: Option<f64>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KellyOutput {
    pub probability: f64,
    pub odds: f64,
    pub implied_probability: f64,
    pub expected_value: f64,
    pub full_kelly: f64,
    pub multiplier: f64,
    pub recommended_fraction: f64,
    pub stake: Option<Decimal>,
}

/// Sizes a single bet.
pub fn calculate(args: &KellyArgs) -> Result<KellyOutput> {
    if !(0.0..=1.0).contains(&args.probability) {
        return Err(anyhow!(
            "Probability must be in [0, 1], got {}",
            args.probability
        ));
    }
    let staker = KellyStaker::new(args.multiplier);
    let full_kelly = staker.fraction(args.probability, args.odds)?;
    let recommended_fraction = full_kelly * staker.multiplier;

    let stake = match args.bankroll {
        Some(bankroll) => {
            let bankroll = Decimal::try_from(bankroll)
                .map_err(|_| anyhow!("Invalid bankroll amount: {bankroll}"))?;
            let fraction = Decimal::try_from(recommended_fraction).unwrap_or(Decimal::ZERO);
            Some((bankroll * fraction).round_dp_with_strategy(2, RoundingStrategy::ToZero))
        }
        None => None,
    };

    Ok(KellyOutput {
        probability: args.probability,
        odds: args.odds,
        implied_probability: implied_probability(args.odds),
        expected_value: expected_value(args.probability, args.odds),
        full_kelly,
        multiplier: staker.multiplier,
        recommended_fraction,
        stake,
    })
}

pub fn format_text_report(output: &KellyOutput) -> String {
    let mut out = String::new();
    banner(&mut out, "KELLY STAKE");
    section(&mut out, "INPUTS");
    out.push_str(&format!("Win Probability:  {:.2}%\n", output.probability * 100.0));
    out.push_str(&format!("Decimal Odds:     {:.3}\n", output.odds));
    out.push_str(&format!(
        "Break-even:       {:.2}%\n",
        output.implied_probability * 100.0
    ));
    out.push_str(&format!(
        "EV per unit:      {:+.4}\n",
        output.expected_value
    ));
    out.push('\n');

    section(&mut out, "SIZING");
    out.push_str(&format!("Full Kelly:       {:.2}%\n", output.full_kelly * 100.0));
    out.push_str(&format!("Multiplier:       {:.2}\n", output.multiplier));
    out.push_str(&format!(
        "Recommended:      {:.2}% of bankroll\n",
        output.recommended_fraction * 100.0
    ));
    if let Some(stake) = output.stake {
        out.push_str(&format!("Stake:            ${stake:.2}\n"));
    }
    out.push_str(RULE);
    out.push('\n');
    if output.full_kelly > 0.0 {
        out.push_str("BET\n");
    } else {
        out.push_str("NO BET - no edge at these odds\n");
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

/// Runs the kelly command.
///
/// # Errors
/// Returns an error for out-of-range probability, odds not above 1.0, or
/// an unrepresentable bankroll.
pub fn run_kelly(args: KellyArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let output = calculate(&args)?;
    emit(&output, format, format_text_report, None)
}
