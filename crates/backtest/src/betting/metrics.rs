//! Summary statistics for a settled bet ledger.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sports_edge_core::{MetricValue, UndefinedReason};

use super::engine::{Bet, BetOutcome, SkipReason, SkippedBet};

/// Aggregate performance of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub net_pnl: Decimal,
    /// `(final - initial) / initial`.
    pub roi: f64,
    pub total_staked: Decimal,
    /// Net P&L per unit staked.
    pub yield_on_turnover: MetricValue,
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: MetricValue,
    /// Gross winnings over gross losses.
    pub profit_factor: MetricValue,
    /// Largest peak-to-trough fall in balance.
    pub max_drawdown: Decimal,
    /// Largest peak-to-trough fall as a fraction of the peak.
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: usize,
    pub skipped: usize,
    pub skip_counts: BTreeMap<SkipReason, usize>,
}

impl BacktestSummary {
    /// Summarizes a ledger.
    ///
    /// `history` is the balance after each bet, starting with the initial
    /// balance.
    #[must_use]
    pub fn from_ledger(
        initial_balance: Decimal,
        history: &[Decimal],
        bets: &[Bet],
        skipped: &[SkippedBet],
    ) -> Self {
        let final_balance = history.last().copied().unwrap_or(initial_balance);
        let net_pnl = final_balance - initial_balance;
        let roi = if initial_balance > Decimal::ZERO {
            to_f64(net_pnl / initial_balance)
        } else {
            0.0
        };

        let total_staked: Decimal = bets.iter().map(|b| b.stake).sum();
        let yield_on_turnover = if total_staked > Decimal::ZERO {
            MetricValue::Defined(to_f64(
                bets.iter().map(|b| b.pnl).sum::<Decimal>() / total_staked,
            ))
        } else {
            MetricValue::Undefined(UndefinedReason::Empty)
        };

        let wins = bets.iter().filter(|b| b.outcome == BetOutcome::Win).count();
        let losses = bets.len() - wins;
        let win_rate = if bets.is_empty() {
            MetricValue::Undefined(UndefinedReason::Empty)
        } else {
            MetricValue::Defined(wins as f64 / bets.len() as f64)
        };

        let gross_win: Decimal = bets
            .iter()
            .filter(|b| b.pnl > Decimal::ZERO)
            .map(|b| b.pnl)
            .sum();
        let gross_loss: Decimal = bets
            .iter()
            .filter(|b| b.pnl < Decimal::ZERO)
            .map(|b| b.pnl.abs())
            .sum();
        let profit_factor = if gross_loss > Decimal::ZERO {
            MetricValue::Defined(to_f64(gross_win / gross_loss))
        } else {
            MetricValue::Undefined(UndefinedReason::ZeroDenominator)
        };

        let (max_drawdown, max_drawdown_pct) = calculate_max_drawdown(history);

        let mut skip_counts = BTreeMap::new();
        for skip in skipped {
            *skip_counts.entry(skip.reason).or_insert(0) += 1;
        }

        Self {
            initial_balance,
            final_balance,
            net_pnl,
            roi,
            total_staked,
            yield_on_turnover,
            bets: bets.len(),
            wins,
            losses,
            win_rate,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            max_consecutive_losses: max_consecutive_losses(bets),
            skipped: skipped.len(),
            skip_counts,
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    f64::try_from(value).unwrap_or(0.0)
}

/// Largest peak-to-trough drop, absolute and as a fraction of the peak.
#[must_use]
pub fn calculate_max_drawdown(history: &[Decimal]) -> (Decimal, f64) {
    let Some(&first) = history.first() else {
        return (Decimal::ZERO, 0.0);
    };

    let mut peak = first;
    let mut max_dd = Decimal::ZERO;
    let mut max_pct = 0.0;
    for &balance in history {
        if balance > peak {
            peak = balance;
        }
        let drawdown = peak - balance;
        if drawdown > max_dd {
            max_dd = drawdown;
        }
        if peak > Decimal::ZERO {
            let pct = to_f64(drawdown / peak);
            if pct > max_pct {
                max_pct = pct;
            }
        }
    }
    (max_dd, max_pct)
}

fn max_consecutive_losses(bets: &[Bet]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for bet in bets {
        if bet.outcome == BetOutcome::Loss {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::engine::BetSide;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bet(stake: Decimal, pnl: Decimal) -> Bet {
        Bet {
            observation_id: "g".to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            side: BetSide::Modeled,
            probability: 0.6,
            decimal_odds: 2.0,
            stake,
            outcome: if pnl > Decimal::ZERO {
                BetOutcome::Win
            } else {
                BetOutcome::Loss
            },
            pnl,
            balance_after: Decimal::ZERO,
        }
    }

    #[test]
    fn summary_of_mixed_ledger() {
        let bets = vec![
            bet(dec!(100), dec!(100)),
            bet(dec!(100), dec!(-100)),
            bet(dec!(100), dec!(-100)),
            bet(dec!(100), dec!(150)),
        ];
        let history = vec![dec!(1000), dec!(1100), dec!(1000), dec!(900), dec!(1050)];
        let summary = BacktestSummary::from_ledger(dec!(1000), &history, &bets, &[]);

        assert_eq!(summary.final_balance, dec!(1050));
        assert_eq!(summary.net_pnl, dec!(50));
        assert!((summary.roi - 0.05).abs() < 1e-12);
        assert_eq!(summary.total_staked, dec!(400));
        assert!((summary.yield_on_turnover.value().unwrap() - 0.125).abs() < 1e-12);
        assert_eq!(summary.wins, 2);
        assert_eq!(summary.losses, 2);
        assert_eq!(summary.win_rate, MetricValue::Defined(0.5));
        assert!((summary.profit_factor.value().unwrap() - 1.25).abs() < 1e-12);
        assert_eq!(summary.max_drawdown, dec!(200));
        assert!((summary.max_drawdown_pct - 200.0 / 1100.0).abs() < 1e-12);
        assert_eq!(summary.max_consecutive_losses, 2);
    }

    #[test]
    fn profit_factor_undefined_without_losses() {
        let bets = vec![bet(dec!(50), dec!(50))];
        let summary =
            BacktestSummary::from_ledger(dec!(100), &[dec!(100), dec!(150)], &bets, &[]);
        assert_eq!(
            summary.profit_factor,
            MetricValue::Undefined(UndefinedReason::ZeroDenominator)
        );
        assert_eq!(summary.max_drawdown, Decimal::ZERO);
    }

    #[test]
    fn empty_ledger_is_flat() {
        let summary = BacktestSummary::from_ledger(dec!(100), &[dec!(100)], &[], &[]);
        assert_eq!(summary.final_balance, dec!(100));
        assert!(summary.roi.abs() < f64::EPSILON);
        assert_eq!(summary.win_rate, MetricValue::Undefined(UndefinedReason::Empty));
        assert_eq!(
            summary.yield_on_turnover,
            MetricValue::Undefined(UndefinedReason::Empty)
        );
    }

    #[test]
    fn skip_counts_group_by_reason() {
        let skip = |reason| SkippedBet {
            observation_id: "s".to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            reason,
        };
        let skipped = vec![
            skip(SkipReason::NoOdds),
            skip(SkipReason::NoEdge),
            skip(SkipReason::NoOdds),
        ];
        let summary = BacktestSummary::from_ledger(dec!(100), &[dec!(100)], &[], &skipped);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.skip_counts[&SkipReason::NoOdds], 2);
        assert_eq!(summary.skip_counts[&SkipReason::NoEdge], 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["skip_counts"]["no_odds"], 2);
    }

    #[test]
    fn drawdown_to_zero_is_total() {
        let (dd, pct) = calculate_max_drawdown(&[dec!(100), dec!(50), dec!(0)]);
        assert_eq!(dd, dec!(100));
        assert!((pct - 1.0).abs() < 1e-12);
    }
}
