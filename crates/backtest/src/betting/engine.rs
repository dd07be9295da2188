//! Sequential bankroll replay.
//!
//! A [`Backtester`] walks held-out predictions in date order, sizes each bet
//! with fractional Kelly and settles it against the known outcome.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Running --step()*--> Running --finish()--> Complete
//! ```
//!
//! A run can stop stepping at any point; `finish()` still returns the ledger
//! accumulated so far.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sports_edge_core::{BacktestConfig, BacktestError, KellyStaker, Observation};

use super::metrics::BacktestSummary;

/// Cents.
const MONEY_DP: u32 = 2;

/// One held-out prediction offered to the backtester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetCandidate {
    pub observation_id: String,
    pub date: DateTime<Utc>,
    /// Model probability that the label is true.
    pub probability: f64,
    pub label: bool,
    /// Decimal odds on the `label == true` side.
    pub decimal_odds: Option<f64>,
    /// Decimal odds on the other side.
    pub opposing_odds: Option<f64>,
}

impl BetCandidate {
    /// Pairs an observation with a held-out probability.
    #[must_use]
    pub fn from_observation(observation: &Observation, probability: f64) -> Self {
        Self {
            observation_id: observation.id.clone(),
            date: observation.date,
            probability,
            label: observation.label,
            decimal_odds: observation.decimal_odds,
            opposing_odds: observation.opposing_odds,
        }
    }
}

/// Which side of the game a bet backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetSide {
    /// The side whose win is `label == true`.
    Modeled,
    /// The other side.
    Opposing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetOutcome {
    Win,
    Loss,
}

/// A settled bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub observation_id: String,
    pub date: DateTime<Utc>,
    pub side: BetSide,
    /// Win probability of the backed side.
    pub probability: f64,
    pub decimal_odds: f64,
    pub stake: Decimal,
    pub outcome: BetOutcome,
    pub pnl: Decimal,
    pub balance_after: Decimal,
}

/// Why a candidate produced no bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No odds for the side the model favours.
    NoOdds,
    /// Coin-flip probability or no Kelly edge.
    NoEdge,
    /// Backed side's probability is under the configured minimum.
    BelowThreshold,
    /// Odds at or below 1.0 or not finite.
    InvalidOdds,
    /// Balance has reached zero.
    BankrollDepleted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoOdds => "no odds",
            Self::NoEdge => "no edge",
            Self::BelowThreshold => "below probability threshold",
            Self::InvalidOdds => "invalid odds",
            Self::BankrollDepleted => "bankroll depleted",
        };
        f.write_str(text)
    }
}

/// A candidate that was not bet on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedBet {
    pub observation_id: String,
    pub date: DateTime<Utc>,
    pub reason: SkipReason,
}

/// Result of one [`Backtester::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Placed(Bet),
    Skipped(SkipReason),
}

/// Balance and its history, one entry per settled bet after the opening one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollState {
    pub balance: Decimal,
    pub history: Vec<Decimal>,
}

impl BankrollState {
    fn new(initial: Decimal) -> Self {
        Self {
            balance: initial,
            history: vec![initial],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Complete,
}

impl RunState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Complete => "complete",
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub summary: BacktestSummary,
    pub bets: Vec<Bet>,
    pub skipped: Vec<SkippedBet>,
    pub history: Vec<Decimal>,
}

/// Kelly-staked bankroll replay over chronologically ordered candidates.
#[derive(Debug)]
pub struct Backtester {
    config: BacktestConfig,
    staker: KellyStaker,
    state: RunState,
    bankroll: BankrollState,
    bets: Vec<Bet>,
    skipped: Vec<SkippedBet>,
    last_date: Option<DateTime<Utc>>,
}

impl Backtester {
    /// Creates an idle backtester.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::InvalidConfig`] for a non-positive bankroll,
    /// a Kelly multiplier outside (0, 1] or a stake cap outside (0, 1].
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        if config.initial_bankroll <= Decimal::ZERO {
            return Err(BacktestError::InvalidConfig {
                reason: format!("initial bankroll {} must be positive", config.initial_bankroll),
            });
        }
        if !(config.kelly_multiplier > 0.0 && config.kelly_multiplier <= 1.0) {
            return Err(BacktestError::InvalidConfig {
                reason: format!(
                    "kelly multiplier {} must be in (0, 1]",
                    config.kelly_multiplier
                ),
            });
        }
        if let Some(cap) = config.max_stake_fraction {
            if !(cap > 0.0 && cap <= 1.0) {
                return Err(BacktestError::InvalidConfig {
                    reason: format!("max stake fraction {cap} must be in (0, 1]"),
                });
            }
        }

        Ok(Self {
            staker: KellyStaker::new(config.kelly_multiplier),
            bankroll: BankrollState::new(config.initial_bankroll),
            config,
            state: RunState::Idle,
            bets: Vec::new(),
            skipped: Vec::new(),
            last_date: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.bankroll.balance
    }

    #[must_use]
    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    fn expect_state(&self, expected: RunState) -> Result<(), BacktestError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BacktestError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Moves from idle to running.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::InvalidState`] unless idle.
    pub fn start(&mut self) -> Result<(), BacktestError> {
        self.expect_state(RunState::Idle)?;
        self.state = RunState::Running;
        info!(bankroll = %self.bankroll.balance, "backtest started");
        Ok(())
    }

    /// Processes one candidate.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::InvalidState`] unless running, and
    /// [`BacktestError::OutOfOrder`] if `candidate` is dated before the
    /// previous one.
    pub fn step(&mut self, candidate: &BetCandidate) -> Result<StepOutcome, BacktestError> {
        self.expect_state(RunState::Running)?;
        if let Some(previous) = self.last_date {
            if candidate.date < previous {
                return Err(BacktestError::OutOfOrder {
                    id: candidate.observation_id.clone(),
                    date: candidate.date,
                    previous,
                });
            }
        }
        self.last_date = Some(candidate.date);

        let outcome = match self.evaluate(candidate) {
            Ok(bet) => {
                self.bankroll.balance = bet.balance_after;
                self.bankroll.history.push(bet.balance_after);
                self.bets.push(bet.clone());
                StepOutcome::Placed(bet)
            }
            Err(reason) => {
                debug!(id = %candidate.observation_id, %reason, "candidate skipped");
                self.skipped.push(SkippedBet {
                    observation_id: candidate.observation_id.clone(),
                    date: candidate.date,
                    reason,
                });
                StepOutcome::Skipped(reason)
            }
        };
        Ok(outcome)
    }

    /// Sizes and settles a bet, or says why there is none.
    fn evaluate(&self, candidate: &BetCandidate) -> Result<Bet, SkipReason> {
        let balance = self.bankroll.balance;
        if balance <= Decimal::ZERO {
            return Err(SkipReason::BankrollDepleted);
        }

        let p = candidate.probability;
        if !p.is_finite() || p == 0.5 {
            return Err(SkipReason::NoEdge);
        }
        let (side, odds, side_probability) = if p > 0.5 {
            (BetSide::Modeled, candidate.decimal_odds, p)
        } else {
            (BetSide::Opposing, candidate.opposing_odds, 1.0 - p)
        };
        let odds = odds.ok_or(SkipReason::NoOdds)?;

        if side_probability < self.config.min_probability_threshold {
            return Err(SkipReason::BelowThreshold);
        }

        let full_kelly = match self.staker.fraction(side_probability, odds) {
            Ok(f) => f,
            Err(e) => {
                warn!(id = %candidate.observation_id, error = %e, "skipping bet");
                return Err(SkipReason::InvalidOdds);
            }
        };
        if full_kelly <= self.config.min_fraction {
            return Err(SkipReason::NoEdge);
        }

        let mut fraction = full_kelly * self.staker.multiplier;
        if let Some(cap) = self.config.max_stake_fraction {
            fraction = fraction.min(cap);
        }
        let fraction = Decimal::try_from(fraction).map_err(|_| SkipReason::NoEdge)?;
        let odds_decimal = Decimal::try_from(odds).map_err(|_| SkipReason::InvalidOdds)?;

        let stake = (balance * fraction).round_dp(MONEY_DP).min(balance);
        if stake <= Decimal::ZERO {
            return Err(SkipReason::NoEdge);
        }

        let won = (p > 0.5) == candidate.label;
        let (outcome, pnl) = if won {
            let profit = (stake * (odds_decimal - Decimal::ONE)).round_dp(MONEY_DP);
            (BetOutcome::Win, profit)
        } else {
            (BetOutcome::Loss, -stake)
        };
        let balance_after = (balance + pnl).max(Decimal::ZERO);

        Ok(Bet {
            observation_id: candidate.observation_id.clone(),
            date: candidate.date,
            side,
            probability: side_probability,
            decimal_odds: odds,
            stake,
            outcome,
            pnl,
            balance_after,
        })
    }

    /// Moves from running to complete and summarizes the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::InvalidState`] unless running.
    pub fn finish(&mut self) -> Result<BacktestReport, BacktestError> {
        self.expect_state(RunState::Running)?;
        self.state = RunState::Complete;

        let summary = BacktestSummary::from_ledger(
            self.config.initial_bankroll,
            &self.bankroll.history,
            &self.bets,
            &self.skipped,
        );
        info!(
            bets = summary.bets,
            final_balance = %summary.final_balance,
            roi = summary.roi,
            "backtest complete"
        );

        Ok(BacktestReport {
            summary,
            bets: std::mem::take(&mut self.bets),
            skipped: std::mem::take(&mut self.skipped),
            history: self.bankroll.history.clone(),
        })
    }

    /// Replays `candidates` after a stable sort by date.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::InvalidState`] if this backtester was
    /// already started.
    pub fn run(mut self, candidates: &[BetCandidate]) -> Result<BacktestReport, BacktestError> {
        let mut ordered: Vec<&BetCandidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.date);

        self.start()?;
        for candidate in ordered {
            self.step(candidate)?;
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap() + Duration::days(offset)
    }

    fn candidate(id: &str, offset: i64, probability: f64, label: bool, odds: f64) -> BetCandidate {
        BetCandidate {
            observation_id: id.to_string(),
            date: day(offset),
            probability,
            label,
            decimal_odds: Some(odds),
            opposing_odds: None,
        }
    }

    fn backtester() -> Backtester {
        Backtester::new(BacktestConfig::default()).unwrap()
    }

    // ============================================
    // Settlement Tests
    // ============================================

    #[test]
    fn single_winning_bet_at_even_money() {
        // Kelly 0.2, quarter Kelly 0.05, stake 500, profit 500
        let report = backtester()
            .run(&[candidate("g1", 0, 0.6, true, 2.0)])
            .unwrap();

        assert_eq!(report.bets.len(), 1);
        let bet = &report.bets[0];
        assert_eq!(bet.stake, dec!(500));
        assert_eq!(bet.pnl, dec!(500));
        assert_eq!(bet.outcome, BetOutcome::Win);
        assert_eq!(bet.balance_after, dec!(10500));
        assert_eq!(report.summary.final_balance, dec!(10500));
        assert_eq!(report.history, vec![dec!(10000), dec!(10500)]);
    }

    #[test]
    fn losing_bet_removes_stake() {
        let report = backtester()
            .run(&[candidate("g1", 0, 0.6, false, 2.0)])
            .unwrap();
        assert_eq!(report.bets[0].outcome, BetOutcome::Loss);
        assert_eq!(report.bets[0].pnl, dec!(-500));
        assert_eq!(report.summary.final_balance, dec!(9500));
    }

    #[test]
    fn low_probability_backs_opposing_side() {
        let mut c = candidate("g1", 0, 0.3, false, 3.0);
        c.opposing_odds = Some(2.0);
        let report = backtester().run(&[c]).unwrap();

        let bet = &report.bets[0];
        assert_eq!(bet.side, BetSide::Opposing);
        assert!((bet.probability - 0.7).abs() < 1e-12);
        assert!((bet.decimal_odds - 2.0).abs() < f64::EPSILON);
        // Opposing side wins because the label is false
        assert_eq!(bet.outcome, BetOutcome::Win);
    }

    #[test]
    fn stake_compounds_on_current_balance() {
        let report = backtester()
            .run(&[
                candidate("g1", 0, 0.6, true, 2.0),
                candidate("g2", 1, 0.6, true, 2.0),
            ])
            .unwrap();
        assert_eq!(report.bets[1].stake, dec!(525));
        assert_eq!(report.summary.final_balance, dec!(11025));
    }

    #[test]
    fn stake_cap_limits_fraction() {
        let config = BacktestConfig::default()
            .with_kelly_multiplier(1.0)
            .with_max_stake_fraction(0.02);
        let report = Backtester::new(config)
            .unwrap()
            .run(&[candidate("g1", 0, 0.9, true, 2.0)])
            .unwrap();
        assert_eq!(report.bets[0].stake, dec!(200));
    }

    // ============================================
    // Skip Tests
    // ============================================

    #[test]
    fn skips_are_recorded_with_reasons() {
        let mut no_odds = candidate("no_odds", 0, 0.7, true, 2.0);
        no_odds.decimal_odds = None;
        let mut bad_odds = candidate("bad_odds", 1, 0.7, true, 1.0);
        bad_odds.decimal_odds = Some(0.95);
        let report = backtester()
            .run(&[
                no_odds,
                candidate("coin_flip", 0, 0.5, true, 2.0),
                candidate("no_edge", 1, 0.52, true, 1.8),
                bad_odds,
                candidate("opposing_missing", 2, 0.2, false, 5.0),
            ])
            .unwrap();

        assert!(report.bets.is_empty());
        let reasons: Vec<(&str, SkipReason)> = report
            .skipped
            .iter()
            .map(|s| (s.observation_id.as_str(), s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("no_odds", SkipReason::NoOdds),
                ("coin_flip", SkipReason::NoEdge),
                ("no_edge", SkipReason::NoEdge),
                ("bad_odds", SkipReason::InvalidOdds),
                ("opposing_missing", SkipReason::NoOdds),
            ]
        );
        assert_eq!(report.summary.final_balance, dec!(10000));
    }

    #[test]
    fn threshold_filters_weak_probabilities() {
        let config = BacktestConfig::default().with_min_probability(0.6);
        let report = Backtester::new(config)
            .unwrap()
            .run(&[candidate("g1", 0, 0.58, true, 3.0)])
            .unwrap();
        assert_eq!(report.skipped[0].reason, SkipReason::BelowThreshold);
    }

    #[test]
    fn depleted_bankroll_skips_remaining_bets() {
        let config = BacktestConfig::default().with_kelly_multiplier(1.0);
        // p = 0.99 at even money: full Kelly 0.98, one loss leaves 2%
        let candidates: Vec<BetCandidate> = (0..4)
            .map(|i| candidate(&format!("g{i}"), i, 0.99, false, 2.0))
            .collect();
        let config = config.with_max_stake_fraction(1.0);
        let mut engine = Backtester::new(config).unwrap();
        engine.start().unwrap();
        for c in &candidates {
            engine.step(c).unwrap();
        }
        assert!(engine.balance() >= Decimal::ZERO);
        let report = engine.finish().unwrap();
        assert_eq!(report.bets.len(), 4);
        assert!(report.summary.final_balance < dec!(1));

        let zero = BacktestConfig::default().with_initial_bankroll(dec!(0.01));
        let mut engine = Backtester::new(zero).unwrap();
        engine.start().unwrap();
        // 0.01 * 0.05 rounds to a zero stake
        assert_eq!(
            engine.step(&candidate("tiny", 0, 0.6, true, 2.0)).unwrap(),
            StepOutcome::Skipped(SkipReason::NoEdge)
        );
    }

    #[test]
    fn full_kelly_loss_ends_at_zero_and_skips_the_rest() {
        let config = BacktestConfig::default().with_kelly_multiplier(1.0);
        // p = 1 at even money stakes the whole bankroll
        let report = Backtester::new(config)
            .unwrap()
            .run(&[
                candidate("g0", 0, 1.0, false, 2.0),
                candidate("g1", 1, 0.7, true, 2.0),
                candidate("g2", 2, 0.7, true, 2.0),
            ])
            .unwrap();

        assert_eq!(report.bets.len(), 1);
        assert_eq!(report.bets[0].stake, dec!(10000));
        assert_eq!(report.summary.final_balance, Decimal::ZERO);
        let reasons: Vec<SkipReason> = report.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![SkipReason::BankrollDepleted, SkipReason::BankrollDepleted]
        );
        assert_eq!(
            report.summary.skip_counts.get(&SkipReason::BankrollDepleted),
            Some(&2)
        );
    }

    // ============================================
    // Lifecycle Tests
    // ============================================

    #[test]
    fn step_requires_running_state() {
        let mut engine = backtester();
        assert_eq!(
            engine.step(&candidate("g1", 0, 0.6, true, 2.0)),
            Err(BacktestError::InvalidState {
                expected: "running",
                actual: "idle"
            })
        );
        engine.start().unwrap();
        assert!(engine.start().is_err());
        engine.finish().unwrap();
        assert!(engine.finish().is_err());
        assert!(engine.step(&candidate("g1", 0, 0.6, true, 2.0)).is_err());
    }

    #[test]
    fn out_of_order_candidates_are_rejected() {
        let mut engine = backtester();
        engine.start().unwrap();
        engine.step(&candidate("late", 5, 0.6, true, 2.0)).unwrap();
        assert!(matches!(
            engine.step(&candidate("early", 1, 0.6, true, 2.0)),
            Err(BacktestError::OutOfOrder { .. })
        ));
        // Same date is fine
        assert!(engine.step(&candidate("same", 5, 0.6, true, 2.0)).is_ok());
    }

    #[test]
    fn run_sorts_candidates_by_date() {
        let report = backtester()
            .run(&[
                candidate("second", 2, 0.6, true, 2.0),
                candidate("first", 1, 0.6, false, 2.0),
            ])
            .unwrap();
        assert_eq!(report.bets[0].observation_id, "first");
        assert_eq!(report.bets[1].observation_id, "second");
    }

    #[test]
    fn interrupted_run_keeps_partial_ledger() {
        let mut engine = backtester();
        engine.start().unwrap();
        engine.step(&candidate("g1", 0, 0.6, true, 2.0)).unwrap();
        let report = engine.finish().unwrap();
        assert_eq!(report.bets.len(), 1);
        assert_eq!(report.summary.bets, 1);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(Backtester::new(BacktestConfig::default().with_initial_bankroll(dec!(0))).is_err());
        assert!(Backtester::new(BacktestConfig::default().with_kelly_multiplier(0.0)).is_err());
        assert!(Backtester::new(BacktestConfig::default().with_kelly_multiplier(1.5)).is_err());
        assert!(Backtester::new(BacktestConfig::default().with_max_stake_fraction(0.0)).is_err());
    }
}
