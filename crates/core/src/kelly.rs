//! Kelly Criterion stake sizing for decimal-odds wagers.
//!
//! Sizes a bet from a model's win probability and the bookmaker's decimal
//! odds, with a fractional-Kelly multiplier for conservative staking.

use serde::{Deserialize, Serialize};

use crate::error::InvalidOddsError;

/// Full-Kelly fraction of bankroll for a decimal-odds bet.
///
/// ```text
/// b  = odds - 1            (net payout per unit staked)
/// f* = (p*b - (1-p)) / b
/// ```
///
/// Returns 0 whenever the edge is non-positive (`p <= 1/odds`), so a negative
/// stake is never produced. The result is clamped to [0, 1].
///
/// # Errors
/// Returns [`InvalidOddsError`] if `odds` is not finite or not above 1.0.
///
/// # Examples
/// ```
/// use sports_edge_core::kelly::fraction;
///
/// // 55% at -110 (decimal 1.909)
/// let f = fraction(0.55, 1.909).unwrap();
/// assert!((f - 0.0551).abs() < 1e-3);
///
/// // No edge at even money with a coin flip
/// assert_eq!(fraction(0.5, 2.0).unwrap(), 0.0);
/// ```
pub fn fraction(win_probability: f64, odds: f64) -> Result<f64, InvalidOddsError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(InvalidOddsError { odds });
    }
    if !win_probability.is_finite() {
        return Ok(0.0);
    }
    let p = win_probability.clamp(0.0, 1.0);
    if p <= implied_probability(odds) {
        return Ok(0.0);
    }
    let b = odds - 1.0;

    let full = (p * b - (1.0 - p)) / b;
    Ok(full.clamp(0.0, 1.0))
}

/// Market breakeven probability for decimal odds (`1 / odds`).
#[must_use]
pub fn implied_probability(odds: f64) -> f64 {
    1.0 / odds
}

/// Market probability for one side of a two-way market.
///
/// With both sides quoted the overround is removed proportionally; with one
/// side quoted this is `1 / odds`. Odds that are not finite or not above 1.0
/// count as unquoted.
#[must_use]
pub fn market_probability(odds: Option<f64>, opposing_odds: Option<f64>) -> Option<f64> {
    let quoted = |o: &f64| o.is_finite() && *o > 1.0;
    let p = implied_probability(odds.filter(quoted)?);
    match opposing_odds.filter(quoted) {
        Some(other) => {
            let q = implied_probability(other);
            Some(p / (p + q))
        }
        None => Some(p),
    }
}

/// Expected profit per unit staked: `p * odds - 1`.
#[must_use]
pub fn expected_value(win_probability: f64, odds: f64) -> f64 {
    win_probability * odds - 1.0
}

/// Fractional Kelly staker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyStaker {
    /// Fraction of full Kelly to stake, in (0, 1]. Defaults to quarter Kelly.
    pub multiplier: f64,
}

impl Default for KellyStaker {
    fn default() -> Self {
        Self { multiplier: 0.25 }
    }
}

impl KellyStaker {
    /// Largest multiplier considered safe for unattended use.
    pub const SAFE_MULTIPLIER: f64 = 0.5;

    /// Creates a staker, clamping the multiplier into (0, 1].
    #[must_use]
    pub fn new(multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier.min(1.0)
        } else {
            Self::default().multiplier
        };
        Self { multiplier }
    }

    /// Full-Kelly fraction, see [`fraction`].
    ///
    /// # Errors
    /// Returns [`InvalidOddsError`] for odds that are not above 1.0.
    pub fn fraction(&self, win_probability: f64, odds: f64) -> Result<f64, InvalidOddsError> {
        fraction(win_probability, odds)
    }

    /// Kelly fraction scaled by the multiplier.
    ///
    /// # Errors
    /// Returns [`InvalidOddsError`] for odds that are not above 1.0.
    pub fn recommended_fraction(
        &self,
        win_probability: f64,
        odds: f64,
    ) -> Result<f64, InvalidOddsError> {
        Ok(fraction(win_probability, odds)? * self.multiplier)
    }

    /// Returns true if the multiplier is within the documented safe range.
    #[must_use]
    pub fn is_conservative(&self) -> bool {
        self.multiplier <= Self::SAFE_MULTIPLIER
    }
}
