//! Tagged metric values.
//!
//! Statistics that cannot be computed for a sample (empty input, a single
//! label class) are reported as [`MetricValue::Undefined`] so that reports
//! never show a misleading zero or a NaN.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a metric could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// No samples.
    Empty,
    /// All labels belong to one class.
    SingleClass,
    /// Label and probability vectors differ in length.
    LengthMismatch,
    /// A probability was NaN or outside [0, 1].
    InvalidProbability,
    /// Too few samples for the statistic to be meaningful.
    InsufficientSamples,
    /// Denominator of a ratio is zero (e.g. profit factor without losses).
    ZeroDenominator,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Empty => "empty sample",
            Self::SingleClass => "single label class",
            Self::LengthMismatch => "length mismatch",
            Self::InvalidProbability => "invalid probability",
            Self::InsufficientSamples => "insufficient samples",
            Self::ZeroDenominator => "zero denominator",
        };
        f.write_str(text)
    }
}

/// A metric that is either a finite value or explicitly undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// Computed value.
    Defined(f64),
    /// Not computable for this sample.
    Undefined(UndefinedReason),
}

impl MetricValue {
    /// Wraps `value`, tagging non-finite results as undefined.
    #[must_use]
    pub fn from_f64(value: f64, reason_if_not_finite: UndefinedReason) -> Self {
        if value.is_finite() {
            Self::Defined(value)
        } else {
            Self::Undefined(reason_if_not_finite)
        }
    }

    /// Returns the value if defined.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined(_) => None,
        }
    }

    /// Returns true if the metric was computed.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }

    /// Applies `f` to a defined value.
    #[must_use]
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Self::Defined(v) => Self::from_f64(f(v), UndefinedReason::InvalidProbability),
            undefined => undefined,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(v) => match f.precision() {
                Some(p) => write!(f, "{v:.p$}"),
                None => write!(f, "{v}"),
            },
            Self::Undefined(_) => f.write_str("N/A"),
        }
    }
}
