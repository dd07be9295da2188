//! CSV loaders for materialized predictions and observation tables.
//!
//! [`PredictionCsv`] expects the header
//!
//! ```text
//! id,date,probability,label,decimal_odds,opposing_odds,market_probability
//! ```
//!
//! with `decimal_odds`, `opposing_odds` and `market_probability` optional.
//!
//! [`ObservationCsv`] expects `id,date,label` plus optional `decimal_odds`,
//! `opposing_odds` and `group`; every other column is a numeric feature.
//!
//! Empty cells mean absent. An odds cell that is not a finite number
//! (`N/A`, `-`, ...) also loads as absent, so that game is never bet on.
//! Labels accept `0`/`1` or `true`/`false`; dates
//! accept RFC 3339 timestamps or plain `YYYY-MM-DD` days (midnight UTC).

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use sports_edge_core::{kelly, Observation};

use crate::betting::BetCandidate;

/// One held-out prediction with its outcome and market prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    pub probability: f64,
    pub label: bool,
    pub decimal_odds: Option<f64>,
    pub opposing_odds: Option<f64>,
    /// Explicit market probability; derived from odds when absent.
    pub market_probability: Option<f64>,
}

impl PredictionRecord {
    /// Market probability from the file, else from the quoted odds.
    #[must_use]
    pub fn market_probability(&self) -> Option<f64> {
        self.market_probability
            .or_else(|| kelly::market_probability(self.decimal_odds, self.opposing_odds))
    }

    #[must_use]
    pub fn to_candidate(&self) -> BetCandidate {
        BetCandidate {
            observation_id: self.id.clone(),
            date: self.date,
            probability: self.probability,
            label: self.label,
            decimal_odds: self.decimal_odds,
            opposing_odds: self.opposing_odds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    id: String,
    date: String,
    probability: f64,
    label: String,
    #[serde(default)]
    decimal_odds: Option<String>,
    #[serde(default)]
    opposing_odds: Option<String>,
    #[serde(default)]
    market_probability: Option<f64>,
}

/// Predictions loaded from one CSV file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionCsv {
    records: Vec<PredictionRecord>,
}

impl PredictionCsv {
    /// Reads predictions from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The CSV file cannot be opened
    /// - A required column is missing or a number does not parse
    /// - A date or label is not in an accepted format
    /// - A probability lies outside [0, 1]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Invalid prediction file: {}", path.display()))
    }

    /// Reads predictions from any CSV source.
    ///
    /// # Errors
    ///
    /// Same conditions as [`PredictionCsv::load`], minus file access.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();

        for (row, result) in reader.deserialize::<RawRow>().enumerate() {
            // Header is line 1.
            let line = row + 2;
            let raw = result.with_context(|| format!("line {line}: malformed row"))?;
            records.push(parse_row(raw).with_context(|| format!("line {line}"))?);
        }

        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<PredictionRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.label).collect()
    }

    #[must_use]
    pub fn probabilities(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.probability).collect()
    }

    /// Market probability per record, `None` where no price is known.
    #[must_use]
    pub fn market_probabilities(&self) -> Vec<Option<f64>> {
        self.records
            .iter()
            .map(PredictionRecord::market_probability)
            .collect()
    }

    #[must_use]
    pub fn candidates(&self) -> Vec<BetCandidate> {
        self.records
            .iter()
            .map(PredictionRecord::to_candidate)
            .collect()
    }
}

const ID_COLUMN: &str = "id";
const DATE_COLUMN: &str = "date";
const LABEL_COLUMN: &str = "label";
const ODDS_COLUMN: &str = "decimal_odds";
const OPPOSING_ODDS_COLUMN: &str = "opposing_odds";
const GROUP_COLUMN: &str = "group";

/// Observations loaded from one CSV file, with their feature column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationCsv {
    feature_names: Vec<String>,
    observations: Vec<Observation>,
}

/// Column positions resolved from the header row.
struct ObservationColumns {
    id: usize,
    date: usize,
    label: usize,
    odds: Option<usize>,
    opposing_odds: Option<usize>,
    group: Option<usize>,
    features: Vec<usize>,
}

impl ObservationColumns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).with_context(|| format!("missing required column `{name}`"))
        };
        let reserved = [
            ID_COLUMN,
            DATE_COLUMN,
            LABEL_COLUMN,
            ODDS_COLUMN,
            OPPOSING_ODDS_COLUMN,
            GROUP_COLUMN,
        ];

        Ok(Self {
            id: require(ID_COLUMN)?,
            date: require(DATE_COLUMN)?,
            label: require(LABEL_COLUMN)?,
            odds: find(ODDS_COLUMN),
            opposing_odds: find(OPPOSING_ODDS_COLUMN),
            group: find(GROUP_COLUMN),
            features: headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !reserved.contains(h))
                .map(|(i, _)| i)
                .collect(),
        })
    }
}

impl ObservationCsv {
    /// Reads observations from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a required column is
    /// missing, or a cell does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Invalid observation file: {}", path.display()))
    }

    /// Reads observations from any CSV source.
    ///
    /// Empty feature cells load as NaN.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ObservationCsv::load`], minus file access.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();
        let columns = ObservationColumns::resolve(&headers)?;
        let feature_names = columns
            .features
            .iter()
            .map(|&i| headers[i].to_string())
            .collect();

        let mut observations = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let line = row + 2;
            let record = result.with_context(|| format!("line {line}: malformed row"))?;
            observations.push(
                parse_observation(&record, &columns).with_context(|| format!("line {line}"))?,
            );
        }

        Ok(Self {
            feature_names,
            observations,
        })
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

fn parse_observation(
    record: &csv::StringRecord,
    columns: &ObservationColumns,
) -> Result<Observation> {
    let cell = |i: usize| record.get(i).unwrap_or("");

    let features = columns
        .features
        .iter()
        .map(|&i| match cell(i) {
            "" => Ok(f64::NAN),
            text => text
                .parse::<f64>()
                .with_context(|| format!("invalid feature value `{text}`")),
        })
        .collect::<Result<Vec<f64>>>()?;

    let id = cell(columns.id);
    if id.is_empty() {
        bail!("empty id");
    }
    let odds = |column: Option<usize>, name: &str| parse_odds(id, name, column.map(cell));

    Ok(Observation {
        id: id.to_string(),
        date: parse_date(cell(columns.date))?,
        features,
        label: parse_label(cell(columns.label))?,
        decimal_odds: odds(columns.odds, ODDS_COLUMN),
        opposing_odds: odds(columns.opposing_odds, OPPOSING_ODDS_COLUMN),
        group_key: columns
            .group
            .map(cell)
            .filter(|g| !g.is_empty())
            .map(str::to_string),
    })
}

fn parse_row(raw: RawRow) -> Result<PredictionRecord> {
    if !(0.0..=1.0).contains(&raw.probability) {
        bail!("probability {} is outside [0, 1]", raw.probability);
    }
    if let Some(m) = raw.market_probability {
        if !(0.0..=1.0).contains(&m) {
            bail!("market_probability {m} is outside [0, 1]");
        }
    }

    Ok(PredictionRecord {
        date: parse_date(&raw.date)?,
        label: parse_label(&raw.label)?,
        decimal_odds: parse_odds(&raw.id, ODDS_COLUMN, raw.decimal_odds.as_deref()),
        opposing_odds: parse_odds(&raw.id, OPPOSING_ODDS_COLUMN, raw.opposing_odds.as_deref()),
        id: raw.id,
        probability: raw.probability,
        market_probability: raw.market_probability,
    })
}

/// Odds cell to a price; malformed values mean no bet rather than a bad file.
fn parse_odds(id: &str, column: &str, value: Option<&str>) -> Option<f64> {
    let text = value.filter(|v| !v.is_empty())?;
    match text.parse::<f64>() {
        Ok(odds) if odds.is_finite() => Some(odds),
        _ => {
            warn!(observation = id, column, value = text, "malformed odds, treating as no bet");
            None
        }
    }
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("unrecognized date `{value}`"))?;
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

fn parse_label(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => bail!("unrecognized label `{other}`"),
    }
}
