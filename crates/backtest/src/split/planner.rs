//! Time-ordered fold generation.
//!
//! Three strategies are supported:
//!
//! 1. **Walk-forward**: expanding training window followed by contiguous test
//!    windows of `n / (n_splits + 1)` observations.
//! 2. **Season-based**: train on every group up to `k`, test on group `k + 1`.
//! 3. **Sliding window**: fixed-size training window advanced by `step_size`.
//!
//! Observations are ordered by date with ties kept in input order. Several
//! games often share a date, so every train/test boundary is moved back to
//! the first observation of its date. A date therefore never straddles a
//! boundary, and the training side always ends strictly before the test side
//! begins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sports_edge_core::{DataIntegrityError, Observation, Split, SplitStrategy};

/// Folds produced by a strategy, plus any non-fatal warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Planned folds, numbered from zero.
    pub splits: Vec<Split>,
    /// Dropped folds and undersized training windows.
    pub warnings: Vec<String>,
}

impl SplitPlan {
    /// Number of planned folds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Returns true if no fold survived planning.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

/// Plans chronological splits over an observation slice.
pub struct SplitPlanner;

impl SplitPlanner {
    /// Plans folds for `observations` using `strategy`.
    ///
    /// Indices in the returned splits refer to `observations` and are listed
    /// in date order. The input does not need to be sorted.
    ///
    /// # Errors
    ///
    /// Returns [`DataIntegrityError`] for empty input, too few observations,
    /// zero-sized parameters, or missing / insufficient group keys.
    pub fn plan(
        observations: &[Observation],
        strategy: &SplitStrategy,
    ) -> Result<SplitPlan, DataIntegrityError> {
        if observations.is_empty() {
            return Err(DataIntegrityError::Empty);
        }

        let timeline = Timeline::new(observations);
        let plan = match strategy {
            SplitStrategy::WalkForward {
                n_splits,
                min_train_size,
            } => walk_forward(&timeline, *n_splits, *min_train_size)?,
            SplitStrategy::SeasonBased => season_based(&timeline, observations)?,
            SplitStrategy::SlidingWindow {
                window_size,
                step_size,
                test_size,
                min_test_size,
            } => sliding_window(
                &timeline,
                *window_size,
                *step_size,
                *test_size,
                *min_test_size,
            )?,
        };

        for message in &plan.warnings {
            warn!(strategy = strategy.name(), "{message}");
        }
        debug!(
            strategy = strategy.name(),
            folds = plan.splits.len(),
            "split plan ready"
        );

        Ok(plan)
    }
}

/// Observation indices in date order, ties in input order.
struct Timeline {
    order: Vec<usize>,
    dates: Vec<DateTime<Utc>>,
}

impl Timeline {
    fn new(observations: &[Observation]) -> Self {
        let mut order: Vec<usize> = (0..observations.len()).collect();
        order.sort_by_key(|&i| observations[i].date);
        let dates = order.iter().map(|&i| observations[i].date).collect();
        Self { order, dates }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Moves a boundary back to the first position sharing its date.
    fn snap(&self, position: usize) -> usize {
        if position >= self.len() {
            return self.len();
        }
        let date = self.dates[position];
        let mut p = position;
        while p > 0 && self.dates[p - 1] == date {
            p -= 1;
        }
        p
    }

    fn indices(&self, start: usize, end: usize) -> Vec<usize> {
        self.order[start..end].to_vec()
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> DataIntegrityError {
    DataIntegrityError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn walk_forward(
    timeline: &Timeline,
    n_splits: usize,
    min_train_size: usize,
) -> Result<SplitPlan, DataIntegrityError> {
    let n = timeline.len();
    if n_splits == 0 {
        return Err(invalid("n_splits", "must be at least 1"));
    }
    if n < min_train_size {
        return Err(DataIntegrityError::InsufficientObservations {
            available: n,
            required: min_train_size,
        });
    }
    let test_size = n / (n_splits + 1);
    if test_size == 0 {
        return Err(invalid(
            "n_splits",
            format!("{n_splits} splits over {n} observations leave an empty test window"),
        ));
    }

    let mut plan = SplitPlan::default();
    for k in 0..n_splits {
        let raw_start = n - (n_splits - k) * test_size;
        let raw_end = raw_start + test_size;
        let test_start = timeline.snap(raw_start);
        let test_end = if k + 1 == n_splits {
            n
        } else {
            timeline.snap(raw_end)
        };

        if test_start == 0 || test_start >= test_end {
            plan.warnings.push(format!(
                "fold {k} dropped: shared dates left an empty partition"
            ));
            continue;
        }

        plan.splits.push(Split {
            split_index: plan.splits.len(),
            train_indices: timeline.indices(0, test_start),
            test_indices: timeline.indices(test_start, test_end),
        });
    }

    if let Some(smallest) = plan.splits.iter().map(Split::train_len).min() {
        if smallest < min_train_size {
            plan.warnings.push(format!(
                "smallest training window has {smallest} observations, below min_train_size {min_train_size}"
            ));
        }
    }

    Ok(plan)
}

fn season_based(
    timeline: &Timeline,
    observations: &[Observation],
) -> Result<SplitPlan, DataIntegrityError> {
    let mut keys: Vec<&str> = Vec::with_capacity(observations.len());
    for obs in observations {
        match obs.group_key.as_deref() {
            Some(key) => keys.push(key),
            None => {
                return Err(DataIntegrityError::MissingField {
                    id: obs.id.clone(),
                    field: "group_key",
                })
            }
        }
    }

    let mut groups = keys.clone();
    groups.sort_unstable();
    groups.dedup();
    if groups.len() < 2 {
        return Err(DataIntegrityError::TooFewGroups {
            found: groups.len(),
        });
    }

    let mut plan = SplitPlan::default();
    for k in 1..groups.len() {
        let test_group = groups[k];
        let train_groups = &groups[..k];
        let train_indices: Vec<usize> = timeline
            .order
            .iter()
            .copied()
            .filter(|&i| train_groups.binary_search(&keys[i]).is_ok())
            .collect();
        let test_indices: Vec<usize> = timeline
            .order
            .iter()
            .copied()
            .filter(|&i| keys[i] == test_group)
            .collect();

        plan.splits.push(Split {
            split_index: plan.splits.len(),
            train_indices,
            test_indices,
        });
    }

    Ok(plan)
}

fn sliding_window(
    timeline: &Timeline,
    window_size: usize,
    step_size: usize,
    test_size: usize,
    min_test_size: usize,
) -> Result<SplitPlan, DataIntegrityError> {
    let n = timeline.len();
    if window_size == 0 {
        return Err(invalid("window_size", "must be at least 1"));
    }
    if step_size == 0 {
        return Err(invalid("step_size", "must be at least 1"));
    }
    if test_size == 0 {
        return Err(invalid("test_size", "must be at least 1"));
    }
    if n <= window_size {
        return Err(DataIntegrityError::InsufficientObservations {
            available: n,
            required: window_size + 1,
        });
    }

    let mut plan = SplitPlan::default();
    let mut fold = 0;
    let mut train_start = 0;
    while train_start + window_size < n {
        let raw_test_start = train_start + window_size;
        let raw_test_end = (raw_test_start + test_size).min(n);
        let test_start = timeline.snap(raw_test_start);
        let test_end = timeline.snap(raw_test_end);

        let test_len = test_end.saturating_sub(test_start);
        if test_start <= train_start {
            plan.warnings.push(format!(
                "fold {fold} dropped: training window collapsed on a shared date"
            ));
        } else if test_len < min_test_size {
            plan.warnings.push(format!(
                "fold {fold} dropped: {test_len} test observations, below min_test_size {min_test_size}"
            ));
        } else {
            plan.splits.push(Split {
                split_index: plan.splits.len(),
                train_indices: timeline.indices(train_start, test_start),
                test_indices: timeline.indices(test_start, test_end),
            });
        }

        fold += 1;
        train_start += step_size;
    }

    Ok(plan)
}
