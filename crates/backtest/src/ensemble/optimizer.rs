//! Log-loss minimizing weight solvers over the probability simplex.
//!
//! Given a validation matrix of per-model probabilities (one column per
//! model) the solvers search for `w >= 0, sum(w) = 1` minimizing the
//! log-loss of `P * w`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use sports_edge_core::{EnsembleConfig, SolverKind};

use crate::stats::scoring::LOG_LOSS_EPSILON;

/// Largest lattice denominator accepted by grid search.
const MAX_GRID_STEPS: usize = 1_000;

/// A concrete weight optimization method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightSolver {
    /// Exhaustive search over weights that are multiples of `resolution`.
    Grid { resolution: f64 },
    /// Projected gradient descent with backtracking line search.
    ProjectedGradient {
        max_iterations: usize,
        tolerance: f64,
    },
}

impl WeightSolver {
    /// Picks the solver for `n_models` according to `config`.
    #[must_use]
    pub fn from_config(config: &EnsembleConfig, n_models: usize) -> Self {
        let grid = Self::Grid {
            resolution: config.grid_resolution,
        };
        let gradient = Self::ProjectedGradient {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        };
        match config.solver {
            SolverKind::Grid => grid,
            SolverKind::ProjectedGradient => gradient,
            SolverKind::Auto if n_models <= config.max_grid_models => grid,
            SolverKind::Auto => gradient,
        }
    }

    /// Solves for weights given `columns[model][row]` and `labels[row]`.
    ///
    /// Returns one non-negative weight per column summing to one.
    #[must_use]
    pub fn solve(&self, columns: &[Vec<f64>], labels: &[bool]) -> Vec<f64> {
        match columns.len() {
            0 => Vec::new(),
            1 => vec![1.0],
            _ => match *self {
                Self::Grid { resolution } => grid_search(columns, labels, resolution),
                Self::ProjectedGradient {
                    max_iterations,
                    tolerance,
                } => projected_gradient(columns, labels, max_iterations, tolerance),
            },
        }
    }
}

/// Blended probability for each row.
fn blend(columns: &[Vec<f64>], weights: &[f64], n_rows: usize) -> Vec<f64> {
    (0..n_rows)
        .map(|row| {
            columns
                .iter()
                .zip(weights)
                .map(|(column, w)| column[row] * w)
                .sum()
        })
        .collect()
}

/// Log-loss of the weighted blend.
#[must_use]
pub fn ensemble_log_loss(columns: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let blended = blend(columns, weights, labels.len());
    let total: f64 = labels
        .iter()
        .zip(&blended)
        .map(|(&y, &q)| {
            let q = q.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            if y {
                -q.ln()
            } else {
                -(1.0 - q).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}

fn grid_search(columns: &[Vec<f64>], labels: &[bool], resolution: f64) -> Vec<f64> {
    let steps = if resolution.is_finite() && resolution > 0.0 && resolution <= 1.0 {
        ((1.0 / resolution).round() as usize).clamp(1, MAX_GRID_STEPS)
    } else {
        10
    };

    let n_models = columns.len();
    let mut best = vec![1.0 / n_models as f64; n_models];
    let mut best_loss = ensemble_log_loss(columns, labels, &best);
    let mut counts = vec![0usize; n_models];
    let mut evaluated = 0usize;

    enumerate_lattice(&mut counts, 0, steps, &mut |counts| {
        let weights: Vec<f64> = counts.iter().map(|&c| c as f64 / steps as f64).collect();
        let loss = ensemble_log_loss(columns, labels, &weights);
        evaluated += 1;
        if loss < best_loss {
            best_loss = loss;
            best = weights;
        }
    });

    debug!(
        models = n_models,
        steps, evaluated, loss = best_loss, "grid search complete"
    );
    best
}

/// Visits every assignment of `remaining` units to `counts[position..]`.
fn enumerate_lattice(
    counts: &mut [usize],
    position: usize,
    remaining: usize,
    visit: &mut dyn FnMut(&[usize]),
) {
    if position + 1 == counts.len() {
        counts[position] = remaining;
        visit(counts);
        return;
    }
    for units in (0..=remaining).rev() {
        counts[position] = units;
        enumerate_lattice(counts, position + 1, remaining - units, visit);
    }
}

fn gradient(columns: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> Vec<f64> {
    let n = labels.len() as f64;
    let blended = blend(columns, weights, labels.len());
    columns
        .iter()
        .map(|column| {
            labels
                .iter()
                .zip(&blended)
                .zip(column)
                .map(|((&y, &q), &p)| {
                    let q = q.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
                    let y = if y { 1.0 } else { 0.0 };
                    (q - y) / (q * (1.0 - q)) * p
                })
                .sum::<f64>()
                / n
        })
        .collect()
}

fn projected_gradient(
    columns: &[Vec<f64>],
    labels: &[bool],
    max_iterations: usize,
    tolerance: f64,
) -> Vec<f64> {
    let n_models = columns.len();
    let mut weights = vec![1.0 / n_models as f64; n_models];
    let mut loss = ensemble_log_loss(columns, labels, &weights);
    let mut step = 1.0;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        let grad = gradient(columns, labels, &weights);

        // Backtrack until the sufficient-decrease condition holds
        let (candidate, candidate_loss) = loop {
            let moved: Vec<f64> = weights
                .iter()
                .zip(&grad)
                .map(|(w, g)| w - step * g)
                .collect();
            let candidate = project_to_simplex(&moved);
            let candidate_loss = ensemble_log_loss(columns, labels, &candidate);

            let linear: f64 = grad
                .iter()
                .zip(candidate.iter().zip(&weights))
                .map(|(g, (c, w))| g * (c - w))
                .sum();
            let quadratic: f64 = candidate
                .iter()
                .zip(&weights)
                .map(|(c, w)| (c - w).powi(2))
                .sum::<f64>()
                / (2.0 * step);

            if candidate_loss <= loss + linear + quadratic || step < 1e-12 {
                break (candidate, candidate_loss);
            }
            step *= 0.5;
        };

        let movement: f64 = candidate
            .iter()
            .zip(&weights)
            .map(|(c, w)| (c - w).abs())
            .sum();
        let improvement = loss - candidate_loss;

        if candidate_loss <= loss {
            weights = candidate;
            loss = candidate_loss;
        }
        if movement < tolerance || improvement.abs() < tolerance {
            break;
        }
        // Let the step grow again after a successful move
        step = (step * 2.0).min(1e6);
    }

    debug!(models = n_models, iterations, loss, "projected gradient complete");
    weights
}

/// Euclidean projection of `v` onto the probability simplex.
#[must_use]
pub fn project_to_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.iter().map(|&x| (x - theta).max(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn assert_simplex(weights: &[f64]) {
        assert!(weights.iter().all(|&w| w >= 0.0), "negative weight in {weights:?}");
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "weights sum to {sum}");
    }

    /// Labels plus a sharp model column and a pure-noise column.
    fn informative_and_noise(n: usize, seed: u64) -> (Vec<bool>, Vec<Vec<f64>>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut labels = Vec::with_capacity(n);
        let mut sharp = Vec::with_capacity(n);
        let mut noise = Vec::with_capacity(n);
        for _ in 0..n {
            let p: f64 = rng.gen_range(0.05..0.95);
            labels.push(rng.gen_bool(p));
            sharp.push(p);
            noise.push(rng.gen_range(0.05..0.95));
        }
        (labels, vec![sharp, noise])
    }

    // ============================================
    // Simplex Projection Tests
    // ============================================

    #[test]
    fn projection_keeps_points_already_on_simplex() {
        let projected = project_to_simplex(&[0.2, 0.3, 0.5]);
        for (a, b) in projected.iter().zip([0.2, 0.3, 0.5]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn projection_clips_negative_mass() {
        let projected = project_to_simplex(&[2.0, -1.0, 0.0]);
        assert_eq!(projected, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn projection_of_random_points_is_on_simplex() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..500 {
            let k = rng.gen_range(1..8);
            let v: Vec<f64> = (0..k).map(|_| rng.gen_range(-5.0..5.0)).collect();
            assert_simplex(&project_to_simplex(&v));
        }
    }

    // ============================================
    // Grid Search Tests
    // ============================================

    #[test]
    fn grid_prefers_informative_model() {
        let (labels, columns) = informative_and_noise(500, 1);
        let weights = WeightSolver::Grid { resolution: 0.1 }.solve(&columns, &labels);
        assert_simplex(&weights);
        assert!(weights[0] >= 0.7, "weights {weights:?}");
    }

    #[test]
    fn grid_visits_whole_lattice() {
        let mut counts = vec![0; 3];
        let mut seen = 0;
        enumerate_lattice(&mut counts, 0, 10, &mut |c| {
            assert_eq!(c.iter().sum::<usize>(), 10);
            seen += 1;
        });
        // C(12, 2)
        assert_eq!(seen, 66);
    }

    #[test]
    fn single_model_gets_all_weight() {
        let columns = vec![vec![0.3, 0.8]];
        assert_eq!(
            WeightSolver::Grid { resolution: 0.1 }.solve(&columns, &[false, true]),
            vec![1.0]
        );
    }

    // ============================================
    // Projected Gradient Tests
    // ============================================

    #[test]
    fn projected_gradient_improves_on_uniform() {
        let (labels, mut columns) = informative_and_noise(400, 2);
        let extra: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| c.iter().map(|p| p * 0.5 + 0.25).collect())
            .collect();
        columns.extend(extra);
        let solver = WeightSolver::ProjectedGradient {
            max_iterations: 500,
            tolerance: 1e-10,
        };

        let weights = solver.solve(&columns, &labels);
        assert_simplex(&weights);
        let uniform = vec![0.25; 4];
        assert!(
            ensemble_log_loss(&columns, &labels, &weights)
                <= ensemble_log_loss(&columns, &labels, &uniform)
        );
        assert!(weights[0] > weights[1]);
    }

    #[test]
    fn projected_gradient_matches_grid_on_small_problem() {
        let (labels, columns) = informative_and_noise(300, 4);
        let grid = WeightSolver::Grid { resolution: 0.05 }.solve(&columns, &labels);
        let gradient = WeightSolver::ProjectedGradient {
            max_iterations: 1_000,
            tolerance: 1e-12,
        }
        .solve(&columns, &labels);

        let grid_loss = ensemble_log_loss(&columns, &labels, &grid);
        let gradient_loss = ensemble_log_loss(&columns, &labels, &gradient);
        // The continuous optimum is at least as good as the lattice one
        assert!(gradient_loss <= grid_loss + 1e-6);
    }

    #[test]
    fn random_problems_always_yield_simplex_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..50 {
            let n_models = rng.gen_range(2..7);
            let n_rows = rng.gen_range(5..60);
            let labels: Vec<bool> = (0..n_rows).map(|_| rng.gen_bool(0.5)).collect();
            let columns: Vec<Vec<f64>> = (0..n_models)
                .map(|_| (0..n_rows).map(|_| rng.gen_range(0.0..=1.0)).collect())
                .collect();
            for solver in [
                WeightSolver::Grid { resolution: 0.25 },
                WeightSolver::ProjectedGradient {
                    max_iterations: 200,
                    tolerance: 1e-9,
                },
            ] {
                assert_simplex(&solver.solve(&columns, &labels));
            }
        }
    }

    // ============================================
    // Solver Selection Tests
    // ============================================

    #[test]
    fn auto_uses_grid_up_to_four_models() {
        let config = EnsembleConfig::default();
        assert!(matches!(
            WeightSolver::from_config(&config, 4),
            WeightSolver::Grid { .. }
        ));
        assert!(matches!(
            WeightSolver::from_config(&config, 5),
            WeightSolver::ProjectedGradient { .. }
        ));
    }

    #[test]
    fn explicit_solver_overrides_model_count() {
        let config = EnsembleConfig {
            solver: SolverKind::Grid,
            ..EnsembleConfig::default()
        };
        assert!(matches!(
            WeightSolver::from_config(&config, 9),
            WeightSolver::Grid { .. }
        ));
    }
}
