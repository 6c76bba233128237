//! Dual edge weights: steepest edge, Devex, Dantzig.
//!
//! The three schemes sit behind one tagged variant with a single `update`
//! routine dispatching on the tag, so the hot path stays branch-predicted.
//! DSE weights γ_i track ‖e_iᵀB⁻¹‖²; Devex approximates them within a
//! reference framework that is restarted when it ages or drifts; Dantzig is
//! the unit-weight fallback.

use crate::linalg::factor::Factor;
use crate::linalg::vector::SparseVector;

/// Floor applied to incrementally updated DSE weights.
const MIN_DSE_WEIGHT: f64 = 1.0 + 1e-9;

/// Devex framework age limits: a new framework after
/// `max(MIN_ABS_DEVEX_ITERATIONS, m * MIN_REL_DEVEX_ITERATIONS)` updates.
const MIN_ABS_DEVEX_ITERATIONS: usize = 25;
const MIN_REL_DEVEX_ITERATIONS: f64 = 1e-2;

/// Weight-accuracy ratio beyond which a weight counts as wrong, and a
/// Devex framework as stale.
const MAX_WEIGHT_RATIO: f64 = 3.0;

/// Active weight scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMode {
    /// Unit weights
    Dantzig,
    /// Approximate steepest edge within a reference framework
    Devex,
    /// Exact dual steepest edge, maintained incrementally
    Dse,
}

/// Edge-weight array plus scheme bookkeeping.
#[derive(Debug, Clone)]
pub struct EdgeWeights {
    /// Scheme in effect
    pub mode: WeightMode,

    /// Weight per basis position
    pub weight: Vec<f64>,

    /// Updates absorbed by the current Devex framework
    pub devex_iterations: usize,

    /// Devex frameworks started so far
    pub framework_count: usize,

    /// Set when the current Devex framework should be replaced at the next
    /// rebuild
    pub new_framework_wanted: bool,

    /// DSE accuracy: weights checked against a fresh ‖ρ_r‖²
    pub num_weight_checks: usize,

    /// DSE accuracy: checks outside the allowed ratio
    pub num_weight_rejects: usize,
}

impl EdgeWeights {
    /// Unit weights in the given mode.
    pub fn new(mode: WeightMode, num_row: usize) -> Self {
        EdgeWeights {
            mode,
            weight: vec![1.0; num_row],
            devex_iterations: 0,
            framework_count: 0,
            new_framework_wanted: false,
            num_weight_checks: 0,
            num_weight_rejects: 0,
        }
    }

    /// Reset every weight to 1.
    pub fn reset_unit(&mut self) {
        self.weight.fill(1.0);
    }

    /// Compute exact DSE weights for the current basis: one BTRAN of each
    /// unit vector. Used for cold/warm starts on non-logical bases.
    pub fn initialise_dse_exact(&mut self, factor: &Factor, buffer: &mut SparseVector) {
        debug_assert_eq!(self.mode, WeightMode::Dse);
        for k in 0..self.weight.len() {
            buffer.clear();
            buffer.set(k, 1.0);
            factor.btran(buffer);
            self.weight[k] = buffer.norm2().max(f64::MIN_POSITIVE);
        }
    }

    /// Start a fresh Devex framework: unit weights, age zero.
    pub fn new_devex_framework(&mut self) {
        debug_assert_eq!(self.mode, WeightMode::Devex);
        self.reset_unit();
        self.devex_iterations = 0;
        self.framework_count += 1;
        self.new_framework_wanted = false;
    }

    /// Whether the Devex framework has aged out.
    pub fn devex_framework_stale(&self, num_row: usize) -> bool {
        let age_limit = MIN_ABS_DEVEX_ITERATIONS
            .max((num_row as f64 * MIN_REL_DEVEX_ITERATIONS) as usize);
        self.new_framework_wanted || self.devex_iterations >= age_limit
    }

    /// Apply the weight update for a pivot: `column` is the FTRANned
    /// entering column, `dse_vector` the FTRANned ρ_r (DSE only), `row_out`
    /// the leaving position and `alpha` the pivot.
    pub fn update(
        &mut self,
        column: &SparseVector,
        dse_vector: Option<&SparseVector>,
        row_out: usize,
        alpha: f64,
    ) {
        let gamma_r = self.weight[row_out];
        match self.mode {
            WeightMode::Dantzig => {}
            WeightMode::Dse => {
                let tau = dse_vector.expect("DSE update requires the FTRANned rho");
                let update_one = |weight: &mut f64, aq: f64, tau_i: f64| {
                    let ratio = aq / alpha;
                    *weight = (*weight - 2.0 * ratio * tau_i + ratio * ratio * gamma_r)
                        .max(MIN_DSE_WEIGHT);
                };
                if column.indexed {
                    for &i in &column.index {
                        if i != row_out {
                            update_one(&mut self.weight[i], column.array[i], tau.array[i]);
                        }
                    }
                } else {
                    for i in 0..self.weight.len() {
                        if i != row_out && column.array[i] != 0.0 {
                            update_one(&mut self.weight[i], column.array[i], tau.array[i]);
                        }
                    }
                }
                self.weight[row_out] = gamma_r / (alpha * alpha);
            }
            WeightMode::Devex => {
                let mut max_weight = 0.0_f64;
                let mut update_one = |weight: &mut f64, aq: f64| {
                    let ratio = aq / alpha;
                    let candidate = ratio * ratio * gamma_r;
                    if candidate > *weight {
                        *weight = candidate;
                    }
                    if *weight > max_weight {
                        max_weight = *weight;
                    }
                };
                if column.indexed {
                    for &i in &column.index {
                        if i != row_out {
                            update_one(&mut self.weight[i], column.array[i]);
                        }
                    }
                } else {
                    for i in 0..self.weight.len() {
                        if i != row_out && column.array[i] != 0.0 {
                            update_one(&mut self.weight[i], column.array[i]);
                        }
                    }
                }
                self.weight[row_out] = (gamma_r / (alpha * alpha)).max(1.0);
                self.devex_iterations += 1;
                if max_weight > MAX_WEIGHT_RATIO * MAX_WEIGHT_RATIO {
                    self.new_framework_wanted = true;
                }
            }
        }
    }

    /// DSE accuracy monitoring: compare the maintained weight of `row` with
    /// the exact value `‖ρ_row‖²` available at CHUZR. Out-of-band weights
    /// are replaced and counted.
    ///
    /// Returns true when the weight had to be rejected.
    pub fn observe_exact(&mut self, row: usize, exact: f64) -> bool {
        if self.mode != WeightMode::Dse || exact <= 0.0 {
            return false;
        }
        self.num_weight_checks += 1;
        let stored = self.weight[row];
        let ratio = stored / exact;
        if !(1.0 / MAX_WEIGHT_RATIO..=MAX_WEIGHT_RATIO).contains(&ratio) {
            self.weight[row] = exact;
            self.num_weight_rejects += 1;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::from_triplets;

    #[test]
    fn dse_weights_exact_on_identity_basis() {
        let a = from_triplets(3, 3, vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]);
        let basis = vec![3, 4, 5]; // logicals: B = I
        let mut factor = Factor::new(3);
        factor.factorize(&basis, &a);
        let mut weights = EdgeWeights::new(WeightMode::Dse, 3);
        let mut buffer = SparseVector::new(3);
        weights.initialise_dse_exact(&factor, &mut buffer);
        for k in 0..3 {
            assert!((weights.weight[k] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn dse_exact_matches_scaled_basis() {
        // B = diag(2, 4): rows of B^{-1} have norms 1/2, 1/4.
        let a = from_triplets(2, 2, vec![(0, 0, 2.0), (1, 1, 4.0)]);
        let basis = vec![0, 1];
        let mut factor = Factor::new(2);
        factor.factorize(&basis, &a);
        let mut weights = EdgeWeights::new(WeightMode::Dse, 2);
        let mut buffer = SparseVector::new(2);
        weights.initialise_dse_exact(&factor, &mut buffer);
        assert!((weights.weight[0] - 0.25).abs() < 1e-12);
        assert!((weights.weight[1] - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn dse_update_pivotal_row() {
        let mut weights = EdgeWeights::new(WeightMode::Dse, 3);
        weights.weight = vec![4.0, 1.0, 1.0];
        let mut column = SparseVector::new(3);
        column.set(0, 2.0); // pivot alpha
        let tau = SparseVector::new(3);
        weights.update(&column, Some(&tau), 0, 2.0);
        // gamma_r / alpha^2 = 4 / 4 = 1
        assert!((weights.weight[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dse_update_off_pivot_formula() {
        let mut weights = EdgeWeights::new(WeightMode::Dse, 2);
        weights.weight = vec![3.0, 5.0];
        let mut column = SparseVector::new(2);
        column.set(0, 1.0);
        column.set(1, 4.0);
        let mut tau = SparseVector::new(2);
        tau.set(1, 0.5);
        // alpha = 1 at row 0: gamma_1 <- 5 - 2*4*0.5 + 16*3 = 49
        weights.update(&column, Some(&tau), 0, 1.0);
        assert!((weights.weight[1] - 49.0).abs() < 1e-12);
    }

    #[test]
    fn devex_update_takes_max() {
        let mut weights = EdgeWeights::new(WeightMode::Devex, 2);
        weights.weight = vec![2.0, 1.0];
        let mut column = SparseVector::new(2);
        column.set(0, 1.0);
        column.set(1, 3.0);
        // ratio at row 1 = 3, candidate = 9 * 2 = 18 > 1
        weights.update(&column, None, 0, 1.0);
        assert!((weights.weight[1] - 18.0).abs() < 1e-12);
        // pivotal row floored at 1: 2/1 = 2 -> stays 2
        assert!((weights.weight[0] - 2.0).abs() < 1e-12);
        assert!(weights.new_framework_wanted);
    }

    #[test]
    fn devex_framework_ages_out() {
        let mut weights = EdgeWeights::new(WeightMode::Devex, 10);
        assert!(!weights.devex_framework_stale(10));
        weights.devex_iterations = MIN_ABS_DEVEX_ITERATIONS;
        assert!(weights.devex_framework_stale(10));
        weights.new_devex_framework();
        assert!(!weights.devex_framework_stale(10));
        assert_eq!(weights.framework_count, 1);
    }

    #[test]
    fn observe_exact_rejects_drifted_weight() {
        let mut weights = EdgeWeights::new(WeightMode::Dse, 2);
        weights.weight = vec![10.0, 1.0];
        assert!(weights.observe_exact(0, 1.0));
        assert_eq!(weights.weight[0], 1.0);
        assert_eq!(weights.num_weight_rejects, 1);
        assert!(!weights.observe_exact(1, 1.1));
        assert_eq!(weights.num_weight_checks, 2);
    }
}
