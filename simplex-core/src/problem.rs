//! Problem data structures, solver options and validation.
//!
//! This module defines the canonical LP representation consumed by the dual
//! simplex engine, the options bag, and all status/result types exchanged
//! with callers.

use std::fmt;

use thiserror::Error;

/// Sparse constraint matrix in CSC format (m rows, n columns).
pub type SparseColMatrix = sprs::CsMat<f64>;

/// Bounds closer together than this are treated as a fixed variable rather
/// than rejected as inconsistent.
pub const FIXED_EQUALITY_TOLERANCE: f64 = 1e-8;

/// Objective sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjSense {
    /// Minimise the objective (internal canonical form)
    #[default]
    Minimize,
    /// Maximise the objective (costs are negated internally)
    Maximize,
}

/// Linear program in column-wise sparse form.
///
/// ```text
/// minimise    c^T x
/// subject to  row_lower <= A x <= row_upper
///             col_lower <=  x  <= col_upper
/// ```
///
/// The matrix is read-only borrowed by the engine for the duration of a
/// solve; working copies absorb scaling and perturbation.
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Constraint matrix A (m × n, CSC)
    pub a_matrix: SparseColMatrix,

    /// Linear cost vector c (length n)
    pub col_cost: Vec<f64>,

    /// Column lower bounds (length n, -inf allowed)
    pub col_lower: Vec<f64>,

    /// Column upper bounds (length n, +inf allowed)
    pub col_upper: Vec<f64>,

    /// Row activity lower bounds (length m, -inf allowed)
    pub row_lower: Vec<f64>,

    /// Row activity upper bounds (length m, +inf allowed)
    pub row_upper: Vec<f64>,

    /// Objective sense
    pub sense: ObjSense,

    /// Optional column names (diagnostics only)
    pub col_names: Option<Vec<String>>,

    /// Optional row names (diagnostics only)
    pub row_names: Option<Vec<String>>,
}

/// Errors raised for invalid input. Runtime outcomes (infeasible, limits,
/// numerical trouble) are reported through [`SolveStatus`], not errors.
#[derive(Error, Debug)]
pub enum SimplexError {
    /// An array has the wrong length for the problem dimensions
    #[error("{what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        /// Name of the offending array
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// The constraint matrix is not in CSC storage
    #[error("constraint matrix must be in CSC storage")]
    MatrixNotColumnWise,

    /// A row index in the matrix is out of range
    #[error("matrix column {col} has row index {row} out of range (m = {num_row})")]
    IndexOutOfRange {
        /// Column containing the bad entry
        col: usize,
        /// Offending row index
        row: usize,
        /// Number of rows
        num_row: usize,
    },

    /// A cost or matrix entry is NaN or infinite
    #[error("{what}[{index}] is not finite")]
    NonFiniteData {
        /// Name of the offending array
        what: &'static str,
        /// Offending position
        index: usize,
    },

    /// A lower bound exceeds its upper bound by more than the
    /// fixed-equality tolerance
    #[error("{what} {index} has lower bound {lower} > upper bound {upper}")]
    InconsistentBounds {
        /// "column" or "row"
        what: &'static str,
        /// Offending position
        index: usize,
        /// Lower bound
        lower: f64,
        /// Upper bound
        upper: f64,
    },
}

/// Result alias for fallible engine operations.
pub type SimplexResult<T> = Result<T, SimplexError>;

impl LpProblem {
    /// Number of structural columns (n).
    pub fn num_col(&self) -> usize {
        self.col_cost.len()
    }

    /// Number of rows (m).
    pub fn num_row(&self) -> usize {
        self.row_lower.len()
    }

    /// Validate dimensions, matrix structure, finiteness and bound
    /// consistency.
    pub fn validate(&self) -> SimplexResult<()> {
        let n = self.num_col();
        let m = self.num_row();

        if !self.a_matrix.is_csc() {
            return Err(SimplexError::MatrixNotColumnWise);
        }
        if self.a_matrix.cols() != n {
            return Err(SimplexError::DimensionMismatch {
                what: "a_matrix columns",
                expected: n,
                actual: self.a_matrix.cols(),
            });
        }
        if self.a_matrix.rows() != m {
            return Err(SimplexError::DimensionMismatch {
                what: "a_matrix rows",
                expected: m,
                actual: self.a_matrix.rows(),
            });
        }
        for (what, arr, expected) in [
            ("col_cost", &self.col_cost, n),
            ("col_lower", &self.col_lower, n),
            ("col_upper", &self.col_upper, n),
            ("row_lower", &self.row_lower, m),
            ("row_upper", &self.row_upper, m),
        ] {
            if arr.len() != expected {
                return Err(SimplexError::DimensionMismatch {
                    what,
                    expected,
                    actual: arr.len(),
                });
            }
        }

        for (j, col) in self.a_matrix.outer_iterator().enumerate() {
            for (i, &v) in col.iter() {
                if i >= m {
                    return Err(SimplexError::IndexOutOfRange {
                        col: j,
                        row: i,
                        num_row: m,
                    });
                }
                if !v.is_finite() {
                    return Err(SimplexError::NonFiniteData {
                        what: "a_matrix",
                        index: j,
                    });
                }
            }
        }

        for (j, &c) in self.col_cost.iter().enumerate() {
            if !c.is_finite() {
                return Err(SimplexError::NonFiniteData {
                    what: "col_cost",
                    index: j,
                });
            }
        }
        for (j, (&l, &u)) in self.col_lower.iter().zip(&self.col_upper).enumerate() {
            if l.is_nan() || u.is_nan() {
                return Err(SimplexError::NonFiniteData {
                    what: "col bounds",
                    index: j,
                });
            }
            if l > u + FIXED_EQUALITY_TOLERANCE {
                return Err(SimplexError::InconsistentBounds {
                    what: "column",
                    index: j,
                    lower: l,
                    upper: u,
                });
            }
        }
        for (i, (&l, &u)) in self.row_lower.iter().zip(&self.row_upper).enumerate() {
            if l.is_nan() || u.is_nan() {
                return Err(SimplexError::NonFiniteData {
                    what: "row bounds",
                    index: i,
                });
            }
            if l > u + FIXED_EQUALITY_TOLERANCE {
                return Err(SimplexError::InconsistentBounds {
                    what: "row",
                    index: i,
                    lower: l,
                    upper: u,
                });
            }
        }

        Ok(())
    }
}

/// Top-level simplex strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimplexStrategy {
    /// One iteration at a time, single-threaded
    #[default]
    Serial,
    /// Single-iteration parallelism: parallel PRICE slices and FTRANs
    /// within one serial iteration
    Sip,
    /// Parallelism across multiple iterations: batched minor iterations
    /// against one factor
    Pami,
}

/// Dual edge-weight strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DualEdgeWeightStrategy {
    /// Let the engine pick (steepest edge with Devex fallback)
    #[default]
    Choose,
    /// Unit weights
    Dantzig,
    /// Approximate steepest edge
    Devex,
    /// Exact dual steepest edge
    SteepestEdge,
    /// Steepest edge, switching to Devex when DSE iterations become costly
    SteepestEdgeToDevex,
}

/// Primal edge-weight strategy (accepted for interface completeness; the
/// dual engine consumes only the dual strategy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimalEdgeWeightStrategy {
    /// Let the engine pick
    #[default]
    Choose,
    /// Unit weights
    Dantzig,
    /// Approximate steepest edge
    Devex,
}

/// PRICE strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceStrategy {
    /// Always column-wise
    Col,
    /// Always row-wise
    Row,
    /// Row-wise, switching to column-wise for dense pivotal rows
    RowSwitch,
    /// Row-wise with switches in both directions on running densities
    #[default]
    RowSwitchColSwitch,
    /// Row-wise with an index list of touched nonbasic columns
    RowUltra,
}

/// Solver options.
#[derive(Debug, Clone)]
pub struct SimplexSettings {
    // === Strategy ===
    /// Serial, SIP or PAMI
    pub simplex_strategy: SimplexStrategy,

    /// Dual edge-weight scheme
    pub dual_edge_weight_strategy: DualEdgeWeightStrategy,

    /// Primal edge-weight scheme (interface completeness)
    pub primal_edge_weight_strategy: PrimalEdgeWeightStrategy,

    /// PRICE mode selection
    pub price_strategy: PriceStrategy,

    /// Minor iterations batched per PAMI major iteration (capped at 8)
    pub pami_batch_size: usize,

    // === Tolerances ===
    /// Primal feasibility tolerance
    pub primal_feasibility_tolerance: f64,

    /// Dual feasibility tolerance
    pub dual_feasibility_tolerance: f64,

    // === Numerics ===
    /// Perturb costs at phase start to fight degeneracy
    pub perturb_costs: bool,

    /// Scale the working copy of the LP by row/column equilibration
    pub scale: bool,

    /// Product-form updates absorbed before a forced refactorisation
    pub update_limit: usize,

    /// Compute exact DSE weights for a non-logical starting basis
    pub initial_dse_weights: bool,

    /// Permit the costly-DSE heuristic to switch to Devex mid-solve
    pub allow_dse_to_devex_switch: bool,

    // === Termination ===
    /// Wall-clock limit in seconds (None = unlimited)
    pub run_time_limit: Option<f64>,

    /// Iteration limit (None = unlimited)
    pub iteration_limit: Option<usize>,

    /// Dual objective bound: phase-2 iterations stop once the dual
    /// objective passes this value (None = no cutoff)
    pub objective_bound: Option<f64>,

    // === Warm start ===
    /// Optional starting basis from a previous solve
    pub warm_start: Option<Basis>,

    // === Output ===
    /// Print progress information
    pub verbose: bool,

    /// Iteration-report frequency (print every N iterations)
    pub log_freq: usize,
}

impl Default for SimplexSettings {
    fn default() -> Self {
        Self {
            simplex_strategy: SimplexStrategy::default(),
            dual_edge_weight_strategy: DualEdgeWeightStrategy::default(),
            primal_edge_weight_strategy: PrimalEdgeWeightStrategy::default(),
            price_strategy: PriceStrategy::default(),
            pami_batch_size: 8,
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            perturb_costs: true,
            scale: true,
            update_limit: 5000,
            initial_dse_weights: true,
            allow_dse_to_devex_switch: true,
            run_time_limit: None,
            iteration_limit: None,
            objective_bound: None,
            warm_start: None,
            verbose: false,
            log_freq: 100,
        }
    }
}

impl SimplexSettings {
    /// Settings with verbose output enabled.
    pub fn verbose() -> Self {
        let mut s = Self::default();
        s.verbose = true;
        s.log_freq = 1;
        s
    }

    /// Set the wall-clock limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.run_time_limit = Some(seconds);
        self
    }

    /// Set the iteration limit.
    pub fn with_iteration_limit(mut self, iterations: usize) -> Self {
        self.iteration_limit = Some(iterations);
        self
    }

    /// Provide a starting basis.
    pub fn with_warm_start(mut self, basis: Basis) -> Self {
        self.warm_start = Some(basis);
        self
    }
}

/// Solution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found
    Optimal,

    /// Problem is unbounded (dual infeasibility certified in phase 1)
    Unbounded,

    /// Problem is primal infeasible (dual ray found in phase 2)
    Infeasible,

    /// Wall-clock limit reached; basis preserved
    TimeLimit,

    /// Iteration limit reached; basis preserved
    IterationLimit,

    /// Dual objective passed the caller's bound in phase 2
    ObjectiveCutoff,

    /// Numerical trouble exhausted the local recovery budget
    Numerical,

    /// Internal error
    Error,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "Optimal"),
            SolveStatus::Unbounded => write!(f, "Unbounded"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::TimeLimit => write!(f, "Time Limit"),
            SolveStatus::IterationLimit => write!(f, "Iteration Limit"),
            SolveStatus::ObjectiveCutoff => write!(f, "Objective Cutoff"),
            SolveStatus::Numerical => write!(f, "Numerical Error"),
            SolveStatus::Error => write!(f, "Error"),
        }
    }
}

/// Status of one variable or row in a basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisStatus {
    /// Nonbasic at lower bound
    Lower,
    /// Basic
    Basic,
    /// Nonbasic at upper bound
    Upper,
    /// Free nonbasic at zero
    Zero,
    /// Nonbasic at an unspecified bound
    Nonbasic,
    /// Super-basic (between bounds; accepted on input, never produced)
    Super,
}

/// A simplex basis expressed in caller coordinates.
#[derive(Debug, Clone)]
pub struct Basis {
    /// Status of each structural column (length n)
    pub col_status: Vec<BasisStatus>,
    /// Status of each row's logical (length m)
    pub row_status: Vec<BasisStatus>,
}

/// Primal/dual solution values in caller coordinates.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Primal values of the structural columns (length n)
    pub col_value: Vec<f64>,
    /// Reduced costs of the structural columns (length n)
    pub col_dual: Vec<f64>,
    /// Row activities A x (length m)
    pub row_value: Vec<f64>,
    /// Row dual values (length m)
    pub row_dual: Vec<f64>,
}

/// Diagnostics accumulated over a solve.
#[derive(Debug, Clone, Default)]
pub struct SolveInfo {
    /// Simplex iterations performed (serial + minor)
    pub iteration_count: usize,

    /// Number of INVERTs (initial factorisation included)
    pub invert_count: usize,

    /// Number of rebuilds
    pub rebuild_count: usize,

    /// Total solve time in milliseconds
    pub solve_time_ms: u64,

    /// Maximum primal infeasibility at termination
    pub max_primal_infeasibility: f64,

    /// Maximum dual infeasibility at termination
    pub max_dual_infeasibility: f64,

    /// Number of costly DSE iterations observed
    pub costly_dse_iterations: usize,
}

/// Result of a solve: status, solution, basis and diagnostics.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Termination status
    pub status: SolveStatus,

    /// Solution values (best available when not optimal)
    pub solution: Solution,

    /// Final basis
    pub basis: Basis,

    /// Objective value at the reported solution
    pub objective: f64,

    /// Solve diagnostics
    pub info: SolveInfo,
}

/// Caller-side signals that derived simplex data must be invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpAction {
    /// The LP was replaced by its dual
    Dualise,
    /// Columns or rows were permuted
    Permute,
    /// The LP was rescaled
    Scale,
    /// Costs changed
    NewCosts,
    /// Bounds changed
    NewBounds,
    /// The basis was replaced
    NewBasis,
    /// Columns were appended
    NewCols,
    /// Rows were appended
    NewRows,
    /// Columns were deleted
    DelCols,
    /// Rows were deleted
    DelRows,
    /// Rows were deleted but the basis is known to remain valid
    DelRowsBasisOk,
}

/// Validity flags for data derived from the LP during a solve.
///
/// Each [`LpAction`] clears a defined subset; the solve path re-establishes
/// flags as it rebuilds the corresponding data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SimplexLpStatus {
    pub has_basis: bool,
    pub has_matrix_col_wise: bool,
    pub has_matrix_row_wise: bool,
    pub has_factor_arrays: bool,
    pub has_dual_steepest_edge_weights: bool,
    pub has_nonbasic_dual_values: bool,
    pub has_basic_primal_values: bool,
    pub has_invert: bool,
    pub has_fresh_invert: bool,
    pub has_fresh_rebuild: bool,
}

impl SimplexLpStatus {
    /// Clear every flag.
    pub fn invalidate(&mut self) {
        *self = SimplexLpStatus::default();
    }

    /// Clear the flags affected by `action`.
    pub fn update(&mut self, action: LpAction) {
        match action {
            LpAction::Dualise | LpAction::Permute => self.invalidate(),
            LpAction::Scale => {
                self.has_matrix_row_wise = false;
                self.has_factor_arrays = false;
                self.has_dual_steepest_edge_weights = false;
                self.has_nonbasic_dual_values = false;
                self.has_basic_primal_values = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
            }
            LpAction::NewCosts => {
                self.has_nonbasic_dual_values = false;
                self.has_fresh_rebuild = false;
            }
            LpAction::NewBounds => {
                self.has_basic_primal_values = false;
                self.has_fresh_rebuild = false;
            }
            LpAction::NewBasis | LpAction::DelRowsBasisOk => {
                self.has_factor_arrays = false;
                self.has_dual_steepest_edge_weights = false;
                self.has_nonbasic_dual_values = false;
                self.has_basic_primal_values = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
            }
            LpAction::NewCols | LpAction::NewRows => {
                self.has_matrix_col_wise = false;
                self.has_matrix_row_wise = false;
                self.has_factor_arrays = false;
                self.has_dual_steepest_edge_weights = false;
                self.has_nonbasic_dual_values = false;
                self.has_basic_primal_values = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
            }
            LpAction::DelCols | LpAction::DelRows => {
                self.has_basis = false;
                self.has_matrix_col_wise = false;
                self.has_matrix_row_wise = false;
                self.has_factor_arrays = false;
                self.has_dual_steepest_edge_weights = false;
                self.has_nonbasic_dual_values = false;
                self.has_basic_primal_values = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
            }
        }
    }
}

/// Build a sparse CSC matrix from (row, col, value) triplets.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseColMatrix
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = sprs::TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_lp() -> LpProblem {
        // min -x1 - x2  s.t.  0 <= x1 + x2 + x3 <= 2,  x >= 0
        LpProblem {
            a_matrix: from_triplets(1, 3, vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)]),
            col_cost: vec![-1.0, -1.0, 0.0],
            col_lower: vec![0.0; 3],
            col_upper: vec![f64::INFINITY; 3],
            row_lower: vec![0.0],
            row_upper: vec![2.0],
            sense: ObjSense::Minimize,
            col_names: None,
            row_names: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_lp() {
        assert!(small_lp().validate().is_ok());
    }

    #[test]
    fn validate_rejects_dimension_mismatch() {
        let mut lp = small_lp();
        lp.col_cost.pop();
        assert!(matches!(
            lp.validate(),
            Err(SimplexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_crossed_bounds() {
        let mut lp = small_lp();
        lp.col_lower[1] = 3.0;
        lp.col_upper[1] = 1.0;
        assert!(matches!(
            lp.validate(),
            Err(SimplexError::InconsistentBounds { .. })
        ));
    }

    #[test]
    fn validate_accepts_nearly_fixed_bounds() {
        let mut lp = small_lp();
        lp.col_lower[0] = 1.0 + 0.5 * FIXED_EQUALITY_TOLERANCE;
        lp.col_upper[0] = 1.0;
        assert!(lp.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_finite_cost() {
        let mut lp = small_lp();
        lp.col_cost[0] = f64::NAN;
        assert!(matches!(
            lp.validate(),
            Err(SimplexError::NonFiniteData { .. })
        ));
    }

    #[test]
    fn lp_status_new_costs_clears_dual_values_only() {
        let mut status = SimplexLpStatus {
            has_basis: true,
            has_matrix_col_wise: true,
            has_matrix_row_wise: true,
            has_factor_arrays: true,
            has_dual_steepest_edge_weights: true,
            has_nonbasic_dual_values: true,
            has_basic_primal_values: true,
            has_invert: true,
            has_fresh_invert: true,
            has_fresh_rebuild: true,
        };
        status.update(LpAction::NewCosts);
        assert!(status.has_basis);
        assert!(status.has_invert);
        assert!(!status.has_nonbasic_dual_values);
        assert!(!status.has_fresh_rebuild);
    }

    #[test]
    fn lp_status_del_cols_clears_basis() {
        let mut status = SimplexLpStatus {
            has_basis: true,
            has_invert: true,
            ..Default::default()
        };
        status.update(LpAction::DelCols);
        assert!(!status.has_basis);
        assert!(!status.has_invert);
    }
}
