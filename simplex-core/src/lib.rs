//! A dual revised simplex engine for large sparse linear programs.
//!
//! Solves problems of the form
//!
//! ```text
//! minimise    c^T x
//! subject to  row_lower <= A x <= row_upper
//!             col_lower <=  x  <= col_upper
//! ```
//!
//! with A a sparse m × n matrix (m ≪ n typical). Key features:
//!
//! - **Sparse basis inverse**: LU factorisation with product-form updates,
//!   hyper-sparse FTRAN/BTRAN, singularity repair with logicals
//! - **Bound-Flipping Ratio Test** with Harris tolerances
//! - **Dual steepest-edge and Devex** pricing with accuracy monitoring
//!   and automatic demotion when DSE iterations become costly
//! - **PAMI**: batched minor iterations with parallel BTRAN/PRICE/FTRAN
//!
//! Parsing, presolve, crash starts and the primal simplex are external
//! collaborators: this crate takes an [`LpProblem`] and returns a
//! [`SolveResult`] with solution, basis and diagnostics.
//!
//! # Example
//!
//! ```
//! use simplex_core::{solve, LpProblem, ObjSense, SimplexSettings, SolveStatus};
//! use simplex_core::problem::from_triplets;
//!
//! // min -x1 - x2  s.t.  x1 + x2 + x3 <= 2, x >= 0
//! let lp = LpProblem {
//!     a_matrix: from_triplets(1, 3, vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)]),
//!     col_cost: vec![-1.0, -1.0, 0.0],
//!     col_lower: vec![0.0; 3],
//!     col_upper: vec![f64::INFINITY; 3],
//!     row_lower: vec![0.0],
//!     row_upper: vec![2.0],
//!     sense: ObjSense::Minimize,
//!     col_names: None,
//!     row_names: None,
//! };
//!
//! let result = solve(&lp, &SimplexSettings::default()).unwrap();
//! assert_eq!(result.status, SolveStatus::Optimal);
//! assert!((result.objective + 2.0).abs() < 1e-7);
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // simplex pipelines carry many operands

pub mod dual;
pub mod dual_rhs;
pub mod dual_row;
pub mod edge_weights;
pub mod linalg;
pub mod matrix;
pub mod monitor;
pub mod problem;
pub mod scaling;
pub mod state;
pub mod util;

// Re-export main types
pub use problem::{
    Basis, BasisStatus, DualEdgeWeightStrategy, LpAction, LpProblem, ObjSense,
    PriceStrategy, PrimalEdgeWeightStrategy, SimplexError, SimplexLpStatus, SimplexResult,
    SimplexSettings, SimplexStrategy, Solution, SolveInfo, SolveResult, SolveStatus,
};
pub use util::logging::{LogType, Logger, MessageLevel};

use dual::DualEngine;
use scaling::{scale_lp, Scaling};

/// Solve an LP with the dual revised simplex method.
///
/// Input-validity problems are returned as [`SimplexError`]; algorithmic
/// outcomes (optimal, infeasible, limits, numerical trouble) are reported
/// in [`SolveResult::status`].
pub fn solve(lp: &LpProblem, settings: &SimplexSettings) -> SimplexResult<SolveResult> {
    let logger = if settings.verbose {
        Logger::verbose()
    } else {
        Logger::quiet()
    };
    solve_with_logger(lp, settings, &logger)
}

/// [`solve`] with a caller-supplied message sink.
pub fn solve_with_logger(
    lp: &LpProblem,
    settings: &SimplexSettings,
    logger: &Logger,
) -> SimplexResult<SolveResult> {
    lp.validate()?;

    let sense_mult = match lp.sense {
        ObjSense::Minimize => 1.0,
        ObjSense::Maximize => -1.0,
    };

    // The engine works on a scaled copy; the original LP is untouched.
    let mut work_lp = lp.clone();
    let scaling = if settings.scale {
        scale_lp(&mut work_lp)
    } else {
        Scaling::identity(lp.num_col(), lp.num_row())
    };

    // Map the caller's objective bound into engine space: scaled,
    // sense-adjusted.
    let objective_cutoff = settings
        .objective_bound
        .map(|bound| sense_mult * bound / scaling.cost_scale);

    let mut engine = DualEngine::new(&work_lp, settings, logger, objective_cutoff);
    let status = engine.solve();

    Ok(extract_result(lp, &scaling, sense_mult, status, &engine))
}

/// Map the engine's final state back into caller coordinates.
fn extract_result(
    lp: &LpProblem,
    scaling: &Scaling,
    sense_mult: f64,
    status: SolveStatus,
    engine: &DualEngine<'_>,
) -> SolveResult {
    let state = engine.state();
    let n = lp.num_col();
    let m = lp.num_row();

    // Position of each basic variable.
    let mut basic_position = vec![usize::MAX; state.num_tot];
    for (k, &var) in state.basic_index.iter().enumerate() {
        basic_position[var] = k;
    }

    let scaled_value = |var: usize| -> f64 {
        let pos = basic_position[var];
        if pos != usize::MAX {
            state.base_value[pos]
        } else {
            state.work_value[var]
        }
    };

    let mut col_value = Vec::with_capacity(n);
    let mut col_dual = Vec::with_capacity(n);
    for j in 0..n {
        col_value.push(scaling.unscale_col_value(j, scaled_value(j)));
        col_dual.push(sense_mult * scaling.unscale_col_dual(j, state.work_dual[j]));
    }

    let mut row_value = Vec::with_capacity(m);
    let mut row_dual = Vec::with_capacity(m);
    for i in 0..m {
        let logical = n + i;
        // Internal convention is A x + z = 0, so the activity is -z.
        row_value.push(scaling.unscale_row_value(i, -scaled_value(logical)));
        row_dual.push(sense_mult * scaling.unscale_row_dual(i, -state.work_dual[logical]));
    }

    let objective: f64 = lp
        .col_cost
        .iter()
        .zip(&col_value)
        .map(|(&c, &x)| c * x)
        .sum();

    SolveResult {
        status,
        solution: Solution {
            col_value,
            col_dual,
            row_value,
            row_dual,
        },
        basis: engine.state().export_basis(),
        objective,
        info: engine.info(),
    }
}
