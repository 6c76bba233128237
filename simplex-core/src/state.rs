//! Working arrays, basis and bound/cost initialisation.
//!
//! `SimplexState` is the plain aggregate every subsystem reads and writes:
//! working costs, bounds and values over the `n + m` variable space
//! (logicals appended after structurals), the basic-position arrays, the
//! basis itself, and the perturbation/shift bookkeeping. Subsystems take a
//! borrowed reference to it instead of holding back-pointers.
//!
//! The internal row convention is `A·x + z = 0` with
//! `work_lower[n+i] = -row_upper[i]` and `work_upper[n+i] = -row_lower[i]`,
//! so basis columns come straight out of `[A I]`.

use crate::linalg::factor::Factor;
use crate::linalg::vector::SparseVector;
use crate::matrix::Matrix;
use crate::problem::{Basis, BasisStatus, LpProblem, ObjSense, SimplexLpStatus};

/// Artificial bounds given to free variables in the phase-1 subproblem.
const PHASE1_FREE_BOUND: f64 = 1000.0;

/// Relative size of the deterministic cost perturbation.
const PERTURBATION_SIZE: f64 = 1e-5;

/// Solve phase: 1 = attain dual feasibility, 2 = optimise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dual phase 1: bound-shifted subproblem
    One,
    /// Dual phase 2: original bounds
    Two,
}

/// The shared simplex state aggregate.
#[derive(Debug, Clone)]
pub struct SimplexState {
    /// Number of structural columns
    pub num_col: usize,
    /// Number of rows
    pub num_row: usize,
    /// `num_col + num_row`
    pub num_tot: usize,

    // Working arrays over the full variable space
    /// Phase cost, including perturbation and shifts
    pub work_cost: Vec<f64>,
    /// Per-column cost shifts, unwound only in cleanup
    pub work_shift: Vec<f64>,
    /// Working lower bounds (phase dependent)
    pub work_lower: Vec<f64>,
    /// Working upper bounds (phase dependent)
    pub work_upper: Vec<f64>,
    /// `work_upper - work_lower`
    pub work_range: Vec<f64>,
    /// Values of nonbasic variables
    pub work_value: Vec<f64>,
    /// Reduced costs
    pub work_dual: Vec<f64>,

    // Basic arrays, by basis position
    /// Lower bound of the basic variable in each position
    pub base_lower: Vec<f64>,
    /// Upper bound of the basic variable in each position
    pub base_upper: Vec<f64>,
    /// Value of the basic variable in each position
    pub base_value: Vec<f64>,

    // Basis
    /// Variable occupying each basis position
    pub basic_index: Vec<usize>,
    /// 1 = nonbasic, 0 = basic
    pub nonbasic_flag: Vec<i8>,
    /// +1 at lower, -1 at upper, 0 fixed/free
    pub nonbasic_move: Vec<i8>,

    /// Whether `work_cost` carries a perturbation
    pub costs_perturbed: bool,
    /// Whether any `work_shift` entry is nonzero
    pub costs_shifted: bool,

    /// Validity flags for derived data
    pub lp_status: SimplexLpStatus,

    // Unperturbed cost and phase-2 bounds over the full variable space
    orig_cost: Vec<f64>,
    orig_lower: Vec<f64>,
    orig_upper: Vec<f64>,
}

impl SimplexState {
    /// Build the state arrays from the (scaled) working LP.
    pub fn new(lp: &LpProblem) -> Self {
        let num_col = lp.num_col();
        let num_row = lp.num_row();
        let num_tot = num_col + num_row;

        let sense_mult = match lp.sense {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => -1.0,
        };

        let mut orig_cost = vec![0.0; num_tot];
        let mut orig_lower = vec![0.0; num_tot];
        let mut orig_upper = vec![0.0; num_tot];
        for j in 0..num_col {
            orig_cost[j] = sense_mult * lp.col_cost[j];
            orig_lower[j] = lp.col_lower[j];
            orig_upper[j] = lp.col_upper[j].max(lp.col_lower[j]);
        }
        for i in 0..num_row {
            orig_lower[num_col + i] = -lp.row_upper[i];
            orig_upper[num_col + i] = (-lp.row_lower[i]).max(-lp.row_upper[i]);
        }

        SimplexState {
            num_col,
            num_row,
            num_tot,
            work_cost: vec![0.0; num_tot],
            work_shift: vec![0.0; num_tot],
            work_lower: vec![0.0; num_tot],
            work_upper: vec![0.0; num_tot],
            work_range: vec![0.0; num_tot],
            work_value: vec![0.0; num_tot],
            work_dual: vec![0.0; num_tot],
            base_lower: vec![0.0; num_row],
            base_upper: vec![0.0; num_row],
            base_value: vec![0.0; num_row],
            basic_index: vec![0; num_row],
            nonbasic_flag: vec![1; num_tot],
            nonbasic_move: vec![0; num_tot],
            costs_perturbed: false,
            costs_shifted: false,
            lp_status: SimplexLpStatus::default(),
            orig_cost,
            orig_lower,
            orig_upper,
        }
    }

    /// Start from the all-logical basis.
    pub fn initialise_with_logical_basis(&mut self) {
        for j in 0..self.num_tot {
            self.nonbasic_flag[j] = 1;
        }
        for i in 0..self.num_row {
            let logical = self.num_col + i;
            self.basic_index[i] = logical;
            self.nonbasic_flag[logical] = 0;
            self.nonbasic_move[logical] = 0;
        }
        for j in 0..self.num_col {
            self.nonbasic_move[j] = self.preferred_move(j);
        }
        self.lp_status.has_basis = true;
    }

    /// Adopt a caller-supplied basis; falls back to the logical basis when
    /// the basic count is off.
    pub fn initialise_with_basis(&mut self, basis: &Basis) -> bool {
        if basis.col_status.len() != self.num_col || basis.row_status.len() != self.num_row {
            self.initialise_with_logical_basis();
            return false;
        }
        let mut basic: Vec<usize> = Vec::with_capacity(self.num_row);
        let num_col = self.num_col;
        let status_of = |j: usize| -> BasisStatus {
            if j < num_col {
                basis.col_status[j]
            } else {
                basis.row_status[j - num_col]
            }
        };
        for j in 0..self.num_tot {
            match status_of(j) {
                BasisStatus::Basic => {
                    self.nonbasic_flag[j] = 0;
                    self.nonbasic_move[j] = 0;
                    basic.push(j);
                }
                BasisStatus::Lower => {
                    self.nonbasic_flag[j] = 1;
                    self.nonbasic_move[j] = 1;
                }
                BasisStatus::Upper => {
                    self.nonbasic_flag[j] = 1;
                    self.nonbasic_move[j] = -1;
                }
                BasisStatus::Zero | BasisStatus::Nonbasic | BasisStatus::Super => {
                    self.nonbasic_flag[j] = 1;
                    self.nonbasic_move[j] = self.preferred_move(j);
                }
            }
        }
        if basic.len() != self.num_row {
            self.initialise_with_logical_basis();
            return false;
        }
        self.basic_index.copy_from_slice(&basic);
        // Repair moves pointing at infinite bounds.
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] == 1 {
                let mv = self.nonbasic_move[j];
                if (mv == 1 && self.orig_lower[j].is_infinite())
                    || (mv == -1 && self.orig_upper[j].is_infinite())
                {
                    self.nonbasic_move[j] = self.preferred_move(j);
                }
            }
        }
        self.lp_status.has_basis = true;
        true
    }

    /// The natural bound for a nonbasic variable under the phase-2 bounds.
    fn preferred_move(&self, j: usize) -> i8 {
        let lower = self.orig_lower[j];
        let upper = self.orig_upper[j];
        if lower.is_finite() {
            if upper.is_finite() && upper - lower < f64::EPSILON.sqrt() {
                return 0;
            }
            1
        } else if upper.is_finite() {
            -1
        } else {
            0
        }
    }

    /// Install the working bounds for `phase` and refresh `work_range`.
    ///
    /// Phase 1 replaces the bounds by the bound-shifted subproblem in which
    /// dual feasibility is always attainable: boxed variables become fixed
    /// at zero, one-sided variables get a unit range on their open side and
    /// free variables get large artificial bounds.
    pub fn initialise_bound(&mut self, phase: Phase) {
        match phase {
            Phase::Two => {
                self.work_lower.copy_from_slice(&self.orig_lower);
                self.work_upper.copy_from_slice(&self.orig_upper);
            }
            Phase::One => {
                for j in 0..self.num_tot {
                    let lower = self.orig_lower[j];
                    let upper = self.orig_upper[j];
                    let (wl, wu) = match (lower.is_finite(), upper.is_finite()) {
                        (true, true) => (0.0, 0.0),
                        (true, false) => (0.0, 1.0),
                        (false, true) => (-1.0, 0.0),
                        (false, false) => (-PHASE1_FREE_BOUND, PHASE1_FREE_BOUND),
                    };
                    self.work_lower[j] = wl;
                    self.work_upper[j] = wu;
                }
            }
        }
        for j in 0..self.num_tot {
            self.work_range[j] = self.work_upper[j] - self.work_lower[j];
        }
    }

    /// Install the working costs, optionally perturbed. The perturbation is
    /// deterministic (seeded xorshift) and recorded so `cleanup` can remove
    /// it.
    pub fn initialise_cost(&mut self, perturb: bool, dual_tolerance: f64) {
        self.work_cost.copy_from_slice(&self.orig_cost);
        self.work_shift.fill(0.0);
        self.costs_shifted = false;
        self.costs_perturbed = false;
        if !perturb {
            return;
        }
        let max_cost = self
            .orig_cost
            .iter()
            .take(self.num_col)
            .fold(0.0_f64, |acc, &c| acc.max(c.abs()));
        if max_cost == 0.0 {
            return;
        }
        let base = PERTURBATION_SIZE.max(10.0 * dual_tolerance);
        let mut rng_state = 0x9e37_79b9_7f4a_7c15_u64;
        let mut next = || {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;
            (rng_state >> 11) as f64 / (1u64 << 53) as f64
        };
        for j in 0..self.num_col {
            let r = next();
            let size = base * (0.5 + r) * (1.0 + self.work_cost[j].abs());
            // Push the cost toward the side the variable sits on, which
            // keeps the current point dual feasible more often than a
            // symmetric perturbation.
            match self.nonbasic_move[j] {
                1 => self.work_cost[j] += size,
                -1 => self.work_cost[j] -= size,
                _ => {}
            }
        }
        self.costs_perturbed = true;
    }

    /// Place every nonbasic variable on the bound its move points at.
    /// Moves pointing at infinite bounds are repaired first.
    pub fn initialise_value(&mut self) {
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] != 1 {
                self.work_value[j] = 0.0;
                continue;
            }
            let lower = self.work_lower[j];
            let upper = self.work_upper[j];
            let mut mv = self.nonbasic_move[j];
            if lower == upper {
                // Fixed: move 0, parked on the bound.
                self.nonbasic_move[j] = 0;
                self.work_value[j] = lower;
                continue;
            }
            if mv == 1 && lower.is_infinite() {
                mv = if upper.is_finite() { -1 } else { 0 };
            } else if mv == -1 && upper.is_infinite() {
                mv = if lower.is_finite() { 1 } else { 0 };
            } else if mv == 0 && lower.is_finite() {
                mv = 1;
            } else if mv == 0 && !lower.is_finite() && upper.is_finite() {
                mv = -1;
            }
            self.nonbasic_move[j] = mv;
            self.work_value[j] = match mv {
                1 => lower,
                -1 => upper,
                _ => 0.0,
            };
        }
    }

    /// Flip a nonbasic variable to its opposite (finite) bound.
    pub fn flip_bound(&mut self, j: usize) {
        debug_assert_eq!(self.nonbasic_flag[j], 1);
        let mv = -self.nonbasic_move[j];
        self.nonbasic_move[j] = mv;
        self.work_value[j] = if mv == 1 {
            self.work_lower[j]
        } else {
            self.work_upper[j]
        };
    }

    /// Move a variable out of the basis onto a sensible bound under the
    /// current working bounds. Used when a singular factorisation displaces
    /// a basic variable.
    pub fn place_nonbasic(&mut self, var: usize) {
        self.nonbasic_flag[var] = 1;
        let lower = self.work_lower[var];
        let upper = self.work_upper[var];
        let (mv, value) = if lower == upper {
            (0, lower)
        } else if lower.is_finite() {
            (1, lower)
        } else if upper.is_finite() {
            (-1, upper)
        } else {
            (0, 0.0)
        };
        self.nonbasic_move[var] = mv;
        self.work_value[var] = value;
    }

    /// Record a shift making the dual of `j` exactly feasible at zero.
    /// The reduced cost moves with the cost.
    pub fn shift_cost(&mut self, j: usize, amount: f64) {
        if amount == 0.0 {
            return;
        }
        self.work_shift[j] += amount;
        self.work_cost[j] += amount;
        self.work_dual[j] += amount;
        self.costs_shifted = true;
    }

    /// Remove the recorded shift of `j`.
    pub fn shift_back(&mut self, j: usize) {
        let amount = self.work_shift[j];
        if amount != 0.0 {
            self.work_cost[j] -= amount;
            self.work_dual[j] -= amount;
            self.work_shift[j] = 0.0;
        }
    }

    /// Refresh the basic-position bound arrays from the working bounds.
    pub fn populate_base_bounds(&mut self) {
        for k in 0..self.num_row {
            let var = self.basic_index[k];
            self.base_lower[k] = self.work_lower[var];
            self.base_upper[k] = self.work_upper[var];
        }
    }

    /// Recompute every reduced cost from scratch: `d = c - Aᵀ B⁻ᵀ c_B`.
    pub fn compute_dual(
        &mut self,
        factor: &Factor,
        matrix: &Matrix,
        row_buf: &mut SparseVector,
        col_buf: &mut SparseVector,
    ) {
        row_buf.clear();
        for k in 0..self.num_row {
            let c = self.work_cost[self.basic_index[k]];
            if c != 0.0 {
                row_buf.set(k, c);
            }
        }
        factor.btran(row_buf);

        matrix.price_by_col(col_buf, row_buf);
        for j in 0..self.num_col {
            self.work_dual[j] = self.work_cost[j] - col_buf.array[j];
        }
        for i in 0..self.num_row {
            let logical = self.num_col + i;
            self.work_dual[logical] = self.work_cost[logical] - row_buf.array[i];
        }
        for k in 0..self.num_row {
            self.work_dual[self.basic_index[k]] = 0.0;
        }
        self.lp_status.has_nonbasic_dual_values = true;
    }

    /// Recompute every basic value from scratch: `x_B = -B⁻¹ N x_N`.
    pub fn compute_primal(
        &mut self,
        factor: &Factor,
        matrix: &Matrix,
        row_buf: &mut SparseVector,
    ) {
        row_buf.clear();
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] == 1 && self.work_value[j] != 0.0 {
                matrix.collect_column(row_buf, j, -self.work_value[j]);
            }
        }
        factor.ftran(row_buf);
        for k in 0..self.num_row {
            self.base_value[k] = row_buf.array[k];
        }
        self.populate_base_bounds();
        self.lp_status.has_basic_primal_values = true;
    }

    /// Flip boxed nonbasic variables whose dual sits on the wrong side, and
    /// count the dual infeasibilities no flip can repair.
    pub fn correct_dual(&mut self, dual_tolerance: f64) -> usize {
        let mut infeasible = 0;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] != 1 {
                continue;
            }
            let dual = self.work_dual[j];
            match self.nonbasic_move[j] {
                1 if dual < -dual_tolerance => {
                    if self.work_upper[j].is_finite() {
                        self.flip_bound(j);
                    } else {
                        infeasible += 1;
                    }
                }
                -1 if dual > dual_tolerance => {
                    if self.work_lower[j].is_finite() {
                        self.flip_bound(j);
                    } else {
                        infeasible += 1;
                    }
                }
                0 if dual.abs() > dual_tolerance
                    && self.work_lower[j].is_infinite()
                    && self.work_upper[j].is_infinite() =>
                {
                    infeasible += 1;
                }
                _ => {}
            }
        }
        infeasible
    }

    /// Dual infeasibilities that restoring the phase-2 bounds cannot
    /// absorb: the dual's sign demands a bound that is infinite in the
    /// original problem. Decides the phase-1 endgame.
    pub fn count_irreducible_dual_infeasibilities(&self, dual_tolerance: f64) -> usize {
        let mut count = 0;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] != 1 {
                continue;
            }
            let dual = self.work_dual[j];
            if (dual > dual_tolerance && self.orig_lower[j].is_infinite())
                || (dual < -dual_tolerance && self.orig_upper[j].is_infinite())
            {
                count += 1;
            }
        }
        count
    }

    /// Count dual infeasibilities without repairing anything.
    pub fn count_dual_infeasibilities(&self, dual_tolerance: f64) -> usize {
        let mut count = 0;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] != 1 {
                continue;
            }
            let dual = self.work_dual[j];
            let bad = match self.nonbasic_move[j] {
                1 => dual < -dual_tolerance,
                -1 => dual > dual_tolerance,
                _ => {
                    dual.abs() > dual_tolerance
                        && self.work_lower[j].is_infinite()
                        && self.work_upper[j].is_infinite()
                }
            };
            if bad {
                count += 1;
            }
        }
        count
    }

    /// Largest dual infeasibility over the nonbasic variables.
    pub fn max_dual_infeasibility(&self) -> f64 {
        let mut max = 0.0_f64;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] != 1 {
                continue;
            }
            let dual = self.work_dual[j];
            let infeas = match self.nonbasic_move[j] {
                1 => -dual,
                -1 => dual,
                _ => dual.abs(),
            };
            max = max.max(infeas);
        }
        max.max(0.0)
    }

    /// Largest primal infeasibility over the basic variables.
    pub fn max_primal_infeasibility(&self) -> f64 {
        let mut max = 0.0_f64;
        for k in 0..self.num_row {
            let v = self.base_value[k];
            max = max.max(self.base_lower[k] - v).max(v - self.base_upper[k]);
        }
        max.max(0.0)
    }

    /// Dual objective value of the current phase problem, up to a constant:
    /// Σ work_value · work_dual over the nonbasic variables.
    pub fn dual_objective(&self) -> f64 {
        let mut obj = 0.0;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] == 1 && self.work_value[j] != 0.0 {
                obj += self.work_value[j] * self.work_dual[j];
            }
        }
        obj
    }

    /// Objective of the current (scaled, sense-adjusted) point, structural
    /// costs only.
    pub fn primal_objective(&self) -> f64 {
        let mut obj = 0.0;
        for j in 0..self.num_col {
            if self.nonbasic_flag[j] == 1 {
                obj += self.orig_cost[j] * self.work_value[j];
            }
        }
        for k in 0..self.num_row {
            let var = self.basic_index[k];
            if var < self.num_col {
                obj += self.orig_cost[var] * self.base_value[k];
            }
        }
        obj
    }

    /// Restore true costs, dropping perturbation and shifts.
    pub fn restore_costs(&mut self) {
        self.work_cost.copy_from_slice(&self.orig_cost);
        self.work_shift.fill(0.0);
        self.costs_perturbed = false;
        self.costs_shifted = false;
    }

    /// Basis invariant: exactly m basic variables, flags consistent.
    pub fn basis_ok(&self) -> bool {
        let basic_count = self.nonbasic_flag.iter().filter(|&&f| f == 0).count();
        if basic_count != self.num_row {
            return false;
        }
        self.basic_index
            .iter()
            .all(|&var| var < self.num_tot && self.nonbasic_flag[var] == 0)
    }

    /// Export the basis in caller coordinates.
    pub fn export_basis(&self) -> Basis {
        let status_of = |j: usize| -> BasisStatus {
            if self.nonbasic_flag[j] == 0 {
                BasisStatus::Basic
            } else {
                match self.nonbasic_move[j] {
                    1 => BasisStatus::Lower,
                    -1 => BasisStatus::Upper,
                    _ => {
                        if self.orig_lower[j].is_infinite() && self.orig_upper[j].is_infinite() {
                            BasisStatus::Zero
                        } else if (self.orig_upper[j] - self.orig_lower[j]).abs()
                            < f64::EPSILON.sqrt()
                        {
                            BasisStatus::Lower
                        } else {
                            BasisStatus::Nonbasic
                        }
                    }
                }
            }
        };
        Basis {
            col_status: (0..self.num_col).map(status_of).collect(),
            row_status: (self.num_col..self.num_tot).map(status_of).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::from_triplets;

    fn state_for_test() -> SimplexState {
        // min -x1 - x2, 0 <= x1 + x2 <= 2, x1 in [0, inf), x2 in [0, 1],
        // x3 free
        let lp = LpProblem {
            a_matrix: from_triplets(1, 3, vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)]),
            col_cost: vec![-1.0, -1.0, 0.0],
            col_lower: vec![0.0, 0.0, f64::NEG_INFINITY],
            col_upper: vec![f64::INFINITY, 1.0, f64::INFINITY],
            row_lower: vec![0.0],
            row_upper: vec![2.0],
            sense: ObjSense::Minimize,
            col_names: None,
            row_names: None,
        };
        SimplexState::new(&lp)
    }

    #[test]
    fn logical_basis_counts() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        assert!(state.basis_ok());
        assert_eq!(state.nonbasic_flag.iter().filter(|&&f| f == 1).count(), 3);
    }

    #[test]
    fn row_bounds_are_negated_for_logicals() {
        let state = state_for_test();
        // row 0: [0, 2] becomes logical bounds [-2, 0]
        assert_eq!(state.orig_lower[3], -2.0);
        assert_eq!(state.orig_upper[3], 0.0);
    }

    #[test]
    fn phase1_bounds_by_variable_type() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::One);
        // x1: lower only -> [0, 1]
        assert_eq!((state.work_lower[0], state.work_upper[0]), (0.0, 1.0));
        // x2: boxed -> fixed at 0
        assert_eq!((state.work_lower[1], state.work_upper[1]), (0.0, 0.0));
        // x3: free -> large artificial box
        assert_eq!(state.work_lower[2], -PHASE1_FREE_BOUND);
        assert_eq!(state.work_upper[2], PHASE1_FREE_BOUND);
    }

    #[test]
    fn initialise_value_places_nonbasics() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_value();
        assert_eq!(state.work_value[0], 0.0);
        assert_eq!(state.nonbasic_move[0], 1);
        // free variable sits at zero with move 0
        assert_eq!(state.work_value[2], 0.0);
        assert_eq!(state.nonbasic_move[2], 0);
    }

    #[test]
    fn flip_bound_swaps_side() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_value();
        assert_eq!(state.work_value[1], 0.0);
        state.flip_bound(1);
        assert_eq!(state.work_value[1], 1.0);
        assert_eq!(state.nonbasic_move[1], -1);
    }

    #[test]
    fn correct_dual_flips_boxed_variables() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_value();
        // x2 (boxed) at lower with negative dual: flipped, not counted
        state.work_dual[1] = -1.0;
        // x1 (no finite upper) at lower with negative dual: counted
        state.work_dual[0] = -1.0;
        let infeasible = state.correct_dual(1e-7);
        assert_eq!(infeasible, 1);
        assert_eq!(state.nonbasic_move[1], -1);
    }

    #[test]
    fn perturbation_is_recorded_and_removable() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_cost(true, 1e-7);
        assert!(state.costs_perturbed);
        assert!(state.work_cost[0] != state.orig_cost[0]);
        state.restore_costs();
        assert!(!state.costs_perturbed);
        assert_eq!(state.work_cost[0], state.orig_cost[0]);
    }

    #[test]
    fn shift_cost_round_trips() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_cost(false, 1e-7);
        let before = state.work_cost[1];
        state.shift_cost(1, 0.25);
        assert!(state.costs_shifted);
        assert_eq!(state.work_cost[1], before + 0.25);
        state.shift_back(1);
        assert_eq!(state.work_cost[1], before);
        assert_eq!(state.work_shift[1], 0.0);
    }

    #[test]
    fn export_basis_round_trips() {
        let mut state = state_for_test();
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_value();
        let basis = state.export_basis();
        assert_eq!(basis.row_status[0], BasisStatus::Basic);
        assert_eq!(basis.col_status[0], BasisStatus::Lower);
        let mut state2 = state_for_test();
        assert!(state2.initialise_with_basis(&basis));
        assert_eq!(state2.basic_index, state.basic_index);
        assert_eq!(state2.nonbasic_move, state.nonbasic_move);
    }
}
