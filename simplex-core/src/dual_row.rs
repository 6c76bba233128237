//! CHUZC: the bound-flipping ratio test over a pivotal row.
//!
//! Candidates are nonbasic variables whose pivotal-row entry has the sign
//! that lets the dual step grow. Breakpoints are sorted by ratio and
//! absorbed from the small end; a breakpoint whose variable has a finite
//! opposite bound is flipped while the flip strictly shrinks the remaining
//! primal step, and the first breakpoint that cannot be flipped becomes the
//! entering candidate. Breakpoints inside the Harris band above the chosen
//! ratio are retried for the largest pivot magnitude.

use crate::linalg::vector::SparseVector;
use crate::state::SimplexState;
use crate::util::sort::heap_sort_by_key;

/// Pivotal-row entries below this magnitude are never candidates.
const ADMISSION_TOLERANCE: f64 = 1e-9;

/// Chosen pivots below this magnitude fail CHUZC.
const PIVOT_TOLERANCE: f64 = 1e-8;

/// Outcome of the ratio test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChuzcOutcome {
    /// Entering column chosen
    Ok,
    /// No candidate of the correct sign: the dual may be unbounded
    NoCandidate,
    /// Every usable pivot in the Harris band is negligible
    SmallPivot,
}

/// One ratio-test breakpoint.
#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    /// Variable index in the full space
    var: usize,
    /// Pivotal-row entry, unoriented
    pi: f64,
    /// Oriented pivot: positive for admissible candidates
    oriented: f64,
    /// Oriented reduced cost (negative only within dual tolerance)
    dual_hat: f64,
    /// Breakpoint ratio (oriented dual step), clamped nonnegative
    ratio: f64,
}

/// Ratio-test workspace and result.
#[derive(Debug, Clone, Default)]
pub struct DualRow {
    breakpoints: Vec<Breakpoint>,

    /// Variables to flip to their opposite bound
    pub flip_list: Vec<usize>,

    /// Entering variable, when the test succeeded
    pub work_pivot: Option<usize>,

    /// Pivotal-row entry of the entering variable (unoriented)
    pub work_alpha: f64,

    /// Chosen dual step, oriented (>= 0)
    pub work_theta: f64,

    /// Oriented primal step left for the entering column after the
    /// absorbed flips (equals |delta| when nothing flipped)
    pub work_delta_remaining: f64,

    /// The chosen ratio was negative (degenerate): the engine owes the
    /// entering column a cost shift
    pub shift_needed: bool,
}

impl DualRow {
    /// Empty workspace.
    pub fn new() -> Self {
        DualRow::default()
    }

    /// Reset for a new pivotal row.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.flip_list.clear();
        self.work_pivot = None;
        self.work_alpha = 0.0;
        self.work_theta = 0.0;
        self.work_delta_remaining = 0.0;
        self.shift_needed = false;
    }

    /// Number of packed breakpoints.
    pub fn candidate_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// Pack the admissible breakpoints of one pivotal-row segment.
    ///
    /// `pi` holds entries at local indices; `offset` maps them into the
    /// full variable space (0 for structurals, `num_col` for the logicals
    /// delivered by ρ itself).
    pub fn add_candidates(
        &mut self,
        state: &SimplexState,
        pi: &SparseVector,
        offset: usize,
        move_out: i8,
    ) {
        let move_out = move_out as f64;
        let mut consider = |local: usize, value: f64, row: &mut Self| {
            if value == 0.0 {
                return;
            }
            let var = offset + local;
            if state.nonbasic_flag[var] != 1 {
                return;
            }
            // Fixed variables have duals of arbitrary sign; never candidates.
            if state.work_range[var] == 0.0 {
                return;
            }
            let pi_hat = move_out * value;
            let mv = state.nonbasic_move[var] as f64;
            let (oriented, dual_hat) = if mv != 0.0 {
                (pi_hat * mv, state.work_dual[var] * mv)
            } else {
                // Free: admissible in either direction, dual pinned at zero.
                (pi_hat.abs(), state.work_dual[var] * pi_hat.signum())
            };
            if oriented > ADMISSION_TOLERANCE {
                row.breakpoints.push(Breakpoint {
                    var,
                    pi: value,
                    oriented,
                    dual_hat,
                    ratio: dual_hat.max(0.0) / oriented,
                });
            }
        };
        if pi.indexed {
            for &i in &pi.index {
                consider(i, pi.array[i], self);
            }
        } else {
            for i in 0..pi.dim() {
                consider(i, pi.array[i], self);
            }
        }
    }

    /// Shift away the small dual infeasibilities the Harris band may have
    /// left on bypassed breakpoints. Returns the number of shifts applied.
    pub fn shift_infeasible(&self, state: &mut SimplexState, tolerance: f64) -> usize {
        let mut shifted = 0;
        for bp in &self.breakpoints {
            let var = bp.var;
            if state.nonbasic_flag[var] != 1 {
                continue;
            }
            let dual = state.work_dual[var];
            let infeasibility = match state.nonbasic_move[var] {
                1 => -dual,
                -1 => dual,
                _ => dual.abs(),
            };
            if infeasibility > tolerance {
                state.shift_cost(var, -dual);
                shifted += 1;
            }
        }
        shifted
    }

    /// The BFRT walk and Harris tie-break over the packed breakpoints.
    ///
    /// `delta_primal` is the (signed) infeasibility of the leaving row;
    /// `harris_band` the ratio slack within which the largest pivot wins.
    pub fn choose(
        &mut self,
        state: &SimplexState,
        delta_primal: f64,
        harris_band: f64,
    ) -> ChuzcOutcome {
        self.flip_list.clear();
        self.work_pivot = None;
        if self.breakpoints.is_empty() {
            return ChuzcOutcome::NoCandidate;
        }

        heap_sort_by_key(&mut self.breakpoints, |bp| bp.ratio);

        let mut remaining = delta_primal.abs();
        let mut entering: Option<usize> = None;
        for idx in 0..self.breakpoints.len() {
            let bp = self.breakpoints[idx];
            let range = state.work_range[bp.var];
            if range.is_finite() && remaining - bp.oriented * range > 0.0 {
                // Flipping strictly shrinks the remaining step: absorb the
                // breakpoint and keep walking.
                remaining -= bp.oriented * range;
                self.flip_list.push(bp.var);
            } else {
                entering = Some(idx);
                break;
            }
        }
        let Some(first) = entering else {
            // Flips alone cannot close the gap and nothing can enter.
            self.flip_list.clear();
            return ChuzcOutcome::NoCandidate;
        };

        // Harris pass: the largest pivot within the band wins.
        let limit = self.breakpoints[first].ratio + harris_band;
        let mut chosen = first;
        for idx in first + 1..self.breakpoints.len() {
            if self.breakpoints[idx].ratio > limit {
                break;
            }
            if self.breakpoints[idx].oriented > self.breakpoints[chosen].oriented {
                chosen = idx;
            }
        }

        let bp = self.breakpoints[chosen];
        if bp.pi.abs() < PIVOT_TOLERANCE {
            self.flip_list.clear();
            return ChuzcOutcome::SmallPivot;
        }
        self.work_pivot = Some(bp.var);
        self.work_alpha = bp.pi;
        self.work_delta_remaining = remaining;
        // A negative oriented dual is a degenerate breakpoint: it is taken
        // with a zero step and the engine owes the column a cost shift.
        self.shift_needed = bp.dual_hat < 0.0;
        self.work_theta = bp.ratio;
        ChuzcOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{from_triplets, LpProblem, ObjSense};
    use crate::state::{Phase, SimplexState};

    /// One-row LP with the given column bounds; duals installed directly.
    fn state_with(col_bounds: &[(f64, f64)], duals: &[f64]) -> SimplexState {
        let n = col_bounds.len();
        let lp = LpProblem {
            a_matrix: from_triplets(1, n, (0..n).map(|j| (0, j, 1.0)).collect::<Vec<_>>()),
            col_cost: vec![0.0; n],
            col_lower: col_bounds.iter().map(|b| b.0).collect(),
            col_upper: col_bounds.iter().map(|b| b.1).collect(),
            row_lower: vec![0.0],
            row_upper: vec![0.0],
            sense: ObjSense::Minimize,
            col_names: None,
            row_names: None,
        };
        let mut state = SimplexState::new(&lp);
        state.initialise_with_logical_basis();
        state.initialise_bound(Phase::Two);
        state.initialise_value();
        for (j, &d) in duals.iter().enumerate() {
            state.work_dual[j] = d;
        }
        state
    }

    fn pi_of(values: &[f64]) -> SparseVector {
        let mut v = SparseVector::new(values.len());
        for (j, &x) in values.iter().enumerate() {
            if x != 0.0 {
                v.set(j, x);
            }
        }
        v
    }

    #[test]
    fn plain_ratio_test_without_finite_opposite_bounds() {
        // All variables at lower with infinite uppers: no flips possible,
        // so BFRT must reduce to the classic smallest-ratio test.
        let inf = f64::INFINITY;
        let state = state_with(&[(0.0, inf), (0.0, inf), (0.0, inf)], &[4.0, 1.0, 9.0]);
        let pi = pi_of(&[2.0, 2.0, 3.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        assert_eq!(row.candidate_count(), 3);
        let outcome = row.choose(&state, 5.0, 0.0);
        assert_eq!(outcome, ChuzcOutcome::Ok);
        // ratios: 2.0, 0.5, 3.0 -> variable 1 enters, no flips
        assert_eq!(row.work_pivot, Some(1));
        assert!(row.flip_list.is_empty());
        assert!((row.work_theta - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bound_flips_absorb_small_breakpoints() {
        // Variable 0 is boxed with range 1 and the smallest ratio: with a
        // large enough remaining step it flips and variable 1 enters.
        let inf = f64::INFINITY;
        let state = state_with(&[(0.0, 1.0), (0.0, inf)], &[1.0, 4.0]);
        let pi = pi_of(&[2.0, 2.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        let outcome = row.choose(&state, 5.0, 0.0);
        assert_eq!(outcome, ChuzcOutcome::Ok);
        assert_eq!(row.flip_list, vec![0]);
        assert_eq!(row.work_pivot, Some(1));
        assert!((row.work_theta - 2.0).abs() < 1e-12);
    }

    #[test]
    fn flip_that_would_overshoot_enters_instead() {
        // Same candidates, but the remaining step is too small for the
        // flip to help: variable 0 must enter.
        let inf = f64::INFINITY;
        let state = state_with(&[(0.0, 1.0), (0.0, inf)], &[1.0, 4.0]);
        let pi = pi_of(&[2.0, 2.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        let outcome = row.choose(&state, 1.5, 0.0);
        assert_eq!(outcome, ChuzcOutcome::Ok);
        assert!(row.flip_list.is_empty());
        assert_eq!(row.work_pivot, Some(0));
    }

    #[test]
    fn wrong_sign_entries_are_not_candidates() {
        let inf = f64::INFINITY;
        let state = state_with(&[(0.0, inf)], &[1.0]);
        // pi < 0 with move_out = +1 and variable at lower: inadmissible
        let pi = pi_of(&[-2.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        let outcome = row.choose(&state, 1.0, 0.0);
        assert_eq!(outcome, ChuzcOutcome::NoCandidate);
    }

    #[test]
    fn harris_band_prefers_large_pivots() {
        let inf = f64::INFINITY;
        // Ratios 1.0 and 1.000005 within a 1e-3 band; the second has the
        // far larger pivot and must win.
        let state = state_with(&[(0.0, inf), (0.0, inf)], &[1e-4, 1.0]);
        let pi = pi_of(&[1e-4, 0.999995]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        let outcome = row.choose(&state, 1.0, 1e-3);
        assert_eq!(outcome, ChuzcOutcome::Ok);
        assert_eq!(row.work_pivot, Some(1));
    }

    #[test]
    fn degenerate_breakpoint_requests_shift() {
        let inf = f64::INFINITY;
        // Slightly infeasible dual: ratio clamps to zero and a shift is
        // requested.
        let state = state_with(&[(0.0, inf)], &[-1e-9]);
        let pi = pi_of(&[1.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        let outcome = row.choose(&state, 1.0, 0.0);
        assert_eq!(outcome, ChuzcOutcome::Ok);
        assert_eq!(row.work_theta, 0.0);
        assert!(row.shift_needed);
    }

    #[test]
    fn fixed_variables_are_skipped() {
        let state = state_with(&[(1.0, 1.0), (0.0, f64::INFINITY)], &[0.0, 2.0]);
        let pi = pi_of(&[5.0, 1.0]);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &pi, 0, 1);
        assert_eq!(row.candidate_count(), 1);
    }

    #[test]
    fn logical_candidates_enter_via_offset() {
        let inf = f64::INFINITY;
        let state = state_with(&[(0.0, inf)], &[0.0]);
        // rho delivers the logical's pivotal-row entry; logical of row 0
        // sits at index num_col = 1. Its bounds are [0, 0] (fixed), so it
        // is skipped; this guards the offset arithmetic.
        let mut rho = SparseVector::new(1);
        rho.set(0, 1.0);
        let mut row = DualRow::new();
        row.clear();
        row.add_candidates(&state, &rho, 1, 1);
        assert_eq!(row.candidate_count(), 0);
    }
}
