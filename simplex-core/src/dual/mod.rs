//! The dual revised simplex engine.
//!
//! `DualEngine` owns the basis, factor, working arrays and weight arrays
//! for the duration of one solve; the LP is read-only borrowed. The serial
//! pipeline per iteration is CHUZR → BTRAN → PRICE → CHUZC (BFRT) →
//! FTRAN(s) → verify → dual/primal/pivot updates, with every stage bailing
//! out through the invert-hint state machine into `rebuild`.

mod multi;

use std::time::Instant;

use crate::dual_rhs::DualRhs;
use crate::dual_row::{ChuzcOutcome, DualRow};
use crate::edge_weights::{EdgeWeights, WeightMode};
use crate::linalg::factor::{Factor, InvertHint};
use crate::linalg::vector::SparseVector;
use crate::matrix::{Matrix, PriceMode};
use crate::monitor::NumericMonitor;
use crate::problem::{
    DualEdgeWeightStrategy, LpProblem, SimplexSettings, SimplexStrategy, SolveInfo, SolveStatus,
};
use crate::state::{Phase, SimplexState};
use crate::util::logging::{LogType, Logger, MessageLevel};

/// Bound on local recoveries (forced refactor, framework reset, cleanup)
/// per phase before surfacing a numerical failure.
const MAX_RECOVERIES_PER_PHASE: usize = 8;

/// Bound on re-entries into phase 1 before surfacing a numerical failure.
const MAX_PHASE1_ENTRIES: usize = 10;

/// Relative disagreement of the row- and column-wise pivot that forces a
/// reinversion.
const PIVOT_VERIFY_TOLERANCE: f64 = 1e-7;

/// Pivots below this magnitude abort the iteration outright.
const PIVOT_ABORT_TOLERANCE: f64 = 1e-9;

/// The dual revised simplex engine.
pub struct DualEngine<'a> {
    settings: &'a SimplexSettings,
    logger: &'a Logger,

    pub(crate) state: SimplexState,
    pub(crate) matrix: Matrix,
    pub(crate) factor: Factor,
    pub(crate) rhs: DualRhs,
    pub(crate) dual_row: DualRow,
    pub(crate) weights: EdgeWeights,
    pub(crate) monitor: NumericMonitor,

    // Serial iteration work vectors
    row_ep: SparseVector,
    row_ap: SparseVector,
    column: SparseVector,
    column_bfrt: SparseVector,
    column_dse: SparseVector,
    row_buf: SparseVector,
    col_buf: SparseVector,

    /// Per-slice PRICE buffers for SIP/PAMI
    slice_row_ap: Vec<SparseVector>,

    // Iteration state
    pub(crate) invert_hint: Option<InvertHint>,
    row_out: usize,
    variable_out: usize,
    move_out: i8,
    delta_primal: f64,
    column_in: usize,
    theta_dual: f64,
    theta_primal: f64,
    alpha_row: f64,
    alpha_col: f64,

    // Counters and limits
    pub(crate) iteration_count: usize,
    invert_count: usize,
    rebuild_count: usize,
    phase: Phase,
    phase1_entries: usize,
    recoveries: usize,
    start_time: Instant,
    /// Cleared after the first cleanup so perturbation cannot ping-pong
    allow_perturbation: bool,
    /// Dual-objective cutoff, already mapped into engine (scaled,
    /// sense-adjusted) space
    objective_cutoff: Option<f64>,
}

impl<'a> DualEngine<'a> {
    /// Set up an engine over the (scaled) working LP.
    ///
    /// `objective_cutoff` must already be mapped into the engine's scaled,
    /// sense-adjusted objective space.
    pub fn new(
        lp: &LpProblem,
        settings: &'a SimplexSettings,
        logger: &'a Logger,
        objective_cutoff: Option<f64>,
    ) -> Self {
        let num_row = lp.num_row();
        let num_col = lp.num_col();

        let mut state = SimplexState::new(lp);
        match &settings.warm_start {
            Some(basis) => {
                state.initialise_with_basis(basis);
            }
            None => state.initialise_with_logical_basis(),
        }

        let mut matrix = Matrix::new(lp.a_matrix.clone());
        matrix.ensure_row_wise();
        state.lp_status.has_matrix_col_wise = true;
        state.lp_status.has_matrix_row_wise = true;

        let weight_mode = match settings.dual_edge_weight_strategy {
            DualEdgeWeightStrategy::Dantzig => WeightMode::Dantzig,
            DualEdgeWeightStrategy::Devex => WeightMode::Devex,
            DualEdgeWeightStrategy::Choose
            | DualEdgeWeightStrategy::SteepestEdge
            | DualEdgeWeightStrategy::SteepestEdgeToDevex => WeightMode::Dse,
        };

        DualEngine {
            settings,
            logger,
            state,
            matrix,
            factor: Factor::new(num_row),
            rhs: DualRhs::new(num_row, settings.primal_feasibility_tolerance),
            dual_row: DualRow::new(),
            weights: EdgeWeights::new(weight_mode, num_row),
            monitor: NumericMonitor::new(),
            row_ep: SparseVector::new(num_row),
            row_ap: SparseVector::new(num_col),
            column: SparseVector::new(num_row),
            column_bfrt: SparseVector::new(num_row),
            column_dse: SparseVector::new(num_row),
            row_buf: SparseVector::new(num_row),
            col_buf: SparseVector::new(num_col),
            slice_row_ap: Vec::new(),
            invert_hint: None,
            row_out: 0,
            variable_out: 0,
            move_out: 0,
            delta_primal: 0.0,
            column_in: 0,
            theta_dual: 0.0,
            theta_primal: 0.0,
            alpha_row: 0.0,
            alpha_col: 0.0,
            iteration_count: 0,
            invert_count: 0,
            rebuild_count: 0,
            phase: Phase::Two,
            phase1_entries: 0,
            recoveries: 0,
            start_time: Instant::now(),
            allow_perturbation: true,
            objective_cutoff,
        }
    }

    /// Shared immutable state for solution extraction.
    pub fn state(&self) -> &SimplexState {
        &self.state
    }

    /// Solve diagnostics for the result.
    pub fn info(&self) -> SolveInfo {
        SolveInfo {
            iteration_count: self.iteration_count,
            invert_count: self.invert_count,
            rebuild_count: self.rebuild_count,
            solve_time_ms: self.start_time.elapsed().as_millis() as u64,
            max_primal_infeasibility: self.state.max_primal_infeasibility(),
            max_dual_infeasibility: self.state.max_dual_infeasibility(),
            costly_dse_iterations: self.monitor.num_costly_dse,
        }
    }

    /// Run the dual simplex to termination.
    pub fn solve(&mut self) -> SolveStatus {
        self.start_time = Instant::now();

        if self.settings.simplex_strategy != SimplexStrategy::Serial {
            let slices = (self.matrix.num_col() / 1000 + 2).min(crate::matrix::SLICE_LIMIT);
            self.matrix.setup_slices(slices);
            self.slice_row_ap = (0..self.matrix.num_slices())
                .map(|_| SparseVector::new(self.matrix.num_col()))
                .collect();
        }
        if self.settings.simplex_strategy == SimplexStrategy::Pami
            && self.weights.mode == WeightMode::Dse
        {
            // PAMI defers the pivotal-column FTRANs to the major update,
            // which is incompatible with the per-iteration DSE direction:
            // run the batch scheme with Devex weights.
            self.logger
                .print(MessageLevel::DETAILED, "PAMI: using Devex edge weights");
            self.weights.mode = WeightMode::Devex;
            self.weights.new_devex_framework();
        }

        // Initial INVERT, with singularity repair.
        self.invert();

        // Duals under phase-2 costs decide the starting phase.
        self.state.initialise_bound(Phase::Two);
        self.state.initialise_cost(
            self.settings.perturb_costs && self.allow_perturbation,
            self.settings.dual_feasibility_tolerance,
        );
        self.state.initialise_value();
        self.state.compute_dual(
            &self.factor,
            &self.matrix,
            &mut self.row_buf,
            &mut self.col_buf,
        );
        let dual_infeasibilities = self
            .state
            .correct_dual(self.settings.dual_feasibility_tolerance);

        // Exact DSE weights for warm starts; the logical basis has exact
        // unit weights already.
        if self.weights.mode == WeightMode::Dse
            && self.settings.initial_dse_weights
            && self
                .state
                .basic_index
                .iter()
                .any(|&var| var < self.state.num_col)
        {
            self.weights.initialise_dse_exact(&self.factor, &mut self.row_buf);
        }
        self.state.lp_status.has_dual_steepest_edge_weights = true;

        self.phase = if dual_infeasibilities > 0 {
            Phase::One
        } else {
            Phase::Two
        };

        loop {
            let outcome = match self.phase {
                Phase::One => {
                    self.phase1_entries += 1;
                    if self.phase1_entries > MAX_PHASE1_ENTRIES {
                        self.logger.log(
                            LogType::Warning,
                            "phase-1 re-entry limit reached, giving up",
                        );
                        return SolveStatus::Numerical;
                    }
                    self.solve_phase(Phase::One)
                }
                Phase::Two => self.solve_phase(Phase::Two),
            };
            if let Some(status) = outcome {
                self.logger.print(
                    MessageLevel::MINIMAL,
                    &format!(
                        "dual simplex finished: {} after {} iterations",
                        status, self.iteration_count
                    ),
                );
                return status;
            }
        }
    }

    /// Run one phase to a conclusion. `None` means "switch to the phase
    /// now stored in `self.phase`".
    fn solve_phase(&mut self, phase: Phase) -> Option<SolveStatus> {
        self.phase = phase;
        self.recoveries = 0;
        self.state.initialise_bound(phase);
        self.state.initialise_cost(
            self.settings.perturb_costs && self.allow_perturbation,
            self.settings.dual_feasibility_tolerance,
        );
        self.state.initialise_value();
        if phase == Phase::One {
            // Under the phase-1 bounds every non-fixed variable is boxed,
            // so dual feasibility is a matter of sitting on the right side.
            self.state.compute_dual(
                &self.factor,
                &self.matrix,
                &mut self.row_buf,
                &mut self.col_buf,
            );
            self.state
                .correct_dual(self.settings.dual_feasibility_tolerance);
        }
        self.rebuild();

        loop {
            // Inner loop: iterate until a hint breaks us out.
            while self.invert_hint.is_none() {
                if let Some(status) = self.check_limits() {
                    return Some(status);
                }
                match self.settings.simplex_strategy {
                    SimplexStrategy::Serial | SimplexStrategy::Sip => self.iterate(),
                    SimplexStrategy::Pami => self.iterate_multi(),
                }
            }

            let hint = self.invert_hint.take().expect("hint set by inner loop");
            let fresh = self.fresh_factor();
            match hint {
                InvertHint::NoCandidate | InvertHint::PossiblyOptimal => {
                    if !fresh {
                        self.rebuild();
                        continue;
                    }
                    match phase {
                        Phase::One => return self.conclude_phase1(),
                        Phase::Two => {
                            if let Some(status) = self.conclude_phase2() {
                                return Some(status);
                            }
                            if self.phase == Phase::One {
                                return None;
                            }
                            continue;
                        }
                    }
                }
                InvertHint::PossiblyUnbounded => {
                    if !fresh {
                        self.rebuild();
                        continue;
                    }
                    match phase {
                        Phase::One => {
                            // The phase-1 subproblem is always primal
                            // feasible, so a dual ray here is a
                            // perturbation artefact: clean up and retry.
                            if !self.recover("phase-1 ratio-test failure") {
                                return Some(SolveStatus::Numerical);
                            }
                            continue;
                        }
                        Phase::Two => {
                            // A genuine dual ray certifies primal
                            // infeasibility.
                            if self.state.max_primal_infeasibility()
                                > self.settings.primal_feasibility_tolerance
                            {
                                self.invert_hint = Some(InvertHint::PrimalInfeasInDual);
                                return Some(SolveStatus::Infeasible);
                            }
                            // No infeasible row survives scrutiny: retry.
                            if !self.recover("vanishing infeasibility in CHUZC") {
                                return Some(SolveStatus::Numerical);
                            }
                            continue;
                        }
                    }
                }
                InvertHint::PrimalInfeasInDual => {
                    return Some(SolveStatus::Infeasible);
                }
                InvertHint::ChooseColumnFail | InvertHint::PossiblySingular => {
                    if !self.recover(match hint {
                        InvertHint::ChooseColumnFail => "small pivot in CHUZC",
                        _ => "pivot verification mismatch",
                    }) {
                        return Some(SolveStatus::Numerical);
                    }
                    continue;
                }
                InvertHint::SyntheticClock | InvertHint::UpdateLimit => {
                    self.rebuild();
                    continue;
                }
            }
        }
    }

    /// Phase-1 endgame on a fresh factor with no CHUZR candidate.
    fn conclude_phase1(&mut self) -> Option<SolveStatus> {
        if self.state.costs_perturbed || self.state.costs_shifted {
            self.cleanup();
            if self.rhs.total_infeasibility() > 0.0 {
                // Perturbation removal re-exposed primal infeasibility:
                // run phase 1 again with true costs.
                self.phase = Phase::One;
                return None;
            }
        }
        let unresolved = self
            .state
            .count_irreducible_dual_infeasibilities(self.settings.dual_feasibility_tolerance);
        if unresolved > 0 {
            // Duals whose sign demands an infinite original bound: the dual
            // is infeasible, the primal unbounded.
            self.logger.print(
                MessageLevel::DETAILED,
                &format!(
                    "phase-1 optimum ({:.3e}) leaves {} irreducible dual infeasibilities",
                    self.state.dual_objective(),
                    unresolved
                ),
            );
            return Some(SolveStatus::Unbounded);
        }
        self.logger
            .print(MessageLevel::DETAILED, "phase-1 complete: dual feasible");
        self.phase = Phase::Two;
        None
    }

    /// Phase-2 endgame on a fresh factor with no CHUZR candidate.
    /// Returns `Some` to finish, `None` to continue (possibly back in
    /// phase 1 via `self.phase`).
    fn conclude_phase2(&mut self) -> Option<SolveStatus> {
        if self.state.costs_perturbed || self.state.costs_shifted {
            self.cleanup();
            let dual_infeasibilities = self
                .state
                .count_dual_infeasibilities(self.settings.dual_feasibility_tolerance);
            if dual_infeasibilities > 0 {
                self.logger.print(
                    MessageLevel::DETAILED,
                    &format!(
                        "cleanup left {} dual infeasibilities: back to phase 1",
                        dual_infeasibilities
                    ),
                );
                self.phase = Phase::One;
                return None;
            }
            if self.rhs.total_infeasibility() > 0.0 {
                // True costs moved some bound flips: reoptimise.
                return None;
            }
        }
        Some(SolveStatus::Optimal)
    }

    /// Bounded local recovery: remove perturbation if present, reinvert,
    /// rebuild. Returns false when the budget is exhausted.
    fn recover(&mut self, reason: &str) -> bool {
        self.recoveries += 1;
        if self.recoveries > MAX_RECOVERIES_PER_PHASE {
            self.logger.log(
                LogType::Warning,
                &format!("{}: recovery budget exhausted", reason),
            );
            return false;
        }
        self.logger.print(
            MessageLevel::DETAILED,
            &format!("recovering from {}", reason),
        );
        if self.state.costs_perturbed || self.state.costs_shifted {
            self.state.restore_costs();
        }
        if self.weights.mode == WeightMode::Devex {
            self.weights.new_devex_framework();
        }
        self.state.lp_status.has_fresh_invert = false;
        self.rebuild();
        true
    }

    /// Whether the factor reflects the basis with no post-factor updates.
    pub(crate) fn fresh_factor(&self) -> bool {
        self.factor.update_count() == 0 && self.state.lp_status.has_fresh_invert
    }

    /// Limits polled between iterations.
    fn check_limits(&mut self) -> Option<SolveStatus> {
        if let Some(limit) = self.settings.run_time_limit {
            if self.start_time.elapsed().as_secs_f64() > limit {
                return Some(SolveStatus::TimeLimit);
            }
        }
        if let Some(limit) = self.settings.iteration_limit {
            if self.iteration_count >= limit {
                return Some(SolveStatus::IterationLimit);
            }
        }
        if self.phase == Phase::Two {
            if let Some(cutoff) = self.objective_cutoff {
                if self.state.dual_objective() > cutoff {
                    return Some(SolveStatus::ObjectiveCutoff);
                }
            }
        }
        None
    }

    /// INVERT: refactorise, repairing singular positions with logicals.
    pub(crate) fn invert(&mut self) {
        let report = self.factor.factorize(&self.state.basic_index, self.matrix.a_matrix());
        if report.rank_deficiency > 0 {
            self.logger.log(
                LogType::Warning,
                &format!(
                    "singular basis: {} columns replaced by logicals",
                    report.rank_deficiency
                ),
            );
            for &(position, row) in &report.replaced {
                let displaced = self.state.basic_index[position];
                let logical = self.state.num_col + row;
                self.state.basic_index[position] = logical;
                self.state.nonbasic_flag[logical] = 0;
                self.state.nonbasic_move[logical] = 0;
                self.state.place_nonbasic(displaced);
            }
            self.state.populate_base_bounds();
        }
        self.invert_count += 1;
        self.monitor.reset_tick();
        self.state.lp_status.has_invert = true;
        self.state.lp_status.has_fresh_invert = true;
        self.state.lp_status.has_factor_arrays = true;
    }

    /// Reinvert if the factor is stale, then recompute every derived
    /// quantity from scratch.
    pub(crate) fn rebuild(&mut self) {
        self.rebuild_count += 1;
        self.invert_hint = None;

        if self.factor.update_count() > 0
            || !self.state.lp_status.has_invert
            || !self.state.lp_status.has_fresh_invert
        {
            self.invert();
        }

        self.state.compute_dual(
            &self.factor,
            &self.matrix,
            &mut self.row_buf,
            &mut self.col_buf,
        );
        self.state
            .correct_dual(self.settings.dual_feasibility_tolerance);
        self.state.compute_primal(&self.factor, &self.matrix, &mut self.row_buf);
        self.rhs.create_infeas_array(
            &self.state.base_value,
            &self.state.base_lower,
            &self.state.base_upper,
        );
        self.rhs.create_infeas_list(self.monitor.col_density);

        if self.weights.mode == WeightMode::Devex
            && self.weights.devex_framework_stale(self.state.num_row)
        {
            self.weights.new_devex_framework();
        }

        // The costly-DSE heuristic may demote steepest edge to Devex.
        if self.weights.mode == WeightMode::Dse
            && self.settings.allow_dse_to_devex_switch
            && matches!(
                self.settings.dual_edge_weight_strategy,
                DualEdgeWeightStrategy::Choose | DualEdgeWeightStrategy::SteepestEdgeToDevex
            )
            && self.monitor.should_switch_to_devex(self.state.num_tot)
        {
            self.logger.print(
                MessageLevel::MINIMAL,
                "costly DSE iterations: switching to Devex weights",
            );
            self.weights.mode = WeightMode::Devex;
            self.weights.new_devex_framework();
        }

        self.state.lp_status.has_fresh_rebuild = true;
        self.logger.print(
            MessageLevel::DETAILED,
            &format!(
                "rebuild {:3}: iteration {:7}, objective {:15.8e}, infeasibility {:.3e}",
                self.rebuild_count,
                self.iteration_count,
                self.state.dual_objective(),
                self.rhs.total_infeasibility()
            ),
        );
    }

    /// Remove perturbation and shifts, then recompute the dual solution.
    pub(crate) fn cleanup(&mut self) {
        self.state.restore_costs();
        self.state.compute_dual(
            &self.factor,
            &self.matrix,
            &mut self.row_buf,
            &mut self.col_buf,
        );
        self.state
            .correct_dual(self.settings.dual_feasibility_tolerance);
        self.state.compute_primal(&self.factor, &self.matrix, &mut self.row_buf);
        self.rhs.create_infeas_array(
            &self.state.base_value,
            &self.state.base_lower,
            &self.state.base_upper,
        );
        self.rhs.create_infeas_list(self.monitor.col_density);
        self.allow_perturbation = false;
        self.logger
            .print(MessageLevel::DETAILED, "cleanup: perturbation removed");
    }

    /// One serial dual simplex iteration.
    pub(crate) fn iterate(&mut self) {
        self.choose_row();
        if self.invert_hint.is_some() {
            return;
        }
        self.price();
        self.choose_column();
        if self.invert_hint.is_some() {
            return;
        }
        if self.settings.simplex_strategy == SimplexStrategy::Sip {
            self.update_ftran_sip();
        } else {
            self.update_ftran_bfrt();
            self.update_ftran();
            if self.weights.mode == WeightMode::Dse {
                self.update_ftran_dse();
            }
        }
        self.update_verify();
        if self
            .invert_hint
            .map_or(false, |h| h == InvertHint::PossiblySingular)
            && self.alpha_col.abs() < PIVOT_ABORT_TOLERANCE
        {
            // The pivot is unusable: abandon the iteration with the basis
            // untouched and reinvert.
            return;
        }
        self.update_dual();
        self.update_primal();
        self.update_pivots();
        self.iteration_count += 1;
        self.monitor.record_iteration(self.weights.mode == WeightMode::Dse);
        self.iteration_report();
    }

    /// CHUZR: pick the leaving row by weighted infeasibility, BTRAN its
    /// unit vector and let the DSE accuracy check veto drifted weights.
    fn choose_row(&mut self) {
        loop {
            let Some(row) = self.rhs.choose_normal(&self.weights.weight) else {
                // On a fresh factor this is the real thing; otherwise the
                // rebuild must confirm it.
                self.invert_hint = Some(if self.fresh_factor() {
                    InvertHint::PossiblyOptimal
                } else {
                    InvertHint::NoCandidate
                });
                return;
            };
            self.row_ep.clear();
            self.row_ep.set(row, 1.0);
            self.factor.btran(&mut self.row_ep);
            self.monitor.record_row_ep_density(self.row_ep.density());

            if self.weights.mode == WeightMode::Dse {
                let exact = self.row_ep.norm2();
                if self.weights.observe_exact(row, exact) {
                    // Weight was wrong enough to reject: re-choose with the
                    // corrected weight.
                    continue;
                }
            }

            self.row_out = row;
            self.variable_out = self.state.basic_index[row];
            let value = self.state.base_value[row];
            let lower = self.state.base_lower[row];
            let upper = self.state.base_upper[row];
            if value < lower {
                self.delta_primal = value - lower;
                self.move_out = -1;
            } else {
                self.delta_primal = value - upper;
                self.move_out = 1;
            }
            return;
        }
    }

    /// PRICE: compute the structural pivotal row in the mode the monitor
    /// picked.
    fn price(&mut self) {
        let mode = self
            .monitor
            .select_price_mode(self.settings.price_strategy, self.row_ep.density());
        match mode {
            PriceMode::Col => self.matrix.price_by_col(&mut self.row_ap, &self.row_ep),
            PriceMode::Row => self.matrix.price_by_row(&mut self.row_ap, &self.row_ep),
            PriceMode::Ultra => self.matrix.price_by_row_ultra(
                &mut self.row_ap,
                &self.row_ep,
                &self.state.nonbasic_flag,
            ),
        }
        self.monitor.record_row_ap_density(self.row_ap.density());
        self.monitor
            .add_tick(10.0 * self.row_ap.count() as f64 + self.row_ep.count() as f64);
    }

    /// CHUZC: the BFRT over the packed pivotal row.
    fn choose_column(&mut self) {
        self.dual_row.clear();
        self.dual_row
            .add_candidates(&self.state, &self.row_ap, 0, self.move_out);
        self.dual_row
            .add_candidates(&self.state, &self.row_ep, self.state.num_col, self.move_out);
        let harris_band = 10.0 * self.settings.dual_feasibility_tolerance;
        match self
            .dual_row
            .choose(&self.state, self.delta_primal, harris_band)
        {
            ChuzcOutcome::NoCandidate => {
                self.invert_hint = Some(InvertHint::PossiblyUnbounded);
            }
            ChuzcOutcome::SmallPivot => {
                self.invert_hint = Some(InvertHint::ChooseColumnFail);
            }
            ChuzcOutcome::Ok => {
                self.column_in = self.dual_row.work_pivot.expect("pivot set on Ok");
                self.alpha_row = self.dual_row.work_alpha;
                self.theta_dual = f64::from(self.move_out) * self.dual_row.work_theta;
            }
        }
    }

    /// FTRAN-BFRT: apply the ratio test's bound flips and their aggregate
    /// effect on the basic values.
    fn update_ftran_bfrt(&mut self) {
        if self.dual_row.flip_list.is_empty() {
            return;
        }
        self.column_bfrt.clear();
        for idx in 0..self.dual_row.flip_list.len() {
            let var = self.dual_row.flip_list[idx];
            let delta = f64::from(self.state.nonbasic_move[var]) * self.state.work_range[var];
            self.matrix.collect_column(&mut self.column_bfrt, var, delta);
            self.state.flip_bound(var);
        }
        self.factor.ftran(&mut self.column_bfrt);
        self.monitor
            .add_tick(10.0 * self.column_bfrt.count() as f64);
        self.rhs.update_primal(
            &self.column_bfrt,
            1.0,
            &mut self.state.base_value,
            &self.state.base_lower,
            &self.state.base_upper,
        );
    }

    /// FTRAN: the pivotal column.
    fn update_ftran(&mut self) {
        self.column.clear();
        self.matrix.collect_column(&mut self.column, self.column_in, 1.0);
        self.factor.ftran(&mut self.column);
        self.monitor.record_col_density(self.column.density());
        self.monitor.add_tick(10.0 * self.column.count() as f64);
        self.alpha_col = self.column.array[self.row_out];
    }

    /// FTRAN-DSE: the update direction τ = B⁻¹ρ_r.
    fn update_ftran_dse(&mut self) {
        self.column_dse.copy_from(&self.row_ep);
        self.factor.ftran(&mut self.column_dse);
        self.monitor.record_dse_density(self.column_dse.density());
        self.monitor
            .add_tick(10.0 * self.column_dse.count() as f64);
    }

    /// Compare the pivot computed row-wise (PRICE) and column-wise
    /// (FTRAN); disagreement forces a reinversion after this iteration.
    fn update_verify(&mut self) {
        let trouble =
            (self.alpha_col - self.alpha_row).abs() / self.alpha_col.abs().max(1.0);
        if trouble > PIVOT_VERIFY_TOLERANCE || self.alpha_col.abs() < PIVOT_ABORT_TOLERANCE {
            self.monitor.num_verify_mismatch += 1;
            self.invert_hint = Some(InvertHint::PossiblySingular);
        }
    }

    /// Update the reduced costs along the pivotal row.
    fn update_dual(&mut self) {
        if self.theta_dual == 0.0 {
            // Degenerate step: shift the entering cost onto zero instead.
            let amount = -self.state.work_dual[self.column_in];
            self.state.shift_cost(self.column_in, amount);
            return;
        }
        let theta = self.theta_dual;
        let num_col = self.state.num_col;
        if self.row_ap.indexed {
            for &j in &self.row_ap.index {
                if self.state.nonbasic_flag[j] == 1 {
                    self.state.work_dual[j] -= theta * self.row_ap.array[j];
                }
            }
        } else {
            for j in 0..num_col {
                if self.state.nonbasic_flag[j] == 1 {
                    let pi = self.row_ap.array[j];
                    if pi != 0.0 {
                        self.state.work_dual[j] -= theta * pi;
                    }
                }
            }
        }
        for &i in &self.row_ep.index {
            let var = num_col + i;
            if self.state.nonbasic_flag[var] == 1 {
                self.state.work_dual[var] -= theta * self.row_ep.array[i];
            }
        }
        // The entering dual is zero by construction of θ; pin it exactly,
        // then shift away whatever the Harris band left wrong-signed.
        self.state.work_dual[self.column_in] = 0.0;
        self.dual_row
            .shift_infeasible(&mut self.state, self.settings.dual_feasibility_tolerance);
    }

    /// Update the basic values and the edge weights.
    fn update_primal(&mut self) {
        // Flips already closed part of the gap; the entering column covers
        // what is left.
        self.theta_primal =
            f64::from(self.move_out) * self.dual_row.work_delta_remaining / self.alpha_col;
        self.rhs.update_primal(
            &self.column,
            self.theta_primal,
            &mut self.state.base_value,
            &self.state.base_lower,
            &self.state.base_upper,
        );
        let dse = if self.weights.mode == WeightMode::Dse {
            Some(&self.column_dse)
        } else {
            None
        };
        self.weights
            .update(&self.column, dse, self.row_out, self.alpha_col);
    }

    /// Swap entering and leaving variables, refresh the pivotal position
    /// and absorb the pivot into the factor.
    fn update_pivots(&mut self) {
        let leaving = self.variable_out;
        let entering = self.column_in;
        let row = self.row_out;

        // Leaving variable lands on the bound it was pushed to.
        self.state.nonbasic_flag[leaving] = 1;
        if self.state.work_lower[leaving] == self.state.work_upper[leaving] {
            self.state.nonbasic_move[leaving] = 0;
            self.state.work_value[leaving] = self.state.work_lower[leaving];
        } else if self.move_out == -1 {
            self.state.nonbasic_move[leaving] = 1;
            self.state.work_value[leaving] = self.state.work_lower[leaving];
        } else {
            self.state.nonbasic_move[leaving] = -1;
            self.state.work_value[leaving] = self.state.work_upper[leaving];
        }
        self.state.work_dual[leaving] = -self.theta_dual;

        // Entering variable becomes basic in the leaving row.
        let entering_value = self.state.work_value[entering] + self.theta_primal;
        self.state.nonbasic_flag[entering] = 0;
        self.state.nonbasic_move[entering] = 0;
        self.state.work_dual[entering] = 0.0;
        self.state.basic_index[row] = entering;
        self.state.base_value[row] = entering_value;
        self.state.base_lower[row] = self.state.work_lower[entering];
        self.state.base_upper[row] = self.state.work_upper[entering];
        self.rhs.update_pivot(
            row,
            &self.state.base_value,
            &self.state.base_lower,
            &self.state.base_upper,
        );

        if !self.factor.update(&self.column, row) {
            self.invert_hint = Some(InvertHint::PossiblySingular);
        } else if self.factor.needs_refactor(self.settings.update_limit) {
            self.invert_hint = Some(InvertHint::UpdateLimit);
        } else if self
            .monitor
            .synthetic_clock_due(self.factor.build_synthetic_tick())
        {
            self.invert_hint = Some(InvertHint::SyntheticClock);
        }

        self.state.lp_status.has_fresh_invert = false;
        self.state.lp_status.has_fresh_rebuild = false;
    }

    fn iteration_report(&self) {
        if self.settings.log_freq > 0 && self.iteration_count % self.settings.log_freq == 0 {
            self.logger.print(
                MessageLevel::VERBOSE,
                &format!(
                    "iteration {:7}: objective {:15.8e}, in {:6}, out {:6}, theta_dual {:10.3e}",
                    self.iteration_count,
                    self.state.dual_objective(),
                    self.column_in,
                    self.variable_out,
                    self.theta_dual
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{from_triplets, ObjSense};

    fn canonical_lp() -> LpProblem {
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
    fn engine_solves_canonical_lp() {
        let lp = canonical_lp();
        let settings = SimplexSettings::default();
        let logger = Logger::quiet();
        let mut engine = DualEngine::new(&lp, &settings, &logger, None);
        assert_eq!(engine.solve(), SolveStatus::Optimal);
        assert!(engine.state.basis_ok());
        // Dual feasibility at the optimum.
        assert!(engine.state.max_dual_infeasibility() <= 1e-7);
        // Primal feasibility after the final rebuild.
        assert!(engine.state.max_primal_infeasibility() <= 1e-7);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let lp = canonical_lp();
        let mut settings = SimplexSettings::default();
        settings.perturb_costs = false;
        let logger = Logger::quiet();
        let mut engine = DualEngine::new(&lp, &settings, &logger, None);
        assert_eq!(engine.solve(), SolveStatus::Optimal);

        engine.rebuild();
        let dual_first = engine.state.work_dual.clone();
        let value_first = engine.state.base_value.clone();
        let basic_first = engine.state.basic_index.clone();
        let infeas_first = engine.rhs.primal_infeas.clone();

        engine.rebuild();
        assert_eq!(engine.state.work_dual, dual_first);
        assert_eq!(engine.state.base_value, value_first);
        assert_eq!(engine.state.basic_index, basic_first);
        assert_eq!(engine.rhs.primal_infeas, infeas_first);
    }

    #[test]
    fn objective_cutoff_stops_phase2() {
        let lp = canonical_lp();
        let settings = SimplexSettings::default();
        let logger = Logger::quiet();
        // The optimum is -2; proving the objective is above -3.5 is enough.
        let mut engine = DualEngine::new(&lp, &settings, &logger, Some(-3.5));
        assert_eq!(engine.solve(), SolveStatus::ObjectiveCutoff);
    }

    #[test]
    fn zero_time_limit_returns_cleanly() {
        let lp = canonical_lp();
        let mut settings = SimplexSettings::default();
        settings.run_time_limit = Some(0.0);
        let logger = Logger::quiet();
        let mut engine = DualEngine::new(&lp, &settings, &logger, None);
        assert_eq!(engine.solve(), SolveStatus::TimeLimit);
        assert!(engine.state.basis_ok());
    }
}
