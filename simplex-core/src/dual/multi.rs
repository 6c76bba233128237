//! PAMI: parallelism across multiple iterations, plus the SIP variant.
//!
//! A major iteration picks up to `pami_batch_size` candidate leaving rows,
//! BTRANs them in parallel, then runs the minor loop serially: each minor
//! prices its ρ over the matrix slices in parallel, runs the ratio test,
//! updates duals and the basis, and buffers its primal work in an
//! `MFinish`. The remaining candidates' ρ vectors and tracked values are
//! transformed in place so later minors see the evolving basis without
//! touching the factor. The major update then FTRANs every buffered column
//! in parallel, replays them in slot order against the accumulating eta
//! file, verifies each pivot and commits primal, weight and factor updates
//! sequentially; numerical trouble rolls the uncommitted slots back and
//! forces a reinversion.
//!
//! Ordering guarantee: slot i's commit happens before slot i+1's, and a
//! rollback of slot i preserves the effect of slots 0..i-1.

use rayon::prelude::*;

use crate::dual::DualEngine;
use crate::dual_row::ChuzcOutcome;
use crate::edge_weights::WeightMode;
use crate::linalg::factor::InvertHint;
use crate::linalg::vector::SparseVector;
use crate::util::logging::MessageLevel;

/// A slot is skipped when its row's infeasibility has decayed below this
/// fraction of its value at choice time.
const PAMI_PERSISTENCE_CUTOFF: f64 = 0.95;

/// Same pivot-agreement tolerances as the serial verify.
const PIVOT_VERIFY_TOLERANCE: f64 = 1e-7;
const PIVOT_ABORT_TOLERANCE: f64 = 1e-9;

/// One candidate leaving row of a major iteration.
struct MChoice {
    row_out: usize,
    row_ep: SparseVector,
    /// Tracked value of the row under the minors committed so far
    value: f64,
    lower: f64,
    upper: f64,
    /// Persistence threshold: skip once infeasibility decays below this
    infeas_limit: f64,
    done: bool,
    skipped: bool,
}

/// One committed minor iteration, buffered for the major update.
struct MFinish {
    row_out: usize,
    variable_out: usize,
    column_in: usize,
    move_out: i8,
    alpha_row: f64,
    theta_dual: f64,
    theta_primal: f64,
    entering_value: f64,
    /// Saved state of the entering variable for rollback
    entering_move_saved: i8,
    entering_value_saved: f64,
    flip_list: Vec<usize>,
    /// Aggregate flip column (row space until the major FTRAN)
    flip_column: SparseVector,
    shift_amount: f64,
    /// Entering column (row space until the major FTRAN)
    column: SparseVector,
}

impl<'a> DualEngine<'a> {
    /// One PAMI major iteration: batched CHUZR, serial minor loop,
    /// parallel multi-FTRAN and ordered commit.
    pub(crate) fn iterate_multi(&mut self) {
        let num_row = self.state.num_row;
        let num_col = self.state.num_col;
        let batch = self.settings.pami_batch_size.clamp(1, 8).min(num_row);

        // major_chooseRow: distinct candidate rows from the weighted list.
        let rows = self.rhs.choose_multi(&self.weights.weight, batch);
        if rows.is_empty() {
            self.invert_hint = Some(if self.fresh_factor() {
                InvertHint::PossiblyOptimal
            } else {
                InvertHint::NoCandidate
            });
            return;
        }
        let mut choices: Vec<MChoice> = rows
            .into_iter()
            .map(|row| MChoice {
                row_out: row,
                row_ep: SparseVector::new(num_row),
                value: self.state.base_value[row],
                lower: self.state.base_lower[row],
                upper: self.state.base_upper[row],
                infeas_limit: self.rhs.primal_infeas[row] * PAMI_PERSISTENCE_CUTOFF,
                done: false,
                skipped: false,
            })
            .collect();

        // major_chooseRowBtran: one BTRAN per slot, fork-join.
        {
            let factor = &self.factor;
            choices.par_iter_mut().for_each(|choice| {
                choice.row_ep.clear();
                choice.row_ep.set(choice.row_out, 1.0);
                factor.btran(&mut choice.row_ep);
            });
        }
        for choice in &choices {
            self.monitor.record_row_ep_density(choice.row_ep.density());
        }

        let eta_base = self.factor.eta_count();
        let tolerance = self.settings.primal_feasibility_tolerance;
        let mut finishes: Vec<MFinish> = Vec::with_capacity(batch);

        // Minor loop: serial over slots.
        for _minor in 0..batch {
            // minor_chooseRow: best remaining candidate that persisted.
            let mut slot: Option<usize> = None;
            let mut best_merit = 0.0_f64;
            for (idx, choice) in choices.iter_mut().enumerate() {
                if choice.done || choice.skipped {
                    continue;
                }
                let dist = (choice.lower - choice.value).max(choice.value - choice.upper);
                let infeas = if dist > tolerance { dist * dist } else { 0.0 };
                if infeas < choice.infeas_limit || infeas == 0.0 {
                    choice.skipped = true;
                    continue;
                }
                let merit = infeas / self.weights.weight[choice.row_out];
                if merit > best_merit {
                    best_merit = merit;
                    slot = Some(idx);
                }
            }
            let Some(slot) = slot else {
                break;
            };

            let row_out = choices[slot].row_out;
            let variable_out = self.state.basic_index[row_out];
            let value = choices[slot].value;
            let (delta_primal, move_out) = if value < choices[slot].lower {
                (value - choices[slot].lower, -1i8)
            } else {
                (value - choices[slot].upper, 1i8)
            };

            // Slice PRICE, fork-join over disjoint buffers.
            {
                let matrix = &self.matrix;
                let row_ep = &choices[slot].row_ep;
                self.slice_row_ap
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(s, buffer)| {
                        matrix.price_slice(s, buffer, row_ep);
                    });
            }
            let priced: usize = self.slice_row_ap.iter().map(|b| b.count()).sum();
            self.monitor
                .record_row_ap_density(priced as f64 / num_col.max(1) as f64);

            // CHUZC over the slices plus the logicals from ρ.
            self.dual_row.clear();
            for buffer in &self.slice_row_ap {
                self.dual_row
                    .add_candidates(&self.state, buffer, 0, move_out);
            }
            self.dual_row
                .add_candidates(&self.state, &choices[slot].row_ep, num_col, move_out);
            let harris_band = 10.0 * self.settings.dual_feasibility_tolerance;
            match self.dual_row.choose(&self.state, delta_primal, harris_band) {
                ChuzcOutcome::NoCandidate => {
                    self.invert_hint = Some(InvertHint::PossiblyUnbounded);
                    break;
                }
                ChuzcOutcome::SmallPivot => {
                    self.invert_hint = Some(InvertHint::ChooseColumnFail);
                    break;
                }
                ChuzcOutcome::Ok => {}
            }
            let column_in = self.dual_row.work_pivot.expect("pivot set on Ok");
            let alpha_row = self.dual_row.work_alpha;
            let theta_dual = f64::from(move_out) * self.dual_row.work_theta;
            let theta_primal =
                f64::from(move_out) * self.dual_row.work_delta_remaining / alpha_row;
            let entering_move_saved = self.state.nonbasic_move[column_in];
            let entering_value_saved = self.state.work_value[column_in];

            // minor_updateDual.
            let mut shift_amount = 0.0;
            if theta_dual == 0.0 {
                shift_amount = -self.state.work_dual[column_in];
                self.state.shift_cost(column_in, shift_amount);
            } else {
                for buffer in &self.slice_row_ap {
                    for &j in &buffer.index {
                        if self.state.nonbasic_flag[j] == 1 {
                            self.state.work_dual[j] -= theta_dual * buffer.array[j];
                        }
                    }
                }
                for &i in &choices[slot].row_ep.index {
                    let var = num_col + i;
                    if self.state.nonbasic_flag[var] == 1 {
                        self.state.work_dual[var] -=
                            theta_dual * choices[slot].row_ep.array[i];
                    }
                }
                self.state.work_dual[column_in] = 0.0;
                self.dual_row
                    .shift_infeasible(&mut self.state, self.settings.dual_feasibility_tolerance);
            }

            // Bound flips, buffered in row space for the major FTRAN.
            let flip_list = self.dual_row.flip_list.clone();
            let mut flip_column = SparseVector::new(num_row);
            for &var in &flip_list {
                let delta =
                    f64::from(self.state.nonbasic_move[var]) * self.state.work_range[var];
                self.matrix.collect_column(&mut flip_column, var, delta);
                self.state.flip_bound(var);
            }

            // minor_updatePivots: swap the basis; the factor learns about
            // it in the major update.
            let entering_value = self.state.work_value[column_in] + theta_primal;
            self.state.nonbasic_flag[variable_out] = 1;
            if self.state.work_lower[variable_out] == self.state.work_upper[variable_out] {
                self.state.nonbasic_move[variable_out] = 0;
                self.state.work_value[variable_out] = self.state.work_lower[variable_out];
            } else if move_out == -1 {
                self.state.nonbasic_move[variable_out] = 1;
                self.state.work_value[variable_out] = self.state.work_lower[variable_out];
            } else {
                self.state.nonbasic_move[variable_out] = -1;
                self.state.work_value[variable_out] = self.state.work_upper[variable_out];
            }
            self.state.work_dual[variable_out] = -theta_dual;
            self.state.nonbasic_flag[column_in] = 0;
            self.state.nonbasic_move[column_in] = 0;
            self.state.work_dual[column_in] = 0.0;
            self.state.basic_index[row_out] = column_in;
            self.state.base_lower[row_out] = self.state.work_lower[column_in];
            self.state.base_upper[row_out] = self.state.work_upper[column_in];
            choices[slot].done = true;

            // The entering column, still in row space.
            let mut column = SparseVector::new(num_row);
            self.matrix.collect_column(&mut column, column_in, 1.0);

            // minor_updateRows: transform the remaining candidates' ρ and
            // tracked values past this basis change.
            let pivot_rep =
                std::mem::replace(&mut choices[slot].row_ep, SparseVector::new(0));
            for choice in choices.iter_mut() {
                if choice.done || choice.skipped {
                    continue;
                }
                let aq = self.matrix.column_dot(column_in, &choice.row_ep);
                let mut flip_effect = 0.0;
                for &i in &flip_column.index {
                    flip_effect += flip_column.array[i] * choice.row_ep.array[i];
                }
                choice.value -= theta_primal * aq + flip_effect;
                if aq != 0.0 {
                    choice.row_ep.saxpy(-aq / alpha_row, &pivot_rep);
                    choice.row_ep.tighten();
                }
            }
            choices[slot].row_ep = pivot_rep;

            finishes.push(MFinish {
                row_out,
                variable_out,
                column_in,
                move_out,
                alpha_row,
                theta_dual,
                theta_primal,
                entering_value,
                entering_move_saved,
                entering_value_saved,
                flip_list,
                flip_column,
                shift_amount,
                column,
            });
        }

        if finishes.is_empty() {
            if self.invert_hint.is_none() {
                // Every candidate decayed below its persistence limit:
                // refresh the lists and try again.
                self.rhs.create_infeas_list(self.monitor.col_density);
            }
            return;
        }

        // major_updateFtranParallel: all buffered columns against the
        // factor as it stood at batch start.
        {
            let factor = &self.factor;
            finishes.par_iter_mut().for_each(|finish| {
                factor.ftran(&mut finish.column);
                if !finish.flip_list.is_empty() {
                    factor.ftran(&mut finish.flip_column);
                }
            });
        }

        // Ordered commit with verification and rollback.
        let mut rollback_from: Option<usize> = None;
        for i in 0..finishes.len() {
            // Absorb the etas committed by slots 0..i.
            self.factor
                .ftran_recent_etas(&mut finishes[i].column, eta_base);
            if !finishes[i].flip_list.is_empty() {
                self.factor
                    .ftran_recent_etas(&mut finishes[i].flip_column, eta_base);
            }

            let finish = &finishes[i];
            let alpha_col = finish.column.array[finish.row_out];
            let trouble =
                (alpha_col - finish.alpha_row).abs() / alpha_col.abs().max(1.0);
            if trouble > PIVOT_VERIFY_TOLERANCE || alpha_col.abs() < PIVOT_ABORT_TOLERANCE {
                self.monitor.num_verify_mismatch += 1;
                self.invert_hint = Some(InvertHint::PossiblySingular);
                rollback_from = Some(i);
                break;
            }

            // major_updatePrimal for this slot, in commit order.
            if !finish.flip_list.is_empty() {
                self.rhs.update_primal(
                    &finishes[i].flip_column,
                    1.0,
                    &mut self.state.base_value,
                    &self.state.base_lower,
                    &self.state.base_upper,
                );
            }
            let finish = &finishes[i];
            self.rhs.update_primal(
                &finish.column,
                finish.theta_primal,
                &mut self.state.base_value,
                &self.state.base_lower,
                &self.state.base_upper,
            );
            self.state.base_value[finish.row_out] = finish.entering_value;
            self.rhs.update_pivot(
                finish.row_out,
                &self.state.base_value,
                &self.state.base_lower,
                &self.state.base_upper,
            );
            self.weights
                .update(&finish.column, None, finish.row_out, alpha_col);
            self.monitor.record_col_density(finish.column.density());
            self.monitor.add_tick(10.0 * finish.column.count() as f64);

            if !self.factor.update(&finishes[i].column, finishes[i].row_out) {
                self.invert_hint = Some(InvertHint::PossiblySingular);
                rollback_from = Some(i);
                break;
            }
            self.iteration_count += 1;
            self.monitor
                .record_iteration(self.weights.mode == WeightMode::Dse);
        }

        if let Some(from) = rollback_from {
            self.major_rollback(&finishes, from);
        } else if self.invert_hint.is_none() {
            if self.factor.needs_refactor(self.settings.update_limit) {
                self.invert_hint = Some(InvertHint::UpdateLimit);
            } else if self
                .monitor
                .synthetic_clock_due(self.factor.build_synthetic_tick())
            {
                self.invert_hint = Some(InvertHint::SyntheticClock);
            }
        }

        self.state.lp_status.has_fresh_invert = false;
        self.state.lp_status.has_fresh_rebuild = false;
    }

    /// Undo the basis, value, flip and shift changes of the slots in
    /// `finishes[from..]`, newest first. Slots before `from` stay
    /// committed; duals and primal values are recomputed by the rebuild
    /// the pending invert hint forces.
    fn major_rollback(&mut self, finishes: &[MFinish], from: usize) {
        self.logger.print(
            MessageLevel::DETAILED,
            &format!(
                "PAMI rollback: discarding {} of {} minor iterations",
                finishes.len() - from,
                finishes.len()
            ),
        );
        for finish in finishes[from..].iter().rev() {
            let entering = finish.column_in;
            let leaving = finish.variable_out;

            self.state.basic_index[finish.row_out] = leaving;
            self.state.nonbasic_flag[leaving] = 0;
            self.state.nonbasic_move[leaving] = 0;
            self.state.work_value[leaving] = 0.0;
            self.state.work_dual[leaving] = 0.0;

            self.state.nonbasic_flag[entering] = 1;
            self.state.nonbasic_move[entering] = finish.entering_move_saved;
            self.state.work_value[entering] = finish.entering_value_saved;

            self.state.base_lower[finish.row_out] = self.state.work_lower[leaving];
            self.state.base_upper[finish.row_out] = self.state.work_upper[leaving];

            for &var in finish.flip_list.iter().rev() {
                self.state.flip_bound(var);
            }
            if finish.shift_amount != 0.0 {
                self.state.work_cost[entering] -= finish.shift_amount;
                self.state.work_shift[entering] -= finish.shift_amount;
            }
        }
    }

    /// SIP: the serial pipeline with the independent FTRANs of one
    /// iteration (pivotal column, BFRT aggregate, DSE direction) running
    /// as one fork-join region.
    pub(crate) fn update_ftran_sip(&mut self) {
        let has_flips = !self.dual_row.flip_list.is_empty();
        if has_flips {
            self.column_bfrt.clear();
            for idx in 0..self.dual_row.flip_list.len() {
                let var = self.dual_row.flip_list[idx];
                let delta =
                    f64::from(self.state.nonbasic_move[var]) * self.state.work_range[var];
                self.matrix.collect_column(&mut self.column_bfrt, var, delta);
                self.state.flip_bound(var);
            }
        }
        self.column.clear();
        self.matrix
            .collect_column(&mut self.column, self.column_in, 1.0);
        let use_dse = self.weights.mode == WeightMode::Dse;
        if use_dse {
            self.column_dse.copy_from(&self.row_ep);
        }

        {
            let factor = &self.factor;
            let column = &mut self.column;
            let column_bfrt = &mut self.column_bfrt;
            let column_dse = &mut self.column_dse;
            rayon::scope(|scope| {
                scope.spawn(move |_| factor.ftran(column));
                if has_flips {
                    scope.spawn(move |_| factor.ftran(column_bfrt));
                }
                if use_dse {
                    scope.spawn(move |_| factor.ftran(column_dse));
                }
            });
        }

        self.monitor.record_col_density(self.column.density());
        self.monitor.add_tick(10.0 * self.column.count() as f64);
        if use_dse {
            self.monitor.record_dse_density(self.column_dse.density());
            self.monitor.add_tick(10.0 * self.column_dse.count() as f64);
        }
        self.alpha_col = self.column.array[self.row_out];
        if has_flips {
            self.monitor.add_tick(10.0 * self.column_bfrt.count() as f64);
            self.rhs.update_primal(
                &self.column_bfrt,
                1.0,
                &mut self.state.base_value,
                &self.state.base_lower,
                &self.state.base_upper,
            );
        }
    }
}
