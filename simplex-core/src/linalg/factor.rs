//! LU factorisation of the simplex basis.
//!
//! The basis matrix B is the m columns of `[A I]` named by `basic_index`.
//! `factorize` computes a sparse LU with row permutation by a left-looking
//! elimination (symbolic reach + numeric update per column, partial pivoting
//! by magnitude). Columns without an acceptable pivot are discarded and
//! their basis positions filled with logicals of the remaining unpivoted
//! rows; the repair list is reported so the caller can patch the basis.
//!
//! After factorisation, L and U are stored column-wise in pivot-position
//! space (U also row-wise for the transposed solve). FTRAN maps the
//! row-space right-hand side into position space, solves L then U, and
//! applies the product-form etas; BTRAN runs the mirror image. Both choose
//! a hyper-sparse (DFS-driven) or dense sweep per solve from the density of
//! the right-hand side.

use crate::linalg::vector::{SparseVector, ZERO_TOLERANCE};
use crate::problem::SparseColMatrix;

/// Pivots smaller than this during factorisation mark the column singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Right-hand sides sparser than this take the DFS-driven solve path.
const HYPER_SOLVE_DENSITY: f64 = 0.1;

/// Eta file growth beyond this multiple of the factor size forces INVERT.
const FILL_FACTOR_LIMIT: f64 = 4.0;

/// Reasons the engine breaks out of its inner loop to reinvert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvertHint {
    /// CHUZR found no candidate: possibly optimal for the current phase
    NoCandidate,
    /// Pivot verification or factorisation suggests a (near-)singular basis
    PossiblySingular,
    /// Fresh-factor confirmation of optimality is required
    PossiblyOptimal,
    /// CHUZC found no candidate of the correct sign
    PossiblyUnbounded,
    /// A dual ray certifies primal infeasibility
    PrimalInfeasInDual,
    /// CHUZC candidate pivot below tolerance
    ChooseColumnFail,
    /// The synthetic clock says reinversion is cheaper than more updates
    SyntheticClock,
    /// The product-form update limit was reached
    UpdateLimit,
}

/// Rank-deficiency repairs performed during factorisation.
#[derive(Debug, Clone, Default)]
pub struct FactorReport {
    /// Number of basis columns that had to be replaced
    pub rank_deficiency: usize,

    /// (basis position, row) pairs: the position's column was replaced by
    /// the logical of the row. The caller must set
    /// `basic_index[position] = num_col + row` and make the displaced
    /// variable nonbasic.
    pub replaced: Vec<(usize, usize)>,
}

/// One product-form update: the next basis differs from the factored one by
/// the FTRANned entering column placed at `pivot`.
#[derive(Debug, Clone)]
struct Eta {
    pivot: usize,
    alpha: f64,
    index: Vec<usize>,
    value: Vec<f64>,
}

/// LU factors of the basis plus the eta file of post-factor updates.
#[derive(Debug, Clone)]
pub struct Factor {
    num_row: usize,

    /// pivot position -> original row
    perm_row: Vec<usize>,
    /// original row -> pivot position
    row_pos: Vec<usize>,

    // L column-wise in position space: unit diagonal implicit, entries
    // strictly below (position > column)
    l_start: Vec<usize>,
    l_index: Vec<usize>,
    l_value: Vec<f64>,

    // U column-wise in position space: entries strictly above, diagonal kept
    // separately
    u_start: Vec<usize>,
    u_index: Vec<usize>,
    u_value: Vec<f64>,
    u_diag: Vec<f64>,

    // U row-wise mirror for the transposed solve
    ur_start: Vec<usize>,
    ur_index: Vec<usize>,
    ur_value: Vec<f64>,

    etas: Vec<Eta>,

    /// Product-form updates absorbed since the last INVERT
    update_count: usize,

    /// Nonzeros in the eta file
    eta_fill: usize,

    /// Nonzeros of the factors at the last INVERT
    base_nnz: usize,

    /// Estimated work of the last INVERT, in synthetic ticks
    build_synthetic_tick: f64,
}

impl Factor {
    /// Empty factor for an m-row basis.
    pub fn new(num_row: usize) -> Self {
        Factor {
            num_row,
            perm_row: vec![0; num_row],
            row_pos: vec![usize::MAX; num_row],
            l_start: vec![0; num_row + 1],
            l_index: Vec::new(),
            l_value: Vec::new(),
            u_start: vec![0; num_row + 1],
            u_index: Vec::new(),
            u_value: Vec::new(),
            u_diag: vec![0.0; num_row],
            ur_start: Vec::new(),
            ur_index: Vec::new(),
            ur_value: Vec::new(),
            etas: Vec::new(),
            update_count: 0,
            eta_fill: 0,
            base_nnz: 0,
            build_synthetic_tick: 0.0,
        }
    }

    /// Number of rows.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Product-form updates absorbed since the last INVERT.
    pub fn update_count(&self) -> usize {
        self.update_count
    }

    /// Estimated work of the last INVERT, in synthetic ticks.
    pub fn build_synthetic_tick(&self) -> f64 {
        self.build_synthetic_tick
    }

    /// Whether the count- or fill-based refactor thresholds are exceeded.
    pub fn needs_refactor(&self, update_limit: usize) -> bool {
        self.update_count >= update_limit
            || self.eta_fill as f64 > FILL_FACTOR_LIMIT * self.base_nnz.max(self.num_row) as f64
    }

    /// Recompute the LU factors of the basis named by `basic_index` from
    /// scratch, resetting the eta file.
    ///
    /// Variables `>= num_col` are logicals: column `e_{v - num_col}`.
    /// Returns the rank-deficiency repairs the caller must apply to
    /// `basic_index`.
    pub fn factorize(
        &mut self,
        basic_index: &[usize],
        a_matrix: &SparseColMatrix,
    ) -> FactorReport {
        let m = self.num_row;
        let num_col = a_matrix.cols();
        debug_assert_eq!(basic_index.len(), m);

        self.row_pos.fill(usize::MAX);
        self.l_index.clear();
        self.l_value.clear();
        self.u_index.clear();
        self.u_value.clear();
        self.etas.clear();
        self.update_count = 0;
        self.eta_fill = 0;

        // During the build, L entries are indexed by original row; a finish
        // pass remaps them to pivot positions once every row has one.
        let mut work = vec![0.0; m];
        let mut pattern: Vec<usize> = Vec::with_capacity(m);
        let mut visited = vec![false; m];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut topo: Vec<usize> = Vec::with_capacity(m);
        let mut no_pivot: Vec<usize> = Vec::new();

        for k in 0..m {
            let var = basic_index[k];
            pattern.clear();
            topo.clear();

            // Scatter the basis column and run the symbolic reach through
            // the columns of L already computed.
            let scatter = |row: usize,
                           value: f64,
                           work: &mut [f64],
                           pattern: &mut Vec<usize>,
                           visited: &mut [bool],
                           stack: &mut Vec<(usize, usize)>,
                           topo: &mut Vec<usize>,
                           row_pos: &[usize],
                           l_start: &[usize],
                           l_index: &[usize]| {
                work[row] = value;
                if visited[row] {
                    return;
                }
                // Iterative DFS from `row`, pushing pivot positions in
                // postorder.
                stack.clear();
                stack.push((row, 0));
                visited[row] = true;
                pattern.push(row);
                while let Some((r, child)) = stack.pop() {
                    let t = row_pos[r];
                    if t == usize::MAX {
                        continue;
                    }
                    let begin = l_start[t];
                    let end = l_start[t + 1];
                    let mut advanced = false;
                    for pos in (begin + child)..end {
                        let r2 = l_index[pos];
                        if !visited[r2] {
                            visited[r2] = true;
                            pattern.push(r2);
                            stack.push((r, pos - begin + 1));
                            stack.push((r2, 0));
                            advanced = true;
                            break;
                        }
                    }
                    if !advanced {
                        topo.push(t);
                    }
                }
            };

            if var < num_col {
                let col = a_matrix.outer_view(var).expect("column in range");
                for (row, &value) in col.iter() {
                    scatter(
                        row,
                        value,
                        &mut work,
                        &mut pattern,
                        &mut visited,
                        &mut stack,
                        &mut topo,
                        &self.row_pos,
                        &self.l_start,
                        &self.l_index,
                    );
                }
            } else {
                scatter(
                    var - num_col,
                    1.0,
                    &mut work,
                    &mut pattern,
                    &mut visited,
                    &mut stack,
                    &mut topo,
                    &self.row_pos,
                    &self.l_start,
                    &self.l_index,
                );
            }

            // Numeric elimination in reverse postorder (dependencies first).
            for &t in topo.iter().rev() {
                let val = work[self.perm_row[t]];
                if val != 0.0 {
                    for pos in self.l_start[t]..self.l_start[t + 1] {
                        work[self.l_index[pos]] -= self.l_value[pos] * val;
                    }
                }
            }

            // Partial pivoting: the largest unpivoted entry wins.
            let mut pivot_row = usize::MAX;
            let mut pivot_mag = 0.0;
            for &r in pattern.iter() {
                if self.row_pos[r] == usize::MAX {
                    let mag = work[r].abs();
                    if mag > pivot_mag {
                        pivot_mag = mag;
                        pivot_row = r;
                    }
                }
            }

            if pivot_row == usize::MAX || pivot_mag < SINGULAR_TOLERANCE {
                // Singular column: discard it, fill the position later.
                no_pivot.push(k);
                for &r in pattern.iter() {
                    work[r] = 0.0;
                    visited[r] = false;
                }
                self.l_start[k + 1] = self.l_index.len();
                self.u_start[k + 1] = self.u_index.len();
                self.u_diag[k] = 0.0;
                continue;
            }

            let pivot_value = work[pivot_row];
            for &r in pattern.iter() {
                let v = work[r];
                work[r] = 0.0;
                visited[r] = false;
                if v.abs() <= ZERO_TOLERANCE {
                    continue;
                }
                let t = self.row_pos[r];
                if t != usize::MAX {
                    self.u_index.push(t);
                    self.u_value.push(v);
                } else if r != pivot_row {
                    self.l_index.push(r);
                    self.l_value.push(v / pivot_value);
                }
            }
            self.u_diag[k] = pivot_value;
            self.perm_row[k] = pivot_row;
            self.row_pos[pivot_row] = k;
            self.l_start[k + 1] = self.l_index.len();
            self.u_start[k + 1] = self.u_index.len();
        }

        // Pair the pivotless positions with the unpivoted rows: each such
        // position holds a unit logical column.
        let mut report = FactorReport::default();
        if !no_pivot.is_empty() {
            let mut spare_rows: Vec<usize> = (0..m)
                .filter(|&r| self.row_pos[r] == usize::MAX)
                .collect();
            debug_assert_eq!(spare_rows.len(), no_pivot.len());
            for &k in &no_pivot {
                let r = spare_rows.pop().expect("spare row for deficient position");
                self.perm_row[k] = r;
                self.row_pos[r] = k;
                self.u_diag[k] = 1.0;
                report.replaced.push((k, r));
            }
            report.rank_deficiency = no_pivot.len();
        }

        // Remap L entries from original rows to pivot positions.
        for idx in self.l_index.iter_mut() {
            *idx = self.row_pos[*idx];
        }

        self.build_u_rows();

        self.base_nnz = self.l_index.len() + self.u_index.len() + m;
        self.build_synthetic_tick = 20.0 * m as f64 + 10.0 * self.base_nnz as f64;
        report
    }

    fn build_u_rows(&mut self) {
        let m = self.num_row;
        let mut counts = vec![0usize; m + 1];
        for &k in &self.u_index {
            counts[k + 1] += 1;
        }
        for k in 0..m {
            counts[k + 1] += counts[k];
        }
        self.ur_start = counts;
        let nnz = self.u_index.len();
        self.ur_index = vec![0; nnz];
        self.ur_value = vec![0.0; nnz];
        let mut fill = self.ur_start.clone();
        for t in 0..m {
            for pos in self.u_start[t]..self.u_start[t + 1] {
                let k = self.u_index[pos];
                let slot = fill[k];
                self.ur_index[slot] = t;
                self.ur_value[slot] = self.u_value[pos];
                fill[k] += 1;
            }
        }
    }

    /// Solve B x = v. On entry `col` holds v indexed by original row; on
    /// return it holds x indexed by basis position.
    pub fn ftran(&self, col: &mut SparseVector) {
        let m = self.num_row;
        let hyper = col.indexed && col.density() < HYPER_SOLVE_DENSITY;

        if hyper {
            // Permute the right-hand side into position space.
            col.iwork.clear();
            for idx in 0..col.index.len() {
                let r = col.index[idx];
                let v = col.array[r];
                col.array[r] = 0.0;
                let k = self.row_pos[r];
                if v != 0.0 {
                    col.cwork[k] = v;
                    col.iwork.push(k);
                }
            }
            col.index.clear();

            // Hyper-sparse L-solve: DFS reach, then numeric in topological
            // order. The reach set is the full result pattern of L⁻¹v.
            let mut topo_l: Vec<usize> = Vec::new();
            let starts: Vec<usize> = col.iwork.clone();
            self.reach(&starts, &self.l_start, &self.l_index, &mut col.mark, &mut topo_l);
            for &k in topo_l.iter().rev() {
                let val = col.cwork[k];
                if val != 0.0 {
                    for pos in self.l_start[k]..self.l_start[k + 1] {
                        col.cwork[self.l_index[pos]] -= self.l_value[pos] * val;
                    }
                }
            }
            for &k in &topo_l {
                col.mark[k] = false;
            }

            // Hyper-sparse U-solve: a second reach over the U columns (the
            // pattern grows toward earlier positions), numeric in
            // topological order.
            let mut topo_u: Vec<usize> = Vec::new();
            self.reach(&topo_l, &self.u_start, &self.u_index, &mut col.mark, &mut topo_u);
            for &t in topo_u.iter().rev() {
                let val = col.cwork[t];
                if val != 0.0 {
                    let x = val / self.u_diag[t];
                    col.cwork[t] = x;
                    for pos in self.u_start[t]..self.u_start[t + 1] {
                        col.cwork[self.u_index[pos]] -= self.u_value[pos] * x;
                    }
                }
            }
            for &t in &topo_u {
                col.mark[t] = false;
            }

            let mut touched = topo_u;
            self.apply_etas_ftran_tracked(col, &mut touched);

            for &t in &touched {
                let v = col.cwork[t];
                col.cwork[t] = 0.0;
                if v.abs() > ZERO_TOLERANCE {
                    col.array[t] = v;
                    col.index.push(t);
                }
            }
            col.indexed = true;
        } else {
            // Dense sweeps.
            for r in 0..m {
                let v = col.array[r];
                col.array[r] = 0.0;
                col.cwork[self.row_pos[r]] = v;
            }
            for k in 0..m {
                let val = col.cwork[k];
                if val != 0.0 {
                    for pos in self.l_start[k]..self.l_start[k + 1] {
                        col.cwork[self.l_index[pos]] -= self.l_value[pos] * val;
                    }
                }
            }
            for t in (0..m).rev() {
                let val = col.cwork[t];
                if val != 0.0 {
                    let x = val / self.u_diag[t];
                    col.cwork[t] = x;
                    for pos in self.u_start[t]..self.u_start[t + 1] {
                        col.cwork[self.u_index[pos]] -= self.u_value[pos] * x;
                    }
                }
            }
            let mut touched: Vec<usize> = (0..m).collect();
            self.apply_etas_ftran_tracked(col, &mut touched);
            for t in 0..m {
                col.array[t] = col.cwork[t];
                col.cwork[t] = 0.0;
            }
            col.drop_indexing();
            col.rebuild_index();
        }
    }

    /// Solve Bᵀ x = v. On entry `col` holds v indexed by basis position; on
    /// return it holds x indexed by original row.
    pub fn btran(&self, col: &mut SparseVector) {
        let m = self.num_row;

        // Product-form etas in reverse: u_p = (v_p - Σ w_i v_i) / α.
        for eta in self.etas.iter().rev() {
            let mut s = col.array[eta.pivot];
            let mut any = s != 0.0;
            for (i, &idx) in eta.index.iter().enumerate() {
                let v = col.array[idx];
                if v != 0.0 {
                    s -= eta.value[i] * v;
                    any = true;
                }
            }
            if any {
                col.set(eta.pivot, s / eta.alpha);
            }
        }

        let hyper = col.indexed && col.density() < HYPER_SOLVE_DENSITY;
        if hyper {
            // Hyper-sparse Uᵀ-solve via the row-wise mirror.
            col.tighten();
            let starts: Vec<usize> = col.index.clone();
            let mut topo: Vec<usize> = Vec::new();
            self.reach(&starts, &self.ur_start, &self.ur_index, &mut col.mark, &mut topo);
            for &k in topo.iter().rev() {
                let val = col.array[k];
                if val != 0.0 {
                    let y = val / self.u_diag[k];
                    col.array[k] = y;
                    for pos in self.ur_start[k]..self.ur_start[k + 1] {
                        col.array[self.ur_index[pos]] -= self.ur_value[pos] * y;
                    }
                }
            }
            for &k in &topo {
                col.mark[k] = false;
            }
            col.index = topo;
        } else {
            col.drop_indexing();
            for k in 0..m {
                let val = col.array[k];
                if val != 0.0 {
                    let y = val / self.u_diag[k];
                    col.array[k] = y;
                    for pos in self.ur_start[k]..self.ur_start[k + 1] {
                        col.array[self.ur_index[pos]] -= self.ur_value[pos] * y;
                    }
                }
            }
        }

        // Lᵀ-solve: the result pattern grows toward earlier positions, so a
        // dense backward sweep is used regardless of input density.
        for k in (0..m).rev() {
            let mut s = col.array[k];
            for pos in self.l_start[k]..self.l_start[k + 1] {
                s -= self.l_value[pos] * col.array[self.l_index[pos]];
            }
            col.array[k] = s;
        }

        // Permute from position space back to row space.
        for k in 0..m {
            let v = col.array[k];
            col.array[k] = 0.0;
            col.cwork[self.perm_row[k]] = v;
        }
        for r in 0..m {
            col.array[r] = col.cwork[r];
            col.cwork[r] = 0.0;
        }
        col.drop_indexing();
        col.rebuild_index();
    }

    /// DFS reach over a position-space graph in CSC-like storage, producing
    /// a postorder of every reachable node. Marks are left set for the
    /// caller to clear.
    fn reach(
        &self,
        starts: &[usize],
        g_start: &[usize],
        g_index: &[usize],
        mark: &mut [bool],
        topo: &mut Vec<usize>,
    ) {
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for &s in starts {
            if mark[s] {
                continue;
            }
            mark[s] = true;
            stack.push((s, 0));
            while let Some((node, child)) = stack.pop() {
                let begin = g_start[node];
                let end = g_start[node + 1];
                let mut advanced = false;
                for pos in (begin + child)..end {
                    let next = g_index[pos];
                    if !mark[next] {
                        mark[next] = true;
                        stack.push((node, pos - begin + 1));
                        stack.push((next, 0));
                        advanced = true;
                        break;
                    }
                }
                if !advanced {
                    topo.push(node);
                }
            }
        }
    }

    fn apply_etas_ftran_tracked(&self, col: &mut SparseVector, touched: &mut Vec<usize>) {
        for eta in &self.etas {
            let xp = col.cwork[eta.pivot];
            if xp == 0.0 {
                continue;
            }
            let x = xp / eta.alpha;
            col.cwork[eta.pivot] = x;
            for (i, &idx) in eta.index.iter().enumerate() {
                let old = col.cwork[idx];
                let new = old - eta.value[i] * x;
                if old == 0.0 && new != 0.0 {
                    touched.push(idx);
                }
                col.cwork[idx] = new;
            }
        }
    }

    /// Number of etas in the product-form file.
    pub fn eta_count(&self) -> usize {
        self.etas.len()
    }

    /// Apply the etas from `first_eta` onward to a position-space vector,
    /// in FTRAN direction. Used when several FTRANs were taken against the
    /// same factor and later ones must absorb the updates committed in
    /// between.
    pub fn ftran_recent_etas(&self, col: &mut SparseVector, first_eta: usize) {
        for eta in &self.etas[first_eta..] {
            let xp = col.array[eta.pivot];
            if xp == 0.0 {
                continue;
            }
            let x = xp / eta.alpha;
            col.array[eta.pivot] = x;
            for (i, &idx) in eta.index.iter().enumerate() {
                col.add(idx, -eta.value[i] * x);
            }
        }
    }

    /// Absorb a basis change as a product-form eta: `column` is the
    /// FTRANned entering column (position space) and `row_out` the leaving
    /// position. Returns false when the pivot is negligible, in which case
    /// the factor is unchanged and the caller must reinvert.
    pub fn update(&mut self, column: &SparseVector, row_out: usize) -> bool {
        let alpha = column.array[row_out];
        if alpha.abs() < SINGULAR_TOLERANCE {
            return false;
        }
        let mut index = Vec::new();
        let mut value = Vec::new();
        if column.indexed {
            for &i in &column.index {
                if i != row_out {
                    let v = column.array[i];
                    if v.abs() > ZERO_TOLERANCE {
                        index.push(i);
                        value.push(v);
                    }
                }
            }
        } else {
            for i in 0..self.num_row {
                if i != row_out {
                    let v = column.array[i];
                    if v.abs() > ZERO_TOLERANCE {
                        index.push(i);
                        value.push(v);
                    }
                }
            }
        }
        self.eta_fill += index.len() + 1;
        self.etas.push(Eta {
            pivot: row_out,
            alpha,
            index,
            value,
        });
        self.update_count += 1;
        true
    }
}
