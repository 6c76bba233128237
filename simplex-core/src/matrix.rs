//! Column- and row-wise copies of the constraint matrix, and PRICE.
//!
//! PRICE computes the structural part of a simplex tableau row,
//! π = Aᵀρ, in one of three modes: column-wise (dense ρ), row-wise
//! (sparse ρ), or row-wise "ultra" which additionally collects the index
//! list of touched nonbasic columns. For PAMI the columns are partitioned
//! into at most [`SLICE_LIMIT`] slices, each priced into its own buffer.

use crate::linalg::vector::SparseVector;
use crate::problem::SparseColMatrix;

/// Upper limit on the number of partial-price slices.
pub const SLICE_LIMIT: usize = 100;

/// Pivotal-row density at which column-wise PRICE wins.
pub const COL_PRICE_DENSITY: f64 = 0.75;

/// PRICE mode in effect for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    /// Column-wise: one dot product per structural column
    Col,
    /// Row-wise: scatter each nonzero ρ_i through row i
    Row,
    /// Row-wise with a touched-nonbasic index list
    Ultra,
}

/// Row-wise storage for a contiguous range of columns.
#[derive(Debug, Clone)]
struct RowWiseSlice {
    /// First column covered by this slice
    col_begin: usize,
    start: Vec<usize>,
    index: Vec<usize>,
    value: Vec<f64>,
}

impl RowWiseSlice {
    fn build(a_matrix: &SparseColMatrix, col_begin: usize, col_end: usize) -> Self {
        let m = a_matrix.rows();
        let mut counts = vec![0usize; m + 1];
        for j in col_begin..col_end {
            let col = a_matrix.outer_view(j).expect("column in range");
            for (i, _) in col.iter() {
                counts[i + 1] += 1;
            }
        }
        for i in 0..m {
            counts[i + 1] += counts[i];
        }
        let nnz = counts[m];
        let start = counts;
        let mut fill = start.clone();
        let mut index = vec![0usize; nnz];
        let mut value = vec![0.0; nnz];
        for j in col_begin..col_end {
            let col = a_matrix.outer_view(j).expect("column in range");
            for (i, &v) in col.iter() {
                let slot = fill[i];
                index[slot] = j;
                value[slot] = v;
                fill[i] += 1;
            }
        }
        RowWiseSlice {
            col_begin,
            start,
            index,
            value,
        }
    }
}

/// Column-wise constraint matrix plus its row-wise mirror and
/// partial-price slices.
#[derive(Debug, Clone)]
pub struct Matrix {
    num_row: usize,
    num_col: usize,
    a_matrix: SparseColMatrix,

    /// Full row-wise mirror, built on first use
    row_wise: Option<RowWiseSlice>,

    /// Column ranges of the partial-price slices: slice s covers
    /// `[slice_start[s], slice_start[s + 1])`
    slice_start: Vec<usize>,
    slices: Vec<RowWiseSlice>,
}

impl Matrix {
    /// Take a column-wise copy of the (scaled) constraint matrix.
    pub fn new(a_matrix: SparseColMatrix) -> Self {
        let num_row = a_matrix.rows();
        let num_col = a_matrix.cols();
        Matrix {
            num_row,
            num_col,
            a_matrix,
            row_wise: None,
            slice_start: Vec::new(),
            slices: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Number of structural columns.
    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// The column-wise copy.
    pub fn a_matrix(&self) -> &SparseColMatrix {
        &self.a_matrix
    }

    /// Ensure the row-wise mirror exists.
    pub fn ensure_row_wise(&mut self) {
        if self.row_wise.is_none() {
            self.row_wise = Some(RowWiseSlice::build(&self.a_matrix, 0, self.num_col));
        }
    }

    /// Partition the columns into at most `requested` slices of roughly
    /// equal nonzero count for partial PRICE.
    pub fn setup_slices(&mut self, requested: usize) {
        let num_slices = requested.clamp(1, SLICE_LIMIT).min(self.num_col.max(1));
        let total_nnz = self.a_matrix.nnz().max(1);
        let target = (total_nnz + num_slices - 1) / num_slices;

        self.slice_start.clear();
        self.slice_start.push(0);
        let mut acc = 0usize;
        for j in 0..self.num_col {
            acc += self.a_matrix
                .outer_view(j)
                .map(|c| c.nnz())
                .unwrap_or(0);
            if acc >= target && self.slice_start.len() < num_slices && j + 1 < self.num_col {
                self.slice_start.push(j + 1);
                acc = 0;
            }
        }
        self.slice_start.push(self.num_col);

        self.slices = (0..self.slice_start.len() - 1)
            .map(|s| {
                RowWiseSlice::build(&self.a_matrix, self.slice_start[s], self.slice_start[s + 1])
            })
            .collect();
    }

    /// Number of partial-price slices.
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }

    /// Column range `[begin, end)` of slice `s`.
    pub fn slice_range(&self, s: usize) -> (usize, usize) {
        (self.slice_start[s], self.slice_start[s + 1])
    }

    /// Column-wise PRICE: π_j = Σ_i ρ_i A_ij for every structural column.
    /// Chosen when ρ is dense; zero ρ_i are skipped inside the dot product.
    pub fn price_by_col(&self, result: &mut SparseVector, row_ep: &SparseVector) {
        result.clear();
        result.drop_indexing();
        for j in 0..self.num_col {
            let col = self.a_matrix.outer_view(j).expect("column in range");
            let mut dot = 0.0;
            for (i, &v) in col.iter() {
                let rho = row_ep.array[i];
                if rho != 0.0 {
                    dot += rho * v;
                }
            }
            result.array[j] = dot;
        }
        result.rebuild_index();
    }

    /// Row-wise PRICE: accumulate π from the nonzero ρ_i rows only.
    pub fn price_by_row(&self, result: &mut SparseVector, row_ep: &SparseVector) {
        let rw = self
            .row_wise
            .as_ref()
            .expect("row-wise mirror built before row PRICE");
        result.clear();
        if row_ep.indexed {
            for &i in &row_ep.index {
                let rho = row_ep.array[i];
                if rho == 0.0 {
                    continue;
                }
                for pos in rw.start[i]..rw.start[i + 1] {
                    result.add(rw.index[pos], rho * rw.value[pos]);
                }
            }
        } else {
            for i in 0..self.num_row {
                let rho = row_ep.array[i];
                if rho == 0.0 {
                    continue;
                }
                for pos in rw.start[i]..rw.start[i + 1] {
                    result.add(rw.index[pos], rho * rw.value[pos]);
                }
            }
        }
        result.tighten();
    }

    /// Row-wise PRICE keeping only nonbasic columns, with the touched
    /// index list filtered in the same pass.
    pub fn price_by_row_ultra(
        &self,
        result: &mut SparseVector,
        row_ep: &SparseVector,
        nonbasic_flag: &[i8],
    ) {
        let rw = self
            .row_wise
            .as_ref()
            .expect("row-wise mirror built before ultra PRICE");
        result.clear();
        let mut scatter = |i: usize, rho: f64, result: &mut SparseVector| {
            for pos in rw.start[i]..rw.start[i + 1] {
                let j = rw.index[pos];
                if nonbasic_flag[j] != 0 {
                    result.add(j, rho * rw.value[pos]);
                }
            }
        };
        if row_ep.indexed {
            for &i in &row_ep.index {
                let rho = row_ep.array[i];
                if rho != 0.0 {
                    scatter(i, rho, result);
                }
            }
        } else {
            for i in 0..self.num_row {
                let rho = row_ep.array[i];
                if rho != 0.0 {
                    scatter(i, rho, result);
                }
            }
        }
        result.tighten();
    }

    /// Row-wise PRICE restricted to slice `s`, into that slice's own
    /// result buffer. Entries land at their global column indices.
    pub fn price_slice(&self, s: usize, result: &mut SparseVector, row_ep: &SparseVector) {
        let slice = &self.slices[s];
        debug_assert!(slice.col_begin == self.slice_start[s]);
        result.clear();
        if row_ep.indexed {
            for &i in &row_ep.index {
                let rho = row_ep.array[i];
                if rho == 0.0 {
                    continue;
                }
                for pos in slice.start[i]..slice.start[i + 1] {
                    result.add(slice.index[pos], rho * slice.value[pos]);
                }
            }
        } else {
            for i in 0..self.num_row {
                let rho = row_ep.array[i];
                if rho == 0.0 {
                    continue;
                }
                for pos in slice.start[i]..slice.start[i + 1] {
                    result.add(slice.index[pos], rho * slice.value[pos]);
                }
            }
        }
        result.tighten();
    }

    /// Dot product of a variable's column of `[A I]` with a row-space
    /// vector.
    pub fn column_dot(&self, var: usize, rho: &SparseVector) -> f64 {
        if var < self.num_col {
            let col = self.a_matrix.outer_view(var).expect("column in range");
            col.iter().map(|(i, &v)| v * rho.array[i]).sum()
        } else {
            rho.array[var - self.num_col]
        }
    }

    /// Scatter `multiple` times the column of variable `var` into a
    /// row-space vector.
    pub fn collect_column(&self, target: &mut SparseVector, var: usize, multiple: f64) {
        if multiple == 0.0 {
            return;
        }
        if var < self.num_col {
            let col = self.a_matrix.outer_view(var).expect("column in range");
            for (i, &v) in col.iter() {
                target.add(i, multiple * v);
            }
        } else {
            target.add(var - self.num_col, multiple);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::from_triplets;

    fn test_matrix() -> Matrix {
        // 3x5 matrix with mixed sparsity
        let a = from_triplets(
            3,
            5,
            vec![
                (0, 0, 1.0),
                (1, 0, 2.0),
                (1, 1, 3.0),
                (2, 2, 4.0),
                (0, 3, 5.0),
                (2, 3, 6.0),
                (0, 4, 7.0),
                (1, 4, 8.0),
                (2, 4, 9.0),
            ],
        );
        Matrix::new(a)
    }

    fn rho(values: &[(usize, f64)]) -> SparseVector {
        let mut v = SparseVector::new(3);
        for &(i, x) in values {
            v.set(i, x);
        }
        v
    }

    #[test]
    fn row_and_col_price_agree() {
        let mut matrix = test_matrix();
        matrix.ensure_row_wise();
        let rho = rho(&[(0, 1.0), (2, -2.0)]);

        let mut by_col = SparseVector::new(5);
        matrix.price_by_col(&mut by_col, &rho);

        let mut by_row = SparseVector::new(5);
        matrix.price_by_row(&mut by_row, &rho);

        for j in 0..5 {
            assert!((by_col.array[j] - by_row.array[j]).abs() < 1e-12, "col {}", j);
        }
        // Spot value: pi_3 = 1*5 + (-2)*6 = -7
        assert!((by_row.array[3] + 7.0).abs() < 1e-12);
    }

    #[test]
    fn ultra_price_filters_basic_columns() {
        let mut matrix = test_matrix();
        matrix.ensure_row_wise();
        let rho = rho(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let nonbasic_flag = vec![1i8, 0, 1, 0, 1];

        let mut result = SparseVector::new(5);
        matrix.price_by_row_ultra(&mut result, &rho, &nonbasic_flag);

        assert_eq!(result.array[1], 0.0);
        assert_eq!(result.array[3], 0.0);
        assert!((result.array[0] - 3.0).abs() < 1e-12);
        assert!((result.array[4] - 24.0).abs() < 1e-12);
        assert!(result.index.iter().all(|&j| nonbasic_flag[j] != 0));
    }

    #[test]
    fn slice_prices_cover_all_columns() {
        let mut matrix = test_matrix();
        matrix.setup_slices(2);
        assert!(matrix.num_slices() >= 2);
        let rho = rho(&[(0, 1.0), (1, -1.0), (2, 0.5)]);

        let mut combined = vec![0.0; 5];
        for s in 0..matrix.num_slices() {
            let mut part = SparseVector::new(5);
            matrix.price_slice(s, &mut part, &rho);
            let (lo, hi) = matrix.slice_range(s);
            for j in 0..5 {
                if part.array[j] != 0.0 {
                    assert!(j >= lo && j < hi, "slice {} leaked column {}", s, j);
                }
                combined[j] += part.array[j];
            }
        }

        let mut matrix2 = test_matrix();
        matrix2.ensure_row_wise();
        let mut full = SparseVector::new(5);
        matrix2.price_by_row(&mut full, &rho);
        for j in 0..5 {
            assert!((combined[j] - full.array[j]).abs() < 1e-12);
        }
    }

    #[test]
    fn column_dot_handles_logicals() {
        let matrix = test_matrix();
        let rho = rho(&[(1, 2.0)]);
        // Structural column 1 = 3 e_1: dot = 6
        assert!((matrix.column_dot(1, &rho) - 6.0).abs() < 1e-12);
        // Logical of row 1 = e_1: dot = 2
        assert!((matrix.column_dot(5 + 1, &rho) - 2.0).abs() < 1e-12);
        // Logical of row 0 misses the only nonzero
        assert!((matrix.column_dot(5, &rho) - 0.0).abs() < 1e-12);
    }
}
