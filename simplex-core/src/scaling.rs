//! Equilibration of the working LP copy.
//!
//! Iteratively scales rows and columns of A toward unit infinity norms,
//! plus a power-of-two cost scaling, to improve the conditioning of the
//! bases the factor will meet. The original LP is never touched: the
//! engine scales its working copy before the solve and the solution is
//! mapped back through [`Scaling`] on the way out.

use crate::problem::LpProblem;
use sprs::TriMat;

/// Number of equilibration sweeps.
const EQUILIBRATION_ITERS: usize = 10;

/// Scale factors this close to 1 are snapped to 1.
const SNAP_TOLERANCE: f64 = 1e-3;

/// Row/column/cost scale factors applied to the working LP.
#[derive(Debug, Clone)]
pub struct Scaling {
    /// Column scale factors (length n): x_scaled = x / col_scale
    pub col_scale: Vec<f64>,
    /// Row scale factors (length m): row bounds are multiplied by these
    pub row_scale: Vec<f64>,
    /// Power-of-two divisor applied to all costs
    pub cost_scale: f64,
}

impl Scaling {
    /// Identity scaling (no-op).
    pub fn identity(num_col: usize, num_row: usize) -> Self {
        Scaling {
            col_scale: vec![1.0; num_col],
            row_scale: vec![1.0; num_row],
            cost_scale: 1.0,
        }
    }

    /// Whether this scaling is the identity.
    pub fn is_identity(&self) -> bool {
        self.cost_scale == 1.0
            && self.col_scale.iter().all(|&s| s == 1.0)
            && self.row_scale.iter().all(|&s| s == 1.0)
    }

    /// Map a scaled primal column value back: x = col_scale * x_scaled.
    pub fn unscale_col_value(&self, j: usize, value: f64) -> f64 {
        self.col_scale[j] * value
    }

    /// Map a scaled reduced cost back: d = cost_scale * d_scaled / col_scale.
    pub fn unscale_col_dual(&self, j: usize, dual: f64) -> f64 {
        self.cost_scale * dual / self.col_scale[j]
    }

    /// Map a scaled row activity back: a = a_scaled / row_scale.
    pub fn unscale_row_value(&self, i: usize, value: f64) -> f64 {
        value / self.row_scale[i]
    }

    /// Map a scaled row dual back: y = cost_scale * row_scale * y_scaled.
    pub fn unscale_row_dual(&self, i: usize, dual: f64) -> f64 {
        self.cost_scale * self.row_scale[i] * dual
    }

    /// Map a scaled objective value back.
    pub fn unscale_objective(&self, objective: f64) -> f64 {
        self.cost_scale * objective
    }
}

/// Scale `lp` in place and return the applied factors.
///
/// The transformation is `A ← R A C`, `c ← C c / cost_scale`,
/// `col bounds ← bounds / C`, `row bounds ← R · bounds`; infinite bounds
/// stay infinite.
pub fn scale_lp(lp: &mut LpProblem) -> Scaling {
    let m = lp.num_row();
    let n = lp.num_col();
    if lp.a_matrix.nnz() == 0 {
        return Scaling::identity(n, m);
    }

    let mut row_scale = vec![1.0_f64; m];
    let mut col_scale = vec![1.0_f64; n];

    for _ in 0..EQUILIBRATION_ITERS {
        // Row infinity norms of the currently scaled matrix.
        let mut row_max = vec![0.0_f64; m];
        let mut col_max = vec![0.0_f64; n];
        for (j, col) in lp.a_matrix.outer_iterator().enumerate() {
            for (i, &v) in col.iter() {
                let scaled = (v * row_scale[i] * col_scale[j]).abs();
                row_max[i] = row_max[i].max(scaled);
                col_max[j] = col_max[j].max(scaled);
            }
        }
        let mut moved = false;
        for i in 0..m {
            if row_max[i] > 0.0 {
                let f = 1.0 / row_max[i].sqrt();
                if (f - 1.0).abs() > SNAP_TOLERANCE {
                    moved = true;
                }
                row_scale[i] *= f;
            }
        }
        for j in 0..n {
            if col_max[j] > 0.0 {
                let f = 1.0 / col_max[j].sqrt();
                if (f - 1.0).abs() > SNAP_TOLERANCE {
                    moved = true;
                }
                col_scale[j] *= f;
            }
        }
        if !moved {
            break;
        }
    }

    // Snap near-unit factors so well-scaled problems pass through intact.
    for s in row_scale.iter_mut().chain(col_scale.iter_mut()) {
        if (*s - 1.0).abs() <= SNAP_TOLERANCE {
            *s = 1.0;
        }
    }

    // Power-of-two cost scaling bringing max |c| under 16.
    let max_cost = lp
        .col_cost
        .iter()
        .zip(&col_scale)
        .map(|(&c, &s)| (c * s).abs())
        .fold(0.0_f64, f64::max);
    let mut cost_scale = 1.0;
    while max_cost / cost_scale >= 16.0 {
        cost_scale *= 2.0;
    }

    let scaling = Scaling {
        col_scale,
        row_scale,
        cost_scale,
    };
    if scaling.is_identity() {
        return scaling;
    }

    // Rebuild the matrix with the scale factors applied.
    let mut tri = TriMat::new((m, n));
    for (j, col) in lp.a_matrix.outer_iterator().enumerate() {
        for (i, &v) in col.iter() {
            tri.add_triplet(i, j, v * scaling.row_scale[i] * scaling.col_scale[j]);
        }
    }
    lp.a_matrix = tri.to_csc();

    for j in 0..n {
        lp.col_cost[j] *= scaling.col_scale[j] / scaling.cost_scale;
        lp.col_lower[j] /= scaling.col_scale[j];
        lp.col_upper[j] /= scaling.col_scale[j];
    }
    for i in 0..m {
        lp.row_lower[i] *= scaling.row_scale[i];
        lp.row_upper[i] *= scaling.row_scale[i];
    }

    scaling
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{from_triplets, ObjSense};

    fn badly_scaled_lp() -> LpProblem {
        LpProblem {
            a_matrix: from_triplets(
                2,
                2,
                vec![(0, 0, 1e4), (0, 1, 2e4), (1, 0, 1e-3), (1, 1, 4e-3)],
            ),
            col_cost: vec![100.0, 1.0],
            col_lower: vec![0.0, 0.0],
            col_upper: vec![10.0, f64::INFINITY],
            row_lower: vec![f64::NEG_INFINITY; 2],
            row_upper: vec![1e4, 5.0],
            sense: ObjSense::Minimize,
            col_names: None,
            row_names: None,
        }
    }

    #[test]
    fn equilibration_flattens_entry_magnitudes() {
        let mut lp = badly_scaled_lp();
        let scaling = scale_lp(&mut lp);
        assert!(!scaling.is_identity());
        let mut max_abs = 0.0_f64;
        let mut min_abs = f64::INFINITY;
        for (_, col) in lp.a_matrix.outer_iterator().enumerate() {
            for (_, &v) in col.iter() {
                max_abs = max_abs.max(v.abs());
                min_abs = min_abs.min(v.abs());
            }
        }
        assert!(max_abs / min_abs < 1e3, "spread {}", max_abs / min_abs);
    }

    #[test]
    fn infinite_bounds_survive_scaling() {
        let mut lp = badly_scaled_lp();
        scale_lp(&mut lp);
        assert_eq!(lp.col_upper[1], f64::INFINITY);
        assert_eq!(lp.row_lower[0], f64::NEG_INFINITY);
    }

    #[test]
    fn unscaling_round_trips_primal_values() {
        let mut lp = badly_scaled_lp();
        let original = badly_scaled_lp();
        let scaling = scale_lp(&mut lp);
        // A feasible point in original coordinates
        let x = [2.0, 1.0];
        let x_scaled: Vec<f64> = (0..2).map(|j| x[j] / scaling.col_scale[j]).collect();
        for j in 0..2 {
            let back = scaling.unscale_col_value(j, x_scaled[j]);
            assert!((back - x[j]).abs() < 1e-12);
        }
        // Scaled objective maps back to the original objective
        let obj_scaled: f64 = (0..2).map(|j| lp.col_cost[j] * x_scaled[j]).sum();
        let obj: f64 = (0..2).map(|j| original.col_cost[j] * x[j]).sum();
        assert!((scaling.unscale_objective(obj_scaled) - obj).abs() < 1e-9);
    }

    #[test]
    fn well_scaled_lp_is_untouched() {
        let mut lp = LpProblem {
            a_matrix: from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, -1.0)]),
            col_cost: vec![1.0, 2.0],
            col_lower: vec![0.0; 2],
            col_upper: vec![1.0; 2],
            row_lower: vec![0.0],
            row_upper: vec![1.0],
            sense: ObjSense::Minimize,
            col_names: None,
            row_names: None,
        };
        let scaling = scale_lp(&mut lp);
        assert!(scaling.is_identity());
        assert_eq!(lp.col_cost, vec![1.0, 2.0]);
    }
}
