//! End-to-end tests for the dual simplex engine.
//!
//! Literal LPs covering the optimal, infeasible, unbounded, degenerate,
//! warm-started and parallel cases, plus feasibility checks on everything
//! the engine reports optimal.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simplex_core::problem::from_triplets;
use simplex_core::{
    solve, LpProblem, ObjSense, SimplexSettings, SimplexStrategy, SolveResult, SolveStatus,
};

const INF: f64 = f64::INFINITY;

fn lp(
    m: usize,
    n: usize,
    triplets: Vec<(usize, usize, f64)>,
    cost: Vec<f64>,
    col_bounds: Vec<(f64, f64)>,
    row_bounds: Vec<(f64, f64)>,
) -> LpProblem {
    LpProblem {
        a_matrix: from_triplets(m, n, triplets),
        col_cost: cost,
        col_lower: col_bounds.iter().map(|b| b.0).collect(),
        col_upper: col_bounds.iter().map(|b| b.1).collect(),
        row_lower: row_bounds.iter().map(|b| b.0).collect(),
        row_upper: row_bounds.iter().map(|b| b.1).collect(),
        sense: ObjSense::Minimize,
        col_names: None,
        row_names: None,
    }
}

/// The reported solution must satisfy bounds and row activities, and the
/// reported objective must match the reported values.
fn assert_solution_consistent(problem: &LpProblem, result: &SolveResult) {
    let tol = 1e-6;
    for j in 0..problem.num_col() {
        let x = result.solution.col_value[j];
        assert!(
            x >= problem.col_lower[j] - tol && x <= problem.col_upper[j] + tol,
            "column {} value {} outside [{}, {}]",
            j,
            x,
            problem.col_lower[j],
            problem.col_upper[j]
        );
    }
    let mut activity = vec![0.0; problem.num_row()];
    for (j, col) in problem.a_matrix.outer_iterator().enumerate() {
        for (i, &v) in col.iter() {
            activity[i] += v * result.solution.col_value[j];
        }
    }
    for i in 0..problem.num_row() {
        assert!(
            activity[i] >= problem.row_lower[i] - tol
                && activity[i] <= problem.row_upper[i] + tol,
            "row {} activity {} outside [{}, {}]",
            i,
            activity[i],
            problem.row_lower[i],
            problem.row_upper[i]
        );
        assert!(
            (activity[i] - result.solution.row_value[i]).abs() < 1e-6,
            "row {} reported activity {} vs recomputed {}",
            i,
            result.solution.row_value[i],
            activity[i]
        );
    }
    let objective: f64 = problem
        .col_cost
        .iter()
        .zip(&result.solution.col_value)
        .map(|(&c, &x)| c * x)
        .sum();
    assert!(
        (objective - result.objective).abs() < 1e-6,
        "objective {} vs recomputed {}",
        result.objective,
        objective
    );
}

#[test]
fn canonical_lp_reaches_optimum() {
    // min -x1 - x2  s.t.  0 <= x1 + x2 + x3 <= 2,  x >= 0
    // Optimal objective -2 at x = (2,0,0) or (0,2,0).
    let problem = lp(
        1,
        3,
        vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)],
        vec![-1.0, -1.0, 0.0],
        vec![(0.0, INF); 3],
        vec![(0.0, 2.0)],
    );
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Optimal);
    assert!((result.objective + 2.0).abs() < 1e-7, "obj {}", result.objective);
    assert_solution_consistent(&problem, &result);
    // The active row has dual -1: d_1 = c_1 - y = 0.
    assert!((result.solution.row_dual[0] + 1.0).abs() < 1e-6);
}

#[test]
fn box_against_equality_is_infeasible() {
    // x = 2 forced by the row, x <= 1 by the column box.
    let problem = lp(
        1,
        1,
        vec![(0, 0, 1.0)],
        vec![0.0],
        vec![(0.0, 1.0)],
        vec![(2.0, 2.0)],
    );
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Infeasible);
}

#[test]
fn free_fall_is_unbounded() {
    // min -x  s.t.  x >= 10: the ratio test finds no candidate.
    let problem = lp(
        1,
        1,
        vec![(0, 0, 1.0)],
        vec![-1.0],
        vec![(0.0, INF)],
        vec![(10.0, INF)],
    );
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Unbounded);
}

#[test]
fn degenerate_identity_terminates_quickly() {
    // Identity constraints with coinciding row and column bounds: heavily
    // degenerate, must not cycle.
    let m = 3;
    let triplets: Vec<(usize, usize, f64)> = (0..m).map(|i| (i, i, 1.0)).collect();
    let problem = lp(
        m,
        m,
        triplets,
        vec![-1.0; m],
        vec![(0.0, 1.0); m],
        vec![(0.0, 1.0); m],
    );
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Optimal);
    assert!((result.objective + 3.0).abs() < 1e-7);
    assert!(
        result.info.iteration_count <= m * m,
        "took {} iterations, budget {}",
        result.info.iteration_count,
        m * m
    );
    assert_solution_consistent(&problem, &result);
}

#[test]
fn warm_start_reoptimises_in_few_iterations() {
    let make = |c1: f64| {
        lp(
            3,
            3,
            vec![
                (0, 0, 1.0),
                (0, 1, 1.0),
                (1, 1, 1.0),
                (1, 2, 1.0),
                (2, 0, 1.0),
                (2, 2, 1.0),
            ],
            vec![c1, -2.0, -1.0],
            vec![(0.0, 10.0); 3],
            vec![(-INF, 4.0), (-INF, 3.0), (-INF, 5.0)],
        )
    };
    // Warm solves run unperturbed, as a caller re-solving would.
    let mut settings = SimplexSettings::default();
    settings.perturb_costs = false;

    let problem = make(-1.0);
    let first = solve(&problem, &settings).unwrap();
    assert_eq!(first.status, SolveStatus::Optimal);

    // Nudge one cost and re-solve from the optimal basis.
    let perturbed = make(-1.0 + 1e-7);
    let settings = settings.with_warm_start(first.basis.clone());
    let second = solve(&perturbed, &settings).unwrap();
    assert_eq!(second.status, SolveStatus::Optimal);
    assert!(
        second.info.iteration_count <= 3,
        "warm start took {} iterations",
        second.info.iteration_count
    );
    assert!((first.objective - second.objective).abs() < 1e-5);
}

#[test]
fn maximisation_negates_consistently() {
    // max x1 + x2 under the canonical constraint: optimum +2.
    let mut problem = lp(
        1,
        3,
        vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)],
        vec![1.0, 1.0, 0.0],
        vec![(0.0, INF); 3],
        vec![(0.0, 2.0)],
    );
    problem.sense = ObjSense::Maximize;
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Optimal);
    assert!((result.objective - 2.0).abs() < 1e-7);
}

#[test]
fn bound_flips_solve_box_lp_without_pivots() {
    // Pure box LP: every variable just flips to its profitable bound.
    let problem = lp(
        2,
        4,
        vec![(0, 0, 1.0), (0, 1, 1.0), (1, 2, 1.0), (1, 3, 1.0)],
        vec![-1.0, 2.0, -3.0, 0.5],
        vec![(0.0, 1.0); 4],
        vec![(-INF, 10.0); 2],
    );
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Optimal);
    assert!((result.objective + 4.0).abs() < 1e-7);
    assert_solution_consistent(&problem, &result);
}

fn random_lp(seed: u64, m: usize, n: usize) -> LpProblem {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut triplets = Vec::new();
    for j in 0..n {
        // A handful of entries per column, at least one.
        let nnz = rng.gen_range(1..=5);
        for _ in 0..nnz {
            let i = rng.gen_range(0..m);
            triplets.push((i, j, rng.gen_range(0.1..1.0)));
        }
    }
    let cost: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let row_bounds: Vec<(f64, f64)> = (0..m)
        .map(|_| (-INF, rng.gen_range(5.0..50.0)))
        .collect();
    lp(m, n, triplets, cost, vec![(0.0, 10.0); n], row_bounds)
}

#[test]
fn iteration_limit_preserves_a_result() {
    let problem = random_lp(7, 20, 80);
    let settings = SimplexSettings::default().with_iteration_limit(3);
    let result = solve(&problem, &settings).unwrap();
    assert_eq!(result.status, SolveStatus::IterationLimit);
    assert_eq!(result.basis.col_status.len(), 80);
    assert_eq!(result.basis.row_status.len(), 20);
}

#[test]
fn strategies_agree_on_medium_random_lp() {
    let problem = random_lp(11, 30, 120);
    let serial = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(serial.status, SolveStatus::Optimal);
    assert_solution_consistent(&problem, &serial);

    for strategy in [SimplexStrategy::Sip, SimplexStrategy::Pami] {
        let mut settings = SimplexSettings::default();
        settings.simplex_strategy = strategy;
        let other = solve(&problem, &settings).unwrap();
        assert_eq!(other.status, SolveStatus::Optimal, "{:?}", strategy);
        let denom = serial.objective.abs().max(1.0);
        assert!(
            (other.objective - serial.objective).abs() / denom < 1e-7,
            "{:?}: {} vs {}",
            strategy,
            other.objective,
            serial.objective
        );
    }
}

#[test]
fn pami_matches_serial_on_large_random_lp() {
    let problem = random_lp(42, 100, 1000);
    let serial = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(serial.status, SolveStatus::Optimal);
    assert_solution_consistent(&problem, &serial);

    let mut settings = SimplexSettings::default();
    settings.simplex_strategy = SimplexStrategy::Pami;
    let pami = solve(&problem, &settings).unwrap();
    assert_eq!(pami.status, SolveStatus::Optimal);
    assert_solution_consistent(&problem, &pami);

    let denom = serial.objective.abs().max(1.0);
    assert!(
        (pami.objective - serial.objective).abs() / denom < 1e-7,
        "serial {} vs PAMI {}",
        serial.objective,
        pami.objective
    );
}

#[test]
fn dual_signs_match_basis_at_optimum() {
    let problem = random_lp(5, 15, 60);
    let result = solve(&problem, &SimplexSettings::default()).unwrap();
    assert_eq!(result.status, SolveStatus::Optimal);
    for j in 0..problem.num_col() {
        let dual = result.solution.col_dual[j];
        match result.basis.col_status[j] {
            simplex_core::BasisStatus::Lower => {
                assert!(dual > -1e-5, "column {} at lower with dual {}", j, dual)
            }
            simplex_core::BasisStatus::Upper => {
                assert!(dual < 1e-5, "column {} at upper with dual {}", j, dual)
            }
            simplex_core::BasisStatus::Basic => {
                assert!(dual.abs() < 1e-5, "basic column {} with dual {}", j, dual)
            }
            _ => {}
        }
    }
}

#[test]
fn unscaled_solve_matches_scaled() {
    let problem = random_lp(13, 25, 100);
    let scaled = solve(&problem, &SimplexSettings::default()).unwrap();
    let mut settings = SimplexSettings::default();
    settings.scale = false;
    let unscaled = solve(&problem, &settings).unwrap();
    assert_eq!(scaled.status, SolveStatus::Optimal);
    assert_eq!(unscaled.status, SolveStatus::Optimal);
    let denom = scaled.objective.abs().max(1.0);
    assert!((scaled.objective - unscaled.objective).abs() / denom < 1e-6);
}
