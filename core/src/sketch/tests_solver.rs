//! Solver behaviour on small sketches.

use super::*;
use crate::error::SketchError;
use crate::ids::PrimitiveId;
use std::f64::consts::FRAC_PI_2;

fn plane() -> (Model, PrimitiveId) {
    let mut model = Model::new();
    let plane = model.add_xy_plane().unwrap();
    (model, plane)
}

fn coords(model: &Model, point: PrimitiveId) -> [f64; 2] {
    query::point2d(model.graph(), point).unwrap()
}

#[test]
fn test_distance_constraint_moves_free_point() {
    let (mut model, plane) = plane();
    let fixed = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let free = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    model.add_distance_point2d(fixed, free, Some(10.0)).unwrap();

    let report = model.solve().unwrap();
    assert_eq!(report.status, SolveStatus::Converged);
    assert_eq!(report.free_dofs, 2);
    assert!(report.unsatisfied.is_empty());

    let [s, t] = coords(&model, free);
    assert!(((s * s + t * t).sqrt() - 10.0).abs() < 1e-8);
    // Fixed point untouched, bit for bit
    assert_eq!(coords(&model, fixed), [0.0, 0.0]);
}

#[test]
fn test_solve_is_idempotent() {
    let (mut model, plane) = plane();
    let fixed = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let free = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    model.add_distance_point2d(fixed, free, Some(10.0)).unwrap();
    model.solve().unwrap();
    let solved = model.graph().clone();

    let report = model.solve().unwrap();
    assert_eq!(report.iterations, 0);
    assert_eq!(model.graph(), &solved);
}

#[test]
fn test_horizontal_only_moves_t() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 3.0, 1.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    model.add_hori_vert_line2d(line, false).unwrap();

    assert!(model.solve().unwrap().is_converged());
    let [s, t] = coords(&model, b);
    assert!((s - 3.0).abs() < 1e-12);
    assert!(t.abs() < 1e-10);
}

#[test]
fn test_vertical_line() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 0.5, 2.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    model.add_hori_vert_line2d(line, true).unwrap();

    assert!(model.solve().unwrap().is_converged());
    assert!(coords(&model, b)[0].abs() < 1e-10);
}

#[test]
fn test_no_free_dofs_reports_failure() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, false).unwrap();
    model.add_distance_point2d(a, b, Some(10.0)).unwrap();
    let before = model.graph().clone();

    let report = model.solve().unwrap();
    assert_eq!(report.status, SolveStatus::DidNotConverge);
    assert_eq!(report.free_dofs, 0);
    assert_eq!(report.unsatisfied.len(), 1);
    assert_eq!(model.graph(), &before);
    assert!(matches!(report.into_result(), Err(SketchError::DidNotConverge { .. })));
}

#[test]
fn test_cancelled_before_first_iteration() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    model.add_distance_point2d(a, b, Some(10.0)).unwrap();
    let before = model.graph().clone();

    let token = CancelToken::new();
    token.cancel();
    let report = model.solve_with(&SolverConfig::default(), &token).unwrap();
    assert_eq!(report.status, SolveStatus::Cancelled);
    assert_eq!(report.iterations, 0);
    assert_eq!(model.graph(), &before);
    assert!(matches!(report.into_result(), Err(SketchError::Cancelled { iterations: 0 })));
}

#[test]
fn test_suppressed_constraint_is_ignored() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    let c = model.add_distance_point2d(a, b, Some(10.0)).unwrap();
    model.set_suppressed(c, true).unwrap();

    let report = model.solve().unwrap();
    assert!(report.is_converged());
    assert_eq!(report.active_constraints, 0);
    assert_eq!(coords(&model, b), [3.0, 4.0]);
}

#[test]
fn test_weights_resolve_conflicts() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    model.add_distance_point2d(a, b, Some(4.0)).unwrap();
    let heavy = model.add_distance_point2d(a, b, Some(6.0)).unwrap();
    model.set_weight(heavy, 3.0).unwrap();

    let report = model.solve().unwrap();
    assert_ne!(report.status, SolveStatus::Cancelled);
    let [s, t] = coords(&model, b);
    // Minimises (d - 4)² + 3 (d - 6)²
    assert!(((s * s + t * t).sqrt() - 5.5).abs() < 1e-6);
    assert!(report.residual_norm > 0.1);
}

#[test]
fn test_right_angle() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 1.0, 0.0, false).unwrap();
    let c = model.add_point2d(plane, 1.0, 1.0, true).unwrap();
    let first = model.add_line2d(a, b).unwrap();
    let second = model.add_line2d(a, c).unwrap();
    let angle = model.add_angle_line2d(first, second, FRAC_PI_2, true).unwrap();

    assert!(model.solve().unwrap().is_converged());
    assert!(model.constraint_error(angle).unwrap().abs() < 1e-9);
    assert!(coords(&model, c)[0].abs() < 1e-6);
}

#[test]
fn test_parallel_lines() {
    let (mut model, plane) = plane();
    let first = model.add_line2d_from(plane, [0.0, 0.0], [2.0, 0.0]).unwrap();
    let (p1, p2, _) = model.graph().line2d(first).unwrap();
    model.set_point_free(p1, false).unwrap();
    model.set_point_free(p2, false).unwrap();
    let second = model.add_line2d_from(plane, [0.0, 1.0], [2.0, 1.5]).unwrap();
    let parallel = model.add_parallel_line2d(first, second).unwrap();
    assert!(model.constraint_error(parallel).unwrap().abs() > 1e-3);

    // cos² - 1 is flat at the solution, so convergence is only linear
    model.solve().unwrap();
    assert!(model.constraint_error(parallel).unwrap().abs() < 1e-6);
}

#[test]
fn test_line_tangent_to_arc() {
    let (mut model, plane) = plane();
    let arc = model
        .add_arc2d(plane, [1.0, 1.0], 1.0, -FRAC_PI_2, 0.0, false)
        .unwrap();
    let start = model.graph().edge_endpoint(arc, EdgeEnd::Point1).unwrap();
    let free = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let line = model.add_line2d(free, start).unwrap();
    let tangent = model
        .add_tangent_edge2d(line, EdgeEnd::Point2, arc, EdgeEnd::Point1)
        .unwrap();
    assert!(model.constraint_error(tangent).unwrap().abs() < 1e-12);

    // Tilt the line, then let the solver straighten it
    let (_, t) = model.graph().point2d_dofs(free).unwrap();
    model.set_value(t, -1.0).unwrap();
    assert!((model.constraint_error(tangent).unwrap() + 0.5).abs() < 1e-12);
    model.solve().unwrap();
    assert!(model.constraint_error(tangent).unwrap().abs() < 1e-6);
}

#[test]
fn test_point_line_distance() {
    let (mut model, plane) = plane();
    let a = model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let b = model.add_point2d(plane, 4.0, 0.0, false).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    let p = model.add_point2d(plane, 2.0, 1.0, true).unwrap();
    model.add_distance_point_line2d(p, line, Some(3.0)).unwrap();

    assert!(model.solve().unwrap().is_converged());
    assert!((coords(&model, p)[1].abs() - 3.0).abs() < 1e-8);
}

#[test]
fn test_free_variables_skip_fixed_and_dependent() {
    let (mut model, plane) = plane();
    model.add_point2d(plane, 0.0, 0.0, false).unwrap();
    let free = model.add_point2d(plane, 1.0, 0.0, true).unwrap();
    model.add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, 1.0, false).unwrap();

    let (s, t) = model.graph().point2d_dofs(free).unwrap();
    assert_eq!(SketchSolver::free_variables(model.graph()).unwrap(), vec![s, t]);
}
