//! Edge loop validation.

use super::*;
use crate::ids::PrimitiveId;

struct Triangle {
    model: Model,
    plane: PrimitiveId,
    a: PrimitiveId,
    edges: [PrimitiveId; 3],
}

fn triangle() -> Triangle {
    let mut model = Model::new();
    let plane = model.add_xy_plane().unwrap();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 4.0, 0.0, true).unwrap();
    let c = model.add_point2d(plane, 0.0, 3.0, true).unwrap();
    let edges = [
        model.add_line2d(a, b).unwrap(),
        model.add_line2d(b, c).unwrap(),
        model.add_line2d(c, a).unwrap(),
    ];
    Triangle { model, plane, a, edges }
}

#[test]
fn test_triangle_is_valid_in_any_rotation() {
    let t = triangle();
    assert!(t.model.is_loop_valid(&t.edges));
    let [e1, e2, e3] = t.edges;
    assert!(t.model.is_loop_valid(&[e2, e3, e1]));
    // Reversed traversal still shares endpoints pairwise
    assert!(t.model.is_loop_valid(&[e3, e2, e1]));
}

#[test]
fn test_equal_values_are_not_connected() {
    let mut t = triangle();
    let [e1, e2, _] = t.edges;
    let (_, c, _) = t.model.graph().line2d(e2).unwrap();
    // Same coordinates as `a`, different DOFs
    let twin = t.model.add_point2d(t.plane, 0.0, 0.0, true).unwrap();
    let closing = t.model.add_line2d(c, twin).unwrap();

    let edge_loop = EdgeLoop::new(vec![e1, e2, closing]);
    assert_eq!(edge_loop.check(t.model.graph()), Err(LoopDefect::Gap(2)));

    t.model.merge_points(t.a, twin).unwrap();
    assert!(edge_loop.is_loop_valid(t.model.graph()));
}

#[test]
fn test_structural_defects() {
    let mut t = triangle();
    let [e1, e2, _] = t.edges;
    let graph = t.model.graph();
    assert_eq!(EdgeLoop::new(vec![e1]).check(graph), Err(LoopDefect::TooFewEdges));
    assert_eq!(
        EdgeLoop::new(vec![e1, e2, e1]).check(graph),
        Err(LoopDefect::DuplicateEdge(e1))
    );
    assert_eq!(
        EdgeLoop::new(vec![e1, t.a]).check(graph),
        Err(LoopDefect::NotAnEdge(t.a))
    );

    let circle = t.model.add_circle2d(t.plane, [0.0, 0.0], 1.0, true).unwrap();
    assert!(!t.model.is_loop_valid(&[e1, circle]));
}

#[test]
fn test_arc_closed_by_line() {
    let mut model = Model::new();
    let plane = model.add_xy_plane().unwrap();
    let arc = model
        .add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, std::f64::consts::PI, true)
        .unwrap();
    let start = model.graph().edge_endpoint(arc, EdgeEnd::Point1).unwrap();
    let end = model.graph().edge_endpoint(arc, EdgeEnd::Point2).unwrap();
    let chord = model.add_line2d(end, start).unwrap();

    assert!(model.is_loop_valid(&[arc, chord]));

    model.delete_primitive(chord).unwrap();
    let loose = model.add_line2d_from(plane, [-1.0, 0.0], [1.0, 0.0]).unwrap();
    assert!(!model.is_loop_valid(&[arc, loose]));
}
