//! Tests for model construction, deletion and editing.

use super::*;
use crate::error::SketchError;
use crate::geometry::{Point3, Vector3};
use crate::ids::{DofId, PrimitiveId};
use pretty_assertions::assert_eq;
use std::f64::consts::FRAC_PI_2;

fn model_with_plane() -> (Model, PrimitiveId) {
    let mut model = Model::new();
    let plane = model.add_xy_plane().unwrap();
    (model, plane)
}

fn local(model: &Model, point: PrimitiveId) -> [f64; 2] {
    match model.geometry(point).unwrap() {
        Geometry::Point2D { local, .. } => local,
        other => panic!("expected a Point2D, got {:?}", other),
    }
}

fn arc_dofs(model: &Model, arc: PrimitiveId) -> (DofId, DofId, PrimitiveId, PrimitiveId) {
    match model.primitive(arc).unwrap().kind {
        PrimitiveKind::Arc2D {
            theta1,
            radius,
            point1,
            point2,
            ..
        } => (theta1, radius, point1, point2),
        ref other => panic!("expected an arc, got {:?}", other),
    }
}

#[test]
fn test_reference_plane_is_one_step() {
    let (model, plane) = model_with_plane();
    assert_eq!(model.log().len(), 1);
    match model.geometry(plane).unwrap() {
        Geometry::SketchPlane { coefficients, .. } => assert_eq!(coefficients, [0.0, 0.0, 1.0, 0.0]),
        other => panic!("expected a plane, got {:?}", other),
    }
}

#[test]
fn test_degenerate_plane_rejected_without_side_effects() {
    let mut model = Model::new();
    let normal = model.add_vector([0.0, 0.0, 1.0], false).unwrap();
    let up = model.add_vector([0.0, 1.0, 1.0], false).unwrap();
    let base = model.add_point([0.0, 0.0, 0.0], false).unwrap();
    let before = model.graph().clone();
    let logged = model.log().len();

    let err = model.add_sketch_plane(normal, up, base).unwrap_err();
    assert!(matches!(err, SketchError::DegenerateGeometry(_)));
    assert_eq!(model.graph(), &before);
    assert_eq!(model.log().len(), logged);

    let err = model
        .add_reference_plane(Point3::origin(), Vector3::zeros(), Vector3::y())
        .unwrap_err();
    assert!(matches!(err, SketchError::DegenerateGeometry(_)));
}

#[test]
fn test_line2d_shares_point_dofs() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();

    let (sa, ta) = model.graph().point2d_dofs(a).unwrap();
    let (sb, tb) = model.graph().point2d_dofs(b).unwrap();
    assert_eq!(model.primitive_dofs(line).unwrap(), vec![sa, ta, sb, tb]);
    assert_eq!(model.primitive_dependencies(line).unwrap(), vec![plane, a, b]);

    match model.geometry(line).unwrap() {
        Geometry::Line2D { length, .. } => assert!((length - 5.0).abs() < 1e-12),
        other => panic!("expected a line, got {:?}", other),
    }
}

#[test]
fn test_invalid_adds_are_rejected() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let before = model.graph().clone();
    let logged = model.log().len();

    assert!(matches!(model.add_line2d(a, a), Err(SketchError::DegenerateGeometry(_))));
    assert!(matches!(
        model.add_point2d(a, 1.0, 1.0, true),
        Err(SketchError::WrongKind { expected: "sketch_plane", .. })
    ));
    assert!(matches!(
        model.add_circle2d(plane, [0.0, 0.0], -1.0, true),
        Err(SketchError::DegenerateGeometry(_))
    ));
    assert!(matches!(
        model.add_distance_point2d(a, PrimitiveId(999), None),
        Err(SketchError::UnknownPrimitive(PrimitiveId(999)))
    ));
    assert_eq!(model.graph(), &before);
    assert_eq!(model.log().len(), logged);
}

#[test]
fn test_arc_endpoints_follow_arc_dofs() {
    let (mut model, plane) = model_with_plane();
    let arc = model.add_arc2d(plane, [1.0, 2.0], 2.0, 0.0, FRAC_PI_2, true).unwrap();
    let (_, radius, point1, point2) = arc_dofs(&model, arc);

    let start = local(&model, point1);
    assert!((start[0] - 3.0).abs() < 1e-12 && (start[1] - 2.0).abs() < 1e-12);
    let end = local(&model, point2);
    assert!((end[0] - 1.0).abs() < 1e-12 && (end[1] - 4.0).abs() < 1e-12);

    model.set_value(radius, 3.0).unwrap();
    let start = local(&model, point1);
    assert!((start[0] - 4.0).abs() < 1e-12);

    // Endpoint coordinates are computed, not assignable
    let (s, _) = model.graph().point2d_dofs(point1).unwrap();
    assert!(matches!(model.set_value(s, 0.0), Err(SketchError::NotIndependent(_))));
}

#[test]
fn test_three_point_arc_passes_through_mid() {
    let (mut model, plane) = model_with_plane();
    // Given clockwise, stored counter-clockwise
    let arc = model
        .add_arc2d_three_points(plane, [-1.0, 0.0], [0.0, 1.0], [1.0, 0.0])
        .unwrap();
    match model.geometry(arc).unwrap() {
        Geometry::Arc2D {
            center,
            radius,
            theta1,
            theta2,
            ..
        } => {
            assert!(center[0].abs() < 1e-12 && center[1].abs() < 1e-12);
            assert!((radius - 1.0).abs() < 1e-12);
            assert!(theta1.abs() < 1e-12);
            assert!((theta2 - std::f64::consts::PI).abs() < 1e-12);
        }
        other => panic!("expected an arc, got {:?}", other),
    }

    let err = model
        .add_circle2d_three_points(plane, [0.0, 0.0], [1.0, 1.0], [2.0, 2.0])
        .unwrap_err();
    assert!(matches!(err, SketchError::DegenerateGeometry(_)));
}

#[test]
fn test_circle_through_three_points() {
    let (mut model, plane) = model_with_plane();
    let circle = model
        .add_circle2d_three_points(plane, [1.0, 0.0], [0.0, 1.0], [-1.0, 0.0])
        .unwrap();
    match model.geometry(circle).unwrap() {
        Geometry::Circle2D { radius, .. } => assert!((radius - 1.0).abs() < 1e-12),
        other => panic!("expected a circle, got {:?}", other),
    }
    let generated = model.primitive(circle).unwrap().kind.generated();
    assert_eq!(generated.len(), 1);
}

#[test]
fn test_distance_defaults_to_current_value() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    let c = model.add_distance_point2d(a, b, None).unwrap();
    let dimension = model.constraint(c).unwrap().kind.value_dof().unwrap();
    assert!((model.value(dimension).unwrap() - 5.0).abs() < 1e-12);
    assert!(model.constraint_error(c).unwrap().abs() < 1e-12);

    let p = model.add_point2d(plane, 1.0, 3.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    let c = model.add_distance_point_line2d(p, line, None).unwrap();
    assert!(model.constraint_error(c).unwrap().abs() < 1e-9);

    assert!(matches!(
        model.add_distance_point2d(a, b, Some(-1.0)),
        Err(SketchError::InvalidValue(_))
    ));
}

#[test]
fn test_cascade_delete_is_one_undoable_step() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 1.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    let horizontal = model.add_hori_vert_line2d(line, false).unwrap();
    let distance = model.add_distance_point2d(a, b, Some(4.0)).unwrap();
    let before = model.graph().clone();
    let logged = model.log().len();

    model.delete_primitive(a).unwrap();
    assert_eq!(model.log().len(), logged + 1);
    assert!(!model.graph().contains_primitive(a));
    assert!(!model.graph().contains_primitive(line));
    assert!(!model.graph().contains_constraint(horizontal));
    assert!(!model.graph().contains_constraint(distance));
    assert!(model.graph().contains_primitive(b));
    assert!(model.graph().orphan_dofs().is_empty());

    model.undo().unwrap();
    assert_eq!(model.graph(), &before);
}

#[test]
fn test_delete_line_takes_hori_vert_constraint() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 1.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();
    let vertical = model.add_hori_vert_line2d(line, true).unwrap();
    let before = model.graph().clone();
    let point_dofs = [model.primitive_dofs(a).unwrap(), model.primitive_dofs(b).unwrap()];

    model.delete_primitive(line).unwrap();
    assert!(!model.graph().contains_primitive(line));
    assert!(!model.graph().contains_constraint(vertical));
    assert!(model.graph().contains_primitive(a));
    assert!(model.graph().contains_primitive(b));
    assert_eq!([model.primitive_dofs(a).unwrap(), model.primitive_dofs(b).unwrap()], point_dofs);
    assert!(model.graph().orphan_dofs().is_empty());
    let after = model.graph().clone();

    model.undo().unwrap();
    assert_eq!(model.graph(), &before);
    assert!(model.graph().contains_constraint(vertical));
    model.redo().unwrap();
    assert_eq!(model.graph(), &after);
}

#[test]
fn test_delete_arc_takes_generated_points() {
    let (mut model, plane) = model_with_plane();
    let arc = model.add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, FRAC_PI_2, true).unwrap();
    let (_, _, point1, _) = arc_dofs(&model, arc);
    let generated = model.primitive(arc).unwrap().kind.generated();
    let other = model.add_point2d(plane, 5.0, 5.0, true).unwrap();
    let line = model.add_line2d(point1, other).unwrap();

    model.delete_primitive(arc).unwrap();
    assert!(!model.graph().contains_primitive(line), "Line on an arc endpoint goes with it");
    for point in generated {
        assert!(!model.graph().contains_primitive(point));
    }
    assert!(model.graph().contains_primitive(other));
    // Plane vectors and base point, plus the remaining point
    assert_eq!(model.graph().dofs().len(), 9 + 2);
}

#[test]
fn test_delete_constraint_keeps_geometry() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 1.0, 1.0, true).unwrap();
    let c = model.add_distance_point2d(a, b, Some(2.0)).unwrap();
    let dofs = model.graph().dofs().len();
    model.delete_constraint(c).unwrap();
    assert!(model.graph().contains_primitive(a) && model.graph().contains_primitive(b));
    assert_eq!(model.graph().dofs().len(), dofs - 3, "Distance and label DOFs are dropped");
    assert!(matches!(model.delete_constraint(c), Err(SketchError::UnknownConstraint(_))));
}

#[test]
fn test_replace_dof_rejects_cycles() {
    let (mut model, plane) = model_with_plane();
    let arc = model.add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, FRAC_PI_2, true).unwrap();
    let (theta1, _, point1, _) = arc_dofs(&model, arc);
    let (s, _) = model.graph().point2d_dofs(point1).unwrap();
    let before = model.graph().clone();

    let err = model.replace_dof(theta1, s).unwrap_err();
    assert!(matches!(err, SketchError::CyclicDependency { .. }));
    assert_eq!(model.graph(), &before);
}

#[test]
fn test_merge_points_connects_lines() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 1.0, 0.0, true).unwrap();
    let c = model.add_point2d(plane, 1.0, 0.0, true).unwrap();
    let d = model.add_point2d(plane, 2.0, 1.0, true).unwrap();
    let first = model.add_line2d(a, b).unwrap();
    let second = model.add_line2d(c, d).unwrap();
    assert!(!model
        .graph()
        .endpoints_coincide((first, EdgeEnd::Point2), (second, EdgeEnd::Point1))
        .unwrap());

    let kept = model.merge_points(b, c).unwrap();
    assert_eq!(kept, b);
    assert!(model
        .graph()
        .endpoints_coincide((first, EdgeEnd::Point2), (second, EdgeEnd::Point1))
        .unwrap());
    assert!(model.graph().orphan_dofs().is_empty());

    model.undo().unwrap();
    assert!(!model
        .graph()
        .endpoints_coincide((first, EdgeEnd::Point2), (second, EdgeEnd::Point1))
        .unwrap());
}

#[test]
fn test_merge_keeps_computed_arc_end() {
    let (mut model, plane) = model_with_plane();
    let arc = model.add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, FRAC_PI_2, true).unwrap();
    let (_, _, point1, _) = arc_dofs(&model, arc);
    let loose = model.add_point2d(plane, 1.0, 0.0, true).unwrap();

    let kept = model.merge_points(loose, point1).unwrap();
    assert_eq!(kept, point1);
    assert!(!model.graph().contains_primitive(loose), "Unreferenced duplicate is removed");
}

#[test]
fn test_weight_and_suppression_edits() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 1.0, 1.0, true).unwrap();
    let c = model.add_distance_point2d(a, b, None).unwrap();
    assert_eq!(model.constraint(c).unwrap().weight, DEFAULT_WEIGHT);

    assert!(matches!(model.set_weight(c, 0.0), Err(SketchError::InvalidValue(_))));
    assert!(matches!(model.set_weight(c, f64::NAN), Err(SketchError::InvalidValue(_))));
    model.set_weight(c, 2.5).unwrap();
    model.set_suppressed(c, true).unwrap();
    assert_eq!(model.constraint(c).unwrap().weight, 2.5);
    assert!(!model.constraint(c).unwrap().is_active());

    model.undo().unwrap();
    assert!(model.constraint(c).unwrap().is_active());
    model.undo().unwrap();
    assert_eq!(model.constraint(c).unwrap().weight, DEFAULT_WEIGHT);
}

#[test]
fn test_labels_and_dimensions() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    let c = model.add_distance_point2d(a, b, None).unwrap();
    let labels = model.constraint(c).unwrap().kind.label_dofs();

    model.move_label(labels[0], 0.75).unwrap();
    assert_eq!(model.value(labels[0]).unwrap(), 0.75);
    let (s, _) = model.graph().point2d_dofs(a).unwrap();
    assert!(matches!(model.move_label(s, 1.0), Err(SketchError::InvalidValue(_))));

    model.set_dimension(c, 7.0).unwrap();
    let dimension = model.constraint(c).unwrap().kind.value_dof().unwrap();
    assert_eq!(model.value(dimension).unwrap(), 7.0);
    assert!((model.constraint_error(c).unwrap() + 2.0).abs() < 1e-12);
}

#[test]
fn test_select_by_mask() {
    let (mut model, plane) = model_with_plane();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 1.0, 0.0, true).unwrap();
    let line = model.add_line2d(a, b).unwrap();

    let (edges, constraints) = model.select(SelectionMask::EDGE);
    assert_eq!(edges, vec![line]);
    assert!(constraints.is_empty());

    // Base point of the plane plus the two sketch points
    let (points, _) = model.select(SelectionMask::POINT);
    assert_eq!(points.len(), 3);

    let c = model.add_hori_vert_line2d(line, false).unwrap();
    let (_, constraints) = model.select(SelectionMask::CONSTRAINT | SelectionMask::EDGE);
    assert_eq!(constraints, vec![c]);
}

#[test]
fn test_nested_transaction_is_single_entry() {
    let (mut model, plane) = model_with_plane();
    let logged = model.log().len();
    let line = model
        .transaction("Rectangle side", |m| m.add_line2d_from(plane, [0.0, 0.0], [2.0, 0.0]))
        .unwrap();
    assert_eq!(model.log().len(), logged + 1);
    assert_eq!(model.log().entries()[logged].description, "Rectangle side");

    model.undo().unwrap();
    assert!(!model.graph().contains_primitive(line));
}
