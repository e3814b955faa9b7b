use crate::core::models::frame::FrameData;
use crate::core::models::property::StandardProperty;
use nalgebra::{Point3, Vector3};

/// Whether every particle position lies within `[lo, hi]` on all three axes.
///
/// Returns `false` for frames without positions or without particles.
pub fn positions_within(frame: &FrameData, lo: f64, hi: f64) -> bool {
    let Some(values) = frame
        .standard_particle_property(StandardProperty::Position)
        .and_then(|p| p.as_float())
    else {
        return false;
    };
    !values.is_empty() && values.iter().all(|&v| (lo..=hi).contains(&v))
}

/// Converts positions from reduced to absolute coordinates using the frame's
/// cell, after adding `offset` to every reduced component.
pub fn rescale_reduced_positions(frame: &mut FrameData, offset: f64) {
    let cell = frame.cell.clone();
    let shift = Vector3::repeat(offset);
    let Some(values) = frame
        .particle_property_mut(&StandardProperty::Position.into())
        .and_then(|p| p.as_float_mut())
    else {
        return;
    };
    for chunk in values.chunks_exact_mut(3) {
        let reduced = Point3::new(chunk[0], chunk[1], chunk[2]) + shift;
        let absolute = cell.reduced_to_absolute(&reduced);
        chunk.copy_from_slice(absolute.coords.as_slice());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cell::SimulationCell;
    use crate::core::models::property::TypedPropertyArray;

    fn frame_with_positions(points: &[Point3<f64>]) -> FrameData {
        let mut frame = FrameData::new();
        frame.cell = SimulationCell::from_bounds([1.0; 3], [11.0; 3], [true; 3]);
        frame.add_particle_property(TypedPropertyArray::from_points(StandardProperty::Position, points));
        frame
    }

    #[test]
    fn positions_within_checks_every_component() {
        let frame = frame_with_positions(&[Point3::new(0.0, 0.5, 1.0), Point3::new(0.2, 0.2, 1.01)]);
        assert!(positions_within(&frame, -0.02, 1.02));
        assert!(!positions_within(&frame, -0.01, 1.0));
        assert!(!positions_within(&FrameData::new(), 0.0, 1.0));
    }

    #[test]
    fn rescale_applies_cell_matrix_and_origin() {
        let mut frame = frame_with_positions(&[Point3::new(0.5, 0.0, 1.0)]);
        rescale_reduced_positions(&mut frame, 0.0);
        let p = frame
            .standard_particle_property(StandardProperty::Position)
            .unwrap()
            .to_points()
            .unwrap()[0];
        assert!((p - Point3::new(6.0, 1.0, 11.0)).norm() < 1e-12);
    }

    #[test]
    fn rescale_with_offset_recenters_symmetric_coordinates() {
        let mut frame = frame_with_positions(&[Point3::new(-0.5, 0.0, 0.5)]);
        rescale_reduced_positions(&mut frame, 0.5);
        let p = frame
            .standard_particle_property(StandardProperty::Position)
            .unwrap()
            .to_points()
            .unwrap()[0];
        assert!((p - Point3::new(1.0, 6.0, 11.0)).norm() < 1e-12);
    }
}
