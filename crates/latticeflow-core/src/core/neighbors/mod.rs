//! Spatial neighbor queries over periodic and non-periodic simulation cells.
//!
//! Both finders sort particles into a uniform grid laid over reduced cell
//! coordinates. Periodic axes wrap toroidally; non-periodic axes span the
//! larger of the cell and the particle cloud. Displacements always follow the
//! minimum-image convention: the reduced delta is rounded to the nearest
//! periodic image and transformed back through the cell matrix, and the image
//! shift is reported alongside each neighbor.

pub mod cutoff;
pub mod nearest;

use crate::core::models::cell::SimulationCell;
use crate::engine::task::Cancellation;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NeighborError {
    #[error("Invalid neighbor query: {0}")]
    Configuration(String),

    #[error("Operation canceled")]
    Canceled,
}

impl Cancellation for NeighborError {
    fn is_cancellation(&self) -> bool {
        matches!(self, NeighborError::Canceled)
    }
}

/// A neighbor of a query particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    /// Vector from the query particle to the neighbor's nearest image.
    pub delta: Vector3<f64>,
    pub distance_sq: f64,
    /// Periodic image of the neighbor that `delta` points to.
    pub pbc_shift: Vector3<i32>,
}

const DEGENERACY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub(crate) struct BinGrid {
    cell: SimulationCell,
    reduced: Vec<Vector3<f64>>,
    bins: [usize; 3],
    lo: [f64; 3],
    span: [f64; 3],
    /// Absolute extent covered by the grid along each axis.
    extents: [f64; 3],
    bin_starts: Vec<usize>,
    bin_members: Vec<usize>,
    selected_count: usize,
}

impl BinGrid {
    /// Builds the grid. `choose_bins` receives the absolute extent of the grid
    /// along each axis and returns the number of bins per axis.
    pub(crate) fn new(
        cell: &SimulationCell,
        positions: &[Point3<f64>],
        selection: Option<&[bool]>,
        choose_bins: impl FnOnce([f64; 3]) -> [usize; 3],
    ) -> Result<Self, NeighborError> {
        if let Some(selection) = selection {
            if selection.len() != positions.len() {
                return Err(NeighborError::Configuration(format!(
                    "selection has {} entries but there are {} particles",
                    selection.len(),
                    positions.len()
                )));
            }
        }
        let inverse = cell
            .inverse_matrix()
            .filter(|_| cell.matrix().determinant().abs() > DEGENERACY_EPSILON)
            .ok_or_else(|| NeighborError::Configuration("simulation cell is degenerate".to_string()))?;

        let is_selected = |i: usize| selection.is_none_or(|s| s[i]);
        let reduced: Vec<Vector3<f64>> = positions.iter().map(|p| inverse * (p - cell.origin())).collect();
        let pbc = cell.pbc();

        let mut lo = [0.0; 3];
        let mut span = [1.0; 3];
        for axis in 0..3 {
            if pbc[axis] {
                continue;
            }
            let (min, max) = reduced
                .iter()
                .enumerate()
                .filter(|(i, r)| is_selected(*i) && r[axis].is_finite())
                .fold((0.0f64, 1.0f64), |(min, max), (_, r)| (min.min(r[axis]), max.max(r[axis])));
            lo[axis] = min;
            span[axis] = max - min;
        }

        let widths = cell.perpendicular_widths();
        let extents = [widths[0] * span[0], widths[1] * span[1], widths[2] * span[2]];
        let bins = choose_bins(extents).map(|n| n.max(1));

        let mut grid = Self {
            cell: cell.clone(),
            reduced,
            bins,
            lo,
            span,
            extents,
            bin_starts: Vec::new(),
            bin_members: Vec::new(),
            selected_count: 0,
        };
        grid.fill(is_selected);
        Ok(grid)
    }

    fn fill(&mut self, is_selected: impl Fn(usize) -> bool) {
        let total = self.bin_count();
        let mut counts = vec![0usize; total + 1];
        let assignments: Vec<Option<usize>> = (0..self.reduced.len())
            .map(|i| is_selected(i).then(|| self.linear(self.bin_coords(&self.reduced[i]))))
            .collect();
        for bin in assignments.iter().flatten() {
            counts[bin + 1] += 1;
        }
        for b in 0..total {
            counts[b + 1] += counts[b];
        }
        let mut cursor = counts.clone();
        let mut members = vec![0usize; counts[total]];
        for (particle, bin) in assignments.iter().enumerate() {
            if let Some(bin) = *bin {
                members[cursor[bin]] = particle;
                cursor[bin] += 1;
            }
        }
        self.selected_count = members.len();
        self.bin_starts = counts;
        self.bin_members = members;
    }

    pub(crate) fn bins(&self) -> [usize; 3] {
        self.bins
    }

    pub(crate) fn bin_count(&self) -> usize {
        self.bins.iter().product()
    }

    pub(crate) fn pbc(&self) -> [bool; 3] {
        self.cell.pbc()
    }

    pub(crate) fn selected_count(&self) -> usize {
        self.selected_count
    }

    pub(crate) fn particle_count(&self) -> usize {
        self.reduced.len()
    }

    /// Smallest distance between opposite faces of a single bin.
    pub(crate) fn min_bin_width(&self) -> f64 {
        (0..3)
            .map(|axis| self.extents[axis] / self.bins[axis] as f64)
            .fold(f64::INFINITY, f64::min)
    }

    pub(crate) fn bin_coords(&self, reduced: &Vector3<f64>) -> [usize; 3] {
        let pbc = self.cell.pbc();
        let mut coords = [0usize; 3];
        for axis in 0..3 {
            let f = if pbc[axis] {
                reduced[axis] - reduced[axis].floor()
            } else {
                (reduced[axis] - self.lo[axis]) / self.span[axis]
            };
            let n = self.bins[axis];
            coords[axis] = ((f * n as f64).floor() as isize).clamp(0, n as isize - 1) as usize;
        }
        coords
    }

    pub(crate) fn bin_of_particle(&self, index: usize) -> [usize; 3] {
        self.bin_coords(&self.reduced[index])
    }

    pub(crate) fn linear(&self, coords: [usize; 3]) -> usize {
        (coords[2] * self.bins[1] + coords[1]) * self.bins[0] + coords[0]
    }

    /// Bin coordinate along `axis` displaced by `offset`, wrapping periodic
    /// axes. `None` when a non-periodic axis runs off the grid.
    pub(crate) fn shifted(&self, axis: usize, coord: usize, offset: isize) -> Option<usize> {
        let n = self.bins[axis] as isize;
        let target = coord as isize + offset;
        if self.cell.pbc()[axis] {
            Some(target.rem_euclid(n) as usize)
        } else if (0..n).contains(&target) {
            Some(target as usize)
        } else {
            None
        }
    }

    pub(crate) fn members(&self, bin: usize) -> &[usize] {
        &self.bin_members[self.bin_starts[bin]..self.bin_starts[bin + 1]]
    }

    /// Minimum-image displacement from particle `from` to particle `to`.
    pub(crate) fn displacement(&self, from: usize, to: usize) -> (Vector3<f64>, Vector3<i32>) {
        let (wrapped, shift) = self.cell.wrap_reduced_delta(self.reduced[to] - self.reduced[from]);
        (self.cell.matrix() * wrapped, shift)
    }

    /// Displacement from particle `from` to the copy of particle `to` that
    /// lies `image` cells away along periodic axes, counted from the cell
    /// both particles are wrapped into.
    pub(crate) fn image_displacement(
        &self,
        from: usize,
        to: usize,
        image: [i32; 3],
    ) -> (Vector3<f64>, Vector3<i32>) {
        let pbc = self.cell.pbc();
        let (a, b) = (&self.reduced[from], &self.reduced[to]);
        let axis_shift = |axis: usize| {
            if pbc[axis] {
                image[axis] - b[axis].floor() as i32 + a[axis].floor() as i32
            } else {
                0
            }
        };
        let shift = Vector3::new(axis_shift(0), axis_shift(1), axis_shift(2));
        let delta = b - a + shift.cast::<f64>();
        (self.cell.matrix() * delta, shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_places_every_selected_particle_once() {
        let cell = SimulationCell::from_bounds([0.0; 3], [4.0; 3], [true, true, false]);
        let positions = vec![
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(3.9, 0.1, 2.0),
            Point3::new(-0.1, 2.0, 6.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let selection = [true, true, true, false];
        let grid = BinGrid::new(&cell, &positions, Some(&selection), |_| [2, 2, 2]).unwrap();
        assert_eq!(grid.selected_count(), 3);
        let total: usize = (0..grid.bin_count()).map(|b| grid.members(b).len()).sum();
        assert_eq!(total, 3);
        // Wrapped along x into the upper bin.
        assert_eq!(grid.bin_of_particle(2)[0], 1);
        // Non-periodic z range grows to cover the particle at z = 6.
        assert_eq!(grid.bin_of_particle(2)[2], 1);
        assert_eq!(grid.bin_of_particle(0)[2], 0);
    }

    #[test]
    fn displacement_uses_nearest_periodic_image() {
        let cell = SimulationCell::from_bounds([0.0; 3], [10.0; 3], [true; 3]);
        let positions = vec![Point3::new(0.5, 5.0, 5.0), Point3::new(9.5, 5.0, 5.0)];
        let grid = BinGrid::new(&cell, &positions, None, |_| [1, 1, 1]).unwrap();
        let (delta, shift) = grid.displacement(0, 1);
        assert!((delta - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
        assert_eq!(shift, Vector3::new(-1, 0, 0));
    }

    #[test]
    fn degenerate_cell_is_rejected() {
        let cell = SimulationCell::from_bounds([0.0; 3], [1.0, 1.0, 0.0], [false; 3]);
        assert!(matches!(
            BinGrid::new(&cell, &[Point3::origin()], None, |_| [1, 1, 1]),
            Err(NeighborError::Configuration(_))
        ));
    }
}
