use super::{BinGrid, Neighbor, NeighborError};
use crate::core::models::cell::SimulationCell;
use itertools::iproduct;
use nalgebra::Point3;
use tracing::debug;

/// Upper bound on the number of grid bins, independent of particle count.
const MAX_BINS: usize = 1 << 21;

/// Finds all particles within a fixed distance of a query particle.
#[derive(Debug, Clone)]
pub struct CutoffNeighborFinder {
    grid: BinGrid,
    cutoff: f64,
    cutoff_sq: f64,
    /// Bin offsets to visit along each axis, deduplicated for short periodic axes.
    offsets: [Vec<isize>; 3],
}

impl CutoffNeighborFinder {
    /// Bins `positions` for cutoff queries.
    ///
    /// Only selected particles are reported as neighbors. Fails when the cutoff
    /// is not positive or when a periodic cell is too thin for the cutoff, in
    /// which case a particle could interact with several images of the same
    /// neighbor.
    pub fn new(
        cutoff: f64,
        cell: &SimulationCell,
        positions: &[Point3<f64>],
        selection: Option<&[bool]>,
    ) -> Result<Self, NeighborError> {
        if !(cutoff > 0.0 && cutoff.is_finite()) {
            return Err(NeighborError::Configuration(format!(
                "cutoff radius must be positive, got {cutoff}"
            )));
        }
        let widths = cell.perpendicular_widths();
        for axis in 0..3 {
            if cell.pbc()[axis] && 2.0 * cutoff > widths[axis] {
                return Err(NeighborError::Configuration(format!(
                    "cutoff radius {cutoff} exceeds half the periodic cell width {:.6} along axis {axis}",
                    widths[axis]
                )));
            }
        }

        let target = (positions.len() / 2).clamp(1, MAX_BINS);
        let grid = BinGrid::new(cell, positions, selection, |extents| {
            let mut bins = extents.map(|e| ((e / cutoff).floor() as usize).max(1));
            let total: usize = bins.iter().product();
            if total > target {
                let scale = (target as f64 / total as f64).cbrt();
                bins = bins.map(|n| ((n as f64 * scale).floor() as usize).max(1));
            }
            bins
        })?;

        let pbc = grid.pbc();
        let bins = grid.bins();
        let offsets = [0, 1, 2].map(|axis| match (pbc[axis], bins[axis]) {
            (true, 1) => vec![0],
            (true, 2) => vec![0, 1],
            _ => vec![-1, 0, 1],
        });
        debug!(cutoff, bins = ?bins, particles = grid.selected_count(), "Cutoff neighbor grid ready");

        Ok(Self {
            grid,
            cutoff,
            cutoff_sq: cutoff * cutoff,
            offsets,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn particle_count(&self) -> usize {
        self.grid.particle_count()
    }

    /// Lazily iterates over the neighbors of particle `index`, excluding itself.
    pub fn find(&self, index: usize) -> CutoffQuery<'_> {
        let center = self.grid.bin_of_particle(index);
        let bins = iproduct!(&self.offsets[2], &self.offsets[1], &self.offsets[0])
            .filter_map(|(&dz, &dy, &dx)| {
                Some(self.grid.linear([
                    self.grid.shifted(0, center[0], dx)?,
                    self.grid.shifted(1, center[1], dy)?,
                    self.grid.shifted(2, center[2], dz)?,
                ]))
            })
            .collect();
        CutoffQuery {
            finder: self,
            center: index,
            bins,
            bin_cursor: 0,
            member_cursor: 0,
        }
    }
}

pub struct CutoffQuery<'a> {
    finder: &'a CutoffNeighborFinder,
    center: usize,
    bins: Vec<usize>,
    bin_cursor: usize,
    member_cursor: usize,
}

impl Iterator for CutoffQuery<'_> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        let grid = &self.finder.grid;
        while let Some(&bin) = self.bins.get(self.bin_cursor) {
            let members = grid.members(bin);
            while let Some(&index) = members.get(self.member_cursor) {
                self.member_cursor += 1;
                if index == self.center {
                    continue;
                }
                let (delta, pbc_shift) = grid.displacement(self.center, index);
                let distance_sq = delta.norm_squared();
                if distance_sq <= self.finder.cutoff_sq {
                    return Some(Neighbor {
                        index,
                        delta,
                        distance_sq,
                        pbc_shift,
                    });
                }
            }
            self.bin_cursor += 1;
            self.member_cursor = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(cell: &SimulationCell, positions: &[Point3<f64>], index: usize, cutoff: f64) -> Vec<usize> {
        let inverse = cell.inverse_matrix().unwrap();
        let mut found: Vec<usize> = (0..positions.len())
            .filter(|&j| j != index)
            .filter(|&j| {
                let (wrapped, _) = cell.wrap_reduced_delta(inverse * (positions[j] - positions[index]));
                (cell.matrix() * wrapped).norm_squared() <= cutoff * cutoff
            })
            .collect();
        found.sort_unstable();
        found
    }

    fn random_positions(count: usize, size: f64, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| Point3::new(rng.gen_range(0.0..size), rng.gen_range(0.0..size), rng.gen_range(0.0..size)))
            .collect()
    }

    #[test]
    fn matches_brute_force_in_mixed_periodic_cell() {
        let cell = SimulationCell::from_bounds([0.0; 3], [10.0; 3], [true, true, false]);
        let positions = random_positions(400, 10.0, 7);
        let finder = CutoffNeighborFinder::new(2.3, &cell, &positions, None).unwrap();
        for index in (0..positions.len()).step_by(17) {
            let mut found: Vec<usize> = finder.find(index).map(|n| n.index).collect();
            found.sort_unstable();
            assert_eq!(found, brute_force(&cell, &positions, index, 2.3), "particle {index}");
        }
    }

    #[test]
    fn reports_delta_and_image_shift_across_boundary() {
        let cell = SimulationCell::from_bounds([0.0; 3], [6.0; 3], [true; 3]);
        let positions = vec![Point3::new(0.2, 3.0, 3.0), Point3::new(5.9, 3.0, 3.0)];
        let finder = CutoffNeighborFinder::new(1.0, &cell, &positions, None).unwrap();
        let neighbors: Vec<Neighbor> = finder.find(0).collect();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].index, 1);
        assert!((neighbors[0].delta - Vector3::new(-0.3, 0.0, 0.0)).norm() < 1e-12);
        assert_eq!(neighbors[0].pbc_shift, Vector3::new(-1, 0, 0));
        assert!((neighbors[0].distance_sq - 0.09).abs() < 1e-12);
    }

    #[test]
    fn unselected_particles_are_not_reported() {
        let cell = SimulationCell::from_bounds([0.0; 3], [10.0; 3], [false; 3]);
        let positions = vec![
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.5, 1.0, 1.0),
            Point3::new(1.0, 1.5, 1.0),
        ];
        let selection = [true, false, true];
        let finder = CutoffNeighborFinder::new(1.0, &cell, &positions, Some(&selection)).unwrap();
        let found: Vec<usize> = finder.find(0).map(|n| n.index).collect();
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn small_periodic_cell_visits_each_bin_once() {
        let cell = SimulationCell::from_bounds([0.0; 3], [4.0; 3], [true; 3]);
        let positions = random_positions(60, 4.0, 11);
        let finder = CutoffNeighborFinder::new(1.9, &cell, &positions, None).unwrap();
        for index in 0..positions.len() {
            let mut found: Vec<usize> = finder.find(index).map(|n| n.index).collect();
            let count = found.len();
            found.sort_unstable();
            found.dedup();
            assert_eq!(found.len(), count);
            assert_eq!(found, brute_force(&cell, &positions, index, 1.9));
        }
    }

    #[test]
    fn cutoff_larger_than_half_the_cell_is_rejected() {
        let cell = SimulationCell::from_bounds([0.0; 3], [4.0, 4.0, 3.0], [true; 3]);
        let positions = vec![Point3::origin()];
        let err = CutoffNeighborFinder::new(1.6, &cell, &positions, None).unwrap_err();
        assert!(matches!(err, NeighborError::Configuration(ref msg) if msg.contains("axis 2")));
    }

    #[test]
    fn non_positive_cutoff_is_rejected() {
        let cell = SimulationCell::from_bounds([0.0; 3], [4.0; 3], [false; 3]);
        assert!(CutoffNeighborFinder::new(0.0, &cell, &[], None).is_err());
        assert!(CutoffNeighborFinder::new(f64::NAN, &cell, &[], None).is_err());
    }
}
