use super::{BinGrid, Neighbor, NeighborError};
use crate::core::models::cell::SimulationCell;
use nalgebra::Point3;
use tracing::debug;

/// Largest neighbor count a [`NearestNeighborFinder`] can be asked for.
pub const MAX_NEAREST: usize = 32;

const PARTICLES_PER_BIN: f64 = 2.0;
const MAX_BINS_PER_AXIS: usize = 128;

/// Finds the `k` nearest neighbors of a particle.
///
/// Candidates are gathered from cubic shells of grid bins around the query
/// particle's bin, growing one bin at a time until no unvisited bin can hold
/// a particle closer than the current `k`-th candidate. Along periodic axes
/// the shells run on past the cell boundary into neighboring images, so a
/// particle may appear several times (the query particle included) when the
/// cell is small compared to the neighbor shell.
#[derive(Debug, Clone)]
pub struct NearestNeighborFinder {
    grid: BinGrid,
    k: usize,
    min_bin_width: f64,
}

impl NearestNeighborFinder {
    pub fn new(
        k: usize,
        cell: &SimulationCell,
        positions: &[Point3<f64>],
        selection: Option<&[bool]>,
    ) -> Result<Self, NeighborError> {
        if k == 0 || k > MAX_NEAREST {
            return Err(NeighborError::Configuration(format!(
                "requested {k} nearest neighbors, supported range is 1 to {MAX_NEAREST}"
            )));
        }
        let selected = selection.map_or(positions.len(), |s| s.iter().filter(|&&b| b).count());
        if selected <= k {
            return Err(NeighborError::Configuration(format!(
                "{k} nearest neighbors requested but only {selected} particles are available"
            )));
        }

        let grid = BinGrid::new(cell, positions, selection, |extents| {
            let volume: f64 = extents.iter().filter(|e| **e > 0.0).product();
            let target = (selected as f64 / PARTICLES_PER_BIN).max(1.0);
            let density = (target / volume).cbrt();
            extents.map(|e| ((e * density).floor() as usize).clamp(1, MAX_BINS_PER_AXIS))
        })?;

        let min_bin_width = grid.min_bin_width();
        debug!(k, bins = ?grid.bins(), particles = grid.selected_count(), "Nearest neighbor grid ready");

        Ok(Self { grid, k, min_bin_width })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn particle_count(&self) -> usize {
        self.grid.particle_count()
    }

    /// Collects the nearest neighbors of particle `index` into `query`,
    /// replacing its previous contents. Results are sorted by distance.
    pub fn find(&self, index: usize, query: &mut NearestQuery) {
        query.heap.clear();
        query.capacity = self.k;
        let pbc = self.grid.pbc();
        let bins = self.grid.bins().map(|n| n as isize);
        let center = self.grid.bin_of_particle(index).map(|c| c as isize);

        // Offset bounds along open axes. Periodic axes are unbounded.
        let bounds: [(isize, isize); 3] = [0, 1, 2].map(|axis| {
            if pbc[axis] {
                (isize::MIN, isize::MAX)
            } else {
                (-center[axis], bins[axis] - 1 - center[axis])
            }
        });
        let last_shell = (!pbc.contains(&true))
            .then(|| bounds.iter().map(|&(lo, hi)| (-lo).max(hi)).max().unwrap_or(0));

        let mut shell: isize = 0;
        loop {
            for dz in bounds[2].0.max(-shell)..=bounds[2].1.min(shell) {
                for dy in bounds[1].0.max(-shell)..=bounds[1].1.min(shell) {
                    for dx in bounds[0].0.max(-shell)..=bounds[0].1.min(shell) {
                        if dx.abs().max(dy.abs()).max(dz.abs()) != shell {
                            continue;
                        }
                        let offset = [dx, dy, dz];
                        let mut coords = [0usize; 3];
                        let mut image = [0i32; 3];
                        for axis in 0..3 {
                            let target = center[axis] + offset[axis];
                            coords[axis] = target.rem_euclid(bins[axis]) as usize;
                            image[axis] = target.div_euclid(bins[axis]) as i32;
                        }
                        for &other in self.grid.members(self.grid.linear(coords)) {
                            if other == index && image == [0; 3] {
                                continue;
                            }
                            let (delta, pbc_shift) = self.grid.image_displacement(index, other, image);
                            query.offer(Neighbor {
                                index: other,
                                delta,
                                distance_sq: delta.norm_squared(),
                                pbc_shift,
                            });
                        }
                    }
                }
            }
            let reach = shell as f64 * self.min_bin_width;
            if query.is_full() && query.max_distance_sq() <= reach * reach {
                break;
            }
            if last_shell.is_some_and(|last| shell >= last) {
                break;
            }
            shell += 1;
        }
        query.sort();
    }
}

/// Reusable result buffer for nearest neighbor queries.
///
/// While a query runs the buffer is a bounded max-heap keyed on squared
/// distance, so the farthest candidate can be evicted in logarithmic time.
#[derive(Debug, Clone, Default)]
pub struct NearestQuery {
    heap: Vec<Neighbor>,
    capacity: usize,
}

impl NearestQuery {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(MAX_NEAREST),
            capacity: 0,
        }
    }

    pub fn results(&self) -> &[Neighbor] {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    fn max_distance_sq(&self) -> f64 {
        self.heap.first().map_or(f64::INFINITY, |n| n.distance_sq)
    }

    fn offer(&mut self, candidate: Neighbor) {
        if !self.is_full() {
            self.heap.push(candidate);
            self.sift_up(self.heap.len() - 1);
        } else if candidate.distance_sq < self.max_distance_sq() {
            self.heap[0] = candidate;
            self.sift_down(0);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].distance_sq >= self.heap[i].distance_sq {
                break;
            }
            self.heap.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let mut largest = i;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < len && self.heap[child].distance_sq > self.heap[largest].distance_sq {
                    largest = child;
                }
            }
            if largest == i {
                break;
            }
            self.heap.swap(i, largest);
            i = largest;
        }
    }

    fn sort(&mut self) {
        self.heap.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
    }
}
