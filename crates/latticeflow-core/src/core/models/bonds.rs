use nalgebra::Vector3;

/// One bond as seen from one of its two particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondRef {
    pub bond_index: usize,
    pub neighbor: usize,
    /// Image of `neighbor` the bond points to, relative to the viewing particle.
    pub pbc_shift: Vector3<i32>,
}

/// Lookup from particle to its incident bonds, traversable in both directions.
#[derive(Debug, Clone)]
pub struct ParticleBondMap {
    offsets: Vec<usize>,
    entries: Vec<BondRef>,
}

impl ParticleBondMap {
    pub fn new(particle_count: usize, topology: &[[usize; 2]], images: Option<&[Vector3<i32>]>) -> Self {
        let mut degree = vec![0usize; particle_count + 1];
        for &[a, b] in topology {
            if a < particle_count && b < particle_count {
                degree[a] += 1;
                degree[b] += 1;
            }
        }
        let mut offsets = Vec::with_capacity(particle_count + 1);
        let mut running = 0;
        for d in &degree[..particle_count] {
            offsets.push(running);
            running += d;
        }
        offsets.push(running);

        let mut cursor = offsets.clone();
        let mut entries = vec![
            BondRef {
                bond_index: 0,
                neighbor: 0,
                pbc_shift: Vector3::zeros(),
            };
            running
        ];
        for (bond_index, &[a, b]) in topology.iter().enumerate() {
            if a >= particle_count || b >= particle_count {
                continue;
            }
            let shift = images
                .and_then(|imgs| imgs.get(bond_index))
                .copied()
                .unwrap_or_else(Vector3::zeros);
            entries[cursor[a]] = BondRef {
                bond_index,
                neighbor: b,
                pbc_shift: shift,
            };
            cursor[a] += 1;
            entries[cursor[b]] = BondRef {
                bond_index,
                neighbor: a,
                pbc_shift: -shift,
            };
            cursor[b] += 1;
        }
        Self { offsets, entries }
    }

    pub fn particle_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn bonds_of(&self, particle: usize) -> &[BondRef] {
        match (self.offsets.get(particle), self.offsets.get(particle + 1)) {
            (Some(&start), Some(&end)) => &self.entries[start..end],
            _ => &[],
        }
    }
}
