//! Bit-packed common-neighbor signatures.
//!
//! A particle's neighbor shell is represented as a square bit matrix with one
//! 32-bit row per neighbor: bit `j` of row `i` is set when neighbors `i` and
//! `j` are bonded to each other. Common neighbors of the central particle and
//! neighbor `i` are then simply row `i`, and bonds among them are pairs of set
//! bits whose rows intersect.

use nalgebra::Vector3;

/// Largest neighbor shell examined by the geometric strategies (BCC).
pub const MAX_NEIGHBORS: usize = 14;

/// A bond between two common neighbors, encoded as a two-bit mask.
pub type PairBond = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborBondArray {
    rows: [u32; 32],
}

impl NeighborBondArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the bond matrix of a neighbor shell, bonding two neighbors when
    /// their separation is within `cutoff_sq`.
    pub fn from_vectors(vectors: &[Vector3<f64>], cutoff_sq: f64) -> Self {
        let mut array = Self::new();
        for i in 0..vectors.len() {
            for j in i + 1..vectors.len() {
                array.set_bond(i, j, (vectors[i] - vectors[j]).norm_squared() <= cutoff_sq);
            }
        }
        array
    }

    pub fn set_bond(&mut self, i: usize, j: usize, bonded: bool) {
        if bonded {
            self.rows[i] |= 1 << j;
            self.rows[j] |= 1 << i;
        } else {
            self.rows[i] &= !(1 << j);
            self.rows[j] &= !(1 << i);
        }
    }

    pub fn is_bonded(&self, i: usize, j: usize) -> bool {
        self.rows[i] & (1 << j) != 0
    }

    /// Bit mask of the neighbors shared by the central particle and neighbor `i`.
    pub fn common_neighbors(&self, i: usize) -> u32 {
        self.rows[i]
    }

    /// Enumerates the bonds among the neighbors in `common`.
    pub fn neighbor_bonds(&self, common: u32) -> Vec<PairBond> {
        let mut bonds = Vec::new();
        let mut visited: Vec<u32> = Vec::with_capacity(common.count_ones() as usize);
        for i in 0..32 {
            let bit = 1u32 << i;
            if common & bit == 0 {
                continue;
            }
            let adjacent = common & self.rows[i];
            for &earlier in &visited {
                if adjacent & earlier != 0 {
                    bonds.push(bit | earlier);
                }
            }
            visited.push(bit);
        }
        bonds
    }

    /// The `(common neighbors, bonds among them, longest chain)` triple of neighbor `i`.
    pub fn signature(&self, i: usize) -> Signature {
        let common = self.common_neighbors(i);
        let mut bonds = self.neighbor_bonds(common);
        Signature {
            common_neighbors: common.count_ones(),
            bonds: bonds.len() as u32,
            max_chain: max_chain_length(&mut bonds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub common_neighbors: u32,
    pub bonds: u32,
    pub max_chain: u32,
}

impl Signature {
    pub const fn new(common_neighbors: u32, bonds: u32, max_chain: u32) -> Self {
        Self {
            common_neighbors,
            bonds,
            max_chain,
        }
    }

    /// The signature as stored in the per-bond `CNA Indices` array.
    pub fn as_indices(self) -> [i32; 3] {
        // Each count is bounded by the 32 rows of a bond array (at most 32
        // common neighbors, 64 bonds among them), far below `i32::MAX`.
        let index = |value: u32| i32::try_from(value).unwrap_or(i32::MAX);
        [index(self.common_neighbors), index(self.bonds), index(self.max_chain)]
    }
}

/// Tallies of canonical signatures over a particle's neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignatureCounts {
    pub n421: u32,
    pub n422: u32,
    pub n444: u32,
    pub n555: u32,
    pub n666: u32,
    pub total: u32,
}

impl SignatureCounts {
    /// Records one signature. Returns `false` for a non-canonical signature,
    /// which rules out every known structure.
    pub fn record(&mut self, signature: Signature) -> bool {
        let slot = match (signature.common_neighbors, signature.bonds, signature.max_chain) {
            (4, 2, 1) => &mut self.n421,
            (4, 2, 2) => &mut self.n422,
            (4, 4, 4) => &mut self.n444,
            (5, 5, 5) => &mut self.n555,
            (6, 6, 6) => &mut self.n666,
            _ => return false,
        };
        *slot += 1;
        self.total += 1;
        true
    }
}

/// Length of the longest connected cluster of bonds, measured in bonds.
///
/// Consumes `bonds`: clusters are removed from the list as they are walked.
pub fn max_chain_length(bonds: &mut Vec<PairBond>) -> u32 {
    let mut longest = 0;
    while let Some(seed) = bonds.pop() {
        let mut atoms_to_process = seed;
        let mut atoms_processed = 0u32;
        let mut cluster_size = 1;
        while atoms_to_process != 0 {
            let next_atom = 1u32 << atoms_to_process.trailing_zeros();
            atoms_processed |= next_atom;
            atoms_to_process &= !next_atom;
            bonds.retain(|&bond| {
                if bond & next_atom == 0 {
                    return true;
                }
                cluster_size += 1;
                atoms_to_process |= bond & !atoms_processed;
                false
            });
        }
        longest = longest.max(cluster_size);
    }
    longest
}
