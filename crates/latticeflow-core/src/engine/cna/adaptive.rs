use super::signature::{MAX_NEIGHBORS, NeighborBondArray};
use super::{StructureType, TypesToIdentify, classify_shell};
use crate::core::neighbors::nearest::{NearestNeighborFinder, NearestQuery};
use nalgebra::Vector3;

/// Ratio between the FCC local cutoff and the mean nearest-neighbor distance,
/// halfway between the first and second neighbor shells.
const FCC_CUTOFF_FACTOR: f64 = (1.0 + std::f64::consts::SQRT_2) * 0.5;
/// Ratio between the BCC local cutoff and the normalized mean shell distance.
const BCC_CUTOFF_FACTOR: f64 = 1.207;

/// Adaptive CNA: each particle derives its own bonding cutoff from the
/// distances to its nearest neighbors.
pub(super) fn classify(
    finder: &NearestNeighborFinder,
    query: &mut NearestQuery,
    index: usize,
    identify: &TypesToIdentify,
) -> StructureType {
    finder.find(index, query);
    let neighbors = query.results();
    let mut vectors = [Vector3::zeros(); MAX_NEIGHBORS];
    for (slot, neighbor) in vectors.iter_mut().zip(neighbors) {
        *slot = neighbor.delta;
    }

    if identify.any_of(&[StructureType::Fcc, StructureType::Hcp, StructureType::Ico]) {
        const SHELL: usize = 12;
        if neighbors.len() < SHELL {
            return StructureType::Other;
        }
        let mean = neighbors[..SHELL].iter().map(|n| n.distance_sq.sqrt()).sum::<f64>() / SHELL as f64;
        let local_cutoff = mean * FCC_CUTOFF_FACTOR;
        let bonds = NeighborBondArray::from_vectors(&vectors[..SHELL], local_cutoff * local_cutoff);
        let structure = classify_shell(&bonds, SHELL, identify);
        if structure != StructureType::Other {
            return structure;
        }
    }

    if identify.contains(StructureType::Bcc) {
        const SHELL: usize = 14;
        if neighbors.len() < SHELL {
            return StructureType::Other;
        }
        // First-shell distances are scaled to the second shell: d2 = d1 * 2/sqrt(3).
        let first: f64 = neighbors[..8].iter().map(|n| (n.distance_sq / 0.75).sqrt()).sum();
        let second: f64 = neighbors[8..SHELL].iter().map(|n| n.distance_sq.sqrt()).sum();
        let local_cutoff = (first + second) / SHELL as f64 * BCC_CUTOFF_FACTOR;
        let bonds = NeighborBondArray::from_vectors(&vectors[..SHELL], local_cutoff * local_cutoff);
        return classify_shell(&bonds, SHELL, identify);
    }

    StructureType::Other
}
