use super::signature::{MAX_NEIGHBORS, NeighborBondArray};
use super::{StructureType, TypesToIdentify, classify_shell};
use crate::core::neighbors::cutoff::CutoffNeighborFinder;
use nalgebra::Vector3;

/// Conventional CNA with one global cutoff.
///
/// Only particles with exactly 12 (FCC, HCP, ICO) or 14 (BCC) neighbors
/// within the cutoff can be classified.
pub(super) fn classify(finder: &CutoffNeighborFinder, index: usize, identify: &TypesToIdentify) -> StructureType {
    let mut vectors = [Vector3::zeros(); MAX_NEIGHBORS];
    let mut count = 0;
    for neighbor in finder.find(index) {
        if count == MAX_NEIGHBORS {
            return StructureType::Other;
        }
        vectors[count] = neighbor.delta;
        count += 1;
    }

    match count {
        12 if identify.any_of(&[StructureType::Fcc, StructureType::Hcp, StructureType::Ico]) => {}
        14 if identify.contains(StructureType::Bcc) => {}
        _ => return StructureType::Other,
    }

    let cutoff_sq = finder.cutoff() * finder.cutoff();
    let bonds = NeighborBondArray::from_vectors(&vectors[..count], cutoff_sq);
    classify_shell(&bonds, count, identify)
}
