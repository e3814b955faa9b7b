use super::signature::{PairBond, Signature, SignatureCounts, max_chain_length};
use super::{StructureType, TypesToIdentify};
use crate::core::models::bonds::ParticleBondMap;
use crate::engine::error::EngineError;
use nalgebra::Vector3;

pub const MAX_COMMON_NEIGHBORS: usize = 32;
pub const MAX_COMMON_NEIGHBOR_BONDS: usize = 64;

/// Computes the CNA indices of one bond from the bond network alone.
///
/// Returns `[0, 0, 0]` for bonds that reference particles outside the map.
pub(super) fn bond_indices(
    map: &ParticleBondMap,
    topology: &[[usize; 2]],
    images: Option<&[Vector3<i32>]>,
    bond: usize,
) -> Result<[i32; 3], EngineError> {
    let [a, b] = topology[bond];
    let particle_count = map.particle_count();
    if a >= particle_count || b >= particle_count {
        return Ok([0; 3]);
    }
    let bond_shift = images
        .and_then(|images| images.get(bond))
        .copied()
        .unwrap_or_else(Vector3::zeros);

    // Neighbors bonded to both ends, with their image relative to `a`.
    let mut common: Vec<(usize, Vector3<i32>)> = Vec::with_capacity(MAX_COMMON_NEIGHBORS);
    for via_a in map.bonds_of(a) {
        let shared = map
            .bonds_of(b)
            .iter()
            .any(|via_b| via_b.neighbor == via_a.neighbor && via_a.pbc_shift == bond_shift + via_b.pbc_shift);
        if !shared {
            continue;
        }
        if common.len() == MAX_COMMON_NEIGHBORS {
            return Err(EngineError::AlgorithmicLimit {
                limit: "common neighbors",
                message: format!(
                    "particles {a} and {b} have more than {MAX_COMMON_NEIGHBORS} common neighbors; cannot perform CNA"
                ),
            });
        }
        common.push((via_a.neighbor, via_a.pbc_shift));
    }

    let mut bonds: Vec<PairBond> = Vec::new();
    for (i1, &(p1, shift1)) in common.iter().enumerate() {
        for via in map.bonds_of(p1) {
            let Some(i2) = common[..i1]
                .iter()
                .position(|&(p2, shift2)| p2 == via.neighbor && shift1 + via.pbc_shift == shift2)
            else {
                continue;
            };
            if bonds.len() == MAX_COMMON_NEIGHBOR_BONDS {
                return Err(EngineError::AlgorithmicLimit {
                    limit: "common neighbor bonds",
                    message: format!(
                        "more than {MAX_COMMON_NEIGHBOR_BONDS} bonds between the common neighbors of particles {a} and {b}; cannot perform CNA"
                    ),
                });
            }
            bonds.push((1 << i1) | (1 << i2));
        }
    }

    let bond_count = bonds.len() as u32;
    let max_chain = max_chain_length(&mut bonds);
    Ok(Signature::new(common.len() as u32, bond_count, max_chain).as_indices())
}

/// Classifies a particle from the CNA indices of its bonds.
pub(super) fn classify(
    map: &ParticleBondMap,
    indices: &[[i32; 3]],
    particle: usize,
    identify: &TypesToIdentify,
) -> StructureType {
    let mut counts = SignatureCounts::default();
    for bond in map.bonds_of(particle) {
        let [common, bonds, chain] = indices[bond.bond_index];
        let signature = Signature::new(common.max(0) as u32, bonds.max(0) as u32, chain.max(0) as u32);
        if !counts.record(signature) {
            return StructureType::Other;
        }
    }
    StructureType::from_counts(&counts, identify)
}
