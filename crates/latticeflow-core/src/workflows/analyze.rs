use crate::core::models::collection::{DataCollection, ElementSet};
use crate::core::models::property::{StandardProperty, TypedPropertyArray};
use crate::core::neighbors::cutoff::CutoffNeighborFinder;
use crate::engine::cna::{CnaEngine, CnaReport};
use crate::engine::config::CnaConfig;
use crate::engine::error::EngineError;
use crate::engine::parallel::parallel_map;
use crate::engine::task::Task;
use nalgebra::Vector3;
use tracing::{info, instrument};

/// Replaces the bonds of `collection` with one bond per particle pair closer
/// than `cutoff`, each carrying its periodic image.
///
/// Returns the number of bonds created.
#[instrument(skip_all, name = "generate_bonds_workflow")]
pub fn generate_bonds(collection: &mut DataCollection, cutoff: f64, task: &Task) -> Result<usize, EngineError> {
    let positions = collection
        .positions()
        .ok_or_else(|| EngineError::Configuration("the input contains no particle positions".to_string()))?;
    let finder = CutoffNeighborFinder::new(cutoff, &collection.cell, &positions, None)?;

    task.set_progress_text("Generating bonds");
    task.set_progress_maximum(positions.len() as u64);
    let mut per_particle: Vec<Vec<(usize, Vector3<i32>)>> = vec![Vec::new(); positions.len()];
    let completed = parallel_map(&mut per_particle, task, |i| {
        Ok::<_, EngineError>(
            finder
                .find(i)
                .filter(|n| n.index > i)
                .map(|n| (n.index, n.pbc_shift))
                .collect(),
        )
    })?;
    if !completed {
        return Err(EngineError::Canceled);
    }

    let mut topology = Vec::new();
    let mut images = Vec::new();
    for (i, neighbors) in per_particle.into_iter().enumerate() {
        for (j, shift) in neighbors {
            topology.extend([i as i64, j as i64]);
            images.extend_from_slice(shift.as_slice());
        }
    }
    let count = topology.len() / 2;

    let mut bonds = ElementSet::default();
    bonds.insert(TypedPropertyArray::from_int64s(StandardProperty::Topology.into(), 2, topology))?;
    bonds.insert(TypedPropertyArray::from_ints(StandardProperty::PeriodicImage.into(), 3, images))?;
    collection.bonds = bonds;

    info!(bonds = count, cutoff, "Bonds generated.");
    Ok(count)
}

/// Runs common neighbor analysis on `collection` and stores the results in it.
#[instrument(skip_all, name = "cna_workflow")]
pub fn run_cna(collection: &mut DataCollection, config: &CnaConfig, task: &Task) -> Result<CnaReport, EngineError> {
    info!(
        mode = %config.mode,
        particles = collection.particle_count(),
        "Starting common neighbor analysis."
    );
    CnaEngine::new(config.clone()).run(collection, task)
}
