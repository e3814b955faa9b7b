//! # Common Neighbor Analysis
//!
//! Classifies the local crystalline environment of every particle as FCC, HCP,
//! BCC, icosahedral, or "other" by examining, for each bonded neighbor, how
//! many neighbors the pair shares and how those shared neighbors are bonded
//! among themselves.
//!
//! ## Strategies
//!
//! - **Fixed** ([`fixed`]) - A single global cutoff defines both the neighbor
//!   shell and the bonds within it.
//! - **Adaptive** ([`adaptive`]) - Each particle derives a local cutoff from
//!   its 12 or 14 nearest neighbors, making the analysis insensitive to
//!   lattice-constant variations.
//! - **Bonds** ([`bonds`]) - The existing bond network is used as adjacency,
//!   and per-bond CNA indices are reported alongside the classification.
//!
//! ## Run lifecycle
//!
//! A [`CnaEngine`] moves through [`AnalysisState`]s: `Idle`, `Preparing`
//! (inputs validated, neighbor finder or bond map built), `Classifying`
//! (parallel per-bond and per-particle passes), `Emitting` (results written
//! into the collection), and `Done`. Errors during preparation or
//! classification end the run in `Failed`; cancellation ends it in `Canceled`.

pub mod adaptive;
pub mod bonds;
pub mod fixed;
pub mod signature;

use self::signature::{NeighborBondArray, SignatureCounts};
use super::config::{CnaConfig, CnaMode};
use super::error::EngineError;
use super::parallel::parallel_map;
use super::task::{Cancellation, Task};
use crate::core::models::bonds::ParticleBondMap;
use crate::core::models::collection::DataCollection;
use crate::core::models::frame::AttributeValue;
use crate::core::models::property::{PropertyKind, StandardProperty, TypedPropertyArray};
use crate::core::models::types::{Color, ElementType, ElementTypeCatalog};
use crate::core::neighbors::cutoff::CutoffNeighborFinder;
use crate::core::neighbors::nearest::{NearestNeighborFinder, NearestQuery};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Name of the per-bond output array written by the bond-based strategy.
pub const CNA_INDICES_PROPERTY: &str = "CNA Indices";
/// Prefix of the per-structure count attributes.
pub const COUNT_ATTRIBUTE_PREFIX: &str = "CommonNeighborAnalysis.counts.";

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StructureType {
    Other = 0,
    Fcc = 1,
    Hcp = 2,
    Bcc = 3,
    Ico = 4,
}

impl StructureType {
    pub const COUNT: usize = 5;
    pub const ALL: [StructureType; Self::COUNT] = [
        StructureType::Other,
        StructureType::Fcc,
        StructureType::Hcp,
        StructureType::Bcc,
        StructureType::Ico,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(id).ok()?).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            StructureType::Other => "OTHER",
            StructureType::Fcc => "FCC",
            StructureType::Hcp => "HCP",
            StructureType::Bcc => "BCC",
            StructureType::Ico => "ICO",
        }
    }

    pub fn color(self) -> Color {
        match self {
            StructureType::Other => [0.95, 0.95, 0.95],
            StructureType::Fcc => [0.4, 1.0, 0.4],
            StructureType::Hcp => [1.0, 0.4, 0.4],
            StructureType::Bcc => [0.4, 0.4, 1.0],
            StructureType::Ico => [0.95, 0.8, 0.2],
        }
    }

    /// Resolves tallied neighbor signatures into a structure label.
    pub fn from_counts(counts: &SignatureCounts, identify: &TypesToIdentify) -> Self {
        let candidate = match counts.total {
            12 if counts.n421 == 12 => StructureType::Fcc,
            12 if counts.n421 == 6 && counts.n422 == 6 => StructureType::Hcp,
            12 if counts.n555 == 12 => StructureType::Ico,
            14 if counts.n444 == 6 && counts.n666 == 8 => StructureType::Bcc,
            _ => StructureType::Other,
        };
        if identify.contains(candidate) {
            candidate
        } else {
            StructureType::Other
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StructureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown structure type '{wanted}'"))
    }
}

/// Set of structure types the analysis is allowed to assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypesToIdentify([bool; StructureType::COUNT]);

impl TypesToIdentify {
    pub fn all() -> Self {
        Self([true; StructureType::COUNT])
    }

    pub fn contains(&self, structure: StructureType) -> bool {
        structure == StructureType::Other || self.0[structure as usize]
    }

    pub fn any_of(&self, structures: &[StructureType]) -> bool {
        structures.iter().any(|&s| self.0[s as usize])
    }
}

impl From<[bool; StructureType::COUNT]> for TypesToIdentify {
    fn from(flags: [bool; StructureType::COUNT]) -> Self {
        Self(flags)
    }
}

/// Classifies a complete 12- or 14-neighbor shell.
pub(crate) fn classify_shell(bonds: &NeighborBondArray, shell: usize, identify: &TypesToIdentify) -> StructureType {
    let mut counts = SignatureCounts::default();
    for neighbor in 0..shell {
        if !counts.record(bonds.signature(neighbor)) {
            return StructureType::Other;
        }
    }
    StructureType::from_counts(&counts, identify)
}

/// Number of particles assigned to each structure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructureCounts([usize; StructureType::COUNT]);

impl StructureCounts {
    pub fn tally(structures: &[StructureType]) -> Self {
        let mut counts = [0usize; StructureType::COUNT];
        for &s in structures {
            counts[s as usize] += 1;
        }
        Self(counts)
    }

    pub fn get(&self, structure: StructureType) -> usize {
        self.0[structure as usize]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StructureType, usize)> + '_ {
        StructureType::ALL.into_iter().map(|t| (t, self.get(t)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisState {
    Idle,
    Preparing,
    Classifying,
    Emitting,
    Done,
    Failed,
    Canceled,
}

impl AnalysisState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisState::Done | AnalysisState::Failed | AnalysisState::Canceled)
    }

    pub fn can_transition_to(self, next: AnalysisState) -> bool {
        use AnalysisState::*;
        match (self, next) {
            (Idle, Preparing) | (Preparing, Classifying) | (Classifying, Emitting) | (Emitting, Done) => true,
            (Preparing | Classifying | Emitting, Failed) => true,
            (from, Canceled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Everything a classification pass needs, prepared up front.
enum Strategy {
    Fixed(CutoffNeighborFinder),
    Adaptive(NearestNeighborFinder),
    Bonds {
        map: ParticleBondMap,
        topology: Vec<[usize; 2]>,
        images: Option<Vec<Vector3<i32>>>,
    },
    /// No particles to classify.
    Empty,
}

/// Result of the classification pass, before it is written out.
struct Classification {
    structures: Vec<StructureType>,
    bond_indices: Option<Vec<[i32; 3]>>,
}

/// Summary of a finished analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct CnaReport {
    pub mode: CnaMode,
    pub counts: StructureCounts,
}

/// One common neighbor analysis run over a [`DataCollection`].
#[derive(Debug)]
pub struct CnaEngine {
    config: CnaConfig,
    state: AnalysisState,
}

impl CnaEngine {
    pub fn new(config: CnaConfig) -> Self {
        Self {
            config,
            state: AnalysisState::Idle,
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn config(&self) -> &CnaConfig {
        &self.config
    }

    fn transition(&mut self, next: AnalysisState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition { from: self.state, to: next });
        }
        debug!(from = ?self.state, to = ?next, "CNA state transition.");
        self.state = next;
        Ok(())
    }

    /// Classifies every particle of `collection` and writes the results back.
    ///
    /// On success the collection gains a `Structure Type` particle property
    /// with its type catalog, one count attribute per structure type and, in
    /// bond mode, a per-bond `CNA Indices` array. On failure or cancellation
    /// the collection is left untouched.
    pub fn run(&mut self, collection: &mut DataCollection, task: &Task) -> Result<CnaReport, EngineError> {
        let result = self.execute(collection, task);
        if let Err(error) = &result {
            if !self.state.is_terminal() {
                self.state = if error.is_cancellation() || task.is_canceled() {
                    AnalysisState::Canceled
                } else {
                    AnalysisState::Failed
                };
            }
        }
        result
    }

    fn execute(&mut self, collection: &mut DataCollection, task: &Task) -> Result<CnaReport, EngineError> {
        // === Phase 1: Preparing ===
        self.transition(AnalysisState::Preparing)?;
        task.begin_phase("Preparing");
        task.set_progress_text("Performing common neighbor analysis");
        let strategy = self.prepare(collection)?;
        task.end_phase();
        Self::check_canceled(task)?;

        // === Phase 2: Classifying ===
        self.transition(AnalysisState::Classifying)?;
        task.begin_phase("Classifying");
        let classification = self.classify(&strategy, collection, task)?;
        task.end_phase();
        Self::check_canceled(task)?;

        // === Phase 3: Emitting ===
        self.transition(AnalysisState::Emitting)?;
        let counts = StructureCounts::tally(&classification.structures);
        Self::emit(collection, classification, &counts)?;

        self.transition(AnalysisState::Done)?;
        task.finish_progress();
        info!(
            mode = %self.config.mode,
            particles = counts.total(),
            fcc = counts.get(StructureType::Fcc),
            hcp = counts.get(StructureType::Hcp),
            bcc = counts.get(StructureType::Bcc),
            ico = counts.get(StructureType::Ico),
            other = counts.get(StructureType::Other),
            "Common neighbor analysis complete."
        );
        Ok(CnaReport {
            mode: self.config.mode,
            counts,
        })
    }

    fn check_canceled(task: &Task) -> Result<(), EngineError> {
        if task.is_canceled() {
            Err(EngineError::Canceled)
        } else {
            Ok(())
        }
    }

    fn prepare(&self, collection: &DataCollection) -> Result<Strategy, EngineError> {
        if collection.cell.is_2d() {
            return Err(EngineError::Configuration(
                "common neighbor analysis does not support 2D simulation cells".to_string(),
            ));
        }
        let positions = collection
            .positions()
            .ok_or_else(|| EngineError::Configuration("the input contains no particle positions".to_string()))?;
        let selection = if self.config.only_selected {
            Some(collection.selection().ok_or_else(|| {
                EngineError::Configuration("analysis of selected particles requires a Selection property".to_string())
            })?)
        } else {
            None
        };

        if self.config.mode == CnaMode::Bonds {
            let topology = collection.bond_topology().ok_or_else(|| {
                EngineError::Configuration("bond-based analysis requires a bond topology".to_string())
            })?;
            let images = collection.bond_periodic_images();
            let map = ParticleBondMap::new(positions.len(), &topology, images.as_deref());
            debug!(bonds = topology.len(), "Bond map ready.");
            return Ok(Strategy::Bonds { map, topology, images });
        }
        if positions.is_empty() {
            return Ok(Strategy::Empty);
        }

        let selection = selection.as_deref();
        Ok(match self.config.mode {
            CnaMode::Fixed => Strategy::Fixed(CutoffNeighborFinder::new(
                self.config.cutoff,
                &collection.cell,
                &positions,
                selection,
            )?),
            _ => Strategy::Adaptive(NearestNeighborFinder::new(
                signature::MAX_NEIGHBORS,
                &collection.cell,
                &positions,
                selection,
            )?),
        })
    }

    fn classify(
        &self,
        strategy: &Strategy,
        collection: &DataCollection,
        task: &Task,
    ) -> Result<Classification, EngineError> {
        let particle_count = collection.particle_count();
        let identify = TypesToIdentify::from(self.config.identify);
        let selection = if self.config.only_selected {
            collection.selection()
        } else {
            None
        };
        let is_selected = |i: usize| selection.as_ref().is_none_or(|s| s[i]);

        let bond_count = match strategy {
            Strategy::Bonds { topology, .. } => topology.len(),
            _ => 0,
        };
        task.set_progress_maximum((particle_count + bond_count) as u64);

        let mut bond_indices = None;
        if let Strategy::Bonds { map, topology, images } = strategy {
            let mut indices = vec![[0i32; 3]; topology.len()];
            let completed = parallel_map(&mut indices, task, |bond| {
                bonds::bond_indices(map, topology, images.as_deref(), bond)
            })?;
            if !completed {
                return Err(EngineError::Canceled);
            }
            bond_indices = Some(indices);
        }

        let mut structures = vec![StructureType::Other; particle_count];
        let completed = match strategy {
            Strategy::Fixed(finder) => parallel_map(&mut structures, task, |i| {
                Ok::<_, EngineError>(if is_selected(i) {
                    fixed::classify(finder, i, &identify)
                } else {
                    StructureType::Other
                })
            })?,
            Strategy::Adaptive(finder) => parallel_map(&mut structures, task, |i| {
                if !is_selected(i) {
                    return Ok::<_, EngineError>(StructureType::Other);
                }
                let mut query = NearestQuery::new();
                Ok(adaptive::classify(finder, &mut query, i, &identify))
            })?,
            Strategy::Bonds { map, .. } => {
                let indices = bond_indices.as_deref().unwrap_or_default();
                parallel_map(&mut structures, task, |i| {
                    Ok::<_, EngineError>(if is_selected(i) {
                        bonds::classify(map, indices, i, &identify)
                    } else {
                        StructureType::Other
                    })
                })?
            }
            Strategy::Empty => true,
        };
        if !completed {
            return Err(EngineError::Canceled);
        }

        Ok(Classification {
            structures,
            bond_indices,
        })
    }

    /// Writes the classification into `collection`. All outputs are checked
    /// before the first one is stored, so a failure leaves it unchanged.
    fn emit(
        collection: &mut DataCollection,
        classification: Classification,
        counts: &StructureCounts,
    ) -> Result<(), EngineError> {
        let ids = classification.structures.iter().map(|s| s.id()).collect();
        let structures = TypedPropertyArray::from_ints(StandardProperty::StructureType.into(), 1, ids);
        collection.particles.check_length(&structures)?;

        let bond_indices = classification.bond_indices.map(|indices| {
            let flat = indices.into_iter().flatten().collect();
            TypedPropertyArray::from_ints(PropertyKind::User(CNA_INDICES_PROPERTY.to_string()), 3, flat)
        });
        if let Some(array) = &bond_indices {
            collection.bonds.check_length(array)?;
        }

        collection.particles.insert(structures)?;
        collection
            .particles
            .set_catalog(StandardProperty::StructureType.into(), structure_catalog());
        if let Some(array) = bond_indices {
            collection.bonds.insert(array)?;
        }

        for (structure, count) in counts.iter() {
            collection.set_attribute(
                format!("{COUNT_ATTRIBUTE_PREFIX}{}", structure.name()),
                AttributeValue::Int(count as i64),
            );
        }
        Ok(())
    }
}

/// Type catalog describing the values of the `Structure Type` property.
pub fn structure_catalog() -> ElementTypeCatalog {
    let mut catalog = ElementTypeCatalog::new();
    for structure in StructureType::ALL {
        let mut element = ElementType::with_defaults(structure.id(), structure.name());
        element.color = structure.color();
        catalog.insert(element);
    }
    catalog
}
