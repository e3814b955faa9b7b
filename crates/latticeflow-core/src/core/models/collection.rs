use super::cell::SimulationCell;
use super::frame::{Attributes, AttributeValue, FrameData, VoxelGrid};
use super::property::{PropertyKind, StandardProperty, TypedPropertyArray};
use super::reconcile::reconcile_types;
use super::types::{ElementTypeCatalog, TypeList};
use nalgebra::{Point3, Vector3};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Data integrity violation: {0}")]
pub struct IntegrityError(pub String);

/// Property arrays of one element class (particles or bonds) plus the type
/// catalogs backing their typed columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSet {
    properties: Vec<TypedPropertyArray>,
    catalogs: BTreeMap<PropertyKind, ElementTypeCatalog>,
}

impl ElementSet {
    pub fn count(&self) -> usize {
        self.properties.first().map_or(0, |p| p.len())
    }

    pub fn properties(&self) -> &[TypedPropertyArray] {
        &self.properties
    }

    pub fn property(&self, kind: &PropertyKind) -> Option<&TypedPropertyArray> {
        self.properties.iter().find(|p| p.kind() == kind)
    }

    pub fn standard(&self, property: StandardProperty) -> Option<&TypedPropertyArray> {
        self.property(&property.into())
    }

    pub fn catalog(&self, kind: &PropertyKind) -> Option<&ElementTypeCatalog> {
        self.catalogs.get(kind)
    }

    pub fn catalog_mut(&mut self, kind: &PropertyKind) -> Option<&mut ElementTypeCatalog> {
        self.catalogs.get_mut(kind)
    }

    pub fn catalogs(&self) -> impl Iterator<Item = (&PropertyKind, &ElementTypeCatalog)> {
        self.catalogs.iter()
    }

    /// Checks that `property` could be inserted without breaking the shared
    /// element count.
    pub fn check_length(&self, property: &TypedPropertyArray) -> Result<(), IntegrityError> {
        if !self.properties.is_empty() && property.len() != self.count() {
            return Err(IntegrityError(format!(
                "property '{}' has {} elements, expected {}",
                property.name(),
                property.len(),
                self.count()
            )));
        }
        Ok(())
    }

    /// Adds or replaces an array; its length must match the existing arrays.
    pub fn insert(&mut self, property: TypedPropertyArray) -> Result<(), IntegrityError> {
        self.check_length(&property)?;
        match self.properties.iter_mut().find(|p| p.kind() == property.kind()) {
            Some(slot) => *slot = property,
            None => self.properties.push(property),
        }
        Ok(())
    }

    pub fn set_catalog(&mut self, kind: PropertyKind, catalog: ElementTypeCatalog) {
        self.catalogs.insert(kind, catalog);
    }

    fn absorb(
        &mut self,
        mut properties: Vec<TypedPropertyArray>,
        types: BTreeMap<PropertyKind, TypeList>,
        is_new_file: bool,
    ) {
        for (kind, list) in &types {
            let catalog = self.catalogs.entry(kind.clone()).or_default();
            let remapping = reconcile_types(list, catalog, is_new_file);
            if remapping.is_empty() {
                continue;
            }
            debug!(property = %kind, pairs = ?remapping.pairs(), "Remapping type ids.");
            if let Some(values) = properties
                .iter_mut()
                .find(|p| p.kind() == kind)
                .and_then(|p| p.as_int_mut())
            {
                remapping.apply(values);
            }
        }
        if is_new_file {
            self.catalogs.retain(|kind, _| types.contains_key(kind));
        }
        self.properties = properties;
    }
}

/// Long-lived particle dataset that successive frames are handed over into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataCollection {
    pub cell: SimulationCell,
    pub particles: ElementSet,
    pub bonds: ElementSet,
    pub voxel_grid: Option<VoxelGrid>,
    pub attributes: Attributes,
}

impl DataCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frame(frame: FrameData) -> Result<Self, IntegrityError> {
        let mut collection = Self::new();
        collection.hand_over(frame, true)?;
        Ok(collection)
    }

    /// Moves a parsed frame into this collection.
    ///
    /// The frame is verified before anything is touched, so a failure leaves
    /// the collection unchanged. Type catalogs are reconciled so ids stay
    /// stable across frames. Unless `is_new_file` is set, the current
    /// periodic boundary flags are kept. Bonds of a periodic cell that arrive
    /// without image shifts get them from the minimum image convention.
    pub fn hand_over(&mut self, mut frame: FrameData, is_new_file: bool) -> Result<(), IntegrityError> {
        frame.verify_integrity().map_err(IntegrityError)?;

        if !is_new_file && !self.particles.properties.is_empty() {
            frame.cell.set_pbc(self.cell.pbc());
        }
        if frame.cell.has_pbc()
            && frame.standard_bond_property(StandardProperty::Topology).is_some()
            && frame.standard_bond_property(StandardProperty::PeriodicImage).is_none()
        {
            frame.generate_bond_periodic_images();
        }

        let FrameData {
            cell,
            particle_properties,
            particle_types,
            bond_properties,
            bond_types,
            voxel_grid,
            attributes,
            ..
        } = frame;

        self.cell = cell;
        self.particles.absorb(particle_properties, particle_types, is_new_file);
        self.bonds.absorb(bond_properties, bond_types, is_new_file);
        self.voxel_grid = voxel_grid;
        self.attributes = attributes;
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        self.particles.count()
    }

    pub fn positions(&self) -> Option<Vec<Point3<f64>>> {
        self.particles
            .standard(StandardProperty::Position)
            .and_then(|p| p.to_points())
    }

    /// Per-particle selection flags, if a selection column exists.
    pub fn selection(&self) -> Option<Vec<bool>> {
        let selection = self.particles.standard(StandardProperty::Selection)?;
        Some(selection.as_int()?.iter().map(|&s| s != 0).collect())
    }

    /// Bond endpoints as particle index pairs.
    pub fn bond_topology(&self) -> Option<Vec<[usize; 2]>> {
        let topology = self.bonds.standard(StandardProperty::Topology)?.as_int64()?;
        Some(
            topology
                .chunks_exact(2)
                .map(|pair| [pair[0] as usize, pair[1] as usize])
                .collect(),
        )
    }

    pub fn bond_periodic_images(&self) -> Option<Vec<Vector3<i32>>> {
        self.bonds
            .standard(StandardProperty::PeriodicImage)
            .and_then(|p| p.to_int_vectors())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::property::DataType;

    fn typed_frame(names: &[(i32, &str)], column: Vec<i32>) -> FrameData {
        let mut frame = FrameData::new();
        let mut list = TypeList::new();
        for &(id, name) in names {
            list.add_type_id(id);
            list.set_type_name(id, name);
        }
        let n = column.len();
        frame.add_particle_property(TypedPropertyArray::from_ints(
            StandardProperty::Type.into(),
            1,
            column,
        ));
        frame.add_particle_property(TypedPropertyArray::standard(StandardProperty::Position, n));
        frame
            .particle_types
            .insert(StandardProperty::Type.into(), list);
        frame.cell = SimulationCell::from_bounds([0.0; 3], [5.0; 3], [true; 3]);
        frame
    }

    #[test]
    fn second_frame_with_shifted_ids_is_remapped_to_first_frame_ids() {
        let mut collection =
            DataCollection::from_frame(typed_frame(&[(1, "Cu"), (2, "Zr")], vec![1, 2, 1])).unwrap();
        collection
            .hand_over(typed_frame(&[(1, "Zr"), (2, "Cu")], vec![2, 1, 2]), false)
            .unwrap();

        let types = collection.particles.standard(StandardProperty::Type).unwrap();
        assert_eq!(types.as_int().unwrap(), &[1, 2, 1]);
        let catalog = collection
            .particles
            .catalog(&StandardProperty::Type.into())
            .unwrap();
        assert_eq!(catalog.find_by_id(1).unwrap().name, "Cu");
    }

    #[test]
    fn animation_step_keeps_user_pbc_flags() {
        let mut collection =
            DataCollection::from_frame(typed_frame(&[(1, "Cu")], vec![1])).unwrap();
        collection.cell.set_pbc([false, true, false]);

        collection.hand_over(typed_frame(&[(1, "Cu")], vec![1]), false).unwrap();
        assert_eq!(collection.cell.pbc(), [false, true, false]);

        collection.hand_over(typed_frame(&[(1, "Cu")], vec![1]), true).unwrap();
        assert_eq!(collection.cell.pbc(), [true; 3]);
    }

    #[test]
    fn corrupt_frame_leaves_collection_untouched() {
        let mut collection =
            DataCollection::from_frame(typed_frame(&[(1, "Cu")], vec![1, 1])).unwrap();
        let before = collection.clone();

        let mut bad = typed_frame(&[(1, "Cu")], vec![1, 1]);
        bad.add_particle_property(TypedPropertyArray::user("c_pe", DataType::Float, 3));
        assert!(collection.hand_over(bad, false).is_err());
        assert_eq!(collection, before);
    }

    #[test]
    fn insert_rejects_wrong_length() {
        let mut collection =
            DataCollection::from_frame(typed_frame(&[(1, "Cu")], vec![1, 1])).unwrap();
        let wrong = TypedPropertyArray::standard(StandardProperty::StructureType, 3);
        assert!(collection.particles.insert(wrong).is_err());
        let right = TypedPropertyArray::standard(StandardProperty::StructureType, 2);
        assert!(collection.particles.insert(right).is_ok());
    }

    fn bonded_frame(pbc: [bool; 3]) -> FrameData {
        let mut frame = FrameData::new();
        frame.cell = SimulationCell::from_bounds([0.0; 3], [10.0; 3], pbc);
        frame.add_particle_property(TypedPropertyArray::from_points(
            StandardProperty::Position,
            &[Point3::new(0.5, 5.0, 5.0), Point3::new(9.5, 5.0, 5.0), Point3::new(1.5, 5.0, 5.0)],
        ));
        frame.add_bond_property(TypedPropertyArray::from_int64s(
            StandardProperty::Topology.into(),
            2,
            vec![0, 1, 0, 2],
        ));
        frame
    }

    #[test]
    fn periodic_bonds_without_images_get_minimum_image_shifts() {
        let collection = DataCollection::from_frame(bonded_frame([true; 3])).unwrap();
        let images = collection.bond_periodic_images().unwrap();
        assert_eq!(images, vec![Vector3::new(-1, 0, 0), Vector3::zeros()]);

        let open = DataCollection::from_frame(bonded_frame([false; 3])).unwrap();
        assert!(open.bond_periodic_images().is_none());
    }

    #[test]
    fn bond_images_follow_the_kept_pbc_flags() {
        let mut collection = DataCollection::from_frame(bonded_frame([false; 3])).unwrap();
        collection.cell.set_pbc([true, false, false]);
        collection.hand_over(bonded_frame([false; 3]), false).unwrap();
        let images = collection.bond_periodic_images().unwrap();
        assert_eq!(images[0], Vector3::new(-1, 0, 0));
    }
}
