use super::cell::SimulationCell;
use super::property::{PropertyKind, StandardProperty, TypedPropertyArray};
use super::types::TypeList;
use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Interprets a raw token as int, then float, then text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            AttributeValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            AttributeValue::Float(f)
        } else {
            AttributeValue::Text(raw.to_string())
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Regular grid of per-voxel properties.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    pub shape: [usize; 3],
    pub properties: Vec<TypedPropertyArray>,
}

impl VoxelGrid {
    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Everything a format parser extracted from one frame of an input file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameData {
    pub cell: SimulationCell,
    pub particle_properties: Vec<TypedPropertyArray>,
    pub particle_types: BTreeMap<PropertyKind, TypeList>,
    pub bond_properties: Vec<TypedPropertyArray>,
    pub bond_types: BTreeMap<PropertyKind, TypeList>,
    pub voxel_grid: Option<VoxelGrid>,
    pub attributes: Attributes,
    pub detected_additional_frames: bool,
    pub status: String,
}

impl FrameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particle_count(&self) -> usize {
        self.particle_properties.first().map_or(0, |p| p.len())
    }

    pub fn bond_count(&self) -> usize {
        self.bond_properties.first().map_or(0, |p| p.len())
    }

    /// Inserts a particle property, replacing one of the same kind.
    pub fn add_particle_property(&mut self, property: TypedPropertyArray) {
        replace_or_push(&mut self.particle_properties, property);
    }

    pub fn add_bond_property(&mut self, property: TypedPropertyArray) {
        replace_or_push(&mut self.bond_properties, property);
    }

    pub fn particle_property(&self, kind: &PropertyKind) -> Option<&TypedPropertyArray> {
        self.particle_properties.iter().find(|p| p.kind() == kind)
    }

    pub fn particle_property_mut(&mut self, kind: &PropertyKind) -> Option<&mut TypedPropertyArray> {
        self.particle_properties.iter_mut().find(|p| p.kind() == kind)
    }

    pub fn standard_particle_property(&self, property: StandardProperty) -> Option<&TypedPropertyArray> {
        self.particle_property(&property.into())
    }

    pub fn standard_bond_property(&self, property: StandardProperty) -> Option<&TypedPropertyArray> {
        let kind = property.into();
        self.bond_properties.iter().find(|p| *p.kind() == kind)
    }

    /// Checks that every array agrees on the particle/bond count and that
    /// bond topology only references existing particles.
    pub fn verify_integrity(&self) -> Result<(), String> {
        verify_uniform_length(&self.particle_properties, "particle")?;
        verify_uniform_length(&self.bond_properties, "bond")?;

        let particle_count = self.particle_count() as i64;
        if let Some(topology) = self.standard_bond_property(StandardProperty::Topology) {
            let pairs = topology
                .as_int64()
                .ok_or_else(|| "bond topology array must hold 64-bit integers".to_string())?;
            if let Some(bad) = pairs.iter().find(|&&i| i < 0 || i >= particle_count) {
                return Err(format!(
                    "bond topology references particle index {bad}, but there are only {particle_count} particles"
                ));
            }
        }
        if let Some(grid) = &self.voxel_grid {
            let expected = grid.voxel_count();
            if let Some(p) = grid.properties.iter().find(|p| p.len() != expected) {
                return Err(format!(
                    "voxel property '{}' has {} elements, expected {expected}",
                    p.name(),
                    p.len()
                ));
            }
        }
        Ok(())
    }

    /// Reorders all particle arrays by ascending identifier and remaps bond
    /// topology accordingly. Does nothing without an identifier column.
    pub fn sort_particles_by_id(&mut self) {
        let Some(ids) = self
            .standard_particle_property(StandardProperty::Identifier)
            .and_then(|p| p.as_int64())
        else {
            return;
        };
        if ids.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by_key(|&i| ids[i]);

        for property in &mut self.particle_properties {
            property.reorder(&order);
        }

        let mut inverse = vec![0i64; order.len()];
        for (new_index, &old_index) in order.iter().enumerate() {
            inverse[old_index] = new_index as i64;
        }
        let topology_kind = PropertyKind::Standard(StandardProperty::Topology);
        if let Some(topology) = self.bond_properties.iter_mut().find(|p| *p.kind() == topology_kind) {
            if let super::property::PropertyData::Int64(pairs) = topology.data_mut() {
                for index in pairs.iter_mut() {
                    if let Some(&mapped) = usize::try_from(*index).ok().and_then(|i| inverse.get(i)) {
                        *index = mapped;
                    }
                }
            }
        }
    }

    /// Derives the periodic image of each bond from particle positions using
    /// the minimum image convention.
    pub fn generate_bond_periodic_images(&mut self) {
        let (Some(positions), Some(topology)) = (
            self.standard_particle_property(StandardProperty::Position)
                .and_then(|p| p.to_points()),
            self.standard_bond_property(StandardProperty::Topology)
                .and_then(|p| p.as_int64()),
        ) else {
            return;
        };
        let Some(inverse) = self.cell.inverse_matrix() else {
            return;
        };
        let pbc = self.cell.pbc();

        let mut images = Vec::with_capacity(topology.len() / 2 * 3);
        for pair in topology.chunks_exact(2) {
            let (a, b) = (pair[0] as usize, pair[1] as usize);
            let mut shift = Vector3::<i32>::zeros();
            if let (Some(pa), Some(pb)) = (positions.get(a), positions.get(b)) {
                let reduced = inverse * (pb - pa);
                for axis in 0..3 {
                    if pbc[axis] {
                        shift[axis] = -((reduced[axis] + 0.5).floor() as i32);
                    }
                }
            }
            images.extend_from_slice(shift.as_slice());
        }
        self.add_bond_property(TypedPropertyArray::from_ints(
            StandardProperty::PeriodicImage.into(),
            3,
            images,
        ));
    }
}

fn replace_or_push(list: &mut Vec<TypedPropertyArray>, property: TypedPropertyArray) {
    match list.iter_mut().find(|p| p.kind() == property.kind()) {
        Some(slot) => *slot = property,
        None => list.push(property),
    }
}

fn verify_uniform_length(properties: &[TypedPropertyArray], what: &str) -> Result<(), String> {
    let Some(first) = properties.first() else {
        return Ok(());
    };
    match properties.iter().find(|p| p.len() != first.len()) {
        Some(p) => Err(format!(
            "{what} property '{}' has {} elements, but '{}' has {}",
            p.name(),
            p.len(),
            first.name(),
            first.len()
        )),
        None => Ok(()),
    }
}
