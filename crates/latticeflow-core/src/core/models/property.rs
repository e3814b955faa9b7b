use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Int64,
    Float,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Int64 => "int64",
            DataType::Float => "float",
        };
        f.write_str(name)
    }
}

macro_rules! standard_properties {
    ($( $variant:ident => ($name:literal, $dtype:ident, [$($component:literal),*]) ),* $(,)?) => {
        /// Properties with a well-known meaning, shared by all file formats.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum StandardProperty {
            $($variant),*
        }

        impl StandardProperty {
            pub const ALL: &'static [StandardProperty] = &[$(StandardProperty::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(StandardProperty::$variant => $name),*
                }
            }

            pub fn data_type(self) -> DataType {
                match self {
                    $(StandardProperty::$variant => DataType::$dtype),*
                }
            }

            /// Component labels; empty for scalar properties.
            pub fn component_names(self) -> &'static [&'static str] {
                match self {
                    $(StandardProperty::$variant => &[$($component),*]),*
                }
            }
        }
    };
}

standard_properties! {
    Type => ("Particle Type", Int, []),
    Position => ("Position", Float, ["X", "Y", "Z"]),
    Selection => ("Selection", Int, []),
    Color => ("Color", Float, ["R", "G", "B"]),
    Displacement => ("Displacement", Float, ["X", "Y", "Z"]),
    DisplacementMagnitude => ("Displacement Magnitude", Float, []),
    PotentialEnergy => ("Potential Energy", Float, []),
    KineticEnergy => ("Kinetic Energy", Float, []),
    TotalEnergy => ("Total Energy", Float, []),
    Velocity => ("Velocity", Float, ["X", "Y", "Z"]),
    VelocityMagnitude => ("Velocity Magnitude", Float, []),
    Radius => ("Radius", Float, []),
    Cluster => ("Cluster", Int64, []),
    Coordination => ("Coordination", Int, []),
    StructureType => ("Structure Type", Int, []),
    Identifier => ("Particle Identifier", Int64, []),
    StressTensor => ("Stress Tensor", Float, ["XX", "YY", "ZZ", "XY", "XZ", "YZ"]),
    StrainTensor => ("Strain Tensor", Float, ["XX", "YY", "ZZ", "XY", "XZ", "YZ"]),
    DeformationGradient => ("Deformation Gradient", Float, ["XX", "YX", "ZX", "XY", "YY", "ZY", "XZ", "YZ", "ZZ"]),
    Orientation => ("Orientation", Float, ["X", "Y", "Z", "W"]),
    Force => ("Force", Float, ["X", "Y", "Z"]),
    Mass => ("Mass", Float, []),
    Charge => ("Charge", Float, []),
    PeriodicImage => ("Periodic Image", Int, ["X", "Y", "Z"]),
    Transparency => ("Transparency", Float, []),
    DipoleOrientation => ("Dipole Orientation", Float, ["X", "Y", "Z"]),
    DipoleMagnitude => ("Dipole Magnitude", Float, []),
    AngularVelocity => ("Angular Velocity", Float, ["X", "Y", "Z"]),
    AngularMomentum => ("Angular Momentum", Float, ["X", "Y", "Z"]),
    Torque => ("Torque", Float, ["X", "Y", "Z"]),
    Spin => ("Spin", Float, []),
    CentroSymmetry => ("Centrosymmetry", Float, []),
    AsphericalShape => ("Aspherical Shape", Float, ["X", "Y", "Z"]),
    Molecule => ("Molecule Identifier", Int64, []),
    MoleculeType => ("Molecule Type", Int, []),
    Topology => ("Topology", Int64, ["A", "B"]),
    BondType => ("Bond Type", Int, []),
}

impl StandardProperty {
    pub fn component_count(self) -> usize {
        self.component_names().len().max(1)
    }

    /// Whether values of this property index into a type catalog.
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            StandardProperty::Type
                | StandardProperty::StructureType
                | StandardProperty::MoleculeType
                | StandardProperty::BondType
        )
    }
}

impl fmt::Display for StandardProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPropertyError(pub String);

impl fmt::Display for UnknownPropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a standard property name", self.0)
    }
}

impl std::error::Error for UnknownPropertyError {}

impl FromStr for StandardProperty {
    type Err = UnknownPropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StandardProperty::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted) || format!("{p:?}") == wanted)
            .ok_or_else(|| UnknownPropertyError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKind {
    Standard(StandardProperty),
    User(String),
}

impl PropertyKind {
    pub fn name(&self) -> &str {
        match self {
            PropertyKind::Standard(p) => p.name(),
            PropertyKind::User(name) => name,
        }
    }

    pub fn standard(&self) -> Option<StandardProperty> {
        match self {
            PropertyKind::Standard(p) => Some(*p),
            PropertyKind::User(_) => None,
        }
    }
}

impl From<StandardProperty> for PropertyKind {
    fn from(value: StandardProperty) -> Self {
        PropertyKind::Standard(value)
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyData {
    Int(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f64>),
}

impl PropertyData {
    fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Int => PropertyData::Int(vec![0; len]),
            DataType::Int64 => PropertyData::Int64(vec![0; len]),
            DataType::Float => PropertyData::Float(vec![0.0; len]),
        }
    }

    fn raw_len(&self) -> usize {
        match self {
            PropertyData::Int(v) => v.len(),
            PropertyData::Int64(v) => v.len(),
            PropertyData::Float(v) => v.len(),
        }
    }
}

/// A named, homogeneous per-element array with a fixed number of components.
///
/// Values are stored interleaved: element `i`, component `c` lives at
/// `i * components + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedPropertyArray {
    kind: PropertyKind,
    components: usize,
    data: PropertyData,
}

impl TypedPropertyArray {
    pub fn new(kind: PropertyKind, data_type: DataType, components: usize, len: usize) -> Self {
        let components = components.max(1);
        Self {
            kind,
            components,
            data: PropertyData::zeroed(data_type, len * components),
        }
    }

    pub fn standard(property: StandardProperty, len: usize) -> Self {
        Self::new(
            property.into(),
            property.data_type(),
            property.component_count(),
            len,
        )
    }

    pub fn user(name: &str, data_type: DataType, len: usize) -> Self {
        Self::new(PropertyKind::User(name.to_string()), data_type, 1, len)
    }

    pub fn from_points(property: StandardProperty, points: &[Point3<f64>]) -> Self {
        let data = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        Self {
            kind: property.into(),
            components: 3,
            data: PropertyData::Float(data),
        }
    }

    pub fn from_ints(kind: PropertyKind, components: usize, values: Vec<i32>) -> Self {
        Self {
            kind,
            components: components.max(1),
            data: PropertyData::Int(values),
        }
    }

    pub fn from_int64s(kind: PropertyKind, components: usize, values: Vec<i64>) -> Self {
        Self {
            kind,
            components: components.max(1),
            data: PropertyData::Int64(values),
        }
    }

    pub fn from_floats(kind: PropertyKind, components: usize, values: Vec<f64>) -> Self {
        Self {
            kind,
            components: components.max(1),
            data: PropertyData::Float(values),
        }
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn data_type(&self) -> DataType {
        match self.data {
            PropertyData::Int(_) => DataType::Int,
            PropertyData::Int64(_) => DataType::Int64,
            PropertyData::Float(_) => DataType::Float,
        }
    }

    pub fn components(&self) -> usize {
        self.components
    }

    /// Number of elements (not scalar values).
    pub fn len(&self) -> usize {
        self.data.raw_len() / self.components
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &PropertyData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut PropertyData {
        &mut self.data
    }

    pub fn as_int(&self) -> Option<&[i32]> {
        match &self.data {
            PropertyData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_mut(&mut self) -> Option<&mut [i32]> {
        match &mut self.data {
            PropertyData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<&[i64]> {
        match &self.data {
            PropertyData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match &self.data {
            PropertyData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_mut(&mut self) -> Option<&mut [f64]> {
        match &mut self.data {
            PropertyData::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Reads a 3-component float array as points.
    pub fn to_points(&self) -> Option<Vec<Point3<f64>>> {
        if self.components != 3 {
            return None;
        }
        let values = self.as_float()?;
        Some(
            values
                .chunks_exact(3)
                .map(|c| Point3::new(c[0], c[1], c[2]))
                .collect(),
        )
    }

    pub fn to_int_vectors(&self) -> Option<Vec<Vector3<i32>>> {
        if self.components != 3 {
            return None;
        }
        let values = self.as_int()?;
        Some(
            values
                .chunks_exact(3)
                .map(|c| Vector3::new(c[0], c[1], c[2]))
                .collect(),
        )
    }

    /// Rearranges elements so that new element `i` is old element `order[i]`.
    pub fn reorder(&mut self, order: &[usize]) {
        fn permute<T: Copy>(values: &[T], order: &[usize], components: usize) -> Vec<T> {
            order
                .iter()
                .flat_map(|&src| values[src * components..(src + 1) * components].iter().copied())
                .collect()
        }
        let c = self.components;
        self.data = match &self.data {
            PropertyData::Int(v) => PropertyData::Int(permute(v, order, c)),
            PropertyData::Int64(v) => PropertyData::Int64(permute(v, order, c)),
            PropertyData::Float(v) => PropertyData::Float(permute(v, order, c)),
        };
    }

    pub fn component_label(&self, component: usize) -> String {
        match &self.kind {
            PropertyKind::Standard(p) => match p.component_names().get(component) {
                Some(c) => format!("{}.{}", p.name(), c),
                None => p.name().to_string(),
            },
            PropertyKind::User(name) => name.clone(),
        }
    }
}
