use super::error::ImportError;
use crate::core::models::property::{DataType, PropertyKind, StandardProperty};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Declared type of a file column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnDataType {
    Int,
    Int64,
    Float,
    String,
}

impl ColumnDataType {
    pub fn to_data_type(self) -> Option<DataType> {
        match self {
            ColumnDataType::Int => Some(DataType::Int),
            ColumnDataType::Int64 => Some(DataType::Int64),
            ColumnDataType::Float => Some(DataType::Float),
            ColumnDataType::String => None,
        }
    }
}

impl From<DataType> for ColumnDataType {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Int => ColumnDataType::Int,
            DataType::Int64 => ColumnDataType::Int64,
            DataType::Float => ColumnDataType::Float,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyReference {
    pub kind: PropertyKind,
    pub component: Option<usize>,
    pub data_type: DataType,
}

impl PropertyReference {
    pub fn standard(property: StandardProperty, component: Option<usize>) -> Self {
        Self {
            kind: property.into(),
            component,
            data_type: property.data_type(),
        }
    }

    pub fn component_count(&self) -> usize {
        match &self.kind {
            PropertyKind::Standard(p) => p.component_count(),
            PropertyKind::User(_) => 1,
        }
    }
}

impl fmt::Display for PropertyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, self.component) {
            (PropertyKind::Standard(p), Some(c)) if p.component_count() > 1 => {
                write!(f, "{}.{}", p.name(), p.component_names().get(c).unwrap_or(&"?"))
            }
            (kind, _) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputColumnInfo {
    pub column_name: String,
    pub property: Option<PropertyReference>,
}

/// Ordered assignment of file columns to particle properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<ColumnRecord>", try_from = "Vec<ColumnRecord>")]
pub struct ColumnMapping {
    columns: Vec<InputColumnInfo>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapping with one unmapped entry per column name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            columns: names
                .iter()
                .map(|n| InputColumnInfo {
                    column_name: n.as_ref().to_string(),
                    property: None,
                })
                .collect(),
        }
    }

    /// The minimal `type x y z` layout used for headerless files.
    pub fn default_four_columns() -> Self {
        let mut mapping = Self::from_names(&["type", "x", "y", "z"]);
        mapping.map_standard_column(0, StandardProperty::Type, None);
        for axis in 0..3 {
            mapping.map_standard_column(axis + 1, StandardProperty::Position, Some(axis));
        }
        mapping
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[InputColumnInfo] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }

    fn slot(&mut self, index: usize) -> &mut InputColumnInfo {
        if index >= self.columns.len() {
            self.columns.resize_with(index + 1, InputColumnInfo::default);
        }
        &mut self.columns[index]
    }

    pub fn map_standard_column(&mut self, index: usize, property: StandardProperty, component: Option<usize>) {
        self.slot(index).property = Some(PropertyReference::standard(property, component));
    }

    /// Maps a column to a user-named property. String columns cannot be
    /// stored; they are left unmapped and `false` is returned.
    pub fn map_user_column(&mut self, index: usize, name: &str, data_type: ColumnDataType) -> bool {
        let Some(data_type) = data_type.to_data_type() else {
            warn!(column = index + 1, name, "String columns are not supported and will be ignored.");
            self.slot(index).property = None;
            return false;
        };
        self.slot(index).property = Some(PropertyReference {
            kind: PropertyKind::User(name.to_string()),
            component: None,
            data_type,
        });
        true
    }

    pub fn unmap_column(&mut self, index: usize) {
        if let Some(column) = self.columns.get_mut(index) {
            column.property = None;
        }
    }

    pub fn is_mapped(&self, property: StandardProperty, component: Option<usize>) -> bool {
        let kind = PropertyKind::Standard(property);
        self.columns.iter().filter_map(|c| c.property.as_ref()).any(|p| {
            p.kind == kind && (component.is_none() || p.component == component)
        })
    }

    pub fn has_z_coordinate(&self) -> bool {
        self.is_mapped(StandardProperty::Position, Some(2))
    }

    /// Rejects mappings that cannot be applied to any file.
    pub fn validate(&self) -> Result<(), ImportError> {
        for (index, column) in self.columns.iter().enumerate() {
            let Some(property) = &column.property else {
                continue;
            };
            if let PropertyKind::User(name) = &property.kind {
                if name.trim().is_empty() {
                    return Err(ImportError::Configuration(format!(
                        "column {} is mapped to a property without a name",
                        index + 1
                    )));
                }
            }
            let count = property.component_count();
            match property.component {
                Some(c) if c >= count => {
                    return Err(ImportError::Configuration(format!(
                        "column {} ('{}') selects component {c} of property '{}', which has only {count} component(s)",
                        index + 1,
                        column.column_name,
                        property.kind
                    )));
                }
                None if count > 1 => {
                    return Err(ImportError::Configuration(format!(
                        "column {} ('{}') is mapped to vector property '{}' without a component",
                        index + 1,
                        column.column_name,
                        property.kind
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ColumnRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<ColumnDataType>,
}

impl From<ColumnMapping> for Vec<ColumnRecord> {
    fn from(mapping: ColumnMapping) -> Self {
        mapping
            .columns
            .into_iter()
            .map(|column| match column.property {
                None => ColumnRecord {
                    name: column.column_name,
                    property: None,
                    component: None,
                    data_type: None,
                },
                Some(p) => ColumnRecord {
                    name: column.column_name,
                    property: Some(p.kind.name().to_string()),
                    component: p.component,
                    data_type: Some(p.data_type.into()),
                },
            })
            .collect()
    }
}

impl TryFrom<Vec<ColumnRecord>> for ColumnMapping {
    type Error = ImportError;

    fn try_from(records: Vec<ColumnRecord>) -> Result<Self, Self::Error> {
        let mut mapping = ColumnMapping::from_names(
            &records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        );
        for (index, record) in records.iter().enumerate() {
            let Some(property) = &record.property else {
                continue;
            };
            match property.parse::<StandardProperty>() {
                Ok(standard) => {
                    if let Some(dt) = record.data_type {
                        if dt.to_data_type() != Some(standard.data_type()) {
                            return Err(ImportError::Configuration(format!(
                                "column '{}': standard property '{}' is stored as {}, not {dt:?}",
                                record.name,
                                standard,
                                standard.data_type()
                            )));
                        }
                    }
                    let component = record.component.or((standard.component_count() == 1).then_some(0));
                    mapping.map_standard_column(index, standard, component);
                }
                Err(_) => {
                    let dt = record.data_type.unwrap_or(ColumnDataType::Float);
                    mapping.map_user_column(index, property, dt);
                }
            }
        }
        mapping.validate()?;
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Document {
        columns: ColumnMapping,
    }

    #[test]
    fn default_four_columns_maps_type_and_position() {
        let mapping = ColumnMapping::default_four_columns();
        assert_eq!(mapping.len(), 4);
        assert!(mapping.is_mapped(StandardProperty::Type, None));
        assert!(mapping.has_z_coordinate());
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn string_user_columns_are_left_unmapped() {
        let mut mapping = ColumnMapping::from_names(&["label"]);
        assert!(!mapping.map_user_column(0, "label", ColumnDataType::String));
        assert!(mapping.columns()[0].property.is_none());
    }

    #[test]
    fn validate_rejects_out_of_range_components() {
        let mut mapping = ColumnMapping::from_names(&["w"]);
        mapping.map_standard_column(0, StandardProperty::Position, Some(3));
        assert!(matches!(mapping.validate(), Err(ImportError::Configuration(_))));
    }

    #[test]
    fn validate_rejects_vector_property_without_component() {
        let mut mapping = ColumnMapping::from_names(&["v"]);
        mapping.map_standard_column(0, StandardProperty::Velocity, None);
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn mapping_survives_toml_serialization() {
        let mut mapping = ColumnMapping::from_names(&["id", "x", "skip", "c_pe"]);
        mapping.map_standard_column(0, StandardProperty::Identifier, Some(0));
        mapping.map_standard_column(1, StandardProperty::Position, Some(0));
        mapping.map_user_column(3, "c_pe", ColumnDataType::Float);
        let document = Document { columns: mapping };

        let text = toml::to_string(&document).unwrap();
        assert!(text.contains("property = \"Position\""));
        let parsed: Document = toml::from_str(&text).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn toml_records_accept_string_columns_with_a_warning() {
        let text = r#"
            [[columns]]
            name = "element"
            property = "Particle Type"

            [[columns]]
            name = "label"
            property = "label"
            data-type = "string"
        "#;
        let parsed: Document = toml::from_str(text).unwrap();
        assert!(parsed.columns.is_mapped(StandardProperty::Type, None));
        assert!(parsed.columns.columns()[1].property.is_none());
    }

    #[test]
    fn toml_records_reject_mismatched_standard_types() {
        let text = r#"
            [[columns]]
            name = "x"
            property = "Position"
            component = 0
            data-type = "int"
        "#;
        assert!(toml::from_str::<Document>(text).is_err());
    }
}
