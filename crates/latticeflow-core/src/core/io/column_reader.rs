use super::columns::ColumnMapping;
use super::error::ImportError;
use crate::core::models::frame::FrameData;
use crate::core::models::property::{PropertyData, TypedPropertyArray};
use crate::core::models::types::TypeList;

#[derive(Debug, Clone, Copy)]
struct ColumnTarget {
    array: usize,
    component: usize,
}

/// Fills particle property arrays from whitespace-separated data lines.
///
/// Arrays are owned by the reader until [`InputColumnReader::finish`] moves
/// them into a frame, so a failed parse never leaves half-filled arrays behind.
pub struct InputColumnReader {
    targets: Vec<Option<ColumnTarget>>,
    labels: Vec<String>,
    arrays: Vec<TypedPropertyArray>,
    type_lists: Vec<Option<TypeList>>,
    required_columns: usize,
}

impl InputColumnReader {
    pub fn new(mapping: &ColumnMapping, particle_count: usize) -> Result<Self, ImportError> {
        mapping.validate()?;

        let mut arrays: Vec<TypedPropertyArray> = Vec::new();
        let mut type_lists = Vec::new();
        let mut targets = Vec::with_capacity(mapping.len());
        let mut labels = Vec::with_capacity(mapping.len());
        let mut required_columns = 0;

        for (index, column) in mapping.columns().iter().enumerate() {
            let Some(property) = &column.property else {
                targets.push(None);
                labels.push(column.column_name.clone());
                continue;
            };
            let array = match arrays.iter().position(|a| *a.kind() == property.kind) {
                Some(existing) => existing,
                None => {
                    arrays.push(TypedPropertyArray::new(
                        property.kind.clone(),
                        property.data_type,
                        property.component_count(),
                        particle_count,
                    ));
                    let typed = property.kind.standard().is_some_and(|p| p.is_typed());
                    type_lists.push(typed.then(TypeList::new));
                    arrays.len() - 1
                }
            };
            targets.push(Some(ColumnTarget {
                array,
                component: property.component.unwrap_or(0),
            }));
            labels.push(format!("{} ({property})", column.column_name));
            required_columns = index + 1;
        }

        Ok(Self {
            targets,
            labels,
            arrays,
            type_lists,
            required_columns,
        })
    }

    /// Number of leading tokens a data line must have.
    pub fn required_columns(&self) -> usize {
        self.required_columns
    }

    /// Parses one data line into element `index`. The error is a bare reason;
    /// callers attach line number and section context.
    pub fn read_particle(&mut self, index: usize, line: &str) -> Result<(), String> {
        let mut tokens = line.split_ascii_whitespace();
        for column in 0..self.required_columns {
            let Some(token) = tokens.next() else {
                return Err(format!(
                    "data line has only {column} column(s), but the column mapping expects at least {}",
                    self.required_columns
                ));
            };
            let Some(target) = self.targets[column] else {
                continue;
            };
            self.store(index, column, target, token)?;
        }
        Ok(())
    }

    /// Zero-copy variant of [`InputColumnReader::read_particle`] for mapped data.
    ///
    /// Invalid UTF-8 is replaced the same way the line reader does it, so
    /// only a mapped column holding such bytes fails to parse.
    pub fn read_particle_bytes(&mut self, index: usize, line: &[u8]) -> Result<(), String> {
        self.read_particle(index, &String::from_utf8_lossy(line))
    }

    fn store(&mut self, index: usize, column: usize, target: ColumnTarget, token: &str) -> Result<(), String> {
        let array = &mut self.arrays[target.array];
        let slot = index * array.components() + target.component;
        let invalid = |what: &str| {
            format!(
                "invalid {what} value in column {} {}: \"{token}\"",
                column + 1,
                self.labels[column]
            )
        };
        match array.data_mut() {
            PropertyData::Float(values) => {
                values[slot] = token.parse::<f64>().map_err(|_| invalid("floating-point"))?;
            }
            PropertyData::Int64(values) => {
                values[slot] = token.parse::<i64>().map_err(|_| invalid("integer"))?;
            }
            PropertyData::Int(values) => {
                values[slot] = match &mut self.type_lists[target.array] {
                    Some(list) => match token.parse::<i32>() {
                        Ok(id) if id >= 0 => list.add_type_id(id),
                        Ok(_) => return Err(invalid("type")),
                        Err(_) if token.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
                            return Err(invalid("type"));
                        }
                        Err(_) => list.add_type_name(token),
                    },
                    None => parse_int_or_bool(token).ok_or_else(|| invalid("integer"))?,
                };
            }
        }
        Ok(())
    }

    /// Sorts discovered types and moves all arrays into `frame`.
    pub fn finish(self, frame: &mut FrameData) {
        for (mut array, list) in self.arrays.into_iter().zip(self.type_lists) {
            if let Some(mut list) = list {
                if list.has_names() {
                    if let Some(values) = array.as_int_mut() {
                        list.sort_by_name(values);
                    }
                } else {
                    list.sort_by_id();
                }
                frame.particle_types.insert(array.kind().clone(), list);
            }
            frame.add_particle_property(array);
        }
    }
}

fn parse_int_or_bool(token: &str) -> Option<i32> {
    token.parse::<i32>().ok().or(match token {
        "T" | "t" | "True" | "true" => Some(1),
        "F" | "f" | "False" | "false" => Some(0),
        _ => None,
    })
}
