use super::column_reader::InputColumnReader;
use super::columns::{ColumnDataType, ColumnMapping};
use super::coordinates::{positions_within, rescale_reduced_positions};
use super::error::ImportError;
use super::reader::{TextReader, split_line};
use super::traits::{FormatParser, FrameMarker, HeaderInfo};
use crate::core::models::cell::SimulationCell;
use crate::core::models::collection::IntegrityError;
use crate::core::models::frame::{AttributeValue, FrameData};
use crate::core::models::property::{PropertyKind, StandardProperty};
use crate::engine::config::ImportOptions;
use crate::engine::task::Task;
use nalgebra::{Point3, Vector3};
use phf::{Map, phf_map};
use tracing::debug;

const CONTEXT: &str = "LAMMPS dump file";

/// Upper bound accepted while scanning; larger counts indicate a corrupt file.
const MAX_SCAN_ATOMS: u64 = 100_000_000_000;
const MAX_FRAME_ATOMS: u64 = i32::MAX as u64;
const EXCERPT_LINES: usize = 5;

static COLUMN_NAMES: Map<&'static str, (StandardProperty, usize)> = phf_map! {
    "x" => (StandardProperty::Position, 0),
    "xu" => (StandardProperty::Position, 0),
    "xs" => (StandardProperty::Position, 0),
    "xsu" => (StandardProperty::Position, 0),
    "coordinates" => (StandardProperty::Position, 0),
    "y" => (StandardProperty::Position, 1),
    "yu" => (StandardProperty::Position, 1),
    "ys" => (StandardProperty::Position, 1),
    "ysu" => (StandardProperty::Position, 1),
    "z" => (StandardProperty::Position, 2),
    "zu" => (StandardProperty::Position, 2),
    "zs" => (StandardProperty::Position, 2),
    "zsu" => (StandardProperty::Position, 2),
    "vx" => (StandardProperty::Velocity, 0),
    "velocities" => (StandardProperty::Velocity, 0),
    "vy" => (StandardProperty::Velocity, 1),
    "vz" => (StandardProperty::Velocity, 2),
    "id" => (StandardProperty::Identifier, 0),
    "type" => (StandardProperty::Type, 0),
    "element" => (StandardProperty::Type, 0),
    "atom_types" => (StandardProperty::Type, 0),
    "mass" => (StandardProperty::Mass, 0),
    "radius" => (StandardProperty::Radius, 0),
    "mol" => (StandardProperty::Molecule, 0),
    "q" => (StandardProperty::Charge, 0),
    "ix" => (StandardProperty::PeriodicImage, 0),
    "iy" => (StandardProperty::PeriodicImage, 1),
    "iz" => (StandardProperty::PeriodicImage, 2),
    "fx" => (StandardProperty::Force, 0),
    "forces" => (StandardProperty::Force, 0),
    "fy" => (StandardProperty::Force, 1),
    "fz" => (StandardProperty::Force, 2),
    "mux" => (StandardProperty::DipoleOrientation, 0),
    "muy" => (StandardProperty::DipoleOrientation, 1),
    "muz" => (StandardProperty::DipoleOrientation, 2),
    "mu" => (StandardProperty::DipoleMagnitude, 0),
    "omegax" => (StandardProperty::AngularVelocity, 0),
    "omegay" => (StandardProperty::AngularVelocity, 1),
    "omegaz" => (StandardProperty::AngularVelocity, 2),
    "angmomx" => (StandardProperty::AngularMomentum, 0),
    "angmomy" => (StandardProperty::AngularMomentum, 1),
    "angmomz" => (StandardProperty::AngularMomentum, 2),
    "tqx" => (StandardProperty::Torque, 0),
    "tqy" => (StandardProperty::Torque, 1),
    "tqz" => (StandardProperty::Torque, 2),
    "spin" => (StandardProperty::Spin, 0),
    "c_cna" => (StandardProperty::StructureType, 0),
    "pattern" => (StandardProperty::StructureType, 0),
    "c_epot" => (StandardProperty::PotentialEnergy, 0),
    "c_kpot" => (StandardProperty::KineticEnergy, 0),
    "c_stress[1]" => (StandardProperty::StressTensor, 0),
    "c_stress[2]" => (StandardProperty::StressTensor, 1),
    "c_stress[3]" => (StandardProperty::StressTensor, 2),
    "c_stress[4]" => (StandardProperty::StressTensor, 3),
    "c_stress[5]" => (StandardProperty::StressTensor, 4),
    "c_stress[6]" => (StandardProperty::StressTensor, 5),
    "c_orient[1]" => (StandardProperty::Orientation, 0),
    "c_orient[2]" => (StandardProperty::Orientation, 1),
    "c_orient[3]" => (StandardProperty::Orientation, 2),
    "c_orient[4]" => (StandardProperty::Orientation, 3),
    "c_shape[1]" => (StandardProperty::AsphericalShape, 0),
    "c_shape[2]" => (StandardProperty::AsphericalShape, 1),
    "c_shape[3]" => (StandardProperty::AsphericalShape, 2),
    "selection" => (StandardProperty::Selection, 0),
    "v_transparency" => (StandardProperty::Transparency, 0),
};

const REDUCED_COLUMN_NAMES: [&str; 6] = ["xs", "xsu", "ys", "ysu", "zs", "zsu"];

/// Maps LAMMPS column names onto standard properties; unknown names become
/// float user properties.
pub fn automatic_mapping<S: AsRef<str>>(names: &[S]) -> ColumnMapping {
    let mut mapping = ColumnMapping::from_names(names);
    for (index, name) in names.iter().enumerate() {
        let name = name.as_ref();
        match COLUMN_NAMES.get(name.to_ascii_lowercase().as_str()) {
            Some(&(property, component)) => mapping.map_standard_column(index, property, Some(component)),
            None => {
                mapping.map_user_column(index, name, ColumnDataType::Float);
            }
        }
    }
    mapping
}

/// Whether the file labels its position columns as reduced coordinates.
///
/// When several columns feed `Position`, the last one decides.
fn names_indicate_reduced(mapping: &ColumnMapping, names: &[String]) -> bool {
    let position = PropertyKind::Standard(StandardProperty::Position);
    mapping
        .columns()
        .iter()
        .zip(names)
        .filter(|(column, _)| column.property.as_ref().is_some_and(|p| p.kind == position))
        .last()
        .is_some_and(|(_, name)| REDUCED_COLUMN_NAMES.contains(&name.to_ascii_lowercase().as_str()))
}

/// Cell of a triclinic `BOX BOUNDS xy xz yz` section.
///
/// LAMMPS writes the bounding box of the tilted cell, which is converted back
/// to the cell's own lower and upper bounds here.
fn triclinic_cell(bounds: [[f64; 3]; 3], pbc: [bool; 3]) -> SimulationCell {
    let (xy, xz, yz) = (bounds[0][2], bounds[1][2], bounds[2][2]);
    let xlo = bounds[0][0] - xy.min(xz).min(xy + xz).min(0.0);
    let xhi = bounds[0][1] - xy.max(xz).max(xy + xz).max(0.0);
    let ylo = bounds[1][0] - yz.min(0.0);
    let yhi = bounds[1][1] - yz.max(0.0);
    let (zlo, zhi) = (bounds[2][0], bounds[2][1]);
    SimulationCell::from_vectors(
        Vector3::new(xhi - xlo, 0.0, 0.0),
        Vector3::new(xy, yhi - ylo, 0.0),
        Vector3::new(xz, yz, zhi - zlo),
        Point3::new(xlo, ylo, zlo),
        pbc,
    )
}

/// Periodicity from the boundary tokens after a `BOX BOUNDS` header.
fn parse_pbc_flags(tokens: &[&str]) -> [bool; 3] {
    let mut pbc = [false; 3];
    if tokens.len() >= 3 {
        for (flag, token) in pbc.iter_mut().zip(tokens) {
            *flag = *token == "pp";
        }
    }
    pbc
}

fn next_line(reader: &mut TextReader) -> Result<(), ImportError> {
    if reader.read_line()? {
        Ok(())
    } else {
        Err(ImportError::eof(CONTEXT, reader.line_number()))
    }
}

fn invalid_line(reader: &TextReader, reason: impl Into<String>) -> ImportError {
    ImportError::parse(CONTEXT, reader.line_number(), reader.line(), reason)
}

fn parse_timestep(reader: &mut TextReader) -> Result<i64, ImportError> {
    next_line(reader)?;
    reader
        .line()
        .split_ascii_whitespace()
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(|| invalid_line(reader, "invalid timestep number"))
}

fn parse_atom_count(reader: &mut TextReader, limit: u64) -> Result<u64, ImportError> {
    next_line(reader)?;
    let count = reader
        .line()
        .split_ascii_whitespace()
        .next()
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or_else(|| invalid_line(reader, "invalid number of atoms"))?;
    if count > limit {
        return Err(invalid_line(
            reader,
            format!("number of atoms exceeds the supported maximum of {limit}"),
        ));
    }
    Ok(count)
}

fn parse_bounds_line<const N: usize>(reader: &mut TextReader) -> Result<[f64; N], ImportError> {
    next_line(reader)?;
    let mut values = [0.0; N];
    let mut tokens = reader.line().split_ascii_whitespace();
    for value in values.iter_mut() {
        *value = tokens
            .next()
            .and_then(|t| t.parse::<f64>().ok())
            .ok_or_else(|| invalid_line(reader, "invalid box size"))?;
    }
    Ok(values)
}

/// Skips an unrecognized `ITEM:` section. Returns the position of the next
/// `ITEM:` line, which is left as the current line, or `None` at end of file.
fn skip_section(reader: &mut TextReader) -> Result<Option<(u64, u64)>, ImportError> {
    loop {
        let start = (reader.byte_offset(), reader.line_number());
        if !reader.read_line()? {
            return Ok(None);
        }
        if reader.line_starts_with("ITEM:") {
            return Ok(Some(start));
        }
    }
}

/// Reads `count` particle lines, preferring the zero-copy path over mapped data.
fn read_atoms(
    reader: &mut TextReader,
    columns: &mut InputColumnReader,
    count: usize,
    task: &Task,
) -> Result<(), ImportError> {
    let first_line = reader.line_number() + 1;

    if let Some(bytes) = reader.mapped_bytes() {
        let mut consumed = 0;
        for index in 0..count {
            if !task.set_progress_value_intermittent(index as u64) {
                return Err(ImportError::Canceled);
            }
            if consumed >= bytes.len() {
                return Err(ImportError::eof(CONTEXT, first_line + index as u64 - 1));
            }
            let (line, len) = split_line(&bytes[consumed..]);
            columns.read_particle_bytes(index, line).map_err(|reason| {
                ImportError::parse(
                    CONTEXT,
                    first_line + index as u64,
                    &String::from_utf8_lossy(line),
                    reason,
                )
            })?;
            consumed += len;
        }
        reader.consume_mapped(consumed, count as u64);
        return Ok(());
    }

    for index in 0..count {
        if !task.set_progress_value_intermittent(index as u64) {
            return Err(ImportError::Canceled);
        }
        next_line(reader)?;
        columns
            .read_particle(index, reader.line())
            .map_err(|reason| invalid_line(reader, reason))?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LammpsDumpParser;

impl LammpsDumpParser {
    fn read_atoms_section(
        &self,
        reader: &mut TextReader,
        frame: &mut FrameData,
        atom_count: usize,
        options: &ImportOptions,
        task: &Task,
    ) -> Result<(), ImportError> {
        let names: Vec<String> = reader
            .line()
            .split_ascii_whitespace()
            .skip(2)
            .map(str::to_string)
            .collect();

        let mapping = match &options.column_mapping {
            Some(custom) => {
                if !names.is_empty() && custom.len() > names.len() {
                    return Err(ImportError::Configuration(format!(
                        "the column mapping has {} columns but the file has only {}",
                        custom.len(),
                        names.len()
                    )));
                }
                custom.clone()
            }
            None => automatic_mapping(&names),
        };

        let mut columns = InputColumnReader::new(&mapping, atom_count)?;
        task.set_progress_maximum(atom_count as u64);
        read_atoms(reader, &mut columns, atom_count, task)?;
        columns.finish(frame);

        let reduced = if !names.is_empty() {
            names_indicate_reduced(&mapping, &names)
        } else {
            options.detect_reduced_coordinates && positions_within(frame, -0.02, 1.02)
        };
        if reduced {
            debug!("Converting reduced coordinates to absolute coordinates.");
            rescale_reduced_positions(frame, 0.0);
        }

        frame.cell.set_2d(!mapping.has_z_coordinate());
        Ok(())
    }
}

impl FormatParser for LammpsDumpParser {
    fn name(&self) -> &'static str {
        "LAMMPS dump"
    }

    fn check_file_format(&self, reader: &mut TextReader) -> Result<bool, ImportError> {
        Ok(reader.read_line()? && reader.line_starts_with("ITEM: TIMESTEP"))
    }

    fn discover_frames(&self, reader: &mut TextReader, task: &Task) -> Result<Vec<FrameMarker>, ImportError> {
        task.set_progress_text(format!(
            "Scanning LAMMPS dump file {}",
            reader.path().map(|p| p.display().to_string()).unwrap_or_default()
        ));
        task.set_progress_maximum(reader.underlying_size());

        let mut frames = Vec::new();
        let mut pending: Option<FrameMarker> = None;
        let mut atom_count = 0u64;
        let mut start = (reader.byte_offset(), reader.line_number());
        let mut line_ready = false;

        loop {
            if !line_ready {
                start = (reader.byte_offset(), reader.line_number());
                if !reader.read_line()? {
                    break;
                }
            }
            line_ready = false;

            if reader.line_starts_with("ITEM: TIMESTEP") {
                let timestep = parse_timestep(reader)?;
                pending = Some(FrameMarker::new(reader, start.0, start.1, format!("Timestep {timestep}")));
            } else if reader.line_starts_with("ITEM: NUMBER OF ATOMS") {
                atom_count = parse_atom_count(reader, MAX_SCAN_ATOMS)?;
            } else if reader.line_starts_with("ITEM: ATOMS") {
                for _ in 0..atom_count {
                    if !reader.read_line()? {
                        debug!(frames = frames.len(), "Discarding truncated trailing frame.");
                        return Ok(frames);
                    }
                    if !task.set_progress_value_intermittent(reader.underlying_byte_offset()) {
                        return Ok(frames);
                    }
                }
                frames.extend(pending.take());
            } else if reader.line_starts_with("ITEM:") {
                match skip_section(reader)? {
                    Some(next) => start = next,
                    None => break,
                }
                line_ready = true;
            } else if !reader.line().trim().is_empty() {
                return Err(invalid_line(reader, "line is not part of any ITEM section"));
            }

            if !task.set_progress_value_intermittent(reader.underlying_byte_offset()) {
                return Ok(frames);
            }
        }
        Ok(frames)
    }

    fn parse_frame(
        &self,
        reader: &mut TextReader,
        marker: &FrameMarker,
        options: &ImportOptions,
        task: &Task,
    ) -> Result<FrameData, ImportError> {
        task.set_progress_text(format!("Reading LAMMPS dump file ({})", marker.label));
        reader.seek(marker.byte_offset, marker.line_number)?;

        let mut frame = FrameData::new();
        let mut pbc = [false; 3];
        let mut timestep = None;
        let mut atom_count = None;
        let mut line_ready = false;

        loop {
            if !line_ready && !reader.read_line()? {
                break;
            }
            line_ready = false;

            if reader.line_starts_with("ITEM: TIMESTEP") {
                let value = parse_timestep(reader)?;
                frame.attributes.insert("Timestep".to_string(), AttributeValue::Int(value));
                timestep = Some(value);
            } else if reader.line_starts_with("ITEM: NUMBER OF ATOMS") {
                atom_count = Some(parse_atom_count(reader, MAX_FRAME_ATOMS)? as usize);
            } else if reader.line_starts_with("ITEM: BOX BOUNDS xy xz yz") {
                let header = reader.line().to_string();
                let tokens: Vec<&str> = header.split_ascii_whitespace().skip(6).collect();
                pbc = parse_pbc_flags(&tokens);
                let bounds = [
                    parse_bounds_line::<3>(reader)?,
                    parse_bounds_line::<3>(reader)?,
                    parse_bounds_line::<3>(reader)?,
                ];
                frame.cell = triclinic_cell(bounds, pbc);
            } else if reader.line_starts_with("ITEM: BOX BOUNDS") {
                let header = reader.line().to_string();
                let tokens: Vec<&str> = header.split_ascii_whitespace().skip(3).collect();
                pbc = parse_pbc_flags(&tokens);
                let mut lo = [0.0; 3];
                let mut hi = [0.0; 3];
                for axis in 0..3 {
                    [lo[axis], hi[axis]] = parse_bounds_line::<2>(reader)?;
                }
                frame.cell = SimulationCell::from_bounds(lo, hi, pbc);
            } else if reader.line_starts_with("ITEM: ATOMS") {
                let count = atom_count
                    .ok_or_else(|| invalid_line(reader, "ITEM: ATOMS section precedes ITEM: NUMBER OF ATOMS"))?;
                frame.cell.set_pbc(pbc);
                self.read_atoms_section(reader, &mut frame, count, options, task)?;

                if frame.cell.is_degenerate() {
                    return Err(IntegrityError("simulation cell has zero volume".to_string()).into());
                }
                if !reader.eof() && reader.read_line()? {
                    frame.detected_additional_frames = reader.line_starts_with("ITEM: TIMESTEP");
                }
                if options.sort_particles {
                    frame.sort_particles_by_id();
                }
                frame.status = match timestep {
                    Some(t) => format!("{count} particles at timestep {t}"),
                    None => format!("{count} particles"),
                };
                frame.verify_integrity().map_err(IntegrityError)?;
                return Ok(frame);
            } else if reader.line_starts_with("ITEM:") {
                debug!(line = reader.line_number(), header = reader.line(), "Skipping unknown ITEM section.");
                if skip_section(reader)?.is_none() {
                    break;
                }
                line_ready = true;
            } else if !reader.line().trim().is_empty() {
                return Err(invalid_line(reader, "line is not part of any ITEM section"));
            }
        }

        Err(ImportError::eof(
            "LAMMPS dump file (no ITEM: ATOMS section found)",
            reader.line_number(),
        ))
    }

    fn inspect_header(&self, reader: &mut TextReader) -> Result<HeaderInfo, ImportError> {
        while reader.read_line()? {
            if !reader.line_starts_with("ITEM: ATOMS") {
                continue;
            }
            let names: Vec<String> = reader
                .line()
                .split_ascii_whitespace()
                .skip(2)
                .map(str::to_string)
                .collect();
            let mut excerpt = vec![reader.line().to_string()];
            while excerpt.len() <= EXCERPT_LINES && reader.read_line()? {
                if reader.line_starts_with("ITEM:") {
                    break;
                }
                excerpt.push(reader.line().to_string());
            }
            let mapping = if names.is_empty() {
                let count = excerpt
                    .get(1)
                    .map_or(0, |line| line.split_ascii_whitespace().count());
                let placeholders: Vec<String> = (1..=count).map(|i| format!("Column {i}")).collect();
                ColumnMapping::from_names(&placeholders)
            } else {
                automatic_mapping(&names)
            };
            return Ok(HeaderInfo { mapping, excerpt });
        }
        Err(ImportError::eof(
            "LAMMPS dump file (no ITEM: ATOMS section found)",
            reader.line_number(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::{Progress, ProgressReporter};
    use std::sync::{Arc, OnceLock};

    const SIMPLE: &str = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
4
ITEM: BOX BOUNDS
0 10
0 10
0 10
ITEM: ATOMS id type x y z
1 1 0 0 0
2 1 5 0 0
3 2 0 5 0
4 2 0 0 5
";

    fn repeated_frames(count: usize) -> String {
        (0..count)
            .map(|i| SIMPLE.replacen("ITEM: TIMESTEP\n0", &format!("ITEM: TIMESTEP\n{}", i * 100), 1))
            .collect()
    }

    fn parse_first(text: &str, options: &ImportOptions) -> Result<FrameData, ImportError> {
        let mut reader = TextReader::from_bytes(text);
        let task = Task::new();
        let frames = LammpsDumpParser.discover_frames(&mut reader, &task)?;
        LammpsDumpParser.parse_frame(&mut reader, &frames[0], options, &task)
    }

    #[test]
    fn parses_orthogonal_frame() {
        let frame = parse_first(SIMPLE, &ImportOptions::default()).unwrap();
        assert_eq!(frame.particle_count(), 4);
        assert!((frame.cell.volume() - 1000.0).abs() < 1e-9);
        assert_eq!(frame.cell.pbc(), [false; 3]);
        assert!(!frame.cell.is_2d());
        assert_eq!(frame.attributes["Timestep"], AttributeValue::Int(0));
        assert!(!frame.detected_additional_frames);

        let positions = frame.standard_particle_property(StandardProperty::Position).unwrap();
        assert_eq!(&positions.as_float().unwrap()[3..6], &[5.0, 0.0, 0.0]);
        let types = &frame.particle_types[&StandardProperty::Type.into()];
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn discovers_one_marker_per_timestep() {
        let text = repeated_frames(3);
        let mut reader = TextReader::from_bytes(text.as_str());
        let frames = LammpsDumpParser.discover_frames(&mut reader, &Task::new()).unwrap();
        let labels: Vec<_> = frames.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["Timestep 0", "Timestep 100", "Timestep 200"]);
        assert_eq!(frames[0].byte_offset, 0);
        assert_eq!(frames[1].line_number, 13);

        let frame = LammpsDumpParser
            .parse_frame(&mut reader, &frames[1], &ImportOptions::default(), &Task::new())
            .unwrap();
        assert_eq!(frame.attributes["Timestep"], AttributeValue::Int(100));
        assert!(frame.detected_additional_frames);
    }

    #[test]
    fn truncated_last_frame_is_not_reported() {
        let mut text = repeated_frames(2);
        text.truncate(text.len() - "4 2 0 0 5\n".len());
        let mut reader = TextReader::from_bytes(text.as_str());
        let frames = LammpsDumpParser.discover_frames(&mut reader, &Task::new()).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn triclinic_bounds_are_converted_to_cell_vectors() {
        let text = "\
ITEM: TIMESTEP
5
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS xy xz yz pp pp ff
-1 11 1
0 10 -1
0 10 0
ITEM: ATOMS id type x y z
1 1 1 1 1
";
        let frame = parse_first(text, &ImportOptions::default()).unwrap();
        let cell = &frame.cell;
        assert_eq!(cell.pbc(), [true, true, false]);
        assert_eq!(cell.cell_vector(0), Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(cell.cell_vector(1), Vector3::new(1.0, 10.0, 0.0));
        assert_eq!(cell.cell_vector(2), Vector3::new(-1.0, 0.0, 10.0));
        assert_eq!(*cell.origin(), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn mapped_and_line_by_line_parsing_agree() {
        let text = repeated_frames(2);
        let mut fast = TextReader::from_bytes(text.as_str());
        let mut slow = TextReader::from_bytes(text.as_str());
        slow.set_mmap_enabled(false);
        let task = Task::new();
        let markers = LammpsDumpParser.discover_frames(&mut fast, &task).unwrap();
        for marker in &markers {
            let a = LammpsDumpParser
                .parse_frame(&mut fast, marker, &ImportOptions::default(), &task)
                .unwrap();
            let b = LammpsDumpParser
                .parse_frame(&mut slow, marker, &ImportOptions::default(), &task)
                .unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn mapped_and_line_by_line_parsing_agree_on_invalid_utf8() {
        let mut bytes = SIMPLE.replace("4 2 0 0 5\n", "4 2 0 0 5 ").into_bytes();
        bytes.extend_from_slice(b"\xff\n");
        let mut fast = TextReader::from_bytes(bytes.clone());
        let mut slow = TextReader::from_bytes(bytes);
        slow.set_mmap_enabled(false);
        let task = Task::new();
        let markers = LammpsDumpParser.discover_frames(&mut fast, &task).unwrap();
        let options = ImportOptions::default();
        let a = LammpsDumpParser.parse_frame(&mut fast, &markers[0], &options, &task).unwrap();
        let b = LammpsDumpParser.parse_frame(&mut slow, &markers[0], &options, &task).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.particle_count(), 4);
    }

    #[test]
    fn parsing_the_same_marker_twice_is_idempotent() {
        let text = repeated_frames(2);
        let mut reader = TextReader::from_bytes(text.as_str());
        let task = Task::new();
        let markers = LammpsDumpParser.discover_frames(&mut reader, &task).unwrap();
        let options = ImportOptions::default();
        let first = LammpsDumpParser.parse_frame(&mut reader, &markers[0], &options, &task).unwrap();
        LammpsDumpParser.parse_frame(&mut reader, &markers[1], &options, &task).unwrap();
        let again = LammpsDumpParser.parse_frame(&mut reader, &markers[0], &options, &task).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn reduced_column_names_trigger_rescaling() {
        let text = SIMPLE
            .replace("ITEM: ATOMS id type x y z", "ITEM: ATOMS id type xs ys zs")
            .replace("2 1 5 0 0", "2 1 0.5 0 0");
        let frame = parse_first(&text, &ImportOptions::default()).unwrap();
        let positions = frame.standard_particle_property(StandardProperty::Position).unwrap();
        assert_eq!(&positions.as_float().unwrap()[3..6], &[5.0, 0.0, 0.0]);
    }

    #[test]
    fn headerless_columns_fall_back_to_bounding_box_detection() {
        let text = SIMPLE
            .replace("ITEM: ATOMS id type x y z", "ITEM: ATOMS")
            .replace("2 1 5 0 0", "2 1 0.5 0 0")
            .replace("3 2 0 5 0", "3 2 0 1 0")
            .replace("4 2 0 0 5", "4 2 0 0 1");
        let mut mapping = ColumnMapping::from_names(&["id", "type", "x", "y", "z"]);
        mapping.map_standard_column(0, StandardProperty::Identifier, Some(0));
        mapping.map_standard_column(1, StandardProperty::Type, Some(0));
        for axis in 0..3 {
            mapping.map_standard_column(axis + 2, StandardProperty::Position, Some(axis));
        }
        let options = ImportOptions {
            column_mapping: Some(mapping),
            ..ImportOptions::default()
        };
        let frame = parse_first(&text, &options).unwrap();
        let positions = frame.standard_particle_property(StandardProperty::Position).unwrap();
        assert_eq!(&positions.as_float().unwrap()[3..], &[5.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0]);
    }

    #[test]
    fn unknown_sections_are_skipped_and_unknown_columns_kept() {
        let text = SIMPLE
            .replace("ITEM: BOX BOUNDS", "ITEM: UNITS\nmetal\nITEM: BOX BOUNDS")
            .replace("ITEM: ATOMS id type x y z", "ITEM: ATOMS id type x y c_pe")
            .replace("1 1 0 0 0", "1 1 0 0 -3.5");
        let frame = parse_first(&text, &ImportOptions::default()).unwrap();
        assert!(frame.cell.is_2d());
        let energy = frame.particle_property(&PropertyKind::User("c_pe".into())).unwrap();
        assert_eq!(energy.as_float().unwrap()[0], -3.5);
    }

    #[test]
    fn sort_option_orders_particles_by_identifier() {
        let text = SIMPLE.replace("1 1 0 0 0", "9 1 0 0 0");
        let options = ImportOptions {
            sort_particles: true,
            ..ImportOptions::default()
        };
        let frame = parse_first(&text, &options).unwrap();
        let ids = frame.standard_particle_property(StandardProperty::Identifier).unwrap();
        assert_eq!(ids.as_int64().unwrap(), &[2, 3, 4, 9]);
    }

    #[test]
    fn malformed_data_line_reports_line_number() {
        let text = SIMPLE.replace("3 2 0 5 0", "3 2 0 five 0");
        let err = parse_first(&text, &ImportOptions::default()).unwrap_err();
        match err {
            ImportError::Parse { line, text, .. } => {
                assert_eq!(line, 12);
                assert_eq!(text, "3 2 0 five 0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_atoms_section_is_an_error() {
        let marker = FrameMarker {
            source: Default::default(),
            byte_offset: 0,
            line_number: 0,
            label: "Timestep 0".into(),
        };
        let mut reader = TextReader::from_bytes("ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n1\n");
        let err = LammpsDumpParser
            .parse_frame(&mut reader, &marker, &ImportOptions::default(), &Task::new())
            .unwrap_err();
        assert!(matches!(err, ImportError::UnexpectedEof { .. }));
    }

    #[test]
    fn canceled_scan_returns_complete_frames_only() {
        let text = repeated_frames(10);
        let size = text.len() as u64;
        let slot: Arc<OnceLock<Task>> = Arc::new(OnceLock::new());
        let hook = Arc::clone(&slot);
        let task = Task::with_reporter(ProgressReporter::with_callback(Box::new(move |event| {
            if let Progress::TaskAdvance { position } = event {
                if position > size / 2 {
                    if let Some(task) = hook.get() {
                        task.cancel();
                    }
                }
            }
        })));
        slot.set(task.clone()).ok();

        let mut reader = TextReader::from_bytes(text.as_str());
        let frames = LammpsDumpParser.discover_frames(&mut reader, &task).unwrap();
        assert!(frames.len() < 10);
        for marker in &frames {
            reader.seek(marker.byte_offset, marker.line_number).unwrap();
            reader.read_line().unwrap();
            assert!(reader.line_starts_with("ITEM: TIMESTEP"));
        }
    }

    #[test]
    fn inspect_header_reports_detected_mapping() {
        let mut reader = TextReader::from_bytes(SIMPLE);
        let header = LammpsDumpParser.inspect_header(&mut reader).unwrap();
        assert_eq!(header.mapping.column_names(), ["id", "type", "x", "y", "z"]);
        assert!(header.mapping.has_z_coordinate());
        assert_eq!(header.excerpt[0], "ITEM: ATOMS id type x y z");
        assert_eq!(header.excerpt.len(), 5);
    }

    #[test]
    fn automatic_mapping_is_case_insensitive() {
        let mapping = automatic_mapping(&["ID", "Type", "c_stress[4]", "v_custom"]);
        assert!(mapping.is_mapped(StandardProperty::Identifier, None));
        assert!(mapping.is_mapped(StandardProperty::StressTensor, Some(3)));
        assert_eq!(
            mapping.columns()[3].property.as_ref().unwrap().kind,
            PropertyKind::User("v_custom".into())
        );
    }
}
