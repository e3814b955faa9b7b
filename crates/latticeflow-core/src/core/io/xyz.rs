use super::column_reader::InputColumnReader;
use super::columns::{ColumnDataType, ColumnMapping};
use super::coordinates::{positions_within, rescale_reduced_positions};
use super::error::ImportError;
use super::reader::TextReader;
use super::traits::{FormatParser, FrameMarker, HeaderInfo};
use crate::core::models::cell::SimulationCell;
use crate::core::models::collection::IntegrityError;
use crate::core::models::frame::{AttributeValue, Attributes, FrameData};
use crate::core::models::property::StandardProperty;
use crate::engine::config::ImportOptions;
use crate::engine::task::Task;
use nalgebra::{Point3, Vector3};
use phf::{Map, phf_map};
use tracing::{debug, warn};

const CONTEXT: &str = "XYZ file";
const COUNT_LINE_ERROR: &str = "the first line of a frame section must contain just the number of particles";
const EXCERPT_LINES: usize = 5;

/// Extended XYZ property names, lowercased.
static XYZ_PROPERTIES: Map<&'static str, StandardProperty> = phf_map! {
    "type" => StandardProperty::Type,
    "element" => StandardProperty::Type,
    "atom_types" => StandardProperty::Type,
    "species" => StandardProperty::Type,
    "pos" => StandardProperty::Position,
    "selection" => StandardProperty::Selection,
    "color" => StandardProperty::Color,
    "disp" => StandardProperty::Displacement,
    "disp_mag" => StandardProperty::DisplacementMagnitude,
    "local_energy" => StandardProperty::PotentialEnergy,
    "kinetic_energy" => StandardProperty::KineticEnergy,
    "total_energy" => StandardProperty::TotalEnergy,
    "velo" => StandardProperty::Velocity,
    "velo_mag" => StandardProperty::VelocityMagnitude,
    "radius" => StandardProperty::Radius,
    "cluster" => StandardProperty::Cluster,
    "n_neighb" => StandardProperty::Coordination,
    "structure_type" => StandardProperty::StructureType,
    "id" => StandardProperty::Identifier,
    "stress" => StandardProperty::StressTensor,
    "strain" => StandardProperty::StrainTensor,
    "deform" => StandardProperty::DeformationGradient,
    "orientation" => StandardProperty::Orientation,
    "force" => StandardProperty::Force,
    "forces" => StandardProperty::Force,
    "mass" => StandardProperty::Mass,
    "charge" => StandardProperty::Charge,
    "map_shift" => StandardProperty::PeriodicImage,
    "transparency" => StandardProperty::Transparency,
    "dipoles" => StandardProperty::DipoleOrientation,
    "dipoles_mag" => StandardProperty::DipoleMagnitude,
    "omega" => StandardProperty::AngularVelocity,
    "angular_momentum" => StandardProperty::AngularMomentum,
    "torque" => StandardProperty::Torque,
    "spin" => StandardProperty::Spin,
    "centro_symmetry" => StandardProperty::CentroSymmetry,
    "aspherical_shape" => StandardProperty::AsphericalShape,
    "molecule" => StandardProperty::Molecule,
    "molecule_type" => StandardProperty::MoleculeType,
};

/// Keys of an extended XYZ comment that describe geometry or columns rather
/// than frame attributes.
const RESERVED_KEYS: [&str; 5] = ["lattice", "properties", "cell_origin", "origin", "pbc"];

fn parse_count_line(line: &str) -> Option<u64> {
    line.trim().parse::<u64>().ok()
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

/// Text following the first occurrence of `key`.
fn after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.find(key).map(|index| &line[index + key.len()..])
}

/// Text between the opening quote that ends `key` and the closing quote.
fn quoted_after<'a>(line: &'a str, lowered: &str, key: &str) -> Option<&'a str> {
    let start = lowered.find(key)? + key.len();
    let rest = &line[start..];
    Some(rest.find('"').map_or(rest, |end| &rest[..end]))
}

/// Up to `N` leading floats of `text`; missing or malformed trailing values stay zero.
fn leading_floats<const N: usize>(text: &str) -> ([f64; N], usize) {
    let mut values = [0.0; N];
    let mut parsed = 0;
    for (value, token) in values.iter_mut().zip(text.split_ascii_whitespace()) {
        match token.parse::<f64>() {
            Ok(v) => {
                *value = v;
                parsed += 1;
            }
            Err(_) => break,
        }
    }
    (values, parsed)
}

fn parse_bool_token(token: &str) -> Option<bool> {
    match token {
        "T" | "1" => Some(true),
        "F" | "0" => Some(false),
        _ => None,
    }
}

/// Splits an extended XYZ comment into `key=value` pairs. Values may be
/// enclosed in double quotes; tokens without `=` are ignored.
fn key_value_pairs(line: &str) -> Vec<(&str, &str)> {
    let bytes = line.as_bytes();
    let len = bytes.len();
    let mut pairs = Vec::new();
    let mut i = 0;
    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }
        let key_start = i;
        while i < len && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len || bytes[i] != b'=' {
            continue;
        }
        let key = &line[key_start..i];
        i += 1;
        let quoted = i < len && bytes[i] == b'"';
        if quoted {
            i += 1;
        }
        let value_start = i;
        while i < len && (if quoted { bytes[i] != b'"' } else { !bytes[i].is_ascii_whitespace() }) {
            i += 1;
        }
        let value = &line[value_start..i];
        if quoted && i < len {
            i += 1;
        }
        if !key.is_empty() && !value.is_empty() {
            pairs.push((key, value));
        }
    }
    pairs
}

/// Geometry, attributes and column layout found in a frame's comment line.
#[derive(Debug, Default)]
struct CommentInfo {
    cell: Option<SimulationCell>,
    pbc: Option<[bool; 3]>,
    attributes: Attributes,
    properties: Option<ColumnMapping>,
}

fn parse_comment(comment: &str) -> Result<CommentInfo, String> {
    let mut info = CommentInfo::default();
    let lowered = comment.to_ascii_lowercase();
    let mut vectors = [Vector3::zeros(); 3];
    let mut origin = Vector3::zeros();

    if let Some(rest) = after(comment, "Lxyz=").or_else(|| after(comment, "boxsize")) {
        if let ([sx, sy, sz], 3) = leading_floats::<3>(rest) {
            info.cell = Some(SimulationCell::from_vectors(
                Vector3::new(sx, 0.0, 0.0),
                Vector3::new(0.0, sy, 0.0),
                Vector3::new(0.0, 0.0, sz),
                Point3::new(-sx / 2.0, -sy / 2.0, -sz / 2.0),
                [false; 3],
            ));
        }
    }

    let pairs = key_value_pairs(comment);
    if let Some(lattice) = quoted_after(comment, &lowered, "lattice=\"") {
        let (values, parsed) = leading_floats::<9>(lattice);
        if parsed == 9 {
            for (axis, vector) in vectors.iter_mut().enumerate() {
                *vector = Vector3::new(values[axis * 3], values[axis * 3 + 1], values[axis * 3 + 2]);
            }
        }
        let cell_origin =
            quoted_after(comment, &lowered, "cell_origin=\"").or_else(|| quoted_after(comment, &lowered, "origin=\""));
        if let Some(text) = cell_origin {
            origin = Vector3::from(leading_floats::<3>(text).0);
        }
        for (key, value) in &pairs {
            if !RESERVED_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                info.attributes.insert(key.to_string(), AttributeValue::parse(value));
            }
        }
    } else {
        let trimmed = comment.trim();
        if !trimmed.is_empty() {
            info.attributes
                .insert("Comment".to_string(), AttributeValue::Text(trimmed.to_string()));
        }
        if let Some(rest) = after(comment, "cell_orig ") {
            origin = Vector3::from(leading_floats::<3>(rest).0);
        }
        for (axis, key) in ["cell_vec1 ", "cell_vec2 ", "cell_vec3 "].into_iter().enumerate() {
            if let Some(rest) = after(comment, key) {
                vectors[axis] = Vector3::from(leading_floats::<3>(rest).0);
            }
        }
    }

    if vectors.iter().all(|v| *v != Vector3::zeros()) {
        info.cell = Some(SimulationCell::from_vectors(
            vectors[0],
            vectors[1],
            vectors[2],
            Point3::from(origin),
            [false; 3],
        ));
    }

    if let Some(rest) = after(comment, "pbc ") {
        let mut flags = [false; 3];
        for (flag, token) in flags.iter_mut().zip(rest.split_ascii_whitespace()) {
            *flag = token.parse::<i64>().is_ok_and(|v| v != 0);
        }
        info.pbc = Some(flags);
    } else if let Some(text) = quoted_after(comment, &lowered, "pbc=\"") {
        let mut flags = [false; 3];
        for (flag, token) in flags.iter_mut().zip(text.split_ascii_whitespace()) {
            *flag = parse_bool_token(token).unwrap_or(false);
        }
        info.pbc = Some(flags);
    }

    if let Some((_, spec)) = pairs.iter().find(|(key, _)| key.eq_ignore_ascii_case("properties")) {
        info.properties = Some(parse_properties(spec)?);
    }
    Ok(info)
}

/// Builds a column mapping from a `Properties=name:T:n:...` declaration.
fn parse_properties(spec: &str) -> Result<ColumnMapping, String> {
    let fields: Vec<&str> = spec.split(':').collect();
    if fields.len() % 3 != 0 {
        return Err(format!(
            "malformed Properties declaration \"{spec}\": expected name:type:count triplets"
        ));
    }

    let mut declared = Vec::new();
    for triplet in fields.chunks_exact(3) {
        let (name, kind, count) = (triplet[0], triplet[1], triplet[2]);
        let count: usize = count
            .parse()
            .map_err(|_| format!("invalid column count \"{count}\" for property \"{name}\""))?;
        let kind = match kind.chars().next() {
            Some(c @ ('I' | 'R' | 'L' | 'S')) => c,
            _ => return Err(format!("unknown data type \"{kind}\" for property \"{name}\"")),
        };
        declared.push((name, kind, count));
    }

    let labels: Vec<String> = declared
        .iter()
        .flat_map(|&(name, _, count)| {
            (0..count).map(move |k| if count == 1 { name.to_string() } else { format!("{name}.{k}") })
        })
        .collect();
    let mut mapping = ColumnMapping::from_names(&labels);

    let mut column = 0;
    for (name, kind, count) in declared {
        let standard = XYZ_PROPERTIES.get(name.to_ascii_lowercase().as_str()).copied();
        for k in 0..count {
            match standard {
                Some(property) if k < property.component_count() => {
                    if kind == 'S' && !property.is_typed() {
                        if k == 0 {
                            warn!(property = name, "Skipping string column mapped to a numeric property.");
                        }
                    } else {
                        mapping.map_standard_column(column, property, Some(k));
                    }
                }
                Some(_) => {}
                None => {
                    let data_type = match kind {
                        'R' => ColumnDataType::Float,
                        'I' | 'L' => ColumnDataType::Int,
                        _ => ColumnDataType::String,
                    };
                    mapping.map_user_column(column, &labels[column], data_type);
                }
            }
            column += 1;
        }
    }
    Ok(mapping)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XyzParser;

impl FormatParser for XyzParser {
    fn name(&self) -> &'static str {
        "XYZ"
    }

    fn check_file_format(&self, reader: &mut TextReader) -> Result<bool, ImportError> {
        Ok(reader.read_line()? && parse_count_line(reader.line()).is_some())
    }

    fn discover_frames(&self, reader: &mut TextReader, task: &Task) -> Result<Vec<FrameMarker>, ImportError> {
        let filename = reader
            .path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "XYZ".to_string());
        task.set_progress_text(format!("Scanning file {filename}"));
        task.set_progress_maximum(reader.underlying_size());

        let mut frames = Vec::new();
        loop {
            let (offset, line_number) = (reader.byte_offset(), reader.line_number());
            if !reader.read_line()? || reader.line().trim().is_empty() {
                break;
            }
            let count = parse_count_line(reader.line()).ok_or_else(|| invalid_line(reader, COUNT_LINE_ERROR))?;
            let marker = FrameMarker::new(
                reader,
                offset,
                line_number,
                format!("{filename} (Frame {})", frames.len()),
            );

            // Comment line plus one line per particle.
            for skipped in 0..=count {
                if !reader.read_line()? {
                    debug!(frames = frames.len(), "Discarding truncated trailing frame.");
                    return Ok(frames);
                }
                if skipped % 1024 == 0 && !task.set_progress_value_intermittent(reader.underlying_byte_offset()) {
                    return Ok(frames);
                }
            }
            frames.push(marker);

            if !task.set_progress_value_intermittent(reader.underlying_byte_offset()) {
                break;
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
        task.set_progress_text(format!("Reading XYZ file {}", marker.label));
        reader.seek(marker.byte_offset, marker.line_number)?;

        next_line(reader)?;
        let count = parse_count_line(reader.line()).ok_or_else(|| invalid_line(reader, COUNT_LINE_ERROR))?;
        if count > i32::MAX as u64 {
            return Err(invalid_line(
                reader,
                format!("too many particles; at most {} per frame are supported", i32::MAX),
            ));
        }
        let count = count as usize;

        next_line(reader)?;
        let comment = reader.line().to_string();
        let info = parse_comment(&comment).map_err(|reason| invalid_line(reader, reason))?;

        let mapping = options.column_mapping.clone().or(info.properties);
        let mut columns = mapping.map(|m| InputColumnReader::new(&m, count)).transpose()?;
        task.set_progress_maximum(count as u64);
        for index in 0..count {
            if !task.set_progress_value_intermittent(index as u64) {
                return Err(ImportError::Canceled);
            }
            next_line(reader)?;
            if columns.is_none() {
                let found = reader.line().split_ascii_whitespace().count();
                if found != 4 {
                    return Err(ImportError::Configuration(format!(
                        "line {} of the XYZ file has {found} columns; without Properties= metadata a column mapping must be specified",
                        reader.line_number()
                    )));
                }
                columns = Some(InputColumnReader::new(&ColumnMapping::default_four_columns(), count)?);
            }
            if let Some(columns) = columns.as_mut() {
                columns
                    .read_particle(index, reader.line())
                    .map_err(|reason| invalid_line(reader, reason))?;
            }
        }

        let mut frame = FrameData::new();
        match columns {
            Some(columns) => columns.finish(&mut frame),
            None => InputColumnReader::new(&ColumnMapping::default_four_columns(), 0)?.finish(&mut frame),
        }
        frame.attributes.extend(info.attributes);

        match info.cell {
            Some(mut cell) => {
                cell.set_pbc(info.pbc.unwrap_or([true; 3]));
                if cell.is_degenerate() {
                    return Err(IntegrityError("simulation cell has zero volume".to_string()).into());
                }
                frame.cell = cell;
                if options.detect_reduced_coordinates {
                    if positions_within(&frame, -0.01, 1.01) {
                        rescale_reduced_positions(&mut frame, 0.0);
                    } else if positions_within(&frame, -0.51, 0.51) {
                        rescale_reduced_positions(&mut frame, 0.5);
                    }
                }
            }
            None => {
                if let Some(points) = frame
                    .standard_particle_property(StandardProperty::Position)
                    .and_then(|p| p.to_points())
                {
                    frame.cell = SimulationCell::bounding_box(&points);
                }
            }
        }

        if !reader.eof() && reader.read_line()? {
            frame.detected_additional_frames = parse_count_line(reader.line()).is_some();
        }
        if options.sort_particles {
            frame.sort_particles_by_id();
        }
        frame.status = if comment.trim().is_empty() {
            format!("{count} particles")
        } else {
            format!("{count} particles\n{}", comment.trim())
        };
        frame.verify_integrity().map_err(IntegrityError)?;
        Ok(frame)
    }

    fn inspect_header(&self, reader: &mut TextReader) -> Result<HeaderInfo, ImportError> {
        next_line(reader)?;
        let count = parse_count_line(reader.line()).ok_or_else(|| invalid_line(reader, COUNT_LINE_ERROR))?;
        next_line(reader)?;
        let comment = reader.line().to_string();
        let info = parse_comment(&comment).map_err(|reason| invalid_line(reader, reason))?;

        let mut excerpt = vec![comment];
        for _ in 0..count.min(EXCERPT_LINES as u64) {
            if !reader.read_line()? {
                break;
            }
            excerpt.push(reader.line().to_string());
        }

        let columns = excerpt.get(1).map_or(0, |l| l.split_ascii_whitespace().count());
        let mapping = match info.properties {
            Some(mapping) => mapping,
            None if columns == 4 => ColumnMapping::default_four_columns(),
            None => {
                let names: Vec<String> = (1..=columns).map(|i| format!("Column {i}")).collect();
                ColumnMapping::from_names(&names)
            }
        };
        Ok(HeaderInfo { mapping, excerpt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::property::PropertyKind;

    fn parse_all(text: &str, options: &ImportOptions) -> Result<Vec<FrameData>, ImportError> {
        let mut reader = TextReader::from_bytes(text);
        let task = Task::new();
        let markers = XyzParser.discover_frames(&mut reader, &task)?;
        markers
            .iter()
            .map(|m| XyzParser.parse_frame(&mut reader, m, options, &task))
            .collect()
    }

    fn positions(frame: &FrameData) -> Vec<f64> {
        frame
            .standard_particle_property(StandardProperty::Position)
            .unwrap()
            .as_float()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn plain_xyz_uses_bounding_box_and_comment() {
        let frames = parse_all("3\nwater\nO 0 0 0\nH 1 0 0\nH 0 2 0\n", &ImportOptions::default()).unwrap();
        let frame = &frames[0];
        assert_eq!(frame.particle_count(), 3);
        assert_eq!(frame.attributes["Comment"], AttributeValue::Text("water".into()));
        assert_eq!(frame.cell.pbc(), [false; 3]);
        assert_eq!(frame.cell.cell_vector(1), Vector3::new(0.0, 2.0, 0.0));

        let types = &frame.particle_types[&StandardProperty::Type.into()];
        assert_eq!(types.find_by_id(1).unwrap().name, "H");
        assert_eq!(types.find_by_id(2).unwrap().name, "O");
        assert_eq!(frame.status, "3 particles\nwater");
    }

    #[test]
    fn frames_are_labelled_and_linked() {
        let text = "1\na\nAr 0 0 0\n1\nb\nAr 1 1 1\n";
        let mut reader = TextReader::from_bytes(text);
        let markers = XyzParser.discover_frames(&mut reader, &Task::new()).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].label, "XYZ (Frame 1)");
        assert_eq!(markers[1].line_number, 3);

        let first = XyzParser
            .parse_frame(&mut reader, &markers[0], &ImportOptions::default(), &Task::new())
            .unwrap();
        assert!(first.detected_additional_frames);
        let second = XyzParser
            .parse_frame(&mut reader, &markers[1], &ImportOptions::default(), &Task::new())
            .unwrap();
        assert!(!second.detected_additional_frames);
        assert_eq!(positions(&second), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn extended_header_supplies_cell_columns_and_attributes() {
        let text = "2\nLattice=\"10 0 0 0 10 0 0 0 10\" Properties=species:S:1:pos:R:3:velo:R:3:tag:I:1 \
                    Time=1.5 step=20 pbc=\"T T F\" name=foo\n\
                    Cu 1 2 3 0.1 0.2 0.3 7\n\
                    Zr 4 5 6 0 0 0 8\n";
        let frame = parse_all(text, &ImportOptions::default()).unwrap().remove(0);
        assert!((frame.cell.volume() - 1000.0).abs() < 1e-9);
        assert_eq!(frame.cell.pbc(), [true, true, false]);
        assert_eq!(frame.attributes["Time"], AttributeValue::Float(1.5));
        assert_eq!(frame.attributes["step"], AttributeValue::Int(20));
        assert_eq!(frame.attributes["name"], AttributeValue::Text("foo".into()));
        assert!(!frame.attributes.contains_key("Lattice"));
        assert!(!frame.attributes.contains_key("Comment"));

        assert_eq!(positions(&frame), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let velocity = frame.standard_particle_property(StandardProperty::Velocity).unwrap();
        assert_eq!(&velocity.as_float().unwrap()[..3], &[0.1, 0.2, 0.3]);
        let tag = frame.particle_property(&PropertyKind::User("tag".into())).unwrap();
        assert_eq!(tag.as_int().unwrap(), &[7, 8]);
        let types = &frame.particle_types[&StandardProperty::Type.into()];
        assert_eq!(types.find_by_name("Zr").unwrap().id, 2);
    }

    #[test]
    fn lattice_without_pbc_key_is_fully_periodic_and_origin_is_read() {
        let text = "1\nLattice=\"2 0 0 0 2 0 0 0 2\" Origin=\"1 1 1\" Properties=species:S:1:pos:R:3\nA 0.5 0.5 0.5\n";
        let frame = parse_all(text, &ImportOptions::default()).unwrap().remove(0);
        assert_eq!(frame.cell.pbc(), [true; 3]);
        assert_eq!(*frame.cell.origin(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(positions(&frame), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn reduced_coordinates_are_not_rescaled_when_disabled() {
        let text = "1\nLattice=\"10 0 0 0 10 0 0 0 10\" Properties=species:S:1:pos:R:3\nA 0.5 0.25 1\n";
        let options = ImportOptions {
            detect_reduced_coordinates: false,
            ..ImportOptions::default()
        };
        let frame = parse_all(text, &options).unwrap().remove(0);
        assert_eq!(positions(&frame), vec![0.5, 0.25, 1.0]);
        let frame = parse_all(text, &ImportOptions::default()).unwrap().remove(0);
        assert_eq!(positions(&frame), vec![5.0, 2.5, 10.0]);
    }

    #[test]
    fn centered_reduced_coordinates_are_shifted_into_the_box() {
        let text = "1\nLxyz= 10 10 10\nX -0.5 0 0.5\n";
        let frame = parse_all(text, &ImportOptions::default()).unwrap().remove(0);
        assert_eq!(*frame.cell.origin(), Point3::new(-5.0, -5.0, -5.0));
        assert_eq!(positions(&frame), vec![-5.0, 0.0, 5.0]);
        assert_eq!(frame.attributes["Comment"], AttributeValue::Text("Lxyz= 10 10 10".into()));
    }

    #[test]
    fn parcas_comment_defines_cell_and_periodicity() {
        let text = "1\nframe 3 cell_orig -1 -1 -1 cell_vec1 5 0 0 cell_vec2 0 5 0 cell_vec3 0 0 5 pbc 1 1 0\nFe 2 2 2\n";
        let frame = parse_all(text, &ImportOptions::default()).unwrap().remove(0);
        assert_eq!(frame.cell.pbc(), [true, true, false]);
        assert_eq!(*frame.cell.origin(), Point3::new(-1.0, -1.0, -1.0));
        assert!((frame.cell.volume() - 125.0).abs() < 1e-9);
        assert_eq!(positions(&frame), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn count_line_with_extra_text_is_rejected() {
        let err = parse_all("3 atoms\nc\n", &ImportOptions::default()).unwrap_err();
        match err {
            ImportError::Parse { line, reason, .. } => {
                assert_eq!(line, 1);
                assert_eq!(reason, COUNT_LINE_ERROR);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_trailing_frame_is_dropped() {
        let mut reader = TextReader::from_bytes("2\nc\nA 0 0 0\nA 1 1 1\n2\nc\nA 0 0 0\n");
        let markers = XyzParser.discover_frames(&mut reader, &Task::new()).unwrap();
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn trailing_blank_line_ends_the_scan() {
        let mut reader = TextReader::from_bytes("1\nc\nA 0 0 0\n\n");
        let markers = XyzParser.discover_frames(&mut reader, &Task::new()).unwrap();
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn five_column_file_without_metadata_needs_a_mapping() {
        let text = "1\nc\nA 0 0 0 5\n";
        let err = parse_all(text, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, ImportError::Configuration(_)));

        let mut mapping = ColumnMapping::default_four_columns();
        mapping.map_standard_column(4, StandardProperty::Charge, Some(0));
        let options = ImportOptions {
            column_mapping: Some(mapping),
            ..ImportOptions::default()
        };
        let frame = parse_all(text, &options).unwrap().remove(0);
        let charge = frame.standard_particle_property(StandardProperty::Charge).unwrap();
        assert_eq!(charge.as_float().unwrap(), &[5.0]);
    }

    #[test]
    fn malformed_properties_declaration_is_a_parse_error() {
        let text = "1\nLattice=\"1 0 0 0 1 0 0 0 1\" Properties=species:S\nA 0 0 0\n";
        assert!(matches!(
            parse_all(text, &ImportOptions::default()),
            Err(ImportError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn inspect_header_prefers_properties_metadata() {
        let mut reader = TextReader::from_bytes("1\nProperties=species:S:1:pos:R:3:q:R:1\nA 0 0 0 1\n");
        let header = XyzParser.inspect_header(&mut reader).unwrap();
        assert_eq!(header.mapping.len(), 5);
        assert_eq!(header.mapping.column_names()[1], "pos.0");
        assert_eq!(header.excerpt.len(), 2);

        let mut plain = TextReader::from_bytes("1\nc\nA 0 0 0\n");
        let header = XyzParser.inspect_header(&mut plain).unwrap();
        assert!(header.mapping.has_z_coordinate());
    }

    #[test]
    fn key_value_pairs_handle_quotes_and_bare_flags() {
        let pairs = key_value_pairs(r#"a=1 flag b="x y" c="#);
        assert_eq!(pairs, vec![("a", "1"), ("b", "x y")]);
    }
}
