use super::columns::ColumnMapping;
use super::error::ImportError;
use super::lammps_dump::LammpsDumpParser;
use super::reader::TextReader;
use super::xyz::XyzParser;
use crate::core::models::frame::FrameData;
use crate::engine::config::ImportOptions;
use crate::engine::task::Task;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Location of one frame inside a trajectory file.
///
/// `byte_offset` and `line_number` describe the reader state just before the
/// frame's first line, so [`TextReader::seek`] followed by a read yields the
/// frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMarker {
    pub source: PathBuf,
    pub byte_offset: u64,
    pub line_number: u64,
    pub label: String,
}

impl FrameMarker {
    pub fn new(reader: &TextReader, byte_offset: u64, line_number: u64, label: String) -> Self {
        Self {
            source: reader.path().map(Path::to_path_buf).unwrap_or_default(),
            byte_offset,
            line_number,
            label,
        }
    }
}

/// Column layout and leading lines of a file, for interactive mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderInfo {
    pub mapping: ColumnMapping,
    pub excerpt: Vec<String>,
}

pub trait FormatParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sniffs the first lines of a file positioned at its start.
    fn check_file_format(&self, reader: &mut TextReader) -> Result<bool, ImportError>;

    /// Scans the whole file and returns one marker per complete frame.
    ///
    /// Cancellation is not an error: the markers found so far are returned.
    fn discover_frames(&self, reader: &mut TextReader, task: &Task) -> Result<Vec<FrameMarker>, ImportError>;

    fn parse_frame(
        &self,
        reader: &mut TextReader,
        marker: &FrameMarker,
        options: &ImportOptions,
        task: &Task,
    ) -> Result<FrameData, ImportError>;

    /// Reads the column layout of the first frame without loading it.
    fn inspect_header(&self, reader: &mut TextReader) -> Result<HeaderInfo, ImportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileFormat {
    LammpsDump,
    Xyz,
}

impl FileFormat {
    pub const ALL: [FileFormat; 2] = [FileFormat::LammpsDump, FileFormat::Xyz];

    pub fn parser(self) -> &'static dyn FormatParser {
        match self {
            FileFormat::LammpsDump => &LammpsDumpParser,
            FileFormat::Xyz => &XyzParser,
        }
    }

    /// Sniffs `reader` against every known format and rewinds it afterwards.
    pub fn detect(reader: &mut TextReader) -> Result<FileFormat, ImportError> {
        for format in Self::ALL {
            reader.seek(0, 0)?;
            let matched = format.parser().check_file_format(reader)?;
            reader.seek(0, 0)?;
            if matched {
                return Ok(format);
            }
        }
        let name = reader
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        Err(ImportError::UnsupportedFormat(name))
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parser().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_lammps_dump_and_xyz() {
        let mut lammps = TextReader::from_bytes("ITEM: TIMESTEP\n0\n");
        assert_eq!(FileFormat::detect(&mut lammps).unwrap(), FileFormat::LammpsDump);
        assert_eq!(lammps.byte_offset(), 0);

        let mut xyz = TextReader::from_bytes("  2 \ncomment\nH 0 0 0\nH 1 0 0\n");
        assert_eq!(FileFormat::detect(&mut xyz).unwrap(), FileFormat::Xyz);
    }

    #[test]
    fn unknown_content_is_unsupported() {
        let mut reader = TextReader::from_bytes("2 particles\nfoo\n");
        assert!(matches!(
            FileFormat::detect(&mut reader),
            Err(ImportError::UnsupportedFormat(_))
        ));
        let mut empty = TextReader::from_bytes("");
        assert!(FileFormat::detect(&mut empty).is_err());
    }
}
