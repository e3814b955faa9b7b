use crate::core::io::error::ImportError;
use crate::core::io::reader::TextReader;
use crate::core::io::traits::{FileFormat, FrameMarker, HeaderInfo};
use crate::core::models::collection::DataCollection;
use crate::core::models::frame::FrameData;
use crate::engine::config::ImportOptions;
use crate::engine::error::EngineError;
use crate::engine::task::{Task, TaskFuture, TaskHarness};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// A trajectory file whose frames have been located.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    path: PathBuf,
    format: FileFormat,
    frames: Vec<FrameMarker>,
}

impl Trajectory {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn frames(&self) -> &[FrameMarker] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn marker(&self, index: usize) -> Result<&FrameMarker, EngineError> {
        self.frames.get(index).ok_or_else(|| {
            EngineError::Configuration(format!(
                "frame {index} requested but {} contains {} frame(s)",
                self.path.display(),
                self.frames.len()
            ))
        })
    }

    /// Reads the column layout of the first frame without loading any particles.
    pub fn inspect_header(&self) -> Result<HeaderInfo, EngineError> {
        let mut reader = TextReader::open(&self.path)?;
        Ok(self.format.parser().inspect_header(&mut reader)?)
    }

    /// Parses one frame. Frames can be loaded in any order.
    #[instrument(skip_all, name = "load_frame_workflow", fields(frame = index))]
    pub fn load_frame(&self, index: usize, options: &ImportOptions, task: &Task) -> Result<FrameData, EngineError> {
        let marker = self.marker(index)?;
        let mut reader = TextReader::open(&self.path)?;
        task.set_progress_text(format!("Loading {}", marker.label));
        let frame = self.format.parser().parse_frame(&mut reader, marker, options, task)?;
        info!(
            label = %marker.label,
            particles = frame.particle_count(),
            bonds = frame.bond_count(),
            "Frame loaded."
        );
        Ok(frame)
    }

    /// Loads a frame on a background thread.
    pub fn spawn_load_frame(
        &self,
        index: usize,
        options: ImportOptions,
        task: Task,
    ) -> std::io::Result<TaskFuture<FrameData, EngineError>> {
        let trajectory = self.clone();
        TaskHarness::spawn("frame-loader", task, move |task| {
            trajectory.load_frame(index, &options, task)
        })
    }
}

/// Identifies the format of `path` (unless given) and scans it for frames.
///
/// A canceled scan still returns the frames found up to that point.
#[instrument(skip_all, name = "open_trajectory_workflow")]
pub fn open(path: &Path, format: Option<FileFormat>, task: &Task) -> Result<Trajectory, EngineError> {
    let mut reader = TextReader::open(path)?;
    let format = match format {
        Some(format) => format,
        None => FileFormat::detect(&mut reader)?,
    };
    info!(path = %path.display(), format = %format, "Scanning file for frames.");

    task.set_progress_text(format!("Scanning {}", path.display()));
    let frames = format.parser().discover_frames(&mut reader, task)?;
    if frames.is_empty() && !task.is_canceled() {
        return Err(ImportError::parse(
            &format.to_string(),
            reader.line_number(),
            "",
            "file contains no complete frame",
        )
        .into());
    }
    debug!(frames = frames.len(), compressed = reader.is_compressed(), "Frame scan finished.");
    info!(frames = frames.len(), "Frame discovery complete.");

    Ok(Trajectory {
        path: path.to_path_buf(),
        format,
        frames,
    })
}

/// Loads frame `index` and hands it over into `collection`.
///
/// Pass `is_new_file` for the first frame of a newly opened file; types that
/// disappeared from the file are then dropped from the catalogs. On any error
/// the collection is left as it was.
#[instrument(skip_all, name = "import_frame_workflow", fields(frame = index))]
pub fn load_into(
    trajectory: &Trajectory,
    index: usize,
    options: &ImportOptions,
    collection: &mut DataCollection,
    is_new_file: bool,
    task: &Task,
) -> Result<(), EngineError> {
    let frame = trajectory.load_frame(index, options, task)?;
    collection.hand_over(frame, is_new_file)?;
    Ok(())
}
