use super::{run_task, ui_task};
use crate::cli::AnalyzeArgs;
use crate::config::{AnalysisSettings, PartialConfig};
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use crate::utils::parser;
use latticeflow::core::models::collection::DataCollection;
use latticeflow::engine::cna::StructureType;
use latticeflow::engine::error::EngineError;
use latticeflow::engine::task::Task;
use latticeflow::workflows::{analyze, import};
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One row of the per-frame structure histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: usize,
    pub label: String,
    pub particles: usize,
    pub other: usize,
    pub fcc: usize,
    pub hcp: usize,
    pub bcc: usize,
    pub ico: usize,
}

pub async fn run(args: AnalyzeArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let partial_config = PartialConfig::load(args.input.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let settings = partial_config.merge_with_cli(&args)?;

    let path = args.input.input.clone();
    let format = settings.import.format;
    let trajectory = run_task("scan", ui_task(&ui_sender), move |task| {
        import::open(&path, format, task)
    })?;

    let frames = parser::parse_frame_selection(&args.frames, trajectory.frame_count())?;
    println!(
        "Analyzing {} of {} frame(s) with {} CNA...",
        frames.len(),
        trajectory.frame_count(),
        settings.cna.mode
    );

    let reports = run_task("analyze", ui_task(&ui_sender), move |task| {
        analyze_frames(&trajectory, &frames, &settings, task)
    })?;

    for report in &reports {
        println!(
            "{:>6}  {:<32} OTHER {:>8}  FCC {:>8}  HCP {:>8}  BCC {:>8}  ICO {:>8}",
            report.frame, report.label, report.other, report.fcc, report.hcp, report.bcc, report.ico
        );
    }

    if let Some(report_path) = &args.report {
        write_report(report_path, &reports)?;
        println!("✓ Report written to: {}", report_path.display());
    }
    Ok(())
}

/// Loads the selected frames one after another into a single collection and
/// runs the analysis on each.
pub fn analyze_frames(
    trajectory: &import::Trajectory,
    frames: &[usize],
    settings: &AnalysisSettings,
    task: &Task,
) -> std::result::Result<Vec<FrameReport>, EngineError> {
    let mut collection = DataCollection::new();
    let mut reports = Vec::with_capacity(frames.len());

    for (position, &frame) in frames.iter().enumerate() {
        if task.is_canceled() {
            return Err(EngineError::Canceled);
        }
        import::load_into(trajectory, frame, &settings.import.options, &mut collection, position == 0, task)?;
        if let Some(cutoff) = settings.bond_cutoff {
            analyze::generate_bonds(&mut collection, cutoff, task)?;
        }
        let report = analyze::run_cna(&mut collection, &settings.cna, task)?;
        if report.counts.total() == report.counts.get(StructureType::Other) && report.counts.total() > 0 {
            warn!(frame, "No crystalline structure was identified in this frame.");
        }

        reports.push(FrameReport {
            frame,
            label: trajectory.marker(frame)?.label.clone(),
            particles: collection.particle_count(),
            other: report.counts.get(StructureType::Other),
            fcc: report.counts.get(StructureType::Fcc),
            hcp: report.counts.get(StructureType::Hcp),
            bcc: report.counts.get(StructureType::Bcc),
            ico: report.counts.get(StructureType::Ico),
        });
    }
    Ok(reports)
}

pub fn write_report(path: &Path, reports: &[FrameReport]) -> Result<()> {
    let write = || -> std::result::Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        for report in reports {
            writer.serialize(report)?;
        }
        writer.flush()?;
        Ok(())
    };
    write().map_err(|source| CliError::Report {
        path: path.to_path_buf(),
        source,
    })
}
