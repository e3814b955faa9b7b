use super::{run_task, ui_task};
use crate::cli::ScanArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use crate::ui::UiEvent;
use latticeflow::workflows::import::{self, Trajectory};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: ScanArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let settings = PartialConfig::load(args.input.config.as_deref())?.import_settings(&args.input, false)?;
    let path = args.input.input.clone();
    let format = settings.format;

    info!("Scanning {:?} for frames...", &path);
    let trajectory = run_task("scan", ui_task(&ui_sender), move |task| {
        import::open(&path, format, task)
    })?;

    print!("{}", frame_table(&trajectory));
    Ok(())
}

fn frame_table(trajectory: &Trajectory) -> String {
    let mut out = format!(
        "{} ({}, {} frame(s))\n{:>6}  {:<40} {:>14} {:>10}\n",
        trajectory.path().display(),
        trajectory.format(),
        trajectory.frame_count(),
        "FRAME",
        "LABEL",
        "BYTE OFFSET",
        "LINE"
    );
    for (index, marker) in trajectory.frames().iter().enumerate() {
        out.push_str(&format!(
            "{:>6}  {:<40} {:>14} {:>10}\n",
            index,
            marker.label,
            marker.byte_offset,
            marker.line_number + 1
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use latticeflow::engine::task::Task;
    use std::io::Write;

    #[test]
    fn table_lists_one_row_per_frame() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1\nfirst\nAr 0 0 0\n1\nsecond\nAr 1 0 0\n").unwrap();
        file.flush().unwrap();

        let trajectory = import::open(file.path(), None, &Task::new()).unwrap();
        let table = frame_table(&trajectory);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("2 frame(s)"));
        assert!(lines[2].contains("(Frame 0)"));
        assert!(lines[3].contains("(Frame 1)"));
    }
}
