use super::{run_task, ui_task};
use crate::cli::InspectArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use crate::ui::UiEvent;
use latticeflow::core::io::columns::ColumnMapping;
use latticeflow::core::io::traits::{FileFormat, HeaderInfo};
use latticeflow::workflows::import;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Serialize)]
struct MappingDocument<'a> {
    import: ImportTable<'a>,
}

#[derive(Serialize)]
struct ImportTable<'a> {
    format: FileFormat,
    columns: &'a ColumnMapping,
}

pub async fn run(args: InspectArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let settings = PartialConfig::load(args.input.config.as_deref())?.import_settings(&args.input, false)?;
    let path = args.input.input.clone();
    let format = settings.format;

    info!("Inspecting header of {:?}...", &path);
    let (trajectory, header) = run_task("inspect", ui_task(&ui_sender), move |task| {
        let trajectory = import::open(&path, format, task)?;
        let header = trajectory.inspect_header()?;
        Ok((trajectory, header))
    })?;

    print!("{}", render_header(trajectory.format(), &header)?);
    Ok(())
}

fn render_header(format: FileFormat, header: &HeaderInfo) -> Result<String> {
    let document = MappingDocument {
        import: ImportTable {
            format,
            columns: &header.mapping,
        },
    };
    let mut out = toml::to_string(&document)?;
    if !header.excerpt.is_empty() {
        out.push_str("\n# File excerpt:\n");
        for line in &header.excerpt {
            out.push_str("#   ");
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    Ok(out)
}
