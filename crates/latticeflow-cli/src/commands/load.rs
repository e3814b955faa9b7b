use super::{run_task, ui_task};
use crate::cli::LoadArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use crate::ui::UiEvent;
use latticeflow::core::models::collection::DataCollection;
use latticeflow::workflows::import;
use std::fmt::Write;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: LoadArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let settings = PartialConfig::load(args.input.config.as_deref())?.import_settings(&args.input, args.sort)?;
    let path = args.input.input.clone();
    let frame = args.frame;

    info!("Loading frame {} of {:?}...", frame, &path);
    let (label, collection) = run_task("load", ui_task(&ui_sender), move |task| {
        let trajectory = import::open(&path, settings.format, task)?;
        let label = trajectory.marker(frame)?.label.clone();
        let mut collection = DataCollection::new();
        import::load_into(&trajectory, frame, &settings.options, &mut collection, true, task)?;
        Ok((label, collection))
    })?;

    print!("{}", describe(&label, &collection));
    Ok(())
}

fn describe(label: &str, collection: &DataCollection) -> String {
    let mut out = String::new();
    let cell = &collection.cell;
    let pbc = cell.pbc().map(|p| if p { "pp" } else { "ff" }).join(" ");

    let _ = writeln!(out, "{label}");
    let _ = writeln!(out, "  Particles: {}", collection.particle_count());
    let _ = writeln!(out, "  Bonds:     {}", collection.bonds.count());
    let _ = writeln!(
        out,
        "  Cell:      origin ({:.6}, {:.6}, {:.6}), volume {:.6}{}",
        cell.origin().x,
        cell.origin().y,
        cell.origin().z,
        cell.volume(),
        if cell.is_2d() { " (2D)" } else { "" }
    );
    for axis in 0..3 {
        let v = cell.cell_vector(axis);
        let _ = writeln!(out, "    a{}: ({:.6}, {:.6}, {:.6})", axis + 1, v.x, v.y, v.z);
    }
    let _ = writeln!(out, "  PBC:       {pbc}");

    let _ = writeln!(out, "  Properties:");
    for property in collection.particles.properties() {
        let _ = writeln!(
            out,
            "    {:<28} {:>6} x{}",
            property.name(),
            property.data_type(),
            property.components()
        );
    }

    for (kind, catalog) in collection.particles.catalogs() {
        let _ = writeln!(out, "  Types of {kind}:");
        for element in catalog.types() {
            let _ = writeln!(out, "    {:>4}  {}", element.id, element.display_name());
        }
    }

    if !collection.attributes.is_empty() {
        let _ = writeln!(out, "  Attributes:");
        for (name, value) in &collection.attributes {
            let _ = writeln!(out, "    {name} = {value}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use latticeflow::engine::config::ImportOptions;
    use latticeflow::engine::task::Task;
    use std::io::Write as _;

    #[test]
    fn summary_lists_cell_types_and_attributes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"2\nLattice=\"4 0 0 0 4 0 0 0 4\" Properties=species:S:1:pos:R:3 energy=-1.5\n\
              Cu 0 0 0\nNi 2 2 2\n",
        )
        .unwrap();
        file.flush().unwrap();

        let task = Task::new();
        let trajectory = import::open(file.path(), None, &task).unwrap();
        let mut collection = DataCollection::new();
        import::load_into(&trajectory, 0, &ImportOptions::default(), &mut collection, true, &task).unwrap();

        let text = describe(&trajectory.frames()[0].label, &collection);
        assert!(text.contains("Particles: 2"));
        assert!(text.contains("PBC:       pp pp pp"));
        assert!(text.contains("volume 64.000000"));
        assert!(text.contains("Cu"));
        assert!(text.contains("Ni"));
        assert!(text.contains("energy = -1.5"));
    }
}
