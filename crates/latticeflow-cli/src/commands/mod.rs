pub mod analyze;
pub mod inspect;
pub mod load;
pub mod scan;

use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use latticeflow::engine::error::EngineError;
use latticeflow::engine::progress::ProgressReporter;
use latticeflow::engine::task::{Task, TaskHarness, TaskOutcome};
use tokio::sync::mpsc;
use tracing::warn;

/// Creates a task whose progress events are drawn by the UI manager.
pub fn ui_task(ui_sender: &mpsc::Sender<UiEvent>) -> Task {
    let handler = CliProgressHandler::new(ui_sender.clone());
    Task::with_reporter(ProgressReporter::with_callback(handler.get_callback()))
}

/// Runs `work` on a harness worker thread and waits for it without stalling
/// the async runtime.
pub fn run_task<T, F>(name: &str, task: Task, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Task) -> std::result::Result<T, EngineError> + Send + 'static,
{
    let future = TaskHarness::spawn(name, task, work).map_err(|source| CliError::Worker {
        task: name.to_string(),
        source,
    })?;
    match tokio::task::block_in_place(|| future.wait()) {
        TaskOutcome::Completed(value) => Ok(value),
        TaskOutcome::Failed(e) => Err(e.into()),
        TaskOutcome::Canceled { .. } => {
            warn!(task = name, "Task was canceled before it completed.");
            Err(CliError::Canceled(name.to_string()))
        }
    }
}
