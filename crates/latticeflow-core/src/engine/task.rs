use super::progress::{Progress, ProgressReporter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Number of intermittent progress updates forwarded per full progress range.
const INTERMITTENT_UPDATES: u64 = 200;

struct TaskShared {
    canceled: AtomicBool,
    value: AtomicU64,
    maximum: AtomicU64,
    last_reported: AtomicU64,
    text: Mutex<String>,
    reporter: ProgressReporter<'static>,
}

/// Handle shared between a unit of work and whoever monitors it.
///
/// Cancellation is cooperative: long loops poll [`Task::is_canceled`] or the
/// return value of the progress setters and stop when asked to.
#[derive(Clone)]
pub struct Task {
    shared: Arc<TaskShared>,
}

impl Default for Task {
    fn default() -> Self {
        Self::with_reporter(ProgressReporter::new())
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("canceled", &self.is_canceled())
            .field("value", &self.progress_value())
            .field("maximum", &self.progress_maximum())
            .finish()
    }
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporter(reporter: ProgressReporter<'static>) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                canceled: AtomicBool::new(false),
                value: AtomicU64::new(0),
                maximum: AtomicU64::new(0),
                last_reported: AtomicU64::new(0),
                text: Mutex::new(String::new()),
                reporter,
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.canceled.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.shared.canceled.load(Ordering::Relaxed)
    }

    pub fn set_progress_maximum(&self, maximum: u64) {
        self.shared.maximum.store(maximum, Ordering::Relaxed);
        self.shared.value.store(0, Ordering::Relaxed);
        self.shared.last_reported.store(0, Ordering::Relaxed);
        self.shared.reporter.report(Progress::TaskStart {
            total_steps: maximum,
        });
    }

    pub fn progress_maximum(&self) -> u64 {
        self.shared.maximum.load(Ordering::Relaxed)
    }

    pub fn progress_value(&self) -> u64 {
        self.shared.value.load(Ordering::Relaxed)
    }

    /// Records progress; returns `false` once the task has been canceled.
    pub fn set_progress_value(&self, value: u64) -> bool {
        self.shared.value.store(value, Ordering::Relaxed);
        self.shared.last_reported.store(value, Ordering::Relaxed);
        self.shared
            .reporter
            .report(Progress::TaskAdvance { position: value });
        !self.is_canceled()
    }

    /// Like [`Task::set_progress_value`], but only forwards an update when the
    /// value moved by a noticeable fraction of the maximum.
    pub fn set_progress_value_intermittent(&self, value: u64) -> bool {
        self.shared.value.store(value, Ordering::Relaxed);
        let step = (self.progress_maximum() / INTERMITTENT_UPDATES).max(1);
        let last = self.shared.last_reported.load(Ordering::Relaxed);
        if value >= last.saturating_add(step) || value < last {
            self.shared.last_reported.store(value, Ordering::Relaxed);
            self.shared
                .reporter
                .report(Progress::TaskAdvance { position: value });
        }
        !self.is_canceled()
    }

    /// Adds to the progress value; safe to call from several worker threads.
    pub fn increment_progress_value(&self, amount: u64) -> bool {
        let value = self.shared.value.fetch_add(amount, Ordering::Relaxed) + amount;
        let step = (self.progress_maximum() / INTERMITTENT_UPDATES).max(1);
        let last = self.shared.last_reported.load(Ordering::Relaxed);
        if value >= last.saturating_add(step)
            && self
                .shared
                .last_reported
                .compare_exchange(last, value, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.shared
                .reporter
                .report(Progress::TaskAdvance { position: value });
        }
        !self.is_canceled()
    }

    pub fn set_progress_text(&self, text: impl Into<String>) {
        let text = text.into();
        if let Ok(mut current) = self.shared.text.lock() {
            current.clone_from(&text);
        }
        self.shared.reporter.report(Progress::StatusUpdate { text });
    }

    pub fn progress_text(&self) -> String {
        self.shared
            .text
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn begin_phase(&self, name: &'static str) {
        self.shared.reporter.report(Progress::PhaseStart { name });
    }

    pub fn end_phase(&self) {
        self.shared.reporter.report(Progress::PhaseFinish);
    }

    pub fn finish_progress(&self) {
        self.shared.reporter.report(Progress::TaskFinish);
    }
}

/// Errors that can tell whether they merely signal cancellation.
pub trait Cancellation {
    fn is_cancellation(&self) -> bool;
}

#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Completed(T),
    Failed(E),
    /// Carries whatever the work produced before it noticed the cancellation.
    Canceled { partial: Option<T> },
}

impl<T, E: Cancellation> TaskOutcome<T, E> {
    pub fn from_result(task: &Task, result: Result<T, E>) -> Self {
        match result {
            Ok(value) if task.is_canceled() => TaskOutcome::Canceled {
                partial: Some(value),
            },
            Ok(value) => TaskOutcome::Completed(value),
            Err(e) if e.is_cancellation() => TaskOutcome::Canceled { partial: None },
            Err(e) => TaskOutcome::Failed(e),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskOutcome::Canceled { .. })
    }

    /// Collapses the outcome into a result, mapping cancellation to `canceled`.
    pub fn into_result(self, canceled: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            TaskOutcome::Completed(value) => Ok(value),
            TaskOutcome::Failed(e) => Err(e),
            TaskOutcome::Canceled { .. } => Err(canceled()),
        }
    }
}

/// A unit of work running on a background thread.
pub struct TaskFuture<T, E> {
    task: Task,
    handle: JoinHandle<Result<T, E>>,
}

impl<T, E: Cancellation> TaskFuture<T, E> {
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Current `(value, maximum)` progress pair.
    pub fn progress(&self) -> (u64, u64) {
        (self.task.progress_value(), self.task.progress_maximum())
    }

    /// Blocks until the work finishes. A panic in the worker is propagated.
    pub fn wait(self) -> TaskOutcome<T, E> {
        match self.handle.join() {
            Ok(result) => TaskOutcome::from_result(&self.task, result),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

pub struct TaskHarness;

impl TaskHarness {
    /// Runs `work` on a named worker thread and returns a pollable future.
    pub fn spawn<T, E, F>(name: &str, task: Task, work: F) -> std::io::Result<TaskFuture<T, E>>
    where
        T: Send + 'static,
        E: Cancellation + Send + 'static,
        F: FnOnce(&Task) -> Result<T, E> + Send + 'static,
    {
        let worker_task = task.clone();
        let handle = thread::Builder::new()
            .name(format!("latticeflow-{name}"))
            .spawn(move || work(&worker_task))?;
        Ok(TaskFuture { task, handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Broken,
        Stopped,
    }

    impl Cancellation for TestError {
        fn is_cancellation(&self) -> bool {
            matches!(self, TestError::Stopped)
        }
    }

    #[test]
    fn progress_setters_report_cancellation() {
        let task = Task::new();
        task.set_progress_maximum(10);
        assert!(task.set_progress_value(3));
        task.cancel();
        assert!(!task.set_progress_value(4));
        assert!(!task.set_progress_value_intermittent(5));
        assert_eq!(task.progress_value(), 5);
    }

    #[test]
    fn intermittent_updates_are_throttled() {
        let (tx, rx) = mpsc::channel();
        let task = Task::with_reporter(ProgressReporter::with_callback(Box::new(move |event| {
            if let Progress::TaskAdvance { position } = event {
                let _ = tx.send(position);
            }
        })));
        task.set_progress_maximum(1000);
        for v in 0..1000 {
            task.set_progress_value_intermittent(v);
        }
        let reported: Vec<u64> = rx.try_iter().collect();
        assert!(reported.len() <= INTERMITTENT_UPDATES as usize);
        assert!(!reported.is_empty());
    }

    #[test]
    fn progress_text_is_stored_and_forwarded() {
        let (tx, rx) = mpsc::channel();
        let task = Task::with_reporter(ProgressReporter::with_callback(Box::new(move |event| {
            let _ = tx.send(event);
        })));
        task.set_progress_text("Scanning file");
        assert_eq!(task.progress_text(), "Scanning file");
        assert_eq!(
            rx.try_recv().unwrap(),
            Progress::StatusUpdate {
                text: "Scanning file".to_string()
            }
        );
    }

    #[test]
    fn spawned_work_completes() {
        let future = TaskHarness::spawn("sum", Task::new(), |_task| {
            Ok::<_, TestError>((1..=10).sum::<u32>())
        })
        .unwrap();
        match future.wait() {
            TaskOutcome::Completed(v) => assert_eq!(v, 55),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn failure_and_cancellation_are_distinct_outcomes() {
        let failed = TaskHarness::spawn("fail", Task::new(), |_| Err::<(), _>(TestError::Broken))
            .unwrap()
            .wait();
        assert!(matches!(failed, TaskOutcome::Failed(TestError::Broken)));

        let future = TaskHarness::spawn("spin", Task::new(), |task: &Task| {
            while !task.is_canceled() {
                thread::sleep(Duration::from_millis(1));
            }
            Err::<(), _>(TestError::Stopped)
        })
        .unwrap();
        future.cancel();
        assert!(future.wait().is_canceled());
    }

    #[test]
    fn canceled_work_may_return_partial_result() {
        let task = Task::new();
        task.cancel();
        let outcome = TaskOutcome::<Vec<u8>, TestError>::from_result(&task, Ok(vec![1, 2]));
        match outcome {
            TaskOutcome::Canceled { partial } => assert_eq!(partial, Some(vec![1, 2])),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
