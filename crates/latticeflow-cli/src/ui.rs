use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use latticeflow::engine::progress::{Progress, ProgressCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: BarState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct BarState {
    active_bar: Option<ProgressBar>,
    base_message: String,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: BarState::default(),
            event_receiver,
            shutdown_receiver,
            sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        self.sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn ensure_bar(&mut self) -> &ProgressBar {
        let mp = &self.mp;
        self.state.active_bar.get_or_insert_with(|| {
            let pb = mp.add(ProgressBar::new_spinner());
            pb.set_style(Self::spinner_style());
            pb
        })
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.enable_steady_tick(Duration::from_millis(80));
                pb.set_style(Self::spinner_style());
                pb.set_message(name.to_string());

                self.state.active_bar = Some(pb);
                self.state.base_message = name.to_string();
            }
            Progress::PhaseFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }
                if !self.state.base_message.is_empty() {
                    self.mp.println(format!("✓ {}", self.state.base_message)).ok();
                }
                self.state.base_message.clear();
            }
            Progress::TaskStart { total_steps } => {
                let bar = self.ensure_bar();
                bar.set_style(Self::bar_style());
                bar.set_length(total_steps);
                bar.set_position(0);
                bar.disable_steady_tick();
            }
            Progress::TaskAdvance { position } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.set_position(position);
                }
            }
            Progress::TaskFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    if let Some(len) = bar.length() {
                        bar.set_position(len);
                    }
                    bar.finish_and_clear();
                }
            }
            Progress::StatusUpdate { text } => {
                let message = if self.state.base_message.is_empty() {
                    text
                } else {
                    format!("{} ({})", self.state.base_message, text)
                };
                self.ensure_bar().set_message(message);
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<45} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("━╸ ")
    }
}

#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> (UiManager, mpsc::Sender<UiEvent>) {
        let (manager, sender, _) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        (manager, sender)
    }

    #[test]
    fn phase_start_creates_a_spinner() {
        let (mut manager, _) = setup_manager();
        assert!(manager.state.active_bar.is_none());

        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: "Classifying" }));

        let bar = manager.state.active_bar.as_ref().unwrap();
        assert_eq!(bar.message(), "Classifying");
        assert_eq!(manager.state.base_message, "Classifying");
    }

    #[test]
    fn phase_start_replaces_the_existing_bar() {
        let (mut manager, _) = setup_manager();
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: "Preparing" }));
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: "Classifying" }));

        let bar = manager.state.active_bar.as_ref().unwrap();
        assert_eq!(bar.message(), "Classifying");
    }

    #[test]
    fn phase_finish_clears_the_active_bar() {
        let (mut manager, _) = setup_manager();
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: "Preparing" }));
        manager.handle_event(UiEvent::Progress(Progress::PhaseFinish));

        assert!(manager.state.active_bar.is_none());
        assert!(manager.state.base_message.is_empty());
    }

    #[test]
    fn task_events_drive_the_bar_without_a_phase() {
        let (mut manager, _) = setup_manager();
        manager.handle_event(UiEvent::Progress(Progress::TaskStart { total_steps: 100 }));
        {
            let bar = manager.state.active_bar.as_ref().unwrap();
            assert_eq!(bar.length(), Some(100));
            assert_eq!(bar.position(), 0);
        }

        manager.handle_event(UiEvent::Progress(Progress::TaskAdvance { position: 40 }));
        assert_eq!(manager.state.active_bar.as_ref().unwrap().position(), 40);

        manager.handle_event(UiEvent::Progress(Progress::TaskFinish));
        assert!(manager.state.active_bar.is_none());
    }

    #[test]
    fn status_update_is_appended_to_the_phase_name() {
        let (mut manager, _) = setup_manager();
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: "Loading" }));
        manager.handle_event(UiEvent::Progress(Progress::StatusUpdate {
            text: "Timestep 100".into(),
        }));

        let bar = manager.state.active_bar.as_ref().unwrap();
        assert_eq!(bar.message(), "Loading (Timestep 100)");
    }

    #[tokio::test]
    async fn progress_handler_forwards_events() {
        let (sender, mut receiver) = mpsc::channel(1);
        let handler = CliProgressHandler::new(sender);
        let callback = handler.get_callback();

        callback(Progress::TaskStart { total_steps: 7 });

        match receiver.recv().await.unwrap() {
            UiEvent::Progress(Progress::TaskStart { total_steps }) => assert_eq!(total_steps, 7),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
