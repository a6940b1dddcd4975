//! Progress Spinner
//!
//! Purely cosmetic feedback while a one-shot run polls devices. The spinner
//! runs as its own task, is only drawn on an interactive terminal, and is
//! always stopped and joined before the run's result is reported. Nothing it
//! does can change that result.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProgressTask {
    bar: ProgressBar,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTask {
    /// Starts the spinner task, or a silent stand-in when `enabled` is false
    pub fn start(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(&["⠁", "⠂", "⠄", "⡀", "⢀", "⠠", "⠐", "⠈", " "])
            .template("{spinner} {msg}")
        {
            bar.set_style(style);
        }

        let (stop, mut stopped) = oneshot::channel();
        let ticker = bar.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => ticker.tick(),
                }
            }
            ticker.finish_and_clear();
        });

        Self {
            bar,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            stop: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn set_message(&self, message: String) {
        self.bar.set_message(message);
    }

    /// Stops the spinner and waits for its task to exit
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!("Progress task ended abnormally: {}", e);
            }
        }
    }
}
