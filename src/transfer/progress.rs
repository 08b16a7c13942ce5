use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// Percentage added on each estimator tick
pub const PROGRESS_STEP: u8 = 10;

/// Time between estimator ticks
pub const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// The estimate never passes this until the transfer has really finished
pub const PROGRESS_CAP: u8 = 90;

/// Synthetic upload progress.
///
/// The store reports nothing while a multipart body is in flight, so the
/// percentage is a time-based guess. It is cosmetic and says nothing about
/// bytes actually sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressEstimator {
    value: u8,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one tick and return the new estimate
    pub fn tick(&mut self) -> u8 {
        self.value = self.value.saturating_add(PROGRESS_STEP).min(PROGRESS_CAP);
        self.value
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    #[default]
    Idle,
    Uploading,
    Downloading,
    Succeeded,
    Failed,
}

/// Observable state of the current transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferJob {
    pub phase: TransferPhase,
    /// 0..=100
    pub progress: u8,
    pub error: Option<String>,
}

impl TransferJob {
    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, TransferPhase::Uploading | TransferPhase::Downloading)
    }
}

/// Publishes transfer state to any number of observers.
///
/// Starting a transfer while another is in flight is allowed; the newer
/// transfer simply takes over the published state.
#[derive(Debug)]
pub struct TransferTracker {
    state: watch::Sender<TransferJob>,
}

impl Default for TransferTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TransferJob::default());
        Self { state }
    }

    /// Enter `phase` at 0%
    pub fn begin(&self, phase: TransferPhase) {
        self.state.send_replace(TransferJob {
            phase,
            progress: 0,
            error: None,
        });
    }

    pub fn set_progress(&self, progress: u8) {
        let progress = progress.min(100);
        self.state.send_if_modified(|job| {
            if job.progress == progress {
                return false;
            }
            job.progress = progress;
            true
        });
    }

    pub fn succeed(&self) {
        self.state.send_modify(|job| {
            job.phase = TransferPhase::Succeeded;
            job.progress = 100;
            job.error = None;
        });
    }

    /// Failed transfers fall back to 0% with the message kept for display
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|job| {
            job.phase = TransferPhase::Failed;
            job.progress = 0;
            job.error = Some(message);
        });
    }

    pub fn current(&self) -> TransferJob {
        self.state.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().is_in_flight()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferJob> {
        self.state.subscribe()
    }
}
