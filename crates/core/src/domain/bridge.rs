//! Processing-state notifications from the effect instance to visualizers
//!
//! A [`ProcessingSettingsBridge`] lives for one editing session. The instance
//! publishes lifecycle events into it, visualizers subscribe. Publishing never
//! waits for a subscriber and succeeds with no subscriber at all.

use tokio::sync::broadcast;
use tracing::trace;

/// Payload published when realtime processing starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitializeProcessingSettings {
    pub sample_rate: f64,
}

/// Published when realtime processing resumes after a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealtimeResumed;

/// Broadcast channels for processing lifecycle events
///
/// `Some(settings)` on the initialize channel means "processing started at
/// this rate", `None` means "processing stopped".
#[derive(Debug, Clone)]
pub struct ProcessingSettingsBridge {
    initialize_tx: broadcast::Sender<Option<InitializeProcessingSettings>>,
    resume_tx: broadcast::Sender<RealtimeResumed>,
}

impl ProcessingSettingsBridge {
    /// Events kept for slow subscribers before they start lagging
    pub const DEFAULT_CAPACITY: usize = 16;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (initialize_tx, _) = broadcast::channel(capacity.max(1));
        let (resume_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            initialize_tx,
            resume_tx,
        }
    }

    /// Announce that processing started (`Some`) or stopped (`None`)
    pub fn publish_initialize(&self, settings: Option<InitializeProcessingSettings>) {
        if self.initialize_tx.send(settings).is_err() {
            trace!("No subscriber for processing initialization");
        }
    }

    pub fn publish_resume(&self) {
        if self.resume_tx.send(RealtimeResumed).is_err() {
            trace!("No subscriber for realtime resume");
        }
    }

    pub fn subscribe_initialize(&self) -> broadcast::Receiver<Option<InitializeProcessingSettings>> {
        self.initialize_tx.subscribe()
    }

    pub fn subscribe_resume(&self) -> broadcast::Receiver<RealtimeResumed> {
        self.resume_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.initialize_tx.receiver_count() + self.resume_tx.receiver_count()
    }
}

impl Default for ProcessingSettingsBridge {
    fn default() -> Self {
        Self::new()
    }
}
