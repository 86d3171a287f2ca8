//! UI-side telemetry consumer
//!
//! A [`TelemetryMonitor`] runs as a tokio task. It follows the processing
//! lifecycle through the [`ProcessingSettingsBridge`], drains a publisher
//! [`Subscription`] on a fixed refresh interval and keeps a
//! [`DynamicRangeProcessorHistory`] for display. Consumers read
//! [`HistorySnapshot`]s from a watch channel.

use super::publisher::Subscription;
use compand_core::domain::bridge::{InitializeProcessingSettings, ProcessingSettingsBridge, RealtimeResumed};
use compand_core::domain::config::TelemetryConfig;
use compand_core::domain::history::{DynamicRangeProcessorHistory, Segment};
use compand_core::domain::telemetry::CompressionPacket;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

/// Point-in-time view of the monitored history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    /// Rate of the active session; `None` while processing is stopped
    pub sample_rate: Option<f64>,
    pub segments: Vec<Segment>,
    /// Packets that became history points since the monitor started
    pub points_accepted: u64,
    /// Resume events applied since the monitor started
    pub resumes: u64,
}

impl HistorySnapshot {
    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Largest target compression in the window (most negative value)
    pub fn deepest_target_db(&self) -> Option<f32> {
        self.segments
            .iter()
            .flatten()
            .map(|point| point.target)
            .reduce(f32::min)
    }
}

struct MonitorState {
    subscription: Subscription,
    history: Option<DynamicRangeProcessorHistory>,
    history_seconds: f32,
    scratch: Vec<CompressionPacket>,
    points_accepted: u64,
    resumes: u64,
    snapshot_tx: watch::Sender<HistorySnapshot>,
}

impl MonitorState {
    fn on_initialize(&mut self, settings: Option<InitializeProcessingSettings>) {
        // Packets still queued belong to the previous session
        self.scratch.clear();
        self.subscription.drain_into(&mut self.scratch);
        self.scratch.clear();

        self.history = settings.map(|s| {
            info!(sample_rate = s.sample_rate, "Monitoring processing session");
            DynamicRangeProcessorHistory::with_max_time(s.sample_rate, self.history_seconds)
        });
        if self.history.is_none() {
            info!("Processing stopped");
        }
        self.publish();
    }

    fn on_resume(&mut self) {
        // Queued packets predate the pause and close the current segment
        self.drain();
        if let Some(history) = self.history.as_mut() {
            history.begin_new_segment();
        }
        self.resumes += 1;
        self.publish();
        debug!("Realtime resumed, starting new segment");
    }

    fn drain(&mut self) -> usize {
        self.scratch.clear();
        let count = self.subscription.drain_into(&mut self.scratch);
        match self.history.as_mut() {
            Some(history) => {
                let accepted = history.push(&self.scratch);
                self.points_accepted += accepted as u64;
                count
            }
            None => {
                if count > 0 {
                    trace!(count, "Discarding packets outside a session");
                }
                0
            }
        }
    }

    fn on_tick(&mut self) {
        if self.drain() > 0 {
            self.publish();
        }
    }

    fn publish(&self) {
        let snapshot = HistorySnapshot {
            sample_rate: self.history.as_ref().map(DynamicRangeProcessorHistory::sample_rate),
            segments: self
                .history
                .as_ref()
                .map(|h| h.segments().to_vec())
                .unwrap_or_default(),
            points_accepted: self.points_accepted,
            resumes: self.resumes,
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Handle to a running monitor task
pub struct TelemetryMonitor {
    snapshot_rx: watch::Receiver<HistorySnapshot>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TelemetryMonitor {
    /// Spawn the monitor on the current tokio runtime
    #[instrument(skip_all, fields(refresh_ms = config.refresh_interval_ms))]
    pub fn spawn(
        bridge: &ProcessingSettingsBridge,
        subscription: Subscription,
        config: &TelemetryConfig,
    ) -> Self {
        let initialize_rx = bridge.subscribe_initialize();
        let resume_rx = bridge.subscribe_resume();
        let (snapshot_tx, snapshot_rx) = watch::channel(HistorySnapshot::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state = MonitorState {
            subscription,
            history: None,
            history_seconds: config.history_seconds,
            scratch: Vec::with_capacity(config.queue_capacity),
            points_accepted: 0,
            resumes: 0,
            snapshot_tx,
        };
        let refresh = Duration::from_millis(config.refresh_interval_ms.max(1));

        let handle = tokio::spawn(run(state, initialize_rx, resume_rx, shutdown_rx, refresh));
        debug!("Telemetry monitor started");

        Self {
            snapshot_rx,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> HistorySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<HistorySnapshot> {
        self.snapshot_rx.clone()
    }

    /// Drain what is left, stop the task and return the final snapshot
    pub async fn shutdown(mut self) -> HistorySnapshot {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Telemetry monitor task failed");
        }
        self.snapshot()
    }
}

impl Drop for TelemetryMonitor {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            self.handle.abort();
        }
    }
}

async fn run(
    mut state: MonitorState,
    mut initialize_rx: broadcast::Receiver<Option<InitializeProcessingSettings>>,
    mut resume_rx: broadcast::Receiver<RealtimeResumed>,
    mut shutdown_rx: oneshot::Receiver<()>,
    refresh: Duration,
) {
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                handle_pending_events(&mut state, &mut initialize_rx, &mut resume_rx);
                state.on_tick();
                break;
            }
            event = initialize_rx.recv() => match event {
                Ok(settings) => state.on_initialize(settings),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed processing lifecycle events");
                }
                Err(RecvError::Closed) => {
                    state.on_tick();
                    break;
                }
            },
            event = resume_rx.recv() => match event {
                Ok(RealtimeResumed) => state.on_resume(),
                Err(RecvError::Lagged(skipped)) => {
                    // Every missed event means the same thing
                    trace!(skipped, "Coalescing resume events");
                    state.on_resume();
                }
                Err(RecvError::Closed) => {
                    state.on_tick();
                    break;
                }
            },
            _ = ticker.tick() => state.on_tick(),
        }
    }

    debug!(points = state.points_accepted, "Telemetry monitor stopped");
}

/// Apply lifecycle events that are already queued, without waiting
fn handle_pending_events(
    state: &mut MonitorState,
    initialize_rx: &mut broadcast::Receiver<Option<InitializeProcessingSettings>>,
    resume_rx: &mut broadcast::Receiver<RealtimeResumed>,
) {
    loop {
        match initialize_rx.try_recv() {
            Ok(settings) => state.on_initialize(settings),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    let mut resumed = false;
    loop {
        match resume_rx.try_recv() {
            Ok(RealtimeResumed) | Err(TryRecvError::Lagged(_)) => resumed = true,
            Err(_) => break,
        }
    }
    if resumed {
        state.on_resume();
    }
}
