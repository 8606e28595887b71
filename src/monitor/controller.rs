use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    dispatch::WebhookDispatcher,
    models::{ActivityEvent, ActivityKind, Sample},
    settings::MonitorSettings,
    status::StatusSink,
};

use super::commands::{MonitorCommand, MonitorSnapshot};
use super::worker::{monitor_loop, MonitorWorker};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable front door to a running monitor. Every call is a message into
/// the monitor's queue and returns without waiting for it to be handled,
/// except [`MonitorHandle::snapshot`].
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<MonitorCommand>,
}

impl MonitorHandle {
    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("monitor is not running"))
    }

    pub fn push_sample(&self, sample: Sample) -> Result<()> {
        self.send(MonitorCommand::Sample(sample))
    }

    pub fn push_batch(&self, samples: Vec<Sample>) -> Result<()> {
        self.send(MonitorCommand::Batch(samples))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(MonitorCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(MonitorCommand::Resume)
    }

    pub fn toggle_pause(&self) -> Result<()> {
        self.send(MonitorCommand::TogglePause)
    }

    /// Operator override: mark the activity as running now.
    pub fn mark_started(&self) -> Result<()> {
        self.send(MonitorCommand::Override(ActivityKind::Started))
    }

    /// Operator override: mark the activity as finished now.
    pub fn mark_stopped(&self) -> Result<()> {
        self.send(MonitorCommand::Override(ActivityKind::Stopped))
    }

    pub fn toggle_manual(&self) -> Result<()> {
        self.send(MonitorCommand::ToggleOverride)
    }

    pub fn reload(&self, settings: Arc<MonitorSettings>) -> Result<()> {
        self.send(MonitorCommand::Reload(settings))
    }

    /// Returns once every command sent before it has been handled.
    pub async fn snapshot(&self) -> Result<MonitorSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MonitorCommand::Snapshot(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("monitor stopped before answering"))
    }
}

/// Starts and stops the monitor task for one sensor stream.
pub struct MonitorController {
    dispatcher: WebhookDispatcher,
    status: Arc<dyn StatusSink>,
    events: broadcast::Sender<ActivityEvent>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    monitor: Option<MonitorHandle>,
}

impl MonitorController {
    pub fn new(dispatcher: WebhookDispatcher, status: Arc<dyn StatusSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            dispatcher,
            status,
            events,
            handle: None,
            cancel_token: None,
            monitor: None,
        }
    }

    pub fn start(&mut self, settings: Arc<MonitorSettings>) -> Result<MonitorHandle> {
        if self.handle.is_some() {
            bail!("monitor already running");
        }

        info!(
            "Starting monitor '{}' (threshold={}, confirmation={}s, window={})",
            settings.subject_name,
            settings.threshold,
            settings.confirmation_seconds,
            settings.window_size
        );

        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = MonitorWorker::new(
            settings,
            self.dispatcher.clone(),
            self.status.clone(),
            self.events.clone(),
            tx.downgrade(),
        );

        let handle = tokio::spawn(monitor_loop(worker, rx, cancel_token.clone()));
        let monitor = MonitorHandle { tx };

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.monitor = Some(monitor.clone());
        Ok(monitor)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<MonitorHandle> {
        self.monitor.clone()
    }

    /// Events are published here as well as dispatched to webhooks.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }

    pub fn dispatcher(&self) -> &WebhookDispatcher {
        &self.dispatcher
    }

    /// Cancel the monitor task and wait for it, including any webhook
    /// deliveries it already started. Commands still queued are dropped.
    pub async fn stop(&mut self) -> Result<()> {
        self.monitor = None;

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("monitor task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use tokio::time;

    use super::*;
    use crate::detection::DetectorState;
    use crate::dispatch::webhook::test_support::{body_of, spawn_endpoint, Reply};
    use crate::dispatch::DispatcherConfig;
    use crate::metrics::DeliveryMetrics;
    use crate::status::{MemoryStatusSink, StatusMessage, WatchStatusSink};

    const WINDOW: usize = 4;

    fn settings(confirmation_seconds: u64) -> MonitorSettings {
        MonitorSettings {
            subject_name: "dryer-1".into(),
            threshold: 0.1,
            confirmation_seconds,
            window_size: WINDOW,
            ..MonitorSettings::default()
        }
    }

    fn controller() -> (MonitorController, Arc<MemoryStatusSink>) {
        let status = Arc::new(MemoryStatusSink::default());
        let dispatcher = WebhookDispatcher::new(
            DispatcherConfig::default(),
            status.clone(),
            DeliveryMetrics::new(),
        )
        .unwrap();
        (MonitorController::new(dispatcher, status.clone()), status)
    }

    fn push_loud(monitor: &MonitorHandle, count: usize) {
        for i in 0..count {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            monitor.push_sample(Sample::new(x, 0.0, 0.0)).unwrap();
        }
    }

    fn push_quiet(monitor: &MonitorHandle, count: usize) {
        let quiet = vec![Sample::new(0.0, 0.0, 0.0); count];
        monitor.push_batch(quiet).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn brief_crossing_emits_nothing() {
        let (mut controller, _status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(5))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        assert_eq!(
            monitor.snapshot().await.unwrap().state,
            DetectorState::ConfirmingStart
        );

        time::sleep(Duration::from_secs(2)).await;
        push_quiet(&monitor, 8);
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.state, DetectorState::Idle);
        assert_eq!(snapshot.pending_generation, None);

        // Well past the first deadline.
        time::sleep(Duration::from_secs(10)).await;
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.state, DetectorState::Idle);
        assert_eq!(snapshot.events_emitted, 0);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_vibration_confirms_start_after_countdown() {
        let (mut controller, status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(3))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        monitor.snapshot().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(event.detected);
        assert_eq!(event.subject, "dryer-1");
        assert_eq!(monitor.snapshot().await.unwrap().state, DetectorState::Active);

        let countdown: Vec<StatusMessage> = status
            .messages()
            .into_iter()
            .filter(|message| matches!(message, StatusMessage::ConfirmingStart { .. }))
            .collect();
        assert_eq!(
            countdown,
            vec![
                StatusMessage::ConfirmingStart { remaining_secs: 3 },
                StatusMessage::ConfirmingStart { remaining_secs: 2 },
                StatusMessage::ConfirmingStart { remaining_secs: 1 },
            ]
        );
        // No endpoints configured.
        assert!(status.contains(&StatusMessage::NoEndpoints));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_then_resume_after_deadline_emits_no_stale_event() {
        let (mut controller, _status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(5))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        monitor.pause().unwrap();
        let snapshot = monitor.snapshot().await.unwrap();
        assert!(snapshot.paused);
        assert_eq!(snapshot.state, DetectorState::Idle);

        // Samples while paused are measured but not evaluated.
        push_loud(&monitor, 8);
        time::sleep(Duration::from_secs(8)).await;
        monitor.resume().unwrap();

        let snapshot = monitor.snapshot().await.unwrap();
        assert!(!snapshot.paused);
        assert!(snapshot.rms > 0.1);
        assert_eq!(snapshot.state, DetectorState::Idle);
        assert_eq!(snapshot.pending_generation, None);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        // Only a fresh crossing starts a new confirmation.
        push_loud(&monitor, 2);
        assert_eq!(
            monitor.snapshot().await.unwrap().state,
            DetectorState::ConfirmingStart
        );

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_override_emits_immediately_and_cancels_countdown() {
        let (mut controller, _status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(5))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        monitor.mark_started().unwrap();

        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.state, DetectorState::Active);
        assert_eq!(snapshot.pending_generation, None);
        assert!(events.try_recv().unwrap().detected);

        // The cancelled countdown never fires.
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(monitor.snapshot().await.unwrap().events_emitted, 1);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        monitor.toggle_manual().unwrap();
        monitor.snapshot().await.unwrap();
        assert!(!events.try_recv().unwrap().detected);

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_override_while_paused_is_ignored() {
        let (mut controller, _status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(5))).unwrap();

        monitor.toggle_pause().unwrap();
        monitor.mark_started().unwrap();
        monitor.toggle_manual().unwrap();

        let snapshot = monitor.snapshot().await.unwrap();
        assert!(snapshot.paused);
        assert_eq!(snapshot.state, DetectorState::Idle);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reload_mid_confirmation_keeps_countdown_running() {
        let (mut controller, _status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(4))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        let before = monitor.snapshot().await.unwrap().pending_generation;
        assert!(before.is_some());

        let reloaded = MonitorSettings {
            threshold: 0.2,
            confirmation_seconds: 60,
            ..settings(4)
        };
        monitor.reload(Arc::new(reloaded)).unwrap();
        assert_eq!(monitor.snapshot().await.unwrap().pending_generation, before);

        // The 4 second countdown started before the reload still completes.
        let event = events.recv().await.unwrap();
        assert!(event.detected);

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn confirmed_event_reaches_webhook_before_stop_returns() {
        let (url, mut requests) = spawn_endpoint(Reply::Status(204)).await;
        let (mut controller, _status) = controller();
        let monitor_settings = MonitorSettings {
            endpoints: [url].into_iter().collect(),
            ..settings(0)
        };
        let monitor = controller.start(Arc::new(monitor_settings)).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        monitor.snapshot().await.unwrap();
        controller.stop().await.unwrap();

        let request = requests.recv().await.unwrap();
        let body: serde_json::Value = serde_json::from_str(body_of(&request)).unwrap();
        assert_eq!(body["name"], "dryer-1");
        assert_eq!(body["detected"], true);

        let metrics = controller.dispatcher().metrics().get_snapshot().await;
        assert_eq!(metrics.delivered_count, 1);
    }

    #[tokio::test]
    async fn handle_reports_stopped_monitor() {
        let (mut controller, _status) = controller();
        let monitor = controller.start(Arc::new(settings(1))).unwrap();
        assert!(controller.start(Arc::new(settings(1))).is_err());

        controller.stop().await.unwrap();

        assert!(!controller.is_running());
        assert!(controller.handle().is_none());
        assert!(monitor.snapshot().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_endpoint_warning_is_the_last_status_shown() {
        let (sink, shown) = WatchStatusSink::new();
        let sink = Arc::new(sink);
        let dispatcher =
            WebhookDispatcher::new(DispatcherConfig::default(), sink.clone(), DeliveryMetrics::new())
                .unwrap();
        let mut controller = MonitorController::new(dispatcher, sink);
        let monitor = controller.start(Arc::new(settings(0))).unwrap();

        monitor.mark_started().unwrap();
        monitor.snapshot().await.unwrap();
        assert_eq!(*shown.borrow(), StatusMessage::NoEndpoints.to_string());

        // The last quiet sample fills the window and commits the stop.
        push_quiet(&monitor, WINDOW);
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.state, DetectorState::Idle);
        assert_eq!(snapshot.events_emitted, 2);
        assert_eq!(*shown.borrow(), "Warning: No webhook URLs are set.");

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_controller_shuts_the_monitor_down() {
        let (mut controller, status) = controller();
        let mut events = controller.subscribe_events();
        let monitor = controller.start(Arc::new(settings(5))).unwrap();

        push_quiet(&monitor, 8);
        push_loud(&monitor, 8);
        assert!(monitor.snapshot().await.unwrap().pending_generation.is_some());

        drop(controller);

        // The worker held the last event sender.
        assert!(matches!(events.recv().await, Err(RecvError::Closed)));
        assert!(status.contains(&StatusMessage::Stopped));
        assert!(monitor.snapshot().await.is_err());
    }
}
