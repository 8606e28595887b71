use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    detection::Action,
    dispatch::{DispatchBatch, WebhookDispatcher},
    models::{ActivityEvent, ActivityKind, Sample},
    pipeline::Pipeline,
    settings::MonitorSettings,
    status::{StatusMessage, StatusSink},
};

use super::commands::{MonitorCommand, MonitorSnapshot};
use super::countdown::Countdown;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Owns everything that is mutated on the sample path. Lives inside a single
/// task; nothing in here is shared.
pub(super) struct MonitorWorker {
    pipeline: Pipeline,
    settings: Arc<MonitorSettings>,
    countdown: Option<Countdown>,
    dispatcher: WebhookDispatcher,
    status: Arc<dyn StatusSink>,
    events: broadcast::Sender<ActivityEvent>,
    /// Weak so the queue closes once every `MonitorHandle` is gone.
    commands: mpsc::WeakUnboundedSender<MonitorCommand>,
    in_flight: Vec<DispatchBatch>,
    samples_processed: u64,
    events_emitted: u64,
}

impl MonitorWorker {
    pub(super) fn new(
        settings: Arc<MonitorSettings>,
        dispatcher: WebhookDispatcher,
        status: Arc<dyn StatusSink>,
        events: broadcast::Sender<ActivityEvent>,
        commands: mpsc::WeakUnboundedSender<MonitorCommand>,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(&settings),
            settings,
            countdown: None,
            dispatcher,
            status,
            events,
            commands,
            in_flight: Vec::new(),
            samples_processed: 0,
            events_emitted: 0,
        }
    }

    fn handle(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::Sample(sample) => self.process_sample(sample),
            MonitorCommand::Batch(samples) => {
                for sample in samples {
                    self.process_sample(sample);
                }
            }
            MonitorCommand::Pause => {
                let actions = self.pipeline.machine_mut().pause();
                self.apply(actions);
            }
            MonitorCommand::Resume => {
                let actions = self.pipeline.machine_mut().resume();
                self.apply(actions);
            }
            MonitorCommand::TogglePause => {
                let actions = self.pipeline.machine_mut().toggle_pause();
                log_info!(
                    "Detection paused state is now: {}",
                    self.pipeline.machine().is_paused()
                );
                self.apply(actions);
            }
            MonitorCommand::Override(target) => {
                if self.override_ignored() {
                    return;
                }
                let actions = self.pipeline.machine_mut().force(target);
                self.apply(actions);
            }
            MonitorCommand::ToggleOverride => {
                if self.override_ignored() {
                    return;
                }
                let actions = self.pipeline.machine_mut().toggle();
                self.apply(actions);
            }
            MonitorCommand::Reload(settings) => {
                self.pipeline.apply_settings(&settings);
                log_info!(
                    "Settings reloaded: threshold={}, confirmation={}s, window={}, endpoints={}",
                    settings.threshold,
                    settings.confirmation_seconds,
                    settings.window_size,
                    settings.endpoints.len()
                );
                self.settings = settings;
            }
            MonitorCommand::ConfirmationTick {
                generation,
                remaining_secs,
            } => {
                let actions = self
                    .pipeline
                    .machine_mut()
                    .countdown_tick(generation, remaining_secs);
                self.apply(actions);
            }
            MonitorCommand::ConfirmationElapsed { generation } => {
                let actions = self.pipeline.machine_mut().confirmation_elapsed(generation);
                if actions.is_empty() {
                    log_debug!("Ignoring stale confirmation {generation}");
                }
                self.apply(actions);
            }
            MonitorCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn process_sample(&mut self, sample: Sample) {
        self.samples_processed += 1;
        let output = self.pipeline.process(sample);
        self.apply(output.actions);
    }

    fn override_ignored(&self) -> bool {
        let paused = self.pipeline.machine().is_paused();
        if paused {
            log_info!("Manual toggle ignored while detection is paused.");
        }
        paused
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Status(message) => self.status.publish(&message),
                Action::StartCountdown {
                    generation,
                    seconds,
                } => {
                    self.cancel_countdown();
                    log_debug!("Starting {seconds}s confirmation countdown ({generation})");
                    self.countdown = Some(Countdown::spawn(
                        generation,
                        seconds,
                        self.commands.clone(),
                    ));
                }
                Action::CancelCountdown => {
                    self.cancel_countdown();
                }
                Action::Emit(kind) => self.emit(kind),
            }
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            log_debug!("Countdown {} cancelled.", countdown.generation());
            countdown.cancel();
        }
    }

    fn emit(&mut self, kind: ActivityKind) {
        let event = ActivityEvent::new(self.settings.subject_name.clone(), kind, Utc::now());
        log_info!(
            "State changed to {}. Sending webhook.",
            self.pipeline.machine().state()
        );

        self.events_emitted += 1;
        // No subscribers is fine.
        let _ = self.events.send(event.clone());

        self.in_flight.retain(|batch| !batch.is_finished());
        let batch = self
            .dispatcher
            .dispatch(event, self.settings.endpoints.iter().cloned());
        self.in_flight.push(batch);
    }

    fn snapshot(&self) -> MonitorSnapshot {
        let machine = self.pipeline.machine();
        MonitorSnapshot {
            state: machine.state(),
            paused: machine.is_paused(),
            rms: self.pipeline.last_rms(),
            window_len: self.pipeline.window().len(),
            window_size: self.pipeline.window().capacity(),
            pending_generation: machine.pending().map(|pending| pending.generation),
            samples_processed: self.samples_processed,
            events_emitted: self.events_emitted,
        }
    }

    /// Stop the countdown and wait for deliveries already handed off.
    async fn shutdown(mut self) {
        self.cancel_countdown();
        self.status.publish(&StatusMessage::Stopped);

        for batch in self.in_flight.drain(..) {
            if let Err(err) = batch.wait().await {
                log_error!("dispatch batch did not finish cleanly: {err:#}");
            }
        }
    }
}

pub(super) async fn monitor_loop(
    mut worker: MonitorWorker,
    mut commands: mpsc::UnboundedReceiver<MonitorCommand>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => worker.handle(command),
                None => {
                    log_info!("monitor queue closed, shutting down");
                    break;
                }
            },
            _ = cancel_token.cancelled() => {
                log_info!("monitor loop shutting down");
                break;
            }
        }
    }

    worker.shutdown().await;
}
