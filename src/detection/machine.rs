//! Hysteresis state machine with debounced, cancellable confirmation.
//!
//! The machine does no I/O and owns no timers. Every input returns the list
//! of [`Action`]s the owner must carry out: start or cancel the countdown,
//! emit an event, publish a status. Countdown messages carry the generation
//! of the confirmation that started them; anything stale is ignored.
//!
//! A transition's status always precedes its `Emit`, so anything dispatch
//! reports (such as a missing endpoint warning) is the last status shown.

use crate::models::ActivityKind;
use crate::status::StatusMessage;

use super::state::{DetectionConfig, DetectorState, PendingConfirmation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Status(StatusMessage),
    /// Run a countdown of `seconds` and report back with `generation`.
    StartCountdown { generation: u64, seconds: u64 },
    CancelCountdown,
    Emit(ActivityKind),
}

#[derive(Debug, Clone)]
pub struct DetectionMachine {
    state: DetectorState,
    config: DetectionConfig,
    pending: Option<PendingConfirmation>,
    generation: u64,
    paused: bool,
}

impl DetectionMachine {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            state: DetectorState::Idle,
            config,
            pending: None,
            generation: 0,
            paused: false,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn config(&self) -> DetectionConfig {
        self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pending(&self) -> Option<PendingConfirmation> {
        self.pending
    }

    /// Swap in a new threshold and duration. A pending confirmation keeps
    /// running; the new threshold applies from the next evaluation.
    pub fn set_config(&mut self, config: DetectionConfig) {
        self.config = config;
    }

    /// Evaluate one RMS reading against the threshold.
    pub fn evaluate(&mut self, rms: f64) -> Vec<Action> {
        if self.paused {
            return Vec::new();
        }

        let above = rms > self.config.threshold;
        match self.state {
            DetectorState::Idle if above => self.begin_confirmation(ActivityKind::Started),
            DetectorState::Idle => vec![Action::Status(StatusMessage::Idle)],
            DetectorState::ConfirmingStart if above => Vec::new(),
            DetectorState::ConfirmingStart => self.abort_confirmation(),
            DetectorState::Active if above => vec![Action::Status(StatusMessage::Active)],
            DetectorState::Active => self.begin_confirmation(ActivityKind::Stopped),
            DetectorState::ConfirmingStop if above => self.abort_confirmation(),
            DetectorState::ConfirmingStop => Vec::new(),
        }
    }

    /// One second of a countdown has passed; `remaining_secs` are left.
    pub fn countdown_tick(&mut self, generation: u64, remaining_secs: u64) -> Vec<Action> {
        match self.pending {
            Some(pending) if pending.generation == generation => {
                vec![Action::Status(countdown_status(pending.target, remaining_secs))]
            }
            _ => Vec::new(),
        }
    }

    /// The countdown for `generation` ran to completion.
    pub fn confirmation_elapsed(&mut self, generation: u64) -> Vec<Action> {
        match self.pending {
            Some(pending)
                if pending.generation == generation
                    && self.state == DetectorState::confirming(pending.target) =>
            {
                self.commit(pending.target)
            }
            _ => Vec::new(),
        }
    }

    pub fn pause(&mut self) -> Vec<Action> {
        if self.paused {
            return Vec::new();
        }
        self.paused = true;

        let mut actions = Vec::new();
        if let Some(pending) = self.pending.take() {
            self.state = DetectorState::origin(pending.target);
            actions.push(Action::CancelCountdown);
        }
        actions.push(Action::Status(StatusMessage::Paused));
        actions
    }

    /// Resuming never restarts a cancelled confirmation.
    pub fn resume(&mut self) -> Vec<Action> {
        if !self.paused {
            return Vec::new();
        }
        self.paused = false;
        vec![Action::Status(StatusMessage::Resumed)]
    }

    pub fn toggle_pause(&mut self) -> Vec<Action> {
        if self.paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Operator override: jump straight to the settled state for `target`
    /// and emit its event. Ignored while paused.
    pub fn force(&mut self, target: ActivityKind) -> Vec<Action> {
        if self.paused {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.pending.take().is_some() {
            actions.push(Action::CancelCountdown);
        }
        self.state = DetectorState::settled(target);
        actions.push(Action::Status(match target {
            ActivityKind::Started => StatusMessage::ManuallyStarted,
            ActivityKind::Stopped => StatusMessage::ManuallyStopped,
        }));
        actions.push(Action::Emit(target));
        actions
    }

    /// Force whichever transition leads away from the current state.
    pub fn toggle(&mut self) -> Vec<Action> {
        let target = if self.state.is_engaged() {
            ActivityKind::Stopped
        } else {
            ActivityKind::Started
        };
        self.force(target)
    }

    fn begin_confirmation(&mut self, target: ActivityKind) -> Vec<Action> {
        let seconds = self.config.confirmation_secs;
        if seconds == 0 {
            return self.commit(target);
        }

        self.generation += 1;
        self.pending = Some(PendingConfirmation {
            generation: self.generation,
            target,
        });
        self.state = DetectorState::confirming(target);

        vec![
            Action::StartCountdown {
                generation: self.generation,
                seconds,
            },
            Action::Status(countdown_status(target, seconds)),
        ]
    }

    fn abort_confirmation(&mut self) -> Vec<Action> {
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };
        self.state = DetectorState::origin(pending.target);
        vec![
            Action::CancelCountdown,
            Action::Status(settled_status(self.state)),
        ]
    }

    fn commit(&mut self, target: ActivityKind) -> Vec<Action> {
        self.pending = None;
        self.state = DetectorState::settled(target);
        vec![
            Action::Status(settled_status(self.state)),
            Action::Emit(target),
        ]
    }
}

fn countdown_status(target: ActivityKind, remaining_secs: u64) -> StatusMessage {
    match target {
        ActivityKind::Started => StatusMessage::ConfirmingStart { remaining_secs },
        ActivityKind::Stopped => StatusMessage::ConfirmingStop { remaining_secs },
    }
}

fn settled_status(state: DetectorState) -> StatusMessage {
    if state.is_engaged() {
        StatusMessage::Active
    } else {
        StatusMessage::Idle
    }
}
