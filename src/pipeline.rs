//! Synchronous sample path for one sensor stream.
//!
//! conditioner -> RMS window -> detection machine. Nothing here blocks or
//! touches a clock, so a given sample sequence always yields the same
//! actions.

use crate::{
    detection::{Action, DetectionConfig, DetectionMachine},
    models::Sample,
    settings::MonitorSettings,
    signal::{RmsWindow, SignalConditioner},
    status::StatusMessage,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub rms: f64,
    pub ready: bool,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    conditioner: SignalConditioner,
    window: RmsWindow,
    machine: DetectionMachine,
    last_rms: f64,
}

impl Pipeline {
    pub fn new(settings: &MonitorSettings) -> Self {
        Self {
            conditioner: SignalConditioner::new(),
            window: RmsWindow::new(settings.window_size),
            machine: DetectionMachine::new(DetectionConfig::from(settings)),
            last_rms: 0.0,
        }
    }

    /// Run one sample through the chain. While the window is still filling,
    /// detection is skipped and a collecting status is reported instead.
    /// While paused the RMS is still tracked but nothing is evaluated.
    pub fn process(&mut self, sample: Sample) -> PipelineOutput {
        let magnitude = self.conditioner.condition(sample);
        let reading = self.window.push(magnitude);
        self.last_rms = reading.rms;

        let actions = if !reading.ready {
            if self.machine.is_paused() {
                Vec::new()
            } else {
                vec![Action::Status(StatusMessage::Collecting {
                    collected: self.window.len(),
                    capacity: self.window.capacity(),
                })]
            }
        } else {
            self.machine.evaluate(reading.rms)
        };

        PipelineOutput {
            rms: reading.rms,
            ready: reading.ready,
            actions,
        }
    }

    /// Apply a new settings snapshot. A changed window size resizes the
    /// window in place, which may put it back into cold start.
    pub fn apply_settings(&mut self, settings: &MonitorSettings) {
        self.machine.set_config(DetectionConfig::from(settings));
        if self.window.capacity() != settings.window_size {
            self.window.resize(settings.window_size);
        }
    }

    pub fn machine(&self) -> &DetectionMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut DetectionMachine {
        &mut self.machine
    }

    pub fn last_rms(&self) -> f64 {
        self.last_rms
    }

    pub fn window(&self) -> &RmsWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectorState;
    use crate::models::ActivityKind;

    fn settings(window_size: usize, confirmation_seconds: u64) -> MonitorSettings {
        MonitorSettings {
            threshold: 0.1,
            confirmation_seconds,
            window_size,
            ..MonitorSettings::default()
        }
    }

    /// Quiet, then a vibration burst, then quiet again.
    fn recording() -> Vec<Sample> {
        (0..130)
            .map(|i| {
                if (20..70).contains(&i) {
                    let t = i as f64 * 1.3;
                    Sample::new(t.sin(), t.cos(), 0.0)
                } else {
                    Sample::new(0.0, 0.0, 0.0)
                }
            })
            .collect()
    }

    fn trace(settings: &MonitorSettings, samples: &[Sample]) -> Vec<Action> {
        let mut pipeline = Pipeline::new(settings);
        samples
            .iter()
            .flat_map(|sample| pipeline.process(*sample).actions)
            .collect()
    }

    fn events(actions: &[Action]) -> Vec<ActivityKind> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Emit(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cold_start_suppresses_detection() {
        let mut pipeline = Pipeline::new(&settings(5, 0));

        for i in 1..5 {
            let output = pipeline.process(Sample::new(3.0, -3.0, 3.0));
            assert!(!output.ready);
            assert_eq!(
                output.actions,
                vec![Action::Status(StatusMessage::Collecting {
                    collected: i,
                    capacity: 5
                })]
            );
        }
        assert_eq!(pipeline.machine().state(), DetectorState::Idle);

        let output = pipeline.process(Sample::new(3.0, -3.0, 3.0));
        assert!(output.ready);
        assert_eq!(pipeline.machine().state(), DetectorState::Active);
    }

    #[test]
    fn burst_with_zero_confirmation_yields_start_then_stop() {
        let actions = trace(&settings(10, 0), &recording());

        assert_eq!(
            events(&actions),
            vec![ActivityKind::Started, ActivityKind::Stopped]
        );
    }

    #[test]
    fn replay_is_deterministic() {
        let samples = recording();
        for confirmation in [0, 5] {
            let config = settings(10, confirmation);
            assert_eq!(trace(&config, &samples), trace(&config, &samples));
        }
    }

    #[test]
    fn paused_pipeline_tracks_rms_without_transitions() {
        let mut pipeline = Pipeline::new(&settings(3, 0));
        pipeline.machine_mut().pause();

        let mut last = None;
        for _ in 0..10 {
            last = Some(pipeline.process(Sample::new(2.0, 0.0, 0.0)));
        }
        let output = last.unwrap();

        assert!(output.actions.is_empty());
        assert!(output.rms > 0.0);
        assert_eq!(pipeline.last_rms(), output.rms);
        assert_eq!(pipeline.machine().state(), DetectorState::Idle);
    }

    #[test]
    fn window_resize_on_reload() {
        let mut pipeline = Pipeline::new(&settings(4, 30));
        for _ in 0..4 {
            pipeline.process(Sample::new(0.0, 0.0, 0.0));
        }
        assert!(pipeline.window().is_ready());

        pipeline.apply_settings(&settings(8, 10));

        assert!(!pipeline.window().is_ready());
        assert_eq!(pipeline.window().capacity(), 8);
        assert_eq!(pipeline.machine().config().confirmation_secs, 10);
    }
}
