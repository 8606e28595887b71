use std::time::Duration;

use tokio::{
    sync::mpsc::WeakUnboundedSender,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::commands::MonitorCommand;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Background countdown for one pending confirmation.
///
/// Posts a tick every second and a final elapsed message back into the
/// monitor queue; it never touches detector state itself. Dropping the
/// countdown aborts its task. The sender is weak so a pending countdown
/// never keeps the monitor queue open.
pub struct Countdown {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Countdown {
    pub fn spawn(generation: u64, seconds: u64, tx: WeakUnboundedSender<MonitorCommand>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            for remaining_secs in (1..seconds).rev() {
                interval.tick().await;
                let tick = MonitorCommand::ConfirmationTick {
                    generation,
                    remaining_secs,
                };
                if !post(&tx, tick) {
                    return;
                }
            }

            interval.tick().await;
            post(&tx, MonitorCommand::ConfirmationElapsed { generation });
        });

        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// False once the monitor queue has closed.
fn post(tx: &WeakUnboundedSender<MonitorCommand>, command: MonitorCommand) -> bool {
    match tx.upgrade() {
        Some(tx) => tx.send(command).is_ok(),
        None => false,
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
