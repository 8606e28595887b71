use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{monitor::MonitorHandle, settings::SettingsStore};

use super::parser::{parse_line, ControlCommand, InputLine};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Counters for one run of the sensing loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensingStats {
    pub lines: u64,
    pub samples: u64,
    pub controls: u64,
    pub rejected: u64,
}

/// Read samples and control commands line by line and feed them to the
/// monitor until the input ends or the token is cancelled.
///
/// With `pacing` set, samples are released at that period instead of as
/// fast as they can be read, which replays a recording in real time.
pub async fn sensing_loop<R>(
    reader: R,
    monitor: MonitorHandle,
    settings: Arc<SettingsStore>,
    pacing: Option<Duration>,
    cancel_token: CancellationToken,
) -> Result<SensingStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut ticker = pacing.map(|period| {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut stats = SensingStats::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read sample input")?,
            _ = cancel_token.cancelled() => {
                log_info!("sensing loop shutting down");
                break;
            }
        };

        let Some(line) = line else {
            log_info!("sample input exhausted after {} lines", stats.lines);
            break;
        };
        stats.lines += 1;

        match parse_line(&line) {
            Ok(InputLine::Sample(sample)) => {
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                monitor.push_sample(sample)?;
                stats.samples += 1;
            }
            Ok(InputLine::Control(command)) => {
                stats.controls += 1;
                apply_control(command, &monitor, &settings).await?;
            }
            Ok(InputLine::Skip) => {}
            Err(err) => {
                stats.rejected += 1;
                log_warn!("skipping input line {}: {err:#}", stats.lines);
            }
        }
    }

    Ok(stats)
}

async fn apply_control(
    command: ControlCommand,
    monitor: &MonitorHandle,
    settings: &SettingsStore,
) -> Result<()> {
    log_info!("control command: {command:?}");
    match command {
        ControlCommand::Pause => monitor.pause(),
        ControlCommand::Resume => monitor.resume(),
        ControlCommand::TogglePause => monitor.toggle_pause(),
        ControlCommand::Start => monitor.mark_started(),
        ControlCommand::Stop => monitor.mark_stopped(),
        ControlCommand::Toggle => monitor.toggle_manual(),
        ControlCommand::Reload => match settings.reload() {
            Ok(snapshot) => monitor.reload(snapshot),
            Err(err) => {
                log_warn!("keeping current settings: {err:#}");
                Ok(())
            }
        },
        ControlCommand::Status => {
            let snapshot = monitor.snapshot().await?;
            log_info!(
                "state={} paused={} rms={:.4} window={}/{} samples={} events={}",
                snapshot.state,
                snapshot.paused,
                snapshot.rms,
                snapshot.window_len,
                snapshot.window_size,
                snapshot.samples_processed,
                snapshot.events_emitted
            );
            Ok(())
        }
    }
}
