use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{monitor::MonitorHandle, settings::SettingsStore};

use super::loop_worker::{sensing_loop, SensingStats};

/// Runs the sensing loop for one input stream.
pub struct SensingController {
    handle: Option<JoinHandle<Result<SensingStats>>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start_sensing<R>(
        &mut self,
        reader: R,
        monitor: MonitorHandle,
        settings: Arc<SettingsStore>,
        pacing: Option<Duration>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        if let Some(period) = pacing {
            info!("Replaying samples every {}ms", period.as_millis());
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(
            reader,
            monitor,
            settings,
            pacing,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Wait for the input to run out. Dropping the returned future leaves the
    /// loop running, so `stop_sensing` still works afterwards.
    pub async fn wait(&mut self) -> Result<SensingStats> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(SensingStats::default());
        };

        let joined = handle.await;
        self.handle = None;
        self.cancel_token = None;
        joined.context("sensing loop task failed to join")?
    }

    pub async fn stop_sensing(&mut self) -> Result<SensingStats> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => handle.await.context("sensing loop task failed to join")?,
            None => Ok(SensingStats::default()),
        }
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}
