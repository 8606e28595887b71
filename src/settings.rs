use anyhow::{bail, ensure, Context, Result};
use log::warn;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

/// 1.5 seconds of samples at the nominal 50 Hz rate.
pub const DEFAULT_WINDOW_SIZE: usize = 75;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Identity reported in webhook payloads; empty means anonymous.
    pub subject_name: String,
    /// RMS energy above which the appliance is considered running.
    pub threshold: f64,
    /// How long the signal must stay across the threshold before a
    /// transition is committed.
    pub confirmation_seconds: u64,
    pub endpoints: BTreeSet<String>,
    /// Samples in the RMS window.
    pub window_size: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            subject_name: "default".into(),
            threshold: 0.1,
            confirmation_seconds: 30,
            endpoints: BTreeSet::new(),
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl MonitorSettings {
    /// Trim endpoint entries and drop blank ones.
    pub fn normalized(mut self) -> Self {
        self.endpoints = self
            .endpoints
            .iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        self.subject_name = self.subject_name.trim().to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.threshold.is_finite() && self.threshold > 0.0,
            "threshold must be a positive number, got {}",
            self.threshold
        );
        ensure!(self.window_size > 0, "windowSize must be at least 1");

        for endpoint in &self.endpoints {
            let url = Url::parse(endpoint)
                .with_context(|| format!("invalid webhook URL '{endpoint}'"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("webhook URL '{endpoint}' must use http or https");
            }
        }

        Ok(())
    }

    /// Parse, normalize and validate a JSON settings document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let settings: MonitorSettings =
            serde_json::from_str(contents).context("malformed settings JSON")?;
        let settings = settings.normalized();
        settings.validate()?;
        Ok(settings)
    }
}

/// JSON-file backed settings with whole-snapshot swaps.
///
/// Readers get an `Arc` to an immutable snapshot, so they never observe a
/// half-applied update.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Arc<MonitorSettings>>,
}

impl SettingsStore {
    /// Load from `path`, falling back to defaults when the file is missing or
    /// does not hold valid settings.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            MonitorSettings::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring settings in {}: {err:#}; using defaults",
                    path.display()
                );
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(Arc::new(data)),
        })
    }

    pub fn snapshot(&self) -> Arc<MonitorSettings> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, persist, then publish. Invalid settings leave the current
    /// snapshot in place.
    pub fn update(&self, settings: MonitorSettings) -> Result<Arc<MonitorSettings>> {
        let settings = settings.normalized();
        if let Err(err) = settings.validate() {
            warn!("Rejected settings update: {err:#}");
            return Err(err);
        }

        let snapshot = Arc::new(settings);
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&snapshot)?;
        *guard = snapshot.clone();
        Ok(snapshot)
    }

    /// Re-read the settings file. On any error the previous snapshot stays.
    pub fn reload(&self) -> Result<Arc<MonitorSettings>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let settings = match MonitorSettings::from_json(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Rejected settings reload: {err:#}");
                return Err(err);
            }
        };

        let snapshot = Arc::new(settings);
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(snapshot)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
