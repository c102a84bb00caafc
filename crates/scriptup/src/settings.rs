use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use scriptup_backend::{OptionStore, UpdateOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::atomic_file::write_atomic;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub update_enabled_scripts_only: bool,

    #[serde(default = "default_true")]
    pub notify_updates: bool,

    #[serde(default)]
    pub notify_updates_global: bool,

    /// Days between automatic checks; zero turns them off.
    #[serde(default = "default_auto_update_days")]
    pub auto_update_days: u32,

    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_auto_update_days() -> u32 {
    1
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_concurrent_checks() -> usize {
    scriptup_core::limiter::DEFAULT_MAX_CONCURRENT
}

fn default_launch_delay_ms() -> u64 {
    250
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_enabled_scripts_only: true,
            notify_updates: true,
            notify_updates_global: false,
            auto_update_days: default_auto_update_days(),
            last_update: None,
            debug_logging: false,
            http_timeout_secs: default_http_timeout(),
            max_log_size_bytes: default_max_log_size_bytes(),
            max_concurrent_checks: default_max_concurrent_checks(),
            launch_delay_ms: default_launch_delay_ms(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            update_enabled_scripts_only: self.update_enabled_scripts_only,
            notify_updates: self.notify_updates,
            notify_updates_global: self.notify_updates_global,
            auto_update_days: self.auto_update_days,
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }
}

/// Settings file shared by the command line and the background scheduler.
///
/// Every change is written through to disk. Changes to the automatic
/// update interval are published to receivers from
/// [`SettingsStore::subscribe`].
pub struct SettingsStore {
    path: PathBuf,
    settings: Mutex<Settings>,
    interval: watch::Sender<u32>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing or unreadable JSON file yields
    /// the defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let settings = read_settings(path)?.unwrap_or_default();
        Ok(Self::with_settings(path.to_path_buf(), settings))
    }

    #[must_use]
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (interval, _) = watch::channel(settings.auto_update_days);
        Self {
            path,
            settings: Mutex::new(settings),
            interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    /// Receiver of the automatic update interval in days.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.interval.subscribe()
    }

    /// Adopt the settings file if it was changed by someone else, for
    /// example `scriptup set` while a watcher runs.
    ///
    /// Returns the new settings when they differ from the ones in memory.
    /// A missing or invalid file leaves the current settings alone.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read.
    pub fn reload(&self) -> Result<Option<Settings>, SettingsError> {
        let Some(on_disk) = read_settings(&self.path)? else {
            return Ok(None);
        };
        let mut settings = self.lock();
        if *settings == on_disk {
            return Ok(None);
        }
        *settings = on_disk.clone();
        drop(settings);

        self.publish_interval(on_disk.auto_update_days);
        Ok(Some(on_disk))
    }

    /// Apply `change`, persist the result and notify interval subscribers.
    ///
    /// # Errors
    /// Returns an error when the settings file cannot be written; the
    /// in-memory change is kept.
    pub fn update<F>(&self, change: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.lock();
        change(&mut settings);
        let days = settings.auto_update_days;
        let saved = self.save(&settings);
        drop(settings);

        self.publish_interval(days);
        saved
    }

    fn publish_interval(&self, days: u32) {
        self.interval.send_if_modified(|current| {
            let changed = *current != days;
            *current = days;
            changed
        });
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let content = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &content).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>, SettingsError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(Some(settings)),
        Err(error) => {
            warn!("Ignoring invalid settings file {}: {error}", path.display());
            Ok(None)
        }
    }
}

impl OptionStore for SettingsStore {
    fn update_options(&self) -> UpdateOptions {
        self.lock().update_options()
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.lock().last_update
    }

    fn set_last_update(&self, at: DateTime<Utc>) {
        if let Err(error) = self.update(|settings| settings.last_update = Some(at)) {
            warn!("Failed to record last update check: {error}");
        }
    }
}
