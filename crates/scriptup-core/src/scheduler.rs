//! Periodic automatic update checks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use scriptup_backend::OptionStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::checker::{CheckTarget, UpdateChecker};

pub const AUTO_CHECK_WARMUP: Duration = Duration::from_secs(20);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
/// Longest single timer, matching the 32-bit millisecond limit of browser
/// timers the stored schedule is shared with.
pub const MAX_TIMER: Duration = Duration::from_millis(0x7FFF_FFFF);

/// Runs a batch over every installed script.
#[async_trait]
pub trait CheckAll: Send + Sync {
    async fn check_all(&self) -> usize;
}

#[async_trait]
impl CheckAll for UpdateChecker {
    async fn check_all(&self) -> usize {
        self.check_update(CheckTarget::All).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub check_now: bool,
    /// `None` when automatic checks are disabled.
    pub next: Option<Duration>,
}

/// Decide whether a check is due and when to look again.
#[must_use]
pub fn plan_tick(
    auto_update_days: u32,
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Tick {
    let interval = DAY * auto_update_days;
    if interval.is_zero() {
        return Tick {
            check_now: false,
            next: None,
        };
    }

    let mut elapsed = last_update
        .map_or(Some(interval), |last| (now - last).to_std().ok())
        .unwrap_or(Duration::ZERO);
    let check_now = elapsed >= interval;
    if check_now {
        elapsed = Duration::ZERO;
    }

    Tick {
        check_now,
        next: Some(MAX_TIMER.min(interval - elapsed)),
    }
}

pub struct AutoUpdater {
    checker: Arc<dyn CheckAll>,
    options: Arc<dyn OptionStore>,
    changes: Option<watch::Receiver<u32>>,
    warmup: Duration,
}

impl AutoUpdater {
    /// `changes` yields the configured interval in days whenever it changes.
    #[must_use]
    pub fn new(
        checker: Arc<dyn CheckAll>,
        options: Arc<dyn OptionStore>,
        changes: watch::Receiver<u32>,
    ) -> Self {
        Self {
            checker,
            options,
            changes: Some(changes),
            warmup: AUTO_CHECK_WARMUP,
        }
    }

    #[must_use]
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Run until `shutdown` is cancelled. Only one timer is pending at a
    /// time; an interval change drops it and plans again.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(self.warmup) => {}
        }

        let mut changes = self.changes.take();
        loop {
            let days = self.options.update_options().auto_update_days;
            let tick = plan_tick(days, self.options.last_update(), Utc::now());

            if tick.check_now {
                info!("Starting automatic update check");
                let checker = Arc::clone(&self.checker);
                tokio::spawn(async move {
                    let updated = checker.check_all().await;
                    debug!("Automatic update check updated {updated} scripts");
                });
            }

            let wake = tokio::select! {
                () = shutdown.cancelled() => Wake::Shutdown,
                () = sleep_or_pending(tick.next) => Wake::Timer,
                open = changed_or_pending(changes.as_mut()) => Wake::Changed { open },
            };
            match wake {
                Wake::Shutdown => break,
                Wake::Timer => {}
                Wake::Changed { open } => {
                    if !open {
                        changes = None;
                    }
                }
            }
        }
    }
}

enum Wake {
    Shutdown,
    Timer,
    Changed { open: bool },
}

async fn sleep_or_pending(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

async fn changed_or_pending(changes: Option<&mut watch::Receiver<u32>>) -> bool {
    match changes {
        Some(changes) => changes.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}
