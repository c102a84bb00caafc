use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use scriptup_backend::{ConditionalFetch, Script, ScriptId, ScriptStore};
use scriptup_core::{
    AutoUpdater, CheckTarget, CheckerDeps, HttpFetcher, InFlightRegistry, Limiter, UpdateChecker,
};
use scriptup_platform::AppPaths;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cli::SetArgs;
use crate::error::AppError;
use crate::logging::set_logging_enabled;
use crate::notifier::{ConsoleNotifier, LogProgress};
use crate::settings::SettingsStore;
use crate::single_instance::SingleInstance;
use crate::store::JsonScriptStore;

/// How often a running watcher looks for edits to the settings file.
pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Everything a command needs, wired from the files below [`AppPaths`].
pub struct App {
    paths: AppPaths,
    /// Debug logging forced on from the command line.
    verbose: bool,
    settings: Arc<SettingsStore>,
    store: Arc<JsonScriptStore>,
    checker: Arc<UpdateChecker>,
}

impl App {
    /// # Errors
    /// Returns an error when the directories, settings or script index
    /// cannot be set up, or the HTTP client cannot be built.
    pub fn open(paths: AppPaths, verbose: bool) -> Result<Self, AppError> {
        paths.ensure_dirs().map_err(AppError::Dirs)?;
        let settings = Arc::new(SettingsStore::load(&paths.settings_file())?);
        let current = settings.snapshot();

        let fetch: Arc<dyn ConditionalFetch> =
            Arc::new(HttpFetcher::with_timeout(current.http_timeout())?);
        let store = Arc::new(JsonScriptStore::open(&paths, Arc::clone(&fetch))?);
        let deps = CheckerDeps {
            store: store.clone(),
            fetch,
            options: settings.clone(),
            notifier: Arc::new(ConsoleNotifier::stdout()),
            progress: Arc::new(LogProgress),
        };
        let limiter = Limiter::new(current.max_concurrent_checks, current.launch_delay());
        let checker = Arc::new(UpdateChecker::new(deps, limiter, InFlightRegistry::new()));

        Ok(Self {
            paths,
            verbose,
            settings,
            store,
            checker,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Check `ids`, or every script in automatic mode when empty.
    ///
    /// # Errors
    /// [`AppError::UnknownScript`] for an id that is not installed; nothing
    /// is checked in that case.
    pub async fn check(&self, ids: Vec<ScriptId>) -> Result<usize, AppError> {
        if let Some(unknown) = ids
            .iter()
            .find(|id| self.store.script_by_id(**id).is_none())
        {
            return Err(AppError::UnknownScript(*unknown));
        }
        let target = if ids.is_empty() {
            CheckTarget::All
        } else {
            CheckTarget::Scripts(ids)
        };
        Ok(self.checker.check_update(target).await)
    }

    /// Run scheduled checks until `shutdown` fires.
    ///
    /// # Errors
    /// Fails when another watcher holds the instance lock.
    pub async fn watch(&self, shutdown: CancellationToken) -> Result<(), AppError> {
        let _instance = SingleInstance::acquire(&self.paths.instance_lock_file())?;
        let days = self.settings.snapshot().auto_update_days;
        if days == 0 {
            info!("Automatic update checks are disabled; waiting for the setting to change");
        } else {
            info!("Checking for updates every {days} day(s)");
        }

        let updater = AutoUpdater::new(
            self.checker.clone(),
            self.settings.clone(),
            self.settings.subscribe(),
        );
        tokio::join!(
            updater.run(shutdown.clone()),
            self.follow_settings_file(shutdown)
        );
        Ok(())
    }

    /// Save the settings given on the command line.
    ///
    /// # Errors
    /// [`AppError::Usage`] when `args` changes nothing, or an error when the
    /// settings file cannot be written.
    pub fn change_settings(&self, args: &SetArgs) -> Result<(), AppError> {
        if args.is_empty() {
            return Err(AppError::usage(
                "nothing to change; pass at least one setting (see `scriptup set --help`)",
            ));
        }
        self.settings.update(|settings| args.apply(settings))?;
        Ok(())
    }

    async fn follow_settings_file(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(SETTINGS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut debug_logging = self.settings.snapshot().debug_logging;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.settings.reload() {
                Ok(Some(current)) => {
                    info!(
                        "Settings file changed; checking every {} day(s)",
                        current.auto_update_days
                    );
                    if current.debug_logging != debug_logging {
                        debug_logging = current.debug_logging;
                        set_logging_enabled(debug_logging || self.verbose);
                    }
                }
                Ok(None) => {}
                Err(error) => warn!("Failed to reload settings: {error}"),
            }
        }
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.store.scripts().iter().map(describe).collect()
    }
}

fn describe(script: &Script) -> String {
    let mut flags = Vec::new();
    if !script.config.enabled {
        flags.push("disabled");
    }
    if !script.config.should_update {
        flags.push("no auto-update");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!(
        "{:>4}  {} {}{flags}",
        script.id.0,
        script.display_name(),
        script.meta.version.as_deref().unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scriptup_backend::{Script, ScriptConfig, ScriptId, ScriptMeta};
    use scriptup_platform::AppPaths;
    use tokio_util::sync::CancellationToken;

    use super::{App, SETTINGS_POLL_INTERVAL, describe};
    use crate::cli::SetArgs;
    use crate::error::AppError;
    use crate::single_instance::{AcquireError, SingleInstance};

    fn seeded(root: &std::path::Path) -> App {
        let paths = AppPaths::under(root);
        paths.ensure_dirs().expect("directories should be created");
        let scripts = vec![Script {
            id: ScriptId(1),
            meta: ScriptMeta {
                name: "Demo".to_string(),
                version: Some("1.2".to_string()),
                ..ScriptMeta::default()
            },
            ..Script::default()
        }];
        std::fs::write(
            paths.scripts_index_file(),
            serde_json::to_vec(&scripts).expect("index should serialize"),
        )
        .expect("index should be written");
        App::open(paths, false).expect("app should open")
    }

    #[test]
    fn description_shows_version_and_flags() {
        let script = Script {
            id: ScriptId(12),
            meta: ScriptMeta {
                name: "Demo".to_string(),
                ..ScriptMeta::default()
            },
            config: ScriptConfig {
                enabled: false,
                ..ScriptConfig::default()
            },
            ..Script::default()
        };

        assert_eq!(describe(&script), "  12  Demo - [disabled]");
    }

    #[tokio::test]
    async fn list_shows_installed_scripts() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());

        assert_eq!(app.list(), vec!["   1  Demo 1.2".to_string()]);
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected_before_checking() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());

        let error = app
            .check(vec![ScriptId(1), ScriptId(5)])
            .await
            .expect_err("id 5 is not installed");

        assert!(matches!(error, AppError::UnknownScript(ScriptId(5))));
    }

    #[tokio::test]
    async fn script_without_urls_is_skipped() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());

        assert_eq!(app.check(Vec::new()).await.expect("check should run"), 0);
        assert!(app.settings().snapshot().last_update.is_some());
    }

    #[tokio::test]
    async fn watch_refuses_to_run_twice() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());
        let _held = SingleInstance::acquire(&app.paths().instance_lock_file())
            .expect("lock should succeed");

        let error = app
            .watch(CancellationToken::new())
            .await
            .expect_err("lock is taken");

        assert!(matches!(
            error,
            AppError::Instance(AcquireError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn watch_returns_when_cancelled() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        app.watch(shutdown).await.expect("watch should stop cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn running_watcher_picks_up_saved_settings() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = Arc::new(seeded(temp_dir.path()));
        let mut interval = app.settings().subscribe();
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn({
            let app = Arc::clone(&app);
            let shutdown = shutdown.clone();
            async move { app.watch(shutdown).await }
        });
        tokio::time::sleep(SETTINGS_POLL_INTERVAL / 2).await;

        // A separate `scriptup set` process writing the same file.
        let other = App::open(AppPaths::under(temp_dir.path()), false).expect("app should open");
        other
            .change_settings(&SetArgs {
                auto_update_days: Some(0),
                ..SetArgs::default()
            })
            .expect("settings should save");
        tokio::time::sleep(SETTINGS_POLL_INTERVAL * 2).await;

        assert!(interval.has_changed().expect("sender alive"));
        assert_eq!(*interval.borrow_and_update(), 0);
        assert_eq!(app.settings().snapshot().auto_update_days, 0);

        shutdown.cancel();
        watcher
            .await
            .expect("watcher task should not panic")
            .expect("watch should stop cleanly");
    }

    #[tokio::test]
    async fn set_without_options_is_a_usage_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let app = seeded(temp_dir.path());

        let error = app
            .change_settings(&SetArgs::default())
            .expect_err("nothing to change");

        assert_eq!(error.exit_code(), 2);
        assert!(!app.paths().settings_file().exists());
    }
}
