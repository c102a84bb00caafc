use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use log::{info, warn};
use scriptup_backend::{
    ConditionalFetch, Notifier, OptionStore, ProgressSink, Script, ScriptId, ScriptStore,
    UpdateUrls, UrlSelection,
};

use crate::limiter::Limiter;
use crate::registry::{InFlightRegistry, SharedCheck};
use crate::worker::{CheckOutcome, UpdateNote, UpdateWorker};

pub const UPDATE_TITLE: &str = "Update";
pub const UPDATE_ERRORS_TITLE: &str =
    "Could not update some scripts. Click to open them in the dashboard.";

/// Which scripts a batch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    /// Every installed script; this is the automatic mode.
    All,
    /// Exactly these scripts, enabled or not.
    Scripts(Vec<ScriptId>),
}

impl From<ScriptId> for CheckTarget {
    fn from(id: ScriptId) -> Self {
        Self::Scripts(vec![id])
    }
}

impl From<Vec<ScriptId>> for CheckTarget {
    fn from(ids: Vec<ScriptId>) -> Self {
        Self::Scripts(ids)
    }
}

/// Collaborators an [`UpdateChecker`] is built from.
#[derive(Clone)]
pub struct CheckerDeps {
    pub store: Arc<dyn ScriptStore>,
    pub fetch: Arc<dyn ConditionalFetch>,
    pub options: Arc<dyn OptionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub progress: Arc<dyn ProgressSink>,
}

/// Runs batches of update checks.
pub struct UpdateChecker {
    store: Arc<dyn ScriptStore>,
    options: Arc<dyn OptionStore>,
    notifier: Arc<dyn Notifier>,
    worker: UpdateWorker,
    limiter: Limiter,
    registry: InFlightRegistry,
}

impl UpdateChecker {
    #[must_use]
    pub fn new(deps: CheckerDeps, limiter: Limiter, registry: InFlightRegistry) -> Self {
        let worker = UpdateWorker::new(
            Arc::clone(&deps.store),
            deps.fetch,
            Arc::clone(&deps.options),
            deps.progress,
            registry.clone(),
        );
        Self {
            store: deps.store,
            options: deps.options,
            notifier: deps.notifier,
            worker,
            limiter,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Check `target` for updates and return how many scripts were updated.
    ///
    /// Messages owed to the user are delivered as one notification. In
    /// automatic mode the start time is stored as the last update check once
    /// every job has settled, whatever their outcome.
    pub async fn check_update(&self, target: impl Into<CheckTarget>) -> usize {
        let target = target.into();
        let started_at = Utc::now();
        let is_auto = target == CheckTarget::All;

        let scripts: Vec<Script> = match &target {
            CheckTarget::All => self.store.scripts(),
            CheckTarget::Scripts(ids) => ids
                .iter()
                .filter_map(|id| self.store.script_by_id(*id))
                .collect(),
        };
        let selection = UrlSelection {
            auto: is_auto,
            enabled_only: is_auto && self.options.update_options().update_enabled_scripts_only,
        };

        let jobs: Vec<SharedCheck> = scripts
            .into_iter()
            .filter_map(|script| {
                let urls = script.update_urls(selection)?;
                Some(self.job_for(script, urls, !is_auto))
            })
            .collect();
        let results = join_all(jobs).await;

        let notes: Vec<&UpdateNote> = results
            .iter()
            .filter_map(|outcome| outcome.note.as_ref())
            .filter(|note| !note.text.is_empty())
            .collect();
        if !notes.is_empty() {
            let title = if notes.iter().any(|note| note.err) {
                UPDATE_ERRORS_TITLE
            } else {
                UPDATE_TITLE
            };
            let body: String = notes.iter().map(|note| format!("* {}\n", note.text)).collect();
            let ids: Vec<ScriptId> = notes.iter().map(|note| note.script_id).collect();
            self.notifier.notify_to_open_scripts(title, &body, &ids);
        }

        if is_auto {
            self.options.set_last_update(started_at);
        }

        let updated = results.iter().filter(|outcome| outcome.updated).count();
        info!(
            "Update check finished: {} checked, {updated} updated, {} notes",
            results.len(),
            notes.len()
        );
        updated
    }

    fn job_for(&self, script: Script, urls: UpdateUrls, force: bool) -> SharedCheck {
        let id = script.id;
        let (job, _) = self.registry.get_or_launch(id, || {
            let check = self.worker.check(script, urls, force);
            let handle = tokio::spawn(self.limiter.run(check));
            async move {
                handle.await.unwrap_or_else(|error| {
                    warn!("Update check task for script {id} failed: {error}");
                    CheckOutcome::default()
                })
            }
            .boxed()
            .shared()
        });
        job
    }
}
