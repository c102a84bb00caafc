use std::future::Future;
use std::sync::Arc;

use log::debug;
use scriptup_backend::{
    CacheMode, ConditionalFetch, OptionStore, ProgressSink, Script, ScriptId, ScriptStore,
    StatusMessage, UpdateOptions, UpdateState, UpdateUrls,
};

use crate::protocol::{Resolution, download_update};
use crate::registry::InFlightRegistry;

/// Message owed to the user for one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNote {
    pub script_id: ScriptId,
    pub text: String,
    pub err: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// New code was stored.
    pub updated: bool,
    pub note: Option<UpdateNote>,
}

/// Whether update messages for `script` should reach the user.
#[must_use]
pub fn can_notify(options: &UpdateOptions, script: &Script) -> bool {
    let allowed = options.notify_updates;
    if options.notify_updates_global {
        allowed
    } else {
        script.config.notify_updates.unwrap_or(allowed)
    }
}

/// Runs one script's check and applies its result.
#[derive(Clone)]
pub struct UpdateWorker {
    store: Arc<dyn ScriptStore>,
    fetch: Arc<dyn ConditionalFetch>,
    options: Arc<dyn OptionStore>,
    progress: Arc<dyn ProgressSink>,
    registry: InFlightRegistry,
}

impl UpdateWorker {
    #[must_use]
    pub fn new(
        store: Arc<dyn ScriptStore>,
        fetch: Arc<dyn ConditionalFetch>,
        options: Arc<dyn OptionStore>,
        progress: Arc<dyn ProgressSink>,
        registry: InFlightRegistry,
    ) -> Self {
        Self {
            store,
            fetch,
            options,
            progress,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Check `script` for an update.
    ///
    /// The registry slot for the script is claimed as soon as this is
    /// called and released when the returned future completes or is
    /// dropped.
    pub fn check(
        &self,
        script: Script,
        urls: UpdateUrls,
        force: bool,
    ) -> impl Future<Output = CheckOutcome> + Send + 'static {
        let slot = self.registry.release_on_drop(script.id);
        let worker = self.clone();
        async move {
            let outcome = worker.run(script, urls, force).await;
            drop(slot);
            outcome
        }
    }

    async fn run(&self, script: Script, urls: UpdateUrls, force: bool) -> CheckOutcome {
        let resolution = download_update(
            self.fetch.as_ref(),
            self.progress.as_ref(),
            &script,
            &urls,
            force,
        )
        .await;

        let mut updated = false;
        let mut msg_ok = None;
        let mut msg_err = None;
        let mut refresh = None;
        let mut resources_of = script.clone();

        match resolution {
            Resolution::Content(code) => match self.store.apply_update(script.id, code).await {
                Ok(stored) => {
                    msg_ok = Some(format!("Script updated: {}", stored.display_name()));
                    self.progress.update_script(
                        script.id,
                        &UpdateState {
                            message: StatusMessage::Updated,
                            checking: false,
                            error: None,
                        },
                    );
                    refresh = Some(CacheMode::NoCache);
                    resources_of = stored;
                    updated = true;
                }
                Err(error) => {
                    debug!("Storing update for script {} failed: {error}", script.id);
                    msg_err = Some(error.to_string());
                }
            },
            // Nothing new, but dependencies may still have changed upstream.
            Resolution::NoUpdate | Resolution::Unresolvable => {
                refresh = Some(CacheMode::Default);
            }
            Resolution::Unchanged => {}
            Resolution::Failure(message) => {
                msg_err = Some(message);
            }
        }

        if let Some(cache) = refresh {
            msg_err = self.store.fetch_resources(&resources_of, cache).await;
            if let Some(error) = &msg_err {
                debug!("Refreshing resources of script {} failed: {error}", script.id);
            }
        }

        let options = self.options.update_options();
        let note = if can_notify(&options, &script) && (msg_ok.is_some() || msg_err.is_some()) {
            let err = msg_err.is_some();
            let text = [msg_ok, msg_err]
                .into_iter()
                .flatten()
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Some(UpdateNote {
                script_id: script.id,
                text,
                err,
            })
        } else {
            None
        };

        CheckOutcome { updated, note }
    }
}
