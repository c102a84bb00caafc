use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{BackendError, FetchError};
use crate::types::{
    CacheMode, FetchOptions, FetchResponse, Script, ScriptId, UpdateOptions, UpdateState,
};

/// HTTP GET that remembers validators per URL.
#[async_trait]
pub trait ConditionalFetch: Send + Sync {
    /// Returns `Ok(None)` when the server reports the content as unchanged
    /// since the previous request. `force` skips the conditional headers.
    async fn request_newer(
        &self,
        url: &str,
        options: &FetchOptions,
        force: bool,
    ) -> Result<Option<FetchResponse>, FetchError>;
}

#[async_trait]
pub trait ScriptStore: Send + Sync {
    fn script_by_id(&self, id: ScriptId) -> Option<Script>;

    fn scripts(&self) -> Vec<Script>;

    /// Parse `code` and replace the stored script with it.
    async fn apply_update(&self, id: ScriptId, code: String) -> Result<Script, BackendError>;

    /// Refresh `@require` and `@resource` dependencies. Returns an error
    /// message meant for the user when any of them failed.
    async fn fetch_resources(&self, script: &Script, cache: CacheMode) -> Option<String>;
}

pub trait OptionStore: Send + Sync {
    fn update_options(&self) -> UpdateOptions;

    fn last_update(&self) -> Option<DateTime<Utc>>;

    fn set_last_update(&self, at: DateTime<Utc>);
}

pub trait Notifier: Send + Sync {
    fn notify_to_open_scripts(&self, title: &str, body: &str, ids: &[ScriptId]);
}

/// Receiver of live per-script progress. Delivery is fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn update_script(&self, id: ScriptId, state: &UpdateState);
}

impl ProgressSink for () {
    fn update_script(&self, _id: ScriptId, _state: &UpdateState) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::StatusMessage;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(ScriptId, UpdateState)>>,
    }

    impl ProgressSink for RecordingSink {
        fn update_script(&self, id: ScriptId, state: &UpdateState) {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((id, state.clone()));
        }
    }

    struct NotModified;

    #[async_trait]
    impl ConditionalFetch for NotModified {
        async fn request_newer(
            &self,
            _url: &str,
            _options: &FetchOptions,
            _force: bool,
        ) -> Result<Option<FetchResponse>, FetchError> {
            Ok(None)
        }
    }

    #[test]
    fn unit_progress_sink_ignores_updates() {
        let sink: &dyn ProgressSink = &();
        sink.update_script(
            ScriptId(1),
            &UpdateState {
                message: StatusMessage::CheckingForUpdate,
                checking: true,
                error: None,
            },
        );
    }

    #[test]
    fn recording_sink_keeps_broadcast_order() {
        let sink = RecordingSink::default();
        for (message, checking) in [
            (StatusMessage::CheckingForUpdate, true),
            (StatusMessage::NoUpdate, false),
        ] {
            sink.update_script(
                ScriptId(2),
                &UpdateState {
                    message,
                    checking,
                    error: None,
                },
            );
        }

        let seen = sink.seen.lock().expect("sink lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.message, StatusMessage::CheckingForUpdate);
        assert!(!seen[1].1.checking);
    }

    #[tokio::test]
    async fn fetch_trait_objects_report_not_modified() {
        let fetch: Box<dyn ConditionalFetch> = Box::new(NotModified);

        let response = fetch
            .request_newer("https://example.com/a.meta.js", &FetchOptions::FAST_CHECK, false)
            .await
            .expect("not-modified is not an error");

        assert_eq!(response, None);
    }
}
