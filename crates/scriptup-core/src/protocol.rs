//! Two-phase update resolution for a single script.
//!
//! The first request asks for metadata only. Servers that honour the hint
//! answer with a bare metadata block and the script is downloaded in a
//! second request; servers that ignore it send the whole script, which is
//! then used directly.

use std::cmp::Ordering;

use log::debug;
use scriptup_backend::{
    ConditionalFetch, FetchError, FetchOptions, ProgressSink, Script, ScriptId, StatusMessage,
    UpdateState, UpdateUrls,
};

use crate::meta::{parse_meta_permissive, strip_metablock};
use crate::version::compare_version;

pub const GENERIC_ERROR: &str = "Error";

/// How a check for one script ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Full code of a newer version.
    Content(String),
    /// The installed version is current.
    NoUpdate,
    /// The server reported the update URL as unchanged since the last check.
    Unchanged,
    /// A newer version exists but there is no URL to download it from.
    Unresolvable,
    /// Network failure; the text is meant for the user.
    Failure(String),
}

impl Resolution {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

struct Announcer<'a> {
    id: ScriptId,
    sink: &'a dyn ProgressSink,
}

impl Announcer<'_> {
    fn announce(&self, message: StatusMessage, checking: bool) {
        self.sink.update_script(
            self.id,
            &UpdateState {
                message,
                checking,
                error: None,
            },
        );
    }

    fn fail(&self, message: StatusMessage, error: &FetchError) -> String {
        let text = format!("{GENERIC_ERROR} {}, {}", error.status_label(), error.url);
        self.sink.update_script(
            self.id,
            &UpdateState {
                message,
                checking: false,
                error: Some(text.clone()),
            },
        );
        text
    }
}

/// Resolve whether `script` has an update and fetch its code if so.
///
/// `force` bypasses conditional requests. Every state change is reported to
/// `progress` before this returns.
pub async fn download_update(
    fetch: &dyn ConditionalFetch,
    progress: &dyn ProgressSink,
    script: &Script,
    urls: &UpdateUrls,
    force: bool,
) -> Resolution {
    let announcer = Announcer {
        id: script.id,
        sink: progress,
    };
    let mut failure_message = StatusMessage::ErrorFetchingUpdateInfo;

    announcer.announce(StatusMessage::CheckingForUpdate, true);
    match resolve(fetch, &announcer, &mut failure_message, script, urls, force).await {
        Ok(resolution) => resolution,
        Err(error) => {
            debug!("Update check for script {} failed: {error}", script.id);
            Resolution::Failure(announcer.fail(failure_message, &error))
        }
    }
}

async fn resolve(
    fetch: &dyn ConditionalFetch,
    announcer: &Announcer<'_>,
    failure_message: &mut StatusMessage,
    script: &Script,
    urls: &UpdateUrls,
    force: bool,
) -> Result<Resolution, FetchError> {
    let Some(response) = fetch
        .request_newer(&urls.update, &FetchOptions::FAST_CHECK, force)
        .await?
    else {
        announcer.announce(StatusMessage::NoUpdate, false);
        return Ok(Resolution::Unchanged);
    };
    let data = response.data;
    let remote = parse_meta_permissive(&data);

    if compare_version(script.meta.version.as_deref(), remote.meta.version.as_deref())
        != Ordering::Less
    {
        announcer.announce(StatusMessage::NoUpdate, false);
        return Ok(Resolution::NoUpdate);
    }

    let Some(download_url) = urls.download.as_deref() else {
        announcer.announce(StatusMessage::NewVersion, false);
        return Ok(Resolution::Unresolvable);
    };
    let same_url = download_url == urls.update;

    if same_url && !strip_metablock(&data).trim().is_empty() {
        // Code came along with the metadata: the server ignored the hint.
        announcer.announce(StatusMessage::Updated, true);
        return Ok(Resolution::Content(data));
    }

    announcer.announce(StatusMessage::Updating, true);
    *failure_message = StatusMessage::ErrorFetchingScript;

    if same_url && remote.block.trim() != data.trim() {
        return Ok(Resolution::Content(data));
    }

    match fetch
        .request_newer(download_url, &FetchOptions::NO_CACHE, force)
        .await?
    {
        Some(response) => Ok(Resolution::Content(response.data)),
        None => Err(FetchError::status(download_url, 304)),
    }
}
