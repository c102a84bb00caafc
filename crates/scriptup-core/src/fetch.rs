use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, CACHE_CONTROL, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, PRAGMA,
};
use scriptup_backend::{CacheMode, ConditionalFetch, FetchError, FetchOptions, FetchResponse};

const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
}

impl Validators {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        }
    }

    fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// `reqwest`-backed conditional GET.
///
/// Validators are remembered per URL and `Accept` value, so a metadata-only
/// response never short-circuits the full download of the same URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    validators: Mutex<HashMap<(String, Option<&'static str>), Validators>>,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            validators: Mutex::new(HashMap::new()),
        }
    }

    /// Build a fetcher with its own client.
    ///
    /// # Errors
    /// Returns an error when the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .user_agent(format!("scriptup/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(client))
    }

    fn remembered(&self, key: &(String, Option<&'static str>)) -> Option<Validators> {
        self.validators
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn remember(&self, key: (String, Option<&'static str>), validators: Validators) {
        let mut map = self
            .validators
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if validators.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, validators);
        }
    }
}

#[async_trait]
impl ConditionalFetch for HttpFetcher {
    async fn request_newer(
        &self,
        url: &str,
        options: &FetchOptions,
        force: bool,
    ) -> Result<Option<FetchResponse>, FetchError> {
        let key = (url.to_string(), options.accept);
        let mut request = self.client.get(url);

        if options.cache == CacheMode::NoCache {
            request = request
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }
        if let Some(accept) = options.accept {
            request = request.header(ACCEPT, accept);
        }
        if !force && let Some(validators) = self.remembered(&key) {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|error| FetchError::request(url, error.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!("{url} not modified");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }

        let validators = Validators::from_headers(response.headers());
        let data = response.text().await.map_err(|error| FetchError {
            url: url.to_string(),
            status: Some(status.as_u16()),
            details: error.to_string(),
        })?;
        self.remember(key, validators);

        Ok(Some(FetchResponse { data }))
    }
}
