use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;
use scriptup_backend::{
    BackendError, CacheMode, ConditionalFetch, FetchOptions, Script, ScriptId, ScriptStore,
};
use scriptup_core::meta::parse_meta;
use scriptup_platform::AppPaths;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::atomic_file::write_atomic;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read script index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse script index {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Installed scripts kept as a JSON index plus one code file per script.
pub struct JsonScriptStore {
    index_path: PathBuf,
    code_dir: PathBuf,
    resources_dir: PathBuf,
    scripts: Mutex<Vec<Script>>,
    fetch: Arc<dyn ConditionalFetch>,
}

impl JsonScriptStore {
    /// Open the store below `paths`. A missing index means no scripts.
    ///
    /// # Errors
    /// Returns an error when the index exists but cannot be read or parsed.
    pub fn open(paths: &AppPaths, fetch: Arc<dyn ConditionalFetch>) -> Result<Self, StoreError> {
        let index_path = paths.scripts_index_file();
        let scripts = read_index(&index_path)?;
        debug!(
            "Loaded {} scripts from {}",
            scripts.len(),
            index_path.display()
        );
        Ok(Self {
            index_path,
            code_dir: paths.code_dir(),
            resources_dir: paths.resources_dir(),
            scripts: Mutex::new(scripts),
            fetch,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Script>> {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn code_path(&self, id: ScriptId) -> PathBuf {
        self.code_dir.join(format!("{id}.user.js"))
    }

    #[must_use]
    pub fn resource_path(&self, url: &str) -> PathBuf {
        self.resources_dir
            .join(format!("{:x}", Sha256::digest(url.as_bytes())))
    }

    fn persist(&self, scripts: &[Script]) -> Result<(), BackendError> {
        let content = serde_json::to_vec_pretty(scripts)
            .map_err(|error| BackendError::storage("script index", error.to_string()))?;
        write_atomic(&self.index_path, &content)
            .map_err(|error| BackendError::storage("script index", error.to_string()))
    }

    async fn fetch_resource(&self, url: &str, cache: CacheMode) -> Result<(), String> {
        let path = self.resource_path(url);
        // Without a cached copy a "not modified" answer would leave nothing.
        let force = !path.exists();
        let response = self
            .fetch
            .request_newer(url, &FetchOptions::with_cache(cache), force)
            .await
            .map_err(|error| error.to_string())?;

        if let Some(response) = response {
            tokio::fs::write(&path, response.data)
                .await
                .map_err(|error| format!("failed to save {url}: {error}"))?;
        }
        Ok(())
    }
}

fn read_index(path: &Path) -> Result<Vec<Script>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl ScriptStore for JsonScriptStore {
    fn script_by_id(&self, id: ScriptId) -> Option<Script> {
        self.lock().iter().find(|script| script.id == id).cloned()
    }

    fn scripts(&self) -> Vec<Script> {
        self.lock().clone()
    }

    async fn apply_update(&self, id: ScriptId, code: String) -> Result<Script, BackendError> {
        let parsed = parse_meta(&code)
            .ok_or_else(|| BackendError::invalid_script("missing ==UserScript== block"))?;
        if self.script_by_id(id).is_none() {
            return Err(BackendError::NotFound { id });
        }

        tokio::fs::write(self.code_path(id), &code).await?;

        let mut scripts = self.lock();
        let stored = scripts
            .iter_mut()
            .find(|script| script.id == id)
            .ok_or(BackendError::NotFound { id })?;
        stored.meta = parsed.meta;
        let updated = stored.clone();
        self.persist(&scripts)?;
        Ok(updated)
    }

    async fn fetch_resources(&self, script: &Script, cache: CacheMode) -> Option<String> {
        let urls: BTreeSet<&str> = script
            .meta
            .requires
            .iter()
            .chain(script.meta.resources.values())
            .map(String::as_str)
            .filter(|url| !url.trim().is_empty())
            .collect();

        let mut failures = Vec::new();
        for url in urls {
            if let Err(error) = self.fetch_resource(url, cache).await {
                debug!("Resource {url} of script {} failed: {error}", script.id);
                failures.push(error);
            }
        }

        if failures.is_empty() {
            None
        } else {
            Some(format!(
                "Could not fetch resources of {}: {}",
                script.display_name(),
                failures.join("; ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use scriptup_backend::{
        BackendError, CacheMode, ConditionalFetch, FetchError, FetchOptions, FetchResponse, Script,
        ScriptId, ScriptMeta, ScriptStore,
    };
    use scriptup_platform::AppPaths;

    use super::JsonScriptStore;

    const CODE_V2: &str = "// ==UserScript==\n// @name Demo\n// @version 2.0\n// @require https://cdn.example/lib.js\n// ==/UserScript==\nrun();\n";

    #[derive(Default)]
    struct CannedFetch {
        bodies: HashMap<String, String>,
        calls: Mutex<Vec<(String, CacheMode, bool)>>,
    }

    #[async_trait]
    impl ConditionalFetch for CannedFetch {
        async fn request_newer(
            &self,
            url: &str,
            options: &FetchOptions,
            force: bool,
        ) -> Result<Option<FetchResponse>, FetchError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((url.to_string(), options.cache, force));
            self.bodies
                .get(url)
                .map(|data| Some(FetchResponse { data: data.clone() }))
                .ok_or_else(|| FetchError::status(url, 404))
        }
    }

    fn demo_script() -> Script {
        Script {
            id: ScriptId(7),
            meta: ScriptMeta {
                name: "Demo".to_string(),
                version: Some("1.0".to_string()),
                ..ScriptMeta::default()
            },
            ..Script::default()
        }
    }

    fn open_store(
        root: &std::path::Path,
        fetch: Arc<CannedFetch>,
    ) -> (AppPaths, JsonScriptStore) {
        let paths = AppPaths::under(root);
        paths.ensure_dirs().expect("directories should be created");
        std::fs::write(
            paths.scripts_index_file(),
            serde_json::to_vec(&vec![demo_script()]).expect("index should serialize"),
        )
        .expect("index should be written");
        let store = JsonScriptStore::open(&paths, fetch).expect("store should open");
        (paths, store)
    }

    #[test]
    fn missing_index_means_no_scripts() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let paths = AppPaths::under(temp_dir.path());

        let store = JsonScriptStore::open(&paths, Arc::new(CannedFetch::default()))
            .expect("store should open");

        assert!(store.scripts().is_empty());
    }

    #[test]
    fn corrupt_index_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let paths = AppPaths::under(temp_dir.path());
        paths.ensure_dirs().expect("directories should be created");
        std::fs::write(paths.scripts_index_file(), "[{").expect("index should be written");

        assert!(JsonScriptStore::open(&paths, Arc::new(CannedFetch::default())).is_err());
    }

    #[tokio::test]
    async fn apply_update_stores_code_and_new_metadata() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let (paths, store) = open_store(temp_dir.path(), Arc::new(CannedFetch::default()));

        let updated = store
            .apply_update(ScriptId(7), CODE_V2.to_string())
            .await
            .expect("update should apply");

        assert_eq!(updated.meta.version.as_deref(), Some("2.0"));
        assert_eq!(updated.meta.requires, vec!["https://cdn.example/lib.js"]);
        assert_eq!(
            std::fs::read_to_string(store.code_path(ScriptId(7))).expect("code should exist"),
            CODE_V2
        );

        let reopened = JsonScriptStore::open(&paths, Arc::new(CannedFetch::default()))
            .expect("store should reopen");
        let script = reopened
            .script_by_id(ScriptId(7))
            .expect("script should persist");
        assert_eq!(script.meta.version.as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn apply_update_rejects_code_without_metadata() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let (_paths, store) = open_store(temp_dir.path(), Arc::new(CannedFetch::default()));

        let error = store
            .apply_update(ScriptId(7), "run();".to_string())
            .await
            .expect_err("code without a metadata block is invalid");

        assert!(matches!(error, BackendError::InvalidScript { .. }));
        assert!(!store.code_path(ScriptId(7)).exists());
    }

    #[tokio::test]
    async fn apply_update_for_unknown_script_fails() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let (_paths, store) = open_store(temp_dir.path(), Arc::new(CannedFetch::default()));

        let error = store
            .apply_update(ScriptId(99), CODE_V2.to_string())
            .await
            .expect_err("unknown id");

        assert_eq!(error, BackendError::NotFound { id: ScriptId(99) });
    }

    #[tokio::test]
    async fn fetch_resources_caches_bodies_by_url_hash() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let fetch = Arc::new(CannedFetch {
            bodies: HashMap::from([(
                "https://cdn.example/lib.js".to_string(),
                "lib();".to_string(),
            )]),
            ..CannedFetch::default()
        });
        let (_paths, store) = open_store(temp_dir.path(), fetch.clone());
        let mut script = store.script_by_id(ScriptId(7)).expect("seeded script");
        script
            .meta
            .requires
            .push("https://cdn.example/lib.js".to_string());

        let error = store.fetch_resources(&script, CacheMode::NoCache).await;

        assert_eq!(error, None);
        let cached = store.resource_path("https://cdn.example/lib.js");
        assert_eq!(
            std::fs::read_to_string(&cached).expect("resource should be cached"),
            "lib();"
        );
        assert_eq!(
            fetch.calls.lock().expect("calls lock").clone(),
            vec![(
                "https://cdn.example/lib.js".to_string(),
                CacheMode::NoCache,
                true
            )]
        );
    }

    #[tokio::test]
    async fn failed_resources_are_reported_together() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let (_paths, store) = open_store(temp_dir.path(), Arc::new(CannedFetch::default()));
        let mut script = store.script_by_id(ScriptId(7)).expect("seeded script");
        script.meta.requires.push("https://cdn.example/a.js".to_string());
        script
            .meta
            .resources
            .insert("icon".to_string(), "https://cdn.example/b.png".to_string());

        let error = store
            .fetch_resources(&script, CacheMode::Default)
            .await
            .expect("missing resources should be reported");

        assert!(error.starts_with("Could not fetch resources of Demo: "));
        assert!(error.contains("https://cdn.example/a.js"));
        assert!(error.contains("https://cdn.example/b.png"));
    }
}
