use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub u64);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScriptId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Values declared in the script's metadata block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

/// User overrides that take precedence over the metadata block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCustom {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default)]
    pub last_install_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub should_update: bool,

    /// Per-script override of the global notification setting.
    #[serde(default)]
    pub notify_updates: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            should_update: true,
            notify_updates: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: ScriptId,
    pub meta: ScriptMeta,
    #[serde(default)]
    pub custom: ScriptCustom,
    #[serde(default)]
    pub config: ScriptConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlSelection {
    /// Automatic checks skip scripts the user excluded from updating.
    pub auto: bool,
    pub enabled_only: bool,
}

/// Where to look for a newer version and where to download it from.
///
/// The update URL falls back to the download URL, so a checkable script
/// always has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUrls {
    pub download: Option<String>,
    pub update: String,
}

impl Script {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.custom
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.meta.name)
    }

    #[must_use]
    pub fn update_urls(&self, selection: UrlSelection) -> Option<UpdateUrls> {
        if selection.auto && !self.config.should_update {
            return None;
        }
        if selection.enabled_only && !self.config.enabled {
            return None;
        }

        let download = non_empty(self.custom.download_url.as_deref())
            .or_else(|| non_empty(self.meta.download_url.as_deref()))
            .or_else(|| non_empty(self.custom.last_install_url.as_deref()))
            .map(str::to_string);
        let update = non_empty(self.custom.update_url.as_deref())
            .or_else(|| non_empty(self.meta.update_url.as_deref()))
            .map(str::to_string)
            .or_else(|| download.clone())?;

        Some(UpdateUrls { download, update })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusMessage {
    CheckingForUpdate,
    NoUpdate,
    NewVersion,
    Updating,
    Updated,
    ErrorFetchingUpdateInfo,
    ErrorFetchingScript,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CheckingForUpdate => "Checking for updates...",
            Self::NoUpdate => "No update found.",
            Self::NewVersion => "New version found.",
            Self::Updating => "Updating...",
            Self::Updated => "Update complete!",
            Self::ErrorFetchingUpdateInfo => "Error fetching update information.",
            Self::ErrorFetchingScript => "Error fetching script.",
        };
        f.write_str(text)
    }
}

/// Live progress of a single update check, broadcast after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateState {
    pub message: StatusMessage,
    pub checking: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    #[default]
    Default,
    NoCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub cache: CacheMode,
    pub accept: Option<&'static str>,
}

impl FetchOptions {
    pub const NO_CACHE: Self = Self {
        cache: CacheMode::NoCache,
        accept: None,
    };

    /// Smart servers answer this with a metadata block and no code.
    pub const FAST_CHECK: Self = Self {
        cache: CacheMode::NoCache,
        accept: Some("text/x-userscript-meta,*/*"),
    };

    #[must_use]
    pub fn with_cache(cache: CacheMode) -> Self {
        Self {
            cache,
            accept: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub data: String,
}

/// Snapshot of the options consulted by update checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct UpdateOptions {
    pub update_enabled_scripts_only: bool,
    pub notify_updates: bool,
    pub notify_updates_global: bool,
    /// Days between automatic checks, `0` disables them.
    pub auto_update_days: u32,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            update_enabled_scripts_only: true,
            notify_updates: true,
            notify_updates_global: false,
            auto_update_days: 1,
        }
    }
}
