//! Domain model and collaborator contracts for scriptup.
//!
//! The update engine in `scriptup-core` only talks to storage, HTTP, option
//! storage and notification delivery through the traits exported here, so
//! those collaborators can be swapped for in-memory fakes in tests.

mod error;
mod traits;
mod types;

pub use error::{BackendError, FetchError};
pub use traits::{ConditionalFetch, Notifier, OptionStore, ProgressSink, ScriptStore};
pub use types::{
    CacheMode, FetchOptions, FetchResponse, Script, ScriptConfig, ScriptCustom, ScriptId,
    ScriptMeta, StatusMessage, UpdateOptions, UpdateState, UpdateUrls, UrlSelection,
};
