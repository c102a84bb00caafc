//! Update checking engine for installed userscripts.
//!
//! This crate holds the logic that is independent of storage and UI:
//! - Bounded, staggered launching of checks ([`Limiter`]).
//! - Version comparison and metadata block parsing.
//! - The two-phase metadata/code resolution for one script.
//! - Per-script workers, batch orchestration and the automatic schedule.

pub mod checker;
mod fetch;
pub mod limiter;
pub mod meta;
pub mod protocol;
mod registry;
pub mod scheduler;
mod version;
pub mod worker;

/// Batch orchestration over many scripts.
pub use checker::{CheckTarget, CheckerDeps, UpdateChecker};
/// `reqwest`-backed conditional fetch with validator caching.
pub use fetch::HttpFetcher;
pub use limiter::Limiter;
pub use protocol::{Resolution, download_update};
/// In-flight check registry guaranteeing one pending check per script.
pub use registry::{InFlightRegistry, InFlightSlot, SharedCheck};
pub use scheduler::{AutoUpdater, CheckAll, plan_tick};
/// Version ordering used to decide whether a remote script is newer.
pub use version::{compare_version, is_newer_version};
pub use worker::{CheckOutcome, UpdateNote, UpdateWorker, can_notify};
