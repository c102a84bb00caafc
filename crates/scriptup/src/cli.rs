use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scriptup_backend::ScriptId;

use crate::settings::Settings;

/// Keep installed userscripts up to date.
#[derive(Debug, Parser)]
#[command(name = "scriptup", version, about)]
pub struct Cli {
    /// Keep all state below this directory instead of the platform defaults.
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log debug output whatever the saved setting says.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Check the given scripts, or every script when none are given.
    Check {
        /// Script ids as shown by `list`.
        ids: Vec<ScriptId>,
    },
    /// Check automatically on the configured schedule until Ctrl-C.
    Watch,
    /// Show installed scripts.
    List,
    /// Change saved settings. A running `watch` picks them up.
    Set(SetArgs),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct SetArgs {
    /// Days between automatic checks, 0 to turn them off.
    #[arg(long, value_name = "DAYS")]
    pub auto_update_days: Option<u32>,

    #[arg(long, value_name = "BOOL")]
    pub notify_updates: Option<bool>,

    /// Let every script follow `--notify-updates`, ignoring per-script choices.
    #[arg(long, value_name = "BOOL")]
    pub notify_updates_global: Option<bool>,

    /// Skip disabled scripts in automatic checks.
    #[arg(long, value_name = "BOOL")]
    pub update_enabled_scripts_only: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub debug_logging: Option<bool>,
}

impl SetArgs {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(days) = self.auto_update_days {
            settings.auto_update_days = days;
        }
        if let Some(notify) = self.notify_updates {
            settings.notify_updates = notify;
        }
        if let Some(global) = self.notify_updates_global {
            settings.notify_updates_global = global;
        }
        if let Some(enabled_only) = self.update_enabled_scripts_only {
            settings.update_enabled_scripts_only = enabled_only;
        }
        if let Some(debug) = self.debug_logging {
            settings.debug_logging = debug;
        }
    }
}
