//! Command-line surface. Each subcommand mirrors an entry of the menu-bar
//! menu; `run` starts the shortcut listener.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    action_dispatcher::Action,
    localization::Language,
    settings_store::AppSettingsUpdate,
    shortcut_registry::{BindingId, ModifierMatch},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ActionArg {
    CopyPath,
    CopyFileName,
    OpenInTerminal,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::CopyPath => Action::CopyPath,
            ActionArg::CopyFileName => Action::CopyFileName,
            ActionArg::OpenInTerminal => Action::OpenAtPathInTerminal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BindingArg {
    CopyPath,
    OpenTerminal,
}

impl From<BindingArg> for BindingId {
    fn from(arg: BindingArg) -> Self {
        match arg {
            BindingArg::CopyPath => BindingId::CopyPath,
            BindingArg::OpenTerminal => BindingId::OpenTerminal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModifierMatchArg {
    Exact,
    Superset,
}

impl From<ModifierMatchArg> for ModifierMatch {
    fn from(arg: ModifierMatchArg) -> Self {
        match arg {
            ModifierMatchArg::Exact => ModifierMatch::Exact,
            ModifierMatchArg::Superset => ModifierMatch::Superset,
        }
    }
}

/// pathbar - copy the Finder selection path or open a terminal there
#[derive(Debug, Parser)]
#[command(name = "pathbar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding settings, shortcuts, recent paths and logs
    #[arg(long, global = true, env = "PATHBAR_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    pub fn subcommand(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Listen for the global shortcuts until interrupted (default)
    Run,

    /// Run one action against the current Finder selection
    Perform {
        #[arg(value_enum)]
        action: ActionArg,
    },

    /// Run the action configured for the status item
    QuickToggle,

    /// Record a new shortcut from the next qualifying key press
    Record {
        #[arg(value_enum)]
        binding: BindingArg,
    },

    /// Show the current shortcuts
    Shortcuts {
        /// Restore the default shortcuts
        #[arg(long)]
        reset: bool,
    },

    /// Show recently resolved paths
    Recent {
        /// Forget all recent paths
        #[arg(long)]
        clear: bool,
    },

    /// Show or change settings
    Settings(SettingsArgs),

    /// Print the diagnostics log
    Logs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Restore default settings and shortcuts and forget recent paths
    #[arg(long)]
    pub reset: bool,

    #[arg(long, value_name = "BOOL")]
    pub show_notifications: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub launch_at_login: Option<bool>,

    /// `en` or `zh-Hans`
    #[arg(long, value_name = "LANG")]
    pub language: Option<Language>,

    #[arg(long, value_name = "BOOL")]
    pub quick_toggle: Option<bool>,

    #[arg(long, value_enum, value_name = "ACTION")]
    pub quick_toggle_action: Option<ActionArg>,

    #[arg(long, value_name = "BOOL")]
    pub debug_mode: Option<bool>,

    /// trace, debug, info, warn or error
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Kept between 5 and 50
    #[arg(long, value_name = "COUNT")]
    pub max_recent_paths: Option<usize>,

    #[arg(long, value_enum, value_name = "MODE")]
    pub modifier_match: Option<ModifierMatchArg>,

    #[arg(long, value_name = "MS")]
    pub query_timeout_ms: Option<u64>,
}

impl SettingsArgs {
    pub fn into_update(self) -> AppSettingsUpdate {
        AppSettingsUpdate {
            show_notifications: self.show_notifications,
            launch_at_login: self.launch_at_login,
            app_language: self.language,
            quick_toggle: self.quick_toggle,
            quick_toggle_action: self.quick_toggle_action.map(Action::from),
            enable_debug_mode: self.debug_mode,
            log_level: self.log_level,
            max_recent_paths: self.max_recent_paths,
            modifier_match: self.modifier_match.map(ModifierMatch::from),
            query_timeout_ms: self.query_timeout_ms,
        }
    }
}
