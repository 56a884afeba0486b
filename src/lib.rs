pub mod action_dispatcher;
pub mod cli;
pub mod clipboard_service;
pub mod localization;
pub mod logging;
pub mod permission_service;
pub mod preference_store;
pub mod recent_paths;
pub mod selection_resolver;
pub mod settings_store;
pub mod shortcut_registry;
pub mod status_notifier;
pub mod terminal_launcher;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::Parser;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};

use action_dispatcher::{
    Action, ActionDispatcher, ActionOutcome, DispatcherCollaborators, KeyEventDisposition,
};
use cli::{Cli, Commands};
use clipboard_service::PasteboardClipboard;
use localization::Localizer;
use permission_service::PermissionService;
use preference_store::{FilePreferenceStore, PreferenceStore};
use recent_paths::RecentPathsStore;
use selection_resolver::{OsascriptExecutor, SelectionResolver};
use settings_store::{AppSettings, SettingsStore};
use shortcut_registry::{BindingId, KeyEvent, ShortcutRegistry};
use status_notifier::DesktopNotifier;
use terminal_launcher::TerminalAppLauncher;

const APP_DIR_NAME: &str = "pathbar";
const PREFERENCES_DIR_NAME: &str = "preferences";

/// On-disk locations used by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Uses `override_dir` when given, else the platform data directory.
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, String> {
        let data_dir = match override_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| "Failed to resolve the user data directory".to_string())?,
        };

        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn preferences_dir(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_DIR_NAME)
    }
}

/// Everything loaded once at startup and shared by the commands.
pub struct AppContext {
    paths: AppPaths,
    settings_store: SettingsStore,
    settings: AppSettings,
    registry: Arc<ShortcutRegistry>,
    recent_paths: Arc<RecentPathsStore>,
}

impl AppContext {
    pub fn load(paths: AppPaths, settings_store: SettingsStore, settings: AppSettings) -> Self {
        let preferences: Arc<dyn PreferenceStore> =
            Arc::new(FilePreferenceStore::new(paths.preferences_dir()));
        let registry = Arc::new(ShortcutRegistry::open(
            Arc::clone(&preferences),
            settings.modifier_match,
        ));
        let recent_paths = Arc::new(RecentPathsStore::open(
            preferences,
            settings.max_recent_paths,
        ));

        Self {
            paths,
            settings_store,
            settings,
            registry,
            recent_paths,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ShortcutRegistry> {
        &self.registry
    }

    pub fn recent_paths(&self) -> &Arc<RecentPathsStore> {
        &self.recent_paths
    }

    /// Restores default settings and shortcuts and clears the recent paths.
    pub fn reset_to_defaults(&self) -> Result<AppSettings, String> {
        let settings = self.settings_store.reset()?;
        self.registry
            .reset_all()
            .map_err(|error| error.to_string())?;
        self.recent_paths
            .set_max_entries(settings.max_recent_paths)
            .and_then(|()| self.recent_paths.clear())
            .map_err(|error| error.to_string())?;
        info!("settings, shortcuts and recent paths reset to defaults");
        Ok(settings)
    }

    pub fn dispatcher(&self) -> ActionDispatcher {
        let localizer = Localizer::new(self.settings.app_language);
        let resolver = SelectionResolver::new(
            Arc::new(OsascriptExecutor::new()),
            localizer,
            self.settings.query_timeout(),
        );
        let collaborators = DispatcherCollaborators {
            clipboard: Arc::new(PasteboardClipboard::new()),
            terminal: Arc::new(TerminalAppLauncher::new()),
            notifier: Arc::new(DesktopNotifier::new(
                self.settings.show_notifications,
                self.settings.enable_debug_mode,
            )),
            remediation: Arc::new(PermissionService::new()),
        };

        ActionDispatcher::new(
            Arc::clone(&self.registry),
            resolver,
            collaborators,
            Arc::clone(&self.recent_paths),
            localizer,
        )
        .with_quick_toggle(self.settings.quick_toggle_target())
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.subcommand();

    let paths = match AppPaths::resolve(cli.data_dir) {
        Ok(paths) => paths,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Logs = command {
        return match logging::export_log_contents(paths.data_dir()) {
            Ok(contents) => {
                print!("{contents}");
                ExitCode::SUCCESS
            }
            Err(message) => {
                eprintln!("{message}");
                ExitCode::FAILURE
            }
        };
    }

    let settings_store = SettingsStore::in_dir(paths.data_dir());
    let settings = match settings_store.load() {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("Failed to load persisted settings: {message}");
            AppSettings::default()
        }
    };

    if let Err(message) = logging::initialize(paths.data_dir(), &settings) {
        eprintln!("{message}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let context = AppContext::load(paths, settings_store, settings);
    match runtime.block_on(execute(command, context)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(%message, "command failed");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, context: AppContext) -> Result<(), String> {
    match command {
        Commands::Run => run_listener(&context).await,
        Commands::Perform { action } => {
            report_outcome(context.dispatcher().perform(action.into()).await)
        }
        Commands::QuickToggle => match context.dispatcher().perform_quick_toggle().await {
            Some(outcome) => report_outcome(outcome),
            None => {
                println!("Quick toggle is off; enable it with `pathbar settings --quick-toggle true`");
                Ok(())
            }
        },
        Commands::Record { binding } => record_shortcut(&context, binding.into()).await,
        Commands::Shortcuts { reset } => {
            if reset {
                context
                    .registry()
                    .reset_all()
                    .map_err(|error| error.to_string())?;
            }
            print_shortcuts(context.registry());
            Ok(())
        }
        Commands::Recent { clear } => {
            if clear {
                context
                    .recent_paths()
                    .clear()
                    .map_err(|error| error.to_string())?;
            }
            for path in context.recent_paths().list() {
                println!("{path}");
            }
            Ok(())
        }
        Commands::Settings(args) => {
            let reset = args.reset;
            let update = args.into_update();
            let settings = if reset {
                context.reset_to_defaults()?
            } else if update.is_empty() {
                context.settings().clone()
            } else {
                let max_recent_paths = update.max_recent_paths;
                let updated = context.settings_store.update(update)?;
                if max_recent_paths.is_some() {
                    context
                        .recent_paths()
                        .set_max_entries(updated.max_recent_paths)
                        .map_err(|error| error.to_string())?;
                }
                updated
            };
            let rendered = serde_json::to_string_pretty(&settings)
                .map_err(|error| format!("Failed to render settings: {error}"))?;
            println!("{rendered}");
            Ok(())
        }
        Commands::Logs => {
            print!(
                "{}",
                logging::export_log_contents(context.paths.data_dir())?
            );
            Ok(())
        }
    }
}

async fn run_listener(context: &AppContext) -> Result<(), String> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let _key_source = start_key_event_source(sender)?;
    let dispatcher = Arc::new(context.dispatcher());

    print_shortcuts(context.registry());
    info!("listening for shortcuts");

    tokio::select! {
        _ = dispatcher.run(receiver) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(error) = signal {
                warn!(%error, "failed to wait for interrupt signal");
            }
            info!("interrupted; shutting down");
        }
    }

    Ok(())
}

async fn record_shortcut(context: &AppContext, binding: BindingId) -> Result<(), String> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let _key_source = start_key_event_source(sender)?;
    let dispatcher = context.dispatcher();
    let registry = context.registry();

    registry.start_recording(binding);
    println!("Press the new shortcut for {binding} (Ctrl-C to cancel)");

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Some(event) = event else {
                    registry.cancel_recording(binding);
                    return Err("Key event source stopped while recording".to_string());
                };
                match dispatcher.handle_key_event(event) {
                    KeyEventDisposition::Captured { shortcut, .. } => {
                        println!("{binding}: {shortcut}");
                        return Ok(());
                    }
                    KeyEventDisposition::CaptureRejected(rejection) => println!("{rejection}"),
                    KeyEventDisposition::Triggered(_) | KeyEventDisposition::Ignored => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                registry.cancel_recording(binding);
                println!("Recording cancelled");
                return Ok(());
            }
        }
    }
}

fn report_outcome(outcome: ActionOutcome) -> Result<(), String> {
    match outcome {
        ActionOutcome::Completed { action, output } => {
            match action {
                Action::OpenAtPathInTerminal => println!("Opened Terminal at {output}"),
                Action::CopyPath | Action::CopyFileName => println!("{output}"),
            }
            Ok(())
        }
        ActionOutcome::Failed(kind) => Err(format!(
            "Could not resolve the Finder selection ({})",
            kind.as_str()
        )),
        ActionOutcome::SideEffectFailed(message) => Err(message),
        ActionOutcome::Skipped => Err("Another action is still running".to_string()),
    }
}

fn print_shortcuts(registry: &ShortcutRegistry) {
    for (binding, shortcut) in registry.bindings() {
        println!("{binding}: {shortcut}");
    }
}

#[cfg(target_os = "macos")]
fn start_key_event_source(
    sender: UnboundedSender<KeyEvent>,
) -> Result<shortcut_registry::macos_event_tap::MacOSKeyEventTap, String> {
    let tap = shortcut_registry::macos_event_tap::MacOSKeyEventTap::new();
    tap.start(sender)?;
    Ok(tap)
}

#[cfg(not(target_os = "macos"))]
fn start_key_event_source(_sender: UnboundedSender<KeyEvent>) -> Result<(), String> {
    Err("Global key events are only available on macOS".to_string())
}
