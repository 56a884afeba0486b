use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::{
    clipboard_service::ClipboardSink,
    localization::{Localizer, MessageKey},
    permission_service::RemediationPrompt,
    recent_paths::RecentPathsStore,
    selection_resolver::{FailureKind, ResolvedPath, SelectionResolver},
    shortcut_registry::{
        BindingId, CaptureError, CaptureRejection, KeyEvent, KeyPhase, Shortcut, ShortcutRegistry,
    },
    status_notifier::NotificationSink,
    terminal_launcher::TerminalLauncher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    #[serde(rename = "copy_path")]
    CopyPath,
    #[serde(rename = "copy_file_name")]
    CopyFileName,
    #[serde(rename = "open_in_terminal")]
    OpenAtPathInTerminal,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CopyPath => "copy_path",
            Self::CopyFileName => "copy_file_name",
            Self::OpenAtPathInTerminal => "open_in_terminal",
        }
    }
}

impl From<BindingId> for Action {
    fn from(binding: BindingId) -> Self {
        match binding {
            BindingId::CopyPath => Self::CopyPath,
            BindingId::OpenTerminal => Self::OpenAtPathInTerminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The side effect ran; `output` is the text copied or the directory opened.
    Completed { action: Action, output: String },
    Failed(FailureKind),
    SideEffectFailed(String),
    /// Another action was still running.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventDisposition {
    Ignored,
    Captured { binding: BindingId, shortcut: Shortcut },
    CaptureRejected(CaptureRejection),
    Triggered(Action),
}

/// Side-effect collaborators of the dispatcher.
pub struct DispatcherCollaborators {
    pub clipboard: Arc<dyn ClipboardSink>,
    pub terminal: Arc<dyn TerminalLauncher>,
    pub notifier: Arc<dyn NotificationSink>,
    pub remediation: Arc<dyn RemediationPrompt>,
}

pub struct ActionDispatcher {
    registry: Arc<ShortcutRegistry>,
    resolver: SelectionResolver,
    collaborators: DispatcherCollaborators,
    recent_paths: Arc<RecentPathsStore>,
    localizer: Localizer,
    quick_toggle: Option<Action>,
    execution_lock: tokio::sync::Mutex<()>,
}

impl ActionDispatcher {
    pub fn new(
        registry: Arc<ShortcutRegistry>,
        resolver: SelectionResolver,
        collaborators: DispatcherCollaborators,
        recent_paths: Arc<RecentPathsStore>,
        localizer: Localizer,
    ) -> Self {
        Self {
            registry,
            resolver,
            collaborators,
            recent_paths,
            localizer,
            quick_toggle: None,
            execution_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `None` disables the quick toggle.
    pub fn with_quick_toggle(mut self, action: Option<Action>) -> Self {
        self.quick_toggle = action;
        self
    }

    pub fn registry(&self) -> &Arc<ShortcutRegistry> {
        &self.registry
    }

    pub async fn perform(&self, action: Action) -> ActionOutcome {
        let Ok(_guard) = self.execution_lock.try_lock() else {
            info!(action = action.as_str(), "action already running; dropping trigger");
            return ActionOutcome::Skipped;
        };

        debug!(action = action.as_str(), "resolving Finder selection");
        let path = match self.resolver.resolve().await {
            Ok(path) => path,
            Err(failure) => {
                self.notify(self.localizer.text(MessageKey::Error), failure.remediation)
                    .await;
                if failure.kind.offers_remediation_prompt() {
                    let remediation = Arc::clone(&self.collaborators.remediation);
                    if let Err(error) =
                        run_blocking(move || remediation.offer_automation_settings()).await
                    {
                        warn!(%error, "failed to offer automation settings");
                    }
                }
                return ActionOutcome::Failed(failure.kind);
            }
        };

        let (output, title, failure_message) = describe(action, &path);
        if let Err(error) = self.apply(action, output.clone()).await {
            warn!(action = action.as_str(), %error, "action side effect failed");
            self.notify(
                self.localizer.text(MessageKey::Error),
                self.localizer.text(failure_message).to_string(),
            )
            .await;
            return ActionOutcome::SideEffectFailed(error);
        }

        if let Err(error) = self.recent_paths.record(path.as_str()) {
            warn!(%error, "failed to persist recent path");
        }

        info!(action = action.as_str(), path = path.as_str(), "action completed");
        self.notify(self.localizer.text(title), output.clone()).await;

        ActionOutcome::Completed { action, output }
    }

    /// Runs the configured quick-toggle action, or returns `None` when the
    /// quick toggle is off.
    pub async fn perform_quick_toggle(&self) -> Option<ActionOutcome> {
        let action = self.quick_toggle?;
        Some(self.perform(action).await)
    }

    /// Classifies one key event. Capture happens here; matched actions are
    /// returned for the caller to run.
    pub fn handle_key_event(&self, event: KeyEvent) -> KeyEventDisposition {
        if event.phase != KeyPhase::Down || event.is_repeat {
            return KeyEventDisposition::Ignored;
        }

        if let Some(binding) = self.registry.recording_binding() {
            return match self.registry.try_capture(binding, &event) {
                Ok(shortcut) => KeyEventDisposition::Captured { binding, shortcut },
                Err(CaptureError::Rejected(rejection)) => {
                    debug!(%binding, %rejection, "key press rejected while recording");
                    KeyEventDisposition::CaptureRejected(rejection)
                }
                Err(CaptureError::NotRecording(_)) => KeyEventDisposition::Ignored,
            };
        }

        match self.registry.match_event(&event) {
            Some(binding) => KeyEventDisposition::Triggered(Action::from(binding)),
            None => KeyEventDisposition::Ignored,
        }
    }

    /// Drains key events until the sender side closes. Each triggered action
    /// runs on its own task so the loop keeps up with input.
    pub async fn run(self: Arc<Self>, mut receiver: UnboundedReceiver<KeyEvent>) {
        while let Some(event) = receiver.recv().await {
            match self.handle_key_event(event) {
                KeyEventDisposition::Triggered(action) => {
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        dispatcher.perform(action).await;
                    });
                }
                KeyEventDisposition::Captured { binding, shortcut } => {
                    info!(%binding, %shortcut, "shortcut captured");
                }
                KeyEventDisposition::CaptureRejected(_) | KeyEventDisposition::Ignored => {}
            }
        }

        debug!("key event channel closed; dispatch loop exiting");
    }

    /// Runs the clipboard or terminal side effect off the async worker;
    /// both shell out and may block for a while.
    async fn apply(&self, action: Action, text: String) -> Result<(), String> {
        let clipboard = Arc::clone(&self.collaborators.clipboard);
        let terminal = Arc::clone(&self.collaborators.terminal);
        run_blocking(move || match action {
            Action::CopyPath | Action::CopyFileName => clipboard.write_text(&text),
            Action::OpenAtPathInTerminal => terminal.open_at(&text),
        })
        .await?
    }

    async fn notify(&self, title: &'static str, body: String) {
        let notifier = Arc::clone(&self.collaborators.notifier);
        if let Err(error) = run_blocking(move || notifier.notify(title, &body)).await {
            warn!(%error, title, "failed to post notification");
        }
    }
}

/// Side-effect text, success title and failure message for `action`.
fn describe(action: Action, path: &ResolvedPath) -> (String, MessageKey, MessageKey) {
    match action {
        Action::CopyPath => (
            path.to_string(),
            MessageKey::PathCopied,
            MessageKey::ClipboardFailed,
        ),
        Action::CopyFileName => (
            path.file_name().to_string(),
            MessageKey::FileNameCopied,
            MessageKey::ClipboardFailed,
        ),
        Action::OpenAtPathInTerminal => (
            path.to_string(),
            MessageKey::TerminalOpened,
            MessageKey::TerminalFailed,
        ),
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| format!("Blocking task failed: {error}"))
}
