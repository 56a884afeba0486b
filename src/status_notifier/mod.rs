use std::sync::Arc;

use tracing::{debug, warn};

use crate::selection_resolver::osascript::{escape_for_applescript, run_script_blocking};

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

type ScriptRunner = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Posts user notifications through `display notification`. Delivery is
/// best effort: failures are logged and never surfaced.
#[derive(Clone)]
pub struct DesktopNotifier {
    enabled: bool,
    debug_mode: bool,
    runner: ScriptRunner,
}

impl std::fmt::Debug for DesktopNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopNotifier")
            .field("enabled", &self.enabled)
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}

impl DesktopNotifier {
    pub fn new(enabled: bool, debug_mode: bool) -> Self {
        Self::with_runner(enabled, debug_mode, Arc::new(run_script_blocking))
    }

    fn with_runner(enabled: bool, debug_mode: bool, runner: ScriptRunner) -> Self {
        Self {
            enabled,
            debug_mode,
            runner,
        }
    }
}

impl NotificationSink for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        if !self.enabled {
            if self.debug_mode {
                debug!(title, body, "notifications disabled; dropping notification");
            }
            return;
        }

        if let Err(error) = (self.runner)(&notification_script(title, body)) {
            warn!(%error, title, "failed to deliver notification");
        }
    }
}

fn notification_script(title: &str, body: &str) -> String {
    format!(
        r#"display notification "{}" with title "{}""#,
        escape_for_applescript(body),
        escape_for_applescript(title)
    )
}
