use std::{
    process::Command,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{info, warn};

pub const AUTOMATION_SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Automation";

pub trait RemediationPrompt: Send + Sync {
    /// Offers to open the Automation privacy settings. Returns whether the
    /// offer was made.
    fn offer_automation_settings(&self) -> bool;
}

type UrlOpener = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Opens the Automation privacy pane at most once per process.
pub struct PermissionService {
    offered: AtomicBool,
    opener: UrlOpener,
}

impl Default for PermissionService {
    fn default() -> Self {
        Self::with_opener(Arc::new(open_url))
    }
}

impl PermissionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_opener(opener: UrlOpener) -> Self {
        Self {
            offered: AtomicBool::new(false),
            opener,
        }
    }
}

impl RemediationPrompt for PermissionService {
    fn offer_automation_settings(&self) -> bool {
        if self.offered.swap(true, Ordering::SeqCst) {
            return false;
        }

        match (self.opener)(AUTOMATION_SETTINGS_URL) {
            Ok(()) => info!("opened Automation privacy settings"),
            Err(error) => warn!(%error, "failed to open Automation privacy settings"),
        }
        true
    }
}

fn open_url(url: &str) -> Result<(), String> {
    let status = Command::new("open")
        .arg(url)
        .status()
        .map_err(|error| format!("Failed to run open: {error}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("open exited with status: {status}"))
    }
}
