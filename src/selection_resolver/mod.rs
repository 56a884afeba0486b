pub mod osascript;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::localization::{Localizer, MessageKey};

pub use osascript::OsascriptExecutor;

pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 3_000;
pub const MIN_QUERY_TIMEOUT_MS: u64 = 250;
pub const MAX_QUERY_TIMEOUT_MS: u64 = 30_000;

/// First selected item, else the front window's folder, else the desktop.
pub const SELECTION_QUERY: &str = r#"tell application "Finder"
    set theSelection to selection
    if (count of theSelection) is 0 then
        try
            set theTarget to target of front Finder window
            return POSIX path of (theTarget as alias)
        on error
            return POSIX path of (path to desktop folder)
        end try
    else
        return POSIX path of (item 1 of theSelection as alias)
    end if
end tell"#;

const MISSING_VALUE: &str = "missing value";

const PERMISSION_CODES: [i64; 2] = [-1743, -1719];
const NOT_RUNNING_CODES: [i64; 1] = [-600];
const SYNTAX_CODES: [i64; 3] = [-1708, -2740, -2741];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success(String),
    Failure {
        diagnostic: String,
        code: Option<i64>,
    },
}

/// Runs a script against the host file manager.
#[async_trait]
pub trait HostQueryExecutor: Send + Sync {
    async fn execute(&self, script: &str) -> QueryOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PermissionDenied,
    HostNotRunning,
    ScriptSyntaxError,
    EmptyResult,
    Timeout,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::HostNotRunning => "host_not_running",
            Self::ScriptSyntaxError => "script_syntax_error",
            Self::EmptyResult => "empty_result",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    pub fn offers_remediation_prompt(self) -> bool {
        self == Self::PermissionDenied
    }

    fn message_key(self) -> MessageKey {
        match self {
            Self::PermissionDenied => MessageKey::PermissionDenied,
            Self::HostNotRunning => MessageKey::HostNotRunning,
            Self::ScriptSyntaxError => MessageKey::ScriptFailed,
            Self::EmptyResult => MessageKey::EmptySelection,
            Self::Timeout => MessageKey::QueryTimedOut,
            Self::Unknown => MessageKey::UnexpectedResult,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{remediation}")]
pub struct SelectionFailure {
    pub kind: FailureKind,
    pub diagnostic: String,
    pub code: Option<i64>,
    pub remediation: String,
}

/// A trimmed, absolute filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(String);

impl ResolvedPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text after the last `/`. Empty for a path ending in `/`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub type SelectionResult = Result<ResolvedPath, SelectionFailure>;

pub fn classify_failure(diagnostic: &str, code: Option<i64>) -> FailureKind {
    let text = diagnostic.to_lowercase().replace('\u{2019}', "'");

    if mentions_any(&text, &["not authorized", "not allowed", "not privileged"])
        || has_any_code(code, &PERMISSION_CODES)
    {
        FailureKind::PermissionDenied
    } else if mentions_any(&text, &["not running", "isn't running"])
        || has_any_code(code, &NOT_RUNNING_CODES)
    {
        FailureKind::HostNotRunning
    } else if mentions_any(&text, &["doesn't understand", "syntax error"])
        || has_any_code(code, &SYNTAX_CODES)
    {
        FailureKind::ScriptSyntaxError
    } else {
        FailureKind::Unknown
    }
}

fn mentions_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn has_any_code(code: Option<i64>, codes: &[i64]) -> bool {
    code.is_some_and(|code| codes.contains(&code))
}

pub struct SelectionResolver {
    executor: Arc<dyn HostQueryExecutor>,
    localizer: Localizer,
    timeout: Duration,
}

impl SelectionResolver {
    pub fn new(
        executor: Arc<dyn HostQueryExecutor>,
        localizer: Localizer,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            localizer,
            timeout,
        }
    }

    pub async fn resolve(&self) -> SelectionResult {
        let query = self.executor.execute(SELECTION_QUERY);
        let outcome = match tokio::time::timeout(self.timeout, query).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "selection query timed out"
                );
                return Err(self.failure(
                    FailureKind::Timeout,
                    format!("no answer within {} ms", self.timeout.as_millis()),
                    None,
                ));
            }
        };

        match outcome {
            QueryOutcome::Success(raw) => self.validate(&raw),
            QueryOutcome::Failure { diagnostic, code } => {
                let kind = classify_failure(&diagnostic, code);
                warn!(kind = kind.as_str(), ?code, %diagnostic, "selection query failed");
                Err(self.failure(kind, diagnostic, code))
            }
        }
    }

    fn validate(&self, raw: &str) -> SelectionResult {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == MISSING_VALUE {
            return Err(self.failure(
                FailureKind::EmptyResult,
                format!("query returned `{trimmed}`"),
                None,
            ));
        }

        if !trimmed.starts_with('/') {
            return Err(self.failure(
                FailureKind::Unknown,
                format!("query returned a non-absolute path `{trimmed}`"),
                None,
            ));
        }

        debug!(path = trimmed, "selection resolved");
        Ok(ResolvedPath(trimmed.to_string()))
    }

    fn failure(
        &self,
        kind: FailureKind,
        diagnostic: String,
        code: Option<i64>,
    ) -> SelectionFailure {
        SelectionFailure {
            kind,
            diagnostic,
            code,
            remediation: self.localizer.text(kind.message_key()).to_string(),
        }
    }
}
