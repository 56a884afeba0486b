use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{HostQueryExecutor, QueryOutcome};

/// Runs AppleScript through `osascript -e`. The child is killed when the
/// future is dropped, so an abandoned query does not linger.
#[derive(Debug, Clone, Default)]
pub struct OsascriptExecutor;

impl OsascriptExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostQueryExecutor for OsascriptExecutor {
    async fn execute(&self, script: &str) -> QueryOutcome {
        let output = match Command::new("osascript")
            .arg("-e")
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(error) => {
                return QueryOutcome::Failure {
                    diagnostic: format!("Failed to run osascript: {error}"),
                    code: None,
                }
            }
        };

        if output.status.success() {
            return QueryOutcome::Success(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = parse_error_number(&diagnostic);
        debug!(status = ?output.status.code(), ?code, %diagnostic, "osascript failed");

        QueryOutcome::Failure { diagnostic, code }
    }
}

/// Runs a fire-and-forget script synchronously. Used for side effects that
/// do not need the query timeout.
pub fn run_script_blocking(script: &str) -> Result<String, String> {
    let output = std::process::Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .map_err(|error| format!("Failed to run osascript: {error}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(format!(
            "osascript exited with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Escapes text for a double-quoted AppleScript string literal. Backslashes
/// go first so later replacements are not escaped twice.
pub fn escape_for_applescript(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Extracts the trailing `(-NNNN)` error number osascript appends to its
/// error output.
pub fn parse_error_number(diagnostic: &str) -> Option<i64> {
    let trimmed = diagnostic.trim_end();
    let inner = trimmed.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    inner[open + 1..].trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_error_number() {
        assert_eq!(
            parse_error_number(
                "0:178: execution error: Not authorized to send Apple events to Finder. (-1743)\n"
            ),
            Some(-1743)
        );
        assert_eq!(
            parse_error_number("execution error: Finder got an error: Application isn’t running. (-600)"),
            Some(-600)
        );
    }

    #[test]
    fn escapes_backslashes_before_quotes() {
        assert_eq!(
            escape_for_applescript(r#"say "hi" \ bye"#),
            r#"say \"hi\" \\ bye"#
        );
        assert_eq!(escape_for_applescript("a\nb\r"), "a\\nb\\r");
    }

    #[test]
    fn missing_or_malformed_error_number_is_none() {
        assert_eq!(parse_error_number("something went wrong"), None);
        assert_eq!(parse_error_number("bad (thing)"), None);
        assert_eq!(parse_error_number(""), None);
    }
}
