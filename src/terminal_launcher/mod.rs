use tracing::debug;

use crate::selection_resolver::osascript::{escape_for_applescript, run_script_blocking};

pub trait TerminalLauncher: Send + Sync {
    /// Opens a new shell session whose working directory is `path`.
    fn open_at(&self, path: &str) -> Result<(), String>;
}

/// Terminal.app, driven over AppleScript.
#[derive(Debug, Clone, Default)]
pub struct TerminalAppLauncher;

impl TerminalAppLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl TerminalLauncher for TerminalAppLauncher {
    fn open_at(&self, path: &str) -> Result<(), String> {
        let script = terminal_script(path);
        run_script_blocking(&script)
            .map_err(|error| format!("Failed to open Terminal at {path}: {error}"))?;
        debug!(path, "terminal opened");
        Ok(())
    }
}

/// Wraps `value` in single quotes for a POSIX shell; each embedded `'`
/// becomes `'\''`.
pub fn shell_single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn terminal_script(path: &str) -> String {
    let command = format!("cd {}", shell_single_quote(path));
    format!(
        "tell application \"Terminal\"\n    activate\n    do script \"{}\"\nend tell",
        escape_for_applescript(&command)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_paths() {
        assert_eq!(shell_single_quote("/Users/x/My Files"), "'/Users/x/My Files'");
    }

    #[test]
    fn quotes_embedded_single_quotes() {
        assert_eq!(shell_single_quote("/tmp/o'neil"), r"'/tmp/o'\''neil'");
    }

    #[test]
    fn script_changes_directory_in_a_new_terminal_session() {
        assert_eq!(
            terminal_script("/Users/x/Documents"),
            "tell application \"Terminal\"\n    activate\n    do script \"cd '/Users/x/Documents'\"\nend tell"
        );
    }

    #[test]
    fn script_escapes_shell_quoting_for_applescript() {
        let script = terminal_script("/tmp/o'neil \"q\"");

        assert!(
            script.contains(r#"do script "cd '/tmp/o'\\''neil \"q\"'""#),
            "{script}"
        );
    }
}
