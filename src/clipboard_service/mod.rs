use std::{
    io::Write,
    process::{Command, Stdio},
};

use tracing::debug;

pub trait ClipboardSink: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), String>;
}

/// System pasteboard, written through `pbcopy`.
#[derive(Debug, Clone)]
pub struct PasteboardClipboard {
    program: String,
}

impl Default for PasteboardClipboard {
    fn default() -> Self {
        Self {
            program: "pbcopy".to_string(),
        }
    }
}

impl PasteboardClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ClipboardSink for PasteboardClipboard {
    fn write_text(&self, text: &str) -> Result<(), String> {
        pipe_text_to(&self.program, text)?;
        debug!(chars = text.chars().count(), "clipboard updated");
        Ok(())
    }
}

fn pipe_text_to(program: &str, text: &str) -> Result<(), String> {
    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|error| format!("Failed to start {program}: {error}"))?;

    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| format!("Failed to open {program} stdin"))?;
        stdin
            .write_all(text.as_bytes())
            .map_err(|error| format!("Failed writing text to {program}: {error}"))?;
    }

    let status = child
        .wait()
        .map_err(|error| format!("Failed waiting for {program}: {error}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("{program} exited with status: {status}"))
    }
}
