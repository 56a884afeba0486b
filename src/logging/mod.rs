use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing::info;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, EnvFilter};

use crate::settings_store::AppSettings;

pub const LOG_FILE_NAME: &str = "pathbar.log";
const CRATE_TARGETS: [&str; 2] = ["pathbar_lib", "pathbar"];
const MAX_LOG_FILE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LoggingState {
    log_file_path: Arc<PathBuf>,
}

impl LoggingState {
    pub fn new(log_file_path: PathBuf) -> Self {
        Self {
            log_file_path: Arc::new(log_file_path),
        }
    }

    pub fn log_file_path(&self) -> &Path {
        self.log_file_path.as_ref().as_path()
    }
}

/// Installs the global subscriber: a file layer under `data_dir` plus a
/// stderr layer. `RUST_LOG` overrides the filter derived from settings.
pub fn initialize(data_dir: &Path, settings: &AppSettings) -> Result<LoggingState, String> {
    let log_file_path = log_file_path(data_dir);
    let log_file = open_log_file(&log_file_path)?;
    let writer = SharedLogWriterFactory::new(log_file);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_filter(
            &settings.log_level,
            settings.enable_debug_mode,
        ))
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_writer(writer),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|error| format!("Failed to initialize diagnostics logger: {error}"))?;

    info!(log_file = %log_file_path.display(), "diagnostic logging initialized");
    Ok(LoggingState::new(log_file_path))
}

pub fn export_log_contents(data_dir: &Path) -> Result<String, String> {
    read_log_file(&log_file_path(data_dir))
}

pub fn log_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_FILE_NAME)
}

/// Dependencies log at `warn`; this crate logs at the configured level,
/// raised to `debug` in debug mode.
fn default_filter(log_level: &str, debug_mode: bool) -> String {
    let crate_level = if debug_mode && log_level != "trace" {
        "debug"
    } else {
        log_level
    };

    let mut directives = vec!["warn".to_string()];
    directives.extend(
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={crate_level}")),
    );
    directives.join(",")
}

fn open_log_file(log_file_path: &Path) -> Result<File, String> {
    if let Some(parent_dir) = log_file_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create diagnostics log directory `{}`: {error}",
                parent_dir.display()
            )
        })?;
    }

    cap_log_file_size(log_file_path, MAX_LOG_FILE_BYTES)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|error| {
            format!(
                "Failed to open diagnostics log file `{}`: {error}",
                log_file_path.display()
            )
        })
}

fn cap_log_file_size(log_file_path: &Path, max_bytes: u64) -> Result<(), String> {
    let metadata = match fs::metadata(log_file_path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(format!(
                "Failed to inspect diagnostics log file `{}`: {error}",
                log_file_path.display()
            ))
        }
    };

    if metadata.len() <= max_bytes {
        return Ok(());
    }

    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(log_file_path)
        .map_err(|error| {
            format!(
                "Failed to truncate oversized diagnostics log file `{}`: {error}",
                log_file_path.display()
            )
        })?;

    Ok(())
}

fn read_log_file(log_file_path: &Path) -> Result<String, String> {
    let contents = match fs::read(log_file_path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(error) => {
            return Err(format!(
                "Failed to read diagnostics log file `{}`: {error}",
                log_file_path.display()
            ))
        }
    };

    Ok(String::from_utf8_lossy(&contents).into_owned())
}

#[derive(Debug, Clone)]
struct SharedLogWriterFactory {
    file: Arc<Mutex<File>>,
}

impl SharedLogWriterFactory {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedLogWriterFactory {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriter {
            file: Arc::clone(&self.file),
        }
    }
}

struct SharedLogWriter {
    file: Arc<Mutex<File>>,
}

impl io::Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}
