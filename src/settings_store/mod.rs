use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    action_dispatcher::Action,
    localization::Language,
    preference_store::write_atomic_file,
    recent_paths::{clamp_max_recent_paths, DEFAULT_MAX_RECENT_PATHS},
    selection_resolver::{DEFAULT_QUERY_TIMEOUT_MS, MAX_QUERY_TIMEOUT_MS, MIN_QUERY_TIMEOUT_MS},
    shortcut_registry::ModifierMatch,
};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub show_notifications: bool,
    pub launch_at_login: bool,
    pub app_language: Language,
    pub quick_toggle: bool,
    pub quick_toggle_action: Action,
    pub enable_debug_mode: bool,
    pub log_level: String,
    pub max_recent_paths: usize,
    pub modifier_match: ModifierMatch,
    pub query_timeout_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            show_notifications: true,
            launch_at_login: false,
            app_language: Language::English,
            quick_toggle: false,
            quick_toggle_action: Action::CopyPath,
            enable_debug_mode: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_recent_paths: DEFAULT_MAX_RECENT_PATHS,
            modifier_match: ModifierMatch::Exact,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

impl AppSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The action bound to the status item, if the quick toggle is on.
    pub fn quick_toggle_target(&self) -> Option<Action> {
        self.quick_toggle.then_some(self.quick_toggle_action)
    }

    fn normalized(mut self) -> Result<Self, String> {
        self.log_level = normalize_log_level(self.log_level)?;
        self.max_recent_paths = clamp_max_recent_paths(self.max_recent_paths);
        self.query_timeout_ms = self
            .query_timeout_ms
            .clamp(MIN_QUERY_TIMEOUT_MS, MAX_QUERY_TIMEOUT_MS);

        Ok(self)
    }

    fn with_update(mut self, update: AppSettingsUpdate) -> Result<Self, String> {
        if let Some(show_notifications) = update.show_notifications {
            self.show_notifications = show_notifications;
        }

        if let Some(launch_at_login) = update.launch_at_login {
            self.launch_at_login = launch_at_login;
        }

        if let Some(app_language) = update.app_language {
            self.app_language = app_language;
        }

        if let Some(quick_toggle) = update.quick_toggle {
            self.quick_toggle = quick_toggle;
        }

        if let Some(quick_toggle_action) = update.quick_toggle_action {
            self.quick_toggle_action = quick_toggle_action;
        }

        if let Some(enable_debug_mode) = update.enable_debug_mode {
            self.enable_debug_mode = enable_debug_mode;
        }

        if let Some(log_level) = update.log_level {
            self.log_level = log_level;
        }

        if let Some(max_recent_paths) = update.max_recent_paths {
            self.max_recent_paths = max_recent_paths;
        }

        if let Some(modifier_match) = update.modifier_match {
            self.modifier_match = modifier_match;
        }

        if let Some(query_timeout_ms) = update.query_timeout_ms {
            self.query_timeout_ms = query_timeout_ms;
        }

        self.normalized()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSettingsUpdate {
    pub show_notifications: Option<bool>,
    pub launch_at_login: Option<bool>,
    pub app_language: Option<Language>,
    pub quick_toggle: Option<bool>,
    pub quick_toggle_action: Option<Action>,
    pub enable_debug_mode: Option<bool>,
    pub log_level: Option<String>,
    pub max_recent_paths: Option<usize>,
    pub modifier_match: Option<ModifierMatch>,
    pub query_timeout_ms: Option<u64>,
}

impl AppSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.show_notifications.is_none()
            && self.launch_at_login.is_none()
            && self.app_language.is_none()
            && self.quick_toggle.is_none()
            && self.quick_toggle_action.is_none()
            && self.enable_debug_mode.is_none()
            && self.log_level.is_none()
            && self.max_recent_paths.is_none()
            && self.modifier_match.is_none()
            && self.query_timeout_ms.is_none()
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    settings_path: PathBuf,
    io_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(settings_path: PathBuf) -> Self {
        debug!(path = %settings_path.display(), "settings store initialized");
        Self {
            settings_path,
            io_lock: Mutex::new(()),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SETTINGS_FILE_NAME))
    }

    pub fn load(&self) -> Result<AppSettings, String> {
        debug!(path = %self.settings_path.display(), "loading settings from disk");
        let _io_guard = self.io_lock.lock().map_err(|_| io_lock_error())?;
        read_settings_file_with_recovery(&self.settings_path)
    }

    pub fn update(&self, update: AppSettingsUpdate) -> Result<AppSettings, String> {
        debug!(path = %self.settings_path.display(), "updating settings on disk");
        let _io_guard = self.io_lock.lock().map_err(|_| io_lock_error())?;
        let current_settings = read_settings_file_with_recovery(&self.settings_path)?;
        let updated_settings = current_settings.with_update(update)?;
        write_settings_file(&self.settings_path, &updated_settings)?;
        Ok(updated_settings)
    }

    /// Overwrites the settings file with the defaults. A malformed file is
    /// replaced without a backup.
    pub fn reset(&self) -> Result<AppSettings, String> {
        info!(path = %self.settings_path.display(), "resetting settings to defaults");
        let _io_guard = self.io_lock.lock().map_err(|_| io_lock_error())?;
        let defaults = AppSettings::default();
        write_settings_file(&self.settings_path, &defaults)?;
        Ok(defaults)
    }
}

#[derive(Debug)]
struct SettingsReadError {
    message: String,
    recoverable: bool,
}

impl SettingsReadError {
    fn read(message: String) -> Self {
        Self {
            message,
            recoverable: false,
        }
    }

    fn malformed(message: String) -> Self {
        Self {
            message,
            recoverable: true,
        }
    }
}

fn read_settings_file_with_recovery(settings_path: &Path) -> Result<AppSettings, String> {
    match read_settings_file(settings_path) {
        Ok(settings) => Ok(settings),
        Err(error) if error.recoverable => {
            let backup_path = backup_corrupt_settings_file(settings_path)?;
            let defaults = AppSettings::default();
            write_settings_file(settings_path, &defaults)?;
            warn!(
                path = %settings_path.display(),
                backup = %backup_path.display(),
                reason = %error.message,
                "recovered malformed settings file"
            );
            Ok(defaults)
        }
        Err(error) => Err(error.message),
    }
}

fn read_settings_file(settings_path: &Path) -> Result<AppSettings, SettingsReadError> {
    if !settings_path.exists() {
        info!(path = %settings_path.display(), "settings file missing; using defaults");
        return Ok(AppSettings::default());
    }

    let file_contents = fs::read_to_string(settings_path)
        .map_err(|error| {
            format!(
                "Failed to read settings file `{}`: {error}",
                settings_path.display()
            )
        })
        .map_err(SettingsReadError::read)?;

    let parsed = serde_json::from_str::<AppSettings>(&file_contents).map_err(|error| {
        SettingsReadError::malformed(format!(
            "Failed to parse settings file `{}`: {error}",
            settings_path.display()
        ))
    })?;

    parsed.normalized().map_err(|error| {
        SettingsReadError::malformed(format!(
            "Failed to validate settings file `{}`: {error}",
            settings_path.display()
        ))
    })
}

fn write_settings_file(settings_path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent_dir) = settings_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create settings directory `{}`: {error}",
                parent_dir.display()
            )
        })?;
    }

    let serialized = serde_json::to_vec_pretty(settings)
        .map_err(|error| format!("Failed to serialize settings: {error}"))?;
    write_atomic_file(settings_path, &serialized).map_err(|error| error.to_string())?;

    info!(
        path = %settings_path.display(),
        language = %settings.app_language,
        notifications = settings.show_notifications,
        "settings file written"
    );
    Ok(())
}

fn backup_corrupt_settings_file(settings_path: &Path) -> Result<PathBuf, String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = settings_path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(SETTINGS_FILE_NAME);
    let backup_path = settings_path.with_file_name(format!(
        "{file_name}.corrupt-{}-{timestamp}.bak",
        std::process::id()
    ));

    fs::rename(settings_path, &backup_path).map_err(|error| {
        format!(
            "Failed to backup malformed settings file `{}` to `{}`: {error}",
            settings_path.display(),
            backup_path.display()
        )
    })?;

    Ok(backup_path)
}

fn normalize_log_level(value: String) -> Result<String, String> {
    let normalized = value.trim().to_lowercase();
    if LOG_LEVELS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(format!(
            "Unsupported log level `{normalized}`. Expected one of {}",
            LOG_LEVELS.join(", ")
        ))
    }
}

fn io_lock_error() -> String {
    "Settings store IO lock was poisoned".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_settings_path(prefix: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("pathbar-settings-store-{prefix}-{timestamp}"))
            .join(SETTINGS_FILE_NAME)
    }

    fn cleanup_settings_path(path: &Path) {
        if let Some(parent_dir) = path.parent() {
            let _ = fs::remove_dir_all(parent_dir);
        }
    }

    fn write_raw_settings(settings_path: &Path, contents: &str) {
        if let Some(parent_dir) = settings_path.parent() {
            fs::create_dir_all(parent_dir).expect("test directory should be created");
        }
        fs::write(settings_path, contents).expect("raw settings should be written");
    }

    fn corrupt_backup_paths(settings_path: &Path) -> Vec<PathBuf> {
        let Some(parent_dir) = settings_path.parent() else {
            return Vec::new();
        };
        let Some(file_name) = settings_path.file_name().and_then(|name| name.to_str()) else {
            return Vec::new();
        };

        let mut backups = Vec::new();
        if let Ok(entries) = fs::read_dir(parent_dir) {
            for entry in entries.flatten() {
                if let Some(candidate) = entry.file_name().to_str() {
                    if candidate.starts_with(&format!("{file_name}.corrupt-"))
                        && candidate.ends_with(".bak")
                    {
                        backups.push(entry.path());
                    }
                }
            }
        }

        backups
    }

    #[test]
    fn defaults_match_expected_schema() {
        let defaults = AppSettings::default();

        assert!(defaults.show_notifications);
        assert!(!defaults.launch_at_login);
        assert_eq!(defaults.app_language, Language::English);
        assert!(!defaults.quick_toggle);
        assert_eq!(defaults.quick_toggle_action, Action::CopyPath);
        assert!(!defaults.enable_debug_mode);
        assert_eq!(defaults.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(defaults.max_recent_paths, 10);
        assert_eq!(defaults.modifier_match, ModifierMatch::Exact);
        assert_eq!(defaults.query_timeout(), Duration::from_millis(3_000));
        assert_eq!(defaults.quick_toggle_target(), None);
    }

    #[test]
    fn serialized_field_values_use_stable_names() {
        let settings = AppSettings {
            app_language: Language::ChineseSimplified,
            quick_toggle_action: Action::OpenAtPathInTerminal,
            modifier_match: ModifierMatch::Superset,
            ..AppSettings::default()
        };

        let value = serde_json::to_value(&settings).expect("settings should serialize");

        assert_eq!(value["app_language"], "zh-Hans");
        assert_eq!(value["quick_toggle_action"], "open_in_terminal");
        assert_eq!(value["modifier_match"], "superset");
    }

    #[test]
    fn load_uses_defaults_when_settings_file_is_missing() {
        let settings_path = unique_settings_path("missing");
        let store = SettingsStore::new(settings_path.clone());

        let loaded = store
            .load()
            .expect("loading missing settings should succeed");

        assert_eq!(loaded, AppSettings::default());
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn load_backfills_fields_missing_from_older_settings_files() {
        let settings_path = unique_settings_path("legacy");
        write_raw_settings(
            &settings_path,
            r#"{ "show_notifications": false, "app_language": "zh-Hans" }"#,
        );
        let store = SettingsStore::new(settings_path.clone());

        let loaded = store.load().expect("legacy settings should load");

        assert!(!loaded.show_notifications);
        assert_eq!(loaded.app_language, Language::ChineseSimplified);
        assert_eq!(loaded.max_recent_paths, 10);
        assert_eq!(loaded.modifier_match, ModifierMatch::Exact);
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_persists_settings_to_disk() {
        let settings_path = unique_settings_path("persist");
        let store = SettingsStore::new(settings_path.clone());

        let updated = store
            .update(AppSettingsUpdate {
                show_notifications: Some(false),
                launch_at_login: Some(true),
                app_language: Some(Language::ChineseSimplified),
                quick_toggle: Some(true),
                quick_toggle_action: Some(Action::CopyFileName),
                enable_debug_mode: Some(true),
                log_level: Some(" DEBUG ".to_string()),
                max_recent_paths: Some(20),
                modifier_match: Some(ModifierMatch::Superset),
                query_timeout_ms: Some(1_500),
            })
            .expect("update should succeed");

        let reloaded = read_settings_file(&settings_path).expect("reloading persisted settings");

        assert!(!updated.show_notifications);
        assert!(updated.launch_at_login);
        assert_eq!(updated.log_level, "debug");
        assert_eq!(updated.quick_toggle_target(), Some(Action::CopyFileName));
        assert_eq!(updated.max_recent_paths, 20);
        assert_eq!(updated.query_timeout_ms, 1_500);
        assert_eq!(reloaded, updated);

        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_clamps_numeric_limits() {
        let settings_path = unique_settings_path("clamp");
        let store = SettingsStore::new(settings_path.clone());

        let updated = store
            .update(AppSettingsUpdate {
                max_recent_paths: Some(1_000),
                query_timeout_ms: Some(1),
                ..AppSettingsUpdate::default()
            })
            .expect("update should succeed");

        assert_eq!(updated.max_recent_paths, 50);
        assert_eq!(updated.query_timeout_ms, MIN_QUERY_TIMEOUT_MS);
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_rejects_invalid_log_level() {
        let settings_path = unique_settings_path("invalid-level");
        let store = SettingsStore::new(settings_path.clone());

        let error = store
            .update(AppSettingsUpdate {
                log_level: Some("verbose".to_string()),
                ..AppSettingsUpdate::default()
            })
            .expect_err("invalid log level should fail");

        assert!(error.contains("Unsupported log level"));
        assert!(!settings_path.exists());
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn load_recovers_from_malformed_json_by_backing_up_and_resetting_defaults() {
        let settings_path = unique_settings_path("malformed");
        write_raw_settings(&settings_path, "{ definitely not json");
        let store = SettingsStore::new(settings_path.clone());

        let recovered = store
            .load()
            .expect("malformed settings should be recovered");

        assert_eq!(recovered, AppSettings::default());
        assert_eq!(
            read_settings_file(&settings_path).expect("recovered settings file should be readable"),
            AppSettings::default()
        );
        assert_eq!(corrupt_backup_paths(&settings_path).len(), 1);

        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn load_recovers_from_unknown_enum_values() {
        let settings_path = unique_settings_path("bad-language");
        write_raw_settings(&settings_path, r#"{ "app_language": "fr" }"#);
        let store = SettingsStore::new(settings_path.clone());

        let recovered = store.load().expect("invalid value should be recovered");

        assert_eq!(recovered.app_language, Language::English);
        assert_eq!(corrupt_backup_paths(&settings_path).len(), 1);
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_recovers_from_malformed_json_before_applying_changes() {
        let settings_path = unique_settings_path("malformed-update");
        write_raw_settings(&settings_path, "{ broken ");
        let store = SettingsStore::new(settings_path.clone());

        let updated = store
            .update(AppSettingsUpdate {
                quick_toggle: Some(true),
                ..AppSettingsUpdate::default()
            })
            .expect("update should recover malformed settings");

        assert!(updated.quick_toggle);
        assert!(updated.show_notifications);
        assert_eq!(corrupt_backup_paths(&settings_path).len(), 1);
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn reset_restores_defaults_on_disk() {
        let settings_path = unique_settings_path("reset");
        let store = SettingsStore::new(settings_path.clone());
        store
            .update(AppSettingsUpdate {
                show_notifications: Some(false),
                app_language: Some(Language::ChineseSimplified),
                max_recent_paths: Some(30),
                ..AppSettingsUpdate::default()
            })
            .expect("update should succeed");

        let reset = store.reset().expect("reset should succeed");

        assert_eq!(reset, AppSettings::default());
        assert_eq!(
            SettingsStore::new(settings_path.clone())
                .load()
                .expect("reset settings should reload"),
            AppSettings::default()
        );
        cleanup_settings_path(&settings_path);
    }
}
