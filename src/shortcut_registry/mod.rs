pub mod key;
#[cfg(target_os = "macos")]
pub mod macos_event_tap;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::preference_store::{PreferenceStore, StoreError};

pub use key::{Key, KeyEvent, KeyPhase, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingId {
    CopyPath,
    OpenTerminal,
}

impl BindingId {
    pub const ALL: [BindingId; 2] = [BindingId::CopyPath, BindingId::OpenTerminal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CopyPath => "copy_path",
            Self::OpenTerminal => "open_terminal",
        }
    }

    pub fn storage_key(self) -> &'static str {
        match self {
            Self::CopyPath => "CopyPathShortcut",
            Self::OpenTerminal => "OpenTerminalShortcut",
        }
    }

    pub fn default_shortcut(self) -> Shortcut {
        let modifiers = Modifiers::COMMAND | Modifiers::SHIFT;
        match self {
            Self::CopyPath => Shortcut::unchecked(Key::C, modifiers),
            Self::OpenTerminal => Shortcut::unchecked(Key::T, modifiers),
        }
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the held modifiers of an event are compared with a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierMatch {
    /// Designated modifiers held must equal the binding's exactly.
    #[default]
    Exact,
    /// Designated modifiers held must include the binding's.
    Superset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureRejection {
    #[error("a shortcut needs Command, Control or Option")]
    MissingModifier,
    #[error("a modifier key cannot be the shortcut key")]
    ModifierKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("`{0}` is not recording a shortcut")]
    NotRecording(BindingId),
    #[error(transparent)]
    Rejected(#[from] CaptureRejection),
}

/// A validated (key, modifier set) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shortcut {
    key: Key,
    modifiers: Modifiers,
}

impl Shortcut {
    pub fn new(key: Key, modifiers: Modifiers) -> Result<Self, CaptureRejection> {
        if key.is_modifier() {
            return Err(CaptureRejection::ModifierKey);
        }

        if !modifiers.has_qualifying() {
            return Err(CaptureRejection::MissingModifier);
        }

        Ok(Self::unchecked(key, modifiers))
    }

    pub fn from_event(event: &KeyEvent) -> Result<Self, CaptureRejection> {
        Self::new(event.key, event.modifiers)
    }

    const fn unchecked(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key,
            modifiers: modifiers.intersection(Modifiers::DESIGNATED),
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn matches(&self, event: &KeyEvent, mode: ModifierMatch) -> bool {
        if event.key != self.key {
            return false;
        }

        let held = event.modifiers.designated();
        match mode {
            ModifierMatch::Exact => held == self.modifiers,
            ModifierMatch::Superset => held.contains(self.modifiers),
        }
    }

    fn to_stored(self) -> StoredShortcut {
        StoredShortcut(i64::from(self.key.code()), self.modifiers.bits())
    }

    fn from_stored(stored: StoredShortcut) -> Result<Self, String> {
        let StoredShortcut(key_code, modifier_bits) = stored;
        let key_code = u16::try_from(key_code)
            .map_err(|_| format!("key identifier {key_code} is out of range"))?;

        Self::new(
            Key::from_code(key_code),
            Modifiers::from_bits_truncate(modifier_bits),
        )
        .map_err(|rejection| rejection.to_string())
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.modifiers.symbols(), self.key)
    }
}

/// Persisted form: `[keyIdentifier, modifierBitmask]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct StoredShortcut(i64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug)]
struct RegistryRuntimeState {
    bindings: BTreeMap<BindingId, Shortcut>,
    recording: Option<BindingId>,
}

impl Default for RegistryRuntimeState {
    fn default() -> Self {
        Self {
            bindings: BindingId::ALL
                .into_iter()
                .map(|id| (id, id.default_shortcut()))
                .collect(),
            recording: None,
        }
    }
}

impl RegistryRuntimeState {
    fn binding(&self, id: BindingId) -> Shortcut {
        self.bindings
            .get(&id)
            .copied()
            .unwrap_or_else(|| id.default_shortcut())
    }

    fn state(&self, id: BindingId) -> RecordingState {
        if self.recording == Some(id) {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    /// Returns the binding whose recording was cancelled to make room.
    fn start_recording(&mut self, id: BindingId) -> Option<BindingId> {
        let cancelled = self.recording.filter(|current| *current != id);
        self.recording = Some(id);
        cancelled
    }

    fn cancel_recording(&mut self, id: BindingId) -> bool {
        if self.recording == Some(id) {
            self.recording = None;
            true
        } else {
            false
        }
    }

    fn try_capture(&mut self, id: BindingId, event: &KeyEvent) -> Result<Shortcut, CaptureError> {
        if self.recording != Some(id) {
            return Err(CaptureError::NotRecording(id));
        }

        let shortcut = Shortcut::from_event(event)?;
        self.bindings.insert(id, shortcut);
        self.recording = None;
        Ok(shortcut)
    }

    fn match_event(&self, event: &KeyEvent, mode: ModifierMatch) -> Option<BindingId> {
        self.bindings
            .iter()
            .filter(|(id, _)| self.recording != Some(**id))
            .find(|(_, shortcut)| shortcut.matches(event, mode))
            .map(|(id, _)| *id)
    }
}

/// Owns the shortcut bindings and the single recording slot.
pub struct ShortcutRegistry {
    state: Mutex<RegistryRuntimeState>,
    store: Arc<dyn PreferenceStore>,
    modifier_match: ModifierMatch,
}

impl fmt::Debug for ShortcutRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortcutRegistry")
            .field("state", &self.state)
            .field("modifier_match", &self.modifier_match)
            .finish_non_exhaustive()
    }
}

impl ShortcutRegistry {
    /// Creates a registry holding the built-in defaults. Call [`Self::load`]
    /// to restore persisted bindings.
    pub fn new(store: Arc<dyn PreferenceStore>, modifier_match: ModifierMatch) -> Self {
        Self {
            state: Mutex::new(RegistryRuntimeState::default()),
            store,
            modifier_match,
        }
    }

    pub fn open(store: Arc<dyn PreferenceStore>, modifier_match: ModifierMatch) -> Self {
        let registry = Self::new(store, modifier_match);
        registry.load();
        registry
    }

    /// Restores every binding from the store. Entries that are missing or
    /// unreadable fall back to their defaults independently.
    pub fn load(&self) {
        let loaded: Vec<(BindingId, Shortcut)> = BindingId::ALL
            .into_iter()
            .map(|id| (id, self.load_binding(id)))
            .collect();

        let Ok(mut state) = self.state.lock() else {
            warn!("shortcut registry lock was poisoned; keeping current bindings");
            return;
        };
        for (id, shortcut) in loaded {
            state.bindings.insert(id, shortcut);
        }
        debug!(bindings = ?state.bindings, "shortcut bindings loaded");
    }

    /// Writes every binding to the store.
    pub fn persist(&self) -> Result<(), StoreError> {
        for (id, shortcut) in self.bindings() {
            self.persist_binding(id, shortcut)?;
        }
        Ok(())
    }

    pub fn binding(&self, id: BindingId) -> Shortcut {
        self.state
            .lock()
            .map(|state| state.binding(id))
            .unwrap_or_else(|_| id.default_shortcut())
    }

    pub fn bindings(&self) -> Vec<(BindingId, Shortcut)> {
        BindingId::ALL
            .into_iter()
            .map(|id| (id, self.binding(id)))
            .collect()
    }

    pub fn state(&self, id: BindingId) -> RecordingState {
        self.state
            .lock()
            .map(|state| state.state(id))
            .unwrap_or(RecordingState::Idle)
    }

    pub fn recording_binding(&self) -> Option<BindingId> {
        self.state.lock().ok().and_then(|state| state.recording)
    }

    pub fn start_recording(&self, id: BindingId) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if let Some(cancelled) = state.start_recording(id) {
            debug!(binding = %cancelled, "cancelled shortcut recording to start another");
        }
        debug!(binding = %id, "shortcut recording started");
    }

    pub fn cancel_recording(&self, id: BindingId) {
        if let Ok(mut state) = self.state.lock() {
            if state.cancel_recording(id) {
                debug!(binding = %id, "shortcut recording cancelled");
            }
        }
    }

    /// Offers a key event to the recording binding `id`. On success the new
    /// shortcut has been written to the store before this returns.
    pub fn try_capture(&self, id: BindingId, event: &KeyEvent) -> Result<Shortcut, CaptureError> {
        let shortcut = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| CaptureError::NotRecording(id))?;
            state.try_capture(id, event)?
        };

        info!(binding = %id, shortcut = %shortcut, "shortcut recorded");
        self.persist_or_warn(id, shortcut);
        Ok(shortcut)
    }

    pub fn match_event(&self, event: &KeyEvent) -> Option<BindingId> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.match_event(event, self.modifier_match))
    }

    pub fn reset(&self, id: BindingId) -> Shortcut {
        let shortcut = self.restore_default(id);
        self.persist_or_warn(id, shortcut);
        shortcut
    }

    /// Restores every default, then writes all bindings in one pass.
    pub fn reset_all(&self) -> Result<(), StoreError> {
        for id in BindingId::ALL {
            self.restore_default(id);
        }
        self.persist()
    }

    fn restore_default(&self, id: BindingId) -> Shortcut {
        let shortcut = id.default_shortcut();
        if let Ok(mut state) = self.state.lock() {
            state.cancel_recording(id);
            state.bindings.insert(id, shortcut);
        }

        info!(binding = %id, shortcut = %shortcut, "shortcut reset to default");
        shortcut
    }

    fn load_binding(&self, id: BindingId) -> Shortcut {
        let bytes = match self.store.get(id.storage_key()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return id.default_shortcut(),
            Err(error) => {
                warn!(binding = %id, %error, "failed to read shortcut; using default");
                return id.default_shortcut();
            }
        };

        let decoded = serde_json::from_slice::<StoredShortcut>(&bytes)
            .map_err(|error| error.to_string())
            .and_then(Shortcut::from_stored);

        match decoded {
            Ok(shortcut) => shortcut,
            Err(reason) => {
                warn!(binding = %id, %reason, "stored shortcut is invalid; using default");
                id.default_shortcut()
            }
        }
    }

    fn persist_binding(&self, id: BindingId, shortcut: Shortcut) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec(&shortcut.to_stored())?;
        self.store.set(id.storage_key(), &serialized)
    }

    fn persist_or_warn(&self, id: BindingId, shortcut: Shortcut) {
        if let Err(error) = self.persist_binding(id, shortcut) {
            warn!(binding = %id, %error, "failed to persist shortcut");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::preference_store::MemoryPreferenceStore;

    use super::*;

    fn registry_with_store() -> (ShortcutRegistry, Arc<MemoryPreferenceStore>) {
        let store = Arc::new(MemoryPreferenceStore::new());
        let registry = ShortcutRegistry::open(store.clone(), ModifierMatch::Exact);
        (registry, store)
    }

    fn command_option(key: Key) -> KeyEvent {
        KeyEvent::key_down(key, Modifiers::COMMAND | Modifiers::OPTION)
    }

    #[test]
    fn defaults_are_command_shift_c_and_t() {
        let (registry, _) = registry_with_store();

        let copy_path = registry.binding(BindingId::CopyPath);
        assert_eq!(copy_path.key(), Key::C);
        assert_eq!(copy_path.modifiers(), Modifiers::COMMAND | Modifiers::SHIFT);
        assert_eq!(copy_path.to_string(), "⌘⇧C");
        assert_eq!(registry.binding(BindingId::OpenTerminal).to_string(), "⌘⇧T");
    }

    #[test]
    fn capture_updates_binding_persists_and_returns_to_idle() {
        let (registry, store) = registry_with_store();
        let event = command_option(Key::P);

        registry.start_recording(BindingId::CopyPath);
        assert_eq!(
            registry.state(BindingId::CopyPath),
            RecordingState::Recording
        );

        let captured = registry
            .try_capture(BindingId::CopyPath, &event)
            .expect("capture should succeed");

        assert_eq!(captured.key(), Key::P);
        assert_eq!(registry.state(BindingId::CopyPath), RecordingState::Idle);
        assert_eq!(registry.match_event(&event), Some(BindingId::CopyPath));

        let stored = store
            .get("CopyPathShortcut")
            .expect("store read should succeed")
            .expect("binding should be persisted");
        let expected_bits = (Modifiers::COMMAND | Modifiers::OPTION).bits();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&stored).expect("valid json"),
            serde_json::json!([0x23, expected_bits])
        );
    }

    #[test]
    fn capture_without_qualifying_modifier_is_rejected_and_keeps_recording() {
        let (registry, _) = registry_with_store();
        registry.start_recording(BindingId::OpenTerminal);

        for modifiers in [Modifiers::empty(), Modifiers::SHIFT, Modifiers::CAPS_LOCK] {
            let result = registry.try_capture(
                BindingId::OpenTerminal,
                &KeyEvent::key_down(Key::K, modifiers),
            );
            assert_eq!(
                result,
                Err(CaptureError::Rejected(CaptureRejection::MissingModifier))
            );
        }

        assert_eq!(
            registry.state(BindingId::OpenTerminal),
            RecordingState::Recording
        );
        assert_eq!(registry.binding(BindingId::OpenTerminal).key(), Key::T);
    }

    #[test]
    fn capture_of_bare_modifier_key_is_rejected() {
        let (registry, _) = registry_with_store();
        registry.start_recording(BindingId::CopyPath);

        let result = registry.try_capture(
            BindingId::CopyPath,
            &KeyEvent::key_down(Key::Shift, Modifiers::COMMAND | Modifiers::SHIFT),
        );

        assert_eq!(
            result,
            Err(CaptureError::Rejected(CaptureRejection::ModifierKey))
        );
        assert_eq!(
            registry.state(BindingId::CopyPath),
            RecordingState::Recording
        );
    }

    #[test]
    fn capture_stores_shift_but_drops_non_designated_flags() {
        let (registry, _) = registry_with_store();
        registry.start_recording(BindingId::CopyPath);

        let captured = registry
            .try_capture(
                BindingId::CopyPath,
                &KeyEvent::key_down(
                    Key::Y,
                    Modifiers::CONTROL | Modifiers::SHIFT | Modifiers::CAPS_LOCK,
                ),
            )
            .expect("capture should succeed");

        assert_eq!(captured.modifiers(), Modifiers::CONTROL | Modifiers::SHIFT);
    }

    #[test]
    fn starting_a_second_recording_cancels_the_first() {
        let (registry, _) = registry_with_store();

        registry.start_recording(BindingId::CopyPath);
        registry.start_recording(BindingId::OpenTerminal);

        assert_eq!(registry.state(BindingId::CopyPath), RecordingState::Idle);
        assert_eq!(
            registry.recording_binding(),
            Some(BindingId::OpenTerminal)
        );
        assert_eq!(
            registry.try_capture(BindingId::CopyPath, &command_option(Key::J)),
            Err(CaptureError::NotRecording(BindingId::CopyPath))
        );
        assert_eq!(registry.binding(BindingId::CopyPath).key(), Key::C);
    }

    #[test]
    fn start_recording_is_idempotent_for_the_same_binding() {
        let mut state = RegistryRuntimeState::default();

        assert_eq!(state.start_recording(BindingId::CopyPath), None);
        assert_eq!(state.start_recording(BindingId::CopyPath), None);
        assert_eq!(
            state.start_recording(BindingId::OpenTerminal),
            Some(BindingId::CopyPath)
        );
    }

    #[test]
    fn cancel_leaves_binding_untouched_and_is_noop_when_idle() {
        let (registry, _) = registry_with_store();

        registry.cancel_recording(BindingId::CopyPath);
        assert_eq!(registry.state(BindingId::CopyPath), RecordingState::Idle);

        registry.start_recording(BindingId::CopyPath);
        registry.cancel_recording(BindingId::CopyPath);

        assert_eq!(registry.state(BindingId::CopyPath), RecordingState::Idle);
        assert_eq!(
            registry.binding(BindingId::CopyPath),
            BindingId::CopyPath.default_shortcut()
        );
    }

    #[test]
    fn exact_matching_ignores_caps_lock_but_not_extra_designated_modifiers() {
        let (registry, _) = registry_with_store();
        let base = Modifiers::COMMAND | Modifiers::SHIFT;

        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::C, base | Modifiers::CAPS_LOCK)),
            Some(BindingId::CopyPath)
        );
        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::C, base | Modifiers::OPTION)),
            None
        );
        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::C, Modifiers::COMMAND)),
            None
        );
        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::T, base)),
            Some(BindingId::OpenTerminal)
        );
    }

    #[test]
    fn superset_matching_accepts_extra_designated_modifiers() {
        let registry = ShortcutRegistry::new(
            Arc::new(MemoryPreferenceStore::new()),
            ModifierMatch::Superset,
        );
        let held = Modifiers::COMMAND | Modifiers::SHIFT | Modifiers::OPTION;

        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::C, held)),
            Some(BindingId::CopyPath)
        );
        assert_eq!(
            registry.match_event(&KeyEvent::key_down(Key::C, Modifiers::COMMAND)),
            None
        );
    }

    #[test]
    fn recording_binding_does_not_match() {
        let (registry, _) = registry_with_store();
        let event = KeyEvent::key_down(Key::C, Modifiers::COMMAND | Modifiers::SHIFT);

        registry.start_recording(BindingId::CopyPath);

        assert_eq!(registry.match_event(&event), None);
    }

    #[test]
    fn persisted_binding_round_trips_through_a_fresh_registry() {
        let (registry, store) = registry_with_store();
        let event = KeyEvent::key_down(Key::F5, Modifiers::CONTROL | Modifiers::OPTION);

        registry.start_recording(BindingId::OpenTerminal);
        let captured = registry
            .try_capture(BindingId::OpenTerminal, &event)
            .expect("capture should succeed");

        let reloaded = ShortcutRegistry::open(store, ModifierMatch::Exact);

        assert_eq!(reloaded.binding(BindingId::OpenTerminal), captured);
        assert_eq!(
            reloaded.binding(BindingId::CopyPath),
            BindingId::CopyPath.default_shortcut()
        );
    }

    #[test]
    fn malformed_or_invalid_entries_fall_back_per_binding() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store
            .set("CopyPathShortcut", b"{ not json")
            .expect("seed write should succeed");
        store
            .set(
                "OpenTerminalShortcut",
                serde_json::to_vec(&serde_json::json!([0x31, Modifiers::SHIFT.bits()]))
                    .expect("seed should serialize")
                    .as_slice(),
            )
            .expect("seed write should succeed");

        let registry = ShortcutRegistry::open(store.clone(), ModifierMatch::Exact);

        assert_eq!(
            registry.binding(BindingId::CopyPath),
            BindingId::CopyPath.default_shortcut()
        );
        assert_eq!(
            registry.binding(BindingId::OpenTerminal),
            BindingId::OpenTerminal.default_shortcut()
        );
    }

    #[test]
    fn legacy_entries_with_extra_flag_bits_still_load() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let legacy_bits = (Modifiers::COMMAND | Modifiers::CAPS_LOCK).bits() | 0x0100;
        store
            .set(
                "CopyPathShortcut",
                format!("[9,{legacy_bits}]").as_bytes(),
            )
            .expect("seed write should succeed");

        let registry = ShortcutRegistry::open(store, ModifierMatch::Exact);
        let binding = registry.binding(BindingId::CopyPath);

        assert_eq!(binding.key(), Key::V);
        assert_eq!(binding.modifiers(), Modifiers::COMMAND);
    }

    #[test]
    fn reset_restores_default_and_persists_it() {
        let (registry, store) = registry_with_store();
        registry.start_recording(BindingId::CopyPath);
        registry
            .try_capture(BindingId::CopyPath, &command_option(Key::L))
            .expect("capture should succeed");

        registry.reset_all().expect("reset should persist");

        assert_eq!(
            registry.binding(BindingId::CopyPath),
            BindingId::CopyPath.default_shortcut()
        );
        let reloaded = ShortcutRegistry::open(store, ModifierMatch::Exact);
        assert_eq!(
            reloaded.binding(BindingId::CopyPath),
            BindingId::CopyPath.default_shortcut()
        );
    }

    #[test]
    fn persist_writes_every_binding_as_key_and_mask() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let registry = ShortcutRegistry::new(store.clone(), ModifierMatch::Exact);

        registry.persist().expect("persist should succeed");

        let stored = store
            .get("CopyPathShortcut")
            .expect("read should succeed")
            .expect("copy path binding should be stored");
        let (key, mask): (i64, u64) =
            serde_json::from_slice(&stored).expect("stored pair should decode");
        assert_eq!(key, 8);
        assert_eq!(mask, (Modifiers::COMMAND | Modifiers::SHIFT).bits());

        let reloaded = ShortcutRegistry::open(store, ModifierMatch::Exact);
        assert_eq!(reloaded.bindings(), registry.bindings());
    }
}
