use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Modifier flags carried by a key event.
    ///
    /// Bit positions follow the macOS event flag layout, so masks persisted by
    /// earlier releases and the raw flags of a `CGEvent` map onto this type
    /// without translation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u64 {
        const CAPS_LOCK = 1 << 16;
        const SHIFT = 1 << 17;
        const CONTROL = 1 << 18;
        const OPTION = 1 << 19;
        const COMMAND = 1 << 20;
        const NUMERIC_PAD = 1 << 21;
        const HELP = 1 << 22;
        const FUNCTION = 1 << 23;
    }
}

impl Modifiers {
    /// Modifiers a binding may store.
    pub const DESIGNATED: Self = Self::COMMAND
        .union(Self::OPTION)
        .union(Self::CONTROL)
        .union(Self::SHIFT);

    /// At least one of these must be held for a key press to become a binding.
    pub const QUALIFYING: Self = Self::COMMAND.union(Self::OPTION).union(Self::CONTROL);

    pub fn designated(self) -> Self {
        self.intersection(Self::DESIGNATED)
    }

    pub fn has_qualifying(self) -> bool {
        self.intersects(Self::QUALIFYING)
    }

    pub fn symbols(self) -> String {
        let mut symbols = String::new();
        if self.contains(Self::COMMAND) {
            symbols.push('⌘');
        }
        if self.contains(Self::OPTION) {
            symbols.push('⌥');
        }
        if self.contains(Self::CONTROL) {
            symbols.push('⌃');
        }
        if self.contains(Self::SHIFT) {
            symbols.push('⇧');
        }
        symbols
    }
}

/// A logical key. Every key has a stable integer identifier used for
/// persistence; unknown identifiers survive as [`Key::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Minus,
    Equal,
    LeftBracket,
    RightBracket,
    Quote,
    Semicolon,
    Backslash,
    Comma,
    Slash,
    Period,
    Grave,
    Return,
    Tab,
    Space,
    Delete,
    Escape,
    ForwardDelete,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Down,
    Up,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    Command,
    RightCommand,
    Shift,
    RightShift,
    Option,
    RightOption,
    Control,
    RightControl,
    CapsLock,
    Function,
    Other(u16),
}

const KEY_TABLE: &[(Key, u16, &str)] = &[
    (Key::A, 0x00, "A"),
    (Key::S, 0x01, "S"),
    (Key::D, 0x02, "D"),
    (Key::F, 0x03, "F"),
    (Key::H, 0x04, "H"),
    (Key::G, 0x05, "G"),
    (Key::Z, 0x06, "Z"),
    (Key::X, 0x07, "X"),
    (Key::C, 0x08, "C"),
    (Key::V, 0x09, "V"),
    (Key::B, 0x0B, "B"),
    (Key::Q, 0x0C, "Q"),
    (Key::W, 0x0D, "W"),
    (Key::E, 0x0E, "E"),
    (Key::R, 0x0F, "R"),
    (Key::Y, 0x10, "Y"),
    (Key::T, 0x11, "T"),
    (Key::Digit1, 0x12, "1"),
    (Key::Digit2, 0x13, "2"),
    (Key::Digit3, 0x14, "3"),
    (Key::Digit4, 0x15, "4"),
    (Key::Digit6, 0x16, "6"),
    (Key::Digit5, 0x17, "5"),
    (Key::Equal, 0x18, "="),
    (Key::Digit9, 0x19, "9"),
    (Key::Digit7, 0x1A, "7"),
    (Key::Minus, 0x1B, "-"),
    (Key::Digit8, 0x1C, "8"),
    (Key::Digit0, 0x1D, "0"),
    (Key::RightBracket, 0x1E, "]"),
    (Key::O, 0x1F, "O"),
    (Key::U, 0x20, "U"),
    (Key::LeftBracket, 0x21, "["),
    (Key::I, 0x22, "I"),
    (Key::P, 0x23, "P"),
    (Key::Return, 0x24, "Return"),
    (Key::L, 0x25, "L"),
    (Key::J, 0x26, "J"),
    (Key::Quote, 0x27, "'"),
    (Key::K, 0x28, "K"),
    (Key::Semicolon, 0x29, ";"),
    (Key::Backslash, 0x2A, "\\"),
    (Key::Comma, 0x2B, ","),
    (Key::Slash, 0x2C, "/"),
    (Key::N, 0x2D, "N"),
    (Key::M, 0x2E, "M"),
    (Key::Period, 0x2F, "."),
    (Key::Tab, 0x30, "Tab"),
    (Key::Space, 0x31, "Space"),
    (Key::Grave, 0x32, "`"),
    (Key::Delete, 0x33, "Delete"),
    (Key::Escape, 0x35, "Esc"),
    (Key::RightCommand, 0x36, "Right Command"),
    (Key::Command, 0x37, "Command"),
    (Key::Shift, 0x38, "Shift"),
    (Key::CapsLock, 0x39, "Caps Lock"),
    (Key::Option, 0x3A, "Option"),
    (Key::Control, 0x3B, "Control"),
    (Key::RightShift, 0x3C, "Right Shift"),
    (Key::RightOption, 0x3D, "Right Option"),
    (Key::RightControl, 0x3E, "Right Control"),
    (Key::Function, 0x3F, "Fn"),
    (Key::F17, 0x40, "F17"),
    (Key::F18, 0x4F, "F18"),
    (Key::F19, 0x50, "F19"),
    (Key::F20, 0x5A, "F20"),
    (Key::F5, 0x60, "F5"),
    (Key::F6, 0x61, "F6"),
    (Key::F7, 0x62, "F7"),
    (Key::F3, 0x63, "F3"),
    (Key::F8, 0x64, "F8"),
    (Key::F9, 0x65, "F9"),
    (Key::F11, 0x67, "F11"),
    (Key::F13, 0x69, "F13"),
    (Key::F16, 0x6A, "F16"),
    (Key::F14, 0x6B, "F14"),
    (Key::F10, 0x6D, "F10"),
    (Key::F12, 0x6F, "F12"),
    (Key::F15, 0x71, "F15"),
    (Key::Home, 0x73, "Home"),
    (Key::PageUp, 0x74, "Page Up"),
    (Key::ForwardDelete, 0x75, "Forward Delete"),
    (Key::F4, 0x76, "F4"),
    (Key::End, 0x77, "End"),
    (Key::F2, 0x78, "F2"),
    (Key::PageDown, 0x79, "Page Down"),
    (Key::F1, 0x7A, "F1"),
    (Key::Left, 0x7B, "←"),
    (Key::Right, 0x7C, "→"),
    (Key::Down, 0x7D, "↓"),
    (Key::Up, 0x7E, "↑"),
];

impl Key {
    pub fn from_code(code: u16) -> Self {
        KEY_TABLE
            .iter()
            .find(|(_, key_code, _)| *key_code == code)
            .map(|(key, _, _)| *key)
            .unwrap_or(Key::Other(code))
    }

    pub fn code(self) -> u16 {
        if let Key::Other(code) = self {
            return code;
        }

        KEY_TABLE
            .iter()
            .find(|(key, _, _)| *key == self)
            .map(|(_, code, _)| *code)
            .unwrap_or(u16::MAX)
    }

    /// Pure modifier keys can never trigger a binding on their own.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            Key::Command
                | Key::RightCommand
                | Key::Shift
                | Key::RightShift
                | Key::Option
                | Key::RightOption
                | Key::Control
                | Key::RightControl
                | Key::CapsLock
                | Key::Function
        )
    }

    fn name(self) -> Option<&'static str> {
        if matches!(self, Key::Other(_)) {
            return None;
        }

        KEY_TABLE
            .iter()
            .find(|(key, _, _)| *key == self)
            .map(|(_, _, name)| *name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Key#{}", self.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

/// One key press or release as delivered by the global key-event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
    pub phase: KeyPhase,
    pub is_repeat: bool,
}

impl KeyEvent {
    pub fn key_down(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key,
            modifiers,
            phase: KeyPhase::Down,
            is_repeat: false,
        }
    }

    pub fn key_up(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key,
            modifiers,
            phase: KeyPhase::Up,
            is_repeat: false,
        }
    }

    pub fn repeated(self) -> Self {
        Self {
            is_repeat: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn key_codes_in_table_are_unique() {
        let mut seen = HashSet::new();
        for (key, code, _) in KEY_TABLE {
            assert!(seen.insert(code), "duplicate key code {code:#x} for {key:?}");
        }
    }

    #[test]
    fn known_codes_map_to_logical_keys() {
        assert_eq!(Key::from_code(8), Key::C);
        assert_eq!(Key::from_code(17), Key::T);
        assert_eq!(Key::C.code(), 8);
        assert_eq!(Key::Space.code(), 0x31);
    }

    #[test]
    fn unknown_codes_survive_as_other() {
        let key = Key::from_code(0x5F);

        assert_eq!(key, Key::Other(0x5F));
        assert_eq!(key.code(), 0x5F);
        assert_eq!(key.to_string(), "Key#95");
    }

    #[test]
    fn modifier_keys_are_flagged() {
        assert!(Key::Command.is_modifier());
        assert!(Key::RightOption.is_modifier());
        assert!(Key::from_code(0x38).is_modifier());
        assert!(!Key::C.is_modifier());
        assert!(!Key::Space.is_modifier());
    }

    #[test]
    fn designated_modifiers_drop_caps_lock_and_function() {
        let modifiers = Modifiers::COMMAND | Modifiers::CAPS_LOCK | Modifiers::FUNCTION;

        assert_eq!(modifiers.designated(), Modifiers::COMMAND);
        assert!(modifiers.has_qualifying());
        assert!(!Modifiers::SHIFT.has_qualifying());
    }

    #[test]
    fn symbols_follow_command_option_control_shift_order() {
        let modifiers = Modifiers::SHIFT | Modifiers::CONTROL | Modifiers::COMMAND;

        assert_eq!(modifiers.symbols(), "⌘⌃⇧");
    }
}
