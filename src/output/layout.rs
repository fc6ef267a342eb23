//! US keyboard layout tables for each platform's keycodes

use std::collections::HashMap;

use super::modifiers::{Modifier, Modifiers};
use crate::keycombo::{add_modifier_aliases, keyname_to_char};

/// Which keycode space a layout speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS virtual keycodes
    MacOs,
    /// Linux input event codes
    Evdev,
    /// X server keycodes (evdev + 8)
    X11,
    /// Windows virtual-key codes
    Windows,
}

impl Platform {
    /// Keycode space of the running system's key output
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::X11
        }
    }
}

/// One physical key of a US keyboard
struct PhysicalKey {
    /// Lower-cased X keysym name
    keysym: &'static str,
    /// Raw key name used by the Keyboard machine, empty if not captured
    machine: &'static str,
    base: Option<char>,
    shifted: Option<char>,
    mac: u16,
    evdev: u16,
    vk: u16,
}

const fn key(
    keysym: &'static str,
    machine: &'static str,
    base: Option<char>,
    shifted: Option<char>,
    mac: u16,
    evdev: u16,
    vk: u16,
) -> PhysicalKey {
    PhysicalKey {
        keysym,
        machine,
        base,
        shifted,
        mac,
        evdev,
        vk,
    }
}

const fn letter(c: char, mac: u16, evdev: u16) -> PhysicalKey {
    let upper = c.to_ascii_uppercase();
    PhysicalKey {
        keysym: "",
        machine: "",
        base: Some(c),
        shifted: Some(upper),
        mac,
        evdev,
        vk: upper as u16,
    }
}

#[rustfmt::skip]
const KEYS: &[PhysicalKey] = &[
    letter('a', 0x00, 30), letter('b', 0x0B, 48), letter('c', 0x08, 46),
    letter('d', 0x02, 32), letter('e', 0x0E, 18), letter('f', 0x03, 33),
    letter('g', 0x05, 34), letter('h', 0x04, 35), letter('i', 0x22, 23),
    letter('j', 0x26, 36), letter('k', 0x28, 37), letter('l', 0x25, 38),
    letter('m', 0x2E, 50), letter('n', 0x2D, 49), letter('o', 0x1F, 24),
    letter('p', 0x23, 25), letter('q', 0x0C, 16), letter('r', 0x0F, 19),
    letter('s', 0x01, 31), letter('t', 0x11, 20), letter('u', 0x20, 22),
    letter('v', 0x09, 47), letter('w', 0x0D, 17), letter('x', 0x07, 45),
    letter('y', 0x10, 21), letter('z', 0x06, 44),
    key("1", "1", Some('1'), Some('!'), 0x12, 2, 0x31),
    key("2", "2", Some('2'), Some('@'), 0x13, 3, 0x32),
    key("3", "3", Some('3'), Some('#'), 0x14, 4, 0x33),
    key("4", "4", Some('4'), Some('$'), 0x15, 5, 0x34),
    key("5", "5", Some('5'), Some('%'), 0x17, 6, 0x35),
    key("6", "6", Some('6'), Some('^'), 0x16, 7, 0x36),
    key("7", "7", Some('7'), Some('&'), 0x1A, 8, 0x37),
    key("8", "8", Some('8'), Some('*'), 0x1C, 9, 0x38),
    key("9", "9", Some('9'), Some('('), 0x19, 10, 0x39),
    key("0", "0", Some('0'), Some(')'), 0x1D, 11, 0x30),
    key("grave", "`", Some('`'), Some('~'), 0x32, 41, 0xC0),
    key("minus", "-", Some('-'), Some('_'), 0x1B, 12, 0xBD),
    key("equal", "=", Some('='), Some('+'), 0x18, 13, 0xBB),
    key("bracketleft", "[", Some('['), Some('{'), 0x21, 26, 0xDB),
    key("bracketright", "]", Some(']'), Some('}'), 0x1E, 27, 0xDD),
    key("backslash", "\\", Some('\\'), Some('|'), 0x2A, 43, 0xDC),
    key("semicolon", ";", Some(';'), Some(':'), 0x29, 39, 0xBA),
    key("apostrophe", "'", Some('\''), Some('"'), 0x27, 40, 0xDE),
    key("comma", ",", Some(','), Some('<'), 0x2B, 51, 0xBC),
    key("period", ".", Some('.'), Some('>'), 0x2F, 52, 0xBE),
    key("slash", "/", Some('/'), Some('?'), 0x2C, 53, 0xBF),
    key("space", "space", Some(' '), None, 0x31, 57, 0x20),
    key("return", "Return", Some('\n'), None, 0x24, 28, 0x0D),
    key("tab", "Tab", Some('\t'), None, 0x30, 15, 0x09),
    key("backspace", "BackSpace", None, None, 0x33, 14, 0x08),
    key("escape", "Escape", None, None, 0x35, 1, 0x1B),
    key("delete", "Delete", None, None, 0x75, 111, 0x2E),
    key("insert", "Insert", None, None, 0x72, 110, 0x2D),
    key("home", "Home", None, None, 0x73, 102, 0x24),
    key("end", "End", None, None, 0x77, 107, 0x23),
    key("page_up", "Page_Up", None, None, 0x74, 104, 0x21),
    key("page_down", "Page_Down", None, None, 0x79, 109, 0x22),
    key("left", "Left", None, None, 0x7B, 105, 0x25),
    key("right", "Right", None, None, 0x7C, 106, 0x27),
    key("up", "Up", None, None, 0x7E, 103, 0x26),
    key("down", "Down", None, None, 0x7D, 108, 0x28),
    key("f1", "F1", None, None, 0x7A, 59, 0x70),
    key("f2", "F2", None, None, 0x78, 60, 0x71),
    key("f3", "F3", None, None, 0x63, 61, 0x72),
    key("f4", "F4", None, None, 0x76, 62, 0x73),
    key("f5", "F5", None, None, 0x60, 63, 0x74),
    key("f6", "F6", None, None, 0x61, 64, 0x75),
    key("f7", "F7", None, None, 0x62, 65, 0x76),
    key("f8", "F8", None, None, 0x64, 66, 0x77),
    key("f9", "F9", None, None, 0x65, 67, 0x78),
    key("f10", "F10", None, None, 0x6D, 68, 0x79),
    key("f11", "F11", None, None, 0x67, 87, 0x7A),
    key("f12", "F12", None, None, 0x6F, 88, 0x7B),
    key("caps_lock", "", None, None, 0x39, 58, 0x14),
    key("shift_l", "", None, None, 0x38, 42, 0xA0),
    key("shift_r", "", None, None, 0x3C, 54, 0xA1),
    key("control_l", "", None, None, 0x3B, 29, 0xA2),
    key("control_r", "", None, None, 0x3E, 97, 0xA3),
    key("alt_l", "", None, None, 0x3A, 56, 0xA4),
    key("alt_r", "", None, None, 0x3D, 100, 0xA5),
    key("super_l", "", None, None, 0x37, 125, 0x5B),
    key("super_r", "", None, None, 0x36, 126, 0x5C),
];

/// Older keysym names for keys in the table
const KEYSYM_ALIASES: &[(&str, &str)] = &[
    ("prior", "page_up"),
    ("next", "page_down"),
    ("enter", "return"),
    ("esc", "escape"),
    ("meta_l", "super_l"),
    ("meta_r", "super_r"),
];

fn modifier_for_keysym(keysym: &str) -> Option<Modifier> {
    match keysym {
        "shift_l" | "shift_r" => Some(Modifier::Shift),
        "control_l" | "control_r" => Some(Modifier::Control),
        "alt_l" | "alt_r" => Some(Modifier::Alt),
        "super_l" | "super_r" => Some(Modifier::Super),
        _ => None,
    }
}

impl PhysicalKey {
    fn code(&self, platform: Platform) -> u16 {
        match platform {
            Platform::MacOs => self.mac,
            Platform::Evdev => self.evdev,
            Platform::X11 => self.evdev + 8,
            Platform::Windows => self.vk,
        }
    }

    /// Keysym and machine name; letters name themselves
    fn names(&self) -> (String, String) {
        match self.base {
            Some(c) if self.keysym.is_empty() => (c.to_string(), c.to_string()),
            _ => (self.keysym.to_string(), self.machine.to_string()),
        }
    }
}

/// Keycodes of a US layout in one platform's keycode space
#[derive(Debug, Clone)]
pub struct KeyLayout {
    platform: Platform,
    names: HashMap<String, u16>,
    chars: HashMap<char, (u16, Modifiers)>,
    modifiers: HashMap<u16, Modifier>,
    machine_keys: HashMap<u16, String>,
}

impl KeyLayout {
    pub fn new(platform: Platform) -> Self {
        let mut layout = Self {
            platform,
            names: HashMap::new(),
            chars: HashMap::new(),
            modifiers: HashMap::new(),
            machine_keys: HashMap::new(),
        };
        for key in KEYS {
            let code = key.code(platform);
            let (keysym, machine) = key.names();
            if let Some(modifier) = modifier_for_keysym(&keysym) {
                layout.modifiers.insert(code, modifier);
            }
            if let Some(c) = key.base {
                layout.chars.insert(c, (code, Modifiers::NONE));
            }
            if let Some(c) = key.shifted {
                layout.chars.insert(c, (code, Modifiers::SHIFT));
            }
            if !machine.is_empty() {
                layout.machine_keys.insert(code, machine);
            }
            layout.names.insert(keysym, code);
        }
        for (alias, keysym) in KEYSYM_ALIASES {
            if let Some(code) = layout.names.get(*keysym).copied() {
                layout.names.insert((*alias).to_string(), code);
            }
        }
        add_modifier_aliases(&mut layout.names);
        layout
    }

    /// Layout for the running system's key output
    pub fn native() -> Self {
        Self::new(Platform::native())
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Keycode for a key name, case-insensitive
    ///
    /// Names of characters typed without modifiers (`comma`, `a`) resolve
    /// to their key.
    pub fn keycode(&self, name: &str) -> Option<u16> {
        let name = name.to_lowercase();
        if let Some(code) = self.names.get(&name) {
            return Some(*code);
        }
        let c = keyname_to_char(&name)?;
        match self.chars.get(&c) {
            Some((code, modifiers)) if modifiers.is_empty() => Some(*code),
            _ => None,
        }
    }

    /// Keycode and modifiers that type a character
    pub fn char_keycode(&self, c: char) -> Option<(u16, Modifiers)> {
        self.chars.get(&c).copied()
    }

    /// Modifier a keycode controls
    pub fn modifier(&self, keycode: u16) -> Option<Modifier> {
        self.modifiers.get(&keycode).copied()
    }

    /// Left-hand key of a modifier
    pub fn modifier_keycode(&self, modifier: Modifier) -> Option<u16> {
        let name = match modifier {
            Modifier::Shift => "shift_l",
            Modifier::Control => "control_l",
            Modifier::Alt => "alt_l",
            Modifier::Super => "super_l",
        };
        self.names.get(name).copied()
    }

    /// Keyboard machine raw key name for a keycode
    pub fn machine_key(&self, keycode: u16) -> Option<&str> {
        self.machine_keys.get(&keycode).map(String::as_str)
    }

    /// Keycode of a Keyboard machine raw key name
    pub fn machine_keycode(&self, name: &str) -> Option<u16> {
        self.machine_keys
            .iter()
            .find(|(_, machine)| machine.as_str() == name)
            .map(|(code, _)| *code)
    }

    /// Every Keyboard machine raw key name
    pub fn machine_key_names(&self) -> impl Iterator<Item = &str> {
        self.machine_keys.values().map(String::as_str)
    }
}
