//! The computer keyboard as a steno machine
//!
//! Keys arrive one at a time and are assembled into strokes by the driver.

use super::registry::MachineDescriptor;
use super::transport::Transport;
use super::MachineOptions;
use crate::keymap::MachineInfo;
use crate::platform;

/// Raw key names the keyboard can report
pub const KEYS: &[&str] = &[
    "Escape", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12", "`",
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "-", "=", "\\", "BackSpace", "Insert",
    "Home", "Page_Up", "Tab", "q", "w", "e", "r", "t", "y", "u", "i", "o", "p", "[", "]",
    "Delete", "End", "Page_Down", "a", "s", "d", "f", "g", "h", "j", "k", "l", ";", "'",
    "Return", "z", "x", "c", "v", "b", "n", "m", ",", ".", "/", "Up", "space", "Left", "Down",
    "Right",
];

pub const DESCRIPTOR: MachineDescriptor = MachineDescriptor::new(
    MachineInfo {
        name: "Keyboard",
        keys: KEYS,
        actions: &["arpeggiate"],
        keymap_fallback: None,
    },
    build,
);

fn build(_options: &MachineOptions) -> Box<dyn Transport> {
    platform::keyboard_capture()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::lookup_system;
    use crate::output::{KeyLayout, Platform};

    #[test]
    fn test_keys_match_layout() {
        for platform in [Platform::MacOs, Platform::Evdev, Platform::Windows] {
            let layout = KeyLayout::new(platform);
            let mut names: Vec<&str> = layout.machine_key_names().collect();
            names.sort_unstable();
            let mut keys = KEYS.to_vec();
            keys.sort_unstable();
            assert_eq!(names, keys, "{:?}", platform);
        }
    }

    #[test]
    fn test_default_layout_uses_known_keys() {
        let system = lookup_system("English Stenotype").unwrap();
        let layout = system.default_layout("Keyboard").unwrap();
        for (_, keys) in layout {
            for key in *keys {
                assert!(KEYS.contains(key), "{}", key);
            }
        }
    }
}
