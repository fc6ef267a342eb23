//! Key combination mini-language
//!
//! Used to validate key combination commands and to turn them into
//! press/release sequences for keyboard emulation.

mod names;
mod parser;

pub use names::{add_modifier_aliases, char_to_keyname, keyname_to_char};
pub use parser::{KeyCombo, KeyComboError, KeyEvent, NameCombo};
