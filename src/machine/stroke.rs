//! Turning key presses into strokes

use std::collections::{BTreeSet, HashMap};

use crate::keymap::{Keymap, NO_OP};

/// Machine action that ends a stroke in arpeggiate mode
pub const ARPEGGIATE: &str = "arpeggiate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Steno,
    /// Captured but produces nothing
    Ignored,
    Arpeggiate,
}

/// Collects raw keys until a stroke is complete
///
/// Normal mode completes a stroke when every pressed key is released.
/// In arpeggiate mode keys may be pressed one after another and the
/// stroke completes on release of the key bound to `arpeggiate`.
#[derive(Debug, Default)]
pub struct StrokeAssembler {
    arpeggiate: bool,
    roles: HashMap<String, Role>,
    down: BTreeSet<String>,
    released: BTreeSet<String>,
}

impl StrokeAssembler {
    pub fn new(arpeggiate: bool) -> Self {
        Self {
            arpeggiate,
            ..Default::default()
        }
    }

    /// Take the key roles from a keymap
    ///
    /// The arpeggiate key is only captured in arpeggiate mode.
    pub fn set_keymap(&mut self, keymap: &Keymap) {
        self.roles = keymap
            .bindings()
            .filter_map(|(key, action)| {
                let role = match action {
                    NO_OP => Role::Ignored,
                    ARPEGGIATE if self.arpeggiate => Role::Arpeggiate,
                    ARPEGGIATE => return None,
                    _ => Role::Steno,
                };
                Some((key.to_string(), role))
            })
            .collect();
        self.reset();
    }

    /// Raw keys to hide from the rest of the system
    pub fn captured_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.roles.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn reset(&mut self) {
        self.down.clear();
        self.released.clear();
    }

    pub fn key_down(&mut self, key: &str) {
        if self.roles.get(key) == Some(&Role::Steno) {
            self.down.insert(key.to_string());
        }
    }

    /// Returns the raw keys of a completed stroke
    pub fn key_up(&mut self, key: &str) -> Option<Vec<String>> {
        let role = self.roles.get(key).copied();
        if role == Some(Role::Steno) {
            self.released.insert(key.to_string());
            self.released.retain(|k| self.down.contains(k));
        }

        let mut complete = !self.down.is_empty() && self.down == self.released;
        if self.arpeggiate {
            complete &= role == Some(Role::Arpeggiate);
        }
        if !complete {
            return None;
        }
        self.released.clear();
        Some(std::mem::take(&mut self.down).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap() -> Keymap {
        let mut keymap = Keymap::new(["a", "w", "z", "space"], ["S-", "T-", ARPEGGIATE]);
        keymap.bind("a", "S-").unwrap();
        keymap.bind("w", "T-").unwrap();
        keymap.bind("z", NO_OP).unwrap();
        keymap.bind("space", ARPEGGIATE).unwrap();
        keymap
    }

    fn assembler(arpeggiate: bool) -> StrokeAssembler {
        let mut assembler = StrokeAssembler::new(arpeggiate);
        assembler.set_keymap(&keymap());
        assembler
    }

    #[test]
    fn test_stroke_on_full_release() {
        let mut a = assembler(false);
        a.key_down("a");
        a.key_down("w");
        assert_eq!(a.key_up("a"), None);
        a.key_down("z");
        assert_eq!(a.key_up("z"), None);
        assert_eq!(a.key_up("w"), Some(vec!["a".to_string(), "w".to_string()]));
        // Nothing left for a second stroke
        assert_eq!(a.key_up("w"), None);
    }

    #[test]
    fn test_rolled_keys_join_the_stroke() {
        let mut a = assembler(false);
        a.key_down("a");
        a.key_down("w");
        a.key_up("a");
        a.key_down("a");
        assert_eq!(a.key_up("a"), None);
        assert_eq!(a.key_up("w"), Some(vec!["a".to_string(), "w".to_string()]));
    }

    #[test]
    fn test_arpeggiate_waits_for_key() {
        let mut a = assembler(true);
        a.key_down("a");
        assert_eq!(a.key_up("a"), None);
        a.key_down("w");
        assert_eq!(a.key_up("w"), None);
        a.key_down("space");
        assert_eq!(a.key_up("space"), Some(vec!["a".to_string(), "w".to_string()]));
        a.key_down("space");
        assert_eq!(a.key_up("space"), None);
    }

    #[test]
    fn test_arpeggiate_key_only_captured_in_arpeggiate_mode() {
        assert_eq!(assembler(false).captured_keys(), vec!["a", "w", "z"]);
        assert_eq!(assembler(true).captured_keys(), vec!["a", "space", "w", "z"]);

        let mut a = assembler(false);
        a.key_down("space");
        assert_eq!(a.key_up("space"), None);
    }
}
