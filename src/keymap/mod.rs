//! Keymaps: raw machine keys to steno actions
//!
//! A keymap is built once per machine type / system / user configuration
//! and shared read-only with the capture worker.

mod resolve;
mod systems;

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

pub use resolve::{resolve_keymap, MachineInfo};
pub use systems::{lookup_system, systems, Layout, System};

/// Action for keys that are captured but produce nothing
pub const NO_OP: &str = "no-op";

/// Errors from binding a raw key to an action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeymapError {
    #[error("unknown key \"{0}\"")]
    UnknownKey(String),

    #[error("unknown action \"{0}\"")]
    UnknownAction(String),
}

/// Mapping from a machine's raw keys to actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    /// Raw key vocabulary of the machine, in layout order
    keys: Vec<String>,
    /// Valid actions: system keys, machine actions, then `no-op`
    actions: Vec<String>,
    /// Raw key -> action
    bindings: HashMap<String, String>,
}

impl Keymap {
    /// Create a keymap with no bindings
    pub fn new<K, A>(keys: K, actions: A) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        let mut actions: Vec<String> = actions.into_iter().map(Into::into).collect();
        if !actions.iter().any(|a| a == NO_OP) {
            actions.push(NO_OP.to_string());
        }
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            actions,
            bindings: HashMap::new(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Bind a raw key to an action, replacing any previous binding
    pub fn bind(&mut self, key: &str, action: &str) -> Result<(), KeymapError> {
        if !self.keys.iter().any(|k| k == key) {
            return Err(KeymapError::UnknownKey(key.to_string()));
        }
        if !self.actions.iter().any(|a| a == action) {
            return Err(KeymapError::UnknownAction(action.to_string()));
        }
        self.bindings.insert(key.to_string(), action.to_string());
        Ok(())
    }

    /// Action bound to a raw key
    pub fn binding(&self, key: &str) -> Option<&str> {
        self.bindings.get(key).map(String::as_str)
    }

    /// All bindings, in raw key order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .filter_map(|k| self.bindings.get(k).map(|a| (k.as_str(), a.as_str())))
    }

    /// Whether no key is bound at all
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Actions that no raw key triggers
    pub fn unmapped_actions(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| *a != NO_OP && !self.bindings.values().any(|b| b == *a))
            .map(String::as_str)
            .collect()
    }

    /// Actions triggered by a set of raw keys
    ///
    /// The result is deduplicated, in action order, and never contains
    /// `no-op`. Unbound keys are ignored.
    pub fn keys_to_actions<S: AsRef<str>>(&self, raw_keys: &[S]) -> Vec<String> {
        let mut bound: Vec<&str> = Vec::new();
        for key in raw_keys {
            match self.bindings.get(key.as_ref()) {
                Some(action) if action != NO_OP => bound.push(action.as_str()),
                Some(_) => {}
                None => debug!(key = key.as_ref(), "ignoring unbound key"),
            }
        }
        self.actions
            .iter()
            .filter(|a| bound.contains(&a.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Keymap {
        let mut keymap = Keymap::new(["a", "q", "w", "z"], ["S-", "T-", "arpeggiate"]);
        keymap.bind("a", "S-").unwrap();
        keymap.bind("q", "S-").unwrap();
        keymap.bind("w", "T-").unwrap();
        keymap.bind("z", NO_OP).unwrap();
        keymap
    }

    #[test]
    fn test_no_op_is_always_an_action() {
        let keymap = Keymap::new(["a"], ["S-"]);
        assert_eq!(keymap.actions(), &["S-".to_string(), NO_OP.to_string()]);
    }

    #[test]
    fn test_bind_rejects_unknown_names() {
        let mut keymap = sample();
        assert_eq!(
            keymap.bind("x", "S-"),
            Err(KeymapError::UnknownKey("x".to_string()))
        );
        assert_eq!(
            keymap.bind("a", "-Z"),
            Err(KeymapError::UnknownAction("-Z".to_string()))
        );
        assert_eq!(keymap.binding("a"), Some("S-"));
    }

    #[test]
    fn test_keys_to_actions_dedups_and_drops_no_op() {
        let keymap = sample();
        assert_eq!(keymap.keys_to_actions(&["w", "a", "q", "z"]), vec!["S-", "T-"]);
        assert!(keymap.keys_to_actions(&["z"]).is_empty());
        assert!(keymap.keys_to_actions::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_unmapped_actions() {
        let keymap = sample();
        assert_eq!(keymap.unmapped_actions(), vec!["arpeggiate"]);
    }

    #[test]
    fn test_bindings_follow_key_order() {
        let keymap = sample();
        let bindings: Vec<_> = keymap.bindings().collect();
        assert_eq!(
            bindings,
            vec![("a", "S-"), ("q", "S-"), ("w", "T-"), ("z", NO_OP)]
        );
    }
}
