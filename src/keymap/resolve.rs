//! Keymap resolution: system defaults, fallback machine type, user overrides

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::systems::System;
use super::Keymap;

/// What a machine type declares about its keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineInfo {
    /// Machine type name, e.g. "Keyboard"
    pub name: &'static str,
    /// Raw key vocabulary
    pub keys: &'static [&'static str],
    /// Machine actions besides steno keys, e.g. "arpeggiate"
    pub actions: &'static [&'static str],
    /// Machine type whose default layout may be reused
    pub keymap_fallback: Option<&'static str>,
}

/// Build the keymap for a machine under a system
///
/// Defaults come from the system's layout for the machine type. Without
/// one, and without user overrides, the layout of the machine's fallback
/// type is used instead (the fallback's own fallback is never followed).
/// User overrides (raw key -> action) are applied last. Entries naming
/// unknown keys or actions are logged and skipped.
pub fn resolve_keymap(
    machine: &MachineInfo,
    system: &System,
    overrides: Option<&HashMap<String, String>>,
) -> Keymap {
    let actions = system.keys.iter().chain(machine.actions.iter()).copied();
    let mut keymap = Keymap::new(machine.keys.iter().copied(), actions);

    let overrides = overrides.filter(|o| !o.is_empty());
    let layout = match system.default_layout(machine.name) {
        Some(layout) => Some(layout),
        None if overrides.is_none() => machine.keymap_fallback.and_then(|fallback| {
            let layout = system.default_layout(fallback);
            if layout.is_some() {
                info!(
                    machine = machine.name,
                    fallback,
                    "using fallback machine type keymap"
                );
            }
            layout
        }),
        None => None,
    };

    if let Some(layout) = layout {
        for (action, keys) in layout {
            for key in *keys {
                if let Some(previous) = keymap.binding(key) {
                    warn!(key, previous, action, "key bound to several actions in default layout");
                }
                if let Err(e) = keymap.bind(key, action) {
                    warn!(machine = machine.name, %e, "skipping default binding");
                }
            }
        }
    }

    if let Some(overrides) = overrides {
        let mut entries: Vec<_> = overrides.iter().collect();
        entries.sort();
        for (key, action) in entries {
            match keymap.bind(key, action) {
                Ok(()) => debug!(key, action, "user binding applied"),
                Err(e) => warn!(machine = machine.name, %e, "ignoring user binding"),
            }
        }
    }

    if keymap.is_empty() {
        warn!(
            machine = machine.name,
            system = system.name,
            "no keymap available, machine will produce no strokes"
        );
    } else {
        let unmapped = keymap.unmapped_actions();
        if !unmapped.is_empty() {
            debug!(?unmapped, "actions without a key");
        }
    }

    keymap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{lookup_system, Layout};

    const STENO_KEYS: &[&str] = &["S-", "T-", "-Z"];

    const ALIAS: MachineInfo = MachineInfo {
        name: "Alias",
        keys: &["k1", "k2", "k3"],
        actions: &[],
        keymap_fallback: Some("Base"),
    };

    const BASE_LAYOUT: Layout = &[("S-", &["k1"]), ("-Z", &["k3"])];

    static TEST_SYSTEM: System = System {
        name: "Test",
        keys: STENO_KEYS,
        layouts: &[("Base", BASE_LAYOUT)],
    };

    #[test]
    fn test_fallback_layout_is_used() {
        let keymap = resolve_keymap(&ALIAS, &TEST_SYSTEM, None);
        assert_eq!(keymap.binding("k1"), Some("S-"));
        assert_eq!(keymap.binding("k3"), Some("-Z"));
        assert_eq!(keymap.keys_to_actions(&["k1", "k3"]), vec!["S-", "-Z"]);
    }

    #[test]
    fn test_fallback_is_followed_once() {
        let machine = MachineInfo {
            name: "Twice",
            keys: &["k1"],
            actions: &[],
            keymap_fallback: Some("Alias"),
        };
        let keymap = resolve_keymap(&machine, &TEST_SYSTEM, None);
        assert!(keymap.is_empty());
    }

    #[test]
    fn test_no_layout_gives_empty_keymap() {
        let machine = MachineInfo {
            keymap_fallback: None,
            ..ALIAS
        };
        assert!(resolve_keymap(&machine, &TEST_SYSTEM, None).is_empty());
    }

    #[test]
    fn test_overrides_layer_over_defaults() {
        let system = lookup_system("English Stenotype").unwrap();
        let machine = MachineInfo {
            name: "Keyboard",
            keys: &["a", "q", "w", "space"],
            actions: &["arpeggiate"],
            keymap_fallback: None,
        };
        let mut overrides = HashMap::new();
        overrides.insert("q".to_string(), "no-op".to_string());
        overrides.insert("nope".to_string(), "S-".to_string());
        overrides.insert("w".to_string(), "bogus".to_string());

        let keymap = resolve_keymap(&machine, system, Some(&overrides));
        assert_eq!(keymap.binding("a"), Some("S-"));
        assert_eq!(keymap.binding("q"), Some("no-op"));
        // Invalid override leaves the default in place
        assert_eq!(keymap.binding("w"), Some("T-"));
        assert_eq!(keymap.binding("space"), Some("arpeggiate"));
    }

    #[test]
    fn test_explicit_overrides_disable_fallback() {
        let mut overrides = HashMap::new();
        overrides.insert("k2".to_string(), "T-".to_string());
        let keymap = resolve_keymap(&ALIAS, &TEST_SYSTEM, Some(&overrides));
        assert_eq!(keymap.binding("k2"), Some("T-"));
        assert_eq!(keymap.binding("k1"), None);
    }
}
