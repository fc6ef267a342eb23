//! Built-in steno systems and their default machine layouts

/// Default layout for one machine type: action -> raw keys
pub type Layout = &'static [(&'static str, &'static [&'static str])];

/// A steno system: its key vocabulary and default layouts per machine
#[derive(Debug)]
pub struct System {
    pub name: &'static str,
    /// Steno keys, in steno order
    pub keys: &'static [&'static str],
    /// Machine type -> default layout
    pub layouts: &'static [(&'static str, Layout)],
}

impl System {
    /// Default layout for a machine type (case-insensitive)
    pub fn default_layout(&self, machine_type: &str) -> Option<Layout> {
        self.layouts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(machine_type))
            .map(|(_, layout)| *layout)
    }
}

const ENGLISH_KEYS: &[&str] = &[
    "#", "S-", "T-", "K-", "P-", "W-", "H-", "R-", "A-", "O-", "*", "-E", "-U", "-F", "-R", "-P",
    "-B", "-L", "-G", "-T", "-S", "-D", "-Z",
];

const ENGLISH_KEYBOARD: Layout = &[
    ("#", &["1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "-", "="]),
    ("S-", &["a", "q"]),
    ("T-", &["w"]),
    ("K-", &["s"]),
    ("P-", &["e"]),
    ("W-", &["d"]),
    ("H-", &["r"]),
    ("R-", &["f"]),
    ("A-", &["c"]),
    ("O-", &["v"]),
    ("*", &["t", "y", "g", "h"]),
    ("-E", &["n"]),
    ("-U", &["m"]),
    ("-F", &["u"]),
    ("-R", &["j"]),
    ("-P", &["i"]),
    ("-B", &["k"]),
    ("-L", &["o"]),
    ("-G", &["l"]),
    ("-T", &["p"]),
    ("-S", &[";"]),
    ("-D", &["["]),
    ("-Z", &["'"]),
    ("arpeggiate", &["space"]),
    ("no-op", &["\\", "]", "z", "x", "b", ",", ".", "/"]),
];

const ENGLISH_STENOGRAPH: Layout = &[
    ("#", &["#"]),
    ("S-", &["S-"]),
    ("T-", &["T-"]),
    ("K-", &["K-"]),
    ("P-", &["P-"]),
    ("W-", &["W-"]),
    ("H-", &["H-"]),
    ("R-", &["R-"]),
    ("A-", &["A-"]),
    ("O-", &["O-"]),
    ("*", &["*"]),
    ("-E", &["-E"]),
    ("-U", &["-U"]),
    ("-F", &["-F"]),
    ("-R", &["-R"]),
    ("-P", &["-P"]),
    ("-B", &["-B"]),
    ("-L", &["-L"]),
    ("-G", &["-G"]),
    ("-T", &["-T"]),
    ("-S", &["-S"]),
    ("-D", &["-D"]),
    ("-Z", &["-Z"]),
    ("no-op", &["^"]),
];

const ENGLISH_TREAL: Layout = &[
    (
        "#",
        &["#1", "#2", "#3", "#4", "#5", "#6", "#7", "#8", "#9", "#A", "#B"],
    ),
    ("S-", &["S1-", "S2-"]),
    ("T-", &["T-"]),
    ("K-", &["K-"]),
    ("P-", &["P-"]),
    ("W-", &["W-"]),
    ("H-", &["H-"]),
    ("R-", &["R-"]),
    ("A-", &["A-"]),
    ("O-", &["O-"]),
    ("*", &["*1", "*2"]),
    ("-E", &["-E"]),
    ("-U", &["-U"]),
    ("-F", &["-F"]),
    ("-R", &["-R"]),
    ("-P", &["-P"]),
    ("-B", &["-B"]),
    ("-L", &["-L"]),
    ("-G", &["-G"]),
    ("-T", &["-T"]),
    ("-S", &["-S"]),
    ("-D", &["-D"]),
    ("-Z", &["-Z"]),
    ("no-op", &["X1-", "X2-", "X3"]),
];

const PALANTYPE_KEYS: &[&str] = &[
    "S-", "C-", "P-", "T-", "H-", "+1-", "M-", "F-", "R-", "N-", "L-", "Y-", "+2-", "O-", "E-", "I",
    "-U", "-A", "-^1", "-N", "-L", "-C", "-M", "-F", "-R", "-P", "-T", "-+", "-S", "-H", "-^2",
];

const PALANTYPE_PALANTYPE: Layout = &[
    ("S-", &["S-"]),
    ("C-", &["C-"]),
    ("P-", &["P-"]),
    ("T-", &["T-"]),
    ("H-", &["H-"]),
    ("+1-", &["+1-"]),
    ("M-", &["M-"]),
    ("F-", &["F-"]),
    ("R-", &["R-"]),
    ("N-", &["N-"]),
    ("L-", &["L-"]),
    ("Y-", &["Y-"]),
    ("+2-", &["+2-"]),
    ("O-", &["O-"]),
    ("E-", &["E-"]),
    ("I", &["I"]),
    ("-U", &["-U"]),
    ("-A", &["-A"]),
    ("-^1", &["-^1"]),
    ("-N", &["-N"]),
    ("-L", &["-L"]),
    ("-C", &["-C"]),
    ("-M", &["-M"]),
    ("-F", &["-F"]),
    ("-R", &["-R"]),
    ("-P", &["-P"]),
    ("-T", &["-T"]),
    ("-+", &["-+"]),
    ("-S", &["-S"]),
    ("-H", &["-H"]),
    ("-^2", &["-^2"]),
];

static SYSTEMS: &[System] = &[
    System {
        name: "English Stenotype",
        keys: ENGLISH_KEYS,
        layouts: &[
            ("Keyboard", ENGLISH_KEYBOARD),
            ("Stenograph", ENGLISH_STENOGRAPH),
            ("Treal", ENGLISH_TREAL),
        ],
    },
    System {
        name: "Palantype",
        keys: PALANTYPE_KEYS,
        layouts: &[("Palantype", PALANTYPE_PALANTYPE)],
    },
];

/// All built-in systems
pub fn systems() -> &'static [System] {
    SYSTEMS
}

/// Find a system by name (case-insensitive)
pub fn lookup_system(name: &str) -> Option<&'static System> {
    SYSTEMS.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let system = lookup_system("english stenotype").unwrap();
        assert_eq!(system.name, "English Stenotype");
        assert!(lookup_system("Klingon").is_none());
    }

    #[test]
    fn test_layouts_only_use_system_actions() {
        for system in systems() {
            for (machine, layout) in system.layouts {
                for (action, _) in *layout {
                    assert!(
                        system.keys.contains(action)
                            || ["no-op", "arpeggiate"].contains(action),
                        "{}/{}: {}",
                        system.name,
                        machine,
                        action
                    );
                }
            }
        }
    }

    #[test]
    fn test_default_layout_lookup() {
        let system = lookup_system("English Stenotype").unwrap();
        assert!(system.default_layout("keyboard").is_some());
        assert!(system.default_layout("Palantype").is_none());
    }
}
