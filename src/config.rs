//! Configuration loading and management

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::machine::{MachineOptions, MachineRegistry};

pub const DEFAULT_MACHINE_TYPE: &str = "Keyboard";
pub const DEFAULT_SYSTEM: &str = "English Stenotype";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME is not set")]
    NoHome,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings read from `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub machine_type: String,
    pub system: String,
    /// Start capture when the daemon starts
    pub auto_start: bool,
    /// Log every stroke at info level
    pub log_strokes: bool,
    pub machine_options: MachineOptions,
    /// Machine type -> raw key -> action
    pub keymaps: HashMap<String, HashMap<String, String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
            system: DEFAULT_SYSTEM.to_string(),
            auto_start: true,
            log_strokes: false,
            machine_options: MachineOptions::default(),
            keymaps: HashMap::new(),
        }
    }
}

impl Settings {
    /// User keymap for a machine type (case-insensitive)
    pub fn keymap(&self, machine_type: &str) -> Option<&HashMap<String, String>> {
        self.keymaps
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(machine_type))
            .map(|(_, keymap)| keymap)
    }

    /// Replace an unknown machine type with the default
    pub fn check_machine_type(&mut self, registry: &MachineRegistry) {
        if registry.get(&self.machine_type).is_none() {
            error!(
                machine_type = %self.machine_type,
                "unknown machine type, using {}", DEFAULT_MACHINE_TYPE
            );
            self.machine_type = DEFAULT_MACHINE_TYPE.to_string();
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub settings: Settings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("stenod");
        Self::from_data_dir(data_dir)
    }

    /// Load `config.json` from a data directory; a missing file gives defaults
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.into();
        let settings = read_settings(&data_dir.join("config.json"))?;
        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            settings,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_data_dir(dir.path()).unwrap();
        assert_eq!(config.socket_path, dir.path().join("daemon.sock"));
        assert_eq!(config.settings, Settings::default());
        assert!(config.settings.auto_start);
        assert_eq!(config.settings.system, "English Stenotype");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{
                "machine_type": "Palantype",
                "log_strokes": true,
                "machine_options": {"serial_port": "/dev/ttyUSB0"},
                "keymaps": {"keyboard": {"z": "-Z"}}
            }"#,
        )
        .unwrap();
        let settings = Config::from_data_dir(dir.path()).unwrap().settings;
        assert_eq!(settings.machine_type, "Palantype");
        assert!(settings.log_strokes);
        assert!(settings.auto_start);
        assert_eq!(settings.machine_options.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(settings.machine_options.baud_rate, 9600);
        let keymap = settings.keymap("Keyboard").unwrap();
        assert_eq!(keymap.get("z").map(String::as_str), Some("-Z"));
        assert!(settings.keymap("Treal").is_none());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ machine_type").unwrap();
        assert!(matches!(
            Config::from_data_dir(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_machine_type_falls_back() {
        let registry = MachineRegistry::builtin();
        let mut settings = Settings {
            machine_type: "Gemini".to_string(),
            ..Default::default()
        };
        settings.check_machine_type(&registry);
        assert_eq!(settings.machine_type, "Keyboard");

        settings.machine_type = "treal".to_string();
        settings.check_machine_type(&registry);
        assert_eq!(settings.machine_type, "treal");
    }
}
