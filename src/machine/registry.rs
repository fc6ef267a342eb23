//! Known machine types

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use super::driver::{DriverError, DriverOptions, MachineDriver, TransportFactory};
use super::transport::Transport;
use super::{keyboard, palantype, stenograph, treal, MachineOptions};
use crate::events::EventSender;
use crate::keymap::{lookup_system, resolve_keymap, Keymap, MachineInfo};

/// A machine type and how to reach it
#[derive(Clone, Copy)]
pub struct MachineDescriptor {
    pub info: MachineInfo,
    build: fn(&MachineOptions) -> Box<dyn Transport>,
}

impl MachineDescriptor {
    pub const fn new(info: MachineInfo, build: fn(&MachineOptions) -> Box<dyn Transport>) -> Self {
        Self { info, build }
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    fn factory(&self, options: &MachineOptions) -> TransportFactory {
        let build = self.build;
        let options = options.clone();
        Arc::new(move || build(&options))
    }
}

impl std::fmt::Debug for MachineDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDescriptor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Machine types by case-insensitive name
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: Vec<MachineDescriptor>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in machine
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(keyboard::DESCRIPTOR);
        registry.register(stenograph::DESCRIPTOR);
        registry.register(treal::DESCRIPTOR);
        registry.register(palantype::DESCRIPTOR);
        registry
    }

    /// Add a machine type, replacing one with the same name
    pub fn register(&mut self, descriptor: MachineDescriptor) {
        self.machines
            .retain(|m| !m.name().eq_ignore_ascii_case(descriptor.name()));
        self.machines.push(descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&MachineDescriptor> {
        self.machines
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.machines.iter().map(|m| m.name()).collect()
    }

    /// Keymap for a machine type under a system
    ///
    /// Unknown machine types or systems are logged and give an empty keymap.
    pub fn keymap(
        &self,
        machine_type: &str,
        system: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Keymap {
        let Some(machine) = self.get(machine_type) else {
            error!(machine_type, "unknown machine type, using empty keymap");
            return Keymap::default();
        };
        let Some(system_def) = lookup_system(system) else {
            error!(system, "unknown system, using empty keymap");
            return Keymap::default();
        };
        resolve_keymap(&machine.info, system_def, overrides)
    }

    /// Create a stopped driver for a machine type
    pub fn create_driver(
        &self,
        machine_type: &str,
        options: &MachineOptions,
        keymap: Keymap,
        events: EventSender,
    ) -> Result<MachineDriver, DriverError> {
        let machine = self
            .get(machine_type)
            .ok_or_else(|| DriverError::UnknownMachine(machine_type.to_string()))?;
        let driver_options = DriverOptions {
            arpeggiate: options.arpeggiate,
            ..Default::default()
        };
        Ok(MachineDriver::new(
            machine.name(),
            machine.factory(options),
            keymap,
            driver_options,
            events,
        ))
    }
}
