//! Steno machine drivers
//!
//! One generic driver runs a capture worker over a [`Transport`]; each
//! machine type only supplies the transport and its key vocabulary.

mod driver;
pub mod keyboard;
pub mod palantype;
mod registry;
pub mod stenograph;
mod stroke;
pub mod supervisor;
mod transport;
pub mod treal;

use serde::{Deserialize, Serialize};

pub use driver::{DriverError, DriverOptions, MachineDriver, TransportFactory};
pub use registry::{MachineDescriptor, MachineRegistry};
pub use stroke::{StrokeAssembler, ARPEGGIATE};
pub use transport::{RawEvent, Transport, TransportError};

/// Per-machine options from the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Keyboard: complete strokes with the arpeggiate key
    pub arpeggiate: bool,
    /// Serial machines: device path, first matching port when unset
    pub serial_port: Option<String>,
    pub baud_rate: u32,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            arpeggiate: false,
            serial_port: None,
            baud_rate: palantype::DEFAULT_BAUD_RATE,
        }
    }
}
