//! Operating system keyboard integration
//!
//! Picks the keyboard capture transport and key output backend for the
//! running system.

#[cfg(not(target_os = "macos"))]
mod enigo_output;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use tokio_util::sync::CancellationToken;

use crate::machine::{RawEvent, Transport, TransportError};
use crate::output::{spawn_output_thread, KeyLayout, OutputHandle};

/// Capture transport for the Keyboard machine
pub fn keyboard_capture() -> Box<dyn Transport> {
    #[cfg(target_os = "macos")]
    return Box::new(macos::TapCapture::new());
    #[cfg(target_os = "linux")]
    return Box::new(linux::EvdevCapture::new());
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    return Box::new(UnsupportedCapture);
}

/// Start the key output thread for the running system
pub fn spawn_key_output() -> std::io::Result<OutputHandle> {
    #[cfg(target_os = "macos")]
    return spawn_output_thread(macos::QuartzOutput::new, KeyLayout::native());
    #[cfg(not(target_os = "macos"))]
    return spawn_output_thread(enigo_output::EnigoOutput::new, KeyLayout::native());
}

/// Capture on a system without keyboard capture support
#[allow(dead_code)]
struct UnsupportedCapture;

impl Transport for UnsupportedCapture {
    fn connect(&mut self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(format!(
            "keyboard capture is not supported on {}",
            std::env::consts::OS
        )))
    }

    fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
        Ok(Vec::new())
    }

    fn disconnect(&mut self) {}
}
