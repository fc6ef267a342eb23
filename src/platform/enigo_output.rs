//! Key output through enigo
//!
//! Keycodes are X keycodes on Linux and virtual-key codes on Windows.
//! Modifiers take effect through the modifier keys the emitter holds down.

use enigo::{Direction, Enigo, Keyboard, Settings};

use crate::output::{EmitError, KeyOutput, Modifiers};

pub struct EnigoOutput {
    enigo: Enigo,
}

impl EnigoOutput {
    pub fn new() -> Result<Self, EmitError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| EmitError::Unavailable(format!("failed to create enigo: {e}")))?;
        Ok(Self { enigo })
    }
}

impl KeyOutput for EnigoOutput {
    fn key(&mut self, keycode: u16, pressed: bool) -> Result<(), EmitError> {
        let direction = if pressed {
            Direction::Press
        } else {
            Direction::Release
        };
        #[cfg(windows)]
        let sent = self.enigo.key(enigo::Key::Other(u32::from(keycode)), direction);
        #[cfg(not(windows))]
        let sent = self.enigo.raw(keycode, direction);
        sent.map_err(|e| EmitError::Backend(format!("failed to send key {keycode}: {e}")))
    }

    fn set_modifiers(&mut self, _modifiers: Modifiers) -> Result<(), EmitError> {
        Ok(())
    }

    fn type_unicode(&mut self, text: &str) -> Result<(), EmitError> {
        self.enigo
            .text(text)
            .map_err(|e| EmitError::Backend(format!("failed to type text: {e}")))
    }
}
