//! Keyboard emulation
//!
//! Text and key combinations are turned into OS key events by a
//! [`KeyEventEmitter`] that lives on its own thread, since platform event
//! APIs are blocking and some are not `Send`.

mod emitter;
mod layout;
mod modifiers;

use std::sync::mpsc;
use std::thread;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::keycombo::KeyComboError;

pub use emitter::KeyEventEmitter;
pub use layout::{KeyLayout, Platform};
pub use modifiers::{Modifier, Modifiers};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("invalid key combination: {0}")]
    Combo(#[from] KeyComboError),

    #[error("key output failed: {0}")]
    Backend(String),

    #[error("key output unavailable: {0}")]
    Unavailable(String),
}

/// A platform's key event sink
pub trait KeyOutput {
    /// Press or release one key
    fn key(&mut self, keycode: u16, pressed: bool) -> Result<(), EmitError>;

    /// Modifiers to apply to the key events that follow
    fn set_modifiers(&mut self, modifiers: Modifiers) -> Result<(), EmitError>;

    /// Inject text that has no key in the layout
    fn type_unicode(&mut self, text: &str) -> Result<(), EmitError>;
}

/// One emulation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    Backspaces(usize),
    String(String),
    KeyCombination(String),
}

type Reply = oneshot::Sender<Result<(), EmitError>>;

/// Handle to the output thread
#[derive(Clone)]
pub struct OutputHandle {
    tx: mpsc::Sender<(OutputCommand, Reply)>,
}

impl OutputHandle {
    /// Run a command on the output thread and wait for it to finish
    pub async fn send(&self, command: OutputCommand) -> Result<(), EmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .map_err(|_| EmitError::Unavailable("output thread has exited".to_string()))?;
        reply_rx
            .await
            .map_err(|_| EmitError::Unavailable("output thread has exited".to_string()))?
    }
}

/// Spawn the output thread
///
/// `make` builds the backend on the thread itself. If it fails, every
/// command is answered with the construction error.
pub fn spawn_output_thread<O, F>(make: F, layout: KeyLayout) -> std::io::Result<OutputHandle>
where
    O: KeyOutput,
    F: FnOnce() -> Result<O, EmitError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<(OutputCommand, Reply)>();
    thread::Builder::new()
        .name("key-output".to_string())
        .spawn(move || {
            let mut emitter = match make() {
                Ok(output) => KeyEventEmitter::new(output, layout),
                Err(e) => {
                    error!(%e, "key output backend failed to start");
                    let message = e.to_string();
                    for (_, reply) in rx {
                        let _ = reply.send(Err(EmitError::Unavailable(message.clone())));
                    }
                    return;
                }
            };
            for (command, reply) in rx {
                debug!(?command, "key output");
                let result = match &command {
                    OutputCommand::Backspaces(count) => emitter.send_backspaces(*count),
                    OutputCommand::String(text) => emitter.send_string(text),
                    OutputCommand::KeyCombination(combo) => emitter.send_key_combination(combo),
                };
                let _ = reply.send(result);
            }
            if let Err(e) = emitter.release_all() {
                error!(%e, "failed to release held keys");
            }
            debug!("key output thread exiting");
        })?;
    Ok(OutputHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok, block_on};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<(u16, bool)>>>);

    impl KeyOutput for Shared {
        fn key(&mut self, keycode: u16, pressed: bool) -> Result<(), EmitError> {
            self.0.lock().unwrap().push((keycode, pressed));
            Ok(())
        }

        fn set_modifiers(&mut self, _modifiers: Modifiers) -> Result<(), EmitError> {
            Ok(())
        }

        fn type_unicode(&mut self, _text: &str) -> Result<(), EmitError> {
            Err(EmitError::Backend("no unicode".to_string()))
        }
    }

    #[tokio::test]
    async fn test_commands_run_on_output_thread() {
        let keys = Shared::default();
        let backend = keys.clone();
        let handle =
            spawn_output_thread(move || Ok(backend), KeyLayout::new(Platform::Evdev)).unwrap();

        assert_ok!(handle.send(OutputCommand::Backspaces(1)).await);
        assert_ok!(
            handle
                .send(OutputCommand::KeyCombination("a".to_string()))
                .await
        );
        assert_eq!(
            *keys.0.lock().unwrap(),
            vec![(14, true), (14, false), (30, true), (30, false)]
        );

        let err = handle
            .send(OutputCommand::String("✓".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EmitError::Backend(_)));
    }

    #[test]
    fn test_failed_backend_answers_every_command() {
        let handle = spawn_output_thread(
            || -> Result<Shared, EmitError> { Err(EmitError::Unavailable("no display".to_string())) },
            KeyLayout::new(Platform::Evdev),
        )
        .unwrap();
        for _ in 0..2 {
            let err = assert_err!(block_on(handle.send(OutputCommand::Backspaces(1))));
            assert!(err.to_string().contains("no display"));
        }
    }
}
