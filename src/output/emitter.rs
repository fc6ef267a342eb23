//! Replays text and key combinations as OS key events

use std::sync::Arc;

use tracing::debug;

use super::layout::KeyLayout;
use super::modifiers::{Modifier, Modifiers};
use super::{EmitError, KeyOutput};
use crate::keycombo::{KeyCombo, KeyEvent};

/// One step of typing a string
#[derive(Debug, PartialEq, Eq)]
enum Segment {
    /// Keys typed under one set of modifiers
    Keys { modifiers: Modifiers, keycodes: Vec<u16> },
    /// Characters the layout cannot type
    Text(String),
}

/// Group a string into runs sharing modifiers and untypable text
fn plan_string(layout: &KeyLayout, s: &str) -> Vec<Segment> {
    let mut plan: Vec<Segment> = Vec::new();
    for c in s.chars() {
        match (layout.char_keycode(c), plan.last_mut()) {
            (Some((keycode, modifiers)), Some(Segment::Keys { modifiers: m, keycodes }))
                if *m == modifiers =>
            {
                keycodes.push(keycode)
            }
            (Some((keycode, modifiers)), _) => plan.push(Segment::Keys {
                modifiers,
                keycodes: vec![keycode],
            }),
            (None, Some(Segment::Text(text))) => text.push(c),
            (None, _) => plan.push(Segment::Text(c.to_string())),
        }
    }
    plan
}

type KeycodeCombo = KeyCombo<u16, Box<dyn Fn(&str) -> Option<u16> + Send>>;

/// Sends key events through a backend, tracking held modifiers
///
/// The backend's modifier context is only updated when the modifiers held
/// at a key event differ from the last context sent. Keys pressed with
/// `+key` stay down across calls until a later `-key`.
pub struct KeyEventEmitter<O> {
    output: O,
    layout: Arc<KeyLayout>,
    combo: KeycodeCombo,
    held: Vec<(u16, Modifier)>,
    context: Modifiers,
}

impl<O: KeyOutput> KeyEventEmitter<O> {
    pub fn new(output: O, layout: KeyLayout) -> Self {
        let layout = Arc::new(layout);
        let resolver = Arc::clone(&layout);
        Self {
            output,
            layout,
            combo: KeyCombo::new(Box::new(move |name: &str| resolver.keycode(name))),
            held: Vec::new(),
            context: Modifiers::NONE,
        }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn set_context(&mut self, wanted: Modifiers) -> Result<(), EmitError> {
        if wanted != self.context {
            self.output.set_modifiers(wanted)?;
            self.context = wanted;
        }
        Ok(())
    }

    fn sync_modifiers(&mut self) -> Result<(), EmitError> {
        self.set_context(Modifiers::from_held(self.held.iter().map(|(_, m)| *m)))
    }

    fn is_held(&self, modifier: Modifier) -> bool {
        self.held.iter().any(|(_, m)| *m == modifier)
    }

    fn key(&mut self, keycode: u16, pressed: bool) -> Result<(), EmitError> {
        match self.layout.modifier(keycode) {
            Some(modifier) if pressed => {
                if !self.held.iter().any(|(k, _)| *k == keycode) {
                    self.held.push((keycode, modifier));
                }
            }
            Some(_) => self.held.retain(|(k, _)| *k != keycode),
            None => self.sync_modifiers()?,
        }
        self.output.key(keycode, pressed)
    }

    fn tap(&mut self, keycode: u16) -> Result<(), EmitError> {
        self.key(keycode, true)?;
        self.key(keycode, false)
    }

    pub fn send_backspaces(&mut self, count: usize) -> Result<(), EmitError> {
        let backspace = self
            .layout
            .keycode("backspace")
            .ok_or_else(|| EmitError::Backend("layout has no backspace key".to_string()))?;
        for _ in 0..count {
            self.tap(backspace)?;
        }
        Ok(())
    }

    /// Type a string
    ///
    /// Characters the layout can type are sent as keycodes, grouped into
    /// runs that share modifiers; anything else is injected as Unicode.
    /// Each run is stamped with exactly its own modifiers, whatever a
    /// combination is holding down.
    pub fn send_string(&mut self, s: &str) -> Result<(), EmitError> {
        for segment in plan_string(&self.layout, s) {
            match segment {
                Segment::Keys {
                    modifiers,
                    keycodes,
                } => {
                    // Modifiers a combination already holds stay down
                    let pressed: Vec<u16> = modifiers
                        .iter()
                        .filter(|m| !self.is_held(*m))
                        .filter_map(|m| self.layout.modifier_keycode(m))
                        .collect();
                    for keycode in &pressed {
                        self.key(*keycode, true)?;
                    }
                    self.set_context(modifiers)?;
                    for keycode in keycodes {
                        self.output.key(keycode, true)?;
                        self.output.key(keycode, false)?;
                    }
                    for keycode in pressed.iter().rev() {
                        self.key(*keycode, false)?;
                    }
                }
                Segment::Text(text) => {
                    self.set_context(Modifiers::NONE)?;
                    self.output.type_unicode(&text)?;
                }
            }
        }
        Ok(())
    }

    /// Parse a key combination and replay it
    ///
    /// Nothing is sent if the combination does not parse.
    pub fn send_key_combination(&mut self, combo: &str) -> Result<(), EmitError> {
        let events: Vec<KeyEvent<u16>> = self.combo.parse(combo)?;
        debug!(combo, events = events.len(), "sending key combination");
        for event in events {
            self.key(event.key, event.pressed)?;
        }
        Ok(())
    }

    /// Release every key left down by earlier combinations
    pub fn release_all(&mut self) -> Result<(), EmitError> {
        for event in self.combo.reset() {
            self.key(event.key, event.pressed)?;
        }
        Ok(())
    }
}
