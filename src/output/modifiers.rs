//! Modifier key state for key output
//!
//! The emitter derives a modifier context from the modifier keys it holds
//! down and hands it to the backend, which stamps it on key events.

/// One modifier, either side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Super,
}

/// Which modifiers are in effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    /// Command on macOS, Windows key elsewhere
    pub super_key: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        alt: false,
        super_key: false,
    };

    pub const SHIFT: Self = Self {
        shift: true,
        ..Self::NONE
    };

    /// Context for a set of held modifier keys
    pub fn from_held(held: impl IntoIterator<Item = Modifier>) -> Self {
        let mut modifiers = Self::NONE;
        for modifier in held {
            modifiers.set(modifier, true);
        }
        modifiers
    }

    pub fn set(&mut self, modifier: Modifier, on: bool) {
        match modifier {
            Modifier::Shift => self.shift = on,
            Modifier::Control => self.control = on,
            Modifier::Alt => self.alt = on,
            Modifier::Super => self.super_key = on,
        }
    }

    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Shift => self.shift,
            Modifier::Control => self.control,
            Modifier::Alt => self.alt,
            Modifier::Super => self.super_key,
        }
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Modifiers in press order
    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        [
            Modifier::Control,
            Modifier::Alt,
            Modifier::Shift,
            Modifier::Super,
        ]
        .into_iter()
        .filter(|m| self.contains(*m))
    }
}
