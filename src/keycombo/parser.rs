//! Key combination parser
//!
//! Turns strings such as `"Alt_L(Tab) +shift a -shift"` into an ordered
//! list of press/release events. The parser remembers which keys are down
//! across calls so that `+key` in one command can be matched by `-key`
//! in a later one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent<K> {
    /// Key identifier: a key name or a raw OS keycode
    pub key: K,
    /// `true` for a press, `false` for a release
    pub pressed: bool,
}

impl<K> KeyEvent<K> {
    pub fn press(key: K) -> Self {
        Self { key, pressed: true }
    }

    pub fn release(key: K) -> Self {
        Self {
            key,
            pressed: false,
        }
    }
}

/// Errors raised while parsing a key combination
///
/// `context` is the full combination with the offending token wrapped in
/// brackets; `offset` is the token's character offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyComboError {
    #[error("unknown key in \"{context}\"")]
    UnknownKey { offset: usize, context: String },

    #[error("key \"{key}\" already pressed in \"{context}\"")]
    AlreadyPressed {
        key: String,
        offset: usize,
        context: String,
    },

    #[error("key \"{key}\" already released in \"{context}\"")]
    AlreadyReleased {
        key: String,
        offset: usize,
        context: String,
    },

    #[error("unbalanced \")\" in \"{context}\"")]
    UnbalancedClose { offset: usize, context: String },

    #[error("unbalanced \"(\" in \"{context}\"")]
    UnbalancedOpen { offset: usize, context: String },

    #[error("invalid character \"{token}\" in \"{context}\"")]
    InvalidCharacter {
        token: String,
        offset: usize,
        context: String,
    },
}

impl KeyComboError {
    /// Character offset of the offending token
    pub fn offset(&self) -> usize {
        match self {
            Self::UnknownKey { offset, .. }
            | Self::AlreadyPressed { offset, .. }
            | Self::AlreadyReleased { offset, .. }
            | Self::UnbalancedClose { offset, .. }
            | Self::UnbalancedOpen { offset, .. }
            | Self::InvalidCharacter { offset, .. } => *offset,
        }
    }

    /// Grammar errors, as opposed to errors about key state or names
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            Self::UnbalancedClose { .. } | Self::UnbalancedOpen { .. } | Self::InvalidCharacter { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Space,
    /// `key`: press then release
    Tap(String),
    /// `+key`
    Press(String),
    /// `-key`
    Release(String),
    /// `key(`: press and hold until the matching `)`
    Hold(String),
    Close,
    Invalid(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
    len: usize,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(chars: &[char]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let start = i;
        let c = chars[i];
        let kind = if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            TokenKind::Space
        } else if (c == '+' || c == '-') && chars.get(i + 1).copied().is_some_and(is_word) {
            i += 1;
            while i < chars.len() && is_word(chars[i]) {
                i += 1;
            }
            let name: String = chars[start + 1..i].iter().collect();
            if c == '+' {
                TokenKind::Press(name)
            } else {
                TokenKind::Release(name)
            }
        } else if is_word(c) {
            while i < chars.len() && is_word(chars[i]) {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if chars.get(j) == Some(&'(') {
                i = j + 1;
                TokenKind::Hold(name)
            } else {
                TokenKind::Tap(name)
            }
        } else if c == ')' {
            i += 1;
            TokenKind::Close
        } else {
            i += 1;
            TokenKind::Invalid(c.to_string())
        };
        tokens.push(Token {
            kind,
            offset: start,
            len: i - start,
        });
    }
    tokens
}

/// Stateful key combination parser
///
/// `resolve` maps a lower-cased key name to a key identifier; returning
/// `None` makes the name an unknown key.
pub struct KeyCombo<K, F> {
    down_keys: Vec<K>,
    resolve: F,
}

/// Parser that keeps key names as identifiers
pub type NameCombo = KeyCombo<String, fn(&str) -> Option<String>>;

fn name_identity(name: &str) -> Option<String> {
    Some(name.to_string())
}

impl NameCombo {
    /// Parser over plain key names, accepting any name
    pub fn by_name() -> Self {
        KeyCombo::new(name_identity as fn(&str) -> Option<String>)
    }
}

impl<K, F> KeyCombo<K, F>
where
    K: Clone + PartialEq,
    F: Fn(&str) -> Option<K>,
{
    pub fn new(resolve: F) -> Self {
        Self {
            down_keys: Vec::new(),
            resolve,
        }
    }

    /// Whether any key is currently held down
    pub fn is_active(&self) -> bool {
        !self.down_keys.is_empty()
    }

    /// Keys currently held down, in press order
    pub fn down_keys(&self) -> &[K] {
        &self.down_keys
    }

    /// Release every held key, most recently pressed first
    pub fn reset(&mut self) -> Vec<KeyEvent<K>> {
        self.down_keys.drain(..).rev().map(KeyEvent::release).collect()
    }

    /// Parse a combination into key events
    ///
    /// On error, the held-key state is left as it was before the call.
    pub fn parse(&mut self, combo: &str) -> Result<Vec<KeyEvent<K>>, KeyComboError> {
        let chars: Vec<char> = combo.chars().collect();
        let context = |token: &Token| -> String {
            let before: String = chars[..token.offset].iter().collect();
            let inner: String = chars[token.offset..token.offset + token.len].iter().collect();
            let after: String = chars[token.offset + token.len..].iter().collect();
            format!("{before}[{inner}]{after}")
        };

        let mut down_keys = self.down_keys.clone();
        let mut events = Vec::new();
        let mut hold_stack: Vec<(K, String, Token)> = Vec::new();

        for token in tokenize(&chars) {
            let (name, press, release, hold) = match &token.kind {
                TokenKind::Space => continue,
                TokenKind::Tap(name) => (name, true, true, false),
                TokenKind::Press(name) => (name, true, false, false),
                TokenKind::Release(name) => (name, false, true, false),
                TokenKind::Hold(name) => (name, true, false, true),
                TokenKind::Close => {
                    let Some((key, name, _)) = hold_stack.pop() else {
                        return Err(KeyComboError::UnbalancedClose {
                            offset: token.offset,
                            context: context(&token),
                        });
                    };
                    let Some(pos) = down_keys.iter().position(|k| *k == key) else {
                        return Err(KeyComboError::AlreadyReleased {
                            key: name,
                            offset: token.offset,
                            context: context(&token),
                        });
                    };
                    down_keys.remove(pos);
                    events.push(KeyEvent::release(key));
                    continue;
                }
                TokenKind::Invalid(c) => {
                    return Err(KeyComboError::InvalidCharacter {
                        token: c.clone(),
                        offset: token.offset,
                        context: context(&token),
                    });
                }
            };

            let name = name.to_lowercase();
            let Some(key) = (self.resolve)(&name) else {
                return Err(KeyComboError::UnknownKey {
                    offset: token.offset,
                    context: context(&token),
                });
            };

            if press {
                if down_keys.contains(&key) {
                    return Err(KeyComboError::AlreadyPressed {
                        key: name,
                        offset: token.offset,
                        context: context(&token),
                    });
                }
                events.push(KeyEvent::press(key.clone()));
                down_keys.push(key.clone());
            }

            if release {
                let Some(pos) = down_keys.iter().position(|k| *k == key) else {
                    return Err(KeyComboError::AlreadyReleased {
                        key: name,
                        offset: token.offset,
                        context: context(&token),
                    });
                };
                down_keys.remove(pos);
                events.push(KeyEvent::release(key.clone()));
            }

            if hold {
                hold_stack.push((key, name, token));
            }
        }

        if let Some((_, _, token)) = hold_stack.pop() {
            return Err(KeyComboError::UnbalancedOpen {
                offset: token.offset,
                context: context(&token),
            });
        }

        self.down_keys = down_keys;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(name: &str) -> KeyEvent<String> {
        KeyEvent::press(name.to_string())
    }

    fn release(name: &str) -> KeyEvent<String> {
        KeyEvent::release(name.to_string())
    }

    #[test]
    fn test_hold_group() {
        let mut combo = NameCombo::by_name();
        let events = combo.parse("Alt_L(Tab)").unwrap();
        assert_eq!(
            events,
            vec![press("alt_l"), press("tab"), release("tab"), release("alt_l")]
        );
        assert!(!combo.is_active());
    }

    #[test]
    fn test_hold_group_with_space_before_paren() {
        let mut combo = NameCombo::by_name();
        let events = combo.parse("control_l (a b)").unwrap();
        assert_eq!(
            events,
            vec![
                press("control_l"),
                press("a"),
                release("a"),
                press("b"),
                release("b"),
                release("control_l"),
            ]
        );
    }

    #[test]
    fn test_nested_groups() {
        let mut combo = NameCombo::by_name();
        let events = combo.parse("shift_l(control_l(x))").unwrap();
        assert_eq!(
            events,
            vec![
                press("shift_l"),
                press("control_l"),
                press("x"),
                release("x"),
                release("control_l"),
                release("shift_l"),
            ]
        );
    }

    #[test]
    fn test_unclosed_group_is_syntax_error() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("Alt_L(Tab").unwrap_err();
        assert!(matches!(err, KeyComboError::UnbalancedOpen { offset: 0, .. }));
        assert!(err.is_syntax_error());
        assert!(!combo.is_active());
    }

    #[test]
    fn test_unmatched_close_is_syntax_error() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("a )").unwrap_err();
        assert!(matches!(err, KeyComboError::UnbalancedClose { offset: 2, .. }));
        assert_eq!(err.to_string(), "unbalanced \")\" in \"a [)]\"");
    }

    #[test]
    fn test_repeated_tap_is_allowed() {
        let mut combo = NameCombo::by_name();
        let events = combo.parse("shift shift").unwrap();
        assert_eq!(
            events,
            vec![press("shift"), release("shift"), press("shift"), release("shift")]
        );
    }

    #[test]
    fn test_double_press_reports_second_token() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("+shift +shift").unwrap_err();
        assert_eq!(
            err,
            KeyComboError::AlreadyPressed {
                key: "shift".to_string(),
                offset: 7,
                context: "+shift [+shift]".to_string(),
            }
        );
        // Failed parses leave no key down
        assert!(!combo.is_active());
    }

    #[test]
    fn test_release_without_press() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("-a").unwrap_err();
        assert!(matches!(err, KeyComboError::AlreadyReleased { .. }));
        assert_eq!(err.to_string(), "key \"a\" already released in \"[-a]\"");
    }

    #[test]
    fn test_down_keys_persist_across_calls() {
        let mut combo = NameCombo::by_name();
        assert_eq!(combo.parse("+shift_l").unwrap(), vec![press("shift_l")]);
        assert!(combo.is_active());
        assert_eq!(combo.parse("a -shift_l").unwrap(), vec![
            press("a"),
            release("a"),
            release("shift_l"),
        ]);
        assert!(!combo.is_active());
    }

    #[test]
    fn test_reset_releases_in_reverse_order() {
        let mut combo = NameCombo::by_name();
        combo.parse("+a +b +c").unwrap();
        assert_eq!(combo.reset(), vec![release("c"), release("b"), release("a")]);
        assert!(combo.reset().is_empty());
    }

    #[test]
    fn test_invalid_character() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("a * b").unwrap_err();
        assert!(matches!(err, KeyComboError::InvalidCharacter { offset: 2, .. }));
    }

    #[test]
    fn test_unknown_key_with_resolver() {
        let mut combo = KeyCombo::new(|name: &str| match name {
            "a" => Some(0u16),
            "tab" => Some(48u16),
            _ => None,
        });
        assert_eq!(
            combo.parse("A tab").unwrap(),
            vec![
                KeyEvent::press(0),
                KeyEvent::release(0),
                KeyEvent::press(48),
                KeyEvent::release(48),
            ]
        );
        let err = combo.parse("a nope").unwrap_err();
        assert_eq!(
            err,
            KeyComboError::UnknownKey {
                offset: 2,
                context: "a [nope]".to_string(),
            }
        );
    }

    #[test]
    fn test_offsets_count_characters() {
        let mut combo = NameCombo::by_name();
        let err = combo.parse("é -é").unwrap_err();
        assert_eq!(err.offset(), 2);
    }
}
