//! Key name tables shared by the parser and the output layouts
//!
//! Names follow the X11 keysym naming convention, lower-cased, which is
//! what key combination strings use.

use std::collections::HashMap;

/// Named keys that stand for a printable character.
const NAMED_CHARS: &[(&str, char)] = &[
    ("aacute", 'á'),
    ("acircumflex", 'â'),
    ("acute", '´'),
    ("adiaeresis", 'ä'),
    ("ae", 'æ'),
    ("agrave", 'à'),
    ("ampersand", '&'),
    ("apostrophe", '\''),
    ("aring", 'å'),
    ("asciicircum", '^'),
    ("asciitilde", '~'),
    ("asterisk", '*'),
    ("at", '@'),
    ("atilde", 'ã'),
    ("backslash", '\\'),
    ("bar", '|'),
    ("braceleft", '{'),
    ("braceright", '}'),
    ("bracketleft", '['),
    ("bracketright", ']'),
    ("brokenbar", '¦'),
    ("ccedilla", 'ç'),
    ("cedilla", '¸'),
    ("cent", '¢'),
    ("colon", ':'),
    ("comma", ','),
    ("copyright", '©'),
    ("currency", '¤'),
    ("degree", '°'),
    ("diaeresis", '¨'),
    ("division", '÷'),
    ("dollar", '$'),
    ("eacute", 'é'),
    ("ecircumflex", 'ê'),
    ("ediaeresis", 'ë'),
    ("egrave", 'è'),
    ("equal", '='),
    ("eth", 'ð'),
    ("exclam", '!'),
    ("exclamdown", '¡'),
    ("grave", '`'),
    ("greater", '>'),
    ("guillemotleft", '«'),
    ("guillemotright", '»'),
    ("iacute", 'í'),
    ("icircumflex", 'î'),
    ("idiaeresis", 'ï'),
    ("igrave", 'ì'),
    ("less", '<'),
    ("macron", '¯'),
    ("masculine", 'º'),
    ("minus", '-'),
    ("mu", 'µ'),
    ("multiply", '×'),
    ("nobreakspace", '\u{a0}'),
    ("notsign", '¬'),
    ("ntilde", 'ñ'),
    ("numbersign", '#'),
    ("oacute", 'ó'),
    ("ocircumflex", 'ô'),
    ("odiaeresis", 'ö'),
    ("ograve", 'ò'),
    ("onehalf", '½'),
    ("onequarter", '¼'),
    ("ooblique", 'Ø'),
    ("ordfeminine", 'ª'),
    ("oslash", 'ø'),
    ("otilde", 'õ'),
    ("paragraph", '¶'),
    ("parenleft", '('),
    ("parenright", ')'),
    ("percent", '%'),
    ("period", '.'),
    ("periodcentered", '·'),
    ("plus", '+'),
    ("plusminus", '±'),
    ("question", '?'),
    ("questiondown", '¿'),
    ("quotedbl", '"'),
    ("quoteleft", '`'),
    ("quoteright", '\''),
    ("registered", '®'),
    ("return", '\r'),
    ("section", '§'),
    ("semicolon", ';'),
    ("slash", '/'),
    ("space", ' '),
    ("ssharp", 'ß'),
    ("sterling", '£'),
    ("tab", '\t'),
    ("thorn", 'þ'),
    ("threequarters", '¾'),
    ("uacute", 'ú'),
    ("ucircumflex", 'û'),
    ("udiaeresis", 'ü'),
    ("ugrave", 'ù'),
    ("underscore", '_'),
    ("yacute", 'ý'),
    ("ydiaeresis", 'ÿ'),
    ("yen", '¥'),
];

/// Character produced by a key name, if it names a printable key.
///
/// Single ASCII letters and digits name themselves.
pub fn keyname_to_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            return Some(c);
        }
    }
    NAMED_CHARS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
}

/// Key name for a character, the inverse of [`keyname_to_char`].
///
/// Characters with several names resolve to the first one listed.
pub fn char_to_keyname(c: char) -> Option<String> {
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
        return Some(c.to_string());
    }
    NAMED_CHARS
        .iter()
        .find(|(_, ch)| *ch == c)
        .map(|(n, _)| (*n).to_string())
}

/// Add the usual aliases for modifier keys to a name → code table.
///
/// - `control`, `shift`, `super` and `alt` alias their `_l` variant
/// - `command` and `windows` alias `super`
/// - `option` aliases `alt`
///
/// Modifiers missing from the table are skipped.
pub fn add_modifier_aliases<K: Clone>(table: &mut HashMap<String, K>) {
    for (name, extra) in [
        ("control", &[][..]),
        ("shift", &[][..]),
        ("super", &["command", "windows"][..]),
        ("alt", &["option"][..]),
    ] {
        let Some(code) = table.get(&format!("{name}_l")).cloned() else {
            continue;
        };
        table.insert(name.to_string(), code.clone());
        for alias in extra {
            table.insert((*alias).to_string(), code.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_name_themselves() {
        assert_eq!(keyname_to_char("a"), Some('a'));
        assert_eq!(keyname_to_char("7"), Some('7'));
        assert_eq!(char_to_keyname('q').as_deref(), Some("q"));
    }

    #[test]
    fn test_named_characters() {
        assert_eq!(keyname_to_char("braceleft"), Some('{'));
        assert_eq!(keyname_to_char("eacute"), Some('é'));
        assert_eq!(char_to_keyname('{').as_deref(), Some("braceleft"));
        assert_eq!(keyname_to_char("f1"), None);
    }

    #[test]
    fn test_modifier_aliases() {
        let mut table = HashMap::new();
        table.insert("alt_l".to_string(), 58u16);
        table.insert("super_l".to_string(), 55u16);
        table.insert("shift_l".to_string(), 56u16);
        add_modifier_aliases(&mut table);

        assert_eq!(table.get("alt"), Some(&58));
        assert_eq!(table.get("option"), Some(&58));
        assert_eq!(table.get("command"), Some(&55));
        assert_eq!(table.get("windows"), Some(&55));
        assert_eq!(table.get("shift"), Some(&56));
        // No control_l in the table, so no alias either
        assert!(!table.contains_key("control"));
    }
}
