//! Character code <-> Unicode tables: WinAnsiEncoding, glyph names used by
//! `/Differences`, and `/ToUnicode` CMaps.

use std::collections::HashMap;

/// Code points WinAnsiEncoding places in 0x80..=0x9F. Unassigned slots are `None`.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('€'),
    None,
    Some('‚'),
    Some('ƒ'),
    Some('„'),
    Some('…'),
    Some('†'),
    Some('‡'),
    Some('ˆ'),
    Some('‰'),
    Some('Š'),
    Some('‹'),
    Some('Œ'),
    None,
    Some('Ž'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('•'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('˜'),
    Some('™'),
    Some('š'),
    Some('›'),
    Some('œ'),
    None,
    Some('ž'),
    Some('Ÿ'),
];

/// Decodes one byte of a simple font using WinAnsiEncoding. Bytes outside the
/// 0x80..=0x9F block map to the Latin-1 code point of the same value.
pub(crate) fn win_ansi_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => WIN_ANSI_HIGH[usize::from(byte - 0x80)].unwrap_or(char::from(byte)),
        _ => char::from(byte),
    }
}

fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    if matches!(code, 0x20..=0x7E | 0xA0..=0xFF) {
        return Some(code as u8);
    }
    WIN_ANSI_HIGH
        .iter()
        .position(|slot| *slot == Some(ch))
        .map(|index| 0x80 + index as u8)
}

/// Encodes `text` for a font using `/WinAnsiEncoding`. Returns the bytes and
/// the number of characters replaced with `?`.
pub fn encode_win_ansi(text: &str) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    let bytes = text
        .chars()
        .map(|ch| {
            win_ansi_byte(ch).unwrap_or_else(|| {
                replaced += 1;
                b'?'
            })
        })
        .collect();
    (bytes, replaced)
}

/// Resolves a glyph name from a `/Differences` array.
pub(crate) fn glyph_name_char(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("uni").filter(|hex| hex.len() == 4) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(hex) = name
        .strip_prefix('u')
        .filter(|hex| (4..=6).contains(&hex.len()))
    {
        if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            return Some(ch);
        }
    }
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_alphabetic() {
            return Some(ch);
        }
    }
    let ch = match name {
        "space" => ' ',
        "exclam" => '!',
        "quotedbl" => '"',
        "numbersign" => '#',
        "dollar" => '$',
        "percent" => '%',
        "ampersand" => '&',
        "quotesingle" => '\'',
        "parenleft" => '(',
        "parenright" => ')',
        "asterisk" => '*',
        "plus" => '+',
        "comma" => ',',
        "hyphen" | "minus" => '-',
        "period" => '.',
        "slash" => '/',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "colon" => ':',
        "semicolon" => ';',
        "less" => '<',
        "equal" => '=',
        "greater" => '>',
        "question" => '?',
        "at" => '@',
        "bracketleft" => '[',
        "backslash" => '\\',
        "bracketright" => ']',
        "asciicircum" => '^',
        "underscore" => '_',
        "grave" => '`',
        "braceleft" => '{',
        "bar" => '|',
        "braceright" => '}',
        "asciitilde" => '~',
        "bullet" => '•',
        "endash" => '\u{2013}',
        "emdash" => '\u{2014}',
        "quoteleft" => '\u{2018}',
        "quoteright" => '\u{2019}',
        "quotedblleft" => '\u{201C}',
        "quotedblright" => '\u{201D}',
        "ellipsis" => '…',
        "Euro" => '€',
        "trademark" => '™',
        "copyright" => '©',
        "registered" => '®',
        "degree" => '°',
        "fi" => '\u{FB01}',
        "fl" => '\u{FB02}',
        "eacute" => 'é',
        "egrave" => 'è',
        "agrave" => 'à',
        "ccedilla" => 'ç',
        "udieresis" => 'ü',
        "odieresis" => 'ö',
        "adieresis" => 'ä',
        "germandbls" => 'ß',
        _ => return None,
    };
    Some(ch)
}

/// Code-to-text mapping parsed from a `/ToUnicode` CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ToUnicode {
    map: HashMap<u32, String>,
    /// Widest source code seen, in bytes.
    code_len: usize,
}

enum Token<'a> {
    Hex(Vec<u8>),
    Word(&'a str),
    ArrayStart,
    ArrayEnd,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                let start = i + 1;
                let end = text[start..].find('>').map_or(bytes.len(), |off| start + off);
                tokens.push(Token::Hex(parse_hex(&text[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                i = text[i..].find('\n').map_or(bytes.len(), |off| i + off);
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'<' | b'[' | b']')
                {
                    i += 1;
                }
                tokens.push(Token::Word(&text[start..i]));
            }
        }
    }
    tokens
}

fn parse_hex(token: &str) -> Vec<u8> {
    let nibbles: Vec<u8> = token
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_text(bytes: &[u8]) -> String {
    if let [byte] = bytes {
        return char::from(*byte).to_string();
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    char::decode_utf16(units)
        .map(|ch| ch.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Destination string with its last UTF-16 unit advanced by `offset`, as
/// `bfrange` entries require.
fn offset_text(bytes: &[u8], offset: u32) -> String {
    if let [byte] = bytes {
        return char::from_u32(u32::from(*byte) + offset)
            .map(String::from)
            .unwrap_or_default();
    }
    let mut bytes = bytes.to_vec();
    if bytes.len() >= 2 {
        let n = bytes.len();
        let last = u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]);
        let [hi, lo] = last.wrapping_add(offset as u16).to_be_bytes();
        bytes[n - 2] = hi;
        bytes[n - 1] = lo;
    }
    utf16_text(&bytes)
}

impl ToUnicode {
    pub(crate) fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let tokens = tokenize(&text);
        let mut cmap = ToUnicode::default();
        let mut section = None;
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(word) if word.ends_with("beginbfchar") => section = Some("bfchar"),
                Token::Word(word) if word.ends_with("beginbfrange") => section = Some("bfrange"),
                Token::Word(word) if word.starts_with("end") => section = None,
                Token::Hex(src) if section == Some("bfchar") => {
                    if let Some(Token::Hex(dst)) = tokens.get(i + 1) {
                        cmap.insert(src, utf16_text(dst));
                        i += 1;
                    }
                }
                Token::Hex(lo) if section == Some("bfrange") => {
                    let Some(Token::Hex(hi)) = tokens.get(i + 1) else {
                        i += 1;
                        continue;
                    };
                    let (start, end) = (code_of(lo), code_of(hi));
                    match tokens.get(i + 2) {
                        Some(Token::Hex(dst)) => {
                            for code in start..=end.min(start.saturating_add(0xFFFF)) {
                                cmap.insert_code(code, lo.len(), offset_text(dst, code - start));
                            }
                            i += 2;
                        }
                        Some(Token::ArrayStart) => {
                            let mut j = i + 3;
                            let mut code = start;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= end {
                                    cmap.insert_code(code, lo.len(), utf16_text(dst));
                                }
                                code += 1;
                                j += 1;
                            }
                            // j sits on the closing bracket
                            i = j;
                        }
                        _ => i += 1,
                    }
                }
                _ => {}
            }
            i += 1;
        }
        cmap
    }

    fn insert(&mut self, src: &[u8], text: String) {
        self.insert_code(code_of(src), src.len(), text);
    }

    fn insert_code(&mut self, code: u32, len: usize, text: String) {
        self.code_len = self.code_len.max(len);
        self.map.insert(code, text);
    }

    pub(crate) fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    /// True when the CMap maps codes wider than one byte.
    pub(crate) fn is_multi_byte(&self) -> bool {
        self.code_len > 1
    }
}
