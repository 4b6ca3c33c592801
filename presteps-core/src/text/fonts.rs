//! Font resources as needed for text decoding: code-to-text mapping and
//! advance widths.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::cmap::ToUnicodeCMap;
use super::encoding::{glyph_name_to_char, TextEncoding};
use super::objects::{as_dict, dict_get, name, number, resolve, stream_data};

/// Advance used when a font carries no width information, in em
const DEFAULT_GLYPH_WIDTH: f64 = 0.5;

/// One decoded character code
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    /// Advance in em (glyph space / 1000)
    pub width: f64,
    /// Single-byte code 32, which receives word spacing
    pub is_space: bool,
}

/// Decoding information for one font resource
#[derive(Debug, Clone)]
pub struct FontInfo {
    name: String,
    encoding: TextEncoding,
    differences: HashMap<u8, char>,
    to_unicode: Option<ToUnicodeCMap>,
    composite: bool,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: Option<f64>,
}

impl FontInfo {
    /// Font used when text is shown before any `Tf`
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            encoding: TextEncoding::WinAnsiEncoding,
            differences: HashMap::new(),
            to_unicode: None,
            composite: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: None,
        }
    }

    /// Read a font dictionary
    pub fn load(doc: &Document, resource_name: &str, dict: &Dictionary) -> Self {
        let mut font = Self::fallback(resource_name);

        if let Some(base) = dict_get(doc, dict, b"BaseFont").and_then(name) {
            font.name = strip_subset_tag(&String::from_utf8_lossy(base)).to_string();
        }
        font.composite = dict_get(doc, dict, b"Subtype").and_then(name) == Some(&b"Type0"[..]);

        match dict_get(doc, dict, b"Encoding") {
            Some(Object::Name(encoding)) => {
                if let Some(encoding) = TextEncoding::from_name(encoding) {
                    font.encoding = encoding;
                }
            }
            Some(Object::Dictionary(encoding_dict)) => {
                if let Some(base) = dict_get(doc, encoding_dict, b"BaseEncoding")
                    .and_then(name)
                    .and_then(TextEncoding::from_name)
                {
                    font.encoding = base;
                }
                if let Some(Object::Array(diffs)) = dict_get(doc, encoding_dict, b"Differences") {
                    font.differences = parse_differences(diffs);
                }
            }
            _ => {}
        }

        if let Some(Object::Stream(stream)) = dict_get(doc, dict, b"ToUnicode") {
            let cmap = ToUnicodeCMap::parse(&stream_data(stream));
            if !cmap.is_empty() {
                font.to_unicode = Some(cmap);
            }
        }

        if font.composite {
            let descendant = match dict_get(doc, dict, b"DescendantFonts") {
                Some(Object::Array(fonts)) => fonts
                    .first()
                    .map(|f| resolve(doc, f))
                    .and_then(as_dict),
                _ => None,
            };
            if let Some(descendant) = descendant {
                font.default_width = dict_get(doc, descendant, b"DW")
                    .and_then(number)
                    .map(|w| w / 1000.0);
                if let Some(Object::Array(w)) = dict_get(doc, descendant, b"W") {
                    font.cid_widths = parse_cid_widths(doc, w);
                }
            }
        } else {
            font.first_char = dict_get(doc, dict, b"FirstChar")
                .and_then(number)
                .map_or(0, |n| n.max(0.0) as u32);
            if let Some(Object::Array(widths)) = dict_get(doc, dict, b"Widths") {
                font.widths = widths
                    .iter()
                    .map(|w| number(resolve(doc, w)).unwrap_or(0.0) / 1000.0)
                    .collect();
            }
        }

        font
    }

    /// Font name without subset prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode the bytes of one show-text string into glyphs
    pub fn glyphs(&self, bytes: &[u8]) -> Vec<Glyph> {
        if self.composite {
            let codes: Vec<&[u8]> = match &self.to_unicode {
                Some(cmap) => cmap.split_codes(bytes),
                None => bytes.chunks(2).collect(),
            };
            return codes
                .into_iter()
                .map(|code| {
                    let cid = code.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
                    let text = self
                        .to_unicode
                        .as_ref()
                        .and_then(|cmap| cmap.lookup(code))
                        .unwrap_or_default();
                    let width = self
                        .cid_widths
                        .get(&cid)
                        .copied()
                        .or(self.default_width)
                        .unwrap_or(DEFAULT_GLYPH_WIDTH);
                    Glyph {
                        text,
                        width,
                        is_space: false,
                    }
                })
                .collect();
        }

        if self.to_unicode.is_none() && bytes.len() >= 2 && bytes[..2] == [0xFE, 0xFF] {
            let text = String::from_utf16_lossy(
                &bytes[2..]
                    .chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect::<Vec<u16>>(),
            );
            return text
                .chars()
                .map(|c| Glyph {
                    text: c.to_string(),
                    width: DEFAULT_GLYPH_WIDTH,
                    is_space: c == ' ',
                })
                .collect();
        }

        bytes
            .iter()
            .map(|&byte| {
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|cmap| cmap.lookup(&[byte]))
                    .or_else(|| self.differences.get(&byte).map(|c| c.to_string()))
                    .unwrap_or_else(|| self.encoding.decode_byte(byte).to_string());
                Glyph {
                    text,
                    width: self.simple_width(byte),
                    is_space: byte == b' ',
                }
            })
            .collect()
    }

    fn simple_width(&self, code: u8) -> f64 {
        (code as u32)
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_GLYPH_WIDTH)
    }
}

/// Remove a six-letter subset prefix such as `ABCDEF+`
fn strip_subset_tag(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

fn parse_differences(diffs: &[Object]) -> HashMap<u8, char> {
    let mut map = HashMap::new();
    let mut code: i64 = 0;
    for item in diffs {
        match item {
            Object::Integer(start) => code = *start,
            Object::Name(glyph) => {
                if let (Ok(byte), Some(c)) = (
                    u8::try_from(code),
                    glyph_name_to_char(&String::from_utf8_lossy(glyph)),
                ) {
                    map.insert(byte, c);
                }
                code += 1;
            }
            _ => {}
        }
    }
    map
}

/// Parse a CIDFont `/W` array: `c [w1 w2 ...]` and `c_first c_last w`
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let items: Vec<&Object> = w.iter().map(|o| resolve(doc, o)).collect();
    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(items[i]) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = number(resolve(doc, width)) {
                        widths.insert(first + offset as u32, width / 1000.0);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (number(last), items.get(i + 2).and_then(|o| number(o)))
                else {
                    break;
                };
                for cid in first..=(last.max(0.0) as u32) {
                    widths.insert(cid, width / 1000.0);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_subset_tag() {
        assert_eq!(strip_subset_tag("ABCDEF+Arial-Bold"), "Arial-Bold");
        assert_eq!(strip_subset_tag("Helvetica"), "Helvetica");
        assert_eq!(strip_subset_tag("abc+Foo"), "abc+Foo");
    }

    #[test]
    fn test_fallback_font_uses_half_em() {
        let font = FontInfo::fallback("F1");
        let glyphs = font.glyphs(b"a b");
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].width, 0.5);
        assert!(glyphs[1].is_space);
        assert_eq!(glyphs[2].text, "b");
    }

    #[test]
    fn test_simple_widths() {
        let mut font = FontInfo::fallback("F1");
        font.first_char = 65;
        font.widths = vec![0.667, 0.0];
        assert_eq!(font.simple_width(b'A'), 0.667);
        // Zero width entries fall back
        assert_eq!(font.simple_width(b'B'), 0.5);
        assert_eq!(font.simple_width(b' '), 0.5);
    }

    #[test]
    fn test_differences() {
        let diffs = vec![
            Object::Integer(65),
            Object::Name(b"quoteright".to_vec()),
            Object::Name(b"fi".to_vec()),
            Object::Integer(300),
            Object::Name(b"A".to_vec()),
        ];
        let map = parse_differences(&diffs);
        assert_eq!(map.get(&65), Some(&'\u{2019}'));
        assert_eq!(map.get(&66), Some(&'\u{FB01}'));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_cid_widths() {
        let doc = Document::new();
        let w = vec![
            Object::Integer(1),
            Object::Array(vec![Object::Integer(500), Object::Integer(600)]),
            Object::Integer(10),
            Object::Integer(12),
            Object::Integer(250),
        ];
        let widths = parse_cid_widths(&doc, &w);
        assert_eq!(widths.get(&1), Some(&0.5));
        assert_eq!(widths.get(&2), Some(&0.6));
        assert_eq!(widths.get(&11), Some(&0.25));
        assert_eq!(widths.len(), 5);
    }

    #[test]
    fn test_utf16_string_without_cmap() {
        let font = FontInfo::fallback("F1");
        let glyphs = font.glyphs(&[0xFE, 0xFF, 0x00, 0x41, 0x20, 0xAC]);
        let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "A\u{20AC}");
    }
}
