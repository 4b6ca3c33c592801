//! Single-byte font encodings

/// Simple font encodings named by `/Encoding` or implied by the font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextEncoding {
    StandardEncoding,
    MacRomanEncoding,
    WinAnsiEncoding,
    PdfDocEncoding,
}

impl TextEncoding {
    /// Encoding for an `/Encoding` name, if it is one of the base encodings
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"WinAnsiEncoding" => Some(TextEncoding::WinAnsiEncoding),
            b"MacRomanEncoding" => Some(TextEncoding::MacRomanEncoding),
            b"StandardEncoding" => Some(TextEncoding::StandardEncoding),
            b"PDFDocEncoding" => Some(TextEncoding::PdfDocEncoding),
            _ => None,
        }
    }

    pub fn decode(&self, data: &[u8]) -> String {
        data.iter().map(|&byte| self.decode_byte(byte)).collect()
    }

    /// Map one code to a character; unmapped codes become U+FFFD
    pub fn decode_byte(&self, byte: u8) -> char {
        match self {
            TextEncoding::WinAnsiEncoding => win_ansi(byte),
            TextEncoding::MacRomanEncoding => match byte {
                0x00..=0x7F => byte as char,
                _ => char::from_u32(MAC_ROMAN_HIGH[(byte - 0x80) as usize] as u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER),
            },
            TextEncoding::StandardEncoding => match byte {
                0x27 => '\u{2019}',
                0x60 => '\u{2018}',
                0x00..=0x7F => byte as char,
                // The upper half of StandardEncoding is mostly unused by
                // real documents; fall back to the WinAnsi reading.
                _ => win_ansi(byte),
            },
            TextEncoding::PdfDocEncoding => pdf_doc(byte),
        }
    }
}

fn win_ansi(byte: u8) -> char {
    match byte {
        0x00..=0x7F => byte as char,
        0x80 => '\u{20AC}', // Euro sign
        0x82 => '\u{201A}', // Single low quotation mark
        0x83 => '\u{0192}', // Latin small letter f with hook
        0x84 => '\u{201E}', // Double low quotation mark
        0x85 => '\u{2026}', // Horizontal ellipsis
        0x86 => '\u{2020}', // Dagger
        0x87 => '\u{2021}', // Double dagger
        0x88 => '\u{02C6}', // Circumflex accent
        0x89 => '\u{2030}', // Per mille sign
        0x8A => '\u{0160}', // Latin capital letter S with caron
        0x8B => '\u{2039}', // Single left angle quotation mark
        0x8C => '\u{0152}', // Latin capital ligature OE
        0x8E => '\u{017D}', // Latin capital letter Z with caron
        0x91 => '\u{2018}', // Left single quotation mark
        0x92 => '\u{2019}', // Right single quotation mark
        0x93 => '\u{201C}', // Left double quotation mark
        0x94 => '\u{201D}', // Right double quotation mark
        0x95 => '\u{2022}', // Bullet
        0x96 => '\u{2013}', // En dash
        0x97 => '\u{2014}', // Em dash
        0x98 => '\u{02DC}', // Small tilde
        0x99 => '\u{2122}', // Trade mark sign
        0x9A => '\u{0161}', // Latin small letter s with caron
        0x9B => '\u{203A}', // Single right angle quotation mark
        0x9C => '\u{0153}', // Latin small ligature oe
        0x9E => '\u{017E}', // Latin small letter z with caron
        0x9F => '\u{0178}', // Latin capital letter Y with diaeresis
        0xA0..=0xFF => char::from(byte),
        _ => char::REPLACEMENT_CHARACTER,
    }
}

fn pdf_doc(byte: u8) -> char {
    let code: u32 = match byte {
        0x80 => 0x2022,
        0x81 => 0x2020,
        0x82 => 0x2021,
        0x83 => 0x2026,
        0x84 => 0x2014,
        0x85 => 0x2013,
        0x86 => 0x0192,
        0x87 => 0x2044,
        0x88 => 0x2039,
        0x89 => 0x203A,
        0x8A => 0x2212,
        0x8B => 0x2030,
        0x8C => 0x201E,
        0x8D => 0x201C,
        0x8E => 0x201D,
        0x8F => 0x2018,
        0x90 => 0x2019,
        0x91 => 0x201A,
        0x92 => 0x2122,
        0x93 => 0xFB01,
        0x94 => 0xFB02,
        0x95 => 0x0141,
        0x96 => 0x0152,
        0x97 => 0x0160,
        0x98 => 0x0178,
        0x99 => 0x017D,
        0x9A => 0x0131,
        0x9B => 0x0142,
        0x9C => 0x0153,
        0x9D => 0x0161,
        0x9E => 0x017E,
        0xA0 => 0x20AC,
        0x9F => return char::REPLACEMENT_CHARACTER,
        _ => byte as u32,
    };
    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[rustfmt::skip]
const MAC_ROMAN_HIGH: [u16; 128] = [
    0x00C4, 0x00C5, 0x00C7, 0x00C9, 0x00D1, 0x00D6, 0x00DC, 0x00E1, 0x00E0, 0x00E2, 0x00E4, 0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8,
    0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF, 0x00F1, 0x00F3, 0x00F2, 0x00F4, 0x00F6, 0x00F5, 0x00FA, 0x00F9, 0x00FB, 0x00FC,
    0x2020, 0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF, 0x00AE, 0x00A9, 0x2122, 0x00B4, 0x00A8, 0x2260, 0x00C6, 0x00D8,
    0x221E, 0x00B1, 0x2264, 0x2265, 0x00A5, 0x00B5, 0x2202, 0x2211, 0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8,
    0x00BF, 0x00A1, 0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB, 0x00BB, 0x2026, 0x00A0, 0x00C0, 0x00C3, 0x00D5, 0x0152, 0x0153,
    0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA, 0x00FF, 0x0178, 0x2044, 0x20AC, 0x2039, 0x203A, 0xFB01, 0xFB02,
    0x2021, 0x00B7, 0x201A, 0x201E, 0x2030, 0x00C2, 0x00CA, 0x00C1, 0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC, 0x00D3, 0x00D4,
    0xF8FF, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC, 0x00AF, 0x02D8, 0x02D9, 0x02DA, 0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

/// Character for a glyph name used in an `/Differences` array.
///
/// Covers single-character names, `uniXXXX` names and the punctuation and
/// ligature names that show up in typical report fonts.
pub fn glyph_name_to_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }
    let c = match name {
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
        "underscore" => '_',
        "braceleft" => '{',
        "bar" => '|',
        "braceright" => '}',
        "quoteleft" => '\u{2018}',
        "quoteright" => '\u{2019}',
        "quotedblleft" => '\u{201C}',
        "quotedblright" => '\u{201D}',
        "bullet" => '\u{2022}',
        "endash" => '\u{2013}',
        "emdash" => '\u{2014}',
        "ellipsis" => '\u{2026}',
        "degree" => '\u{00B0}',
        "Euro" => '\u{20AC}',
        "fi" => '\u{FB01}',
        "fl" => '\u{FB02}',
        "ff" => '\u{FB00}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_ansi_decoding() {
        let encoding = TextEncoding::WinAnsiEncoding;
        assert_eq!(encoding.decode(b"CO2 \x93net\x94 \x80"), "CO2 \u{201C}net\u{201D} \u{20AC}");
        assert_eq!(encoding.decode(&[0xE9]), "\u{e9}");
    }

    #[test]
    fn test_mac_roman_decoding() {
        let encoding = TextEncoding::MacRomanEncoding;
        assert_eq!(encoding.decode(&[b'a', 0x8E, 0xD2]), "a\u{e9}\u{201C}");
    }

    #[test]
    fn test_standard_quotes() {
        let encoding = TextEncoding::StandardEncoding;
        assert_eq!(encoding.decode(b"it's"), "it\u{2019}s");
    }

    #[test]
    fn test_pdf_doc_decoding() {
        let encoding = TextEncoding::PdfDocEncoding;
        assert_eq!(encoding.decode(&[0x93, b'x', 0xA0]), "\u{FB01}x\u{20AC}");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            TextEncoding::from_name(b"WinAnsiEncoding"),
            Some(TextEncoding::WinAnsiEncoding)
        );
        assert_eq!(TextEncoding::from_name(b"Identity-H"), None);
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_to_char("A"), Some('A'));
        assert_eq!(glyph_name_to_char("uni20AC"), Some('\u{20AC}'));
        assert_eq!(glyph_name_to_char("quoteright"), Some('\u{2019}'));
        assert_eq!(glyph_name_to_char("g123"), None);
    }
}
