//! ToUnicode CMap support
//!
//! Parses the `bfchar`/`bfrange` sections of a ToUnicode stream and maps
//! character codes of a show-text string to Unicode text.

use std::collections::HashMap;

/// Character code range from a `codespacerange` section
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl CodeRange {
    /// Check if a code is within this range
    pub fn contains(&self, code: &[u8]) -> bool {
        if code.len() != self.start.len() || code.len() != self.end.len() {
            return false;
        }
        code.iter()
            .zip(self.start.iter().zip(&self.end))
            .all(|(c, (lo, hi))| c >= lo && c <= hi)
    }
}

#[derive(Debug, Clone)]
enum RangeTarget {
    /// Destination of the first code; later codes increment the last
    /// UTF-16 unit
    Offset(Vec<u16>),
    /// One destination per code
    Array(Vec<String>),
}

#[derive(Debug, Clone)]
struct RangeMapping {
    start: Vec<u8>,
    end: Vec<u8>,
    target: RangeTarget,
}

/// A parsed ToUnicode CMap
#[derive(Debug, Clone, Default)]
pub struct ToUnicodeCMap {
    codespace_ranges: Vec<CodeRange>,
    singles: HashMap<Vec<u8>, String>,
    ranges: Vec<RangeMapping>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

impl ToUnicodeCMap {
    /// Parse CMap program text. Unknown operators are ignored, so a broken
    /// section only loses its own mappings.
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = Self::default();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while let (Some(Token::Hex(start)), Some(Token::Hex(end))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.codespace_ranges.push(CodeRange {
                            start: start.clone(),
                            end: end.clone(),
                        });
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.singles.insert(src.clone(), utf16_be_to_string(dst));
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    loop {
                        let (Some(Token::Hex(start)), Some(Token::Hex(end))) =
                            (tokens.get(i), tokens.get(i + 1))
                        else {
                            break;
                        };
                        match tokens.get(i + 2) {
                            Some(Token::Hex(dst)) => {
                                cmap.ranges.push(RangeMapping {
                                    start: start.clone(),
                                    end: end.clone(),
                                    target: RangeTarget::Offset(utf16_units(dst)),
                                });
                                i += 3;
                            }
                            Some(Token::ArrayStart) => {
                                let mut targets = Vec::new();
                                let mut j = i + 3;
                                while let Some(Token::Hex(dst)) = tokens.get(j) {
                                    targets.push(utf16_be_to_string(dst));
                                    j += 1;
                                }
                                cmap.ranges.push(RangeMapping {
                                    start: start.clone(),
                                    end: end.clone(),
                                    target: RangeTarget::Array(targets),
                                });
                                // Skip the closing bracket
                                i = j + 1;
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        cmap
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.ranges.is_empty()
    }

    /// Code length in bytes for the code starting at `bytes[0]`
    fn code_length(&self, bytes: &[u8]) -> usize {
        for len in 1..=4.min(bytes.len()) {
            if self
                .codespace_ranges
                .iter()
                .any(|range| range.contains(&bytes[..len]))
            {
                return len;
            }
        }
        // No codespace declared: infer from the mappings
        self.singles
            .keys()
            .map(|k| k.len())
            .chain(self.ranges.iter().map(|r| r.start.len()))
            .next()
            .unwrap_or(1)
            .min(bytes.len())
            .max(1)
    }

    /// Unicode text for a single code
    pub fn lookup(&self, code: &[u8]) -> Option<String> {
        if let Some(text) = self.singles.get(code) {
            return Some(text.clone());
        }
        for range in &self.ranges {
            if code.len() != range.start.len() || code < &range.start[..] || code > &range.end[..] {
                continue;
            }
            let offset = calculate_offset(code, &range.start);
            return match &range.target {
                RangeTarget::Offset(units) => {
                    let mut units = units.clone();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(offset as u16);
                    }
                    Some(String::from_utf16_lossy(&units))
                }
                RangeTarget::Array(targets) => targets.get(offset).cloned(),
            };
        }
        None
    }

    /// Split `bytes` into codes and map each. Codes without a mapping are
    /// passed to `fallback`.
    pub fn decode_with(&self, bytes: &[u8], mut fallback: impl FnMut(&[u8]) -> String) -> String {
        let mut result = String::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let len = self.code_length(&bytes[pos..]);
            let code = &bytes[pos..pos + len];
            match self.lookup(code) {
                Some(text) => result.push_str(&text),
                None => result.push_str(&fallback(code)),
            }
            pos += len;
        }
        result
    }

    /// Codes of `bytes` in order, split the same way `decode_with` does
    pub fn split_codes<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        let mut codes = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let len = self.code_length(&bytes[pos..]);
            codes.push(&bytes[pos..pos + len]);
            pos += len;
        }
        codes
    }
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => {
                tokens.push(Token::Word("<<".to_string()));
                i += 2;
            }
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |p| start + p);
                if let Some(bytes) = parse_hex(&data[start..end]) {
                    tokens.push(Token::Hex(bytes));
                }
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
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

/// Parse hex digits to bytes, ignoring whitespace; an odd trailing digit
/// is padded with zero
fn parse_hex(data: &[u8]) -> Option<Vec<u8>> {
    let digits: Vec<u8> = data
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()?;
    Some(
        digits
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
            .collect(),
    )
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [b] => *b as u16,
            _ => 0,
        })
        .collect()
}

fn utf16_be_to_string(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

/// Calculate offset between two byte arrays
fn calculate_offset(code: &[u8], start: &[u8]) -> usize {
    let mut offset = 0;
    for i in (0..code.len()).rev() {
        let diff = code[i] as usize - start[i] as usize;
        offset += diff * (256_usize.pow((code.len() - i - 1) as u32));
    }
    offset
}
