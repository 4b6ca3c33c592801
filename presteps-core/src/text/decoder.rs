//! Page decoding: positioned text runs from PDF content streams
//!
//! Object parsing and stream filters are delegated to `lopdf`; this module
//! interprets the text-related operators of each page content stream,
//! tracking the text state, the text and line matrices and the current
//! transformation matrix, and emits one [`TextRun`] per text-showing
//! operation.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use super::fonts::FontInfo;
use super::objects::{as_dict, dict_get, name, number, page_resources, resolve, resource, stream_data};
use crate::config::DecodeOptions;
use crate::document::TextRun;
use crate::error::DecodeError;
use crate::geometry::BoundingBox;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Descent and ascent of a glyph box, as fractions of the font size
const DESCENT: f64 = 0.2;
const ASCENT: f64 = 0.8;

/// Nesting limit for form XObjects drawn from other forms
const MAX_FORM_DEPTH: usize = 8;

/// Name used in errors when decoding bytes with no filename
pub const UNNAMED_DOCUMENT: &str = "<memory>";

/// Text runs of a whole document plus its page count
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDocument {
    pub page_count: usize,
    pub runs: Vec<TextRun>,
}

/// Text state and graphics state parameters that affect text placement
#[derive(Clone)]
struct TextState {
    text_matrix: [f64; 6],
    text_line_matrix: [f64; 6],
    ctm: [f64; 6],
    leading: f64,
    char_space: f64,
    word_space: f64,
    horizontal_scale: f64,
    text_rise: f64,
    font_size: f64,
    font: Option<Rc<FontInfo>>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            ctm: IDENTITY,
            leading: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scale: 100.0,
            text_rise: 0.0,
            font_size: 0.0,
            font: None,
        }
    }
}

/// Pieces of a `TJ` array
enum TextPart<'o> {
    Bytes(&'o [u8]),
    Adjust(f64),
}

/// Extracts raw positioned text runs from PDF bytes
#[derive(Debug, Clone, Default)]
pub struct PageDecoder {
    options: DecodeOptions,
}

impl PageDecoder {
    /// Create a decoder with default options (force disabled)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode all text runs of a document
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<TextRun>, DecodeError> {
        self.decode_document(bytes, UNNAMED_DOCUMENT)
            .map(|decoded| decoded.runs)
    }

    /// Decode all text runs of a document, naming it in errors
    pub fn decode_document(&self, bytes: &[u8], document: &str) -> Result<DecodedDocument, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty {
                document: document.to_string(),
            });
        }

        let mut doc = match Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) if trailer_declares_encryption(bytes) => {
                return Err(if self.options.force {
                    DecodeError::Decryption {
                        document: document.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    DecodeError::Encrypted {
                        document: document.to_string(),
                    }
                });
            }
            Err(e) => {
                return Err(DecodeError::Malformed {
                    document: document.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        // Only the newest trailer counts; an update may have dropped encryption
        let encrypted = doc.trailer.get(b"Encrypt").is_ok();
        if encrypted {
            if !self.options.force {
                return Err(DecodeError::Encrypted {
                    document: document.to_string(),
                });
            }
            if doc.is_encrypted() {
                debug!(document, "decrypting with the empty user password");
                doc.decrypt("").map_err(|e| DecodeError::Decryption {
                    document: document.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(DecodeError::NoPages {
                document: document.to_string(),
            });
        }

        let mut runs = Vec::new();
        let mut content_bytes = 0usize;
        for (index, page_id) in pages.values().enumerate() {
            let content = match doc.get_page_content(*page_id) {
                Ok(content) => content,
                Err(e) => {
                    warn!(document, page = index, error = %e, "unreadable page content, skipping page");
                    continue;
                }
            };
            content_bytes += content.len();
            let before = runs.len();
            self.decode_page(&doc, *page_id, index, &content, &mut runs);
            debug!(document, page = index, runs = runs.len() - before, "decoded page");
        }

        if encrypted && runs.is_empty() && content_bytes > 0 {
            return Err(DecodeError::Decryption {
                document: document.to_string(),
                reason: "content streams present but no text could be decoded".to_string(),
            });
        }

        Ok(DecodedDocument {
            page_count: pages.len(),
            runs,
        })
    }

    fn decode_page(&self, doc: &Document, page_id: ObjectId, page: usize, content: &[u8], runs: &mut Vec<TextRun>) {
        let operations = match Content::decode(content) {
            Ok(content) => content.operations,
            Err(e) => {
                warn!(page, error = %e, "content stream could not be parsed, skipping page");
                return;
            }
        };

        let mut interpreter = Interpreter {
            doc,
            page,
            space_threshold: self.options.space_threshold,
            fonts: HashMap::new(),
            runs,
        };
        let mut state = TextState::default();
        interpreter.run(&operations, page_resources(doc, page_id), &mut state, 0);
    }
}

struct Interpreter<'a, 'r> {
    doc: &'a Document,
    page: usize,
    space_threshold: f64,
    fonts: HashMap<Vec<u8>, Rc<FontInfo>>,
    runs: &'r mut Vec<TextRun>,
}

impl<'a, 'r> Interpreter<'a, 'r> {
    fn run(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>, state: &mut TextState, depth: usize) {
        let mut stack: Vec<TextState> = Vec::new();
        // Font cache keys are only valid for one resource dictionary
        let saved_fonts = std::mem::take(&mut self.fonts);

        for op in operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        let (tm, tlm) = (state.text_matrix, state.text_line_matrix);
                        *state = saved;
                        state.text_matrix = tm;
                        state.text_line_matrix = tlm;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        state.ctm = multiply_matrix(&m, &state.ctm);
                    }
                }
                "BT" => {
                    state.text_matrix = IDENTITY;
                    state.text_line_matrix = IDENTITY;
                }
                "ET" => {}
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        state.text_matrix = m;
                        state.text_line_matrix = m;
                    }
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                        move_text(state, tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                        state.leading = -ty;
                        move_text(state, tx, ty);
                    }
                }
                "T*" => next_line(state),
                "Tc" => set(&mut state.char_space, operands),
                "Tw" => set(&mut state.word_space, operands),
                "Tz" => set(&mut state.horizontal_scale, operands),
                "TL" => set(&mut state.leading, operands),
                "Ts" => set(&mut state.text_rise, operands),
                "Tf" => {
                    if let Some(font_name) = operands.first().and_then(name) {
                        state.font = Some(self.font(resources, font_name));
                    }
                    set(&mut state.font_size, &operands[operands.len().min(1)..]);
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(state, &[TextPart::Bytes(bytes)]);
                    }
                }
                "'" => {
                    next_line(state);
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(state, &[TextPart::Bytes(bytes)]);
                    }
                }
                "\"" => {
                    set(&mut state.word_space, operands);
                    set(&mut state.char_space, &operands[operands.len().min(1)..]);
                    next_line(state);
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(state, &[TextPart::Bytes(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let parts: Vec<TextPart> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(TextPart::Bytes(bytes)),
                                other => number(other).map(TextPart::Adjust),
                            })
                            .collect();
                        self.show(state, &parts);
                    }
                }
                "Do" => {
                    if let (Some(xobject), Some(resources)) = (operands.first().and_then(name), resources) {
                        self.draw_form(xobject, resources, state, depth);
                    }
                }
                _ => {}
            }
        }

        self.fonts = saved_fonts;
    }

    fn font(&mut self, resources: Option<&'a Dictionary>, font_name: &[u8]) -> Rc<FontInfo> {
        if let Some(font) = self.fonts.get(font_name) {
            return font.clone();
        }
        let label = String::from_utf8_lossy(font_name).into_owned();
        let font = resources
            .and_then(|r| resource(self.doc, r, b"Font", font_name))
            .map(|object| resolve(self.doc, object))
            .and_then(as_dict)
            .map(|dict| FontInfo::load(self.doc, &label, dict))
            .unwrap_or_else(|| {
                debug!(font = %label, "font resource not found, using fallback encoding");
                FontInfo::fallback(&label)
            });
        let font = Rc::new(font);
        self.fonts.insert(font_name.to_vec(), font.clone());
        font
    }

    fn draw_form(&mut self, xobject: &[u8], resources: &'a Dictionary, state: &mut TextState, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            warn!(page = self.page, "form XObject nesting too deep, skipping");
            return;
        }
        let Some(Object::Stream(stream)) =
            resource(self.doc, resources, b"XObject", xobject).map(|o| resolve(self.doc, o))
        else {
            return;
        };
        if dict_get(self.doc, &stream.dict, b"Subtype").and_then(name) != Some(&b"Form"[..]) {
            return;
        }

        let operations = match Content::decode(&stream_data(stream)) {
            Ok(content) => content.operations,
            Err(e) => {
                warn!(page = self.page, error = %e, "form XObject could not be parsed");
                return;
            }
        };
        let form_resources = dict_get(self.doc, &stream.dict, b"Resources")
            .and_then(as_dict)
            .or(Some(resources));

        let mut form_state = state.clone();
        if let Some(Object::Array(items)) = dict_get(self.doc, &stream.dict, b"Matrix") {
            if let Some(m) = matrix_operands(items) {
                form_state.ctm = multiply_matrix(&m, &state.ctm);
            }
        }
        self.run(&operations, form_resources, &mut form_state, depth + 1);
    }

    /// Emit one run for a text-showing operation and advance the text matrix
    fn show(&mut self, state: &mut TextState, parts: &[TextPart]) {
        let font = state
            .font
            .clone()
            .unwrap_or_else(|| Rc::new(FontInfo::fallback("unknown")));
        let font_size = state.font_size;
        let scale = state.horizontal_scale / 100.0;
        let start = state.text_matrix;

        let mut text = String::new();
        let mut advance = 0.0;
        for part in parts {
            match part {
                TextPart::Bytes(bytes) => {
                    for glyph in font.glyphs(bytes) {
                        text.push_str(&glyph.text);
                        let mut width = glyph.width * font_size + state.char_space;
                        if glyph.is_space {
                            width += state.word_space;
                        }
                        advance += width * scale;
                    }
                }
                TextPart::Adjust(amount) => {
                    let shift = -amount / 1000.0;
                    if shift > self.space_threshold && !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                    advance += shift * font_size * scale;
                }
            }
        }
        state.text_matrix = multiply_matrix(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &state.text_matrix);

        let text = clean_run_text(&text);
        if text.is_empty() {
            return;
        }

        let to_user = multiply_matrix(&start, &state.ctm);
        let bottom = state.text_rise - DESCENT * font_size;
        let top = state.text_rise + ASCENT * font_size;
        let corners = [
            transform_point(0.0, bottom, &to_user),
            transform_point(advance, bottom, &to_user),
            transform_point(0.0, top, &to_user),
            transform_point(advance, top, &to_user),
        ];
        let bbox = corners
            .iter()
            .skip(1)
            .fold(BoundingBox::from_corners(corners[0], corners[0]), |acc, &p| {
                acc.union(&BoundingBox::from_corners(p, p))
            })
            .with_min_extent(0.01);

        self.runs.push(TextRun {
            page: self.page,
            text,
            bbox,
            font: font.name().to_string(),
            font_size: font_size * to_user[2].hypot(to_user[3]),
        });
    }
}

/// Whether the last classic `trailer` dictionary has an `/Encrypt` entry.
///
/// Used only when the backend cannot load the file, so encrypted object
/// streams are still reported as protected rather than malformed.
fn trailer_declares_encryption(bytes: &[u8]) -> bool {
    let Some(start) = rfind(bytes, b"trailer") else {
        return false;
    };
    let tail = &bytes[start..];
    let end = find(tail, b"startxref").unwrap_or(tail.len());
    find(&tail[..end], b"/Encrypt").is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

fn operand(operands: &[Object], index: usize) -> Option<f64> {
    operands.get(index).and_then(number)
}

fn set(target: &mut f64, operands: &[Object]) {
    if let Some(value) = operand(operands, 0) {
        *target = value;
    }
}

fn matrix_operands(operands: &[Object]) -> Option<[f64; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, value) in m.iter_mut().zip(operands) {
        *slot = number(value)?;
    }
    Some(m)
}

fn move_text(state: &mut TextState, tx: f64, ty: f64) {
    let m = multiply_matrix(&[1.0, 0.0, 0.0, 1.0, tx, ty], &state.text_line_matrix);
    state.text_matrix = m;
    state.text_line_matrix = m;
}

fn next_line(state: &mut TextState) {
    let leading = state.leading;
    move_text(state, 0.0, -leading);
}

/// Drop control characters and map tabs and no-break spaces to spaces
fn clean_run_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' | '\u{00A0}' => Some(' '),
            '\u{FFFD}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Multiply two transformation matrices
fn multiply_matrix(a: &[f64; 6], b: &[f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

/// Transform a point using a transformation matrix
fn transform_point(x: f64, y: f64, matrix: &[f64; 6]) -> (f64, f64) {
    let tx = matrix[0] * x + matrix[2] * y + matrix[4];
    let ty = matrix[1] * x + matrix[3] * y + matrix[5];
    (tx, ty)
}
