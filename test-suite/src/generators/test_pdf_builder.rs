//! Test PDF Builder
//!
//! A builder for creating small, valid PDFs with text placed at known
//! coordinates, so extraction results can be asserted exactly.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

/// PDF version to generate
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PdfVersion {
    V1_4,
    V1_7,
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = match self {
            PdfVersion::V1_4 => "1.4",
            PdfVersion::V1_7 => "1.7",
        };
        write!(f, "{version}")
    }
}

/// A run of text shown with a single `Tj` at an absolute position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub font: String,
    pub font_size: f32,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// One page of a fixture document.
#[derive(Debug, Clone)]
pub struct FixturePage {
    width: f32,
    height: f32,
    runs: Vec<PlacedText>,
    raw_content: Option<String>,
}

impl FixturePage {
    /// Create an empty page of the given size
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            runs: Vec::new(),
            raw_content: None,
        }
    }

    /// Letter-sized page
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Place text with the regular font (`/F1`, Helvetica)
    pub fn text(self, x: f32, y: f32, font_size: f32, text: &str) -> Self {
        self.text_with_font("F1", x, y, font_size, text)
    }

    /// Place text with the bold font (`/F2`, Helvetica-Bold)
    pub fn bold(self, x: f32, y: f32, font_size: f32, text: &str) -> Self {
        self.text_with_font("F2", x, y, font_size, text)
    }

    /// Place text with any font resource registered on the builder
    pub fn text_with_font(mut self, font: &str, x: f32, y: f32, font_size: f32, text: &str) -> Self {
        self.runs.push(PlacedText {
            font: font.to_string(),
            font_size,
            x,
            y,
            text: text.to_string(),
        });
        self
    }

    /// Use a hand-written content stream instead of generated runs
    pub fn raw(mut self, content: &str) -> Self {
        self.raw_content = Some(content.to_string());
        self
    }

    fn content_stream(&self) -> String {
        if let Some(raw) = &self.raw_content {
            return raw.clone();
        }
        let mut content = String::new();
        for run in &self.runs {
            content.push_str(&format!(
                "BT\n/{} {} Tf\n1 0 0 1 {} {} Tm\n({}) Tj\nET\n",
                run.font,
                run.font_size,
                run.x,
                run.y,
                escape_pdf_string(&run.text)
            ));
        }
        content
    }
}

#[derive(Debug, Clone)]
struct FontResource {
    resource_name: String,
    base_font: String,
    widths: Option<(u32, Vec<u32>)>,
    to_unicode: Option<String>,
}

enum Body {
    Dict(String),
    Stream { dict: String, data: Vec<u8> },
}

/// Builder for creating test PDFs
pub struct TestPdfBuilder {
    version: PdfVersion,
    pages: Vec<FixturePage>,
    fonts: Vec<FontResource>,
    info: BTreeMap<String, String>,
    compress_streams: bool,
    encrypted: bool,
}

impl TestPdfBuilder {
    /// Create a new PDF builder with the two standard fonts registered
    pub fn new() -> Self {
        Self {
            version: PdfVersion::V1_4,
            pages: Vec::new(),
            fonts: vec![
                FontResource {
                    resource_name: "F1".to_string(),
                    base_font: "Helvetica".to_string(),
                    widths: None,
                    to_unicode: None,
                },
                FontResource {
                    resource_name: "F2".to_string(),
                    base_font: "Helvetica-Bold".to_string(),
                    widths: None,
                    to_unicode: None,
                },
            ],
            info: BTreeMap::new(),
            compress_streams: false,
            encrypted: false,
        }
    }

    /// Create a minimal valid PDF with one empty page
    pub fn minimal() -> Self {
        let mut builder = Self::new();
        builder.add_empty_page(612.0, 792.0);
        builder
    }

    /// Set PDF version
    pub fn with_version(mut self, version: PdfVersion) -> Self {
        self.version = version;
        self
    }

    /// Add document info. Ignored for encrypted output.
    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.info.insert(key.to_string(), value.to_string());
        self
    }

    /// Add title
    pub fn with_title(self, title: &str) -> Self {
        self.with_info("Title", title)
    }

    /// Register a font with explicit `/FirstChar` and `/Widths`
    pub fn with_font_widths(mut self, resource_name: &str, base_font: &str, first_char: u32, widths: Vec<u32>) -> Self {
        self.fonts.push(FontResource {
            resource_name: resource_name.to_string(),
            base_font: base_font.to_string(),
            widths: Some((first_char, widths)),
            to_unicode: None,
        });
        self
    }

    /// Register a font whose codes are mapped through a `/ToUnicode` CMap
    pub fn with_to_unicode_font(mut self, resource_name: &str, base_font: &str, cmap: &str) -> Self {
        self.fonts.push(FontResource {
            resource_name: resource_name.to_string(),
            base_font: base_font.to_string(),
            widths: None,
            to_unicode: Some(cmap.to_string()),
        });
        self
    }

    /// Add an empty page
    pub fn add_empty_page(&mut self, width: f32, height: f32) -> &mut Self {
        self.pages.push(FixturePage::new(width, height));
        self
    }

    /// Add a page with a single line of text at (100, 700)
    pub fn add_text_page(&mut self, text: &str, font_size: f32) -> &mut Self {
        self.pages
            .push(FixturePage::letter().text(100.0, 700.0, font_size, text));
        self
    }

    /// Add a fully described page
    pub fn add_page(&mut self, page: FixturePage) -> &mut Self {
        self.pages.push(page);
        self
    }

    /// Enable FlateDecode on every stream
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Protect the document with the standard security handler
    /// (RC4 40-bit, revision 2) and an empty user password.
    pub fn with_encryption(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Build the PDF
    pub fn build(&self) -> Vec<u8> {
        // Objects 1 and 2 are the catalog and the page tree root.
        let mut objects: Vec<Body> = vec![Body::Dict(String::new()), Body::Dict(String::new())];

        let mut font_entries = Vec::new();
        for font in &self.fonts {
            let to_unicode = font.to_unicode.as_ref().map(|cmap| {
                objects.push(Body::Stream {
                    dict: String::new(),
                    data: cmap.as_bytes().to_vec(),
                });
                objects.len()
            });

            let mut dict = format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{}",
                font.base_font
            );
            if let Some((first_char, widths)) = &font.widths {
                let widths: Vec<String> = widths.iter().map(|w| w.to_string()).collect();
                dict.push_str(&format!(
                    " /FirstChar {} /LastChar {} /Widths [{}]",
                    first_char,
                    *first_char as usize + widths.len().saturating_sub(1),
                    widths.join(" ")
                ));
            }
            if let Some(id) = to_unicode {
                dict.push_str(&format!(" /ToUnicode {id} 0 R"));
            }
            dict.push_str(" >>");
            objects.push(Body::Dict(dict));
            font_entries.push(format!("/{} {} 0 R", font.resource_name, objects.len()));
        }
        let resources = format!("<< /Font << {} >> >>", font_entries.join(" "));

        let mut kids = Vec::new();
        for page in &self.pages {
            let content = page.content_stream();
            let content_ref = if content.is_empty() {
                None
            } else {
                objects.push(Body::Stream {
                    dict: String::new(),
                    data: content.into_bytes(),
                });
                Some(objects.len())
            };

            let mut page_dict = format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources {}",
                page.width, page.height, resources
            );
            if let Some(id) = content_ref {
                page_dict.push_str(&format!(" /Contents {id} 0 R"));
            }
            page_dict.push_str(" >>");
            objects.push(Body::Dict(page_dict));
            kids.push(format!("{} 0 R", objects.len()));
        }

        objects[0] = Body::Dict("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        objects[1] = Body::Dict(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            kids.len()
        ));

        let mut info_obj = None;
        if !self.info.is_empty() && !self.encrypted {
            let mut info_dict = "<< ".to_string();
            for (key, value) in &self.info {
                info_dict.push_str(&format!("/{} ({}) ", key, escape_pdf_string(value)));
            }
            info_dict.push_str(">>");
            objects.push(Body::Dict(info_dict));
            info_obj = Some(objects.len());
        }

        let security = self.encrypted.then(StandardSecurity::empty_user_password);
        let mut encrypt_obj = None;
        if let Some(security) = &security {
            objects.push(Body::Dict(security.encrypt_dict()));
            encrypt_obj = Some(objects.len());
        }

        let mut pdf = Vec::new();
        pdf.extend_from_slice(format!("%PDF-{}\n", self.version).as_bytes());
        pdf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut xref_positions = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            let number = index as u32 + 1;
            xref_positions.push(pdf.len());
            match body {
                Body::Dict(dict) => {
                    pdf.extend_from_slice(format!("{number} 0 obj\n{dict}\nendobj\n").as_bytes());
                }
                Body::Stream { dict, data } => {
                    let mut data = data.clone();
                    let mut filter = "";
                    if self.compress_streams {
                        data = deflate(&data);
                        filter = " /Filter /FlateDecode";
                    }
                    if let Some(security) = &security {
                        data = rc4(&security.object_key(number, 0), &data);
                    }
                    pdf.extend_from_slice(
                        format!(
                            "{number} 0 obj\n<< /Length {}{filter}{dict} >>\nstream\n",
                            data.len()
                        )
                        .as_bytes(),
                    );
                    pdf.extend_from_slice(&data);
                    pdf.extend_from_slice(b"\nendstream\nendobj\n");
                }
            }
        }

        let xref_offset = pdf.len();
        let size = objects.len() as u32 + 1;
        write_traditional_xref(&mut pdf, &xref_positions, size);

        let mut trailer_dict = format!("<< /Size {size} /Root 1 0 R");
        if let Some(id) = info_obj {
            trailer_dict.push_str(&format!(" /Info {id} 0 R"));
        }
        if let (Some(id), Some(security)) = (encrypt_obj, &security) {
            let file_id = hex(&security.file_id);
            trailer_dict.push_str(&format!(" /Encrypt {id} 0 R /ID [<{file_id}> <{file_id}>]"));
        }
        trailer_dict.push_str(" >>");

        pdf.extend_from_slice(
            format!("trailer\n{trailer_dict}\nstartxref\n{xref_offset}\n%%EOF").as_bytes(),
        );

        pdf
    }
}

impl Default for TestPdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write traditional cross-reference table
fn write_traditional_xref(pdf: &mut Vec<u8>, positions: &[usize], size: u32) {
    pdf.extend_from_slice(b"xref\n");
    pdf.extend_from_slice(format!("0 {size}\n").as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for &pos in positions {
        pdf.extend_from_slice(format!("{pos:010} 00000 n \n").as_bytes());
    }
}

/// Escape special characters in PDF literal strings. Characters outside
/// Latin-1 are replaced with `?`.
fn escape_pdf_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            ' '..='~' => escaped.push(c),
            c if (c as u32) < 0x100 => escaped.push_str(&format!("\\{:03o}", c as u32)),
            _ => escaped.push('?'),
        }
    }
    escaped
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    match encoder.write_all(data) {
        Ok(()) => encoder.finish().unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Standard security handler values for revision 2 with an empty user
/// password and a fixed owner password.
struct StandardSecurity {
    owner_entry: [u8; 32],
    user_entry: [u8; 32],
    permissions: i32,
    file_id: [u8; 16],
    file_key: [u8; 5],
}

impl StandardSecurity {
    fn empty_user_password() -> Self {
        let permissions: i32 = -44;
        let file_id = *b"presteps-fixture";

        let owner_digest = md5::compute(pad_password(b"owner"));
        let owner_entry = to_32(&rc4(&owner_digest.0[..5], &PASSWORD_PADDING));

        let mut key_input = Vec::with_capacity(84);
        key_input.extend_from_slice(&pad_password(b""));
        key_input.extend_from_slice(&owner_entry);
        key_input.extend_from_slice(&permissions.to_le_bytes());
        key_input.extend_from_slice(&file_id);
        let digest = md5::compute(&key_input);
        let mut file_key = [0u8; 5];
        file_key.copy_from_slice(&digest.0[..5]);

        let user_entry = to_32(&rc4(&file_key, &PASSWORD_PADDING));

        Self {
            owner_entry,
            user_entry,
            permissions,
            file_id,
            file_key,
        }
    }

    fn encrypt_dict(&self) -> String {
        format!(
            "<< /Filter /Standard /V 1 /R 2 /Length 40 /O <{}> /U <{}> /P {} >>",
            hex(&self.owner_entry),
            hex(&self.user_entry),
            self.permissions
        )
    }

    fn object_key(&self, number: u32, generation: u16) -> Vec<u8> {
        let mut input = self.file_key.to_vec();
        input.extend_from_slice(&number.to_le_bytes()[..3]);
        input.extend_from_slice(&generation.to_le_bytes());
        md5::compute(&input).0[..10].to_vec()
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn to_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[..32]);
    out
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|&byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let k = state[state[i as usize].wrapping_add(state[j as usize]) as usize];
            byte ^ k
        })
        .collect()
}
