//! Invalid PDF Generators
//!
//! Byte streams that must be rejected by the decoder.

/// Not a PDF at all
pub fn garbage() -> Vec<u8> {
    b"This is a plain text file pretending to be a report.\n".to_vec()
}

/// PDF truncated in the middle of the xref table
pub fn truncated() -> Vec<u8> {
    b"%PDF-1.4\n\
      1 0 obj\n\
      << /Type /Catalog /Pages 2 0 R >>\n\
      endobj\n\
      2 0 obj\n\
      << /Type /Pages /Kids [3 0 R] /Count 1 >>\n\
      endobj\n\
      3 0 obj\n\
      << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\n\
      endobj\n\
      xref\n\
      0 4\n\
      0000000000 655"
        .to_vec()
}

/// Structurally valid file whose page tree has no kids
pub fn no_pages() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [] /Count 0 >>",
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut positions = Vec::new();
    for (index, body) in objects.iter().enumerate() {
        positions.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }
    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for pos in positions {
        pdf.extend_from_slice(format!("{pos:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}
