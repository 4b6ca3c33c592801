//! Test Suite for presteps
//!
//! Fixture generators shared by the integration tests of the workspace
//! crates. Every document is produced in memory, so tests never depend on
//! files checked into the repository.

pub mod generators;

pub use generators::{invalid_pdfs, FixturePage, PdfVersion, PlacedText, TestPdfBuilder};

/// Common test utilities
pub mod utils {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    /// Write fixture bytes to `dir/name` and return the full path
    pub fn write_fixture<P: AsRef<Path>>(dir: P, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Single-page document holding one line of text at (72, 700)
    pub fn single_line_pdf(text: &str, font_size: f32) -> Vec<u8> {
        let mut builder = crate::TestPdfBuilder::new();
        builder.add_page(crate::FixturePage::letter().text(72.0, 700.0, font_size, text));
        builder.build()
    }
}
