//! In-memory PDF fixtures
//!
//! `TestPdfBuilder` writes small valid documents with text at known
//! positions; `invalid_pdfs` produces inputs each decode error is raised for.

pub mod invalid_pdfs;
pub mod test_pdf_builder;

pub use test_pdf_builder::{FixturePage, PdfVersion, PlacedText, TestPdfBuilder};
