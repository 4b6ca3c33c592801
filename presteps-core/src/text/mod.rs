//! Text decoding layer: turns PDF bytes into positioned text runs

pub mod cmap;
pub mod decoder;
pub mod encoding;
pub mod fonts;
mod objects;

pub use cmap::ToUnicodeCMap;
pub use decoder::{DecodedDocument, PageDecoder};
pub use encoding::TextEncoding;
pub use fonts::{FontInfo, Glyph};
