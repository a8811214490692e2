//! lopdf-backed codec for `retext-core`: page decoding, text reinsertion and
//! page rendering.

pub mod codec;
pub mod content;
pub mod encoding;
pub mod fonts;
pub mod objects;
pub mod render;
pub mod serializer;

#[cfg(test)]
mod fixtures;

pub use codec::{decode_all_pages, decode_page_bytes, LopdfCodec};
pub use fonts::{FontResolver, StandardFont};
pub use render::{save_png, MediaBoxRenderer};
#[cfg(feature = "pdfium")]
pub use render::PdfiumRenderer;
pub use encoding::encode_win_ansi;
pub use serializer::reinsert;
