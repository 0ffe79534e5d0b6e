//! PDF primitives shared by all rendering engines.

pub mod font;
pub mod image;
pub mod inspect;
pub mod text;
pub mod writer;

pub use font::{FontProgram, GlyphUsage};
pub use image::DecodedImage;
pub use inspect::{extract_text, is_pdf, PDF_MAGIC};
pub use text::{wrap, Align};
pub use writer::{PageCanvas, PageSize, PdfBuilder, XObject, A4};

/// Points per millimetre.
pub const MM: f32 = 72.0 / 25.4;
