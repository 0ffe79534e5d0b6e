//! Assembling pages of positioned text and images into a PDF file.
//!
//! Callers place content in top-left page coordinates (points, y growing
//! downwards); the canvas converts to PDF user space when emitting operators.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::font::{FontProgram, GlyphUsage};
use super::image::DecodedImage;
use crate::Result;

const FONT_RESOURCE: &str = "F1";
const PRODUCER: &str = concat!("letter-render-bench ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

pub const A4: PageSize = PageSize {
    width: 595.28,
    height: 841.89,
};

/// An image XObject registered with a [`PdfBuilder`].
#[derive(Debug, Clone)]
pub struct XObject {
    pub name: String,
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Drawing operations for one page.
#[derive(Debug, Clone)]
pub struct PageCanvas {
    size: PageSize,
    operations: Vec<Operation>,
    xobjects: Vec<(String, ObjectId)>,
    glyphs: GlyphUsage,
}

impl PageCanvas {
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            operations: Vec::new(),
            xobjects: Vec::new(),
            glyphs: GlyphUsage::new(),
        }
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Draw one line of text whose line box starts `top` points below the page top.
    ///
    /// Fails without drawing anything if the font lacks a glyph for `text`.
    pub fn text(&mut self, font: &FontProgram, x: f32, top: f32, size: f32, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let glyphs = font.encode(text)?;
        let mut codes = Vec::with_capacity(glyphs.len() * 2);
        for (gid, ch) in glyphs {
            codes.extend_from_slice(&gid.to_be_bytes());
            self.glyphs.entry(gid).or_insert(ch);
        }
        let baseline = self.size.height - top - font.ascent_at(size);
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(FONT_RESOURCE.into()), size.into()]),
            Operation::new("Td", vec![x.into(), baseline.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(codes, lopdf::StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    /// Draw `image` scaled into the box at (`x`, `top`) of `width` x `height`.
    pub fn image(&mut self, image: &XObject, x: f32, top: f32, width: f32, height: f32) {
        let y = self.size.height - top - height;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image.name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        if !self.xobjects.iter().any(|(name, _)| *name == image.name) {
            self.xobjects.push((image.name.clone(), image.id));
        }
    }

    /// Stroke a horizontal rule.
    pub fn rule(&mut self, x: f32, top: f32, width: f32, thickness: f32) {
        let y = self.size.height - top;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![thickness.into()]),
            Operation::new("m", vec![x.into(), y.into()]),
            Operation::new("l", vec![(x + width).into(), y.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }
}

/// Builds one PDF document around an embedded font.
pub struct PdfBuilder<'f> {
    font: &'f FontProgram,
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    glyphs: GlyphUsage,
    kids: Vec<ObjectId>,
    compress: bool,
    image_count: usize,
}

impl<'f> PdfBuilder<'f> {
    /// `compress` selects Flate compression for page content streams.
    pub fn new(font: &'f FontProgram, compress: bool) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        Self {
            font,
            doc,
            pages_id,
            font_id,
            glyphs: GlyphUsage::new(),
            kids: Vec::new(),
            compress,
            image_count: 0,
        }
    }

    pub fn font(&self) -> &'f FontProgram {
        self.font
    }

    /// Register an image XObject that pages can draw.
    pub fn add_image(&mut self, image: &DecodedImage) -> XObject {
        self.image_count += 1;
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => image.color.pdf_name(),
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            image.data.clone(),
        )
        .with_compression(false);
        XObject {
            name: format!("Im{}", self.image_count),
            id: self.doc.add_object(stream),
            width: image.width,
            height: image.height,
        }
    }

    pub fn push_page(&mut self, page: PageCanvas) -> Result<()> {
        let content = Content {
            operations: page.operations,
        }
        .encode()?;

        let stream = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&content)?;
            Stream::new(dictionary! { "Filter" => "FlateDecode" }, encoder.finish()?)
        } else {
            Stream::new(Dictionary::new(), content)
        }
        .with_compression(false);
        let content_id = self.doc.add_object(stream);
        for (gid, ch) in page.glyphs {
            self.glyphs.entry(gid).or_insert(ch);
        }

        let mut xobjects = Dictionary::new();
        for (name, id) in page.xobjects {
            xobjects.set(name, id);
        }
        let resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => self.font_id },
            "XObject" => xobjects,
        };

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page.size.width),
                Object::Real(page.size.height),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id);
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Write the font, page tree, catalog and info dictionary and serialize the file.
    pub fn finish(mut self, title: &str) -> Result<Vec<u8>> {
        if self.kids.is_empty() {
            self.push_page(PageCanvas::new(A4))?;
        }
        self.font.embed(&mut self.doc, self.font_id, &self.glyphs)?;

        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let created = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal(PRODUCER),
            "CreationDate" => Object::string_literal(created),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        let mut out = Vec::with_capacity(64 * 1024);
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}
