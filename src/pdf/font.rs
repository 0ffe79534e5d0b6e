//! TrueType font program loading and embedding.
//!
//! The font is read and measured once. Documents embed it as a composite
//! (Type0) font: text is written as two-byte glyph ids under `Identity-H`,
//! and a `ToUnicode` CMap maps the glyphs a document actually uses back to
//! characters. The whole program is embedded (no subsetting).

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use skrifa::instance::{LocationRef, Size};
use skrifa::{FontRef, GlyphId, MetadataProvider};

use crate::{Error, Result};

/// Characters the font must cover for German letters.
const REQUIRED_COVERAGE: &[char] = &['ä', 'ö', 'ü', 'Ä', 'Ö', 'Ü', 'ß', '€'];

/// `bfchar` entries per block; CMap readers reject larger blocks.
const CMAP_BLOCK: usize = 100;

/// Line advance as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.25;

/// Glyphs drawn in a document, keyed by glyph id, with the character each one stands for.
pub type GlyphUsage = BTreeMap<u16, char>;

/// A measured TrueType font, ready to be embedded as an `Identity-H` composite font.
#[derive(Debug, Clone)]
pub struct FontProgram {
    base_font: String,
    glyphs: HashMap<char, u16>,
    /// Advance widths per glyph id in 1/1000 em.
    advances: HashMap<u16, f32>,
    default_width: f32,
    ascent: f32,
    descent: f32,
    cap_height: f32,
    italic_angle: f32,
    bbox: [f32; 4],
    compressed: Vec<u8>,
    length1: usize,
}

impl FontProgram {
    /// Load and measure a font file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::AssetMissing(path.to_path_buf()));
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("EmbeddedFont")
            .to_string();
        let bytes = std::fs::read(path)?;
        Self::from_bytes(name, bytes)
    }

    pub fn from_bytes(base_font: String, bytes: Vec<u8>) -> Result<Self> {
        let font = FontRef::new(&bytes).map_err(|e| Error::Font(e.to_string()))?;
        let metrics = font.metrics(Size::unscaled(), LocationRef::default());
        let upem = metrics.units_per_em as f32;
        if upem <= 0.0 {
            return Err(Error::Font("font reports zero units per em".into()));
        }
        let scale = 1000.0 / upem;

        let charmap = font.charmap();
        for ch in REQUIRED_COVERAGE {
            if charmap.map(*ch).is_none() {
                return Err(Error::Font(format!("font has no glyph for '{ch}'")));
            }
        }
        if charmap.map(' ').is_none() {
            return Err(Error::Font("font has no space glyph".into()));
        }

        let mut glyphs = HashMap::new();
        for (codepoint, gid) in charmap.mappings() {
            let (Some(ch), Ok(gid)) = (char::from_u32(codepoint), u16::try_from(gid.to_u32())) else {
                continue;
            };
            glyphs.insert(ch, gid);
        }

        let metrics_by_glyph = font.glyph_metrics(Size::unscaled(), LocationRef::default());
        let advance = |gid: u16| {
            metrics_by_glyph
                .advance_width(GlyphId::new(gid as u32))
                .map(|w| w * scale)
        };
        let default_width = advance(0).unwrap_or(500.0);
        let advances = glyphs
            .values()
            .map(|gid| (*gid, advance(*gid).unwrap_or(default_width)))
            .collect();

        let bbox = metrics
            .bounds
            .map(|b| [b.x_min * scale, b.y_min * scale, b.x_max * scale, b.y_max * scale])
            .unwrap_or([-1000.0, -300.0, 2000.0, 1000.0]);
        let ascent = metrics.ascent * scale;
        let descent = metrics.descent * scale;
        let cap_height = metrics.cap_height.map(|c| c * scale).unwrap_or(ascent);
        let italic_angle = metrics.italic_angle;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;

        Ok(Self {
            base_font,
            glyphs,
            advances,
            default_width,
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
            compressed,
            length1: bytes.len(),
        })
    }

    pub fn base_font(&self) -> &str {
        &self.base_font
    }

    /// Distance from the top of a line box to its baseline at `size`.
    pub fn ascent_at(&self, size: f32) -> f32 {
        self.ascent * size / 1000.0
    }

    pub fn line_height(&self, size: f32) -> f32 {
        size * LINE_SPACING
    }

    /// Control characters are drawn as spaces.
    fn printable(ch: char) -> char {
        if ch.is_control() {
            ' '
        } else {
            ch
        }
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.glyphs.contains_key(&Self::printable(ch))
    }

    fn glyph_width(&self, gid: u16) -> f32 {
        self.advances.get(&gid).copied().unwrap_or(self.default_width)
    }

    /// Rendered width of `text` at `size` points; uncovered characters measure as `.notdef`.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: f32 = text
            .chars()
            .map(|ch| match self.glyphs.get(&Self::printable(ch)) {
                Some(gid) => self.glyph_width(*gid),
                None => self.default_width,
            })
            .sum();
        units * size / 1000.0
    }

    /// Glyph ids for `text` paired with the character each one draws.
    ///
    /// Fails with [`Error::Font`] on the first character the font cannot draw.
    pub fn encode(&self, text: &str) -> Result<Vec<(u16, char)>> {
        text.chars()
            .map(|ch| {
                let ch = Self::printable(ch);
                match self.glyphs.get(&ch) {
                    Some(gid) => Ok((*gid, ch)),
                    None => Err(Error::Font(format!(
                        "{} has no glyph for {ch:?} (U+{:04X})",
                        self.base_font, ch as u32
                    ))),
                }
            })
            .collect()
    }

    /// `W` array entries for `used`, grouping consecutive glyph ids.
    fn width_array(&self, used: &GlyphUsage) -> Vec<Object> {
        let mut out = Vec::new();
        let mut run: Option<(u16, Vec<Object>)> = None;
        let mut prev = 0u16;
        for gid in used.keys().copied() {
            let width = Object::Integer(self.glyph_width(gid).round() as i64);
            match run.as_mut() {
                Some((_, widths)) if prev.checked_add(1) == Some(gid) => widths.push(width),
                _ => {
                    if let Some((start, widths)) = run.take() {
                        out.push(Object::Integer(start as i64));
                        out.push(Object::Array(widths));
                    }
                    run = Some((gid, vec![width]));
                }
            }
            prev = gid;
        }
        if let Some((start, widths)) = run {
            out.push(Object::Integer(start as i64));
            out.push(Object::Array(widths));
        }
        out
    }

    /// Write the font program, descriptor, descendant font and `ToUnicode`
    /// map into `doc`, and the Type0 font dictionary under `font_id`.
    pub fn embed(&self, doc: &mut Document, font_id: ObjectId, used: &GlyphUsage) -> Result<()> {
        let file = Stream::new(
            dictionary! {
                "Length1" => self.length1 as i64,
                "Filter" => "FlateDecode",
            },
            self.compressed.clone(),
        )
        .with_compression(false);
        let file_id = doc.add_object(file);

        let name = Object::Name(self.base_font.clone().into_bytes());
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name.clone(),
            "Flags" => 32,
            "FontBBox" => self.bbox.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => Object::Real(self.italic_angle),
            "Ascent" => Object::Real(self.ascent),
            "Descent" => Object::Real(self.descent),
            "CapHeight" => Object::Real(self.cap_height),
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let descendant_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => name.clone(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => self.default_width.round() as i64,
            "W" => self.width_array(used),
            "CIDToGIDMap" => "Identity",
        });

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(to_unicode_cmap(used).as_bytes())?;
        let cmap = Stream::new(dictionary! { "Filter" => "FlateDecode" }, encoder.finish()?)
            .with_compression(false);
        let cmap_id = doc.add_object(cmap);

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => name,
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(descendant_id)],
                "ToUnicode" => cmap_id,
            }),
        );
        Ok(())
    }
}

/// A `ToUnicode` CMap mapping each used glyph id to its UTF-16BE character.
fn to_unicode_cmap(used: &GlyphUsage) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used.iter().collect();
    for block in entries.chunks(CMAP_BLOCK) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (gid, ch) in block {
            let mut units = [0u16; 2];
            let hex: String = ch.encode_utf16(&mut units).iter().map(|u| format!("{u:04X}")).collect();
            cmap.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}
