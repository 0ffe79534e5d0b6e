//! Read-side helpers used to verify generated documents: signature, pages,
//! text extraction and embedded images.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId, Stream};

use crate::Result;

/// The four bytes every PDF file starts with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

pub fn page_count(bytes: &[u8]) -> Result<usize> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}

/// Code-to-text mapping of one font resource.
#[derive(Debug, Default)]
struct FontDecoder {
    /// Two-byte codes from a `ToUnicode` map; `None` decodes bytes as Latin-1.
    cmap: Option<HashMap<u16, String>>,
}

impl FontDecoder {
    fn decode(&self, bytes: &[u8], out: &mut String) {
        let Some(cmap) = &self.cmap else {
            out.extend(bytes.iter().map(|b| *b as char));
            return;
        };
        for code in bytes.chunks(2) {
            let code = match code {
                [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                [single] => *single as u16,
                _ => continue,
            };
            match cmap.get(&code) {
                Some(text) => out.push_str(text),
                None => out.push('\u{FFFD}'),
            }
        }
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn hex_token(token: &str) -> Option<Vec<u8>> {
    let hex = token.strip_prefix('<')?.strip_suffix('>')?;
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn code_of(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| (acc << 8) | *b as u16)
}

/// Read the `bfchar` and `bfrange` sections of a `ToUnicode` CMap.
fn parse_to_unicode(data: &[u8]) -> HashMap<u16, String> {
    let text = String::from_utf8_lossy(data);
    let mut map = HashMap::new();
    let mut section = None;
    let mut operands: Vec<Vec<u8>> = Vec::new();
    for token in text.split_whitespace() {
        match token {
            "beginbfchar" | "beginbfrange" => {
                section = Some(token);
                operands.clear();
            }
            "endbfchar" | "endbfrange" => section = None,
            _ => {
                let (Some(kind), Some(bytes)) = (section, hex_token(token)) else {
                    continue;
                };
                operands.push(bytes);
                match (kind, operands.as_slice()) {
                    ("beginbfchar", [src, dst]) => {
                        map.insert(code_of(src), utf16_text(dst));
                        operands.clear();
                    }
                    ("beginbfrange", [lo, hi, dst]) => {
                        let (lo, hi) = (code_of(lo), code_of(hi));
                        let first = utf16_text(dst);
                        if let Some(base) = first.chars().next() {
                            for (offset, code) in (lo..=hi).enumerate() {
                                if let Some(ch) = char::from_u32(base as u32 + offset as u32) {
                                    map.insert(code, ch.to_string());
                                }
                            }
                        }
                        operands.clear();
                    }
                    _ => {}
                }
            }
        }
    }
    map
}

/// Decoders for the fonts in a page's resource dictionary, keyed by resource name.
fn page_fonts(doc: &Document, page_id: ObjectId) -> Result<HashMap<Vec<u8>, FontDecoder>> {
    let mut fonts = HashMap::new();
    let page = doc.get_dictionary(page_id)?;
    let Ok(resources) = page.get(b"Resources") else {
        return Ok(fonts);
    };
    let Ok(font_dict) = resolve(doc, resources)?.as_dict()?.get(b"Font") else {
        return Ok(fonts);
    };
    for (name, font) in resolve(doc, font_dict)?.as_dict()?.iter() {
        let font = resolve(doc, font)?.as_dict()?;
        let cmap = match font.get(b"ToUnicode") {
            Ok(stream) => {
                let stream = resolve(doc, stream)?.as_stream()?;
                let data = if stream.dict.has(b"Filter") {
                    stream.decompressed_content()?
                } else {
                    stream.content.clone()
                };
                Some(parse_to_unicode(&data))
            }
            Err(_) => None,
        };
        fonts.insert(name.clone(), FontDecoder { cmap });
    }
    Ok(fonts)
}

/// Extract the visible text of all pages in page order, one text object per line.
///
/// Composite fonts are decoded through their `ToUnicode` map.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    let doc = Document::load_mem(bytes)?;
    let latin1 = FontDecoder::default();
    let mut out = String::new();
    for page_id in doc.get_pages().into_values() {
        let fonts = page_fonts(&doc, page_id)?;
        let mut current = &latin1;
        let content = Content::decode(&doc.get_page_content(page_id)?)?;
        for op in &content.operations {
            match op.operator.as_str() {
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        current = fonts.get(name).unwrap_or(&latin1);
                    }
                }
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        current.decode(bytes, &mut out);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                current.decode(bytes, &mut out);
                            }
                        }
                    }
                }
                "ET" => out.push('\n'),
                _ => {}
            }
        }
    }
    Ok(out)
}

/// An image XObject found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    /// Decompressed samples.
    pub samples: Vec<u8>,
}

fn is_image(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
}

fn dimension(stream: &Stream, key: &[u8]) -> u32 {
    match stream.dict.get(key) {
        Ok(Object::Integer(v)) => *v as u32,
        _ => 0,
    }
}

pub fn image_count(bytes: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(bytes)?;
    Ok(doc
        .objects
        .values()
        .filter(|obj| matches!(obj, Object::Stream(s) if is_image(s)))
        .count())
}

/// All image XObjects with their Flate-decoded samples.
pub fn images(bytes: &[u8]) -> Result<Vec<EmbeddedImage>> {
    let doc = Document::load_mem(bytes)?;
    let mut found = Vec::new();
    for obj in doc.objects.values() {
        let Object::Stream(stream) = obj else {
            continue;
        };
        if !is_image(stream) {
            continue;
        }
        let mut samples = Vec::new();
        ZlibDecoder::new(stream.content.as_slice()).read_to_end(&mut samples)?;
        found.push(EmbeddedImage {
            width: dimension(stream, b"Width"),
            height: dimension(stream, b"Height"),
            samples,
        });
    }
    Ok(found)
}
