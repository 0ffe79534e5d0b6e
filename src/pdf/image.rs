//! Image payloads decoded into raw, Flate-compressed pixel data for image XObjects.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::model::ImageRef;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorSpace::Gray => "DeviceGray",
            ColorSpace::Rgb => "DeviceRGB",
        }
    }
}

/// Pixel data ready to be written as an image XObject.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color: ColorSpace,
    /// Zlib-compressed samples, 8 bits per component.
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Decode an encoded image (PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        let (width, height) = (image.width(), image.height());
        let (color, raw) = if image.color().has_color() {
            (ColorSpace::Rgb, image.into_rgb8().into_raw())
        } else {
            (ColorSpace::Gray, image.into_luma8().into_raw())
        };

        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::fast());
        encoder.write_all(&raw)?;
        Ok(Self {
            width,
            height,
            color,
            data: encoder.finish()?,
        })
    }

    pub fn from_base64(payload: &str) -> Result<Self> {
        let bytes = STANDARD.decode(payload.trim().as_bytes())?;
        Self::decode(&bytes)
    }

    /// Decode a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| Error::Image("not a data URI".into()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::Image("data URI has no payload".into()))?;
        if !meta.ends_with(";base64") {
            return Err(Error::Image(format!(
                "unsupported data URI encoding '{meta}'"
            )));
        }
        Self::from_base64(payload)
    }

    pub fn from_ref(image: &ImageRef) -> Result<Self> {
        match image {
            ImageRef::Bytes(bytes) => Self::decode(bytes),
            ImageRef::Base64(payload) => Self::from_base64(payload),
            ImageRef::DataUri(uri) => Self::from_data_uri(uri),
        }
    }
}

pub fn is_data_uri(src: &str) -> bool {
    src.starts_with("data:")
}
