//! QR code payloads: PNG encoding from text and the shared representations handed to engines.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};

use crate::{Error, Result};

/// Light modules around the symbol on every side.
const QUIET_ZONE: usize = 4;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A PNG QR image, loaded or generated once and shared read-only across engine runs.
#[derive(Debug, Clone)]
pub struct QrPayload {
    png: Arc<[u8]>,
    base64: Arc<str>,
    data_uri: Arc<str>,
}

impl QrPayload {
    pub fn from_png(png: Vec<u8>) -> Self {
        let base64 = STANDARD.encode(&png);
        let data_uri = format!("{DATA_URI_PREFIX}{base64}");
        Self {
            png: Arc::from(png),
            base64: Arc::from(base64),
            data_uri: Arc::from(data_uri),
        }
    }

    /// Encode `text` as a QR code rendered at roughly `size` pixels square.
    pub fn from_text(text: &str, size: u32) -> Result<Self> {
        Ok(Self::from_png(encode_png(text, size)?))
    }

    /// Load an existing PNG file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::AssetMissing(path.to_path_buf()));
        }
        Ok(Self::from_png(std::fs::read(path)?))
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn base64(&self) -> Arc<str> {
        Arc::clone(&self.base64)
    }

    pub fn data_uri(&self) -> Arc<str> {
        Arc::clone(&self.data_uri)
    }
}

/// Render the QR symbol for `text` into a grayscale bitmap.
///
/// Each module becomes a `scale x scale` block, where `scale` is the largest
/// integer that keeps the image within `size` pixels (at least 1).
pub fn render(text: &str, size: u32) -> Result<GrayImage> {
    let code = QrCode::new(text.as_bytes())
        .map_err(|e| Error::Image(format!("cannot encode QR payload: {e}")))?;
    let modules = code.width();
    let colors = code.to_colors();

    let span = modules + 2 * QUIET_ZONE;
    let scale = (size as usize / span).max(1);
    let px = (span * scale) as u32;

    let image = GrayImage::from_fn(px, px, |x, y| {
        let mx = (x as usize / scale).checked_sub(QUIET_ZONE);
        let my = (y as usize / scale).checked_sub(QUIET_ZONE);
        match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                if colors[my * modules + mx] == Color::Dark {
                    Luma([0])
                } else {
                    Luma([255])
                }
            }
            _ => Luma([255]),
        }
    });
    Ok(image)
}

/// Render the QR symbol for `text` and encode it as PNG.
pub fn encode_png(text: &str, size: u32) -> Result<Vec<u8>> {
    let image = render(text, size)?;
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
