//! Rendering engines: letter model in, PDF bytes out.
//!
//! Every engine does its expensive setup (font program, template environment,
//! report compilation) in its constructor, so construction can be timed apart
//! from per-document rendering. `render` takes `&self` and keeps no state
//! between calls.

pub mod flow;
pub mod layout;
pub mod print;
pub mod report;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::{debug, warn};

use crate::assets::AssetDir;
use crate::model::{DocumentKind, ImageRepr, LetterModel};
use crate::pdf::image::is_data_uri;
use crate::pdf::DecodedImage;
use crate::Result;

pub use flow::FlowEngine;
pub use print::{PrintEngine, PrintOptions};
pub use report::ReportEngine;

/// Template used by both markup engines unless configured otherwise.
pub const DEFAULT_TEMPLATE: &str = "template-a";

/// The product information sheet.
pub const PRODUCT_SHEET_TEMPLATE: &str = "template-b";

pub trait RenderingEngine: Send {
    /// Label shown in reports.
    fn name(&self) -> &str;

    /// How this engine expects the QR image in the model.
    fn image_repr(&self) -> ImageRepr {
        ImageRepr::DataUri
    }

    /// Render one letter. Output always starts with `%PDF`.
    fn render(&self, model: &LetterModel) -> Result<Vec<u8>>;
}

impl<E: RenderingEngine + ?Sized> RenderingEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn image_repr(&self) -> ImageRepr {
        (**self).image_repr()
    }

    fn render(&self, model: &LetterModel) -> Result<Vec<u8>> {
        (**self).render(model)
    }
}

/// Engine variant.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Template → XHTML → streamed flow layout, compressed content.
    Flow,
    /// Template → XHTML → page tree, print media, uncompressed content.
    Print,
    /// Compiled report definition, fill then export.
    Report,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Flow, EngineKind::Print, EngineKind::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Flow => flow::NAME,
            EngineKind::Print => print::NAME,
            EngineKind::Report => report::NAME,
        }
    }

    pub fn image_repr(&self) -> ImageRepr {
        match self {
            EngineKind::Flow | EngineKind::Print => ImageRepr::DataUri,
            EngineKind::Report => ImageRepr::Base64,
        }
    }

    pub fn build(&self, ctx: &EngineContext) -> Result<Box<dyn RenderingEngine>> {
        Ok(match self {
            EngineKind::Flow => Box::new(FlowEngine::new(ctx)?),
            EngineKind::Print => Box::new(PrintEngine::new(ctx, PrintOptions::from_context(ctx))?),
            EngineKind::Report => Box::new(ReportEngine::new(ctx)?),
        })
    }
}

/// Everything engines need to construct themselves.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub assets: AssetDir,
    pub template: String,
    /// Base for relative image references in markup.
    pub base_uri: Option<PathBuf>,
}

impl EngineContext {
    pub fn new(assets: AssetDir) -> Self {
        Self {
            assets,
            template: DEFAULT_TEMPLATE.to_string(),
            base_uri: None,
        }
    }

    pub fn with_base_uri(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_uri = Some(base.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// The document the configured template lays out.
    pub fn document(&self) -> DocumentKind {
        match self.template.as_str() {
            PRODUCT_SHEET_TEMPLATE => DocumentKind::ProductSheet,
            _ => DocumentKind::Letter,
        }
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(AssetDir::default())
    }
}

/// Resolve an image reference from markup.
///
/// Data URIs are always decoded. Other references are files: absolute paths
/// are read as-is, relative ones only against `base`. Unresolvable files are
/// dropped.
pub(crate) fn resolve_image(src: &str, base: Option<&Path>) -> Result<Option<DecodedImage>> {
    if is_data_uri(src) {
        return DecodedImage::from_data_uri(src).map(Some);
    }

    let reference = Path::new(src.strip_prefix("file://").unwrap_or(src));
    let path = if reference.is_absolute() {
        reference.to_path_buf()
    } else if let Some(base) = base {
        base.join(reference)
    } else {
        debug!(src, "relative image without base URI dropped");
        return Ok(None);
    };

    match std::fs::read(&path) {
        Ok(bytes) => DecodedImage::decode(&bytes).map(Some),
        Err(err) => {
            warn!(path = %path.display(), %err, "image could not be read, dropped");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrPayload;

    #[test]
    fn test_engine_names_are_distinct() {
        let names: Vec<&str> = EngineKind::ALL.iter().map(EngineKind::as_str).collect();
        assert_eq!(names.len(), 3);
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);
        assert_ne!(names[0], names[2]);
    }

    #[test]
    fn test_resolve_data_uri() {
        let qr = QrPayload::from_text("x", 80).unwrap();
        let image = resolve_image(&qr.data_uri(), None).unwrap().unwrap();
        assert!(image.width > 0);
    }

    #[test]
    fn test_relative_image_without_base_is_dropped() {
        assert!(resolve_image("images/logo.png", None).unwrap().is_none());
    }

    #[test]
    fn test_relative_image_resolves_against_base() {
        let dir = tempfile::tempdir().unwrap();
        let qr = QrPayload::from_text("x", 80).unwrap();
        std::fs::write(dir.path().join("qr.png"), qr.png()).unwrap();

        assert!(resolve_image("qr.png", Some(dir.path())).unwrap().is_some());
        assert!(resolve_image("missing.png", Some(dir.path())).unwrap().is_none());
    }

    #[test]
    fn test_broken_data_uri_is_an_error() {
        assert!(resolve_image("data:image/png;base64,@@@", None).is_err());
    }
}
