//! Print engine: the same template stage as the flow engine, followed by a
//! converter configured once for print media. The converter lays the whole
//! document out into a page tree, then serializes the tree in one pass.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use super::layout::{lay_out, PageGeometry, PageSink};
use super::{resolve_image, EngineContext, RenderingEngine};
use crate::markup::{parse, Block, ParseOptions, TemplateRenderer};
use crate::model::{fields, DocumentKind, LetterModel};
use crate::pdf::{FontProgram, PageCanvas, PdfBuilder, XObject};
use crate::Result;

pub const NAME: &str = "markup-print";

/// Elements with this class are not printed.
pub const SCREEN_ONLY_CLASS: &str = "screen-only";

/// Converter configuration fixed at construction.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    pub base_uri: Option<PathBuf>,
    pub skip_classes: Vec<String>,
    pub geometry: PageGeometry,
}

impl PrintOptions {
    pub fn from_context(ctx: &EngineContext) -> Self {
        Self {
            base_uri: ctx.base_uri.clone(),
            ..Self::default()
        }
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            base_uri: None,
            skip_classes: vec![SCREEN_ONLY_CLASS.to_string()],
            geometry: PageGeometry::default(),
        }
    }
}

pub struct PrintEngine {
    font: FontProgram,
    templates: TemplateRenderer,
    template: String,
    document: DocumentKind,
    options: PrintOptions,
    parse_options: ParseOptions,
}

/// Laid-out document waiting to be serialized.
pub struct PageTree<'f> {
    builder: PdfBuilder<'f>,
    pages: Vec<PageCanvas>,
}

impl PageTree<'_> {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn serialize(mut self, title: &str) -> Result<Vec<u8>> {
        for page in self.pages {
            self.builder.push_page(page)?;
        }
        self.builder.finish(title)
    }
}

impl PrintEngine {
    pub fn new(ctx: &EngineContext, options: PrintOptions) -> Result<Self> {
        let font = FontProgram::load(&ctx.assets.font()?)?;
        let templates = TemplateRenderer::load(&ctx.assets.templates()?)?;
        templates.require(&ctx.template)?;
        let parse_options = ParseOptions {
            skip_classes: options.skip_classes.clone(),
        };
        debug!(
            template = %ctx.template,
            skip = ?options.skip_classes,
            "print engine ready"
        );
        Ok(Self {
            font,
            templates,
            template: ctx.template.clone(),
            document: ctx.document(),
            options,
            parse_options,
        })
    }

    pub fn options(&self) -> &PrintOptions {
        &self.options
    }

    /// Template stage: model → markup.
    pub fn substitute(&self, model: &LetterModel) -> Result<String> {
        model.validate_as(self.document)?;
        self.templates.render(&self.template, model)
    }

    /// Parse and lay out `markup` into a page tree.
    pub fn layout(&self, markup: &str) -> Result<PageTree<'_>> {
        let blocks: Vec<Block> = parse(markup, &self.parse_options)?;
        let mut sink = TreeSink {
            engine: self,
            builder: PdfBuilder::new(&self.font, false),
            images: HashMap::new(),
            pages: Vec::new(),
        };
        lay_out(&blocks, &self.font, &self.options.geometry, &mut sink)?;
        Ok(PageTree {
            builder: sink.builder,
            pages: sink.pages,
        })
    }

    /// Converter stage: markup → PDF.
    pub fn convert(&self, markup: &str, title: &str) -> Result<Vec<u8>> {
        let tree = self.layout(markup)?;
        debug!(pages = tree.page_count(), "print layout done");
        tree.serialize(title)
    }
}

struct TreeSink<'e> {
    engine: &'e PrintEngine,
    builder: PdfBuilder<'e>,
    /// Each distinct `src` is decoded and embedded once per document.
    images: HashMap<String, Option<XObject>>,
    pages: Vec<PageCanvas>,
}

impl PageSink for TreeSink<'_> {
    fn image(&mut self, src: &str) -> Result<Option<XObject>> {
        if let Some(known) = self.images.get(src) {
            return Ok(known.clone());
        }
        let resolved = resolve_image(src, self.engine.options.base_uri.as_deref())?
            .map(|image| self.builder.add_image(&image));
        self.images.insert(src.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn page(&mut self, page: PageCanvas) -> Result<()> {
        self.pages.push(page);
        Ok(())
    }
}

impl RenderingEngine for PrintEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn render(&self, model: &LetterModel) -> Result<Vec<u8>> {
        let markup = self.substitute(model)?;
        let title = model
            .text(fields::SUBJECT)
            .or_else(|| model.text(fields::TITLE))
            .unwrap_or(NAME);
        self.convert(&markup, title)
    }
}
