//! Flow engine: template substitution, then a markup-to-PDF converter that
//! streams pages into the document as layout produces them.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::layout::{lay_out, PageGeometry, PageSink};
use super::{resolve_image, EngineContext, RenderingEngine};
use crate::markup::{parse, ParseOptions, TemplateRenderer};
use crate::model::{fields, DocumentKind, LetterModel};
use crate::pdf::{FontProgram, PageCanvas, PdfBuilder, XObject};
use crate::Result;

pub const NAME: &str = "markup-flow";

pub struct FlowEngine {
    font: FontProgram,
    templates: TemplateRenderer,
    template: String,
    document: DocumentKind,
    base_uri: Option<PathBuf>,
    geometry: PageGeometry,
    parse_options: ParseOptions,
}

impl FlowEngine {
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        let font = FontProgram::load(&ctx.assets.font()?)?;
        let templates = TemplateRenderer::load(&ctx.assets.templates()?)?;
        templates.require(&ctx.template)?;
        debug!(template = %ctx.template, font = font.base_font(), "flow engine ready");
        Ok(Self {
            font,
            templates,
            template: ctx.template.clone(),
            document: ctx.document(),
            base_uri: ctx.base_uri.clone(),
            geometry: PageGeometry::default(),
            parse_options: ParseOptions::default(),
        })
    }

    /// Template stage: model → markup.
    pub fn substitute(&self, model: &LetterModel) -> Result<String> {
        model.validate_as(self.document)?;
        self.templates.render(&self.template, model)
    }

    /// Converter stage: markup → PDF. `base_uri` is used for this call only;
    /// `None` drops relative image references.
    pub fn convert(&self, markup: &str, base_uri: Option<&Path>, title: &str) -> Result<Vec<u8>> {
        let blocks = parse(markup, &self.parse_options)?;
        let mut sink = StreamingSink {
            builder: PdfBuilder::new(&self.font, true),
            base_uri,
        };
        let pages = lay_out(&blocks, &self.font, &self.geometry, &mut sink)?;
        debug!(pages, blocks = blocks.len(), "flow layout done");
        sink.builder.finish(title)
    }

    pub fn base_uri(&self) -> Option<&Path> {
        self.base_uri.as_deref()
    }
}

struct StreamingSink<'a> {
    builder: PdfBuilder<'a>,
    base_uri: Option<&'a Path>,
}

impl PageSink for StreamingSink<'_> {
    fn image(&mut self, src: &str) -> Result<Option<XObject>> {
        Ok(resolve_image(src, self.base_uri)?.map(|image| self.builder.add_image(&image)))
    }

    fn page(&mut self, page: PageCanvas) -> Result<()> {
        self.builder.push_page(page)
    }
}

impl RenderingEngine for FlowEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn render(&self, model: &LetterModel) -> Result<Vec<u8>> {
        let markup = self.substitute(model)?;
        let title = model
            .text(fields::SUBJECT)
            .or_else(|| model.text(fields::TITLE))
            .unwrap_or(NAME);
        self.convert(&markup, self.base_uri.as_deref(), title)
    }
}
