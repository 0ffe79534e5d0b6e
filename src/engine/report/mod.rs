//! Compiled-report engine: a report definition compiled once, then filled
//! from the model's parameters and exported per document.

pub mod definition;

use tracing::debug;

use super::{EngineContext, RenderingEngine};
use crate::model::{fields, DocumentKind, ImageRepr, LetterModel};
use crate::pdf::FontProgram;
use crate::{Error, Result};

pub use definition::{Expression, PrintItem, ReportDefinition, ReportPrint};

pub const NAME: &str = "compiled-report";

pub struct ReportEngine {
    font: FontProgram,
    definition: ReportDefinition,
}

impl ReportEngine {
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        if ctx.document() != DocumentKind::Letter {
            return Err(Error::Config(format!(
                "{NAME} has no report definition for template '{}'",
                ctx.template
            )));
        }
        let font = FontProgram::load(&ctx.assets.font()?)?;
        let definition = ReportDefinition::load(&ctx.assets.report_definition()?)?;
        debug!(report = definition.name(), "report engine ready");
        Ok(Self { font, definition })
    }

    pub fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    /// Fill step. The parameter map is a fresh copy of the model.
    pub fn fill(&self, model: &LetterModel) -> Result<ReportPrint> {
        model.validate()?;
        self.definition.fill(&self.font, model.to_parameters())
    }

    /// Export step.
    pub fn export(&self, print: &ReportPrint, title: &str) -> Result<Vec<u8>> {
        print.export(&self.font, self.definition.margin_left(), title)
    }
}

impl RenderingEngine for ReportEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn image_repr(&self) -> ImageRepr {
        ImageRepr::Base64
    }

    fn render(&self, model: &LetterModel) -> Result<Vec<u8>> {
        let print = self.fill(model)?;
        let title = model.text(fields::SUBJECT).unwrap_or(NAME);
        self.export(&print, title)
    }
}
