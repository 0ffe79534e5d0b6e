//! Splits an engine into its two stages and times each one per document.
//!
//! Models are built up front so only the stages themselves are on the clock.
//! Per document three back-to-back `Instant` reads bracket the stages, and
//! both stage shares are computed against the same combined total.

use std::hint::black_box;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::assets::AssetDir;
use crate::engine::report::{ReportDefinition, ReportPrint};
use crate::engine::{EngineContext, EngineKind, FlowEngine, PrintEngine, PrintOptions, ReportEngine};
use crate::harness::BenchInputs;
use crate::markup::TemplateRenderer;
use crate::model::{fields, ImageRepr, LetterModel};
use crate::pdf::FontProgram;
use crate::Result;

/// Documents profiled per engine unless configured otherwise.
pub const DEFAULT_PROFILE_DOCUMENTS: usize = 500;

/// An engine viewed as two consecutive stages.
pub trait StagedPipeline {
    type Intermediate;

    fn name(&self) -> &str;

    /// Labels of the front and back stage.
    fn stage_names(&self) -> (&'static str, &'static str);

    fn image_repr(&self) -> ImageRepr;

    fn front(&self, model: &LetterModel) -> Result<Self::Intermediate>;

    fn back(&self, intermediate: Self::Intermediate, model: &LetterModel) -> Result<Vec<u8>>;
}

fn title(model: &LetterModel) -> &str {
    model.text(fields::SUBJECT).unwrap_or_default()
}

impl StagedPipeline for FlowEngine {
    type Intermediate = String;

    fn name(&self) -> &str {
        crate::engine::flow::NAME
    }

    fn stage_names(&self) -> (&'static str, &'static str) {
        ("template substitution", "markup to PDF")
    }

    fn image_repr(&self) -> ImageRepr {
        ImageRepr::DataUri
    }

    fn front(&self, model: &LetterModel) -> Result<String> {
        self.substitute(model)
    }

    fn back(&self, markup: String, model: &LetterModel) -> Result<Vec<u8>> {
        self.convert(&markup, self.base_uri(), title(model))
    }
}

impl StagedPipeline for PrintEngine {
    type Intermediate = String;

    fn name(&self) -> &str {
        crate::engine::print::NAME
    }

    fn stage_names(&self) -> (&'static str, &'static str) {
        ("template substitution", "markup to PDF")
    }

    fn image_repr(&self) -> ImageRepr {
        ImageRepr::DataUri
    }

    fn front(&self, model: &LetterModel) -> Result<String> {
        self.substitute(model)
    }

    fn back(&self, markup: String, model: &LetterModel) -> Result<Vec<u8>> {
        self.convert(&markup, title(model))
    }
}

impl StagedPipeline for ReportEngine {
    type Intermediate = ReportPrint;

    fn name(&self) -> &str {
        crate::engine::report::NAME
    }

    fn stage_names(&self) -> (&'static str, &'static str) {
        ("report fill", "PDF export")
    }

    fn image_repr(&self) -> ImageRepr {
        ImageRepr::Base64
    }

    fn front(&self, model: &LetterModel) -> Result<ReportPrint> {
        self.fill(model)
    }

    fn back(&self, print: ReportPrint, model: &LetterModel) -> Result<Vec<u8>> {
        self.export(&print, title(model))
    }
}

/// One-time cost of building a component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructorTiming {
    pub component: String,
    pub nanos: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BottleneckReport {
    pub engine: String,
    pub front_stage: String,
    pub back_stage: String,
    pub documents: usize,
    pub constructors: Vec<ConstructorTiming>,
    pub front_total_nanos: u64,
    pub back_total_nanos: u64,
    pub total_output_bytes: u64,
}

impl BottleneckReport {
    pub fn combined_nanos(&self) -> u64 {
        self.front_total_nanos + self.back_total_nanos
    }

    pub fn front_avg_ms(&self) -> f64 {
        avg_ms(self.front_total_nanos, self.documents)
    }

    pub fn back_avg_ms(&self) -> f64 {
        avg_ms(self.back_total_nanos, self.documents)
    }

    /// Percent of the combined time spent in the front stage.
    pub fn front_share(&self) -> f64 {
        share(self.front_total_nanos, self.combined_nanos())
    }

    pub fn back_share(&self) -> f64 {
        share(self.back_total_nanos, self.combined_nanos())
    }
}

fn avg_ms(nanos: u64, documents: usize) -> f64 {
    if documents == 0 {
        return 0.0;
    }
    nanos as f64 / 1e6 / documents as f64
}

fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

/// Time both stages of `pipeline` over `models`.
pub fn profile<P: StagedPipeline>(
    pipeline: &P,
    constructors: Vec<ConstructorTiming>,
    models: &[LetterModel],
) -> Result<BottleneckReport> {
    let mut front_total = 0u64;
    let mut back_total = 0u64;
    let mut output = 0u64;

    for model in models {
        let t0 = Instant::now();
        let intermediate = pipeline.front(model)?;
        let t1 = Instant::now();
        let bytes = pipeline.back(intermediate, model)?;
        let t2 = Instant::now();

        front_total += (t1 - t0).as_nanos() as u64;
        back_total += (t2 - t1).as_nanos() as u64;
        output += black_box(bytes).len() as u64;
    }

    let (front_stage, back_stage) = pipeline.stage_names();
    let report = BottleneckReport {
        engine: pipeline.name().to_string(),
        front_stage: front_stage.to_string(),
        back_stage: back_stage.to_string(),
        documents: models.len(),
        constructors,
        front_total_nanos: front_total,
        back_total_nanos: back_total,
        total_output_bytes: output,
    };
    info!(
        engine = %report.engine,
        front_share = report.front_share(),
        back_share = report.back_share(),
        "profile finished"
    );
    Ok(report)
}

fn timed<T>(component: &str, timings: &mut Vec<ConstructorTiming>, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let value = f()?;
    timings.push(ConstructorTiming {
        component: component.to_string(),
        nanos: start.elapsed().as_nanos() as u64,
    });
    Ok(value)
}

fn models(inputs: &BenchInputs, documents: usize, repr: ImageRepr) -> Vec<LetterModel> {
    inputs
        .addresses
        .iter()
        .take(documents)
        .map(|address| inputs.document.model(address, inputs.qr.as_ref(), repr))
        .collect()
}

/// Build the engine of `kind`, time its components, then profile it.
pub fn profile_kind(
    kind: EngineKind,
    ctx: &EngineContext,
    inputs: &BenchInputs,
    documents: usize,
) -> Result<BottleneckReport> {
    let mut constructors = Vec::new();
    let assets: &AssetDir = &ctx.assets;
    timed("font program", &mut constructors, || FontProgram::load(&assets.font()?))?;

    match kind {
        EngineKind::Flow | EngineKind::Print => {
            timed("template environment", &mut constructors, || {
                TemplateRenderer::load(&assets.templates()?)
            })?;
        }
        EngineKind::Report => {
            timed("report compilation", &mut constructors, || {
                ReportDefinition::load(&assets.report_definition()?)
            })?;
        }
    }

    let models = models(inputs, documents, kind.image_repr());
    match kind {
        EngineKind::Flow => {
            let engine = timed("engine", &mut constructors, || FlowEngine::new(ctx))?;
            profile(&engine, constructors, &models)
        }
        EngineKind::Print => {
            let engine = timed("engine", &mut constructors, || {
                PrintEngine::new(ctx, PrintOptions::from_context(ctx))
            })?;
            profile(&engine, constructors, &models)
        }
        EngineKind::Report => {
            let engine = timed("engine", &mut constructors, || ReportEngine::new(ctx))?;
            profile(&engine, constructors, &models)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{BenchConfig, Profile};

    fn inputs(docs: usize) -> BenchInputs {
        let mut cfg = BenchConfig::new(Profile::Quick, 42);
        cfg.document_count = docs;
        BenchInputs::prepare(&cfg).unwrap()
    }

    #[test]
    fn test_shares_sum_to_hundred() {
        let report = BottleneckReport {
            engine: "e".into(),
            front_stage: "a".into(),
            back_stage: "b".into(),
            documents: 4,
            constructors: Vec::new(),
            front_total_nanos: 3_000_000,
            back_total_nanos: 1_000_000,
            total_output_bytes: 0,
        };
        assert!((report.front_share() - 75.0).abs() < 1e-9);
        assert!((report.front_share() + report.back_share() - 100.0).abs() < 1e-9);
        assert!((report.front_avg_ms() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_profile_every_engine() {
        let ctx = EngineContext::new(AssetDir::bundled());
        let inputs = inputs(3);
        for kind in EngineKind::ALL {
            let report = profile_kind(kind, &ctx, &inputs, 3).unwrap();
            assert_eq!(report.documents, 3);
            assert_eq!(report.engine, kind.as_str());
            assert!(report.constructors.iter().any(|c| c.component == "engine"));
            assert!(report.total_output_bytes > 0);
            let sum = report.front_share() + report.back_share();
            assert!((sum - 100.0).abs() < 1e-6);
        }
    }
}
