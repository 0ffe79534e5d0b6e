use serde::{Deserialize, Serialize};

use crate::harness::{BenchConfig, BenchmarkResult, EngineOutcome};
use crate::model::DocumentKind;
use crate::profiler::BottleneckReport;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub seed: u64,
    pub document_count: usize,
    pub warmup_count: usize,
    pub cooldown_ms: u64,
    pub qr: bool,
    #[serde(default = "letter_document")]
    pub document: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

fn letter_document() -> String {
    DocumentKind::Letter.as_str().to_string()
}

impl RunMeta {
    pub fn new(cfg: &BenchConfig, git_sha: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile.as_str().to_string(),
            seed: cfg.seed,
            document_count: cfg.document_count,
            warmup_count: cfg.warmup_count,
            cooldown_ms: cfg.cooldown.as_millis() as u64,
            qr: cfg.qr_text.is_some(),
            document: cfg.document.as_str().to_string(),
            timestamp_utc: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            git_sha,
        }
    }
}

/// Derived figures of one engine, as shown in the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSummary {
    pub engine: String,
    pub construction_ms: f64,
    pub total_seconds: f64,
    pub throughput_per_s: f64,
    pub avg_ms_per_document: f64,
    pub warmup_ms: f64,
    pub steady_state_throughput_per_s: f64,
    pub peak_memory_mb: f64,
    pub total_output_mb: f64,
    pub avg_file_size_kb: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl From<&BenchmarkResult> for EngineSummary {
    fn from(r: &BenchmarkResult) -> Self {
        Self {
            engine: r.engine_name.clone(),
            construction_ms: r.construction_ms(),
            total_seconds: r.total_seconds(),
            throughput_per_s: r.throughput(),
            avg_ms_per_document: r.avg_ms_per_document(),
            warmup_ms: r.warmup_ms(),
            steady_state_throughput_per_s: r.steady_state_throughput(),
            peak_memory_mb: r.peak_memory_mb(),
            total_output_mb: r.total_output_mb(),
            avg_file_size_kb: r.avg_file_size_kb(),
            p50_ms: r.percentile_ms(50.0),
            p95_ms: r.percentile_ms(95.0),
            p99_ms: r.percentile_ms(99.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFailure {
    pub engine: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: RunMeta,
    pub summaries: Vec<EngineSummary>,
    pub failures: Vec<EngineFailure>,
    /// Raw results including per-document timings; omitted unless requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<BenchmarkResult>,
}

impl RunReport {
    pub fn from_outcomes(run: RunMeta, outcomes: &[EngineOutcome], include_raw: bool) -> Self {
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        let mut results = Vec::new();
        for outcome in outcomes {
            match outcome {
                EngineOutcome::Completed(result) => {
                    summaries.push(EngineSummary::from(result));
                    if include_raw {
                        results.push(result.clone());
                    }
                }
                EngineOutcome::Failed { engine, error } => failures.push(EngineFailure {
                    engine: engine.clone(),
                    error: error.to_string(),
                }),
            }
        }
        Self {
            run,
            summaries,
            failures,
            results,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub run: RunMeta,
    pub breakdowns: Vec<BottleneckReport>,
}
