//! Benchmark harness: drives one engine at a time over the shared address
//! set and aggregates timings.
//!
//! Per engine the run goes INIT (construct, timed separately) → STEADY (one
//! timed `render` per document, model construction outside the timer) →
//! AGGREGATE (stop the clock, drop transient state, sample memory) →
//! COOLDOWN (pause before the next engine).

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{info, warn};

use crate::address::{self, Address};
use crate::engine::{EngineContext, EngineKind, RenderingEngine};
use crate::model::DocumentKind;
use crate::qr::QrPayload;
use crate::{Error, Result};

/// Text encoded into the QR code of every benchmark letter.
pub const DEFAULT_QR_TEXT: &str = "https://www.acme-gmbh.de/kundenportal";
pub const DEFAULT_QR_SIZE: u32 = 150;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    pub fn document_count(&self) -> usize {
        match self {
            Profile::Quick => 500,
            Profile::Full => 10_000,
        }
    }

    pub fn warmup_count(&self) -> usize {
        match self {
            Profile::Quick => 50,
            Profile::Full => 100,
        }
    }

    pub fn cooldown(&self) -> Duration {
        match self {
            Profile::Quick => Duration::from_millis(250),
            Profile::Full => Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
    pub document_count: usize,
    /// Leading documents excluded from steady-state figures.
    pub warmup_count: usize,
    /// Pause between engines.
    pub cooldown: Duration,
    /// Log progress every this many documents; 0 disables.
    pub progress_every: usize,
    /// QR content; `None` renders letters without the QR section.
    pub qr_text: Option<String>,
    pub qr_size: u32,
    /// Document rendered for every address.
    pub document: DocumentKind,
}

impl BenchConfig {
    pub fn new(profile: Profile, seed: u64) -> Self {
        Self {
            profile,
            seed,
            document_count: profile.document_count(),
            warmup_count: profile.warmup_count(),
            cooldown: profile.cooldown(),
            progress_every: 1_000,
            qr_text: Some(DEFAULT_QR_TEXT.to_string()),
            qr_size: DEFAULT_QR_SIZE,
            document: DocumentKind::Letter,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.document_count == 0 {
            return Err(Error::Config("document count must be at least 1".into()));
        }
        if self.qr_size == 0 {
            return Err(Error::Config("QR size must be positive".into()));
        }
        Ok(())
    }

    pub fn steady_state_count(&self) -> usize {
        self.document_count.saturating_sub(self.warmup_count)
    }
}

/// Inputs shared read-only by every engine in a run.
#[derive(Debug, Clone)]
pub struct BenchInputs {
    pub addresses: Vec<Address>,
    pub qr: Option<QrPayload>,
    pub document: DocumentKind,
}

impl BenchInputs {
    /// Generate the address set and encode the QR payload once.
    pub fn prepare(cfg: &BenchConfig) -> Result<Self> {
        cfg.validate()?;
        let addresses = address::generate(cfg.seed, cfg.document_count);
        let qr = cfg
            .qr_text
            .as_deref()
            .map(|text| QrPayload::from_text(text, cfg.qr_size))
            .transpose()?;
        Ok(Self {
            addresses,
            qr,
            document: cfg.document,
        })
    }
}

/// Timing of one rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerDocumentSample {
    pub engine_name: Arc<str>,
    pub elapsed_nanos: u64,
    pub output_len: usize,
}

/// Aggregated measurements of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub engine_name: String,
    pub construction_nanos: u64,
    pub total_time_nanos: u64,
    pub warmup_time_nanos: u64,
    pub steady_state_total_nanos: u64,
    pub steady_state_count: usize,
    pub peak_memory_bytes: u64,
    pub total_output_bytes: u64,
    pub document_count: usize,
    /// Per-document render time in document order.
    pub per_document_nanos: Vec<u64>,
}

const NANOS_PER_SEC: f64 = 1e9;
const NANOS_PER_MS: f64 = 1e6;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

impl BenchmarkResult {
    /// Build a result from per-document samples and run-level timings.
    pub fn from_samples(
        engine_name: &str,
        samples: &[PerDocumentSample],
        warmup_count: usize,
        construction_nanos: u64,
        total_time_nanos: u64,
        peak_memory_bytes: u64,
    ) -> Self {
        let per_document_nanos: Vec<u64> = samples.iter().map(|s| s.elapsed_nanos).collect();
        let steady = per_document_nanos.get(warmup_count..).unwrap_or(&[]);
        Self {
            engine_name: engine_name.to_string(),
            construction_nanos,
            total_time_nanos,
            warmup_time_nanos: per_document_nanos.first().copied().unwrap_or(0),
            steady_state_total_nanos: steady.iter().sum(),
            steady_state_count: samples.len().saturating_sub(warmup_count),
            peak_memory_bytes,
            total_output_bytes: samples.iter().map(|s| s.output_len as u64).sum(),
            document_count: samples.len(),
            per_document_nanos,
        }
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_time_nanos as f64 / NANOS_PER_SEC
    }

    /// Documents per second over the whole run.
    pub fn throughput(&self) -> f64 {
        rate(self.document_count, self.total_time_nanos)
    }

    /// Documents per second after warmup.
    pub fn steady_state_throughput(&self) -> f64 {
        rate(self.steady_state_count, self.steady_state_total_nanos)
    }

    pub fn avg_ms_per_document(&self) -> f64 {
        if self.document_count == 0 {
            return 0.0;
        }
        self.total_time_nanos as f64 / NANOS_PER_MS / self.document_count as f64
    }

    pub fn warmup_ms(&self) -> f64 {
        self.warmup_time_nanos as f64 / NANOS_PER_MS
    }

    pub fn construction_ms(&self) -> f64 {
        self.construction_nanos as f64 / NANOS_PER_MS
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_bytes as f64 / BYTES_PER_MB
    }

    pub fn total_output_mb(&self) -> f64 {
        self.total_output_bytes as f64 / BYTES_PER_MB
    }

    pub fn avg_file_size_kb(&self) -> f64 {
        if self.document_count == 0 {
            return 0.0;
        }
        self.total_output_bytes as f64 / 1024.0 / self.document_count as f64
    }

    /// Nearest-rank percentile of the per-document times, in milliseconds.
    pub fn percentile_ms(&self, p: f64) -> f64 {
        let mut sorted = self.per_document_nanos.clone();
        sorted.sort_unstable();
        percentile_nanos(&sorted, p) as f64 / NANOS_PER_MS
    }
}

fn rate(count: usize, nanos: u64) -> f64 {
    if nanos == 0 {
        return 0.0;
    }
    count as f64 / (nanos as f64 / NANOS_PER_SEC)
}

/// Nearest-rank percentile over ascending `sorted`: index `ceil(p/100·n) − 1`,
/// clamped to the slice. Empty input yields 0.
pub fn percentile_nanos(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Resident memory of this process, best effort. 0 when unavailable.
pub fn resident_memory_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// STEADY + AGGREGATE for an already constructed engine.
pub fn run_engine(
    engine: &dyn RenderingEngine,
    construction_nanos: u64,
    inputs: &BenchInputs,
    cfg: &BenchConfig,
) -> Result<BenchmarkResult> {
    let name: Arc<str> = Arc::from(engine.name());
    let repr = engine.image_repr();
    let count = cfg.document_count.min(inputs.addresses.len());
    let mut samples = Vec::with_capacity(count);

    info!(engine = %name, documents = count, "steady phase started");
    let run_start = Instant::now();
    for (i, address) in inputs.addresses.iter().take(count).enumerate() {
        let model = inputs.document.model(address, inputs.qr.as_ref(), repr);

        let start = Instant::now();
        let rendered = engine.render(&model);
        let elapsed = start.elapsed();

        let bytes = rendered.map_err(|source| Error::EngineRunFailed {
            engine: name.to_string(),
            document: i,
            source: Box::new(source),
        })?;
        samples.push(PerDocumentSample {
            engine_name: Arc::clone(&name),
            elapsed_nanos: elapsed.as_nanos() as u64,
            output_len: black_box(bytes).len(),
        });

        if cfg.progress_every > 0 && (i + 1) % cfg.progress_every == 0 {
            info!(engine = %name, done = i + 1, total = count, "progress");
        }
    }
    let total = run_start.elapsed();

    let result = BenchmarkResult::from_samples(
        &name,
        &samples,
        cfg.warmup_count,
        construction_nanos,
        total.as_nanos() as u64,
        0,
    );
    drop(samples);
    Ok(result)
}

/// Full INIT → STEADY → AGGREGATE cycle. The engine is dropped before memory
/// is sampled.
pub fn run_with<F>(build: F, inputs: &BenchInputs, cfg: &BenchConfig) -> Result<BenchmarkResult>
where
    F: FnOnce() -> Result<Box<dyn RenderingEngine>>,
{
    let start = Instant::now();
    let engine = build()?;
    let construction_nanos = start.elapsed().as_nanos() as u64;
    info!(engine = engine.name(), construction_ms = construction_nanos as f64 / NANOS_PER_MS, "engine constructed");

    let mut result = run_engine(engine.as_ref(), construction_nanos, inputs, cfg)?;
    let sampled_while_live = resident_memory_bytes();
    drop(engine);
    result.peak_memory_bytes = sampled_while_live.max(resident_memory_bytes());
    info!(
        engine = %result.engine_name,
        seconds = result.total_seconds(),
        throughput = result.throughput(),
        "engine run finished"
    );
    Ok(result)
}

/// Builds one engine for a comparison run.
pub type EngineFactory<'a> = Box<dyn FnOnce() -> Result<Box<dyn RenderingEngine>> + 'a>;

/// Result of one engine within a comparison.
#[derive(Debug)]
pub enum EngineOutcome {
    Completed(BenchmarkResult),
    Failed { engine: String, error: Error },
}

impl EngineOutcome {
    pub fn engine(&self) -> &str {
        match self {
            EngineOutcome::Completed(result) => &result.engine_name,
            EngineOutcome::Failed { engine, .. } => engine,
        }
    }

    pub fn result(&self) -> Option<&BenchmarkResult> {
        match self {
            EngineOutcome::Completed(result) => Some(result),
            EngineOutcome::Failed { .. } => None,
        }
    }
}

/// Factories for the given engine kinds.
pub fn factories<'a>(kinds: &[EngineKind], ctx: &'a EngineContext) -> Vec<(String, EngineFactory<'a>)> {
    kinds
        .iter()
        .map(|&kind| {
            let factory: EngineFactory<'a> = Box::new(move || kind.build(ctx));
            (kind.as_str().to_string(), factory)
        })
        .collect()
}

/// Run each engine in turn with a cooldown in between. A failing engine is
/// reported in its outcome and does not stop the others.
pub fn run_comparison(
    engines: Vec<(String, EngineFactory<'_>)>,
    inputs: &BenchInputs,
    cfg: &BenchConfig,
) -> Vec<EngineOutcome> {
    let last = engines.len().saturating_sub(1);
    let mut outcomes = Vec::with_capacity(engines.len());
    for (i, (name, build)) in engines.into_iter().enumerate() {
        let outcome = match run_with(build, inputs, cfg) {
            Ok(result) => EngineOutcome::Completed(result),
            Err(error) => {
                warn!(engine = %name, %error, "engine run failed");
                EngineOutcome::Failed { engine: name, error }
            }
        };
        outcomes.push(outcome);

        if i < last && !cfg.cooldown.is_zero() {
            info!(cooldown_ms = cfg.cooldown.as_millis() as u64, "cooldown");
            std::thread::sleep(cfg.cooldown);
        }
    }
    outcomes
}
