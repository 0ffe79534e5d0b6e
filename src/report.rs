//! Plain-text comparison tables for the terminal.

use std::fmt::Write;

use crate::harness::{BenchmarkResult, EngineOutcome};
use crate::profiler::BottleneckReport;

const LABEL_WIDTH: usize = 28;
const MIN_COLUMN_WIDTH: usize = 20;
const BREAKDOWN_RULE: usize = 72;

/// One table row: a label and how to format each engine's value.
#[derive(Clone, Copy)]
pub struct Metric {
    pub label: &'static str,
    pub format: fn(&BenchmarkResult) -> String,
}

impl Metric {
    pub const fn new(label: &'static str, format: fn(&BenchmarkResult) -> String) -> Self {
        Self { label, format }
    }
}

impl std::fmt::Debug for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric").field("label", &self.label).finish()
    }
}

/// The standard comparison rows.
pub fn default_metrics() -> Vec<Metric> {
    vec![
        Metric::new("Total time", |r| format!("{:.1}s", r.total_seconds())),
        Metric::new("Throughput", |r| format!("{:.0} PDFs/s", r.throughput())),
        Metric::new("Avg time per PDF", |r| format!("{:.2}ms", r.avg_ms_per_document())),
        Metric::new("Warmup (first PDF)", |r| format!("{:.0}ms", r.warmup_ms())),
        Metric::new("Steady-state throughput", |r| {
            format!("{:.0} PDFs/s", r.steady_state_throughput())
        }),
        Metric::new("Peak memory", |r| format!("{:.0} MB", r.peak_memory_mb())),
        Metric::new("Total output size", |r| format!("{:.0} MB", r.total_output_mb())),
        Metric::new("Avg PDF file size", |r| format!("{:.1} KB", r.avg_file_size_kb())),
        Metric::new("P50 latency", |r| format!("{:.1}ms", r.percentile_ms(50.0))),
        Metric::new("P95 latency", |r| format!("{:.1}ms", r.percentile_ms(95.0))),
        Metric::new("P99 latency", |r| format!("{:.1}ms", r.percentile_ms(99.0))),
    ]
}

/// Standard rows plus engine construction time.
pub fn extended_metrics() -> Vec<Metric> {
    let mut metrics = vec![Metric::new("Engine construction", |r| {
        format!("{:.1}ms", r.construction_ms())
    })];
    metrics.extend(default_metrics());
    metrics
}

/// Render one column per engine and one row per metric.
///
/// Columns are at least 20 characters and widen to fit the longest engine
/// name or cell. Separator rules match the header width.
pub fn format_table(results: &[BenchmarkResult], metrics: &[Metric]) -> String {
    let cells: Vec<Vec<String>> = metrics
        .iter()
        .map(|m| results.iter().map(|r| (m.format)(r)).collect())
        .collect();

    let width = results
        .iter()
        .map(|r| r.engine_name.chars().count())
        .chain(cells.iter().flatten().map(|c| c.chars().count()))
        .fold(MIN_COLUMN_WIDTH, usize::max);

    let mut header = format!("{:<LABEL_WIDTH$}", "");
    for result in results {
        let _ = write!(header, " {:>width$}", result.engine_name);
    }
    let rule = "-".repeat(header.chars().count());

    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{rule}");
    for (metric, row) in metrics.iter().zip(&cells) {
        let _ = write!(out, "{:<LABEL_WIDTH$}", metric.label);
        for cell in row {
            let _ = write!(out, " {cell:>width$}");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{rule}");
    out
}

/// One line per engine whose run did not complete.
pub fn format_failures(outcomes: &[EngineOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        if let EngineOutcome::Failed { engine, error } = outcome {
            let _ = writeln!(out, "{engine}: FAILED ({error})");
        }
    }
    out
}

/// Stage breakdown of one profiled engine.
pub fn format_breakdown(report: &BottleneckReport) -> String {
    let sep = "=".repeat(BREAKDOWN_RULE);
    let thin = "-".repeat(BREAKDOWN_RULE - 6);
    let ms = |nanos: u64| nanos as f64 / 1e6;
    let combined_avg = report.front_avg_ms() + report.back_avg_ms();

    let mut out = String::new();
    let _ = writeln!(out, "{sep}");
    let _ = writeln!(
        out,
        "  BOTTLENECK BREAKDOWN: {} ({} documents)",
        report.engine, report.documents
    );
    let _ = writeln!(out, "{sep}");
    let _ = writeln!(
        out,
        "  {:<30} {:>12} {:>12} {:>8}",
        "Phase", "Total (ms)", "Avg/doc (ms)", "Share"
    );
    let _ = writeln!(out, "  {thin}");
    let _ = writeln!(
        out,
        "  {:<30} {:>12.1} {:>12.3} {:>7.1}%",
        report.front_stage,
        ms(report.front_total_nanos),
        report.front_avg_ms(),
        report.front_share()
    );
    let _ = writeln!(
        out,
        "  {:<30} {:>12.1} {:>12.3} {:>7.1}%",
        report.back_stage,
        ms(report.back_total_nanos),
        report.back_avg_ms(),
        report.back_share()
    );
    let _ = writeln!(out, "  {thin}");
    let combined_share = if report.combined_nanos() == 0 { 0.0 } else { 100.0 };
    let _ = writeln!(
        out,
        "  {:<30} {:>12.1} {:>12.3} {:>7.1}%",
        "Combined",
        ms(report.combined_nanos()),
        combined_avg,
        combined_share
    );
    out.push('\n');
    let _ = writeln!(out, "  Initialization costs (one-time):");
    for ctor in &report.constructors {
        let _ = writeln!(out, "    {:<30} {:>10.1} ms", ctor.component, ms(ctor.nanos));
    }
    let _ = writeln!(out, "{sep}");
    out
}
