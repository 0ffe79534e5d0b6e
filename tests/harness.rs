//! End-to-end runs of the harness, profiler and persister over the real engines.

use std::time::Duration;

use letter_render_bench::address;
use letter_render_bench::assets::AssetDir;
use letter_render_bench::engine::PRODUCT_SHEET_TEMPLATE;
use letter_render_bench::harness::{self, BenchConfig, BenchInputs, EngineFactory, EngineOutcome, Profile};
use letter_render_bench::model::DocumentKind;
use letter_render_bench::pdf::inspect;
use letter_render_bench::profiler;
use letter_render_bench::report::{self, default_metrics};
use letter_render_bench::schema::{RunMeta, RunReport};
use letter_render_bench::store::{BatchPersister, DirectoryStore, DocumentStore};
use letter_render_bench::{EngineContext, EngineKind, Error};

fn quick(documents: usize, warmup: usize) -> BenchConfig {
    let mut cfg = BenchConfig::new(Profile::Quick, 42);
    cfg.document_count = documents;
    cfg.warmup_count = warmup;
    cfg.cooldown = Duration::ZERO;
    cfg
}

#[test]
fn test_seed_42_is_repeatable() {
    assert_eq!(address::generate(42, 100), address::generate(42, 100));
    assert_ne!(address::generate(42, 20), address::generate(43, 20));
}

#[test]
fn test_comparison_over_all_engines() {
    let cfg = quick(6, 2);
    let ctx = EngineContext::new(AssetDir::bundled());
    let inputs = BenchInputs::prepare(&cfg).unwrap();

    let outcomes = harness::run_comparison(harness::factories(&EngineKind::ALL, &ctx), &inputs, &cfg);
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        let result = outcome.result().unwrap_or_else(|| panic!("{} failed", outcome.engine()));
        assert_eq!(result.document_count, 6);
        assert_eq!(result.per_document_nanos.len(), 6);
        assert_eq!(result.steady_state_count, 4);
        assert_eq!(result.warmup_time_nanos, result.per_document_nanos[0]);
        assert_eq!(
            result.steady_state_total_nanos,
            result.per_document_nanos[2..].iter().sum::<u64>()
        );
        assert!(result.total_output_bytes > 0);
        assert!(result.percentile_ms(50.0) <= result.percentile_ms(99.0));
    }

    let names: Vec<&str> = outcomes.iter().map(EngineOutcome::engine).collect();
    assert_eq!(names, ["markup-flow", "markup-print", "compiled-report"]);
}

#[test]
fn test_broken_engine_does_not_stop_the_others() {
    let cfg = quick(3, 1);
    let good = EngineContext::new(AssetDir::bundled());
    let dir = tempfile::tempdir().unwrap();
    let broken = EngineContext::new(AssetDir::new(dir.path()));
    let inputs = BenchInputs::prepare(&cfg).unwrap();

    let flow: EngineFactory<'_> = Box::new(|| EngineKind::Flow.build(&good));
    let compiled: EngineFactory<'_> = Box::new(|| EngineKind::Report.build(&broken));
    let print: EngineFactory<'_> = Box::new(|| EngineKind::Print.build(&good));
    let engines = vec![
        ("markup-flow".to_string(), flow),
        ("compiled-report".to_string(), compiled),
        ("markup-print".to_string(), print),
    ];
    let outcomes = harness::run_comparison(engines, &inputs, &cfg);

    assert!(outcomes[0].result().is_some());
    match &outcomes[1] {
        EngineOutcome::Failed { engine, error } => {
            assert_eq!(engine, "compiled-report");
            assert!(error.is_asset_missing());
        }
        EngineOutcome::Completed(_) => panic!("engine without assets completed"),
    }
    assert!(outcomes[2].result().is_some());

    let failures = report::format_failures(&outcomes);
    assert!(failures.starts_with("compiled-report: FAILED"));

    let results: Vec<_> = outcomes.iter().filter_map(|o| o.result().cloned()).collect();
    let table = report::format_table(&results, &default_metrics());
    assert!(table.contains("markup-flow"));
    assert!(!table.contains("compiled-report"));
}

#[test]
fn test_product_sheet_comparison() {
    let mut cfg = quick(3, 1);
    cfg.document = DocumentKind::ProductSheet;
    let ctx = EngineContext::new(AssetDir::bundled()).with_template(PRODUCT_SHEET_TEMPLATE);
    assert_eq!(ctx.document(), cfg.document);
    let inputs = BenchInputs::prepare(&cfg).unwrap();

    let kinds = [EngineKind::Flow, EngineKind::Print];
    let outcomes = harness::run_comparison(harness::factories(&kinds, &ctx), &inputs, &cfg);
    for outcome in &outcomes {
        let result = outcome.result().unwrap_or_else(|| panic!("{} failed", outcome.engine()));
        assert_eq!(result.document_count, 3);
    }

    let report = RunReport::from_outcomes(RunMeta::new(&cfg, None), &outcomes, false);
    assert_eq!(serde_json::to_value(&report).unwrap()["run"]["document"], "product-sheet");
}

#[test]
fn test_run_report_lists_every_engine() {
    let cfg = quick(2, 1);
    let ctx = EngineContext::new(AssetDir::bundled());
    let inputs = BenchInputs::prepare(&cfg).unwrap();
    let outcomes = harness::run_comparison(harness::factories(&[EngineKind::Report], &ctx), &inputs, &cfg);

    let report = RunReport::from_outcomes(RunMeta::new(&cfg, Some("abc123".into())), &outcomes, true);
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["run"]["document_count"], 2);
    assert_eq!(json["run"]["git_sha"], "abc123");
    assert_eq!(json["summaries"][0]["engine"], "compiled-report");
    assert_eq!(json["results"][0]["per_document_nanos"].as_array().unwrap().len(), 2);
}

#[test]
fn test_profiler_over_every_engine() {
    let cfg = quick(4, 1);
    let ctx = EngineContext::new(AssetDir::bundled());
    let inputs = BenchInputs::prepare(&cfg).unwrap();

    for kind in EngineKind::ALL {
        let breakdown = profiler::profile_kind(kind, &ctx, &inputs, 4).unwrap();
        assert_eq!(breakdown.documents, 4);
        assert_eq!(breakdown.engine, kind.as_str());
        assert!((breakdown.front_share() + breakdown.back_share() - 100.0).abs() < 1e-6);
        assert!(breakdown.constructors.iter().any(|c| c.component == "font program"));

        let table = report::format_breakdown(&breakdown);
        assert!(table.contains(&breakdown.front_stage));
        assert!(table.contains(&breakdown.back_stage));
    }
}

#[test]
fn test_persist_to_directory() {
    let ctx = EngineContext::new(AssetDir::bundled());
    let engine = EngineKind::Flow.build(&ctx).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let addresses = address::generate(42, 7);

    let store = DirectoryStore::open(dir.path()).unwrap();
    let mut persister = BatchPersister::new(engine.as_ref(), store).with_batch_size(3);
    let summary = persister.persist(&addresses, 0, None).unwrap();
    assert_eq!(summary.documents, 7);
    assert_eq!(summary.batches, 3);

    let store = persister.into_store();
    assert_eq!(store.count().unwrap(), 7);
    let doc = store.find_by_id(7).unwrap().unwrap();
    assert!(inspect::is_pdf(&doc.pdf));
    let last_name = addresses[6].recipient_name.rsplit(' ').next().unwrap();
    assert_eq!(doc.filename, format!("{last_name}_7.pdf"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let cfg = quick(0, 0);
    match BenchInputs::prepare(&cfg) {
        Err(Error::Config(_)) => {}
        other => panic!("expected config error, got {other:?}"),
    }
}
