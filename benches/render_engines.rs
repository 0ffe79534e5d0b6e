//! Rendering engine benchmark suite
//!
//! Micro-benchmarks complementing the CLI harness:
//! - Engine construction per variant
//! - Single letter render per variant, with and without QR
//! - Template substitution and markup parsing in isolation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use letter_render_bench::address;
use letter_render_bench::assets::AssetDir;
use letter_render_bench::harness::{DEFAULT_QR_SIZE, DEFAULT_QR_TEXT};
use letter_render_bench::markup::{self, ParseOptions, TemplateRenderer};
use letter_render_bench::model::{standard_letter, ImageRepr};
use letter_render_bench::qr::QrPayload;
use letter_render_bench::{EngineContext, EngineKind, RenderingEngine};

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_construction");
    group.sample_size(20);
    let ctx = EngineContext::new(AssetDir::bundled());

    for kind in EngineKind::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(kind.as_str()), &kind, |bencher, kind| {
            bencher.iter(|| black_box(kind.build(&ctx).unwrap()))
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_letter");
    let ctx = EngineContext::new(AssetDir::bundled());
    let qr = QrPayload::from_text(DEFAULT_QR_TEXT, DEFAULT_QR_SIZE).unwrap();
    let addresses = address::generate(42, 64);

    for kind in EngineKind::ALL {
        let engine = kind.build(&ctx).unwrap();
        for (label, payload) in [("qr", Some(&qr)), ("plain", None)] {
            let models: Vec<_> = addresses
                .iter()
                .map(|a| standard_letter(a, payload, engine.image_repr()))
                .collect();
            let mut i = 0usize;
            group.bench_function(BenchmarkId::new(kind.as_str(), label), |bencher| {
                bencher.iter(|| {
                    let model = &models[i % models.len()];
                    i += 1;
                    black_box(engine.render(black_box(model)).unwrap())
                })
            });
        }
    }

    group.finish();
}

fn bench_template_stage(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_stage");
    let assets = AssetDir::bundled();
    let templates = TemplateRenderer::load(&assets.templates().unwrap()).unwrap();
    let qr = QrPayload::from_text(DEFAULT_QR_TEXT, DEFAULT_QR_SIZE).unwrap();
    let address = &address::generate(42, 1)[0];
    let model = standard_letter(address, Some(&qr), ImageRepr::DataUri);

    group.bench_function("substitute", |bencher| {
        bencher.iter(|| black_box(templates.render("template-a", black_box(&model)).unwrap()))
    });

    let markup = templates.render("template-a", &model).unwrap();
    let options = ParseOptions::default();
    group.bench_function("parse_markup", |bencher| {
        bencher.iter(|| black_box(markup::parse(black_box(&markup), &options).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_construction, bench_render, bench_template_stage);
criterion_main!(benches);
