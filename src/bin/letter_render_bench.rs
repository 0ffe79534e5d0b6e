use clap::{Parser, Subcommand, ValueEnum};
use letter_render_bench::address::{self, Address};
use letter_render_bench::assets::AssetDir;
use letter_render_bench::harness::{self, BenchConfig, BenchInputs, Profile};
use letter_render_bench::engine::DEFAULT_TEMPLATE;
use letter_render_bench::model::{fields, DocumentKind, LetterBuilder};
use letter_render_bench::profiler::{self, DEFAULT_PROFILE_DOCUMENTS};
use letter_render_bench::qr::QrPayload;
use letter_render_bench::report;
use letter_render_bench::schema::{ProfileReport, RunMeta, RunReport};
use letter_render_bench::store::{BatchPersister, DirectoryStore, DEFAULT_BATCH_SIZE};
use letter_render_bench::{EngineContext, EngineKind, RenderingEngine, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare engines over the same synthetic letters and print a table.
    Bench {
        /// Engines to run, in order. Defaults to all.
        #[arg(long = "engine", value_enum, num_args = 1.., action = clap::ArgAction::Append)]
        engines: Vec<EngineKind>,

        /// Documents per engine; defaults to the profile's count.
        #[arg(long, short = 'n')]
        documents: Option<usize>,

        /// Leading documents excluded from steady-state figures.
        #[arg(long)]
        warmup: Option<usize>,

        /// Pause between engines in milliseconds.
        #[arg(long)]
        cooldown_ms: Option<u64>,

        /// Render letters without the QR section.
        #[arg(long, default_value_t = false)]
        no_qr: bool,

        /// Include per-document timings in the JSON report.
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Markup template to render; `template-b` is the product sheet.
        #[arg(long, default_value = DEFAULT_TEMPLATE)]
        template: String,
    },

    /// Time template/fill and PDF stages separately.
    Profile {
        #[arg(long = "engine", value_enum, num_args = 1.., action = clap::ArgAction::Append)]
        engines: Vec<EngineKind>,

        #[arg(long, short = 'n', default_value_t = DEFAULT_PROFILE_DOCUMENTS)]
        documents: usize,

        #[arg(long, default_value_t = false)]
        no_qr: bool,
    },

    /// Render a single letter to a file.
    Render {
        #[arg(long, value_enum, default_value_t = EngineKind::Flow)]
        engine: EngineKind,

        /// Output PDF file.
        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,

        /// Position in the seeded address sequence.
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// Override the generated recipient name.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        street: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        extra: Option<String>,

        #[arg(long, default_value_t = false)]
        no_qr: bool,

        /// Markup template to render; `template-b` is the product sheet.
        #[arg(long, default_value = DEFAULT_TEMPLATE)]
        template: String,
    },

    /// Print the seeded address sequence as JSON.
    Addresses {
        #[arg(long, short = 'n', default_value_t = 10)]
        count: usize,
    },

    /// Render letters and store them in a directory in batches.
    Persist {
        #[arg(long, value_enum, default_value_t = EngineKind::Flow)]
        engine: EngineKind,

        #[arg(long, short = 'n', default_value_t = 100)]
        documents: usize,

        #[arg(long, short = 'o', value_name = "DIR")]
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        #[arg(long, default_value_t = false)]
        no_qr: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "letter-render-bench")]
#[command(about = "Letter-to-PDF engine comparison (table on stdout, optional JSON report)")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Where to write the JSON report.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Asset directory; falls back to $LETTER_ASSETS_DIR, then ./assets.
    #[arg(long, global = true, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Base directory for relative image references in templates.
    #[arg(long, global = true, value_name = "DIR")]
    base_uri: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn selected(engines: &[EngineKind]) -> Vec<EngineKind> {
    if engines.is_empty() {
        EngineKind::ALL.to_vec()
    } else {
        engines.to_vec()
    }
}

/// Engines able to lay out `document`; only letters have a report definition.
fn selected_for(engines: &[EngineKind], document: DocumentKind) -> Vec<EngineKind> {
    match (engines.is_empty(), document) {
        (true, DocumentKind::ProductSheet) => vec![EngineKind::Flow, EngineKind::Print],
        _ => selected(engines),
    }
}

fn write_json<T: serde::Serialize>(out: Option<&PathBuf>, value: &T) -> Result<()> {
    if let Some(path) = out {
        fs::write(path, serde_json::to_string_pretty(value)?)?;
        info!(path = %path.display(), "JSON report written");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = BenchConfig::new(args.profile.into(), args.seed);
    let mut ctx = EngineContext::new(args.assets.clone().map_or_else(AssetDir::from_env, AssetDir::new));
    ctx.base_uri = args.base_uri.clone();

    match &args.cmd {
        Command::Bench {
            engines,
            documents,
            warmup,
            cooldown_ms,
            no_qr,
            raw,
            template,
        } => {
            ctx.template = template.clone();
            cfg.document = ctx.document();
            if let Some(n) = documents {
                cfg.document_count = *n;
            }
            if let Some(w) = warmup {
                cfg.warmup_count = *w;
            }
            if let Some(ms) = cooldown_ms {
                cfg.cooldown = Duration::from_millis(*ms);
            }
            if *no_qr {
                cfg.qr_text = None;
            }

            let inputs = BenchInputs::prepare(&cfg)?;
            let kinds = selected_for(engines, cfg.document);
            info!(
                engines = kinds.len(),
                template = %ctx.template,
                documents = cfg.document_count,
                warmup = cfg.warmup_count,
                "benchmark started"
            );
            let outcomes = harness::run_comparison(harness::factories(&kinds, &ctx), &inputs, &cfg);

            let results: Vec<_> = outcomes.iter().filter_map(|o| o.result().cloned()).collect();
            println!();
            println!(
                "=== Letter rendering benchmark: {} documents per engine ===",
                cfg.document_count
            );
            println!();
            print!("{}", report::format_table(&results, &report::extended_metrics()));
            let failures = report::format_failures(&outcomes);
            if !failures.is_empty() {
                println!();
                print!("{failures}");
            }

            let run = RunReport::from_outcomes(RunMeta::new(&cfg, git_sha_short()), &outcomes, *raw);
            write_json(args.out.as_ref(), &run)?;
        }
        Command::Profile {
            engines,
            documents,
            no_qr,
        } => {
            cfg.document_count = *documents;
            if *no_qr {
                cfg.qr_text = None;
            }
            let inputs = BenchInputs::prepare(&cfg)?;

            let mut breakdowns = Vec::new();
            for kind in selected(engines) {
                let breakdown = profiler::profile_kind(kind, &ctx, &inputs, *documents)?;
                println!();
                print!("{}", report::format_breakdown(&breakdown));
                breakdowns.push(breakdown);
            }

            let run = ProfileReport {
                run: RunMeta::new(&cfg, git_sha_short()),
                breakdowns,
            };
            write_json(args.out.as_ref(), &run)?;
        }
        Command::Render {
            engine,
            output,
            index,
            name,
            street,
            city,
            company,
            department,
            extra,
            no_qr,
            template,
        } => {
            ctx.template = template.clone();
            let generated = address::at(cfg.seed, *index);
            let address = Address::new(
                name.clone().unwrap_or(generated.recipient_name),
                street.clone().unwrap_or(generated.recipient_street),
                city.clone().unwrap_or(generated.recipient_city),
            );
            let qr = if *no_qr {
                None
            } else {
                Some(QrPayload::from_text(harness::DEFAULT_QR_TEXT, harness::DEFAULT_QR_SIZE)?)
            };

            let mut builder = LetterBuilder::for_address(&address)
                .content(ctx.document())
                .qr(qr.as_ref(), engine.image_repr());
            for (field, value) in [
                (fields::RECIPIENT_COMPANY, company),
                (fields::RECIPIENT_DEPARTMENT, department),
                (fields::RECIPIENT_EXTRA, extra),
            ] {
                if let Some(value) = value {
                    builder = builder.set(field, value.as_str());
                }
            }

            let engine = engine.build(&ctx)?;
            let pdf = engine.render(&builder.build())?;
            fs::write(output, &pdf)?;
            eprintln!("Wrote {} ({} bytes) with {}", output.display(), pdf.len(), engine.name());
        }
        Command::Addresses { count } => {
            let addresses = address::generate(cfg.seed, *count);
            let json = serde_json::to_string_pretty(&addresses)?;
            match &args.out {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Persist {
            engine,
            documents,
            output,
            batch_size,
            no_qr,
        } => {
            let addresses = address::generate(cfg.seed, *documents);
            let qr = if *no_qr {
                None
            } else {
                Some(QrPayload::from_text(harness::DEFAULT_QR_TEXT, harness::DEFAULT_QR_SIZE)?)
            };
            let engine = engine.build(&ctx)?;
            let store = DirectoryStore::open(output)?;
            let mut persister = BatchPersister::new(engine.as_ref(), store).with_batch_size(*batch_size);

            let start = std::time::Instant::now();
            let summary = persister.persist(&addresses, 0, qr.as_ref())?;
            let elapsed = start.elapsed();
            eprintln!(
                "Stored {} documents in {} batches ({:.2} MB) in {:.2}s under {}",
                summary.documents,
                summary.batches,
                summary.bytes as f64 / 1_048_576.0,
                elapsed.as_secs_f64(),
                persister.store().root().display()
            );
        }
    }

    Ok(())
}
