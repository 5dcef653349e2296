//! julius-engine - Attribution pipeline CLI
//!
//! Loads Meta Ads, Google Ads and Shopify CSV exports, runs the attribution
//! pipeline and writes the daily, ad-set and ad tables into the output folder.
//!
//! Exit codes: 0 on success, 2 when an export is missing a required column,
//! 1 on any other failure.

use anyhow::{bail, Context, Result};
use clap::Parser;
use julius_common::config::{
    default_config_path, write_toml_config, OutputFolderResolver, TomlConfig,
};
use julius_common::events::EventBus;
use julius_engine::config::load_engine_config;
use julius_engine::io::{load_input, write_outputs, InputPaths};
use julius_engine::{EngineConfig, EngineError, PipelineEngine, Recommendation};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for julius-engine
#[derive(Parser, Debug)]
#[command(name = "julius-engine")]
#[command(about = "Attribute ad spend to Shopify sessions and score performance")]
#[command(version)]
struct Args {
    /// Meta Ads export (CSV)
    #[arg(long)]
    meta: Option<PathBuf>,

    /// Google Ads export (CSV)
    #[arg(long)]
    google: Option<PathBuf>,

    /// Shopify sessions export (CSV)
    #[arg(long)]
    shopify: Option<PathBuf>,

    /// Output folder (overrides JULIUS_OUTPUT_DIR and the config file)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Config file (defaults to JULIUS_CONFIG or the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write run_report.json
    #[arg(long)]
    json: bool,

    /// Log filter when RUST_LOG is unset (e.g. "debug", "julius_engine=trace")
    #[arg(long)]
    log_level: Option<String>,

    /// Write the shared config file (output folder and logging) and exit
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(args: &Args, toml_config: &TomlConfig) -> Result<()> {
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &toml_config.logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    Ok(())
}

fn load_configs(args: &Args) -> Result<(TomlConfig, EngineConfig)> {
    match args.config.clone().or_else(default_config_path) {
        Some(path) => load_engine_config(&path)
            .with_context(|| format!("Invalid configuration in {}", path.display())),
        None => Ok((TomlConfig::default(), EngineConfig::default())),
    }
}

/// Wait for the progress logger; a panicked or aborted task is logged, not fatal
async fn join_progress(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Progress task ended abnormally: {}", e);
            false
        }
    }
}

/// Persist the resolved output folder so later runs need no `--out-dir`
fn init_config(args: &Args, toml_config: TomlConfig) -> Result<()> {
    let Some(path) = args.config.clone().or_else(default_config_path) else {
        bail!("No config location available: pass --config");
    };

    let logging = toml_config.logging.clone();
    let output_dir = OutputFolderResolver::new(args.out_dir.clone(), toml_config).resolve();
    let config = TomlConfig {
        output_dir: Some(output_dir),
        logging,
    };

    write_toml_config(&config, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so its [logging] section applies
    let (toml_config, engine_config) = load_configs(&args)?;
    init_tracing(&args, &toml_config)?;

    info!(
        "Starting julius-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.init_config {
        return init_config(&args, toml_config);
    }

    let paths = InputPaths {
        meta: args.meta.clone(),
        google: args.google.clone(),
        shopify: args.shopify.clone(),
    };
    if paths.meta.is_none() && paths.google.is_none() && paths.shopify.is_none() {
        bail!("No exports given: pass at least one of --meta, --google, --shopify");
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            ctrl_c_token.cancel();
        }
    });

    let input = load_input(&paths, &cancel)
        .await
        .context("Failed to load exports")?;

    let bus = EventBus::new(engine_config.progress.event_capacity);
    let mut events = bus.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!("Progress: {}", event.to_json_line());
        }
    });

    let mut engine = PipelineEngine::new(engine_config).with_events(bus);
    let output = match engine.run(input).await {
        Ok(output) => output,
        Err(EngineError::Validation(e)) => {
            eprintln!("error: {}", e);
            eprintln!("Re-export the {} report with the listed columns and run again.", e.platform());
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("Pipeline run failed"),
    };
    // Dropping the engine closes the bus and ends the progress task
    drop(engine);
    join_progress(progress).await;

    let out_dir = OutputFolderResolver::new(args.out_dir.clone(), toml_config).resolve();
    let files = write_outputs(&out_dir, &output, args.json)
        .with_context(|| format!("Failed to write outputs to {}", out_dir.display()))?;

    let mut recommendations: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &output.ads {
        *recommendations.entry(row.recommendation.label()).or_default() += 1;
    }

    println!("Run {}", output.run_id);
    println!("  {} ({} rows)", files.daily.display(), output.daily.len());
    println!("  {} ({} rows)", files.ad_sets.display(), output.ad_sets.len());
    println!("  {} ({} rows)", files.ads.display(), output.ads.len());
    if let Some(report) = &files.report {
        println!("  {}", report.display());
    }
    for label in [
        Recommendation::Scale,
        Recommendation::TestToScale,
        Recommendation::Optimize,
        Recommendation::PauseFix,
    ]
    .map(Recommendation::label)
    {
        println!("  {:<14} {}", label, recommendations.get(label).copied().unwrap_or(0));
    }

    Ok(())
}
