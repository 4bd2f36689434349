//! geotrack - offline position tracking with deferred upload.
//!
//! Run with: `cargo run -p geotrack-service -- run --replay trace.jsonl`

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use geotrack_core::{CollectorClient, ReplaySource, RetentionSweeper, SyncEngine, shared};
use geotrack_service::{Config, Session};
use geotrack_store::{DeviceIdStore, FileDeviceIdStore, Store};

/// geotrack - record positions locally and upload them when the network allows.
#[derive(Parser, Debug)]
#[command(name = "geotrack")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Collector base URL (overrides config).
    #[arg(short, long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track positions and upload them until interrupted.
    Run {
        /// JSON-lines trace to replay as the position source.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Run one upload cycle now.
    Upload,

    /// Check that the collector is reachable.
    Health,

    /// Show local sample counts.
    Stats,

    /// List local samples, newest first.
    List {
        /// Maximum number of samples to show.
        #[arg(short, long)]
        limit: Option<u32>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List what the collector has stored.
    RemoteList,

    /// Delete uploaded samples past the retention period.
    Sweep,

    /// Export every local sample as JSON lines.
    Export {
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print this installation's device id.
    DeviceId,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("geotrack_service=info".parse()?)
                .add_directive("geotrack_core=info".parse()?)
                .add_directive("geotrack_store=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Command::Run { replay } => run(config, replay).await,
        Command::Upload => upload(config).await,
        Command::Health => health(config).await,
        Command::Stats => stats(config),
        Command::List { limit, json } => list(config, limit, json),
        Command::RemoteList => remote_list(config).await,
        Command::Sweep => sweep(config).await,
        Command::Export { output } => export(config, output),
        Command::DeviceId => device_id(config),
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(server) = &args.server {
        config.upload.remote_base_url = server.clone();
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::open(&config.storage.path)
        .with_context(|| format!("opening {}", config.storage.path.display()))
}

fn collector(config: &Config) -> anyhow::Result<CollectorClient> {
    Ok(CollectorClient::with_timeouts(
        &config.upload.remote_base_url,
        config.timeouts(),
    )?)
}

async fn run(config: Config, replay: Option<PathBuf>) -> anyhow::Result<()> {
    let replay = replay
        .or_else(|| config.source.replay_path.clone())
        .context("no position source: pass --replay FILE or set source.replay_path")?;

    let device_id = FileDeviceIdStore::new(&config.storage.device_id_path).load_or_create()?;
    let store = shared(open_store(&config)?);
    let source = Arc::new(ReplaySource::new(&replay).restamp(true));

    let session = Session::with_collector(
        store,
        device_id,
        source,
        collector(&config)?,
        config.session_settings(),
    );

    session.start().await?;
    info!("Replaying {} (Ctrl-C to stop)", replay.display());

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping session");

    if let Some(report) = session.stop().await {
        println!(
            "Ingestion: {} stored, {} dropped, {} filtered ({:?})",
            report.stored, report.dropped, report.filtered, report.exit
        );
    }
    println!("{}", session.cache_stats().await?);
    Ok(())
}

async fn upload(config: Config) -> anyhow::Result<()> {
    let store = shared(open_store(&config)?);
    let engine = SyncEngine::new(store, Arc::new(collector(&config)?));

    match engine.run_cycle().await {
        Ok(report) => {
            println!("uploaded {} sample(s)", report.succeeded);
            if report.failed() > 0 {
                println!(
                    "{} rejected, {} not delivered; they will be retried",
                    report.rejected, report.transport_failures
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("upload failed: {}", e);
            Err(e.into())
        }
    }
}

async fn health(config: Config) -> anyhow::Result<()> {
    match collector(&config)?.health().await {
        Ok(data) => {
            println!("server ok: {}", data);
            Ok(())
        }
        Err(e) => {
            eprintln!("health check failed: {}", e);
            Err(e.into())
        }
    }
}

fn stats(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    println!("{}", store.cache_stats()?);
    Ok(())
}

fn list(config: Config, limit: Option<u32>, json: bool) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let samples = store.list_recent(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    if samples.is_empty() {
        println!("No samples stored");
        return Ok(());
    }

    println!(
        "{:>8}  {:>11}  {:>12}  {:>7}  {:<8}  {:>14}  {}",
        "ID", "LATITUDE", "LONGITUDE", "ACC(m)", "PROVIDER", "FIX TIME", "UPLOADED"
    );
    for s in &samples {
        println!(
            "{:>8}  {:>11.6}  {:>12.6}  {:>7}  {:<8}  {:>14}  {}",
            s.id,
            s.latitude,
            s.longitude,
            s.accuracy.map(|a| format!("{a:.1}")).unwrap_or_else(|| "-".into()),
            s.provider,
            s.fix_timestamp,
            if s.uploaded { "yes" } else { "no" }
        );
    }
    Ok(())
}

async fn remote_list(config: Config) -> anyhow::Result<()> {
    let rows = collector(&config)?.list_locations().await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn sweep(config: Config) -> anyhow::Result<()> {
    let settings = config.session_settings();
    let store = shared(open_store(&config)?);
    let deleted = RetentionSweeper::new(store, settings.retention)
        .sweep()
        .await?;
    println!("Deleted {} uploaded sample(s)", deleted);
    Ok(())
}

fn export(config: Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let written = match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let written = store.export_jsonl(&mut writer)?;
            writer.flush()?;
            written
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            store.export_jsonl(&mut writer)?
        }
    };
    info!("Exported {} sample(s)", written);
    Ok(())
}

fn device_id(config: Config) -> anyhow::Result<()> {
    let id = FileDeviceIdStore::new(&config.storage.device_id_path).load_or_create()?;
    println!("{}", id);
    Ok(())
}
