//! SailScan - identify racing yachts by the numbers on their sails

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use sailscan::capture::{CapturedImage, FileSource, ImageSource};
use sailscan::config::{self, AppConfig};
use sailscan::session::{ScanReport, ScanSession};
use sailscan::storage::{self, Competitor, Database, DEFAULT_RECENT_LIMIT};
use sailscan::vision::ocr_preprocess::expand_with_jitter;
use sailscan::vision::{DetectionPipeline, HttpOcrService, OcrGateway, ScanError};

/// SailScan - sail number detection
#[derive(Parser, Debug)]
#[command(name = "sailscan", version)]
#[command(about = "Detect sail numbers in photographs of racing yachts")]
struct Args {
    /// Configuration file (default: config.toml in the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan one image
    Scan {
        image: PathBuf,
        /// Print the full intermediate trace as JSON
        #[arg(long)]
        trace: bool,
        /// Do not store detections
        #[arg(long)]
        no_store: bool,
    },
    /// Rescan an image file on every tick until Ctrl-C, printing session events as JSON lines
    Watch {
        image: PathBuf,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        #[arg(long)]
        no_store: bool,
    },
    /// List recently stored detections
    Recent {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// Register or update a competitor
    AddCompetitor {
        sail_number: u32,
        #[arg(long)]
        skipper: Option<String>,
        #[arg(long)]
        boat: Option<String>,
        #[arg(long)]
        club: Option<String>,
    },
    /// Print the configured image variants
    Variants,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_or_create_config(args.config.as_deref())?;

    match args.command {
        Command::Scan { image, trace, no_store } => run_scan(&config, &image, trace, !no_store).await,
        Command::Watch { image, interval_ms, no_store } => {
            run_watch(&config, image, Duration::from_millis(interval_ms), !no_store).await
        }
        Command::Recent { limit } => list_recent(&config, limit),
        Command::AddCompetitor { sail_number, skipper, boat, club } => {
            let db = open_database(&config)?;
            db.upsert_competitor(&Competitor {
                sail_number,
                skipper_name: skipper,
                boat_name: boat,
                club,
            })?;
            println!("Registered sail {}", sail_number);
            Ok(())
        }
        Command::Variants => {
            for variant in expand_with_jitter(&config.variants, config.jitter.as_ref()) {
                let threshold = variant
                    .threshold
                    .map(|t| format!("{} (margin {})", t, variant.margin))
                    .unwrap_or_else(|| "none".to_string());
                println!(
                    "{:<20} threshold {:<16} contrast {:.2}  brightness {:+.0}",
                    variant.name, threshold, variant.contrast, variant.brightness
                );
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so JSON output on stdout stays clean
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file, writing the defaults on first run
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let config_path = storage::get_config_dir()?.join("config.toml");
    if config_path.exists() {
        let config = config::load_config(&config_path)?;
        info!("Loaded configuration from {:?}", config_path);
        return Ok(config);
    }

    let config = AppConfig::default();
    match config::save_config(&config, &config_path) {
        Ok(()) => info!("Wrote default configuration to {:?}", config_path),
        Err(e) => warn!("Could not write default configuration to {:?}: {:#}", config_path, e),
    }
    Ok(config)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = match &config.storage.database {
        Some(path) => path.clone(),
        None => storage::get_data_dir()?.join("sailscan.db"),
    };
    Database::open(&path)
}

fn build_session(config: &AppConfig, store: bool) -> Result<Arc<ScanSession>> {
    if config.ocr.endpoint.is_empty() {
        bail!("ocr.endpoint is not configured");
    }
    let api_key = std::env::var(&config.ocr.api_key_env)
        .with_context(|| format!("OCR key not found in ${}", config.ocr.api_key_env))?;

    let service = HttpOcrService::new(&config.ocr.endpoint, &api_key, config.ocr.request_timeout())?;
    let gateway = OcrGateway::new(Arc::new(service), config.ocr.poll_policy())
        .with_max_outstanding(config.ocr.max_outstanding_submissions);
    let pipeline = DetectionPipeline::new(gateway, config.pipeline_config());

    let db = Arc::new(open_database(config)?);
    let mut session = ScanSession::new(pipeline).with_lookup(db.clone());
    if store {
        session = session.with_sink(db);
    }

    Ok(Arc::new(session))
}

/// Ctrl-C cancels whatever scan is in flight
fn stop_on_ctrl_c(session: &Arc<ScanSession>) -> tokio::task::JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            session.stop();
        }
    })
}

async fn run_scan(config: &AppConfig, path: &Path, trace: bool, store: bool) -> Result<()> {
    let session = build_session(config, store)?;
    let image = CapturedImage::from_file(path)?;

    let stopper = stop_on_ctrl_c(&session);
    let result = session.scan(&image).await;
    stopper.abort();

    if trace {
        if let Some(trace) = session.last_trace() {
            println!("{}", serde_json::to_string_pretty(&trace)?);
        }
    }

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(ScanError::NoTextDetected) => {
            println!("No sail number found");
            Ok(())
        }
        Err(e) => Err(e).context("scan failed"),
    }
}

fn print_report(report: &ScanReport) {
    println!("Variant: {}", report.outcome.variant_name);
    for result in &report.outcome.results {
        println!("  {:>6}  {:5.1}%", result.value, result.confidence * 100.0);
    }

    if let Some(competitor) = &report.competitor {
        println!(
            "Sail {}: {} / {} / {}",
            competitor.sail_number,
            competitor.boat_name.as_deref().unwrap_or("-"),
            competitor.skipper_name.as_deref().unwrap_or("-"),
            competitor.club.as_deref().unwrap_or("-")
        );
    }
}

async fn run_watch(config: &AppConfig, path: PathBuf, interval: Duration, store: bool) -> Result<()> {
    let session = build_session(config, store)?;
    let mut source = FileSource::new(path);

    let events = session.events();
    std::thread::spawn(move || {
        for event in events.iter() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }
    });

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Watching, one scan every {:?} (Ctrl-C to stop)", interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop();
                break;
            }
            _ = ticker.tick() => {
                if session.is_scanning() {
                    debug!("Previous scan still running, skipping tick");
                    continue;
                }

                let image = match source.capture() {
                    Ok(image) => image,
                    Err(e) => {
                        warn!("Capture failed: {:#}", e);
                        continue;
                    }
                };

                let session = session.clone();
                tokio::spawn(async move {
                    match session.scan(&image).await {
                        Ok(_) | Err(ScanError::NoTextDetected) | Err(ScanError::Busy) => {}
                        Err(e) => warn!("Scan failed: {}", e),
                    }
                });
            }
        }
    }

    info!("Stopped watching");
    Ok(())
}

fn list_recent(config: &AppConfig, limit: usize) -> Result<()> {
    let db = open_database(config)?;
    let recent = db.recent_detections(limit)?;

    if recent.is_empty() {
        println!("No detections stored");
        return Ok(());
    }

    for record in recent {
        println!(
            "{}  {:>6}  {:5.1}%",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.value,
            record.confidence * 100.0
        );
    }
    Ok(())
}
