//! Ebrojevi - food-additive label scanner
//!
//! Captures an image of a product label, runs text recognition on it and
//! lists the additive codes ("E-numbers") found in the text.

mod analysis;
mod app;
mod capture;
mod config;
mod pipeline;
mod shared;
mod vision;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{ReportOptions, ScannerApp};
use crate::capture::{CaptureMode, Rotation};
use crate::config::AppConfig;

/// Capture flow selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One scan per image
    OnDemand,
    /// Replay images as a live frame stream
    Continuous,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::OnDemand => CaptureMode::OnDemand,
            ModeArg::Continuous => CaptureMode::Continuous,
        }
    }
}

/// Ebrojevi - extract E-numbers from product label photos
#[derive(Parser, Debug)]
#[command(name = "ebrojevi")]
#[command(about = "Scan product labels and list the food-additive codes they contain")]
struct Args {
    /// Label images to scan
    images: Vec<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture mode
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Abandon a capture or recognition step after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Rotation needed to make the images upright (0, 90, 180, 270)
    #[arg(long, conflicts_with = "device_angle")]
    rotation: Option<u32>,

    /// Device orientation angle the photos were taken at
    #[arg(long)]
    device_angle: Option<u32>,

    /// Print each result as a JSON line
    #[arg(long)]
    json: bool,

    /// List each code only once per scan
    #[arg(short, long)]
    unique: bool,

    /// List each code on its own line with its number and suffix
    #[arg(short, long, conflicts_with = "json")]
    details: bool,

    /// Write the default configuration file and exit
    #[arg(long)]
    init_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    if args.init_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let mut config = load_or_default_config(&config_path, args.config.is_some())?;
    apply_overrides(&mut config, &args)?;

    if args.images.is_empty() {
        bail!("No images given");
    }

    let report = ReportOptions {
        json: args.json,
        unique: args.unique,
        details: args.details,
    };
    let app = ScannerApp::new(&config, args.images, report)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
                shutdown.cancel();
            }
        }
    });

    let summary = app.run(shutdown).await?;
    info!(
        "Scanning finished: {} ready, {} failed",
        summary.ready, summary.failed
    );
    drop(app);

    if summary.ready == 0 && summary.failed > 0 {
        bail!("Every scan failed");
    }
    Ok(())
}

/// Load configuration from file, or fall back to defaults when the default
/// location has no file yet
fn load_or_default_config(path: &std::path::Path, explicit: bool) -> Result<AppConfig> {
    if explicit || path.exists() {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Apply command-line overrides on top of the file configuration
fn apply_overrides(config: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(mode) = args.mode {
        config.capture.mode = mode.into();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.pipeline.op_timeout_ms = Some(timeout_ms);
    }
    if let Some(degrees) = args.rotation {
        Rotation::from_degrees(degrees)
            .with_context(|| format!("Invalid rotation {}", degrees))?;
        config.capture.rotation = degrees;
    }
    if let Some(angle) = args.device_angle {
        let rotation = Rotation::from_device_angle(angle);
        info!("Device angle {} maps to rotation {}", angle, rotation);
        config.capture.rotation = rotation.degrees();
    }
    if config.capture.mode == CaptureMode::Continuous && config.pipeline.op_timeout_ms.is_none() {
        warn!("Continuous mode without opTimeoutMs: a stuck OCR call blocks every later frame");
    }
    Ok(())
}
