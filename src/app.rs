//! Application Coordinator
//!
//! Wires the configured capture source and OCR engine into a pipeline
//! controller and reports every finished scan from a reporter thread.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analysis::{dedup_codes, AdditiveCode};
use crate::capture::{CaptureMode, FileCapture};
use crate::config::AppConfig;
use crate::pipeline::{CycleOutcome, PipelineConfig, PipelineController};
use crate::shared::{Phase, PipelineState, SubscriptionId};
use crate::vision::CommandRecognizer;

/// How finished scans are printed
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Print each snapshot as a JSON line
    pub json: bool,
    /// Print each code only once per scan
    pub unique: bool,
    /// Print one code per line with its number and suffix
    pub details: bool,
}

/// Totals for a scanning session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Cycles that reached `Ready`
    pub ready: usize,
    /// Cycles that ended in `Failed`
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    ready: AtomicUsize,
    failed: AtomicUsize,
}

/// Main application coordinator
pub struct ScannerApp {
    controller: PipelineController,
    capture: Arc<FileCapture>,
    counters: Arc<Counters>,
    subscriptions: Vec<SubscriptionId>,
    /// Handle to reporter thread
    reporter: Option<JoinHandle<()>>,
}

impl ScannerApp {
    /// Create a scanner over `images` using `config`
    pub fn new(config: &AppConfig, images: Vec<PathBuf>, report: ReportOptions) -> Result<Self> {
        let capture = Arc::new(FileCapture::new(
            images,
            config.capture.rotation()?,
            config.capture.frame_interval(),
        ));
        let recognizer = Arc::new(CommandRecognizer::from_settings(&config.recognition));
        info!("Using OCR command: {}", recognizer.program());

        let controller = PipelineController::new(
            PipelineConfig::from_app_config(config),
            capture.clone(),
            recognizer,
        );
        let store = controller.store();
        let counters = Arc::new(Counters::default());

        let progress = store.subscribe({
            let counters = counters.clone();
            move |state| {
                if state.phase.is_busy() {
                    debug!("{}", state.phase.status_text());
                }
                match state.phase {
                    Phase::Ready => {
                        counters.ready.fetch_add(1, Ordering::Relaxed);
                    }
                    Phase::Failed => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
        });

        let (results, rx) = store.subscribe_channel();
        let reporter = std::thread::spawn(move || {
            for state in rx {
                if matches!(state.phase, Phase::Ready | Phase::Failed) {
                    println!("{}", render(&state, report));
                }
            }
            debug!("Reporter thread exiting");
        });

        Ok(Self {
            controller,
            capture,
            counters,
            subscriptions: vec![progress, results],
            reporter: Some(reporter),
        })
    }

    /// Scan every image, stopping early if `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ScanSummary> {
        match self.controller.mode() {
            CaptureMode::OnDemand => {
                while self.capture.remaining() > 0 {
                    let outcome = tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.controller.reset();
                            break;
                        }
                        outcome = self.controller.request_capture() => outcome?,
                    };
                    match outcome {
                        CycleOutcome::Ready(state) => {
                            debug!("Scan ready with {} code(s)", state.extracted_codes.len())
                        }
                        CycleOutcome::Failed(state) => debug!(
                            "Scan failed: {}",
                            state.error_message.as_deref().unwrap_or("unknown error")
                        ),
                        CycleOutcome::Ignored => debug!("Trigger ignored"),
                        CycleOutcome::Cancelled => debug!("Scan cancelled"),
                    }
                }
            }
            CaptureMode::Continuous => {
                let stats = self.controller.run_continuous(shutdown).await?;
                info!(
                    "Frames received: {}, dropped: {}, capture errors: {}",
                    stats.frames_received, stats.frames_dropped, stats.capture_errors
                );
            }
        }

        Ok(ScanSummary {
            ready: self.counters.ready.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        })
    }
}

impl Drop for ScannerApp {
    fn drop(&mut self) {
        // Dropping the subscriptions closes the reporter's channel
        let store = self.controller.store();
        for id in self.subscriptions.drain(..) {
            store.unsubscribe(id);
        }

        if let Some(handle) = self.reporter.take() {
            let _ = handle.join();
        }
    }
}

/// Format a finished snapshot for output
fn render(state: &PipelineState, report: ReportOptions) -> String {
    if report.json {
        return serde_json::to_string(state).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
    }

    match state.phase {
        Phase::Failed => format!(
            "{}: {}",
            state.phase.status_text(),
            state.error_message.as_deref().unwrap_or("unknown error")
        ),
        _ => {
            let codes = if report.unique {
                dedup_codes(&state.extracted_codes)
            } else {
                state.extracted_codes.clone()
            };
            if codes.is_empty() {
                "No additive codes found".to_string()
            } else if report.details {
                codes.iter().map(describe).collect::<Vec<_>>().join("\n")
            } else {
                codes
                    .iter()
                    .map(|code| code.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
    }
}

/// One detail line for a code, e.g. `E150d  number 150, suffix d`
fn describe(code: &AdditiveCode) -> String {
    match code.suffix() {
        Some(suffix) => format!("{}  number {}, suffix {}", code, code.number(), suffix),
        None => format!("{}  number {}", code, code.number()),
    }
}
