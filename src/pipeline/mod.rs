//! Capture-to-Extraction Pipeline
//!
//! [`PipelineController`] drives one cycle at a time:
//!
//! ```text
//! Idle -> Capturing -> Recognizing -> Extracting -> Ready
//!            |              |
//!            +--------------+--> Failed
//! ```
//!
//! Every cycle is tagged with a generation number. `reset()` bumps the
//! generation and cancels the cycle's token, so a port result that belongs
//! to an older generation is never published. A cycle whose driving future
//! is dropped before it finishes ends in `Failed`, so the next trigger runs.
//! The controller is the only
//! writer of the [`StateStore`]; publishing happens under its core lock,
//! which keeps snapshots in causal order.

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureError, CaptureMode, CapturePort, Frame};
use crate::config::AppConfig;
use crate::shared::{FailureKind, Phase, PipelineState, StatePublisher, StateStore};
use crate::vision::{RecognitionError, RecognitionPort};

/// Controller settings fixed at construction
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Capture flow the controller is driven by
    pub mode: CaptureMode,
    /// Abandon a port call that takes longer than this
    pub op_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Pipeline settings from the application configuration
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            mode: config.capture.mode,
            op_timeout: config.pipeline.op_timeout(),
        }
    }
}

/// How a trigger or frame was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle finished and published fresh results
    Ready(Arc<PipelineState>),
    /// The cycle ended in `Failed`
    Failed(Arc<PipelineState>),
    /// Another cycle was in flight; nothing was started
    Ignored,
    /// A reset superseded the cycle; its results were dropped
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("operation requires {expected} mode, but the pipeline runs in {actual} mode")]
    ModeMismatch {
        expected: CaptureMode,
        actual: CaptureMode,
    },
}

/// Frame counters from a continuous scanning session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames taken from the stream
    pub frames_received: u64,
    /// Frames discarded because a cycle was in flight
    pub frames_dropped: u64,
    /// Capture errors reported by the stream
    pub capture_errors: u64,
}

/// Mutable controller state, only touched under the core lock
struct Core {
    generation: u64,
    in_flight: bool,
    cycle_token: Option<CancellationToken>,
    publisher: StatePublisher,
}

/// Error message published for a cycle whose future was dropped
const ABANDONED: &str = "scan abandoned";

/// Identity of one running cycle. Dropping it before the cycle finished
/// releases the controller.
struct Cycle {
    generation: u64,
    token: CancellationToken,
    inner: Arc<Inner>,
}

impl Drop for Cycle {
    fn drop(&mut self) {
        let mut core = self.inner.core.lock();
        if core.generation != self.generation || !core.in_flight {
            return;
        }

        core.in_flight = false;
        if let Some(token) = core.cycle_token.take() {
            token.cancel();
        }
        let current = core.publisher.current();
        let kind = match current.phase {
            Phase::Capturing => FailureKind::Capture,
            _ => FailureKind::Recognition,
        };
        core.publisher.publish(current.failed(kind, ABANDONED));
        warn!("Cycle {} abandoned in {}", self.generation, current.phase);
    }
}

struct Inner {
    config: PipelineConfig,
    capture: Arc<dyn CapturePort>,
    recognizer: Arc<dyn RecognitionPort>,
    store: StateStore,
    core: Mutex<Core>,
}

/// The capture-to-extraction state machine; cheap to clone
#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

impl PipelineController {
    /// Create a controller in `Idle`
    pub fn new(
        config: PipelineConfig,
        capture: Arc<dyn CapturePort>,
        recognizer: Arc<dyn RecognitionPort>,
    ) -> Self {
        let (publisher, store) = StateStore::with_publisher(PipelineState::idle());
        info!(
            "Pipeline created ({} mode, timeout {:?})",
            config.mode, config.op_timeout
        );
        Self {
            inner: Arc::new(Inner {
                config,
                capture,
                recognizer,
                store,
                core: Mutex::new(Core {
                    generation: 0,
                    in_flight: false,
                    cycle_token: None,
                    publisher,
                }),
            }),
        }
    }

    /// Read/subscribe handle for consumers
    pub fn store(&self) -> StateStore {
        self.inner.store.clone()
    }

    /// Latest snapshot
    pub fn state(&self) -> Arc<PipelineState> {
        self.inner.store.current()
    }

    /// Capture mode chosen at construction
    pub fn mode(&self) -> CaptureMode {
        self.inner.config.mode
    }

    /// Current generation number
    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.inner.core.lock().generation
    }

    /// Run one on-demand cycle: capture, recognize, extract.
    ///
    /// A trigger that arrives while a cycle is in flight is ignored.
    pub async fn request_capture(&self) -> Result<CycleOutcome, PipelineError> {
        self.require_mode(CaptureMode::OnDemand)?;

        let Some(cycle) = self.begin_cycle(Phase::Capturing, None) else {
            info!("Capture already in progress, trigger ignored");
            return Ok(CycleOutcome::Ignored);
        };

        let capture = self.inner.capture.request_capture();
        let frame = match self.guarded(&cycle, capture, CaptureError::Timeout).await {
            None => return Ok(self.cancelled(&cycle)),
            Some(Err(e)) => return Ok(self.fail(&cycle, FailureKind::Capture, e.to_string())),
            Some(Ok(frame)) => frame,
        };

        let display = frame.clone();
        if self
            .advance(&cycle, false, |state| state.with_frame(Phase::Recognizing, display))
            .is_none()
        {
            return Ok(self.cancelled(&cycle));
        }

        Ok(self.recognize_and_extract(&cycle, frame).await)
    }

    /// Drive cycles from the capture port's frame stream until it ends or
    /// `shutdown` fires.
    ///
    /// Frames arriving while a cycle is in flight are dropped.
    pub async fn run_continuous(
        &self,
        shutdown: CancellationToken,
    ) -> Result<ScanStats, PipelineError> {
        self.require_mode(CaptureMode::Continuous)?;

        let mut frames = self.inner.capture.subscribe_frames();
        let mut cycles = JoinSet::new();
        let mut stats = ScanStats::default();
        info!("Continuous scanning started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Continuous scanning stopped");
                    self.reset();
                    break;
                }
                next = frames.next() => next,
            };

            match next {
                None => {
                    info!("Frame stream ended");
                    break;
                }
                Some(Ok(frame)) => {
                    stats.frames_received += 1;
                    match self.begin_cycle(Phase::Recognizing, Some(frame.clone())) {
                        Some(cycle) => {
                            let controller = self.clone();
                            cycles.spawn(async move {
                                controller.recognize_and_extract(&cycle, frame).await
                            });
                        }
                        None => {
                            stats.frames_dropped += 1;
                            debug!("Cycle in flight, frame dropped");
                        }
                    }
                }
                Some(Err(e)) => {
                    stats.capture_errors += 1;
                    match self.begin_cycle(Phase::Capturing, None) {
                        Some(cycle) => {
                            self.fail(&cycle, FailureKind::Capture, e.to_string());
                        }
                        None => debug!("Cycle in flight, capture error ignored: {}", e),
                    }
                }
            }

            while let Some(joined) = cycles.try_join_next() {
                log_joined(joined);
            }
        }

        while let Some(joined) = cycles.join_next().await {
            log_joined(joined);
        }

        Ok(stats)
    }

    /// Abandon any cycle in flight and return to a cleared `Idle`
    pub fn reset(&self) {
        let mut core = self.inner.core.lock();
        core.generation += 1;
        core.in_flight = false;
        if let Some(token) = core.cycle_token.take() {
            token.cancel();
        }
        core.publisher.publish(PipelineState::idle());
        info!("Pipeline reset (generation {})", core.generation);
    }

    fn require_mode(&self, expected: CaptureMode) -> Result<(), PipelineError> {
        let actual = self.inner.config.mode;
        if actual == expected {
            Ok(())
        } else {
            Err(PipelineError::ModeMismatch { expected, actual })
        }
    }

    /// Start a new generation unless one is in flight
    fn begin_cycle(&self, phase: Phase, frame: Option<Frame>) -> Option<Cycle> {
        let mut core = self.inner.core.lock();
        if core.in_flight {
            return None;
        }

        core.generation += 1;
        core.in_flight = true;
        let token = CancellationToken::new();
        core.cycle_token = Some(token.clone());

        let current = core.publisher.current();
        let next = match frame {
            Some(frame) => current.with_frame(phase, frame),
            None => current.with_phase(phase),
        };
        core.publisher.publish(next);
        debug!("Cycle {} started in {}", core.generation, phase);

        Some(Cycle {
            generation: core.generation,
            token,
            inner: self.inner.clone(),
        })
    }

    /// Publish the next snapshot for `cycle`, unless it has been superseded.
    /// `finish` ends the cycle.
    fn advance<F>(&self, cycle: &Cycle, finish: bool, next: F) -> Option<Arc<PipelineState>>
    where
        F: FnOnce(&PipelineState) -> PipelineState,
    {
        let mut core = self.inner.core.lock();
        if core.generation != cycle.generation {
            debug!(
                "Discarding result of cycle {} (current generation {})",
                cycle.generation, core.generation
            );
            return None;
        }

        let state = next(&core.publisher.current());
        let snapshot = core.publisher.publish(state);
        if finish {
            core.in_flight = false;
            core.cycle_token = None;
        }
        Some(snapshot)
    }

    /// Await a port call, bounded by the configured timeout and the cycle's
    /// cancellation. `None` means the cycle was cancelled.
    async fn guarded<T, E>(
        &self,
        cycle: &Cycle,
        operation: impl Future<Output = Result<T, E>>,
        timeout_error: E,
    ) -> Option<Result<T, E>> {
        let bounded = async move {
            match self.inner.config.op_timeout {
                Some(limit) => tokio::time::timeout(limit, operation)
                    .await
                    .unwrap_or(Err(timeout_error)),
                None => operation.await,
            }
        };

        tokio::select! {
            biased;
            _ = cycle.token.cancelled() => None,
            result = bounded => Some(result),
        }
    }

    async fn recognize_and_extract(&self, cycle: &Cycle, frame: Frame) -> CycleOutcome {
        let recognition = self.inner.recognizer.recognize(frame);
        let text = match self.guarded(cycle, recognition, RecognitionError::Timeout).await {
            None => return self.cancelled(cycle),
            Some(Err(e)) => return self.fail(cycle, FailureKind::Recognition, e.to_string()),
            Some(Ok(text)) => text,
        };

        // Extraction is synchronous, so both snapshots go out under one lock.
        let mut core = self.inner.core.lock();
        if core.generation != cycle.generation {
            drop(core);
            return self.cancelled(cycle);
        }
        let extracting = core.publisher.current().with_phase(Phase::Extracting);
        core.publisher.publish(extracting);

        let ready = core.publisher.current().with_text(text);
        let snapshot = core.publisher.publish(ready);
        core.in_flight = false;
        core.cycle_token = None;
        drop(core);

        info!(
            "Cycle {} ready: {} code(s) {:?}",
            cycle.generation,
            snapshot.extracted_codes.len(),
            snapshot.code_strings()
        );
        CycleOutcome::Ready(snapshot)
    }

    fn fail(&self, cycle: &Cycle, kind: FailureKind, message: String) -> CycleOutcome {
        let reason = message.clone();
        match self.advance(cycle, true, |state| state.failed(kind, message)) {
            Some(snapshot) => {
                warn!("Cycle {} failed ({:?}): {}", cycle.generation, kind, reason);
                CycleOutcome::Failed(snapshot)
            }
            None => self.cancelled(cycle),
        }
    }

    fn cancelled(&self, cycle: &Cycle) -> CycleOutcome {
        debug!("Cycle {} cancelled", cycle.generation);
        CycleOutcome::Cancelled
    }
}

fn log_joined(joined: Result<CycleOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => debug!("Cycle finished: {}", outcome_name(&outcome)),
        Err(e) => warn!("Cycle task failed: {}", e),
    }
}

fn outcome_name(outcome: &CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Ready(_) => "ready",
        CycleOutcome::Failed(_) => "failed",
        CycleOutcome::Ignored => "ignored",
        CycleOutcome::Cancelled => "cancelled",
    }
}
