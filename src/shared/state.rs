//! Pipeline state snapshot exposed to consumers

use serde::Serialize;
use std::fmt;

use crate::analysis::{extract_codes, AdditiveCode};
use crate::capture::Frame;

/// Stage of the capture-to-extraction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing in flight
    #[default]
    Idle,
    /// Waiting for the capture port
    Capturing,
    /// Waiting for the recognition port
    Recognizing,
    /// Pulling additive codes out of the text
    Extracting,
    /// Cycle finished with fresh results
    Ready,
    /// Cycle ended with an error
    Failed,
}

impl Phase {
    /// Short progress text for display
    pub fn status_text(&self) -> &'static str {
        match self {
            Phase::Idle => "Point the camera at a label",
            Phase::Capturing => "Capturing image...",
            Phase::Recognizing => "Processing image...",
            Phase::Extracting => "Extracting text...",
            Phase::Ready => "Scan complete",
            Phase::Failed => "Scan failed",
        }
    }

    /// Whether a cycle is outstanding in this phase
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Capturing | Phase::Recognizing | Phase::Extracting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Recognizing => "recognizing",
            Phase::Extracting => "extracting",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which port a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Capture,
    Recognition,
}

/// Immutable snapshot of the pipeline.
///
/// Snapshots are never edited once published; every transition builds a new
/// one from the previous via the `with_*` / `failed` constructors, which keep
/// `extracted_codes` derived from `recognized_text` and the error fields in
/// step with `phase`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PipelineState {
    /// Current stage
    pub phase: Phase,
    /// Text from the last successful recognition
    pub recognized_text: String,
    /// Additive codes found in `recognized_text`, in order of appearance
    pub extracted_codes: Vec<AdditiveCode>,
    /// Frame of the current or last cycle, for display
    #[serde(skip)]
    pub last_frame: Option<Frame>,
    /// Classified failure source, set only when `phase` is `Failed`
    pub error_kind: Option<FailureKind>,
    /// Human-readable failure, set only when `phase` is `Failed`
    pub error_message: Option<String>,
}

impl PipelineState {
    /// Fresh state at pipeline start or after a reset
    pub fn idle() -> Self {
        Self::default()
    }

    /// Same results, new in-progress phase, error cleared
    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            phase,
            error_kind: None,
            error_message: None,
            ..self.clone()
        }
    }

    /// Same results, new in-progress phase and display frame
    pub fn with_frame(&self, phase: Phase, frame: Frame) -> Self {
        Self {
            last_frame: Some(frame),
            ..self.with_phase(phase)
        }
    }

    /// Ready state holding `text` and the codes extracted from it
    pub fn with_text(&self, text: String) -> Self {
        let extracted_codes = extract_codes(&text);
        Self {
            phase: Phase::Ready,
            recognized_text: text,
            extracted_codes,
            last_frame: self.last_frame.clone(),
            error_kind: None,
            error_message: None,
        }
    }

    /// Failed state; last-known-good text and codes are kept
    pub fn failed(&self, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Failed,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            ..self.clone()
        }
    }

    /// Codes as plain strings
    pub fn code_strings(&self) -> Vec<&str> {
        self.extracted_codes.iter().map(AdditiveCode::as_str).collect()
    }
}
