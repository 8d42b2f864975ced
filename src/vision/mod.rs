//! Vision/OCR Layer
//!
//! Text recognition is delegated to an external OCR engine behind
//! [`RecognitionPort`]. The engine receives one frame per call and returns
//! the recognized text; an empty string is a valid result.

pub mod command_ocr;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::Frame;

pub use command_ocr::CommandRecognizer;

/// Text recognition failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The OCR engine could not be reached or started
    #[error("recognition engine unavailable: {0}")]
    EngineUnavailable(String),
    /// The frame could not be handed to the engine
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The engine did not answer in time
    #[error("timeout")]
    Timeout,
    /// The engine reported an error
    #[error("{0}")]
    Failed(String),
}

/// Interface to an external OCR engine
#[async_trait]
pub trait RecognitionPort: Send + Sync {
    /// Recognize all text in `frame`
    async fn recognize(&self, frame: Frame) -> Result<String, RecognitionError>;
}
