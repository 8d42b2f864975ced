//! Image Capture Layer
//!
//! The camera (or any other image source) is an external collaborator; the
//! pipeline only sees it through [`CapturePort`]. A port serves two flows:
//! a single still image on request, or a continuous stream of frames.

pub mod channel;
pub mod file;
pub mod frame;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use channel::{frame_channel, ChannelCapture, FrameSender};
pub use file::FileCapture;
pub use frame::{Frame, Rotation};

/// Stream of frames produced in continuous mode
pub type FrameStream = BoxStream<'static, Result<Frame, CaptureError>>;

/// Capture flow selected when the pipeline is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// One frame per explicit capture request
    #[default]
    OnDemand,
    /// Frames arrive continuously and drive the pipeline
    Continuous,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::OnDemand => f.write_str("on-demand"),
            CaptureMode::Continuous => f.write_str("continuous"),
        }
    }
}

/// Image acquisition failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The capture device could not be used
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The source has no more frames to give
    #[error("no more frames")]
    NoMoreFrames,
    /// The capture did not complete in time
    #[error("timeout")]
    Timeout,
    /// Any other acquisition failure
    #[error("{0}")]
    Failed(String),
}

/// Interface to an external image source
#[async_trait]
pub trait CapturePort: Send + Sync {
    /// Acquire exactly one frame
    async fn request_capture(&self) -> Result<Frame, CaptureError>;

    /// Start a fresh stream of frames.
    ///
    /// Implementations drop stale frames instead of buffering them, so a slow
    /// consumer only ever sees the newest one. Calling this again restarts
    /// the stream.
    fn subscribe_frames(&self) -> FrameStream;
}
