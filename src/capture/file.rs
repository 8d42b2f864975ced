//! Image-file capture source
//!
//! Stands in for a camera when scanning labels that were photographed
//! beforehand: each file becomes one frame.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::frame_channel;
use super::{CaptureError, CapturePort, Frame, FrameStream, Rotation};

/// Capture port backed by a list of image files
pub struct FileCapture {
    /// All files, replayed in continuous mode
    paths: Vec<PathBuf>,
    /// Files not yet handed out in on-demand mode
    pending: Mutex<VecDeque<PathBuf>>,
    /// Rotation reported with every frame
    rotation: Rotation,
    /// Pause between frames when replaying
    frame_interval: Duration,
}

impl FileCapture {
    /// Create a file source
    pub fn new(paths: Vec<PathBuf>, rotation: Rotation, frame_interval: Duration) -> Self {
        Self {
            pending: Mutex::new(paths.iter().cloned().collect()),
            paths,
            rotation,
            frame_interval,
        }
    }

    /// Number of files not yet captured on demand
    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }

    /// Start a replay task feeding a fresh stream. The task stops early once
    /// the stream is dropped.
    fn replay(&self) -> (FrameStream, JoinHandle<()>) {
        let (sender, source) = frame_channel();
        let frames = source.subscribe_frames();

        let paths = self.paths.clone();
        let rotation = self.rotation;
        let interval = self.frame_interval;
        let task = tokio::spawn(async move {
            for path in paths {
                if sender.is_closed() {
                    debug!("Replay stream dropped");
                    return;
                }
                match load_frame_blocking(path.clone(), rotation).await {
                    Ok(frame) => sender.publish(frame),
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        sender.fail(e);
                    }
                }
                tokio::select! {
                    _ = sender.closed() => {
                        debug!("Replay stream dropped");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("File replay finished");
        });

        (frames, task)
    }
}

/// Decode an image file into a frame
pub fn load_frame(path: &Path, rotation: Rotation) -> Result<Frame, CaptureError> {
    let image = image::open(path)
        .map_err(|e| CaptureError::Failed(format!("{}: {}", path.display(), e)))?
        .to_rgba8();
    let frame = Frame::from_image(image, rotation);
    let (width, height) = frame.dimensions();
    debug!("Loaded {} ({}x{}, {})", path.display(), width, height, rotation);
    Ok(frame)
}

async fn load_frame_blocking(path: PathBuf, rotation: Rotation) -> Result<Frame, CaptureError> {
    tokio::task::spawn_blocking(move || load_frame(&path, rotation))
        .await
        .map_err(|e| CaptureError::Failed(format!("image decoder task failed: {}", e)))?
}

#[async_trait]
impl CapturePort for FileCapture {
    async fn request_capture(&self) -> Result<Frame, CaptureError> {
        let next = self.pending.lock().pop_front();
        let path = next.ok_or(CaptureError::NoMoreFrames)?;
        info!("Capturing {}", path.display());
        load_frame_blocking(path, self.rotation).await
    }

    /// Replays every file at the configured pace. Must be called from within
    /// a Tokio runtime. Frames the consumer is too busy to take are skipped;
    /// the stream ends after the last file.
    fn subscribe_frames(&self) -> FrameStream {
        self.replay().0
    }
}
