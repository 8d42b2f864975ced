//! Push-based capture adapter
//!
//! Camera drivers usually deliver frames from their own thread through a
//! callback. [`FrameSender`] is the handle such a driver pushes into; the
//! paired [`ChannelCapture`] exposes those frames as a [`CapturePort`].
//! Only the newest frame is held, older unconsumed frames are overwritten.

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::watch;

use super::{CaptureError, CapturePort, Frame, FrameStream};

type Slot = Option<Result<Frame, CaptureError>>;

/// Create a connected sender / capture port pair
pub fn frame_channel() -> (FrameSender, ChannelCapture) {
    let (tx, rx) = watch::channel(None);
    (FrameSender { tx }, ChannelCapture { rx })
}

/// Producer half, held by the image source
#[derive(Debug)]
pub struct FrameSender {
    tx: watch::Sender<Slot>,
}

impl FrameSender {
    /// Offer a new frame, replacing any frame not yet consumed
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Ok(frame)));
    }

    /// Report an acquisition failure to the consumer
    pub fn fail(&self, error: CaptureError) {
        self.tx.send_replace(Some(Err(error)));
    }

    /// Whether every consumer handle and stream has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolve once every consumer handle and stream has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Consumer half, usable as a [`CapturePort`]
#[derive(Debug, Clone)]
pub struct ChannelCapture {
    rx: watch::Receiver<Slot>,
}

impl ChannelCapture {
    /// Receiver that only reports frames published from now on
    fn fresh_receiver(&self) -> watch::Receiver<Slot> {
        let mut rx = self.rx.clone();
        rx.mark_unchanged();
        rx
    }
}

/// Wait for the next published slot; `None` once the sender is gone.
async fn next_slot(rx: &mut watch::Receiver<Slot>) -> Option<Result<Frame, CaptureError>> {
    loop {
        rx.changed().await.ok()?;
        let slot = rx.borrow_and_update().clone();
        if slot.is_some() {
            return slot;
        }
    }
}

#[async_trait]
impl CapturePort for ChannelCapture {
    async fn request_capture(&self) -> Result<Frame, CaptureError> {
        let mut rx = self.fresh_receiver();
        next_slot(&mut rx)
            .await
            .unwrap_or_else(|| Err(CaptureError::DeviceUnavailable("frame source closed".into())))
    }

    fn subscribe_frames(&self) -> FrameStream {
        let rx = self.fresh_receiver();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            let item = next_slot(&mut rx).await?;
            Some((item, rx))
        }))
    }
}
