//! External OCR command backend
//!
//! Runs an OCR command-line tool (tesseract by default) once per frame. The
//! upright frame is PNG-encoded and written to the tool's stdin; whatever it
//! prints on stdout is the recognized text.

use async_trait::async_trait;
use image::ImageFormat;
use std::io::{Cursor, ErrorKind};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{RecognitionError, RecognitionPort};
use crate::capture::Frame;
use crate::config::RecognitionSettings;

/// OCR engine driven through an external command
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Create a recognizer running `program args...`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create a recognizer from configuration
    pub fn from_settings(settings: &RecognitionSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }

    /// Command being run
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Rotate a frame upright and encode it as PNG
fn encode_png(frame: &Frame) -> Result<Vec<u8>, RecognitionError> {
    let image = frame.upright().ok_or_else(|| {
        RecognitionError::MalformedFrame(format!(
            "{}x{} frame with {} bytes",
            frame.width,
            frame.height,
            frame.data.len()
        ))
    })?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| RecognitionError::MalformedFrame(e.to_string()))?;
    Ok(png)
}

#[async_trait]
impl RecognitionPort for CommandRecognizer {
    async fn recognize(&self, frame: Frame) -> Result<String, RecognitionError> {
        let png = tokio::task::spawn_blocking(move || encode_png(&frame))
            .await
            .map_err(|e| RecognitionError::Failed(format!("encoder task failed: {}", e)))??;

        debug!("Running {} on {} byte image", self.program, png.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => RecognitionError::EngineUnavailable(format!(
                    "{} not found",
                    self.program
                )),
                _ => RecognitionError::EngineUnavailable(format!("{}: {}", self.program, e)),
            })?;

        // Stdin is fed while stdout and stderr are drained
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The tool may exit before reading all input; its exit status decides.
                if let Err(e) = stdin.write_all(&png).await {
                    debug!("OCR stdin closed early: {}", e);
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| RecognitionError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("{} exited with {}: {}", self.program, output.status, stderr);
            return Err(RecognitionError::Failed(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
