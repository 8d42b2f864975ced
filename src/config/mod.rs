//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureMode, Rotation};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture settings
    pub capture: CaptureSettings,
    /// Text recognition settings
    pub recognition: RecognitionSettings,
    /// Pipeline settings
    pub pipeline: PipelineSettings,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// On-demand or continuous capture
    pub mode: CaptureMode,
    /// Pause between replayed frames in continuous mode
    pub frame_interval_ms: u64,
    /// Rotation applied to captured images (0, 90, 180 or 270)
    pub rotation: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mode: CaptureMode::OnDemand,
            frame_interval_ms: 500,
            rotation: 0,
        }
    }
}

impl CaptureSettings {
    /// Validated rotation
    pub fn rotation(&self) -> Result<Rotation> {
        Rotation::from_degrees(self.rotation)
            .ok_or_else(|| anyhow!("rotation must be 0, 90, 180 or 270, got {}", self.rotation))
    }

    /// Frame replay interval
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// OCR command to run
    pub program: String,
    /// Arguments; the tool must read an image from stdin and print text to stdout
    pub args: Vec<String>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            args: ["stdin", "stdout", "-l", "eng"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Capture-to-extraction pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Give up on a capture or recognition call after this many milliseconds
    #[serde(
        rename = "opTimeoutMs",
        alias = "op_timeout_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub op_timeout_ms: Option<u64>,
}

impl PipelineSettings {
    /// Per-operation timeout, if any
    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout_ms.map(Duration::from_millis)
    }
}

/// Default configuration file location
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "ebrojevi", "Ebrojevi")
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.capture.mode, CaptureMode::OnDemand);
        assert_eq!(config.capture.frame_interval_ms, 500);
        assert_eq!(config.capture.rotation().unwrap(), Rotation::Deg0);

        assert_eq!(config.recognition.program, "tesseract");
        assert_eq!(config.recognition.args, vec!["stdin", "stdout", "-l", "eng"]);

        assert!(config.pipeline.op_timeout().is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.mode = CaptureMode::Continuous;
        config.pipeline.op_timeout_ms = Some(2500);

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("opTimeoutMs = 2500"));
        assert!(toml_str.contains("mode = \"continuous\""));

        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.capture.mode, CaptureMode::Continuous);
        assert_eq!(parsed.pipeline.op_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[pipeline]\nopTimeoutMs = 800\n").unwrap();
        assert_eq!(parsed.pipeline.op_timeout_ms, Some(800));
        assert_eq!(parsed.capture.frame_interval_ms, 500);
        assert_eq!(parsed.recognition.program, "tesseract");
    }

    #[test]
    fn test_invalid_rotation() {
        let parsed: AppConfig = toml::from_str("[capture]\nrotation = 45\n").unwrap();
        assert!(parsed.capture.rotation().is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.recognition.program = "my-ocr".to_string();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.recognition.program, "my-ocr");
        assert_eq!(loaded.capture.frame_interval_ms, config.capture.frame_interval_ms);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
