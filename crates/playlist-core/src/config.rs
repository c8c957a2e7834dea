//! Configuration parsing for annotation tools and export
//!
//! Loaded from TOML; every section and field has a default so an empty file
//! (or no file at all) is a valid configuration.

use crate::annotation::Color;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Tool defaults for the capture engine
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Output naming for exports
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let capture = &self.capture;
        if !(capture.stroke_width > 0.0) {
            anyhow::bail!("capture.stroke_width must be positive");
        }
        if !(capture.font_size > 0.0) {
            anyhow::bail!("capture.font_size must be positive");
        }
        if !(capture.eraser_tolerance >= 0.0) {
            anyhow::bail!("capture.eraser_tolerance must not be negative");
        }
        if self.export.output_name.trim().is_empty() {
            anyhow::bail!("export.output_name must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub stroke_color: Color,
    pub stroke_width: f64,
    pub highlight_color: Color,
    pub text_color: Color,
    pub font_size: f64,
    /// Extra screen pixels around an annotation's bounds that still count as
    /// an eraser hit.
    pub eraser_tolerance: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stroke_color: Color::RED,
            stroke_width: 2.0,
            highlight_color: Color::YELLOW,
            text_color: Color::BLACK,
            font_size: 16.0,
            eraser_tolerance: 6.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub output_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_name: "playlist.pdf".to_string(),
        }
    }
}
