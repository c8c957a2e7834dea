use crate::error::PlaylistError;
use base64::Engine;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded PDF data
    pub data: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

impl ProcessResult {
    pub fn ok(output: &[u8], metrics: ProcessMetrics) -> Self {
        Self {
            success: true,
            data: Some(base64::engine::general_purpose::STANDARD.encode(output)),
            error: None,
            metrics: Some(metrics),
        }
    }

    /// A result that reports metrics but leaves the bytes out.
    pub fn ok_without_data(metrics: ProcessMetrics) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            metrics: Some(metrics),
        }
    }

    pub fn failure(error: &PlaylistError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            metrics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: usize,
    pub annotation_count: usize,
    pub processing_time_ms: u64,
}
