//! Error types
//!
//! Expected conditions (no finger, low quality, warmup) are never errors; they
//! show up as ordinary values in `ProcessedSignal`. Only frame-level faults and
//! invalid configuration surface here.

use serde::Serialize;
use thiserror::Error;

/// Configuration could not be loaded or failed validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Validation(msg.into())
    }
}

/// Category of a per-frame processing fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Frame has zero width or height
    EmptyFrame,
    /// Pixel buffer length does not match `width * height * channels`
    BufferSizeMismatch,
    /// `process_frame` called while the pipeline is stopped
    NotRunning,
    /// Policy requires a successful calibration before normal processing
    CalibrationRequired,
}

/// A single frame was skipped.
///
/// Reported on its own channel, separate from the signal output. Pipeline
/// state is untouched and the next frame is processed normally.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code:?} at {timestamp_ms} ms: {message}")]
pub struct ProcessingError {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp_ms: i64,
}

impl ProcessingError {
    pub fn new(code: ErrorCode, message: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_display() {
        let err = ProcessingError::new(ErrorCode::EmptyFrame, "width is zero", 42);
        let text = err.to_string();
        assert!(text.contains("EmptyFrame"));
        assert!(text.contains("42 ms"));
        assert!(text.contains("width is zero"));
    }

    #[test]
    fn test_config_error_from_toml() {
        let parsed: Result<toml::Value, _> = toml::from_str("not = [valid");
        let err: ConfigError = parsed.unwrap_err().into();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }
}
