//! Structured error handling for voxhost
//!
//! One error type covers the model lifecycle, the synthesis pipeline and the
//! batch post-processing executor. Lifecycle failures never leave partial
//! state behind; batch failures are isolated per item by the callers.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias with TtsError
pub type Result<T> = std::result::Result<T, TtsError>;

/// Main error type for voxhost
#[derive(Error, Debug, Clone)]
pub enum TtsError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Checkpoint missing or unreadable
    #[error("Model loading error for '{key}': {message}")]
    ModelLoad {
        key: String,
        message: String,
        path: Option<PathBuf>,
    },

    /// Checkpoint readable but structurally incompatible with the model
    #[error("Checkpoint mismatch for '{key}': {message}")]
    CheckpointMismatch {
        key: String,
        message: String,
        path: Option<PathBuf>,
    },

    /// Use of a model key that was never loaded
    #[error("Model '{key}' is not loaded")]
    ModelNotLoaded { key: String },

    /// Caller-supplied per-symbol data does not match the symbol count
    #[error("Shape mismatch for {field}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// One entry failed to move to a new device
    #[error("Device migration of '{key}' to {device} failed: {message}")]
    DeviceMigration {
        key: String,
        device: String,
        message: String,
    },

    /// A numeric pipeline step failed during inference
    #[error("Render failure in {stage}: {message}")]
    Render {
        stage: InferenceStage,
        message: String,
        /// Diagnostic of the edited attempt when the fallback also failed
        first_attempt: Option<String>,
    },

    /// External audio tool failure
    #[error("External tool failure: {message}")]
    ExternalTool { message: String },

    /// Audio processing errors
    #[error("Audio processing error ({operation}): {message}")]
    Audio {
        message: String,
        operation: AudioOperation,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: Option<String>,
    },
}

impl TtsError {
    /// Build a render failure for a stage
    pub fn render(stage: InferenceStage, message: impl Into<String>) -> Self {
        TtsError::Render {
            stage,
            message: message.into(),
            first_attempt: None,
        }
    }

    /// Whether the edits fallback may retry after this error.
    ///
    /// Shape mismatches and validation errors are caller bugs and fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TtsError::Render { .. })
    }

    /// Attach a pipeline stage to a tensor-level error
    pub fn at_stage(self, stage: InferenceStage) -> Self {
        match self {
            TtsError::Internal { message, .. } => TtsError::render(stage, message),
            other => other,
        }
    }
}

/// Synthesis pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    Encoding,
    DurationPrediction,
    PitchResolution,
    LengthRegulation,
    Decoding,
    Vocoding,
}

impl fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceStage::Encoding => write!(f, "symbol encoding"),
            InferenceStage::DurationPrediction => write!(f, "duration prediction"),
            InferenceStage::PitchResolution => write!(f, "pitch resolution"),
            InferenceStage::LengthRegulation => write!(f, "length regulation"),
            InferenceStage::Decoding => write!(f, "frame decoding"),
            InferenceStage::Vocoding => write!(f, "vocoding"),
        }
    }
}

/// Audio operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOperation {
    Denoising,
    Saving,
}

impl fmt::Display for AudioOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioOperation::Denoising => write!(f, "denoising"),
            AudioOperation::Saving => write!(f, "saving"),
        }
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add a simple message context
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TtsError::Internal {
            message: format!("{}: {}", f(), e),
            location: None,
        })
    }

    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| TtsError::Internal {
            message: format!("{}: {}", msg.into(), e),
            location: None,
        })
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for TtsError {
    fn from(err: anyhow::Error) -> Self {
        TtsError::Internal {
            message: err.to_string(),
            location: None,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Convert from candle_core::Error
impl From<candle_core::Error> for TtsError {
    fn from(err: candle_core::Error) -> Self {
        TtsError::Internal {
            message: format!("Tensor operation failed: {}", err),
            location: None,
        }
    }
}
