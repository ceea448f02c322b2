pub mod audio;
pub mod integration;
pub mod production;
pub mod script;
pub mod speech;
pub mod text;
pub mod utils;

pub use audio::OutputFormat;
pub use integration::{produce, ProductionConfig, Producer, StudioConfig};
pub use production::{ProductionArtifact, SegmentReport, SegmentStatus};
pub use script::{parse_script, ScriptLine, SpeakerVoiceMap};
pub use speech::{BackendError, ErrorKind, HttpBackend, TtsBackend};

use thiserror::Error;

/// Input problems detected before any backend call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No voice assigned for speaker(s): {}", .0.join(", "))]
    MissingVoices(Vec<String>),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug, Clone)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Production cancelled")]
    Cancelled,
}

impl From<std::io::Error> for StudioError {
    fn from(e: std::io::Error) -> Self {
        StudioError::IOError(e.to_string())
    }
}

impl StudioError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The caller has to fix the script, voice map or config
            StudioError::Validation(_) => false,
            // Contained per chunk by the synthesis client
            StudioError::Backend(_) => true,
            StudioError::EncodingError(_) => false,
            // A bad clip degrades to silence
            StudioError::DecodingError(_) => true,
            StudioError::AudioProcessingError(_) => true,
            StudioError::ConfigError(_) => false,
            StudioError::IOError(_) => false,
            StudioError::Cancelled => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            StudioError::Validation(ValidationError::MissingVoices(speakers)) => format!(
                "Assign a voice to every speaker before producing (missing: {}).",
                speakers.join(", ")
            ),
            StudioError::Validation(_) => "The production request is invalid.".to_string(),
            StudioError::Backend(_) => {
                "The TTS backend failed. Affected lines are left silent.".to_string()
            }
            StudioError::EncodingError(_) => {
                "Could not write the final audio file. No output was produced.".to_string()
            }
            StudioError::DecodingError(_) => {
                "The backend returned audio that could not be read.".to_string()
            }
            StudioError::AudioProcessingError(_) => "Audio processing failed.".to_string(),
            StudioError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            StudioError::IOError(_) => "File system error occurred.".to_string(),
            StudioError::Cancelled => "Production was cancelled.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
