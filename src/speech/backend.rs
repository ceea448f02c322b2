//! TTS backend capability
//!
//! Anything that can list voices and turn text into WAV bytes can drive a
//! production. The HTTP adapter in [`crate::speech::http`] is the stock
//! implementation; tests plug in scripted backends.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    /// Forwarded to backends that support reproducible sampling
    pub seed: Option<u64>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// TTS backend trait
#[async_trait::async_trait]
pub trait TtsBackend: Send + Sync {
    /// Voice ids the backend advertises
    async fn list_voices(&self) -> Result<Vec<String>, BackendError>;

    /// Synthesize text to a WAV-encoded byte buffer
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "backend"
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Timeout(_) => ErrorKind::Timeout,
            BackendError::Network(_) => ErrorKind::Network,
            BackendError::Status { status, .. } => ErrorKind::HttpStatus(*status),
            BackendError::MalformedAudio(_) => ErrorKind::MalformedAudio,
            BackendError::UnknownVoice(_) => ErrorKind::UnknownVoice,
        }
    }

    /// Whether a retry can be expected to help
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::UnknownVoice(_))
    }
}

/// Serializable summary of a [`BackendError`], kept in results and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    HttpStatus(u16),
    MalformedAudio,
    UnknownVoice,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::HttpStatus(status) => write!(f, "HTTP {}", status),
            ErrorKind::MalformedAudio => write!(f, "malformed audio"),
            ErrorKind::UnknownVoice => write!(f, "unknown voice"),
        }
    }
}
