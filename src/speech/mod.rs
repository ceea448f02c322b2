//! Speech synthesis
//!
//! This module provides:
//! - The `TtsBackend` capability and its error types
//! - An HTTP backend for OpenAI-compatible TTS servers
//! - The synthesis client (bounded concurrency, retry, timeout)

pub mod backend;
pub mod http;
pub mod synthesis;

// Re-export commonly used types
pub use backend::{BackendError, ErrorKind, SpeechRequest, TtsBackend};
pub use http::HttpBackend;
pub use synthesis::{retry_bounded, SynthesisClient, SynthesisConfig};
