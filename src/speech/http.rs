//! OpenAI-compatible HTTP backend
//!
//! Talks to any server exposing `POST /v1/audio/speech` and
//! `GET /v1/audio/voices`. The audio is always requested as WAV; container
//! conversion happens once, after stitching.

use crate::speech::backend::{BackendError, SpeechRequest, TtsBackend};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default model name sent with every request
pub const DEFAULT_MODEL: &str = "tts-1";

/// Longest error body kept in a `BackendError::Status`
const MAX_ERROR_BODY: usize = 512;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Option<Duration>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Per-request timeout enforced by the HTTP client
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn network_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.unwrap_or_default())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct SpeechPayload<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VoiceEntry {
    Name(String),
    Object {
        id: Option<String>,
        name: Option<String>,
    },
}

impl VoiceEntry {
    fn into_id(self) -> Option<String> {
        match self {
            VoiceEntry::Name(name) => Some(name),
            VoiceEntry::Object { id, name } => id.or(name),
        }
    }
}

async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    BackendError::Status { status, body }
}

#[async_trait::async_trait]
impl TtsBackend for HttpBackend {
    async fn list_voices(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .request(self.client.get(self.url("/v1/audio/voices")))
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Network(format!("Invalid voices response: {}", e)))?;

        let voices: Vec<String> = parsed
            .voices
            .into_iter()
            .filter_map(VoiceEntry::into_id)
            .collect();

        debug!("{} advertises {} voices", self.base_url, voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        let payload = SpeechPayload {
            model: &self.model,
            voice: &request.voice_id,
            input: &request.text,
            response_format: "wav",
            seed: request.seed,
        };

        let response = self
            .request(self.client.post(self.url("/v1/audio/speech")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let bytes = response.bytes().await.map_err(|e| self.network_error(e))?;
        if bytes.is_empty() {
            return Err(BackendError::MalformedAudio("empty response body".into()));
        }

        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "http"
    }
}
