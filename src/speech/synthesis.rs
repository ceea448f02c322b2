//! Chunk synthesis against a TTS backend
//!
//! Every chunk gets its own backend call. Calls run concurrently up to a
//! bounded pool, each attempt is wrapped in a timeout, and transient failures
//! are retried a fixed number of times. Errors never escape: each chunk ends
//! up as exactly one [`SynthesisResult`], audio or error.

use crate::audio::wav::{probe_wav, WavInfo};
use crate::production::{Chunk, SynthesisResult};
use crate::speech::backend::{BackendError, SpeechRequest, TtsBackend};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

/// Retry, concurrency and timeout settings for backend calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Extra attempts after the first failure of a transient error
    pub max_retries: u32,

    /// Backend calls allowed in flight at once
    pub max_concurrency: usize,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_concurrency: 4,
            timeout_ms: 30_000,
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Run `attempt` until it succeeds, fails permanently, or `max_retries`
/// retries are used up
///
/// The closure receives the zero-based attempt number. Retries are immediate.
pub async fn retry_bounded<T, F, Fut>(max_retries: u32, mut attempt: F) -> Result<T, BackendError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut tries = 0;
    loop {
        match attempt(tries).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && tries < max_retries => {
                tries += 1;
                warn!("Attempt {} failed ({}), retrying", tries, e);
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct SynthesisClient {
    backend: Arc<dyn TtsBackend>,
    config: SynthesisConfig,
    semaphore: Arc<Semaphore>,
    /// Advertised voices, `None` when listing failed
    voices: OnceCell<Option<Vec<String>>>,
}

impl SynthesisClient {
    pub fn new(backend: Arc<dyn TtsBackend>, config: SynthesisConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            backend,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            voices: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Check a voice against the backend's advertised list
    ///
    /// The list is fetched once per client. When the backend cannot list its
    /// voices, or lists none, the check is skipped.
    pub async fn validate_voice(&self, voice_id: &str) -> Result<(), BackendError> {
        let voices = self
            .voices
            .get_or_init(|| async {
                let timeout = self.config.timeout();
                match tokio::time::timeout(timeout, self.backend.list_voices()).await {
                    Ok(Ok(voices)) => {
                        debug!("Backend {} lists {} voices", self.backend.name(), voices.len());
                        Some(voices)
                    }
                    Ok(Err(e)) => {
                        warn!("Could not list voices, skipping voice check: {}", e);
                        None
                    }
                    Err(_) => {
                        warn!("Listing voices timed out, skipping voice check");
                        None
                    }
                }
            })
            .await;

        match voices {
            Some(list) if !list.is_empty() && !list.iter().any(|v| v == voice_id) => {
                Err(BackendError::UnknownVoice(voice_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Synthesize all chunks of one line with one voice
    ///
    /// Returns one result per chunk, ordered by `sequence_index`.
    pub async fn synthesize_all(
        &self,
        chunks: &[Chunk],
        voice_id: &str,
        seed: Option<u64>,
    ) -> Vec<SynthesisResult> {
        if let Err(e) = self.validate_voice(voice_id).await {
            warn!("{}; failing {} chunks without synthesis", e, chunks.len());
            return chunks
                .iter()
                .map(|chunk| SynthesisResult::failure(chunk.clone(), voice_id, e.kind()))
                .collect();
        }

        let calls = chunks
            .iter()
            .map(|chunk| self.synthesize_chunk(chunk, voice_id, seed));

        let mut results = join_all(calls).await;
        results.sort_by_key(|r| r.chunk.sequence_index);
        results
    }

    async fn synthesize_chunk(
        &self,
        chunk: &Chunk,
        voice_id: &str,
        seed: Option<u64>,
    ) -> SynthesisResult {
        let request = SpeechRequest::new(chunk.text.clone(), voice_id).with_seed(seed);

        let outcome = retry_bounded(self.config.max_retries, |attempt| {
            let request = &request;
            async move {
                if attempt > 0 {
                    debug!(
                        "Retry {} for line {} chunk {}",
                        attempt, chunk.parent_line_index, chunk.sequence_index
                    );
                }
                self.call_once(request).await
            }
        })
        .await;

        match outcome {
            Ok((audio, info)) => {
                debug!(
                    "Line {} chunk {}: {} frames at {} Hz",
                    chunk.parent_line_index, chunk.sequence_index, info.frames, info.sample_rate
                );
                SynthesisResult::success(
                    chunk.clone(),
                    voice_id,
                    audio,
                    info.sample_rate,
                    info.channels,
                )
            }
            Err(e) => {
                warn!(
                    "Line {} chunk {} failed: {}",
                    chunk.parent_line_index, chunk.sequence_index, e
                );
                SynthesisResult::failure(chunk.clone(), voice_id, e.kind())
            }
        }
    }

    async fn call_once(&self, request: &SpeechRequest) -> Result<(Vec<u8>, WavInfo), BackendError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| BackendError::Network("synthesis pool closed".into()))?;

        let timeout = self.config.timeout();
        let audio = tokio::time::timeout(timeout, self.backend.synthesize(request))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;

        // Reject anything that is not readable WAV at the boundary
        let info = probe_wav(&audio).map_err(|e| BackendError::MalformedAudio(e.to_string()))?;

        Ok((audio, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::encode_wav;
    use crate::speech::ErrorKind;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that fails a fixed number of times per text before answering
    struct FlakyBackend {
        voices: Result<Vec<String>, BackendError>,
        failures_before_success: usize,
        failure: BackendError,
        delay: Duration,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FlakyBackend {
        fn healthy() -> Self {
            Self {
                voices: Ok(vec!["v1".to_string()]),
                failures_before_success: 0,
                failure: BackendError::Network("down".into()),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn calls_for(&self, text: &str) -> usize {
            self.calls.lock().iter().filter(|t| t.as_str() == text).count()
        }
    }

    #[async_trait::async_trait]
    impl TtsBackend for FlakyBackend {
        async fn list_voices(&self) -> Result<Vec<String>, BackendError> {
            self.voices.clone()
        }

        async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
            let previous = {
                let mut calls = self.calls.lock();
                let previous = calls.iter().filter(|t| **t == request.text).count();
                calls.push(request.text.clone());
                previous
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if previous < self.failures_before_success {
                return Err(self.failure.clone());
            }
            if request.text == "garbage" {
                return Ok(b"not a wav file".to_vec());
            }
            encode_wav(&vec![0.1; 2400], 24000, 1)
                .map_err(|e| BackendError::MalformedAudio(e.to_string()))
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(0, i, *t))
            .collect()
    }

    #[tokio::test]
    async fn test_retry_bounded_gives_up() {
        let mut attempts = 0;
        let result: Result<(), BackendError> = retry_bounded(2, |_| {
            attempts += 1;
            async { Err(BackendError::Network("down".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_bounded_skips_permanent_errors() {
        let mut attempts = 0;
        let result: Result<(), BackendError> = retry_bounded(5, |_| {
            attempts += 1;
            async { Err(BackendError::UnknownVoice("x".into())) }
        })
        .await;

        assert_eq!(result, Err(BackendError::UnknownVoice("x".into())));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_results_in_chunk_order() {
        let backend = Arc::new(FlakyBackend::healthy());
        let client = SynthesisClient::new(backend.clone(), SynthesisConfig::default());

        let results = client.synthesize_all(&chunks(&["a", "b", "c"]), "v1", None).await;

        let order: Vec<usize> = results.iter().map(|r| r.chunk.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(results
            .iter()
            .all(|r| r.is_ok() && r.sample_rate == 24000 && r.channel_count == 1));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let backend = Arc::new(FlakyBackend {
            failures_before_success: 2,
            ..FlakyBackend::healthy()
        });
        let client = SynthesisClient::new(backend.clone(), SynthesisConfig::default());

        let results = client.synthesize_all(&chunks(&["hello"]), "v1", None).await;

        assert!(results[0].is_ok());
        assert_eq!(backend.calls_for("hello"), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let backend = Arc::new(FlakyBackend {
            failures_before_success: 10,
            failure: BackendError::Status {
                status: 503,
                body: String::new(),
            },
            ..FlakyBackend::healthy()
        });
        let client =
            SynthesisClient::new(backend.clone(), SynthesisConfig::default().with_max_retries(1));

        let results = client.synthesize_all(&chunks(&["hello"]), "v1", None).await;

        assert_eq!(results[0].error(), Some(ErrorKind::HttpStatus(503)));
        assert_eq!(backend.calls_for("hello"), 2);
    }

    #[tokio::test]
    async fn test_malformed_audio_is_rejected() {
        let backend = Arc::new(FlakyBackend::healthy());
        let client = SynthesisClient::new(backend.clone(), SynthesisConfig::default());

        let results = client.synthesize_all(&chunks(&["garbage"]), "v1", None).await;

        assert_eq!(results[0].error(), Some(ErrorKind::MalformedAudio));
        assert_eq!(backend.calls_for("garbage"), 3);
    }

    #[tokio::test]
    async fn test_unknown_voice_fails_without_synthesis() {
        let backend = Arc::new(FlakyBackend::healthy());
        let client = SynthesisClient::new(backend.clone(), SynthesisConfig::default());

        let results = client.synthesize_all(&chunks(&["a", "b"]), "nobody", None).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error() == Some(ErrorKind::UnknownVoice)));
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_voice_check_skipped_when_listing_fails() {
        let backend = Arc::new(FlakyBackend {
            voices: Err(BackendError::Status {
                status: 404,
                body: String::new(),
            }),
            ..FlakyBackend::healthy()
        });
        let client = SynthesisClient::new(backend.clone(), SynthesisConfig::default());

        assert!(client.validate_voice("anything").await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let backend = Arc::new(FlakyBackend {
            delay: Duration::from_millis(500),
            ..FlakyBackend::healthy()
        });
        let config = SynthesisConfig::default()
            .with_max_retries(0)
            .with_timeout(Duration::from_millis(20));
        let client = SynthesisClient::new(backend, config);

        let results = client.synthesize_all(&chunks(&["slow"]), "v1", None).await;

        assert_eq!(results[0].error(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let backend = Arc::new(FlakyBackend {
            delay: Duration::from_millis(20),
            ..FlakyBackend::healthy()
        });
        let client = SynthesisClient::new(
            backend.clone(),
            SynthesisConfig::default().with_max_concurrency(2),
        );
        let texts: Vec<String> = (0..8).map(|i| format!("chunk {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let results = client.synthesize_all(&chunks(&refs), "v1", None).await;

        assert_eq!(results.len(), 8);
        assert!(backend.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
