//! Orchestrator for end-to-end script production
//!
//! Connects all components: Script -> Chunker -> Synthesis -> Stitcher -> Encoder

use crate::audio::Stitcher;
use crate::integration::config::ProductionConfig;
use crate::production::{LineResults, ProductionArtifact};
use crate::script::{missing_speakers, parse_script, ScriptLine, SpeakerVoiceMap};
use crate::speech::{SynthesisClient, TtsBackend};
use crate::text::chunk_line;
use crate::utils::perf::Stopwatch;
use crate::{Result, StudioError, ValidationError};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a production run currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductionState {
    Idle,
    Validating,
    /// Synthesizing the line at `line` (position in the script) of `total`
    Synthesizing { line: usize, total: usize },
    Stitching,
    Done,
    Failed(String),
    Cancelled,
}

impl ProductionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProductionState::Done | ProductionState::Failed(_) | ProductionState::Cancelled
        )
    }
}

/// Events emitted while a production runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProductionEvent {
    /// Validation passed, synthesis is about to start
    Started { run_id: Uuid, lines: usize },

    LineStarted {
        order_index: usize,
        speaker: String,
        chunks: usize,
    },

    LineFinished {
        order_index: usize,
        failed_chunks: usize,
    },

    Stitching,

    Finished {
        run_id: Uuid,
        duration_ms: u64,
        failed_segments: usize,
    },

    Failed(String),

    Cancelled,
}

/// Shared view of a run for the caller: poll the state, request cancellation
#[derive(Debug, Clone)]
pub struct ProductionHandle {
    state: Arc<Mutex<ProductionState>>,
    cancelled: Arc<AtomicBool>,
}

impl Default for ProductionHandle {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProductionState::Idle)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ProductionHandle {
    pub fn state(&self) -> ProductionState {
        self.state.lock().clone()
    }

    /// Ask the current run, or the next one if none is running, to stop at
    /// the next line boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn clear_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, state: ProductionState) {
        debug!("Production state: {:?}", state);
        *self.state.lock() = state;
    }
}

/// Runs productions against one backend with one configuration
pub struct Producer {
    backend: Arc<dyn TtsBackend>,
    config: ProductionConfig,
    handle: ProductionHandle,
    events: Option<Sender<ProductionEvent>>,
}

impl Producer {
    pub fn new(backend: Arc<dyn TtsBackend>, config: ProductionConfig) -> Self {
        Self {
            backend,
            config,
            handle: ProductionHandle::default(),
            events: None,
        }
    }

    /// Send progress events to `events`
    pub fn with_events(mut self, events: Sender<ProductionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn handle(&self) -> ProductionHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &ProductionConfig {
        &self.config
    }

    /// Produce one audio artifact from parsed script lines
    ///
    /// Validation problems and cancellation are errors; backend failures are
    /// not, they show up as gaps in the artifact's segment report.
    pub async fn produce(
        &self,
        script: &[ScriptLine],
        voice_map: &SpeakerVoiceMap,
    ) -> Result<ProductionArtifact> {
        let result = self.run(script, voice_map).await;

        // A cancel request applies to one run only
        self.handle.clear_cancel();

        match &result {
            Ok(artifact) => {
                self.handle.set_state(ProductionState::Done);
                self.emit(ProductionEvent::Finished {
                    run_id: artifact.run_id,
                    duration_ms: artifact.duration_ms,
                    failed_segments: artifact.failed_segments().count(),
                });
            }
            Err(StudioError::Cancelled) => {
                self.handle.set_state(ProductionState::Cancelled);
                self.emit(ProductionEvent::Cancelled);
            }
            Err(e) => {
                warn!("Production failed: {}", e);
                self.handle.set_state(ProductionState::Failed(e.to_string()));
                self.emit(ProductionEvent::Failed(e.to_string()));
            }
        }

        result
    }

    /// Parse a raw `Speaker: line` script and produce it
    pub async fn produce_from_text(
        &self,
        script_text: &str,
        voice_map: &SpeakerVoiceMap,
    ) -> Result<ProductionArtifact> {
        let script = parse_script(script_text);
        debug!("Parsed {} script lines", script.len());
        self.produce(&script, voice_map).await
    }

    async fn run(
        &self,
        script: &[ScriptLine],
        voice_map: &SpeakerVoiceMap,
    ) -> Result<ProductionArtifact> {
        let run_id = Uuid::new_v4();
        let mut stopwatch = Stopwatch::start();

        self.handle.set_state(ProductionState::Validating);
        self.config.validate()?;

        let missing = missing_speakers(script, voice_map);
        if !missing.is_empty() {
            return Err(ValidationError::MissingVoices(missing).into());
        }

        info!(
            "Starting production {} ({} lines, backend {})",
            run_id,
            script.len(),
            self.backend.name()
        );
        self.emit(ProductionEvent::Started {
            run_id,
            lines: script.len(),
        });

        let client = SynthesisClient::new(Arc::clone(&self.backend), self.config.synthesis.clone());
        let limits = self.config.limits();
        let mut line_timings: Vec<Duration> = Vec::with_capacity(script.len());
        let mut results_by_line = Vec::with_capacity(script.len());

        for (position, line) in script.iter().enumerate() {
            self.handle.set_state(ProductionState::Synthesizing {
                line: position,
                total: script.len(),
            });

            let voice_id = voice_map
                .get(&line.speaker)
                .ok_or_else(|| ValidationError::MissingVoices(vec![line.speaker.clone()]))?;

            let chunks = chunk_line(line, limits);
            self.emit(ProductionEvent::LineStarted {
                order_index: line.order_index,
                speaker: line.speaker.clone(),
                chunks: chunks.len(),
            });

            let started = Instant::now();
            let results = client
                .synthesize_all(&chunks, voice_id, self.config.line_seed(line.order_index))
                .await;
            line_timings.push(started.elapsed());

            let line_results = LineResults::new(line.clone(), results);
            debug!(
                "Line {} ({}): {} chunks, {} failed",
                line.order_index,
                line.speaker,
                chunks.len(),
                line_results.failed_chunks()
            );
            self.emit(ProductionEvent::LineFinished {
                order_index: line.order_index,
                failed_chunks: line_results.failed_chunks(),
            });
            results_by_line.push(line_results);

            if self.handle.is_cancelled() {
                info!("Production {} cancelled after line {}", run_id, line.order_index);
                return Err(StudioError::Cancelled);
            }
        }
        stopwatch.split("synthesis");

        self.handle.set_state(ProductionState::Stitching);
        self.emit(ProductionEvent::Stitching);

        // Decoding, resampling and encoding are CPU bound
        let stitcher = Stitcher::new(self.config.stitch_options());
        let artifact = tokio::task::spawn_blocking(move || stitcher.stitch(&results_by_line))
            .await
            .map_err(|e| {
                StudioError::AudioProcessingError(format!("Stitching task failed: {}", e))
            })??
            .with_run_id(run_id);
        stopwatch.split("stitching");

        if let Some((slowest, time)) = line_timings.iter().enumerate().max_by_key(|(_, d)| **d) {
            debug!(
                "Line synthesis: {:?} total, slowest line {} took {:?}",
                line_timings.iter().sum::<Duration>(),
                slowest,
                time
            );
        }
        info!(
            "Production {} finished in {} ms (synthesis {:?}, stitching {:?}): {} ms of audio, {} failed lines",
            run_id,
            stopwatch.elapsed_ms(),
            stopwatch.lap("synthesis").unwrap_or_default(),
            stopwatch.lap("stitching").unwrap_or_default(),
            artifact.duration_ms,
            artifact.failed_segments().count()
        );

        Ok(artifact)
    }

    fn emit(&self, event: ProductionEvent) {
        if let Some(events) = &self.events {
            // A slow or gone listener must not stall the run
            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    debug!("Event channel full, dropping {:?}", event)
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

/// Produce a script with a one-off [`Producer`]
pub async fn produce(
    script: &[ScriptLine],
    voice_map: &SpeakerVoiceMap,
    backend: Arc<dyn TtsBackend>,
    config: &ProductionConfig,
) -> Result<ProductionArtifact> {
    Producer::new(backend, config.clone()).produce(script, voice_map).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{BackendError, SpeechRequest};

    struct SilentBackend;

    #[async_trait::async_trait]
    impl TtsBackend for SilentBackend {
        async fn list_voices(&self) -> std::result::Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn synthesize(
            &self,
            _request: &SpeechRequest,
        ) -> std::result::Result<Vec<u8>, BackendError> {
            crate::audio::encode_wav(&[0.0; 240], 24000, 1)
                .map_err(|e| BackendError::MalformedAudio(e.to_string()))
        }
    }

    fn wav_config() -> ProductionConfig {
        ProductionConfig::default().with_output_format(crate::audio::OutputFormat::Wav)
    }

    #[test]
    fn test_handle_defaults() {
        let handle = ProductionHandle::default();
        assert_eq!(handle.state(), ProductionState::Idle);
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.clone().is_cancelled());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProductionState::Done.is_terminal());
        assert!(ProductionState::Cancelled.is_terminal());
        assert!(!ProductionState::Stitching.is_terminal());
    }

    #[tokio::test]
    async fn test_state_after_success() {
        let producer = Producer::new(Arc::new(SilentBackend), wav_config());
        let mut voices = SpeakerVoiceMap::new();
        voices.insert("A".to_string(), "v1".to_string());

        let artifact = producer.produce_from_text("A: Hello.", &voices).await.unwrap();

        assert_eq!(producer.handle().state(), ProductionState::Done);
        assert_eq!(artifact.duration_ms, 10);
    }

    #[tokio::test]
    async fn test_state_after_validation_failure() {
        let producer = Producer::new(Arc::new(SilentBackend), wav_config());

        let err = producer
            .produce_from_text("A: Hello.", &SpeakerVoiceMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::Validation(_)));
        assert!(matches!(producer.handle().state(), ProductionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_cancel_applies_to_one_run() {
        let producer = Producer::new(Arc::new(SilentBackend), wav_config());
        let mut voices = SpeakerVoiceMap::new();
        voices.insert("A".to_string(), "v1".to_string());

        producer.handle().cancel();
        let first = producer.produce_from_text("A: Hello.\nA: Again.", &voices).await;
        assert!(matches!(first, Err(StudioError::Cancelled)));
        assert!(!producer.handle().is_cancelled());

        let second = producer.produce_from_text("A: Hello.\nA: Again.", &voices).await;
        assert_eq!(second.unwrap().segment_report.len(), 2);
        assert_eq!(producer.handle().state(), ProductionState::Done);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let producer = Producer::new(Arc::new(SilentBackend), wav_config().with_limits(10, 20));
        let mut voices = SpeakerVoiceMap::new();
        voices.insert("A".to_string(), "v1".to_string());

        let err = producer.produce_from_text("A: Hello.", &voices).await.unwrap_err();
        assert!(matches!(
            err,
            StudioError::Validation(ValidationError::InvalidConfig(_))
        ));
    }
}
