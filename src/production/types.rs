use crate::audio::OutputFormat;
use crate::script::ScriptLine;
use crate::speech::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A backend-sized fragment of one script line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub parent_line_index: usize,
    pub sequence_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(parent_line_index: usize, sequence_index: usize, text: impl Into<String>) -> Self {
        Self {
            parent_line_index,
            sequence_index,
            text: text.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Either the audio returned for a chunk or the reason there is none
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Audio(Vec<u8>),
    Failed(ErrorKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub chunk: Chunk,
    pub voice_id: String,
    pub outcome: SynthesisOutcome,
    /// Sample rate from the WAV header, 0 when synthesis failed
    pub sample_rate: u32,
    /// Channel count from the WAV header, 0 when synthesis failed
    pub channel_count: u16,
}

impl SynthesisResult {
    pub fn success(
        chunk: Chunk,
        voice_id: impl Into<String>,
        audio: Vec<u8>,
        sample_rate: u32,
        channel_count: u16,
    ) -> Self {
        Self {
            chunk,
            voice_id: voice_id.into(),
            outcome: SynthesisOutcome::Audio(audio),
            sample_rate,
            channel_count,
        }
    }

    pub fn failure(chunk: Chunk, voice_id: impl Into<String>, error: ErrorKind) -> Self {
        Self {
            chunk,
            voice_id: voice_id.into(),
            outcome: SynthesisOutcome::Failed(error),
            sample_rate: 0,
            channel_count: 0,
        }
    }

    pub fn audio(&self) -> Option<&[u8]> {
        match &self.outcome {
            SynthesisOutcome::Audio(bytes) => Some(bytes),
            SynthesisOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match &self.outcome {
            SynthesisOutcome::Audio(_) => None,
            SynthesisOutcome::Failed(kind) => Some(*kind),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, SynthesisOutcome::Audio(_))
    }
}

/// All synthesis results of one script line, in chunk order
#[derive(Debug, Clone)]
pub struct LineResults {
    pub line: ScriptLine,
    pub results: Vec<SynthesisResult>,
}

impl LineResults {
    pub fn new(line: ScriptLine, results: Vec<SynthesisResult>) -> Self {
        Self { line, results }
    }

    pub fn failed_chunks(&self) -> usize {
        self.results.iter().filter(|r| !r.is_ok()).count()
    }

    /// True when the line has chunks and none of them produced audio
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| !r.is_ok())
    }

    pub fn first_error(&self) -> Option<ErrorKind> {
        self.results.iter().find_map(|r| r.error())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Ok,
    Failed,
}

/// Outcome of one script line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub order_index: usize,
    pub speaker: String,
    pub status: SegmentStatus,
    /// First error seen on this line, if any
    pub error: Option<ErrorKind>,
    pub chunk_count: usize,
    pub failed_chunks: usize,
}

impl SegmentReport {
    pub fn ok(line: &ScriptLine, chunk_count: usize) -> Self {
        Self {
            order_index: line.order_index,
            speaker: line.speaker.clone(),
            status: SegmentStatus::Ok,
            error: None,
            chunk_count,
            failed_chunks: 0,
        }
    }

    pub fn failed(
        line: &ScriptLine,
        error: ErrorKind,
        chunk_count: usize,
        failed_chunks: usize,
    ) -> Self {
        Self {
            order_index: line.order_index,
            speaker: line.speaker.clone(),
            status: SegmentStatus::Failed,
            error: Some(error),
            chunk_count,
            failed_chunks,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SegmentStatus::Ok
    }
}

/// The finished production handed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionArtifact {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub audio: Vec<u8>,
    pub container_format: OutputFormat,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub segment_report: Vec<SegmentReport>,
}

impl ProductionArtifact {
    pub fn new(
        audio: Vec<u8>,
        container_format: OutputFormat,
        duration_ms: u64,
        sample_rate: u32,
        channels: u16,
        segment_report: Vec<SegmentReport>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            audio,
            container_format,
            duration_ms,
            sample_rate,
            channels,
            segment_report,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// True when every line synthesized without a gap
    pub fn is_clean(&self) -> bool {
        self.segment_report.iter().all(SegmentReport::is_ok)
    }

    pub fn failed_segments(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segment_report.iter().filter(|s| !s.is_ok())
    }

    /// Suggested file name, e.g. `production_<run id>.mp3`
    pub fn file_name(&self) -> String {
        format!(
            "production_{}.{}",
            self.run_id.simple(),
            self.container_format.extension()
        )
    }

    /// Write the encoded audio to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        std::fs::write(path, &self.audio)?;
        Ok(())
    }

    /// Report as pretty-printed JSON (audio bytes excluded)
    pub fn report_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
