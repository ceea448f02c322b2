//! Assembly of per-chunk audio into one production
//!
//! Chunks of a line are joined with a short equal-power crossfade so the
//! seams are inaudible. Lines are separated by a fixed silent gap. Every clip
//! is brought to one working layout first (channel conversion, then sinc
//! resampling), chosen once per run.

use crate::audio::clip::AudioClip;
use crate::audio::encode::{encode, OutputFormat};
use crate::audio::mix::{convert_channels, crossfade_append, ms_to_frames, normalize_peak, silence};
use crate::audio::resampler::resample_audio;
use crate::audio::wav::decode_wav;
use crate::production::{LineResults, ProductionArtifact, SegmentReport};
use crate::speech::ErrorKind;
use crate::Result;
use tracing::{debug, info, warn};

/// Working rate when neither the config nor any chunk provides one
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Silence standing in for a line that produced no audio at all
pub const FAILED_LINE_PLACEHOLDER_MS: u64 = 1_000;

/// Peak level used when normalization is enabled
pub const NORMALIZE_PEAK: f32 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct StitchOptions {
    /// Silence between consecutive lines
    pub speaker_gap_ms: u64,
    /// Overlap between consecutive chunks of the same line
    pub crossfade_ms: u64,
    pub output_format: OutputFormat,
    /// Fixed working rate; `None` takes the rate of the first good chunk
    pub sample_rate: Option<u32>,
    pub channels: u16,
    /// Peak-normalize every chunk before joining
    pub normalize: bool,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            speaker_gap_ms: 100,
            crossfade_ms: 50,
            output_format: OutputFormat::default(),
            sample_rate: None,
            channels: 1,
            normalize: false,
        }
    }
}

impl StitchOptions {
    pub fn with_speaker_gap_ms(mut self, ms: u64) -> Self {
        self.speaker_gap_ms = ms;
        self
    }

    pub fn with_crossfade_ms(mut self, ms: u64) -> Self {
        self.crossfade_ms = ms;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: Option<u32>) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

pub struct Stitcher {
    options: StitchOptions,
}

impl Stitcher {
    pub fn new(options: StitchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StitchOptions {
        &self.options
    }

    /// Working sample rate for a run
    pub fn working_rate(&self, lines: &[LineResults]) -> u32 {
        self.options
            .sample_rate
            .filter(|&rate| rate > 0)
            .or_else(|| {
                lines
                    .iter()
                    .flat_map(|line| line.results.iter())
                    .find(|result| result.is_ok() && result.sample_rate > 0)
                    .map(|result| result.sample_rate)
            })
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Stitch and encode all lines
    ///
    /// Only encoding can fail; bad chunks degrade to silence and show up in
    /// the segment report.
    pub fn stitch(&self, lines: &[LineResults]) -> Result<ProductionArtifact> {
        let (clip, report) = self.assemble(lines);

        let audio = encode(
            &clip.samples,
            clip.sample_rate,
            clip.channels,
            self.options.output_format,
        )?;

        info!(
            "Stitched {} lines into {} ms of {} audio",
            lines.len(),
            clip.duration_ms(),
            self.options.output_format
        );

        Ok(ProductionArtifact::new(
            audio,
            self.options.output_format,
            clip.duration_ms(),
            clip.sample_rate,
            clip.channels,
            report,
        ))
    }

    /// Build the raw production buffer and its segment report
    pub fn assemble(&self, lines: &[LineResults]) -> (AudioClip, Vec<SegmentReport>) {
        let rate = self.working_rate(lines);
        let channels = self.options.channels.max(1);
        let gap = silence(ms_to_frames(self.options.speaker_gap_ms, rate), channels);
        let overlap = ms_to_frames(self.options.crossfade_ms, rate);

        debug!(
            "Assembling {} lines at {} Hz, {} channels",
            lines.len(),
            rate,
            channels
        );

        let mut buffer = Vec::new();
        let mut report = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                buffer.extend_from_slice(&gap);
            }
            let (samples, segment) = self.render_line(line, rate, channels, overlap);
            buffer.extend(samples);
            report.push(segment);
        }

        (AudioClip::new(buffer, rate, channels), report)
    }

    fn render_line(
        &self,
        line: &LineResults,
        rate: u32,
        channels: u16,
        overlap: usize,
    ) -> (Vec<f32>, SegmentReport) {
        let chunk_count = line.results.len();
        let placeholder = || silence(ms_to_frames(FAILED_LINE_PLACEHOLDER_MS, rate), channels);

        if line.all_failed() {
            let error = line.first_error().unwrap_or(ErrorKind::MalformedAudio);
            warn!(
                "Line {} ({}) produced no audio: {}",
                line.line.order_index, line.line.speaker, error
            );
            return (
                placeholder(),
                SegmentReport::failed(&line.line, error, chunk_count, chunk_count),
            );
        }

        let mut samples = Vec::new();
        let mut failed = 0;
        let mut first_error = None;

        for result in &line.results {
            let prepared = match result.audio() {
                Some(bytes) => self.prepare_chunk(bytes, rate, channels).map_err(|e| {
                    warn!(
                        "Line {} chunk {} could not be decoded: {}",
                        line.line.order_index, result.chunk.sequence_index, e
                    );
                    ErrorKind::MalformedAudio
                }),
                None => Err(result.error().unwrap_or(ErrorKind::MalformedAudio)),
            };

            match prepared {
                Ok(clip) => crossfade_append(&mut samples, &clip, overlap, channels),
                Err(kind) => {
                    failed += 1;
                    first_error.get_or_insert(kind);
                }
            }
        }

        match first_error {
            None => (samples, SegmentReport::ok(&line.line, chunk_count)),
            Some(error) if failed == chunk_count => (
                placeholder(),
                SegmentReport::failed(&line.line, error, chunk_count, failed),
            ),
            Some(error) => (
                samples,
                SegmentReport::failed(&line.line, error, chunk_count, failed),
            ),
        }
    }

    fn prepare_chunk(&self, bytes: &[u8], rate: u32, channels: u16) -> Result<Vec<f32>> {
        let clip = decode_wav(bytes)?;
        let converted = convert_channels(&clip.samples, clip.channels, channels);
        let mut resampled = resample_audio(&converted, clip.sample_rate, rate, channels)?;

        if self.options.normalize {
            normalize_peak(&mut resampled, NORMALIZE_PEAK);
        }

        Ok(resampled)
    }
}

/// Stitch with default layout options
pub fn stitch(
    results_by_line: &[LineResults],
    speaker_gap_ms: u64,
    crossfade_ms: u64,
    output_format: OutputFormat,
) -> Result<ProductionArtifact> {
    let options = StitchOptions::default()
        .with_speaker_gap_ms(speaker_gap_ms)
        .with_crossfade_ms(crossfade_ms)
        .with_output_format(output_format);

    Stitcher::new(options).stitch(results_by_line)
}
