//! Output container encoding
//!
//! WAV is written with hound, OGG/Vorbis with `vorbis_rs` (feature `ogg`) and
//! MP3 by piping WAV through an `ffmpeg` process using libmp3lame.

use crate::audio::wav::encode_wav;
use crate::{Result, StudioError, ValidationError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::debug;

/// Environment variable overriding the ffmpeg binary used for MP3
pub const FFMPEG_ENV: &str = "TTS_STUDIO_FFMPEG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::Ogg => "ogg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Ogg => "audio/ogg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            "ogg" => Ok(OutputFormat::Ogg),
            _ => Err(ValidationError::UnknownFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encode interleaved samples into the requested container
pub fn encode(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    format: OutputFormat,
) -> Result<Vec<u8>> {
    let bytes = match format {
        OutputFormat::Wav => encode_wav(samples, sample_rate, channels)?,
        OutputFormat::Ogg => encode_ogg(samples, sample_rate, channels)?,
        OutputFormat::Mp3 => encode_mp3(samples, sample_rate, channels)?,
    };

    debug!(
        "Encoded {} samples as {} ({} bytes)",
        samples.len(),
        format,
        bytes.len()
    );

    Ok(bytes)
}

#[cfg(feature = "ogg")]
fn encode_ogg(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    use std::num::{NonZeroU32, NonZeroU8};
    use vorbis_rs::VorbisEncoderBuilder;

    const BLOCK_FRAMES: usize = 4096;

    let rate = NonZeroU32::new(sample_rate)
        .ok_or_else(|| StudioError::EncodingError("Sample rate must be greater than 0".into()))?;
    let channel_count = u8::try_from(channels)
        .ok()
        .and_then(NonZeroU8::new)
        .ok_or_else(|| {
            StudioError::EncodingError(format!("Unsupported channel count: {}", channels))
        })?;

    let vorbis_error =
        |e: vorbis_rs::VorbisError| StudioError::EncodingError(format!("Vorbis: {}", e));

    let mut output = Vec::new();
    {
        let mut encoder = VorbisEncoderBuilder::new(rate, channel_count, &mut output)
            .map_err(vorbis_error)?
            .build()
            .map_err(vorbis_error)?;

        let channels = channels as usize;
        for block in samples.chunks(BLOCK_FRAMES * channels) {
            let mut planar = vec![Vec::with_capacity(block.len() / channels); channels];
            for frame in block.chunks(channels) {
                for (channel, &sample) in planar.iter_mut().zip(frame) {
                    channel.push(sample);
                }
            }
            encoder.encode_audio_block(&planar).map_err(vorbis_error)?;
        }

        encoder.finish().map_err(vorbis_error)?;
    }

    Ok(output)
}

#[cfg(not(feature = "ogg"))]
fn encode_ogg(_samples: &[f32], _sample_rate: u32, _channels: u16) -> Result<Vec<u8>> {
    Err(StudioError::EncodingError(
        "OGG output requires the `ogg` feature".into(),
    ))
}

fn encode_mp3(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let wav = encode_wav(samples, sample_rate, channels)?;
    let ffmpeg = std::env::var(FFMPEG_ENV).unwrap_or_else(|_| "ffmpeg".to_string());

    let mut child = Command::new(&ffmpeg)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "wav",
            "-i",
            "pipe:0",
            "-codec:a",
            "libmp3lame",
            "-q:a",
            "2",
            "-f",
            "mp3",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StudioError::EncodingError(format!("Failed to start {}: {}", ffmpeg, e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| StudioError::EncodingError("ffmpeg stdin unavailable".into()))?;

    // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us
    let writer = std::thread::spawn(move || stdin.write_all(&wav));

    let output = child
        .wait_with_output()
        .map_err(|e| StudioError::EncodingError(format!("ffmpeg failed: {}", e)))?;

    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(StudioError::EncodingError(format!(
                "Failed to write to ffmpeg: {}",
                e
            )))
        }
        Err(_) => return Err(StudioError::EncodingError("ffmpeg writer panicked".into())),
    }

    if !output.status.success() {
        return Err(StudioError::EncodingError(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    if output.stdout.is_empty() {
        return Err(StudioError::EncodingError("ffmpeg produced no output".into()));
    }

    Ok(output.stdout)
}
