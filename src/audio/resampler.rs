use crate::{Result, StudioError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Frames per channel handed to rubato per call
const CHUNK_FRAMES: usize = 1024;

/// Sample rate converter for whole clips
///
/// Each call to [`AudioResampler::resample`] treats its input as a complete
/// clip: the filter delay is compensated and the output is exactly
/// `round(frames * output_rate / input_rate)` frames long, so durations stay
/// predictable when clips from different rates are stitched together.
pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
}

impl AudioResampler {
    /// Create a new audio resampler
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate
    /// * `output_rate` - Output sample rate
    /// * `channels` - Number of audio channels
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(StudioError::AudioProcessingError(
                "Sample rates must be greater than 0".into(),
            ));
        }

        if channels == 0 {
            return Err(StudioError::AudioProcessingError(
                "Number of channels must be greater than 0".into(),
            ));
        }

        let resample_ratio = output_rate as f64 / input_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            resample_ratio,
            2.0,
            params,
            CHUNK_FRAMES,
            channels as usize,
        )
        .map_err(|e| {
            StudioError::AudioProcessingError(format!("Failed to create resampler: {}", e))
        })?;

        debug!(
            "Created resampler: {} Hz -> {} Hz, {} channels",
            input_rate, output_rate, channels
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels: channels as usize,
        })
    }

    /// Resample one clip of interleaved samples
    pub fn resample(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        self.resampler.reset();

        let total_frames = input.len() / self.channels;
        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let expected_frames = (total_frames as f64 * ratio).round() as usize;
        let delay = self.resampler.output_delay();
        let needed = delay + expected_frames;

        let mut planar_out: Vec<Vec<f32>> =
            vec![Vec::with_capacity(needed + self.resampler.output_frames_max()); self.channels];

        // Keep feeding (zero padded past the end of the clip) until the
        // delayed tail has been flushed out of the filter
        let mut frame_offset = 0;
        while planar_out[0].len() < needed {
            let chunk_size = self.resampler.input_frames_next();
            let frames_to_read = total_frames.saturating_sub(frame_offset).min(chunk_size);

            let mut input_planar = vec![vec![0.0f32; chunk_size]; self.channels];
            for frame_idx in 0..frames_to_read {
                let src_idx = (frame_offset + frame_idx) * self.channels;
                for (ch_idx, channel) in input_planar.iter_mut().enumerate() {
                    channel[frame_idx] = input[src_idx + ch_idx];
                }
            }
            frame_offset += frames_to_read;

            let output_planar = self.resampler.process(&input_planar, None).map_err(|e| {
                StudioError::AudioProcessingError(format!("Resampling failed: {}", e))
            })?;

            for (channel, produced) in planar_out.iter_mut().zip(output_planar) {
                channel.extend(produced);
            }
        }

        let mut output = Vec::with_capacity(expected_frames * self.channels);
        for frame_idx in delay..needed {
            for channel in &planar_out {
                output.push(channel[frame_idx]);
            }
        }

        debug!("Resampled {} frames -> {} frames", total_frames, expected_frames);

        Ok(output)
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Helper function to resample audio in one step
pub fn resample_audio(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
    channels: u16,
) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let mut resampler = AudioResampler::new(input_rate, output_rate, channels)?;
    resampler.resample(input)
}
