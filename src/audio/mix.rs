//! Sample-level helpers used while assembling a production

use std::f32::consts::FRAC_PI_2;

/// Number of frames covering `ms` milliseconds at `sample_rate`
pub fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    ((ms as u128 * sample_rate as u128) / 1000) as usize
}

/// Interleaved silence of the given length
pub fn silence(frames: usize, channels: u16) -> Vec<f32> {
    vec![0.0; frames * channels as usize]
}

/// Convert interleaved audio between channel layouts
///
/// Downmixing averages each frame to mono first; upmixing duplicates the mono
/// signal into every output channel.
pub fn convert_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let mono: Vec<f32> = if from == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks(from as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    if to == 1 {
        return mono;
    }

    let mut output = Vec::with_capacity(mono.len() * to as usize);
    for sample in mono {
        output.extend(std::iter::repeat(sample).take(to as usize));
    }
    output
}

/// Scale audio so its peak amplitude equals `target_peak`
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) {
    let peak = samples
        .iter()
        .map(|&s| s.abs())
        .fold(0.0f32, |max, val| max.max(val));

    if peak == 0.0 || peak.is_nan() {
        return;
    }

    let gain = target_peak / peak;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Append `next` to `buffer`, overlapping the last `overlap_frames` frames
/// with an equal-power crossfade
///
/// The overlap is clamped to the shorter of the two clips, so the result is
/// always `len(buffer) + len(next) - overlap` frames long.
pub fn crossfade_append(buffer: &mut Vec<f32>, next: &[f32], overlap_frames: usize, channels: u16) {
    let channels = channels.max(1) as usize;
    let buffer_frames = buffer.len() / channels;
    let next_frames = next.len() / channels;
    let overlap = overlap_frames.min(buffer_frames).min(next_frames);

    if overlap == 0 {
        buffer.extend_from_slice(next);
        return;
    }

    let start = (buffer_frames - overlap) * channels;
    for frame in 0..overlap {
        // Equal power: fade_out^2 + fade_in^2 == 1 across the overlap
        let t = (frame as f32 + 0.5) / overlap as f32;
        let fade_in = (t * FRAC_PI_2).sin();
        let fade_out = (t * FRAC_PI_2).cos();

        for ch in 0..channels {
            let idx = frame * channels + ch;
            let mixed = &mut buffer[start + idx];
            *mixed = *mixed * fade_out + next[idx] * fade_in;
        }
    }

    buffer.extend_from_slice(&next[overlap * channels..]);
}
