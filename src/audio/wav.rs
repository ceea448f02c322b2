use crate::audio::clip::AudioClip;
use crate::{Result, StudioError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Header facts of a WAV buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
}

fn open(bytes: &[u8]) -> Result<WavReader<Cursor<&[u8]>>> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| StudioError::DecodingError(format!("Failed to read WAV header: {}", e)))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(StudioError::DecodingError(format!(
            "Invalid WAV layout: {} Hz, {} channels",
            spec.sample_rate, spec.channels
        )));
    }

    Ok(reader)
}

/// Read the header of an in-memory WAV file without decoding samples
pub fn probe_wav(bytes: &[u8]) -> Result<WavInfo> {
    let reader = open(bytes)?;
    let spec = reader.spec();

    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration() as u64,
    })
}

/// Decode an in-memory WAV file to f32 samples in -1.0..=1.0
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    let mut reader = open(bytes)?;
    let spec = reader.spec();

    debug!(
        "Decoding WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let read_error =
        |e: hound::Error| StudioError::DecodingError(format!("Failed to read sample: {}", e));

    let samples: Result<Vec<f32>> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(read_error))
            .collect(),
        SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0, // 2^23
                32 => 2147483648.0,
                bits => {
                    return Err(StudioError::DecodingError(format!(
                        "Unsupported bit depth: {}",
                        bits
                    )));
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale).map_err(read_error))
                .collect()
        }
    };

    Ok(AudioClip::new(samples?, spec.sample_rate, spec.channels))
}

/// Encode f32 samples as 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| {
                StudioError::EncodingError(format!("Failed to create WAV writer: {}", e))
            })?;

        for &sample in samples {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| StudioError::EncodingError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| StudioError::EncodingError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_encode_decode_wav() {
        let sample_rate = 16000;
        let samples: Vec<f32> = (0..sample_rate as usize)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();

        let bytes = encode_wav(&samples, sample_rate, 1).unwrap();
        let clip = decode_wav(&bytes).unwrap();

        assert_eq!(clip.sample_rate, sample_rate);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.samples.len(), samples.len());

        // Some precision loss from the i16 conversion is expected
        for (original, read) in samples.iter().zip(clip.samples.iter()) {
            assert!((original - read).abs() < 0.001);
        }
    }

    #[test]
    fn test_probe_wav() {
        let bytes = encode_wav(&vec![0.0; 4800], 24000, 2).unwrap();
        let info = probe_wav(&bytes).unwrap();

        assert_eq!(
            info,
            WavInfo {
                sample_rate: 24000,
                channels: 2,
                frames: 2400
            }
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            probe_wav(b"definitely not RIFF"),
            Err(StudioError::DecodingError(_))
        ));
        assert!(decode_wav(&[]).is_err());
    }

    #[test]
    fn test_decode_float_wav() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.25f32).unwrap();
            writer.write_sample(-0.5f32).unwrap();
            writer.finalize().unwrap();
        }

        let clip = decode_wav(cursor.get_ref()).unwrap();
        assert_eq!(clip.samples, vec![0.25, -0.5]);
    }
}
