//! Audio handling: WAV decoding, resampling, mixing, stitching and encoding

pub mod clip;
pub mod encode;
pub mod mix;
pub mod resampler;
pub mod stitch;
pub mod wav;

pub use clip::AudioClip;
pub use encode::{encode, OutputFormat, FFMPEG_ENV};
pub use resampler::{resample_audio, AudioResampler};
pub use stitch::{
    stitch, StitchOptions, Stitcher, DEFAULT_SAMPLE_RATE, FAILED_LINE_PLACEHOLDER_MS,
};
pub use wav::{decode_wav, encode_wav, probe_wav, WavInfo};
