//! Configuration for a production run
//!
//! `ProductionConfig` is threaded explicitly through every stage. A
//! `StudioConfig` wraps it together with the backend location and a default
//! voice map, and can be loaded from a TOML file with environment overrides.

use crate::audio::{OutputFormat, StitchOptions};
use crate::script::SpeakerVoiceMap;
use crate::speech::http::DEFAULT_MODEL;
use crate::speech::SynthesisConfig;
use crate::text::ChunkLimits;
use crate::{StudioError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment variable selecting a backend profile
pub const BACKEND_PROFILE_ENV: &str = "TTS_BACKEND";

/// Environment variable overriding the backend base URL
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8880";

/// Chunking and crossfade presets for known TTS engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    pub name: &'static str,
    pub max_words: usize,
    pub target_words: usize,
    pub max_chars: usize,
    pub crossfade_ms: u64,
}

pub const PROFILES: &[BackendProfile] = &[
    BackendProfile {
        name: "kokoro",
        max_words: 200,
        target_words: 100,
        max_chars: 1200,
        crossfade_ms: 30,
    },
    BackendProfile {
        name: "voxcpm",
        max_words: 150,
        target_words: 75,
        max_chars: 800,
        crossfade_ms: 50,
    },
    BackendProfile {
        name: "vibevoice",
        max_words: 100,
        target_words: 50,
        max_chars: 500,
        crossfade_ms: 100,
    },
    BackendProfile {
        name: "elevenlabs",
        max_words: 75,
        target_words: 50,
        max_chars: 300,
        crossfade_ms: 50,
    },
    BackendProfile {
        name: "openai",
        max_words: 1000,
        target_words: 500,
        max_chars: 4096,
        crossfade_ms: 50,
    },
    BackendProfile {
        name: "coqui",
        max_words: 200,
        target_words: 100,
        max_chars: 800,
        crossfade_ms: 50,
    },
    BackendProfile {
        name: "generic",
        max_words: 250,
        target_words: 125,
        max_chars: 1000,
        crossfade_ms: 50,
    },
];

impl BackendProfile {
    /// Look up a profile by name (case-insensitive)
    pub fn by_name(name: &str) -> Option<&'static BackendProfile> {
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Settings for one production run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Hard word ceiling per backend call
    pub max_words: usize,

    /// Preferred words per chunk
    pub target_words: usize,

    /// Hard character ceiling per backend call
    pub max_chars: usize,

    /// Silence between lines
    pub speaker_gap_ms: u64,

    /// Overlap between chunks of one line
    pub crossfade_ms: u64,

    pub output_format: OutputFormat,

    /// Working sample rate; taken from the first chunk when unset
    pub sample_rate: Option<u32>,

    pub channels: u16,

    /// Peak-normalize each chunk
    pub normalize: bool,

    /// Base seed; line `n` is synthesized with `seed + n`
    pub seed: Option<u64>,

    pub synthesis: SynthesisConfig,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            max_words: 250,
            target_words: 125,
            max_chars: 1000,
            speaker_gap_ms: 100,
            crossfade_ms: 50,
            output_format: OutputFormat::default(),
            sample_rate: None,
            channels: 1,
            normalize: false,
            seed: None,
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl ProductionConfig {
    /// Take chunk limits and crossfade from a backend profile
    pub fn with_profile(mut self, profile: &BackendProfile) -> Self {
        self.max_words = profile.max_words;
        self.target_words = profile.target_words;
        self.max_chars = profile.max_chars;
        self.crossfade_ms = profile.crossfade_ms;
        self
    }

    pub fn with_limits(mut self, max_words: usize, target_words: usize) -> Self {
        self.max_words = max_words;
        self.target_words = target_words;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

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

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_words == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_words must be at least 1".to_string(),
            ));
        }

        if self.target_words > self.max_words {
            return Err(ValidationError::InvalidConfig(format!(
                "target_words ({}) exceeds max_words ({})",
                self.target_words, self.max_words
            )));
        }

        if self.max_chars == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_chars must be at least 1".to_string(),
            ));
        }

        if self.channels == 0 {
            return Err(ValidationError::InvalidConfig(
                "channels must be at least 1".to_string(),
            ));
        }

        if self.sample_rate == Some(0) {
            return Err(ValidationError::InvalidConfig(
                "sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.synthesis.timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig(
                "synthesis timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn limits(&self) -> ChunkLimits {
        ChunkLimits::new(self.max_words, self.target_words).with_max_chars(self.max_chars)
    }

    /// Seed for one line, if seeding is enabled
    pub fn line_seed(&self, order_index: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(order_index as u64))
    }

    pub fn stitch_options(&self) -> StitchOptions {
        StitchOptions::default()
            .with_speaker_gap_ms(self.speaker_gap_ms)
            .with_crossfade_ms(self.crossfade_ms)
            .with_output_format(self.output_format)
            .with_sample_rate(self.sample_rate)
            .with_channels(self.channels)
            .with_normalize(self.normalize)
    }
}

/// Where the TTS backend lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,

    /// Name of a [`BackendProfile`]; overrides chunk limits and crossfade
    pub profile: Option<String>,

    pub model: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            profile: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Top-level configuration file
///
/// ```toml
/// [backend]
/// url = "http://localhost:8880"
/// profile = "kokoro"
///
/// [production]
/// output_format = "wav"
/// speaker_gap_ms = 150
///
/// [voices]
/// Alice = "af_bella"
/// Bob = "am_adam"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub backend: BackendSettings,
    pub production: ProductionConfig,
    pub voices: SpeakerVoiceMap,
}

impl StudioConfig {
    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { error, .. } => ConfigError::ParseError {
                path: path.display().to_string(),
                error,
            },
            other => other,
        })?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StudioConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: "<inline>".to_string(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `TTS_BACKEND` and `BACKEND_URL` from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(profile) = lookup(BACKEND_PROFILE_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("{} selects profile {}", BACKEND_PROFILE_ENV, profile);
            self.backend.profile = Some(profile.trim().to_string());
        }

        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("{} points to {}", BACKEND_URL_ENV, url);
            self.backend.url = url.trim().to_string();
        }

        self.validate()
    }

    /// Selected backend profile, if any
    pub fn profile(&self) -> Result<Option<&'static BackendProfile>, ConfigError> {
        match &self.backend.profile {
            None => Ok(None),
            Some(name) => BackendProfile::by_name(name)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownProfile(name.clone())),
        }
    }

    /// Production settings with the backend profile applied
    pub fn production_config(&self) -> Result<ProductionConfig, ConfigError> {
        let production = match self.profile()? {
            Some(profile) => self.production.clone().with_profile(profile),
            None => self.production.clone(),
        };

        production
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(production)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend url must not be empty".to_string(),
            ));
        }

        self.profile()?;
        Ok(())
    }
}

/// Errors that can occur when loading or validating configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {error}")]
    IoError { path: String, error: String },

    #[error("Failed to parse config '{path}': {error}")]
    ParseError { path: String, error: String },

    /// Profile name not in [`PROFILES`]
    #[error("Unknown backend profile '{0}' (known: {})", known_profiles())]
    UnknownProfile(String),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

fn known_profiles() -> String {
    PROFILES.iter().map(|p| p.name).collect::<Vec<_>>().join(", ")
}

impl From<ConfigError> for StudioError {
    fn from(e: ConfigError) -> Self {
        StudioError::ConfigError(e.to_string())
    }
}
