//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::SpeechError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub native_voices: NativeVoicesConfig,
}

/// Remote synthesis backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Base URL of the game backend exposing `/text-to-speech` and
    /// `/get-counterargument`.
    pub endpoint: String,
    /// ElevenLabs model version forwarded to the backend.
    pub model_version: String,
    /// Upper bound on the remote synthesis request. The backend imposes no
    /// timeout of its own, so an unbounded request would stall the turn.
    pub request_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            model_version: "eleven_multilingual_v2".to_string(),
            request_timeout_secs: 8,
        }
    }
}

/// Timing parameters for the word-highlight schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Assumed speaking rate used to pace highlights.
    pub words_per_minute: f64,
    /// Multiplier applied to the base rate for remote and silent playback.
    pub rate_multiplier: f64,
    /// Speaking rate for local synthesis, also applied to its highlight pace.
    pub native_rate: f64,
    /// Pitch passed to local synthesis.
    pub pitch: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 150.0,
            rate_multiplier: 1.0,
            native_rate: 0.85,
            pitch: 1.0,
        }
    }
}

impl SpeechConfig {
    /// Interval between highlight ticks for remote or silent playback.
    pub fn ms_per_word(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.words_per_minute * self.rate_multiplier))
    }

    /// Interval between highlight ticks for local synthesis.
    pub fn native_ms_per_word(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.words_per_minute * self.native_rate))
    }
}

/// Kokoro voice assigned to each avatar for local synthesis.
#[derive(Debug, Clone, Deserialize)]
pub struct NativeVoicesConfig {
    pub berta: String,
    pub andrew: String,
    pub sophia: String,
}

impl Default for NativeVoicesConfig {
    fn default() -> Self {
        Self {
            berta: "bf_emma".to_string(),
            andrew: "bm_george".to_string(),
            sophia: "af_sky".to_string(),
        }
    }
}

impl NativeVoicesConfig {
    pub fn for_identity(&self, voice: crate::voice::VoiceIdentity) -> &str {
        match voice {
            crate::voice::VoiceIdentity::Berta => &self.berta,
            crate::voice::VoiceIdentity::Andrew => &self.andrew,
            crate::voice::VoiceIdentity::Sophia => &self.sophia,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SpeechError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| SpeechError::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SpeechError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, SpeechError> {
        toml::from_str(content)
            .map_err(|e| SpeechError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis.request_timeout_secs)
    }
}
