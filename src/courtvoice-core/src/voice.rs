//! Voice identities and utterances.
//!
//! The three debate opponents map to fixed ElevenLabs voice IDs and the
//! avatar numbers the backend expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SpeechError;

/// Opponent avatar whose voice speaks an utterance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VoiceIdentity {
    Berta,
    Andrew,
    Sophia,
}

impl VoiceIdentity {
    /// ElevenLabs voice ID for this avatar.
    pub fn voice_id(&self) -> &'static str {
        match self {
            VoiceIdentity::Berta => "KnTv6RLzB4khP0x7xem1",
            VoiceIdentity::Andrew => "WLOYW6YwyA4c6LBQKJ36",
            VoiceIdentity::Sophia => "l2xKdzGYYWPy0gKbjRXC",
        }
    }

    /// Numeric avatar identifier used by the synthesis backend.
    pub fn avatar_number(&self) -> u8 {
        match self {
            VoiceIdentity::Berta => 1,
            VoiceIdentity::Andrew => 2,
            VoiceIdentity::Sophia => 3,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            VoiceIdentity::Berta => "Berta",
            VoiceIdentity::Andrew => "Andrew",
            VoiceIdentity::Sophia => "Sophia",
        }
    }
}

impl fmt::Display for VoiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for VoiceIdentity {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "berta" => Ok(VoiceIdentity::Berta),
            "andrew" => Ok(VoiceIdentity::Andrew),
            "sophia" => Ok(VoiceIdentity::Sophia),
            other => Err(SpeechError::UnknownVoice(other.to_string())),
        }
    }
}

/// Text plus the voice that should speak it. Immutable once playback starts.
#[derive(Debug, Clone)]
pub struct Utterance {
    text: String,
    voice: VoiceIdentity,
}

impl Utterance {
    /// Create an utterance, rejecting empty or whitespace-only text up front
    /// so no zero-word schedule can reach the engine.
    pub fn new(text: impl Into<String>, voice: VoiceIdentity) -> Result<Self, SpeechError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyUtterance);
        }
        Ok(Self { text, voice })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> VoiceIdentity {
        self.voice
    }

    /// Whitespace-separated tokens used for highlight addressing.
    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
