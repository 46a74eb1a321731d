//! Error types for the speech engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("utterance text is empty")]
    EmptyUtterance,

    #[error("unknown voice identity: {0}")]
    UnknownVoice(String),

    #[error("remote synthesis failed: {0}")]
    RemoteSynthesis(String),

    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error("opponent service error: {0}")]
    Opponent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
