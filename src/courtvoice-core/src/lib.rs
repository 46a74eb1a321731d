//! Courtvoice Core Library
//!
//! Speech playback and word-highlight synchronization for the debate game:
//! backend selection with silent fallback, the fixed-interval highlight
//! scheduler, and session lifecycle management.

pub mod backend;
pub mod config;
pub mod elevenlabs;
pub mod engine;
pub mod error;
pub mod kokoro;
pub mod opponent;
pub mod playback;
pub mod session;
pub mod voice;

pub use backend::{
    AudioClip, AudioPlayer, Backend, LogObserver, NativeSpeechRequest, NativeSynthesizer,
    PlaybackHandle, PlaybackOutcome, RemoteSynthesizer, SynthesisObserver,
};
pub use config::Config;
pub use elevenlabs::ElevenLabsClient;
pub use engine::SpeechEngine;
pub use error::SpeechError;
pub use kokoro::KokoroNative;
pub use opponent::{DebateSide, Difficulty, OpponentClient};
pub use playback::CpalPlayer;
pub use session::{SessionCallbacks, SessionHandle, SessionState, SpeakerRole};
pub use voice::{Utterance, VoiceIdentity};
