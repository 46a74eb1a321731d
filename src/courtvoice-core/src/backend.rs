//! Audio backend abstractions.
//!
//! The engine never touches the network or audio hardware directly; it talks
//! to these traits so tests can inject fakes. Real implementations live in
//! [`crate::elevenlabs`], [`crate::kokoro`], and [`crate::playback`].

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

use crate::error::SpeechError;
use crate::voice::VoiceIdentity;

/// Audio-production strategy selected for one session. Chosen once at
/// session start; never changes mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Remote synthesis succeeded; playing its audio.
    Remote,
    /// Local synthesis is producing the audio.
    Native,
    /// No audio path available; the highlight schedule alone drives the turn.
    Silent,
}

/// Opaque synthesized audio payload (MP3 bytes from the backend).
#[derive(Debug, Clone)]
pub struct AudioClip {
    bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// How one playback attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Audio ran to its natural end.
    Finished,
    /// Stopped through the handle before finishing.
    Stopped,
    /// Playback started but failed partway through.
    Failed(String),
}

/// Caller side of one playback attempt: a stop control plus the awaitable
/// outcome. Stopping is synchronous and idempotent.
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    pub(crate) outcome: oneshot::Receiver<PlaybackOutcome>,
}

/// Producer side handed to whatever thread or task drives the audio. It must
/// poll [`PlaybackDriver::should_stop`] and call [`PlaybackDriver::finish`]
/// exactly once on every exit path.
pub struct PlaybackDriver {
    stop: Arc<AtomicBool>,
    outcome: Option<oneshot::Sender<PlaybackOutcome>>,
}

impl PlaybackHandle {
    pub fn channel() -> (PlaybackHandle, PlaybackDriver) {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        (
            PlaybackHandle {
                stop: Arc::clone(&stop),
                outcome: rx,
            },
            PlaybackDriver {
                stop,
                outcome: Some(tx),
            },
        )
    }

    /// Request the audio stop. Safe to call from any thread, any number of
    /// times; the driver reports [`PlaybackOutcome::Stopped`] once it notices.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Detached stop control usable after the handle itself is consumed.
    pub fn stopper(&self) -> PlaybackStopper {
        PlaybackStopper {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Wait for the playback outcome. A dropped driver counts as a failure.
    pub async fn finished(self) -> PlaybackOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| PlaybackOutcome::Failed("playback driver dropped".to_string()))
    }
}

/// Cloneable stop control detached from a [`PlaybackHandle`].
#[derive(Clone)]
pub struct PlaybackStopper {
    stop: Arc<AtomicBool>,
}

impl PlaybackStopper {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl PlaybackDriver {
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Report the outcome. The receiver may already be gone (session torn
    /// down); that is not an error.
    pub fn finish(mut self, outcome: PlaybackOutcome) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Remote text-to-speech endpoint. Single attempt, no retries; any failure
/// makes the engine degrade to the next backend.
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: VoiceIdentity,
    ) -> Result<AudioClip, SpeechError>;
}

/// Parameters for one local synthesis run.
#[derive(Debug, Clone)]
pub struct NativeSpeechRequest {
    pub text: String,
    pub voice: VoiceIdentity,
    pub rate: f32,
    pub pitch: f32,
}

/// Platform-local speech synthesis. Availability can vary by runtime
/// environment, so the engine checks before speaking.
pub trait NativeSynthesizer: Send + Sync {
    fn is_available(&self) -> bool;

    fn speak(&self, request: NativeSpeechRequest) -> Result<PlaybackHandle, SpeechError>;
}

/// Plays an opaque audio clip to the speakers.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, clip: AudioClip) -> Result<PlaybackHandle, SpeechError>;
}

/// Hook for counting the failures the fallback chain swallows. The chain is
/// deliberately silent toward the UI, so operators watching for a systemic
/// remote-synthesis outage need this side channel.
pub trait SynthesisObserver: Send + Sync {
    fn remote_synthesis_failed(&self, _reason: &str) {}

    fn native_synthesis_unavailable(&self) {}

    fn backend_selected(&self, _backend: Backend) {}
}

/// Default observer that reports through `tracing`.
pub struct LogObserver;

impl SynthesisObserver for LogObserver {
    fn remote_synthesis_failed(&self, reason: &str) {
        tracing::warn!(reason, "remote synthesis failed, degrading");
    }

    fn native_synthesis_unavailable(&self) {
        tracing::warn!("native synthesis unavailable, degrading to silent schedule");
    }

    fn backend_selected(&self, backend: Backend) {
        tracing::debug!(?backend, "playback backend selected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_playback_handle_reports_outcome() {
        let (handle, driver) = PlaybackHandle::channel();
        driver.finish(PlaybackOutcome::Finished);
        assert_eq!(handle.finished().await, PlaybackOutcome::Finished);
    }

    #[tokio::test]
    async fn test_stop_visible_to_driver() {
        let (handle, driver) = PlaybackHandle::channel();
        assert!(!driver.should_stop());
        handle.stop();
        handle.stop();
        assert!(driver.should_stop());
    }

    #[tokio::test]
    async fn test_stopper_outlives_handle() {
        let (handle, driver) = PlaybackHandle::channel();
        let stopper = handle.stopper();
        drop(handle);
        stopper.stop();
        assert!(driver.should_stop());
    }

    #[tokio::test]
    async fn test_dropped_driver_is_a_failure() {
        let (handle, driver) = PlaybackHandle::channel();
        drop(driver);
        match handle.finished().await {
            PlaybackOutcome::Failed(_) => {}
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
