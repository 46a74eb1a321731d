//! Local speech synthesis via kokoro-tiny.
//!
//! The kokoro engine is initialized once on a dedicated worker thread (first
//! run downloads the model) and never crosses threads afterwards. Jobs arrive
//! over a channel; readiness is published through a watch so the capability
//! check stays cheap.

use std::sync::mpsc;
use std::thread;

use kokoro_tiny::TtsEngine;
use tokio::sync::watch;

use crate::backend::{
    NativeSpeechRequest, NativeSynthesizer, PlaybackDriver, PlaybackHandle, PlaybackOutcome,
};
use crate::config::NativeVoicesConfig;
use crate::error::SpeechError;
use crate::playback::play_samples;

/// Kokoro output sample rate.
const SAMPLE_RATE: u32 = 24_000;
/// Kokoro clips long inputs, so synthesize in sentence chunks of this size.
const MAX_CHUNK_CHARS: usize = 200;
/// 0.3s of silence between chunks so words are not cut off at the seams.
const CHUNK_PAUSE_SAMPLES: usize = 7_200;
/// 0.5s tail so the final word is not clipped.
const TRAILING_PAD_SAMPLES: usize = 12_000;

struct SpeakJob {
    text: String,
    voice_id: String,
    rate: f32,
    driver: PlaybackDriver,
}

/// Local synthesis provider backed by a kokoro worker thread.
pub struct KokoroNative {
    jobs: mpsc::Sender<SpeakJob>,
    ready: watch::Receiver<Option<bool>>,
    voices: NativeVoicesConfig,
}

impl KokoroNative {
    /// Spawn the synthesis worker. `is_available` reports false until the
    /// model has loaded, and permanently if loading fails.
    pub fn spawn(voices: NativeVoicesConfig) -> Result<Self, SpeechError> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<SpeakJob>();
        let (ready_tx, ready_rx) = watch::channel(None);

        thread::Builder::new()
            .name("kokoro-tts".to_string())
            .spawn(move || worker(jobs_rx, ready_tx))
            .map_err(|e| {
                SpeechError::SynthesisUnavailable(format!("failed to spawn worker: {e}"))
            })?;

        Ok(Self {
            jobs: jobs_tx,
            ready: ready_rx,
            voices,
        })
    }

    /// Wait for the worker to finish initializing; true if it is usable.
    pub async fn ready(&self) -> bool {
        let mut rx = self.ready.clone();
        match rx.wait_for(|v| v.is_some()).await {
            Ok(value) => matches!(*value, Some(true)),
            Err(_) => false,
        }
    }
}

impl NativeSynthesizer for KokoroNative {
    fn is_available(&self) -> bool {
        matches!(*self.ready.borrow(), Some(true))
    }

    fn speak(&self, request: NativeSpeechRequest) -> Result<PlaybackHandle, SpeechError> {
        if !self.is_available() {
            return Err(SpeechError::SynthesisUnavailable(
                "kokoro engine not ready".to_string(),
            ));
        }
        let (handle, driver) = PlaybackHandle::channel();
        let job = SpeakJob {
            text: request.text,
            voice_id: self.voices.for_identity(request.voice).to_string(),
            // Kokoro has no pitch control; only the rate is honored.
            rate: request.rate,
            driver,
        };
        self.jobs.send(job).map_err(|_| {
            SpeechError::SynthesisUnavailable("synthesis worker exited".to_string())
        })?;
        Ok(handle)
    }
}

fn worker(jobs: mpsc::Receiver<SpeakJob>, ready: watch::Sender<Option<bool>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build kokoro worker runtime");
            let _ = ready.send(Some(false));
            return;
        }
    };

    let mut engine = match runtime.block_on(TtsEngine::new()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!(error = %e, "kokoro initialization failed");
            let _ = ready.send(Some(false));
            return;
        }
    };
    let known_voices = engine.voices();
    tracing::debug!(voices = known_voices.len(), "kokoro engine ready");
    let _ = ready.send(Some(true));

    while let Ok(job) = jobs.recv() {
        if job.driver.should_stop() {
            job.driver.finish(PlaybackOutcome::Stopped);
            continue;
        }
        if !known_voices.contains(&job.voice_id) {
            job.driver.finish(PlaybackOutcome::Failed(format!(
                "unknown kokoro voice '{}'",
                job.voice_id
            )));
            continue;
        }
        match synthesize_text(&mut engine, &job.text, &job.voice_id, &job.driver) {
            Ok(Some(samples)) => {
                let samples = adjust_speed(samples, job.rate);
                play_samples(samples, SAMPLE_RATE, job.driver);
            }
            Ok(None) => job.driver.finish(PlaybackOutcome::Stopped),
            Err(reason) => job.driver.finish(PlaybackOutcome::Failed(reason)),
        }
    }
}

/// Synthesize the whole text chunk by chunk. Returns `None` if the session
/// was stopped mid-synthesis.
fn synthesize_text(
    engine: &mut TtsEngine,
    text: &str,
    voice_id: &str,
    driver: &PlaybackDriver,
) -> Result<Option<Vec<f32>>, String> {
    let mut all_samples = Vec::new();

    for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
        if driver.should_stop() {
            return Ok(None);
        }
        if chunk.trim().is_empty() {
            continue;
        }
        let samples = engine
            .synthesize(&chunk, Some(voice_id))
            .map_err(|e| format!("synthesis failed: {}", e))?;
        all_samples.extend(samples);
        all_samples.extend(std::iter::repeat(0.0).take(CHUNK_PAUSE_SAMPLES));
    }

    all_samples.extend(std::iter::repeat(0.0).take(TRAILING_PAD_SAMPLES));
    Ok(Some(all_samples))
}

/// Split text into synthesis-safe chunks, preferring sentence boundaries and
/// falling back to commas for run-on sentences.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        current.clear();
    };

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current.len() + sentence.len() > max_chars {
            flush(&mut current, &mut chunks);

            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current.len() + part.len() > max_chars {
                        flush(&mut current, &mut chunks);
                    }
                    current.push_str(part);
                    current.push(' ');
                }
                continue;
            }
        }

        current.push_str(sentence);
        current.push(' ');
    }

    flush(&mut current, &mut chunks);
    chunks
}

/// Resample by linear interpolation to change playback speed. Rate below 1.0
/// stretches the audio (slower speech), above 1.0 compresses it.
fn adjust_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 {
        return samples;
    }

    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}
