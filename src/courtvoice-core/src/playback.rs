//! Audio playback to speakers.
//!
//! cpal streams are not `Send`, so every playback runs on its own plain
//! thread and reports back through a [`PlaybackDriver`]. The thread polls the
//! driver's stop flag, which is how session teardown reaches the hardware.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::backend::{AudioClip, AudioPlayer, PlaybackDriver, PlaybackHandle, PlaybackOutcome};
use crate::error::SpeechError;

/// Plays remote MP3 clips on the default output device.
#[derive(Default)]
pub struct CpalPlayer;

impl CpalPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioPlayer for CpalPlayer {
    fn play(&self, clip: AudioClip) -> Result<PlaybackHandle, SpeechError> {
        let (handle, driver) = PlaybackHandle::channel();
        std::thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || match decode_mp3(clip.bytes()) {
                Ok((samples, sample_rate)) => play_samples(samples, sample_rate, driver),
                Err(reason) => driver.finish(PlaybackOutcome::Failed(reason)),
            })
            .map_err(|e| SpeechError::Playback(format!("failed to spawn playback thread: {e}")))?;
        Ok(handle)
    }
}

/// Play mono f32 samples, polling the driver's stop flag throughout. Must be
/// called from a thread that can block; consumes the driver on every path.
pub(crate) fn play_samples(samples: Vec<f32>, sample_rate: u32, driver: PlaybackDriver) {
    if samples.is_empty() {
        driver.finish(PlaybackOutcome::Finished);
        return;
    }

    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        driver.finish(PlaybackOutcome::Failed(
            "no output device available".to_string(),
        ));
        return;
    };

    let supported = match device.supported_output_configs() {
        Ok(mut configs) => configs.find(|c| {
            (c.channels() == 1 || c.channels() == 2)
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        }),
        Err(e) => {
            driver.finish(PlaybackOutcome::Failed(e.to_string()));
            return;
        }
    };
    let Some(supported) = supported else {
        driver.finish(PlaybackOutcome::Failed(
            "no suitable output config found".to_string(),
        ));
        return;
    };

    let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        samples = samples.len(),
        "starting playback"
    );

    let total = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(AtomicBool::new(false));
    let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let stream = device.build_output_stream(
        &config,
        {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let drained = Arc::clone(&drained);
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = if pos < samples.len() {
                        let s = samples[pos];
                        pos += 1;
                        s
                    } else {
                        drained.store(true, Ordering::Relaxed);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
                position.store(pos, Ordering::Relaxed);
            }
        },
        {
            let failure = Arc::clone(&failure);
            move |err| {
                *failure.lock().expect("playback failure lock poisoned") = Some(err.to_string());
            }
        },
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            driver.finish(PlaybackOutcome::Failed(e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        driver.finish(PlaybackOutcome::Failed(e.to_string()));
        return;
    }

    // The stream callback cannot tell us when the hardware actually falls
    // silent, so bound the wait by the clip length plus slack.
    let duration_ms = total as u64 * 1000 / u64::from(sample_rate);
    let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

    let outcome = loop {
        if driver.should_stop() {
            break PlaybackOutcome::Stopped;
        }
        if let Some(reason) = failure
            .lock()
            .expect("playback failure lock poisoned")
            .take()
        {
            break PlaybackOutcome::Failed(reason);
        }
        if drained.load(Ordering::Relaxed) || Instant::now() > deadline {
            break PlaybackOutcome::Finished;
        }
        std::thread::sleep(Duration::from_millis(25));
    };

    if outcome == PlaybackOutcome::Finished {
        // Let the buffered tail play out before tearing the stream down.
        std::thread::sleep(Duration::from_millis(100));
    }
    drop(stream);
    tracing::debug!(?outcome, "playback ended");
    driver.finish(outcome);
}

/// Decode MP3 bytes to mono f32 samples plus the stream's sample rate.
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32), String> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                }
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(format!("MP3 decode error: {e}")),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err("MP3 payload contained no audio".to_string());
    }
    Ok((samples, sample_rate))
}
