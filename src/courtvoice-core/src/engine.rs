//! Speech playback and highlight synchronization.
//!
//! `SpeechEngine` turns an [`Utterance`] into audible speech plus a stream of
//! word-highlight callbacks. Audio comes from the first backend in the chain
//! that works: remote synthesis, then local synthesis, then no audio at all.
//! Whichever backend is chosen, the caller always gets highlights in order
//! followed by exactly one completion or error signal, so the surrounding
//! game flow can always reach its end-of-turn state.
//!
//! Word boundaries are not reported by any backend, so highlights advance on
//! a fixed interval derived from an assumed speaking rate. The pace can drift
//! from the true audio position on long utterances; the audio `ended` signal
//! is authoritative and force-completes the schedule when it fires first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::backend::{
    AudioPlayer, Backend, LogObserver, NativeSpeechRequest, NativeSynthesizer, PlaybackHandle,
    PlaybackOutcome, RemoteSynthesizer, SynthesisObserver,
};
use crate::config::{Config, SpeechConfig};
use crate::error::SpeechError;
use crate::session::{SessionCallbacks, SessionHandle, SessionShared, SpeakerRole};
use crate::voice::Utterance;

/// Synchronizes speech audio with per-word highlight callbacks.
///
/// Holds at most one active session per [`SpeakerRole`]; starting a new one
/// tears the previous one down synchronously before any new side effect.
/// Must be used from within a tokio runtime.
pub struct SpeechEngine {
    remote: Arc<dyn RemoteSynthesizer>,
    native: Arc<dyn NativeSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    observer: Arc<dyn SynthesisObserver>,
    speech: SpeechConfig,
    request_timeout: Duration,
    active: Mutex<HashMap<SpeakerRole, ActiveSession>>,
}

struct ActiveSession {
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    /// Full synchronous teardown: silence callbacks, stop audio, kill the
    /// task. Nothing from this session runs after this returns.
    fn teardown(self) {
        self.shared.cancel();
        self.task.abort();
    }
}

impl SpeechEngine {
    pub fn new(
        remote: Arc<dyn RemoteSynthesizer>,
        native: Arc<dyn NativeSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        config: &Config,
    ) -> Self {
        Self {
            remote,
            native,
            player,
            observer: Arc::new(LogObserver),
            speech: config.speech.clone(),
            request_timeout: config.request_timeout(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn SynthesisObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start speaking `utterance` for `role`, superseding any session already
    /// active for that role. The superseded session's callbacks never fire.
    pub fn speak(
        &self,
        role: SpeakerRole,
        utterance: Utterance,
        callbacks: SessionCallbacks,
    ) -> SessionHandle {
        let shared = Arc::new(SessionShared::new(callbacks));

        let mut active = self.active.lock().expect("active session lock poisoned");
        if let Some(previous) = active.remove(&role) {
            tracing::debug!(?role, "superseding active session");
            previous.teardown();
        }

        let task = tokio::spawn(run_session(
            Arc::clone(&shared),
            Arc::clone(&self.remote),
            Arc::clone(&self.native),
            Arc::clone(&self.player),
            Arc::clone(&self.observer),
            self.speech.clone(),
            self.request_timeout,
            utterance,
        ));
        active.insert(
            role,
            ActiveSession {
                shared: Arc::clone(&shared),
                task,
            },
        );

        SessionHandle::new(shared, role)
    }

    /// Cancel the active session for `role`, if any. No-op otherwise.
    pub fn cancel(&self, role: SpeakerRole) {
        let session = self
            .active
            .lock()
            .expect("active session lock poisoned")
            .remove(&role);
        if let Some(session) = session {
            session.teardown();
        }
    }

    /// Handle for the session currently registered for `role`.
    pub fn session(&self, role: SpeakerRole) -> Option<SessionHandle> {
        self.active
            .lock()
            .expect("active session lock poisoned")
            .get(&role)
            .map(|s| SessionHandle::new(Arc::clone(&s.shared), role))
    }
}

impl Drop for SpeechEngine {
    fn drop(&mut self) {
        let mut active = self.active.lock().expect("active session lock poisoned");
        for (_, session) in active.drain() {
            session.teardown();
        }
    }
}

/// One complete speak-and-highlight lifecycle, run as a spawned task.
#[allow(clippy::too_many_arguments)]
async fn run_session(
    shared: Arc<SessionShared>,
    remote: Arc<dyn RemoteSynthesizer>,
    native: Arc<dyn NativeSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    observer: Arc<dyn SynthesisObserver>,
    speech: SpeechConfig,
    request_timeout: Duration,
    utterance: Utterance,
) {
    let word_count = utterance.word_count();

    // Backend selection. Failures here degrade silently; the caller is never
    // told remote synthesis fell over, only the observer is.
    let mut playback: Option<PlaybackHandle> = None;
    let mut backend = Backend::Remote;

    let request = remote.synthesize(utterance.text(), utterance.voice());
    match time::timeout(request_timeout, request).await {
        Ok(Ok(clip)) if !clip.is_empty() => {
            tracing::debug!(bytes = clip.len(), "remote synthesis succeeded");
            match player.play(clip) {
                Ok(handle) => playback = Some(handle),
                Err(e) => observer.remote_synthesis_failed(&e.to_string()),
            }
        }
        Ok(Ok(_)) => observer.remote_synthesis_failed("empty audio payload"),
        Ok(Err(e)) => observer.remote_synthesis_failed(&e.to_string()),
        Err(_) => observer.remote_synthesis_failed("request timed out"),
    }

    if playback.is_none() {
        if native.is_available() {
            let request = NativeSpeechRequest {
                text: utterance.text().to_string(),
                voice: utterance.voice(),
                rate: speech.native_rate as f32,
                pitch: speech.pitch,
            };
            match native.speak(request) {
                Ok(handle) => {
                    playback = Some(handle);
                    backend = Backend::Native;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "native synthesis failed to start");
                    observer.native_synthesis_unavailable();
                    backend = Backend::Silent;
                }
            }
        } else {
            observer.native_synthesis_unavailable();
            backend = Backend::Silent;
        }
    }

    observer.backend_selected(backend);
    shared.start_playing(backend);

    let period = match backend {
        Backend::Native => speech.native_ms_per_word(),
        Backend::Remote | Backend::Silent => speech.ms_per_word(),
    };
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cancelled = shared.cancelled_watch();

    match playback {
        Some(mut handle) => {
            shared.store_stopper(handle.stopper());

            // The interval only paces highlights; the audio outcome decides
            // when the session ends. An early `ended` cancels remaining ticks.
            let mut next_word = 0usize;
            let outcome = loop {
                tokio::select! {
                    res = &mut handle.outcome => {
                        break res.unwrap_or_else(|_| {
                            PlaybackOutcome::Failed("playback driver dropped".to_string())
                        });
                    }
                    _ = cancelled.changed() => break PlaybackOutcome::Stopped,
                    _ = ticks.tick(), if next_word < word_count => {
                        shared.emit_highlight(next_word as isize);
                        next_word += 1;
                    }
                }
            };

            match outcome {
                PlaybackOutcome::Finished => shared.complete(),
                PlaybackOutcome::Stopped => shared.cancel(),
                PlaybackOutcome::Failed(reason) => {
                    shared.fail(SpeechError::Playback(reason));
                }
            }
        }
        None => {
            // Silent backend: the estimated schedule is the sole driver, so
            // the turn still ends deterministically with no audio hardware.
            for index in 0..word_count {
                tokio::select! {
                    _ = cancelled.changed() => return,
                    _ = ticks.tick() => shared.emit_highlight(index as isize),
                }
            }
            shared.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AudioClip;
    use crate::session::SessionState;
    use crate::voice::VoiceIdentity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum RemoteMode {
        Audio(usize),
        Empty,
        Fail,
        Hang,
    }

    struct FakeRemote {
        mode: RemoteMode,
    }

    #[async_trait]
    impl RemoteSynthesizer for FakeRemote {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: VoiceIdentity,
        ) -> Result<AudioClip, SpeechError> {
            match self.mode {
                RemoteMode::Audio(len) => Ok(AudioClip::new(vec![0u8; len])),
                RemoteMode::Empty => Ok(AudioClip::new(Vec::new())),
                RemoteMode::Fail => Err(SpeechError::RemoteSynthesis(
                    "status 503 Service Unavailable".to_string(),
                )),
                RemoteMode::Hang => {
                    time::sleep(Duration::from_secs(3600)).await;
                    Err(SpeechError::RemoteSynthesis("unreachable".to_string()))
                }
            }
        }
    }

    struct FakeNative {
        available: bool,
        duration: Duration,
        requests: Mutex<Vec<NativeSpeechRequest>>,
    }

    impl FakeNative {
        fn new(available: bool, duration: Duration) -> Self {
            Self {
                available,
                duration,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl NativeSynthesizer for FakeNative {
        fn is_available(&self) -> bool {
            self.available
        }

        fn speak(&self, request: NativeSpeechRequest) -> Result<PlaybackHandle, SpeechError> {
            self.requests.lock().unwrap().push(request);
            let (handle, driver) = PlaybackHandle::channel();
            let duration = self.duration;
            tokio::spawn(async move {
                time::sleep(duration).await;
                driver.finish(PlaybackOutcome::Finished);
            });
            Ok(handle)
        }
    }

    struct FakePlayer {
        duration: Duration,
        fail_after: Option<Duration>,
        fail_on_start: bool,
    }

    impl FakePlayer {
        fn finishing_after(duration: Duration) -> Self {
            Self {
                duration,
                fail_after: None,
                fail_on_start: false,
            }
        }

        fn failing_after(duration: Duration) -> Self {
            Self {
                duration: Duration::ZERO,
                fail_after: Some(duration),
                fail_on_start: false,
            }
        }

        fn failing_on_start() -> Self {
            Self {
                duration: Duration::ZERO,
                fail_after: None,
                fail_on_start: true,
            }
        }
    }

    impl AudioPlayer for FakePlayer {
        fn play(&self, _clip: AudioClip) -> Result<PlaybackHandle, SpeechError> {
            if self.fail_on_start {
                return Err(SpeechError::Playback("no output device".to_string()));
            }
            let (handle, driver) = PlaybackHandle::channel();
            let duration = self.duration;
            let fail_after = self.fail_after;
            tokio::spawn(async move {
                match fail_after {
                    Some(after) => {
                        time::sleep(after).await;
                        driver.finish(PlaybackOutcome::Failed("decoder died".to_string()));
                    }
                    None => {
                        time::sleep(duration).await;
                        driver.finish(PlaybackOutcome::Finished);
                    }
                }
            });
            Ok(handle)
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        remote_failures: AtomicUsize,
        native_unavailable: AtomicUsize,
        selected: Mutex<Vec<Backend>>,
    }

    impl SynthesisObserver for CountingObserver {
        fn remote_synthesis_failed(&self, _reason: &str) {
            self.remote_failures.fetch_add(1, Ordering::SeqCst);
        }

        fn native_synthesis_unavailable(&self) {
            self.native_unavailable.fetch_add(1, Ordering::SeqCst);
        }

        fn backend_selected(&self, backend: Backend) {
            self.selected.lock().unwrap().push(backend);
        }
    }

    /// Captures every callback together with when it fired on the test clock.
    #[derive(Default)]
    struct Recorder {
        highlights: Mutex<Vec<(isize, Duration)>>,
        ends: AtomicUsize,
        errors: AtomicUsize,
    }

    impl Recorder {
        fn indices(&self) -> Vec<isize> {
            self.highlights.lock().unwrap().iter().map(|(i, _)| *i).collect()
        }

        fn times_ms(&self) -> Vec<u128> {
            self.highlights
                .lock()
                .unwrap()
                .iter()
                .map(|(_, t)| t.as_millis())
                .collect()
        }

        fn ends(&self) -> usize {
            self.ends.load(Ordering::SeqCst)
        }

        fn errors(&self) -> usize {
            self.errors.load(Ordering::SeqCst)
        }
    }

    fn recording_callbacks(recorder: &Arc<Recorder>, start: Instant) -> SessionCallbacks {
        let highlights = Arc::clone(recorder);
        let ends = Arc::clone(recorder);
        let errors = Arc::clone(recorder);
        SessionCallbacks::new()
            .on_word_highlight(move |i| {
                highlights
                    .highlights
                    .lock()
                    .unwrap()
                    .push((i, Instant::now() - start));
            })
            .on_end(move || {
                ends.ends.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                errors.errors.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn engine_with(
        remote: RemoteMode,
        native: FakeNative,
        player: FakePlayer,
        observer: &Arc<CountingObserver>,
    ) -> SpeechEngine {
        SpeechEngine::new(
            Arc::new(FakeRemote { mode: remote }),
            Arc::new(native),
            Arc::new(player),
            &Config::default(),
        )
        .with_observer(Arc::clone(observer) as Arc<dyn SynthesisObserver>)
    }

    fn utterance(text: &str, voice: VoiceIdentity) -> Utterance {
        Utterance::new(text, voice).unwrap()
    }

    async fn settle(duration: Duration) {
        time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_success_highlights_every_word() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Audio(1024),
            FakeNative::new(true, Duration::ZERO),
            FakePlayer::finishing_after(Duration::from_millis(2000)),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("the prosecution rests", VoiceIdentity::Sophia),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(5)).await;

        assert_eq!(handle.backend(), Some(Backend::Remote));
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(recorder.indices(), vec![0, 1, 2, -1]);
        // 150 wpm, multiplier 1.0: one word every 400ms; -1 when audio ends.
        assert_eq!(recorder.times_ms(), vec![400, 800, 1200, 2000]);
        assert_eq!(recorder.ends(), 1);
        assert_eq!(recorder.errors(), 0);
        assert_eq!(observer.remote_failures.load(Ordering::SeqCst), 0);
        assert_eq!(*observer.selected.lock().unwrap(), vec![Backend::Remote]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_falls_back_to_native() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Fail,
            FakeNative::new(true, Duration::from_secs(2)),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("one two three", VoiceIdentity::Andrew),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(5)).await;

        assert_eq!(handle.backend(), Some(Backend::Native));
        assert_eq!(recorder.indices(), vec![0, 1, 2, -1]);
        assert_eq!(recorder.ends(), 1);
        assert_eq!(recorder.errors(), 0);
        // The silent degrade was counted but never surfaced to the caller.
        assert_eq!(observer.remote_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_speaks_at_configured_rate() {
        let observer = Arc::new(CountingObserver::default());
        let native = Arc::new(FakeNative::new(true, Duration::from_secs(2)));
        let engine = SpeechEngine::new(
            Arc::new(FakeRemote {
                mode: RemoteMode::Fail,
            }),
            Arc::clone(&native) as Arc<dyn NativeSynthesizer>,
            Arc::new(FakePlayer::finishing_after(Duration::ZERO)),
            &Config::default(),
        )
        .with_observer(Arc::clone(&observer) as Arc<dyn SynthesisObserver>);

        let recorder = Arc::new(Recorder::default());
        engine.speak(
            SpeakerRole::Opponent,
            utterance("objection your honor", VoiceIdentity::Berta),
            recording_callbacks(&recorder, Instant::now()),
        );
        settle(Duration::from_secs(5)).await;

        // 150 wpm at the 0.85 native rate is ~470ms per word.
        let times = recorder.times_ms();
        assert_eq!(recorder.indices(), vec![0, 1, 2, -1]);
        assert!(times[0] >= 470 && times[0] <= 472, "got {:?}", times);
        assert!(times[1] >= 940 && times[1] <= 943, "got {:?}", times);

        let requests = native.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "objection your honor");
        assert_eq!(requests[0].voice, VoiceIdentity::Berta);
        assert!((requests[0].rate - 0.85).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_audio_path_still_completes() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Fail,
            FakeNative::new(false, Duration::ZERO),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("alpha beta", VoiceIdentity::Berta),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(5)).await;

        assert_eq!(handle.backend(), Some(Backend::Silent));
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(recorder.indices(), vec![0, 1, -1]);
        // Two words at 150 wpm: ~400ms and ~800ms, clear right after.
        assert_eq!(recorder.times_ms(), vec![400, 800, 800]);
        assert_eq!(recorder.ends(), 1);
        assert_eq!(observer.native_unavailable.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_counts_as_remote_failure() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Empty,
            FakeNative::new(true, Duration::from_secs(1)),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("sustained", VoiceIdentity::Sophia),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(5)).await;

        assert_eq!(handle.backend(), Some(Backend::Native));
        assert_eq!(observer.remote_failures.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.ends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_start_failure_degrades_silently() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Audio(512),
            FakeNative::new(true, Duration::from_secs(1)),
            FakePlayer::failing_on_start(),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("overruled", VoiceIdentity::Andrew),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(5)).await;

        assert_eq!(handle.backend(), Some(Backend::Native));
        assert_eq!(recorder.ends(), 1);
        assert_eq!(recorder.errors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_remote_request_times_out() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Hang,
            FakeNative::new(false, Duration::ZERO),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("case closed", VoiceIdentity::Berta),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(30)).await;

        // 8s timeout, then the silent schedule runs the two words.
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(recorder.times_ms(), vec![8400, 8800, 8800]);
        assert_eq!(recorder.ends(), 1);
        assert_eq!(observer.remote_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_ending_early_forces_completion() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Audio(2048),
            FakeNative::new(true, Duration::ZERO),
            FakePlayer::finishing_after(Duration::from_millis(1000)),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("ladies and gentlemen of the jury", VoiceIdentity::Sophia),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(10)).await;

        // Only two ticks fit before the audio ended; the rest are suppressed.
        assert_eq!(recorder.indices(), vec![0, 1, -1]);
        assert_eq!(recorder.times_ms(), vec![400, 800, 1000]);
        assert_eq!(recorder.ends(), 1);
        assert_eq!(handle.state(), SessionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_playback_failure_surfaces_error_without_retry() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Audio(2048),
            FakeNative::new(true, Duration::ZERO),
            FakePlayer::failing_after(Duration::from_millis(1000)),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("I put it to you that this fails", VoiceIdentity::Andrew),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(10)).await;

        assert_eq!(handle.state(), SessionState::Errored);
        assert_eq!(recorder.errors(), 1);
        assert_eq!(recorder.ends(), 0);
        // No trailing -1 and no highlights after the failure.
        assert_eq!(recorder.indices(), vec![0, 1]);
        assert_eq!(handle.current_word_index(), -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_speak_supersedes_previous_session_silently() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Fail,
            FakeNative::new(false, Duration::ZERO),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );

        let first = Arc::new(Recorder::default());
        let first_handle = engine.speak(
            SpeakerRole::Opponent,
            utterance(
                "this argument goes on for quite a number of words",
                VoiceIdentity::Berta,
            ),
            recording_callbacks(&first, Instant::now()),
        );

        settle(Duration::from_millis(900)).await;
        let highlights_before = first.indices().len();
        assert!(highlights_before >= 1);

        let second = Arc::new(Recorder::default());
        let second_handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("short rebuttal", VoiceIdentity::Andrew),
            recording_callbacks(&second, Instant::now()),
        );

        settle(Duration::from_secs(10)).await;

        // Old session went quiet: no further highlights, no terminal signal.
        assert_eq!(first.indices().len(), highlights_before);
        assert_eq!(first.ends(), 0);
        assert_eq!(first.errors(), 0);
        assert_eq!(first_handle.state(), SessionState::Cancelled);

        assert_eq!(second.indices(), vec![0, 1, -1]);
        assert_eq!(second.ends(), 1);
        assert_eq!(second_handle.state(), SessionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roles_run_independently() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Fail,
            FakeNative::new(false, Duration::ZERO),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );

        let player_rec = Arc::new(Recorder::default());
        let opponent_rec = Arc::new(Recorder::default());
        engine.speak(
            SpeakerRole::Player,
            utterance("my opening statement", VoiceIdentity::Berta),
            recording_callbacks(&player_rec, Instant::now()),
        );
        engine.speak(
            SpeakerRole::Opponent,
            utterance("my counter argument", VoiceIdentity::Andrew),
            recording_callbacks(&opponent_rec, Instant::now()),
        );

        settle(Duration::from_secs(10)).await;

        assert_eq!(player_rec.ends(), 1);
        assert_eq!(opponent_rec.ends(), 1);
        assert_eq!(player_rec.indices(), vec![0, 1, 2, -1]);
        assert_eq!(opponent_rec.indices(), vec![0, 1, 2, -1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Fail,
            FakeNative::new(false, Duration::ZERO),
            FakePlayer::finishing_after(Duration::ZERO),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let handle = engine.speak(
            SpeakerRole::Opponent,
            utterance("a reasonably long closing statement here", VoiceIdentity::Sophia),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_millis(500)).await;
        handle.cancel();
        handle.cancel();
        engine.cancel(SpeakerRole::Opponent);
        engine.cancel(SpeakerRole::Opponent);

        settle(Duration::from_secs(10)).await;

        assert_eq!(handle.state(), SessionState::Cancelled);
        assert_eq!(recorder.ends(), 0);
        assert_eq!(recorder.errors(), 0);
        assert_eq!(handle.current_word_index(), -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_indices_strictly_increasing() {
        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(
            RemoteMode::Audio(4096),
            FakeNative::new(true, Duration::ZERO),
            FakePlayer::finishing_after(Duration::from_secs(30)),
            &observer,
        );
        let recorder = Arc::new(Recorder::default());
        let text = "the quick brown fox jumps over the lazy dog today";
        engine.speak(
            SpeakerRole::Opponent,
            utterance(text, VoiceIdentity::Berta),
            recording_callbacks(&recorder, Instant::now()),
        );

        settle(Duration::from_secs(60)).await;

        let indices = recorder.indices();
        let words = text.split_whitespace().count() as isize;
        assert_eq!(*indices.last().unwrap(), -1);
        let body = &indices[..indices.len() - 1];
        for (expected, got) in (0..words).zip(body.iter()) {
            assert_eq!(expected, *got);
        }
        assert_eq!(body.len() as isize, words);
        assert_eq!(recorder.ends(), 1);
    }
}
