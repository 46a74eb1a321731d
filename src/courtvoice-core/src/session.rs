//! Playback sessions.
//!
//! One session is one complete speak-and-highlight lifecycle. All terminal
//! transitions funnel through [`SessionShared`] so the completion and error
//! callbacks can never fire more than once between them, and a cancelled
//! session goes quiet immediately.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use tokio::sync::watch;

use crate::backend::{Backend, PlaybackStopper};
use crate::error::SpeechError;

/// Which side of the courtroom a session speaks for. Each role holds at most
/// one active session; starting a new one supersedes the old.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerRole {
    /// The player's own transcript readback.
    Player,
    /// The AI opponent's counter-argument.
    Opponent,
}

/// Lifecycle of a session. `Requesting` covers the remote synthesis attempt;
/// the highlight schedule only runs while `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Requesting,
    Playing,
    Completed,
    Errored,
    Cancelled,
}

pub type HighlightCallback = Box<dyn Fn(isize) + Send + Sync>;
pub type CompletionCallback = Box<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&SpeechError) + Send + Sync>;

/// Callback bundle supplied up front at `speak` time. Registering everything
/// before any asynchronous work starts means a terminal event can never slip
/// past a late-attached handler.
#[derive(Default)]
pub struct SessionCallbacks {
    on_word_highlight: Option<HighlightCallback>,
    on_end: Option<CompletionCallback>,
    on_error: Option<ErrorCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives each word index in order, then a single trailing `-1` that
    /// clears the highlight.
    pub fn on_word_highlight(mut self, f: impl Fn(isize) + Send + Sync + 'static) -> Self {
        self.on_word_highlight = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&SpeechError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// State shared between the session task, the engine, and the caller's handle.
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    backend: Mutex<Option<Backend>>,
    cancelled: AtomicBool,
    terminal: AtomicBool,
    current_word: AtomicIsize,
    stopper: Mutex<Option<PlaybackStopper>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    callbacks: SessionCallbacks,
}

impl SessionShared {
    pub(crate) fn new(callbacks: SessionCallbacks) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            state: Mutex::new(SessionState::Requesting),
            backend: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            terminal: AtomicBool::new(false),
            current_word: AtomicIsize::new(-1),
            stopper: Mutex::new(None),
            cancel_tx,
            cancel_rx,
            callbacks,
        }
    }

    /// Watch that flips to `true` once the session is cancelled; the
    /// scheduler selects on it so cancellation releases the interval timer
    /// without waiting out the remaining schedule.
    pub(crate) fn cancelled_watch(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    pub(crate) fn backend(&self) -> Option<Backend> {
        *self.backend.lock().expect("session backend lock poisoned")
    }

    pub(crate) fn current_word(&self) -> isize {
        self.current_word.load(Ordering::SeqCst)
    }

    pub(crate) fn start_playing(&self, backend: Backend) {
        if self.is_cancelled() {
            return;
        }
        *self.backend.lock().expect("session backend lock poisoned") = Some(backend);
        *self.state.lock().expect("session state lock poisoned") = SessionState::Playing;
    }

    /// Park the stop control for the active audio resource so cancellation
    /// can reach it from outside the session task.
    pub(crate) fn store_stopper(&self, stopper: PlaybackStopper) {
        let slot = &mut *self.stopper.lock().expect("session stopper lock poisoned");
        if self.is_cancelled() {
            // Lost the race against teardown; stop immediately.
            stopper.stop();
        } else {
            *slot = Some(stopper);
        }
    }

    /// Advance the highlight to `index`. Indices only ever move forward; the
    /// scheduler is the sole caller.
    pub(crate) fn emit_highlight(&self, index: isize) {
        if self.is_cancelled() || self.terminal.load(Ordering::SeqCst) {
            return;
        }
        self.current_word.store(index, Ordering::SeqCst);
        if let Some(cb) = &self.callbacks.on_word_highlight {
            cb(index);
        }
    }

    /// Normal end of a session: clear the highlight with a single `-1`, then
    /// signal completion exactly once.
    pub(crate) fn complete(&self) {
        if self.is_cancelled() || self.terminal.swap(true, Ordering::SeqCst) {
            return;
        }
        self.current_word.store(-1, Ordering::SeqCst);
        if let Some(cb) = &self.callbacks.on_word_highlight {
            cb(-1);
        }
        *self.state.lock().expect("session state lock poisoned") = SessionState::Completed;
        self.release_audio();
        if let Some(cb) = &self.callbacks.on_end {
            cb();
        }
    }

    /// Mid-playback failure: surface the error once and go quiet. The caller
    /// decides whether and when to proceed; the engine never retries.
    pub(crate) fn fail(&self, error: SpeechError) {
        if self.is_cancelled() || self.terminal.swap(true, Ordering::SeqCst) {
            return;
        }
        self.current_word.store(-1, Ordering::SeqCst);
        *self.state.lock().expect("session state lock poisoned") = SessionState::Errored;
        self.release_audio();
        if let Some(cb) = &self.callbacks.on_error {
            cb(&error);
        }
    }

    /// Silence the session: no callback fires after this returns. Idempotent,
    /// and a no-op on sessions that already completed or errored.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.cancel_tx.send(true);
        if self.terminal.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock().expect("session state lock poisoned") = SessionState::Cancelled;
        self.current_word.store(-1, Ordering::SeqCst);
        self.release_audio();
    }

    fn release_audio(&self) {
        let stopper = self
            .stopper
            .lock()
            .expect("session stopper lock poisoned")
            .take();
        if let Some(stopper) = stopper {
            stopper.stop();
        }
    }
}

/// Caller's view of one session: inspect progress, or cancel it.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: std::sync::Arc<SessionShared>,
    role: SpeakerRole,
}

impl SessionHandle {
    pub(crate) fn new(shared: std::sync::Arc<SessionShared>, role: SpeakerRole) -> Self {
        Self { shared, role }
    }

    pub fn role(&self) -> SpeakerRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Backend chosen for this session, once playback has started.
    pub fn backend(&self) -> Option<Backend> {
        self.shared.backend()
    }

    /// Index of the word currently highlighted, or `-1` when cleared.
    pub fn current_word_index(&self) -> isize {
        self.shared.current_word()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Requesting | SessionState::Playing
        )
    }

    /// Cancel this session without firing its callbacks. Calling this twice,
    /// or on an already-terminated session, is a no-op.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}
