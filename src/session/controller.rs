//! Session actor
//!
//! One task owns all session state. UI inputs and completions of spawned
//! work (debounce timer, translation, transcription, error dismissal) are
//! handled one at a time, so no component ever observes a half-applied
//! update.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, Microphone, MicrophoneLease};
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::history::{HistoryCache, HistoryEntry};
use crate::lang::Language;
use crate::service::{Phrase, TranslationService};
use crate::store::{KeyValueStore, Preferences};

use super::capture::{CaptureMachine, CaptureState};
use super::coordinator::{
    Mode, RequestCoordinator, Resolution, ResultPane, TranslationOutcome, TranslationRequest,
};
use super::debounce::{DebounceGate, DebounceTicket};
use super::errors::{ErrorChannel, ErrorNotice};

/// Shown in the input while a recording is being transcribed
pub const TRANSCRIBING_PLACEHOLDER: &str = "Transcribing...";

/// Timing policy of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Quiet period after the last keystroke before a live translation
    pub debounce_window: Duration,
    /// Recordings shorter than this are rejected
    pub min_recording: Duration,
    /// How long an error stays on the error channel
    pub error_display: Duration,
    /// Bound on every call to the remote service
    pub request_timeout: Duration,
    /// Bound on collecting audio after the microphone is released
    pub audio_drain: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            min_recording: Duration::from_millis(1000),
            error_display: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            audio_drain: Duration::from_secs(2),
        }
    }
}

/// Events from the UI boundary
#[derive(Debug)]
pub enum SessionInput {
    TextChanged(String),
    Submit,
    SetSourceLanguage(Language),
    SetTargetLanguage(Language),
    SwapLanguages,
    ClearInput,
    StartRecording,
    StopRecording,
    RemoveHistory(usize),
    ClearHistory,
    SetDarkMode(bool),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    LoadPhrases(oneshot::Sender<Result<Vec<Phrase>, SessionError>>),
}

/// Everything the presentation layer displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub source_text: String,
    pub result_text: String,
    pub busy: bool,
    pub source_lang: Language,
    pub target_lang: Language,
    pub error: Option<ErrorNotice>,
    pub capture: CaptureState,
    pub history: Vec<HistoryEntry>,
    pub dark_mode: bool,
}

/// Completions reported back by spawned work
#[derive(Debug)]
enum Internal {
    DebounceElapsed(DebounceTicket),
    TranslationResolved(TranslationOutcome),
    MicrophoneAcquired(Result<MicrophoneLease, SessionError>),
    RecordingDrained(Vec<AudioChunk>),
    TranscriptionResolved(Result<String, SessionError>),
    DismissError(u64),
}

/// The session task has exited
#[derive(Debug, thiserror::Error)]
#[error("session is not running")]
pub struct SessionClosed;

/// Cloneable sender for session inputs
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionHandle {
    /// Create a handle and the receiver [`Session::run`] consumes
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionInput>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, input: SessionInput) -> Result<(), SessionClosed> {
        self.tx.send(input).await.map_err(|_| SessionClosed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Snapshot(reply)).await?;
        rx.await.map_err(|_| SessionClosed)
    }

    pub async fn phrases(&self) -> Result<Result<Vec<Phrase>, SessionError>, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::LoadPhrases(reply)).await?;
        rx.await.map_err(|_| SessionClosed)
    }
}

pub struct Session {
    settings: SessionSettings,
    source_text: String,
    source_lang: Language,
    target_lang: Language,
    pane: ResultPane,
    coordinator: RequestCoordinator,
    capture: CaptureMachine,
    debounce: DebounceGate,
    history: HistoryCache,
    prefs: Preferences,
    errors: ErrorChannel,
    service: Arc<dyn TranslationService>,
    microphone: Arc<dyn Microphone>,
    event_tx: broadcast::Sender<SessionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl Session {
    /// Create a session, loading history and preferences from `store`
    pub fn new<S>(
        settings: SessionSettings,
        service: Arc<dyn TranslationService>,
        microphone: Arc<dyn Microphone>,
        store: S,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self
    where
        S: KeyValueStore + Clone + 'static,
    {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            capture: CaptureMachine::new(settings.min_recording, event_tx.clone()),
            debounce: DebounceGate::new(settings.debounce_window),
            history: HistoryCache::load(Box::new(store.clone())),
            prefs: Preferences::load(Box::new(store)),
            settings,
            source_text: String::new(),
            source_lang: Language::Sylheti,
            target_lang: Language::English,
            pane: ResultPane::default(),
            coordinator: RequestCoordinator::new(),
            errors: ErrorChannel::new(),
            service,
            microphone,
            event_tx,
            internal_tx,
            internal_rx,
        }
    }

    /// Process inputs until every [`SessionHandle`] is dropped
    pub async fn run(mut self, mut inputs: mpsc::Receiver<SessionInput>) {
        info!(history = self.history.len(), "session started");

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
            }
        }

        self.debounce.cancel();
        info!("session stopped");
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::TextChanged(text) => {
                self.set_source_text(text);
                self.schedule_live();
            }
            SessionInput::Submit => {
                self.debounce.cancel();
                self.translate(Mode::Explicit);
            }
            SessionInput::SetSourceLanguage(lang) => {
                self.source_lang = lang;
                self.languages_changed();
            }
            SessionInput::SetTargetLanguage(lang) => {
                self.target_lang = lang;
                self.languages_changed();
            }
            SessionInput::SwapLanguages => {
                std::mem::swap(&mut self.source_lang, &mut self.target_lang);
                if !self.pane.text.trim().is_empty() {
                    let previous = self.pane.text.clone();
                    self.set_source_text(previous);
                }
                self.languages_changed();
            }
            SessionInput::ClearInput => {
                self.debounce.cancel();
                self.set_source_text(String::new());
                let before = self.pane.clone();
                self.coordinator.supersede(&mut self.pane);
                self.publish_pane(&before);
                if let Some(id) = self.errors.clear() {
                    self.emit(SessionEvent::ErrorDismissed { id });
                }
            }
            SessionInput::StartRecording => {
                if self.capture.begin_start() {
                    let microphone = Arc::clone(&self.microphone);
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        let result = microphone.acquire().await;
                        let _ = tx.send(Internal::MicrophoneAcquired(result));
                    });
                }
            }
            SessionInput::StopRecording => self.stop_recording(),
            SessionInput::RemoveHistory(index) => {
                if self.history.remove(index) {
                    self.emit(SessionEvent::HistoryChanged {
                        len: self.history.len(),
                    });
                } else {
                    debug!(index, "history index out of range");
                }
            }
            SessionInput::ClearHistory => {
                self.history.clear();
                self.emit(SessionEvent::HistoryChanged { len: 0 });
            }
            SessionInput::SetDarkMode(dark) => {
                if self.prefs.set_dark_mode(dark) {
                    self.emit(SessionEvent::DisplayModeChanged { dark });
                }
            }
            SessionInput::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionInput::LoadPhrases(reply) => {
                let service = Arc::clone(&self.service);
                let limit = self.settings.request_timeout;
                tokio::spawn(async move {
                    let result = bounded(limit, "phrase list request", service.phrases()).await;
                    let _ = reply.send(result);
                });
            }
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::DebounceElapsed(ticket) => {
                if self.debounce.claim(ticket) {
                    self.translate(Mode::Live);
                } else {
                    debug!(?ticket, "superseded debounce ignored");
                }
            }
            Internal::TranslationResolved(outcome) => {
                let before = self.pane.clone();
                let resolution =
                    self.coordinator
                        .resolve(&mut self.pane, &mut self.history, outcome);
                self.publish_pane(&before);
                match resolution {
                    Resolution::Applied(_) => self.emit(SessionEvent::HistoryChanged {
                        len: self.history.len(),
                    }),
                    Resolution::Stale => {}
                    Resolution::Failed(e) => self.raise(e),
                }
            }
            Internal::MicrophoneAcquired(result) => {
                if let Err(e) = self.capture.acquired(result) {
                    self.raise(e);
                }
            }
            Internal::RecordingDrained(chunks) => match self.capture.drained(chunks) {
                Ok(Some(audio)) => self.transcribe(audio),
                Ok(None) => {}
                Err(e) => self.raise(e),
            },
            Internal::TranscriptionResolved(result) => {
                self.capture.finish_transcription();
                match result {
                    Ok(text) => {
                        info!(chars = text.chars().count(), "transcription received");
                        self.set_source_text(text);
                        self.schedule_live();
                    }
                    Err(e) => {
                        self.set_source_text(String::new());
                        self.raise(e);
                    }
                }
            }
            Internal::DismissError(id) => {
                if self.errors.dismiss(id) {
                    self.emit(SessionEvent::ErrorDismissed { id });
                }
            }
        }
    }

    /// Release the device off the actor; the chunks come back as a message
    fn stop_recording(&mut self) {
        let lease = match self.capture.begin_stop() {
            Ok(Some(lease)) => lease,
            Ok(None) => return,
            Err(e) => {
                self.raise(e);
                return;
            }
        };

        let tx = self.internal_tx.clone();
        let drain = self.settings.audio_drain;
        tokio::spawn(async move {
            let chunks = lease.release(drain).await;
            let _ = tx.send(Internal::RecordingDrained(chunks));
        });
    }

    fn transcribe(&mut self, audio: Vec<u8>) {
        // A pending live translation would otherwise pick up the placeholder
        self.debounce.cancel();
        self.set_source_text(TRANSCRIBING_PLACEHOLDER.to_string());

        let service = Arc::clone(&self.service);
        let tx = self.internal_tx.clone();
        let limit = self.settings.request_timeout;
        let language = self.source_lang;
        tokio::spawn(async move {
            let result = bounded(
                limit,
                "transcription request",
                service.transcribe(audio, language),
            )
            .await;
            let _ = tx.send(Internal::TranscriptionResolved(result));
        });
    }

    /// Explicit triggers fire immediately, but only when there is text
    fn languages_changed(&mut self) {
        self.emit(SessionEvent::LanguagesChanged {
            source: self.source_lang,
            target: self.target_lang,
        });
        if self.source_text.trim().is_empty() {
            return;
        }
        self.debounce.cancel();
        self.translate(Mode::Explicit);
    }

    fn translate(&mut self, mode: Mode) {
        let before = self.pane.clone();
        let begun = self.coordinator.begin(
            &mut self.pane,
            &self.source_text,
            self.source_lang,
            self.target_lang,
            mode,
        );

        match begun {
            Ok(Some(request)) => {
                if mode == Mode::Explicit {
                    if let Some(id) = self.errors.clear() {
                        self.emit(SessionEvent::ErrorDismissed { id });
                    }
                }
                self.publish_pane(&before);
                self.dispatch(request);
            }
            Ok(None) => self.publish_pane(&before),
            Err(e) => self.raise(e),
        }
    }

    fn dispatch(&self, request: TranslationRequest) {
        let service = Arc::clone(&self.service);
        let tx = self.internal_tx.clone();
        let limit = self.settings.request_timeout;
        tokio::spawn(async move {
            let sequence = request.sequence;
            let result = bounded(limit, "translation request", service.translate(&request)).await;
            let _ = tx.send(Internal::TranslationResolved(TranslationOutcome { sequence, result }));
        });
    }

    fn schedule_live(&mut self) {
        let tx = self.internal_tx.clone();
        self.debounce.schedule(move |ticket| async move {
            let _ = tx.send(Internal::DebounceElapsed(ticket));
        });
    }

    fn set_source_text(&mut self, text: String) {
        if self.source_text == text {
            return;
        }
        self.source_text = text;
        self.emit(SessionEvent::SourceTextChanged {
            text: self.source_text.clone(),
        });
    }

    fn publish_pane(&self, before: &ResultPane) {
        if before.text != self.pane.text {
            self.emit(SessionEvent::ResultChanged {
                text: self.pane.text.clone(),
            });
        }
        if before.busy != self.pane.busy {
            self.emit(SessionEvent::BusyChanged {
                busy: self.pane.busy,
            });
        }
    }

    /// Put `error` on the error channel and schedule its dismissal
    fn raise(&mut self, error: SessionError) {
        let notice = self.errors.raise(&error);
        warn!(id = notice.id, kind = ?notice.kind, message = %notice.message, "error raised");
        self.emit(SessionEvent::ErrorRaised {
            id: notice.id,
            kind: notice.kind,
            message: notice.message,
        });

        let tx = self.internal_tx.clone();
        let ttl = self.settings.error_display;
        let id = notice.id;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(Internal::DismissError(id));
        });
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "session event");
        let _ = self.event_tx.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_text: self.source_text.clone(),
            result_text: self.pane.text.clone(),
            busy: self.pane.busy,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            error: self.errors.current().cloned(),
            capture: self.capture.state(),
            history: self.history.entries(),
            dark_mode: self.prefs.dark_mode(),
        }
    }
}

/// Run a service call under `limit`; expiry counts as a network failure
async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(what, limit_ms = limit.as_millis() as u64, "service call timed out");
            Err(SessionError::timed_out(what))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::audio::testing::FakeMicrophone;
    use crate::error::ErrorKind;
    use crate::history::HISTORY_KEY;
    use crate::service::testing::FakeService;
    use crate::store::MemoryStore;

    fn test_settings() -> SessionSettings {
        SessionSettings {
            error_display: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            audio_drain: Duration::from_millis(100),
            ..SessionSettings::default()
        }
    }

    fn create_session(
        service: &Arc<FakeService>,
        mic: FakeMicrophone,
        settings: SessionSettings,
    ) -> (Session, broadcast::Receiver<SessionEvent>, MemoryStore) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let store = MemoryStore::new();
        let session = Session::new(
            settings,
            service.clone(),
            Arc::new(mic),
            store.clone(),
            event_tx,
        );
        (session, event_rx, store)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    impl Session {
        /// Wait for the next completion and handle it
        async fn pump(&mut self) {
            let internal = self.internal_rx.recv().await.unwrap();
            self.handle_internal(internal);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_translation_example() {
        let service = Arc::new(FakeService::default());
        service.reply("ami bhalo achi", 20, Ok("I am fine"));
        let (mut session, mut events, store) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.handle_input(SessionInput::SetSourceLanguage(Language::Bengali));
        session.handle_input(SessionInput::TextChanged("ami bhalo achi".into()));
        session.handle_input(SessionInput::Submit);
        assert!(session.pane.busy);
        session.pump().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.result_text, "I am fine");
        assert!(!snapshot.busy);
        assert_eq!(snapshot.error, None);
        let newest = &snapshot.history[0];
        assert_eq!(newest.source_text, "ami bhalo achi");
        assert_eq!(newest.target_text, "I am fine");
        assert_eq!(newest.source_lang, Language::Bengali);
        assert_eq!(newest.target_lang, Language::English);
        assert!(store.get(HISTORY_KEY).unwrap().contains("I am fine"));

        // Submit replaced the pending live trigger
        assert_eq!(service.calls(), vec!["ami bhalo achi"]);
        assert!(!session.debounce.is_pending());

        let busy: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::BusyChanged { busy } => Some(busy),
                _ => None,
            })
            .collect();
        assert_eq!(busy, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_issued_wins_regardless_of_arrival() {
        let service = Arc::new(FakeService::default());
        service.reply("a", 300, Ok("A"));
        service.reply("ab", 50, Ok("AB"));
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());
        session.source_lang = Language::Bengali;

        session.source_text = "a".into();
        session.translate(Mode::Live);
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        session.source_text = "ab".into();
        session.translate(Mode::Live);

        session.pump().await;
        assert_eq!(session.pane.text, "AB");
        session.pump().await;
        assert_eq!(session.pane.text, "AB");
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.errors.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_is_debounced() {
        let service = Arc::new(FakeService::default());
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.handle_input(SessionInput::TextChanged("a".into()));
        tokio::time::advance(Duration::from_millis(100)).await;
        session.handle_input(SessionInput::TextChanged("ab".into()));

        // Debounce fires once, then the translation resolves
        session.pump().await;
        session.pump().await;

        assert_eq!(service.calls(), vec!["ab"]);
        assert_eq!(session.pane.text, "AB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_translation_keeps_displayed_result() {
        let service = Arc::new(FakeService::default());
        service.reply("a", 0, Ok("A"));
        service.reply("ab", 0, Err(SessionError::Service("model not loaded".into())));
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.source_text = "a".into();
        session.translate(Mode::Live);
        session.pump().await;
        assert_eq!(session.pane.text, "A");

        session.source_text = "ab".into();
        session.translate(Mode::Live);
        session.pump().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.result_text, "A");
        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Service);
        assert_eq!(error.message, "model not loaded");
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_language_is_rejected_without_network() {
        let service = Arc::new(FakeService::default());
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.source_text = "hello".into();
        session.handle_input(SessionInput::SetTargetLanguage(Language::Sylheti));

        assert_eq!(session.errors.current().unwrap().kind, ErrorKind::Validation);
        tokio::task::yield_now().await;
        assert!(service.calls().is_empty());
        assert_eq!(session.coordinator.last_issued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_recording_never_transcribes() {
        let service = Arc::new(FakeService::default());
        let mic = FakeMicrophone::with_chunks(vec![vec![1, 2, 3]]);
        let released = Arc::clone(&mic.released);
        let (mut session, _, _) = create_session(&service, mic, test_settings());

        session.handle_input(SessionInput::StartRecording);
        session.pump().await;
        assert_eq!(session.capture.state(), CaptureState::Recording);
        tokio::time::advance(Duration::from_millis(400)).await;
        session.handle_input(SessionInput::StopRecording);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.capture, CaptureState::Idle);
        assert_eq!(snapshot.error.unwrap().kind, ErrorKind::RecordingTooShort);
        assert!(released.load(Ordering::SeqCst));
        tokio::task::yield_now().await;
        assert_eq!(service.transcriptions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_transcribes_then_translates() {
        let service = Arc::new(FakeService::default());
        service.reply("ami bhalo achi", 0, Ok("I am fine"));
        let mic = FakeMicrophone::with_chunks(vec![vec![1, 2], vec![3]]);
        let (mut session, _, _) = create_session(&service, mic, test_settings());
        session.source_lang = Language::Bengali;

        session.handle_input(SessionInput::StartRecording);
        session.pump().await;
        tokio::time::advance(Duration::from_millis(1200)).await;
        session.handle_input(SessionInput::StopRecording);
        // Draining happens off the actor
        assert_eq!(session.capture.state(), CaptureState::Recording);
        session.pump().await;
        assert_eq!(session.source_text, TRANSCRIBING_PLACEHOLDER);
        assert_eq!(session.capture.state(), CaptureState::Transcribing);

        // Transcription lands, then the live path fires and resolves
        session.pump().await;
        assert_eq!(session.source_text, "ami bhalo achi");
        assert_eq!(session.capture.state(), CaptureState::Idle);
        session.pump().await;
        session.pump().await;

        assert_eq!(service.transcriptions.load(Ordering::SeqCst), 1);
        assert_eq!(service.calls(), vec!["ami bhalo achi"]);
        assert_eq!(session.pane.text, "I am fine");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcription_failure_clears_placeholder() {
        let service = Arc::new(FakeService::default());
        *service.transcription.lock().unwrap() =
            Some(Err(SessionError::Transcription("model crashed".into())));
        let mic = FakeMicrophone::with_chunks(vec![vec![1]]);
        let (mut session, _, _) = create_session(&service, mic, test_settings());

        session.handle_input(SessionInput::StartRecording);
        session.pump().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        session.handle_input(SessionInput::StopRecording);
        session.pump().await;
        session.pump().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.source_text, "");
        assert_eq!(snapshot.capture, CaptureState::Idle);
        assert_eq!(snapshot.error.unwrap().kind, ErrorKind::Transcription);
        assert!(!session.debounce.is_pending());
        assert!(service.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_surfaces_error() {
        let service = Arc::new(FakeService::default());
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::denied(), test_settings());

        session.handle_input(SessionInput::StartRecording);
        session.pump().await;
        assert_eq!(session.capture.state(), CaptureState::Idle);
        assert_eq!(
            session.errors.current().unwrap().kind,
            ErrorKind::PermissionDenied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_microphone_does_not_block_session() {
        let service = Arc::new(FakeService::default());
        let mut mic = FakeMicrophone::with_chunks(vec![vec![1]]);
        mic.delay = Duration::from_secs(10);
        let acquisitions = Arc::clone(&mic.acquisitions);
        let (session, _, _) = create_session(&service, mic, test_settings());
        let (handle, inputs) = SessionHandle::channel(8);
        let task = tokio::spawn(session.run(inputs));

        handle.send(SessionInput::StartRecording).await.unwrap();
        handle.send(SessionInput::StartRecording).await.unwrap();
        handle
            .send(SessionInput::TextChanged("ami".into()))
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(1), handle.snapshot())
            .await
            .expect("session stalled behind the microphone")
            .unwrap();
        assert_eq!(snapshot.source_text, "ami");
        assert_eq!(snapshot.capture, CaptureState::Idle);

        // The device opens eventually; the second start never asked for it
        tokio::time::sleep(Duration::from_secs(11)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.capture, CaptureState::Recording);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_microphone_opens_is_too_short() {
        let service = Arc::new(FakeService::default());
        let mut mic = FakeMicrophone::with_chunks(vec![vec![1]]);
        mic.delay = Duration::from_secs(3);
        let released = Arc::clone(&mic.released);
        let (mut session, _, _) = create_session(&service, mic, test_settings());

        session.handle_input(SessionInput::StartRecording);
        session.handle_input(SessionInput::StopRecording);
        assert_eq!(session.errors.current(), None);

        session.pump().await;
        assert_eq!(session.capture.state(), CaptureState::Idle);
        assert_eq!(
            session.errors.current().unwrap().kind,
            ErrorKind::RecordingTooShort
        );
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(service.transcriptions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_dismissed_automatically() {
        let service = Arc::new(FakeService::default());
        let settings = SessionSettings {
            error_display: Duration::from_secs(5),
            ..test_settings()
        };
        let (mut session, mut events, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), settings);

        session.handle_input(SessionInput::Submit);
        let id = session.errors.current().unwrap().id;

        session.pump().await;
        assert_eq!(session.errors.current(), None);
        assert!(drain(&mut events).contains(&SessionEvent::ErrorDismissed { id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_input_supersedes_in_flight() {
        let service = Arc::new(FakeService::default());
        service.reply("a", 100, Ok("A"));
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.source_text = "a".into();
        session.pane.text = "old".into();
        session.translate(Mode::Live);
        session.handle_input(SessionInput::ClearInput);
        assert_eq!(session.pane.text, "");

        session.pump().await;
        assert_eq!(session.pane.text, "");
        assert!(session.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_moves_result_into_input() {
        let service = Arc::new(FakeService::default());
        service.reply("ami bhalo achi", 0, Ok("I am fine"));
        service.reply("I am fine", 0, Ok("ami bhalo achi"));
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());
        session.source_lang = Language::Bengali;

        session.source_text = "ami bhalo achi".into();
        session.translate(Mode::Explicit);
        session.pump().await;

        session.handle_input(SessionInput::SwapLanguages);
        assert_eq!(session.source_text, "I am fine");
        assert_eq!(
            (session.source_lang, session.target_lang),
            (Language::English, Language::Bengali)
        );
        session.pump().await;

        assert_eq!(session.pane.text, "ami bhalo achi");
        assert_eq!(service.calls(), vec!["ami bhalo achi", "I am fine"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_language_change_on_blank_input_does_not_dispatch() {
        let service = Arc::new(FakeService::default());
        let (mut session, mut events, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.handle_input(SessionInput::SetSourceLanguage(Language::Bengali));
        assert_eq!(session.coordinator.last_issued(), 0);
        assert_eq!(session.errors.current(), None);
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::LanguagesChanged {
                source: Language::Bengali,
                target: Language::English
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_service_times_out_as_network_error() {
        let service = Arc::new(FakeService::default());
        service.reply("a", 60_000, Ok("A"));
        let (mut session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        session.source_text = "a".into();
        session.pane.text = "previous".into();
        session.translate(Mode::Live);
        session.pump().await;

        assert_eq!(session.pane.text, "previous");
        assert_eq!(session.errors.current().unwrap().kind, ErrorKind::Network);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_and_preferences_inputs() {
        let service = Arc::new(FakeService::default());
        let (mut session, mut events, store) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());

        for text in ["a", "b", "c"] {
            session.source_text = text.into();
            session.translate(Mode::Explicit);
            session.pump().await;
        }
        assert_eq!(session.history.len(), 3);

        session.handle_input(SessionInput::RemoveHistory(0));
        assert_eq!(session.history.latest().unwrap().source_text, "b");
        session.handle_input(SessionInput::ClearHistory);
        assert!(session.history.is_empty());

        session.handle_input(SessionInput::SetDarkMode(true));
        assert!(session.snapshot().dark_mode);
        assert_eq!(store.get(crate::store::DARK_MODE_KEY).as_deref(), Some("true"));
        assert!(drain(&mut events).contains(&SessionEvent::DisplayModeChanged { dark: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_serves_handle() {
        let service = Arc::new(FakeService::default());
        let (session, _, _) =
            create_session(&service, FakeMicrophone::with_chunks(Vec::new()), test_settings());
        let (handle, inputs) = SessionHandle::channel(8);
        let task = tokio::spawn(session.run(inputs));

        handle
            .send(SessionInput::TextChanged("ami".into()))
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.source_text, "ami");
        assert_eq!(snapshot.capture, CaptureState::Idle);

        // Debounce window passes, the live translation lands
        let mut snapshot = handle.snapshot().await.unwrap();
        for _ in 0..20 {
            if !snapshot.result_text.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            snapshot = handle.snapshot().await.unwrap();
        }
        assert_eq!(snapshot.result_text, "AMI");

        assert!(handle.phrases().await.unwrap().unwrap().is_empty());

        drop(handle);
        task.await.unwrap();
    }
}
