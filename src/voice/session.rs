//! # Voice Session Controller
//!
//! Keeps one continuous listening session alive on top of a recognizer that
//! ends sessions whenever it likes (silence timeouts, platform limits), and
//! turns command phrases heard in that session into turn advances.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: nothing running, no engine handle
//! 2. **Priming**: waiting for the microphone permission prompt (some mobile platforms only)
//! 3. **Listening**: an engine is running; ended sessions are restarted after a short delay
//! 4. **Error**: a terminal recognizer error tore the session down; only an
//!    explicit start brings it back
//!
//! ## Event Model:
//! The controller is the single dispatch target for everything asynchronous:
//! recognizer callbacks, the priming result and restart timers all arrive as
//! `SessionEvent`s on one channel and are fed to `handle_event()` by the task
//! that owns the controller. Every event carries the generation it was produced
//! for. `start()` and `stop()` move the generation forward, so anything left
//! over from an older session (a late `End`, a pending restart, a priming
//! prompt answered after the user gave up) is recognized and dropped.
//!
//! The engine handle is only replaced in `start()`, `stop()` and the terminal
//! error path, never while handling a result, so advancing the turn from a
//! recognized command cannot disturb the session.

use crate::i18n::{Language, Localization};
use crate::voice::commands::{CommandMatch, CommandMatcher};
use crate::voice::priming::{MicrophonePrimer, PlatformSignature, PrimingError, PrimingPolicy};
use crate::voice::recognizer::{
    EngineError, RecognitionError, RecognizerCallbacks, RecognizerCapability, RecognizerEvent,
    RecognizerFactory, RecognizerOptions, ResultBatch, SpeechRecognizer,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything asynchronous the controller reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// A callback from the engine built for `generation`
    Recognizer {
        generation: u64,
        event: RecognizerEvent,
    },
    /// The priming prompt was answered (and the settle delay has passed)
    PrimingFinished {
        generation: u64,
        result: Result<(), PrimingError>,
    },
    /// The debounce delay after an ended session has elapsed
    RestartDue { generation: u64 },
}

/// Current state of the voice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceStatus {
    Idle,
    Priming,
    Listening,
    /// Terminal failure. Never holds `NoSpeechTransient`.
    Error(RecognitionError),
}

impl VoiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VoiceStatus::Idle => "idle",
            VoiceStatus::Priming => "priming",
            VoiceStatus::Listening => "listening",
            VoiceStatus::Error(_) => "error",
        }
    }
}

/// The two-part status shown to the players: a short glyph and a localized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub glyph: &'static str,
    pub message: String,
}

/// Timing and platform parameters for the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// Delay before restarting an ended session
    pub restart_delay: Duration,
    /// Wait after releasing the priming stream before the recognizer starts
    pub priming_settle: Duration,
    pub max_alternatives: usize,
    pub priming: PrimingPolicy,
    pub platform: PlatformSignature,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(300),
            priming_settle: Duration::from_millis(600),
            max_alternatives: 3,
            priming: PrimingPolicy::Auto,
            platform: PlatformSignature::default(),
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The engine is running
    Listening,
    /// Waiting for the microphone prompt; listening follows via `PrimingFinished`
    Priming,
    /// A session is already running or being started
    AlreadyActive,
    /// The platform has no usable recognizer
    Unavailable(RecognitionError),
    /// The freshly built engine refused to start
    Failed(EngineError),
}

/// Counters for one controller's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub starts: u64,
    pub restarts: u64,
    pub terminal_errors: u64,
    pub commands: u64,
}

/// The voice session controller. One per app; owns at most one engine.
pub struct VoiceSession {
    settings: VoiceSettings,
    language: Language,
    localization: Arc<Localization>,
    matcher: CommandMatcher,
    factory: Box<dyn RecognizerFactory>,
    primer: Arc<dyn MicrophonePrimer>,
    events: UnboundedSender<SessionEvent>,

    status: VoiceStatus,
    engine: Option<Box<dyn SpeechRecognizer>>,
    /// The user wants to be listening (drives restarts)
    should_listen: bool,
    /// A start is in flight (priming prompt pending)
    initializing: bool,
    generation: u64,
    priming_task: Option<JoinHandle<()>>,
    restart_task: Option<JoinHandle<()>>,
    stats: SessionStats,
}

impl VoiceSession {
    pub fn new(
        settings: VoiceSettings,
        language: Language,
        localization: Arc<Localization>,
        factory: Box<dyn RecognizerFactory>,
        primer: Arc<dyn MicrophonePrimer>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        let matcher = CommandMatcher::new(localization.list(language, "voiceCommands"));
        Self {
            settings,
            language,
            localization,
            matcher,
            factory,
            primer,
            events,
            status: VoiceStatus::Idle,
            engine: None,
            should_listen: false,
            initializing: false,
            generation: 0,
            priming_task: None,
            restart_task: None,
            stats: SessionStats::default(),
        }
    }

    pub fn status(&self) -> &VoiceStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Listening, or on the way there.
    pub fn is_active(&self) -> bool {
        self.should_listen || self.initializing
    }

    /// Whether the "listening" indicator should be lit.
    pub fn listening_indicator(&self) -> bool {
        self.status == VoiceStatus::Listening
    }

    /// The status glyph and message in the current language.
    pub fn status_line(&self) -> StatusLine {
        let text = |key: &str| self.localization.text(self.language, key);
        match &self.status {
            VoiceStatus::Idle => StatusLine {
                glyph: "---",
                message: text("statusDefault"),
            },
            VoiceStatus::Priming => StatusLine {
                glyph: "...",
                message: text("listening"),
            },
            VoiceStatus::Listening => StatusLine {
                glyph: "REC",
                message: text("listening"),
            },
            VoiceStatus::Error(error) => StatusLine {
                glyph: "///",
                message: match error {
                    RecognitionError::PermissionBlocked => text("micBlocked"),
                    RecognitionError::ServiceDenied => text("serviceNotAllowed"),
                    RecognitionError::Unsupported => text("voiceUnsupported"),
                    RecognitionError::InsecureContext => text("voiceNeedsHttps"),
                    RecognitionError::NoSpeechTransient => text("statusDefault"),
                    RecognitionError::Other(code) => format!("{}: {}", text("errorPrefix"), code),
                },
            },
        }
    }

    /// Begin listening.
    ///
    /// Rejected while a session is already running or still priming. On
    /// platforms that need it, the microphone prompt runs first and the engine
    /// is started when its `PrimingFinished` event arrives.
    pub fn start(&mut self) -> StartOutcome {
        if self.is_active() {
            debug!(status = self.status.as_str(), "Start ignored, voice session already active");
            return StartOutcome::AlreadyActive;
        }

        if let RecognizerCapability::Missing { secure_context } = self.factory.capability() {
            let error = if secure_context {
                RecognitionError::Unsupported
            } else {
                RecognitionError::InsecureContext
            };
            warn!(kind = error.kind(), "Speech recognition is not available");
            self.set_status(VoiceStatus::Error(error.clone()));
            return StartOutcome::Unavailable(error);
        }

        self.generation += 1;
        self.initializing = true;
        self.stats.starts += 1;

        if self
            .settings
            .priming
            .requires_priming(&self.settings.platform, self.primer.as_ref())
        {
            self.set_status(VoiceStatus::Priming);
            self.spawn_priming();
            return StartOutcome::Priming;
        }

        self.attach_and_start()
    }

    /// Stop listening. Works from any state, including a pending priming prompt.
    pub fn stop(&mut self) {
        let previous = self.status.as_str().to_string();
        self.teardown();
        self.set_status(VoiceStatus::Idle);
        info!(from = %previous, generation = self.generation, "Voice session stopped");
    }

    /// The microphone button: stop when active, start otherwise.
    ///
    /// Returns the start outcome, or `None` when the session was stopped.
    pub fn toggle(&mut self) -> Option<StartOutcome> {
        if self.is_active() {
            self.stop();
            None
        } else {
            Some(self.start())
        }
    }

    /// Switch the recognition language.
    ///
    /// Engines are built for one language, so a running session is torn down
    /// and started again with a fresh engine. Returns false when `language` is
    /// already active.
    pub fn set_language(&mut self, language: Language) -> bool {
        if language == self.language {
            return false;
        }

        let resume = self.should_listen;
        if resume {
            self.stop();
        }

        self.language = language;
        self.matcher = CommandMatcher::new(self.localization.list(language, "voiceCommands"));
        info!(
            language = %language,
            phrases = ?self.matcher.phrases(),
            resume,
            "Voice language changed"
        );

        if resume {
            self.start();
        }
        true
    }

    /// Dispatch one event. Returns the command found in a result event, if any.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<CommandMatch> {
        match event {
            SessionEvent::PrimingFinished { generation, result } => {
                self.on_priming_finished(generation, result);
                None
            }
            SessionEvent::RestartDue { generation } => {
                self.on_restart_due(generation);
                None
            }
            SessionEvent::Recognizer { generation, event } => {
                if generation != self.generation {
                    debug!(
                        generation,
                        current = self.generation,
                        "Dropping event from a replaced recognizer"
                    );
                    return None;
                }
                match event {
                    RecognizerEvent::Result(batch) => self.on_result(&batch),
                    RecognizerEvent::Error(code) => {
                        self.on_error(&code);
                        None
                    }
                    RecognizerEvent::End => {
                        self.on_end();
                        None
                    }
                }
            }
        }
    }

    fn on_priming_finished(&mut self, generation: u64, result: Result<(), PrimingError>) {
        self.priming_task = None;
        if generation != self.generation || !self.initializing {
            debug!(generation, "Priming finished after the start was cancelled");
            return;
        }

        match result {
            Ok(()) => {
                debug!(generation, "Microphone primed");
                self.attach_and_start();
            }
            Err(err) => {
                warn!(error = %err, "Microphone priming failed");
                self.initializing = false;
                self.stats.terminal_errors += 1;
                self.set_status(VoiceStatus::Error(RecognitionError::PermissionBlocked));
            }
        }
    }

    fn on_result(&mut self, batch: &ResultBatch) -> Option<CommandMatch> {
        if !self.should_listen {
            return None;
        }
        let found = self.matcher.find_in_batch(batch)?;
        self.stats.commands += 1;
        info!(transcript = %found.transcript, phrase = %found.phrase, "Voice command recognized");
        Some(found)
    }

    fn on_error(&mut self, code: &str) {
        let error = RecognitionError::from_code(code);
        if !error.is_terminal() {
            debug!(code, "No speech detected, waiting for the session to end");
            return;
        }

        warn!(code, kind = error.kind(), "Speech recognition error");
        self.teardown();
        self.stats.terminal_errors += 1;
        self.set_status(VoiceStatus::Error(error));
    }

    fn on_end(&mut self) {
        if !self.should_listen {
            debug!(generation = self.generation, "Recognizer session ended");
            return;
        }
        debug!(
            generation = self.generation,
            delay_ms = self.settings.restart_delay.as_millis() as u64,
            "Recognizer session ended, scheduling restart"
        );
        self.schedule_restart();
    }

    fn on_restart_due(&mut self, generation: u64) {
        if generation != self.generation || !self.should_listen {
            debug!(generation, "Skipping restart for an inactive session");
            return;
        }
        self.restart_task = None;

        if let Some(engine) = self.engine.as_mut() {
            match engine.start() {
                Ok(()) => {
                    self.stats.restarts += 1;
                    debug!(generation, "Recognizer restarted");
                }
                Err(err) => debug!(generation, error = %err, "Recognizer restart ignored"),
            }
        }
    }

    /// Build a fresh engine for the current language and start it.
    fn attach_and_start(&mut self) -> StartOutcome {
        if let Some(mut previous) = self.engine.take() {
            if let Err(err) = previous.abort() {
                debug!(error = %err, "Aborting previous recognizer failed");
            }
        }

        let options =
            RecognizerOptions::continuous(self.language.speech_tag(), self.settings.max_alternatives);
        let callbacks = RecognizerCallbacks::new(self.generation, self.events.clone());
        let mut engine = self.factory.create(&options, callbacks);
        self.initializing = false;

        match engine.start() {
            Ok(()) => {
                self.engine = Some(engine);
                self.should_listen = true;
                self.set_status(VoiceStatus::Listening);
                info!(
                    generation = self.generation,
                    language = %options.language_tag,
                    "Voice session listening"
                );
                StartOutcome::Listening
            }
            Err(err) => {
                warn!(error = %err, "Recognizer failed to start");
                self.stats.terminal_errors += 1;
                self.set_status(VoiceStatus::Error(RecognitionError::Other(err.to_string())));
                StartOutcome::Failed(err)
            }
        }
    }

    fn spawn_priming(&mut self) {
        let generation = self.generation;
        let request = self.primer.request_access();
        let settle = self.settings.priming_settle;
        let events = self.events.clone();

        debug!(generation, "Requesting microphone access before starting the recognizer");
        self.priming_task = Some(tokio::spawn(async move {
            let result = match request.await {
                Ok(stream) => {
                    stream.release();
                    tokio::time::sleep(settle).await;
                    Ok(())
                }
                Err(err) => Err(err),
            };
            let _ = events.send(SessionEvent::PrimingFinished { generation, result });
        }));
    }

    fn schedule_restart(&mut self) {
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }

        let generation = self.generation;
        let delay = self.settings.restart_delay;
        let events = self.events.clone();
        self.restart_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::RestartDue { generation });
        }));
    }

    /// Shared by `stop()` and terminal errors: forget the session and release the engine.
    fn teardown(&mut self) {
        self.should_listen = false;
        self.initializing = false;
        self.generation += 1;

        if let Some(task) = self.priming_task.take() {
            task.abort();
        }
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }
        if let Some(mut engine) = self.engine.take() {
            if let Err(err) = engine.stop() {
                debug!(error = %err, "Stopping recognizer failed");
            }
        }
    }

    fn set_status(&mut self, status: VoiceStatus) {
        debug_assert!(status != VoiceStatus::Listening || self.engine.is_some());
        debug!(from = self.status.as_str(), to = status.as_str(), "Voice status changed");
        self.status = status;
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(task) = self.priming_task.take() {
            task.abort();
        }
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }
    }
}
