//! # Speech Recognizer Collaborator
//!
//! The external continuous recognizer, abstracted behind two traits:
//! a `RecognizerFactory` that reports capability and builds engines, and the
//! `SpeechRecognizer` handle itself (`start` / `stop` / `abort`).
//!
//! ## Event Delivery:
//! Engines never call back into the controller directly. They get a
//! `RecognizerCallbacks` value at construction and report through its
//! `on_result` / `on_error` / `on_end` methods, which turn each callback into a
//! `SessionEvent` on the session's event channel. The channel is drained by the
//! one task that owns the controller, so an engine callback can never re-enter
//! `start()` or `stop()` while the controller is in the middle of one.

use crate::voice::session::SessionEvent;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Construction parameters for one recognizer engine.
///
/// The language is fixed at construction: changing it means building a new engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerOptions {
    /// BCP-47 tag such as "en-US"
    pub language_tag: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: usize,
}

impl RecognizerOptions {
    pub fn continuous(language_tag: impl Into<String>, max_alternatives: usize) -> Self {
        Self {
            language_tag: language_tag.into(),
            continuous: true,
            interim_results: false,
            max_alternatives,
        }
    }
}

/// Whether the platform can run a recognizer at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerCapability {
    Available,
    /// No recognizer. `secure_context` tells "unsupported here" apart from
    /// "would work over a secure origin".
    Missing { secure_context: bool },
}

/// One ranked transcript candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// One recognition result with up to `max_alternatives` ranked candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub is_final: bool,
    pub alternatives: Vec<Alternative>,
}

impl RecognitionResult {
    pub fn finalized<I, S>(transcripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_final: true,
            alternatives: transcripts
                .into_iter()
                .map(|t| Alternative {
                    transcript: t.into(),
                    confidence: 1.0,
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn interim<S: Into<String>>(transcript: S) -> Self {
        Self {
            is_final: false,
            ..Self::finalized([transcript])
        }
    }
}

/// Everything one `onResult` callback delivers.
///
/// `results` is the session's accumulated list; only entries from
/// `result_index` onwards are new in this event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultBatch {
    pub result_index: usize,
    pub results: Vec<RecognitionResult>,
}

impl ResultBatch {
    pub fn new(results: Vec<RecognitionResult>) -> Self {
        Self {
            result_index: 0,
            results,
        }
    }

    /// The results that are new in this event.
    pub fn fresh(&self) -> &[RecognitionResult] {
        self.results.get(self.result_index..).unwrap_or(&[])
    }
}

/// Error taxonomy for recognizer-originated failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The user denied microphone or dictation access
    #[error("microphone access blocked")]
    PermissionBlocked,
    /// The platform speech service is disabled or unavailable
    #[error("speech service not allowed")]
    ServiceDenied,
    /// No recognizer on this platform
    #[error("speech recognition unsupported")]
    Unsupported,
    /// Recognizer exists but is refused outside a secure context
    #[error("speech recognition requires a secure context")]
    InsecureContext,
    /// Nothing was heard; the session usually ends right after
    #[error("no speech detected")]
    NoSpeechTransient,
    /// Anything else, with the raw code
    #[error("recognizer error: {0}")]
    Other(String),
}

impl RecognitionError {
    /// Map a raw recognizer error code to the taxonomy.
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" => RecognitionError::PermissionBlocked,
            "service-not-allowed" => RecognitionError::ServiceDenied,
            "no-speech" => RecognitionError::NoSpeechTransient,
            other => RecognitionError::Other(other.to_string()),
        }
    }

    /// Whether this error ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecognitionError::NoSpeechTransient)
    }

    /// Short machine-readable name, used in logs and the status snapshot.
    pub fn kind(&self) -> &str {
        match self {
            RecognitionError::PermissionBlocked => "blocked",
            RecognitionError::ServiceDenied => "service_denied",
            RecognitionError::Unsupported => "unsupported",
            RecognitionError::InsecureContext => "insecure_context",
            RecognitionError::NoSpeechTransient => "no_speech",
            RecognitionError::Other(_) => "other",
        }
    }
}

/// Failures of the engine's own lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("recognizer already started")]
    AlreadyStarted,
    #[error("recognizer is not running")]
    NotRunning,
    #[error("recognizer failure: {0}")]
    Platform(String),
}

/// What an engine reports about its session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Result(ResultBatch),
    /// Raw error code, e.g. "not-allowed"
    Error(String),
    End,
}

/// Callback sink handed to an engine at construction.
///
/// Every event is stamped with the session generation the engine was built
/// for, so events from a replaced engine are recognizable as stale.
#[derive(Debug, Clone)]
pub struct RecognizerCallbacks {
    generation: u64,
    events: UnboundedSender<SessionEvent>,
}

impl RecognizerCallbacks {
    pub fn new(generation: u64, events: UnboundedSender<SessionEvent>) -> Self {
        Self { generation, events }
    }

    pub fn on_result(&self, batch: ResultBatch) {
        self.emit(RecognizerEvent::Result(batch));
    }

    pub fn on_error(&self, code: impl Into<String>) {
        self.emit(RecognizerEvent::Error(code.into()));
    }

    pub fn on_end(&self) {
        self.emit(RecognizerEvent::End);
    }

    fn emit(&self, event: RecognizerEvent) {
        let event = SessionEvent::Recognizer {
            generation: self.generation,
            event,
        };
        if self.events.send(event).is_err() {
            trace!(generation = self.generation, "Session event channel closed, dropping recognizer event");
        }
    }
}

/// A live recognizer instance.
pub trait SpeechRecognizer {
    fn start(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn abort(&mut self) -> Result<(), EngineError>;
}

/// Capability probe and constructor for recognizer engines.
pub trait RecognizerFactory {
    fn capability(&self) -> RecognizerCapability;

    fn create(
        &self,
        options: &RecognizerOptions,
        callbacks: RecognizerCallbacks,
    ) -> Box<dyn SpeechRecognizer>;
}
