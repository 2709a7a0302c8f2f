//! # Console Collaborators
//!
//! Terminal-backed implementations of the voice seams, used by the shipped binary.
//!
//! ## How "speech" works here:
//! - **Recognizer**: a line typed while the recognizer session is open counts
//!   as heard speech and is delivered as one finalized result with a single
//!   alternative. After `silence_timeout` without input the session reports
//!   `no-speech` and ends on its own, the way platform recognizers give up on
//!   silence, which sends the controller through its restart path.
//! - **Announcer**: prints the utterance. Voice, rate and pitch go to the debug log.
//! - **Primer**: `StaticPrimer::granting()`; the terminal has no permission prompt.
//!
//! ## Rust Concepts:
//! - **Rc<RefCell<T>>**: the factory, the engine it built and the main loop all
//!   look at the same microphone slot. Everything runs on one thread, so
//!   shared ownership plus runtime borrow checking is enough.

use crate::voice::announcer::{SpeechAnnouncer, Utterance};
use crate::voice::recognizer::{
    EngineError, RecognitionResult, RecognizerCallbacks, RecognizerCapability, RecognizerFactory,
    RecognizerOptions, ResultBatch, SpeechRecognizer,
};
use crate::voice::session::StatusLine;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// The engine currently attached to the terminal.
struct EngineSlot {
    id: u64,
    callbacks: RecognizerCallbacks,
    running: bool,
    last_activity: Instant,
}

#[derive(Default)]
struct MicrophoneInner {
    next_id: u64,
    slot: Option<EngineSlot>,
}

/// Shared handle to the terminal "microphone".
#[derive(Clone)]
pub struct ConsoleMicrophone {
    inner: Rc<RefCell<MicrophoneInner>>,
    silence_timeout: Option<Duration>,
}

impl ConsoleMicrophone {
    pub fn new(silence_timeout: Option<Duration>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MicrophoneInner::default())),
            silence_timeout,
        }
    }

    /// Whether a recognizer session is open and would hear a line.
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.inner.borrow().slot.as_ref().is_some_and(|slot| slot.running)
    }

    /// Deliver a typed line as heard speech. Returns false when nothing is listening.
    pub fn hear(&self, line: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(slot) = inner.slot.as_mut().filter(|slot| slot.running) else {
            return false;
        };

        slot.last_activity = Instant::now();
        trace!(engine = slot.id, line, "Console recognizer heard a line");
        slot.callbacks
            .on_result(ResultBatch::new(vec![RecognitionResult::finalized([line])]));
        true
    }

    /// End the open session if it has been silent for too long.
    ///
    /// Like a platform recognizer, a silent session reports `no-speech` first
    /// and then ends.
    pub fn check_silence(&self, now: Instant) {
        let Some(timeout) = self.silence_timeout else {
            return;
        };
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slot.as_mut() {
            if slot.running && now.saturating_duration_since(slot.last_activity) >= timeout {
                debug!(engine = slot.id, "Console recognizer session ended on silence");
                slot.running = false;
                slot.callbacks.on_error("no-speech");
                slot.callbacks.on_end();
            }
        }
    }

    fn attach(&self, callbacks: RecognizerCallbacks) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.slot = Some(EngineSlot {
            id,
            callbacks,
            running: false,
            last_activity: Instant::now(),
        });
        id
    }

    fn with_slot<T>(
        &self,
        id: u64,
        f: impl FnOnce(&mut EngineSlot) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.inner.borrow_mut();
        match inner.slot.as_mut() {
            Some(slot) if slot.id == id => f(slot),
            _ => Err(EngineError::Platform("recognizer was replaced".to_string())),
        }
    }
}

/// Builds console recognizers, or reports none when voice is switched off.
pub struct ConsoleRecognizerFactory {
    microphone: ConsoleMicrophone,
    capability: RecognizerCapability,
}

impl ConsoleRecognizerFactory {
    pub fn new(microphone: ConsoleMicrophone, enabled: bool, secure_context: bool) -> Self {
        let capability = if enabled {
            RecognizerCapability::Available
        } else {
            RecognizerCapability::Missing { secure_context }
        };
        Self {
            microphone,
            capability,
        }
    }
}

impl RecognizerFactory for ConsoleRecognizerFactory {
    fn capability(&self) -> RecognizerCapability {
        self.capability
    }

    fn create(&self, options: &RecognizerOptions, callbacks: RecognizerCallbacks) -> Box<dyn SpeechRecognizer> {
        let id = self.microphone.attach(callbacks);
        debug!(engine = id, language = %options.language_tag, "Console recognizer created");
        Box::new(ConsoleRecognizer {
            microphone: self.microphone.clone(),
            id,
        })
    }
}

/// One console recognizer engine.
pub struct ConsoleRecognizer {
    microphone: ConsoleMicrophone,
    id: u64,
}

impl ConsoleRecognizer {
    fn end(&mut self) -> Result<(), EngineError> {
        self.microphone.with_slot(self.id, |slot| {
            if !slot.running {
                return Err(EngineError::NotRunning);
            }
            slot.running = false;
            slot.callbacks.on_end();
            Ok(())
        })
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self) -> Result<(), EngineError> {
        self.microphone.with_slot(self.id, |slot| {
            if slot.running {
                return Err(EngineError::AlreadyStarted);
            }
            slot.running = true;
            slot.last_activity = Instant::now();
            Ok(())
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.end()
    }

    fn abort(&mut self) -> Result<(), EngineError> {
        self.end()
    }
}

/// Prints each announcement to stdout.
#[derive(Debug, Default)]
pub struct ConsoleAnnouncer;

impl SpeechAnnouncer for ConsoleAnnouncer {
    fn speak(&self, utterance: &Utterance) {
        debug!(
            language = %utterance.language_tag,
            rate = utterance.params.rate,
            pitch = utterance.params.pitch,
            "Speaking"
        );
        println!(">> {}", utterance.text);
    }
}

/// One-line rendering of the two-part status.
pub fn render_status(line: &StatusLine) -> String {
    format!("[{}] {}", line.glyph, line.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::recognizer::RecognizerEvent;
    use crate::voice::session::SessionEvent;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn console_factory(timeout: Option<Duration>) -> (ConsoleRecognizerFactory, ConsoleMicrophone, UnboundedReceiver<SessionEvent>, RecognizerCallbacks) {
        let microphone = ConsoleMicrophone::new(timeout);
        let (tx, rx) = mpsc::unbounded_channel();
        let callbacks = RecognizerCallbacks::new(1, tx);
        (
            ConsoleRecognizerFactory::new(microphone.clone(), true, true),
            microphone,
            rx,
            callbacks,
        )
    }

    fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> RecognizerEvent {
        match rx.try_recv().unwrap() {
            SessionEvent::Recognizer { event, .. } => event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lines_are_heard_only_while_running() {
        let (factory, microphone, mut rx, callbacks) = console_factory(None);
        let options = RecognizerOptions::continuous("en-US", 3);
        let mut engine = factory.create(&options, callbacks);

        assert!(!microphone.hear("next"));
        engine.start().unwrap();
        assert!(microphone.is_open());
        assert!(microphone.hear("next"));

        match next_event(&mut rx) {
            RecognizerEvent::Result(batch) => {
                assert_eq!(batch.results.len(), 1);
                assert!(batch.results[0].is_final);
                assert_eq!(batch.results[0].alternatives[0].transcript, "next");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_ends_session() {
        let (factory, microphone, mut rx, callbacks) = console_factory(None);
        let mut engine = factory.create(&RecognizerOptions::continuous("en-US", 3), callbacks);

        engine.start().unwrap();
        assert_eq!(engine.start(), Err(EngineError::AlreadyStarted));
        engine.stop().unwrap();

        assert!(!microphone.is_open());
        assert_eq!(next_event(&mut rx), RecognizerEvent::End);
        assert_eq!(engine.abort(), Err(EngineError::NotRunning));
    }

    #[tokio::test]
    async fn test_silence_ends_session_and_restart_reopens_it() {
        let (factory, microphone, mut rx, callbacks) = console_factory(Some(Duration::from_secs(5)));
        let mut engine = factory.create(&RecognizerOptions::continuous("en-US", 3), callbacks);
        engine.start().unwrap();

        microphone.check_silence(Instant::now() + Duration::from_secs(1));
        assert!(microphone.is_open());

        microphone.check_silence(Instant::now() + Duration::from_secs(6));
        assert!(!microphone.is_open());
        assert_eq!(next_event(&mut rx), RecognizerEvent::Error("no-speech".to_string()));
        assert_eq!(next_event(&mut rx), RecognizerEvent::End);
        assert!(rx.try_recv().is_err());

        engine.start().unwrap();
        assert!(microphone.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_keeps_session_listening_through_restart() {
        use crate::i18n::{Language, Localization};
        use crate::voice::priming::{PrimingPolicy, StaticPrimer};
        use crate::voice::session::{VoiceSession, VoiceSettings, VoiceStatus};
        use std::sync::Arc;

        let microphone = ConsoleMicrophone::new(Some(Duration::from_secs(5)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = VoiceSettings {
            priming: PrimingPolicy::Never,
            ..VoiceSettings::default()
        };
        let mut session = VoiceSession::new(
            settings,
            Language::En,
            Arc::new(Localization::builtin().unwrap()),
            Box::new(ConsoleRecognizerFactory::new(microphone.clone(), true, true)),
            Arc::new(StaticPrimer::granting()),
            tx,
        );
        session.start();
        assert!(microphone.is_open());

        microphone.check_silence(Instant::now() + Duration::from_secs(6));
        while let Ok(event) = rx.try_recv() {
            session.handle_event(event);
        }
        assert_eq!(session.status(), &VoiceStatus::Listening);
        assert_eq!(session.stats().terminal_errors, 0);
        assert!(!microphone.is_open());

        let restart = rx.recv().await.unwrap();
        session.handle_event(restart);
        assert!(microphone.is_open());
        assert_eq!(session.stats().restarts, 1);
    }

    #[tokio::test]
    async fn test_replaced_engine_is_detached() {
        let (factory, microphone, _rx, callbacks) = console_factory(None);
        let options = RecognizerOptions::continuous("en-US", 3);
        let mut old = factory.create(&options, callbacks.clone());
        let mut new = factory.create(&options, callbacks);

        assert!(matches!(old.start(), Err(EngineError::Platform(_))));
        new.start().unwrap();
        assert!(microphone.is_open());
    }

    #[test]
    fn test_disabled_voice_reports_missing() {
        let microphone = ConsoleMicrophone::new(None);
        let factory = ConsoleRecognizerFactory::new(microphone.clone(), false, false);
        assert_eq!(
            factory.capability(),
            RecognizerCapability::Missing { secure_context: false }
        );
    }

    #[test]
    fn test_render_status() {
        let line = StatusLine {
            glyph: "REC",
            message: "Listening".to_string(),
        };
        assert_eq!(render_status(&line), "[REC] Listening");
    }
}
