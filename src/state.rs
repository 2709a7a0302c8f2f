//! # Application State Management
//!
//! `AppState` is the presentation layer: it owns the turn state, the voice
//! session, the move history and the counters, and it is the only place that
//! reacts to a recognized voice command by advancing the turn.
//!
//! ## Key Rust Concepts:
//!
//! ### Single owner instead of Arc<RwLock<T>>
//! - **Purpose**: Everything here is touched from one event loop on one thread
//! - **Why it works**: `main` owns the `AppState` and hands out `&mut self` one
//!   event at a time, so there is never a second reader to lock against
//! - **Consequence**: Collaborators behind trait objects don't need `Send`
//!
//! ### Trait objects for the outside world
//! - **Box<dyn RecognizerFactory>** and **Box<dyn SpeechAnnouncer>** are supplied
//!   by the caller, which is how tests swap in recorders and the binary swaps in
//!   the terminal implementations
//!
//! ## Ordering guarantee:
//! A voice command is returned by `VoiceSession::handle_event()` and only then
//! turned into `next_turn()`. The session is never mid-transition while the
//! turn advances, and the turn state is never touched by the session itself.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::game::{Announcement, HistoryEntry, MoveHistory, TurnState};
use crate::i18n::{Language, Localization};
use crate::preferences::PreferenceStore;
use crate::voice::announcer::{SpeechAnnouncer, Utterance, VoiceParams};
use crate::voice::priming::MicrophonePrimer;
use crate::voice::recognizer::RecognizerFactory;
use crate::voice::session::{SessionEvent, SessionStats, StartOutcome, StatusLine, VoiceSession, VoiceStatus};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// The outside-world implementations the state is wired to.
pub struct Collaborators {
    pub recognizer: Box<dyn RecognizerFactory>,
    pub primer: Arc<dyn MicrophonePrimer>,
    pub announcer: Box<dyn SpeechAnnouncer>,
}

/// What triggered a turn advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceSource {
    Manual,
    Voice,
}

/// Counters for one run of the game.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct AppMetrics {
    /// Total turns advanced, all games included
    pub turns_advanced: u64,
    pub manual_advances: u64,
    pub voice_advances: u64,
    pub games_started: u64,
}

/// Everything the `:status` command prints.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot<'a> {
    pub language: Language,
    pub voice_status: &'a str,
    pub error_kind: Option<&'a str>,
    pub status: StatusLine,
    pub listening: bool,
    pub current_player: &'a str,
    pub current_player_index: usize,
    pub last_announcement: Option<HistoryEntry>,
    pub history: Vec<&'a HistoryEntry>,
    pub metrics: AppMetrics,
    pub voice: SessionStats,
    pub uptime_secs: u64,
}

pub struct AppState {
    config: AppConfig,
    localization: Arc<Localization>,
    language: Language,
    turns: TurnState,
    /// When the turn state's last announcement was made
    announced_at: Option<DateTime<Utc>>,
    history: MoveHistory,
    voice: VoiceSession,
    announcer: Box<dyn SpeechAnnouncer>,
    voice_params: VoiceParams,
    rng: StdRng,
    preferences: PreferenceStore,
    metrics: AppMetrics,
    start_time: Instant,
}

impl AppState {
    /// Build the state and start the first game.
    ///
    /// The language comes from the preference file when one was saved,
    /// otherwise from `storage.default_language`.
    pub fn new(
        config: AppConfig,
        localization: Arc<Localization>,
        collaborators: Collaborators,
        events: UnboundedSender<SessionEvent>,
        rng: StdRng,
    ) -> AppResult<Self> {
        let preferences = PreferenceStore::new(config.preferences_path());
        let language = preferences
            .load()
            .language
            .unwrap_or(config.storage.default_language);

        let turns = Self::build_turns(&config, &localization, language)?;
        let voice = VoiceSession::new(
            config.voice_settings(),
            language,
            localization.clone(),
            collaborators.recognizer,
            collaborators.primer,
            events,
        );

        let state = Self {
            voice_params: config.voice_params(),
            config,
            localization,
            language,
            turns,
            announced_at: None,
            history: MoveHistory::default(),
            voice,
            announcer: collaborators.announcer,
            rng,
            preferences,
            metrics: AppMetrics {
                games_started: 1,
                ..AppMetrics::default()
            },
            start_time: Instant::now(),
        };

        info!(
            language = %state.language,
            players = state.turns.players().len(),
            "Game started"
        );
        Ok(state)
    }

    /// Configured players/rows, or the localized defaults when none are configured.
    fn build_turns(config: &AppConfig, localization: &Localization, language: Language) -> AppResult<TurnState> {
        let players = if config.game.players.is_empty() {
            localization.default_players(language)
        } else {
            config.game.players.clone()
        };
        let rows = if config.game.rows.is_empty() {
            localization.default_rows(language)
        } else {
            config.game.rows.clone()
        };
        TurnState::new(players, rows)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn localization(&self) -> &Localization {
        &self.localization
    }

    pub fn turns(&self) -> &TurnState {
        &self.turns
    }

    pub fn history(&self) -> &MoveHistory {
        &self.history
    }

    pub fn voice(&self) -> &VoiceSession {
        &self.voice
    }

    #[cfg(test)]
    pub fn metrics(&self) -> AppMetrics {
        self.metrics
    }

    /// Localized string in the active language.
    pub fn text(&self, key: &str) -> String {
        self.localization.text(self.language, key)
    }

    /// The line shown for the current move.
    ///
    /// Before the first advance it names the first player and asks for "next".
    pub fn current_prompt(&self) -> String {
        match self.turns.last_announcement() {
            Some(announcement) => announcement.spoken_text(&self.localization, self.language),
            None => format!("{}: {}", self.turns.current_player(), self.text("pressNext")),
        }
    }

    /// The move on screen: the turn state's last announcement with its timestamp.
    pub fn current_entry(&self) -> Option<HistoryEntry> {
        let announcement = self.turns.last_announcement()?.clone();
        Some(HistoryEntry {
            announcement,
            announced_at: self.announced_at.unwrap_or_else(Utc::now),
        })
    }

    /// Advance to the next move and announce it.
    pub fn next_turn(&mut self, source: AdvanceSource) -> Announcement {
        if let Some(previous) = self.current_entry() {
            self.history.push(previous);
        }

        let announcement = self.turns.advance(&mut self.rng);
        self.announced_at = Some(Utc::now());

        self.metrics.turns_advanced += 1;
        match source {
            AdvanceSource::Manual => self.metrics.manual_advances += 1,
            AdvanceSource::Voice => self.metrics.voice_advances += 1,
        }

        let text = announcement.spoken_text(&self.localization, self.language);
        info!(
            player = %announcement.player,
            limb = ?announcement.limb,
            row = %announcement.row,
            source = ?source,
            history = self.history.len(),
            "Turn advanced"
        );
        self.announcer.speak(&Utterance {
            text,
            language_tag: self.language.speech_tag().to_string(),
            params: self.voice_params,
        });

        announcement
    }

    /// Feed one session event to the controller; a recognized command advances the turn.
    pub fn handle_session_event(&mut self, event: SessionEvent) -> Option<Announcement> {
        self.voice.handle_event(event)?;
        Some(self.next_turn(AdvanceSource::Voice))
    }

    /// The microphone button.
    pub fn toggle_voice(&mut self) -> Option<StartOutcome> {
        self.voice.toggle()
    }

    /// Switch between the two languages and remember the choice.
    ///
    /// The turn state is left alone: players, rows, pointer and last move stay as they are.
    pub fn toggle_language(&mut self) -> Language {
        self.language = self.language.toggled();
        if let Err(err) = self.preferences.save_language(self.language) {
            warn!(error = %err, "Failed to save language preference");
        }
        self.voice.set_language(self.language);
        self.language
    }

    /// Leave the game and start a new one with the configured (or localized default) setup.
    pub fn restart_game(&mut self) -> AppResult<()> {
        self.voice.stop();
        self.turns = Self::build_turns(&self.config, &self.localization, self.language)?;
        self.announced_at = None;
        self.history.clear();
        self.metrics.games_started += 1;
        info!(players = self.turns.players().len(), "Game restarted");
        Ok(())
    }

    pub fn snapshot(&self) -> StatusSnapshot<'_> {
        let status = self.voice.status();
        StatusSnapshot {
            language: self.language,
            voice_status: status.as_str(),
            error_kind: match status {
                VoiceStatus::Error(err) => Some(err.kind()),
                _ => None,
            },
            status: self.voice.status_line(),
            listening: self.voice.listening_indicator(),
            current_player: self.turns.current_player(),
            current_player_index: self.turns.current_player_index(),
            last_announcement: self.current_entry(),
            history: self.history.iter().collect(),
            metrics: self.metrics,
            voice: self.voice.stats(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn snapshot_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Stop listening and log the run summary.
    pub fn shutdown(&mut self) {
        if self.voice.is_active() {
            self.voice.stop();
        }
        let voice = self.voice.stats();
        info!(
            turns = self.metrics.turns_advanced,
            manual = self.metrics.manual_advances,
            voice = self.metrics.voice_advances,
            games = self.metrics.games_started,
            restarts = voice.restarts,
            recognizer_errors = voice.terminal_errors,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Session summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::priming::StaticPrimer;
    use crate::voice::recognizer::{
        EngineError, RecognitionResult, RecognizerCallbacks, RecognizerCapability, RecognizerOptions, ResultBatch,
        SpeechRecognizer,
    };
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    #[derive(Clone, Default)]
    struct Log {
        created: Rc<RefCell<Vec<String>>>,
        callbacks: Rc<RefCell<Vec<RecognizerCallbacks>>>,
        spoken: Rc<RefCell<Vec<Utterance>>>,
    }

    struct Engine;

    impl SpeechRecognizer for Engine {
        fn start(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn abort(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct Factory(Log);

    impl RecognizerFactory for Factory {
        fn capability(&self) -> RecognizerCapability {
            RecognizerCapability::Available
        }

        fn create(&self, options: &RecognizerOptions, callbacks: RecognizerCallbacks) -> Box<dyn SpeechRecognizer> {
            self.0.created.borrow_mut().push(options.language_tag.clone());
            self.0.callbacks.borrow_mut().push(callbacks);
            Box::new(Engine)
        }
    }

    struct Announcer(Log);

    impl SpeechAnnouncer for Announcer {
        fn speak(&self, utterance: &Utterance) {
            self.0.spoken.borrow_mut().push(utterance.clone());
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.preferences_path = String::new();
        config.storage.default_language = Language::En;
        config.voice.priming = crate::voice::priming::PrimingPolicy::Never;
        config
    }

    fn app_with(config: AppConfig) -> (AppState, UnboundedReceiver<SessionEvent>, Log) {
        let log = Log::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = AppState::new(
            config,
            Arc::new(Localization::builtin().unwrap()),
            Collaborators {
                recognizer: Box::new(Factory(log.clone())),
                primer: Arc::new(StaticPrimer::granting()),
                announcer: Box::new(Announcer(log.clone())),
            },
            tx,
            StdRng::seed_from_u64(7),
        )
        .unwrap();
        (state, rx, log)
    }

    fn app() -> (AppState, UnboundedReceiver<SessionEvent>, Log) {
        app_with(test_config())
    }

    #[test]
    fn test_localized_default_setup() {
        let (state, _rx, _log) = app();
        assert_eq!(state.turns().players(), &["Player 1", "Player 2"]);
        assert_eq!(state.turns().rows(), &["Red", "Yellow", "Blue", "Green"]);
        assert_eq!(state.current_prompt(), "Player 1: Press \"Next\"");
    }

    #[test]
    fn test_invalid_configured_setup_is_rejected() {
        let mut config = test_config();
        config.game.rows = vec!["Red".to_string()];
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = AppState::new(
            config,
            Arc::new(Localization::builtin().unwrap()),
            Collaborators {
                recognizer: Box::new(Factory(Log::default())),
                primer: Arc::new(StaticPrimer::granting()),
                announcer: Box::new(crate::voice::announcer::SilentAnnouncer),
            },
            tx,
            StdRng::seed_from_u64(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_next_turn_announces_and_keeps_history() {
        let (mut state, _rx, log) = app();

        let first = state.next_turn(AdvanceSource::Manual);
        assert_eq!(first.player, "Player 1");
        assert!(state.history().is_empty());

        let spoken = log.spoken.borrow()[0].clone();
        assert_eq!(spoken.text, state.current_prompt());
        assert_eq!(spoken.language_tag, "en-US");
        assert_eq!(spoken.params.rate, 0.95);

        for _ in 0..4 {
            state.next_turn(AdvanceSource::Manual);
        }
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.metrics().turns_advanced, 5);
        assert_eq!(log.spoken.borrow().len(), 5);

        // Newest first: the entry right before the current move comes first.
        let newest = state.history().iter().next().unwrap();
        assert_eq!(newest.announcement.player, "Player 2");
    }

    #[test]
    fn test_current_move_follows_turn_state() {
        let (mut state, _rx, _log) = app();
        assert!(state.current_entry().is_none());

        let first = state.next_turn(AdvanceSource::Manual);
        let first_entry = state.current_entry().unwrap();
        assert_eq!(Some(&first_entry.announcement), state.turns().last_announcement());
        assert_eq!(first_entry.announcement, first);

        let second = state.next_turn(AdvanceSource::Manual);
        assert_eq!(state.current_entry().unwrap().announcement, second);
        assert_eq!(state.turns().last_announcement(), Some(&second));
        // The previous move moves to history with the time it was announced.
        let previous = state.history().iter().next().unwrap();
        assert_eq!(previous.announcement, first);
        assert_eq!(previous.announced_at, first_entry.announced_at);

        state.restart_game().unwrap();
        assert!(state.current_entry().is_none());
        assert!(state.turns().last_announcement().is_none());
        assert_eq!(state.current_prompt(), "Player 1: Press \"Next\"");
    }

    #[tokio::test]
    async fn test_voice_command_advances_turn() {
        let (mut state, mut rx, log) = app();
        assert_eq!(state.toggle_voice(), Some(StartOutcome::Listening));

        let callbacks = log.callbacks.borrow().last().cloned().unwrap();
        callbacks.on_result(ResultBatch::new(vec![RecognitionResult::finalized(["next please"])]));
        callbacks.on_result(ResultBatch::new(vec![RecognitionResult::finalized(["what?"])]));

        let first = rx.try_recv().unwrap();
        let announcement = state.handle_session_event(first).unwrap();
        assert_eq!(announcement.player, "Player 1");

        let second = rx.try_recv().unwrap();
        assert!(state.handle_session_event(second).is_none());

        assert_eq!(state.metrics().voice_advances, 1);
        assert_eq!(state.turns().current_player_index(), 1);
    }

    #[tokio::test]
    async fn test_language_toggle_leaves_turn_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut config = test_config();
        config.storage.preferences_path = path.to_string_lossy().to_string();

        let (mut state, _rx, log) = app_with(config);
        state.toggle_voice();
        state.next_turn(AdvanceSource::Manual);
        let players = state.turns().players().to_vec();
        let index = state.turns().current_player_index();
        let last = state.turns().last_announcement().cloned();

        assert_eq!(state.toggle_language(), Language::Ru);

        assert_eq!(state.turns().players(), players.as_slice());
        assert_eq!(state.turns().current_player_index(), index);
        assert_eq!(state.turns().last_announcement().cloned(), last);
        assert_eq!(state.voice().status(), &VoiceStatus::Listening);
        assert_eq!(*log.created.borrow(), vec!["en-US".to_string(), "ru-RU".to_string()]);
        assert_eq!(state.voice().status_line().glyph, "REC");
        assert_eq!(state.voice().status_line().message, "Слушаю… Скажите «дальше»");

        // The choice survives a restart of the program.
        let store = PreferenceStore::new(Some(path));
        assert_eq!(store.load().language, Some(Language::Ru));
    }

    #[tokio::test]
    async fn test_restart_game_stops_voice_and_resets() {
        let (mut state, _rx, _log) = app();
        state.toggle_voice();
        state.next_turn(AdvanceSource::Manual);
        state.next_turn(AdvanceSource::Manual);
        state.toggle_language();

        state.restart_game().unwrap();

        assert_eq!(state.voice().status(), &VoiceStatus::Idle);
        assert!(state.history().is_empty());
        assert_eq!(state.turns().current_player_index(), 0);
        assert_eq!(state.turns().players(), &["Игрок 1", "Игрок 2"]);
        assert_eq!(state.metrics().games_started, 2);
    }

    #[test]
    fn test_snapshot_json() {
        let (mut state, _rx, _log) = app();
        state.next_turn(AdvanceSource::Manual);
        state.next_turn(AdvanceSource::Manual);

        let json: serde_json::Value = serde_json::from_str(&state.snapshot_json().unwrap()).unwrap();
        assert_eq!(json["language"], "en");
        assert_eq!(json["voice_status"], "idle");
        assert_eq!(json["status"]["glyph"], "---");
        assert_eq!(json["listening"], false);
        assert_eq!(json["current_player"], "Player 1");
        assert_eq!(json["current_player_index"], 0);
        assert_eq!(json["last_announcement"]["player"], "Player 2");
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
        assert_eq!(json["metrics"]["turns_advanced"], 2);
    }
}
