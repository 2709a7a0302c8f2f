//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Converts between these structs and TOML / environment values
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **impl blocks**: Conversions from raw config values into the types the game uses
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_VOICE__RESTART_DELAY_MS, APP_GAME__PLAYERS, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore in environment variables,
//! so single underscores inside key names survive. List values (players, rows)
//! are comma separated: `APP_GAME__PLAYERS="Ann,Bob,Cy"`.

use crate::i18n::Language;
use crate::voice::announcer::VoiceParams;
use crate::voice::priming::{PlatformSignature, PrimingPolicy};
use crate::voice::session::VoiceSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section belongs to one part of the program: the game setup, the
/// recognizer side of the voice session, the announcer, and the preference file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Empty lists are dropped by the `config` crate, so this section may be absent entirely
    #[serde(default)]
    pub game: GameConfig,
    pub voice: VoiceConfig,
    pub speech: SpeechConfig,
    pub storage: StorageConfig,
}

/// Game setup.
///
/// ## Fields:
/// - `players`: Player names in turn order. Empty means the localized defaults ("Player 1", "Player 2")
/// - `rows`: The four mat row labels. Empty means the localized colors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub players: Vec<String>,
    pub rows: Vec<String>,
}

/// Voice recognition settings.
///
/// ## Fields:
/// - `enabled`: When false the recognizer is reported as missing
/// - `secure_context`: Whether the app runs in a secure context. Only decides which
///   message is shown when no recognizer is available
/// - `restart_delay_ms`: Debounce before restarting an ended recognizer session
/// - `priming_settle_ms`: Wait after releasing the priming stream
/// - `max_alternatives`: Ranked candidates requested per result
/// - `priming`: `auto` (decide from the platform signature), `always` or `never`
/// - `user_agent` / `platform` / `max_touch_points`: The platform signature used by `auto`
/// - `silence_timeout_secs`: Console engine only. Ends the recognizer session after
///   this long without input, like platform recognizers do (0 disables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub secure_context: bool,
    pub restart_delay_ms: u64,
    pub priming_settle_ms: u64,
    pub max_alternatives: usize,
    pub priming: PrimingPolicy,
    pub user_agent: String,
    pub platform: String,
    pub max_touch_points: u32,
    pub silence_timeout_secs: u64,
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub rate: f32,
    pub pitch: f32,
}

/// Where the language preference lives.
///
/// ## Fields:
/// - `preferences_path`: JSON file holding the chosen language. Empty disables persistence
/// - `default_language`: Used when no preference has been saved yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub preferences_path: String,
    pub default_language: Language,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// The game must start with no configuration at all: two default players,
/// the four mat colors, voice on, Russian.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            voice: VoiceConfig {
                enabled: true,
                secure_context: true,
                restart_delay_ms: 300, // Long enough for the engine to settle after `end`
                priming_settle_ms: 600,
                max_alternatives: 3,
                priming: PrimingPolicy::Auto,
                user_agent: String::new(),
                platform: String::new(),
                max_touch_points: 0,
                silence_timeout_secs: 8,
            },
            speech: SpeechConfig {
                enabled: true,
                rate: 0.95,
                pitch: 1.0,
            },
            storage: StorageConfig {
                preferences_path: "blind-twister.json".to_string(),
                default_language: Language::Ru,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from `config.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from the named file (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: Chain method calls to configure the config loader
    /// - **?**: Early return on error (if any step fails, return the error)
    ///
    /// ## Environment Variable Examples:
    /// - `APP_VOICE__PRIMING=always`: Force the microphone prompt
    /// - `APP_VOICE__RESTART_DELAY_MS=500`: Slower restarts
    /// - `APP_STORAGE__DEFAULT_LANGUAGE=en`: Start in English
    pub fn load_from(file: &str) -> Result<Self> {
        let settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. required(false) means "don't error if missing"
            .add_source(config::File::with_name(file).required(false))
            // 3. APP_SECTION__KEY becomes section.key
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("game.players")
                    .with_list_parse_key("game.rows"),
            );

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Restart delay is not 0 (an instant restart races the ending session)
    /// - At least one alternative is requested
    /// - Speech rate and pitch are in (0, 10]
    /// - Configured players/rows, when given, satisfy the game setup rules
    pub fn validate(&self) -> Result<()> {
        if self.voice.restart_delay_ms == 0 {
            return Err(anyhow::anyhow!("Voice restart delay cannot be 0"));
        }

        if self.voice.max_alternatives == 0 {
            return Err(anyhow::anyhow!("Max alternatives must be greater than 0"));
        }

        for (name, value) in [("rate", self.speech.rate), ("pitch", self.speech.pitch)] {
            if !(value > 0.0 && value <= 10.0) {
                return Err(anyhow::anyhow!("Speech {} must be in (0, 10], got {}", name, value));
            }
        }

        let players = &self.game.players;
        if !players.is_empty() {
            if players.len() < crate::game::turn::MIN_PLAYERS {
                return Err(anyhow::anyhow!("At least 2 players are required, got {}", players.len()));
            }
            if players.iter().any(|p| p.trim().is_empty()) {
                return Err(anyhow::anyhow!("Player names cannot be blank"));
            }
        }

        let rows = &self.game.rows;
        if !rows.is_empty() {
            if rows.len() != crate::game::turn::ROW_COUNT {
                return Err(anyhow::anyhow!("Exactly 4 rows are required, got {}", rows.len()));
            }
            if rows.iter().any(|r| r.trim().is_empty()) {
                return Err(anyhow::anyhow!("Row labels cannot be blank"));
            }
        }

        Ok(())
    }

    /// Controller timings and platform signature.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            restart_delay: Duration::from_millis(self.voice.restart_delay_ms),
            priming_settle: Duration::from_millis(self.voice.priming_settle_ms),
            max_alternatives: self.voice.max_alternatives,
            priming: self.voice.priming,
            platform: PlatformSignature {
                user_agent: self.voice.user_agent.clone(),
                platform: self.voice.platform.clone(),
                max_touch_points: self.voice.max_touch_points,
            },
        }
    }

    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            rate: self.speech.rate,
            pitch: self.speech.pitch,
        }
    }

    /// `None` when persistence is switched off.
    pub fn preferences_path(&self) -> Option<PathBuf> {
        let path = self.storage.preferences_path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Silence timeout for the console engine, `None` when disabled.
    pub fn silence_timeout(&self) -> Option<Duration> {
        (self.voice.silence_timeout_secs > 0).then(|| Duration::from_secs(self.voice.silence_timeout_secs))
    }
}
