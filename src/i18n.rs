//! # Localization
//!
//! String tables for the supported languages, embedded at compile time from
//! `assets/locales.toml` and parsed with the `toml` crate.
//!
//! Lookup is a plain keyed read: there is no fallback between languages, and a
//! missing key resolves to the key itself so a gap in a table shows up on
//! screen instead of failing.

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const BUILTIN_LOCALES: &str = include_str!("../assets/locales.toml");

/// Languages the game can be played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    En,
}

impl Language {
    /// Table key for this language.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
        }
    }

    /// Language tag handed to the recognizer and the announcer.
    pub fn speech_tag(&self) -> &'static str {
        match self {
            Language::Ru => "ru-RU",
            Language::En => "en-US",
        }
    }

    /// The language the toggle switches to.
    pub fn toggled(&self) -> Language {
        match self {
            Language::Ru => Language::En,
            Language::En => Language::Ru,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Ru
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ru" | "ru-ru" | "russian" => Ok(Language::Ru),
            "en" | "en-us" | "english" => Ok(Language::En),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

/// A single table entry: either a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LocaleValue {
    Text(String),
    List(Vec<String>),
}

/// Parsed string tables keyed by language code, then by string key.
#[derive(Debug, Clone)]
pub struct Localization {
    tables: HashMap<String, HashMap<String, LocaleValue>>,
}

impl Localization {
    /// Load the tables compiled into the binary.
    pub fn builtin() -> AppResult<Self> {
        Self::from_toml(BUILTIN_LOCALES)
    }

    pub fn from_toml(source: &str) -> AppResult<Self> {
        let tables = toml::from_str(source)?;
        Ok(Self { tables })
    }

    /// Keyed lookup. Returns the key itself when the language or key is missing.
    pub fn lookup(&self, language: Language, key: &str) -> LocaleValue {
        self.tables
            .get(language.code())
            .and_then(|table| table.get(key))
            .cloned()
            .unwrap_or_else(|| LocaleValue::Text(key.to_string()))
    }

    /// Lookup flattened to a single string (lists are joined with ", ").
    pub fn text(&self, language: Language, key: &str) -> String {
        match self.lookup(language, key) {
            LocaleValue::Text(text) => text,
            LocaleValue::List(items) => items.join(", "),
        }
    }

    /// Lookup as a list (a plain string becomes a one-element list).
    pub fn list(&self, language: Language, key: &str) -> Vec<String> {
        match self.lookup(language, key) {
            LocaleValue::Text(text) => vec![text],
            LocaleValue::List(items) => items,
        }
    }

    /// Default player names shown before the group enters their own.
    pub fn default_players(&self, language: Language) -> Vec<String> {
        vec![
            self.text(language, "defPlayer1"),
            self.text(language, "defPlayer2"),
        ]
    }

    /// Default row labels (the mat colors).
    pub fn default_rows(&self, language: Language) -> Vec<String> {
        (1..=4)
            .map(|i| self.text(language, &format!("defRow{}", i)))
            .collect()
    }
}
