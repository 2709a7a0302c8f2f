//! Persisted user preferences.
//!
//! The chosen language is the only thing remembered between runs. It is kept
//! as a small JSON document, e.g. `{"language":"en"}`.

use crate::error::AppResult;
use crate::i18n::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub language: Option<Language>,
}

/// Reads and writes the preference file. A store without a path remembers nothing.
#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
}

impl PreferenceStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Read the stored preferences.
    ///
    /// A missing file is not an error. A corrupt one is logged and treated as
    /// empty so a bad write never keeps the game from starting.
    pub fn load(&self) -> Preferences {
        let Some(path) = self.path.as_deref() else {
            return Preferences::default();
        };

        match Self::read(path) {
            Ok(Some(preferences)) => {
                debug!(path = %path.display(), "Loaded preferences");
                preferences
            }
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable preferences");
                Preferences::default()
            }
        }
    }

    /// Remember the chosen language.
    pub fn save_language(&self, language: Language) -> AppResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let preferences = Preferences {
            language: Some(language),
        };
        fs::write(path, serde_json::to_string(&preferences)?)?;
        debug!(path = %path.display(), language = %language, "Saved language preference");
        Ok(())
    }

    fn read(path: &Path) -> AppResult<Option<Preferences>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
