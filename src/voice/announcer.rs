//! Speech Announcer collaborator: fire-and-forget text-to-speech.

use serde::{Deserialize, Serialize};

/// Voice parameters applied to every utterance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.0,
        }
    }
}

/// One thing to say.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language_tag: String,
    pub params: VoiceParams,
}

/// The external `speak(text, languageTag, rate, pitch)` call.
///
/// Implementations cancel whatever they are still saying before starting the
/// new utterance. Nothing is returned: failures stay inside the announcer.
pub trait SpeechAnnouncer {
    fn speak(&self, utterance: &Utterance);
}

/// Announcer used when speech output is switched off.
#[derive(Debug, Default)]
pub struct SilentAnnouncer;

impl SpeechAnnouncer for SilentAnnouncer {
    fn speak(&self, _utterance: &Utterance) {}
}
