//! Command-phrase detection in recognizer transcripts.
//!
//! A transcript matches when, lower-cased and trimmed, it contains any of the
//! active language's command phrases as a substring.

use crate::voice::recognizer::ResultBatch;

/// A command found in a result batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// The normalized transcript that matched
    pub transcript: String,
    pub phrase: String,
}

/// Per-language set of command phrases (synonyms of "next").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatcher {
    phrases: Vec<String>,
}

impl CommandMatcher {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// The first configured phrase contained in `transcript`, if any.
    pub fn matches(&self, transcript: &str) -> Option<&str> {
        let transcript = normalize(transcript);
        self.phrases
            .iter()
            .find(|phrase| transcript.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Scan the new results of one recognizer event.
    ///
    /// Interim results are skipped. The first alternative of the first
    /// finalized result that matches wins; the rest of the batch is ignored, so
    /// one event yields at most one command.
    pub fn find_in_batch(&self, batch: &ResultBatch) -> Option<CommandMatch> {
        batch
            .fresh()
            .iter()
            .filter(|result| result.is_final)
            .flat_map(|result| result.alternatives.iter())
            .find_map(|alternative| {
                self.matches(&alternative.transcript).map(|phrase| CommandMatch {
                    transcript: normalize(&alternative.transcript),
                    phrase: phrase.to_string(),
                })
            })
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
