//! Fallback voice selection.
//!
//! Local speech engines expose a list of installed voices. Picking one is a
//! pure scoring pass over those candidates so it can be tested without any
//! audio stack present.

use serde::{Deserialize, Serialize};

/// Score for an exact language match (`en_US` vs `en_US`).
const EXACT_LANGUAGE_SCORE: u32 = 10;
/// Score for a base-language match (`en` vs `en_GB`).
const BASE_LANGUAGE_SCORE: u32 = 5;
/// Score per preferred tag found on the candidate.
const TAG_SCORE: u32 = 2;

/// What the user would like the fallback voice to sound like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePreference {
    /// BCP-47-ish language code, e.g. `en` or `en_US`.
    pub language: String,
    /// Tags matched against the candidate's tags and name.
    pub preferred_tags: Vec<String>,
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self {
            language: "en".to_owned(),
            preferred_tags: vec!["female".to_owned()],
        }
    }
}

/// One installed voice reported by a local speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCandidate {
    /// Engine-specific voice name, passed back to the engine verbatim.
    pub name: String,
    /// Language code as the engine reports it.
    pub language: String,
    /// Free-form descriptive tags (gender, quality, accent...).
    pub tags: Vec<String>,
}

impl VoiceCandidate {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Score one candidate against a preference. Higher is better.
pub fn score_voice(candidate: &VoiceCandidate, preference: &VoicePreference) -> u32 {
    let mut score = 0;

    let wanted = normalize_language(&preference.language);
    let offered = normalize_language(&candidate.language);
    if !wanted.is_empty() {
        if wanted == offered {
            score += EXACT_LANGUAGE_SCORE;
        } else if base_language(&wanted) == base_language(&offered) {
            score += BASE_LANGUAGE_SCORE;
        }
    }

    let name = candidate.name.to_lowercase();
    for tag in &preference.preferred_tags {
        let tag = tag.to_lowercase();
        if tag.is_empty() {
            continue;
        }
        let tagged = candidate.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag));
        if tagged || name.contains(&tag) {
            score += TAG_SCORE;
        }
    }
    score
}

/// Pick the best candidate for `preference`.
///
/// Ties keep the earliest candidate, so the result only depends on the
/// input order. Returns `None` for an empty list.
pub fn select_voice<'a>(
    candidates: &'a [VoiceCandidate],
    preference: &VoicePreference,
) -> Option<&'a VoiceCandidate> {
    let mut best: Option<(&VoiceCandidate, u32)> = None;
    for candidate in candidates {
        let score = score_voice(candidate, preference);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn normalize_language(code: &str) -> String {
    code.trim().replace('-', "_").to_lowercase()
}

fn base_language(code: &str) -> &str {
    code.split('_').next().unwrap_or(code)
}
