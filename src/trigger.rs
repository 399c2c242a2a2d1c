use serde::Deserialize;

/// Wake phrase settings. Immutable for the lifetime of a recognition
/// session; changing them requires a session restart.
#[derive(Deserialize, Debug, Clone)]
pub struct TriggerPhraseConfig {
    #[serde(default = "default_phrase")]
    pub phrase: String,
    /// BCP-47 language tag for the recognition session
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_phrase() -> String {
    "Help Aura".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for TriggerPhraseConfig {
    fn default() -> Self {
        Self {
            phrase: default_phrase(),
            language: default_language(),
        }
    }
}

const MAX_PHRASE_DISTANCE: usize = 2;
const MAX_HELP_WORD_DISTANCE: usize = 1;

/// Fuzzy check for the trigger phrase in a live transcript.
///
/// Transcripts come back from recognition backends with inconsistent casing,
/// joined words and misheard syllables, so a plain substring check misses
/// real activations. A match is any of:
/// 1. transcript contains the phrase
/// 2. transcript contains the phrase with internal whitespace removed
/// 3. whole transcript is within edit distance 2 of the phrase
/// 4. a transcript word within edit distance 1 of "help" combined with
///    "aura" or "aurora" anywhere in the transcript (wake word misheard
///    as a similar sounding name)
pub fn matches(transcript: &str, trigger_phrase: &str) -> bool {
    let transcript = transcript.trim().to_lowercase();
    let phrase = trigger_phrase.trim().to_lowercase();

    if transcript.is_empty() || phrase.is_empty() {
        return false;
    }

    if transcript.contains(&phrase) {
        return true;
    }

    let squashed_phrase: String = phrase.split_whitespace().collect();
    if transcript.contains(&squashed_phrase) {
        return true;
    }

    if levenshtein(&transcript, &phrase) <= MAX_PHRASE_DISTANCE {
        return true;
    }

    let sounds_like_help = transcript
        .split_whitespace()
        .any(|word| levenshtein(word, "help") <= MAX_HELP_WORD_DISTANCE);
    sounds_like_help && (transcript.contains("aura") || transcript.contains("aurora"))
}

/// Unit cost edit distance, two row dynamic programming
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous_row: Vec<usize> = (0..=b.len()).collect();
    let mut current_row = vec![0; b.len() + 1];

    for (i, a_char) in a.iter().enumerate() {
        current_row[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            let substitution_cost = if a_char == b_char { 0 } else { 1 };
            current_row[j + 1] = (previous_row[j] + substitution_cost)
                .min(previous_row[j + 1] + 1)
                .min(current_row[j] + 1);
        }
        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row[b.len()]
}
