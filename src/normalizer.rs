//! Response normalization
//!
//! Reduces free-form tool output to its answer: drops status and reasoning
//! narration, numbered step lists, repeated sentences and splitting debris.
//! Filtering that removes everything falls back to the input text.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Line prefixes that mark narration rather than answer content
const DEFAULT_MARKERS: &[&str] = &[
    // Status tags
    "[",
    // Reasoning narration
    "I have", "I should", "The user is asking", "This is a", "This requires",
    "I will", "I need to", "Let me",
    // Step enumeration
    "First,", "Second,", "Third,",
];

const SENTENCE_BOUNDARY: &str = ". ";

lazy_static! {
    static ref NUMBERED_ITEM: Regex = Regex::new(r"^\d+\.").unwrap();
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub markers: Vec<String>,
    /// Candidates at or below this many characters may be fragments
    pub min_sentence_chars: usize,
    /// Short candidates need at least this many alphabetic words to survive
    pub min_fragment_words: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            min_sentence_chars: 20,
            min_fragment_words: 2,
        }
    }
}

impl NormalizerConfig {
    pub fn with_extra_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for marker in markers {
            let marker = marker.into();
            if !marker.is_empty() && !self.markers.contains(&marker) {
                self.markers.push(marker);
            }
        }
        self
    }
}

/// Cleaned text, or the untouched input when filtering removed everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    fallback: bool,
}

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_inner(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let cleaned = self.clean(raw);
        if cleaned.is_empty() {
            NormalizedText {
                text: raw.trim().to_string(),
                fallback: true,
            }
        } else {
            NormalizedText {
                text: cleaned,
                fallback: false,
            }
        }
    }

    fn clean(&self, raw: &str) -> String {
        let answer_lines: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !self.is_meta_commentary(line))
            .filter(|line| !NUMBERED_ITEM.is_match(line))
            .collect();

        let joined = answer_lines.join(" ").replace(".\n", SENTENCE_BOUNDARY);

        let mut seen = HashSet::new();
        let mut sentences = Vec::new();
        for candidate in joined.split(SENTENCE_BOUNDARY).map(str::trim) {
            if candidate.is_empty() || self.is_fragment(candidate) {
                continue;
            }
            if seen.insert(dedup_key(candidate)) {
                sentences.push(candidate);
            }
        }

        let mut text = sentences.join(SENTENCE_BOUNDARY);
        if !text.is_empty() && !ends_with_terminal(&text) {
            text.push('.');
        }
        text
    }

    fn is_meta_commentary(&self, line: &str) -> bool {
        self.config
            .markers
            .iter()
            .any(|marker| line.starts_with(marker.as_str()))
    }

    fn is_fragment(&self, candidate: &str) -> bool {
        if candidate.chars().count() > self.config.min_sentence_chars {
            return false;
        }
        let words = candidate
            .split_whitespace()
            .filter(|word| word.chars().any(char::is_alphabetic))
            .count();
        words < self.config.min_fragment_words
    }
}

/// Leading slice of `text` of at most `max_chars` characters, for log lines
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn dedup_key(sentence: &str) -> String {
    sentence
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn ends_with_terminal(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}
