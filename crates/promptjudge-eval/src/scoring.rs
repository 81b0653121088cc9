//! Score extraction from free-text judge answers.
//!
//! Numeric phrasings are tried first (`x/10`, `score: x`, `x out of 10`),
//! then a sentiment keyword map, then the neutral default. Every score
//! carries its [`ScoreSource`] so noise from the fallbacks stays visible.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Score used when nothing in the text can be read as a score
pub const NEUTRAL_SCORE: f64 = 5.0;

pub const MAX_SCORE: f64 = 10.0;

lazy_static! {
    static ref FRACTION: Regex = Regex::new(r"\b(\d{1,2}(?:\.\d+)?)\s*/\s*10\b").unwrap();
    static ref LABELED: Regex =
        Regex::new(r"(?i)\bscore\s*(?:is\s*)?[:=]?\s*(\d{1,2}(?:\.\d+)?)\b").unwrap();
    static ref OUT_OF: Regex = Regex::new(r"(?i)\b(\d{1,2}(?:\.\d+)?)\s+out\s+of\s+10\b").unwrap();
    static ref SENTIMENT: Regex = Regex::new(r"(?i)\b(excellent|good|adequate|poor)\b").unwrap();
}

/// How a score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Matched a numeric phrasing
    Numeric,
    /// Matched a sentiment keyword
    Keyword,
    /// Nothing matched; neutral default
    NeutralDefault,
    /// The judge never answered; neutral default
    Failed,
}

impl ScoreSource {
    /// True when the score did not come from an explicit number
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ScoreSource::Numeric)
    }
}

impl std::fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreSource::Numeric => write!(f, "numeric"),
            ScoreSource::Keyword => write!(f, "keyword"),
            ScoreSource::NeutralDefault => write!(f, "neutral default"),
            ScoreSource::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractedScore {
    pub score: f64,
    pub source: ScoreSource,
}

impl ExtractedScore {
    pub fn failed() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            source: ScoreSource::Failed,
        }
    }
}

fn first_in_range(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .find(|score| (0.0..=MAX_SCORE).contains(score))
}

fn keyword_score(word: &str) -> f64 {
    match word.to_lowercase().as_str() {
        "excellent" => 9.0,
        "good" => 7.0,
        "adequate" => 5.0,
        _ => 3.0,
    }
}

/// Extract a 0-10 score from judge text
pub fn extract_score(text: &str) -> ExtractedScore {
    for pattern in [&*FRACTION, &*LABELED, &*OUT_OF] {
        if let Some(score) = first_in_range(pattern, text) {
            return ExtractedScore {
                score,
                source: ScoreSource::Numeric,
            };
        }
    }

    // The earliest sentiment word in the text wins
    if let Some(word) = SENTIMENT.find(text) {
        return ExtractedScore {
            score: keyword_score(word.as_str()),
            source: ScoreSource::Keyword,
        };
    }

    ExtractedScore {
        score: NEUTRAL_SCORE,
        source: ScoreSource::NeutralDefault,
    }
}
