use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// How the verdict fields were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Keyword search over the judge's prose
    Keywords,
    /// A `<verdict>` JSON block
    Structured,
    /// The judge was unavailable; decided by the aggregate delta
    ScoreDelta,
}

impl std::fmt::Display for VerdictSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictSource::Keywords => write!(f, "keywords"),
            VerdictSource::Structured => write!(f, "structured"),
            VerdictSource::ScoreDelta => write!(f, "score_delta"),
        }
    }
}

/// The decision of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub winner: Candidate,
    pub confidence: Confidence,
    /// Full judge text the fields were parsed from
    pub reasoning: String,
    pub recommend_production: bool,
    pub source: VerdictSource,
}

impl Verdict {
    /// Verdict from the score delta alone
    pub fn from_score_delta(score_delta: f64, reason: &str) -> Self {
        let winner = if score_delta > 0.0 {
            Candidate::B
        } else {
            Candidate::A
        };
        Self {
            winner,
            confidence: Confidence::Low,
            reasoning: format!(
                "No judge decision available ({}). Decided by aggregate score delta {:+.2}.",
                reason, score_delta
            ),
            recommend_production: false,
            source: VerdictSource::ScoreDelta,
        }
    }
}

/// A parsed verdict plus anything suspicious about the text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    pub warnings: Vec<String>,
}

/// Turns decision text into a [`Verdict`]. Must be deterministic.
pub trait VerdictParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, text: &str) -> ParsedVerdict;
}

/// Keyword search over the decision prose
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordVerdictParser;

impl VerdictParser for KeywordVerdictParser {
    fn name(&self) -> &str {
        "keyword"
    }

    fn parse(&self, text: &str) -> ParsedVerdict {
        let lower = text.to_lowercase();

        let names_b = lower.contains("version b") || lower.contains("prompt b");
        let names_a = lower.contains("version a") || lower.contains("prompt a");
        let winner = if names_b { Candidate::B } else { Candidate::A };

        let confidence = if lower.contains("high") {
            Confidence::High
        } else if lower.contains("low") {
            Confidence::Low
        } else {
            Confidence::Medium
        };

        let recommend_production = lower.contains("recommend") && lower.contains("production");

        let mut warnings = Vec::new();
        if !names_a && !names_b && !lower.contains("medium") && confidence == Confidence::Medium {
            warnings.push(
                "decision names no winner and no confidence; defaulted to A with medium confidence"
                    .to_string(),
            );
        }

        debug!(%winner, %confidence, recommend_production, "Parsed verdict keywords");

        ParsedVerdict {
            verdict: Verdict {
                winner,
                confidence,
                reasoning: text.to_string(),
                recommend_production,
                source: VerdictSource::Keywords,
            },
            warnings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerdictBlock {
    winner: String,
    #[serde(default)]
    confidence: Option<Confidence>,
    #[serde(default)]
    recommend_production: bool,
}

/// Reads a `<verdict>{json}</verdict>` block, falling back to keywords
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredVerdictParser {
    fallback: KeywordVerdictParser,
}

impl StructuredVerdictParser {
    fn parse_block(text: &str) -> Result<Option<VerdictBlock>, String> {
        let start = text.find("<verdict>");
        let end = text.find("</verdict>");

        match (start, end) {
            (Some(start), Some(end)) if start < end => {
                let json = text[start + "<verdict>".len()..end].trim();
                serde_json::from_str(json)
                    .map(Some)
                    .map_err(|e| format!("unreadable verdict block: {}", e))
            }
            (Some(_), Some(_)) => Err("malformed verdict block".to_string()),
            _ => Ok(None),
        }
    }
}

impl VerdictParser for StructuredVerdictParser {
    fn name(&self) -> &str {
        "structured"
    }

    fn parse(&self, text: &str) -> ParsedVerdict {
        let block = match Self::parse_block(text) {
            Ok(Some(block)) => block,
            Ok(None) => return self.fallback.parse(text),
            Err(problem) => {
                let mut parsed = self.fallback.parse(text);
                parsed.warnings.insert(0, problem);
                return parsed;
            }
        };

        let winner = match block.winner.trim().to_uppercase().as_str() {
            "B" | "VERSION B" | "PROMPT B" => Candidate::B,
            "A" | "VERSION A" | "PROMPT A" => Candidate::A,
            other => {
                let mut parsed = self.fallback.parse(text);
                parsed
                    .warnings
                    .insert(0, format!("verdict block names unknown winner '{}'", other));
                return parsed;
            }
        };

        let mut warnings = Vec::new();
        let confidence = block.confidence.unwrap_or_else(|| {
            warnings.push("verdict block has no confidence; using medium".to_string());
            Confidence::Medium
        });

        ParsedVerdict {
            verdict: Verdict {
                winner,
                confidence,
                reasoning: text.to_string(),
                recommend_production: block.recommend_production,
                source: VerdictSource::Structured,
            },
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(text: &str) -> ParsedVerdict {
        KeywordVerdictParser.parse(text)
    }

    #[test]
    fn test_keyword_winner_defaults_to_a() {
        assert_eq!(keywords("Version B is clearer.").verdict.winner, Candidate::B);
        assert_eq!(keywords("Prompt B wins").verdict.winner, Candidate::B);
        assert_eq!(keywords("Version A holds up.").verdict.winner, Candidate::A);
        assert_eq!(keywords("Neither is great.").verdict.winner, Candidate::A);
    }

    #[test]
    fn test_keyword_confidence() {
        assert_eq!(
            keywords("Version B. Confidence: high").verdict.confidence,
            Confidence::High
        );
        assert_eq!(
            keywords("Version B. Confidence: low").verdict.confidence,
            Confidence::Low
        );
        assert_eq!(
            keywords("Version B. Confidence: medium").verdict.confidence,
            Confidence::Medium
        );
    }

    #[test]
    fn test_production_needs_both_words() {
        assert!(keywords("I recommend this for production").verdict.recommend_production);
        assert!(!keywords("I recommend version B").verdict.recommend_production);
        assert!(!keywords("Ready for production").verdict.recommend_production);
    }

    #[test]
    fn test_parse_is_deterministic_and_keeps_raw_text() {
        let text = "Winner: Version B\nConfidence: high\nI recommend this for production.";
        let first = keywords(text);
        assert_eq!(first, keywords(text));
        assert_eq!(first.verdict.reasoning, text);
        assert!(first.warnings.is_empty());
    }

    #[test]
    fn test_shapeless_text_warns() {
        let parsed = keywords("I could not decide.");
        assert_eq!(parsed.verdict.winner, Candidate::A);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_structured_block() {
        let text = r#"B is tighter.
<verdict>
{"winner": "B", "reason": "tighter", "confidence": "high", "recommend_production": true}
</verdict>"#;
        let parsed = StructuredVerdictParser::default().parse(text);
        assert_eq!(parsed.verdict.winner, Candidate::B);
        assert_eq!(parsed.verdict.confidence, Confidence::High);
        assert!(parsed.verdict.recommend_production);
        assert_eq!(parsed.verdict.source, VerdictSource::Structured);
    }

    #[test]
    fn test_structured_falls_back_to_keywords() {
        let parsed = StructuredVerdictParser::default().parse("Version B, confidence low");
        assert_eq!(parsed.verdict.source, VerdictSource::Keywords);
        assert_eq!(parsed.verdict.winner, Candidate::B);

        let broken = StructuredVerdictParser::default()
            .parse("Version B <verdict>{not json}</verdict>");
        assert_eq!(broken.verdict.source, VerdictSource::Keywords);
        assert!(broken.warnings[0].contains("unreadable verdict block"));
    }

    #[test]
    fn test_score_delta_fallback() {
        let verdict = Verdict::from_score_delta(1.0, "judge overloaded");
        assert_eq!(verdict.winner, Candidate::B);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert!(!verdict.recommend_production);
        assert_eq!(Verdict::from_score_delta(0.0, "x").winner, Candidate::A);
    }
}
