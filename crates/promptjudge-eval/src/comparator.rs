use serde::{Deserialize, Serialize};

use crate::{Aspect, CandidateEvaluation, ALL_ASPECTS};

/// Deltas within this distance of zero count as unchanged (exclusive)
pub const DEAD_ZONE: f64 = 0.5;

/// Deltas are compared at this many decimal places
const DELTA_PRECISION: f64 = 1000.0;

/// Drop float noise from subtracting one-decimal scores
fn round_delta(delta: f64) -> f64 {
    (delta * DELTA_PRECISION).round() / DELTA_PRECISION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Improvement,
    Regression,
    Unchanged,
}

impl Change {
    pub fn classify(delta: f64) -> Self {
        let delta = round_delta(delta);
        if delta > DEAD_ZONE {
            Change::Improvement
        } else if delta < -DEAD_ZONE {
            Change::Regression
        } else {
            Change::Unchanged
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Improvement => write!(f, "improvement"),
            Change::Regression => write!(f, "regression"),
            Change::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectDelta {
    pub aspect: Aspect,
    pub a: f64,
    pub b: f64,
    /// `b - a`
    pub delta: f64,
    pub change: Change,
}

/// Per-aspect differences between the baseline (A) and the variant (B)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `B.aggregate - A.aggregate`
    pub score_delta: f64,
    pub aspects: Vec<AspectDelta>,
    pub improvements: Vec<Aspect>,
    pub regressions: Vec<Aspect>,
    pub unchanged: Vec<Aspect>,
}

impl Comparison {
    pub fn aspect(&self, aspect: Aspect) -> Option<&AspectDelta> {
        self.aspects.iter().find(|d| d.aspect == aspect)
    }
}

/// Diff two evaluations aspect by aspect
pub fn compare(a: &CandidateEvaluation, b: &CandidateEvaluation) -> Comparison {
    let mut comparison = Comparison {
        score_delta: round_delta(b.aggregate - a.aggregate),
        aspects: Vec::with_capacity(ALL_ASPECTS.len()),
        improvements: Vec::new(),
        regressions: Vec::new(),
        unchanged: Vec::new(),
    };

    for aspect in ALL_ASPECTS {
        // A missing pass compares as neutral-to-neutral
        let score_a = a.score(aspect).unwrap_or(crate::scoring::NEUTRAL_SCORE);
        let score_b = b.score(aspect).unwrap_or(crate::scoring::NEUTRAL_SCORE);
        let delta = round_delta(score_b - score_a);
        let change = Change::classify(delta);

        match change {
            Change::Improvement => comparison.improvements.push(aspect),
            Change::Regression => comparison.regressions.push(aspect),
            Change::Unchanged => comparison.unchanged.push(aspect),
        }
        comparison.aspects.push(AspectDelta {
            aspect,
            a: score_a,
            b: score_b,
            delta,
            change,
        });
    }

    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract_score, Candidate, PassResult, ScoreSource};

    fn evaluation(candidate: Candidate, scores: [f64; 3]) -> CandidateEvaluation {
        let passes = ALL_ASPECTS
            .iter()
            .zip(scores)
            .map(|(aspect, score)| PassResult {
                aspect: *aspect,
                score,
                source: ScoreSource::Numeric,
                raw_text: String::new(),
                attempts: 1,
                error: None,
            })
            .collect();
        CandidateEvaluation::from_passes(candidate, passes, 0.0)
    }

    #[test]
    fn test_dead_zone_is_exclusive() {
        assert_eq!(Change::classify(0.5), Change::Unchanged);
        assert_eq!(Change::classify(-0.5), Change::Unchanged);
        assert_eq!(Change::classify(0.51), Change::Improvement);
        assert_eq!(Change::classify(-0.51), Change::Regression);
        assert_eq!(Change::classify(0.0), Change::Unchanged);
    }

    #[test]
    fn test_compare_classifies_each_aspect() {
        let a = evaluation(Candidate::A, [7.0, 7.0, 7.0]);
        let b = evaluation(Candidate::B, [8.0, 7.5, 6.0]);

        let comparison = compare(&a, &b);
        assert_eq!(comparison.improvements, vec![Aspect::Structure]);
        assert_eq!(comparison.unchanged, vec![Aspect::Expertise]);
        assert_eq!(comparison.regressions, vec![Aspect::Effectiveness]);
        assert!((comparison.score_delta - 0.167).abs() < 0.001);
        assert_eq!(comparison.aspect(Aspect::Structure).map(|d| d.delta), Some(1.0));
    }

    #[test]
    fn test_one_decimal_half_point_is_unchanged() {
        for (low, high) in [(7.8, 8.3), (0.6, 1.1), (1.7, 2.2), (3.9, 4.4)] {
            let low = extract_score(&format!("Score: {}/10", low)).score;
            let high = extract_score(&format!("Score: {}/10", high)).score;
            let a = evaluation(Candidate::A, [low; 3]);
            let b = evaluation(Candidate::B, [high; 3]);

            let forward = compare(&a, &b);
            assert_eq!(forward.improvements, Vec::<Aspect>::new(), "{} -> {}", low, high);
            assert_eq!(forward.unchanged.len(), 3);
            assert_eq!(forward.aspect(Aspect::Structure).map(|d| d.delta), Some(0.5));

            let backward = compare(&b, &a);
            assert_eq!(backward.regressions, Vec::<Aspect>::new(), "{} -> {}", high, low);
            assert_eq!(Change::classify(low - high), Change::Unchanged);
        }
    }
}
