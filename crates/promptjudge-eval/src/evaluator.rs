use std::collections::BTreeMap;
use std::sync::Arc;

use promptjudge_judge::{Judge, JudgeConfig, JudgeRequest};
use promptjudge_recovery::{
    CallLimiter, CancelReason, CancelToken, RecoveryDispatcher, RecoveryFailure,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::call::gated_judge;
use crate::scoring::{extract_score, ExtractedScore, ScoreSource, MAX_SCORE};
use crate::{Aspect, EvaluationPrompts, Quality, ALL_ASPECTS};

/// Which of the two prompt versions is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Candidate {
    /// The baseline
    A,
    /// The variant
    B,
}

impl Candidate {
    pub fn label(&self) -> &'static str {
        match self {
            Candidate::A => "baseline",
            Candidate::B => "variant",
        }
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidate::A => write!(f, "A"),
            Candidate::B => write!(f, "B"),
        }
    }
}

/// Leniency bonus for a repeated improvement iteration
pub fn leniency_bonus(iteration: u32) -> f64 {
    match iteration {
        0..=1 => 0.0,
        2 => 0.3,
        _ => 0.5,
    }
}

/// One scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassResult {
    pub aspect: Aspect,
    pub score: f64,
    pub source: ScoreSource,
    /// The judge's full answer (empty when the pass failed)
    pub raw_text: String,
    pub attempts: u32,
    /// Why the pass failed, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scores for one candidate. Built once per run and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub candidate: Candidate,
    pub passes: Vec<PassResult>,
    pub per_aspect: BTreeMap<Aspect, f64>,
    /// Mean of the pass scores
    pub raw_aggregate: f64,
    pub leniency_bonus: f64,
    /// `raw_aggregate + leniency_bonus`, capped at 10
    pub aggregate: f64,
    pub strengths: Vec<Quality>,
    pub weaknesses: Vec<Quality>,
    /// At least one pass failed outright
    pub degraded: bool,
}

impl CandidateEvaluation {
    /// Assemble an evaluation from its passes
    pub fn from_passes(candidate: Candidate, passes: Vec<PassResult>, bonus: f64) -> Self {
        let per_aspect: BTreeMap<Aspect, f64> =
            passes.iter().map(|p| (p.aspect, p.score)).collect();
        let raw_aggregate = if passes.is_empty() {
            0.0
        } else {
            passes.iter().map(|p| p.score).sum::<f64>() / passes.len() as f64
        };

        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        for pass in &passes {
            for attribute in pass.aspect.attributes() {
                let quality = Quality {
                    aspect: pass.aspect,
                    attribute: *attribute,
                };
                if pass.score >= attribute.strength_at() {
                    strengths.push(quality);
                } else if pass.score < attribute.weakness_below() {
                    weaknesses.push(quality);
                }
            }
        }
        strengths.sort();
        weaknesses.sort();

        Self {
            candidate,
            degraded: passes.iter().any(|p| p.source == ScoreSource::Failed),
            per_aspect,
            raw_aggregate,
            leniency_bonus: bonus,
            aggregate: (raw_aggregate + bonus).min(MAX_SCORE),
            strengths,
            weaknesses,
            passes,
        }
    }

    pub fn score(&self, aspect: Aspect) -> Option<f64> {
        self.per_aspect.get(&aspect).copied()
    }

    /// Passes whose score came from a fallback rather than a number
    pub fn fallback_passes(&self) -> impl Iterator<Item = &PassResult> {
        self.passes.iter().filter(|p| p.source.is_fallback())
    }
}

/// Inputs for evaluating one candidate
#[derive(Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub candidate: Candidate,
    pub text: &'a str,
    pub expert: &'a str,
    /// Rendered context bundle
    pub context: &'a str,
    pub iteration: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluation cancelled: {0}")]
    Cancelled(CancelReason),
}

/// Runs the three scoring passes for a candidate
#[derive(Clone)]
pub struct Evaluator {
    judge: Arc<dyn Judge>,
    config: JudgeConfig,
    dispatcher: RecoveryDispatcher,
    limiter: Option<CallLimiter>,
    leniency: bool,
}

impl Evaluator {
    pub fn new(judge: Arc<dyn Judge>, config: JudgeConfig, dispatcher: RecoveryDispatcher) -> Self {
        Self {
            judge,
            config,
            dispatcher,
            limiter: None,
            leniency: true,
        }
    }

    /// Gate every judge attempt on a call window shared with other callers
    pub fn with_limiter(mut self, limiter: CallLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Turn the iteration leniency bonus on or off
    pub fn with_leniency(mut self, enabled: bool) -> Self {
        self.leniency = enabled;
        self
    }

    pub async fn evaluate(
        &self,
        input: EvaluationInput<'_>,
        cancel: &CancelToken,
    ) -> Result<CandidateEvaluation, EvaluationError> {
        debug!(
            candidate = %input.candidate,
            text_len = input.text.len(),
            iteration = input.iteration,
            "Running evaluation passes"
        );

        let message = EvaluationPrompts::pass_message(input.text, input.context);
        let [structure, expertise, effectiveness] = ALL_ASPECTS;
        let (structure, expertise, effectiveness) = tokio::join!(
            self.run_pass(input, structure, &message, cancel),
            self.run_pass(input, expertise, &message, cancel),
            self.run_pass(input, effectiveness, &message, cancel),
        );
        let passes = vec![structure?, expertise?, effectiveness?];

        let bonus = if self.leniency {
            leniency_bonus(input.iteration)
        } else {
            0.0
        };
        let evaluation = CandidateEvaluation::from_passes(input.candidate, passes, bonus);

        info!(
            candidate = %input.candidate,
            raw_aggregate = evaluation.raw_aggregate,
            aggregate = evaluation.aggregate,
            degraded = evaluation.degraded,
            "Evaluation completed"
        );

        Ok(evaluation)
    }

    async fn run_pass(
        &self,
        input: EvaluationInput<'_>,
        aspect: Aspect,
        message: &str,
        cancel: &CancelToken,
    ) -> Result<PassResult, EvaluationError> {
        let request = JudgeRequest::new(EvaluationPrompts::pass_framing(aspect, input.expert), message);
        let operation = format!("evaluate {} {}", input.candidate, aspect);
        let judge = self.judge.as_ref();
        let request = &request;
        let config = &self.config;
        let limiter = self.limiter.as_ref();
        let name = operation.as_str();

        let outcome = self
            .dispatcher
            .run(name, cancel, move |_| {
                gated_judge(judge, request, config, limiter, name)
            })
            .await;

        match outcome {
            Ok(recovered) => {
                let ExtractedScore { score, source } = extract_score(&recovered.value.text);
                if source.is_fallback() {
                    warn!(
                        candidate = %input.candidate,
                        %aspect,
                        %source,
                        score,
                        "No numeric score in judge answer"
                    );
                }
                Ok(PassResult {
                    aspect,
                    score,
                    source,
                    raw_text: recovered.value.text,
                    attempts: recovered.attempts,
                    error: None,
                })
            }
            Err(RecoveryFailure::Cancelled { reason, .. }) => {
                Err(EvaluationError::Cancelled(reason))
            }
            Err(failure) => {
                warn!(
                    candidate = %input.candidate,
                    %aspect,
                    error = %failure,
                    "Evaluation pass failed, scoring it neutral"
                );
                let fallback = ExtractedScore::failed();
                Ok(PassResult {
                    aspect,
                    score: fallback.score,
                    source: fallback.source,
                    raw_text: String::new(),
                    attempts: failure.attempts(),
                    error: Some(failure.describe()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(aspect: Aspect, score: f64) -> PassResult {
        PassResult {
            aspect,
            score,
            source: ScoreSource::Numeric,
            raw_text: format!("{}/10", score),
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn test_aggregate_is_mean_of_passes() {
        let evaluation = CandidateEvaluation::from_passes(
            Candidate::A,
            vec![
                pass(Aspect::Structure, 6.0),
                pass(Aspect::Expertise, 7.0),
                pass(Aspect::Effectiveness, 8.0),
            ],
            0.0,
        );
        assert_eq!(evaluation.raw_aggregate, 7.0);
        assert_eq!(evaluation.aggregate, 7.0);
        assert!(!evaluation.degraded);
    }

    #[test]
    fn test_leniency_touches_only_the_aggregate() {
        let evaluation = CandidateEvaluation::from_passes(
            Candidate::B,
            vec![
                pass(Aspect::Structure, 10.0),
                pass(Aspect::Expertise, 9.8),
                pass(Aspect::Effectiveness, 9.8),
            ],
            leniency_bonus(3),
        );
        assert_eq!(evaluation.leniency_bonus, 0.5);
        assert_eq!(evaluation.aggregate, 10.0);
        assert_eq!(evaluation.score(Aspect::Structure), Some(10.0));
        assert_eq!(evaluation.score(Aspect::Expertise), Some(9.8));
    }

    #[test]
    fn test_leniency_schedule() {
        assert_eq!(leniency_bonus(0), 0.0);
        assert_eq!(leniency_bonus(1), 0.0);
        assert_eq!(leniency_bonus(2), 0.3);
        assert_eq!(leniency_bonus(5), 0.5);
    }

    #[test]
    fn test_thresholds_are_attribute_specific() {
        // 7 is a strength for clarity but not for depth or completeness
        let evaluation = CandidateEvaluation::from_passes(
            Candidate::A,
            vec![
                pass(Aspect::Structure, 7.0),
                pass(Aspect::Expertise, 7.0),
                pass(Aspect::Effectiveness, 5.5),
            ],
            0.0,
        );

        let strengths: Vec<String> = evaluation.strengths.iter().map(|q| q.to_string()).collect();
        let weaknesses: Vec<String> = evaluation.weaknesses.iter().map(|q| q.to_string()).collect();
        assert_eq!(
            strengths,
            vec!["structure/clarity", "structure/organization", "expertise/accuracy"]
        );
        assert_eq!(weaknesses, vec!["effectiveness/completeness"]);
    }

    #[test]
    fn test_failed_pass_marks_evaluation_degraded() {
        let mut failed = pass(Aspect::Effectiveness, 5.0);
        failed.source = ScoreSource::Failed;
        let evaluation = CandidateEvaluation::from_passes(
            Candidate::A,
            vec![pass(Aspect::Structure, 8.0), pass(Aspect::Expertise, 8.0), failed],
            0.0,
        );
        assert!(evaluation.degraded);
        assert_eq!(evaluation.fallback_passes().count(), 1);
    }
}
