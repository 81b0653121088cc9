use std::sync::Arc;

use promptjudge_judge::{Judge, JudgeConfig, JudgeError, JudgeRequest};
use promptjudge_recovery::{CallLimiter, CancelToken, RecoveryDispatcher, RecoveryFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::call::gated_judge;
use crate::{
    CandidateEvaluation, Comparison, EvaluationError, EvaluationPrompts, KeywordVerdictParser,
    Verdict, VerdictParser,
};

/// Everything the synthesizer produced for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub verdict: Verdict,
    /// Free-text comparison from the judge, when it answered
    pub detailed_comparison: Option<String>,
    /// Data-quality warnings raised while parsing
    pub warnings: Vec<String>,
    /// The verdict came from the score fallback
    pub degraded: bool,
}

/// Asks the judge for a detailed comparison and a decision, then parses it
pub struct VerdictSynthesizer {
    judge: Arc<dyn Judge>,
    config: JudgeConfig,
    dispatcher: RecoveryDispatcher,
    limiter: Option<CallLimiter>,
    parser: Box<dyn VerdictParser>,
}

impl VerdictSynthesizer {
    pub fn new(judge: Arc<dyn Judge>, config: JudgeConfig, dispatcher: RecoveryDispatcher) -> Self {
        Self {
            judge,
            config,
            dispatcher,
            limiter: None,
            parser: Box::new(KeywordVerdictParser),
        }
    }

    /// Gate every judge attempt on a call window shared with other callers
    pub fn with_limiter(mut self, limiter: CallLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn VerdictParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn parser_name(&self) -> &str {
        self.parser.name()
    }

    async fn ask(
        &self,
        operation: &str,
        request: JudgeRequest,
        cancel: &CancelToken,
    ) -> Result<String, RecoveryFailure<JudgeError>> {
        let judge = self.judge.as_ref();
        let request = &request;
        let config = &self.config;
        let limiter = self.limiter.as_ref();
        let recovered = self
            .dispatcher
            .run(operation, cancel, move |_| {
                gated_judge(judge, request, config, limiter, operation)
            })
            .await?;
        Ok(recovered.value.text)
    }

    pub async fn synthesize(
        &self,
        expert: &str,
        a: &CandidateEvaluation,
        b: &CandidateEvaluation,
        comparison: &Comparison,
        cancel: &CancelToken,
    ) -> Result<Synthesis, EvaluationError> {
        let detailed_request = JudgeRequest::new(
            EvaluationPrompts::comparison_framing(expert),
            EvaluationPrompts::comparison_message(a, b),
        );
        let detailed = match self.ask("detailed comparison", detailed_request, cancel).await {
            Ok(text) => text,
            Err(failure) => return self.fallback(comparison, failure, None),
        };
        debug!(len = detailed.len(), "Received detailed comparison");

        let decision_request = JudgeRequest::new(
            EvaluationPrompts::decision_framing(),
            EvaluationPrompts::decision_message(comparison, &detailed),
        );
        let decision = match self.ask("verdict decision", decision_request, cancel).await {
            Ok(text) => text,
            Err(failure) => return self.fallback(comparison, failure, Some(detailed)),
        };

        let parsed = self.parser.parse(&decision);
        for warning in &parsed.warnings {
            warn!(parser = self.parser.name(), warning = %warning, "Verdict data-quality warning");
        }

        info!(
            winner = %parsed.verdict.winner,
            confidence = %parsed.verdict.confidence,
            recommend_production = parsed.verdict.recommend_production,
            "Verdict reached"
        );

        Ok(Synthesis {
            verdict: parsed.verdict,
            detailed_comparison: Some(detailed),
            warnings: parsed.warnings,
            degraded: false,
        })
    }

    fn fallback(
        &self,
        comparison: &Comparison,
        failure: RecoveryFailure<JudgeError>,
        detailed: Option<String>,
    ) -> Result<Synthesis, EvaluationError> {
        if let RecoveryFailure::Cancelled { reason, .. } = failure {
            return Err(EvaluationError::Cancelled(reason));
        }

        let reason = failure.describe();
        warn!(error = %reason, "Judge unavailable for verdict, deciding by score delta");

        Ok(Synthesis {
            verdict: Verdict::from_score_delta(comparison.score_delta, &reason),
            detailed_comparison: detailed,
            warnings: vec![format!("verdict decided by score delta: {}", reason)],
            degraded: true,
        })
    }
}
