use std::path::PathBuf;
use std::sync::Arc;

use promptjudge_content::{
    ContentCache, ContentLoader, ContentSource, ContextBundle, LoadEvent, LoadObserver,
    LoadSummary, StopReason,
};
use promptjudge_eval::{
    compare, Candidate, CandidateEvaluation, EvaluationError, EvaluationInput, Evaluator,
    StructuredVerdictParser, VerdictSynthesizer,
};
use promptjudge_judge::Judge;
use promptjudge_logging::{LogEvent, Logger};
use promptjudge_recovery::{CallLimiter, CancelReason, CancelToken, RetryNotice, RetryObserver};
use tracing::{debug, info, warn};

use crate::{RunConfig, RunError, RunOutcome, RunRequest, RunResult, RunState, UsageReport};

/// Maps loader progress onto run log events
pub fn load_observer(logger: Arc<Logger>) -> LoadObserver {
    Arc::new(move |event: &LoadEvent| {
        let event = match event {
            LoadEvent::Loaded {
                reference,
                kind,
                bytes,
                compressed,
                from_cache,
            } => LogEvent::ItemLoaded {
                reference: reference.clone(),
                kind: kind.to_string(),
                bytes: *bytes,
                compressed: *compressed,
                from_cache: *from_cache,
            },
            LoadEvent::Skipped(skipped) => LogEvent::ItemSkipped {
                reference: skipped.target.clone(),
                reason: skipped.reason.to_string(),
            },
            LoadEvent::Threshold(crossing) => LogEvent::BudgetWarning {
                dimension: crossing.dimension.to_string(),
                status: crossing.status.to_string(),
                used: crossing.used,
                limit: crossing.limit,
            },
            LoadEvent::RateLimitWait { wait_ms } => LogEvent::RateLimitWait { wait_ms: *wait_ms },
        };
        logger.log(&event);
    })
}

/// Logs every scheduled retry
pub fn retry_observer(logger: Arc<Logger>) -> RetryObserver {
    Arc::new(move |notice: &RetryNotice| {
        logger.log(&LogEvent::RetryScheduled {
            operation: notice.operation.clone(),
            attempt: notice.attempt,
            delay_ms: notice.delay.as_millis() as u64,
            rule: notice.rule.to_string(),
            error: notice.error.clone(),
        });
    })
}

/// Orchestrates one comparison: load context, evaluate both candidates,
/// compare, synthesize a verdict.
pub struct Runner {
    judge: Arc<dyn Judge>,
    loader: ContentLoader,
    config: RunConfig,
    logger: Arc<Logger>,
    working_dir: PathBuf,
}

impl Runner {
    pub fn new(
        judge: Arc<dyn Judge>,
        source: Arc<dyn ContentSource>,
        cache: ContentCache,
        config: RunConfig,
        logger: Arc<Logger>,
    ) -> Result<Self, RunError> {
        let dispatcher = config
            .dispatcher()
            .with_observer(retry_observer(logger.clone()));
        let loader = ContentLoader::new(source, cache, dispatcher, config.loading.clone())
            .map_err(|e| RunError::ConfigError(e.to_string()))?
            .with_observer(load_observer(logger.clone()));

        Ok(Self {
            judge,
            loader,
            config,
            logger,
            working_dir: PathBuf::from("."),
        })
    }

    /// Directory CLI judges are spawned in
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn cache(&self) -> &ContentCache {
        self.loader.cache()
    }

    /// Cancel token for a new run, honouring the configured deadline
    pub fn cancel_token(&self) -> CancelToken {
        match self.config.deadline {
            Some(deadline) => CancelToken::with_timeout(deadline),
            None => CancelToken::new(),
        }
    }

    fn evaluator(&self, limiter: CallLimiter) -> Evaluator {
        Evaluator::new(
            self.judge.clone(),
            self.config.judge_config(self.working_dir.clone()),
            self.config
                .dispatcher()
                .with_observer(retry_observer(self.logger.clone())),
        )
        .with_leniency(self.config.evaluation.leniency)
        .with_limiter(limiter)
    }

    fn synthesizer(&self, limiter: CallLimiter) -> VerdictSynthesizer {
        let synthesizer = VerdictSynthesizer::new(
            self.judge.clone(),
            self.config.judge_config(self.working_dir.clone()),
            self.config
                .dispatcher()
                .with_observer(retry_observer(self.logger.clone())),
        )
        .with_limiter(limiter);
        if self.config.evaluation.structured_verdicts {
            synthesizer.with_parser(Box::new(StructuredVerdictParser::default()))
        } else {
            synthesizer
        }
    }

    fn aborted(&self, state: &RunState, summary: &LoadSummary, reason: CancelReason) -> RunOutcome {
        warn!(run_id = %state.run_id, reason = %reason, "Run aborted");
        self.logger.log(&LogEvent::RunFailed {
            error: format!("run {}", reason),
        });
        RunOutcome::Aborted {
            reason,
            usage: Box::new(UsageReport::new(state.budget.usage(), summary)),
            duration_secs: state.elapsed().as_secs_f64(),
        }
    }

    fn warn(&self, state: &mut RunState, message: String) {
        self.logger.log(&LogEvent::DataQualityWarning {
            message: message.clone(),
        });
        state.warn(message);
    }

    fn log_evaluation(&self, evaluation: &CandidateEvaluation) {
        for pass in &evaluation.passes {
            self.logger.log(&LogEvent::PassCompleted {
                candidate: evaluation.candidate.to_string(),
                aspect: pass.aspect.to_string(),
                score: pass.score,
                source: pass.source.to_string(),
                attempts: pass.attempts,
            });
        }
        self.logger.log(&LogEvent::EvaluationCompleted {
            candidate: evaluation.candidate.to_string(),
            raw_aggregate: evaluation.raw_aggregate,
            aggregate: evaluation.aggregate,
            degraded: evaluation.degraded,
        });
    }

    /// Run one comparison to completion, rejection or cancellation
    pub async fn run(&mut self, request: &RunRequest, cancel: CancelToken) -> RunOutcome {
        if let Err(e) = request.validate() {
            self.logger.log(&LogEvent::RunFailed {
                error: e.to_string(),
            });
            return RunOutcome::Invalid {
                error: e.to_string(),
            };
        }

        let mut state = RunState::new(self.config.budget.clone(), cancel);
        info!(run_id = %state.run_id, judge = self.judge.name(), "Starting run");
        self.logger.log(&LogEvent::RunStarted {
            run_id: state.run_id.clone(),
            judge: self.judge.name().to_string(),
            context_refs: request.context_refs.len(),
            iteration: request.iteration,
        });

        // Context
        self.logger.log(&LogEvent::ContextLoadingStarted {
            refs: request.context_refs.len(),
        });
        let summary = self
            .loader
            .load_all(
                &request.context_refs,
                &request.namespace,
                &mut state.budget,
                &state.cancel,
            )
            .await;

        if let Some(StopReason::Cancelled { reason }) = &summary.stopped {
            return self.aborted(&state, &summary, *reason);
        }
        if let Some(stopped) = &summary.stopped {
            self.logger.log(&LogEvent::LoadingStopped {
                reason: stopped.to_string(),
            });
        }
        for warning in &summary.warnings {
            self.warn(&mut state, warning.clone());
        }

        let bundle = ContextBundle::new(summary.items.clone());
        self.logger.log(&LogEvent::ContextLoaded {
            items: bundle.len(),
            skipped: summary.skipped.len(),
            bytes: bundle.total_bytes(),
            tokens: bundle.total_tokens(),
            complete: summary.is_complete(),
        });
        let context = bundle.render();
        debug!(context_len = context.len(), "Context bundle rendered");

        // Evaluation
        // Judge calls share the loader's call window
        let evaluator = self.evaluator(state.budget.call_limiter());
        self.logger.log(&LogEvent::EvaluationStarted {
            candidate: Candidate::A.to_string(),
        });
        self.logger.log(&LogEvent::EvaluationStarted {
            candidate: Candidate::B.to_string(),
        });
        let baseline_input = EvaluationInput {
            candidate: Candidate::A,
            text: &request.baseline,
            expert: &request.expert,
            context: &context,
            iteration: request.iteration,
        };
        let variant_input = EvaluationInput {
            candidate: Candidate::B,
            text: &request.variant,
            ..baseline_input
        };
        let (baseline, variant) = tokio::join!(
            evaluator.evaluate(baseline_input, &state.cancel),
            evaluator.evaluate(variant_input, &state.cancel),
        );
        let (baseline, variant) = match (baseline, variant) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(EvaluationError::Cancelled(reason)), _)
            | (_, Err(EvaluationError::Cancelled(reason))) => {
                return self.aborted(&state, &summary, reason);
            }
        };

        for evaluation in [&baseline, &variant] {
            self.log_evaluation(evaluation);
            for pass in evaluation.fallback_passes() {
                let detail = pass
                    .error
                    .clone()
                    .unwrap_or_else(|| "no numeric score in judge answer".to_string());
                self.warn(
                    &mut state,
                    format!(
                        "{} {} pass scored {:.1} by {} fallback: {}",
                        evaluation.candidate, pass.aspect, pass.score, pass.source, detail
                    ),
                );
            }
        }

        // Comparison and verdict
        let comparison = compare(&baseline, &variant);
        self.logger.log(&LogEvent::ComparisonCompleted {
            score_delta: comparison.score_delta,
            improvements: comparison.improvements.len(),
            regressions: comparison.regressions.len(),
            unchanged: comparison.unchanged.len(),
        });

        let synthesis = match self
            .synthesizer(state.budget.call_limiter())
            .synthesize(&request.expert, &baseline, &variant, &comparison, &state.cancel)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(EvaluationError::Cancelled(reason)) => {
                return self.aborted(&state, &summary, reason);
            }
        };
        for warning in &synthesis.warnings {
            self.warn(&mut state, warning.clone());
        }

        let verdict = synthesis.verdict;
        self.logger.log(&LogEvent::VerdictReached {
            winner: verdict.winner.to_string(),
            confidence: verdict.confidence.to_string(),
            recommend_production: verdict.recommend_production,
            source: verdict.source.to_string(),
        });

        let degraded = baseline.degraded || variant.degraded || synthesis.degraded;
        let duration_secs = state.elapsed().as_secs_f64();
        self.logger.log(&LogEvent::RunCompleted {
            winner: verdict.winner.to_string(),
            degraded,
            duration_secs,
        });

        RunOutcome::Completed(Box::new(RunResult {
            usage: UsageReport::new(state.budget.usage(), &summary),
            run_id: state.run_id,
            started_at: state.started_at,
            verdict,
            baseline,
            variant,
            comparison,
            detailed_comparison: synthesis.detailed_comparison,
            warnings: state.warnings,
            degraded,
            duration_secs,
        }))
    }
}
