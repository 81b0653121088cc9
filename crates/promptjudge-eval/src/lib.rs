//! # promptjudge-eval
//!
//! Scores each candidate prompt with three independent judge passes, diffs
//! the scores and turns a final judge answer into a [`Verdict`].
//!
//! ## Key Types
//!
//! - [`Evaluator`] - Runs the structure, expertise and effectiveness passes
//! - [`CandidateEvaluation`] - Per-aspect scores, aggregate, strengths, weaknesses
//! - [`Comparison`] - Per-aspect deltas with a ±0.5 dead zone
//! - [`VerdictSynthesizer`] - Detailed comparison plus decision call
//! - [`VerdictParser`] - Seam for turning decision text into a verdict

mod aspect;
mod call;
mod comparator;
mod evaluator;
mod prompts;
pub mod scoring;
mod synthesizer;
mod verdict;

pub use aspect::{Aspect, Attribute, Quality, ALL_ASPECTS};
pub use comparator::{compare, AspectDelta, Change, Comparison, DEAD_ZONE};
pub use evaluator::{
    leniency_bonus, Candidate, CandidateEvaluation, EvaluationError, EvaluationInput, Evaluator,
    PassResult,
};
pub use prompts::{truncate_output, EvaluationPrompts};
pub use scoring::{extract_score, ExtractedScore, ScoreSource};
pub use synthesizer::{Synthesis, VerdictSynthesizer};
pub use verdict::{
    Confidence, KeywordVerdictParser, ParsedVerdict, StructuredVerdictParser, Verdict,
    VerdictParser, VerdictSource,
};
