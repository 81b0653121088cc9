use crate::{Aspect, CandidateEvaluation, Comparison};

/// Judge framings and messages for every call the engine makes
pub struct EvaluationPrompts;

const CANDIDATE_LIMIT: usize = 30_000;
const CONTEXT_LIMIT: usize = 200_000;
const COMPARISON_LIMIT: usize = 20_000;

impl EvaluationPrompts {
    /// System framing for one evaluation pass
    pub fn pass_framing(aspect: Aspect, expert: &str) -> String {
        let focus = match aspect {
            Aspect::Structure => {
                "Judge the STRUCTURE of the prompt: is it clear, unambiguous and well organized? \
                 Are instructions ordered so a model can follow them?"
            }
            Aspect::Expertise => {
                "Judge the DOMAIN EXPERTISE of the prompt: is the guidance accurate, and does it \
                 go deep enough for the domain described by the expert definition?"
            }
            Aspect::Effectiveness => {
                "Judge the EFFECTIVENESS of the prompt: does it cover everything the task needs, \
                 and does it lead to actionable, usable output?"
            }
        };

        format!(
            r#"You are a rigorous prompt reviewer acting as the following expert:

{expert}

{focus}

Answer with a short justification, then a final line of the form:
Score: N/10"#,
            expert = expert.trim(),
            focus = focus,
        )
    }

    /// User message for one evaluation pass
    pub fn pass_message(candidate: &str, context: &str) -> String {
        format!(
            r#"## Prompt under review
```
{candidate}
```

## Supporting context
{context}"#,
            candidate = truncate_output(candidate, CANDIDATE_LIMIT),
            context = truncate_output(context, CONTEXT_LIMIT),
        )
    }

    /// Framing for the detailed comparison call
    pub fn comparison_framing(expert: &str) -> String {
        format!(
            r#"You are comparing two versions of a prompt as the following expert:

{expert}

Version A is the current prompt, version B is the proposed change. Explain in detail where B is better, where it is worse, and what was left unchanged."#,
            expert = expert.trim(),
        )
    }

    /// Message for the detailed comparison call
    pub fn comparison_message(a: &CandidateEvaluation, b: &CandidateEvaluation) -> String {
        format!(
            "## Version A\n{}\n\n## Version B\n{}",
            describe_evaluation(a),
            describe_evaluation(b)
        )
    }

    /// Framing for the decision call
    pub fn decision_framing() -> String {
        r#"You decide whether a prompt change should ship. Answer in exactly this shape:

Winner: Version A or Version B
Reason: one or two sentences
Confidence: high, medium or low
Production: say "I recommend this for production" only if the winner is ready to ship

Then repeat the decision as a JSON block:
<verdict>
{"winner": "A", "reason": "...", "confidence": "medium", "recommend_production": false}
</verdict>"#
            .to_string()
    }

    /// Message for the decision call
    pub fn decision_message(comparison: &Comparison, detailed: &str) -> String {
        format!(
            r#"## Detailed comparison
{detailed}

## Score summary
Aggregate delta (B - A): {delta:+.2}
Improvements: {improvements}
Regressions: {regressions}
Unchanged: {unchanged}"#,
            detailed = truncate_output(detailed, COMPARISON_LIMIT),
            delta = comparison.score_delta,
            improvements = comparison.improvements.len(),
            regressions = comparison.regressions.len(),
            unchanged = comparison.unchanged.len(),
        )
    }
}

fn describe_evaluation(evaluation: &CandidateEvaluation) -> String {
    let mut out = format!("Aggregate score: {:.2}\n", evaluation.aggregate);
    for pass in &evaluation.passes {
        out.push_str(&format!(
            "- {}: {:.1} ({})\n",
            pass.aspect, pass.score, pass.source
        ));
    }
    let join = |items: &[crate::Quality]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items
                .iter()
                .map(|q| q.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    };
    out.push_str(&format!("Strengths: {}\n", join(&evaluation.strengths)));
    out.push_str(&format!("Weaknesses: {}", join(&evaluation.weaknesses)));
    out
}

/// Cut `output` to at most `max_len` bytes, preferring a line boundary
pub fn truncate_output(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }

    let mut end = max_len;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    match output[..end].rfind('\n') {
        Some(pos) => &output[..pos],
        None => &output[..end],
    }
}
