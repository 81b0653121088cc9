//! Markdown rendering of a finished run.

use std::fmt::Write;

use promptjudge_eval::{CandidateEvaluation, Change, Quality};

use crate::RunResult;

fn qualities(list: &[Quality]) -> String {
    if list.is_empty() {
        "none".to_string()
    } else {
        list.iter()
            .map(|q| q.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn change_marker(change: Change) -> &'static str {
    match change {
        Change::Improvement => "▲ improvement",
        Change::Regression => "▼ regression",
        Change::Unchanged => "= unchanged",
    }
}

fn candidate_line(out: &mut String, evaluation: &CandidateEvaluation) {
    let _ = writeln!(
        out,
        "- **{} ({})**: strengths: {}; weaknesses: {}",
        evaluation.candidate,
        evaluation.candidate.label(),
        qualities(&evaluation.strengths),
        qualities(&evaluation.weaknesses)
    );
}

/// Human report: verdict, aspect scores, changes, resource usage and skips
pub fn render_markdown(result: &RunResult) -> String {
    let mut out = String::new();
    let verdict = &result.verdict;

    let _ = writeln!(out, "# Prompt comparison\n");
    let _ = writeln!(
        out,
        "**Winner: {} ({})**, {} confidence. Production: {}.\n",
        verdict.winner,
        verdict.winner.label(),
        verdict.confidence,
        if verdict.recommend_production {
            "recommended"
        } else {
            "not recommended"
        }
    );
    if result.degraded {
        let _ = writeln!(
            out,
            "> Degraded result: some scores or the verdict came from fallbacks. See warnings.\n"
        );
    }

    let _ = writeln!(out, "## Scores\n");
    let _ = writeln!(out, "| Aspect | A | B | Delta | Change |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for delta in &result.comparison.aspects {
        let _ = writeln!(
            out,
            "| {} | {:.1} | {:.1} | {:+.1} | {} |",
            delta.aspect,
            delta.a,
            delta.b,
            delta.delta,
            change_marker(delta.change)
        );
    }
    let _ = writeln!(
        out,
        "| **Aggregate** | {:.2} | {:.2} | {:+.2} | |",
        result.baseline.aggregate, result.variant.aggregate, result.comparison.score_delta
    );
    if result.baseline.leniency_bonus > 0.0 {
        let _ = writeln!(
            out,
            "\nAggregates include an iteration leniency bonus of {:.1}.",
            result.baseline.leniency_bonus
        );
    }
    let _ = writeln!(out);
    candidate_line(&mut out, &result.baseline);
    candidate_line(&mut out, &result.variant);

    let _ = writeln!(out, "\n## Verdict\n");
    let _ = writeln!(out, "{}", verdict.reasoning.trim());

    if let Some(detailed) = &result.detailed_comparison {
        let _ = writeln!(out, "\n<details><summary>Detailed comparison</summary>\n");
        let _ = writeln!(out, "{}", detailed.trim());
        let _ = writeln!(out, "\n</details>");
    }

    let usage = &result.usage;
    let _ = writeln!(out, "\n## Resource usage\n");
    let _ = writeln!(out, "| Dimension | Used | Limit | Status |");
    let _ = writeln!(out, "|---|---|---|---|");
    for dimension in &usage.dimensions {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            dimension.dimension, dimension.used, dimension.limit, dimension.status
        );
    }
    let _ = writeln!(
        out,
        "\n{} API calls, {} cache hits, {} bytes considered.",
        usage.api_calls, usage.cache_hits, usage.considered_bytes
    );
    if let Some(stopped) = &usage.stopped {
        let _ = writeln!(out, "Loading stopped early: {}.", stopped);
    }
    if !usage.not_attempted.is_empty() {
        let _ = writeln!(out, "Not attempted: {}.", usage.not_attempted.join(", "));
    }
    for collection in usage.collections.iter().filter(|c| c.truncated) {
        let _ = writeln!(
            out,
            "Sampled {} of {} files from {}.",
            collection.included, collection.original_count, collection.reference
        );
    }

    if !usage.skipped.is_empty() {
        let _ = writeln!(out, "\n### Skipped\n");
        let _ = writeln!(out, "| Reference | Estimated bytes | Reason |");
        let _ = writeln!(out, "|---|---|---|");
        for skipped in &usage.skipped {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                skipped.target, skipped.estimated_bytes, skipped.reason
            );
        }
    }

    if !result.warnings.is_empty() {
        let _ = writeln!(out, "\n## Warnings\n");
        for warning in &result.warnings {
            let _ = writeln!(out, "- {}", warning);
        }
    }

    let _ = writeln!(
        out,
        "\n_Run {} took {:.1}s._",
        result.run_id, result.duration_secs
    );
    out
}
