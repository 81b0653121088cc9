use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for a comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        run_id: String,
        judge: String,
        context_refs: usize,
        iteration: u32,
    },
    ContextLoadingStarted {
        refs: usize,
    },
    ItemLoaded {
        reference: String,
        kind: String,
        bytes: u64,
        compressed: bool,
        from_cache: bool,
    },
    ItemSkipped {
        reference: String,
        reason: String,
    },
    BudgetWarning {
        dimension: String,
        status: String,
        used: u64,
        limit: u64,
    },
    RateLimitWait {
        wait_ms: u64,
    },
    LoadingStopped {
        reason: String,
    },
    ContextLoaded {
        items: usize,
        skipped: usize,
        bytes: u64,
        tokens: u64,
        complete: bool,
    },
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay_ms: u64,
        rule: String,
        error: String,
    },
    EvaluationStarted {
        candidate: String,
    },
    PassCompleted {
        candidate: String,
        aspect: String,
        score: f64,
        source: String,
        attempts: u32,
    },
    EvaluationCompleted {
        candidate: String,
        raw_aggregate: f64,
        aggregate: f64,
        degraded: bool,
    },
    ComparisonCompleted {
        score_delta: f64,
        improvements: usize,
        regressions: usize,
        unchanged: usize,
    },
    VerdictReached {
        winner: String,
        confidence: String,
        recommend_production: bool,
        source: String,
    },
    DataQualityWarning {
        message: String,
    },
    RunCompleted {
        winner: String,
        degraded: bool,
        duration_secs: f64,
    },
    RunFailed {
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for run events. Writes to stderr and, optionally, a JSON lines file.
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let _ = writeln!(file, "{}", event.with_timestamp());
            }
        }

        let line = match self.format {
            LogFormat::Json => serde_json::to_string(event).ok(),
            LogFormat::Pretty => Self::render_pretty(event),
            LogFormat::Compact => Self::render_compact(event),
        };
        if let Some(line) = line {
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
    }

    fn render_pretty(event: &LogEvent) -> Option<String> {
        let line = match event {
            LogEvent::RunStarted {
                run_id,
                judge,
                context_refs,
                iteration,
            } => format!(
                "\n{} {}\n  {} {}  {} {}  {} {}  {} {}\n",
                "▶".bright_blue(),
                "promptjudge".bold().bright_white(),
                "run".dimmed(),
                run_id,
                "judge".dimmed(),
                judge,
                "context refs".dimmed(),
                context_refs,
                "iteration".dimmed(),
                iteration
            ),
            LogEvent::ContextLoadingStarted { refs } => format!(
                "  {} {} ({} references)",
                "▶".bright_cyan(),
                "CONTEXT".bright_cyan().bold(),
                refs
            ),
            LogEvent::ItemLoaded {
                reference,
                kind,
                bytes,
                compressed,
                from_cache,
            } => {
                let mut notes = Vec::new();
                if *compressed {
                    notes.push("compressed");
                }
                if *from_cache {
                    notes.push("cached");
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", notes.join(", "))
                };
                format!(
                    "    {} {} {}{}",
                    "✓".bright_green(),
                    reference,
                    format!("({}, {} bytes)", kind, bytes).dimmed(),
                    notes.dimmed()
                )
            }
            LogEvent::ItemSkipped { reference, reason } => format!(
                "    {} {} {}",
                "–".bright_yellow(),
                reference,
                reason.dimmed()
            ),
            LogEvent::BudgetWarning {
                dimension,
                status,
                used,
                limit,
            } => format!(
                "    {} {} budget {}: {}/{}",
                "⚠".bright_yellow(),
                dimension,
                status,
                used,
                limit
            ),
            LogEvent::RateLimitWait { wait_ms } => format!(
                "    {} {}",
                "⏸".dimmed(),
                format!("rate limit window full, waiting {:.1}s", *wait_ms as f64 / 1000.0)
                    .dimmed()
            ),
            LogEvent::LoadingStopped { reason } => format!(
                "    {} Loading stopped: {}",
                "■".bright_yellow(),
                reason.bright_yellow()
            ),
            LogEvent::ContextLoaded {
                items,
                skipped,
                bytes,
                tokens,
                complete,
            } => {
                let state = if *complete {
                    "complete".bright_green()
                } else {
                    "partial".bright_yellow()
                };
                format!(
                    "    {} {} items, {} skipped, {} bytes, ~{} tokens\n",
                    state, items, skipped, bytes, tokens
                )
            }
            LogEvent::RetryScheduled {
                operation,
                attempt,
                delay_ms,
                rule,
                ..
            } => format!(
                "    {} {} failed (attempt {}, {}), retrying in {:.1}s",
                "↻".bright_yellow(),
                operation,
                attempt,
                rule,
                *delay_ms as f64 / 1000.0
            ),
            LogEvent::EvaluationStarted { candidate } => format!(
                "  {} {} {}",
                "▶".bright_magenta(),
                "EVALUATE".bright_magenta().bold(),
                candidate
            ),
            LogEvent::PassCompleted {
                aspect,
                score,
                source,
                ..
            } => {
                let note = if source == "numeric" {
                    String::new()
                } else {
                    format!(" ({})", source).bright_yellow().to_string()
                };
                format!("    {} {:<14} {:.1}{}", "·".dimmed(), aspect, score, note)
            }
            LogEvent::EvaluationCompleted {
                candidate,
                aggregate,
                degraded,
                ..
            } => {
                let flag = if *degraded {
                    " degraded".bright_red().to_string()
                } else {
                    String::new()
                };
                format!(
                    "    {} {} aggregate {:.2}{}\n",
                    "✓".bright_green(),
                    candidate,
                    aggregate,
                    flag
                )
            }
            LogEvent::ComparisonCompleted {
                score_delta,
                improvements,
                regressions,
                unchanged,
            } => format!(
                "  {} {} delta {:+.2}: {} improved, {} regressed, {} unchanged",
                "▶".bright_blue(),
                "COMPARE".bright_blue().bold(),
                score_delta,
                format!("{}", improvements).green(),
                format!("{}", regressions).red(),
                unchanged
            ),
            LogEvent::VerdictReached {
                winner,
                confidence,
                recommend_production,
                ..
            } => {
                let production = if *recommend_production {
                    "recommended for production".bright_green().to_string()
                } else {
                    "not recommended for production".dimmed().to_string()
                };
                format!(
                    "    {} Winner: {} ({} confidence), {}",
                    "★".bright_green(),
                    winner.bold(),
                    confidence,
                    production
                )
            }
            LogEvent::DataQualityWarning { message } => {
                format!("    {} {}", "⚠".bright_yellow(), message.bright_yellow())
            }
            // The final report is printed by the binary
            LogEvent::RunCompleted { .. } => return None,
            LogEvent::RunFailed { error } => {
                format!("{} Run failed: {}", "✗".bright_red(), error.bright_red())
            }
        };
        Some(line)
    }

    fn render_compact(event: &LogEvent) -> Option<String> {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted { run_id, judge, .. } => {
                format!("run:start {} judge={}", run_id, judge)
            }
            LogEvent::ContextLoadingStarted { refs } => format!("context:start refs={}", refs),
            LogEvent::ItemLoaded {
                reference,
                bytes,
                compressed,
                from_cache,
                ..
            } => format!(
                "context:item {} {}b{}{}",
                reference,
                bytes,
                if *compressed { " z" } else { "" },
                if *from_cache { " c" } else { "" }
            ),
            LogEvent::ItemSkipped { reference, reason } => {
                format!("context:skip {} {}", reference, reason)
            }
            LogEvent::BudgetWarning {
                dimension,
                status,
                used,
                limit,
            } => format!("budget:{} {} {}/{}", status, dimension, used, limit),
            LogEvent::RateLimitWait { wait_ms } => format!("rate:wait {}ms", wait_ms),
            LogEvent::LoadingStopped { reason } => format!("context:stop {}", reason),
            LogEvent::ContextLoaded {
                items,
                skipped,
                bytes,
                complete,
                ..
            } => format!(
                "context:done items={} skipped={} bytes={} complete={}",
                items, skipped, bytes, complete
            ),
            LogEvent::RetryScheduled {
                operation,
                attempt,
                delay_ms,
                ..
            } => format!("retry {} attempt={} delay={}ms", operation, attempt, delay_ms),
            LogEvent::EvaluationStarted { candidate } => format!("eval:start {}", candidate),
            LogEvent::PassCompleted {
                candidate,
                aspect,
                score,
                source,
                ..
            } => format!("eval:pass {} {} {:.1} {}", candidate, aspect, score, source),
            LogEvent::EvaluationCompleted {
                candidate,
                aggregate,
                ..
            } => format!("eval:done {} {:.2}", candidate, aggregate),
            LogEvent::ComparisonCompleted { score_delta, .. } => {
                format!("compare:done delta={:+.2}", score_delta)
            }
            LogEvent::VerdictReached {
                winner, confidence, ..
            } => format!("verdict {} {}", winner, confidence),
            LogEvent::DataQualityWarning { message } => format!("warn {}", message),
            LogEvent::RunCompleted {
                winner,
                duration_secs,
                ..
            } => format!("run:done winner={} {:.1}s", winner, duration_secs),
            LogEvent::RunFailed { error } => format!("run:failed {}", error),
        };
        Some(format!("[{}] {}", timestamp, msg))
    }
}
