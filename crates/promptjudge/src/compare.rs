//! `promptjudge compare`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use tracing::debug;

use promptjudge_content::{
    normalize, ContentCache, ContentReference, ContentSource, GitHubSource, GitRepoSource,
    LoadingMode, Namespace,
};
use promptjudge_core::{render_markdown, RunConfig, RunOutcome, RunRequest, Runner};
use promptjudge_judge::{create_judge, JudgeSettings, JudgeType};
use promptjudge_logging::{LogFormat, Logger};

use crate::cache::disk_settings;
use crate::config::ProjectConfig;
use crate::{resolve_namespace, JudgeChoice};

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Baseline prompt (A): local file or content reference
    #[arg(short, long)]
    baseline: String,

    /// Variant prompt (B): local file or content reference
    #[arg(short, long)]
    variant: String,

    /// Expert definition: local file or content reference
    #[arg(short, long)]
    expert: String,

    /// Context reference; repeat for more
    #[arg(short, long = "context")]
    context: Vec<String>,

    /// Namespace for references without one (`owner/collection`)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Where references are read from
    #[arg(long, value_enum)]
    source: Option<SourceChoice>,

    /// Local repository for `--source git` (default: working directory)
    #[arg(long)]
    repo_dir: Option<PathBuf>,

    /// Improvement round (1 = first)
    #[arg(short, long, default_value_t = 1)]
    iteration: u32,

    /// Judgment backend
    #[arg(short, long, value_enum)]
    judge: Option<JudgeChoice>,

    /// Model to use (if the judge supports it)
    #[arg(short, long)]
    model: Option<String>,

    /// Per judge call timeout in seconds
    #[arg(long)]
    judge_timeout: Option<u64>,

    /// Whole-run deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Loading mode: progressive, strict or lenient
    #[arg(long)]
    mode: Option<String>,

    /// Keep the content cache in memory for this run only
    #[arg(long)]
    no_disk_cache: bool,

    /// Token for the GitHub contents API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Key for the `api` judge
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Output the final outcome as JSON
    #[arg(long)]
    json: bool,

    /// Show what would happen without loading or judging
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceChoice {
    Github,
    Git,
}

impl std::str::FromStr for SourceChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(SourceChoice::Github),
            "git" => Ok(SourceChoice::Git),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

/// Project file settings with CLI overrides applied
fn effective_config(args: &CompareArgs, project: &ProjectConfig) -> Result<RunConfig> {
    let mut config = project.run.clone();
    if let Some(model) = &args.model {
        config.evaluation.model = Some(model.clone());
    }
    if let Some(secs) = args.judge_timeout {
        config.evaluation.judge_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.deadline {
        config.deadline = Some(Duration::from_secs(secs));
    }
    if let Some(mode) = &args.mode {
        config.budget.mode = mode
            .parse::<LoadingMode>()
            .map_err(anyhow::Error::msg)?;
    }
    Ok(config)
}

fn judge_type(args: &CompareArgs, project: &ProjectConfig) -> Result<JudgeType> {
    match (args.judge, project.judge.judge_type.as_deref()) {
        (Some(choice), _) => Ok(choice.into()),
        (None, Some(name)) => name.parse::<JudgeType>().map_err(anyhow::Error::msg),
        (None, None) => Ok(JudgeType::ClaudeCli),
    }
}

fn build_source(
    args: &CompareArgs,
    project: &ProjectConfig,
    working_dir: &Path,
    namespace: &Namespace,
) -> Result<Arc<dyn ContentSource>> {
    let choice = match (args.source, project.source.as_deref()) {
        (Some(choice), _) => choice,
        (None, Some(name)) => name.parse::<SourceChoice>().map_err(anyhow::Error::msg)?,
        (None, None) => SourceChoice::Github,
    };

    match choice {
        SourceChoice::Github => {
            let source = GitHubSource::new(args.github_token.clone())
                .context("Failed to create GitHub client")?;
            Ok(Arc::new(source))
        }
        SourceChoice::Git => {
            let dir = args
                .repo_dir
                .clone()
                .or_else(|| project.repo_dir.clone())
                .unwrap_or_else(|| working_dir.to_path_buf());
            Ok(Arc::new(GitRepoSource::new(dir, namespace.clone())))
        }
    }
}

/// A local file if one exists at `input`, otherwise a content reference
async fn read_text(
    input: &str,
    working_dir: &Path,
    source: &dyn ContentSource,
    namespace: &Namespace,
) -> Result<String> {
    let local = working_dir.join(input);
    if local.is_file() {
        debug!(path = %local.display(), "Reading local file");
        return std::fs::read_to_string(&local)
            .with_context(|| format!("Failed to read {}", local.display()));
    }

    let reference = ContentReference::parse(input, namespace)
        .with_context(|| format!("'{}' is neither a file nor a valid reference", input))?;
    let content = source
        .fetch(&reference)
        .await
        .with_context(|| format!("Failed to fetch {}", reference))?;
    String::from_utf8(content.bytes).with_context(|| format!("{} is not UTF-8 text", reference))
}

fn print_dry_run(
    args: &CompareArgs,
    config: &RunConfig,
    namespace: &Namespace,
    judge: JudgeType,
    source: &dyn ContentSource,
) {
    println!("=== Dry Run ===");
    println!("Baseline: {}", args.baseline);
    println!("Variant: {}", args.variant);
    println!("Expert: {}", args.expert);
    println!("Namespace: {}", namespace);
    println!("Source: {}", source.name());
    println!("Judge: {}", judge);
    println!("Iteration: {}", args.iteration);
    println!(
        "Budget: {} bytes, {} tokens, {} files, {:?} mode",
        config.budget.max_total_bytes,
        config.budget.max_tokens,
        config.budget.max_files,
        config.budget.mode
    );
    match config.deadline {
        Some(deadline) => println!("Deadline: {}s", deadline.as_secs()),
        None => println!("Deadline: none"),
    }
    println!("Context:");
    for raw in &args.context {
        match normalize(raw, namespace) {
            Ok(normalized) => println!("  {}", normalized),
            Err(e) => println!("  {} (invalid: {})", raw, e),
        }
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(result) => {
            println!("{}", render_markdown(result));
        }
        RunOutcome::Invalid { error } => {
            eprintln!();
            eprintln!("{}", "=== INVALID REQUEST ===".bright_red());
            eprintln!("{}", error);
        }
        RunOutcome::Aborted {
            reason,
            usage,
            duration_secs,
        } => {
            eprintln!();
            eprintln!("{}", "=== ABORTED ===".bright_yellow());
            eprintln!("Run {} after {:.1}s", reason, duration_secs);
            eprintln!(
                "Consumed {} bytes, ~{} tokens, {} files, {} API calls",
                usage.bytes_used, usage.tokens_used, usage.files_used, usage.api_calls
            );
            if !usage.skipped.is_empty() {
                eprintln!("Skipped:");
                for skipped in &usage.skipped {
                    eprintln!("  {} ({})", skipped.target, skipped.reason);
                }
            }
        }
    }
}

/// Run a comparison and return the process exit code
pub async fn handle_compare(
    args: CompareArgs,
    project: ProjectConfig,
    working_dir: PathBuf,
    log_format: LogFormat,
    log_file: Option<&Path>,
) -> Result<i32> {
    let namespace = resolve_namespace(args.namespace.as_deref(), &project)?;
    let config = effective_config(&args, &project)?;
    let judge_type = judge_type(&args, &project)?;
    let source = build_source(&args, &project, &working_dir, &namespace)?;

    if args.dry_run {
        print_dry_run(&args, &config, &namespace, judge_type, source.as_ref());
        return Ok(0);
    }

    let settings = JudgeSettings {
        binary: project.judge.binary.clone(),
        api_key: args.api_key.clone(),
        api_base_url: project.judge.api_base_url.clone(),
    };
    let judge: Arc<dyn promptjudge_judge::Judge> = create_judge(judge_type, &settings)
        .context("Failed to create judge")?
        .into();
    if !judge.is_available().await {
        anyhow::bail!(
            "Judge '{}' is not available. Make sure it's installed and in PATH.",
            judge.name()
        );
    }

    let baseline = read_text(&args.baseline, &working_dir, source.as_ref(), &namespace).await?;
    let variant = read_text(&args.variant, &working_dir, source.as_ref(), &namespace).await?;
    let expert = read_text(&args.expert, &working_dir, source.as_ref(), &namespace).await?;

    let cache = if args.no_disk_cache {
        ContentCache::in_memory(config.cache.clone())
    } else {
        ContentCache::from_settings(disk_settings(&config.cache)?)
            .context("Failed to open content cache")?
    };

    let logger = match log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let mut runner = Runner::new(judge, source, cache, config, Arc::new(logger))?
        .with_working_dir(working_dir);

    let cancel = runner.cancel_token();
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping after the current call...");
        handle.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    let request = RunRequest::new(baseline, variant, expert, namespace)
        .with_context(args.context)
        .with_iteration(args.iteration);
    let outcome = runner.run(&request, cancel).await;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    Ok(outcome.exit_code())
}
