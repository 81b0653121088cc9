use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use promptjudge_content::{ContentReference, Namespace};
use promptjudge_judge::JudgeType;
use promptjudge_logging::LogFormat;

mod cache;
mod compare;
mod config;

use config::ProjectConfig;

#[derive(Parser, Debug)]
#[command(
    name = "promptjudge",
    about = "Compare two prompt versions against bounded repository context",
    version,
    author
)]
struct Cli {
    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG overrides)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Also append run events as JSON lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a baseline and a variant prompt and pick a winner
    Compare(compare::CompareArgs),
    /// Print normalised references and their cache keys
    Resolve {
        /// `[owner/collection:]path[@version]` references
        #[arg(required = true)]
        refs: Vec<String>,

        /// Namespace for references without one
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Inspect or clean the on-disk content cache
    Cache {
        #[command(subcommand)]
        action: cache::CacheAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum JudgeChoice {
    Claude,
    Opencode,
    Api,
}

impl From<JudgeChoice> for JudgeType {
    fn from(choice: JudgeChoice) -> Self {
        match choice {
            JudgeChoice::Claude => JudgeType::ClaudeCli,
            JudgeChoice::Opencode => JudgeType::OpenCode,
            JudgeChoice::Api => JudgeType::Api,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

/// Namespace from the flag, then the project file
pub fn resolve_namespace(flag: Option<&str>, project: &ProjectConfig) -> Result<Namespace> {
    let raw = flag.or(project.namespace.as_deref()).context(
        "No namespace given. Use --namespace owner/collection or set `namespace` in promptjudge.toml",
    )?;
    raw.parse::<Namespace>()
        .with_context(|| format!("Invalid namespace '{}'", raw))
}

fn handle_resolve(refs: &[String], namespace: &Namespace) -> Result<()> {
    for raw in refs {
        match ContentReference::parse(raw, namespace) {
            Ok(reference) => {
                let pinned = if reference.version.is_pinned() {
                    "pinned"
                } else {
                    "floating"
                };
                println!("{}\t{}\t{}", reference, reference.cache_key(), pinned);
            }
            Err(e) => eprintln!("{}: {}", raw, e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_format: LogFormat = cli.log_format.into();
    promptjudge_logging::init_tracing(&cli.log_level, log_format);

    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    match cli.command {
        Commands::Compare(args) => {
            let code = compare::handle_compare(
                args,
                project,
                working_dir,
                log_format,
                cli.log_file.as_deref(),
            )
            .await?;
            std::process::exit(code);
        }
        Commands::Resolve { refs, namespace } => {
            let namespace = resolve_namespace(namespace.as_deref(), &project)?;
            handle_resolve(&refs, &namespace)
        }
        Commands::Cache { action } => cache::handle_cache(action, &project),
    }
}
