//! Project configuration file support for promptjudge.
//!
//! Loads configuration from `promptjudge.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use promptjudge_core::RunConfig;

/// Project-level configuration loaded from `promptjudge.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Namespace for references without one (`owner/collection`)
    pub namespace: Option<String>,
    /// `github` or `git`
    pub source: Option<String>,
    /// Local repository for the `git` source
    pub repo_dir: Option<PathBuf>,
    #[serde(default)]
    pub judge: JudgeFileConfig,
    /// Budget, loading, cache, retry and evaluation settings
    #[serde(default)]
    pub run: RunConfig,
}

/// The `[judge]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct JudgeFileConfig {
    /// `claude`, `opencode` or `api`
    #[serde(rename = "type")]
    pub judge_type: Option<String>,
    pub binary: Option<PathBuf>,
    pub api_base_url: Option<String>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "promptjudge.toml";

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_full_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
namespace = "acme/prompts"
source = "git"

[judge]
type = "api"

[run]
deadline = "5m"

[run.budget]
max_files = 40

[run.evaluation]
structured_verdicts = true
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.namespace.as_deref(), Some("acme/prompts"));
        assert_eq!(config.judge.judge_type.as_deref(), Some("api"));
        assert_eq!(config.run.budget.max_files, 40);
        assert_eq!(config.run.deadline, Some(Duration::from_secs(300)));
        assert!(config.run.evaluation.structured_verdicts);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_iterations = 3\n").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }
}
