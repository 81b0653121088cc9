//! `promptjudge cache` subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use promptjudge_content::{cache::default_cache_dir, CacheSettings, ContentCache};

use crate::config::ProjectConfig;

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Entry count, size and hit statistics
    Stats,
    /// Remove expired entries
    Sweep,
    /// Remove every entry
    Clear,
}

/// Settings with the on-disk directory filled in
pub fn disk_settings(settings: &CacheSettings) -> Result<CacheSettings> {
    let mut settings = settings.clone();
    if settings.dir.is_none() {
        settings.dir = Some(default_cache_dir().context("No cache directory on this platform")?);
    }
    Ok(settings)
}

pub fn handle_cache(action: CacheAction, project: &ProjectConfig) -> Result<()> {
    let settings = disk_settings(&project.run.cache)?;
    let dir = settings.dir.clone().unwrap_or_default();
    let mut cache = ContentCache::from_settings(settings)
        .with_context(|| format!("Failed to open cache at {}", dir.display()))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            eprintln!("{} {}", "Cache".bold(), dir.display().to_string().dimmed());
            eprintln!("  entries   {} ({} expired)", stats.entries, stats.expired);
            eprintln!("  size      {} / {} bytes", stats.total_bytes, stats.max_bytes);
        }
        CacheAction::Sweep => {
            let removed = cache.sweep_expired();
            eprintln!("{} Removed {} expired entries", "✓".bright_green(), removed);
        }
        CacheAction::Clear => {
            cache.clear().context("Failed to clear cache")?;
            eprintln!("{} Cache cleared", "✓".bright_green());
        }
    }
    Ok(())
}
