//! # promptjudge-content
//!
//! Turns a list of content references into a bounded context bundle.
//!
//! ## Key Types
//!
//! - [`ContentReference`] - Parsed `[owner/collection:]path[@version]`
//! - [`ContentCache`] - TTL cache keyed by reference digest
//! - [`BudgetTracker`] - Multi-dimensional resource counters
//! - [`ContentLoader`] - Walks references within the budget
//! - [`ContentSource`] - Remote API or local repository
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut loader = ContentLoader::new(source, cache, dispatcher, LoadOptions::default())?;
//! let mut budget = BudgetTracker::new(BudgetLimits::default());
//! let summary = loader.load_all(&refs, &namespace, &mut budget, &cancel).await;
//! let bundle = ContextBundle::new(summary.items.clone());
//! ```

pub mod budget;
mod bundle;
pub mod cache;
pub mod compress;
mod item;
mod kind;
mod loader;
mod reference;
pub mod sampling;
pub mod source;

pub use budget::{
    BudgetLimits, BudgetRejection, BudgetTracker, BudgetUsage, Dimension, DimensionUsage, LoadEstimate,
    LoadingMode, Remaining, ThresholdCrossing, ThresholdStatus,
};
pub use bundle::ContextBundle;
pub use cache::{CacheSettings, CacheStats, ContentCache};
pub use item::{estimate_tokens, LoadedItem, SkipReason, SkippedItem};
pub use kind::{ContentKind, KindCeiling, KindCeilings, ALL_KINDS};
pub use loader::{
    CollectionReport, ContentLoader, LoadEvent, LoadObserver, LoadOptions, LoadSummary,
    LoaderError, StopReason, DEFAULT_EXCLUDES,
};
pub use reference::{normalize, ContentReference, Namespace, ReferenceError, Version};
pub use source::{ContentSource, GitHubSource, GitRepoSource, RemoteContent, RemoteEntry, RemoteNode, SourceError};
