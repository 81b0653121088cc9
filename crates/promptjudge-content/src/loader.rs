//! Progressive, budget-bounded context loading.
//!
//! References are walked in order, collections depth-first. Every accept or
//! reject decision observes the latest budget counters, so loading is
//! sequential. The loader never fails: problems become skips, and budget
//! pressure or cancellation ends the walk with partial results.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use promptjudge_recovery::{CancelReason, CancelToken, RecoveryDispatcher, RecoveryFailure};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::budget::{
    BudgetTracker, Dimension, LoadEstimate, LoadingMode, ThresholdCrossing, ThresholdStatus,
};
use crate::cache::ContentCache;
use crate::compress::{compress, projected_bytes};
use crate::item::estimate_tokens_from_bytes;
use crate::sampling::stratified_sample;
use crate::source::{ContentSource, RemoteEntry, RemoteNode, SourceError};
use crate::{
    ContentKind, ContentReference, KindCeiling, KindCeilings, LoadedItem, Namespace, SkipReason, SkippedItem,
};

pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    "vendor/",
    "__pycache__/",
    ".venv/",
    "venv/",
    ".next/",
    "coverage/",
    "*.lock",
    "*.min.js",
];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("invalid exclude pattern '{pattern}': {message}")]
    Exclude { pattern: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    pub max_files_per_collection: usize,
    /// Levels below a referenced collection that are still expanded
    pub max_depth: usize,
    pub ceilings: KindCeilings,
    /// Gitignore-style patterns; matching entries are never loaded
    pub exclude: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_files_per_collection: 50,
            max_depth: 3,
            ceilings: KindCeilings::default(),
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What happened to one expanded collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub reference: String,
    /// Files listed, after excludes
    pub original_count: usize,
    /// Files kept after sampling
    pub included: usize,
    pub excluded: usize,
    pub truncated: bool,
}

/// Why loading ended before every reference was examined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopReason {
    Budget {
        dimension: Dimension,
        status: ThresholdStatus,
    },
    Cancelled {
        reason: CancelReason,
    },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Budget { dimension, status } => {
                write!(f, "{} budget reached {:?} threshold", dimension, status)
            }
            StopReason::Cancelled { reason } => write!(f, "cancelled: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub items: Vec<LoadedItem>,
    pub skipped: Vec<SkippedItem>,
    pub collections: Vec<CollectionReport>,
    pub warnings: Vec<String>,
    /// Set when an aggregate limit or cancellation ended the walk
    pub stopped: Option<StopReason>,
    /// References never examined because loading stopped
    pub not_attempted: Vec<String>,
    /// Accepted sizes plus skipped estimates
    pub considered_bytes: u64,
    pub cache_hits: usize,
}

impl LoadSummary {
    pub fn accepted_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.size_bytes).sum()
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.skipped.iter().map(|s| s.estimated_bytes).sum()
    }

    /// Skips caused by per-item limits rather than failures or budget
    pub fn per_item_skips(&self) -> impl Iterator<Item = &SkippedItem> {
        self.skipped.iter().filter(|s| s.reason.is_per_item_limit())
    }

    pub fn stopped_by_aggregate_limit(&self) -> bool {
        matches!(self.stopped, Some(StopReason::Budget { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.stopped.is_none() && self.not_attempted.is_empty()
    }
}

/// Progress notifications for callers that report as they go
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Loaded {
        reference: String,
        kind: ContentKind,
        bytes: u64,
        compressed: bool,
        from_cache: bool,
    },
    Skipped(SkippedItem),
    Threshold(ThresholdCrossing),
    RateLimitWait {
        wait_ms: u64,
    },
}

pub type LoadObserver = Arc<dyn Fn(&LoadEvent) + Send + Sync>;

struct Work {
    reference: ContentReference,
    depth: usize,
    /// Size from a parent listing; avoids a describe call
    known_size: Option<u64>,
}

pub struct ContentLoader {
    source: Arc<dyn ContentSource>,
    cache: ContentCache,
    dispatcher: RecoveryDispatcher,
    options: LoadOptions,
    excludes: Gitignore,
    observer: Option<LoadObserver>,
}

impl ContentLoader {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: ContentCache,
        dispatcher: RecoveryDispatcher,
        options: LoadOptions,
    ) -> Result<Self, LoaderError> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in &options.exclude {
            builder
                .add_line(None, pattern)
                .map_err(|e| LoaderError::Exclude {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
        }
        let excludes = builder.build().map_err(|e| LoaderError::Exclude {
            pattern: options.exclude.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            source,
            cache,
            dispatcher,
            options,
            excludes,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: LoadObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ContentCache {
        &mut self.cache
    }

    pub fn is_excluded(&self, path: &str, is_collection: bool) -> bool {
        self.excludes
            .matched_path_or_any_parents(path, is_collection)
            .is_ignore()
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Load every reference as far as the budget allows.
    pub async fn load_all(
        &mut self,
        references: &[String],
        namespace: &Namespace,
        budget: &mut BudgetTracker,
        cancel: &CancelToken,
    ) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let mut queue: VecDeque<Work> = VecDeque::new();

        for raw in references {
            match ContentReference::parse(raw, namespace) {
                Ok(reference) => queue.push_back(Work {
                    reference,
                    depth: 0,
                    known_size: None,
                }),
                Err(e) => self.skip(
                    &mut summary,
                    SkippedItem {
                        target: raw.clone(),
                        kind: None,
                        estimated_bytes: 0,
                        reason: SkipReason::InvalidReference {
                            message: e.to_string(),
                        },
                    },
                ),
            }
        }

        info!(references = queue.len(), source = self.source.name(), "Loading context");

        while let Some(work) = queue.pop_front() {
            if let Some(stop) = stop_reason(budget, cancel) {
                self.halt(&mut summary, stop, work, &mut queue);
                break;
            }

            match work.known_size {
                Some(size) => {
                    self.load_file(work.reference, size, budget, cancel, &mut summary)
                        .await
                }
                None => {
                    self.load_unknown(work, budget, cancel, &mut summary, &mut queue)
                        .await
                }
            }

            if let Some(StopReason::Cancelled { .. }) = summary.stopped {
                let rest: Vec<String> = queue.drain(..).map(|w| w.reference.to_string()).collect();
                summary.not_attempted.extend(rest);
                break;
            }
        }

        info!(
            loaded = summary.items.len(),
            skipped = summary.skipped.len(),
            not_attempted = summary.not_attempted.len(),
            bytes = summary.accepted_bytes(),
            "Context loading finished"
        );
        summary
    }

    fn halt(
        &self,
        summary: &mut LoadSummary,
        stop: StopReason,
        current: Work,
        queue: &mut VecDeque<Work>,
    ) {
        warn!(reason = %stop, remaining = queue.len() + 1, "Stopping context loading");
        summary.warnings.push(format!("Context loading stopped: {}", stop));
        summary.not_attempted.push(current.reference.to_string());
        summary
            .not_attempted
            .extend(queue.drain(..).map(|w| w.reference.to_string()));
        summary.stopped = Some(stop);
    }

    /// A top-level reference: served from cache when possible, otherwise
    /// described to learn whether it is a file or a collection.
    async fn load_unknown(
        &mut self,
        work: Work,
        budget: &mut BudgetTracker,
        cancel: &CancelToken,
        summary: &mut LoadSummary,
        queue: &mut VecDeque<Work>,
    ) {
        let kind = ContentKind::detect(&work.reference.path);
        if !kind.is_decodable() && !work.reference.is_root() {
            // Cheap rejection; a collection named like a binary is unusual
            // enough to not warrant a describe call
            self.skip(
                summary,
                SkippedItem::new(
                    &work.reference,
                    Some(kind),
                    0,
                    SkipReason::UnsupportedKind { kind },
                ),
            );
            return;
        }

        if let Some(item) = self.cache.get(&work.reference) {
            // Ceilings may have changed since the item was cached
            if let Err(reason) = self.ceiling(item.kind, item.size_bytes) {
                let size = item.size_bytes;
                self.skip(
                    summary,
                    SkippedItem::new(&work.reference, Some(item.kind), size, reason),
                );
                return;
            }
            summary.cache_hits += 1;
            self.accept(item, true, budget, summary);
            return;
        }

        let reference = work.reference.clone();
        let described = self
            .remote("describe", budget, cancel, move |source| {
                let reference = reference.clone();
                async move { source.describe(&reference).await }
            })
            .await;

        match described {
            Ok(RemoteNode::File { size }) => {
                self.load_file(work.reference, size, budget, cancel, summary)
                    .await
            }
            Ok(RemoteNode::Collection { entries }) => {
                self.expand(&work, entries, summary, queue);
            }
            Err(failure) => self.remote_failed(&work.reference, Some(kind), 0, failure, summary),
        }
    }

    /// Queue the entries of a collection ahead of the remaining work
    fn expand(
        &mut self,
        parent: &Work,
        entries: Vec<RemoteEntry>,
        summary: &mut LoadSummary,
        queue: &mut VecDeque<Work>,
    ) {
        let mut excluded = 0;
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in entries {
            if self.is_excluded(&entry.path, entry.is_collection) {
                excluded += 1;
            } else if entry.is_collection {
                dirs.push(entry);
            } else {
                files.push(entry);
            }
        }

        let original_count = files.len();
        let cap = self.options.max_files_per_collection;
        let files = stratified_sample(files, cap);
        let truncated = files.len() < original_count;

        let report = CollectionReport {
            reference: parent.reference.to_string(),
            original_count,
            included: files.len(),
            excluded,
            truncated,
        };
        debug!(?report, "Expanded collection");
        if truncated {
            summary.warnings.push(format!(
                "{} has {} files; sampled {}",
                report.reference, original_count, report.included
            ));
        }
        summary.collections.push(report);

        let child_depth = parent.depth + 1;
        let mut children: Vec<Work> = files
            .into_iter()
            .map(|entry| Work {
                reference: parent.reference.child(&entry.path),
                depth: child_depth,
                known_size: Some(entry.size),
            })
            .collect();

        if child_depth <= self.options.max_depth {
            dirs.sort_by(|a, b| a.path.cmp(&b.path));
            children.extend(dirs.into_iter().map(|entry| Work {
                reference: parent.reference.child(&entry.path),
                depth: child_depth,
                known_size: None,
            }));
        } else if !dirs.is_empty() {
            summary.warnings.push(format!(
                "{}: {} subdirectories below max depth {} not expanded",
                parent.reference,
                dirs.len(),
                self.options.max_depth
            ));
        }

        for child in children.into_iter().rev() {
            queue.push_front(child);
        }
    }

    async fn load_file(
        &mut self,
        reference: ContentReference,
        size: u64,
        budget: &mut BudgetTracker,
        cancel: &CancelToken,
        summary: &mut LoadSummary,
    ) {
        let kind = ContentKind::detect(&reference.path);
        let ceiling = match self.ceiling(kind, size) {
            Ok(ceiling) => ceiling,
            Err(reason) => {
                self.skip(summary, SkippedItem::new(&reference, Some(kind), size, reason));
                return;
            }
        };

        if budget.limits().mode == LoadingMode::Strict && size > ceiling.warn_bytes {
            self.skip(
                summary,
                SkippedItem::new(
                    &reference,
                    Some(kind),
                    size,
                    SkipReason::AboveWarnThreshold {
                        kind,
                        size,
                        threshold: ceiling.warn_bytes,
                    },
                ),
            );
            return;
        }

        if let Some(item) = self.cache.get(&reference) {
            summary.cache_hits += 1;
            self.accept(item, true, budget, summary);
            return;
        }

        let projected = projected_bytes(kind, size, ceiling.warn_bytes);
        let estimate = LoadEstimate {
            kind,
            bytes: projected,
            tokens: estimate_tokens_from_bytes(projected),
        };
        if let Err(rejection) = budget.check(&estimate) {
            self.skip(
                summary,
                SkippedItem::new(&reference, Some(kind), size, SkipReason::Budget { rejection }),
            );
            return;
        }

        let target = reference.clone();
        let fetched = self
            .remote("fetch", budget, cancel, move |source| {
                let target = target.clone();
                async move { source.fetch(&target).await }
            })
            .await;

        let content = match fetched {
            Ok(content) => content,
            Err(failure) => {
                self.remote_failed(&reference, Some(kind), size, failure, summary);
                return;
            }
        };

        let text = match String::from_utf8(content.bytes) {
            Ok(text) => text,
            Err(_) => {
                self.skip(
                    summary,
                    SkippedItem::new(&reference, Some(kind), content.size, SkipReason::NotUtf8),
                );
                return;
            }
        };

        let item = LoadedItem::new(reference.clone(), kind, text);
        self.cache.put(&reference, item.clone());
        self.accept(item, false, budget, summary);
    }

    /// The ceiling for `kind`, or why an item of `size` bytes cannot be loaded
    fn ceiling(&self, kind: ContentKind, size: u64) -> Result<KindCeiling, SkipReason> {
        let ceiling = match self.options.ceilings.for_kind(kind) {
            Some(ceiling) if kind.is_decodable() => *ceiling,
            _ => return Err(SkipReason::UnsupportedKind { kind }),
        };
        if size > ceiling.max_bytes {
            return Err(SkipReason::ExceedsKindCeiling {
                kind,
                size,
                ceiling: ceiling.max_bytes,
            });
        }
        Ok(ceiling)
    }

    /// Compress if needed, then record against the budget
    fn accept(
        &mut self,
        item: LoadedItem,
        from_cache: bool,
        budget: &mut BudgetTracker,
        summary: &mut LoadSummary,
    ) {
        let kind = item.kind;
        let warn_bytes = self
            .options
            .ceilings
            .for_kind(kind)
            .map(|c| c.warn_bytes)
            .unwrap_or(u64::MAX);

        if budget.limits().mode == LoadingMode::Strict && item.size_bytes > warn_bytes {
            let size = item.size_bytes;
            self.skip(
                summary,
                SkippedItem::new(
                    &item.reference,
                    Some(kind),
                    size,
                    SkipReason::AboveWarnThreshold {
                        kind,
                        size,
                        threshold: warn_bytes,
                    },
                ),
            );
            return;
        }

        let item = if item.size_bytes > warn_bytes {
            compress(item)
        } else {
            item
        };

        match budget.record(&item) {
            Ok(crossings) => {
                for crossing in crossings {
                    summary.warnings.push(format!(
                        "{} budget at {:?}: {} of {}",
                        crossing.dimension, crossing.status, crossing.used, crossing.limit
                    ));
                    self.emit(LoadEvent::Threshold(crossing));
                }
                debug!(reference = %item.reference, bytes = item.size_bytes, from_cache, "Accepted item");
                self.emit(LoadEvent::Loaded {
                    reference: item.reference.to_string(),
                    kind: item.kind,
                    bytes: item.size_bytes,
                    compressed: item.compressed,
                    from_cache,
                });
                summary.considered_bytes += item.size_bytes;
                summary.items.push(item);
            }
            Err(rejection) => {
                let skipped = SkippedItem::new(
                    &item.reference,
                    Some(kind),
                    item.size_bytes,
                    SkipReason::Budget { rejection },
                );
                self.skip(summary, skipped);
            }
        }
    }

    fn skip(&self, summary: &mut LoadSummary, skipped: SkippedItem) {
        debug!(target = %skipped.target, reason = %skipped.reason, "Skipped item");
        summary.considered_bytes += skipped.estimated_bytes;
        self.emit(LoadEvent::Skipped(skipped.clone()));
        summary.skipped.push(skipped);
    }

    fn remote_failed(
        &self,
        reference: &ContentReference,
        kind: Option<ContentKind>,
        size: u64,
        failure: RecoveryFailure<SourceError>,
        summary: &mut LoadSummary,
    ) {
        let reason = match failure {
            RecoveryFailure::Permanent { .. } => SkipReason::RemotePermanent {
                message: failure.describe(),
            },
            RecoveryFailure::Exhausted {
                ref error,
                attempts,
                ..
            } => SkipReason::RemoteExhausted {
                attempts,
                message: error.to_string(),
            },
            RecoveryFailure::Cancelled { reason, .. } => {
                summary.not_attempted.push(reference.to_string());
                summary.stopped = Some(StopReason::Cancelled { reason });
                return;
            }
        };
        self.skip(summary, SkippedItem::new(reference, kind, size, reason));
    }

    fn waiting_for_window(&self, wait: Duration) {
        info!(wait_ms = wait.as_millis() as u64, "Waiting for API call window");
        self.emit(LoadEvent::RateLimitWait {
            wait_ms: wait.as_millis() as u64,
        });
    }

    /// Run one remote operation under the recovery dispatcher. Every attempt
    /// waits for room in the call window and is charged to it.
    async fn remote<T, F, Fut>(
        &self,
        operation: &str,
        budget: &BudgetTracker,
        cancel: &CancelToken,
        op: F,
    ) -> Result<T, RecoveryFailure<SourceError>>
    where
        F: Fn(Arc<dyn ContentSource>) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let limiter = budget.call_limiter();
        let source = self.source.clone();
        self.dispatcher
            .run(operation, cancel, |_| {
                let limiter = limiter.clone();
                let call = op(source.clone());
                async move {
                    limiter.acquire(|wait| self.waiting_for_window(wait)).await;
                    call.await
                }
            })
            .await
            .map(|recovered| recovered.value)
    }
}

fn stop_reason(budget: &BudgetTracker, cancel: &CancelToken) -> Option<StopReason> {
    if let Some(reason) = cancel.reason() {
        return Some(StopReason::Cancelled { reason });
    }
    budget
        .blocking_dimension()
        .map(|(dimension, status)| StopReason::Budget { dimension, status })
}
