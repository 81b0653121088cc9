use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promptjudge_content::{
    BudgetLimits, BudgetTracker, CacheSettings, ContentCache, ContentLoader,
    ContentReference, ContentSource, Dimension, KindCeiling, LoadEvent, LoadOptions, LoadingMode, Namespace,
    RemoteContent, RemoteEntry, RemoteNode, SkipReason, SourceError, StopReason,
};
use promptjudge_recovery::{BackoffPolicy, CancelToken, RecoveryDispatcher};

/// In-memory repository; directories are implied by file paths
#[derive(Default)]
struct FakeSource {
    files: BTreeMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
    describes: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn with_files<I: IntoIterator<Item = (String, Vec<u8>)>>(files: I) -> Self {
        Self {
            files: files.into_iter().collect(),
            ..Default::default()
        }
    }

    fn fail_fetch(&self, path: &str, errors: Vec<SourceError>) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), errors.into());
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn remote_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst) + self.describes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn describe(&self, reference: &ContentReference) -> Result<RemoteNode, SourceError> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        let path = reference.api_path();
        if let Some(bytes) = self.files.get(path) {
            return Ok(RemoteNode::File {
                size: bytes.len() as u64,
            });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut entries: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        for (file, bytes) in &self.files {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = format!("{}{}", prefix, dir);
                    entries.entry(dir_path.clone()).or_insert(RemoteEntry {
                        name: dir.to_string(),
                        path: dir_path,
                        size: 0,
                        is_collection: true,
                    });
                }
                None => {
                    entries.insert(
                        file.clone(),
                        RemoteEntry {
                            name: rest.to_string(),
                            path: file.clone(),
                            size: bytes.len() as u64,
                            is_collection: false,
                        },
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(SourceError::NotFound {
                reference: reference.to_string(),
            });
        }
        Ok(RemoteNode::Collection {
            entries: entries.into_values().collect(),
        })
    }

    async fn fetch(&self, reference: &ContentReference) -> Result<RemoteContent, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(queue) = self.failures.lock().unwrap().get_mut(&reference.path) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        self.files
            .get(&reference.path)
            .map(|bytes| RemoteContent::new(bytes.clone()))
            .ok_or_else(|| SourceError::NotFound {
                reference: reference.to_string(),
            })
    }
}

fn namespace() -> Namespace {
    Namespace::new("acme", "prompts")
}

fn dispatcher() -> RecoveryDispatcher {
    RecoveryDispatcher::new(
        BackoffPolicy {
            base: Duration::from_millis(100),
            ceiling: Duration::from_secs(5),
            jitter_ratio: 0.0,
        },
        5,
    )
}

fn loader(source: Arc<FakeSource>, options: LoadOptions) -> ContentLoader {
    ContentLoader::new(
        source,
        ContentCache::in_memory(CacheSettings::default()),
        dispatcher(),
        options,
    )
    .unwrap()
}

fn roomy_limits() -> BudgetLimits {
    BudgetLimits {
        max_total_bytes: 10_000_000,
        max_tokens: 10_000_000,
        max_files: 10_000,
        per_kind_bytes: BTreeMap::new(),
        calls_per_minute: 100_000,
        ..Default::default()
    }
}

fn refs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn file(path: &str, len: usize) -> (String, Vec<u8>) {
    (path.to_string(), "x".repeat(len).into_bytes())
}

// ============================================================
// Collections
// ============================================================

#[tokio::test]
async fn test_large_collection_is_sampled_to_cap() {
    let source = Arc::new(FakeSource::with_files(
        (0..200).map(|i| file(&format!("src/f{:03}.rs", i), 100 + i)),
    ));
    let options = LoadOptions {
        max_files_per_collection: 20,
        ..Default::default()
    };
    let mut loader = loader(source, options);
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["src"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    assert_eq!(summary.items.len(), 20);
    assert_eq!(summary.collections.len(), 1);
    let report = &summary.collections[0];
    assert!(report.truncated);
    assert_eq!(report.original_count, 200);
    assert_eq!(report.included, 20);
    // Smallest files first
    assert!(summary.items.iter().all(|i| i.size_bytes < 120));
}

#[tokio::test]
async fn test_excluded_entries_are_counted_not_skipped() {
    let source = Arc::new(FakeSource::with_files(vec![
        file("app/main.js", 10),
        file("app/node_modules/dep/index.js", 10),
        file("app/Cargo.lock", 10),
        file("app/bundle.min.js", 10),
    ]));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["app"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    let loaded: Vec<_> = summary.items.iter().map(|i| i.reference.path.as_str()).collect();
    assert_eq!(loaded, vec!["app/main.js"]);
    assert_eq!(summary.collections[0].excluded, 3);
    assert!(summary.skipped.is_empty());
}

#[tokio::test]
async fn test_depth_limit_stops_expansion() {
    let source = Arc::new(FakeSource::with_files(vec![
        file("a/one.md", 5),
        file("a/b/two.md", 5),
        file("a/b/c/three.md", 5),
    ]));
    let options = LoadOptions {
        max_depth: 1,
        ..Default::default()
    };
    let mut loader = loader(source, options);
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["a"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    let loaded: Vec<_> = summary.items.iter().map(|i| i.reference.path.as_str()).collect();
    assert_eq!(loaded, vec!["a/one.md", "a/b/two.md"]);
    assert!(summary.warnings.iter().any(|w| w.contains("max depth")));
}

// ============================================================
// Per-item limits
// ============================================================

#[tokio::test]
async fn test_file_over_kind_ceiling_is_skipped_without_fetch() {
    let source = Arc::new(FakeSource::with_files(vec![file("huge.md", 600_000)]));
    let mut loader = loader(source.clone(), LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["huge.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    assert!(summary.items.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    let reason = summary.skipped[0].reason.to_string();
    assert!(reason.contains("500000"), "reason: {}", reason);
    assert_eq!(source.fetch_count(), 0);

    let usage = budget.usage();
    assert_eq!(usage.used(Dimension::Bytes), Some(0));
    assert_eq!(usage.used(Dimension::Tokens), Some(0));
}

#[tokio::test]
async fn test_unsupported_kinds_are_never_fetched() {
    let source = Arc::new(FakeSource::with_files(vec![
        file("img/logo.png", 10),
        file("img/notes.md", 10),
    ]));
    let mut loader = loader(source.clone(), LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(
            &refs(&["img", "spec.pdf"]),
            &namespace(),
            &mut budget,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary
        .skipped
        .iter()
        .all(|s| matches!(s.reason, SkipReason::UnsupportedKind { .. })));
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_large_text_is_compressed_before_recording() {
    let text = "word ".repeat(20_000);
    let source = Arc::new(FakeSource::with_files(vec![(
        "guide.md".to_string(),
        text.into_bytes(),
    )]));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["guide.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    let item = &summary.items[0];
    assert!(item.compressed);
    assert_eq!(item.original_bytes, 100_000);
    assert!(item.content.contains("original was 100000 bytes"));
    assert_eq!(budget.usage().used(Dimension::Bytes), Some(item.size_bytes));
}

#[tokio::test]
async fn test_strict_mode_skips_instead_of_compressing() {
    let source = Arc::new(FakeSource::with_files(vec![
        file("big.md", 50_000),
        file("small.md", 10),
    ]));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(BudgetLimits {
        mode: LoadingMode::Strict,
        ..roomy_limits()
    });

    let summary = loader
        .load_all(
            &refs(&["big.md", "small.md"]),
            &namespace(),
            &mut budget,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(summary.items.len(), 1);
    assert!(matches!(
        summary.skipped[0].reason,
        SkipReason::AboveWarnThreshold { threshold: 40_000, .. }
    ));
}

// ============================================================
// Aggregate budget
// ============================================================

#[tokio::test]
async fn test_token_budget_stops_loading_even_with_bytes_left() {
    let source = Arc::new(FakeSource::with_files(
        (0..10).map(|i| file(&format!("d/{}.md", i), 400)),
    ));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(BudgetLimits {
        max_tokens: 300,
        ..roomy_limits()
    });

    let summary = loader
        .load_all(&refs(&["d"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    // 100 tokens per file; the third puts tokens at 100% (critical)
    assert_eq!(summary.items.len(), 3);
    assert_eq!(
        summary.stopped,
        Some(StopReason::Budget {
            dimension: Dimension::Tokens,
            status: promptjudge_content::ThresholdStatus::Critical
        })
    );
    assert_eq!(summary.not_attempted.len(), 7);
    assert!(summary.stopped_by_aggregate_limit());
    assert!(budget.usage().used(Dimension::Tokens).unwrap() <= 300);
}

#[tokio::test]
async fn test_lenient_mode_loads_past_file_count_warning() {
    let source = Arc::new(FakeSource::with_files(
        (0..6).map(|i| file(&format!("d/{}.md", i), 10)),
    ));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(BudgetLimits {
        max_files: 4,
        mode: LoadingMode::Lenient,
        ..roomy_limits()
    });

    let summary = loader
        .load_all(&refs(&["d"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    // Lenient never stops on files, but the hard limit still rejects
    assert_eq!(summary.items.len(), 4);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary
        .skipped
        .iter()
        .all(|s| matches!(s.reason, SkipReason::Budget { .. })));
    assert!(summary.stopped.is_none());
}

// ============================================================
// Remote failures and cache
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_fetch_is_retried_once_recorded() {
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 10)]));
    source.fail_fetch(
        "a.md",
        vec![
            SourceError::RateLimited { retry_after: None },
            SourceError::RateLimited { retry_after: None },
        ],
    );
    let mut loader = loader(source.clone(), LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(&refs(&["a.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(budget.usage().used(Dimension::Files), Some(1));
    // describe + three fetch attempts
    assert_eq!(budget.usage().api_calls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_every_retry_waits_for_the_call_window() {
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 10)]));
    source.fail_fetch("a.md", vec![SourceError::RateLimited { retry_after: None }]);

    let waits = Arc::new(Mutex::new(Vec::new()));
    let seen = waits.clone();
    let mut loader = loader(source.clone(), LoadOptions::default()).with_observer(Arc::new(
        move |event: &LoadEvent| {
            if let LoadEvent::RateLimitWait { wait_ms } = event {
                seen.lock().unwrap().push(*wait_ms);
            }
        },
    ));
    // One call in the window is already within the margin of this ceiling
    let mut budget = BudgetTracker::new(BudgetLimits {
        calls_per_minute: 6,
        ..roomy_limits()
    });
    let start = tokio::time::Instant::now();

    let summary = loader
        .load_all(&refs(&["a.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(source.fetch_count(), 2);
    // describe goes straight through; the first fetch and its retry both wait
    let waits = waits.lock().unwrap().clone();
    assert_eq!(waits.len(), 2);
    assert_eq!(waits[0], 60_000);
    assert!(start.elapsed() >= Duration::from_secs(120));
    assert_eq!(budget.usage().api_calls, 3);
}

#[tokio::test]
async fn test_permanent_failures_become_skips() {
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 10)]));
    let mut loader = loader(source, LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());

    let summary = loader
        .load_all(
            &refs(&["missing.md", "bad:ref", "a.md"]),
            &namespace(),
            &mut budget,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary
        .skipped
        .iter()
        .any(|s| matches!(s.reason, SkipReason::InvalidReference { .. })));
    assert!(summary
        .skipped
        .iter()
        .any(|s| matches!(s.reason, SkipReason::RemotePermanent { .. })));
}

#[tokio::test]
async fn test_cache_hit_makes_no_remote_calls() {
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 10)]));
    let mut loader = loader(source.clone(), LoadOptions::default());

    let mut first = BudgetTracker::new(roomy_limits());
    loader
        .load_all(&refs(&["a.md"]), &namespace(), &mut first, &CancelToken::new())
        .await;
    let calls = source.remote_calls();

    let mut second = BudgetTracker::new(roomy_limits());
    let summary = loader
        .load_all(&refs(&["a.md"]), &namespace(), &mut second, &CancelToken::new())
        .await;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(source.remote_calls(), calls);
    assert_eq!(second.usage().used(Dimension::Files), Some(1));
}

#[tokio::test]
async fn test_cached_item_over_a_lowered_ceiling_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings {
        dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 300)]));

    let mut first = ContentLoader::new(
        source.clone(),
        ContentCache::from_settings(settings.clone()).unwrap(),
        dispatcher(),
        LoadOptions::default(),
    )
    .unwrap();
    let mut budget = BudgetTracker::new(roomy_limits());
    let summary = first
        .load_all(&refs(&["a.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;
    assert_eq!(summary.items.len(), 1);
    let calls = source.remote_calls();

    let mut options = LoadOptions::default();
    options.ceilings.text = KindCeiling {
        warn_bytes: 100,
        max_bytes: 200,
    };
    let mut second = ContentLoader::new(
        source.clone(),
        ContentCache::from_settings(settings).unwrap(),
        dispatcher(),
        options,
    )
    .unwrap();
    let mut budget = BudgetTracker::new(roomy_limits());
    let summary = second
        .load_all(&refs(&["a.md"]), &namespace(), &mut budget, &CancelToken::new())
        .await;

    assert!(summary.items.is_empty());
    assert_eq!(summary.cache_hits, 0);
    assert!(matches!(
        summary.skipped[0].reason,
        SkipReason::ExceedsKindCeiling {
            size: 300,
            ceiling: 200,
            ..
        }
    ));
    assert_eq!(source.remote_calls(), calls);
    assert_eq!(budget.usage().used(Dimension::Files), Some(0));
}

#[tokio::test]
async fn test_cancelled_run_attempts_nothing() {
    let source = Arc::new(FakeSource::with_files(vec![file("a.md", 10)]));
    let mut loader = loader(source.clone(), LoadOptions::default());
    let mut budget = BudgetTracker::new(roomy_limits());
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = loader
        .load_all(&refs(&["a.md", "b.md"]), &namespace(), &mut budget, &cancel)
        .await;

    assert!(summary.items.is_empty());
    assert_eq!(summary.not_attempted.len(), 2);
    assert!(matches!(summary.stopped, Some(StopReason::Cancelled { .. })));
    assert_eq!(source.remote_calls(), 0);
}

// ============================================================
// Budget invariant
// ============================================================

mod invariant {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_counters_never_exceed_limits(
            sizes in proptest::collection::vec(1usize..5_000, 1..40),
            max_bytes in 1_000u64..50_000,
            max_tokens in 200u64..10_000,
            max_files in 1u64..30,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let files: Vec<_> = sizes
                .iter()
                .enumerate()
                .map(|(i, len)| file(&format!("p/{:03}.md", i), *len))
                .collect();
            let source = Arc::new(FakeSource::with_files(files));
            let mut loader = loader(source, LoadOptions::default());
            let limits = BudgetLimits {
                max_total_bytes: max_bytes,
                max_tokens,
                max_files,
                ..roomy_limits()
            };
            let mut budget = BudgetTracker::new(limits);

            let summary = runtime.block_on(loader.load_all(
                &refs(&["p"]),
                &namespace(),
                &mut budget,
                &CancelToken::new(),
            ));

            let usage = budget.usage();
            prop_assert!(usage.used(Dimension::Bytes).unwrap() <= max_bytes);
            prop_assert!(usage.used(Dimension::Tokens).unwrap() <= max_tokens);
            prop_assert!(usage.used(Dimension::Files).unwrap() <= max_files);
            prop_assert_eq!(
                summary.considered_bytes,
                summary.accepted_bytes() + summary.skipped_bytes()
            );
            prop_assert_eq!(usage.used(Dimension::Bytes).unwrap(), summary.accepted_bytes());
        }
    }
}
