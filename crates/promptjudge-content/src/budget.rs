//! Multi-dimensional resource budget.
//!
//! Every dimension is checked independently and a load is accepted only when
//! all of them stay within their hard limit. Exhaustion is an ordinary
//! outcome (`BudgetRejection`), never an error.

use std::collections::BTreeMap;
use std::time::Duration;

use promptjudge_recovery::CallLimiter;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{ContentKind, LoadedItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "dimension", content = "kind", rename_all = "snake_case")]
pub enum Dimension {
    Bytes,
    Tokens,
    Files,
    KindBytes(ContentKind),
    CallsPerMinute,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Bytes => write!(f, "bytes"),
            Dimension::Tokens => write!(f, "tokens"),
            Dimension::Files => write!(f, "files"),
            Dimension::KindBytes(kind) => write!(f, "{} bytes", kind),
            Dimension::CallsPerMinute => write!(f, "calls per minute"),
        }
    }
}

/// How the tracker reacts to thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingMode {
    /// Compress oversized items, stop at critical
    #[default]
    Progressive,
    /// Stop at the first warning, skip rather than compress
    Strict,
    /// Like progressive, but file count never stops loading
    Lenient,
}

impl std::str::FromStr for LoadingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "progressive" => Ok(LoadingMode::Progressive),
            "strict" => Ok(LoadingMode::Strict),
            "lenient" => Ok(LoadingMode::Lenient),
            _ => Err(format!("Unknown loading mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Ok,
    Warn,
    Critical,
}

impl std::fmt::Display for ThresholdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdStatus::Ok => write!(f, "ok"),
            ThresholdStatus::Warn => write!(f, "warn"),
            ThresholdStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetLimits {
    pub max_total_bytes: u64,
    pub max_tokens: u64,
    pub max_files: u64,
    /// Aggregate byte ceiling per kind
    pub per_kind_bytes: BTreeMap<ContentKind, u64>,
    pub calls_per_minute: u32,
    /// Fraction of a limit at which a dimension is in warning
    pub warn_ratio: f64,
    /// Fraction of a limit at which a dimension is critical
    pub critical_ratio: f64,
    pub mode: LoadingMode,
    pub stop_on_warning: bool,
    pub stop_on_critical: bool,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 800_000,
            max_tokens: 150_000,
            max_files: 100,
            per_kind_bytes: BTreeMap::from([
                (ContentKind::Text, 400_000),
                (ContentKind::Code, 600_000),
                (ContentKind::Config, 200_000),
            ]),
            calls_per_minute: 60,
            warn_ratio: 0.75,
            critical_ratio: 0.95,
            mode: LoadingMode::Progressive,
            stop_on_warning: false,
            stop_on_critical: true,
        }
    }
}

/// Projected cost of loading one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEstimate {
    pub kind: ContentKind,
    pub bytes: u64,
    pub tokens: u64,
}

impl LoadEstimate {
    pub fn of(item: &LoadedItem) -> Self {
        Self {
            kind: item.kind,
            bytes: item.size_bytes,
            tokens: item.token_estimate,
        }
    }
}

/// A load that would push a dimension over its hard limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRejection {
    pub dimension: Dimension,
    pub used: u64,
    pub requested: u64,
    pub limit: u64,
}

impl std::fmt::Display for BudgetRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} budget exhausted: {} used + {} requested exceeds limit of {}",
            self.dimension, self.used, self.requested, self.limit
        )
    }
}

/// A dimension moving into a higher threshold band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCrossing {
    pub dimension: Dimension,
    pub status: ThresholdStatus,
    pub used: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remaining {
    pub bytes: u64,
    pub tokens: u64,
    pub files: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionUsage {
    pub dimension: Dimension,
    pub used: u64,
    pub limit: u64,
    pub status: ThresholdStatus,
}

/// Snapshot of consumption for the run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub dimensions: Vec<DimensionUsage>,
    pub remaining: Remaining,
    pub api_calls: u64,
}

impl BudgetUsage {
    pub fn used(&self, dimension: Dimension) -> Option<u64> {
        self.dimensions
            .iter()
            .find(|d| d.dimension == dimension)
            .map(|d| d.used)
    }
}

/// Consumption counters for one run. Owned by the run, never shared
/// between runs. The call window is handed out through
/// [`BudgetTracker::call_limiter`] so judge calls count against it too.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    bytes: u64,
    tokens: u64,
    files: u64,
    kind_bytes: BTreeMap<ContentKind, u64>,
    calls: CallLimiter,
    statuses: BTreeMap<Dimension, ThresholdStatus>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        let calls = CallLimiter::new(limits.calls_per_minute);
        Self {
            limits,
            bytes: 0,
            tokens: 0,
            files: 0,
            kind_bytes: BTreeMap::new(),
            calls,
            statuses: BTreeMap::new(),
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    fn used_and_limit(&self, dimension: Dimension) -> Option<(u64, u64)> {
        match dimension {
            Dimension::Bytes => Some((self.bytes, self.limits.max_total_bytes)),
            Dimension::Tokens => Some((self.tokens, self.limits.max_tokens)),
            Dimension::Files => Some((self.files, self.limits.max_files)),
            Dimension::KindBytes(kind) => self
                .limits
                .per_kind_bytes
                .get(&kind)
                .map(|limit| (self.kind_bytes.get(&kind).copied().unwrap_or(0), *limit)),
            Dimension::CallsPerMinute => Some((
                self.calls.calls_in_window(Instant::now()) as u64,
                self.limits.calls_per_minute as u64,
            )),
        }
    }

    /// Threshold band for a dimension; unlimited dimensions are always `Ok`
    pub fn status(&self, dimension: Dimension) -> ThresholdStatus {
        match self.used_and_limit(dimension) {
            None => ThresholdStatus::Ok,
            Some((_, 0)) => ThresholdStatus::Critical,
            Some((used, limit)) => {
                let ratio = used as f64 / limit as f64;
                if ratio >= self.limits.critical_ratio {
                    ThresholdStatus::Critical
                } else if ratio >= self.limits.warn_ratio {
                    ThresholdStatus::Warn
                } else {
                    ThresholdStatus::Ok
                }
            }
        }
    }

    /// Conjunction over every dimension the estimate touches
    pub fn check(&self, estimate: &LoadEstimate) -> Result<(), BudgetRejection> {
        let demands = [
            (Dimension::Bytes, estimate.bytes),
            (Dimension::Tokens, estimate.tokens),
            (Dimension::Files, 1),
            (Dimension::KindBytes(estimate.kind), estimate.bytes),
        ];

        for (dimension, requested) in demands {
            if let Some((used, limit)) = self.used_and_limit(dimension) {
                if used.saturating_add(requested) > limit {
                    return Err(BudgetRejection {
                        dimension,
                        used,
                        requested,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn can_accommodate(&self, estimate: &LoadEstimate) -> bool {
        self.check(estimate).is_ok()
    }

    /// Account for an accepted item. Call exactly once per accepted item.
    ///
    /// Refuses items that do not fit so counters can never pass a limit.
    /// Returns the dimensions that moved into a higher threshold band.
    pub fn record(&mut self, item: &LoadedItem) -> Result<Vec<ThresholdCrossing>, BudgetRejection> {
        let estimate = LoadEstimate::of(item);
        self.check(&estimate)?;

        self.bytes += estimate.bytes;
        self.tokens += estimate.tokens;
        self.files += 1;
        *self.kind_bytes.entry(estimate.kind).or_insert(0) += estimate.bytes;

        debug!(
            reference = %item.reference,
            bytes = self.bytes,
            tokens = self.tokens,
            files = self.files,
            "Recorded item"
        );

        Ok(self.refresh_statuses(&[
            Dimension::Bytes,
            Dimension::Tokens,
            Dimension::Files,
            Dimension::KindBytes(estimate.kind),
        ]))
    }

    fn refresh_statuses(&mut self, dimensions: &[Dimension]) -> Vec<ThresholdCrossing> {
        let mut crossings = Vec::new();
        for &dimension in dimensions {
            let status = self.status(dimension);
            let previous = self
                .statuses
                .get(&dimension)
                .copied()
                .unwrap_or(ThresholdStatus::Ok);
            if status > previous {
                let (used, limit) = self.used_and_limit(dimension).unwrap_or((0, 0));
                warn!(%dimension, ?status, used, limit, "Budget threshold crossed");
                crossings.push(ThresholdCrossing {
                    dimension,
                    status,
                    used,
                    limit,
                });
                self.statuses.insert(dimension, status);
            }
        }
        crossings
    }

    /// The first dimension that should halt loading, if any
    pub fn blocking_dimension(&self) -> Option<(Dimension, ThresholdStatus)> {
        let warn_stops = self.limits.stop_on_warning || self.limits.mode == LoadingMode::Strict;
        let lenient_files = self.limits.mode == LoadingMode::Lenient;

        for dimension in [Dimension::Bytes, Dimension::Tokens, Dimension::Files] {
            if dimension == Dimension::Files && lenient_files {
                continue;
            }
            let status = self.status(dimension);
            let stops = match status {
                ThresholdStatus::Critical => self.limits.stop_on_critical || warn_stops,
                ThresholdStatus::Warn => warn_stops,
                ThresholdStatus::Ok => false,
            };
            if stops {
                return Some((dimension, status));
            }
        }
        None
    }

    pub fn should_continue_loading(&self) -> bool {
        self.blocking_dimension().is_none()
    }

    pub fn remaining(&self) -> Remaining {
        Remaining {
            bytes: self.limits.max_total_bytes.saturating_sub(self.bytes),
            tokens: self.limits.max_tokens.saturating_sub(self.tokens),
            files: self.limits.max_files.saturating_sub(self.files),
        }
    }

    /// Shared handle on this run's calls-per-minute window
    pub fn call_limiter(&self) -> CallLimiter {
        self.calls.clone()
    }

    pub fn calls_in_window(&self, now: Instant) -> u32 {
        self.calls.calls_in_window(now)
    }

    /// How long to wait before the next remote call, if at all
    pub fn rate_limit_wait(&self, now: Instant) -> Option<Duration> {
        self.calls.wait_time(now)
    }

    pub fn register_call(&self, now: Instant) {
        self.calls.register(now);
    }

    pub fn usage(&self) -> BudgetUsage {
        let mut dimensions: Vec<Dimension> = vec![Dimension::Bytes, Dimension::Tokens, Dimension::Files];
        dimensions.extend(self.limits.per_kind_bytes.keys().map(|k| Dimension::KindBytes(*k)));

        BudgetUsage {
            dimensions: dimensions
                .into_iter()
                .filter_map(|dimension| {
                    self.used_and_limit(dimension).map(|(used, limit)| DimensionUsage {
                        dimension,
                        used,
                        limit,
                        status: self.status(dimension),
                    })
                })
                .collect(),
            remaining: self.remaining(),
            api_calls: self.calls.total_calls(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentReference, Namespace};

    fn item(path: &str, kind: ContentKind, len: usize) -> LoadedItem {
        let reference = ContentReference::parse(path, &Namespace::new("o", "c")).unwrap();
        LoadedItem::new(reference, kind, "a".repeat(len))
    }

    fn limits(bytes: u64, tokens: u64, files: u64) -> BudgetLimits {
        BudgetLimits {
            max_total_bytes: bytes,
            max_tokens: tokens,
            max_files: files,
            per_kind_bytes: BTreeMap::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_is_a_conjunction() {
        // Plenty of bytes, almost no tokens
        let tracker = BudgetTracker::new(limits(1_000_000, 10, 100));
        let estimate = LoadEstimate {
            kind: ContentKind::Text,
            bytes: 100,
            tokens: 25,
        };
        let rejection = tracker.check(&estimate).unwrap_err();
        assert_eq!(rejection.dimension, Dimension::Tokens);

        // Plenty of tokens, almost no bytes
        let tracker = BudgetTracker::new(limits(50, 1_000_000, 100));
        let rejection = tracker.check(&estimate).unwrap_err();
        assert_eq!(rejection.dimension, Dimension::Bytes);
    }

    #[test]
    fn test_record_refuses_items_that_do_not_fit() {
        let mut tracker = BudgetTracker::new(limits(100, 1_000, 10));
        tracker.record(&item("a.md", ContentKind::Text, 80)).unwrap();
        assert!(tracker.record(&item("b.md", ContentKind::Text, 30)).is_err());
        assert_eq!(tracker.usage().used(Dimension::Bytes), Some(80));
        assert_eq!(tracker.usage().used(Dimension::Files), Some(1));
    }

    #[test]
    fn test_per_kind_ceiling() {
        let mut l = limits(10_000, 10_000, 100);
        l.per_kind_bytes.insert(ContentKind::Config, 100);
        let mut tracker = BudgetTracker::new(l);

        tracker.record(&item("a.json", ContentKind::Config, 90)).unwrap();
        let rejection = tracker
            .record(&item("b.json", ContentKind::Config, 20))
            .unwrap_err();
        assert_eq!(rejection.dimension, Dimension::KindBytes(ContentKind::Config));
        assert!(tracker.record(&item("c.md", ContentKind::Text, 20)).is_ok());
    }

    #[test]
    fn test_critical_bytes_stops_loading() {
        let mut tracker = BudgetTracker::new(limits(100, 10_000, 100));
        tracker.record(&item("a.md", ContentKind::Text, 80)).unwrap();
        assert!(tracker.should_continue_loading());

        tracker.record(&item("b.md", ContentKind::Text, 15)).unwrap();
        assert_eq!(
            tracker.blocking_dimension(),
            Some((Dimension::Bytes, ThresholdStatus::Critical))
        );
        assert!(!tracker.should_continue_loading());
    }

    #[test]
    fn test_lenient_mode_ignores_file_count() {
        let mut l = limits(10_000, 10_000, 2);
        l.mode = LoadingMode::Lenient;
        let mut tracker = BudgetTracker::new(l.clone());
        tracker.record(&item("a.md", ContentKind::Text, 1)).unwrap();
        tracker.record(&item("b.md", ContentKind::Text, 1)).unwrap();
        assert!(tracker.should_continue_loading());

        l.mode = LoadingMode::Progressive;
        let mut tracker = BudgetTracker::new(l);
        tracker.record(&item("a.md", ContentKind::Text, 1)).unwrap();
        tracker.record(&item("b.md", ContentKind::Text, 1)).unwrap();
        assert!(!tracker.should_continue_loading());
    }

    #[test]
    fn test_stop_on_warning() {
        let mut l = limits(100, 10_000, 100);
        l.stop_on_warning = true;
        let mut tracker = BudgetTracker::new(l);
        tracker.record(&item("a.md", ContentKind::Text, 76)).unwrap();
        assert_eq!(
            tracker.blocking_dimension(),
            Some((Dimension::Bytes, ThresholdStatus::Warn))
        );
    }

    #[test]
    fn test_threshold_crossings_reported_once() {
        let mut tracker = BudgetTracker::new(limits(100, 10_000, 100));
        let first = tracker.record(&item("a.md", ContentKind::Text, 76)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, ThresholdStatus::Warn);

        let second = tracker.record(&item("b.md", ContentKind::Text, 1)).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_remaining() {
        let mut tracker = BudgetTracker::new(limits(100, 100, 5));
        tracker.record(&item("a.md", ContentKind::Text, 40)).unwrap();
        assert_eq!(
            tracker.remaining(),
            Remaining {
                bytes: 60,
                tokens: 90,
                files: 4
            }
        );
    }

    #[test]
    fn test_rate_limit_wait_near_ceiling() {
        let mut l = limits(100, 100, 5);
        l.calls_per_minute = 10;
        let tracker = BudgetTracker::new(l);
        let start = Instant::now();

        for i in 0..4 {
            tracker.register_call(start + Duration::from_secs(i));
        }
        assert_eq!(tracker.rate_limit_wait(start + Duration::from_secs(4)), None);

        tracker.register_call(start + Duration::from_secs(4));
        // 5 calls in window, within 5 of the ceiling of 10
        let wait = tracker
            .rate_limit_wait(start + Duration::from_secs(10))
            .unwrap();
        assert_eq!(wait, Duration::from_secs(50));

        // After the oldest call leaves the window the pressure is gone
        assert_eq!(tracker.rate_limit_wait(start + Duration::from_secs(61)), None);
        assert_eq!(tracker.calls_in_window(start + Duration::from_secs(61)), 3);
        assert_eq!(tracker.usage().api_calls, 5);

        // Judge calls through the shared handle land in the same window
        let limiter = tracker.call_limiter();
        assert_eq!(limiter.try_acquire(start + Duration::from_secs(61)), Ok(()));
        assert_eq!(tracker.calls_in_window(start + Duration::from_secs(61)), 4);
        assert_eq!(tracker.usage().api_calls, 6);
    }
}
