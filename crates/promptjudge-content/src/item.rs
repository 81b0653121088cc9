use serde::{Deserialize, Serialize};

use crate::budget::BudgetRejection;
use crate::{ContentKind, ContentReference};

/// Rough token estimate used for budgeting: one token per four characters
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Token estimate from a byte count, before content is available
pub fn estimate_tokens_from_bytes(bytes: u64) -> u64 {
    bytes.div_ceil(4)
}

/// An accepted piece of context. Never mutated after creation; compression
/// produces a new item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedItem {
    pub reference: ContentReference,
    pub kind: ContentKind,
    /// Size of `content` in bytes
    pub size_bytes: u64,
    /// Size reported by the source before any compression
    pub original_bytes: u64,
    pub content: String,
    pub token_estimate: u64,
    pub compressed: bool,
}

impl LoadedItem {
    pub fn new(reference: ContentReference, kind: ContentKind, content: String) -> Self {
        let size_bytes = content.len() as u64;
        Self {
            reference,
            kind,
            size_bytes,
            original_bytes: size_bytes,
            token_estimate: estimate_tokens(&content),
            content,
            compressed: false,
        }
    }

    /// Replace the content with a compressed rendition
    pub fn compressed_to(self, content: String) -> Self {
        let size_bytes = content.len() as u64;
        Self {
            token_estimate: estimate_tokens(&content),
            size_bytes,
            content,
            compressed: true,
            ..self
        }
    }
}

/// Why an item did not make it into the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedKind {
        kind: ContentKind,
    },
    ExceedsKindCeiling {
        kind: ContentKind,
        size: u64,
        ceiling: u64,
    },
    /// Strict mode refuses to compress
    AboveWarnThreshold {
        kind: ContentKind,
        size: u64,
        threshold: u64,
    },
    Budget {
        rejection: BudgetRejection,
    },
    NotUtf8,
    InvalidReference {
        message: String,
    },
    RemotePermanent {
        message: String,
    },
    RemoteExhausted {
        attempts: u32,
        message: String,
    },
}

impl SkipReason {
    /// Per-item limits, as opposed to failures or aggregate budget pressure
    pub fn is_per_item_limit(&self) -> bool {
        matches!(
            self,
            SkipReason::UnsupportedKind { .. }
                | SkipReason::ExceedsKindCeiling { .. }
                | SkipReason::AboveWarnThreshold { .. }
        )
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnsupportedKind { kind } => {
                write!(f, "{} content is not decoded for evaluation", kind)
            }
            SkipReason::ExceedsKindCeiling {
                kind,
                size,
                ceiling,
            } => write!(
                f,
                "{} bytes exceeds the {} ceiling of {} bytes",
                size, kind, ceiling
            ),
            SkipReason::AboveWarnThreshold {
                kind,
                size,
                threshold,
            } => write!(
                f,
                "{} bytes is above the {} warn threshold of {} bytes (strict mode)",
                size, kind, threshold
            ),
            SkipReason::Budget { rejection } => write!(f, "{}", rejection),
            SkipReason::NotUtf8 => write!(f, "content is not valid UTF-8"),
            SkipReason::InvalidReference { message } => write!(f, "{}", message),
            SkipReason::RemotePermanent { message } => write!(f, "{}", message),
            SkipReason::RemoteExhausted { attempts, message } => {
                write!(f, "failed after {} attempts: {}", attempts, message)
            }
        }
    }
}

/// A reference that was considered but not accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Rendered reference, or the raw input when it did not parse
    pub target: String,
    pub kind: Option<ContentKind>,
    pub estimated_bytes: u64,
    pub reason: SkipReason,
}

impl SkippedItem {
    pub fn new(
        reference: &ContentReference,
        kind: Option<ContentKind>,
        estimated_bytes: u64,
        reason: SkipReason,
    ) -> Self {
        Self {
            target: reference.to_string(),
            kind,
            estimated_bytes,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Namespace;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens_from_bytes(4_000), 1_000);
    }

    #[test]
    fn test_compression_produces_new_item() {
        let reference = ContentReference::parse("a.md", &Namespace::new("o", "c")).unwrap();
        let item = LoadedItem::new(reference, ContentKind::Text, "x".repeat(100));
        let compressed = item.clone().compressed_to("x".repeat(10));

        assert!(!item.compressed);
        assert!(compressed.compressed);
        assert_eq!(compressed.original_bytes, 100);
        assert_eq!(compressed.size_bytes, 10);
        assert_eq!(compressed.token_estimate, 3);
    }

    #[test]
    fn test_ceiling_reason_mentions_value() {
        let reason = SkipReason::ExceedsKindCeiling {
            kind: ContentKind::Code,
            size: 2_000_000,
            ceiling: 1_000_000,
        };
        assert!(reason.to_string().contains("1000000"));
        assert!(reason.is_per_item_limit());
    }
}
