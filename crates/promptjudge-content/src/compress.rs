//! Kind-specific compression for items above their warn threshold.

use tracing::debug;

use crate::{ContentKind, LoadedItem};

/// Characters kept from the start of oversized code
pub const CODE_HEAD_CHARS: usize = 25_000;
/// Characters kept from the end of oversized code
pub const CODE_TAIL_CHARS: usize = 20_000;
/// Characters kept from prose
pub const TEXT_KEEP_CHARS: usize = 40_000;
/// Head kept from config that does not parse
pub const CONFIG_HEAD_CHARS: usize = 20_000;

/// Upper bound for the truncation marker and note
const MARKER_ALLOWANCE: u64 = 128;

/// Compress an item according to its kind. Kinds that cannot be decoded are
/// returned unchanged; the loader never fetches them.
pub fn compress(item: LoadedItem) -> LoadedItem {
    let before = item.size_bytes;
    let content = match item.kind {
        ContentKind::Code => compress_code(&item.content, item.reference.file_name()),
        ContentKind::Text => compress_text(&item.content),
        ContentKind::Config => compress_config(&item.content, item.reference.file_name()),
        ContentKind::Image | ContentKind::Document | ContentKind::Binary => return item,
    };
    let compressed = item.compressed_to(content);
    debug!(
        reference = %compressed.reference,
        before,
        after = compressed.size_bytes,
        "Compressed item"
    );
    compressed
}

/// Worst-case size after compression, used before fetching
pub fn projected_bytes(kind: ContentKind, size: u64, warn_bytes: u64) -> u64 {
    if size <= warn_bytes {
        return size;
    }
    // One char is at most four bytes, but prompt content is mostly ASCII
    let cap = match kind {
        ContentKind::Code => (CODE_HEAD_CHARS + CODE_TAIL_CHARS) as u64 + MARKER_ALLOWANCE,
        ContentKind::Text => TEXT_KEEP_CHARS as u64 + MARKER_ALLOWANCE,
        // Minification can only shrink; unparseable config is head-truncated
        ContentKind::Config => return size,
        ContentKind::Image | ContentKind::Document | ContentKind::Binary => return size,
    };
    size.min(cap)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    Slash,
    Hash,
    DoubleDash,
    Markup,
}

fn comment_style(file_name: &str) -> CommentStyle {
    let lower = file_name.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext {
        "py" | "rb" | "sh" | "bash" | "zsh" | "r" | "ex" | "exs" => CommentStyle::Hash,
        "sql" | "lua" | "hs" => CommentStyle::DoubleDash,
        "html" | "vue" | "svelte" => CommentStyle::Markup,
        _ if matches!(lower.as_str(), "makefile" | "dockerfile" | "justfile" | "rakefile") => {
            CommentStyle::Hash
        }
        _ => CommentStyle::Slash,
    }
}

/// Drop blank lines and whole-line comments. Trailing comments are kept;
/// telling them apart from string contents needs a real lexer.
pub fn strip_comments(source: &str, file_name: &str) -> String {
    let style = comment_style(file_name);
    let (block_open, block_close) = match style {
        CommentStyle::Slash => ("/*", "*/"),
        CommentStyle::Markup => ("<!--", "-->"),
        CommentStyle::Hash | CommentStyle::DoubleDash => ("", ""),
    };

    let mut out = String::with_capacity(source.len());
    let mut in_block = false;
    for line in source.lines() {
        let trimmed = line.trim();
        if in_block {
            if trimmed.contains(block_close) {
                in_block = false;
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        let is_comment = match style {
            CommentStyle::Slash => trimmed.starts_with("//"),
            // keep shebangs
            CommentStyle::Hash => trimmed.starts_with('#') && !trimmed.starts_with("#!"),
            CommentStyle::DoubleDash => trimmed.starts_with("--"),
            CommentStyle::Markup => false,
        };
        if is_comment {
            continue;
        }
        if !block_open.is_empty() && trimmed.starts_with(block_open) {
            if !trimmed[block_open.len()..].contains(block_close) {
                in_block = true;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn char_prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn char_suffix(s: &str, chars: usize) -> &str {
    let total = s.chars().count();
    if total <= chars {
        return s;
    }
    match s.char_indices().nth(total - chars) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

pub fn compress_code(source: &str, file_name: &str) -> String {
    let stripped = strip_comments(source, file_name);
    let total = stripped.chars().count();
    if total <= CODE_HEAD_CHARS + CODE_TAIL_CHARS {
        return stripped;
    }
    let elided = total - CODE_HEAD_CHARS - CODE_TAIL_CHARS;
    format!(
        "{}\n\n... [truncated {} characters] ...\n\n{}",
        char_prefix(&stripped, CODE_HEAD_CHARS),
        elided,
        char_suffix(&stripped, CODE_TAIL_CHARS)
    )
}

pub fn compress_text(text: &str) -> String {
    if text.chars().count() <= TEXT_KEEP_CHARS {
        return text.to_string();
    }
    format!(
        "{}\n\n[Truncated: original was {} bytes, {} lines]",
        char_prefix(text, TEXT_KEEP_CHARS),
        text.len(),
        text.lines().count()
    )
}

/// Minify JSON, YAML or TOML; head-truncate anything that does not parse.
/// YAML and TOML are re-serialised as compact JSON.
pub fn compress_config(source: &str, file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");

    let minified = match ext {
        "json" => serde_json::from_str::<serde_json::Value>(source)
            .ok()
            .and_then(|v| serde_json::to_string(&v).ok()),
        "yaml" | "yml" => serde_yaml::from_str::<serde_json::Value>(source)
            .ok()
            .and_then(|v| serde_json::to_string(&v).ok()),
        "toml" => toml::from_str::<toml::Value>(source)
            .ok()
            .and_then(|v| serde_json::to_string(&v).ok()),
        _ => None,
    };

    match minified {
        Some(m) => m,
        None if source.chars().count() > CONFIG_HEAD_CHARS => format!(
            "{}\n\n[Truncated: original was {} bytes]",
            char_prefix(source, CONFIG_HEAD_CHARS),
            source.len()
        ),
        None => source.to_string(),
    }
}
