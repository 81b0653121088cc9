use serde::{Deserialize, Serialize};

use crate::{ContentKind, LoadedItem};

/// Accepted context, ready to be shown to the judge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub items: Vec<LoadedItem>,
}

impl ContextBundle {
    pub fn new(items: Vec<LoadedItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.size_bytes).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.items.iter().map(|i| i.token_estimate).sum()
    }

    /// One line describing the bundle
    pub fn headline(&self) -> String {
        let compressed = self.items.iter().filter(|i| i.compressed).count();
        format!(
            "{} items, {} bytes, ~{} tokens ({} compressed)",
            self.len(),
            self.total_bytes(),
            self.total_tokens(),
            compressed
        )
    }

    /// Markdown rendering used as the context section of judge prompts
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No supporting context was loaded.".to_string();
        }

        let mut out = format!("Supporting context: {}\n", self.headline());
        for item in &self.items {
            let note = if item.compressed {
                format!(", compressed from {} bytes", item.original_bytes)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "\n### {} ({}{})\n\n```{}\n{}\n```\n",
                item.reference,
                item.kind,
                note,
                fence_language(item),
                item.content.trim_end()
            ));
        }
        out
    }
}

fn fence_language(item: &LoadedItem) -> &str {
    match item.kind {
        ContentKind::Text => "markdown",
        ContentKind::Code | ContentKind::Config => item
            .reference
            .file_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or(""),
        ContentKind::Image | ContentKind::Document | ContentKind::Binary => "",
    }
}
