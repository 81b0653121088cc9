use serde::{Deserialize, Serialize};

/// Detected content kind. Closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Prose: markdown, plain text, reStructuredText
    Text,
    /// Source code
    Code,
    /// Structured configuration (JSON, YAML, TOML)
    Config,
    Image,
    /// Binary documents such as PDF or office files
    Document,
    /// Anything else that is not text
    Binary,
}

pub const ALL_KINDS: [ContentKind; 6] = [
    ContentKind::Text,
    ContentKind::Code,
    ContentKind::Config,
    ContentKind::Image,
    ContentKind::Document,
    ContentKind::Binary,
];

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "swift", "c", "h", "cc", "cpp",
    "hpp", "cs", "rb", "php", "scala", "sh", "bash", "zsh", "lua", "sql", "r", "dart", "ex",
    "exs", "hs", "ml", "vue", "svelte", "css", "scss", "html",
];

const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst", "adoc", "org", "mdx"];

const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp"];

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "odt", "rtf", "ppt", "pptx", "xls", "xlsx"];

const TEXT_FILE_NAMES: &[&str] = &["readme", "license", "changelog", "authors", "notice"];

const CODE_FILE_NAMES: &[&str] = &["makefile", "dockerfile", "justfile", "rakefile"];

impl ContentKind {
    /// Detect the kind from a path's extension or well-known file name
    pub fn detect(path: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();

        if TEXT_FILE_NAMES.contains(&file_name.as_str()) {
            return ContentKind::Text;
        }
        if CODE_FILE_NAMES.contains(&file_name.as_str()) {
            return ContentKind::Code;
        }

        let extension = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            // dotfiles like `.gitignore` carry configuration
            Some(_) => return ContentKind::Config,
            None => return ContentKind::Text,
        };

        if CODE_EXTENSIONS.contains(&extension) {
            ContentKind::Code
        } else if TEXT_EXTENSIONS.contains(&extension) {
            ContentKind::Text
        } else if CONFIG_EXTENSIONS.contains(&extension) {
            ContentKind::Config
        } else if IMAGE_EXTENSIONS.contains(&extension) {
            ContentKind::Image
        } else if DOCUMENT_EXTENSIONS.contains(&extension) {
            ContentKind::Document
        } else {
            ContentKind::Binary
        }
    }

    /// Whether the loader can turn this kind into judge-readable text
    pub fn is_decodable(&self) -> bool {
        match self {
            ContentKind::Text | ContentKind::Code | ContentKind::Config => true,
            ContentKind::Image | ContentKind::Document | ContentKind::Binary => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Code => "code",
            ContentKind::Config => "config",
            ContentKind::Image => "image",
            ContentKind::Document => "document",
            ContentKind::Binary => "binary",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item size thresholds for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindCeiling {
    /// Above this the item is compressed
    pub warn_bytes: u64,
    /// Above this the item is skipped without being fetched
    pub max_bytes: u64,
}

/// Per-kind ceilings used by the loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindCeilings {
    pub text: KindCeiling,
    pub code: KindCeiling,
    pub config: KindCeiling,
}

impl Default for KindCeilings {
    fn default() -> Self {
        Self {
            text: KindCeiling {
                warn_bytes: 40_000,
                max_bytes: 500_000,
            },
            code: KindCeiling {
                warn_bytes: 50_000,
                max_bytes: 1_000_000,
            },
            config: KindCeiling {
                warn_bytes: 20_000,
                max_bytes: 250_000,
            },
        }
    }
}

impl KindCeilings {
    /// Ceiling for decodable kinds; `None` for kinds that are never loaded
    pub fn for_kind(&self, kind: ContentKind) -> Option<&KindCeiling> {
        match kind {
            ContentKind::Text => Some(&self.text),
            ContentKind::Code => Some(&self.code),
            ContentKind::Config => Some(&self.config),
            ContentKind::Image | ContentKind::Document | ContentKind::Binary => None,
        }
    }
}
