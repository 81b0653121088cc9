//! Content reference parsing.
//!
//! Syntax: `[owner/collection:]path[@version]`
//!
//! - `prompts/review.md` → current namespace, latest version
//! - `acme/prompts:review.md@v2` → explicit namespace, tag or branch
//! - `review.md@3f2c1ab` → pinned commit

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("invalid reference '{reference}': {reason}")]
    Invalid { reference: String, reason: String },

    #[error("invalid namespace '{0}': expected owner/collection")]
    InvalidNamespace(String),
}

fn invalid(reference: &str, reason: &str) -> ReferenceError {
    ReferenceError::Invalid {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}

/// Owner/collection pair (a repository, in GitHub terms)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub owner: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(owner: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.collection)
    }
}

impl std::str::FromStr for Namespace {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((owner, collection))
                if is_name(owner) && is_name(collection) && !collection.contains('/') =>
            {
                Ok(Self::new(owner, collection))
            }
            _ => Err(ReferenceError::InvalidNamespace(s.to_string())),
        }
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Which revision of the content to read
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Version {
    /// Default branch head; floats between reads
    Latest,
    /// Branch or tag name
    Named(String),
    /// Commit id; immutable
    Commit(String),
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("latest") || raw == "HEAD" {
            Version::Latest
        } else if (7..=40).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            Version::Commit(raw.to_ascii_lowercase())
        } else {
            Version::Named(raw.to_string())
        }
    }

    /// Pinned versions can be cached for a long time
    pub fn is_pinned(&self) -> bool {
        matches!(self, Version::Commit(_))
    }

    /// Revision string to hand to a content source (`None` = default branch)
    pub fn as_revision(&self) -> Option<&str> {
        match self {
            Version::Latest => None,
            Version::Named(name) => Some(name),
            Version::Commit(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::Latest => write!(f, "latest"),
            Version::Named(name) => write!(f, "{}", name),
            Version::Commit(id) => write!(f, "{}", id),
        }
    }
}

/// A fully resolved pointer to a file or collection. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentReference {
    pub namespace: Namespace,
    /// Path inside the collection; `.` is the collection root
    pub path: String,
    pub version: Version,
}

impl ContentReference {
    pub fn new(namespace: Namespace, path: impl Into<String>, version: Version) -> Self {
        Self {
            namespace,
            path: path.into(),
            version,
        }
    }

    /// Parse `[owner/collection:]path[@version]`, filling in the current
    /// namespace and `latest` when omitted.
    pub fn parse(input: &str, current: &Namespace) -> Result<Self, ReferenceError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty reference"));
        }

        let (body, version) = match trimmed.rfind('@') {
            Some(at) => {
                let version = &trimmed[at + 1..];
                if version.trim().is_empty() {
                    return Err(invalid(input, "empty version after '@'"));
                }
                (&trimmed[..at], Version::parse(version))
            }
            None => (trimmed, Version::Latest),
        };

        let (namespace, path) = match body.split_once(':') {
            Some((ns, path)) => (ns.parse::<Namespace>()?, path),
            None => (current.clone(), body),
        };

        let path = normalize_path(path);
        if path.is_empty() {
            return Err(invalid(input, "missing path"));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(invalid(input, "path may not contain '..'"));
        }

        Ok(Self {
            namespace,
            path,
            version,
        })
    }

    /// Reference to an entry inside this collection
    pub fn child(&self, entry_path: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            path: normalize_path(entry_path),
            version: self.version.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path == "."
    }

    /// Path as the content API expects it (root is the empty string)
    pub fn api_path(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            &self.path
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Stable hex digest of namespace, path and version
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.owner.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.namespace.collection.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.path.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.version.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for ContentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.namespace, self.path, self.version)
    }
}

fn normalize_path(path: &str) -> String {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_start_matches('/').trim_end_matches('/').to_string()
}

/// Normalised form of a reference string
pub fn normalize(input: &str, current: &Namespace) -> Result<String, ReferenceError> {
    ContentReference::parse(input, current).map(|r| r.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> Namespace {
        Namespace::new("acme", "prompts")
    }

    #[test]
    fn test_parse_defaults() {
        let r = ContentReference::parse("review/system.md", &current()).unwrap();
        assert_eq!(r.namespace, current());
        assert_eq!(r.path, "review/system.md");
        assert_eq!(r.version, Version::Latest);
        assert_eq!(r.to_string(), "acme/prompts:review/system.md@latest");
    }

    #[test]
    fn test_parse_explicit_namespace_and_version() {
        let r = ContentReference::parse("other/docs:guides/@v1.2", &current()).unwrap();
        assert_eq!(r.namespace, Namespace::new("other", "docs"));
        assert_eq!(r.path, "guides");
        assert_eq!(r.version, Version::Named("v1.2".to_string()));
    }

    #[test]
    fn test_commit_versions_are_pinned() {
        let r = ContentReference::parse("a.md@3F2C1AB", &current()).unwrap();
        assert_eq!(r.version, Version::Commit("3f2c1ab".to_string()));
        assert!(r.version.is_pinned());

        let head = ContentReference::parse("a.md@HEAD", &current()).unwrap();
        assert_eq!(head.version, Version::Latest);
        assert!(!head.version.is_pinned());

        let branch = ContentReference::parse("a.md@main", &current()).unwrap();
        assert!(!branch.version.is_pinned());
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let inputs = [
            "a.md",
            "./nested/dir/file.rs@feature/x",
            "org/repo:.@deadbeef",
            "org/repo:/docs/readme.md@latest",
            "  spaced.txt@v2  ",
        ];
        for input in inputs {
            let parsed = ContentReference::parse(input, &current()).unwrap();
            let rendered = parsed.to_string();
            let reparsed = ContentReference::parse(&rendered, &current()).unwrap();
            assert_eq!(parsed, reparsed, "input {:?}", input);
            assert_eq!(normalize(&rendered, &current()).unwrap(), rendered);
        }
    }

    #[test]
    fn test_branch_with_slash_and_at_in_path() {
        let r = ContentReference::parse("team@home/notes.md@release/2024", &current()).unwrap();
        assert_eq!(r.path, "team@home/notes.md");
        assert_eq!(r.version, Version::Named("release/2024".to_string()));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(ContentReference::parse("", &current()).is_err());
        assert!(ContentReference::parse("a.md@", &current()).is_err());
        assert!(ContentReference::parse("noslash:a.md", &current()).is_err());
        assert!(ContentReference::parse("org/repo:", &current()).is_err());
        assert!(ContentReference::parse("../secret", &current()).is_err());
    }

    #[test]
    fn test_cache_key_depends_on_version() {
        let a = ContentReference::parse("a.md@main", &current()).unwrap();
        let b = ContentReference::parse("a.md@dev", &current()).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_eq!(a.cache_key().len(), 64);
    }

    #[test]
    fn test_child_keeps_namespace_and_version() {
        let dir = ContentReference::parse("docs@v1", &current()).unwrap();
        let child = dir.child("docs/intro.md");
        assert_eq!(child.path, "docs/intro.md");
        assert_eq!(child.version, dir.version);
        assert_eq!(child.file_name(), "intro.md");
    }
}
