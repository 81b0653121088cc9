use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{ObjectType, Repository, Tree};
use tracing::debug;

use super::{ContentSource, RemoteContent, RemoteEntry, RemoteNode, SourceError};
use crate::{ContentReference, Namespace, Version};

/// Serves one namespace from a local git repository
#[derive(Debug, Clone)]
pub struct GitRepoSource {
    repo_dir: PathBuf,
    namespace: Namespace,
}

impl GitRepoSource {
    pub fn new(repo_dir: impl Into<PathBuf>, namespace: Namespace) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            namespace,
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn open(&self, reference: &ContentReference) -> Result<Repository, SourceError> {
        if reference.namespace != self.namespace {
            return Err(SourceError::NotFound {
                reference: reference.to_string(),
            });
        }
        Ok(Repository::discover(&self.repo_dir)?)
    }

    fn describe_sync(&self, reference: &ContentReference) -> Result<RemoteNode, SourceError> {
        let repo = self.open(reference)?;
        let tree = resolve_tree(&repo, &reference.version)?;

        if reference.is_root() {
            return list_tree(&repo, &tree, "");
        }

        let entry = tree
            .get_path(Path::new(&reference.path))
            .map_err(|e| not_found_or(e, reference))?;
        match entry.kind() {
            Some(ObjectType::Tree) => {
                let subtree = repo.find_tree(entry.id())?;
                list_tree(&repo, &subtree, &reference.path)
            }
            Some(ObjectType::Blob) => {
                let blob = repo.find_blob(entry.id())?;
                Ok(RemoteNode::File {
                    size: blob.size() as u64,
                })
            }
            _ => Err(SourceError::NotFound {
                reference: reference.to_string(),
            }),
        }
    }

    fn fetch_sync(&self, reference: &ContentReference) -> Result<RemoteContent, SourceError> {
        let repo = self.open(reference)?;
        let tree = resolve_tree(&repo, &reference.version)?;
        let entry = tree
            .get_path(Path::new(&reference.path))
            .map_err(|e| not_found_or(e, reference))?;
        let blob = repo.find_blob(entry.id())?;
        debug!(%reference, size = blob.size(), "Read blob");
        Ok(RemoteContent::new(blob.content().to_vec()))
    }
}

fn not_found_or(e: git2::Error, reference: &ContentReference) -> SourceError {
    if e.code() == git2::ErrorCode::NotFound {
        SourceError::NotFound {
            reference: reference.to_string(),
        }
    } else {
        SourceError::Git(e)
    }
}

fn resolve_tree<'r>(repo: &'r Repository, version: &Version) -> Result<Tree<'r>, SourceError> {
    let revision = version.as_revision().unwrap_or("HEAD");
    let object = repo.revparse_single(revision).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            SourceError::NotFound {
                reference: format!("revision {}", revision),
            }
        } else {
            SourceError::Git(e)
        }
    })?;
    Ok(object.peel_to_tree()?)
}

fn list_tree(repo: &Repository, tree: &Tree<'_>, prefix: &str) -> Result<RemoteNode, SourceError> {
    let mut entries = Vec::with_capacity(tree.len());
    for entry in tree.iter() {
        let name = match entry.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        match entry.kind() {
            Some(ObjectType::Tree) => entries.push(RemoteEntry {
                name,
                path,
                size: 0,
                is_collection: true,
            }),
            Some(ObjectType::Blob) => {
                let size = repo.find_blob(entry.id())?.size() as u64;
                entries.push(RemoteEntry {
                    name,
                    path,
                    size,
                    is_collection: false,
                });
            }
            // submodules
            _ => {}
        }
    }
    Ok(RemoteNode::Collection { entries })
}

#[async_trait]
impl ContentSource for GitRepoSource {
    fn name(&self) -> &str {
        "git"
    }

    async fn describe(&self, reference: &ContentReference) -> Result<RemoteNode, SourceError> {
        self.describe_sync(reference)
    }

    async fn fetch(&self, reference: &ContentReference) -> Result<RemoteContent, SourceError> {
        self.fetch_sync(reference)
    }
}
