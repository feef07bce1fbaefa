//! Git repository source.
//!
//! The catalog is a single file inside a repository. Each fetch clones
//! into a scoped temporary directory as a bare repository (no worktree
//! checkout; the file is read straight from the object database). The
//! clone is shallow (depth 1) for branch/tag refs; pinning a commit SHA
//! forces a full history fetch so the commit is reachable.
//!
//! The `TempDir` guard releases all on-disk state on every exit path,
//! including cancellation and panics inside the blocking section.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use git2::{AutotagOption, FetchOptions, Oid, RemoteCallbacks, Repository};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{content_hash, FetchResult, SourceHandler, MAX_FETCH_BYTES};
use crate::config::GitSourceConfig;
use crate::error::SourceError;
use crate::registry::{detect_document_format, parse_registry, RegistryFormat};

/// Upper bound on a whole git fetch.
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cap on tree entries in the cloned ref, a guard against pathological
/// repositories.
const MAX_TREE_ENTRIES: usize = 10_000;

/// Which ref the clone should resolve.
#[derive(Debug, Clone)]
enum RefSelector {
    Default,
    Branch(String),
    Tag(String),
    Commit(String),
}

/// Clones a repository and extracts the configured file.
pub struct GitSource {
    config: GitSourceConfig,
    format: Option<RegistryFormat>,
    timeout: Duration,
}

impl GitSource {
    pub fn new(config: GitSourceConfig, format: Option<RegistryFormat>) -> Self {
        Self {
            config,
            format,
            timeout: GIT_FETCH_TIMEOUT,
        }
    }

    fn selector(&self) -> RefSelector {
        let pick = |s: &Option<String>| s.as_ref().filter(|v| !v.trim().is_empty()).cloned();
        if let Some(branch) = pick(&self.config.branch) {
            RefSelector::Branch(branch)
        } else if let Some(tag) = pick(&self.config.tag) {
            RefSelector::Tag(tag)
        } else if let Some(commit) = pick(&self.config.commit) {
            RefSelector::Commit(commit)
        } else {
            RefSelector::Default
        }
    }

    /// Clone and extract on the blocking pool, bounded by the fetch
    /// timeout. On timeout the child token aborts the transfer so the
    /// blocking thread unwinds promptly instead of lingering.
    async fn fetch_bytes(&self, cancel: &CancellationToken) -> Result<Vec<u8>, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let child = cancel.child_token();
        let config = self.config.clone();
        let selector = self.selector();
        let task_token = child.clone();
        let task = tokio::task::spawn_blocking(move || {
            clone_and_extract(&config, selector, &task_token)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(|e| SourceError::Io(format!("git task: {e}")))?,
            Err(_) => {
                child.cancel();
                Err(SourceError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl SourceHandler for GitSource {
    fn validate(&self) -> Result<(), SourceError> {
        self.config
            .validate()
            .map_err(|e| SourceError::InvalidConfig(e.to_string()))
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError> {
        let bytes = self.fetch_bytes(cancel).await?;
        let format = match self.format {
            Some(format) => format,
            None => detect_document_format(&bytes)?,
        };
        debug!(
            "[GitSource] extracted {} bytes of {} from {}",
            bytes.len(),
            self.config.path,
            self.config.repository
        );
        let registry = parse_registry(&bytes, format)?;
        Ok(FetchResult {
            registry,
            hash: content_hash(&bytes),
            format,
        })
    }

    /// A clone is as expensive as the fetch itself, so there is no cheap
    /// probe; change detection falls back to the sync interval.
    async fn current_hash(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}

fn clone_and_extract(
    config: &GitSourceConfig,
    selector: RefSelector,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, SourceError> {
    let workdir = tempfile::TempDir::new()
        .map_err(|e| SourceError::Io(format!("temp dir for clone: {e}")))?;

    let repo = Repository::init_bare(workdir.path())?;
    let mut remote = repo.remote_anonymous(&config.repository)?;

    let mut callbacks = RemoteCallbacks::new();
    let progress_token = cancel.clone();
    callbacks.transfer_progress(move |_| !progress_token.is_cancelled());

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options.download_tags(AutotagOption::None);

    let refspec = match &selector {
        RefSelector::Default => {
            options.depth(1);
            "+HEAD:refs/remotes/origin/HEAD".to_string()
        }
        RefSelector::Branch(branch) => {
            options.depth(1);
            format!("+refs/heads/{branch}:refs/remotes/origin/{branch}")
        }
        RefSelector::Tag(tag) => {
            options.depth(1);
            format!("+refs/tags/{tag}:refs/tags/{tag}")
        }
        // The pinned commit may be arbitrarily deep; fetch full history.
        RefSelector::Commit(_) => "+refs/heads/*:refs/remotes/origin/*".to_string(),
    };

    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(|e| {
            if cancel.is_cancelled() {
                SourceError::Cancelled
            } else {
                SourceError::from(e)
            }
        })?;

    if cancel.is_cancelled() {
        return Err(SourceError::Cancelled);
    }

    let commit = match &selector {
        RefSelector::Default => repo
            .find_reference("refs/remotes/origin/HEAD")?
            .peel_to_commit()?,
        RefSelector::Branch(branch) => repo
            .find_reference(&format!("refs/remotes/origin/{branch}"))?
            .peel_to_commit()?,
        RefSelector::Tag(tag) => repo
            .find_reference(&format!("refs/tags/{tag}"))?
            .peel_to_commit()?,
        RefSelector::Commit(sha) => {
            let oid = Oid::from_str(sha)
                .map_err(|e| SourceError::InvalidConfig(format!("commit {sha:?}: {e}")))?;
            repo.find_commit(oid)?
        }
    };

    let tree = commit.tree()?;
    enforce_tree_cap(&tree)?;

    let entry = tree.get_path(Path::new(&config.path)).map_err(|_| {
        SourceError::Io(format!(
            "path {:?} not found in repository {:?}",
            config.path, config.repository
        ))
    })?;
    let blob = repo.find_blob(entry.id()).map_err(|_| {
        SourceError::Io(format!("path {:?} is not a file", config.path))
    })?;
    if blob.size() as u64 > MAX_FETCH_BYTES {
        return Err(SourceError::ResponseTooLarge {
            size: blob.size() as u64,
            limit: MAX_FETCH_BYTES,
        });
    }

    // Copy out before `repo` and the TempDir drop.
    Ok(blob.content().to_vec())
}

fn enforce_tree_cap(tree: &git2::Tree<'_>) -> Result<(), SourceError> {
    let mut entries = 0usize;
    let mut over = false;
    tree.walk(git2::TreeWalkMode::PreOrder, |_, _| {
        entries += 1;
        if entries > MAX_TREE_ENTRIES {
            over = true;
            git2::TreeWalkResult::Abort
        } else {
            git2::TreeWalkResult::Ok
        }
    })
    .ok();
    if over {
        return Err(SourceError::ResponseTooLarge {
            size: entries as u64,
            limit: MAX_TREE_ENTRIES as u64,
        });
    }
    Ok(())
}
