//! Repository cache: acquires/refreshes a local clone of a tracked
//! repository and releases it after the pipeline completes.
//!
//! Clones are bounded to [`CLONE_DEPTH`] commits. The depth bound is a
//! trade-off: a base commit beyond the bound cannot resolve precisely and
//! the range resolver falls back to a coarser comparison.
//!
//! libgit2 is blocking, so every public entry wraps the plumbing in
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, BranchType, FetchOptions, FetchPrune, Repository};
use tracing::{debug, warn};

use crate::errors::RepoSyncError;
use crate::feed::RepoRef;

/// Shallow-clone bound, in commits.
pub const CLONE_DEPTH: i32 = 200;

/// A scoped local clone. Acquire with [`ensure`], always pass to
/// [`release`] when the pipeline run completes — including on failure.
#[derive(Debug, Clone)]
pub struct LocalRepo {
    pub path: PathBuf,
    pub remote_url: String,
}

/// Root directory for clones (env-overridable).
fn repos_root() -> PathBuf {
    let data = std::env::var("RELPULSE_DATA_DIR").unwrap_or_else(|_| "data".into());
    PathBuf::from(data).join("repos")
}

/// Ensures a synchronized local clone for `repo_ref`.
///
/// - No local copy → bounded-depth clone of the default branch.
/// - Existing copy whose origin no longer names `owner/repo` (the catalog
///   retargeted) → delete and re-clone.
/// - Otherwise fetch with prune and tags, then fast-forward the local
///   tracking branch to the origin default branch.
pub async fn ensure(repo_ref: &RepoRef) -> Result<LocalRepo, RepoSyncError> {
    let repo_ref = repo_ref.clone();
    tokio::task::spawn_blocking(move || sync_repo(&repo_ref)).await?
}

/// Unconditionally deletes the local clone. Errors are ignored: a leftover
/// directory is re-created on the next [`ensure`].
pub async fn release(repo: LocalRepo) {
    debug!(path = %repo.path.display(), "releasing local clone");
    let _ = tokio::fs::remove_dir_all(&repo.path).await;
}

fn sync_repo(repo_ref: &RepoRef) -> Result<LocalRepo, RepoSyncError> {
    let path = repos_root().join(repo_ref.folder_name());
    let remote_url = repo_ref.remote_url();
    std::fs::create_dir_all(repos_root())?;

    if !path.join(".git").exists() {
        clone_bounded(&remote_url, &path)?;
        return Ok(LocalRepo { path, remote_url });
    }

    let expected = format!("{}/{}", repo_ref.owner, repo_ref.repo);
    let origin_matches = Repository::open(&path)
        .ok()
        .and_then(|repo| {
            repo.find_remote("origin")
                .ok()
                .and_then(|r| r.url().map(|u| u.contains(&expected)))
        })
        .unwrap_or(false);

    if !origin_matches {
        debug!(path = %path.display(), "origin mismatch, re-cloning");
        std::fs::remove_dir_all(&path)?;
        clone_bounded(&remote_url, &path)?;
        return Ok(LocalRepo { path, remote_url });
    }

    refresh(&path)?;
    Ok(LocalRepo { path, remote_url })
}

fn clone_bounded(remote_url: &str, path: &Path) -> Result<(), RepoSyncError> {
    debug!(%remote_url, path = %path.display(), depth = CLONE_DEPTH, "cloning");
    let mut fo = FetchOptions::new();
    fo.depth(CLONE_DEPTH);
    RepoBuilder::new().fetch_options(fo).clone(remote_url, path)?;
    Ok(())
}

/// Fetch + prune + tags, then fast-forward-only checkout of the origin
/// default branch.
fn refresh(path: &Path) -> Result<(), RepoSyncError> {
    let repo = Repository::open(path)?;

    {
        let mut remote = repo.find_remote("origin")?;
        let mut fo = FetchOptions::new();
        fo.prune(FetchPrune::On)
            .download_tags(AutotagOption::All)
            .depth(CLONE_DEPTH);
        remote.fetch(&[] as &[&str], Some(&mut fo), None)?;
    }

    let branch = default_branch(&repo);
    let origin_commit = repo
        .find_reference(&format!("refs/remotes/origin/{branch}"))?
        .peel_to_commit()?;
    let origin_oid = origin_commit.id();

    match repo.find_branch(&branch, BranchType::Local) {
        Ok(local) => {
            let local_oid = local.get().target();
            if let Some(local_oid) = local_oid {
                if local_oid != origin_oid {
                    if repo.graph_descendant_of(origin_oid, local_oid)? {
                        repo.find_reference(&format!("refs/heads/{branch}"))?
                            .set_target(origin_oid, "fast-forward")?;
                    } else {
                        // Diverged history; keep the local tip rather than
                        // rewriting it.
                        warn!(%branch, "local branch not fast-forwardable, keeping tip");
                    }
                }
            }
        }
        Err(_) => {
            let mut created = repo.branch(&branch, &origin_commit, true)?;
            created.set_upstream(Some(&format!("origin/{branch}")))?;
        }
    }

    repo.set_head(&format!("refs/heads/{branch}"))?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
    Ok(())
}

/// Origin default branch name from `refs/remotes/origin/HEAD`,
/// falling back to `main`.
fn default_branch(repo: &Repository) -> String {
    repo.find_reference("refs/remotes/origin/HEAD")
        .ok()
        .and_then(|r| {
            r.symbolic_target()
                .and_then(|t| t.strip_prefix("refs/remotes/origin/"))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "main".to_string())
}
