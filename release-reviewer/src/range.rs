//! Commit range resolver: maps a release entry to a head commit and a
//! base commit within one repository snapshot.
//!
//! Head resolution order: release tag from the entry link → raw ref of the
//! tag name → tip of the checked-out default branch.
//!
//! Base resolution order: caller-supplied stored head (checked in the
//! pipeline), previous release entry's head, immediate parent of the new
//! head. A range therefore always exists, even for a protocol's very first
//! reviewed release.

use std::path::Path;

use git2::Repository;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RepoSyncError;
use crate::feed::ReleaseEntry;
use crate::repo::LocalRepo;

lazy_static! {
    static ref RELEASE_TAG_RE: Regex =
        Regex::new(r"(?i)/releases/tag/([^/?#]+)").expect("release tag regex");
}

/// The commit range summarized for one release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRange {
    #[serde(rename = "baseSha")]
    pub base_sha: String,
    #[serde(rename = "headSha")]
    pub head_sha: String,
}

/// Extracts the release tag from an entry's detail link, percent-decoded.
pub fn parse_release_tag(link: &str) -> Option<String> {
    let captured = RELEASE_TAG_RE.captures(link)?.get(1)?.as_str();
    Some(
        urlencoding::decode(captured)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| captured.to_string()),
    )
}

/// Resolves the head commit for a release entry.
pub async fn resolve_head_for_entry(
    repo: &LocalRepo,
    entry: &ReleaseEntry,
) -> Result<String, RepoSyncError> {
    let path = repo.path.clone();
    let link = entry.link.clone();
    tokio::task::spawn_blocking(move || resolve_head_inner(&path, link.as_deref())).await?
}

/// Resolves the base commit from the immediately preceding release entry,
/// falling back to the head's first parent, then to the head itself
/// (single-commit histories).
pub async fn resolve_base_from_previous(
    repo: &LocalRepo,
    previous: Option<ReleaseEntry>,
    head_sha: &str,
) -> String {
    let path = repo.path.clone();
    let head = head_sha.to_string();
    let link = previous.and_then(|p| p.link);
    tokio::task::spawn_blocking(move || resolve_base_inner(&path, link.as_deref(), &head))
        .await
        .unwrap_or_else(|_| head_sha.to_string())
}

/// Whether `sha` still resolves to a commit object in the local clone.
pub async fn commit_exists(repo: &LocalRepo, sha: &str) -> bool {
    let path = repo.path.clone();
    let sha = sha.to_string();
    tokio::task::spawn_blocking(move || commit_exists_inner(&path, &sha))
        .await
        .unwrap_or(false)
}

fn resolve_head_inner(path: &Path, link: Option<&str>) -> Result<String, RepoSyncError> {
    let repo = Repository::open(path)?;

    if let Some(tag) = link.and_then(parse_release_tag) {
        if let Some(sha) = resolve_commit(&repo, &format!("refs/tags/{tag}")) {
            debug!(%tag, %sha, "head resolved via tag ref");
            return Ok(sha);
        }
        if let Some(sha) = resolve_commit(&repo, &tag) {
            debug!(%tag, %sha, "head resolved via raw ref");
            return Ok(sha);
        }
    }

    Ok(repo.head()?.peel_to_commit()?.id().to_string())
}

fn resolve_base_inner(path: &Path, previous_link: Option<&str>, head_sha: &str) -> String {
    let Ok(repo) = Repository::open(path) else {
        return head_sha.to_string();
    };

    if previous_link.is_some() {
        if let Ok(prev) = resolve_head_inner(path, previous_link) {
            if prev != head_sha {
                return prev;
            }
        }
    }

    parent_of(&repo, head_sha).unwrap_or_else(|| head_sha.to_string())
}

fn commit_exists_inner(path: &Path, sha: &str) -> bool {
    let Ok(repo) = Repository::open(path) else {
        return false;
    };
    git2::Oid::from_str(sha)
        .ok()
        .and_then(|oid| repo.find_commit(oid).ok())
        .is_some()
}

/// `rev-list -n 1 <refname>` equivalent: resolve and peel to a commit.
fn resolve_commit(repo: &Repository, refname: &str) -> Option<String> {
    repo.revparse_single(refname)
        .ok()?
        .peel_to_commit()
        .ok()
        .map(|c| c.id().to_string())
}

fn parent_of(repo: &Repository, sha: &str) -> Option<String> {
    let oid = git2::Oid::from_str(sha).ok()?;
    let commit = repo.find_commit(oid).ok()?;
    commit.parent(0).ok().map(|p| p.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ReleaseEntry;
    use git2::Signature;
    use std::path::Path;

    fn commit_file(repo: &Repository, name: &str, content: &str, msg: &str) -> git2::Oid {
        std::fs::write(repo.workdir().unwrap().join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
            .unwrap()
    }

    fn fixture() -> (tempfile::TempDir, LocalRepo, git2::Oid, git2::Oid) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repo, "a.txt", "one", "initial commit");
        let second = commit_file(&repo, "a.txt", "two", "release v1.2.0");
        let head = repo.find_commit(second).unwrap();
        repo.tag(
            "v1.2.0",
            head.as_object(),
            &Signature::now("tester", "tester@example.com").unwrap(),
            "release",
            false,
        )
        .unwrap();
        let local = LocalRepo {
            path: dir.path().to_path_buf(),
            remote_url: "https://github.com/acme/node.git".into(),
        };
        (dir, local, first, second)
    }

    fn entry(link: &str) -> ReleaseEntry {
        ReleaseEntry {
            id: "id".into(),
            title: "v1.2.0".into(),
            updated_at: None,
            link: Some(link.into()),
        }
    }

    #[test]
    fn parses_tag_from_release_link() {
        assert_eq!(
            parse_release_tag("https://github.com/acme/node/releases/tag/v1.2.0"),
            Some("v1.2.0".into())
        );
        assert_eq!(
            parse_release_tag("https://github.com/acme/node/releases/tag/v1.2.0%2Brc1"),
            Some("v1.2.0+rc1".into())
        );
        assert_eq!(parse_release_tag("https://github.com/acme/node"), None);
    }

    #[tokio::test]
    async fn head_resolves_via_tag_then_base_falls_back_to_parent() {
        let (_dir, local, first, second) = fixture();

        // Scenario: ".../releases/tag/v1.2.0" with no prior history.
        let head = resolve_head_for_entry(
            &local,
            &entry("https://github.com/acme/node/releases/tag/v1.2.0"),
        )
        .await
        .unwrap();
        assert_eq!(head, second.to_string());

        // No usable previous release and no stored head → immediate parent.
        let base = resolve_base_from_previous(&local, None, &head).await;
        assert_eq!(base, first.to_string());
    }

    #[tokio::test]
    async fn unknown_tag_falls_back_to_branch_tip() {
        let (_dir, local, _first, second) = fixture();
        let head = resolve_head_for_entry(
            &local,
            &entry("https://github.com/acme/node/releases/tag/v9.9.9"),
        )
        .await
        .unwrap();
        assert_eq!(head, second.to_string());
    }

    #[tokio::test]
    async fn single_commit_history_uses_head_as_base() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let only = commit_file(&repo, "a.txt", "one", "initial commit");
        let local = LocalRepo {
            path: dir.path().to_path_buf(),
            remote_url: String::new(),
        };
        let base = resolve_base_from_previous(&local, None, &only.to_string()).await;
        assert_eq!(base, only.to_string());
    }

    #[tokio::test]
    async fn commit_existence_check() {
        let (_dir, local, first, _second) = fixture();
        assert!(commit_exists(&local, &first.to_string()).await);
        assert!(!commit_exists(&local, &"0".repeat(40)).await);
    }
}
