//! Diff context builder: a bounded textual digest of a commit range.
//!
//! Four independently capped blocks: one-line commit log, name-status file
//! list, diff-stat summary, and a unified patch restricted to the top
//! changed files. Intentionally lossy — it samples representative changes
//! rather than the full diff, trading completeness for bounded downstream
//! request size. Each block is best-effort: a failing git operation yields
//! an empty block, never an error.

use std::path::Path;

use git2::{Delta, DiffFormat, DiffOptions, DiffStatsFormat, Oid, Repository};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RepoSyncError;
use crate::range::CommitRange;
use crate::repo::LocalRepo;

pub const LOG_CAP: usize = 8000;
pub const NAME_STATUS_CAP: usize = 5000;
pub const DIFF_STAT_CAP: usize = 4000;
pub const PATCH_CAP: usize = 12000;

/// Max commits in the one-line log block.
const MAX_LOG_COMMITS: usize = 120;
/// The unified patch covers only this many files, in name-status order.
const PATCH_TOP_FILES: usize = 8;
/// Unified context lines in the patch block.
const PATCH_CONTEXT: u32 = 3;

/// Bounded digest of one commit range. Derived, never persisted standalone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffContext {
    pub log: String,
    pub name_status: String,
    pub diff_stat: String,
    pub patch: String,
}

impl DiffContext {
    /// Text evidence claims are grounded against (log + files + stats;
    /// the patch excerpt is excluded on purpose — it is sampled too
    /// aggressively to anchor claims).
    pub fn grounding_text(&self) -> String {
        format!("{}\n{}\n{}", self.log, self.name_status, self.diff_stat).to_lowercase()
    }

    /// Everything the static keyword detectors scan.
    pub fn detector_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.log, self.name_status, self.diff_stat, self.patch
        )
        .to_lowercase()
    }
}

/// Builds the digest for `range` against the local clone.
pub async fn build(repo: &LocalRepo, range: &CommitRange) -> Result<DiffContext, RepoSyncError> {
    let path = repo.path.clone();
    let range = range.clone();
    Ok(tokio::task::spawn_blocking(move || build_inner(&path, &range)).await?)
}

fn build_inner(path: &Path, range: &CommitRange) -> DiffContext {
    let Ok(repo) = Repository::open(path) else {
        return DiffContext::default();
    };

    let log = commit_log(&repo, range).unwrap_or_default();
    let name_status = name_status(&repo, range).unwrap_or_default();
    let diff_stat = diff_stat(&repo, range).unwrap_or_default();

    let top_files: Vec<String> = name_status
        .lines()
        .take(PATCH_TOP_FILES)
        .filter_map(|line| line.split_once('\t').map(|(_, p)| p.to_string()))
        .collect();
    let patch = if top_files.is_empty() {
        String::new()
    } else {
        patch_for_files(&repo, range, &top_files).unwrap_or_default()
    };

    debug!(
        log_len = log.len(),
        files_len = name_status.len(),
        stat_len = diff_stat.len(),
        patch_len = patch.len(),
        "diff context built"
    );

    DiffContext {
        log: truncate_chars(log, LOG_CAP),
        name_status: truncate_chars(name_status, NAME_STATUS_CAP),
        diff_stat: truncate_chars(diff_stat, DIFF_STAT_CAP),
        patch: truncate_chars(patch, PATCH_CAP),
    }
}

/// `git log --oneline --max-count=120 base..head`.
fn commit_log(repo: &Repository, range: &CommitRange) -> Result<String, git2::Error> {
    let head = Oid::from_str(&range.head_sha)?;
    let base = Oid::from_str(&range.base_sha)?;

    let mut walk = repo.revwalk()?;
    walk.push(head)?;
    walk.hide(base)?;

    let mut lines = Vec::new();
    for oid in walk.take(MAX_LOG_COMMITS) {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let short: String = oid.to_string().chars().take(7).collect();
        lines.push(format!("{short} {}", commit.summary().unwrap_or("")));
    }
    Ok(lines.join("\n"))
}

fn range_diff<'r>(
    repo: &'r Repository,
    range: &CommitRange,
    opts: Option<&mut DiffOptions>,
) -> Result<git2::Diff<'r>, git2::Error> {
    let base_tree = repo
        .find_commit(Oid::from_str(&range.base_sha)?)?
        .tree()?;
    let head_tree = repo
        .find_commit(Oid::from_str(&range.head_sha)?)?
        .tree()?;
    repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), opts)
}

/// `git diff --name-status base..head`, one `{status}\t{path}` per line.
fn name_status(repo: &Repository, range: &CommitRange) -> Result<String, git2::Error> {
    let diff = range_diff(repo, range, None)?;
    let mut lines = Vec::new();
    for delta in diff.deltas() {
        let status = match delta.status() {
            Delta::Added => 'A',
            Delta::Deleted => 'D',
            Delta::Renamed => 'R',
            Delta::Copied => 'C',
            Delta::Typechange => 'T',
            _ => 'M',
        };
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        lines.push(format!("{status}\t{path}"));
    }
    Ok(lines.join("\n"))
}

/// `git diff --stat base..head`.
fn diff_stat(repo: &Repository, range: &CommitRange) -> Result<String, git2::Error> {
    let diff = range_diff(repo, range, None)?;
    let stats = diff.stats()?;
    let buf = stats.to_buf(DiffStatsFormat::FULL, 80)?;
    Ok(buf.as_str().unwrap_or("").to_string())
}

/// `git diff --unified=3 base..head -- <top files>`.
fn patch_for_files(
    repo: &Repository,
    range: &CommitRange,
    files: &[String],
) -> Result<String, git2::Error> {
    let mut opts = DiffOptions::new();
    opts.context_lines(PATCH_CONTEXT);
    for file in files {
        opts.pathspec(file);
    }

    let diff = range_diff(repo, range, Some(&mut opts))?;
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        let origin = line.origin();
        if matches!(origin, '+' | '-' | ' ') {
            out.push(origin);
        }
        out.push_str(std::str::from_utf8(line.content()).unwrap_or(""));
        true
    })?;
    Ok(out)
}

/// Character-cap truncation (caps are character budgets, not bytes).
fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

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

    #[tokio::test]
    async fn digest_covers_log_files_stats_and_patch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let base = commit_file(&repo, "config.toml", "retention = 7\n", "initial commit");
        let head = commit_file(
            &repo,
            "config.toml",
            "retention = 30\n",
            "raise retention window",
        );

        let local = LocalRepo {
            path: dir.path().to_path_buf(),
            remote_url: String::new(),
        };
        let range = CommitRange {
            base_sha: base.to_string(),
            head_sha: head.to_string(),
        };
        let ctx = build(&local, &range).await.unwrap();

        assert!(ctx.log.contains("raise retention window"));
        assert!(ctx.name_status.contains("M\tconfig.toml"));
        assert!(ctx.diff_stat.contains("config.toml"));
        assert!(ctx.patch.contains("+retention = 30"));
        assert!(ctx.patch.contains("-retention = 7"));
    }

    #[tokio::test]
    async fn identical_range_yields_empty_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let only = commit_file(&repo, "a.txt", "x\n", "initial commit");

        let local = LocalRepo {
            path: dir.path().to_path_buf(),
            remote_url: String::new(),
        };
        let range = CommitRange {
            base_sha: only.to_string(),
            head_sha: only.to_string(),
        };
        let ctx = build(&local, &range).await.unwrap();
        assert!(ctx.log.is_empty());
        assert!(ctx.name_status.is_empty());
        assert!(ctx.patch.is_empty());
    }

    #[test]
    fn truncation_is_char_based() {
        let s = "é".repeat(10);
        assert_eq!(truncate_chars(s, 4).chars().count(), 4);
    }
}
