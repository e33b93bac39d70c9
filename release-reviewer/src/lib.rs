//! Release-review pipeline.
//!
//! Tracks independently-versioned repositories and, whenever one publishes
//! a new release, produces a structured operator-facing risk report:
//!
//! 1) **Feed** — fetch the repository's releases Atom feed.
//! 2) **Repo** — acquire a bounded-depth local clone (released after use).
//! 3) **Range** — map the release entry to a head and base commit.
//! 4) **Diff** — build a capped textual digest of the range.
//! 5) **Review** — one serialized structured-generation call with endpoint
//!    fallback, format repair, and a heuristic last resort.
//! 6) **Normalize** — coerce into the closed schema, ground evidence,
//!    augment with static diff-keyword detectors.
//! 7) **Report** — render deterministic Markdown, append to the protocol's
//!    bounded history, persist.
//!
//! The pipeline uses `tracing` for per-stage debug logging, `thiserror`
//! hierarchies for error propagation, and enum dispatch over thin clients.

pub mod diff;
pub mod errors;
pub mod feed;
pub mod normalize;
pub mod range;
pub mod repo;
pub mod report;
pub mod review;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use errors::{FeedError, ReviewResult};
use feed::{ReleaseEntry, RepoRef};
use llm_service::{LlmClient, SerialQueue};
use range::CommitRange;
use report::ReviewReport;
use repo::LocalRepo;
use store::{ProtocolState, RecentReport, ReportStore, recent_reports};

/// Backfill request sizes are clamped into this range.
pub const BACKFILL_MAX: usize = 10;
/// Per-release creation attempts before backfill advances past a release.
pub const BACKFILL_ATTEMPTS_PER_RELEASE: usize = 2;
/// Consecutive failed releases before a backfill walk stops early.
pub const BACKFILL_IDLE_STREAK_CAP: usize = 2;

const GENERATION_QUEUE_CAPACITY: usize = 32;

/// Outcome classification for one review/backfill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    NoNewRss,
    NewRssProcessed,
    BackfillStepCreated,
    BackfillStepIdle,
}

/// Counters for one backfill invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub requested: usize,
}

/// Full result of a review run, ready for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    pub message: String,
    pub protocol: String,
    pub rss: ReleaseEntry,
    pub report: Option<ReviewReport>,
    pub recent_reports: Vec<RecentReport>,
}

/// Shared pipeline engine: feed HTTP client, LLM client behind the
/// process-wide serialized queue, and the report store. Cheap to clone.
#[derive(Clone)]
pub struct ReviewEngine {
    llm: Arc<LlmClient>,
    queue: SerialQueue,
    http: reqwest::Client,
    store: ReportStore,
}

impl ReviewEngine {
    pub fn new(llm: LlmClient, store: ReportStore) -> Self {
        Self {
            llm: Arc::new(llm),
            queue: SerialQueue::new(GENERATION_QUEUE_CAPACITY),
            http: reqwest::Client::new(),
            store,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Runs one review for `protocol`.
    ///
    /// Idempotent on the latest release identity: when the stored
    /// `last_rss_entry_id` equals the feed's newest entry id and a report
    /// exists, the stored report is returned unchanged. Otherwise the full
    /// pipeline runs and appends exactly one new report. The clone is
    /// released on success and failure alike.
    pub async fn run_review(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
    ) -> ReviewResult<ReviewOutcome> {
        let entry = feed::fetch_latest_entry(&self.http, repo_ref)
            .await?
            .ok_or(FeedError::NoEntries)?;
        debug!(protocol, rss_id = %entry.id, "latest release entry fetched");

        let mut state = self.store.load(protocol)?;
        if state.last_rss_entry_id.as_deref() == Some(entry.id.as_str())
            && !state.reports.is_empty()
        {
            debug!(protocol, "no new release, returning stored report");
            return Ok(ReviewOutcome {
                status: ReviewStatus::NoNewRss,
                message: String::new(),
                protocol: protocol.to_string(),
                rss: entry,
                report: state.latest_report().cloned(),
                recent_reports: recent_reports(&state),
            });
        }

        let local = repo::ensure(repo_ref).await?;
        let result = self
            .process_latest(protocol, repo_ref, &local, &entry, &mut state)
            .await;
        repo::release(local).await;
        let report = result?;

        info!(protocol, report_id = %report.id, "new release reviewed");
        Ok(ReviewOutcome {
            status: ReviewStatus::NewRssProcessed,
            message: "Detected a new release and generated a report.".to_string(),
            protocol: protocol.to_string(),
            rss: entry,
            report: Some(report),
            recent_reports: recent_reports(&state),
        })
    }

    async fn process_latest(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
        local: &LocalRepo,
        entry: &ReleaseEntry,
        state: &mut ProtocolState,
    ) -> ReviewResult<ReviewReport> {
        let head_sha = range::resolve_head_for_entry(local, entry).await?;

        // Base priority: stored head (if it still resolves and differs),
        // the previous release's head, the head's first parent.
        let base_sha = match state.last_head_sha.clone() {
            Some(stored) if stored != head_sha && range::commit_exists(local, &stored).await => {
                stored
            }
            Some(_) => range::resolve_base_from_previous(local, None, &head_sha).await,
            None => {
                let latest_two = feed::fetch_release_entries(&self.http, repo_ref, 2).await?;
                let previous = latest_two.into_iter().nth(1);
                range::resolve_base_from_previous(local, previous, &head_sha).await
            }
        };
        debug!(protocol, %base_sha, %head_sha, "commit range resolved");

        let range = CommitRange { base_sha, head_sha };
        let report = self
            .create_report_for_release(protocol, repo_ref, local, entry, &range)
            .await?;

        state.last_rss_entry_id = Some(entry.id.clone());
        state.last_head_sha = Some(range.head_sha.clone());
        self.store.append(state, report.clone())?;
        Ok(report)
    }

    /// Diff digest → serialized generation → normalization → report.
    /// Generation failure is absorbed into a degraded review so a report
    /// is produced in every case.
    async fn create_report_for_release(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
        local: &LocalRepo,
        entry: &ReleaseEntry,
        range: &CommitRange,
    ) -> ReviewResult<ReviewReport> {
        let diff = diff::build(local, range).await?;
        let checks = normalize::detect_operator_checks(&diff);

        let input = review::ReviewInput {
            protocol: protocol.to_string(),
            repo_url: repo_ref.remote_url(),
            rss_title: entry.title.clone(),
            base_sha: range.base_sha.clone(),
            head_sha: range.head_sha.clone(),
            diff: diff.clone(),
        };

        let llm = self.llm.clone();
        let generated = self
            .queue
            .run(async move { review::generate_review(&llm, &input).await })
            .await;
        let raw = match generated {
            Ok(Ok(value)) => value,
            Ok(Err(e)) | Err(e) => {
                warn!(protocol, error = %e, "generation failed, producing degraded review");
                review::fallback::degraded_review(&e.to_string())
            }
        };

        let normalized = normalize::normalize_review(&raw, checks, &diff.grounding_text());
        Ok(report::build_report(
            protocol, entry, range, &normalized, &diff.log,
        ))
    }

    /// Creates reports for up to `count` recent releases (oldest first),
    /// skipping release identities already present in the history.
    ///
    /// `step` mode creates at most one report. In both modes a release
    /// whose creation fails [`BACKFILL_ATTEMPTS_PER_RELEASE`] times counts
    /// as failed and the walk advances; after
    /// [`BACKFILL_IDLE_STREAK_CAP`] consecutive failed releases the walk
    /// stops early with partial counters.
    pub async fn backfill(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
        count: usize,
        step: bool,
    ) -> ReviewResult<BackfillSummary> {
        let count = clamp_backfill_count(count);
        let releases = feed::fetch_release_entries(&self.http, repo_ref, count + 1).await?;
        if releases.is_empty() {
            return Ok(BackfillSummary {
                requested: count,
                ..BackfillSummary::default()
            });
        }

        let local = repo::ensure(repo_ref).await?;
        let result = self
            .backfill_inner(protocol, repo_ref, &local, &releases, count, step)
            .await;
        repo::release(local).await;
        result
    }

    async fn backfill_inner(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
        local: &LocalRepo,
        releases: &[ReleaseEntry],
        count: usize,
        step: bool,
    ) -> ReviewResult<BackfillSummary> {
        let mut state = self.store.load(protocol)?;
        let max_create = if step { 1 } else { usize::MAX };

        let mut summary = BackfillSummary {
            requested: count,
            ..BackfillSummary::default()
        };
        let mut idle_streak = 0usize;

        let target = &releases[..count.min(releases.len())];
        for (i, entry) in target.iter().enumerate().rev() {
            if summary.created >= max_create {
                break;
            }
            let identity = entry.identity().to_string();
            if state.knows_release(&identity) {
                summary.skipped += 1;
                continue;
            }

            let previous = releases.get(i + 1).cloned();
            match self
                .backfill_one(protocol, repo_ref, local, entry, previous)
                .await
            {
                Some(report) => {
                    self.store.append(&mut state, report)?;
                    summary.created += 1;
                    idle_streak = 0;
                }
                None => {
                    summary.failed += 1;
                    idle_streak += 1;
                    if idle_streak >= BACKFILL_IDLE_STREAK_CAP {
                        warn!(protocol, "backfill idle streak cap reached, stopping walk");
                        break;
                    }
                }
            }
        }

        // Track the feed's newest entry regardless of what the walk created.
        if let Some(newest) = releases.first() {
            state.last_rss_entry_id = Some(newest.id.clone());
            state.last_head_sha = Some(range::resolve_head_for_entry(local, newest).await?);
        }
        self.store.save(&state)?;

        info!(
            protocol,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "backfill finished"
        );
        Ok(summary)
    }

    /// One release with the fixed per-release attempt cap; `None` when
    /// every attempt failed.
    async fn backfill_one(
        &self,
        protocol: &str,
        repo_ref: &RepoRef,
        local: &LocalRepo,
        entry: &ReleaseEntry,
        previous: Option<ReleaseEntry>,
    ) -> Option<ReviewReport> {
        for attempt in 1..=BACKFILL_ATTEMPTS_PER_RELEASE {
            let attempt_result = async {
                let head_sha = range::resolve_head_for_entry(local, entry).await?;
                let base_sha =
                    range::resolve_base_from_previous(local, previous.clone(), &head_sha).await;
                let range = CommitRange { base_sha, head_sha };
                self.create_report_for_release(protocol, repo_ref, local, entry, &range)
                    .await
            }
            .await;

            match attempt_result {
                Ok(report) => return Some(report),
                Err(e) => {
                    warn!(protocol, rss_id = %entry.id, attempt, error = %e, "backfill release attempt failed");
                }
            }
        }
        None
    }
}

/// Requested backfill sizes are clamped into `1..=BACKFILL_MAX`.
pub fn clamp_backfill_count(count: usize) -> usize {
    count.clamp(1, BACKFILL_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_count_is_clamped() {
        assert_eq!(clamp_backfill_count(0), 1);
        assert_eq!(clamp_backfill_count(5), 5);
        assert_eq!(clamp_backfill_count(50), BACKFILL_MAX);
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let s = serde_json::to_string(&ReviewStatus::NewRssProcessed).unwrap();
        assert_eq!(s, "\"new_rss_processed\"");
        let s = serde_json::to_string(&ReviewStatus::BackfillStepIdle).unwrap();
        assert_eq!(s, "\"backfill_step_idle\"");
    }
}
