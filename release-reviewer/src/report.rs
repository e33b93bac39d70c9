//! Report assembly and the Markdown renderer.
//!
//! Rendering is a pure function of the report's own fields: re-rendering a
//! stored report yields byte-identical output.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::ReleaseEntry;
use crate::normalize::{NormalizedReview, Verdict};
use crate::range::CommitRange;

/// The raw commit log section is clipped to this many characters.
const RAW_COMMIT_CAP: usize = 16000;

/// One immutable review report. Field names follow the persisted JSON
/// contract (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    pub id: String,
    pub generated_at: String,
    pub rss_id: String,
    pub rss_title: String,
    pub rss_updated_at: Option<String>,
    pub base_sha: String,
    pub head_sha: String,
    pub verdict: Verdict,
    pub critical_risks: Vec<String>,
    pub notable_changes: Vec<String>,
    pub review_notes: Vec<String>,
    pub rpc_api_changes: Vec<String>,
    pub archive_node_impact: Vec<String>,
    pub operator_actions: Vec<String>,
    pub migration_checklist: Vec<String>,
    pub evidence: Vec<String>,
    pub operator_checks: Vec<String>,
    pub commit_log: String,
    pub markdown: String,
}

impl ReviewReport {
    /// Release identity: id, falling back to title.
    pub fn release_identity(&self) -> &str {
        if self.rss_id.trim().is_empty() {
            &self.rss_title
        } else {
            &self.rss_id
        }
    }
}

/// Lowercased protocol name with non-alphanumeric runs collapsed to `-`.
pub fn protocol_slug(protocol: &str) -> String {
    let mut slug = String::with_capacity(protocol.len());
    let mut last_dash = true;
    for c in protocol.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Process-wide counter disambiguating reports created within the same
/// millisecond (a backfill walk can produce several back to back).
static REPORT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Assembles a report from a normalized review. The id combines the
/// protocol slug, the creation timestamp, and a process-wide sequence
/// number, so ids never collide within one protocol history.
pub fn build_report(
    protocol: &str,
    entry: &ReleaseEntry,
    range: &CommitRange,
    review: &NormalizedReview,
    commit_log: &str,
) -> ReviewReport {
    let now = Utc::now();
    let generated_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let seq = REPORT_SEQ.fetch_add(1, Ordering::Relaxed);
    let id = format!(
        "{}-{}-{seq}",
        protocol_slug(protocol),
        now.timestamp_millis()
    );

    let mut report = ReviewReport {
        id,
        generated_at,
        rss_id: entry.id.clone(),
        rss_title: entry.title.clone(),
        rss_updated_at: entry.updated_at.clone(),
        base_sha: range.base_sha.clone(),
        head_sha: range.head_sha.clone(),
        verdict: review.verdict,
        critical_risks: review.critical_risks.clone(),
        notable_changes: review.notable_changes.clone(),
        review_notes: review.review_notes.clone(),
        rpc_api_changes: review.rpc_api_changes.clone(),
        archive_node_impact: review.archive_node_impact.clone(),
        operator_actions: review.operator_actions.clone(),
        migration_checklist: review.migration_checklist.clone(),
        evidence: review.evidence.clone(),
        operator_checks: review.operator_checks.clone(),
        commit_log: commit_log.to_string(),
        markdown: String::new(),
    };
    report.markdown = render_markdown(protocol, &report, review);
    report
}

fn bullet_block(items: &[String], empty_placeholder: &str) -> String {
    if items.is_empty() {
        format!("- {empty_placeholder}")
    } else {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fixed-section operations report. Every empty list renders a stable
/// placeholder bullet.
pub fn render_markdown(protocol: &str, report: &ReviewReport, review: &NormalizedReview) -> String {
    let commit_log = if report.commit_log.trim().is_empty() {
        "(none)".to_string()
    } else {
        report.commit_log.chars().take(RAW_COMMIT_CAP).collect()
    };

    let lines = [
        format!("# {protocol} Operations Report"),
        String::new(),
        format!("- Generated: {}", report.generated_at),
        format!("- RSS: {}", report.rss_title),
        format!("- Base: {}", report.base_sha),
        format!("- Head: {}", report.head_sha),
        format!("- Verdict: {}", report.verdict),
        String::new(),
        "## Summary".to_string(),
        review.overview.clone(),
        String::new(),
        "## Operator Checks".to_string(),
        bullet_block(&review.operator_checks, "Nothing flagged"),
        String::new(),
        "## Notable Changes".to_string(),
        bullet_block(&review.notable_changes, "No notable changes"),
        String::new(),
        "## RPC/API Impact".to_string(),
        bullet_block(&review.rpc_api_changes, "Not applicable"),
        String::new(),
        "## Archive Node Impact".to_string(),
        bullet_block(&review.archive_node_impact, "Not applicable"),
        String::new(),
        "## Operator Action Items".to_string(),
        bullet_block(&review.operator_actions, "Not applicable"),
        String::new(),
        "## Migration Checklist".to_string(),
        bullet_block(&review.migration_checklist, "Not applicable"),
        String::new(),
        "## Risks & Cautions".to_string(),
        bullet_block(&review.critical_risks, "No risk items"),
        String::new(),
        "## Evidence".to_string(),
        bullet_block(&review.evidence, "No supporting data"),
        String::new(),
        "## Operations Notes".to_string(),
        bullet_block(&review.review_notes, "No additional notes"),
        String::new(),
        "## Raw Commit Data".to_string(),
        "### Commit Log".to_string(),
        "```text".to_string(),
        commit_log,
        "```".to_string(),
        String::new(),
    ];

    lines.join("\n")
}
