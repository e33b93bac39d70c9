//! Per-protocol report history on disk.
//!
//! One JSON document per protocol under `{data}/reviews/{slug}.json` holds
//! the review state and its bounded report history; every report
//! additionally lands as a standalone Markdown file in the reports
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StoreError;
use crate::normalize::Verdict;
use crate::report::{ReviewReport, protocol_slug};

/// Oldest reports are dropped past this bound on every append.
pub const MAX_REPORTS_PER_PROTOCOL: usize = 30;
/// How many history entries the recent view exposes.
pub const RECENT_REPORTS: usize = 5;

const DATA_DIR_ENV: &str = "RELPULSE_DATA_DIR";
const REPORTS_DIR_ENV: &str = "RELPULSE_REPORTS_DIR";

/// Durable per-protocol review state. `reports` is ordered oldest to
/// newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolState {
    pub protocol: String,
    pub last_rss_entry_id: Option<String>,
    pub last_head_sha: Option<String>,
    #[serde(default)]
    pub reports: Vec<ReviewReport>,
}

impl ProtocolState {
    pub fn empty(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            last_rss_entry_id: None,
            last_head_sha: None,
            reports: Vec::new(),
        }
    }

    pub fn latest_report(&self) -> Option<&ReviewReport> {
        self.reports.last()
    }

    /// True when a report for this release identity already exists.
    pub fn knows_release(&self, identity: &str) -> bool {
        self.reports.iter().any(|r| r.release_identity() == identity)
    }
}

/// Condensed history entry for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentReport {
    pub id: String,
    pub rss_id: Option<String>,
    pub generated_at: String,
    pub github_updated_at: Option<String>,
    pub verdict: Verdict,
    pub head_sha: String,
    pub rss_title: String,
    pub markdown: String,
}

/// Filesystem-backed store for protocol states and rendered reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    reviews_dir: PathBuf,
    reports_dir: PathBuf,
}

impl ReportStore {
    /// Directories from `RELPULSE_DATA_DIR` (default `data`) and
    /// `RELPULSE_REPORTS_DIR` (default `reports`).
    pub fn from_env() -> Self {
        let data = std::env::var(DATA_DIR_ENV).unwrap_or_else(|_| "data".to_string());
        let reports = std::env::var(REPORTS_DIR_ENV).unwrap_or_else(|_| "reports".to_string());
        Self::with_roots(Path::new(&data), Path::new(&reports))
    }

    pub fn with_roots(data_dir: &Path, reports_dir: &Path) -> Self {
        Self {
            reviews_dir: data_dir.join("reviews"),
            reports_dir: reports_dir.to_path_buf(),
        }
    }

    fn state_path(&self, protocol: &str) -> PathBuf {
        self.reviews_dir.join(format!("{}.json", protocol_slug(protocol)))
    }

    /// Loads the protocol state; a missing file yields an empty state.
    pub fn load(&self, protocol: &str) -> Result<ProtocolState, StoreError> {
        let path = self.state_path(protocol);
        if !path.exists() {
            return Ok(ProtocolState::empty(protocol));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, state: &ProtocolState) -> Result<(), StoreError> {
        fs::create_dir_all(&self.reviews_dir)?;
        let path = self.state_path(&state.protocol);
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&path, raw)?;
        debug!(protocol = %state.protocol, reports = state.reports.len(), "protocol state saved");
        Ok(())
    }

    /// Appends a report (trimming the history to the newest
    /// [`MAX_REPORTS_PER_PROTOCOL`]), writes its Markdown file, and
    /// persists the state.
    pub fn append(&self, state: &mut ProtocolState, report: ReviewReport) -> Result<(), StoreError> {
        self.write_markdown(&report)?;
        state.reports.push(report);
        if state.reports.len() > MAX_REPORTS_PER_PROTOCOL {
            let excess = state.reports.len() - MAX_REPORTS_PER_PROTOCOL;
            state.reports.drain(..excess);
        }
        self.save(state)
    }

    fn write_markdown(&self, report: &ReviewReport) -> Result<(), StoreError> {
        fs::create_dir_all(&self.reports_dir)?;
        let path = self.reports_dir.join(format!("{}.md", report.id));
        fs::write(&path, format!("{}\n", report.markdown))?;
        Ok(())
    }
}

/// Newest-first view of the history, deduplicated by release identity,
/// capped at [`RECENT_REPORTS`].
pub fn recent_reports(state: &ProtocolState) -> Vec<RecentReport> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for report in state.reports.iter().rev() {
        let key = report.release_identity().to_string();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(RecentReport {
            id: report.id.clone(),
            rss_id: if report.rss_id.is_empty() {
                None
            } else {
                Some(report.rss_id.clone())
            },
            generated_at: report.generated_at.clone(),
            github_updated_at: report.rss_updated_at.clone(),
            verdict: report.verdict,
            head_sha: report.head_sha.clone(),
            rss_title: report.rss_title.clone(),
            markdown: report.markdown.clone(),
        });
        if out.len() >= RECENT_REPORTS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(id: &str, rss_id: &str, title: &str) -> ReviewReport {
        ReviewReport {
            id: id.to_string(),
            generated_at: "2026-01-01T00:00:00.000Z".to_string(),
            rss_id: rss_id.to_string(),
            rss_title: title.to_string(),
            rss_updated_at: None,
            base_sha: "a".repeat(40),
            head_sha: "b".repeat(40),
            verdict: Verdict::Safe,
            critical_risks: Vec::new(),
            notable_changes: Vec::new(),
            review_notes: Vec::new(),
            rpc_api_changes: Vec::new(),
            archive_node_impact: Vec::new(),
            operator_actions: Vec::new(),
            migration_checklist: Vec::new(),
            evidence: Vec::new(),
            operator_checks: Vec::new(),
            commit_log: String::new(),
            markdown: "# report".to_string(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, ReportStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::with_roots(&dir.path().join("data"), &dir.path().join("reports"));
        (dir, store)
    }

    #[test]
    fn missing_state_file_loads_as_empty() {
        let (_dir, store) = temp_store();
        let state = store.load("ethereum").unwrap();
        assert_eq!(state.protocol, "ethereum");
        assert!(state.reports.is_empty());
        assert!(state.last_rss_entry_id.is_none());
    }

    #[test]
    fn append_persists_state_and_markdown() {
        let (dir, store) = temp_store();
        let mut state = ProtocolState::empty("ethereum");
        state.last_rss_entry_id = Some("rel-1".to_string());

        store
            .append(&mut state, sample_report("ethereum-1", "rel-1", "v1.0.0"))
            .unwrap();

        let loaded = store.load("ethereum").unwrap();
        assert_eq!(loaded.reports.len(), 1);
        assert_eq!(loaded.last_rss_entry_id.as_deref(), Some("rel-1"));
        assert!(loaded.knows_release("rel-1"));

        let md = std::fs::read_to_string(dir.path().join("reports/ethereum-1.md")).unwrap();
        assert_eq!(md, "# report\n");
    }

    #[test]
    fn state_json_uses_camel_case_field_names() {
        let (dir, store) = temp_store();
        let mut state = ProtocolState::empty("ethereum");
        state.last_head_sha = Some("c".repeat(40));
        store
            .append(&mut state, sample_report("ethereum-1", "rel-1", "v1.0.0"))
            .unwrap();

        let raw =
            std::fs::read_to_string(dir.path().join("data/reviews/ethereum.json")).unwrap();
        assert!(raw.contains("\"lastHeadSha\""));
        assert!(raw.contains("\"rssId\""));
        assert!(raw.contains("\"generatedAt\""));
    }

    #[test]
    fn history_is_trimmed_to_the_newest_thirty() {
        let (_dir, store) = temp_store();
        let mut state = ProtocolState::empty("ethereum");
        for i in 0..35 {
            let id = format!("ethereum-{i}");
            let rss = format!("rel-{i}");
            store
                .append(&mut state, sample_report(&id, &rss, &rss))
                .unwrap();
        }
        assert_eq!(state.reports.len(), MAX_REPORTS_PER_PROTOCOL);
        assert_eq!(state.reports.first().unwrap().id, "ethereum-5");
        assert_eq!(state.reports.last().unwrap().id, "ethereum-34");
    }

    #[test]
    fn recent_reports_dedupe_by_release_identity_newest_first() {
        let mut state = ProtocolState::empty("ethereum");
        state.reports = vec![
            sample_report("ethereum-1", "rel-1", "v1.0.0"),
            sample_report("ethereum-2", "rel-2", "v1.1.0"),
            sample_report("ethereum-3", "rel-2", "v1.1.0"),
        ];
        let recent = recent_reports(&state);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "ethereum-3");
        assert_eq!(recent[1].id, "ethereum-1");
    }

    #[test]
    fn recent_reports_identity_falls_back_to_title() {
        let mut state = ProtocolState::empty("ethereum");
        state.reports = vec![
            sample_report("ethereum-1", "", "v1.0.0"),
            sample_report("ethereum-2", "", "v1.0.0"),
        ];
        let recent = recent_reports(&state);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "ethereum-2");
        assert!(recent[0].rss_id.is_none());
    }

    #[test]
    fn recent_reports_cap_at_five() {
        let mut state = ProtocolState::empty("ethereum");
        for i in 0..8 {
            let id = format!("ethereum-{i}");
            let rss = format!("rel-{i}");
            state.reports.push(sample_report(&id, &rss, &rss));
        }
        let recent = recent_reports(&state);
        assert_eq!(recent.len(), RECENT_REPORTS);
        assert_eq!(recent[0].id, "ethereum-7");
    }
}
