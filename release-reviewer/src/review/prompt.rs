//! Prompt builders for structured release reviews.

use crate::diff::DiffContext;

/// Exact key list the model must emit. Shared by the main and repair
/// prompts so the two never drift apart.
pub const REVIEW_KEYS: &str = "overview, critical_risks, notable_changes, review_notes, verdict, \
     rpc_api_changes, archive_node_impact, operator_actions, migration_checklist, evidence";

/// Everything the orchestrator needs to phrase one review request.
/// Owned so the whole call can move into the serialized queue.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub protocol: String,
    pub repo_url: String,
    pub rss_title: String,
    pub base_sha: String,
    pub head_sha: String,
    pub diff: DiffContext,
}

pub fn system_prompt() -> String {
    [
        "You are a release reviewer working from the perspective of a blockchain node operator.",
        "Return exactly one JSON object and nothing else.",
        &format!("Use exactly these keys: {REVIEW_KEYS}."),
        "The verdict value must be exactly one of: safe, caution, risk, manual-review. No sentences.",
        "critical_risks, notable_changes, review_notes, rpc_api_changes, archive_node_impact, \
         operator_actions, migration_checklist and evidence must be arrays of plain strings.",
        "Write from an operator's point of view; prefer evidence over assertion.",
        "Report RPC/API/JSON-RPC interface changes, archive-node operational impact, and \
         compatibility/migration risk first.",
        "Evidence must cite actual commit data (commit log, changed files, diff stats).",
    ]
    .join(" ")
}

pub fn user_prompt(input: &ReviewInput) -> String {
    let or_none = |s: &str| {
        if s.trim().is_empty() {
            "(none)".to_string()
        } else {
            s.to_string()
        }
    };

    [
        format!("Protocol: {}", input.protocol),
        format!("Repository: {}", input.repo_url),
        format!("RSS title: {}", input.rss_title),
        format!("Base SHA: {}", input.base_sha),
        format!("Head SHA: {}", input.head_sha),
        "Commit log:".to_string(),
        or_none(&input.diff.log),
        "Changed files:".to_string(),
        or_none(&input.diff.name_status),
        "Diff stat:".to_string(),
        or_none(&input.diff.diff_stat),
        "Patch excerpt:".to_string(),
        or_none(&input.diff.patch),
        "Review rules:".to_string(),
        [
            "- Focus on operations, not exhaustive technical detail",
            "- Always call out possible RPC/API/JSON-RPC interface changes separately",
            "- Always check archive-node impact (retention/indexing/storage/resync)",
            "- Include operator action items (config changes, rollback points, metrics to watch)",
            "- rpc_api_changes: only RPC/API/JSON-RPC changes, as an array",
            "- archive_node_impact: only archive-node impact, as an array",
            "- operator_actions: immediately actionable items, as an array",
            "- migration_checklist: pre-deploy checklist items, as an array",
            "- evidence: commit log / file / stat citations, as an array",
            "- Array items are plain strings without numbering prefixes (no \"1.\")",
            "- Evidence must be verifiable in the commit log/files/stats above; never guess",
            "- Leave an item empty rather than inventing content without evidence",
        ]
        .join("\n"),
    ]
    .join("\n\n")
}

/// Prompt for the single repair pass: reformat raw model text into the
/// exact schema.
pub fn repair_system_prompt() -> String {
    format!("Convert the following text into one strict JSON object. Keys: {REVIEW_KEYS}.")
}

pub fn repair_user_prompt(raw: &str) -> String {
    const RAW_CAP: usize = 16000;
    let clipped: String = raw.trim().chars().take(RAW_CAP).collect();
    format!("Text:\n{clipped}")
}
