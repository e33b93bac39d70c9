//! Review normalizer: coerces raw model output into the closed report
//! schema, deduplicates, drops boilerplate, grounds evidence against the
//! diff context, and augments with static diff-keyword detectors.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::DiffContext;

lazy_static! {
    static ref NUMBERED_ITEM_RE: Regex = Regex::new(r"\d+\.\s+").expect("numbered item regex");
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"^\d+[.)]\s+").expect("number prefix regex");
    static ref TAG_PREFIX_RE: Regex =
        Regex::new(r"^\[[^\]]{1,32}\]\s*").expect("tag prefix regex");
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("whitespace regex");
    static ref COMMIT_TOKEN_RE: Regex =
        Regex::new(r"\b[0-9a-fA-F]{7,40}\b").expect("commit token regex");
    static ref BACKTICK_PATH_RE: Regex =
        Regex::new(r"`([^`]+/[^`]+)`").expect("backtick path regex");
    static ref NO_RISK_RE: Regex =
        Regex::new(r"no risk|risk-free|low risk|no issues|nothing risky").expect("no-risk regex");
    static ref SAFE_RE: Regex =
        Regex::new(r"safe|approve|pass\b|\bok\b|merge").expect("safe regex");
    static ref CAUTION_RE: Regex =
        Regex::new(r"warn|caution|medium|review recommended|needs review").expect("caution regex");
    static ref RISK_RE: Regex =
        Regex::new(r"risk|critical|block|reject|high|sever").expect("risk regex");
    static ref BOILERPLATE_RES: Vec<Regex> = vec![
        Regex::new(r"(?i)^needs (manual )?(confirmation|verification|review)[.!]?$").unwrap(),
        Regex::new(r"(?i)^verify (manually|against the commit log)[.!]?$").unwrap(),
        Regex::new(r"(?i)^check .* manually against the raw output[.!]?$").unwrap(),
        Regex::new(r"(?i)^verified against the raw commit log section[.!]?$").unwrap(),
    ];
}

/// Minimum length for ungrounded evidence lines to survive.
const EVIDENCE_MIN_LEN: usize = 10;

/// Closed-set overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "safe")]
    Safe,
    #[serde(rename = "caution")]
    Caution,
    #[serde(rename = "risk")]
    Risk,
    #[serde(rename = "manual-review")]
    ManualReview,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Safe => "safe",
            Verdict::Caution => "caution",
            Verdict::Risk => "risk",
            Verdict::ManualReview => "manual-review",
        };
        f.write_str(s)
    }
}

/// Maps arbitrary verdict text onto the closed set. Ordered rules:
/// explicit no-risk phrasing wins, then safe signals, caution signals,
/// risk signals; anything else (including empty input) is manual review.
pub fn normalize_verdict(raw: &str) -> Verdict {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return Verdict::ManualReview;
    }
    if NO_RISK_RE.is_match(&text) {
        return Verdict::Safe;
    }
    if SAFE_RE.is_match(&text) {
        return Verdict::Safe;
    }
    if CAUTION_RE.is_match(&text) {
        return Verdict::Caution;
    }
    if RISK_RE.is_match(&text) {
        return Verdict::Risk;
    }
    Verdict::ManualReview
}

/// Fully normalized review, ready for rendering and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedReview {
    pub overview: String,
    pub critical_risks: Vec<String>,
    pub notable_changes: Vec<String>,
    pub review_notes: Vec<String>,
    pub rpc_api_changes: Vec<String>,
    pub archive_node_impact: Vec<String>,
    pub operator_actions: Vec<String>,
    pub migration_checklist: Vec<String>,
    pub evidence: Vec<String>,
    pub operator_checks: Vec<String>,
    pub verdict: Verdict,
}

/// Coerces a raw review object into the fixed schema.
///
/// `operator_checks` come from [`detect_operator_checks`]; `grounding` is
/// the diff text evidence is checked against (empty ⇒ pass-through).
pub fn normalize_review(
    raw: &Value,
    operator_checks: Vec<String>,
    grounding: &str,
) -> NormalizedReview {
    let field = |name: &str| unique(coerce_list(raw.get(name)));

    let operator_checks = unique(operator_checks);
    let check_keys: Vec<String> = operator_checks.iter().map(|c| normalize_key(c)).collect();
    let notable_changes: Vec<String> = field("notable_changes")
        .into_iter()
        .filter(|item| !check_keys.contains(&normalize_key(item)))
        .collect();

    let overview = raw
        .get("overview")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary available.")
        .to_string();

    let verdict = normalize_verdict(
        raw.get("verdict")
            .map(value_text)
            .unwrap_or_default()
            .as_str(),
    );

    NormalizedReview {
        overview,
        critical_risks: field("critical_risks"),
        notable_changes,
        review_notes: field("review_notes"),
        rpc_api_changes: field("rpc_api_changes"),
        archive_node_impact: field("archive_node_impact"),
        operator_actions: field("operator_actions"),
        migration_checklist: field("migration_checklist"),
        evidence: filter_evidence(field("evidence"), grounding),
        operator_checks,
        verdict,
    }
}

/// Static keyword scan over the diff text. Matches populate
/// `operator_checks`; the normalizer deduplicates them against the
/// model's own `notable_changes`.
pub fn detect_operator_checks(diff: &DiffContext) -> Vec<String> {
    lazy_static! {
        static ref RULES: Vec<(Regex, &'static str)> = vec![
            (
                Regex::new(r"json-rpc|jsonrpc|rpc method|rpc server|rpc endpoint|eth_|debug_|trace_")
                    .unwrap(),
                "Detected change signals around RPC/JSON-RPC interfaces.",
            ),
            (
                Regex::new(r"openapi|swagger|/api/|router|endpoint|rest api|api version|v1/|v2/")
                    .unwrap(),
                "Detected change signals around external API endpoints or versions.",
            ),
            (
                Regex::new(r"archive|prun|indexer|index|state sync|snapshot|history|retention")
                    .unwrap(),
                "Detected change signals around archive-node operations (retention/indexing/sync).",
            ),
            (
                Regex::new(r"config|toml|yaml|yml|genesis|hardfork|fork|protocol config|feature flag")
                    .unwrap(),
                "Detected change signals around node configuration or protocol flags.",
            ),
        ];
    }

    let source = diff.detector_text();
    let mut checks = Vec::new();
    for (re, message) in RULES.iter() {
        if re.is_match(&source) {
            checks.push((*message).to_string());
        }
    }
    checks
}

/// Coerces one semantic field: arrays pass through, scalars are split
/// into list items, single objects are wrapped with best-effort text.
fn coerce_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(v @ Value::Object(_)) => vec![value_text(v)],
        Some(scalar) => list_from_text(&value_text(scalar)),
    }
}

/// Splits scalar text on newlines, then on numbered-prefix boundaries
/// within each line ("1. One 2. Two" → two items).
fn list_from_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts = split_numbered(line);
        if parts.len() <= 1 {
            out.push(line.to_string());
        } else {
            out.extend(parts);
        }
    }
    out
}

/// Splits at each interior `N. ` boundary, keeping the prefix with its
/// item (sanitation strips it later).
fn split_numbered(line: &str) -> Vec<String> {
    let mut starts: Vec<usize> = NUMBERED_ITEM_RE
        .find_iter(line)
        .map(|m| m.start())
        .collect();
    if starts.is_empty() {
        return vec![line.to_string()];
    }
    if starts[0] != 0 {
        starts.insert(0, 0);
    }
    starts.push(line.len());
    starts
        .windows(2)
        .map(|w| line[w[0]..w[1]].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Best-effort text from a scalar or a single object (common key names).
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => {
            const TEXT_KEYS: &[&str] = &[
                "text", "summary", "title", "item", "message", "detail", "reason", "action",
                "note", "evidence", "impact", "value",
            ];
            for key in TEXT_KEYS {
                if let Some(s) = map.get(*key).and_then(Value::as_str) {
                    if !s.trim().is_empty() {
                        return s.trim().to_string();
                    }
                }
            }
            String::new()
        }
        _ => String::new(),
    }
}

/// Strips numbering/tag prefixes and collapses whitespace.
fn sanitize_item(raw: &str) -> String {
    let stripped = NUMBER_PREFIX_RE.replace(raw.trim(), "");
    let stripped = TAG_PREFIX_RE.replace(&stripped, "");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Case/format-insensitive dedup key.
fn normalize_key(item: &str) -> String {
    WHITESPACE_RE
        .replace_all(item.trim(), " ")
        .to_lowercase()
}

fn is_boilerplate(item: &str) -> bool {
    BOILERPLATE_RES.iter().any(|re| re.is_match(item))
}

/// Sanitizes, drops boilerplate, and deduplicates preserving first
/// occurrence order.
fn unique(items: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for raw in items {
        let item = sanitize_item(&raw);
        if item.is_empty() || is_boilerplate(&item) {
            continue;
        }
        let key = normalize_key(&item);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(item);
    }
    out
}

/// Evidence grounding: items carrying a commit-hash-like token or a
/// backtick-quoted path survive only if that literal appears in the diff
/// text; other items survive when plausibly long. An empty grounding
/// source disables filtering.
fn filter_evidence(items: Vec<String>, grounding: &str) -> Vec<String> {
    if grounding.trim().is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            let line = item.trim();
            if line.is_empty() {
                return false;
            }
            if let Some(token) = COMMIT_TOKEN_RE.find(line) {
                return grounding.contains(&token.as_str().to_lowercase());
            }
            if let Some(cap) = BACKTICK_PATH_RE.captures(line) {
                return grounding.contains(&cap[1].to_lowercase());
            }
            line.chars().count() >= EVIDENCE_MIN_LEN
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diff_with(patch: &str) -> DiffContext {
        DiffContext {
            log: String::new(),
            name_status: String::new(),
            diff_stat: String::new(),
            patch: patch.to_string(),
        }
    }

    #[test]
    fn verdict_is_closed_over_arbitrary_input() {
        assert_eq!(normalize_verdict(""), Verdict::ManualReview);
        assert_eq!(normalize_verdict("   "), Verdict::ManualReview);
        assert_eq!(normalize_verdict("completely unrelated"), Verdict::ManualReview);
        assert_eq!(normalize_verdict("SAFE to deploy"), Verdict::Safe);
        assert_eq!(normalize_verdict("caution advised"), Verdict::Caution);
        assert_eq!(normalize_verdict("high risk"), Verdict::Risk);
        // Explicit no-risk phrasing wins before the risk rule sees "risk".
        assert_eq!(normalize_verdict("no risk found"), Verdict::Safe);
        assert_eq!(normalize_verdict("low risk"), Verdict::Safe);
    }

    #[test]
    fn scalar_string_splits_on_numbered_boundaries() {
        // Raw critical_risks as the single string "1. One\n2. Two".
        let raw = json!({"critical_risks": "1. One\n2. Two"});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.critical_risks, vec!["One", "Two"]);

        let raw = json!({"critical_risks": "1. One 2. Two"});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.critical_risks, vec!["One", "Two"]);
    }

    #[test]
    fn single_object_is_wrapped_with_extracted_text() {
        let raw = json!({"notable_changes": {"summary": "New flag added"}});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.notable_changes, vec!["New flag added"]);
    }

    #[test]
    fn dedup_is_case_and_whitespace_insensitive() {
        let raw = json!({"review_notes": ["Same  item", "same item", "SAME ITEM "]});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.review_notes, vec!["Same item"]);
    }

    #[test]
    fn numbering_and_tag_prefixes_are_stripped() {
        let raw = json!({"operator_actions": ["1. restart the node", "[ops check] watch p99"]});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.operator_actions, vec!["restart the node", "watch p99"]);
    }

    #[test]
    fn boilerplate_filler_is_dropped() {
        let raw = json!({"rpc_api_changes": ["Needs verification.", "eth_call gained a new param"]});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.rpc_api_changes, vec!["eth_call gained a new param"]);
    }

    #[test]
    fn evidence_with_commit_token_requires_literal_presence() {
        let grounding = "abc1234 fix retention window\nm\tstore/config.toml";
        let raw = json!({"evidence": [
            "Commit abc1234 changes the retention window",
            "Commit deadbee5 rewrites consensus",
            "`store/config.toml` gained a retention knob",
            "`other/path.rs` was rewritten",
            "short"
        ]});
        let out = normalize_review(&raw, Vec::new(), grounding);
        assert_eq!(
            out.evidence,
            vec![
                "Commit abc1234 changes the retention window",
                "`store/config.toml` gained a retention knob",
            ]
        );
    }

    #[test]
    fn empty_grounding_disables_evidence_filtering() {
        let raw = json!({"evidence": ["Commit deadbee5 rewrites consensus"]});
        let out = normalize_review(&raw, Vec::new(), "");
        assert_eq!(out.evidence.len(), 1);
    }

    #[test]
    fn detectors_stay_silent_without_keywords() {
        // No RPC/archive/config keywords anywhere in the diff.
        let diff = diff_with("+fn render(&self) {}\n-fn draw(&self) {}");
        assert!(detect_operator_checks(&diff).is_empty());

        let raw = json!({"notable_changes": ["renderer rewritten"]});
        let out = normalize_review(&raw, detect_operator_checks(&diff), "");
        assert_eq!(out.notable_changes, vec!["renderer rewritten"]);
        assert!(out.operator_checks.is_empty());
    }

    #[test]
    fn detectors_flag_rpc_and_config_signals() {
        let diff = diff_with("+register eth_getProof\n+update genesis.toml");
        let checks = detect_operator_checks(&diff);
        assert_eq!(checks.len(), 2);
        assert!(checks[0].contains("RPC/JSON-RPC"));
        assert!(checks[1].contains("configuration"));
    }

    #[test]
    fn notable_changes_deduplicate_against_operator_checks() {
        let check = "Detected change signals around RPC/JSON-RPC interfaces.".to_string();
        let raw = json!({"notable_changes": [
            "detected change signals around rpc/json-rpc interfaces.",
            "real change"
        ]});
        let out = normalize_review(&raw, vec![check], "");
        assert_eq!(out.notable_changes, vec!["real change"]);
        assert_eq!(out.operator_checks.len(), 1);
    }

    #[test]
    fn missing_overview_gets_placeholder() {
        let out = normalize_review(&json!({}), Vec::new(), "");
        assert_eq!(out.overview, "No summary available.");
        assert_eq!(out.verdict, Verdict::ManualReview);
    }

    #[test]
    fn degraded_marker_verdict_maps_to_manual_review() {
        assert_eq!(normalize_verdict("llm_call_failed"), Verdict::ManualReview);
        assert_eq!(normalize_verdict("manual_review_required"), Verdict::ManualReview);
    }
}
