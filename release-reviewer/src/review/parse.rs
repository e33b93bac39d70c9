//! Pure extraction helpers: turning provider output into a review object.
//!
//! Three layers, each independently testable:
//! 1. [`strip_code_fences`] — remove ```json wrappers.
//! 2. [`parse_review_text`] — strict JSON parse, then
//!    [`repair_truncated_json`] for truncated-but-mostly-valid payloads.
//! 3. [`find_review_object`] — an explicit, ordered list of extraction
//!    strategies over a decoded value (direct object, envelope keys,
//!    array elements), replacing open-ended recursion.

use serde_json::Value;

/// Keys that mark a value as "plausibly a review object".
const REVIEW_MARKER_KEYS: &[&str] = &[
    "overview",
    "notable_changes",
    "critical_risks",
    "review_notes",
    "rpc_api_changes",
];

/// Envelope keys providers commonly wrap payloads in, tried in this order.
const ENVELOPE_KEYS: &[&str] = &[
    "result", "data", "output", "response", "content", "json", "answer",
];

/// How many envelope layers we are willing to unwrap.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Strips a leading ```json / ``` fence and a trailing ``` fence.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = text.trim();
    if let Some(rest) = out
        .strip_prefix("```json")
        .or_else(|| out.strip_prefix("```JSON"))
        .or_else(|| out.strip_prefix("```"))
    {
        out = rest.trim_start();
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest.trim_end();
    }
    out.to_string()
}

/// Parses model text into a review object, tolerating fences and
/// truncated tails. Returns `None` when no review object is recoverable.
pub fn parse_review_text(text: &str) -> Option<Value> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        if let Some(review) = find_review_object(&value) {
            return Some(review);
        }
    }

    repair_truncated_json(&cleaned).and_then(|v| find_review_object(&v))
}

/// Recovers an object from truncated-but-mostly-valid JSON by shrinking
/// the candidate substring from its last closing brace backward, one
/// character at a time, until a parse succeeds.
///
/// Note: this can accept a structurally valid yet semantically truncated
/// object (e.g. a list missing its trailing items) without detecting the
/// loss.
pub fn repair_truncated_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    for i in (start + 1..=end).rev() {
        if !text.is_char_boundary(i + 1) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..=i]) {
            return Some(value);
        }
    }
    None
}

/// Ordered extraction strategies over a decoded value:
/// 1. the value itself is an object carrying review keys;
/// 2. unwrap one known envelope key (fixed order) and retry, up to a
///    fixed depth;
/// 3. for arrays, scan elements with strategies 1–2.
pub fn find_review_object(value: &Value) -> Option<Value> {
    find_at_depth(value, 0)
}

fn find_at_depth(value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_UNWRAP_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => {
            if REVIEW_MARKER_KEYS.iter().any(|k| map.contains_key(*k)) {
                return Some(value.clone());
            }
            for key in ENVELOPE_KEYS {
                if let Some(inner) = map.get(*key) {
                    if let Some(found) = find_at_depth(inner, depth + 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_at_depth(item, depth + 1)),
        Value::String(s) => {
            // Envelopes occasionally carry the payload as an embedded
            // JSON string.
            if depth == 0 {
                return None;
            }
            serde_json::from_str::<Value>(s)
                .ok()
                .and_then(|v| find_at_depth(&v, depth + 1))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn strict_parse_finds_direct_object() {
        let v = parse_review_text(r#"{"overview":"ok","verdict":"safe"}"#).unwrap();
        assert_eq!(v["overview"], "ok");
    }

    #[test]
    fn truncated_tail_is_repaired() {
        // A valid prefix ends after "b"; the tail was cut mid-list but a
        // closing brace survived.
        let text = r#"{"overview":"b"} {"unclosed": [1, 2"#;
        let v = repair_truncated_json(text).unwrap();
        assert_eq!(v["overview"], "b");
    }

    #[test]
    fn repair_gives_up_below_opening_brace() {
        assert!(repair_truncated_json("no braces here").is_none());
        assert!(repair_truncated_json("} {").is_none());
    }

    #[test]
    fn envelope_keys_are_unwrapped_in_order() {
        let v = json!({"result": {"data": {"overview": "x"}}});
        assert_eq!(find_review_object(&v).unwrap()["overview"], "x");

        let v = json!({"choices": [{"overview": "y"}]});
        // "choices" is not an envelope key; arrays are only scanned when
        // the value itself is an array.
        assert!(find_review_object(&v).is_none());

        let v = json!([{"noise": 1}, {"notable_changes": []}]);
        assert!(find_review_object(&v).is_some());
    }

    #[test]
    fn embedded_json_string_inside_envelope_is_decoded() {
        let v = json!({"output": "{\"overview\":\"inner\"}"});
        assert_eq!(find_review_object(&v).unwrap()["overview"], "inner");
    }

    #[test]
    fn non_review_values_yield_none() {
        assert!(find_review_object(&json!({"a": 1})).is_none());
        assert!(find_review_object(&json!("text")).is_none());
        assert!(parse_review_text("").is_none());
        assert!(parse_review_text("not json at all").is_none());
    }
}
