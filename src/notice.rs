//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `NoticeKind`, `notice_json`, `truncation_notice`, `unredacted_notice`.
//! Role: Shared contract helper for CLI diagnostics (truncated listings, unredacted output).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: Envelope is `{"notice": {...}}`; fields are additive-only.
use serde::Serialize;
use serde_json::{Map, Value, json};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// A listing stopped at its limit with more entries remaining.
    Truncated,
    /// Sensitive content was shown because the caller opted in.
    Unredacted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub time: String,
    pub cmd: String,
    /// Snapshot the command read from.
    pub store: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    json!({ "notice": notice })
}

pub fn truncation_notice(time: String, cmd: &str, store: &str, path: &str, limit: usize) -> Notice {
    let mut details = Map::new();
    details.insert("path".to_string(), json!(path));
    details.insert("limit".to_string(), json!(limit));
    Notice {
        kind: NoticeKind::Truncated,
        time,
        cmd: cmd.to_string(),
        store: store.to_string(),
        message: format!("output truncated at {limit} entries; more exist under {path}"),
        details,
    }
}

pub fn unredacted_notice(time: String, cmd: &str, store: &str, global: &str) -> Notice {
    let mut details = Map::new();
    details.insert("global".to_string(), json!(global));
    Notice {
        kind: NoticeKind::Unredacted,
        time,
        cmd: cmd.to_string(),
        store: store.to_string(),
        message: format!("showing unredacted content from sensitive global {global}"),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::{notice_json, truncation_notice, unredacted_notice};
    use serde_json::json;

    #[test]
    fn truncation_envelope_is_stable() {
        let notice = truncation_notice(
            "2026-10-17T00:00:00Z".to_string(),
            "files",
            "/tmp/store.json",
            "^DIC",
            50,
        );
        assert_eq!(
            notice_json(&notice),
            json!({
                "notice": {
                    "kind": "truncated",
                    "time": "2026-10-17T00:00:00Z",
                    "cmd": "files",
                    "store": "/tmp/store.json",
                    "message": "output truncated at 50 entries; more exist under ^DIC",
                    "details": { "path": "^DIC", "limit": 50 },
                }
            })
        );
    }

    #[test]
    fn unredacted_notice_names_the_global() {
        let value = notice_json(&unredacted_notice("t".to_string(), "explore", "s", "^DPT"));
        assert_eq!(value["notice"]["kind"], "unredacted");
        assert_eq!(value["notice"]["details"]["global"], "^DPT");
        assert!(value["notice"]["message"].as_str().unwrap_or("").contains("^DPT"));
    }
}
