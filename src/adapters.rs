//! Per-tool input parsing: hook payloads in, normalized [`Event`]s out.
//!
//! - Claude Code: hook JSON on stdin
//! - Codex: notify JSON as the first trailing argument
//! - OpenCode: explicit `--event` name, no payload

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::events::{Event, EventKind, Source};

/// Phrases in a Claude stop reason that mean the user must decide something.
const DECISION_KEYWORDS: &[&str] = &[
    "need your",
    "waiting for",
    "choose",
    "select",
    "decision",
    "confirm",
    "approve",
];

/// Raw input handed to an adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawInput<'a> {
    pub stdin: Option<&'a str>,
    pub args: &'a [String],
    pub event: Option<&'a str>,
}

/// Parse `input` for `source`. The payload is returned even when the event
/// is ignored, so callers can log it.
pub fn parse(source: Source, input: RawInput<'_>) -> (Option<Event>, Value) {
    match source {
        Source::Claude => parse_claude(input.stdin),
        Source::Codex => parse_codex(input.args),
        Source::OpenCode => (parse_opencode(input.event), empty_payload()),
    }
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

// --- Claude Code ---

#[derive(Deserialize, Default)]
#[serde(default)]
struct HookEvent {
    hook_event_name: Option<String>,
    tool_name: Option<String>,
    reason: Option<String>,
}

impl HookEvent {
    fn string_fields(payload: &Value) -> Self {
        let field = |name: &str| payload.get(name).and_then(Value::as_str).map(String::from);
        Self {
            hook_event_name: field("hook_event_name"),
            tool_name: field("tool_name"),
            reason: field("reason"),
        }
    }
}

fn parse_claude(stdin: Option<&str>) -> (Option<Event>, Value) {
    let Some(data) = stdin.filter(|s| !s.trim().is_empty()) else {
        warn!("No stdin data received from Claude Code");
        return (None, empty_payload());
    };

    let payload: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to parse Claude Code JSON: {e}");
            return (None, empty_payload());
        }
    };
    let hook = match HookEvent::deserialize(&payload) {
        Ok(hook) => hook,
        Err(e) => {
            warn!("Unexpected Claude Code hook fields ({e}), keeping string fields only");
            HookEvent::string_fields(&payload)
        }
    };

    let Some(kind) = claude_event_kind(&hook) else {
        debug!(
            "Ignoring Claude Code event: {}",
            hook.hook_event_name.as_deref().unwrap_or("")
        );
        return (None, payload);
    };

    let event = Event::new(kind, Source::Claude)
        .with_summary(hook.reason)
        .with_context(payload.clone());
    (Some(event), payload)
}

fn claude_event_kind(hook: &HookEvent) -> Option<EventKind> {
    match hook.hook_event_name.as_deref()? {
        "PreToolUse" if hook.tool_name.as_deref() == Some("AskUserQuestion") => {
            Some(EventKind::DecisionRequired)
        }
        "Stop" | "Notification" => {
            let reason = hook.reason.as_deref().unwrap_or_default().to_lowercase();
            if DECISION_KEYWORDS.iter().any(|k| reason.contains(k)) {
                Some(EventKind::DecisionRequired)
            } else {
                Some(EventKind::AgentYield)
            }
        }
        _ => None,
    }
}

// --- Codex ---

fn parse_codex(args: &[String]) -> (Option<Event>, Value) {
    let Some(json) = args.first() else {
        warn!("No argv data received from Codex");
        return (None, empty_payload());
    };

    let payload: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to parse Codex JSON: {e}");
            return (None, empty_payload());
        }
    };

    let kind = match payload.get("type").and_then(Value::as_str) {
        Some("agent-turn-complete") => EventKind::AgentYield,
        other => {
            debug!("Ignoring Codex event: {}", other.unwrap_or(""));
            return (None, payload);
        }
    };

    let summary = payload
        .get("last-assistant-message")
        .and_then(Value::as_str)
        .map(String::from);
    let event = Event::new(kind, Source::Codex)
        .with_summary(summary)
        .with_context(payload.clone());
    (Some(event), payload)
}

// --- OpenCode ---

fn parse_opencode(event: Option<&str>) -> Option<Event> {
    let Some(name) = event else {
        warn!("No explicit event specified for OpenCode");
        return None;
    };
    match name.parse::<EventKind>() {
        Ok(kind) => Some(Event::new(kind, Source::OpenCode)),
        Err(e) => {
            error!("{e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn claude(payload: Value) -> Option<Event> {
        let stdin = payload.to_string();
        parse(
            Source::Claude,
            RawInput {
                stdin: Some(&stdin),
                ..RawInput::default()
            },
        )
        .0
    }

    fn codex(arg: &str) -> Option<Event> {
        let args = vec![arg.to_string()];
        parse(
            Source::Codex,
            RawInput {
                args: &args,
                ..RawInput::default()
            },
        )
        .0
    }

    fn opencode(event: Option<&str>) -> Option<Event> {
        parse(
            Source::OpenCode,
            RawInput {
                event,
                ..RawInput::default()
            },
        )
        .0
    }

    #[test]
    fn claude_stop_is_yield_with_reason_summary() {
        let event = claude(json!({
            "session_id": "abc123",
            "hook_event_name": "Stop",
            "reason": "Task completed successfully",
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::AgentYield);
        assert_eq!(event.source, Source::Claude);
        assert_eq!(event.summary.as_deref(), Some("Task completed successfully"));
        assert_eq!(event.context["session_id"], "abc123");
    }

    #[test]
    fn claude_notification_without_reason_is_yield() {
        let event = claude(json!({"hook_event_name": "Notification"})).unwrap();
        assert_eq!(event.kind, EventKind::AgentYield);
        assert_eq!(event.summary, None);
    }

    #[test]
    fn claude_decision_keywords_upgrade_to_decision() {
        let event = claude(json!({
            "hook_event_name": "Stop",
            "reason": "I need your decision on which approach to take",
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::DecisionRequired);

        let event = claude(json!({
            "hook_event_name": "Notification",
            "reason": "Please CONFIRM the plan",
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::DecisionRequired);
    }

    #[test]
    fn claude_ask_user_question_is_decision_other_tools_ignored() {
        let event = claude(json!({
            "hook_event_name": "PreToolUse",
            "tool_name": "AskUserQuestion",
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::DecisionRequired);
        assert!(claude(json!({"hook_event_name": "PreToolUse", "tool_name": "Bash"})).is_none());
        assert!(claude(json!({"hook_event_name": "SessionStart"})).is_none());
    }

    #[test]
    fn claude_null_fields_are_treated_as_absent() {
        let event = claude(json!({
            "hook_event_name": "Stop",
            "reason": null,
            "tool_name": null,
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::AgentYield);
        assert_eq!(event.summary, None);
    }

    #[test]
    fn claude_mistyped_field_keeps_the_rest_of_the_hook() {
        let event = claude(json!({"hook_event_name": "Stop", "reason": 42})).unwrap();
        assert_eq!(event.kind, EventKind::AgentYield);
        assert_eq!(event.summary, None);
        assert_eq!(event.context["reason"], 42);

        let event = claude(json!({
            "hook_event_name": "PreToolUse",
            "tool_name": "AskUserQuestion",
            "reason": ["not", "text"],
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::DecisionRequired);
    }

    #[test]
    fn claude_bad_input_yields_nothing() {
        let (event, payload) = parse(Source::Claude, RawInput::default());
        assert!(event.is_none());
        assert_eq!(payload, json!({}));

        let (event, _) = parse(
            Source::Claude,
            RawInput {
                stdin: Some("not json"),
                ..RawInput::default()
            },
        );
        assert!(event.is_none());
    }

    #[test]
    fn ignored_claude_event_keeps_payload() {
        let stdin = json!({"hook_event_name": "PostToolUse", "tool_name": "Edit"}).to_string();
        let (event, payload) = parse(
            Source::Claude,
            RawInput {
                stdin: Some(&stdin),
                ..RawInput::default()
            },
        );
        assert!(event.is_none());
        assert_eq!(payload["tool_name"], "Edit");
    }

    #[test]
    fn codex_turn_complete_is_yield() {
        let event = codex(
            &json!({
                "type": "agent-turn-complete",
                "thread-id": "123-456",
                "last-assistant-message": "Done with the task.",
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::AgentYield);
        assert_eq!(event.source, Source::Codex);
        assert_eq!(event.summary.as_deref(), Some("Done with the task."));
    }

    #[test]
    fn codex_bad_or_unknown_input_is_ignored() {
        assert!(parse(Source::Codex, RawInput::default()).0.is_none());
        assert!(codex("not json").is_none());
        assert!(codex(r#"{"type": "unknown-event"}"#).is_none());
    }

    #[test]
    fn opencode_uses_explicit_event() {
        assert_eq!(opencode(Some("AGENT_YIELD")).unwrap().kind, EventKind::AgentYield);
        assert_eq!(opencode(Some("DECISION_REQUIRED")).unwrap().kind, EventKind::DecisionRequired);
        let event = opencode(Some("ERROR_RETRY")).unwrap();
        assert_eq!(event.kind, EventKind::ErrorRetry);
        assert_eq!(event.source, Source::OpenCode);
        assert!(opencode(None).is_none());
        assert!(opencode(Some("UNKNOWN_EVENT")).is_none());
    }
}
