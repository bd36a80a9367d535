//! Decides what, if anything, is spoken for an event.

use std::path::Path;

use serde_json::Value;

use crate::config::{EventConfig, NotificationMode};
use crate::events::{Event, EventKind, Source};
use crate::transcript;

/// Longest summary spoken before truncation, in characters.
pub const MAX_SUMMARY_LENGTH: usize = 200;

pub const TRUNCATION_SUFFIX: &str = " Check the screen for details.";

/// Fallback phrase when an event has no template.
pub fn default_template(kind: EventKind) -> &'static str {
    match kind {
        EventKind::AgentYield => "Ready.",
        EventKind::DecisionRequired => "I need your input.",
        EventKind::ErrorRetry => "I hit an error. Please review.",
    }
}

/// Text to speak for `event`, or `None` when the event is not spoken.
pub fn text_for_event(event: &Event, config: &EventConfig, payload: &Value) -> Option<String> {
    if !config.enabled || config.mode != NotificationMode::Tts {
        return None;
    }

    if config.read_summary {
        if let Some(summary) = extract_summary(event, payload) {
            return Some(limit_length(&summary, MAX_SUMMARY_LENGTH));
        }
    }

    let template = config.template.trim();
    if template.is_empty() {
        Some(default_template(event.kind).to_string())
    } else {
        Some(template.to_string())
    }
}

/// Summary carried by the event, else pulled from the source payload.
pub fn extract_summary(event: &Event, payload: &Value) -> Option<String> {
    if let Some(summary) = non_blank(event.summary.as_deref()) {
        return Some(summary);
    }

    match event.source {
        Source::Claude => non_blank(payload.get("reason").and_then(Value::as_str)).or_else(|| {
            payload
                .get("transcript_path")
                .and_then(Value::as_str)
                .and_then(|path| transcript::last_assistant_text(Path::new(path)))
        }),
        Source::Codex => non_blank(payload.get("last-assistant-message").and_then(Value::as_str)),
        Source::OpenCode => non_blank(payload.get("summary").and_then(Value::as_str)),
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Cap `text` at `max_chars`, preferring a word boundary past the halfway mark.
pub fn limit_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let head: Vec<char> = text.chars().take(max_chars).collect();
    let cut = match head.iter().rposition(|c| c.is_whitespace()) {
        Some(i) if i > max_chars / 2 => i,
        _ => max_chars,
    };

    let mut limited: String = head[..cut].iter().collect();
    limited.truncate(limited.trim_end().len());
    limited.push_str(TRUNCATION_SUFFIX);
    limited
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        let at_boundary = bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace);
        if matches!(b, b'.' | b'!' | b'?') && at_boundary {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = i + 1;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::EventsConfig;

    fn yield_event(source: Source) -> Event {
        Event::new(EventKind::AgentYield, source)
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("Tests pass. Ready to merge?  Yes!\nv1.2 ships"),
            vec!["Tests pass.", "Ready to merge?", "Yes!", "v1.2 ships"]
        );
        assert_eq!(split_sentences("Done."), vec!["Done."]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(limit_length("All tests pass.", MAX_SUMMARY_LENGTH), "All tests pass.");
        let exact = "a".repeat(MAX_SUMMARY_LENGTH);
        assert_eq!(limit_length(&exact, MAX_SUMMARY_LENGTH), exact);
    }

    #[test]
    fn long_text_cuts_at_word_boundary() {
        let text = "word ".repeat(60);
        let limited = limit_length(&text, MAX_SUMMARY_LENGTH);
        assert!(limited.ends_with(TRUNCATION_SUFFIX));
        let body = limited.strip_suffix(TRUNCATION_SUFFIX).unwrap();
        assert!(body.chars().count() <= MAX_SUMMARY_LENGTH);
        assert!(body.ends_with("word"));
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let text = "x".repeat(300);
        let limited = limit_length(&text, MAX_SUMMARY_LENGTH);
        assert_eq!(limited, format!("{}{TRUNCATION_SUFFIX}", "x".repeat(MAX_SUMMARY_LENGTH)));
    }

    #[test]
    fn early_whitespace_does_not_shorten_cut() {
        let text = format!("ab {}", "y".repeat(300));
        let limited = limit_length(&text, MAX_SUMMARY_LENGTH);
        assert_eq!(limited.chars().count(), MAX_SUMMARY_LENGTH + TRUNCATION_SUFFIX.chars().count());
    }

    #[test]
    fn multibyte_text_is_cut_on_characters() {
        let text = "é".repeat(250);
        let limited = limit_length(&text, MAX_SUMMARY_LENGTH);
        assert!(limited.starts_with(&"é".repeat(MAX_SUMMARY_LENGTH)));
        assert!(limited.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn disabled_silent_and_earcon_events_are_not_spoken() {
        let events = EventsConfig::default();
        let payload = json!({});
        let error = Event::new(EventKind::ErrorRetry, Source::Claude);
        assert_eq!(text_for_event(&error, &events.error_retry, &payload), None);

        let mut config = events.agent_yield.clone();
        config.mode = NotificationMode::Silent;
        assert_eq!(text_for_event(&yield_event(Source::Claude), &config, &payload), None);

        let mut config = events.agent_yield;
        config.enabled = false;
        assert_eq!(text_for_event(&yield_event(Source::Claude), &config, &payload), None);
    }

    #[test]
    fn summary_wins_over_template() {
        let config = EventsConfig::default().agent_yield;
        let payload = json!({"reason": "Refactor finished."});
        assert_eq!(
            text_for_event(&yield_event(Source::Claude), &config, &payload).as_deref(),
            Some("Refactor finished.")
        );
        assert_eq!(
            text_for_event(&yield_event(Source::Claude), &config, &json!({})).as_deref(),
            Some("Ready.")
        );
    }

    #[test]
    fn empty_template_uses_builtin_default() {
        let config = EventConfig {
            template: "  ".into(),
            ..EventsConfig::default().decision_required
        };
        let event = Event::new(EventKind::DecisionRequired, Source::OpenCode);
        assert_eq!(
            text_for_event(&event, &config, &json!({})).as_deref(),
            Some("I need your input.")
        );
    }

    #[test]
    fn summary_sources_per_tool() {
        let codex = json!({"last-assistant-message": "Patched the parser."});
        assert_eq!(
            extract_summary(&yield_event(Source::Codex), &codex).as_deref(),
            Some("Patched the parser.")
        );
        let opencode = json!({"summary": "Build green."});
        assert_eq!(
            extract_summary(&yield_event(Source::OpenCode), &opencode).as_deref(),
            Some("Build green.")
        );
        let event = yield_event(Source::Codex).with_summary(Some("From event.".into()));
        assert_eq!(extract_summary(&event, &codex).as_deref(), Some("From event."));
    }

    #[test]
    fn claude_summary_falls_back_to_transcript() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            concat!(
                r#"{"type":"assistant","message":{"content":["#,
                r#"{"type":"text","text":"Migration applied."}]}}"#,
            ),
        )
        .unwrap();
        let payload = json!({"reason": "", "transcript_path": file.path()});
        assert_eq!(
            extract_summary(&yield_event(Source::Claude), &payload).as_deref(),
            Some("Migration applied.")
        );
    }
}
