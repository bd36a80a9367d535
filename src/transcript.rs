//! Claude Code JSONL transcript reader.
//!
//! Used when a `Stop` hook carries no `reason`: the spoken summary then comes
//! from the last thing the assistant wrote in the session transcript.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

/// Text of the most recent assistant message with text content.
///
/// Walks the file backwards. Text blocks of one message are joined with a
/// space; tool-use blocks are skipped.
pub fn last_assistant_text(transcript_path: &Path) -> Option<String> {
    let contents = match fs::read_to_string(transcript_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read transcript {}: {e}", transcript_path.display());
            return None;
        }
    };

    let text = contents
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("assistant"))
        .find_map(|entry| message_text(&entry));

    if text.is_none() {
        debug!("No assistant text in {}", transcript_path.display());
    }
    text
}

fn message_text(entry: &Value) -> Option<String> {
    let content = entry.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.trim().to_string()).filter(|t| !t.is_empty());
    }

    let parts: Vec<&str> = content
        .as_array()?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), lines.join("\n")).unwrap();
        file
    }

    #[test]
    fn picks_latest_assistant_text() {
        let file = write_transcript(&[
            concat!(
                r#"{"type":"assistant","message":{"content":["#,
                r#"{"type":"text","text":"First answer."}]}}"#,
            ),
            r#"{"type":"user","message":{"content":"thanks"}}"#,
            concat!(
                r#"{"type":"assistant","message":{"content":["#,
                r#"{"type":"text","text":"Tests pass."},"#,
                r#"{"type":"tool_use","name":"Bash"},"#,
                r#"{"type":"text","text":"Done."}]}}"#,
            ),
            r#"{"type":"user","timestamp":"2026-01-01T00:00:00Z"}"#,
        ]);
        assert_eq!(last_assistant_text(file.path()).as_deref(), Some("Tests pass. Done."));
    }

    #[test]
    fn skips_tool_only_messages_and_garbage_lines() {
        let file = write_transcript(&[
            r#"{"type":"assistant","message":{"content":"Plain string content."}}"#,
            "not json at all",
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Edit"}]}}"#,
        ]);
        assert_eq!(last_assistant_text(file.path()).as_deref(), Some("Plain string content."));
    }

    #[test]
    fn missing_file_or_no_assistant_is_none() {
        assert_eq!(last_assistant_text(Path::new("/nonexistent/transcript.jsonl")), None);
        let file = write_transcript(&[r#"{"type":"user","message":{"content":"hi"}}"#]);
        assert_eq!(last_assistant_text(file.path()), None);
    }
}
