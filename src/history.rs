//! Delivery history.
//!
//! Appends one JSON line per handled event to
//! ~/.agent-chime-history/YYYY-MM-DD.jsonl. Best-effort: failures are logged
//! and never affect the notification itself.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::events::{Event, Priority};
use crate::notify::{Delivery, DeliveryError};

/// Directory for history JSONL files.
pub fn history_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-chime-history")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub timestamp: String,
    pub source: String,
    pub event: String,
    pub priority: Priority,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    pub duration_ms: u64,
}

impl DeliveryRecord {
    pub fn new(
        event: &Event,
        outcome: &Result<Delivery, DeliveryError>,
        elapsed: Duration,
    ) -> Self {
        let mut record = Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            source: event.source.to_string(),
            event: event.kind.to_string(),
            priority: event.priority,
            action: String::new(),
            detail: None,
            text: None,
            text_chars: None,
            model: None,
            cached: None,
            duration_ms: elapsed.as_millis() as u64,
        };

        match outcome {
            Ok(Delivery::Skipped { reason }) => {
                record.action = "skipped".into();
                record.detail = Some(reason.to_string());
            }
            Ok(Delivery::Earcon { played }) => {
                record.action = "earcon".into();
                record.detail = (!played).then(|| "earcon file missing".to_string());
            }
            Ok(Delivery::Spoke { text, model, cached }) => {
                record.action = "spoke".into();
                record.text_chars = Some(text.chars().count());
                record.text = Some(text.clone());
                record.model = Some(model.clone());
                record.cached = Some(*cached);
            }
            Ok(Delivery::EarconFallback { earcon }) => {
                record.action = "earcon_fallback".into();
                record.detail = Some(earcon.clone());
            }
            Err(e) => {
                record.action = "error".into();
                record.detail = Some(e.to_string());
            }
        }
        record
    }
}

/// Append `record` to today's file in [`history_dir`].
pub fn save_record(record: &DeliveryRecord) {
    append_record(&history_dir(), record);
}

fn append_record(dir: &Path, record: &DeliveryRecord) {
    if let Err(e) = fs::create_dir_all(dir) {
        error!("Failed to create history dir: {e}");
        return;
    }

    // Date from timestamp (first 10 chars: YYYY-MM-DD)
    let date = record.timestamp.get(..10).unwrap_or("unknown");
    let path = dir.join(format!("{date}.jsonl"));

    let json = match serde_json::to_string(record) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize history record: {e}");
            return;
        }
    };

    match fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{json}") {
                error!("Failed to write history record: {e}");
            } else {
                debug!("Saved delivery record to {}", path.display());
            }
        }
        Err(e) => error!("Failed to open history file: {e}"),
    }
}
