//! Normalized notification events shared by every adapter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of agent lifecycle events that trigger a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AgentYield,
    DecisionRequired,
    ErrorRetry,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::AgentYield, Self::DecisionRequired, Self::ErrorRetry];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentYield => "AGENT_YIELD",
            Self::DecisionRequired => "DECISION_REQUIRED",
            Self::ErrorRetry => "ERROR_RETRY",
        }
    }

    pub fn default_priority(self) -> Priority {
        match self {
            Self::AgentYield => Priority::Normal,
            Self::DecisionRequired | Self::ErrorRetry => Priority::High,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// CLI tool that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Claude,
    Codex,
    #[value(name = "opencode")]
    OpenCode,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::OpenCode => "opencode",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub summary: Option<String>,
    pub context: serde_json::Value,
    pub priority: Priority,
}

impl Event {
    pub fn new(kind: EventKind, source: Source) -> Self {
        Self {
            kind,
            source,
            timestamp: Utc::now(),
            summary: None,
            context: serde_json::Value::Object(serde_json::Map::new()),
            priority: kind.default_priority(),
        }
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}
