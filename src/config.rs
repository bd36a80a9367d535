//! Configuration management for agent-chime.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to its defaults, so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::events::EventKind;
use crate::tts::engine::EngineKind;
use crate::tts::models;
use crate::tts::provider::FallbackChain;
use crate::tts::selector::SelectionMode;

/// How an event is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    Tts,
    Earcon,
    Silent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub enabled: bool,
    pub mode: NotificationMode,
    pub read_summary: bool,
    pub template: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: NotificationMode::Tts,
            read_summary: false,
            template: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    #[serde(rename = "AGENT_YIELD")]
    pub agent_yield: EventConfig,
    #[serde(rename = "DECISION_REQUIRED")]
    pub decision_required: EventConfig,
    #[serde(rename = "ERROR_RETRY")]
    pub error_retry: EventConfig,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            agent_yield: EventConfig {
                read_summary: true,
                template: "Ready.".into(),
                ..EventConfig::default()
            },
            decision_required: EventConfig {
                template: "I need your input.".into(),
                ..EventConfig::default()
            },
            error_retry: EventConfig {
                mode: NotificationMode::Earcon,
                template: "I hit an error. Please review.".into(),
                ..EventConfig::default()
            },
        }
    }
}

impl EventsConfig {
    pub fn get(&self, kind: EventKind) -> &EventConfig {
        match kind {
            EventKind::AgentYield => &self.agent_yield,
            EventKind::DecisionRequired => &self.decision_required,
            EventKind::ErrorRetry => &self.error_retry,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &EventConfig)> {
        EventKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    /// Model id; `None` means auto-select.
    pub model: Option<String>,
    pub selection_mode: SelectionMode,
    /// Voice override; `None` means the model default.
    pub voice: Option<String>,
    pub engine: EngineKind,
    /// Interpreter used for the mlx-audio engine and the accelerator probe.
    pub python: String,
    /// Base URL of an OpenAI-compatible speech server (http engine).
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub fallback: FallbackChain,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            model: None,
            selection_mode: SelectionMode::Auto,
            voice: None,
            engine: EngineKind::MlxAudio,
            python: "python3".into(),
            endpoint: "http://127.0.0.1:8000".into(),
            request_timeout_secs: 60,
            fallback: FallbackChain::Single,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub volume: f32,
    pub player: String,
    pub earcons_dir: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 0.8,
            player: "afplay".into(),
            earcons_dir: None,
        }
    }
}

impl PlaybackConfig {
    pub fn earcons_dir(&self) -> PathBuf {
        self.earcons_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config/agent-chime/earcons")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub max_size_mb: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_size_mb: 100,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agent-chime")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tts: TTSConfig,
    pub playback: PlaybackConfig,
    pub cache: CacheConfig,
    pub events: EventsConfig,
    /// Append a JSONL record per notification to ~/.agent-chime-history.
    pub history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tts: TTSConfig::default(),
            playback: PlaybackConfig::default(),
            cache: CacheConfig::default(),
            events: EventsConfig::default(),
            history: true,
        }
    }
}

impl Config {
    /// Standard config locations, in search order.
    pub fn candidate_paths() -> Vec<PathBuf> {
        [
            std::env::current_dir().ok().map(|d| d.join("agent-chime.yaml")),
            dirs::home_dir().map(|h| h.join(".config/agent-chime/config.yaml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Path that `config --init` writes to.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config/agent-chime/config.yaml")
    }

    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./agent-chime.yaml
    /// 2. ~/.config/agent-chime/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path
            .map(PathBuf::from)
            .or_else(|| Self::candidate_paths().into_iter().find(|p| p.exists()));

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = self
            .to_yaml()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, yaml)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Return human-readable problems with this configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(0.0..=1.0).contains(&self.playback.volume) {
            issues.push(format!(
                "Volume {} should be between 0 and 1",
                self.playback.volume
            ));
        }

        match (&self.tts.selection_mode, &self.tts.model) {
            (SelectionMode::Manual, None) => {
                issues.push("Manual selection mode requires a model to be specified".into());
            }
            (_, Some(id)) if models::find_by_id(id).is_none() => {
                issues.push(format!("Unknown model '{id}'"));
            }
            _ => {}
        }

        if self.tts.engine == EngineKind::Http && self.tts.endpoint.trim().is_empty() {
            issues.push("The http engine requires an endpoint".into());
        }

        if self.cache.enabled && (self.cache.max_entries == 0 || self.cache.max_size_mb == 0) {
            issues.push("Cache limits must be greater than zero".into());
        }

        if self.playback.player.trim().is_empty() {
            issues.push("Playback player must not be empty".into());
        }

        issues
    }
}
