//! Speech engine boundary: turns (text, model, voice, language) into WAV bytes.
//!
//! - `mlx_audio`: runs the mlx-audio generator as a subprocess
//! - `http`: POSTs to an OpenAI-compatible `/v1/audio/speech` endpoint

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::TTSConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    MlxAudio,
    Http,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("engine I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("engine produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine returned invalid audio: {0}")]
    InvalidAudio(String),
}

/// Parameters for one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
    pub voice: Option<&'a str>,
    pub lang_code: &'a str,
    pub instruct: Option<&'a str>,
    /// Directory the engine may write intermediate files into.
    pub scratch_dir: &'a Path,
}

pub trait SpeechEngine: Send {
    fn name(&self) -> &'static str;

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, EngineError>;
}

/// Build the configured engine.
pub fn connect(config: &TTSConfig) -> Result<Box<dyn SpeechEngine>, EngineError> {
    match config.engine {
        EngineKind::MlxAudio => Ok(Box::new(MlxAudioEngine::new(&config.python))),
        EngineKind::Http => Ok(Box::new(HttpEngine::new(
            &config.endpoint,
            Duration::from_secs(config.request_timeout_secs),
        )?)),
    }
}

pub struct MlxAudioEngine {
    python: String,
}

impl MlxAudioEngine {
    pub fn new(python: &str) -> Self {
        Self {
            python: python.to_string(),
        }
    }
}

impl SpeechEngine for MlxAudioEngine {
    fn name(&self) -> &'static str {
        "mlx_audio"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, EngineError> {
        let prefix = request.scratch_dir.join("speech");

        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "mlx_audio.tts.generate"])
            .arg("--model")
            .arg(request.model_id)
            .arg("--text")
            .arg(request.text)
            .arg("--file_prefix")
            .arg(&prefix)
            .arg("--lang_code")
            .arg(request.lang_code)
            .args(["--audio_format", "wav"]);
        if let Some(voice) = request.voice {
            cmd.arg("--voice").arg(voice);
        }
        if let Some(instruct) = request.instruct {
            cmd.arg("--instruct").arg(instruct);
        }
        cmd.stdin(Stdio::null());

        debug!(command = ?cmd, "Running mlx-audio");
        let output = cmd.output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                EngineError::Unavailable(format!("{} not found", self.python))
            }
            _ => EngineError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No module named") {
                return Err(EngineError::Unavailable("mlx-audio not installed".into()));
            }
            return Err(EngineError::Failed {
                status: output.status.to_string(),
                stderr: stderr.lines().last().unwrap_or("").trim().to_string(),
            });
        }

        read_generated(&prefix)
    }
}

/// mlx-audio appends a segment index to the prefix; accept either form.
fn read_generated(prefix: &Path) -> Result<Vec<u8>, EngineError> {
    let segmented = with_suffix(prefix, "_000.wav");
    let plain = with_suffix(prefix, ".wav");
    let path = if segmented.exists() {
        segmented
    } else if plain.exists() {
        plain
    } else {
        return Err(EngineError::MissingOutput(segmented));
    };
    Ok(fs::read(path)?)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub struct HttpEngine {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_millis(500))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: format!("{}/v1/audio/speech", endpoint.trim_end_matches('/')),
            client,
        })
    }
}

impl SpeechEngine for HttpEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, EngineError> {
        let mut body = json!({
            "model": request.model_id,
            "input": request.text,
            "response_format": "wav",
            "lang_code": request.lang_code,
        });
        if let Some(voice) = request.voice {
            body["voice"] = json!(voice);
        }
        if let Some(instruct) = request.instruct {
            body["instruct"] = json!(instruct);
        }

        debug!("POST {} model={}", self.url, request.model_id);
        let resp = self.client.post(&self.url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                EngineError::Unavailable(format!("cannot connect to {}", self.url))
            } else {
                EngineError::Http(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(EngineError::Failed {
                status: status.to_string(),
                stderr: text.chars().take(200).collect(),
            });
        }
        Ok(resp.bytes()?.to_vec())
    }
}
