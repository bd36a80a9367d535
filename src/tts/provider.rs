//! Synthesis provider: model resolution, lazy engine binding and the
//! fallback chain.
//!
//! Fallback order: selected model → lower tier(s) → earcon (handled by caller).

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::engine::{self, EngineError, SpeechEngine, SynthesisRequest};
use super::models::{ModelSpec, ModelTier, FALLBACK_TIER};
use super::selector::{self, ModelSelector, SelectionMode, SelectionResult};
use crate::config::TTSConfig;

/// Sample rate of the synthesized audio.
pub const SAMPLE_RATE: u32 = 16_000;

/// Which models are retried after the selected one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackChain {
    /// Retry once with the fallback tier.
    #[default]
    Single,
    /// Walk every lower tier that fits, ending at the fallback tier.
    Tiers,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech engine unavailable")]
    EngineUnavailable(#[source] EngineError),

    #[error("synthesis with {model} failed")]
    Failed {
        model: String,
        #[source]
        source: EngineError,
    },

    #[error("fallback synthesis failed ({model}: {last_error})")]
    Exhausted {
        model: String,
        last_error: String,
        /// The failure of the originally selected model.
        #[source]
        source: Box<SynthesisError>,
    },
}

pub struct SynthesisProvider {
    config: TTSConfig,
    requested_model: Option<String>,
    mode: SelectionMode,
    voice: Option<String>,
    selector: ModelSelector,
    engine: Option<Box<dyn SpeechEngine>>,
    selection: Option<SelectionResult>,
    current: Option<(ModelTier, &'static ModelSpec)>,
}

impl SynthesisProvider {
    pub fn new(config: TTSConfig, selector: ModelSelector) -> Self {
        Self {
            requested_model: config.model.clone(),
            mode: config.selection_mode,
            voice: config.voice.clone(),
            config,
            selector,
            engine: None,
            selection: None,
            current: None,
        }
    }

    /// Request a specific model (e.g. from `--model`); implies manual selection.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.requested_model = model;
            self.mode = SelectionMode::Manual;
        }
        self
    }

    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        if voice.is_some() {
            self.voice = voice;
        }
        self
    }

    /// Bind an engine up front instead of connecting on first use.
    #[cfg(test)]
    pub fn with_engine(mut self, engine: Box<dyn SpeechEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Model currently in use, if one has been resolved.
    pub fn current_model(&self) -> Option<&'static ModelSpec> {
        self.current.map(|(_, spec)| spec)
    }

    pub fn selection(&self) -> Option<&SelectionResult> {
        self.selection.as_ref()
    }

    /// Resolve the model once; later calls reuse it.
    pub fn resolve_model(&mut self) -> &'static ModelSpec {
        if let Some((_, spec)) = self.current {
            return spec;
        }
        let result = self.selector.select(self.requested_model.as_deref(), self.mode);
        info!("{result}");
        let spec = result.model;
        self.current = Some((result.tier, spec));
        self.selection = Some(result);
        spec
    }

    /// Voice override, else the model default.
    pub fn effective_voice(&mut self) -> Option<String> {
        if let Some(voice) = &self.voice {
            return Some(voice.clone());
        }
        self.resolve_model().default_voice().map(String::from)
    }

    /// Synthesize `text` to WAV bytes, falling back to lower tiers on failure.
    pub fn synthesize(&mut self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let spec = self.resolve_model();
        let voice = self.effective_voice();
        self.ensure_engine()?;

        debug!("Synthesizing: '{text}' with model '{}'", spec.model_id);
        let first_error = match self.generate(text, spec, voice.as_deref()) {
            Ok(audio) => return Ok(audio),
            Err(e) => e,
        };
        error!("Synthesis failed with {}: {first_error}", spec.model_id);

        let original = SynthesisError::Failed {
            model: spec.model_id.to_string(),
            source: first_error,
        };

        let mut last = None;
        for tier in self.fallback_tiers() {
            let fallback = tier.spec();
            info!("Falling back to {}", fallback.model_id);
            self.current = Some((tier, fallback));
            match self.generate(text, fallback, fallback.default_voice()) {
                Ok(audio) => return Ok(audio),
                Err(e) => {
                    warn!("Fallback {} failed: {e}", fallback.model_id);
                    last = Some((fallback.model_id, e));
                }
            }
        }

        let Some((model, last_error)) = last else {
            return Err(original);
        };
        Err(SynthesisError::Exhausted {
            model: model.to_string(),
            last_error: last_error.to_string(),
            source: Box::new(original),
        })
    }

    fn ensure_engine(&mut self) -> Result<(), SynthesisError> {
        if self.engine.is_none() {
            let engine = engine::connect(&self.config).map_err(SynthesisError::EngineUnavailable)?;
            info!("Bound speech engine: {}", engine.name());
            self.engine = Some(engine);
        }
        Ok(())
    }

    fn fallback_tiers(&self) -> Vec<ModelTier> {
        let Some((tier, _)) = self.current else {
            return Vec::new();
        };
        match self.config.fallback {
            FallbackChain::Single if tier.is_fallback() => Vec::new(),
            FallbackChain::Single => vec![FALLBACK_TIER],
            FallbackChain::Tiers => tier
                .lower_tiers()
                .filter(|t| {
                    t.is_fallback()
                        || self.selection.as_ref().map_or(true, |s| {
                            let usable = selector::usable_memory(&s.system_info);
                            selector::can_run(t.spec(), &s.system_info, usable)
                        })
                })
                .collect(),
        }
    }

    fn generate(
        &self,
        text: &str,
        spec: &ModelSpec,
        voice: Option<&str>,
    ) -> Result<Vec<u8>, EngineError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("no engine bound".into()))?;

        // Removed on drop, on both success and error paths.
        let scratch = tempfile::Builder::new().prefix("agent-chime-tts-").tempdir()?;

        let audio = engine.synthesize(&SynthesisRequest {
            text,
            model_id: spec.model_id,
            voice,
            lang_code: spec.lang_code,
            instruct: spec.instruct(),
            scratch_dir: scratch.path(),
        })?;

        let reader = hound::WavReader::new(Cursor::new(&audio))
            .map_err(|e| EngineError::InvalidAudio(e.to_string()))?;
        let wav = reader.spec();
        if wav.sample_rate != SAMPLE_RATE {
            debug!("Engine returned {} Hz audio (expected {SAMPLE_RATE} Hz)", wav.sample_rate);
        }
        debug!(
            "Synthesized {} bytes ({:.1}s)",
            audio.len(),
            reader.duration() as f64 / wav.sample_rate.max(1) as f64
        );
        Ok(audio)
    }
}
