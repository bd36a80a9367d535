//! Delivery pipeline: event → text → cache/synthesis → playback.
//!
//! One [`Orchestrator`] is built per process and owns the renderer, the
//! provider and the cache. Synthesis failures degrade to earcons; playback
//! failures are returned to the caller.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::cache::AudioCache;
use crate::audio::earcons::Earcon;
use crate::audio::renderer::{AudioRenderer, PlaybackError, StreamBuffer};
use crate::config::{Config, NotificationMode};
use crate::events::{Event, EventKind};
use crate::system::SystemDetector;
use crate::tts::broker;
use crate::tts::provider::{SynthesisError, SynthesisProvider};
use crate::tts::selector::ModelSelector;

/// Voice component of the cache key when the model takes no voice.
const DEFAULT_VOICE_KEY: &str = "default";

/// What happened for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Delivery {
    Skipped { reason: &'static str },
    Earcon { played: bool },
    Spoke { text: String, model: String, cached: bool },
    /// Synthesis failed and an earcon was played instead.
    EarconFallback { earcon: String },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Audio spoken by [`Orchestrator::speak`].
#[derive(Debug, Clone, PartialEq)]
pub struct Spoken {
    pub model: &'static str,
    pub cached: bool,
}

pub struct Orchestrator {
    config: Config,
    cache: Option<AudioCache>,
    renderer: AudioRenderer,
    provider: SynthesisProvider,
}

impl Orchestrator {
    /// Build the pipeline from configuration. `model` and `voice` override
    /// the configured ones.
    pub fn new(config: Config, model: Option<String>, voice: Option<String>) -> Self {
        let selector = ModelSelector::new(Arc::new(SystemDetector::new(config.tts.python.clone())));
        let provider = SynthesisProvider::new(config.tts.clone(), selector)
            .with_model(model)
            .with_voice(voice);
        let cache = config.cache.enabled.then(|| AudioCache::from_config(&config.cache));
        let renderer = AudioRenderer::from_config(&config.playback);
        Self::from_parts(config, cache, renderer, provider)
    }

    pub fn from_parts(
        config: Config,
        cache: Option<AudioCache>,
        renderer: AudioRenderer,
        provider: SynthesisProvider,
    ) -> Self {
        Self {
            config,
            cache,
            renderer,
            provider,
        }
    }

    pub fn renderer(&self) -> &AudioRenderer {
        &self.renderer
    }

    pub fn provider_mut(&mut self) -> &mut SynthesisProvider {
        &mut self.provider
    }

    /// Deliver one event according to its configuration.
    pub fn deliver(&mut self, event: &Event, payload: &Value) -> Result<Delivery, DeliveryError> {
        let config = self.config.events.get(event.kind).clone();
        if !config.enabled {
            debug!("{} is disabled", event.kind);
            return Ok(Delivery::Skipped { reason: "disabled" });
        }

        match config.mode {
            NotificationMode::Silent => Ok(Delivery::Skipped { reason: "silent" }),
            NotificationMode::Earcon => {
                let played = match self.renderer.play_earcon(event.kind, true) {
                    Ok(played) => played,
                    Err(e) => {
                        warn!("Earcon playback failed: {e}");
                        false
                    }
                };
                Ok(Delivery::Earcon { played })
            }
            NotificationMode::Tts => {
                let Some(text) = broker::text_for_event(event, &config, payload) else {
                    return Ok(Delivery::Skipped { reason: "no text" });
                };
                info!("Speaking for {}: {text}", event.kind);
                match self.speak(&text) {
                    Ok(spoken) => Ok(Delivery::Spoke {
                        text,
                        model: spoken.model.to_string(),
                        cached: spoken.cached,
                    }),
                    Err(DeliveryError::Synthesis(e)) => self.earcon_fallback(event.kind, e),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Speak `text`, serving it from the cache when possible. Blocks until
    /// playback ends.
    pub fn speak(&mut self, text: &str) -> Result<Spoken, DeliveryError> {
        // Resolve first so the lookup key names a concrete model.
        let model = self.provider.resolve_model().model_id;
        let voice = self
            .provider
            .effective_voice()
            .unwrap_or_else(|| DEFAULT_VOICE_KEY.to_string());

        if let Some(audio) = self.cache.as_mut().and_then(|c| c.get(text, &voice, model)) {
            debug!("Serving '{text}' from cache");
            self.renderer.play(&audio, true)?;
            return Ok(Spoken { model, cached: true });
        }

        let audio = self.provider.synthesize(text)?;

        // After a fallback the audio belongs to the fallback model and voice.
        let used = self.provider.current_model().map_or(model, |m| m.model_id);
        let used_voice = if used == model {
            voice
        } else {
            self.provider
                .current_model()
                .and_then(|m| m.default_voice())
                .unwrap_or(DEFAULT_VOICE_KEY)
                .to_string()
        };
        if let Some(cache) = self.cache.as_mut() {
            cache.put(text, &used_voice, used, &audio);
        }

        self.renderer.play(&audio, true)?;
        Ok(Spoken {
            model: used,
            cached: false,
        })
    }

    /// Speak `text` one sentence at a time, handing the player the growing
    /// audio after each sentence. Returns the number of sentences streamed
    /// without waiting for playback to end. The cache is not consulted.
    pub fn speak_streaming(&mut self, text: &str) -> Result<usize, DeliveryError> {
        let sentences = broker::split_sentences(text);
        let mut stream = StreamBuffer::new();
        let mut streamed = 0;
        let mut last_error = None;

        for (i, sentence) in sentences.iter().enumerate() {
            let chunk = match self.provider.synthesize(sentence) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Synthesis failed for sentence {}/{}: {e}", i + 1, sentences.len());
                    last_error = Some(e);
                    continue;
                }
            };
            let audio = match stream.push(&chunk) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Skipping sentence {}/{}: {e}", i + 1, sentences.len());
                    continue;
                }
            };
            self.renderer.play_streaming(&audio)?;
            streamed += 1;
            debug!("Streamed sentence {}/{}", i + 1, sentences.len());
        }

        match last_error {
            Some(e) if streamed == 0 => Err(e.into()),
            _ => Ok(streamed),
        }
    }

    fn earcon_fallback(
        &mut self,
        kind: EventKind,
        error: SynthesisError,
    ) -> Result<Delivery, DeliveryError> {
        warn!("Synthesis failed, falling back to earcon: {error}");

        let mut candidates = vec![Earcon::from(kind)];
        if kind != EventKind::AgentYield {
            candidates.push(Earcon::Yield);
        }
        for earcon in candidates {
            match self.renderer.play_earcon(earcon, true) {
                Ok(true) => {
                    return Ok(Delivery::EarconFallback {
                        earcon: earcon.to_string(),
                    })
                }
                Ok(false) => {}
                Err(e) => warn!("Earcon {earcon} failed: {e}"),
            }
        }
        Err(DeliveryError::Synthesis(error))
    }
}
