//! Static registry of speech models, ordered by quality tier.

use std::fmt;

use serde::Serialize;

/// Model quality/resource tiers, highest quality first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Spark,
    SparkQuantized,
    Pocket,
}

/// Tiers in selection order (best first).
pub const QUALITY_ORDER: [ModelTier; 3] =
    [ModelTier::Spark, ModelTier::SparkQuantized, ModelTier::Pocket];

/// The minimal-resource tier every supported host can run.
pub const FALLBACK_TIER: ModelTier = ModelTier::Pocket;

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spark => "spark",
            Self::SparkQuantized => "spark_quantized",
            Self::Pocket => "pocket",
        }
    }

    pub fn spec(self) -> &'static ModelSpec {
        match self {
            Self::Spark => &SPARK,
            Self::SparkQuantized => &SPARK_QUANTIZED,
            Self::Pocket => &POCKET,
        }
    }

    pub fn is_fallback(self) -> bool {
        self == FALLBACK_TIER
    }

    /// Tiers strictly below this one, in quality order.
    pub fn lower_tiers(self) -> impl Iterator<Item = ModelTier> {
        QUALITY_ORDER.into_iter().filter(move |t| *t > self)
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub model_id: &'static str,
    pub estimated_memory_gb: f64,
    /// Higher is faster; 1.34 means faster than realtime.
    pub realtime_factor: f64,
    /// Empty when the model takes no voice parameter.
    pub default_voice: &'static str,
    pub requires_accelerator: bool,
    pub description: &'static str,
    pub lang_code: &'static str,
    pub supports_instruct: bool,
    pub default_instruct: Option<&'static str>,
}

impl ModelSpec {
    pub fn default_voice(&self) -> Option<&'static str> {
        Some(self.default_voice).filter(|v| !v.is_empty())
    }

    /// Instruction passed to the engine, only for models that accept one.
    pub fn instruct(&self) -> Option<&'static str> {
        if self.supports_instruct {
            self.default_instruct
        } else {
            None
        }
    }
}

static SPARK: ModelSpec = ModelSpec {
    model_id: "mlx-community/Spark-TTS-0.5B-bf16",
    estimated_memory_gb: 3.0,
    realtime_factor: 0.3,
    default_voice: "",
    requires_accelerator: true,
    description: "Best quality, requires >=4GB available RAM",
    lang_code: "en",
    supports_instruct: false,
    default_instruct: None,
};

static SPARK_QUANTIZED: ModelSpec = ModelSpec {
    model_id: "mlx-community/Spark-TTS-0.5B-8bit",
    estimated_memory_gb: 2.0,
    realtime_factor: 0.3,
    default_voice: "",
    requires_accelerator: true,
    description: "Quantized version, smaller memory footprint",
    lang_code: "en",
    supports_instruct: false,
    default_instruct: None,
};

static POCKET: ModelSpec = ModelSpec {
    model_id: "mlx-community/pocket-tts",
    estimated_memory_gb: 1.0,
    realtime_factor: 1.34,
    default_voice: "",
    requires_accelerator: false,
    description: "Fastest, smallest model (~1GB memory)",
    lang_code: "en",
    supports_instruct: false,
    default_instruct: None,
};

pub fn find_by_id(model_id: &str) -> Option<(ModelTier, &'static ModelSpec)> {
    QUALITY_ORDER
        .into_iter()
        .map(|tier| (tier, tier.spec()))
        .find(|(_, spec)| spec.model_id == model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_order_is_descending() {
        assert_eq!(QUALITY_ORDER[0], ModelTier::Spark);
        assert_eq!(QUALITY_ORDER[QUALITY_ORDER.len() - 1], FALLBACK_TIER);
        let mems: Vec<f64> = QUALITY_ORDER.iter().map(|t| t.spec().estimated_memory_gb).collect();
        assert!(mems.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn fallback_needs_no_accelerator_and_least_memory() {
        let fb = FALLBACK_TIER.spec();
        assert!(!fb.requires_accelerator);
        assert!(QUALITY_ORDER
            .iter()
            .all(|t| t.spec().estimated_memory_gb >= fb.estimated_memory_gb));
    }

    #[test]
    fn lookup_by_id() {
        let (tier, spec) = find_by_id("mlx-community/Spark-TTS-0.5B-8bit").unwrap();
        assert_eq!(tier, ModelTier::SparkQuantized);
        assert_eq!(spec.estimated_memory_gb, 2.0);
        assert!(find_by_id("kokoro").is_none());
    }

    #[test]
    fn lower_tiers_walk_down_to_fallback() {
        let lower: Vec<_> = ModelTier::Spark.lower_tiers().collect();
        assert_eq!(lower, vec![ModelTier::SparkQuantized, ModelTier::Pocket]);
        assert_eq!(ModelTier::Pocket.lower_tiers().count(), 0);
    }

    #[test]
    fn empty_default_voice_reads_as_none() {
        assert_eq!(POCKET.default_voice(), None);
        assert_eq!(POCKET.instruct(), None);
    }
}
