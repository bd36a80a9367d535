//! Resource-aware model selection with a guaranteed fallback.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{self, ModelSpec, ModelTier, FALLBACK_TIER, QUALITY_ORDER};
use crate::system::{SystemDetector, SystemInfo, SystemProbe};

/// Memory left for the host OS, in GB.
pub const MEMORY_BUFFER_GB: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Pick from system resources.
    #[default]
    Auto,
    /// Honor the requested model if the host can run it.
    Manual,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub model: &'static ModelSpec,
    pub tier: ModelTier,
    pub reason: String,
    pub system_info: SystemInfo,
}

impl fmt::Display for SelectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selected {}: {} ({})", self.tier, self.model.model_id, self.reason)
    }
}

/// Usable memory after reserving [`MEMORY_BUFFER_GB`].
pub fn usable_memory(info: &SystemInfo) -> f64 {
    (info.available_memory_gb - MEMORY_BUFFER_GB).max(0.0)
}

/// Whether `spec` fits the snapshot's memory and accelerator constraints.
pub fn can_run(spec: &ModelSpec, info: &SystemInfo, usable_memory: f64) -> bool {
    if spec.estimated_memory_gb > usable_memory {
        debug!(
            "{}: requires {}GB, only {usable_memory:.1}GB usable",
            spec.model_id, spec.estimated_memory_gb
        );
        return false;
    }
    if spec.requires_accelerator && !info.accelerator_available {
        debug!("{}: requires accelerator, but not available", spec.model_id);
        return false;
    }
    true
}

#[derive(Clone)]
pub struct ModelSelector {
    probe: Arc<dyn SystemProbe>,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(Arc::new(SystemDetector::default()))
    }
}

impl ModelSelector {
    pub fn new(probe: Arc<dyn SystemProbe>) -> Self {
        Self { probe }
    }

    /// Select the best model for the current system. Never fails.
    pub fn select(&self, preference: Option<&str>, mode: SelectionMode) -> SelectionResult {
        let system_info = self.probe.detect();
        let usable = usable_memory(&system_info);
        debug!("{system_info}");

        info!(
            "System: {:.1}GB available, {usable:.1}GB usable \
             (with {MEMORY_BUFFER_GB}GB buffer), accelerator: {}",
            system_info.available_memory_gb, system_info.accelerator_available
        );

        if let (Some(model_id), SelectionMode::Manual) = (preference, mode) {
            if let Some(result) = try_preference(model_id, &system_info, usable) {
                return result;
            }
            warn!(
                "Requested model '{model_id}' cannot run on this system, \
                 falling back to auto selection"
            );
        }

        auto_select(system_info, usable)
    }
}

fn try_preference(model_id: &str, info: &SystemInfo, usable: f64) -> Option<SelectionResult> {
    let Some((tier, spec)) = models::find_by_id(model_id) else {
        warn!("Unknown model ID: {model_id}");
        return None;
    };
    can_run(spec, info, usable).then(|| SelectionResult {
        model: spec,
        tier,
        reason: "user preference".into(),
        system_info: info.clone(),
    })
}

fn auto_select(system_info: SystemInfo, usable: f64) -> SelectionResult {
    for tier in QUALITY_ORDER {
        let spec = tier.spec();
        if can_run(spec, &system_info, usable) {
            let reason = selection_reason(spec, usable, &system_info);
            info!("Auto-selected {tier}: {reason}");
            return SelectionResult {
                model: spec,
                tier,
                reason,
                system_info,
            };
        }
    }

    warn!("Falling back to {} (resource constraints)", FALLBACK_TIER.spec().model_id);
    SelectionResult {
        model: FALLBACK_TIER.spec(),
        tier: FALLBACK_TIER,
        reason: "fallback (resource constraints)".into(),
        system_info,
    }
}

fn selection_reason(spec: &ModelSpec, usable: f64, info: &SystemInfo) -> String {
    let mut parts = vec![if spec.estimated_memory_gb <= usable * 0.5 {
        "plenty of RAM"
    } else if spec.estimated_memory_gb <= usable * 0.8 {
        "sufficient RAM"
    } else {
        "fits in RAM"
    }];
    if spec.requires_accelerator && info.accelerator_available {
        parts.push("accelerator available");
    }
    parts.join(", ")
}
