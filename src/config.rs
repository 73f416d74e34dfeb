//! Pipeline configuration.
//!
//! All knobs are gathered into an immutable [`PipelineConfig`] passed to the
//! pipeline at construction; per-run overrides travel as parameters instead
//! of mutated fields, so two pipelines in one process never share state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Billing tier of the remote synthesis service.
///
/// The tier decides how long the orchestrator waits between consecutive
/// synthesis calls to stay inside the service rate limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    /// Free tier: tight requests-per-minute budget.
    Free,
    /// Paid tier: generous rate limit.
    Paid,
}

impl Default for ServiceTier {
    fn default() -> Self {
        Self::Free
    }
}

impl ServiceTier {
    /// Delay the orchestrator inserts between synthesis calls.
    pub fn inter_call_delay(&self) -> Duration {
        match self {
            Self::Free => Duration::from_secs(12),
            Self::Paid => Duration::from_secs(1),
        }
    }
}

/// Intensity of the noise-reduction treatment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentLevel {
    /// No treatment; the file is copied without transcoding.
    None,
    Light,
    Medium,
    Strong,
    /// Pick a level from the noise analyzer's recommendation.
    Auto,
}

impl Default for TreatmentLevel {
    fn default() -> Self {
        Self::Auto
    }
}

/// Closed classification of the dominant noise characteristic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCategory {
    /// Broadband hiss.
    WhiteNoise,
    /// Ambient room tone.
    RoomTone,
    /// Low-frequency hum.
    Hum,
    /// Transient clicks and pops.
    ClickPop,
    /// Breath and respiration sounds.
    Breath,
    /// No single dominant characteristic.
    Mixed,
}

/// Noise-reduction settings for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DenoiseConfig {
    /// Treatment intensity; `Auto` defers to the analyzer.
    pub level: TreatmentLevel,
    /// Prefer a gentle compressor/EQ tail over loudness normalization.
    pub preserve_quality: bool,
    /// Explicit noise category; `None` lets the analyzer classify.
    pub category: Option<NoiseCategory>,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            level: TreatmentLevel::Auto,
            preserve_quality: false,
            category: None,
        }
    }
}

/// Configuration of the narration pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// API key for the synthesis service.
    pub api_key: String,
    /// Voice identifier passed to the service.
    pub voice: String,
    /// Model identifier passed to the service.
    pub model: String,
    /// Billing tier, used for inter-call rate limiting.
    pub tier: ServiceTier,
    /// Maximum characters per synthesis chunk.
    pub max_chunk_chars: usize,
    /// Noise reduction; `None` skips the denoise stage entirely.
    pub denoise: Option<DenoiseConfig>,
    /// Directory receiving the per-section output files.
    pub output_dir: PathBuf,
    /// Optional replacement dictionary (flat JSON term -> reading map).
    pub dictionary_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice: "Kore".to_string(),
            model: "gemini-2.5-flash-preview-tts".to_string(),
            tier: ServiceTier::default(),
            max_chunk_chars: crate::text::DEFAULT_MAX_CHUNK_CHARS,
            denoise: None,
            output_dir: PathBuf::from("output"),
            dictionary_path: None,
        }
    }
}
