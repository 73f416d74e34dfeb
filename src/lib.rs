//! narravox — turns long-form text scripts into narrated audio.
//!
//! The pipeline splits script text into speech-service-compatible chunks,
//! synthesizes each chunk against a remote TTS service with retry/backoff,
//! decodes the raw PCM payload into a playable container, optionally applies
//! a noise-reduction filter chain (auto-tuned by a heuristic noise analyzer),
//! normalizes speech characteristics across chunks, and losslessly
//! concatenates them into one deliverable file per section. Every temporary
//! artifact is cleaned up on success and failure alike.

pub mod audio;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod text;
pub mod tts;

use std::path::Path;

pub use config::{DenoiseConfig, NoiseCategory, PipelineConfig, ServiceTier, TreatmentLevel};
pub use dictionary::ReplacementDictionary;
pub use error::{PipelineError, Result};
pub use pipeline::NarrationPipeline;
pub use script::{PipelineResult, Script, Section, SectionKind, SectionResult};

/// Narrates a whole script with default settings.
pub async fn narrate_script(
    script: &Script,
    api_key: &str,
    output_dir: &Path,
) -> Result<PipelineResult> {
    let config = PipelineConfig {
        api_key: api_key.to_string(),
        output_dir: output_dir.to_path_buf(),
        ..PipelineConfig::default()
    };
    let pipeline = NarrationPipeline::new(config).await?;
    Ok(pipeline.run(script).await)
}

/// Narrates a single text into one output file with default settings.
pub async fn narrate_text(text: &str, api_key: &str, output: &Path) -> Result<()> {
    let config = PipelineConfig {
        api_key: api_key.to_string(),
        ..PipelineConfig::default()
    };
    let pipeline = NarrationPipeline::new(config).await?;
    pipeline.narrate_text(text, output).await
}
