//! Error types for the narration pipeline.

use thiserror::Error;

/// Errors produced by the narration pipeline.
///
/// Only `Configuration` aborts a whole run; every stage error is absorbed by
/// the orchestrator into a per-section failure record. `Analysis` never
/// reaches callers at all: the noise analyzer degrades to a default profile.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid setup (credential, tool availability).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote speech synthesis failed after retries were exhausted.
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    /// Raw PCM could not be decoded into a playable container.
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// A filter chain could not be applied.
    #[error("Audio filter error: {0}")]
    Filter(String),

    /// Chunk files could not be joined into one output.
    #[error("Audio concatenation error: {0}")]
    Concatenation(String),

    /// The audio measurement pass failed. Advisory only.
    #[error("Audio analysis error: {0}")]
    Analysis(String),

    /// HTTP transport failure.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
