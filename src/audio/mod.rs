//! Audio post-processing: noise analysis, filter composition, and the
//! ffmpeg-backed transform operations.

pub mod analyzer;
pub mod denoise;
pub mod processor;
pub mod temp;

pub use analyzer::{analyze, classify, NoiseProfile};
pub use denoise::{compose, FilterChain, FilterStage};
pub use processor::{AudioStats, AudioTransform, FfmpegTransform, PCM_SAMPLE_RATE};
pub use temp::TempArtifact;
