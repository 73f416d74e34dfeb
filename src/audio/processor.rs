//! Audio post-processing behind the [`AudioTransform`] capability trait.
//!
//! The production implementation shells out to ffmpeg. Pipeline logic only
//! ever talks to the trait, so tests (or a future in-process codec) can swap
//! the implementation without touching the orchestrator.

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::audio::denoise::FilterChain;
use crate::audio::temp::TempArtifact;
use crate::error::{PipelineError, Result};

/// Sample rate of the raw PCM the synthesis service returns.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Fixed chain applied to every decoded chunk so that independently
/// synthesized chunks sound consistent once concatenated: a slight slowdown
/// for stability, dynamic loudness normalization, and voice band-limiting.
const NORMALIZE_GRAPH: &str = "atempo=0.97,dynaudnorm=f=150:g=15,highpass=f=80,lowpass=f=12000";

lazy_static! {
    static ref RMS_LEVEL: Regex = Regex::new(r"RMS level dB:\s*(-?[0-9.]+|-inf)").unwrap();
    static ref PEAK_LEVEL: Regex = Regex::new(r"Peak level dB:\s*(-?[0-9.]+|-inf)").unwrap();
}

/// Overall signal statistics from a measurement pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioStats {
    pub rms_db: f64,
    pub peak_db: f64,
}

/// Decode, filter, normalize, concatenate, and measure audio files.
///
/// Every operation owns the temporary artifacts it creates and removes them
/// on both success and failure. `concat` additionally consumes (deletes) its
/// input files once the output exists.
#[async_trait]
pub trait AudioTransform: Send + Sync {
    /// Writes raw s16le mono PCM at [`PCM_SAMPLE_RATE`] into a compressed
    /// container at `dest`.
    async fn decode_pcm(&self, pcm: &[u8], dest: &Path) -> Result<()>;

    /// Applies `chain` to `src`, writing `dest`. An empty chain is a
    /// byte-for-byte copy, no transcoding.
    async fn apply_filters(&self, src: &Path, chain: &FilterChain, dest: &Path) -> Result<()>;

    /// Applies the fixed speech normalization chain.
    async fn normalize(&self, src: &Path, dest: &Path) -> Result<()>;

    /// Container-level concatenation (no re-encode) of `inputs` into `dest`.
    /// Deletes every input file and the concat manifest afterwards.
    async fn concat(&self, inputs: &[PathBuf], dest: &Path) -> Result<()>;

    /// Measures overall RMS and peak level of `src`.
    async fn measure_stats(&self, src: &Path) -> Result<AudioStats>;
}

/// ffmpeg-backed [`AudioTransform`].
pub struct FfmpegTransform {
    binary: PathBuf,
}

impl Default for FfmpegTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTransform {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Uses an explicit ffmpeg binary instead of the one on PATH.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Checks that the tool answers `-version`.
    pub async fn ensure_available(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PipelineError::Configuration(format!(
                    "ffmpeg is not available ({}): {}",
                    self.binary.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(PipelineError::Configuration(
                "ffmpeg -version exited with a failure status".to_string(),
            ));
        }
        debug!("ffmpeg found at {}", self.binary.display());
        Ok(())
    }

    /// Runs ffmpeg with `args`; a non-zero exit becomes `make_error` carrying
    /// the tail of the tool's stderr.
    async fn run(&self, args: &[&str], make_error: fn(String) -> PipelineError) -> Result<()> {
        debug!("running ffmpeg {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| make_error(format!("failed to start ffmpeg: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(make_error(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                diagnostic_tail(&stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioTransform for FfmpegTransform {
    async fn decode_pcm(&self, pcm: &[u8], dest: &Path) -> Result<()> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let raw = TempArtifact::reserve(dir, "raw", "pcm");
        tokio::fs::write(raw.path(), pcm)
            .await
            .map_err(|e| PipelineError::Decode(format!("failed to stage raw PCM: {}", e)))?;

        let rate = PCM_SAMPLE_RATE.to_string();
        let raw_path = raw.path().to_string_lossy().to_string();
        let dest_path = dest.to_string_lossy().to_string();
        let args = [
            "-y",
            "-f",
            "s16le",
            "-ar",
            rate.as_str(),
            "-ac",
            "1",
            "-i",
            raw_path.as_str(),
            "-codec:a",
            "libmp3lame",
            "-qscale:a",
            "2",
            dest_path.as_str(),
        ];
        // `raw` is dropped on every path out of here, including errors.
        self.run(&args, PipelineError::Decode).await?;
        debug!("decoded {} PCM bytes into {}", pcm.len(), dest.display());
        Ok(())
    }

    async fn apply_filters(&self, src: &Path, chain: &FilterChain, dest: &Path) -> Result<()> {
        if chain.is_empty() {
            tokio::fs::copy(src, dest)
                .await
                .map_err(|e| PipelineError::Filter(format!("failed to copy audio: {}", e)))?;
            return Ok(());
        }
        let graph = chain.to_graph();
        let src_path = src.to_string_lossy().to_string();
        let dest_path = dest.to_string_lossy().to_string();
        let args = [
            "-y",
            "-i",
            src_path.as_str(),
            "-af",
            graph.as_str(),
            dest_path.as_str(),
        ];
        self.run(&args, PipelineError::Filter).await?;
        info!("applied filter graph '{}' to {}", graph, src.display());
        Ok(())
    }

    async fn normalize(&self, src: &Path, dest: &Path) -> Result<()> {
        let src_path = src.to_string_lossy().to_string();
        let dest_path = dest.to_string_lossy().to_string();
        let args = [
            "-y",
            "-i",
            src_path.as_str(),
            "-af",
            NORMALIZE_GRAPH,
            dest_path.as_str(),
        ];
        self.run(&args, PipelineError::Filter).await
    }

    async fn concat(&self, inputs: &[PathBuf], dest: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(PipelineError::Concatenation(
                "no input files to concatenate".to_string(),
            ));
        }
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let manifest = TempArtifact::reserve(dir, "concat", "txt");
        let mut list = String::new();
        for input in inputs {
            list.push_str(&format!("file '{}'\n", input.display()));
        }
        tokio::fs::write(manifest.path(), list)
            .await
            .map_err(|e| {
                PipelineError::Concatenation(format!("failed to write concat manifest: {}", e))
            })?;

        let manifest_path = manifest.path().to_string_lossy().to_string();
        let dest_path = dest.to_string_lossy().to_string();
        let args = [
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            manifest_path.as_str(),
            "-c",
            "copy",
            dest_path.as_str(),
        ];
        // The manifest handle cleans itself up on the error path too.
        self.run(&args, PipelineError::Concatenation).await?;

        for input in inputs {
            if let Err(e) = tokio::fs::remove_file(input).await {
                warn!(
                    "failed to remove consumed chunk {}: {}",
                    input.display(),
                    e
                );
            }
        }
        info!(
            "concatenated {} chunk(s) into {}",
            inputs.len(),
            dest.display()
        );
        Ok(())
    }

    async fn measure_stats(&self, src: &Path) -> Result<AudioStats> {
        let src_path = src.to_string_lossy().to_string();
        let output = Command::new(&self.binary)
            .args([
                "-hide_banner",
                "-i",
                src_path.as_str(),
                "-af",
                "astats=measure_perchannel=none",
                "-f",
                "null",
                "-",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::Analysis(format!("failed to start ffmpeg: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Analysis(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                diagnostic_tail(&stderr)
            )));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_stats(&stderr).ok_or_else(|| {
            PipelineError::Analysis(format!(
                "no level statistics in ffmpeg output for {}",
                src.display()
            ))
        })
    }
}

/// Pulls overall RMS/peak levels out of an `astats` stderr dump.
fn parse_stats(stderr: &str) -> Option<AudioStats> {
    let rms_db = parse_level(&RMS_LEVEL, stderr)?;
    let peak_db = parse_level(&PEAK_LEVEL, stderr)?;
    Some(AudioStats { rms_db, peak_db })
}

fn parse_level(pattern: &Regex, stderr: &str) -> Option<f64> {
    // astats prints per-channel blocks before the overall one; take the last.
    let capture = pattern.captures_iter(stderr).last()?;
    let value = capture.get(1)?.as_str();
    if value == "-inf" {
        return Some(-120.0);
    }
    value.parse().ok()
}

fn diagnostic_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 6;
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join(" | ")
}
