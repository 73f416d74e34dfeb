//! Pipeline orchestrator.
//!
//! Sequences substitution, chunking, synthesis, and audio post-processing per
//! script section, strictly sequentially: one synthesis call and one tool
//! invocation in flight at a time, which keeps the remote rate limit honored
//! and temp-file naming collision-free without locking.

use chrono::Utc;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::audio::analyzer;
use crate::audio::denoise::{self, FilterChain};
use crate::audio::processor::{AudioTransform, FfmpegTransform};
use crate::audio::temp::TempArtifact;
use crate::config::{DenoiseConfig, PipelineConfig, TreatmentLevel};
use crate::dictionary::ReplacementDictionary;
use crate::error::{PipelineError, Result};
use crate::script::{PipelineResult, Script, SectionResult};
use crate::text;
use crate::tts::{HttpTransport, SpeechClient, SpeechRequest, SynthesisTransport};

/// Drives a script through substitution, chunking, synthesis, and audio
/// post-processing into one audio file per narratable section.
pub struct NarrationPipeline<T: SynthesisTransport, A: AudioTransform> {
    config: PipelineConfig,
    client: SpeechClient<T>,
    transform: A,
    dictionary: Option<ReplacementDictionary>,
}

impl NarrationPipeline<HttpTransport, FfmpegTransform> {
    /// Builds a production pipeline.
    ///
    /// Fails before any work begins when the API key is missing or the
    /// transcoding tool is unavailable.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        let transform = FfmpegTransform::new();
        transform.ensure_available().await?;
        let transport = HttpTransport::new(config.api_key.clone());
        Self::with_parts(config, transport, transform)
    }
}

impl<T: SynthesisTransport, A: AudioTransform> NarrationPipeline<T, A> {
    /// Assembles a pipeline from explicit transport/transform implementations.
    pub fn with_parts(config: PipelineConfig, transport: T, transform: A) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "synthesis API key is required".to_string(),
            ));
        }
        let dictionary = match &config.dictionary_path {
            Some(path) => ReplacementDictionary::load(path)?,
            None => None,
        };
        Ok(Self {
            config,
            client: SpeechClient::new(transport),
            transform,
            dictionary,
        })
    }

    /// Narrates every narratable section of `script`.
    ///
    /// A failed section is recorded and processing continues with the next
    /// one; the aggregate result is only successful when no section failed.
    pub async fn run(&self, script: &Script) -> PipelineResult {
        let started = Instant::now();
        let run_stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let mut results = Vec::new();
        // The service rate limit is global, so pacing spans section
        // boundaries: the counter lives at run scope, not per section.
        let mut synthesis_calls = 0u64;

        for (index, section) in script.sections.iter().enumerate() {
            let Some(section_text) = section.narration_text() else {
                info!("skipping section {} (no narratable text)", index);
                continue;
            };
            if !section.is_narratable() {
                info!("skipping section {} ({:?})", index, section.kind);
                continue;
            }

            let output = self
                .config
                .output_dir
                .join(format!("section_{:03}_{}.mp3", index, run_stamp));
            info!("narrating section {} into {}", index, output.display());

            match self
                .process_text(section_text, &output, &mut synthesis_calls)
                .await
            {
                Ok(()) => results.push(SectionResult {
                    section_index: index,
                    output_file: Some(output),
                    success: true,
                }),
                Err(e) => {
                    error!("section {} failed: {}", index, e);
                    results.push(SectionResult {
                        section_index: index,
                        output_file: None,
                        success: false,
                    });
                }
            }
        }

        let result = PipelineResult::from_sections(results, started.elapsed());
        info!(
            "pipeline finished: {}/{} sections succeeded in {:?}",
            result.success_count, result.total_sections, result.duration
        );
        result
    }

    /// Single-text mode: narrates `text` into exactly one file at `output`.
    pub async fn narrate_text(&self, text: &str, output: &Path) -> Result<()> {
        self.process_text(text, output, &mut 0).await
    }

    /// `synthesis_calls` counts calls already made this run; every call after
    /// the first is preceded by the tier's inter-call delay.
    async fn process_text(
        &self,
        raw_text: &str,
        output: &Path,
        synthesis_calls: &mut u64,
    ) -> Result<()> {
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let cleaned = text::prepare_for_synthesis(raw_text);
        let substituted = match &self.dictionary {
            Some(dictionary) => dictionary.apply(&cleaned),
            None => cleaned,
        };
        let chunks = text::chunk_text(&substituted, self.config.max_chunk_chars);
        if chunks.is_empty() {
            return Err(PipelineError::Synthesis(
                "no narratable text after preparation".to_string(),
            ));
        }
        info!(
            "narrating {} chunk(s) into {}",
            chunks.len(),
            output.display()
        );

        // Every intermediate artifact lives in a scratch directory that is
        // removed with the handles when this function returns, on success or
        // failure alike.
        let scratch = tempfile::tempdir()?;
        let delay = self.config.tier.inter_call_delay();
        let mut normalized: Vec<TempArtifact> = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            if *synthesis_calls > 0 {
                tokio::time::sleep(delay).await;
            }
            // Counted before the call so a failed section still paces the
            // next one.
            *synthesis_calls += 1;
            let request = SpeechRequest {
                text: chunk.clone(),
                voice: self.config.voice.clone(),
                model: self.config.model.clone(),
            };
            let pcm = self.client.synthesize(&request).await?;

            let decoded =
                TempArtifact::reserve(scratch.path(), &format!("chunk_{:03}_decoded", i), "mp3");
            self.transform.decode_pcm(&pcm, decoded.path()).await?;

            let filtered = match self.config.denoise {
                Some(denoise_config) => {
                    Some(self.denoise_chunk(&denoise_config, &decoded, scratch.path(), i).await?)
                }
                None => None,
            };
            let normalize_src = filtered.as_ref().unwrap_or(&decoded);

            let norm =
                TempArtifact::reserve(scratch.path(), &format!("chunk_{:03}_norm", i), "mp3");
            self.transform
                .normalize(normalize_src.path(), norm.path())
                .await?;
            normalized.push(norm);
            // `decoded` and `filtered` drop here and vanish from disk.
        }

        let inputs: Vec<PathBuf> = normalized
            .iter()
            .map(|artifact| artifact.path().to_path_buf())
            .collect();
        // concat consumes the inputs; the artifact handles then find nothing
        // left to remove when they drop.
        self.transform.concat(&inputs, output).await?;
        Ok(())
    }

    /// Applies the configured denoise treatment to one decoded chunk.
    ///
    /// `Auto` level or a missing category is resolved through the analyzer;
    /// the analysis is advisory and falls back to a default profile rather
    /// than failing the chunk.
    async fn denoise_chunk(
        &self,
        denoise_config: &DenoiseConfig,
        decoded: &TempArtifact,
        scratch: &Path,
        index: usize,
    ) -> Result<TempArtifact> {
        let needs_analysis =
            denoise_config.level == TreatmentLevel::Auto || denoise_config.category.is_none();
        let (level, category) = if needs_analysis {
            let profile = analyzer::analyze(&self.transform, decoded.path()).await;
            let level = if denoise_config.level == TreatmentLevel::Auto {
                profile.recommended
            } else {
                denoise_config.level
            };
            (level, denoise_config.category.unwrap_or(profile.category))
        } else {
            // Both given explicitly; `category` is Some by the check above.
            (
                denoise_config.level,
                denoise_config.category.unwrap_or(crate::config::NoiseCategory::Mixed),
            )
        };

        let chain: FilterChain = denoise::compose(level, category, denoise_config.preserve_quality);
        let filtered =
            TempArtifact::reserve(scratch, &format!("chunk_{:03}_denoised", index), "mp3");
        self.transform
            .apply_filters(decoded.path(), &chain, filtered.path())
            .await?;
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::processor::AudioStats;
    use crate::config::{NoiseCategory, ServiceTier};
    use crate::script::{Section, SectionKind};
    use crate::tts::TransportError;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport that answers with fake PCM, failing transiently forever for
    /// chunks containing the poison marker.
    struct FakeTransport {
        requests: Mutex<Vec<String>>,
    }

    const POISON: &str = "__FAIL__";

    impl FakeTransport {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SynthesisTransport for FakeTransport {
        async fn request(
            &self,
            request: &SpeechRequest,
        ) -> std::result::Result<String, TransportError> {
            self.requests.lock().unwrap().push(request.text.clone());
            if request.text.contains(POISON) {
                return Err(TransportError {
                    status: Some(503),
                    message: "UNAVAILABLE".to_string(),
                });
            }
            Ok(BASE64.encode(format!("pcm:{}", request.text.chars().count())))
        }
    }

    /// In-process transform that moves real bytes between real files and
    /// honors the concat contract (inputs are consumed).
    struct FakeTransform;

    #[async_trait]
    impl AudioTransform for FakeTransform {
        async fn decode_pcm(&self, pcm: &[u8], dest: &Path) -> crate::error::Result<()> {
            tokio::fs::write(dest, pcm).await?;
            Ok(())
        }

        async fn apply_filters(
            &self,
            src: &Path,
            _chain: &FilterChain,
            dest: &Path,
        ) -> crate::error::Result<()> {
            tokio::fs::copy(src, dest).await?;
            Ok(())
        }

        async fn normalize(&self, src: &Path, dest: &Path) -> crate::error::Result<()> {
            tokio::fs::copy(src, dest).await?;
            Ok(())
        }

        async fn concat(&self, inputs: &[PathBuf], dest: &Path) -> crate::error::Result<()> {
            let mut joined = Vec::new();
            for input in inputs {
                joined.extend(tokio::fs::read(input).await?);
            }
            tokio::fs::write(dest, joined).await?;
            for input in inputs {
                tokio::fs::remove_file(input).await?;
            }
            Ok(())
        }

        async fn measure_stats(&self, _src: &Path) -> crate::error::Result<AudioStats> {
            Ok(AudioStats {
                rms_db: -20.0,
                peak_db: -5.0,
            })
        }
    }

    fn test_config(output_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            api_key: "test-key".to_string(),
            tier: ServiceTier::Paid,
            output_dir: output_dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    fn long_text(chars: usize) -> String {
        // 100-char sentences, so a 1000-char chunk packs exactly ten.
        let sentence = "あ".repeat(99) + "。";
        sentence.repeat(chars / 100)
    }

    fn list_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let config = PipelineConfig::default();
        let Err(err) = NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform)
        else {
            panic!("construction succeeded without an API key");
        };
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_section_synthesizes_in_three_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let script = Script {
            sections: vec![Section::content(long_text(2400))],
        };
        let result = pipeline.run(&script).await;

        assert!(result.success);
        assert_eq!(result.total_sections, 1);
        assert_eq!(pipeline.client_transport().request_count(), 3);

        // Exactly the final file, no per-chunk residue.
        let files = list_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(result.sections[0].output_file.as_deref(), Some(&*files[0]));
        assert!(std::fs::metadata(&files[0]).unwrap().len() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let script = Script {
            sections: vec![
                Section::content("First section narration."),
                Section::content(format!("Broken {} narration.", POISON)),
                Section::content("Third section narration."),
            ],
        };
        let result = pipeline.run(&script).await;

        assert!(!result.success);
        assert_eq!(result.total_sections, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert!(result.sections[0].success);
        assert!(!result.sections[1].success);
        assert!(result.sections[1].output_file.is_none());
        assert!(result.sections[2].success);

        let files = list_files(dir.path());
        assert_eq!(files.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delay_spans_section_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tier = ServiceTier::Free;
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let script = Script {
            sections: vec![
                Section::content("First section."),
                Section::content("Second section."),
            ],
        };
        let started = tokio::time::Instant::now();
        let result = pipeline.run(&script).await;

        assert!(result.success);
        assert_eq!(pipeline.client_transport().request_count(), 2);
        // One chunk per section, so exactly one inter-call delay, even
        // though the calls belong to different sections.
        assert_eq!(started.elapsed(), ServiceTier::Free.inter_call_delay());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_synthesis_call_is_not_delayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tier = ServiceTier::Free;
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let started = tokio::time::Instant::now();
        let output = dir.path().join("narrated.mp3");
        pipeline.narrate_text("One short chunk.", &output).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_narratable_sections_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let script = Script {
            sections: vec![
                Section {
                    kind: SectionKind::Title,
                    heading: Some("Deck title".to_string()),
                    narration: Some("never read".to_string()),
                },
                Section::content("   "),
                Section::content("Actual narration."),
            ],
        };
        let result = pipeline.run(&script).await;

        assert!(result.success);
        assert_eq!(result.total_sections, 1);
        assert_eq!(result.sections[0].section_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denoise_stage_runs_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.denoise = Some(DenoiseConfig {
            level: TreatmentLevel::Auto,
            preserve_quality: false,
            category: None,
        });
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let output = dir.path().join("narrated.mp3");
        pipeline.narrate_text("A sentence to denoise.", &output).await.unwrap();
        assert!(output.exists());
        assert_eq!(list_files(dir.path()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_denoise_category_skips_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.denoise = Some(DenoiseConfig {
            level: TreatmentLevel::Strong,
            preserve_quality: true,
            category: Some(NoiseCategory::Breath),
        });
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let output = dir.path().join("narrated.mp3");
        pipeline.narrate_text("Breathy narration.", &output).await.unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_empty_text_is_an_error_in_single_text_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let output = dir.path().join("narrated.mp3");
        let err = pipeline.narrate_text("  \n ", &output).await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(!output.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictionary_is_applied_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let dict_path = dir.path().join("dict.json");
        std::fs::write(&dict_path, r#"{"AI": "エーアイ"}"#).unwrap();

        let mut config = test_config(dir.path());
        config.dictionary_path = Some(dict_path);
        let pipeline =
            NarrationPipeline::with_parts(config, FakeTransport::new(), FakeTransform).unwrap();

        let output = dir.path().join("narrated.mp3");
        pipeline.narrate_text("AIの話。", &output).await.unwrap();

        let requests = pipeline.client_transport().requests.lock().unwrap().clone();
        assert_eq!(requests, vec!["エーアイの話。".to_string()]);
    }

    impl<A: AudioTransform> NarrationPipeline<FakeTransport, A> {
        fn client_transport(&self) -> &FakeTransport {
            self.client.transport_ref()
        }
    }
}
