//! Declarative denoise filter chains.
//!
//! The composer turns (treatment level, noise category, quality flag) into an
//! ordered list of named filter stages. It is a pure function: no I/O, no
//! side effects, identical inputs give identical chains. The post-processor
//! renders the chain into an ffmpeg filter graph.

use serde::{Deserialize, Serialize};

use crate::config::{NoiseCategory, TreatmentLevel};

/// One named audio filter with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStage {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl FilterStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}={}", self.name, params.join(":"))
    }
}

/// Ordered sequence of filter stages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterChain {
    pub stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn push(&mut self, stage: FilterStage) {
        self.stages.push(stage);
    }

    /// Renders the chain as an ffmpeg `-af` filter graph.
    pub fn to_graph(&self) -> String {
        self.stages
            .iter()
            .map(FilterStage::render)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Composes the denoise chain for the given treatment.
///
/// `TreatmentLevel::None` yields an empty chain; the caller must then copy
/// the file without transcoding. `Auto` is expected to be resolved through
/// the noise analyzer first and behaves as `Medium` if it reaches this
/// function directly.
pub fn compose(
    level: TreatmentLevel,
    category: NoiseCategory,
    preserve_quality: bool,
) -> FilterChain {
    let mut chain = FilterChain::default();
    let level = match level {
        TreatmentLevel::Auto => TreatmentLevel::Medium,
        other => other,
    };
    if level == TreatmentLevel::None {
        return chain;
    }

    if category == NoiseCategory::Breath {
        compose_breath(&mut chain, level);
    } else {
        compose_general(&mut chain, level, category);
    }

    // Final stage, regardless of branch.
    if preserve_quality {
        chain.push(
            FilterStage::new("acompressor")
                .param("threshold", "0.1")
                .param("ratio", "2")
                .param("attack", "20")
                .param("release", "250"),
        );
        chain.push(
            FilterStage::new("equalizer")
                .param("f", "3000")
                .param("t", "h")
                .param("width", "2000")
                .param("g", "2"),
        );
    } else {
        chain.push(
            FilterStage::new("loudnorm")
                .param("I", "-16")
                .param("TP", "-1.5")
                .param("LRA", "11"),
        );
    }
    chain
}

/// Gate-led chain tuned to the amplitude band of breath sounds.
fn compose_breath(chain: &mut FilterChain, level: TreatmentLevel) {
    // 0.018 linear is roughly a -35 dB gate threshold.
    chain.push(
        FilterStage::new("agate")
            .param("threshold", "0.018")
            .param("ratio", "2")
            .param("attack", "5")
            .param("release", "50"),
    );
    chain.push(FilterStage::new("highpass").param("f", "120"));
    chain.push(FilterStage::new("afftdn").param("nr", "12").param("nf", "-25"));
    chain.push(
        FilterStage::new("silenceremove")
            .param("start_periods", "1")
            .param("start_threshold", "-50dB"),
    );
    chain.push(FilterStage::new("lowpass").param("f", "8000"));

    if level == TreatmentLevel::Strong {
        chain.push(FilterStage::new("afftdn").param("nr", "20").param("nf", "-30"));
        chain.push(
            FilterStage::new("silenceremove")
                .param("stop_periods", "1")
                .param("stop_threshold", "-50dB"),
        );
    }
}

fn compose_general(chain: &mut FilterChain, level: TreatmentLevel, category: NoiseCategory) {
    match level {
        TreatmentLevel::Light => {
            chain.push(FilterStage::new("afftdn").param("nr", "10").param("nf", "-20"));
            if category == NoiseCategory::Hum {
                chain.push(FilterStage::new("highpass").param("f", "60"));
            }
        }
        TreatmentLevel::Medium => {
            chain.push(FilterStage::new("afftdn").param("nr", "20").param("nf", "-25"));
            chain.push(FilterStage::new("highpass").param("f", "80"));
            chain.push(FilterStage::new("lowpass").param("f", "12000"));
            if matches!(category, NoiseCategory::ClickPop | NoiseCategory::Mixed) {
                chain.push(FilterStage::new("adeclick"));
            }
        }
        TreatmentLevel::Strong => {
            chain.push(FilterStage::new("afftdn").param("nr", "30").param("nf", "-30"));
            chain.push(FilterStage::new("highpass").param("f", "100"));
            chain.push(FilterStage::new("lowpass").param("f", "10000"));
            chain.push(FilterStage::new("anlmdn").param("s", "7"));
            chain.push(FilterStage::new("adeclick"));
            if category == NoiseCategory::WhiteNoise {
                chain.push(FilterStage::new("highpass").param("f", "200"));
            }
        }
        TreatmentLevel::None | TreatmentLevel::Auto => {}
    }
}
