//! Caller contract: the script structure handed to the pipeline and the
//! result records handed back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Type tag of one script section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Title slide; never narrated.
    Title,
    /// Pure divider; never narrated.
    Divider,
    /// Regular content section.
    Content,
}

/// One logical unit of a script, mapping to zero or one output audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    #[serde(default)]
    pub heading: Option<String>,
    /// Text to narrate. Absent or blank means the section is skipped.
    #[serde(default)]
    pub narration: Option<String>,
}

impl Section {
    /// Convenience constructor for a narratable content section.
    pub fn content(narration: impl Into<String>) -> Self {
        Self {
            kind: SectionKind::Content,
            heading: None,
            narration: Some(narration.into()),
        }
    }

    /// The trimmed narration text, if any.
    pub fn narration_text(&self) -> Option<&str> {
        self.narration
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Whether the section produces audio at all.
    pub fn is_narratable(&self) -> bool {
        self.kind == SectionKind::Content && self.narration_text().is_some()
    }
}

/// An ordered list of sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub sections: Vec<Section>,
}

/// Outcome of narrating one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    /// Index of the section within the script.
    pub section_index: usize,
    /// The produced audio file; `None` when the section failed.
    pub output_file: Option<PathBuf>,
    pub success: bool,
}

/// Aggregate outcome of a pipeline run.
///
/// Skipped (non-narratable) sections are not counted; the totals cover the
/// sections the pipeline actually attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// True iff every attempted section succeeded.
    pub success: bool,
    /// Per-section outcomes, in script order.
    pub sections: Vec<SectionResult>,
    pub total_sections: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Aggregates per-section outcomes into the final record.
    pub fn from_sections(sections: Vec<SectionResult>, duration: Duration) -> Self {
        let total_sections = sections.len();
        let success_count = sections.iter().filter(|s| s.success).count();
        let failure_count = total_sections - success_count;
        Self {
            success: failure_count == 0,
            sections,
            total_sections,
            success_count,
            failure_count,
            duration,
            finished_at: Utc::now(),
        }
    }
}
