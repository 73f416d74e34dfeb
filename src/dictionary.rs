//! User-maintained pronunciation dictionary.
//!
//! Terms the synthesis voice mispronounces are rewritten to phonetic readings
//! before any text reaches the service. The dictionary is loaded once per run
//! and never mutated here; editing belongs to an external collaborator.

use log::{debug, info};
use regex::{NoExpand, RegexBuilder};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Ordered collection of (term, reading) pairs.
///
/// Longer terms are applied before shorter ones so that a term which is a
/// substring of another never pre-empts the longer match.
#[derive(Debug, Clone)]
pub struct ReplacementDictionary {
    entries: Vec<(String, String)>,
}

impl ReplacementDictionary {
    /// Builds a dictionary from (term, reading) pairs, dropping blank terms.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(term, _)| !term.trim().is_empty())
            .collect();
        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        Self { entries }
    }

    /// Loads the dictionary from a flat JSON object file.
    ///
    /// A missing file is `Ok(None)`, not an error; substitution then becomes
    /// a pass-through.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("no replacement dictionary at {}", path.display());
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        let map: BTreeMap<String, String> = serde_json::from_str(&data)?;
        let dictionary = Self::from_entries(map);
        info!(
            "loaded {} replacement entries from {}",
            dictionary.len(),
            path.display()
        );
        Ok(Some(dictionary))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces every case-insensitive occurrence of each term with its
    /// reading. Terms are matched literally, metacharacters escaped.
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (term, reading) in &self.entries {
            let pattern = match RegexBuilder::new(&regex::escape(term))
                .case_insensitive(true)
                .build()
            {
                Ok(re) => re,
                Err(e) => {
                    debug!("skipping unmatchable dictionary term {:?}: {}", term, e);
                    continue;
                }
            };
            result = pattern
                .replace_all(&result, NoExpand(reading))
                .into_owned();
        }
        result
    }
}
