//! Scoped temporary audio artifacts.

use log::warn;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A uniquely named temporary file owned by exactly one pipeline stage.
///
/// The owning stage writes the file and a later stage consumes it; dropping
/// the handle removes whatever is still on disk, so an error anywhere on the
/// path leaves no residue.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Reserves a unique path under `dir`. Nothing is created on disk yet.
    pub fn reserve(dir: &Path, prefix: &str, extension: &str) -> Self {
        let name = format!("{}_{}.{}", prefix, Uuid::new_v4(), extension);
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                "failed to remove temporary artifact {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
