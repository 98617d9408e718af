//! Snapshot source backed by a saved markets response on disk.
//!
//! Used for offline runs and for replaying a captured response.

use super::provider::{parse_snapshots, FetchResult, SnapshotSource, SourceError};
use std::path::{Path, PathBuf};

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self) -> Result<FetchResult, SourceError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SourceError::Other(format!("read snapshot file {}: {e}", self.path.display()))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| SourceError::ResponseFormatChanged(format!("snapshot file: {e}")))?;
        let result = parse_snapshots(payload)?;
        if result.snapshots.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(result)
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }
}
