//! Listing and reading snapshot files from an input directory

use crate::config::UntimestampedPolicy;
use crate::error::{PipelineError, Result};
use crate::timeline::TimelineIndex;
use crate::timestamp::extract_timestamp;
use crate::types::Snapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    extension: String,
}

impl SnapshotStore {
    /// Open a store over `dir`. A missing directory is reported, not a crash.
    pub fn open(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(PipelineError::InputDirMissing(dir));
        }
        Ok(Self {
            dir,
            extension: extension.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All snapshot files with the configured extension, in directory order
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == self.extension);
            if !matches_ext {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let timestamp = extract_timestamp(&name);
            snapshots.push(Snapshot::new(path, timestamp));
        }

        debug!(
            "Listed {} .{} snapshot(s) in {}",
            snapshots.len(),
            self.extension,
            self.dir.display()
        );
        Ok(snapshots)
    }

    /// List and sort every snapshot into a timeline
    pub fn timeline(&self, policy: UntimestampedPolicy) -> Result<TimelineIndex> {
        TimelineIndex::build(self.list()?, policy)
    }

    pub fn snapshot(&self, file_name: &str) -> Snapshot {
        Snapshot::new(self.dir.join(file_name), extract_timestamp(file_name))
    }
}
