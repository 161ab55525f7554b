//! Core type definitions for snapshot windowing and dataset synthesis

use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One recorded game-state file. Identity is the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub file_name: String,
    pub path: PathBuf,
    pub timestamp: Option<NaiveDateTime>, // None when the name carries no timestamp
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>, timestamp: Option<NaiveDateTime>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            path,
            timestamp,
        }
    }

    /// File name without its extension, used to derive cache keys
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    /// Read the raw text content. Snapshots are never cached in memory.
    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| PipelineError::io(&self.path, e))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// Contiguous run of `members.len()` snapshots in timeline order
#[derive(Debug, Clone)]
pub struct Window {
    pub offset: usize,
    pub members: Vec<Snapshot>,
    pub contents: Vec<String>,
}

impl Window {
    /// Concatenated content, every member followed by a newline
    pub fn text(&self) -> String {
        let mut combined = String::new();
        for content in &self.contents {
            combined.push_str(content);
            combined.push('\n');
        }
        combined
    }

    pub fn first(&self) -> &Snapshot {
        &self.members[0]
    }

    pub fn last(&self) -> &Snapshot {
        &self.members[self.members.len() - 1]
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Keyword-matched snapshot and its successor from the full timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredPair {
    pub snapshot: Snapshot,
    pub next: Snapshot,
}

/// Generated annotations for one processed unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentedText {
    pub full_response: String,
    pub summary_response: Option<String>, // only produced when the brief variant is enabled
    pub action_only: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Gpt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub from: Role,
    pub value: String,
}

/// A (human, gpt) pair; always exactly two turns in that order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord(pub [Turn; 2]);

impl TrainingRecord {
    pub fn new(human: impl Into<String>, gpt: impl Into<String>) -> Self {
        Self([
            Turn {
                from: Role::Human,
                value: human.into(),
            },
            Turn {
                from: Role::Gpt,
                value: gpt.into(),
            },
        ])
    }

    pub fn human(&self) -> &str {
        &self.0[0].value
    }

    pub fn assistant(&self) -> &str {
        &self.0[1].value
    }
}

/// Record flavours derived from one augmented unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordVariant {
    Full,
    Brief,
    Prediction,
}

impl RecordVariant {
    pub const ALL: [RecordVariant; 3] = [Self::Full, Self::Brief, Self::Prediction];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Brief => "brief",
            Self::Prediction => "prediction",
        }
    }
}

impl std::str::FromStr for RecordVariant {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "full" => Ok(Self::Full),
            "brief" => Ok(Self::Brief),
            "prediction" | "prediction-only" => Ok(Self::Prediction),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown record variant `{}`",
                other
            ))),
        }
    }
}

/// Counters reported at the end of an augmentation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub units: usize,
    pub generated: usize,
    pub cache_hits: usize,
    pub excluded_end_of_timeline: usize,
    pub skipped_category_cap: usize,
    pub skipped_service_failure: usize,
    pub records: usize,
}
