//! Append-only record table and its on-disk form
//!
//! A saved dataset is a directory holding `data.jsonl` (one
//! `{"text", "conversations"}` object per line) and `dataset_info.json`.

use crate::error::{PipelineError, Result};
use crate::types::{Role, TrainingRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

pub const DATA_FILE: &str = "data.jsonl";
pub const INFO_FILE: &str = "dataset_info.json";

/// Renders a record into the single text blob a trainer consumes
pub trait ChatTemplate: Send + Sync {
    fn name(&self) -> &'static str;
    fn render(&self, record: &TrainingRecord) -> String;
}

/// ChatML with `user` / `assistant` roles
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatMlTemplate;

impl ChatTemplate for ChatMlTemplate {
    fn name(&self) -> &'static str {
        "chatml"
    }

    fn render(&self, record: &TrainingRecord) -> String {
        let mut text = String::new();
        for turn in &record.0 {
            let role = match turn.from {
                Role::Human => "user",
                Role::Gpt => "assistant",
            };
            text.push_str("<|im_start|>");
            text.push_str(role);
            text.push('\n');
            text.push_str(&turn.value);
            text.push_str("<|im_end|>\n");
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub text: String,
    pub conversations: TrainingRecord,
}

impl DatasetEntry {
    pub fn new(record: TrainingRecord, template: &dyn ChatTemplate) -> Self {
        Self {
            text: template.render(&record),
            conversations: record,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub count: usize,
    pub template: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    entries: Vec<DatasetEntry>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DatasetEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filtered view in the order of `indices`. Repeats are kept;
    /// out-of-range indices are an error.
    pub fn select(&self, indices: &[usize]) -> Result<Dataset> {
        let entries = indices
            .iter()
            .map(|&i| {
                self.entries.get(i).cloned().ok_or_else(|| {
                    PipelineError::IndexOutOfRange(format!(
                        "record {} (dataset has {})",
                        i,
                        self.entries.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset { entries })
    }

    pub fn save(&self, dir: &Path, template: &dyn ChatTemplate) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

        let data_path = dir.join(DATA_FILE);
        let file = File::create(&data_path).map_err(|e| PipelineError::io(&data_path, e))?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer
                .write_all(b"\n")
                .map_err(|e| PipelineError::io(&data_path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(&data_path, e))?;

        let info = DatasetInfo {
            count: self.entries.len(),
            template: template.name().to_string(),
            created_at: Utc::now(),
        };
        let info_path = dir.join(INFO_FILE);
        fs::write(&info_path, serde_json::to_string_pretty(&info)?)
            .map_err(|e| PipelineError::io(&info_path, e))?;

        info!("Saved {} records to {}", self.entries.len(), dir.display());
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Dataset> {
        let data_path = dir.join(DATA_FILE);
        if !data_path.is_file() {
            return Err(PipelineError::NotFound(format!(
                "dataset at {}",
                dir.display()
            )));
        }
        let raw = fs::read_to_string(&data_path).map_err(|e| PipelineError::io(&data_path, e))?;
        let entries = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<DatasetEntry>, _>>()?;

        if let Some(info) = Self::load_info(dir)? {
            if info.count != entries.len() {
                warn!(
                    "{} lists {} records but {} were read",
                    INFO_FILE,
                    info.count,
                    entries.len()
                );
            }
        }

        info!("Loaded {} records from {}", entries.len(), dir.display());
        Ok(Dataset { entries })
    }

    pub fn load_info(dir: &Path) -> Result<Option<DatasetInfo>> {
        let info_path = dir.join(INFO_FILE);
        if !info_path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&info_path).map_err(|e| PipelineError::io(&info_path, e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
