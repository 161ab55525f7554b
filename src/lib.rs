//! gamestate-synth - training corpora from recorded game-state snapshots
//!
//! Turns a directory of timestamped snapshots into (human, gpt) records:
//! - Chronological timeline with successor lookup
//! - Sliding windows or keyword-filtered snapshots as work units
//! - Disk-cached reasoning and summary generation via an Ollama endpoint
//! - Function-stratified balancing of the resulting dataset

pub mod types;
pub mod config;
pub mod error;
pub mod timestamp;
pub mod snapshot_store;
pub mod timeline;
pub mod window;
pub mod keyword;
pub mod action;
pub mod generators;
pub mod http_generator;
pub mod blob_store;
pub mod summary;
pub mod cache;
pub mod assembler;
pub mod dataset;
pub mod balance;
pub mod pipeline;

pub use types::*;
pub use config::*;
pub use error::{PipelineError, Result};
pub use generators::{MockReply, MockTextGen, TextGenerator};
pub use http_generator::OllamaGen;
pub use blob_store::{FsBlobStore, KeyValueBlobStore, MemoryBlobStore};
pub use cache::AugmentationCache;
pub use dataset::{ChatMlTemplate, ChatTemplate, Dataset, DatasetEntry};
pub use balance::{balance, FunctionIndex};
pub use pipeline::{build_window_dataset, export_windows, Pipeline};
pub use snapshot_store::SnapshotStore;
pub use timeline::TimelineIndex;
