//! Chronological index over the full, unfiltered snapshot set.
//!
//! Built once; both the window path and the keyword path resolve a
//! snapshot's "next" through it, so a successor always comes from the true
//! timeline rather than from a filtered subsequence.

use crate::config::UntimestampedPolicy;
use crate::error::{PipelineError, Result};
use crate::timestamp::sort_snapshots;
use crate::types::Snapshot;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct TimelineIndex {
    snapshots: Vec<Snapshot>,
    positions: HashMap<String, usize>,
}

impl TimelineIndex {
    pub fn build(mut snapshots: Vec<Snapshot>, policy: UntimestampedPolicy) -> Result<Self> {
        if let Some(bad) = snapshots.iter().find(|s| s.timestamp.is_none()) {
            match policy {
                UntimestampedPolicy::Fail => {
                    return Err(PipelineError::NotFound(format!(
                        "timestamp in file name `{}`",
                        bad.file_name
                    )));
                }
                UntimestampedPolicy::Exclude => {
                    snapshots.retain(|s| {
                        if s.timestamp.is_none() {
                            warn!("Excluding {} from the timeline: no timestamp", s.file_name);
                            false
                        } else {
                            true
                        }
                    });
                }
            }
        }

        sort_snapshots(&mut snapshots);
        let positions = snapshots
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.file_name.clone(), idx))
            .collect();

        Ok(Self {
            snapshots,
            positions,
        })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn position_of(&self, snapshot: &Snapshot) -> Option<usize> {
        self.positions.get(&snapshot.file_name).copied()
    }

    /// Next snapshot in time, `None` at the end of the timeline or for an
    /// unknown snapshot
    pub fn successor_of(&self, snapshot: &Snapshot) -> Option<&Snapshot> {
        self.position_of(snapshot)
            .and_then(|idx| self.snapshots.get(idx + 1))
    }

    /// Like [`successor_of`](Self::successor_of) but a missing successor is fatal
    pub fn require_successor(&self, snapshot: &Snapshot) -> Result<&Snapshot> {
        let idx = self
            .position_of(snapshot)
            .ok_or_else(|| PipelineError::NotFound(format!("{} in timeline", snapshot)))?;
        self.snapshots
            .get(idx + 1)
            .ok_or_else(|| PipelineError::IndexOutOfRange(snapshot.file_name.clone()))
    }

    /// Fail unless at least `needed` snapshots are present. Too few files
    /// for the requested window is a bad argument, not a data shortage.
    pub fn require_len(&self, needed: usize) -> Result<()> {
        if self.len() < needed {
            return Err(PipelineError::InvalidArgument(format!(
                "window size {} exceeds the {} snapshot(s) in the timeline",
                needed,
                self.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::extract_timestamp;

    fn snap(name: &str) -> Snapshot {
        Snapshot::new(name, extract_timestamp(name))
    }

    fn names(index: &TimelineIndex) -> Vec<&str> {
        index.snapshots().iter().map(|s| s.file_name.as_str()).collect()
    }

    #[test]
    fn test_build_sorts_chronologically() {
        let index = TimelineIndex::build(
            vec![
                snap("data_2024-01-01T00-00-03.0.yaml"),
                snap("data_2024-01-01T00-00-01.0.yaml"),
                snap("data_2024-01-01T00-00-02.0.yaml"),
            ],
            UntimestampedPolicy::Fail,
        )
        .unwrap();
        assert_eq!(
            names(&index),
            vec![
                "data_2024-01-01T00-00-01.0.yaml",
                "data_2024-01-01T00-00-02.0.yaml",
                "data_2024-01-01T00-00-03.0.yaml",
            ]
        );
    }

    #[test]
    fn test_untimestamped_policy() {
        let input = vec![snap("data_2024-01-01T00-00-01.0.yaml"), snap("readme.yaml")];

        let err = TimelineIndex::build(input.clone(), UntimestampedPolicy::Fail).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        let index = TimelineIndex::build(input, UntimestampedPolicy::Exclude).unwrap();
        assert_eq!(names(&index), vec!["data_2024-01-01T00-00-01.0.yaml"]);
    }

    #[test]
    fn test_successor_lookup() {
        let a = snap("data_2024-01-01T00-00-01.0.yaml");
        let b = snap("data_2024-01-01T00-00-02.0.yaml");
        let index =
            TimelineIndex::build(vec![b.clone(), a.clone()], UntimestampedPolicy::Fail).unwrap();

        assert_eq!(index.successor_of(&a), Some(&b));
        assert_eq!(index.successor_of(&b), None);
        assert!(matches!(
            index.require_successor(&b),
            Err(PipelineError::IndexOutOfRange(_))
        ));
        assert!(index.successor_of(&snap("data_2030-01-01T00-00-00.0.yaml")).is_none());
    }

    #[test]
    fn test_require_len() {
        let index = TimelineIndex::build(
            vec![snap("data_2024-01-01T00-00-01.0.yaml")],
            UntimestampedPolicy::Fail,
        )
        .unwrap();
        assert!(index.require_len(1).is_ok());
        assert!(matches!(
            index.require_len(2),
            Err(PipelineError::InvalidArgument(ref msg)) if msg.contains("window size 2")
        ));
    }
}
