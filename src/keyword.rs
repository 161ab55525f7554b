//! Keyword filtering over snapshot contents

use crate::error::{PipelineError, Result};
use crate::timeline::TimelineIndex;
use crate::types::{FilteredPair, Snapshot};
use tracing::info;

pub const MIN_KEYWORD_MATCHES: usize = 2;

/// Snapshots whose content contains `keyword`, in timeline order
pub fn select(timeline: &TimelineIndex, keyword: &str) -> Result<Vec<Snapshot>> {
    if keyword.is_empty() {
        return Err(PipelineError::InvalidArgument(
            "keyword must not be empty".to_string(),
        ));
    }

    let mut matches = Vec::new();
    for snapshot in timeline.snapshots() {
        if snapshot.read()?.contains(keyword) {
            matches.push(snapshot.clone());
        }
    }

    info!(
        "Keyword `{}` matched {} of {} snapshot(s)",
        keyword,
        matches.len(),
        timeline.len()
    );

    if matches.len() < MIN_KEYWORD_MATCHES {
        return Err(PipelineError::InsufficientData {
            scope: format!("keyword `{}`", keyword),
            found: matches.len(),
            needed: MIN_KEYWORD_MATCHES,
        });
    }
    Ok(matches)
}

/// Pair each match with its successor from the full timeline. A match that
/// is the last snapshot overall is fatal.
pub fn pair_with_successors(
    timeline: &TimelineIndex,
    matches: &[Snapshot],
) -> Result<Vec<FilteredPair>> {
    matches
        .iter()
        .map(|snapshot| {
            let next = timeline.require_successor(snapshot)?;
            Ok(FilteredPair {
                snapshot: snapshot.clone(),
                next: next.clone(),
            })
        })
        .collect()
}
