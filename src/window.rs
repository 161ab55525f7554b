//! Sliding windows over timeline-ordered snapshots

use crate::error::{PipelineError, Result};
use crate::types::{Snapshot, Window};
use std::collections::VecDeque;

/// Validate a signed window size, e.g. straight from a CLI flag
pub fn window_size_from(size: i64) -> Result<usize> {
    if size < 1 {
        return Err(PipelineError::InvalidArgument(format!(
            "window size must be at least 1, got {}",
            size
        )));
    }
    usize::try_from(size).map_err(|_| {
        PipelineError::InvalidArgument(format!("window size {} is out of range", size))
    })
}

/// Item produced by [`generate`]
#[derive(Debug, Clone)]
pub enum WindowItem {
    /// Content of one window member, emitted before its window
    Intermediate(String),
    Window(Window),
}

impl WindowItem {
    pub fn text(&self) -> String {
        match self {
            Self::Intermediate(content) => content.clone(),
            Self::Window(window) => window.text(),
        }
    }
}

/// Lazy window sequence. Files are read as each window is reached, so
/// calling [`generate`] again re-reads from disk.
pub struct Windows<'a> {
    snapshots: &'a [Snapshot],
    size: usize,
    offset: usize,
    emit_intermediates: bool,
    pending: VecDeque<WindowItem>,
}

/// `snapshots.len() - size + 1` windows, one per start offset
pub fn generate(snapshots: &[Snapshot], size: usize, emit_intermediates: bool) -> Result<Windows<'_>> {
    if size < 1 {
        return Err(PipelineError::InvalidArgument(
            "window size must be at least 1, got 0".to_string(),
        ));
    }
    Ok(Windows {
        snapshots,
        size,
        offset: 0,
        emit_intermediates,
        pending: VecDeque::new(),
    })
}

/// Number of windows a full pass yields
pub fn window_count(len: usize, size: usize) -> usize {
    if size == 0 || len < size {
        0
    } else {
        len - size + 1
    }
}

impl<'a> Windows<'a> {
    fn load_next(&mut self) -> Option<Result<()>> {
        if self.offset + self.size > self.snapshots.len() {
            return None;
        }
        let members = &self.snapshots[self.offset..self.offset + self.size];

        let mut contents = Vec::with_capacity(self.size);
        for member in members {
            match member.read() {
                Ok(content) => contents.push(content),
                Err(e) => {
                    // fuse: nothing after a read failure
                    self.offset = self.snapshots.len();
                    return Some(Err(e));
                }
            }
        }

        if self.emit_intermediates {
            self.pending
                .extend(contents.iter().cloned().map(WindowItem::Intermediate));
        }
        self.pending.push_back(WindowItem::Window(Window {
            offset: self.offset,
            members: members.to_vec(),
            contents,
        }));
        self.offset += 1;
        Some(Ok(()))
    }

    /// Skip intermediates and yield whole windows only
    pub fn windows_only(self) -> impl Iterator<Item = Result<Window>> + 'a {
        self.filter_map(|item| match item {
            Ok(WindowItem::Window(window)) => Some(Ok(window)),
            Ok(WindowItem::Intermediate(_)) => None,
            Err(e) => Some(Err(e)),
        })
    }
}

impl Iterator for Windows<'_> {
    type Item = Result<WindowItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.pop_front() {
            return Some(Ok(item));
        }
        match self.load_next()? {
            Ok(()) => self.pending.pop_front().map(Ok),
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::extract_timestamp;
    use std::fs;
    use tempfile::TempDir;

    fn write_snapshots(dir: &TempDir, n: usize) -> Vec<Snapshot> {
        (0..n)
            .map(|i| {
                let name = format!("data_2024-01-01T00-00-{:02}.000001.yaml", i);
                let path = dir.path().join(&name);
                fs::write(&path, format!("tick: {}\naction:\n  function: move", i)).unwrap();
                Snapshot::new(path, extract_timestamp(&name))
            })
            .collect()
    }

    #[test]
    fn test_window_count_and_overlap() {
        let dir = TempDir::new().unwrap();
        let snaps = write_snapshots(&dir, 6);

        for k in 1..=6 {
            let windows: Vec<Window> = generate(&snaps, k, false)
                .unwrap()
                .windows_only()
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(windows.len(), 6 - k + 1);
            assert_eq!(windows.len(), window_count(6, k));

            for (i, w) in windows.iter().enumerate() {
                assert_eq!(w.offset, i);
                assert_eq!(w.size(), k);
                assert!(w.members.windows(2).all(|p| p[0].timestamp < p[1].timestamp));
            }
            for pair in windows.windows(2) {
                assert_eq!(pair[0].members[1..], pair[1].members[..k - 1]);
            }
        }
    }

    #[test]
    fn test_window_larger_than_input() {
        let dir = TempDir::new().unwrap();
        let snaps = write_snapshots(&dir, 2);
        assert_eq!(generate(&snaps, 3, true).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            generate(&[], 0, false),
            Err(PipelineError::InvalidArgument(_))
        ));
        assert!(matches!(
            window_size_from(0),
            Err(PipelineError::InvalidArgument(_))
        ));
        assert!(matches!(
            window_size_from(-2),
            Err(PipelineError::InvalidArgument(_))
        ));
        assert_eq!(window_size_from(3).unwrap(), 3);
    }

    #[test]
    fn test_intermediates_precede_window() {
        let dir = TempDir::new().unwrap();
        let snaps = write_snapshots(&dir, 3);
        let items: Vec<WindowItem> = generate(&snaps, 2, true)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        // two windows, each preceded by its two members
        assert_eq!(items.len(), 6);
        assert!(matches!(items[0], WindowItem::Intermediate(ref c) if c.starts_with("tick: 0")));
        assert!(matches!(items[1], WindowItem::Intermediate(ref c) if c.starts_with("tick: 1")));
        match &items[2] {
            WindowItem::Window(w) => {
                assert_eq!(
                    w.text(),
                    "tick: 0\naction:\n  function: move\ntick: 1\naction:\n  function: move\n"
                );
            }
            other => panic!("expected window, got {:?}", other),
        }
    }

    #[test]
    fn test_restartable() {
        let dir = TempDir::new().unwrap();
        let snaps = write_snapshots(&dir, 4);
        let first: Vec<String> = generate(&snaps, 2, false)
            .unwrap()
            .map(|i| i.unwrap().text())
            .collect();
        fs::write(&snaps[0].path, "changed").unwrap();
        let second: Vec<String> = generate(&snaps, 2, false)
            .unwrap()
            .map(|i| i.unwrap().text())
            .collect();
        assert_eq!(first.len(), second.len());
        assert!(second[0].starts_with("changed\n"));
        assert_eq!(first[1..], second[1..]);
    }

    #[test]
    fn test_read_failure_fuses() {
        let dir = TempDir::new().unwrap();
        let snaps = write_snapshots(&dir, 3);
        fs::remove_file(&snaps[1].path).unwrap();
        let mut iter = generate(&snaps, 2, false).unwrap();
        assert!(matches!(iter.next(), Some(Err(PipelineError::Io { .. }))));
        assert!(iter.next().is_none());
    }
}
