//! Timestamp extraction from snapshot file names
//!
//! Snapshot files are named `<prefix>_<date>T<time>.<fraction>.<ext>`, e.g.
//! `data_2024-09-12T14-33-21.123456789.yaml`. The recorder may write more
//! fractional digits than microsecond precision, so the fraction is cut to
//! six digits before parsing.

use crate::types::Snapshot;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

const MAX_FRACTION_DIGITS: usize = 6;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<prefix>.+?)_(?P<date>\d{4}-\d{2}-\d{2})T(?P<time>\d{2}[-:]\d{2}[-:]\d{2})(?:\.(?P<frac>\d+))?\.(?P<ext>[A-Za-z0-9]+)$",
        )
        .expect("timestamp pattern is valid")
    })
}

/// Parse the embedded timestamp, or `None` if the name does not match
pub fn extract_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let caps = pattern().captures(file_name)?;
    let date = &caps["date"];
    let time = caps["time"].replace(':', "-");
    let fraction = caps
        .name("frac")
        .map(|m| {
            let digits = m.as_str();
            &digits[..digits.len().min(MAX_FRACTION_DIGITS)]
        })
        .unwrap_or("0");

    let normalized = format!("{}T{}.{}", date, time, fraction);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H-%M-%S%.f").ok()
}

/// Stable, total ordering: timestamp first, file name as tie-breaker.
/// Snapshots without a timestamp sort after every timestamped one.
pub fn sort_snapshots(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file_name.cmp(&b.file_name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.file_name.cmp(&b.file_name),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn test_extract_timestamp() {
        let ts = extract_timestamp("data_2024-09-12T14-33-21.123456.yaml").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 9, 12)
            .unwrap()
            .and_hms_micro_opt(14, 33, 21, 123456)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_long_fraction_truncated() {
        let ts = extract_timestamp("data_2024-09-12T14-33-21.123456789.yaml").unwrap();
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_short_fraction_and_colons() {
        let ts = extract_timestamp("data_2024-09-12T14:33:21.5.yaml").unwrap();
        assert_eq!(ts.nanosecond(), 500_000_000);
        assert_eq!(ts.second(), 21);
    }

    #[test]
    fn test_no_timestamp() {
        assert!(extract_timestamp("notes.yaml").is_none());
        assert!(extract_timestamp("data_2024-13-45T99-00-00.1.yaml").is_none());
        assert!(extract_timestamp("data_2024-09-12.yaml").is_none());
    }

    #[test]
    fn test_sort_is_total() {
        let mut snaps = vec![
            Snapshot::new("b.yaml", None),
            Snapshot::new(
                "data_2024-09-12T14-33-22.0.yaml",
                extract_timestamp("data_2024-09-12T14-33-22.0.yaml"),
            ),
            Snapshot::new(
                "data_2024-09-12T14-33-21.9.yaml",
                extract_timestamp("data_2024-09-12T14-33-21.9.yaml"),
            ),
            Snapshot::new("a.yaml", None),
        ];
        sort_snapshots(&mut snaps);
        let names: Vec<_> = snaps.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "data_2024-09-12T14-33-21.9.yaml",
                "data_2024-09-12T14-33-22.0.yaml",
                "a.yaml",
                "b.yaml"
            ]
        );
    }
}
