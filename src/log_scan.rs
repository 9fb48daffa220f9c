//! Best-effort extraction of timing data from an offset's worker log.
//!
//! Only a bounded tail of the log is considered. Lines that do not match, or
//! whose timestamp/duration does not parse, are skipped: the log is written by
//! another process and may be interleaved or truncated at any point.

use crate::combinatorics::Gidx;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Tail length used when the caller does not ask for something else.
pub const DEFAULT_LOG_MAX_LINES: usize = 2000;

const ISO_TS: &str = r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:[+-]\d{2}:\d{2})?";

static DONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[(?P<ts>{ISO_TS})\]\s+DONE\s+.*\bgidx=(?P<gidx>\d+)\b.*\bdt=(?P<dt>\d+\.?\d*)s\b"
    ))
    .expect("DONE pattern is valid")
});

static TS_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^\[(?P<ts>{ISO_TS})\]")).expect("timestamp pattern is valid"));

/// Timestamp as written by the worker: with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTimestamp {
    Naive(NaiveDateTime),
    Offset(DateTime<FixedOffset>),
}

impl LogTimestamp {
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%:z") {
            return Some(LogTimestamp::Offset(ts));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(LogTimestamp::Naive)
    }
}

impl fmt::Display for LogTimestamp {
    /// ISO-8601 truncated to whole seconds.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTimestamp::Naive(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S")),
            LogTimestamp::Offset(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%:z")),
        }
    }
}

impl Serialize for LogTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One `DONE` line: when it was logged, which case, how long the case took.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub timestamp: LogTimestamp,
    pub gidx: Gidx,
    pub duration_secs: f64,
}

impl CompletionEvent {
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = DONE_RE.captures(line)?;
        Some(Self {
            timestamp: LogTimestamp::parse(&caps["ts"])?,
            gidx: caps["gidx"].parse().ok()?,
            duration_secs: caps["dt"].parse().ok()?,
        })
    }
}

/// The last `max_lines` lines of a log, decoded lossily.
#[derive(Debug, Clone, Default)]
pub struct LogTail {
    lines: Vec<String>,
}

impl LogTail {
    /// Read the tail of `path`. A missing or unreadable file yields an empty
    /// tail.
    pub fn read<P: AsRef<Path>>(path: P, max_lines: usize) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => Self::from_text(&String::from_utf8_lossy(&bytes), max_lines),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "log unreadable");
                Self::default()
            }
        }
    }

    pub fn from_text(text: &str, max_lines: usize) -> Self {
        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(max_lines);
        Self {
            lines: all[start..].iter().map(|l| (*l).to_string()).collect(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Completion events in file order.
    pub fn completion_events(&self) -> Vec<CompletionEvent> {
        self.lines().filter_map(CompletionEvent::parse_line).collect()
    }

    /// Timestamp of the line nearest the end that starts with a parseable
    /// bracketed timestamp.
    pub fn last_activity(&self) -> Option<LogTimestamp> {
        self.lines.iter().rev().find_map(|line| {
            let caps = TS_BRACKET_RE.captures(line)?;
            LogTimestamp::parse(&caps["ts"])
        })
    }
}

/// Durations of the most recent `window` completion events, oldest first.
pub fn recent_durations(events: &[CompletionEvent], window: usize) -> Vec<f64> {
    let start = events.len().saturating_sub(window);
    events[start..].iter().map(|e| e.duration_secs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    const SAMPLE: &str = "\
[worker 3] start offset=0 stride=4
[2024-05-01T10:00:00] START gidx=0
[2024-05-01T10:00:12.5] DONE rank=3 gidx=0 sat=False dt=12.5s
[2024-05-01T10:00:13] START gidx=4
[2024-05-01T10:00:20+02:00] DONE gidx=4 dt=7s
[2024-05-01T10:00:21] DONE gidx=8 sat=False
[2024-05-01T10:00:22] DONE dt=3.0s
noise line
[worker 3] done offset=0
";

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tail = LogTail::read(dir.path().join("missing.log"), 100);
        assert!(tail.is_empty());
        assert!(tail.completion_events().is_empty());
        assert_eq!(tail.last_activity(), None);
    }

    #[test]
    fn test_only_complete_done_lines_become_events() {
        let tail = LogTail::from_text(SAMPLE, 100);
        let events = tail.completion_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].gidx, 0);
        assert_eq!(events[0].duration_secs, 12.5);
        assert_eq!(events[1].gidx, 4);
        assert_eq!(events[1].duration_secs, 7.0);
        assert!(matches!(events[1].timestamp, LogTimestamp::Offset(_)));
    }

    #[test]
    fn test_fractional_naive_timestamp_parses() {
        let ts = LogTimestamp::parse("2024-05-01T10:00:12.5").unwrap();
        let LogTimestamp::Naive(naive) = ts else {
            panic!("expected naive timestamp");
        };
        assert_eq!(naive.date(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(naive.second(), 12);
        assert_eq!(ts.to_string(), "2024-05-01T10:00:12");
    }

    #[test]
    fn test_impossible_timestamp_is_skipped() {
        let tail = LogTail::from_text("[2024-13-40T10:00:00] DONE gidx=1 dt=2s\n", 10);
        assert!(tail.completion_events().is_empty());
        assert_eq!(tail.last_activity(), None);
    }

    #[test]
    fn test_tail_window_drops_older_lines() {
        let tail = LogTail::from_text(SAMPLE, 5);
        let events = tail.completion_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].gidx, 4);
    }

    #[test]
    fn test_last_activity_prefers_latest_timestamp() {
        let tail = LogTail::from_text(SAMPLE, 100);
        let last = tail.last_activity().unwrap();
        assert_eq!(last.to_string(), "2024-05-01T10:00:22");
    }

    #[test]
    fn test_last_activity_skips_unparseable_trailing_stamp() {
        let text = "[2024-05-01T10:00:00] START\n[2024-02-30T00:00:00] START\n";
        let tail = LogTail::from_text(text, 100);
        assert_eq!(tail.last_activity().unwrap().to_string(), "2024-05-01T10:00:00");
    }

    #[test]
    fn test_offset_timestamp_keeps_offset_in_display() {
        let ts = LogTimestamp::parse("2024-05-01T10:00:20.123+02:00").unwrap();
        assert_eq!(ts.to_string(), "2024-05-01T10:00:20+02:00");
    }

    #[test]
    fn test_recent_durations_keeps_newest_window() {
        let text: String = (0..60)
            .map(|i| format!("[2024-05-01T10:00:00] DONE gidx={} dt={}s\n", i, i))
            .collect();
        let events = LogTail::from_text(&text, 1000).completion_events();
        let recent = recent_durations(&events, 50);
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0], 10.0);
        assert_eq!(recent[49], 59.0);
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("off0.log");
        let mut bytes = b"[2024-05-01T10:00:00] DONE gidx=9 dt=1.5s\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(&path, bytes).unwrap();

        let tail = LogTail::read(&path, 100);
        assert_eq!(tail.completion_events().len(), 1);
    }
}
