//! Heuristic attribution of completed cases to systemd worker ids.
//!
//! Worker ids only appear on the `[worker N] start/done/failed` lines around a
//! run, never on the `DONE` lines themselves, so each completion is credited to
//! whichever worker most recently started on that offset. None of this feeds
//! back into checkpoint-derived progress.

use crate::combinatorics::Gidx;
use crate::log_scan::{CompletionEvent, LogTail};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static WORKER_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[worker\s+(?P<wid>\d+)\]\s+start\s+offset=(?P<off>\d+)\b")
        .expect("worker start pattern is valid")
});

static WORKER_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[worker\s+(?P<wid>\d+)\]\s+(?:done|failed)\s+offset=(?P<off>\d+)\b")
        .expect("worker end pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl WorkerId {
    /// Bucket for completions seen while no worker was running. Shares its
    /// value with a real worker 0 if one ever exists.
    pub const UNKNOWN: WorkerId = WorkerId(0);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "worker ?")
        } else {
            write!(f, "worker {}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionState {
    NoCurrentWorker,
    CurrentWorker(WorkerId),
}

impl AttributionState {
    fn credited_worker(self) -> WorkerId {
        match self {
            AttributionState::NoCurrentWorker => WorkerId::UNKNOWN,
            AttributionState::CurrentWorker(id) => id,
        }
    }
}

/// What the logs claim about who finished which cases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionResult {
    pub per_worker: FxHashMap<WorkerId, FxHashSet<Gidx>>,
    pub all_gidx: FxHashSet<Gidx>,
}

impl AttributionResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, worker: WorkerId, gidx: Gidx) {
        self.all_gidx.insert(gidx);
        self.per_worker.entry(worker).or_default().insert(gidx);
    }

    /// Replay one offset's log tail. The state machine starts fresh for every
    /// offset; the accumulated index sets are shared across calls.
    pub fn scan_offset_log(&mut self, tail: &LogTail) {
        let mut state = AttributionState::NoCurrentWorker;

        for line in tail.lines() {
            if let Some(caps) = WORKER_START_RE.captures(line) {
                state = match caps["wid"].parse() {
                    Ok(id) => AttributionState::CurrentWorker(WorkerId(id)),
                    Err(_) => AttributionState::NoCurrentWorker,
                };
                continue;
            }

            if let Some(event) = CompletionEvent::parse_line(line) {
                self.record(state.credited_worker(), event.gidx);
                continue;
            }

            if WORKER_END_RE.is_match(line) {
                state = AttributionState::NoCurrentWorker;
            }
        }
    }

    pub fn unique_cases(&self) -> usize {
        self.all_gidx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_gidx.is_empty()
    }

    /// `(worker, unique cases)` ordered by count descending, then id.
    pub fn worker_counts(&self) -> Vec<(WorkerId, usize)> {
        let mut rows: Vec<(WorkerId, usize)> = self
            .per_worker
            .iter()
            .map(|(wid, cases)| (*wid, cases.len()))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> AttributionResult {
        let mut result = AttributionResult::new();
        result.scan_offset_log(&LogTail::from_text(text, 1000));
        result
    }

    fn cases(result: &AttributionResult, wid: u64) -> Vec<Gidx> {
        let mut v: Vec<Gidx> = result
            .per_worker
            .get(&WorkerId(wid))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        v.sort();
        v
    }

    #[test]
    fn test_done_marker_ends_attribution_window() {
        let log = "\
[worker 3] start offset=0
[2024-05-01T10:00:00] DONE gidx=0 dt=1.0s
[2024-05-01T10:00:01] DONE gidx=4 dt=1.0s
[worker 3] done offset=0
[2024-05-01T10:00:02] DONE gidx=8 dt=1.0s
";
        let result = scan(log);
        assert_eq!(cases(&result, 3), vec![0, 4]);
        assert_eq!(cases(&result, 0), vec![8]);
        assert_eq!(result.unique_cases(), 3);
    }

    #[test]
    fn test_events_before_any_start_go_to_unknown() {
        let log = "\
[2024-05-01T10:00:00] DONE gidx=1 dt=1.0s
[worker 7] start offset=1
[2024-05-01T10:00:01] DONE gidx=5 dt=1.0s
";
        let result = scan(log);
        assert_eq!(cases(&result, 0), vec![1]);
        assert_eq!(cases(&result, 7), vec![5]);
    }

    #[test]
    fn test_restart_switches_worker_without_end_marker() {
        let log = "\
[worker 2] start offset=0
[2024-05-01T10:00:00] DONE gidx=0 dt=1.0s
[worker 5] start offset=0
[2024-05-01T10:00:01] DONE gidx=4 dt=1.0s
[worker 5] failed offset=0 rc=1
[2024-05-01T10:00:02] DONE gidx=8 dt=1.0s
";
        let result = scan(log);
        assert_eq!(cases(&result, 2), vec![0]);
        assert_eq!(cases(&result, 5), vec![4]);
        assert_eq!(cases(&result, 0), vec![8]);
    }

    #[test]
    fn test_repeated_gidx_counts_once() {
        let log = "\
[worker 1] start offset=0
[2024-05-01T10:00:00] DONE gidx=0 dt=1.0s
[2024-05-01T10:00:05] DONE gidx=0 dt=1.0s
";
        let result = scan(log);
        assert_eq!(cases(&result, 1), vec![0]);
        assert_eq!(result.unique_cases(), 1);
    }

    #[test]
    fn test_state_resets_between_offsets() {
        let mut result = AttributionResult::new();
        result.scan_offset_log(&LogTail::from_text(
            "[worker 4] start offset=0\n[2024-05-01T10:00:00] DONE gidx=0 dt=1s\n",
            100,
        ));
        result.scan_offset_log(&LogTail::from_text(
            "[2024-05-01T10:00:00] DONE gidx=1 dt=1s\n",
            100,
        ));
        assert_eq!(cases(&result, 4), vec![0]);
        assert_eq!(cases(&result, 0), vec![1]);
        assert_eq!(result.unique_cases(), 2);
    }

    #[test]
    fn test_oversized_worker_id_clears_current_worker() {
        let log = "\
[worker 9] start offset=0
[worker 99999999999999999999999] start offset=0
[2024-05-01T10:00:00] DONE gidx=3 dt=1s
";
        let result = scan(log);
        assert_eq!(cases(&result, 0), vec![3]);
        assert!(cases(&result, 9).is_empty());
    }

    #[test]
    fn test_worker_counts_sorted_by_count_then_id() {
        let log = "\
[worker 2] start offset=0
[2024-05-01T10:00:00] DONE gidx=0 dt=1s
[worker 9] start offset=0
[2024-05-01T10:00:00] DONE gidx=4 dt=1s
[2024-05-01T10:00:00] DONE gidx=8 dt=1s
[worker 1] start offset=0
[2024-05-01T10:00:00] DONE gidx=12 dt=1s
";
        let result = scan(log);
        assert_eq!(
            result.worker_counts(),
            vec![(WorkerId(9), 2), (WorkerId(1), 1), (WorkerId(2), 1)]
        );
    }

    #[test]
    fn test_worker_display_labels_unknown() {
        assert_eq!(WorkerId(0).to_string(), "worker ?");
        assert_eq!(WorkerId(12).to_string(), "worker 12");
    }
}
