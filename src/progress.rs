use crate::attribution::AttributionResult;
use crate::checkpoint::{cases_done_for_offset, read_checkpoint};
use crate::combinatorics::{CaseCount, Gidx, JobDescriptor};
use crate::layout::ArtifactLayout;
use crate::log_scan::{recent_durations, LogTail, LogTimestamp};
use serde::Serialize;
use std::fmt;

/// Number of most recent case durations kept per offset for rate estimates.
pub const RECENT_SAMPLE_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetStatus {
    Completed,
    NotStarted,
    Running,
}

impl OffsetStatus {
    pub fn classify(done: CaseCount, total: CaseCount, last_gidx: Option<Gidx>) -> Self {
        if total > 0 && done >= total {
            OffsetStatus::Completed
        } else if done == 0 && last_gidx.is_none() {
            OffsetStatus::NotStarted
        } else {
            // includes offsets that own no cases at all
            OffsetStatus::Running
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OffsetStatus::Completed => "completed",
            OffsetStatus::NotStarted => "not_started",
            OffsetStatus::Running => "running",
        }
    }
}

impl fmt::Display for OffsetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Snapshot of one offset, rebuilt from its artifacts on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetState {
    pub offset: u64,
    pub last_gidx: Option<Gidx>,
    pub cases_done: CaseCount,
    pub cases_total: CaseCount,
    pub status: OffsetStatus,
    pub last_activity: Option<LogTimestamp>,
    /// Seconds per case, oldest first, at most [`RECENT_SAMPLE_WINDOW`].
    pub recent_durations: Vec<f64>,
}

impl OffsetState {
    pub fn cases_remaining(&self) -> CaseCount {
        self.cases_total.saturating_sub(self.cases_done)
    }

    pub fn pct_complete(&self) -> f64 {
        if self.cases_total == 0 {
            return 100.0;
        }
        100.0 * self.cases_done as f64 / self.cases_total as f64
    }

    pub fn mean_duration(&self) -> Option<f64> {
        mean(&self.recent_durations)
    }
}

/// Completion estimate gated by the offset with the most work left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtaEstimate {
    pub seconds: f64,
    pub mean_duration: f64,
    pub max_remaining: CaseCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job: JobDescriptor,
    pub offsets: Vec<OffsetState>,
}

impl JobProgress {
    pub fn cases_done(&self) -> CaseCount {
        self.offsets
            .iter()
            .fold(0, |acc: CaseCount, o| acc.saturating_add(o.cases_done))
    }

    pub fn cases_remaining(&self) -> CaseCount {
        self.job.total_cases.saturating_sub(self.cases_done())
    }

    pub fn pct_complete(&self) -> f64 {
        if self.job.total_cases == 0 {
            return 100.0;
        }
        100.0 * self.cases_done() as f64 / self.job.total_cases as f64
    }

    pub fn offset(&self, offset: u64) -> Option<&OffsetState> {
        usize::try_from(offset).ok().and_then(|i| self.offsets.get(i))
    }

    /// `None` when nothing remains or no offset has logged a duration.
    pub fn eta(&self) -> Option<EtaEstimate> {
        if self.cases_remaining() == 0 {
            return None;
        }
        let pooled: Vec<f64> = self
            .offsets
            .iter()
            .flat_map(|o| o.recent_durations.iter().copied())
            .collect();
        let mean_duration = mean(&pooled)?;
        let max_remaining = self
            .offsets
            .iter()
            .map(OffsetState::cases_remaining)
            .max()
            .unwrap_or(0);

        Some(EtaEstimate {
            seconds: max_remaining as f64 * mean_duration,
            mean_duration,
            max_remaining,
        })
    }
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

#[tracing::instrument(level = "debug", skip(job, layout), fields(jobset = %job.jobset))]
fn analyze_offset(
    job: &JobDescriptor,
    layout: &ArtifactLayout,
    offset: u64,
    log_max_lines: usize,
) -> OffsetState {
    let last_gidx = read_checkpoint(layout.state_file(job, offset));
    let cases_total = job.cases_for_offset(offset);
    let cases_done = cases_done_for_offset(last_gidx, offset, job.stride);

    let tail = LogTail::read(layout.log_file(&job.jobset, offset), log_max_lines);
    let events = tail.completion_events();

    let state = OffsetState {
        offset,
        last_gidx,
        cases_done,
        cases_total,
        status: OffsetStatus::classify(cases_done, cases_total, last_gidx),
        last_activity: tail.last_activity(),
        recent_durations: recent_durations(&events, RECENT_SAMPLE_WINDOW),
    };
    tracing::debug!(
        status = %state.status,
        done = %state.cases_done,
        total = %state.cases_total,
        samples = state.recent_durations.len(),
        "offset analyzed"
    );
    state
}

/// Build the job-wide snapshot from each offset's checkpoint (authoritative
/// counts) and log tail (timing only).
pub fn analyze_job(job: &JobDescriptor, layout: &ArtifactLayout, log_max_lines: usize) -> JobProgress {
    let offsets = job
        .offsets()
        .map(|offset| analyze_offset(job, layout, offset, log_max_lines))
        .collect();

    JobProgress {
        job: job.clone(),
        offsets,
    }
}

/// Replay every offset's log tail into one fresh [`AttributionResult`].
/// Offsets without a log are skipped.
pub fn attribute_job(progress: &JobProgress, layout: &ArtifactLayout, log_max_lines: usize) -> AttributionResult {
    let mut result = AttributionResult::new();
    for state in &progress.offsets {
        let path = layout.log_file(&progress.job.jobset, state.offset);
        if !path.exists() {
            continue;
        }
        result.scan_offset_log(&LogTail::read(&path, log_max_lines));
    }
    result
}
