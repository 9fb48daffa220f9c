use crate::attribution::{AttributionResult, WorkerId};
use crate::combinatorics::{CaseCount, JobDescriptor};
use crate::layout::QueueCounts;
use crate::progress::{EtaEstimate, JobProgress, OffsetState};
use crate::reconcile::Reconciliation;
use crate::ProgressError;
use serde::Serialize;
use std::fmt::{self, Write};

/// Render seconds as `1h02m03s`, `2m03s` or `3s`. Negative input clamps to 0.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (m, s) = (total / 60, total % 60);
    let (h, m) = (m / 60, m % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRow {
    pub worker: WorkerId,
    pub unknown: bool,
    pub cases: usize,
    pub pct_of_total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overall {
    pub cases_done: CaseCount,
    pub total_cases: CaseCount,
    pub cases_remaining: CaseCount,
    pub pct_complete: f64,
}

/// The log-derived section, present only when attribution was requested.
#[derive(Debug, Clone, Serialize)]
pub struct LogBreakdown {
    pub workers: Vec<WorkerRow>,
    pub reconciliation: Reconciliation,
}

/// Everything one run reports, in a form that serializes cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport<'a> {
    pub job: &'a JobDescriptor,
    pub queue: QueueCounts,
    pub overall: Overall,
    pub offsets: &'a [OffsetState],
    pub eta: Option<EtaEstimate>,
    pub log_breakdown: Option<LogBreakdown>,
}

impl<'a> ProgressReport<'a> {
    pub fn new(
        progress: &'a JobProgress,
        queue: QueueCounts,
        logs: Option<(&AttributionResult, Reconciliation)>,
    ) -> Self {
        let total = progress.job.total_cases;
        let log_breakdown = logs.map(|(attribution, reconciliation)| LogBreakdown {
            workers: attribution
                .worker_counts()
                .into_iter()
                .map(|(worker, cases)| WorkerRow {
                    worker,
                    unknown: worker.is_unknown(),
                    cases,
                    pct_of_total: pct(cases as CaseCount, total),
                })
                .collect(),
            reconciliation,
        });

        Self {
            job: &progress.job,
            queue,
            overall: Overall {
                cases_done: progress.cases_done(),
                total_cases: total,
                cases_remaining: progress.cases_remaining(),
                pct_complete: progress.pct_complete(),
            },
            offsets: &progress.offsets,
            eta: progress.eta(),
            log_breakdown,
        }
    }

    pub fn to_json(&self) -> Result<String, ProgressError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }

    fn write_text<W: Write>(&self, out: &mut W) -> fmt::Result {
        let job = self.job;
        let rule = "=".repeat(80);
        writeln!(out, "{}", rule)?;
        writeln!(out, "Jobset: {}", job.jobset)?;
        writeln!(out, "Graph:  {} (N={})", job.graph, job.n_vertices)?;
        writeln!(out, "Rank:   ≤ {} (dim={}, kdim={})", job.rank, job.dim, job.kdim)?;
        writeln!(out, "Total:  C({},{}) = {}", job.dim, job.kdim, job.total_cases)?;
        writeln!(out, "Stride: {}", job.stride)?;
        writeln!(out, "{}", rule)?;

        let q = &self.queue;
        writeln!(
            out,
            "\nQueue: pending={} running={} done={} failed={}",
            q.pending, q.running, q.done, q.failed
        )?;

        let o = &self.overall;
        writeln!(
            out,
            "\nOverall: {}/{} ({:.1}%) | remaining: {}",
            o.cases_done, o.total_cases, o.pct_complete, o.cases_remaining
        )?;

        let header = format!(
            "{:>3} {:>11} {:>6} {:>6} {:>6} {:>8} {:>7} {:>19}",
            "Off", "Status", "Done", "Total", "Pct", "LastGidx", "AvgDt", "LastActive"
        );
        writeln!(out, "\n{}", header)?;
        writeln!(out, "{}", "-".repeat(header.chars().count()))?;
        for state in self.offsets {
            write_offset_row(out, state)?;
        }

        if let Some(eta) = &self.eta {
            writeln!(
                out,
                "\nETA (slowest offset): ~{} (avg {:.1}s/case, max_remaining={})",
                format_duration(eta.seconds),
                eta.mean_duration,
                eta.max_remaining
            )?;
        }

        if let Some(logs) = &self.log_breakdown {
            writeln!(out, "\nCases completed by systemd worker id (best-effort from logs, unique gidx):")?;
            if logs.workers.is_empty() {
                writeln!(out, "  (no DONE lines found in logs)")?;
            }
            for row in &logs.workers {
                writeln!(
                    out,
                    "  {:<8} {:>4}  ({:5.1}%)",
                    row.worker.to_string(),
                    row.cases,
                    row.pct_of_total
                )?;
            }

            let rec = &logs.reconciliation;
            if rec.log_unique > 0 {
                writeln!(out, "\nLog-derived unique cases: {}/{}", rec.log_unique, job.total_cases)?;
            }
            if rec.needs_note() {
                writeln!(out, "NOTE: state-file progress and log-derived unique gidx differ.")?;
                writeln!(
                    out,
                    "      State files are canonical; logs may be truncated or missing DONE lines."
                )?;
            }
        }

        writeln!(out)
    }
}

impl fmt::Display for ProgressReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_text(f)
    }
}

fn write_offset_row<W: Write>(out: &mut W, state: &OffsetState) -> fmt::Result {
    let last_gidx = state
        .last_gidx
        .map(|g| g.to_string())
        .unwrap_or_else(|| "-".to_string());
    let avg_dt = state
        .mean_duration()
        .map(|d| format!("{:5.1}s", d))
        .unwrap_or_else(|| "-".to_string());
    let last_active = state
        .last_activity
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| "-".to_string());

    writeln!(
        out,
        "{:>3} {:>11} {:>6} {:>6} {:>5.1}% {:>8} {:>7} {:>19}",
        state.offset,
        state.status,
        state.cases_done,
        state.cases_total,
        state.pct_complete(),
        last_gidx,
        avg_dt,
        last_active
    )
}

fn pct(part: CaseCount, whole: CaseCount) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}
