use crate::attribution::AttributionResult;
use crate::combinatorics::CaseCount;
use crate::progress::JobProgress;
use serde::Serialize;

/// How the log-derived unique case count relates to the checkpoint count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "by", rename_all = "snake_case")]
pub enum Divergence {
    /// No completion events were found in any log tail.
    NoLogData,
    Agree,
    /// Logs account for this many fewer cases than the checkpoints.
    LogsBehind(CaseCount),
    /// Logs account for this many more cases than the checkpoints.
    LogsAhead(CaseCount),
}

/// Checkpoints and logs side by side. Checkpoints are canonical; the log
/// figure is only ever reported, never used to correct them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub checkpoint_done: CaseCount,
    pub log_unique: CaseCount,
    pub divergence: Divergence,
}

impl Reconciliation {
    pub fn needs_note(&self) -> bool {
        matches!(
            self.divergence,
            Divergence::LogsBehind(_) | Divergence::LogsAhead(_)
        )
    }
}

pub fn reconcile(progress: &JobProgress, attribution: &AttributionResult) -> Reconciliation {
    let checkpoint_done = progress.cases_done();
    let log_unique = attribution.unique_cases() as CaseCount;

    let divergence = if attribution.is_empty() {
        Divergence::NoLogData
    } else if log_unique == checkpoint_done {
        Divergence::Agree
    } else if log_unique < checkpoint_done {
        Divergence::LogsBehind(checkpoint_done - log_unique)
    } else {
        Divergence::LogsAhead(log_unique - checkpoint_done)
    };

    if let Divergence::LogsBehind(n) | Divergence::LogsAhead(n) = divergence {
        tracing::info!(%checkpoint_done, %log_unique, gap = %n, "state files and logs disagree");
    }

    Reconciliation {
        checkpoint_done,
        log_unique,
        divergence,
    }
}
