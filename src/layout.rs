use crate::combinatorics::JobDescriptor;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const QUEUE_STATES: [&str; 4] = ["pending", "running", "done", "failed"];
const QUEUE_ENTRY_EXTENSION: &str = "env";

/// Keep alphanumerics and `._-`, replace everything else with `_`, the same
/// way the sage script names its state files.
pub fn sanitize_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Where a jobset's artifacts live on disk.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    /// Directory holding `state_*.txt` checkpoint files.
    pub notebook_dir: PathBuf,
    /// Project `var/` directory holding `<jobset>/log` and `<jobset>/queue`.
    pub var_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(notebook_dir: impl Into<PathBuf>, var_dir: impl Into<PathBuf>) -> Self {
        Self {
            notebook_dir: notebook_dir.into(),
            var_dir: var_dir.into(),
        }
    }

    pub fn state_file(&self, job: &JobDescriptor, offset: u64) -> PathBuf {
        self.notebook_dir.join(format!(
            "state_{}_r{}_stride{}_off{}.txt",
            sanitize_for_filename(&job.graph),
            job.rank,
            job.stride,
            offset
        ))
    }

    pub fn log_dir(&self, jobset: &str) -> PathBuf {
        self.var_dir.join(jobset).join("log")
    }

    pub fn log_file(&self, jobset: &str, offset: u64) -> PathBuf {
        self.log_dir(jobset).join(format!("{}_off{}.log", jobset, offset))
    }

    pub fn queue_dir(&self, jobset: &str) -> PathBuf {
        self.var_dir.join(jobset).join("queue")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

fn count_entries(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = %dir.display(), error = %e, "queue dir unreadable");
            return 0;
        }
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == QUEUE_ENTRY_EXTENSION))
        .count()
}

/// Count queued job files per state. Missing directories count as empty.
pub fn scan_queue_dirs(layout: &ArtifactLayout, jobset: &str) -> QueueCounts {
    let queue = layout.queue_dir(jobset);
    let [pending, running, done, failed] = QUEUE_STATES.map(|state| count_entries(&queue.join(state)));
    QueueCounts {
        pending,
        running,
        done,
        failed,
    }
}
