pub mod attribution;
pub mod checkpoint;
pub mod combinatorics;
pub mod config;
pub mod error;
pub mod layout;
pub mod log_scan;
pub mod progress;
pub mod reconcile;
pub mod report;

pub use error::*;
pub use progress::{analyze_job, attribute_job, JobProgress, OffsetState, OffsetStatus};

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG` (default `warn`),
/// keeping stdout free for the report.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_ok() {
        tracing::debug!(service = service_name, "tracing initialised");
    }
}
