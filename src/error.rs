use std::path::PathBuf;

/// Fatal configuration problems. Artifact read anomalies never end up here:
/// they collapse to "absent" or empty results at the read site.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Unknown graph: {graph} (provide --n)")]
    UnknownGraph { graph: String },

    #[error("Missing {flag} (or provide {fallback} in env file)")]
    MissingConfig {
        flag: &'static str,
        fallback: &'static str,
    },

    #[error("Invalid {field}: {value:?}")]
    InvalidConfig { field: &'static str, value: String },

    #[error("Rank {rank} exceeds dim {dim} (n_vertices - 1)")]
    InvalidRank { rank: u32, dim: u32 },

    #[error("Case space C({dim},{kdim}) does not fit in 128 bits")]
    CaseSpaceOverflow { dim: u32, kdim: u32 },

    #[error("Failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
