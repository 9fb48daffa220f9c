use crate::ProgressError;
use serde::Serialize;

/// Position in the enumeration of all cases of a job.
pub type Gidx = u128;
/// Count of cases; wide enough for any binomial we are willing to enumerate.
pub type CaseCount = u128;

/// Graphs the sage jobs are routinely run against.
const KNOWN_GRAPHS: &[(&str, u32)] = &[("shrikhande", 16), ("rook", 16), ("petersen", 10)];

pub fn known_vertex_count(graph: &str) -> Option<u32> {
    KNOWN_GRAPHS
        .iter()
        .find(|(name, _)| *name == graph)
        .map(|(_, n)| *n)
}

/// Resolve the vertex count, preferring an explicit override over the registry.
pub fn resolve_vertex_count(graph: &str, n_override: Option<u32>) -> Result<u32, ProgressError> {
    n_override
        .or_else(|| known_vertex_count(graph))
        .ok_or_else(|| ProgressError::UnknownGraph {
            graph: graph.to_string(),
        })
}

/// Exact C(n, k). Returns `None` when the result does not fit in a `u128`.
pub fn binomial(n: u32, k: u32) -> Option<CaseCount> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let n = CaseCount::from(n);
    let mut acc: CaseCount = 1;
    for i in 0..CaseCount::from(k) {
        // acc == C(n, i) here, so acc * (n - i) is divisible by i + 1
        acc = acc.checked_mul(n - i)? / (i + 1);
    }
    Some(acc)
}

/// Number of global indices `i` with `i % stride == offset` and `i < total`.
pub fn cases_for_offset(offset: u64, stride: u64, total: CaseCount) -> CaseCount {
    let offset = CaseCount::from(offset);
    let stride = CaseCount::from(stride);
    if stride == 0 || offset >= total {
        return 0;
    }
    (total - offset).div_ceil(stride)
}

/// Immutable description of one jobset: which graph, which rank bound, how the
/// case space is cut into offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub jobset: String,
    pub graph: String,
    pub rank: u32,
    pub n_vertices: u32,
    pub dim: u32,
    pub kdim: u32,
    pub total_cases: CaseCount,
    pub stride: u64,
}

impl JobDescriptor {
    pub fn new(
        jobset: impl Into<String>,
        graph: impl Into<String>,
        rank: u32,
        n_override: Option<u32>,
        stride: u64,
    ) -> Result<Self, ProgressError> {
        let graph = graph.into();
        let n_vertices = resolve_vertex_count(&graph, n_override)?;
        Self::with_vertex_count(jobset, graph, rank, n_vertices, stride)
    }

    pub fn with_vertex_count(
        jobset: impl Into<String>,
        graph: impl Into<String>,
        rank: u32,
        n_vertices: u32,
        stride: u64,
    ) -> Result<Self, ProgressError> {
        if n_vertices == 0 {
            return Err(ProgressError::InvalidConfig {
                field: "n",
                value: n_vertices.to_string(),
            });
        }
        if stride == 0 {
            return Err(ProgressError::InvalidConfig {
                field: "stride",
                value: stride.to_string(),
            });
        }
        let dim = n_vertices - 1;
        let kdim = dim
            .checked_sub(rank)
            .ok_or(ProgressError::InvalidRank { rank, dim })?;
        let total_cases =
            binomial(dim, kdim).ok_or(ProgressError::CaseSpaceOverflow { dim, kdim })?;

        Ok(Self {
            jobset: jobset.into(),
            graph: graph.into(),
            rank,
            n_vertices,
            dim,
            kdim,
            total_cases,
            stride,
        })
    }

    pub fn cases_for_offset(&self, offset: u64) -> CaseCount {
        cases_for_offset(offset, self.stride, self.total_cases)
    }

    pub fn offsets(&self) -> std::ops::Range<u64> {
        0..self.stride
    }
}
