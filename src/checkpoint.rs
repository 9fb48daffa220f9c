use crate::combinatorics::{CaseCount, Gidx};
use std::fs;
use std::path::Path;

/// Read the last completed global index from an offset's state file.
///
/// The worker rewrites this file while we read it, so anything short of a
/// clean leading integer (missing file, empty file, torn write, garbage) is
/// treated as "no checkpoint yet" rather than an error. Global indices are
/// non-negative, so a signed token such as `-4` is garbage too and the offset
/// reads as not started.
pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> Option<Gidx> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "checkpoint unreadable");
            return None;
        }
    };

    let token = text.split_whitespace().next()?;
    match token.parse::<Gidx>() {
        Ok(gidx) => Some(gidx),
        Err(_) => {
            tracing::debug!(path = %path.display(), token, "checkpoint token is not an integer");
            None
        }
    }
}

/// Cases finished by an offset given its checkpoint: `offset, offset + stride,
/// ..., last_gidx` inclusive. A checkpoint outside the offset's residue class
/// is not trusted and counts as nothing done, as is one so large the count
/// itself would overflow.
pub fn cases_done_for_offset(last_gidx: Option<Gidx>, offset: u64, stride: u64) -> CaseCount {
    let Some(last) = last_gidx else {
        return 0;
    };
    let offset = Gidx::from(offset);
    let stride = Gidx::from(stride);
    if stride == 0 || last < offset {
        return 0;
    }
    let span = last - offset;
    if span % stride != 0 {
        return 0;
    }
    match (span / stride).checked_add(1) {
        Some(done) => done,
        None => {
            tracing::debug!(last = %last, stride = %stride, "checkpoint count overflows");
            0
        }
    }
}
