use forktrack_core::error::{TrackError, VcsError};
use forktrack_core::types::RevisionRange;
use forktrack_vcs::VcsAdapter;
use tracing::debug;

/// The three-way split of an old and a new version of the same named range:
/// the region both cover, plus the sub-ranges only one of them covers.
///
/// "Head" sub-ranges sit above the common end (newer history), "tail"
/// sub-ranges below the common start (older history). Any of the four may be
/// absent when the corresponding boundary did not move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDelta {
    pub common: RevisionRange,
    /// Old revisions above the common end, no longer in the new range.
    pub excluded_head: Option<RevisionRange>,
    /// Old revisions below the common start.
    pub excluded_tail: Option<RevisionRange>,
    /// Revisions newly above the common end.
    pub included_head: Option<RevisionRange>,
    /// Revisions newly below the common start.
    pub included_tail: Option<RevisionRange>,
}

impl RangeDelta {
    pub fn excluded(&self) -> impl Iterator<Item = &RevisionRange> {
        self.excluded_head.iter().chain(self.excluded_tail.iter())
    }

    pub fn included(&self) -> impl Iterator<Item = &RevisionRange> {
        self.included_head.iter().chain(self.included_tail.iter())
    }
}

/// Split `old` and `new` into their common region and the exclusive
/// sub-ranges, so an incremental re-track only has to look at the delta.
pub fn compute_delta<B: VcsAdapter>(
    backend: &B,
    old: &RevisionRange,
    new: &RevisionRange,
) -> Result<RangeDelta, TrackError> {
    let (common_start, common_end) = common_region(backend, old, new)?;
    let common = RevisionRange {
        start: common_start.clone(),
        end: common_end.clone(),
    };
    let delta = RangeDelta {
        excluded_head: head_range(&common_end, &old.end),
        excluded_tail: tail_range(&old.start, &common_start),
        included_head: head_range(&common_end, &new.end),
        included_tail: tail_range(&new.start, &common_start),
        common,
    };
    debug!(old = %old, new = %new, ?delta, "computed range delta");
    Ok(delta)
}

/// The boundaries of the history shared by both ranges.
///
/// The common end is the syntactically shared end reference, or else the
/// merge-base of the two ends; unrelated ends are a `NoCommonHistory` error,
/// which consumers treat as "everything changed".
pub fn common_region<B: VcsAdapter>(
    backend: &B,
    a: &RevisionRange,
    b: &RevisionRange,
) -> Result<(Option<String>, String), TrackError> {
    let common_end = if a.end == b.end {
        a.end.clone()
    } else {
        backend
            .merge_base(&a.end, &b.end)
            .map_err(TrackError::Vcs)?
            .ok_or_else(|| TrackError::NoCommonHistory {
                old_end: a.end.clone(),
                new_end: b.end.clone(),
            })?
    };

    let common_start = if a.start == b.start {
        a.start.clone()
    } else {
        Some(common_start_of(backend, a, b, &common_end)?)
    };
    Ok((common_start, common_end))
}

/// The oldest revision both ranges' first-parent chains agree on, walking
/// both chains tail-aligned from their oldest entries upward. When the
/// chains never align positionally (one is a strict prefix of the other,
/// the usual case for a moved boundary), the oldest entry of the shorter
/// chain is the conservative answer.
fn common_start_of<B: VcsAdapter>(
    backend: &B,
    a: &RevisionRange,
    b: &RevisionRange,
    common_end: &str,
) -> Result<String, VcsError> {
    let chain_a = backend.first_parent_chain(&RevisionRange {
        start: a.start.clone(),
        end: common_end.to_string(),
    })?;
    let chain_b = backend.first_parent_chain(&RevisionRange {
        start: b.start.clone(),
        end: common_end.to_string(),
    })?;
    let (shorter, longer) = if chain_a.len() <= chain_b.len() {
        (&chain_a, &chain_b)
    } else {
        (&chain_b, &chain_a)
    };

    for idx_from_tail in 0..shorter.len() {
        let s = &shorter[shorter.len() - 1 - idx_from_tail];
        let l = &longer[longer.len() - 1 - idx_from_tail];
        if s == l {
            return Ok(s.clone());
        }
    }
    shorter
        .last()
        .cloned()
        .ok_or_else(|| VcsError::Git(format!("empty first-parent chain below {common_end}")))
}

fn head_range(common_end: &str, outer_end: &str) -> Option<RevisionRange> {
    if common_end == outer_end {
        return None;
    }
    Some(RevisionRange::bounded(common_end, outer_end))
}

fn tail_range(outer_start: &Option<String>, common_start: &Option<String>) -> Option<RevisionRange> {
    let common_start = common_start.as_ref()?;
    if outer_start.as_deref() == Some(common_start.as_str()) {
        return None;
    }
    Some(RevisionRange {
        start: outer_start.clone(),
        end: common_start.clone(),
    })
}
