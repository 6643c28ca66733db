use crate::resolver::TitleResolver;
use forktrack_core::error::VcsError;
use forktrack_core::types::{Backport, Commit, FollowupEdge, RevisionRange, TrackResult};
use forktrack_vcs::VcsAdapter;
use tracing::debug;

/// Which part of the tree to scan for follow-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileScope {
    /// Only upstream revisions touching the files the tracked commit touched.
    Touched,
    /// The whole tree history.
    AllFiles,
}

/// Scan the upstream history newer than `commit` for follow-up fixes and
/// mentions, and mark each found edge with its downstream backport (a
/// same-titled commit in `downstream`) when one exists.
pub fn scan<B: VcsAdapter>(
    backend: &B,
    resolver: &mut TitleResolver,
    commit: &Commit,
    upstream: &RevisionRange,
    downstream: &RevisionRange,
    scope: FileScope,
) -> Result<TrackResult, VcsError> {
    let paths = scope_paths(backend, commit, scope)?;
    let mut result = TrackResult::anchored(commit.clone());
    let candidates = backend.list_revisions(
        &RevisionRange::bounded(commit.hash.clone(), upstream.end.clone()),
        &paths,
    )?;
    debug!(title = %commit.title, candidates = candidates.len(), "scanning for followups");
    for hash in candidates {
        classify_into(backend, resolver, commit, &hash, downstream, &mut result)?;
    }
    Ok(result)
}

pub(crate) fn scope_paths<B: VcsAdapter>(
    backend: &B,
    commit: &Commit,
    scope: FileScope,
) -> Result<Vec<String>, VcsError> {
    match scope {
        FileScope::Touched => backend.touched_paths(&commit.hash),
        FileScope::AllFiles => Ok(Vec::new()),
    }
}

/// Classify one upstream revision against the tracked commit and append the
/// resulting edge, if any. Fixes take precedence over mentions.
pub(crate) fn classify_into<B: VcsAdapter>(
    backend: &B,
    resolver: &mut TitleResolver,
    tracked: &Commit,
    hash: &str,
    downstream: &RevisionRange,
    result: &mut TrackResult,
) -> Result<(), VcsError> {
    let candidate = backend.show_metadata(hash)?;
    let edges = if candidate.is_fix_of(tracked) {
        &mut result.fixes
    } else if candidate.mentions(tracked) {
        &mut result.mentions
    } else {
        return Ok(());
    };
    let backport = resolver
        .resolve(backend, &candidate.title, downstream)?
        .map(Backport::Hash);
    edges.push(FollowupEdge {
        commit: candidate,
        backport,
    });
    Ok(())
}
