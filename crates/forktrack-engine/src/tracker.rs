use crate::delta::{self, RangeDelta};
use crate::resolver::TitleResolver;
use crate::scanner::{self, FileScope};
use forktrack_core::error::{TrackError, VcsError};
use forktrack_core::ignore::IgnoreRules;
use forktrack_core::types::{
    Backport, Commit, FollowupEdge, RevisionRange, TrackResult, TrackResults, UpstreamAnchor,
    short_hash,
};
use forktrack_vcs::VcsAdapter;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Previous-run state, with boundary refs substituted by the hashes recorded
/// at checkpoint time so deltas are computed against the history the
/// checkpoint actually covered, even if the refs have since moved.
struct Previous {
    results: TrackResults,
    upstream: RevisionRange,
    downstream: RevisionRange,
}

/// Once-per-run memo of computations that are range-pair-invariant and
/// shared across titles.
#[derive(Default)]
struct RunContext {
    upstream_delta: Option<Option<RangeDelta>>,
    downstream_delta: Option<Option<RangeDelta>>,
    boundaries_unchanged: Option<bool>,
}

/// Orchestrates per-title tracking: from-scratch scans for unseen titles,
/// verbatim reuse when the range boundaries are unchanged, and incremental
/// delta updates when they moved.
pub struct Tracker<'a, B: VcsAdapter> {
    backend: &'a B,
    upstream: RevisionRange,
    downstream: RevisionRange,
    downstream_prefix: Option<String>,
    scope: FileScope,
    ignore: IgnoreRules,
    previous: Option<Previous>,
    resolver: TitleResolver,
    ref_cache: HashMap<String, String>,
    run: RunContext,
}

impl<'a, B: VcsAdapter> Tracker<'a, B> {
    pub fn new(backend: &'a B, upstream: RevisionRange, downstream: RevisionRange) -> Self {
        Self {
            backend,
            upstream,
            downstream,
            downstream_prefix: None,
            scope: FileScope::Touched,
            ignore: IgnoreRules::default(),
            previous: None,
            resolver: TitleResolver::new(),
            ref_cache: HashMap::new(),
            run: RunContext::default(),
        }
    }

    pub fn with_scope(mut self, scope: FileScope) -> Self {
        self.scope = scope;
        self
    }

    /// Titles starting with `prefix` are reported downstream-only without a
    /// scan, even if a same-titled commit exists upstream.
    pub fn with_downstream_prefix(mut self, prefix: Option<String>) -> Self {
        self.downstream_prefix = prefix;
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_previous(mut self, results: TrackResults) -> Self {
        let upstream = recorded_range(&results.upstream, &results);
        let downstream = recorded_range(&results.downstream, &results);
        self.previous = Some(Previous {
            upstream,
            downstream,
            results,
        });
        self
    }

    /// Pre-populate the title cache for `range` from known `(hash, title)`
    /// pairs, newest first.
    pub fn seed_titles<'b>(
        &mut self,
        range: &RevisionRange,
        entries: impl IntoIterator<Item = (&'b str, &'b str)>,
    ) {
        self.resolver.seed(range, entries);
    }

    pub fn resolve_ref_cached(&mut self, reference: &str) -> Result<String, VcsError> {
        if let Some(hit) = self.ref_cache.get(reference) {
            return Ok(hit.clone());
        }
        let hash = self.backend.resolve_ref(reference)?;
        self.ref_cache.insert(reference.to_string(), hash.clone());
        Ok(hash)
    }

    /// Track one downstream title against the configured ranges.
    pub fn track(&mut self, title: &str) -> Result<TrackResult, TrackError> {
        if let Some(prefix) = &self.downstream_prefix
            && title.starts_with(prefix.as_str())
        {
            debug!(title, "downstream-only prefix, skipping scan");
            return Ok(TrackResult::downstream_only());
        }

        let prev_result = self
            .previous
            .as_ref()
            .and_then(|p| p.results.get(title))
            .cloned();
        let result = match prev_result {
            None => self.track_fresh(title)?,
            Some(prev) => {
                if self.boundaries_unchanged()? {
                    debug!(title, "boundaries unchanged, reusing previous result");
                    prev
                } else {
                    self.track_incremental(title, prev)?
                }
            }
        };
        self.apply_ignore(title, result)
    }

    fn track_fresh(&mut self, title: &str) -> Result<TrackResult, TrackError> {
        let backend = self.backend;
        let Some(hash) = self.resolver.resolve(backend, title, &self.upstream)? else {
            return Ok(TrackResult::downstream_only());
        };
        let commit = backend.show_metadata(&hash).map_err(TrackError::Vcs)?;
        scanner::scan(
            backend,
            &mut self.resolver,
            &commit,
            &self.upstream,
            &self.downstream,
            self.scope,
        )
        .map_err(TrackError::Vcs)
    }

    fn track_incremental(
        &mut self,
        title: &str,
        prev: TrackResult,
    ) -> Result<TrackResult, TrackError> {
        let backend = self.backend;

        let Some(up_delta) = self.upstream_delta()? else {
            return self.track_fresh(title);
        };

        // The title itself may have fallen out of the upstream range.
        for range in up_delta.excluded() {
            if self.resolver.resolve(backend, title, range)?.is_some() {
                info!(title, "title left the upstream range, now downstream-only");
                return Ok(TrackResult::downstream_only());
            }
        }

        let mut result = prev;

        if result.upstream.is_none() {
            // Previously downstream-only; the title may have entered the
            // upstream through an included sub-range.
            for range in up_delta.included() {
                if self.resolver.resolve(backend, title, range)?.is_some() {
                    return self.track_fresh(title);
                }
            }
            return Ok(result);
        }

        // Checkpoint results carry no anchor hash; re-anchor from the title.
        let anchor = match &result.upstream {
            Some(UpstreamAnchor::Resolved(commit)) => commit.clone(),
            _ => {
                let Some(hash) = self.resolver.resolve(backend, title, &self.upstream)? else {
                    return Ok(TrackResult::downstream_only());
                };
                backend.show_metadata(&hash).map_err(TrackError::Vcs)?
            }
        };
        result.upstream = Some(UpstreamAnchor::Resolved(anchor.clone()));

        // Retract edges whose followup fell out of the upstream range.
        for range in up_delta.excluded() {
            self.drop_edges_resolving_in(&mut result.fixes, range)?;
            self.drop_edges_resolving_in(&mut result.mentions, range)?;
        }

        // Discover edges introduced by the included sub-ranges. The dedup
        // guard keeps re-running the delta update idempotent.
        let paths = scanner::scope_paths(backend, &anchor, self.scope).map_err(TrackError::Vcs)?;
        let mut seen: HashSet<String> = result
            .fixes
            .iter()
            .chain(result.mentions.iter())
            .map(|e| short_hash(&e.commit.hash).to_string())
            .collect();
        seen.insert(short_hash(&anchor.hash).to_string());

        if let Some(range) = up_delta.included_head.clone() {
            let fresh = self.scan_subrange(&anchor, &range, &paths, &mut seen)?;
            // Head inclusions are newer than everything already present;
            // splicing them in front preserves the newest-first order a
            // from-scratch scan would produce.
            splice_front(&mut result.fixes, fresh.fixes);
            splice_front(&mut result.mentions, fresh.mentions);
        }
        if let Some(range) = up_delta.included_tail.clone() {
            let fresh = self.scan_subrange(&anchor, &range, &paths, &mut seen)?;
            result.fixes.extend(fresh.fixes);
            result.mentions.extend(fresh.mentions);
        }

        // Downstream axis: only the backport slots move.
        let Some(down_delta) = self.downstream_delta()? else {
            return self.track_fresh(title);
        };
        for edge in result.fixes.iter_mut().chain(result.mentions.iter_mut()) {
            if edge.is_merged() {
                for range in down_delta.excluded() {
                    if self
                        .resolver
                        .resolve(backend, &edge.commit.title, range)?
                        .is_some()
                    {
                        debug!(edge = %edge.commit, "backport left the downstream range");
                        edge.backport = None;
                        break;
                    }
                }
            }
            if edge.backport.is_none() {
                for range in down_delta.included() {
                    if let Some(hash) =
                        self.resolver.resolve(backend, &edge.commit.title, range)?
                    {
                        edge.backport = Some(Backport::Hash(hash));
                        break;
                    }
                }
            }
        }

        Ok(result)
    }

    fn scan_subrange(
        &mut self,
        anchor: &Commit,
        range: &RevisionRange,
        paths: &[String],
        seen: &mut HashSet<String>,
    ) -> Result<TrackResult, TrackError> {
        let backend = self.backend;
        let mut fresh = TrackResult::anchored(anchor.clone());
        for hash in backend
            .list_revisions(range, paths)
            .map_err(TrackError::Vcs)?
        {
            if !seen.insert(short_hash(&hash).to_string()) {
                continue;
            }
            scanner::classify_into(
                backend,
                &mut self.resolver,
                anchor,
                &hash,
                &self.downstream,
                &mut fresh,
            )?;
        }
        Ok(fresh)
    }

    fn drop_edges_resolving_in(
        &mut self,
        edges: &mut Vec<FollowupEdge>,
        range: &RevisionRange,
    ) -> Result<(), TrackError> {
        let backend = self.backend;
        let mut kept = Vec::with_capacity(edges.len());
        for edge in edges.drain(..) {
            if self
                .resolver
                .resolve(backend, &edge.commit.title, range)?
                .is_some()
            {
                debug!(edge = %edge.commit, range = %range, "dropping stale followup edge");
            } else {
                kept.push(edge);
            }
        }
        *edges = kept;
        Ok(())
    }

    fn boundaries_unchanged(&mut self) -> Result<bool, TrackError> {
        if let Some(cached) = self.run.boundaries_unchanged {
            return Ok(cached);
        }
        let refs: Vec<String> = self
            .upstream
            .refs()
            .chain(self.downstream.refs())
            .map(str::to_string)
            .collect();
        let mut unchanged = self.previous.is_some();
        for reference in &refs {
            let recorded = self
                .previous
                .as_ref()
                .and_then(|p| p.results.ref_hash(reference))
                .map(str::to_string);
            match recorded {
                Some(hash) if self.resolve_ref_cached(reference)? == hash => {}
                _ => {
                    unchanged = false;
                    break;
                }
            }
        }
        self.run.boundaries_unchanged = Some(unchanged);
        Ok(unchanged)
    }

    fn upstream_delta(&mut self) -> Result<Option<RangeDelta>, TrackError> {
        if let Some(cached) = &self.run.upstream_delta {
            return Ok(cached.clone());
        }
        let computed = match &self.previous {
            Some(prev) => {
                Self::compute_axis_delta(self.backend, &prev.upstream, &self.upstream, "upstream")?
            }
            None => None,
        };
        self.run.upstream_delta = Some(computed.clone());
        Ok(computed)
    }

    fn downstream_delta(&mut self) -> Result<Option<RangeDelta>, TrackError> {
        if let Some(cached) = &self.run.downstream_delta {
            return Ok(cached.clone());
        }
        let computed = match &self.previous {
            Some(prev) => Self::compute_axis_delta(
                self.backend,
                &prev.downstream,
                &self.downstream,
                "downstream",
            )?,
            None => None,
        };
        self.run.downstream_delta = Some(computed.clone());
        Ok(computed)
    }

    fn compute_axis_delta(
        backend: &B,
        old: &RevisionRange,
        new: &RevisionRange,
        axis: &str,
    ) -> Result<Option<RangeDelta>, TrackError> {
        match delta::compute_delta(backend, old, new) {
            Ok(d) => Ok(Some(d)),
            Err(TrackError::NoCommonHistory { old_end, new_end }) => {
                warn!(axis, old_end, new_end, "no common history, full rescan");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ignore rules are a post-filter on the returned value, applied on
    /// every path: fresh, cached and incremental alike.
    fn apply_ignore(
        &mut self,
        title: &str,
        mut result: TrackResult,
    ) -> Result<TrackResult, TrackError> {
        if self.ignore.is_empty() || !result.has_followups() {
            return Ok(result);
        }
        let backend = self.backend;
        let Some(downstream_hash) = self.resolver.resolve(backend, title, &self.downstream)?
        else {
            return Ok(result);
        };
        let ignore = &self.ignore;
        let before = result.fixes.len() + result.mentions.len();
        result
            .fixes
            .retain(|e| !ignore.is_ignored(&downstream_hash, &e.commit.hash));
        result
            .mentions
            .retain(|e| !ignore.is_ignored(&downstream_hash, &e.commit.hash));
        let dropped = before - result.fixes.len() - result.mentions.len();
        if dropped > 0 {
            debug!(title, dropped, "suppressed ignored followups");
        }
        Ok(result)
    }
}

fn splice_front(edges: &mut Vec<FollowupEdge>, mut newer: Vec<FollowupEdge>) {
    if newer.is_empty() {
        return;
    }
    newer.append(edges);
    *edges = newer;
}

fn recorded_range(range: &RevisionRange, recorded: &TrackResults) -> RevisionRange {
    RevisionRange {
        start: range
            .start
            .as_ref()
            .map(|s| recorded.ref_hash(s).unwrap_or(s).to_string()),
        end: recorded
            .ref_hash(&range.end)
            .unwrap_or(&range.end)
            .to_string(),
    }
}
