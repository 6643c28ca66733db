use std::collections::HashMap;
use std::fmt;

/// Display width of abbreviated hashes, matching the conventional
/// `Fixes: <12-char hash> ("<title>")` tag format.
pub const SHORT_HASH_LEN: usize = 12;

/// Truncate a hash to its display prefix.
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(SHORT_HASH_LEN)]
}

/// Immutable metadata of one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Full hash when loaded from the backend; may be the 12-char display
    /// prefix when reloaded from a checkpoint.
    pub hash: String,
    pub title: String,
    pub body: String,
}

impl Commit {
    pub fn new(
        hash: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }

    /// The `Fixes:` tag a follow-up commit would carry to point at this commit.
    pub fn fixes_tag(&self) -> String {
        format!("Fixes: {} (\"{}\")", self.short_hash(), self.title)
    }

    /// Whether this commit declares itself a fix of `other` via a literal
    /// `Fixes:` tag in its message body. Exact substring match, no fuzzing.
    pub fn is_fix_of(&self, other: &Commit) -> bool {
        self.body.contains(&other.fixes_tag())
    }

    /// Whether this commit's body mentions `other` by title or full hash.
    ///
    /// Merge commits are excluded: their messages routinely quote dozens of
    /// unrelated titles and would drown the signal.
    pub fn mentions(&self, other: &Commit) -> bool {
        if self.title.to_lowercase().starts_with("merge ") {
            return false;
        }
        self.body.contains(&other.title) || self.body.contains(&other.hash)
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (\"{}\")", self.short_hash(), self.title)
    }
}

/// A dotted revision range: revisions reachable from `end` but not from
/// `start`. A bare reference is a 1-tuple range with no start bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionRange {
    pub start: Option<String>,
    pub end: String,
}

impl RevisionRange {
    pub fn parse(spec: &str) -> Self {
        match spec.split_once("..") {
            Some((start, end)) => Self {
                start: Some(start.to_string()),
                end: end.to_string(),
            },
            None => Self {
                start: None,
                end: spec.to_string(),
            },
        }
    }

    pub fn bounded(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: end.into(),
        }
    }

    pub fn single(end: impl Into<String>) -> Self {
        Self {
            start: None,
            end: end.into(),
        }
    }

    /// Boundary references, start first.
    pub fn refs(&self) -> impl Iterator<Item = &str> {
        self.start
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.end.as_str()))
    }
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Some(start) => write!(f, "{}..{}", start, self.end),
            None => f.write_str(&self.end),
        }
    }
}

/// Downstream backport marker on a followup edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backport {
    /// Resolved to a concrete downstream commit during this run.
    Hash(String),
    /// Reloaded from a checkpoint, which records merged/unmerged only.
    Recorded,
}

/// An upstream revision classified as fixing or mentioning a tracked
/// downstream title. The commit is immutable; the backport slot is
/// cleared/set in place by the incremental tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupEdge {
    pub commit: Commit,
    pub backport: Option<Backport>,
}

impl FollowupEdge {
    pub fn new(commit: Commit) -> Self {
        Self {
            commit,
            backport: None,
        }
    }

    pub fn is_merged(&self) -> bool {
        self.backport.is_some()
    }
}

/// The upstream counterpart of a tracked title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamAnchor {
    Resolved(Commit),
    /// Reloaded from a checkpoint; the anchor hash is not part of the text
    /// format, only the fact that the title exists upstream.
    Recorded,
}

/// Tracking outcome for one downstream title.
///
/// Invariant: a result with no upstream anchor has empty edge lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResult {
    pub upstream: Option<UpstreamAnchor>,
    pub fixes: Vec<FollowupEdge>,
    pub mentions: Vec<FollowupEdge>,
}

impl TrackResult {
    /// The title never appeared upstream.
    pub fn downstream_only() -> Self {
        Self {
            upstream: None,
            fixes: Vec::new(),
            mentions: Vec::new(),
        }
    }

    pub fn anchored(commit: Commit) -> Self {
        Self {
            upstream: Some(UpstreamAnchor::Resolved(commit)),
            fixes: Vec::new(),
            mentions: Vec::new(),
        }
    }

    pub fn recorded() -> Self {
        Self {
            upstream: Some(UpstreamAnchor::Recorded),
            fixes: Vec::new(),
            mentions: Vec::new(),
        }
    }

    pub fn has_followups(&self) -> bool {
        !self.fixes.is_empty() || !self.mentions.is_empty()
    }

    pub fn has_unmerged(&self) -> bool {
        self.fixes.iter().any(|e| !e.is_merged()) || self.mentions.iter().any(|e| !e.is_merged())
    }
}

/// The full result set of one tracking run: range boundaries, the resolved
/// hash of each boundary reference (for later shift detection), and the
/// per-title results in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResults {
    pub upstream: RevisionRange,
    pub downstream: RevisionRange,
    ref_hashes: Vec<(String, String)>,
    order: Vec<String>,
    results: HashMap<String, TrackResult>,
}

impl TrackResults {
    pub fn new(upstream: RevisionRange, downstream: RevisionRange) -> Self {
        Self {
            upstream,
            downstream,
            ref_hashes: Vec::new(),
            order: Vec::new(),
            results: HashMap::new(),
        }
    }

    pub fn record_ref_hash(&mut self, reference: impl Into<String>, hash: impl Into<String>) {
        let reference = reference.into();
        let hash = hash.into();
        match self.ref_hashes.iter_mut().find(|(r, _)| *r == reference) {
            Some(entry) => entry.1 = hash,
            None => self.ref_hashes.push((reference, hash)),
        }
    }

    pub fn ref_hash(&self, reference: &str) -> Option<&str> {
        self.ref_hashes
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, h)| h.as_str())
    }

    pub fn ref_hashes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ref_hashes.iter().map(|(r, h)| (r.as_str(), h.as_str()))
    }

    /// Insert or replace a result, keeping the first-insertion position.
    pub fn insert(&mut self, title: impl Into<String>, result: TrackResult) {
        let title = title.into();
        if !self.results.contains_key(&title) {
            self.order.push(title.clone());
        }
        self.results.insert(title, result);
    }

    pub fn get(&self, title: &str) -> Option<&TrackResult> {
        self.results.get(title)
    }

    pub fn get_mut(&mut self, title: &str) -> Option<&mut TrackResult> {
        self.results.get_mut(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.results.contains_key(title)
    }

    /// Results in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackResult)> {
        self.order
            .iter()
            .filter_map(|t| self.results.get(t).map(|r| (t.as_str(), r)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, title: &str, body: &str) -> Commit {
        Commit::new(hash, title, body)
    }

    #[test]
    fn fixes_tag_uses_short_hash_and_quoted_title() {
        let c = commit(
            "0123456789abcdef0123456789abcdef01234567",
            "core: add widget",
            "",
        );
        assert_eq!(c.fixes_tag(), "Fixes: 0123456789ab (\"core: add widget\")");
    }

    #[test]
    fn is_fix_of_requires_exact_tag() {
        let tracked = commit(
            "0123456789abcdef0123456789abcdef01234567",
            "core: add widget",
            "",
        );
        let fix = commit(
            "aaaa456789abcdef0123456789abcdef01234567",
            "core: fix widget leak",
            "Plug the leak.\n\nFixes: 0123456789ab (\"core: add widget\")",
        );
        let near_miss = commit(
            "bbbb456789abcdef0123456789abcdef01234567",
            "core: fix widget leak",
            "Plug the leak.\n\nFixes: 0123456789ab (core: add widget)",
        );
        assert!(fix.is_fix_of(&tracked));
        assert!(!near_miss.is_fix_of(&tracked));
    }

    #[test]
    fn fix_and_mention_predicates_are_independent() {
        let tracked = commit(
            "0123456789abcdef0123456789abcdef01234567",
            "core: add widget",
            "",
        );
        let both = commit(
            "cccc456789abcdef0123456789abcdef01234567",
            "core: rework widget",
            "After core: add widget landed things broke.\n\n\
             Fixes: 0123456789ab (\"core: add widget\")",
        );
        assert!(both.is_fix_of(&tracked));
        assert!(both.mentions(&tracked));
    }

    #[test]
    fn mentions_matches_title_or_full_hash() {
        let tracked = commit(
            "0123456789abcdef0123456789abcdef01234567",
            "core: add widget",
            "",
        );
        let by_title = commit("a", "docs: update", "See core: add widget for details.");
        let by_hash = commit(
            "b",
            "docs: update",
            "See 0123456789abcdef0123456789abcdef01234567 for details.",
        );
        let neither = commit("c", "docs: update", "Unrelated.");
        assert!(by_title.mentions(&tracked));
        assert!(by_hash.mentions(&tracked));
        assert!(!neither.mentions(&tracked));
    }

    #[test]
    fn merge_commits_never_mention() {
        let tracked = commit("0123456789ab", "core: add widget", "");
        let merge = commit(
            "d",
            "Merge branch 'widgets'",
            "core: add widget\ncore: fix widget leak",
        );
        let merge_lower = commit("e", "merge tag 'v2'", "core: add widget");
        assert!(!merge.mentions(&tracked));
        assert!(!merge_lower.mentions(&tracked));
    }

    #[test]
    fn revision_range_parse_roundtrip() {
        let bounded = RevisionRange::parse("v5.4..HEAD");
        assert_eq!(bounded.start.as_deref(), Some("v5.4"));
        assert_eq!(bounded.end, "HEAD");
        assert_eq!(bounded.to_string(), "v5.4..HEAD");
        assert_eq!(bounded.refs().collect::<Vec<_>>(), vec!["v5.4", "HEAD"]);

        let single = RevisionRange::parse("HEAD");
        assert_eq!(single.start, None);
        assert_eq!(single.to_string(), "HEAD");
        assert_eq!(single.refs().collect::<Vec<_>>(), vec!["HEAD"]);
    }

    #[test]
    fn track_results_preserve_insertion_order() {
        let mut results = TrackResults::new(
            RevisionRange::parse("a..b"),
            RevisionRange::parse("c..d"),
        );
        results.insert("second commit", TrackResult::downstream_only());
        results.insert("first commit", TrackResult::downstream_only());
        results.insert("second commit", TrackResult::recorded());

        let titles: Vec<_> = results.iter().map(|(t, _)| t).collect();
        assert_eq!(titles, vec!["second commit", "first commit"]);
        assert_eq!(results.len(), 2);
        assert!(
            results
                .get("second commit")
                .is_some_and(|r| r.upstream.is_some())
        );
    }

    #[test]
    fn ref_hash_recording_replaces_in_place() {
        let mut results = TrackResults::new(
            RevisionRange::parse("a..b"),
            RevisionRange::parse("c..d"),
        );
        results.record_ref_hash("a", "111");
        results.record_ref_hash("b", "222");
        results.record_ref_hash("a", "333");
        let pairs: Vec<_> = results.ref_hashes().collect();
        assert_eq!(pairs, vec![("a", "333"), ("b", "222")]);
    }
}
