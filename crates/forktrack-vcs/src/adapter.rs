use forktrack_core::error::VcsError;
use forktrack_core::types::{Commit, RevisionRange};
use time::Date;

/// History oracle the tracking engine runs against.
///
/// One adapter instance is bound to one repository. Every operation is a
/// blocking query against a fixed repository state; results are stable for
/// the lifetime of a run, which is what makes per-run memoization sound.
pub trait VcsAdapter {
    /// Full metadata (hash, title, message body) of a single revision.
    fn show_metadata(&self, reference: &str) -> Result<Commit, VcsError>;

    /// Hashes reachable in `range`, newest first, optionally narrowed to
    /// revisions touching any of `paths`.
    fn list_revisions(
        &self,
        range: &RevisionRange,
        paths: &[String],
    ) -> Result<Vec<String>, VcsError>;

    /// `(hash, title)` pairs for `range`, newest first.
    fn log_oneline(&self, range: &RevisionRange) -> Result<Vec<(String, String)>, VcsError>;

    /// Resolve a symbolic reference to the full hash of the commit it
    /// points at.
    fn resolve_ref(&self, reference: &str) -> Result<String, VcsError>;

    /// Nearest common ancestor, or `None` when the two histories are
    /// unrelated.
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError>;

    /// First-parent hashes from `range.end` down to and including
    /// `range.start` (to the root commit when the start is absent or never
    /// reached), newest first.
    fn first_parent_chain(&self, range: &RevisionRange) -> Result<Vec<String>, VcsError>;

    /// Paths touched by a revision, relative to the repository root.
    fn touched_paths(&self, reference: &str) -> Result<Vec<String>, VcsError>;

    /// Most recent tag reachable from HEAD.
    fn latest_tag(&self) -> Result<String, VcsError>;

    /// Committer date of a revision.
    fn commit_date(&self, reference: &str) -> Result<Date, VcsError>;

    /// Author of a revision, `Name <email>` form.
    fn author(&self, reference: &str) -> Result<String, VcsError>;

    /// Hard-reset the working tree to `reference`. Destructive.
    fn reset_working_tree(&self, reference: &str) -> Result<(), VcsError>;

    /// Whether `reference` cherry-picks cleanly onto `base`. The repository
    /// is reset during the check and restored to its original position on
    /// every exit path, success or failure.
    fn try_apply(&self, reference: &str, base: &str) -> Result<bool, VcsError>;
}
