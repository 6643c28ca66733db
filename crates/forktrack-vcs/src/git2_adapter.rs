use crate::adapter::VcsAdapter;
use forktrack_core::error::VcsError;
use forktrack_core::types::{Commit, RevisionRange};
use git2::{DiffOptions, ErrorCode, Repository, ResetType};
use std::path::PathBuf;
use time::{Date, OffsetDateTime};
use tracing::debug;

/// git2-backed history backend. Stateless apart from the repository path;
/// the repository is opened per call, which keeps the adapter cheap to share
/// and free of open handles between queries.
#[derive(Debug, Clone)]
pub struct Git2Adapter {
    repo_root: PathBuf,
}

impl Git2Adapter {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn open(&self) -> Result<Repository, VcsError> {
        Repository::open(&self.repo_root).map_err(|_| VcsError::NotGitRepo {
            path: self.repo_root.display().to_string(),
        })
    }

    fn rev_to_commit<'r>(repo: &'r Repository, rev: &str) -> Result<git2::Commit<'r>, VcsError> {
        repo.revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| VcsError::Git(format!("failed to resolve revision `{rev}`: {e}")))
    }

    fn walk_range<'r>(
        repo: &'r Repository,
        range: &RevisionRange,
    ) -> Result<git2::Revwalk<'r>, VcsError> {
        let mut walk = repo
            .revwalk()
            .map_err(|e| VcsError::Git(format!("failed to start revision walk: {e}")))?;
        let end = Self::rev_to_commit(repo, &range.end)?.id();
        walk.push(end)
            .map_err(|e| VcsError::Git(format!("failed to push `{}`: {e}", range.end)))?;
        if let Some(start) = &range.start {
            let start_oid = Self::rev_to_commit(repo, start)?.id();
            walk.hide(start_oid)
                .map_err(|e| VcsError::Git(format!("failed to hide `{start}`: {e}")))?;
        }
        Ok(walk)
    }

    /// Whether a commit changes any of `paths` relative to its first parent
    /// (relative to the empty tree for root commits).
    fn touches_any(
        repo: &Repository,
        commit: &git2::Commit<'_>,
        paths: &[String],
    ) -> Result<bool, VcsError> {
        let tree = commit
            .tree()
            .map_err(|e| VcsError::Git(format!("failed to load tree: {e}")))?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(
                parent
                    .tree()
                    .map_err(|e| VcsError::Git(format!("failed to load parent tree: {e}")))?,
            ),
            Err(_) => None,
        };
        let mut opts = DiffOptions::new();
        for path in paths {
            opts.pathspec(path);
        }
        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))
            .map_err(|e| VcsError::Git(format!("failed to compute diff: {e}")))?;
        Ok(diff.deltas().len() > 0)
    }

    fn split_message(message: &str) -> (String, String) {
        match message.split_once('\n') {
            Some((title, body)) => (
                title.trim_end().to_string(),
                body.trim_start_matches('\n').trim_end().to_string(),
            ),
            None => (message.trim_end().to_string(), String::new()),
        }
    }
}

impl VcsAdapter for Git2Adapter {
    fn show_metadata(&self, reference: &str) -> Result<Commit, VcsError> {
        let repo = self.open()?;
        let commit = Self::rev_to_commit(&repo, reference)?;
        let (title, body) = Self::split_message(commit.message().unwrap_or_default());
        Ok(Commit {
            hash: commit.id().to_string(),
            title,
            body,
        })
    }

    fn list_revisions(
        &self,
        range: &RevisionRange,
        paths: &[String],
    ) -> Result<Vec<String>, VcsError> {
        let repo = self.open()?;
        let walk = Self::walk_range(&repo, range)?;
        let mut hashes = Vec::new();
        for oid in walk {
            let oid = oid.map_err(|e| VcsError::Git(format!("revision walk failed: {e}")))?;
            if !paths.is_empty() {
                let commit = repo
                    .find_commit(oid)
                    .map_err(|e| VcsError::Git(format!("failed to load commit {oid}: {e}")))?;
                if !Self::touches_any(&repo, &commit, paths)? {
                    continue;
                }
            }
            hashes.push(oid.to_string());
        }
        debug!(range = %range, count = hashes.len(), "listed revisions");
        Ok(hashes)
    }

    fn log_oneline(&self, range: &RevisionRange) -> Result<Vec<(String, String)>, VcsError> {
        let repo = self.open()?;
        let walk = Self::walk_range(&repo, range)?;
        let mut entries = Vec::new();
        for oid in walk {
            let oid = oid.map_err(|e| VcsError::Git(format!("revision walk failed: {e}")))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| VcsError::Git(format!("failed to load commit {oid}: {e}")))?;
            entries.push((oid.to_string(), commit.summary().unwrap_or("").to_string()));
        }
        Ok(entries)
    }

    fn resolve_ref(&self, reference: &str) -> Result<String, VcsError> {
        let repo = self.open()?;
        Ok(Self::rev_to_commit(&repo, reference)?.id().to_string())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        let repo = self.open()?;
        let oid_a = Self::rev_to_commit(&repo, a)?.id();
        let oid_b = Self::rev_to_commit(&repo, b)?.id();
        match repo.merge_base(oid_a, oid_b) {
            Ok(base) => Ok(Some(base.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(VcsError::Git(format!(
                "failed to compute merge base of `{a}` and `{b}`: {e}"
            ))),
        }
    }

    fn first_parent_chain(&self, range: &RevisionRange) -> Result<Vec<String>, VcsError> {
        let repo = self.open()?;
        let stop = match &range.start {
            Some(start) => Some(Self::rev_to_commit(&repo, start)?.id()),
            None => None,
        };
        let mut chain = Vec::new();
        let mut current = Self::rev_to_commit(&repo, &range.end)?;
        loop {
            chain.push(current.id().to_string());
            if Some(current.id()) == stop {
                break;
            }
            match current.parent(0) {
                Ok(parent) => current = parent,
                Err(_) => break, // root commit
            }
        }
        Ok(chain)
    }

    fn touched_paths(&self, reference: &str) -> Result<Vec<String>, VcsError> {
        let repo = self.open()?;
        let commit = Self::rev_to_commit(&repo, reference)?;
        let tree = commit
            .tree()
            .map_err(|e| VcsError::Git(format!("failed to load tree: {e}")))?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(
                parent
                    .tree()
                    .map_err(|e| VcsError::Git(format!("failed to load parent tree: {e}")))?,
            ),
            Err(_) => None,
        };
        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .map_err(|e| VcsError::Git(format!("failed to compute diff: {e}")))?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().to_string());
            if let Some(path) = path
                && !paths.contains(&path)
            {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn latest_tag(&self) -> Result<String, VcsError> {
        let repo = self.open()?;
        let mut opts = git2::DescribeOptions::new();
        opts.describe_tags();
        let describe = repo
            .describe(&opts)
            .map_err(|e| VcsError::Git(format!("failed to describe HEAD: {e}")))?;
        let mut fmt = git2::DescribeFormatOptions::new();
        fmt.abbreviated_size(0);
        describe
            .format(Some(&fmt))
            .map_err(|e| VcsError::Git(format!("failed to format describe output: {e}")))
    }

    fn commit_date(&self, reference: &str) -> Result<Date, VcsError> {
        let repo = self.open()?;
        let commit = Self::rev_to_commit(&repo, reference)?;
        let timestamp = OffsetDateTime::from_unix_timestamp(commit.time().seconds())
            .map_err(|e| VcsError::Git(format!("invalid commit date for `{reference}`: {e}")))?;
        Ok(timestamp.date())
    }

    fn author(&self, reference: &str) -> Result<String, VcsError> {
        let repo = self.open()?;
        let commit = Self::rev_to_commit(&repo, reference)?;
        let author = commit.author();
        Ok(format!(
            "{} <{}>",
            String::from_utf8_lossy(author.name_bytes()),
            String::from_utf8_lossy(author.email_bytes())
        ))
    }

    fn reset_working_tree(&self, reference: &str) -> Result<(), VcsError> {
        let repo = self.open()?;
        let obj = repo
            .revparse_single(reference)
            .map_err(|e| VcsError::Git(format!("failed to resolve `{reference}`: {e}")))?;
        repo.reset(&obj, ResetType::Hard, None)
            .map_err(|e| VcsError::Git(format!("failed to reset to `{reference}`: {e}")))
    }

    fn try_apply(&self, reference: &str, base: &str) -> Result<bool, VcsError> {
        let repo = self.open()?;
        let original = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| VcsError::Git(format!("failed to read HEAD: {e}")))?
            .id();
        let base_obj = repo
            .revparse_single(base)
            .map_err(|e| VcsError::Git(format!("failed to resolve `{base}`: {e}")))?;
        repo.reset(&base_obj, ResetType::Hard, None)
            .map_err(|e| VcsError::Git(format!("failed to reset to `{base}`: {e}")))?;

        // The pick itself runs inside a closure so the original position is
        // restored on every exit path, including backend failures.
        let picked = (|| {
            let commit = Self::rev_to_commit(&repo, reference)?;
            repo.cherrypick(&commit, None)
                .map_err(|e| VcsError::Git(format!("failed to cherry-pick `{reference}`: {e}")))?;
            let index = repo
                .index()
                .map_err(|e| VcsError::Git(format!("failed to read index: {e}")))?;
            Ok(!index.has_conflicts())
        })();

        let _ = repo.cleanup_state();
        let restore = repo
            .find_object(original, None)
            .and_then(|obj| repo.reset(&obj, ResetType::Hard, None))
            .map_err(|e| VcsError::Git(format!("failed to restore original HEAD: {e}")));

        let clean = picked?;
        restore?;
        debug!(reference, base, clean, "applicability check");
        Ok(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Oid;
    use git2::build::CheckoutBuilder;
    use std::path::Path;

    fn signature() -> git2::Signature<'static> {
        git2::Signature::now("test", "test@example.com").unwrap()
    }

    fn init_repo(dir: &Path) -> Repository {
        Repository::init(dir).unwrap()
    }

    /// Write files into the working tree and commit them on HEAD.
    fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        let mut index = repo.index().unwrap();
        for (name, content) in files {
            std::fs::write(workdir.join(name), content).unwrap();
            index.add_path(Path::new(name)).unwrap();
        }
        let tree_id = index.write_tree().unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = signature();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn checkout(repo: &Repository, branch: &str) {
        repo.set_head(&format!("refs/heads/{branch}")).unwrap();
        repo.checkout_head(Some(CheckoutBuilder::new().force()))
            .unwrap();
    }

    fn branch_at(repo: &Repository, name: &str, oid: Oid) {
        let commit = repo.find_commit(oid).unwrap();
        repo.branch(name, &commit, false).unwrap();
    }

    #[test]
    fn show_metadata_splits_title_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_files(
            &repo,
            &[("a.txt", "hello\n")],
            "core: add greeting\n\nLong explanation.\nSecond line.",
        );

        let adapter = Git2Adapter::new(dir.path());
        let commit = adapter.show_metadata(&oid.to_string()).unwrap();
        assert_eq!(commit.hash, oid.to_string());
        assert_eq!(commit.title, "core: add greeting");
        assert_eq!(commit.body, "Long explanation.\nSecond line.");
    }

    #[test]
    fn list_revisions_respects_range_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_files(&repo, &[("a.txt", "1\n")], "first");
        let second = commit_files(&repo, &[("b.txt", "2\n")], "second");
        let third = commit_files(&repo, &[("a.txt", "3\n")], "third");

        let adapter = Git2Adapter::new(dir.path());
        let range = RevisionRange::bounded(base.to_string(), "HEAD");
        let all = adapter.list_revisions(&range, &[]).unwrap();
        assert_eq!(all, vec![third.to_string(), second.to_string()]);

        let only_a = adapter
            .list_revisions(&range, &["a.txt".to_string()])
            .unwrap();
        assert_eq!(only_a, vec![third.to_string()]);
    }

    #[test]
    fn log_oneline_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.txt", "1\n")], "first");
        commit_files(&repo, &[("a.txt", "2\n")], "second\n\nbody");

        let adapter = Git2Adapter::new(dir.path());
        let log = adapter.log_oneline(&RevisionRange::single("HEAD")).unwrap();
        let titles: Vec<_> = log.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn resolve_ref_handles_parent_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_files(&repo, &[("a.txt", "1\n")], "first");
        let second = commit_files(&repo, &[("a.txt", "2\n")], "second");

        let adapter = Git2Adapter::new(dir.path());
        assert_eq!(adapter.resolve_ref("HEAD").unwrap(), second.to_string());
        assert_eq!(adapter.resolve_ref("HEAD^").unwrap(), first.to_string());
        assert!(adapter.resolve_ref(&format!("{first}^")).is_err());
    }

    #[test]
    fn merge_base_of_diverged_branches() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_files(&repo, &[("a.txt", "1\n")], "base");
        branch_at(&repo, "side", base);
        let main_tip = commit_files(&repo, &[("a.txt", "main\n")], "main work");
        checkout(&repo, "side");
        commit_files(&repo, &[("b.txt", "side\n")], "side work");

        let adapter = Git2Adapter::new(dir.path());
        let mb = adapter
            .merge_base(&main_tip.to_string(), "side")
            .unwrap()
            .unwrap();
        assert_eq!(mb, base.to_string());
    }

    #[test]
    fn merge_base_of_unrelated_histories_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.txt", "1\n")], "base");

        // Parentless commit sharing no history with HEAD.
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join("o.txt"), "orphan\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("o.txt")).unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = signature();
        let orphan = repo.commit(None, &sig, &sig, "orphan", &tree, &[]).unwrap();

        let adapter = Git2Adapter::new(dir.path());
        let mb = adapter.merge_base("HEAD", &orphan.to_string()).unwrap();
        assert_eq!(mb, None);
    }

    #[test]
    fn first_parent_chain_stops_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_files(&repo, &[("a.txt", "1\n")], "first");
        let second = commit_files(&repo, &[("a.txt", "2\n")], "second");
        let third = commit_files(&repo, &[("a.txt", "3\n")], "third");

        let adapter = Git2Adapter::new(dir.path());
        let chain = adapter
            .first_parent_chain(&RevisionRange::bounded(first.to_string(), "HEAD"))
            .unwrap();
        assert_eq!(
            chain,
            vec![third.to_string(), second.to_string(), first.to_string()]
        );

        let to_root = adapter
            .first_parent_chain(&RevisionRange::single(second.to_string()))
            .unwrap();
        assert_eq!(to_root, vec![second.to_string(), first.to_string()]);
    }

    #[test]
    fn touched_paths_lists_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.txt", "1\n")], "first");
        let oid = commit_files(&repo, &[("a.txt", "2\n"), ("b.txt", "new\n")], "second");

        let adapter = Git2Adapter::new(dir.path());
        let mut paths = adapter.touched_paths(&oid.to_string()).unwrap();
        paths.sort();
        assert_eq!(paths, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn latest_tag_finds_nearest_tag() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let tagged = commit_files(&repo, &[("a.txt", "1\n")], "first");
        let obj = repo.find_object(tagged, None).unwrap();
        repo.tag_lightweight("v1.0", &obj, false).unwrap();
        commit_files(&repo, &[("a.txt", "2\n")], "second");

        let adapter = Git2Adapter::new(dir.path());
        assert_eq!(adapter.latest_tag().unwrap(), "v1.0");
    }

    #[test]
    fn try_apply_reports_clean_pick_and_restores_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_files(&repo, &[("a.txt", "base\n")], "base");
        let default_branch = repo.head().unwrap().shorthand().unwrap().to_string();
        branch_at(&repo, "side", base);
        checkout(&repo, "side");
        let clean_pick = commit_files(&repo, &[("b.txt", "side\n")], "side: add b");
        checkout(&repo, &default_branch);
        let main_tip = commit_files(&repo, &[("a.txt", "main\n")], "main work");

        let adapter = Git2Adapter::new(dir.path());
        let clean = adapter
            .try_apply(&clean_pick.to_string(), &main_tip.to_string())
            .unwrap();
        assert!(clean);
        assert_eq!(adapter.resolve_ref("HEAD").unwrap(), main_tip.to_string());
        assert!(!dir.path().join("b.txt").exists());
    }

    #[test]
    fn try_apply_reports_conflict_and_restores_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_files(&repo, &[("a.txt", "base\n")], "base");
        let default_branch = repo.head().unwrap().shorthand().unwrap().to_string();
        branch_at(&repo, "side", base);
        checkout(&repo, "side");
        let conflicting = commit_files(&repo, &[("a.txt", "side\n")], "side: rewrite a");
        checkout(&repo, &default_branch);
        let main_tip = commit_files(&repo, &[("a.txt", "main\n")], "main work");

        let adapter = Git2Adapter::new(dir.path());
        let clean = adapter
            .try_apply(&conflicting.to_string(), &main_tip.to_string())
            .unwrap();
        assert!(!clean);
        assert_eq!(adapter.resolve_ref("HEAD").unwrap(), main_tip.to_string());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "main\n"
        );
    }
}
