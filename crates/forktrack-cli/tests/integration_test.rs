//! End-to-end lifecycle at the library level: track a fork's commits,
//! checkpoint the results, reload the checkpoint for an incremental run,
//! and recover the summary counts from saved output.

use forktrack_core::types::{RevisionRange, TrackResults};
use forktrack_engine::Tracker;
use forktrack_report::{Summary, highlights, parse_results, render_result, render_results};
use forktrack_vcs::{Git2Adapter, VcsAdapter};
use git2::build::CheckoutBuilder;
use git2::{Oid, Repository};
use std::path::Path;

fn signature() -> git2::Signature<'static> {
    git2::Signature::now("test", "test@example.com").unwrap()
}

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

struct Fixture {
    dir: tempfile::TempDir,
    repo: Repository,
    default_branch: String,
    base: Oid,
    fork_tip: Oid,
    upstream_tip: Oid,
    fix: Oid,
}

/// Upstream: base, two tracked commits, a follow-up fix for the first.
/// Fork: carries both tracked titles, a backport of the fix, and one
/// fork-local commit.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let base = commit_files(&repo, &[("README", "readme\n")], "initial import");
    let default_branch = repo.head().unwrap().shorthand().unwrap().to_string();
    {
        let commit = repo.find_commit(base).unwrap();
        repo.branch("fork", &commit, false).unwrap();
    }

    let widget = commit_files(&repo, &[("widget.txt", "widget\n")], "core: add widget");
    commit_files(&repo, &[("gadget.txt", "gadget\n")], "core: add gadget");
    let tag = format!("Fixes: {} (\"core: add widget\")", &widget.to_string()[..12]);
    let fix = commit_files(
        &repo,
        &[("widget.txt", "widget v2\n")],
        &format!("core: fix widget leak\n\n{tag}"),
    );
    let upstream_tip = fix;

    checkout(&repo, "fork");
    commit_files(&repo, &[("widget.txt", "widget\n.\n")], "core: add widget");
    commit_files(&repo, &[("gadget.txt", "gadget\n.\n")], "core: add gadget");
    commit_files(
        &repo,
        &[("widget.txt", "widget v2\n.\n")],
        "core: fix widget leak",
    );
    let fork_tip = commit_files(&repo, &[("local.txt", "local\n")], "fork: local tweak");

    let fixture = Fixture {
        default_branch,
        base,
        fork_tip,
        upstream_tip,
        fix,
        dir,
        repo,
    };
    checkout(&fixture.repo, &fixture.default_branch);
    fixture
}

/// Mirror of what the track command does: resolve boundary hashes, track
/// every downstream title, and collect the results.
fn track_all(
    adapter: &Git2Adapter,
    upstream: &RevisionRange,
    downstream: &RevisionRange,
    previous: Option<TrackResults>,
) -> TrackResults {
    let mut results = TrackResults::new(upstream.clone(), downstream.clone());
    for reference in upstream.refs().chain(downstream.refs()) {
        let hash = adapter.resolve_ref(reference).unwrap();
        results.record_ref_hash(reference, hash);
    }

    let mut tracker = Tracker::new(adapter, upstream.clone(), downstream.clone())
        .with_downstream_prefix(Some("fork: ".to_string()));
    if let Some(previous) = previous {
        tracker = tracker.with_previous(previous);
    }

    let log = adapter.log_oneline(downstream).unwrap();
    tracker.seed_titles(downstream, log.iter().map(|(h, t)| (h.as_str(), t.as_str())));
    for (_, title) in log {
        let result = tracker.track(&title).unwrap();
        results.insert(title, result);
    }
    results
}

#[test]
fn track_checkpoint_and_incremental_retrack() {
    let f = fixture();
    let adapter = Git2Adapter::new(f.dir.path());
    let upstream = RevisionRange::bounded(f.base.to_string(), f.upstream_tip.to_string());
    let downstream = RevisionRange::bounded(f.base.to_string(), f.fork_tip.to_string());

    let results = track_all(&adapter, &upstream, &downstream, None);
    assert_eq!(results.len(), 4);

    // The tracked widget commit has a backported follow-up fix.
    let widget = results.get("core: add widget").unwrap();
    assert_eq!(
        render_result(widget),
        format!(
            "fixed\n  fixes merged\n    {} (\"core: fix widget leak\")",
            &f.fix.to_string()[..12]
        )
    );
    let gadget = results.get("core: add gadget").unwrap();
    assert_eq!(render_result(gadget), "no_followup");
    let local = results.get("fork: local tweak").unwrap();
    assert_eq!(render_result(local), "downstream_only");
    // The backported fix itself is also a downstream title; it resolves
    // upstream but nothing follows it up.
    let leak = results.get("core: fix widget leak").unwrap();
    assert_eq!(render_result(leak), "no_followup");

    let summary = Summary::from_results(&results);
    assert_eq!(summary.compact(), "4 3 1 0 0 0");
    assert!(highlights(&results, false).contains("core: add widget"));
    assert!(highlights(&results, true).is_empty());

    // Checkpoint and reload.
    let checkpoint = render_results(&results);
    let reloaded = parse_results(&checkpoint).unwrap();

    // Nothing moved, so the incremental run reproduces the recorded view.
    let again = track_all(&adapter, &upstream, &downstream, Some(reloaded.clone()));
    assert_eq!(render_results(&again), checkpoint);

    // The upstream gains another follow-up fix; the incremental run must
    // agree with a fresh scan.
    let new_fix = commit_files(
        &f.repo,
        &[("widget.txt", "widget v3\n")],
        &format!(
            "core: fix widget crash\n\nFixes: {} (\"core: fix widget leak\")",
            &f.fix.to_string()[..12]
        ),
    );
    let new_upstream = RevisionRange::bounded(f.base.to_string(), new_fix.to_string());

    let fresh = track_all(&adapter, &new_upstream, &downstream, None);
    let incremental = track_all(&adapter, &new_upstream, &downstream, Some(reloaded));
    assert_eq!(render_results(&incremental), render_results(&fresh));

    // The new fix follows up the leak fix, which is backported downstream
    // but the crash fix is not.
    let leak = incremental.get("core: fix widget leak").unwrap();
    assert!(leak.has_unmerged());
}

#[test]
fn summary_survives_a_saved_output_file() {
    let f = fixture();
    let adapter = Git2Adapter::new(f.dir.path());
    let upstream = RevisionRange::bounded(f.base.to_string(), f.upstream_tip.to_string());
    let downstream = RevisionRange::bounded(f.base.to_string(), f.fork_tip.to_string());
    let results = track_all(&adapter, &upstream, &downstream, None);
    let summary = Summary::from_results(&results);

    // Same shape the track command writes to stdout.
    let output = format!(
        "{}\n\n\nHIGHLIGHTS\n==========\n\n{}\n\n\nSUMMARY\n=======\n\n{}\n",
        render_results(&results),
        highlights(&results, false),
        summary
    );

    let path = f.dir.path().join("followups.txt");
    std::fs::write(&path, &output).unwrap();
    let saved = std::fs::read_to_string(&path).unwrap();

    assert_eq!(Summary::parse(&saved).unwrap(), summary);
    // And the checkpoint part still reloads, stopping at the blank line.
    let reloaded = parse_results(&saved).unwrap();
    assert_eq!(reloaded.len(), results.len());
}
