use anyhow::{Context, Result};
use forktrack_core::ignore::IgnoreRules;
use forktrack_core::types::{RevisionRange, TrackResults};
use forktrack_engine::{FileScope, Tracker};
use forktrack_report::{Summary, highlights, parse_results, render_result};
use forktrack_vcs::{Git2Adapter, VcsAdapter};
use std::path::Path;
use tracing::info;

pub struct TrackArgs {
    pub repo: String,
    pub upstream: String,
    pub downstream: Option<String>,
    pub titles: Vec<String>,
    pub prev_results: Option<String>,
    pub downstream_prefix: Option<String>,
    pub ignore: Option<String>,
    pub followups_only: bool,
    pub unmerged_only: bool,
    pub all_files: bool,
}

pub fn run(args: TrackArgs) -> Result<()> {
    let adapter = Git2Adapter::new(&args.repo);

    let upstream = RevisionRange::parse(&args.upstream);
    let downstream = match &args.downstream {
        Some(spec) => RevisionRange::parse(spec),
        None => {
            let base = adapter
                .latest_tag()
                .context("failed getting the default downstream")?;
            let range = RevisionRange::bounded(base, "HEAD");
            println!("# use {range} as downstream");
            range
        }
    };

    let mut results = TrackResults::new(upstream.clone(), downstream.clone());
    println!("# upstream: {upstream}");
    println!("# downstream: {downstream}");
    for reference in upstream.refs().chain(downstream.refs()) {
        let hash = adapter
            .resolve_ref(reference)
            .with_context(|| format!("failed to resolve `{reference}`"))?;
        println!("# {reference}: {hash}");
        results.record_ref_hash(reference, hash);
    }

    let scope = if args.all_files {
        FileScope::AllFiles
    } else {
        FileScope::Touched
    };
    let mut tracker = Tracker::new(&adapter, upstream, downstream.clone())
        .with_downstream_prefix(args.downstream_prefix.clone())
        .with_scope(scope);

    if let Some(path) = &args.ignore {
        let rules = IgnoreRules::load(Path::new(path))
            .with_context(|| format!("failed to load ignore rules from {path}"))?;
        tracker = tracker.with_ignore(rules);
    }
    if let Some(path) = &args.prev_results {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read previous results from {path}"))?;
        let previous =
            parse_results(&text).with_context(|| format!("failed to parse {path}"))?;
        info!(path, titles = previous.len(), "loaded previous results");
        tracker = tracker.with_previous(previous);
    }

    let titles = if args.titles.is_empty() {
        println!("# track for all downstream commits");
        let log = adapter
            .log_oneline(&downstream)
            .context("failed getting the downstream commits")?;
        tracker.seed_titles(&downstream, log.iter().map(|(h, t)| (h.as_str(), t.as_str())));
        log.into_iter().map(|(_, title)| title).collect()
    } else {
        args.titles.clone()
    };

    for title in &titles {
        let result = tracker
            .track(title)
            .with_context(|| format!("tracking `{title}` failed"))?;
        if !args.followups_only || result.has_followups() {
            println!("{title} # {}", render_result(&result));
        }
        results.insert(title.clone(), result);
    }

    if !args.followups_only {
        println!();
        println!();
        println!("HIGHLIGHTS");
        println!("==========");
        println!();
        let listing = highlights(&results, args.unmerged_only);
        if !listing.is_empty() {
            println!("{listing}");
        }
    }
    println!();
    println!();
    println!("SUMMARY");
    println!("=======");
    println!();
    println!("{}", Summary::from_results(&results));

    Ok(())
}
