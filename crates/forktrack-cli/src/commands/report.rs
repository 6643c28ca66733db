use anyhow::{Context, Result};
use forktrack_report::{build_report, parse_results, render_report};
use forktrack_vcs::Git2Adapter;

pub fn run(output: &str, repo: &str) -> Result<()> {
    let text =
        std::fs::read_to_string(output).with_context(|| format!("failed to read {output}"))?;
    let results = parse_results(&text).with_context(|| format!("failed to parse {output}"))?;

    let adapter = Git2Adapter::new(repo);
    let entries = build_report(&adapter, &results)
        .context("failed checking the unmerged followups against the repository")?;
    print!("{}", render_report(&results, &entries));
    Ok(())
}
