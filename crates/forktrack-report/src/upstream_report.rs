//! Backport-request report: unmerged follow-ups regrouped by the upstream
//! commit that carries them, annotated with authorship and whether the
//! commit cherry-picks cleanly onto the downstream end.

use forktrack_core::error::VcsError;
use forktrack_core::types::{Commit, TrackResults, short_hash};
use forktrack_vcs::VcsAdapter;
use std::collections::HashMap;
use time::Date;
use tracing::debug;

/// One upstream commit worth asking the downstream maintainers about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub commit: Commit,
    pub date: Date,
    pub author: String,
    /// Tracked downstream titles this commit fixes.
    pub fixes: Vec<String>,
    /// Tracked downstream titles this commit mentions.
    pub mentions: Vec<String>,
    pub applicable: bool,
}

struct Grouped {
    commit: Commit,
    fixes: Vec<String>,
    mentions: Vec<String>,
}

fn group_entry<'a>(
    order: &mut Vec<String>,
    grouped: &'a mut HashMap<String, Grouped>,
    commit: &Commit,
) -> &'a mut Grouped {
    let key = short_hash(&commit.hash).to_string();
    if !grouped.contains_key(&key) {
        order.push(key.clone());
    }
    grouped.entry(key).or_insert_with(|| Grouped {
        commit: commit.clone(),
        fixes: Vec::new(),
        mentions: Vec::new(),
    })
}

/// Collect every unmerged follow-up edge of `results`, grouped per upstream
/// commit in first-appearance order.
///
/// The backend is only consulted for commits that actually end up in the
/// report; checkpoint hashes are 12-char prefixes, which resolve fine.
pub fn build_report<B: VcsAdapter>(
    backend: &B,
    results: &TrackResults,
) -> Result<Vec<ReportEntry>, VcsError> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Grouped> = HashMap::new();

    for (title, result) in results.iter() {
        if result.upstream.is_none() {
            continue;
        }
        for edge in result.fixes.iter().filter(|e| !e.is_merged()) {
            group_entry(&mut order, &mut grouped, &edge.commit)
                .fixes
                .push(title.to_string());
        }
        for edge in result.mentions.iter().filter(|e| !e.is_merged()) {
            group_entry(&mut order, &mut grouped, &edge.commit)
                .mentions
                .push(title.to_string());
        }
    }
    debug!(entries = order.len(), "grouped unmerged followups");

    let mut entries = Vec::with_capacity(order.len());
    for key in order {
        let Some(group) = grouped.remove(&key) else {
            continue;
        };
        let date = backend.commit_date(&group.commit.hash)?;
        let author = backend.author(&group.commit.hash)?;
        let applicable = backend.try_apply(&group.commit.hash, &results.downstream.end)?;
        entries.push(ReportEntry {
            commit: group.commit,
            date,
            author,
            fixes: group.fixes,
            mentions: group.mentions,
            applicable,
        });
    }
    Ok(entries)
}

/// Format the report as a message to the involved upstream authors.
pub fn render_report(results: &TrackResults, entries: &[ReportEntry]) -> String {
    let mut authors: Vec<&str> = Vec::new();
    for entry in entries {
        if !authors.contains(&entry.author.as_str()) {
            authors.push(entry.author.as_str());
        }
    }

    let mut out = String::new();
    out.push_str(&format!("To: {}\n\n", authors.join(", ")));
    out.push_str(&format!(
        "{} commits in the upstream range '{}' appear to fix or mention commits\n\
         in the downstream range '{}' without being merged downstream yet.\n\
         Please review whether they should be backported.\n\
         \n\
         The commits are grouped by whether they carry a 'Fixes:' tag and whether\n\
         they cherry-pick cleanly onto the downstream end; each group is sorted by\n\
         commit date, oldest first.\n\
         \n\
         If any of these commits does not need backporting, reply so it can be\n\
         marked as ignored and left out of future reports.\n\n",
        entries.len(),
        results.upstream,
        results.downstream,
    ));

    for (reference, hash) in results.ref_hashes() {
        out.push_str(&format!("    # {reference}: {hash}\n"));
    }
    out.push_str("\n\n");

    render_group(&mut out, "Fixes cleanly applicable", entries, |e| {
        !e.fixes.is_empty() && e.applicable
    });
    render_group(&mut out, "Fixes not cleanly applicable", entries, |e| {
        !e.fixes.is_empty() && !e.applicable
    });
    render_group(&mut out, "Mentions cleanly applicable", entries, |e| {
        e.fixes.is_empty() && e.applicable
    });
    render_group(&mut out, "Mentions not cleanly applicable", entries, |e| {
        e.fixes.is_empty() && !e.applicable
    });
    out
}

fn render_group(
    out: &mut String,
    header: &str,
    entries: &[ReportEntry],
    pick: impl Fn(&ReportEntry) -> bool,
) {
    out.push_str(header);
    out.push('\n');
    out.push_str(&"-".repeat(header.len()));
    out.push_str("\n\n");

    let mut picked: Vec<&ReportEntry> = entries.iter().filter(|e| pick(e)).collect();
    picked.sort_by_key(|e| e.date);
    for entry in picked {
        out.push_str(&render_entry(entry));
        out.push('\n');
    }
    out.push_str("\n\n");
}

fn render_entry(entry: &ReportEntry) -> String {
    let mut lines = vec![entry.commit.to_string()];
    lines.push(format!(
        "# commit date: {}, author: {}",
        format_date(entry.date),
        entry.author
    ));
    for title in &entry.fixes {
        lines.push(format!("# fixes '{title}'"));
    }
    for title in &entry.mentions {
        lines.push(format!("# mentions '{title}'"));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
