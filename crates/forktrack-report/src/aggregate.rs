//! Aggregated views over a result set: the highlight listing and the
//! three-line summary, plus a re-parser for summaries embedded in saved
//! command output.

use crate::checkpoint::render_result;
use forktrack_core::error::CheckpointError;
use forktrack_core::types::TrackResults;
use std::fmt;

/// Entries worth a second look: only results that have follow-ups at all,
/// optionally narrowed to those with follow-ups not yet applied downstream.
pub fn highlights(results: &TrackResults, unmerged_only: bool) -> String {
    let mut lines = Vec::new();
    for (title, result) in results.iter() {
        if !result.has_followups() {
            continue;
        }
        if unmerged_only && !result.has_unmerged() {
            continue;
        }
        lines.push(format!("{title} # {}", render_result(result)));
    }
    lines.join("\n")
}

/// Headline counts of one tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub commits: usize,
    pub merged: usize,
    pub fixes: usize,
    pub unmerged_fixes: usize,
    pub mentions: usize,
    pub unmerged_mentions: usize,
}

impl Summary {
    pub fn from_results(results: &TrackResults) -> Self {
        let mut summary = Self {
            commits: results.len(),
            ..Self::default()
        };
        for (_, result) in results.iter() {
            if result.upstream.is_some() {
                summary.merged += 1;
            }
            summary.fixes += result.fixes.len();
            summary.unmerged_fixes += result.fixes.iter().filter(|e| !e.is_merged()).count();
            summary.mentions += result.mentions.len();
            summary.unmerged_mentions +=
                result.mentions.iter().filter(|e| !e.is_merged()).count();
        }
        summary
    }

    /// Space-separated count row, one run per line when comparing many runs.
    pub fn compact(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.commits,
            self.merged,
            self.fixes,
            self.unmerged_fixes,
            self.mentions,
            self.unmerged_mentions
        )
    }

    /// Recover the counts from saved command output containing a
    /// `SUMMARY` block.
    pub fn parse(text: &str) -> Result<Self, CheckpointError> {
        let lines: Vec<&str> = text.lines().collect();
        let at = lines
            .iter()
            .position(|l| *l == "SUMMARY")
            .ok_or(CheckpointError::MissingHeader { header: "SUMMARY" })?;
        if lines.get(at + 1) != Some(&"=======") || lines.get(at + 2) != Some(&"") {
            return Err(CheckpointError::malformed(
                at + 2,
                "SUMMARY header is not underlined",
            ));
        }
        let line = |offset: usize| -> Result<&str, CheckpointError> {
            lines.get(at + offset).copied().ok_or_else(|| {
                CheckpointError::malformed(at + offset, "truncated SUMMARY block")
            })
        };

        let merged_line = line(3)?;
        let fixes_line = line(4)?;
        let mentions_line = line(5)?;
        Ok(Self {
            merged: nth_count(merged_line, 0, at + 4)?,
            commits: nth_count(merged_line, 3, at + 4)?,
            fixes: nth_count(fixes_line, 0, at + 5)?,
            unmerged_fixes: nth_count(fixes_line, 4, at + 5)?,
            mentions: nth_count(mentions_line, 0, at + 6)?,
            unmerged_mentions: nth_count(mentions_line, 4, at + 6)?,
        })
    }
}

fn nth_count(line: &str, idx: usize, lineno: usize) -> Result<usize, CheckpointError> {
    line.split_whitespace()
        .nth(idx)
        .and_then(|token| token.trim_start_matches('(').parse().ok())
        .ok_or_else(|| CheckpointError::malformed(lineno, format!("expected a count in `{line}`")))
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of the {} downstream commits are merged in the upstream.",
            self.merged, self.commits
        )?;
        writeln!(
            f,
            "{} followup fixes found ({} are not applied downstream)",
            self.fixes, self.unmerged_fixes
        )?;
        write!(
            f,
            "{} followup mentions found ({} are not applied downstream)",
            self.mentions, self.unmerged_mentions
        )
    }
}
