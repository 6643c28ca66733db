//! Text checkpoint of a tracking run.
//!
//! The format is line oriented and doubles as the human-readable command
//! output: a comment header recording the ranges and their boundary hashes,
//! then one entry per tracked title. Entries with follow-ups continue on
//! indented section lines. A blank line terminates the checkpoint, so
//! trailing report sections are ignored when re-reading one.

use forktrack_core::error::CheckpointError;
use forktrack_core::types::{
    Backport, Commit, FollowupEdge, RevisionRange, TrackResult, TrackResults,
};

/// Render one tracking outcome: `downstream_only`, `no_followup`, or a
/// comma-joined tag list followed by the populated follow-up sections.
pub fn render_result(result: &TrackResult) -> String {
    if result.upstream.is_none() {
        return "downstream_only".to_string();
    }
    if !result.has_followups() {
        return "no_followup".to_string();
    }

    let (fixes_merged, fixes_unmerged) = split_merged(&result.fixes);
    let (mentions_merged, mentions_unmerged) = split_merged(&result.mentions);

    let mut tags = Vec::new();
    if !result.fixes.is_empty() {
        tags.push("fixed");
    }
    if !result.mentions.is_empty() {
        tags.push("mentioned");
    }
    if !fixes_unmerged.is_empty() || !mentions_unmerged.is_empty() {
        tags.push("unmerged");
    }

    let mut lines = vec![tags.join(",")];
    push_section(&mut lines, "  fixes unmerged", &fixes_unmerged);
    push_section(&mut lines, "  fixes merged", &fixes_merged);
    push_section(&mut lines, "  mentions unmerged", &mentions_unmerged);
    push_section(&mut lines, "  mentions merged", &mentions_merged);
    lines.join("\n")
}

/// Render a full result set, header included.
pub fn render_results(results: &TrackResults) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# upstream: {}", results.upstream));
    lines.push(format!("# downstream: {}", results.downstream));
    for (reference, hash) in results.ref_hashes() {
        lines.push(format!("# {reference}: {hash}"));
    }
    for (title, result) in results.iter() {
        lines.push(format!("{title} # {}", render_result(result)));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Fixes,
    Mentions,
}

fn section_header(line: &str) -> Option<(Section, bool)> {
    match line {
        "  fixes unmerged" => Some((Section::Fixes, false)),
        "  fixes merged" => Some((Section::Fixes, true)),
        "  mentions unmerged" => Some((Section::Mentions, false)),
        "  mentions merged" => Some((Section::Mentions, true)),
        _ => None,
    }
}

/// Parse a checkpoint back into a result set.
///
/// Reloaded results carry placeholders instead of resolved objects: anchors
/// become [`forktrack_core::types::UpstreamAnchor::Recorded`] and merged
/// backports become [`Backport::Recorded`], since the text only records
/// which side of each distinction an entry was on. Grammar violations are
/// hard errors; a silently dropped entry would later be re-tracked as new
/// and mask data loss.
pub fn parse_results(text: &str) -> Result<TrackResults, CheckpointError> {
    let mut upstream: Option<RevisionRange> = None;
    let mut downstream: Option<RevisionRange> = None;
    let mut parsed: Option<TrackResults> = None;
    let mut current: Option<String> = None;
    let mut section: Option<(Section, bool)> = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("# upstream: ") {
            upstream = Some(RevisionRange::parse(rest));
            continue;
        }
        if let Some(rest) = line.strip_prefix("# downstream: ") {
            downstream = Some(RevisionRange::parse(rest));
            continue;
        }
        if let Some(rest) = line.strip_prefix("# ") {
            // Boundary ref hashes. Any other comment (`# track for all
            // downstream commits` and friends) is passthrough noise.
            if let (Some((reference, hash)), Some(up), Some(down)) =
                (rest.split_once(": "), &upstream, &downstream)
                && up.refs().chain(down.refs()).any(|r| r == reference)
            {
                ensure_results(&mut parsed, up, down).record_ref_hash(reference, hash);
            }
            continue;
        }

        if current.is_some() {
            if let Some(kind) = section_header(line) {
                section = Some(kind);
                continue;
            }
            if line.starts_with("    ") {
                let commit = parse_followup_line(line, lineno)?;
                let Some((kind, merged)) = section else {
                    return Err(CheckpointError::malformed(
                        lineno,
                        "followup entry outside a section",
                    ));
                };
                let result = parsed
                    .as_mut()
                    .zip(current.as_deref())
                    .and_then(|(r, t)| r.get_mut(t))
                    .ok_or_else(|| {
                        CheckpointError::malformed(lineno, "followup entry before any result")
                    })?;
                let edge = FollowupEdge {
                    commit,
                    backport: merged.then_some(Backport::Recorded),
                };
                match kind {
                    Section::Fixes => result.fixes.push(edge),
                    Section::Mentions => result.mentions.push(edge),
                }
                continue;
            }
            // A non-indented line starts the next entry.
            current = None;
            section = None;
        }

        let Some(sep) = line.rfind(" # ") else {
            return Err(CheckpointError::malformed(
                lineno,
                format!("expected `<title> # <status>`, got `{line}`"),
            ));
        };
        let title = &line[..sep];
        let status = &line[sep + 3..];
        let up = upstream
            .as_ref()
            .ok_or(CheckpointError::MissingHeader { header: "upstream" })?;
        let down = downstream
            .as_ref()
            .ok_or(CheckpointError::MissingHeader {
                header: "downstream",
            })?;
        let results = ensure_results(&mut parsed, up, down);
        match status {
            "downstream_only" => results.insert(title, TrackResult::downstream_only()),
            "no_followup" => results.insert(title, TrackResult::recorded()),
            tags => {
                let known = tags
                    .split(',')
                    .all(|t| matches!(t, "fixed" | "mentioned" | "unmerged"));
                if tags.is_empty() || !known {
                    return Err(CheckpointError::malformed(
                        lineno,
                        format!("unknown status `{tags}`"),
                    ));
                }
                results.insert(title, TrackResult::recorded());
                current = Some(title.to_string());
            }
        }
    }

    let upstream = upstream.ok_or(CheckpointError::MissingHeader { header: "upstream" })?;
    let downstream = downstream.ok_or(CheckpointError::MissingHeader {
        header: "downstream",
    })?;
    Ok(parsed.unwrap_or_else(|| TrackResults::new(upstream, downstream)))
}

fn ensure_results<'a>(
    parsed: &'a mut Option<TrackResults>,
    upstream: &RevisionRange,
    downstream: &RevisionRange,
) -> &'a mut TrackResults {
    parsed.get_or_insert_with(|| TrackResults::new(upstream.clone(), downstream.clone()))
}

/// `    <hash12> ("<title>")`
fn parse_followup_line(line: &str, lineno: usize) -> Result<Commit, CheckpointError> {
    let entry = line.trim();
    if entry.len() >= 17
        && let (Some(hash), Some(" (\"")) = (entry.get(..12), entry.get(12..15))
        && entry.ends_with("\")")
    {
        let title = &entry[15..entry.len() - 2];
        return Ok(Commit::new(hash, title, ""));
    }
    Err(CheckpointError::malformed(
        lineno,
        format!("invalid followup entry `{entry}`"),
    ))
}

fn push_section(lines: &mut Vec<String>, header: &str, commits: &[&Commit]) {
    if commits.is_empty() {
        return;
    }
    lines.push(header.to_string());
    for commit in commits {
        lines.push(format!("    {commit}"));
    }
}

fn split_merged(edges: &[FollowupEdge]) -> (Vec<&Commit>, Vec<&Commit>) {
    let mut merged = Vec::new();
    let mut unmerged = Vec::new();
    for edge in edges {
        if edge.is_merged() {
            merged.push(&edge.commit);
        } else {
            unmerged.push(&edge.commit);
        }
    }
    (merged, unmerged)
}
