use forktrack_core::error::VcsError;
use forktrack_core::types::RevisionRange;
use forktrack_vcs::VcsAdapter;
use std::collections::HashMap;
use tracing::debug;

/// Maps a commit title back to a concrete revision within a bounded range.
///
/// Lookups are memoized per `(range text, title)` for the lifetime of the
/// resolver; ranges are treated as immutable history snapshots for the
/// duration of a run, so entries are never evicted.
#[derive(Debug, Default)]
pub struct TitleResolver {
    cache: HashMap<(String, String), Option<String>>,
}

impl TitleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the cache for `range` from already-known `(hash, title)`
    /// pairs, newest first. First occurrence wins, matching what a search
    /// of the range would find for duplicate titles.
    pub fn seed<'a>(
        &mut self,
        range: &RevisionRange,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let range_text = range.to_string();
        for (hash, title) in entries {
            self.cache
                .entry((range_text.clone(), title.to_string()))
                .or_insert_with(|| Some(hash.to_string()));
        }
    }

    /// Resolve `title` to the newest revision in `range` whose title matches
    /// exactly. `Ok(None)` means no such title exists in the range — a valid
    /// outcome, not an error.
    pub fn resolve<B: VcsAdapter>(
        &mut self,
        backend: &B,
        title: &str,
        range: &RevisionRange,
    ) -> Result<Option<String>, VcsError> {
        let key = (range.to_string(), title.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let resolved = resolve_uncached(backend, title, range)?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }
}

fn resolve_uncached<B: VcsAdapter>(
    backend: &B,
    title: &str,
    range: &RevisionRange,
) -> Result<Option<String>, VcsError> {
    let mut search = range.clone();
    loop {
        let log = backend.log_oneline(&search)?;
        // Substring pre-filter before confirming exact equality: the first
        // hit may share only a common substring with the requested title.
        let Some((hash, matched_title)) = log.into_iter().find(|(_, t)| t.contains(title)) else {
            return Ok(None);
        };
        if matched_title == title {
            return Ok(Some(hash));
        }

        // Ambiguous hit. Narrow to the history strictly older than the false
        // match and search again; each round shrinks the range, so this
        // terminates within the history length.
        debug!(title, matched = %matched_title, "ambiguous title hit, narrowing search");
        let parent = format!("{hash}^");
        if backend.resolve_ref(&parent).is_err() {
            // The false match is a root commit; the range is exhausted.
            return Ok(None);
        }
        search = RevisionRange {
            start: range.start.clone(),
            end: parent,
        };
    }
}
