use crate::error::ConfigError;
use crate::types::short_hash;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
struct IgnoreFile {
    #[serde(default)]
    ignore: HashMap<String, Vec<String>>,
}

/// Follow-up suppression rules: for a downstream commit hash, the upstream
/// hashes whose fix/mention edges should be dropped regardless of scan
/// outcome. Applied as a post-filter, never written back into results.
///
/// File format:
///
/// ```toml
/// [ignore]
/// "1a2b3c4d5e6f" = ["0123456789ab", "fedcba987654"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    by_downstream: HashMap<String, HashSet<String>>,
}

impl IgnoreRules {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let file: IgnoreFile =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self::from_entries(file.ignore))
    }

    /// Hashes are normalized to their 12-char display prefix, so full and
    /// abbreviated forms compare equal.
    pub fn from_entries<I, H>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, H)>,
        H: IntoIterator<Item = String>,
    {
        let by_downstream = entries
            .into_iter()
            .map(|(downstream, upstreams)| {
                let set = upstreams
                    .into_iter()
                    .map(|h| short_hash(&h).to_string())
                    .collect();
                (short_hash(&downstream).to_string(), set)
            })
            .collect();
        Self { by_downstream }
    }

    pub fn is_ignored(&self, downstream_hash: &str, upstream_hash: &str) -> bool {
        self.by_downstream
            .get(short_hash(downstream_hash))
            .is_some_and(|set| set.contains(short_hash(upstream_hash)))
    }

    pub fn is_empty(&self) -> bool {
        self.by_downstream.is_empty()
    }
}
