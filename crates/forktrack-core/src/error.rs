use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("track error: {0}")]
    Track(#[from] TrackError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a git repository: {path}")]
    NotGitRepo { path: String },

    #[error("git error: {0}")]
    Git(String),
}

impl VcsError {
    /// Convenience constructor for backend errors — use with `.map_err(VcsError::git)`.
    pub fn git<E: std::fmt::Display>(e: E) -> Self {
        Self::Git(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("no common history between `{old_end}` and `{new_end}`")]
    NoCommonHistory { old_end: String, new_end: String },
}

/// A grammar violation while re-reading a previous-results checkpoint.
///
/// These fail loudly: a silently dropped entry would be re-tracked as
/// "untracked" later and mask data loss.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("missing `# {header}:` header")]
    MissingHeader { header: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse ignore rules: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
