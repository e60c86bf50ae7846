use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RefsError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch merge requests (page {page}): {source}")]
    PageFetch {
        page: u32,
        #[source]
        source: Box<RefsError>,
    },

    #[error("Failed to fetch merge request {iid}: {source}")]
    MergeRequestFetch {
        iid: u64,
        #[source]
        source: Box<RefsError>,
    },

    #[error("Failed to process merge request {iid}: {source}")]
    Sink {
        iid: u64,
        #[source]
        source: BoxError,
    },

    #[error("Still rate limited after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("Invalid repository path: {0}")]
    InvalidRepoPath(String),

    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Failed to create branch {branch}: {source}")]
    BranchCreate {
        branch: String,
        #[source]
        source: Box<RefsError>,
    },
}

impl RefsError {
    /// HTTP status of the innermost API failure, if there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::PageFetch { source, .. }
            | Self::MergeRequestFetch { source, .. }
            | Self::BranchCreate { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RefsError>;
