mod client;
mod fetcher;
mod repo_path;
mod types;

pub use client::GitLabClient;
pub use fetcher::{FetchStats, MergeRequestFetcher};
pub use repo_path::{parse_repo_path, resolve_base_url};
pub use types::MergeRequestRef;
