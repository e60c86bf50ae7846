mod client;
mod types;

pub use client::{GitHubClient, DEFAULT_API_URL};
pub use types::{CreateStats, GitHubRepo};
