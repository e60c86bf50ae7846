use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use url::Url;

use crate::error::{RefsError, Result};

use super::client::DEFAULT_BASE_URL;

static PROJECT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]+(/[a-zA-Z0-9._-]+)+$").expect("valid regex"));

/// A repository argument split into an optional instance URL and the
/// project path (`group/subgroup/project`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    pub base_url: Option<String>,
    pub project_path: String,
}

/// Parses `group/project`, `group/sub/.../project`, or a full
/// `http(s)://host[:port]/group/project[.git]` URL.
pub fn parse_repo_path(input: &str) -> Result<RepoPath> {
    if input.starts_with("http") {
        let url = Url::parse(input)
            .map_err(|e| RefsError::InvalidRepoPath(format!("invalid URL {input}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| RefsError::InvalidRepoPath(format!("URL has no host: {input}")))?;

        let base_url = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };
        let path = url.path().trim_start_matches('/').trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        if path.is_empty() {
            return Err(RefsError::InvalidRepoPath(format!(
                "URL has no project path: {input}"
            )));
        }

        return Ok(RepoPath {
            base_url: Some(base_url),
            project_path: path.to_string(),
        });
    }

    if !PROJECT_PATH.is_match(input) {
        return Err(RefsError::InvalidRepoPath(format!(
            "invalid repository path format: {input}"
        )));
    }

    Ok(RepoPath {
        base_url: None,
        project_path: input.to_string(),
    })
}

/// Picks the GitLab instance to talk to.
///
/// An explicit base URL always wins over one recovered from the repository
/// argument; a disagreement between the two is logged.
pub fn resolve_base_url(explicit: Option<&str>, parsed: Option<&str>) -> String {
    match (explicit, parsed) {
        (Some(explicit), Some(parsed)) => {
            if explicit.trim_end_matches('/') != parsed {
                warn!(
                    "Repository URL points at {parsed} but base URL {explicit} was given; using {explicit}"
                );
            }
            explicit.to_string()
        }
        (Some(explicit), None) => explicit.to_string(),
        (None, Some(parsed)) => parsed.to_string(),
        (None, None) => DEFAULT_BASE_URL.to_string(),
    }
}
