use serde::{Deserialize, Serialize};

use crate::error::{RefsError, Result};

/// Target repository in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
}

impl GitHubRepo {
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.trim().split('/').collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: (*owner).to_string(),
                repo: (*repo).to_string(),
            }),
            _ => Err(RefsError::Config(format!(
                "GitHub repository must be in format 'owner/repo', got '{path}'"
            ))),
        }
    }
}

impl std::fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Body of `POST /repos/:owner/:repo/git/refs`.
#[derive(Debug, Serialize)]
pub(super) struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub sha: &'a str,
}

/// Error body returned by the GitHub REST API.
#[derive(Debug, Deserialize)]
pub(super) struct ApiMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CreateStats {
    pub created: usize,
    pub existing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_repo() {
        let repo = GitHubRepo::parse("octo-org/migrated").unwrap();

        assert_eq!(repo.owner, "octo-org");
        assert_eq!(repo.repo, "migrated");
        assert_eq!(repo.to_string(), "octo-org/migrated");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for path in ["invalid-path", "owner/repo/extra", "/repo", "owner/", ""] {
            let err = GitHubRepo::parse(path).unwrap_err();
            assert!(err.to_string().contains("owner/repo"), "path: {path}");
        }
    }

    #[test]
    fn test_create_ref_request_uses_ref_key() {
        let body = serde_json::to_value(CreateRefRequest {
            ref_: "refs/heads/migration-pr-1".to_string(),
            sha: "abc",
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({ "ref": "refs/heads/migration-pr-1", "sha": "abc" })
        );
    }
}
