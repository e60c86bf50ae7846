use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use url::Url;

use crate::auth::Token;
use crate::error::{RefsError, Result};
use crate::governor::{RateGovernor, RatePolicy};
use crate::refs_file::RefRecord;

use super::types::{ApiMessage, BranchOutcome, CreateRefRequest, CreateStats, GitHubRepo};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const BRANCH_PREFIX: &str = "migration-pr-";

/// Branch name used for a migrated merge request.
pub fn branch_name(iid: u64) -> String {
    format!("{BRANCH_PREFIX}{iid}")
}

/// GitHub REST client that recreates merge request heads as branches.
///
/// Requests are sequential and paced by the client's own [`RateGovernor`].
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for the GitHub API, always ending in '/'
    api_url: Url,
    token: Option<Token>,
    governor: RateGovernor,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `token` - Optional GitHub personal access token
    /// * `policy` - Pacing applied to every request
    pub fn new(base_url: &str, token: Option<Token>, policy: RatePolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("gl-create-refs/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| RefsError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| RefsError::Config(format!("Invalid GitHub API URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            governor: RateGovernor::new(policy),
        })
    }

    fn refs_url(&self, repo: &GitHubRepo) -> Result<Url> {
        self.api_url
            .join(&format!(
                "repos/{}/{}/git/refs",
                urlencoding::encode(&repo.owner),
                urlencoding::encode(&repo.repo)
            ))
            .map_err(|e| RefsError::Config(format!("Invalid refs URL: {e}")))
    }

    /// Creates `refs/heads/<branch>` pointing at `sha`.
    ///
    /// A branch that already exists is reported as
    /// [`BranchOutcome::AlreadyExists`] and left untouched.
    pub async fn create_branch(
        &mut self,
        repo: &GitHubRepo,
        branch: &str,
        sha: &str,
    ) -> Result<BranchOutcome> {
        let url = self.refs_url(repo)?;
        let body = CreateRefRequest {
            ref_: format!("refs/heads/{branch}"),
            sha,
        };

        let client = &self.client;
        let token = &self.token;
        let result = self
            .governor
            .send(|| {
                let request = client.post(url.clone()).json(&body);
                match token {
                    Some(token) => request.bearer_auth(token.as_str()),
                    None => request,
                }
            })
            .await;

        match result {
            Ok(_) => {
                debug!("Created branch {branch} at {sha}");
                Ok(BranchOutcome::Created)
            }
            Err(RefsError::Api { status, message })
                if status == StatusCode::UNPROCESSABLE_ENTITY.as_u16()
                    && is_already_exists(&message) =>
            {
                warn!("Branch {branch} already exists in {repo}, skipping");
                Ok(BranchOutcome::AlreadyExists)
            }
            Err(e) => Err(RefsError::BranchCreate {
                branch: branch.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// Creates one branch per record, in order, stopping at the first failure.
    pub async fn create_branches<F>(
        &mut self,
        repo: &GitHubRepo,
        records: &[RefRecord],
        mut on_progress: F,
    ) -> Result<CreateStats>
    where
        F: FnMut(&RefRecord, BranchOutcome),
    {
        let mut stats = CreateStats::default();

        for record in records {
            let outcome = self
                .create_branch(repo, &branch_name(record.iid), &record.head_sha)
                .await?;
            match outcome {
                BranchOutcome::Created => stats.created += 1,
                BranchOutcome::AlreadyExists => stats.existing += 1,
            }
            on_progress(record, outcome);
        }

        Ok(stats)
    }
}

fn is_already_exists(body: &str) -> bool {
    serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.to_string())
        .to_lowercase()
        .contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    const REFS_PATH: &str = "/repos/octo/migrated/git/refs";

    fn fast_policy() -> RatePolicy {
        RatePolicy {
            base_interval: Duration::ZERO,
            cautious_interval: Duration::ZERO,
            critical_interval: Duration::ZERO,
            default_retry_after: Duration::ZERO,
            ..RatePolicy::default()
        }
    }

    fn repo() -> GitHubRepo {
        GitHubRepo::parse("octo/migrated").unwrap()
    }

    #[test]
    fn test_branch_name() {
        let cases = [
            (1, "migration-pr-1"),
            (16, "migration-pr-16"),
            (123, "migration-pr-123"),
            (1234, "migration-pr-1234"),
            (999_999, "migration-pr-999999"),
        ];

        for (iid, expected) in cases {
            assert_eq!(branch_name(iid), expected);
        }
    }

    #[tokio::test]
    async fn test_create_branch_posts_ref_and_sha() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", REFS_PATH)
            .match_header("authorization", "Bearer ghp-test")
            .match_body(Matcher::Json(serde_json::json!({
                "ref": "refs/heads/migration-pr-7",
                "sha": "abc123"
            })))
            .with_status(201)
            .with_body(r#"{"ref":"refs/heads/migration-pr-7"}"#)
            .create_async()
            .await;

        let mut client =
            GitHubClient::new(&server.url(), Some(Token::from("ghp-test")), fast_policy()).unwrap();

        let outcome = client
            .create_branch(&repo(), "migration-pr-7", "abc123")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, BranchOutcome::Created);
    }

    #[tokio::test]
    async fn test_existing_branch_is_skipped() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", REFS_PATH)
            .with_status(422)
            .with_body(r#"{"message":"Reference already exists"}"#)
            .create_async()
            .await;

        let mut client = GitHubClient::new(&server.url(), None, fast_policy()).unwrap();

        let outcome = client
            .create_branch(&repo(), "migration-pr-1", "abc")
            .await
            .unwrap();

        assert_eq!(outcome, BranchOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_unknown_sha_is_an_error_naming_the_branch() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", REFS_PATH)
            .with_status(422)
            .with_body(r#"{"message":"Object does not exist"}"#)
            .create_async()
            .await;

        let mut client = GitHubClient::new(&server.url(), None, fast_policy()).unwrap();

        let err = client
            .create_branch(&repo(), "migration-pr-9", "dead")
            .await
            .unwrap_err();

        assert!(matches!(err, RefsError::BranchCreate { ref branch, .. } if branch == "migration-pr-9"));
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn test_create_branches_counts_outcomes_in_order() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", REFS_PATH)
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "ref": "refs/heads/migration-pr-2" }),
            ))
            .with_status(422)
            .with_body(r#"{"message":"Reference already exists"}"#)
            .create_async()
            .await;
        server
            .mock("POST", REFS_PATH)
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "ref": "refs/heads/migration-pr-1" }),
            ))
            .with_status(201)
            .create_async()
            .await;
        server
            .mock("POST", REFS_PATH)
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "ref": "refs/heads/migration-pr-3" }),
            ))
            .with_status(201)
            .create_async()
            .await;

        let mut client = GitHubClient::new(&server.url(), None, fast_policy()).unwrap();
        let records = vec![
            RefRecord {
                iid: 1,
                head_sha: "aa".to_string(),
            },
            RefRecord {
                iid: 2,
                head_sha: "bb".to_string(),
            },
            RefRecord {
                iid: 3,
                head_sha: "cc".to_string(),
            },
        ];
        let mut seen = Vec::new();

        let stats = client
            .create_branches(&repo(), &records, |record, outcome| {
                seen.push((record.iid, outcome));
            })
            .await
            .unwrap();

        assert_eq!(
            stats,
            CreateStats {
                created: 2,
                existing: 1,
            }
        );
        assert_eq!(
            seen,
            vec![
                (1, BranchOutcome::Created),
                (2, BranchOutcome::AlreadyExists),
                (3, BranchOutcome::Created),
            ]
        );
    }
}
