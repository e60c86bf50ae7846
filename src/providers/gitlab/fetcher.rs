use log::debug;
use reqwest::Response;

use crate::error::{BoxError, RefsError, Result};
use crate::governor::{RateGovernor, RatePolicy};

use super::client::GitLabClient;
use super::types::{MergeRequestDetail, MergeRequestRef, MergeRequestSummary};

/// GitLab's maximum page size.
pub const PAGE_SIZE: u32 = 100;

const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Counters from one completed sweep over a project.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: u32,
    /// Summaries whose detail record was requested
    pub visited: usize,
    /// Refs handed to the sink
    pub emitted: usize,
    /// Merge requests without a head SHA
    pub skipped: usize,
}

/// Walks every merge request of a project (all states) and streams each
/// one's head ref to a sink.
///
/// One request is in flight at a time. Listing and detail requests each pass
/// through the fetcher's own [`RateGovernor`], so the governor sees every
/// response, not one per page.
pub struct MergeRequestFetcher<'a> {
    client: &'a GitLabClient,
    governor: RateGovernor,
}

impl<'a> MergeRequestFetcher<'a> {
    pub fn new(client: &'a GitLabClient, policy: RatePolicy) -> Self {
        Self {
            client,
            governor: RateGovernor::new(policy),
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Fetches all merge requests of `project_path` and calls `sink` for each
    /// one that has a head SHA, in the order GitLab lists them.
    ///
    /// # Errors
    ///
    /// Stops at the first failure and returns it:
    /// - [`RefsError::PageFetch`] when a listing page cannot be fetched or parsed
    /// - [`RefsError::MergeRequestFetch`] when a detail lookup fails
    /// - [`RefsError::Sink`] when `sink` rejects a ref
    ///
    /// Refs accepted by `sink` before the failure stay accepted.
    pub async fn fetch<F, E>(&mut self, project_path: &str, mut sink: F) -> Result<FetchStats>
    where
        F: FnMut(MergeRequestRef) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        let mut stats = FetchStats::default();
        let mut page: u32 = 1;

        loop {
            let (summaries, next_page) = self
                .fetch_page(project_path, page)
                .await
                .map_err(|e| RefsError::PageFetch {
                    page,
                    source: Box::new(e),
                })?;
            stats.pages += 1;

            debug!(
                "Processing page {page}: found {} merge requests",
                summaries.len()
            );

            for summary in summaries {
                let detail = self
                    .fetch_detail(project_path, summary.iid)
                    .await
                    .map_err(|e| RefsError::MergeRequestFetch {
                        iid: summary.iid,
                        source: Box::new(e),
                    })?;
                stats.visited += 1;

                let Some(mr_ref) = detail.into_ref() else {
                    debug!("Merge request !{} has no head SHA, skipping", summary.iid);
                    stats.skipped += 1;
                    continue;
                };

                let iid = mr_ref.iid;
                sink(mr_ref).map_err(|e| RefsError::Sink {
                    iid,
                    source: e.into(),
                })?;
                stats.emitted += 1;
            }

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(stats)
    }

    /// Eager variant of [`fetch`](Self::fetch) that keeps every ref in memory.
    pub async fn collect(&mut self, project_path: &str) -> Result<Vec<MergeRequestRef>> {
        let mut refs = Vec::new();
        self.fetch(project_path, |mr_ref| {
            refs.push(mr_ref);
            Ok::<_, RefsError>(())
        })
        .await?;
        Ok(refs)
    }

    async fn fetch_page(
        &mut self,
        project_path: &str,
        page: u32,
    ) -> Result<(Vec<MergeRequestSummary>, Option<u32>)> {
        let url = self.client.merge_requests_url(project_path)?;
        let query = [
            ("state", "all".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];

        let client = self.client;
        let response = self
            .governor
            .send(|| client.auth_request(client.client().get(url.clone()).query(&query)))
            .await?;

        let next_page = next_page(&response);
        let summaries = response.json().await?;
        Ok((summaries, next_page))
    }

    async fn fetch_detail(&mut self, project_path: &str, iid: u64) -> Result<MergeRequestDetail> {
        let url = self.client.merge_request_url(project_path, iid)?;

        let client = self.client;
        let response = self
            .governor
            .send(|| client.auth_request(client.client().get(url.clone())))
            .await?;

        Ok(response.json().await?)
    }
}

/// Reads the pagination cursor; absent, empty or `0` means last page.
fn next_page(response: &Response) -> Option<u32> {
    response
        .headers()
        .get(NEXT_PAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&page| page > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use std::time::Duration;

    const LIST_PATH: &str = "/api/v4/projects/group%2Fproject/merge_requests";

    fn fast_policy() -> RatePolicy {
        RatePolicy {
            base_interval: Duration::ZERO,
            cautious_interval: Duration::ZERO,
            critical_interval: Duration::ZERO,
            default_retry_after: Duration::ZERO,
            ..RatePolicy::default()
        }
    }

    fn sha_for(iid: u64) -> String {
        format!("{iid:040x}")
    }

    fn summaries_body(iids: impl IntoIterator<Item = u64>) -> String {
        let items: Vec<_> = iids
            .into_iter()
            .map(|iid| serde_json::json!({ "id": 1000 + iid, "iid": iid, "state": "merged" }))
            .collect();
        serde_json::Value::Array(items).to_string()
    }

    fn detail_body(iid: u64, head_sha: &str) -> String {
        serde_json::json!({
            "id": 1000 + iid,
            "iid": iid,
            "diff_refs": { "base_sha": "base", "head_sha": head_sha, "start_sha": "start" }
        })
        .to_string()
    }

    async fn mock_page(server: &mut ServerGuard, page: u32, iids: &[u64], next: &str) {
        server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "all".into()),
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), page.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("X-Next-Page", next)
            .with_body(summaries_body(iids.iter().copied()))
            .expect(1)
            .create_async()
            .await;
    }

    async fn mock_detail(server: &mut ServerGuard, iid: u64, head_sha: &str) {
        server
            .mock("GET", format!("{LIST_PATH}/{iid}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(detail_body(iid, head_sha))
            .expect(1)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_two_pages_skip_empty_sha_in_platform_order() {
        let mut server = Server::new_async().await;
        let first: Vec<u64> = (1..=100).collect();
        let second: Vec<u64> = (101..=150).collect();
        mock_page(&mut server, 1, &first, "2").await;
        mock_page(&mut server, 2, &second, "").await;
        for iid in 1..=150 {
            let sha = if iid == 37 { String::new() } else { sha_for(iid) };
            mock_detail(&mut server, iid, &sha).await;
        }

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());
        let mut received = Vec::new();

        let stats = fetcher
            .fetch("group/project", |mr_ref| {
                received.push(mr_ref);
                Ok::<_, RefsError>(())
            })
            .await
            .unwrap();

        assert_eq!(received.len(), 149);
        assert!(received.iter().all(|r| r.iid != 37));
        let expected: Vec<u64> = (1..=150).filter(|&iid| iid != 37).collect();
        let order: Vec<u64> = received.iter().map(|r| r.iid).collect();
        assert_eq!(order, expected);
        assert_eq!(
            received[0],
            MergeRequestRef {
                id: 1001,
                iid: 1,
                head_sha: sha_for(1),
            }
        );
        assert_eq!(
            stats,
            FetchStats {
                pages: 2,
                visited: 150,
                emitted: 149,
                skipped: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_detail_failure_reports_iid_after_prior_sink_calls() {
        let mut server = Server::new_async().await;
        let iids: Vec<u64> = (1..=100).collect();
        mock_page(&mut server, 1, &iids, "").await;
        for iid in 1..80 {
            mock_detail(&mut server, iid, &sha_for(iid)).await;
        }
        server
            .mock("GET", format!("{LIST_PATH}/80").as_str())
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());
        let mut received = Vec::new();

        let err = fetcher
            .fetch("group/project", |mr_ref| {
                received.push(mr_ref.iid);
                Ok::<_, RefsError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RefsError::MergeRequestFetch { iid: 80, .. }));
        assert!(err.to_string().contains("80"));
        assert_eq!(err.status(), Some(500));
        assert_eq!(received, (1..80).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_sink_error_aborts_immediately() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, &[1, 2, 3], "").await;
        mock_detail(&mut server, 1, &sha_for(1)).await;
        mock_detail(&mut server, 2, &sha_for(2)).await;
        let third = server
            .mock("GET", format!("{LIST_PATH}/3").as_str())
            .with_status(200)
            .with_body(detail_body(3, &sha_for(3)))
            .expect(0)
            .create_async()
            .await;

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());
        let mut calls = 0;

        let err = fetcher
            .fetch("group/project", |mr_ref| {
                calls += 1;
                if mr_ref.iid == 2 {
                    Err(std::io::Error::other("disk full"))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        third.assert_async().await;
        assert_eq!(calls, 2);
        assert!(matches!(err, RefsError::Sink { iid: 2, .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn test_listing_failure_reports_page() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"404 Project Not Found"}"#)
            .create_async()
            .await;

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());

        let err = fetcher.collect("group/project").await.unwrap_err();

        assert!(matches!(err, RefsError::PageFetch { page: 1, .. }));
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_empty_project_never_calls_sink() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, &[], "").await;

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());
        let mut calls = 0;

        let stats = fetcher
            .fetch("group/project", |_| {
                calls += 1;
                Ok::<_, RefsError>(())
            })
            .await
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.visited, 0);
    }

    #[tokio::test]
    async fn test_requests_carry_bearer_token() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer glpat-test")
            .with_status(200)
            .with_body(summaries_body([5]))
            .create_async()
            .await;
        let detail = server
            .mock("GET", format!("{LIST_PATH}/5").as_str())
            .match_header("authorization", "Bearer glpat-test")
            .with_status(200)
            .with_body(detail_body(5, "cafe"))
            .create_async()
            .await;

        let client =
            GitLabClient::new(&server.url(), Some(crate::auth::Token::from("glpat-test"))).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());

        let refs = fetcher.collect("group/project").await.unwrap();

        list.assert_async().await;
        detail.assert_async().await;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].head_sha, "cafe");
    }

    #[tokio::test]
    async fn test_quota_headers_from_detail_responses_escalate_governor() {
        let mut server = Server::new_async().await;
        mock_page(&mut server, 1, &[1], "0").await;
        server
            .mock("GET", format!("{LIST_PATH}/1").as_str())
            .with_status(200)
            .with_header("RateLimit-Remaining", "4")
            .with_body(detail_body(1, "abc"))
            .create_async()
            .await;

        let client = GitLabClient::new(&server.url(), None).unwrap();
        let mut fetcher = MergeRequestFetcher::new(&client, fast_policy());

        fetcher.collect("group/project").await.unwrap();

        assert_eq!(
            fetcher.governor().tier(),
            crate::governor::RateTier::Critical
        );
    }
}
