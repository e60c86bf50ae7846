use reqwest::Client;
use url::Url;

use crate::auth::Token;
use crate::error::{RefsError, Result};

pub const DEFAULT_BASE_URL: &str = "https://gitlab.com";

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gl-create-refs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RefsError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last path segment unless it ends with '/'
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let api_url = Url::parse(&base)
            .map_err(|e| RefsError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| RefsError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Helper to build authenticated requests
    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Construct project base URL
    pub fn project_url(&self, project_path: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project_path)))
            .map_err(|e| RefsError::Config(format!("Invalid project URL: {e}")))
    }

    pub fn merge_requests_url(&self, project_path: &str) -> Result<Url> {
        self.project_url(project_path)?
            .join("merge_requests")
            .map_err(|e| RefsError::Config(format!("Invalid merge requests URL: {e}")))
    }

    pub fn merge_request_url(&self, project_path: &str, iid: u64) -> Result<Url> {
        self.project_url(project_path)?
            .join(&format!("merge_requests/{iid}"))
            .map_err(|e| RefsError::Config(format!("Invalid merge request URL: {e}")))
    }
}
