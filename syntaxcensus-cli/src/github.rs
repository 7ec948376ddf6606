//! GitHub REST client backing discovery, validation, and content retrieval.

use crate::CliResult;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use syntaxcensus_core::{
    BoxFuture, ContentSource, DiscoveryConfig, DiscoverySource, FileEntry, RepositoryRecord,
    SourceError, SourceResult, Throttle,
};

const USER_AGENT: &str = "syntaxcensus";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const API_VERSION: &str = "2022-11-28";
/// Search results beyond this many are never served by the API.
const SEARCH_RESULT_CAP: usize = 1000;

/// Repository entry from the search endpoint.
#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
    stargazers_count: u64,
    forks_count: u64,
    created_at: DateTime<Utc>,
    language: Option<String>,
    description: Option<String>,
    clone_url: String,
    default_branch: String,
}

impl From<SearchItem> for RepositoryRecord {
    fn from(item: SearchItem) -> Self {
        Self {
            full_name: item.full_name,
            stars: item.stargazers_count,
            forks: item.forks_count,
            created_at: item.created_at,
            language: item.language,
            description: item.description,
            clone_url: item.clone_url,
            default_branch: item.default_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Quota reported by `GET /rate_limit`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RateQuota {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Window reset, as a Unix timestamp.
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateQuota,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Reqwest-backed GitHub client with cooperative throttling.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    throttle: Throttle,
    per_page: usize,
    max_pages: usize,
}

impl GitHubClient {
    /// Build a client from discovery settings and an optional token.
    pub fn new(config: &DiscoveryConfig, token: Option<String>) -> CliResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
            throttle: Throttle::new(config.request_delay()),
            per_page: config.per_page as usize,
            max_pages: config.max_pages as usize,
        })
    }

    /// Whether a credential is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Current quota for the configured credential.
    pub async fn rate_limit(&self) -> SourceResult<RateQuota> {
        let response = self.get("/rate_limit", &[], JSON_MEDIA_TYPE).await?;
        let payload: RateLimitResponse = decode_json(response).await?;
        Ok(payload.rate)
    }

    async fn search(&self, query: &str) -> SourceResult<Vec<RepositoryRecord>> {
        let per_page = self.per_page.to_string();
        let mut records = Vec::new();
        for page in 1..=self.max_pages {
            let page_number = page.to_string();
            let response = self
                .get(
                    "/search/repositories",
                    &[
                        ("q", query),
                        ("sort", "stars"),
                        ("order", "desc"),
                        ("per_page", per_page.as_str()),
                        ("page", page_number.as_str()),
                    ],
                    JSON_MEDIA_TYPE,
                )
                .await?;
            let payload: SearchResponse = decode_json(response).await?;
            let fetched = payload.items.len();
            records.extend(payload.items.into_iter().map(RepositoryRecord::from));
            log::debug!(
                "query `{query}` page {page}: {fetched} items of {}",
                payload.total_count
            );
            if fetched < self.per_page
                || records.len() >= payload.total_count.min(SEARCH_RESULT_CAP)
            {
                break;
            }
        }
        Ok(records)
    }

    async fn raw_file(&self, identity: &str, path: &str, reference: Option<&str>) -> SourceResult<String> {
        let endpoint = format!("/repos/{identity}/contents/{}", path.trim_start_matches('/'));
        let query: Vec<(&str, &str)> = reference.map(|r| ("ref", r)).into_iter().collect();
        let response = self.get(&endpoint, &query, RAW_MEDIA_TYPE).await?;
        response
            .text()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))
    }

    async fn tree(&self, record: &RepositoryRecord) -> SourceResult<Vec<FileEntry>> {
        let endpoint = format!(
            "/repos/{}/git/trees/{}",
            record.full_name, record.default_branch
        );
        let response = self
            .get(&endpoint, &[("recursive", "1")], JSON_MEDIA_TYPE)
            .await?;
        let payload: TreeResponse = decode_json(response).await?;
        if payload.truncated {
            log::warn!("{}: file tree truncated by the API", record.full_name);
        }
        Ok(payload
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| FileEntry {
                path: item.path,
                size: item.size.unwrap_or(0),
            })
            .collect())
    }

    async fn content(&self, record: &RepositoryRecord, path: &str) -> SourceResult<Option<String>> {
        match self
            .raw_file(&record.full_name, path, Some(&record.default_branch))
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err(SourceError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)], accept: &str) -> SourceResult<Response> {
        self.throttle.wait().await;
        let mut request = self
            .client
            .get(format!("{}{endpoint}", self.api_url))
            .query(query)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        let (remaining, reset_in) = quota_headers(response.headers());
        self.throttle.observe(remaining, reset_in);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, remaining, &body))
    }
}

impl DiscoverySource for GitHubClient {
    fn discover<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<RepositoryRecord>>> {
        Box::pin(self.search(query))
    }

    fn fetch_manifest<'a>(
        &'a self,
        identity: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, SourceResult<String>> {
        Box::pin(self.raw_file(identity, path, None))
    }
}

impl ContentSource for GitHubClient {
    fn fetch_file_tree<'a>(
        &'a self,
        record: &'a RepositoryRecord,
    ) -> BoxFuture<'a, SourceResult<Vec<FileEntry>>> {
        Box::pin(self.tree(record))
    }

    fn fetch_file_content<'a>(
        &'a self,
        record: &'a RepositoryRecord,
        path: &'a str,
    ) -> BoxFuture<'a, SourceResult<Option<String>>> {
        Box::pin(self.content(record, path))
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> SourceResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| SourceError::Decode(err.to_string()))
}

/// Remaining quota and time until reset from response headers.
fn quota_headers(headers: &HeaderMap) -> (Option<u64>, Option<Duration>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
    };
    let remaining = header("x-ratelimit-remaining").and_then(|value| u64::try_from(value).ok());
    let reset_in = header("x-ratelimit-reset").map(|reset| {
        let seconds = (reset - Utc::now().timestamp()).max(0);
        Duration::from_secs(seconds.unsigned_abs())
    });
    (remaining, reset_in)
}

/// Map a failing response onto the collaborator error taxonomy.
fn classify_status(status: StatusCode, remaining: Option<u64>, body: &str) -> SourceError {
    let message = serde_json::from_str::<ApiMessage>(body)
        .map(|payload| payload.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let lowered = message.to_lowercase();
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound,
        StatusCode::UNAUTHORIZED => SourceError::Unauthorized(message),
        StatusCode::FORBIDDEN if lowered.contains("bad credentials") => {
            SourceError::Unauthorized(message)
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            if remaining == Some(0) || lowered.contains("rate limit") =>
        {
            SourceError::RateLimited(message)
        }
        status => SourceError::Transport(format!("{status}: {message}")),
    }
}
