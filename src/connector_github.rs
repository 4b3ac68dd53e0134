//! GitHub content gateway.
//!
//! Implements [`ContentGateway`] over the GitHub REST "contents" API and
//! [`VersionHistoryProvider`] over the commits API, using `reqwest`.
//!
//! # Configuration
//!
//! ```toml
//! [repository]
//! owner = "TryGhost"
//! name = "Ghost"
//! # branch = "main"
//!
//! [gateway]
//! base_url = "https://api.github.com"
//! token_env = "GITHUB_TOKEN"
//! ```
//!
//! # Error classification
//!
//! | Response | [`FetchError`] |
//! |----------|----------------|
//! | 404 | `NotFound` |
//! | 401 | `AuthRequired` |
//! | 403 with `x-ratelimit-remaining: 0` | `RateLimited` (from `x-ratelimit-reset`) |
//! | other 403 | `Forbidden` |
//! | 429 | `RateLimited` (from `retry-after`) |
//! | timeout / connect error / 5xx | `Network`, retried with backoff |
//! | anything else | `Unknown` |
//!
//! # Pagination
//!
//! Directory listings follow `Link: <...>; rel="next"` up to
//! `gateway.max_pages` pages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::{GatewayConfig, RepositoryConfig};
use crate::traits::{
    ChangeInfo, ContentGateway, ContentItem, FetchError, ItemKind, VersionHistoryProvider,
};

/// Bytes inspected for NUL when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

#[derive(Debug, Deserialize)]
struct ApiItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

impl ApiItem {
    fn to_content_item(&self) -> ContentItem {
        let kind = match self.kind.as_str() {
            "dir" => ItemKind::Dir,
            "symlink" => ItemKind::Symlink,
            "submodule" => ItemKind::Submodule,
            _ => ItemKind::File,
        };
        ContentItem {
            name: self.name.clone(),
            path: self.path.clone(),
            kind,
            size: if kind == ItemKind::File { self.size } else { None },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ApiItem>),
    Single(ApiItem),
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<CommitAuthor>,
    #[serde(default)]
    committer: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

/// A [`ContentGateway`] for one GitHub repository.
pub struct GitHubGateway {
    client: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
    branch: Option<String>,
    token: Option<String>,
    user_agent: String,
    max_retries: u32,
    max_pages: u32,
    per_page: u32,
    round_trips: AtomicU64,
}

impl GitHubGateway {
    /// Build a gateway. The bearer token, if any, is read from the
    /// environment variable named by `gateway.token_env`.
    pub fn new(repository: &RepositoryConfig, gateway: &GatewayConfig) -> Result<Self> {
        let token = gateway
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());
        Self::with_token(repository, gateway, token)
    }

    pub fn with_token(
        repository: &RepositoryConfig,
        gateway: &GatewayConfig,
        token: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(gateway.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: gateway.base_url.trim_end_matches('/').to_string(),
            owner: repository.owner.clone(),
            repo: repository.name.clone(),
            branch: repository.branch.clone(),
            token,
            user_agent: gateway.user_agent.clone(),
            max_retries: gateway.max_retries,
            max_pages: gateway.max_pages.max(1),
            per_page: gateway.per_page.clamp(1, 100),
            round_trips: AtomicU64::new(0),
        })
    }

    /// `{base}/repos/{owner}/{repo}/{endpoint}[/{path}]`.
    fn api_url(&self, endpoint: &str, path: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::Unknown(format!("invalid base URL {}: {}", self.base_url, e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::Unknown(format!("invalid base URL {}", self.base_url)))?;
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str(), endpoint])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url, FetchError> {
        let mut url = self.api_url("contents", path)?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    /// GET with classification and retry.
    ///
    /// Retry strategy:
    /// - network error or 5xx → retry with exponential backoff
    /// - everything else → classify and return immediately
    async fn get(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .get(url.clone())
                .header(ACCEPT, "application/vnd.github+json")
                .header(USER_AGENT, &self.user_agent)
                .header("X-GitHub-Api-Version", "2022-11-28");
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        self.round_trips.fetch_add(1, Ordering::Relaxed);
                        return Ok(response);
                    }
                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    let err = classify_status(status, &headers, &body);
                    if status.is_server_error() {
                        debug!(%url, %status, attempt, "server error, will retry");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    debug!(%url, error = %e, attempt, "request failed");
                    last_err = Some(FetchError::Network(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| FetchError::Network("request failed after retries".into())))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<(T, Option<String>), FetchError> {
        let response = self.get(url).await?;
        let next = next_link(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Unknown(format!("unexpected response: {}", e)))?;
        Ok((value, next))
    }

    async fn download(&self, raw_url: &str) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(raw_url)
            .map_err(|e| FetchError::Unknown(format!("invalid download URL: {}", e)))?;
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ContentGateway for GitHubGateway {
    async fn list(&self, path: &str) -> Result<Vec<ContentItem>, FetchError> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());

        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            if pages >= self.max_pages {
                debug!(path, pages, "listing truncated at page limit");
                break;
            }
            pages += 1;
            let (response, next_url): (ContentsResponse, _) = self.get_json(page_url).await?;
            match response {
                ContentsResponse::Listing(page) => {
                    items.extend(page.iter().map(ApiItem::to_content_item));
                }
                ContentsResponse::Single(item) => return Ok(vec![item.to_content_item()]),
            }
            next = next_url.and_then(|u| Url::parse(&u).ok());
        }

        Ok(items)
    }

    async fn read(&self, path: &str) -> Result<String, FetchError> {
        let url = self.contents_url(path)?;
        let (response, _): (ContentsResponse, _) = self.get_json(url).await?;
        let item = match response {
            ContentsResponse::Single(item) => item,
            ContentsResponse::Listing(_) => {
                return Err(FetchError::Unknown(format!("{} is a directory", path)))
            }
        };
        if item.kind != "file" {
            return Err(FetchError::Unknown(format!("{} is a {}", path, item.kind)));
        }

        let inline = item
            .content
            .as_deref()
            .filter(|c| !c.is_empty() && item.encoding.as_deref() == Some("base64"));
        let bytes = match (inline, item.download_url.as_deref()) {
            (Some(content), _) => decode_base64(content)?,
            (None, Some(raw)) => self.download(raw).await?,
            (None, None) => return Err(FetchError::Unknown(format!("{} has no content", path))),
        };
        bytes_to_text(&bytes)
    }

    fn confirmed_round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }
}

/// Commit history for paths of the gateway's repository.
pub struct GitHubHistory {
    gateway: Arc<GitHubGateway>,
}

impl GitHubHistory {
    pub fn new(gateway: Arc<GitHubGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl VersionHistoryProvider for GitHubHistory {
    async fn latest_change(&self, path: &str) -> Result<Option<ChangeInfo>, FetchError> {
        let mut url = self.gateway.api_url("commits", "")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("path", path).append_pair("per_page", "1");
            if let Some(branch) = &self.gateway.branch {
                query.append_pair("sha", branch);
            }
        }
        let (commits, _): (Vec<CommitEntry>, _) = self.gateway.get_json(url).await?;
        let Some(first) = commits.into_iter().next() else {
            return Ok(None);
        };
        let author = first.commit.author.or(first.commit.committer);
        Ok(author.and_then(|a| {
            a.date.map(|timestamp| ChangeInfo {
                timestamp,
                author: a.name,
                author_email: a.email,
            })
        }))
    }
}

/// Map a non-success response to a [`FetchError`].
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    let message = api_message(body).unwrap_or_else(|| status.to_string());
    match status.as_u16() {
        404 => FetchError::NotFound(message),
        401 => FetchError::AuthRequired(message),
        403 if header_str(headers, "x-ratelimit-remaining") == Some("0") => {
            FetchError::RateLimited {
                retry_after: rate_limit_reset(headers),
            }
        }
        403 => FetchError::Forbidden(message),
        429 => FetchError::RateLimited {
            retry_after: header_str(headers, RETRY_AFTER.as_str())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .or_else(|| rate_limit_reset(headers)),
        },
        s if (500..600).contains(&s) => FetchError::Network(format!("server error {}", status)),
        _ => FetchError::Unknown(format!("unexpected status {}: {}", status, message)),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    let reset: i64 = header_str(headers, "x-ratelimit-reset")?.trim().parse().ok()?;
    let wait = reset - Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

fn api_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// The `rel="next"` target of a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if params.split(';').any(|p| p.trim() == "rel=\"next\"") {
            Some(
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    })
}

fn decode_base64(content: &str) -> Result<Vec<u8>, FetchError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FetchError::Unknown(format!("invalid base64 content: {}", e)))
}

fn bytes_to_text(bytes: &[u8]) -> Result<String, FetchError> {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return Err(FetchError::Unknown("binary content".to_string()));
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn next_link_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.github.com/x?page=2>; rel=\"next\", <https://api.github.com/x?page=5>; rel=\"last\"",
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/x?page=2")
        );
        assert_eq!(next_link(&HeaderMap::new()), None);
    }

    #[test]
    fn status_classification() {
        let empty = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, &empty, r#"{"message":"Not Found"}"#),
            FetchError::NotFound(m) if m == "Not Found"
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, &empty, ""),
            FetchError::AuthRequired(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, &empty, ""),
            FetchError::Forbidden(_)
        ));

        let mut limited = HeaderMap::new();
        limited.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, &limited, ""),
            FetchError::RateLimited { .. }
        ));

        let mut retry = HeaderMap::new();
        retry.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &retry, ""),
            FetchError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, &empty, ""),
            FetchError::Network(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::IM_A_TEAPOT, &empty, ""),
            FetchError::Unknown(_)
        ));
    }

    #[test]
    fn base64_with_newlines_decodes() {
        let bytes = decode_base64("aGVs\nbG8=\n").unwrap();
        assert_eq!(bytes_to_text(&bytes).unwrap(), "hello");
    }

    #[test]
    fn binary_content_is_rejected() {
        let err = bytes_to_text(&[0x89, b'P', b'N', b'G', 0, 0]).unwrap_err();
        assert!(matches!(err, FetchError::Unknown(m) if m == "binary content"));
    }

    #[test]
    fn urls_are_built_from_segments() {
        let repo = RepositoryConfig {
            owner: "o".into(),
            name: "r".into(),
            branch: Some("dev".into()),
        };
        let gateway = GitHubGateway::with_token(&repo, &GatewayConfig::default(), None).unwrap();
        let url = gateway.contents_url("src/my file.js").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/o/r/contents/src/my%20file.js?ref=dev"
        );
        let root = gateway.contents_url("").unwrap();
        assert_eq!(root.path(), "/repos/o/r/contents");
    }
}
