use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{ContentSource, RemoteContent, RemoteEntry, RemoteNode, SourceError};
use crate::ContentReference;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Item of the contents API response
#[derive(Debug, Deserialize)]
struct ContentsItem {
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentsItem>),
    Single(ContentsItem),
}

/// Reads repositories through the GitHub contents API
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(token: Option<String>) -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_API_URL, token, Duration::from_secs(30))
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn contents_url(&self, reference: &ContentReference) -> String {
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            reference.namespace.owner,
            reference.namespace.collection,
            reference.api_path()
        );
        if let Some(rev) = reference.version.as_revision() {
            url.push_str("?ref=");
            url.push_str(rev);
        }
        url
    }

    async fn get(
        &self,
        url: &str,
        accept: &str,
        reference: &ContentReference,
    ) -> Result<Response, SourceError> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, "promptjudge");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        check_status(response, reference).await
    }

    async fn contents(&self, reference: &ContentReference) -> Result<ContentsResponse, SourceError> {
        let url = self.contents_url(reference);
        debug!(%url, "Fetching contents");
        let response = self
            .get(&url, "application/vnd.github+json", reference)
            .await?;
        response
            .json::<ContentsResponse>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn rate_limit_exhausted(response: &Response) -> bool {
    response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

async fn check_status(
    response: Response,
    reference: &ContentReference,
) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reference = reference.to_string();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(SourceError::NotFound { reference }),
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited {
            retry_after: retry_after(&response),
        }),
        StatusCode::FORBIDDEN if rate_limit_exhausted(&response) => {
            Err(SourceError::RateLimited {
                retry_after: retry_after(&response),
            })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(SourceError::PermissionDenied { reference, message })
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(SourceError::Malformed { reference, message })
        }
        _ => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            if status.is_server_error() {
                Err(SourceError::Server {
                    status: status.as_u16(),
                    message,
                })
            } else {
                Err(SourceError::InvalidResponse(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    message
                )))
            }
        }
    }
}

fn decode_inline(content: &str) -> Result<Vec<u8>, SourceError> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| SourceError::InvalidResponse(format!("bad base64 content: {}", e)))
}

#[async_trait]
impl ContentSource for GitHubSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn describe(&self, reference: &ContentReference) -> Result<RemoteNode, SourceError> {
        match self.contents(reference).await? {
            ContentsResponse::Listing(items) => Ok(RemoteNode::Collection {
                entries: items
                    .into_iter()
                    .filter(|item| item.item_type == "file" || item.item_type == "dir")
                    .map(|item| RemoteEntry {
                        is_collection: item.item_type == "dir",
                        name: item.name,
                        path: item.path,
                        size: item.size,
                    })
                    .collect(),
            }),
            ContentsResponse::Single(item) if item.item_type == "file" => {
                Ok(RemoteNode::File { size: item.size })
            }
            ContentsResponse::Single(item) => Err(SourceError::InvalidResponse(format!(
                "unsupported entry type '{}' at {}",
                item.item_type, item.path
            ))),
        }
    }

    async fn fetch(&self, reference: &ContentReference) -> Result<RemoteContent, SourceError> {
        let item = match self.contents(reference).await? {
            ContentsResponse::Single(item) => item,
            ContentsResponse::Listing(_) => {
                return Err(SourceError::InvalidResponse(format!(
                    "{} is a collection, not a file",
                    reference
                )))
            }
        };

        // The contents API only inlines files up to 1MB
        match (item.content.as_deref(), item.encoding.as_deref()) {
            (Some(content), Some("base64")) if !content.is_empty() => {
                Ok(RemoteContent::new(decode_inline(content)?))
            }
            _ => {
                let url = item.download_url.ok_or_else(|| {
                    SourceError::InvalidResponse(format!("no content for {}", reference))
                })?;
                let response = self.get(&url, "application/vnd.github.raw", reference).await?;
                let bytes = response.bytes().await?;
                Ok(RemoteContent::new(bytes.to_vec()))
            }
        }
    }
}
