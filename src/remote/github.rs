//! HTTP client for the repository contents API.
//!
//! Implements [`ContentStore`] against `GET/PUT /repos/{owner}/{repo}/contents/{path}`.
//! Every request carries the cached bearer token; a request without one fails
//! with [`InventoryError::AuthRequired`] and a `401` response clears the cache
//! and fails with [`InventoryError::AuthExpired`]. No request timeout is set.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{join_repo_path, CommitResult, ContentStore, RemoteFile};
use crate::config::InventoryConfig;
use crate::csv_handler::encode_content;
use crate::error::{InventoryError, Result};
use crate::util::short_sha;

/// API version header value sent with every request.
const API_VERSION: &str = "2022-11-28";

/// Request body of a create/update call.
#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// Relevant parts of a create/update response.
#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
    #[serde(default)]
    commit: Option<PutCommit>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    path: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutCommit {
    sha: String,
}

/// What a response answers; decides how error statuses are read.
#[derive(Debug, Clone, Copy)]
enum Request<'a> {
    Read,
    Write { sha: Option<&'a str> },
}

/// True when a 422 reply to a write is about the version token.
///
/// The API answers 422 both for a missing or mismatched `sha` and for plain
/// validation failures such as an unknown branch.
fn is_sha_rejection(body: &str, sent_sha: Option<&str>) -> bool {
    let body = body.to_ascii_lowercase();
    if !body.contains("sha") {
        return false;
    }
    sent_sha.is_none() || body.contains("does not match") || body.contains("wasn't supplied")
}

/// Client for one repository on the contents API.
///
/// The client is `Send + Sync`; share it behind an `Arc`. The token cache is
/// the only mutable state.
///
/// # Example
///
/// ```rust,ignore
/// use lab_inventory::config::InventoryConfig;
/// use lab_inventory::remote::{ContentStore, ContentsClient};
///
/// let client = ContentsClient::new(&config)?;
/// client.set_token("ghp_...");
/// let csv = client.get_csv_content("celllines.csv").await?;
/// ```
pub struct ContentsClient {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: Option<String>,
    data_dir: String,
    token: RwLock<Option<String>>,
}

impl ContentsClient {
    /// Creates a client from configuration. The configured token, if any,
    /// seeds the token cache.
    pub fn new(config: &InventoryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Url::parse(&config.api_base).map_err(|e| {
            InventoryError::InvalidArgument(format!("invalid api_base '{}': {}", config.api_base, e))
        })?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            owner: config.owner.trim().to_string(),
            repo: config.repo.trim().to_string(),
            branch: config.branch.clone().filter(|b| !b.trim().is_empty()),
            data_dir: config.data_dir.clone(),
            token: RwLock::new(config.token.clone().filter(|t| !t.trim().is_empty())),
        })
    }

    /// Stores a bearer token for subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    /// Forgets the cached bearer token.
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// True when a bearer token is cached.
    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn bearer(&self) -> Result<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(InventoryError::AuthRequired)
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(InventoryError::NotConfigured(
                "repository owner and name are required".to_string(),
            ))
        }
    }

    /// `{api_base}/repos/{owner}/{repo}/contents/{path}` with each segment escaped.
    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            InventoryError::InvalidArgument(format!("invalid api_base '{}': {}", self.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                InventoryError::InvalidArgument(format!(
                    "api_base '{}' cannot carry a path",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Maps non-success statuses onto the error taxonomy.
    async fn check(&self, response: Response, path: &str, request: Request<'_>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let conflict = || InventoryError::OptimisticConflict {
            path: path.to_string(),
            attempts: 1,
        };
        match (status, request) {
            (StatusCode::UNAUTHORIZED, _) => {
                self.clear_token();
                Err(InventoryError::AuthExpired)
            }
            (StatusCode::NOT_FOUND, _) => Err(InventoryError::NotFound(path.to_string())),
            (StatusCode::CONFLICT, Request::Write { .. }) => Err(conflict()),
            (StatusCode::UNPROCESSABLE_ENTITY, Request::Write { sha }) => {
                let body = response.text().await.unwrap_or_default();
                if is_sha_rejection(&body, sha) {
                    Err(conflict())
                } else {
                    Err(InventoryError::RemoteUnavailable {
                        status: Some(status.as_u16()),
                        message: body.trim().to_string(),
                    })
                }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(InventoryError::RemoteUnavailable {
                    status: Some(status.as_u16()),
                    message: body.trim().to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl ContentStore for ContentsClient {
    fn is_configured(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty()
    }

    fn describe(&self) -> String {
        format!("github:{}/{}", self.owner, self.repo)
    }

    fn path_for(&self, filename: &str) -> String {
        join_repo_path(&self.data_dir, filename)
    }

    async fn get_file(&self, path: &str) -> Result<RemoteFile> {
        self.ensure_configured()?;
        let token = self.bearer()?;
        let url = self.contents_url(path)?;
        debug!("GET {}", url);

        let mut request = self.http.get(url).bearer_auth(token);
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch.as_str())]);
        }
        let response = self.check(request.send().await?, path, Request::Read).await?;
        let mut file: RemoteFile = response.json().await?;
        if file.path.is_empty() {
            file.path = path.to_string();
        }
        Ok(file)
    }

    async fn download(&self, url: &str) -> Result<String> {
        let token = self.bearer()?;
        debug!("GET {} (raw)", url);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/vnd.github.raw")
            .send()
            .await?;
        let response = self.check(response, url, Request::Read).await?;
        Ok(response.text().await?)
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<CommitResult> {
        self.ensure_configured()?;
        let token = self.bearer()?;
        let url = self.contents_url(path)?;
        debug!("PUT {} (sha: {:?})", url, sha);

        let body = PutContents {
            message,
            content: encode_content(content),
            sha,
            branch: self.branch.as_deref(),
        };
        let response = self.http.put(url).bearer_auth(token).json(&body).send().await?;
        let response = self.check(response, path, Request::Write { sha }).await?;
        let reply: PutResponse = response.json().await?;

        info!(
            "Committed {} at {}{}",
            reply.content.path,
            short_sha(&reply.content.sha),
            if sha.is_none() { " (created)" } else { "" }
        );
        Ok(CommitResult {
            path: reply.content.path,
            sha: reply.content.sha,
            commit_sha: reply.commit.map(|c| c.sha),
        })
    }
}
