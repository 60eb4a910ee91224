//! Remote store module
//!
//! The inventory tables live as CSV files in a hosted content repository.
//! [`ContentStore`] is the seam over that repository: fetch a file with its
//! version token, download oversized files by link, and create or replace a
//! file under optimistic concurrency. [`ContentsClient`] talks to the real
//! content API over HTTP; [`MemoryStore`] keeps files in process with the same
//! version-token semantics.
//!
//! The provided methods build the CSV-level operations on top of the three
//! primitives, so every store shares one implementation of the large-file
//! fallback and of the "missing file means create" rule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::csv_handler::decode_content;
use crate::error::{InventoryError, Result};

pub mod github;
pub mod memory;

pub use github::ContentsClient;
pub use memory::MemoryStore;

/// A file as returned by the content API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Repository path of the file.
    #[serde(default)]
    pub path: String,
    /// Inline content. Absent or empty for files too large to inline.
    #[serde(default)]
    pub content: Option<String>,
    /// Encoding of `content`: `base64`, or `none` when it was not inlined.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Version token of this revision of the file.
    pub sha: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Direct download link for the raw file.
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteFile {
    /// Inline content if the response carried any.
    fn inline_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Result of a successful create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Repository path written.
    pub path: String,
    /// New version token of the file.
    pub sha: String,
    /// Id of the commit that carried the change, when the store reports one.
    pub commit_sha: Option<String>,
}

/// The text of a CSV file together with the version token it was read at.
///
/// `sha` is `None` when the file does not exist yet; committing such a
/// snapshot creates the file.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSnapshot {
    /// Repository path.
    pub path: String,
    /// Decoded CSV text, empty for a missing file.
    pub text: String,
    /// Version token the text was read at.
    pub sha: Option<String>,
}

/// A hosted content repository holding the inventory CSV files.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// True when the store knows which repository to talk to.
    fn is_configured(&self) -> bool;

    /// Short human-readable name for logs, e.g. `github:lab/inventory`.
    fn describe(&self) -> String;

    /// Repository path of a table file, e.g. `data/celllines.csv`.
    fn path_for(&self, filename: &str) -> String;

    /// Fetches a file with its version token.
    async fn get_file(&self, path: &str) -> Result<RemoteFile>;

    /// Follows a file's download link and returns its raw text.
    async fn download(&self, url: &str) -> Result<String>;

    /// Creates `path` when `sha` is `None`, otherwise replaces it if `sha`
    /// is still the current version token.
    ///
    /// A stale or missing token is rejected with
    /// [`InventoryError::OptimisticConflict`]; this method never retries.
    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<CommitResult>;

    /// Text of a fetched file: decoded inline content, or the download link
    /// for files too large to inline.
    async fn file_text(&self, file: &RemoteFile) -> Result<String> {
        if let Some(content) = file.inline_content() {
            return match file.encoding.as_deref() {
                None | Some("base64") => decode_content(content),
                Some(_) => Ok(content.to_string()),
            };
        }
        match file.download_url.as_deref() {
            Some(url) => {
                debug!("Downloading {} ({} bytes) via download link", file.path, file.size);
                self.download(url).await
            }
            None => Err(InventoryError::MissingContent(file.path.clone())),
        }
    }

    /// Fetches and decodes a table file by name.
    async fn get_csv_content(&self, filename: &str) -> Result<String> {
        let path = self.path_for(filename);
        let file = self.get_file(&path).await?;
        self.file_text(&file).await
    }

    /// Fetches a table file with its version token; a missing file yields an
    /// empty snapshot with no token.
    async fn csv_snapshot(&self, filename: &str) -> Result<CsvSnapshot> {
        let path = self.path_for(filename);
        match self.get_file(&path).await {
            Ok(file) => {
                let text = self.file_text(&file).await?;
                Ok(CsvSnapshot {
                    path,
                    text,
                    sha: Some(file.sha),
                })
            }
            Err(e) if e.is_not_found() => Ok(CsvSnapshot {
                path,
                text: String::new(),
                sha: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Replaces a table file with `text`, creating it when absent.
    ///
    /// The version token is read immediately before writing, so this only
    /// guards against changes made between those two calls. Callers that
    /// derived `text` from an earlier read should commit a [`CsvSnapshot`]
    /// token through [`update_file`](Self::update_file) instead.
    async fn update_csv(&self, filename: &str, text: &str, message: &str) -> Result<CommitResult> {
        let path = self.path_for(filename);
        let sha = match self.get_file(&path).await {
            Ok(file) => Some(file.sha),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.update_file(&path, text, message, sha.as_deref()).await
    }
}

/// Joins a directory prefix and a file name into a repository path.
pub(crate) fn join_repo_path(dir: &str, filename: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{dir}/{filename}")
    }
}
