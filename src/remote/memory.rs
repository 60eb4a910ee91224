//! In-process content store.
//!
//! [`MemoryStore`] keeps files in a map and hands out a fresh version token on
//! every write, enforcing the same create/replace rules as the hosted API. It
//! backs offline sessions and lets the write cycle be exercised without a
//! network: outages, oversized files and writes by other clients can all be
//! simulated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{join_repo_path, CommitResult, ContentStore, RemoteFile};
use crate::csv_handler::encode_content;
use crate::error::{InventoryError, Result};

/// URL scheme used for download links of files that are not inlined.
const DOWNLOAD_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredFile {
    text: String,
    sha: String,
}

/// A [`ContentStore`] held entirely in memory.
///
/// # Example
///
/// ```rust,ignore
/// use lab_inventory::remote::{ContentStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.put("organisms.csv", "id,name\n1,Yeast\n");
/// let text = store.get_csv_content("organisms.csv").await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, StoredFile>>,
    commits: Mutex<Vec<String>>,
    data_dir: String,
    unconfigured: bool,
    inline_limit: Option<usize>,
    offline: AtomicBool,
    interfering_writes: AtomicU32,
    version: AtomicU64,
}

impl MemoryStore {
    /// An empty, configured store with files at the repository root.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that reports itself as not configured.
    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Self::default()
        }
    }

    /// Places table files under `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Files larger than `bytes` are served through a download link instead
    /// of inline content.
    pub fn with_inline_limit(mut self, bytes: usize) -> Self {
        self.inline_limit = Some(bytes);
        self
    }

    /// Writes a file directly, as another client would, bumping its version.
    pub fn put(&self, path: &str, text: &str) -> String {
        let sha = self.next_sha();
        self.lock_files().insert(
            path.to_string(),
            StoredFile {
                text: text.to_string(),
                sha: sha.clone(),
            },
        );
        sha
    }

    /// Current text of a file.
    pub fn text(&self, path: &str) -> Option<String> {
        self.lock_files().get(path).map(|f| f.text.clone())
    }

    /// Current version token of a file.
    pub fn sha(&self, path: &str) -> Option<String> {
        self.lock_files().get(path).map(|f| f.sha.clone())
    }

    /// Messages of every successful commit, oldest first.
    pub fn commit_messages(&self) -> Vec<String> {
        self.commits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// While offline, every request fails as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `count` commits each find the file changed by another client
    /// just before they land, so their version token is stale.
    pub fn interfere_with_next_commits(&self, count: u32) {
        self.interfering_writes.store(count, Ordering::SeqCst);
    }

    fn next_sha(&self) -> String {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{version:040x}")
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredFile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InventoryError::RemoteUnavailable {
                status: None,
                message: "memory store is offline".to_string(),
            });
        }
        if self.unconfigured {
            return Err(InventoryError::NotConfigured(
                "memory store has no repository".to_string(),
            ));
        }
        Ok(())
    }

    /// Consumes one pending interfering write, if any.
    fn take_interference(&self) -> bool {
        self.interfering_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn is_configured(&self) -> bool {
        !self.unconfigured
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn path_for(&self, filename: &str) -> String {
        join_repo_path(&self.data_dir, filename)
    }

    async fn get_file(&self, path: &str) -> Result<RemoteFile> {
        self.check_online()?;
        let files = self.lock_files();
        let stored = files
            .get(path)
            .ok_or_else(|| InventoryError::NotFound(path.to_string()))?;

        let size = stored.text.len();
        let inline = self.inline_limit.map_or(true, |limit| size <= limit);
        Ok(RemoteFile {
            path: path.to_string(),
            content: inline.then(|| encode_content(&stored.text)),
            encoding: Some(if inline { "base64" } else { "none" }.to_string()),
            sha: stored.sha.clone(),
            size: size as u64,
            download_url: Some(format!("{DOWNLOAD_SCHEME}{path}")),
        })
    }

    async fn download(&self, url: &str) -> Result<String> {
        self.check_online()?;
        let path = url
            .strip_prefix(DOWNLOAD_SCHEME)
            .ok_or_else(|| InventoryError::InvalidArgument(format!("not a memory link: {url}")))?;
        self.text(path)
            .ok_or_else(|| InventoryError::NotFound(path.to_string()))
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<CommitResult> {
        self.check_online()?;

        if self.take_interference() {
            let current = self.text(path).unwrap_or_default();
            self.put(path, &current);
        }

        let conflict = || InventoryError::OptimisticConflict {
            path: path.to_string(),
            attempts: 1,
        };
        let new_sha = self.next_sha();
        {
            let mut files = self.lock_files();
            match (files.get(path), sha) {
                (Some(existing), Some(expected)) if existing.sha != expected => return Err(conflict()),
                (Some(_), None) | (None, Some(_)) => return Err(conflict()),
                _ => {}
            }
            files.insert(
                path.to_string(),
                StoredFile {
                    text: content.to_string(),
                    sha: new_sha.clone(),
                },
            );
        }
        self.commits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());

        Ok(CommitResult {
            path: path.to_string(),
            sha: new_sha.clone(),
            commit_sha: Some(new_sha),
        })
    }
}
