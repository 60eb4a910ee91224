//! Read-side data sources and the fallback chain.
//!
//! A [`CsvSource`] can produce the text of a table file. [`SourceChain`] holds
//! an ordered list of sources and returns the first successful read, so a
//! remote store backed by a local copy is simply `[remote, local]`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lab_inventory::sources::{LocalFallback, RemoteSource, SourceChain};
//!
//! let chain = SourceChain::new()
//!     .with(RemoteSource::new(store.clone()))
//!     .with(LocalFallback::new("public/data"));
//! let read = chain.read("celllines.csv").await?;
//! println!("served by {}", read.source);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{InventoryError, Result};
use crate::remote::ContentStore;

/// Something that can read inventory table files.
#[async_trait]
pub trait CsvSource: Send + Sync {
    /// Name reported alongside data this source served.
    fn label(&self) -> String;

    /// Reads the full text of `filename` (e.g. `orders.csv`).
    async fn read_table(&self, filename: &str) -> Result<String>;
}

/// Reads tables from a [`ContentStore`].
pub struct RemoteSource {
    store: Arc<dyn ContentStore>,
}

impl RemoteSource {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CsvSource for RemoteSource {
    fn label(&self) -> String {
        self.store.describe()
    }

    async fn read_table(&self, filename: &str) -> Result<String> {
        if !self.store.is_configured() {
            return Err(InventoryError::NotConfigured(self.store.describe()));
        }
        self.store.get_csv_content(filename).await
    }
}

/// Read-only tables bundled as files in a local directory.
pub struct LocalFallback {
    dir: PathBuf,
}

impl LocalFallback {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the tables are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CsvSource for LocalFallback {
    fn label(&self) -> String {
        format!("local:{}", self.dir.display())
    }

    async fn read_table(&self, filename: &str) -> Result<String> {
        let path = self.dir.join(filename);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(InventoryError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(InventoryError::Io(e)),
        }
    }
}

/// Text of a table together with the label of the source that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRead {
    pub text: String,
    pub source: String,
}

/// Ordered list of sources; the first successful read wins.
#[derive(Clone, Default)]
pub struct SourceChain {
    sources: Vec<Arc<dyn CsvSource>>,
}

impl SourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source to the end of the chain.
    pub fn with(mut self, source: impl CsvSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Appends an already shared source.
    pub fn push(&mut self, source: Arc<dyn CsvSource>) {
        self.sources.push(source);
    }

    /// Labels of the sources in the order they are tried.
    pub fn labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.label()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Tries each source in order and returns the first success.
    ///
    /// Failures of earlier sources are logged, not returned; when every
    /// source fails the last error is returned.
    pub async fn read(&self, filename: &str) -> Result<SourceRead> {
        let mut last_error = None;
        for (index, source) in self.sources.iter().enumerate() {
            match source.read_table(filename).await {
                Ok(text) => {
                    if index > 0 {
                        info!("Served {} from fallback source {}", filename, source.label());
                    } else {
                        debug!("Served {} from {}", filename, source.label());
                    }
                    return Ok(SourceRead {
                        text,
                        source: source.label(),
                    });
                }
                Err(InventoryError::NotConfigured(reason)) => {
                    debug!("Skipping unconfigured source {}: {}", source.label(), reason);
                    last_error = Some(InventoryError::NotConfigured(reason));
                }
                Err(e) => {
                    warn!("Reading {} from {} failed: {}", filename, source.label(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            InventoryError::NotConfigured("no data sources configured".to_string())
        }))
    }
}
