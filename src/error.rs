//! Error module
//!
//! Defines the error type shared by every layer of the inventory engine.
//! The variants mirror the failure modes of the system: isolated row parse
//! failures, configuration gaps, credential problems, remote-store failures,
//! optimistic-concurrency rejections and caller mistakes. Conversions from the
//! underlying library errors are provided through `From` so `?` works across
//! the codec, the HTTP client and the local fallback.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// The main error type for the lab inventory engine.
///
/// # Error Categories
///
/// - **Row errors**: a single CSV row could not be mapped (`RowParse`); these are
///   logged and the row is dropped, they never abort a table load
/// - **Configuration/credential errors**: `NotConfigured`, `AuthRequired`, `AuthExpired`
/// - **Remote store errors**: `NotFound`, `MissingContent`, `RemoteUnavailable`,
///   `OptimisticConflict`
/// - **Caller errors**: `UnsupportedEntity`, `RecordNotFound`, `InvalidField`,
///   `InvalidArgument`
///
/// # Example
///
/// ```rust,ignore
/// use lab_inventory::error::InventoryError;
///
/// fn example() -> Result<(), InventoryError> {
///     let text = std::fs::read_to_string("celllines.csv")?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum InventoryError {
    /// A single CSV row could not be mapped to a typed record.
    #[error("Row {line}: {reason}")]
    RowParse {
        /// 1-indexed line of the row, counting the header as line 1.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// The remote store is missing its owner/repository identifiers.
    ///
    /// Reads fall back to the local source; writes fail with this error.
    #[error("Remote store not configured: {0}")]
    NotConfigured(String),

    /// No bearer token is available for an authenticated request.
    #[error("Authentication required: no access token available")]
    AuthRequired,

    /// The remote store rejected the bearer token (HTTP 401).
    ///
    /// The cached token has already been cleared when this is returned.
    #[error("Authentication expired: access token was rejected")]
    AuthExpired,

    /// The requested file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The file exists but carries neither inline content nor a download link.
    #[error("No content available for {0}")]
    MissingContent(String),

    /// Network failure or an unexpected response status.
    #[error("Remote store unavailable{}: {}", status_suffix(.status), .message)]
    RemoteUnavailable {
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// The version token presented on write no longer matches the store.
    #[error("Write conflict on {path}: file changed remotely ({attempts} attempt(s))")]
    OptimisticConflict {
        /// Repository path of the file.
        path: String,
        /// Number of commit attempts made before giving up.
        attempts: u32,
    },

    /// The entity kind name is not one of the eight known tables.
    #[error("Unsupported entity: {0}")]
    UnsupportedEntity(String),

    /// An update or delete addressed an id that is not in the table.
    #[error("No {table} record with id {id}")]
    RecordNotFound {
        /// Table name.
        table: String,
        /// The missing id.
        id: u64,
    },

    /// A field patch named an unknown or derived column.
    #[error("Invalid field '{column}': {reason}")]
    InvalidField {
        /// Column name from the patch.
        column: String,
        /// Why it was rejected.
        reason: String,
    },

    /// CSV reading/writing error from the csv crate.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// General I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote content was not valid base64.
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Invalid command-line or configuration argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl InventoryError {
    /// True for a missing file, remote or local.
    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::NotFound(_))
    }

    /// True for an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, InventoryError::OptimisticConflict { .. })
    }

    /// True when the caller has to (re-)authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, InventoryError::AuthRequired | InventoryError::AuthExpired)
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(err: reqwest::Error) -> Self {
        InventoryError::RemoteUnavailable {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for InventoryError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        InventoryError::InvalidArgument(format!("content is not valid UTF-8: {err}"))
    }
}
