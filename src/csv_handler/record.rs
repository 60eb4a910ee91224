//! Record contract shared by the CSV reader and writer.
//!
//! Every persisted table declares its schema once, as an ordered column list.
//! The reader maps rows by position against that list and the writer emits
//! the same list as its header, so the two ends cannot drift apart.

/// A record that can be read from and written to a fixed-position CSV row.
///
/// # Example
///
/// ```
/// use lab_inventory::csv_handler::CsvRecord;
///
/// struct Tube {
///     id: u64,
///     label: String,
/// }
///
/// impl CsvRecord for Tube {
///     const COLUMNS: &'static [&'static str] = &["id", "label"];
///
///     fn from_row(row: &[String]) -> Result<Self, String> {
///         let id = row.first().and_then(|v| v.parse().ok()).ok_or("bad id")?;
///         let label = row.get(1).cloned().unwrap_or_default();
///         Ok(Tube { id, label })
///     }
///
///     fn field(&self, column: &str) -> Option<String> {
///         match column {
///             "id" => Some(self.id.to_string()),
///             "label" => Some(self.label.clone()),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait CsvRecord: Sized {
    /// Canonical column order. Position in this list is the CSV schema.
    const COLUMNS: &'static [&'static str];

    /// Properties computed on read that must never be persisted.
    ///
    /// The writer emits these as empty strings whatever their in-memory value.
    const DERIVED: &'static [&'static str] = &[];

    /// Map one data row to a record. The error string explains why the row
    /// was rejected; the reader attaches the line number.
    fn from_row(row: &[String]) -> Result<Self, String>;

    /// Look up a property by column name, stringified for output.
    fn field(&self, column: &str) -> Option<String>;

    /// True when `column` is a derived (never persisted) property.
    fn is_derived(column: &str) -> bool {
        Self::DERIVED.contains(&column)
    }
}
