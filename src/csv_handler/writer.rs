use csv::{QuoteStyle, Terminator, WriterBuilder};

use super::record::CsvRecord;
use crate::error::{InventoryError, Result};

/// Serializes records to CSV text, one row per record.
///
/// The header row is `headers` verbatim; each following row looks every header
/// up as a property of the record. Output follows these rules:
///
/// - Line breaks inside a value are flattened to a single space, so every
///   record stays on one physical line.
/// - A value containing a comma or a quote is wrapped in quotes with inner
///   quotes doubled.
/// - Derived properties ([`CsvRecord::DERIVED`]) are written as empty strings
///   whatever their in-memory value.
/// - Unknown headers are written as empty strings.
/// - Rows end with `\n`.
///
/// # Example
///
/// ```rust,ignore
/// let text = serialize(&organisms, &["id", "name"])?;
/// assert!(text.starts_with("id,name\n"));
/// ```
pub fn serialize<T: CsvRecord>(records: &[T], headers: &[&str]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(headers)?;

    for record in records {
        let row = headers.iter().map(|column| {
            if T::is_derived(column) {
                String::new()
            } else {
                record
                    .field(column)
                    .map(|value| flatten_newlines(&value))
                    .unwrap_or_default()
            }
        });
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| InventoryError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Serializes records using the record type's canonical column order.
pub fn serialize_table<T: CsvRecord>(records: &[T]) -> Result<String> {
    serialize(records, T::COLUMNS)
}

fn flatten_newlines(value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return value.to_string();
    }
    value.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
