use csv::ReaderBuilder;
use tracing::{debug, warn};

use super::record::CsvRecord;
use crate::error::InventoryError;

/// Result of mapping a CSV table to typed records.
///
/// Rows that the mapper rejected are kept as [`InventoryError::RowParse`]
/// values in `skipped` so callers can report them; they never prevent the
/// remaining rows from loading.
#[derive(Debug)]
pub struct ParsedTable<T> {
    /// Successfully mapped records, in file order.
    pub records: Vec<T>,
    /// One entry per rejected row.
    pub skipped: Vec<InventoryError>,
}

impl<T> ParsedTable<T> {
    /// True when every data row mapped cleanly.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Parses CSV text into rows of string fields, header row included.
///
/// Quoting follows RFC 4180: commas and line breaks inside a quoted field are
/// literal, a doubled quote inside a quoted field is an escaped quote. `\n`,
/// `\r` and `\r\n` all end a row. Rows whose fields are all blank are dropped,
/// and a quote pair still wrapping a whole field after tokenizing is stripped.
///
/// Empty or whitespace-only input yields no rows.
///
/// # Example
///
/// ```
/// use lab_inventory::csv_handler::parse;
///
/// let rows = parse("id,note\n1,\"a,b\"\n");
/// assert_eq!(rows[1], vec!["1".to_string(), "a,b".to_string()]);
/// ```
pub fn parse(text: &str) -> Vec<Vec<String>> {
    parse_with_lines(text)
        .into_iter()
        .map(|(_, fields)| fields)
        .collect()
}

/// Like [`parse`] but keeps the 1-indexed source line of each row.
fn parse_with_lines(text: &str) -> Vec<(usize, Vec<String>)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable CSV row {}: {}", index + 1, e);
                continue;
            }
        };

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        let fields = record.iter().map(strip_wrapping_quotes).collect();
        rows.push((line, fields));
    }
    rows
}

fn strip_wrapping_quotes(field: &str) -> String {
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        field[1..field.len() - 1].to_string()
    } else {
        field.to_string()
    }
}

/// Parses CSV text and maps each data row to `T` by position.
///
/// The first row is the header and is not mapped. A row the mapper rejects
/// is logged and recorded in [`ParsedTable::skipped`]; one malformed row never
/// aborts the load.
pub fn parse_records<T: CsvRecord>(text: &str) -> ParsedTable<T> {
    map_rows(text, T::from_row)
}

/// Like [`parse_records`], for rows that are about to get fresh ids.
///
/// The id cell is not read, so it may be blank or stale. Rows that are too
/// short are still rejected.
pub fn parse_new_records<T: CsvRecord>(text: &str) -> ParsedTable<T> {
    map_rows(text, |row| {
        let mut row = row.to_vec();
        if let Some(id) = row.first_mut() {
            *id = PLACEHOLDER_ID.to_string();
        }
        T::from_row(&row)
    })
}

/// Stands in for an ignored id cell; any positive id passes the mapper.
const PLACEHOLDER_ID: &str = "1";

fn map_rows<T, F>(text: &str, mut map: F) -> ParsedTable<T>
where
    T: CsvRecord,
    F: FnMut(&[String]) -> Result<T, String>,
{
    let mut rows = parse_with_lines(text).into_iter();
    let mut table = ParsedTable {
        records: Vec::new(),
        skipped: Vec::new(),
    };

    let Some((_, header)) = rows.next() else {
        return table;
    };
    if !header.iter().map(String::as_str).eq(T::COLUMNS.iter().copied()) {
        debug!(
            "CSV header {:?} differs from schema {:?}; mapping by position",
            header,
            T::COLUMNS
        );
    }

    for (line, row) in rows {
        match map(&row) {
            Ok(record) => table.records.push(record),
            Err(reason) => {
                warn!("Dropping CSV row {}: {}", line, reason);
                table.skipped.push(InventoryError::RowParse { line, reason });
            }
        }
    }
    table
}
