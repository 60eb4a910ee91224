//! Content encoding for the remote store.
//!
//! The content API transports file bodies as standard base64. Inline content
//! returned on read is wrapped at 60 columns, so whitespace is stripped before
//! decoding.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};

use crate::error::Result;

/// Decodes base64 file content into UTF-8 text.
///
/// Embedded line breaks and spaces are ignored. A leading UTF-8 byte order
/// mark is dropped so spreadsheet exports parse like any other file.
///
/// # Example
///
/// ```
/// use lab_inventory::csv_handler::decode_content;
///
/// let text = decode_content("aWQsbmFt\nZQo=").unwrap();
/// assert_eq!(text, "id,name\n");
/// ```
pub fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD.decode(compact.as_bytes())?;
    let text = String::from_utf8(bytes)?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Encodes text for upload.
#[must_use]
pub fn encode_content(text: &str) -> String {
    BASE64_STANDARD.encode(text.as_bytes())
}
