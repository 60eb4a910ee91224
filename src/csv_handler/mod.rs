//! CSV handler module
//!
//! Converts between CSV text and typed inventory records. The reader and
//! writer know nothing about entity semantics: they only see the
//! [`CsvRecord`] contract of ordered columns, derived properties and a
//! positional row mapper.

pub mod encoding;
pub mod reader;
pub mod record;
pub mod writer;

pub use encoding::{decode_content, encode_content};
pub use reader::{parse, parse_new_records, parse_records, ParsedTable};
pub use record::CsvRecord;
pub use writer::{serialize, serialize_table};
