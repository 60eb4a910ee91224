//! Property-based tests for CSV handling
//!
//! Covers the write/read cycle of inventory tables, quoting of awkward
//! values, isolation of malformed rows and the base64 content encoding.

use proptest::prelude::*;

use lab_inventory::csv_handler::{
    decode_content, encode_content, parse, parse_records, serialize_table,
};
use lab_inventory::entities::{Cellline, Organism};

/// Free text as typed into an inventory form, including CSV metacharacters.
///
/// A value that both starts and ends with a quote is excluded: stray wrapping
/// quotes are stripped on read.
fn free_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ._-]{0,30}",
        "[a-zA-Z0-9 ]{0,10},[a-zA-Z0-9 ]{0,10}",
        "[a-zA-Z0-9]{1,10}\"[a-zA-Z0-9 ]{0,10}\"[a-zA-Z0-9]{1,10}",
        "\"[a-zA-Z0-9 ,]{1,10}",
        Just("Ø 5µm, größe".to_string()),
    ]
    .prop_filter("wrapped in quotes", |s| {
        !(s.len() >= 2 && s.starts_with('"') && s.ends_with('"'))
    })
}

fn organism_strategy() -> impl Strategy<Value = Organism> {
    (1u64..10_000, free_text_strategy()).prop_map(|(id, name)| Organism { id, name })
}

fn cellline_strategy() -> impl Strategy<Value = Cellline> {
    (
        1u64..10_000,
        0u64..50,
        free_text_strategy(),
        free_text_strategy(),
        -5i64..500,
        free_text_strategy(),
    )
        .prop_map(|(id, organism_id, refid, genotype, copies, comment)| Cellline {
            id,
            organism_id,
            refid,
            genotype,
            copies,
            comment,
            ..Cellline::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Serializing a table and parsing it back yields the same records.
    #[test]
    fn table_write_read_preserves_records(
        organisms in prop::collection::vec(organism_strategy(), 0..20)
    ) {
        let text = serialize_table(&organisms).expect("serialize");
        let table = parse_records::<Organism>(&text);

        prop_assert!(table.is_clean());
        prop_assert_eq!(table.records, organisms);
    }

    #[test]
    fn record_table_write_read_preserves_records(
        celllines in prop::collection::vec(cellline_strategy(), 1..10)
    ) {
        let text = serialize_table(&celllines).expect("serialize");
        let table = parse_records::<Cellline>(&text);
        prop_assert_eq!(table.records, celllines);
    }

    // Every record lands on exactly one physical line, whatever its text.
    #[test]
    fn serialized_rows_are_single_lines(
        names in prop::collection::vec("[a-z]{1,5}(\r\n|\n|\r)[a-z]{1,5}", 1..10)
    ) {
        let organisms: Vec<Organism> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Organism { id: i as u64 + 1, name: name.clone() })
            .collect();
        let text = serialize_table(&organisms).expect("serialize");

        prop_assert!(text.ends_with('\n'));
        prop_assert_eq!(text.lines().count(), organisms.len() + 1);

        let table = parse_records::<Organism>(&text);
        for (parsed, original) in table.records.iter().zip(&organisms) {
            prop_assert!(!parsed.name.contains(['\n', '\r']));
            prop_assert!(parsed.name.len() <= original.name.len());
        }
    }

    // Malformed rows are skipped without affecting their neighbours.
    #[test]
    fn malformed_rows_are_isolated(
        good in prop::collection::vec(organism_strategy(), 1..10),
        bad_positions in prop::collection::vec(0usize..10, 1..4)
    ) {
        let mut text = serialize_table(&good).expect("serialize");
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        for (n, position) in bad_positions.iter().enumerate() {
            let at = 1 + position.min(&(lines.len() - 1));
            lines.insert(at, format!("not-an-id-{n},Broken"));
        }
        text = lines.join("\n");

        let table = parse_records::<Organism>(&text);
        prop_assert_eq!(table.skipped.len(), bad_positions.len());
        prop_assert_eq!(table.records, good);
    }

    // Line ending style does not change the parsed rows.
    #[test]
    fn line_endings_are_equivalent(
        rows in prop::collection::vec(("[1-9][0-9]{0,3}", "[a-zA-Z ]{1,12}"), 1..10)
    ) {
        let lf: String = rows.iter().map(|(id, name)| format!("{id},{name}\n")).collect();
        let crlf = lf.replace('\n', "\r\n");
        prop_assert_eq!(parse(&lf), parse(&crlf));
    }

    // Repository content survives the base64 transport encoding.
    #[test]
    fn content_encoding_roundtrip(text in "\\PC{0,200}") {
        let encoded = encode_content(&text);
        let decoded = decode_content(&encoded).expect("decode");
        prop_assert_eq!(decoded, text);
    }
}
