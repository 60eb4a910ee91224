//! Property-based tests for inventory records
//!
//! Covers id allocation, lenient cell parsing, the positional mapper on
//! arbitrary rows, name resolution and oligo sequence metrics.

use proptest::prelude::*;

use lab_inventory::csv_handler::CsvRecord;
use lab_inventory::entities::{
    sequence_stats, Cellline, Entity, FieldPatch, Oligo, Organism, Plasmid, ReferenceTables,
};
use lab_inventory::util::{next_id, parse_float, parse_int};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // The allocated id is one above the largest existing id.
    #[test]
    fn next_id_is_max_plus_one(ids in prop::collection::vec(1u64..1_000_000, 0..50)) {
        let expected = ids.iter().copied().max().unwrap_or(0) + 1;
        let id = next_id(ids.iter().copied());
        prop_assert_eq!(id, expected);
        prop_assert!(!ids.contains(&id));
    }

    // Integers parse from their decimal text, with trailing junk ignored.
    #[test]
    fn parse_int_reads_leading_digits(n in -1_000_000i64..1_000_000, junk in "[a-z. ]{0,5}") {
        prop_assert_eq!(parse_int(&format!("{n}{junk}")), n);
    }

    #[test]
    fn parse_float_never_fails(text in "\\PC{0,20}") {
        prop_assert!(parse_float(&text).is_finite());
    }

    // Any row either maps to a record with a positive id or is rejected.
    #[test]
    fn mapper_accepts_or_rejects_without_panicking(
        row in prop::collection::vec("\\PC{0,8}", 0..20)
    ) {
        match Plasmid::from_row(&row) {
            Ok(plasmid) => {
                prop_assert!(plasmid.id > 0);
                prop_assert!(row.len() >= 3);
            }
            Err(reason) => prop_assert!(!reason.is_empty()),
        }
    }

    // Short rows leave the missing trailing columns at their defaults.
    #[test]
    fn short_rows_default_missing_columns(id in 1u64..10_000, width in 3usize..15) {
        let mut row = vec![id.to_string(), "2".to_string(), "3".to_string()];
        row.resize(width, "7".to_string());
        let cellline = Cellline::from_row(&row).expect("valid row");
        prop_assert_eq!(cellline.id, id);
        prop_assert_eq!(cellline.organism_id, 3);
        if width < 15 {
            prop_assert_eq!(cellline.location, "");
        }
    }

    // Resolved names come from the matching reference row, or are blank.
    #[test]
    fn names_resolve_to_matching_row_or_blank(
        organism_ids in prop::collection::btree_set(1u64..50, 0..10),
        wanted in 0u64..60
    ) {
        let organisms: Vec<Organism> = organism_ids
            .iter()
            .map(|&id| Organism { id, name: format!("org-{id}") })
            .collect();
        let tables = ReferenceTables::new().with(&organisms);
        let mut celllines = vec![Cellline { id: 1, organism_id: wanted, ..Cellline::default() }];
        tables.resolve(&mut celllines);

        let expected = if organism_ids.contains(&wanted) {
            format!("org-{wanted}")
        } else {
            String::new()
        };
        prop_assert_eq!(&celllines[0].organism_name, &expected);
        prop_assert_eq!(celllines[0].user_name.as_str(), "");
    }

    // A patch either applies completely or leaves the record untouched.
    #[test]
    fn patch_is_all_or_nothing(
        refid in "[A-Z]{2}-[0-9]{1,3}",
        extra in prop::sample::select(vec!["comment", "id", "organism_name", "bogus"])
    ) {
        let original = Cellline { id: 4, refid: "CL-4".into(), ..Cellline::default() };
        let mut record = original.clone();
        let mut patch = FieldPatch::new();
        patch.insert("refid".to_string(), refid.clone());
        patch.insert(extra.to_string(), "x".to_string());

        match record.apply_patch(&patch) {
            Ok(()) => {
                prop_assert_eq!(extra, "comment");
                prop_assert_eq!(&record.refid, &refid);
            }
            Err(_) => prop_assert_eq!(record, original),
        }
    }

    // Sequence metrics count only nucleotides and stay in range.
    #[test]
    fn sequence_stats_are_in_range(seq in "[ACGTacgt -]{0,60}") {
        let bases = seq.chars().filter(|c| "ACGTacgt".contains(*c)).count() as i64;
        match sequence_stats(&seq) {
            Some(stats) => {
                prop_assert_eq!(stats.length, bases);
                prop_assert!((0.0..=100.0).contains(&stats.gc));
                prop_assert!(stats.meltingtemp.is_finite());
            }
            None => prop_assert_eq!(bases, 0),
        }
    }

    // Metrics are filled on new oligos only where they were left unset.
    #[test]
    fn prepare_new_fills_unset_metrics(seq in "[ACGT]{1,40}", gc in prop::option::of(1.0f64..99.0)) {
        let mut oligo = Oligo { seq: seq.clone(), gc: gc.unwrap_or(0.0), ..Oligo::default() };
        oligo.prepare_new();
        prop_assert_eq!(oligo.length, seq.len() as i64);
        if let Some(gc) = gc {
            prop_assert_eq!(oligo.gc, gc);
        }
    }
}
