//! Record tables: cell lines, orders, oligonucleotides and plasmids.

use serde::Serialize;

use super::inventory_entity;

inventory_entity! {
    /// A frozen cell line stock.
    Cellline => Celllines, min_columns = 3,
    links {
        user_id => user_name: Users,
        organism_id => organism_name: Organisms,
    }
    fields {
        refid: String,
        genotype: String,
        date: String,
        source: String,
        link: String,
        copies: i64,
        leftcopies: i64,
        parent: String,
        reference: String,
        sequence: String,
        comment: String,
        location: String,
    }
}

inventory_entity! {
    /// A purchase order line.
    Order => Orders, min_columns = 4,
    links {
        user_id => user_name: Users,
        vendor_id => vendor_name: Vendors,
        category_id => category_name: Categories,
    }
    fields {
        catalog: String,
        qty: i64,
        desc: String,
        unitprice: f64,
        unit: String,
        link: String,
        orderdate: String,
        receiptdate: String,
        comment: String,
        location: String,
    }
}

inventory_entity! {
    /// An oligonucleotide (primer, probe, ...).
    Oligo => Oligos, min_columns = 3,
    links {
        user_id => user_name: Users,
        organism_id => organism_name: Organisms,
    }
    fields {
        refid: String,
        desc: String,
        seq: String,
        date: String,
        source: String,
        link: String,
        reference: String,
        usefulseq: String,
        comment: String,
        location: String,
        length: i64,
        meltingtemp: f64,
        gc: f64,
    }
    prepare = fill_sequence_stats,
}

inventory_entity! {
    /// A plasmid stock.
    Plasmid => Plasmids, min_columns = 3,
    links {
        user_id => user_name: Users,
        organism_id => organism_name: Organisms,
    }
    fields {
        refid: String,
        genotype: String,
        date: String,
        source: String,
        link: String,
        replicates: i64,
        leftover: i64,
        parent: String,
        reference: String,
        sequence: String,
        resistance: String,
        temperature: f64,
        copynumber: String,
        comment: String,
        location: String,
    }
}

/// Length, GC content and melting temperature of a nucleotide sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SequenceStats {
    /// Number of A/C/G/T/U bases.
    pub length: i64,
    /// GC content in percent, one decimal.
    pub gc: f64,
    /// Melting temperature in °C, one decimal.
    pub meltingtemp: f64,
}

/// Computes [`SequenceStats`] for a sequence.
///
/// Only A, C, G, T and U are counted, case-insensitively; whitespace, dashes
/// and ambiguity codes are ignored. Sequences under 14 bases use the Wallace
/// rule `2(A+T) + 4(G+C)`; longer ones use `64.9 + 41(G+C-16.4)/N`.
/// Returns `None` when no countable base is present.
///
/// # Example
///
/// ```
/// use lab_inventory::entities::sequence_stats;
///
/// let stats = sequence_stats("ACGTACGT").unwrap();
/// assert_eq!(stats.length, 8);
/// assert_eq!(stats.gc, 50.0);
/// assert_eq!(stats.meltingtemp, 24.0);
/// ```
#[must_use]
pub fn sequence_stats(seq: &str) -> Option<SequenceStats> {
    let (mut at, mut gc) = (0i64, 0i64);
    for base in seq.chars().map(|c| c.to_ascii_uppercase()) {
        match base {
            'A' | 'T' | 'U' => at += 1,
            'G' | 'C' => gc += 1,
            _ => {}
        }
    }
    let length = at + gc;
    if length == 0 {
        return None;
    }

    let meltingtemp = if length < 14 {
        (2 * at + 4 * gc) as f64
    } else {
        64.9 + 41.0 * (gc as f64 - 16.4) / length as f64
    };
    Some(SequenceStats {
        length,
        gc: round1(gc as f64 * 100.0 / length as f64),
        meltingtemp: round1(meltingtemp),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Fills blank sequence metrics of a new oligo from its sequence.
fn fill_sequence_stats(oligo: &mut Oligo) {
    if oligo.length != 0 {
        return;
    }
    let Some(stats) = sequence_stats(&oligo.seq) else {
        return;
    };
    oligo.length = stats.length;
    if oligo.gc == 0.0 {
        oligo.gc = stats.gc;
    }
    if oligo.meltingtemp == 0.0 {
        oligo.meltingtemp = stats.meltingtemp;
    }
}
