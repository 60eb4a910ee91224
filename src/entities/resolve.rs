//! Foreign-key resolution.
//!
//! Derived name fields are filled by one join step over the reference tables
//! loaded for a read. A key with no matching reference row resolves to the
//! empty string; that is a valid state, not an integrity error.

use std::collections::HashMap;

use super::{Entity, EntityKind, Reference};

/// id → display name lookups for the reference tables loaded so far.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    lookups: HashMap<EntityKind, HashMap<u64, String>>,
}

impl ReferenceTables {
    /// Creates an empty set of lookups; every key resolves to "".
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the lookup for `R`'s table.
    pub fn insert<R: Reference>(&mut self, rows: &[R]) {
        let lookup = rows
            .iter()
            .map(|row| (row.id(), row.display_name()))
            .collect();
        self.lookups.insert(R::KIND, lookup);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<R: Reference>(mut self, rows: &[R]) -> Self {
        self.insert(rows);
        self
    }

    /// True when a lookup for `kind` has been loaded.
    pub fn has(&self, kind: EntityKind) -> bool {
        self.lookups.contains_key(&kind)
    }

    /// Display name for `id` in `kind`, if known.
    pub fn name(&self, kind: EntityKind, id: u64) -> Option<&str> {
        self.lookups.get(&kind)?.get(&id).map(String::as_str)
    }

    /// Fills every derived name field of `records` in place.
    pub fn resolve<T: Entity>(&self, records: &mut [T]) {
        for record in records.iter_mut() {
            for link in record.links_mut() {
                *link.name = self.name(link.kind, link.id).unwrap_or_default().to_string();
            }
        }
    }

    /// Owned form of [`resolve`](Self::resolve).
    pub fn resolved<T: Entity>(&self, mut records: Vec<T>) -> Vec<T> {
        self.resolve(&mut records);
        records
    }
}
