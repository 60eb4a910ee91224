//! Inventory entities
//!
//! Eight tables make up the inventory. Four are reference tables (`users`,
//! `organisms`, `vendors`, `categories`) that map an id to a display name; four
//! are record tables (`celllines`, `orders`, `oligos`, `plasmids`) that carry
//! foreign keys into the reference tables.
//!
//! Each record table also carries one derived name field per foreign key
//! (`user_name`, `organism_name`, ...). These are filled in on read by
//! [`ReferenceTables::resolve`] and are never written back to CSV.
//!
//! Every entity declares its schema once through the `inventory_entity!`
//! macro: the column order of that declaration is the CSV layout, and the
//! positional mapper, property lookup and field setter are generated from it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::csv_handler::CsvRecord;
use crate::error::{InventoryError, Result};
use crate::util::{format_float, parse_float, parse_id, parse_int};

pub mod inventory;
pub mod reference;
pub mod resolve;

pub use inventory::{sequence_stats, Cellline, Oligo, Order, Plasmid, SequenceStats};
pub use reference::{Category, Organism, User, Vendor};
pub use resolve::ReferenceTables;

/// Column name to new value, as supplied by a caller for add or update.
pub type FieldPatch = BTreeMap<String, String>;

/// The eight inventory tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Users,
    Organisms,
    Vendors,
    Categories,
    Celllines,
    Orders,
    Oligos,
    Plasmids,
}

impl EntityKind {
    /// All kinds, reference tables first.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Users,
        EntityKind::Organisms,
        EntityKind::Vendors,
        EntityKind::Categories,
        EntityKind::Celllines,
        EntityKind::Orders,
        EntityKind::Oligos,
        EntityKind::Plasmids,
    ];

    /// Table name, also the CSV file stem.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Organisms => "organisms",
            EntityKind::Vendors => "vendors",
            EntityKind::Categories => "categories",
            EntityKind::Celllines => "celllines",
            EntityKind::Orders => "orders",
            EntityKind::Oligos => "oligos",
            EntityKind::Plasmids => "plasmids",
        }
    }

    /// CSV file name for this table, e.g. `celllines.csv`.
    pub fn file_name(self) -> String {
        format!("{}.csv", self.table_name())
    }

    /// True for the id → name lookup tables.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            EntityKind::Users | EntityKind::Organisms | EntityKind::Vendors | EntityKind::Categories
        )
    }

    /// Canonical column order of this table.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::Users => User::COLUMNS,
            EntityKind::Organisms => Organism::COLUMNS,
            EntityKind::Vendors => Vendor::COLUMNS,
            EntityKind::Categories => Category::COLUMNS,
            EntityKind::Celllines => Cellline::COLUMNS,
            EntityKind::Orders => Order::COLUMNS,
            EntityKind::Oligos => Oligo::COLUMNS,
            EntityKind::Plasmids => Plasmid::COLUMNS,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for EntityKind {
    type Err = InventoryError;

    /// Accepts table names case-insensitively, with or without a `.csv` suffix.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let name = name.strip_suffix(".csv").unwrap_or(&name);
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.table_name() == name)
            .ok_or_else(|| InventoryError::UnsupportedEntity(s.to_string()))
    }
}

/// A foreign key of a record together with the derived name slot it fills.
pub struct Link<'a> {
    /// Reference table the key points into.
    pub kind: EntityKind,
    /// Referenced id.
    pub id: u64,
    /// Derived display name to fill in.
    pub name: &'a mut String,
}

/// A typed row of one inventory table.
pub trait Entity: CsvRecord + Clone + Default + Serialize + Send + Sync + 'static {
    /// The table this entity lives in.
    const KIND: EntityKind;

    /// Reference tables needed to resolve this entity's derived names.
    const REFERENCES: &'static [EntityKind];

    /// Primary key.
    fn id(&self) -> u64;

    /// Overwrite the primary key (used for id allocation).
    fn set_id(&mut self, id: u64);

    /// Set one persisted, non-id column from its CSV text.
    fn set_field(&mut self, column: &str, value: &str) -> Result<()>;

    /// Foreign keys with their derived name slots.
    fn links_mut(&mut self) -> Vec<Link<'_>>;

    /// Hook run on freshly added or imported records before commit.
    fn prepare_new(&mut self) {}

    /// Shallow-merge `patch` over this record.
    ///
    /// The id and derived name fields cannot be patched; a patch touching them,
    /// or naming an unknown column, is rejected before anything is changed.
    fn apply_patch(&mut self, patch: &FieldPatch) -> Result<()> {
        for column in patch.keys() {
            check_patchable::<Self>(column)?;
        }
        for (column, value) in patch {
            self.set_field(column, value)?;
        }
        Ok(())
    }

    /// Build a new record from a patch over the default record.
    fn from_patch(patch: &FieldPatch) -> Result<Self> {
        let mut record = Self::default();
        record.apply_patch(patch)?;
        Ok(record)
    }

    /// Clear every derived name field.
    fn strip_derived(&mut self) {
        for link in self.links_mut() {
            link.name.clear();
        }
    }
}

/// A reference table row: something with a display name.
pub trait Reference: Entity {
    /// Name shown in place of the id on record tables.
    fn display_name(&self) -> String;
}

fn check_patchable<T: Entity>(column: &str) -> Result<()> {
    let reason = if column == "id" {
        "ids are allocated by the table and cannot be set"
    } else if T::is_derived(column) {
        "derived names are resolved from ids and cannot be set"
    } else if !T::COLUMNS.contains(&column) {
        "unknown column"
    } else {
        return Ok(());
    };
    Err(InventoryError::InvalidField {
        column: column.to_string(),
        reason: format!("{reason} ({})", T::KIND),
    })
}

/// Conversion between a column's CSV text and its typed value.
///
/// Parsing never fails: non-numeric text in a numeric column becomes zero.
pub trait ColumnValue: Sized {
    fn parse_column(value: &str) -> Self;
    fn render(&self) -> String;
}

impl ColumnValue for String {
    fn parse_column(value: &str) -> Self {
        value.to_string()
    }

    fn render(&self) -> String {
        self.clone()
    }
}

impl ColumnValue for i64 {
    fn parse_column(value: &str) -> Self {
        parse_int(value)
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl ColumnValue for u64 {
    fn parse_column(value: &str) -> Self {
        parse_id(value)
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl ColumnValue for f64 {
    fn parse_column(value: &str) -> Self {
        parse_float(value)
    }

    fn render(&self) -> String {
        format_float(*self)
    }
}

/// Declares an inventory entity: struct, CSV schema and [`Entity`] impl.
///
/// Column order is `id`, then the foreign keys of `links`, then `fields`.
/// Rows shorter than `min_columns` or with a non-positive id are rejected.
macro_rules! inventory_entity {
    (
        $(#[$meta:meta])*
        $name:ident => $kind:ident, min_columns = $min:expr,
        links { $($fk:ident => $fk_name:ident : $ref_kind:ident),* $(,)? }
        fields { $($field:ident : $ty:ty),* $(,)? }
        $(prepare = $prepare:ident,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pub id: u64,
            $(
                pub $fk: u64,
                #[serde(default)]
                pub $fk_name: String,
            )*
            $(pub $field: $ty,)*
        }

        impl $crate::csv_handler::CsvRecord for $name {
            const COLUMNS: &'static [&'static str] =
                &["id", $(stringify!($fk),)* $(stringify!($field),)*];
            const DERIVED: &'static [&'static str] = &[$(stringify!($fk_name),)*];

            fn from_row(row: &[String]) -> std::result::Result<Self, String> {
                if row.len() < $min {
                    return Err(format!(
                        "expected at least {} columns, found {}",
                        $min,
                        row.len()
                    ));
                }
                let id = $crate::util::parse_id(&row[0]);
                if id == 0 {
                    return Err(format!("invalid id '{}'", row[0]));
                }
                #[allow(unused_mut, unused_variables)]
                let mut cells = row.iter().skip(1).map(String::as_str);
                #[allow(unused_mut)]
                let mut record = Self { id, ..Self::default() };
                $(record.$fk = $crate::util::parse_id(cells.next().unwrap_or(""));)*
                $(record.$field = <$ty as $crate::entities::ColumnValue>::parse_column(cells.next().unwrap_or(""));)*
                Ok(record)
            }

            fn field(&self, column: &str) -> Option<String> {
                match column {
                    "id" => Some(self.id.to_string()),
                    $(
                        stringify!($fk) => Some(self.$fk.to_string()),
                        stringify!($fk_name) => Some(self.$fk_name.clone()),
                    )*
                    $(stringify!($field) => Some($crate::entities::ColumnValue::render(&self.$field)),)*
                    _ => None,
                }
            }
        }

        impl $crate::entities::Entity for $name {
            const KIND: $crate::entities::EntityKind = $crate::entities::EntityKind::$kind;
            const REFERENCES: &'static [$crate::entities::EntityKind] = &[$($crate::entities::EntityKind::$ref_kind,)*];

            fn id(&self) -> u64 {
                self.id
            }

            fn set_id(&mut self, id: u64) {
                self.id = id;
            }

            fn set_field(&mut self, column: &str, value: &str) -> $crate::error::Result<()> {
                match column {
                    $(stringify!($fk) => self.$fk = $crate::util::parse_id(value),)*
                    $(stringify!($field) => self.$field = <$ty as $crate::entities::ColumnValue>::parse_column(value),)*
                    _ => {
                        return Err($crate::error::InventoryError::InvalidField {
                            column: column.to_string(),
                            reason: format!("not a writable {} column", $crate::entities::EntityKind::$kind),
                        })
                    }
                }
                Ok(())
            }

            fn links_mut(&mut self) -> Vec<$crate::entities::Link<'_>> {
                vec![$($crate::entities::Link {
                    kind: $crate::entities::EntityKind::$ref_kind,
                    id: self.$fk,
                    name: &mut self.$fk_name,
                },)*]
            }

            $(
                fn prepare_new(&mut self) {
                    $prepare(self)
                }
            )?
        }
    };
}

pub(crate) use inventory_entity;
