//! Reference tables: users and the organism/vendor/category lookups.

use super::{inventory_entity, Reference};

inventory_entity! {
    /// A lab member. Records point at users through `user_id`.
    User => Users, min_columns = 2,
    links {}
    fields {
        username: String,
        first_name: String,
        last_name: String,
        email: String,
    }
}

inventory_entity! {
    /// Source organism of a cell line, oligo or plasmid.
    Organism => Organisms, min_columns = 2,
    links {}
    fields { name: String }
}

inventory_entity! {
    /// Supplier an order is placed with.
    Vendor => Vendors, min_columns = 2,
    links {}
    fields { name: String }
}

inventory_entity! {
    /// Order category (consumables, antibodies, ...).
    Category => Categories, min_columns = 2,
    links {}
    fields { name: String }
}

impl Reference for User {
    /// The username, or "first last" for accounts without one.
    fn display_name(&self) -> String {
        if !self.username.trim().is_empty() {
            return self.username.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Reference for Organism {
    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Reference for Vendor {
    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Reference for Category {
    fn display_name(&self) -> String {
        self.name.clone()
    }
}
