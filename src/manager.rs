//! Data manager
//!
//! Orchestrates reads and writes of the inventory tables.
//!
//! # Reads
//!
//! A table is read through the [`SourceChain`] (remote store first, local
//! fallback after it), parsed, and joined against the reference tables it
//! points into. The reference tables are fetched concurrently with the table
//! itself; one that fails to load only leaves its names blank.
//!
//! # Writes
//!
//! Writes are a remote-only capability. Each write is a read-modify-write
//! cycle against the remote store:
//!
//! 1. read the current file and its version token,
//! 2. apply the mutation to the parsed records,
//! 3. strip derived names and serialize,
//! 4. commit with the token from step 1.
//!
//! If another client committed in between, the store rejects step 4. The
//! cycle is then repeated from step 1 on the fresh state, up to
//! `max_commit_attempts` times, after which the conflict is returned. A write
//! is never merged blindly over a newer revision.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{InventoryConfig, DEFAULT_MAX_COMMIT_ATTEMPTS};
use crate::csv_handler::{parse_new_records, parse_records, serialize_table};
use crate::entities::{
    Category, Cellline, Entity, EntityKind, FieldPatch, Oligo, Order, Organism, Plasmid, Reference,
    ReferenceTables, User, Vendor,
};
use crate::error::{InventoryError, Result};
use crate::remote::{CommitResult, ContentStore, ContentsClient};
use crate::sources::{LocalFallback, RemoteSource, SourceChain};
use crate::util::{next_id, short_sha};

/// Runs `$body` with `$T` bound to the record type of `$kind`.
macro_rules! with_entity_type {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            EntityKind::Users => {
                type $T = User;
                $body
            }
            EntityKind::Organisms => {
                type $T = Organism;
                $body
            }
            EntityKind::Vendors => {
                type $T = Vendor;
                $body
            }
            EntityKind::Categories => {
                type $T = Category;
                $body
            }
            EntityKind::Celllines => {
                type $T = Cellline;
                $body
            }
            EntityKind::Orders => {
                type $T = Order;
                $body
            }
            EntityKind::Oligos => {
                type $T = Oligo;
                $body
            }
            EntityKind::Plasmids => {
                type $T = Plasmid;
                $body
            }
        }
    };
}

/// A table as read, with the source that served it.
#[derive(Debug, Clone, Serialize)]
pub struct Loaded<T> {
    /// Records in file order, derived names resolved.
    pub records: Vec<T>,
    /// Label of the source that served the table.
    pub source: String,
    /// Rows dropped because they could not be mapped.
    pub skipped_rows: usize,
}

/// A change requested through the name-based write API.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Add a record built from these fields; the id is allocated.
    Add(FieldPatch),
    /// Shallow-merge fields over the record with this id.
    Update { id: u64, patch: FieldPatch },
    /// Remove the record with this id.
    Delete { id: u64 },
}

/// Result of a committed write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    /// Table written.
    pub kind: EntityKind,
    /// Ids added, updated or deleted.
    pub ids: Vec<u64>,
    /// Commit message used.
    pub message: String,
    /// Store's report of the commit.
    #[serde(skip)]
    pub commit: CommitResult,
    /// Read-modify-write cycles it took (1 unless a conflict was retried).
    pub attempts: u32,
    /// Malformed rows of the stored table that were not carried over.
    pub dropped_rows: usize,
}

/// What a mutation did, reported back to the write cycle.
struct Change {
    ids: Vec<u64>,
    message: String,
}

/// Orchestrates the source chain, relationship resolution and writes.
///
/// Construct one per process or request context and pass it where needed.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use lab_inventory::manager::DataManager;
/// use lab_inventory::remote::MemoryStore;
///
/// let manager = DataManager::with_store(Arc::new(MemoryStore::new()), None);
/// let outcome = manager.add(organism).await?;
/// let celllines = manager.get_celllines().await?;
/// ```
pub struct DataManager {
    store: Option<Arc<dyn ContentStore>>,
    sources: SourceChain,
    max_commit_attempts: u32,
}

impl DataManager {
    /// Creates a manager from explicit parts. `store` is the write target;
    /// `sources` is the read chain.
    pub fn new(store: Option<Arc<dyn ContentStore>>, sources: SourceChain) -> Self {
        Self {
            store,
            sources,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }

    /// Reads from `store`, then `fallback_dir` if given; writes to `store`.
    pub fn with_store(store: Arc<dyn ContentStore>, fallback_dir: Option<PathBuf>) -> Self {
        let mut sources = SourceChain::new().with(RemoteSource::new(store.clone()));
        if let Some(dir) = fallback_dir {
            sources = sources.with(LocalFallback::new(dir));
        }
        Self::new(Some(store), sources)
    }

    /// Reads from the local fallback only; every write fails.
    pub fn fallback_only(fallback_dir: impl Into<PathBuf>) -> Self {
        Self::new(None, SourceChain::new().with(LocalFallback::new(fallback_dir)))
    }

    /// Builds the remote client and source chain described by `config`.
    pub fn from_config(config: &InventoryConfig) -> Result<Self> {
        let manager = if config.is_remote_configured() {
            let client = ContentsClient::new(config)?;
            Self::with_store(Arc::new(client), config.fallback_dir.clone())
        } else {
            let mut sources = SourceChain::new();
            if let Some(dir) = &config.fallback_dir {
                sources = sources.with(LocalFallback::new(dir.clone()));
            }
            Self::new(None, sources)
        };
        Ok(manager.with_max_commit_attempts(config.max_commit_attempts))
    }

    /// Sets the number of read-modify-write attempts per write (minimum 1).
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    /// The read chain.
    pub fn sources(&self) -> &SourceChain {
        &self.sources
    }

    /// True when writes have a configured remote target.
    pub fn can_write(&self) -> bool {
        self.store.as_ref().is_some_and(|s| s.is_configured())
    }

    /// Reads and parses a table without resolving derived names.
    pub async fn load_table<T: Entity>(&self) -> Result<Loaded<T>> {
        let read = self.sources.read(&T::KIND.file_name()).await?;
        let table = parse_records::<T>(&read.text);
        if !table.is_clean() {
            warn!(
                "{}: dropped {} malformed row(s) from {}",
                T::KIND,
                table.skipped.len(),
                read.source
            );
        }
        Ok(Loaded {
            records: table.records,
            source: read.source,
            skipped_rows: table.skipped.len(),
        })
    }

    /// Reads a table and resolves its derived names.
    pub async fn load<T: Entity>(&self) -> Result<Loaded<T>> {
        let (table, references) =
            tokio::join!(self.load_table::<T>(), self.reference_tables(T::REFERENCES));
        let mut table = table?;
        references.resolve(&mut table.records);
        Ok(table)
    }

    /// Loads the given reference tables concurrently.
    ///
    /// A table that fails to load is left out, so names pointing into it
    /// resolve to "".
    pub async fn reference_tables(&self, kinds: &[EntityKind]) -> ReferenceTables {
        let (users, organisms, vendors, categories) = tokio::join!(
            self.reference_rows::<User>(kinds),
            self.reference_rows::<Organism>(kinds),
            self.reference_rows::<Vendor>(kinds),
            self.reference_rows::<Category>(kinds),
        );

        let mut tables = ReferenceTables::new();
        if let Some(rows) = users {
            tables.insert(&rows);
        }
        if let Some(rows) = organisms {
            tables.insert(&rows);
        }
        if let Some(rows) = vendors {
            tables.insert(&rows);
        }
        if let Some(rows) = categories {
            tables.insert(&rows);
        }
        tables
    }

    async fn reference_rows<R: Reference>(&self, kinds: &[EntityKind]) -> Option<Vec<R>> {
        if !kinds.contains(&R::KIND) {
            return None;
        }
        match self.load_table::<R>().await {
            Ok(table) => Some(table.records),
            Err(e) => {
                warn!("Could not load {} for name resolution: {}", R::KIND, e);
                None
            }
        }
    }

    /// Finds one record by id, names resolved.
    pub async fn find<T: Entity>(&self, id: u64) -> Result<T> {
        self.load::<T>()
            .await?
            .records
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| InventoryError::RecordNotFound {
                table: T::KIND.to_string(),
                id,
            })
    }

    pub async fn get_users(&self) -> Result<Vec<User>> {
        Ok(self.load::<User>().await?.records)
    }

    pub async fn get_organisms(&self) -> Result<Vec<Organism>> {
        Ok(self.load::<Organism>().await?.records)
    }

    pub async fn get_vendors(&self) -> Result<Vec<Vendor>> {
        Ok(self.load::<Vendor>().await?.records)
    }

    pub async fn get_categories(&self) -> Result<Vec<Category>> {
        Ok(self.load::<Category>().await?.records)
    }

    pub async fn get_celllines(&self) -> Result<Vec<Cellline>> {
        Ok(self.load::<Cellline>().await?.records)
    }

    pub async fn get_orders(&self) -> Result<Vec<Order>> {
        Ok(self.load::<Order>().await?.records)
    }

    pub async fn get_oligos(&self) -> Result<Vec<Oligo>> {
        Ok(self.load::<Oligo>().await?.records)
    }

    pub async fn get_plasmids(&self) -> Result<Vec<Plasmid>> {
        Ok(self.load::<Plasmid>().await?.records)
    }

    /// Reads a table by name and returns it as JSON, names resolved.
    pub async fn list_json(&self, entity: &str) -> Result<serde_json::Value> {
        let kind: EntityKind = entity.parse()?;
        with_entity_type!(kind, T => {
            let table = self.load::<T>().await?;
            Ok(serde_json::to_value(table)?)
        })
    }

    /// Reads one record by table name and id as JSON.
    pub async fn find_json(&self, entity: &str, id: u64) -> Result<serde_json::Value> {
        let kind: EntityKind = entity.parse()?;
        with_entity_type!(kind, T => {
            let record = self.find::<T>(id).await?;
            Ok(serde_json::to_value(record)?)
        })
    }

    /// Reads a table by name and serializes it back to CSV.
    ///
    /// Derived names are not part of the output.
    pub async fn export(&self, entity: &str) -> Result<String> {
        let kind: EntityKind = entity.parse()?;
        with_entity_type!(kind, T => {
            let table = self.load_table::<T>().await?;
            serialize_table(&table.records)
        })
    }

    /// Adds a record with the next free id.
    pub async fn add<T: Entity>(&self, record: T) -> Result<WriteOutcome> {
        self.commit_cycle::<T, _>(move |records| {
            let id = next_id(records.iter().map(Entity::id));
            let mut record = record.clone();
            record.set_id(id);
            record.prepare_new();
            records.push(record);
            Ok(Change {
                ids: vec![id],
                message: format!("Add {} record {}", T::KIND, id),
            })
        })
        .await
    }

    /// Shallow-merges `patch` over the record with `id`.
    ///
    /// Like [`delete`](Self::delete), this touches every row carrying `id`
    /// when a hand-edited table holds duplicates.
    pub async fn update_record<T: Entity>(&self, id: u64, patch: FieldPatch) -> Result<WriteOutcome> {
        self.commit_cycle::<T, _>(move |records| {
            let mut matched = false;
            for record in records.iter_mut().filter(|r| r.id() == id) {
                record.apply_patch(&patch)?;
                matched = true;
            }
            if !matched {
                return Err(InventoryError::RecordNotFound {
                    table: T::KIND.to_string(),
                    id,
                });
            }
            let columns: Vec<&str> = patch.keys().map(String::as_str).collect();
            Ok(Change {
                ids: vec![id],
                message: format!("Update {} record {} ({})", T::KIND, id, columns.join(", ")),
            })
        })
        .await
    }

    /// Removes every row with `id`.
    pub async fn delete<T: Entity>(&self, id: u64) -> Result<WriteOutcome> {
        self.commit_cycle::<T, _>(move |records| {
            let before = records.len();
            records.retain(|r| r.id() != id);
            if records.len() == before {
                return Err(InventoryError::RecordNotFound {
                    table: T::KIND.to_string(),
                    id,
                });
            }
            Ok(Change {
                ids: vec![id],
                message: format!("Delete {} record {}", T::KIND, id),
            })
        })
        .await
    }

    /// Appends `records` with ids `max+1 ..= max+N` in one commit.
    ///
    /// Incoming ids are ignored. No de-duplication against existing rows is
    /// done.
    pub async fn bulk_import<T: Entity>(&self, records: Vec<T>) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Err(InventoryError::InvalidArgument(format!(
                "nothing to import into {}",
                T::KIND
            )));
        }
        self.commit_cycle::<T, _>(move |existing| {
            let first = next_id(existing.iter().map(Entity::id));
            let mut ids = Vec::with_capacity(records.len());
            for (offset, record) in records.iter().enumerate() {
                let id = first + offset as u64;
                let mut record = record.clone();
                record.set_id(id);
                record.prepare_new();
                existing.push(record);
                ids.push(id);
            }
            let last = first + records.len() as u64 - 1;
            Ok(Change {
                message: format!(
                    "Import {} {} record(s) (ids {}-{})",
                    ids.len(),
                    T::KIND,
                    first,
                    last
                ),
                ids,
            })
        })
        .await
    }

    /// Applies a [`Mutation`] to the table named `entity`.
    ///
    /// Fails with [`InventoryError::NotConfigured`] when there is no remote
    /// store, and with [`InventoryError::UnsupportedEntity`] for an unknown
    /// table name.
    pub async fn update(&self, entity: &str, mutation: Mutation) -> Result<WriteOutcome> {
        self.writable_store()?;
        let kind: EntityKind = entity.parse()?;
        with_entity_type!(kind, T => self.apply_mutation::<T>(mutation).await)
    }

    async fn apply_mutation<T: Entity>(&self, mutation: Mutation) -> Result<WriteOutcome> {
        match mutation {
            Mutation::Add(fields) => self.add(T::from_patch(&fields)?).await,
            Mutation::Update { id, patch } => self.update_record::<T>(id, patch).await,
            Mutation::Delete { id } => self.delete::<T>(id).await,
        }
    }

    /// Parses CSV text with the table's header and bulk-imports its rows.
    ///
    /// The id column is ignored; blank ids are fine. Any row that cannot be
    /// mapped fails the whole import.
    pub async fn import_csv(&self, entity: &str, text: &str) -> Result<WriteOutcome> {
        self.writable_store()?;
        let kind: EntityKind = entity.parse()?;
        with_entity_type!(kind, T => {
            let table = parse_new_records::<T>(text);
            if let Some(first) = table.skipped.into_iter().next() {
                return Err(first);
            }
            self.bulk_import(table.records).await
        })
    }

    fn writable_store(&self) -> Result<&Arc<dyn ContentStore>> {
        match &self.store {
            Some(store) if store.is_configured() => Ok(store),
            Some(store) => Err(InventoryError::NotConfigured(format!(
                "{} cannot accept writes",
                store.describe()
            ))),
            None => Err(InventoryError::NotConfigured(
                "writes need a remote store; the fallback source is read-only".to_string(),
            )),
        }
    }

    /// Runs the read-modify-write cycle for table `T`.
    async fn commit_cycle<T, F>(&self, mut mutate: F) -> Result<WriteOutcome>
    where
        T: Entity,
        F: FnMut(&mut Vec<T>) -> Result<Change> + Send,
    {
        let store = self.writable_store()?;
        let filename = T::KIND.file_name();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let snapshot = store.csv_snapshot(&filename).await?;
            let table = parse_records::<T>(&snapshot.text);
            let dropped_rows = table.skipped.len();
            if dropped_rows > 0 {
                warn!(
                    "{}: {} malformed row(s) will not be carried into the next revision",
                    snapshot.path, dropped_rows
                );
            }

            let mut records = table.records;
            let duplicates = duplicate_ids(&records);
            if !duplicates.is_empty() {
                warn!(
                    "{}: duplicate id(s) {:?}; updates and deletes apply to every copy",
                    snapshot.path, duplicates
                );
            }
            let change = mutate(&mut records)?;
            for record in records.iter_mut() {
                record.strip_derived();
            }
            let text = serialize_table(&records)?;

            match store
                .update_file(&snapshot.path, &text, &change.message, snapshot.sha.as_deref())
                .await
            {
                Ok(commit) => {
                    info!(
                        "{} -> {} ({})",
                        change.message,
                        snapshot.path,
                        short_sha(&commit.sha)
                    );
                    return Ok(WriteOutcome {
                        kind: T::KIND,
                        ids: change.ids,
                        message: change.message,
                        commit,
                        attempts: attempt,
                        dropped_rows,
                    });
                }
                Err(e) if e.is_conflict() && attempt < self.max_commit_attempts => {
                    warn!(
                        "{} changed remotely during write (attempt {}/{}); re-reading",
                        snapshot.path, attempt, self.max_commit_attempts
                    );
                }
                Err(e) if e.is_conflict() => {
                    return Err(InventoryError::OptimisticConflict {
                        path: snapshot.path,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Ids that occur on more than one row, ascending.
fn duplicate_ids<T: Entity>(records: &[T]) -> Vec<u64> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for record in records {
        if !seen.insert(record.id()) {
            duplicates.insert(record.id());
        }
    }
    duplicates.into_iter().collect()
}
