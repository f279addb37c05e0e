use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap, fs, path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};

mod buffer;
mod catalog;
mod executor;
mod storage;

pub use buffer::{BufferPage, BufferPool};
pub use catalog::{Catalog, Column, ColumnType, TableSchema};
pub use executor::{count_matching, matches_pred, scan_window, Window};
pub use storage::{PageId, PageOnDisk, TableStorage, Wal, WalRecord, WalRecordType, PAGE_SIZE};

/// A single stored scalar.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Value {
    /// 64-bit signed integer value
    Int(i64),
    /// UTF-8 text string value
    Text(String),
    /// Calendar date without a time component
    Date(NaiveDate),
}

impl Value {
    /// The column type this value can be stored in.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Text(_) => ColumnType::Text,
            Value::Date(_) => ColumnType::Date,
        }
    }

    /// Orders two values of the same variant. Values of different
    /// variants are not comparable.
    pub(crate) fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// A stored row: column name -> value.
pub type Row = HashMap<String, Value>;

/// Row filter evaluated during scans and counts.
///
/// The set is deliberately small: equality, one substring test, a strict
/// upper bound, and conjunction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Predicate {
    /// Equality comparison: column = value
    Eq(String, Value),
    /// Case-sensitive substring test on a text column
    Contains(String, String),
    /// Strict upper bound: column < value (same-typed values only)
    Before(String, Value),
    /// Logical AND of two predicates
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }
}

/// Applied records the WAL may hold before an insert empties it.
pub const WAL_CHECKPOINT_RECORDS: u64 = 256;

/// Tunables for [`Engine::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Capacity of the LRU buffer pool, in pages
    pub buffer_pages: usize,
    /// fsync the WAL after every append
    pub sync_wal: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            buffer_pages: 64,
            sync_wal: true,
        }
    }
}

/// Durable row store backing the record service.
///
/// The Engine owns the WAL, the catalog, the buffer pool and one page file
/// per table:
///
/// ```text
/// ┌─────────────┐    ┌──────────────┐    ┌─────────────┐
/// │    WAL      │    │    Catalog   │    │ Buffer Pool │
/// │ (Durability)│    │ (Schemas,    │    │ (Tail page  │
/// │             │    │  identities) │    │  caching)   │
/// └─────────────┘    └──────────────┘    └─────────────┘
///        │                   │                   │
///        └───────────────────┼───────────────────┘
///                    ┌───────▼────────┐
///                    │     Engine     │
///                    └───────┬────────┘
///                    ┌───────▼────────┐
///                    │ Table Storage  │
///                    └────────────────┘
/// ```
///
/// ## Concurrency
///
/// `gate` is the single serialization point between writers and readers.
/// An insert holds the write side from WAL append until its page is
/// flushed; scans and counts hold the read side. A reader therefore never
/// observes a half-written page file, but two separate reads may straddle
/// an insert.
pub struct Engine {
    /// Base directory for all database files
    data_dir: PathBuf,
    /// Schema metadata, identity sequences and LSN tracking
    catalog: RwLock<Catalog>,
    /// Write-ahead log
    wal: RwLock<Wal>,
    /// LRU buffer pool for page caching
    buffers: BufferPool,
    /// Open table storage handles
    tables: RwLock<HashMap<String, Arc<TableStorage>>>,
    /// Reader/writer gate over the page files
    gate: tokio::sync::RwLock<()>,
}

impl Engine {
    /// Opens or creates an engine in `dir` and replays the WAL.
    ///
    /// ## Initialization
    /// 1. Creates `tables/` and `wal/` under `dir`
    /// 2. Loads or creates `catalog.json`
    /// 3. Opens `wal/log.jsonl`
    /// 4. Reopens the page file of every cataloged table
    /// 5. Replays WAL records newer than the catalog's `last_applied_lsn`
    /// 6. Empties the WAL, since everything in it is now applied
    ///
    /// ## Example
    /// ```no_run
    /// # async fn demo() -> anyhow::Result<()> {
    /// use people_db::engine::{Engine, EngineOptions};
    /// let engine = Engine::open("./dbdata", EngineOptions::default()).await?;
    /// # Ok(()) }
    /// ```
    pub async fn open<P: Into<PathBuf>>(dir: P, options: EngineOptions) -> Result<Self> {
        let data_dir: PathBuf = dir.into();

        fs::create_dir_all(data_dir.join("tables"))?;
        fs::create_dir_all(data_dir.join("wal"))?;

        let catalog = Catalog::load_or_create(data_dir.join("catalog.json"))?;
        let wal = Wal::open(
            data_dir.join("wal").join("log.jsonl"),
            options.sync_wal,
            catalog.last_applied_lsn,
        )?;

        let mut tables = HashMap::new();
        for tname in catalog.tables.keys() {
            let st = TableStorage::open(data_dir.join("tables"), tname)?;
            tables.insert(tname.clone(), Arc::new(st));
        }

        let mut engine = Self {
            data_dir,
            catalog: RwLock::new(catalog),
            wal: RwLock::new(wal),
            buffers: BufferPool::new(options.buffer_pages),
            tables: RwLock::new(tables),
            gate: tokio::sync::RwLock::new(()),
        };

        engine.recover().await?;
        engine.wal.write().truncate()?;
        info!(
            dir = %engine.data_dir.display(),
            tables = engine.tables.read().len(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Replays WAL records written after the last checkpoint.
    ///
    /// Inserts carry their assigned identity, so a replayed insert whose
    /// identity is already present in the page file is skipped. This
    /// covers a crash between the page flush and the checkpoint update.
    /// Every replayed identity also advances the table's sequence, which
    /// keeps identities unique after recovery.
    async fn recover(&mut self) -> Result<()> {
        let last_applied_lsn = self.catalog.read().last_applied_lsn;
        let records = self.wal.read().read_from_lsn(last_applied_lsn)?;

        if records.is_empty() {
            info!(last_applied_lsn, "no WAL records to replay");
            return Ok(());
        }

        warn!(count = records.len(), last_applied_lsn, "replaying WAL records");
        let mut max_applied_lsn = last_applied_lsn;

        for record in records {
            match record {
                WalRecord::CreateTable {
                    lsn,
                    name,
                    columns,
                    identity,
                } => {
                    if !self.has_table(&name) {
                        self.apply_create_table(&name, columns, identity)?;
                    }
                    max_applied_lsn = lsn;
                }
                WalRecord::Insert { lsn, table, row } => {
                    let schema = self.schema(&table)?;
                    if let Some(id_col) = &schema.identity {
                        if let Some(Value::Int(id)) = row.get(id_col) {
                            if let Ok(id) = u64::try_from(*id) {
                                self.catalog.write().observe_identity(&table, id)?;
                            }
                            let st = self.get_storage(&table)?;
                            let present = Predicate::Eq(id_col.clone(), Value::Int(*id));
                            if count_matching(&st, Some(&present)).await? > 0 {
                                debug!(lsn, %table, id, "row already applied, skipping");
                                max_applied_lsn = lsn;
                                continue;
                            }
                        }
                    }
                    self.apply_insert(&table, row).await?;
                    max_applied_lsn = lsn;
                }
            }
        }

        self.catalog.write().update_last_applied_lsn(max_applied_lsn)?;
        info!(max_applied_lsn, "recovery complete");
        Ok(())
    }

    /// Creates a table.
    ///
    /// `identity` names an `Int` column whose value the engine assigns on
    /// every insert from a per-table sequence starting at 1.
    ///
    /// ## Returns
    /// * `Err(_)` - The table exists, the identity column is undeclared or
    ///   not `Int`, or an I/O error occurred
    pub async fn create_table(
        &self,
        name: &str,
        columns: Vec<Column>,
        identity: Option<&str>,
    ) -> Result<()> {
        let _guard = self.gate.write().await;

        if self.has_table(name) {
            return Err(anyhow!("Table {} already exists", name));
        }
        if let Some(id_col) = identity {
            match columns.iter().find(|c| c.name == id_col) {
                Some(c) if c.col_type == ColumnType::Int => {}
                Some(_) => return Err(anyhow!("Identity column {} must be INT", id_col)),
                None => return Err(anyhow!("Unknown identity column {}", id_col)),
            }
        }
        let identity = identity.map(str::to_string);

        let lsn = {
            let mut wal = self.wal.write();
            let record = wal.create_record(WalRecordType::CreateTable {
                name: name.to_string(),
                columns: columns.clone(),
                identity: identity.clone(),
            });
            let lsn = record.lsn();
            wal.append(record)?;
            lsn
        };

        self.apply_create_table(name, columns, identity)?;
        self.catalog.write().update_last_applied_lsn(lsn)?;
        info!(table = name, "table created");
        Ok(())
    }

    fn apply_create_table(
        &self,
        name: &str,
        columns: Vec<Column>,
        identity: Option<String>,
    ) -> Result<()> {
        self.catalog.write().create_table(name, columns, identity)?;
        let st = Arc::new(TableStorage::open(self.data_dir.join("tables"), name)?);
        self.tables.write().insert(name.to_string(), st);
        Ok(())
    }

    /// Inserts one row and returns it as stored, identity included.
    ///
    /// ## Write Sequence
    /// 1. Validate the row against the table schema
    /// 2. Allocate the next identity (persisted before use, so a crash
    ///    never hands the same identity out twice)
    /// 3. Append the WAL record
    /// 4. Append to the tail page through the buffer pool and flush
    /// 5. Advance `last_applied_lsn`
    /// 6. Empty the WAL once it holds [`WAL_CHECKPOINT_RECORDS`] records
    ///
    /// The whole sequence runs under the write side of the gate.
    pub async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        let schema = self.schema(table)?;
        schema.check_row(&row)?;

        let _guard = self.gate.write().await;

        if let Some(id_col) = &schema.identity {
            let id = self.catalog.write().next_identity(table)?;
            row.insert(id_col.clone(), Value::Int(i64::try_from(id)?));
        }

        let lsn = {
            let mut wal = self.wal.write();
            let record = wal.create_record(WalRecordType::Insert {
                table: table.to_string(),
                row: row.clone(),
            });
            let lsn = record.lsn();
            wal.append(record)?;
            lsn
        };

        self.apply_insert(table, row.clone()).await?;
        self.catalog.write().update_last_applied_lsn(lsn)?;

        {
            let mut wal = self.wal.write();
            if wal.appended() >= WAL_CHECKPOINT_RECORDS {
                wal.truncate()?;
                debug!(lsn, "WAL checkpointed");
            }
        }
        Ok(row)
    }

    /// Appends a row to table storage and writes the touched pages back.
    /// Called during normal operation and WAL recovery.
    async fn apply_insert(&self, table: &str, row: Row) -> Result<()> {
        let st = self.get_storage(table)?;
        st.append_row(&self.buffers, row).await?;
        self.buffers.flush_all_for(&st).await
    }

    /// Returns rows matching `pred`, in insertion order, restricted to
    /// `window`.
    ///
    /// ## Example
    /// ```no_run
    /// # async fn demo(engine: &people_db::engine::Engine) -> anyhow::Result<()> {
    /// use people_db::engine::{Predicate, Value, Window};
    /// let pred = Predicate::Eq("eyes".to_string(), Value::Text("BLUE".to_string()));
    /// let first_ten = engine.select("person", Some(&pred), Window::new(0, Some(10))).await?;
    /// # Ok(()) }
    /// ```
    pub async fn select(
        &self,
        table: &str,
        pred: Option<&Predicate>,
        window: Window,
    ) -> Result<Vec<Row>> {
        let st = self.get_storage(table)?;
        let _guard = self.gate.read().await;
        scan_window(&st, pred, window).await
    }

    /// Counts rows matching `pred` (all rows when `None`).
    pub async fn count(&self, table: &str, pred: Option<&Predicate>) -> Result<usize> {
        let st = self.get_storage(table)?;
        let _guard = self.gate.read().await;
        count_matching(&st, pred).await
    }

    /// Whether `name` is a cataloged table.
    pub fn has_table(&self, name: &str) -> bool {
        self.catalog.read().tables.contains_key(name)
    }

    /// Schema of `name`.
    pub fn schema(&self, name: &str) -> Result<TableSchema> {
        self.catalog
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown table {}", name))
    }

    fn get_storage(&self, table: &str) -> Result<Arc<TableStorage>> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown table {}", table))
    }
}
