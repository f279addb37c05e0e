use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};

use super::storage::replace_file;
use super::Row;

/// Enumeration of supported column data types.
///
/// ## Type Mapping
/// - `ColumnType::Int` ↔ `Value::Int(i64)`
/// - `ColumnType::Text` ↔ `Value::Text(String)`
/// - `ColumnType::Date` ↔ `Value::Date(NaiveDate)`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer type
    Int,
    /// Variable-length UTF-8 string type
    Text,
    /// Calendar date
    Date,
}

/// Definition of a single column within a table.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Column {
    /// Column name (must be unique within a table)
    pub name: String,
    /// Data type for values stored in this column
    pub col_type: ColumnType,
}

/// Schema of one table.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct TableSchema {
    /// Table name (unique within the database)
    pub name: String,
    /// Ordered list of column definitions
    pub columns: Vec<Column>,
    /// Column whose value the engine assigns on insert
    #[serde(default)]
    pub identity: Option<String>,
}

impl TableSchema {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Checks that `row` fits this schema.
    ///
    /// Every declared column must be present with its declared type, except
    /// the identity column, which may be absent (the engine fills it in).
    /// Columns the schema does not declare are rejected.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for col in &self.columns {
            let is_identity = self.identity.as_deref() == Some(col.name.as_str());
            match row.get(&col.name) {
                Some(v) if v.column_type() == col.col_type => {}
                Some(v) => {
                    return Err(anyhow!(
                        "Column {}.{} expects {:?}, got {:?}",
                        self.name,
                        col.name,
                        col.col_type,
                        v
                    ))
                }
                None if is_identity => {}
                None => return Err(anyhow!("Missing value for {}.{}", self.name, col.name)),
            }
        }
        if let Some(extra) = row.keys().find(|k| self.column(k).is_none()) {
            return Err(anyhow!("Unknown column {}.{}", self.name, extra));
        }
        Ok(())
    }
}

/// Data dictionary, persisted as pretty JSON. Every change rewrites the
/// whole file through [`replace_file`].
///
/// Besides the schemas it tracks two recovery-relevant counters:
/// - `last_applied_lsn`: highest WAL record known to be applied to the
///   page files; recovery replays only newer records
/// - `identities`: last identity handed out per table
///
/// ## File Format
/// ```json
/// {
///   "tables": {
///     "person": {
///       "name": "person",
///       "columns": [{"name": "id", "col_type": "Int"}],
///       "identity": "id"
///     }
///   },
///   "last_applied_lsn": 42,
///   "identities": {"person": 41}
/// }
/// ```
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Catalog {
    /// All table schemas indexed by table name
    pub tables: HashMap<String, TableSchema>,
    /// Highest WAL LSN that has been successfully applied
    pub last_applied_lsn: u64,
    /// Last identity assigned per table
    #[serde(default)]
    pub identities: HashMap<String, u64>,
    /// File path for persistence (not serialized)
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Catalog {
    /// Loads the catalog at `path`, or creates and persists an empty one.
    pub fn load_or_create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            let bytes = fs::read(&path)?;
            let mut c: Catalog = serde_json::from_slice(&bytes)?;
            c.path = Some(path);
            Ok(c)
        } else {
            let c = Catalog {
                path: Some(path),
                ..Catalog::default()
            };
            c.persist()?;
            Ok(c)
        }
    }

    /// Adds a table schema and persists the catalog.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        identity: Option<String>,
    ) -> Result<()> {
        let ts = TableSchema {
            name: name.to_string(),
            columns,
            identity,
        };
        self.tables.insert(name.to_string(), ts);
        self.persist()
    }

    /// Records that every WAL record up to `lsn` is applied.
    pub fn update_last_applied_lsn(&mut self, lsn: u64) -> Result<()> {
        self.last_applied_lsn = lsn;
        self.persist()
    }

    /// Hands out the next identity for `table`.
    ///
    /// The counter is persisted before the identity is returned, so an
    /// identity is never handed out twice, even across crashes. A crash
    /// can leave gaps.
    pub fn next_identity(&mut self, table: &str) -> Result<u64> {
        let next = self.identities.get(table).copied().unwrap_or(0) + 1;
        self.identities.insert(table.to_string(), next);
        self.persist()?;
        Ok(next)
    }

    /// Moves the sequence of `table` past `id` if it is behind.
    pub fn observe_identity(&mut self, table: &str, id: u64) -> Result<()> {
        let current = self.identities.entry(table.to_string()).or_insert(0);
        if id > *current {
            *current = id;
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            replace_file(path, &serde_json::to_vec_pretty(self)?)?;
        }
        Ok(())
    }
}
