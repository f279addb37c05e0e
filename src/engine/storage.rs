use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tokio::fs as tfs;
use tracing::warn;

use crate::engine::{BufferPool, Column, Row};

/// Standard page size (4KB). A page is full once its serialized form would
/// exceed this many bytes.
pub const PAGE_SIZE: usize = 4096;

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replaces the contents of `path` with `bytes`.
///
/// The bytes go to a sibling `.tmp` file that is then renamed over `path`,
/// so a crash leaves either the old file or the new one, never a prefix.
/// A stale `.tmp` left by such a crash is simply overwritten next time.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let scratch = scratch_path(path);
    fs::write(&scratch, bytes)?;
    fs::rename(&scratch, path)?;
    Ok(())
}

/// Async form of [`replace_file`].
pub(crate) async fn replace_file_async(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let scratch = scratch_path(path);
    tfs::write(&scratch, bytes).await?;
    tfs::rename(&scratch, path).await?;
    Ok(())
}

/// Sequential page number within one table file, starting at 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageId(pub u64);

/// A page as stored on disk.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct PageOnDisk {
    /// Rows in insertion order
    pub rows: Vec<Row>,
}

impl PageOnDisk {
    /// A page holding no rows.
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// Moves the rows out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        PageOnDisk {
            rows: std::mem::take(&mut self.rows),
        }
    }
}

/// Page file of a single table.
///
/// The file holds a bincode-encoded `Vec<PageOnDisk>`. Rows are only ever
/// appended, so page order followed by row order is insertion order:
///
/// ```text
/// person.tbl:
/// [Page0: rows 1..=n][Page1: rows n+1..=m]...[PageN: tail, still filling]
/// ```
///
/// Every rewrite goes through [`replace_file_async`].
///
/// ## Concurrency
/// TableStorage does no locking of its own. The engine's gate keeps
/// writers exclusive against readers.
#[derive(Clone, Debug)]
pub struct TableStorage {
    /// Table name; also the file stem
    pub name: String,
    /// `dir/<name>.tbl`
    path: PathBuf,
}

impl TableStorage {
    /// Opens the page file for `name` under `dir`, creating an empty one
    /// if needed.
    pub fn open(dir: PathBuf, name: &str) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.tbl", name));

        if !path.exists() {
            replace_file(&path, &bincode::serialize(&Vec::<PageOnDisk>::new())?)?;
        }

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    async fn read_pages(&self) -> Result<Vec<PageOnDisk>> {
        let data = tfs::read(&self.path).await?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(bincode::deserialize(&data)?)
    }

    /// Reads one page. A page past the end of the file reads as empty.
    pub async fn read_page(&self, pid: PageId) -> Result<PageOnDisk> {
        let mut pages = self.read_pages().await?;
        let idx = pid.0 as usize;
        if idx < pages.len() {
            Ok(pages.swap_remove(idx))
        } else {
            Ok(PageOnDisk::empty())
        }
    }

    /// Replaces page `pid`, padding the file with empty pages when `pid`
    /// lies past the end.
    pub async fn write_page(&self, pid: PageId, page: PageOnDisk) -> Result<()> {
        let mut pages = self.read_pages().await?;
        let idx = pid.0 as usize;
        if idx >= pages.len() {
            pages.resize(idx + 1, PageOnDisk::empty());
        }
        pages[idx] = page;
        replace_file_async(&self.path, bincode::serialize(&pages)?).await?;
        Ok(())
    }

    /// Appends a row to the tail page through the buffer pool.
    ///
    /// The tail page is modified in the pool and marked dirty; the caller
    /// flushes. When the row would push the tail past [`PAGE_SIZE`] it is
    /// written straight to a fresh page instead.
    pub async fn append_row(&self, buffers: &BufferPool, row: Row) -> Result<()> {
        let last_pid = self.last_page_id().await?;
        let page = buffers.get_or_load(self, last_pid).await?;

        let overflow = {
            let mut data = page.data.write();
            data.rows.push(row);
            if data.rows.len() > 1 && bincode::serialized_size(&*data)? as usize > PAGE_SIZE {
                data.rows.pop()
            } else {
                *page.dirty.write() = true;
                None
            }
        };

        if let Some(row) = overflow {
            let mut fresh = PageOnDisk::empty();
            fresh.rows.push(row);
            self.write_page(PageId(last_pid.0 + 1), fresh).await?;
        }
        Ok(())
    }

    /// Id of the tail page. An empty file gets its first page here.
    async fn last_page_id(&self) -> Result<PageId> {
        let pages = self.read_pages().await?;
        if pages.is_empty() {
            let bytes = bincode::serialize(&vec![PageOnDisk::empty()])?;
            replace_file_async(&self.path, bytes).await?;
            return Ok(PageId(0));
        }
        Ok(PageId((pages.len() - 1) as u64))
    }

    /// Every page with its id, in file order.
    pub async fn scan(&self) -> Result<Vec<(PageId, PageOnDisk)>> {
        let pages = self.read_pages().await?;
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, p)| (PageId(i as u64), p))
            .collect())
    }
}

/// One logged operation.
///
/// Serialized as JSON Lines with an internal `type` tag:
/// ```json
/// {"type":"Insert","lsn":42,"table":"person","row":{"id":{"Int":7},"name":{"Text":"Kim Hu"}}}
/// ```
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum WalRecord {
    /// Table creation with its schema.
    CreateTable {
        /// Unique sequence number for this operation
        lsn: u64,
        /// Name of the table to create
        name: String,
        /// Column definitions
        columns: Vec<Column>,
        /// Engine-assigned identity column, if any
        #[serde(default)]
        identity: Option<String>,
    },
    /// Single-row insert. The row already carries its assigned identity.
    Insert {
        /// Unique sequence number for this operation
        lsn: u64,
        /// Name of the target table
        table: String,
        /// Row data as column name -> value mapping
        row: Row,
    },
}

impl WalRecord {
    /// Log sequence number of the record.
    pub fn lsn(&self) -> u64 {
        match self {
            WalRecord::CreateTable { lsn, .. } => *lsn,
            WalRecord::Insert { lsn, .. } => *lsn,
        }
    }
}

/// A [`WalRecord`] before the WAL has given it an LSN.
///
/// ```rust,ignore
/// let record = wal.create_record(WalRecordType::Insert { table, row });
/// wal.append(record)?;
/// ```
#[derive(Clone, Debug)]
pub enum WalRecordType {
    /// Template for table creation
    CreateTable {
        /// Name of the table to create
        name: String,
        /// Column definitions
        columns: Vec<Column>,
        /// Engine-assigned identity column, if any
        identity: Option<String>,
    },
    /// Template for single-row inserts
    Insert {
        /// Name of the target table
        table: String,
        /// Row data including its identity
        row: Row,
    },
}

/// Append-only JSON Lines write-ahead log.
///
/// ```text
/// Operation → create_record() → append() → [fsync] → apply to page file
///                  ↑               ↑
///              assign LSN     write one line
/// ```
///
/// LSNs start at 1 and increase by one per record. They keep counting
/// across [`Wal::truncate`] and reopen: numbering continues after the
/// highest LSN on disk or the caller's checkpoint, whichever is larger.
///
/// A crash during `append` can leave a partial last line. `open` drops it;
/// the operation it described never reached the page files.
pub struct Wal {
    /// Location of the log, `<data>/wal/log.jsonl`
    path: PathBuf,
    /// Handle opened in append mode
    file: File,
    /// Next LSN to assign
    next_lsn: u64,
    /// fsync after every append
    sync: bool,
    /// Records appended since open or the last truncate
    appended: u64,
}

/// Parses a log image. Returns the records and the length of the intact
/// prefix. Only the final line may be damaged; damage anywhere earlier is
/// an error.
fn parse_log(bytes: &[u8]) -> Result<(Vec<WalRecord>, usize)> {
    let mut records = Vec::new();
    let mut intact = 0;
    while intact < bytes.len() {
        let rest = &bytes[intact..];
        let consumed = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        let line = String::from_utf8_lossy(&rest[..consumed]);
        let line = line.trim();
        if !line.is_empty() {
            match serde_json::from_str::<WalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if rest[consumed..].iter().all(u8::is_ascii_whitespace) => {
                    warn!(error = %e, offset = intact, "dropping torn WAL tail");
                    return Ok((records, intact));
                }
                Err(e) => return Err(anyhow!("corrupt WAL record at byte {}: {}", intact, e)),
            }
        }
        intact += consumed;
    }
    Ok((records, intact))
}

impl Wal {
    /// Opens or creates the log at `path`.
    ///
    /// ## Arguments
    /// * `path` - Log file; missing parent directories are created
    /// * `sync` - Whether `append` forces each record to stable storage
    /// * `checkpoint_lsn` - Highest LSN already applied elsewhere; new
    ///   records are numbered above it even when the log is empty
    pub fn open(path: PathBuf, sync: bool, checkpoint_lsn: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = if path.exists() { fs::read(&path)? } else { Vec::new() };
        let (records, intact) = parse_log(&bytes)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if intact < bytes.len() {
            file.set_len(intact as u64)?;
        }
        if intact > 0 && bytes[intact - 1] != b'\n' {
            file.write_all(b"\n")?;
        }

        let last_lsn = records.iter().map(WalRecord::lsn).max().unwrap_or(0);
        Ok(Self {
            path,
            file,
            next_lsn: last_lsn.max(checkpoint_lsn) + 1,
            sync,
            appended: 0,
        })
    }

    /// Stamps `record_type` with the next LSN.
    pub fn create_record(&mut self, record_type: WalRecordType) -> WalRecord {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        match record_type {
            WalRecordType::CreateTable {
                name,
                columns,
                identity,
            } => WalRecord::CreateTable {
                lsn,
                name,
                columns,
                identity,
            },
            WalRecordType::Insert { table, row } => WalRecord::Insert { lsn, table, row },
        }
    }

    /// Appends a record as one JSON line.
    ///
    /// With `sync` enabled the call returns only after `sync_all`, so the
    /// record survives a crash that happens right after.
    pub fn append(&mut self, rec: WalRecord) -> Result<()> {
        let mut line = serde_json::to_string(&rec)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        if self.sync {
            self.file.sync_all()?;
        }
        self.appended += 1;
        Ok(())
    }

    /// Records appended since open or the last [`Wal::truncate`].
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Discards every record. The caller guarantees that all of them are
    /// already applied and checkpointed. LSN numbering is unaffected.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        if self.sync {
            self.file.sync_all()?;
        }
        self.appended = 0;
        Ok(())
    }

    /// Reads every record in file (LSN) order.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let (records, _) = parse_log(&fs::read(&self.path)?)?;
        Ok(records)
    }

    /// Reads records with LSN strictly greater than `from_lsn`.
    pub fn read_from_lsn(&self, from_lsn: u64) -> Result<Vec<WalRecord>> {
        let mut records = self.read_all()?;
        records.retain(|r| r.lsn() > from_lsn);
        Ok(records)
    }
}
