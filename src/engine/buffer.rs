use anyhow::{anyhow, Result};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::{num::NonZeroUsize, sync::Arc};

use super::storage::{PageId, PageOnDisk, TableStorage};

/// Cache key: a page id is only unique within its table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BufferKey {
    table: String,
    page_id: PageId,
}

/// A cached page plus its dirty flag.
///
/// `dirty = true` means the page differs from the table file and must be
/// written back before it is dropped from the pool.
pub struct BufferPage {
    /// The page data, shared between the pool and the current writer
    pub data: RwLock<PageOnDisk>,
    /// Whether the page has been modified since it was last written
    pub dirty: RwLock<bool>,
}

struct Slot {
    page: Arc<BufferPage>,
    /// Where the page is written back to on eviction
    owner: TableStorage,
}

/// LRU page cache shared by all tables.
///
/// ```text
/// append_row → get_or_load() → hit: cached page
///                    ↓ miss
///              read from table file → insert → pool full? evict LRU
///                                                   ↓ dirty
///                                         write back to its own table
/// ```
///
/// Writers mark pages dirty; [`BufferPool::flush_all_for`] writes a table's
/// dirty pages back. The cache mutex is never held across file I/O.
pub struct BufferPool {
    /// Maximum number of pages to keep in memory
    cap: usize,
    cache: Mutex<LruCache<BufferKey, Slot>>,
}

impl BufferPool {
    /// Creates a pool holding at most `cap_pages` pages (at least one).
    pub fn new(cap_pages: usize) -> Self {
        let cap = NonZeroUsize::new(cap_pages).unwrap_or(NonZeroUsize::MIN);
        Self {
            cap: cap.get(),
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the pool holds no pages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached page, loading it from `table` on a miss.
    ///
    /// ## Errors
    /// I/O failure while loading the page or writing back an evicted dirty
    /// page.
    pub async fn get_or_load(
        &self,
        table: &TableStorage,
        page_id: PageId,
    ) -> Result<Arc<BufferPage>> {
        let key = BufferKey {
            table: table.name.clone(),
            page_id,
        };

        let cached = self.cache.lock().get(&key).map(|slot| slot.page.clone());
        if let Some(page) = cached {
            return Ok(page);
        }

        let mut loaded = table.read_page(page_id).await?;
        let page = Arc::new(BufferPage {
            data: RwLock::new(loaded.take()),
            dirty: RwLock::new(false),
        });
        self.insert_with_eviction(
            key,
            Slot {
                page: page.clone(),
                owner: table.clone(),
            },
        )
        .await?;

        Ok(page)
    }

    /// Inserts a slot, evicting the least recently used page first when
    /// the pool is full. A dirty victim is written back to its owner
    /// outside the cache lock.
    async fn insert_with_eviction(&self, key: BufferKey, slot: Slot) -> Result<()> {
        let victim = {
            let mut cache = self.cache.lock();
            if cache.len() >= self.cap && !cache.contains(&key) {
                cache.pop_lru().filter(|(_, old)| *old.page.dirty.read())
            } else {
                None
            }
        };

        if let Some((old_key, old)) = victim {
            let data = old.page.data.read().clone();
            old.owner
                .write_page(old_key.page_id, data)
                .await
                .map_err(|e| anyhow!("write back of {:?} failed: {}", old_key, e))?;
            *old.page.dirty.write() = false;
        }

        self.cache.lock().put(key, slot);
        Ok(())
    }

    /// Writes every dirty page of `table` back to its file and clears the
    /// dirty flags.
    pub async fn flush_all_for(&self, table: &TableStorage) -> Result<()> {
        let mut to_flush = Vec::new();
        {
            let cache = self.cache.lock();
            for (key, slot) in cache.iter() {
                if key.table == table.name && *slot.page.dirty.read() {
                    to_flush.push((key.page_id, slot.page.data.read().clone()));
                    *slot.page.dirty.write() = false;
                }
            }
        }
        for (pid, data) in to_flush {
            table.write_page(pid, data).await?;
        }
        Ok(())
    }
}
