//! Read-side query engine.
//!
//! Translates raw request parameters into store calls. The engine keeps no
//! mutable state of its own; any number of requests may run through one
//! instance concurrently.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::person::{Attribute, Criteria, Criterion, EyeColor, Person, PersonStore};

pub mod datatable;

pub use datatable::{DataTableParams, DataTableResponse};

/// One page request: offset, page size and optional name filter.
///
/// `start` and `length` are signed so that negative values coming off the
/// wire reach validation instead of failing to parse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub start: i64,
    pub length: i64,
    pub search: Option<String>,
}

/// Filtered page plus the two counts a table widget needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TablePage {
    /// Every record in the store
    pub records_total: u64,
    /// Records matching the search, before paging
    pub records_filtered: u64,
    /// The requested page of matches
    pub data: Vec<Person>,
}

pub struct QueryEngine {
    store: Arc<PersonStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<PersonStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PersonStore> {
        &self.store
    }

    /// Every stored person.
    pub async fn all_people(&self) -> Result<Vec<Person>> {
        self.store.scan_all().await
    }

    /// People with the given eye colour. `color` must be one of the
    /// upper-case names; anything else is rejected before the store is
    /// touched.
    pub async fn people_with_eyes(&self, color: &str) -> Result<Vec<Person>> {
        let color: EyeColor = color.parse()?;
        self.store.find_by(Attribute::Eyes(color)).await
    }

    /// People born in `year` or earlier.
    pub async fn people_born_in_or_before(&self, year: i32) -> Result<Vec<Person>> {
        self.store
            .find(&Criteria::all().with(Criterion::BornInOrBefore(year)))
            .await
    }

    /// Computes one table page.
    ///
    /// ## Algorithm
    /// 1. Reject `length <= 0` and `start < 0`
    /// 2. `page_index = start / length` (truncating)
    /// 3. Absent or empty search selects everything, otherwise the name
    ///    substring matches
    /// 4. `records_filtered` = size of the filtered set
    /// 5. `records_total` = size of the whole store
    /// 6. `data` = page `page_index` of the filtered set
    ///
    /// `start` is expected to be a multiple of `length`. A misaligned
    /// `start` is not rounded into an arbitrary offset: the page that
    /// contains it is returned.
    ///
    /// Steps 4–6 are separate store reads. An insert landing between them
    /// can make the counts disagree with `data` by the number of records
    /// inserted in that window; the next request sees a consistent state.
    pub async fn table_page(&self, request: &PageRequest) -> Result<TablePage> {
        if request.length == 0 {
            return Err(Error::invalid("length must be greater than zero"));
        }
        if request.length < 0 {
            return Err(Error::invalid(format!(
                "length must not be negative, got {}",
                request.length
            )));
        }
        if request.start < 0 {
            return Err(Error::invalid(format!(
                "start must not be negative, got {}",
                request.start
            )));
        }

        // Both operands are positive, so the casts are lossless.
        let page_size = request.length as u64;
        let page_index = request.start as u64 / page_size;

        let query = self.store.search_by_name(request.search.as_deref());
        let records_filtered = query.count().await?;
        let records_total = self.store.count(&Criteria::all()).await?;
        let data = query.page(page_index, page_size).await?;

        debug!(
            start = request.start,
            length = request.length,
            search = request.search.as_deref().unwrap_or(""),
            records_total,
            records_filtered,
            returned = data.len(),
            "table page"
        );

        Ok(TablePage {
            records_total,
            records_filtered,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineOptions};
    use crate::person::NewPerson;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn engine(dir: &TempDir, names: &[&str]) -> QueryEngine {
        let options = EngineOptions {
            buffer_pages: 8,
            sync_wal: false,
        };
        let engine = Arc::new(Engine::open(dir.path(), options).await.unwrap());
        let store = Arc::new(PersonStore::open(engine).await.unwrap());
        let birth = NaiveDate::from_ymd_opt(1980, 1, 1).unwrap();
        for (i, name) in names.iter().enumerate() {
            let eyes = EyeColor::ALL[i % EyeColor::ALL.len()];
            store.insert(NewPerson::new(*name, birth, eyes)).await.unwrap();
        }
        QueryEngine::new(store)
    }

    fn request(start: i64, length: i64, search: Option<&str>) -> PageRequest {
        PageRequest {
            start,
            length,
            search: search.map(str::to_string),
        }
    }

    const NAMES: [&str; 7] = ["Ann", "Bo", "Cat", "Dan", "Eve", "Fran", "Gus"];

    #[tokio::test]
    async fn rejects_bad_paging_parameters() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        for (start, length) in [(0, 0), (10, 0), (0, -1), (-10, 10)] {
            let err = engine.table_page(&request(start, length, None)).await.unwrap_err();
            assert!(err.is_client_error(), "{start}/{length} -> {err}");
        }
    }

    #[tokio::test]
    async fn pages_through_the_filtered_set() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        let first = engine.table_page(&request(0, 2, Some("an"))).await.unwrap();
        assert_eq!(first.records_total, 7);
        assert_eq!(first.records_filtered, 2);
        let names: Vec<_> = first.data.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Dan", "Fran"]);

        let beyond = engine.table_page(&request(2, 2, Some("an"))).await.unwrap();
        assert_eq!(beyond.records_filtered, 2);
        assert!(beyond.data.is_empty());
    }

    #[tokio::test]
    async fn empty_search_is_unfiltered() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        let page = engine.table_page(&request(6, 3, Some(""))).await.unwrap();
        assert_eq!(page.records_filtered, 7);
        assert_eq!(page.records_total, 7);
        let names: Vec<_> = page.data.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Gus"]);
    }

    #[tokio::test]
    async fn misaligned_start_returns_the_enclosing_page() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        let aligned = engine.table_page(&request(3, 3, None)).await.unwrap();
        let misaligned = engine.table_page(&request(5, 3, None)).await.unwrap();
        assert_eq!(aligned, misaligned);
        assert_eq!(misaligned.data.len(), 3);
    }

    #[tokio::test]
    async fn every_page_respects_the_length_bound() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        let mut seen = Vec::new();
        for k in 0..5 {
            let page = engine.table_page(&request(k * 2, 2, None)).await.unwrap();
            assert!(page.data.len() <= 2);
            if (k * 2) as u64 >= page.records_filtered {
                assert!(page.data.is_empty());
            }
            seen.extend(page.data.into_iter().map(|p| p.id));
        }
        assert_eq!(seen, (1..=7).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn eye_lookup_validates_the_color() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &NAMES).await;

        let blue = engine.people_with_eyes("BLUE").await.unwrap();
        assert_eq!(blue.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 5]);
        assert!(engine.people_with_eyes("Blue").await.unwrap_err().is_client_error());
        assert_eq!(engine.all_people().await.unwrap().len(), 7);
        assert_eq!(engine.people_born_in_or_before(1980).await.unwrap().len(), 7);
        assert!(engine.people_born_in_or_before(1979).await.unwrap().is_empty());
    }
}
