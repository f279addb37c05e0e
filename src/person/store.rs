use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};

use super::{columns, person_columns, Attribute, NewPerson, Person};
use crate::engine::{Engine, Predicate, Value, Window};
use crate::error::{Error, Result};

/// Name of the table holding person records.
pub const PERSON_TABLE: &str = "person";

/// One condition of a [`Criteria`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Criterion {
    /// Exact match on one field
    Is(Attribute),
    /// Case-sensitive substring of the name; empty matches everything
    NameContains(String),
    /// Birth year at most the given year (inclusive)
    BornInOrBefore(i32),
}

/// Conjunction of criteria. Empty criteria match every record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria {
    items: Vec<Criterion>,
}

impl Criteria {
    /// Criteria matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, criterion: Criterion) -> Self {
        self.items.push(criterion);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The engine predicate for these criteria; `None` matches everything.
    pub(crate) fn to_predicate(&self) -> Option<Predicate> {
        let mut pred: Option<Predicate> = None;
        for item in &self.items {
            let next = match item {
                Criterion::Is(attribute) => attribute.to_predicate(),
                Criterion::NameContains(token) if token.is_empty() => continue,
                Criterion::NameContains(token) => {
                    Predicate::Contains(columns::NAME.into(), token.clone())
                }
                Criterion::BornInOrBefore(year) => {
                    let bound = year
                        .checked_add(1)
                        .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1));
                    let bound = match bound {
                        Some(bound) => bound,
                        // Every representable date is in or before such a year.
                        None if *year >= NaiveDate::MAX.year() => continue,
                        // Nothing is strictly before the earliest date.
                        None => NaiveDate::MIN,
                    };
                    Predicate::Before(columns::BIRTH.into(), Value::Date(bound))
                }
            };
            pred = Some(match pred {
                Some(p) => p.and(next),
                None => next,
            });
        }
        pred
    }
}

/// Person records over the storage engine.
///
/// Every method is a single engine call, and each call sees whole records
/// only. Two calls may observe different store states when an insert lands
/// in between; nothing here spans calls.
///
/// Ordering is insertion order (ascending id) for every listing.
pub struct PersonStore {
    engine: Arc<Engine>,
}

impl PersonStore {
    /// Wraps `engine`, creating the person table on first use.
    pub async fn open(engine: Arc<Engine>) -> Result<Self> {
        if !engine.has_table(PERSON_TABLE) {
            engine
                .create_table(PERSON_TABLE, person_columns(), Some(columns::ID))
                .await?;
            info!(table = PERSON_TABLE, "created person table");
        }
        Ok(Self { engine })
    }

    /// Stores `person` under a fresh id and returns the stored record.
    pub async fn insert(&self, person: NewPerson) -> Result<Person> {
        let row = self.engine.insert(PERSON_TABLE, person.into_row()).await?;
        let stored = Person::from_row(&row)?;
        debug!(id = stored.id, "person inserted");
        Ok(stored)
    }

    /// Every record.
    pub async fn scan_all(&self) -> Result<Vec<Person>> {
        self.select(None, Window::ALL).await
    }

    /// Records whose field equals the given value.
    pub async fn find_by(&self, attribute: Attribute) -> Result<Vec<Person>> {
        self.find(&Criteria::all().with(Criterion::Is(attribute))).await
    }

    /// Records matching every criterion.
    pub async fn find(&self, criteria: &Criteria) -> Result<Vec<Person>> {
        let pred = criteria.to_predicate();
        self.select(pred.as_ref(), Window::ALL).await
    }

    /// Pageable handle over records whose name contains `token`. An absent
    /// or empty token selects every record.
    pub fn search_by_name(&self, token: Option<&str>) -> PersonQuery<'_> {
        let criteria = match token {
            Some(t) if !t.is_empty() => Criteria::all().with(Criterion::NameContains(t.to_string())),
            _ => Criteria::all(),
        };
        PersonQuery {
            store: self,
            criteria,
        }
    }

    /// Number of records matching `criteria`.
    pub async fn count(&self, criteria: &Criteria) -> Result<u64> {
        let pred = criteria.to_predicate();
        let n = self.engine.count(PERSON_TABLE, pred.as_ref()).await?;
        Ok(n as u64)
    }

    async fn select(&self, pred: Option<&Predicate>, window: Window) -> Result<Vec<Person>> {
        let rows = self.engine.select(PERSON_TABLE, pred, window).await?;
        rows.iter()
            .map(|row| Person::from_row(row).map_err(Error::from))
            .collect()
    }
}

/// A filtered, not yet materialized result set.
pub struct PersonQuery<'a> {
    store: &'a PersonStore,
    criteria: Criteria,
}

impl PersonQuery<'_> {
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Matches in `[page_index * page_size, page_index * page_size + page_size)`.
    ///
    /// A page past the last match is empty, as is a page whose start offset
    /// does not fit in memory addressing.
    pub async fn page(&self, page_index: u64, page_size: u64) -> Result<Vec<Person>> {
        let offset = page_index
            .checked_mul(page_size)
            .and_then(|o| usize::try_from(o).ok());
        let Some(offset) = offset else {
            return Ok(Vec::new());
        };
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);

        let pred = self.criteria.to_predicate();
        self.store
            .select(pred.as_ref(), Window::new(offset, Some(limit)))
            .await
    }

    /// Number of matches, regardless of paging.
    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.criteria).await
    }

    /// Every match.
    pub async fn all(&self) -> Result<Vec<Person>> {
        self.store.find(&self.criteria).await
    }
}
