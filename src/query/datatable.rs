//! DataTables server-side processing: request parameters in, response
//! envelope out.
//!
//! ```text
//! GET /person/datatable?draw=3&start=20&length=10&search[value]=yan
//!
//! {"draw":3,"recordsTotal":1003,"recordsFiltered":12,"data":[...],"error":null}
//! ```

use serde::{Deserialize, Serialize};

use super::{PageRequest, TablePage};
use crate::error::{Error, Result};
use crate::person::Person;

/// Raw query string of a DataTables request.
///
/// Everything arrives as text so that malformed numbers become
/// [`Error::InvalidArgument`] inside a normal envelope instead of an
/// extractor rejection. DataTables also sends `columns[..]`, `order[..]`
/// and `search[regex]`; those are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DataTableParams {
    pub draw: Option<String>,
    pub start: Option<String>,
    pub length: Option<String>,
    #[serde(rename = "search[value]")]
    pub search_value: Option<String>,
}

impl DataTableParams {
    /// The draw counter, or 0 when absent.
    pub fn draw(&self) -> Result<i64> {
        parse_int("draw", self.draw.as_deref(), Some(0))
    }

    /// The page request. `start` defaults to 0; `length` is required.
    pub fn page_request(&self) -> Result<PageRequest> {
        Ok(PageRequest {
            start: parse_int("start", self.start.as_deref(), Some(0))?,
            length: parse_int("length", self.length.as_deref(), None)?,
            search: self.search_value.clone(),
        })
    }
}

fn parse_int(name: &str, raw: Option<&str>, default: Option<i64>) -> Result<i64> {
    match (raw.map(str::trim), default) {
        (Some(v), _) if !v.is_empty() => v
            .parse()
            .map_err(|_| Error::invalid(format!("{name} must be an integer, got '{v}'"))),
        (_, Some(d)) => Ok(d),
        (_, None) => Err(Error::invalid(format!("{name} is required"))),
    }
}

/// Response envelope expected by the DataTables widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableResponse {
    /// Echo of the request's draw counter
    pub draw: i64,
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<Person>,
    /// Set only when the request failed
    pub error: Option<String>,
}

impl DataTableResponse {
    pub fn success(draw: i64, page: TablePage) -> Self {
        Self {
            draw,
            records_total: page.records_total,
            records_filtered: page.records_filtered,
            data: page.data,
            error: None,
        }
    }

    /// Zeroed envelope carrying the error message.
    pub fn failure(draw: i64, err: &Error) -> Self {
        Self {
            draw,
            records_total: 0,
            records_filtered: 0,
            data: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    pub fn assemble(draw: i64, result: &Result<TablePage>) -> Self {
        match result {
            Ok(page) => Self::success(draw, page.clone()),
            Err(err) => Self::failure(draw, err),
        }
    }
}
