use anyhow::Result;
use std::cmp::Ordering;

use crate::engine::{Predicate, Row, TableStorage, Value};

/// Offset/limit applied to the matching rows of a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// Matching rows to skip
    pub offset: usize,
    /// Maximum rows to return; `None` = no limit
    pub limit: Option<usize>,
}

impl Window {
    /// Every matching row.
    pub const ALL: Window = Window {
        offset: 0,
        limit: None,
    };

    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::ALL
    }
}

/// Full table scan with filtering and an offset/limit window.
///
/// ## Query Processing Pipeline
/// ```text
/// Table Pages → Row Scan → Predicate Filter → Skip offset → Take limit
/// ```
///
/// Rows come back in page order, then row order within a page, which is
/// insertion order. Repeated scans of an unchanged table therefore return
/// the same rows in the same order, and the offset counts matching rows,
/// not stored ones.
///
/// The caller holds the engine's read gate for the duration of the call.
pub async fn scan_window(
    table: &TableStorage,
    pred: Option<&Predicate>,
    window: Window,
) -> Result<Vec<Row>> {
    if window.limit == Some(0) {
        return Ok(Vec::new());
    }

    let pages = table.scan().await?;
    let matching = pages
        .into_iter()
        .flat_map(|(_pid, page)| page.rows)
        .filter(|row| matches_pred(row, pred))
        .skip(window.offset);

    Ok(match window.limit {
        Some(n) => matching.take(n).collect(),
        None => matching.collect(),
    })
}

/// Counts the rows of `table` matching `pred`, evaluated independently of
/// any window.
pub async fn count_matching(table: &TableStorage, pred: Option<&Predicate>) -> Result<usize> {
    let pages = table.scan().await?;
    Ok(pages
        .iter()
        .flat_map(|(_pid, page)| page.rows.iter())
        .filter(|row| matches_pred(row, pred))
        .count())
}

/// Evaluates a predicate against a single row.
///
/// ## Predicate Evaluation Rules
/// - **No predicate**: Always true
/// - **Eq**: Exact value match; a missing column never matches
/// - **Contains**: Case-sensitive substring of a `Text` column; the empty
///   needle matches every text value
/// - **Before**: Strictly less than the bound; values of another type
///   never match
/// - **And**: Both sides must match
pub fn matches_pred(row: &Row, pred: Option<&Predicate>) -> bool {
    match pred {
        None => true,
        Some(Predicate::Eq(col, v)) => row.get(col) == Some(v),
        Some(Predicate::Contains(col, needle)) => {
            matches!(row.get(col), Some(Value::Text(s)) if s.contains(needle.as_str()))
        }
        Some(Predicate::Before(col, bound)) => row
            .get(col)
            .and_then(|v| v.compare(bound))
            .is_some_and(|o| o == Ordering::Less),
        Some(Predicate::And(l, r)) => matches_pred(row, Some(&**l)) && matches_pred(row, Some(&**r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(name: &str, year: i32) -> Row {
        Row::from([
            ("name".to_string(), Value::Text(name.to_string())),
            (
                "birth".to_string(),
                Value::Date(NaiveDate::from_ymd_opt(year, 6, 1).unwrap()),
            ),
        ])
    }

    #[test]
    fn contains_is_case_sensitive() {
        let r = row("Farid Ulyanov", 1974);
        let p = |s: &str| Predicate::Contains("name".into(), s.into());
        assert!(matches_pred(&r, Some(&p("yan"))));
        assert!(matches_pred(&r, Some(&p(""))));
        assert!(!matches_pred(&r, Some(&p("YAN"))));
        assert!(!matches_pred(&r, Some(&Predicate::Contains("eyes".into(), "".into()))));
    }

    #[test]
    fn before_is_strict_and_type_checked() {
        let r = row("Kim Hu", 1999);
        let bound = |y| Value::Date(NaiveDate::from_ymd_opt(y, 6, 1).unwrap());
        assert!(matches_pred(&r, Some(&Predicate::Before("birth".into(), bound(2000)))));
        assert!(!matches_pred(&r, Some(&Predicate::Before("birth".into(), bound(1999)))));
        assert!(!matches_pred(&r, Some(&Predicate::Before("birth".into(), Value::Int(3000)))));
    }

    #[test]
    fn and_requires_both_sides() {
        let r = row("Kim Hu", 1999);
        let name = Predicate::Eq("name".into(), Value::Text("Kim Hu".into()));
        let miss = Predicate::Contains("name".into(), "Farid".into());
        assert!(matches_pred(&r, Some(&name.clone())));
        assert!(!matches_pred(&r, Some(&name.and(miss))));
    }
}
