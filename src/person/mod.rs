//! The person entity: schema, eye colour enumeration and row mapping.

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::engine::{Column, ColumnType, Predicate, Row, Value};
use crate::error::Error;

mod store;

pub use store::{Criteria, Criterion, PersonQuery, PersonStore, PERSON_TABLE};

/// Column names of the person table.
pub mod columns {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const BIRTH: &str = "birth";
    pub const EYES: &str = "eyes";
}

/// Closed set of eye colours.
///
/// The upper-case name is the only accepted spelling, in request paths, in
/// JSON and in storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EyeColor {
    Blue,
    Green,
    Hazel,
    Brown,
}

impl EyeColor {
    pub const ALL: [EyeColor; 4] = [EyeColor::Blue, EyeColor::Green, EyeColor::Hazel, EyeColor::Brown];

    pub fn as_str(self) -> &'static str {
        match self {
            EyeColor::Blue => "BLUE",
            EyeColor::Green => "GREEN",
            EyeColor::Hazel => "HAZEL",
            EyeColor::Brown => "BROWN",
        }
    }
}

impl fmt::Display for EyeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EyeColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EyeColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "unknown eye color '{s}', expected one of BLUE, GREEN, HAZEL, BROWN"
                ))
            })
    }
}

/// A stored person.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Server-assigned, never reused
    pub id: u64,
    pub name: String,
    pub birth: NaiveDate,
    pub eyes: EyeColor,
}

/// Insert payload: a person before the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub birth: NaiveDate,
    pub eyes: EyeColor,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, birth: NaiveDate, eyes: EyeColor) -> Self {
        Self {
            name: name.into(),
            birth,
            eyes,
        }
    }

    pub(crate) fn into_row(self) -> Row {
        Row::from([
            (columns::NAME.to_string(), Value::Text(self.name)),
            (columns::BIRTH.to_string(), Value::Date(self.birth)),
            (columns::EYES.to_string(), Value::Text(self.eyes.as_str().to_string())),
        ])
    }
}

impl Person {
    /// Decodes a stored row. Any missing or mistyped field is an error: the
    /// store only ever holds rows written through [`NewPerson::into_row`].
    pub(crate) fn from_row(row: &Row) -> anyhow::Result<Self> {
        let id = match row.get(columns::ID) {
            Some(Value::Int(id)) => u64::try_from(*id)?,
            other => return Err(anyhow!("person row has bad id: {:?}", other)),
        };
        let name = match row.get(columns::NAME) {
            Some(Value::Text(name)) => name.clone(),
            other => return Err(anyhow!("person {} has bad name: {:?}", id, other)),
        };
        let birth = match row.get(columns::BIRTH) {
            Some(Value::Date(birth)) => *birth,
            other => return Err(anyhow!("person {} has bad birth: {:?}", id, other)),
        };
        let eyes = match row.get(columns::EYES) {
            Some(Value::Text(eyes)) => eyes
                .parse::<EyeColor>()
                .map_err(|e| anyhow!("person {} has bad eyes: {}", id, e))?,
            other => return Err(anyhow!("person {} has bad eyes: {:?}", id, other)),
        };
        Ok(Self { id, name, birth, eyes })
    }
}

/// Schema of the person table; `id` is the identity column.
pub fn person_columns() -> Vec<Column> {
    vec![
        Column { name: columns::ID.into(), col_type: ColumnType::Int },
        Column { name: columns::NAME.into(), col_type: ColumnType::Text },
        Column { name: columns::BIRTH.into(), col_type: ColumnType::Date },
        Column { name: columns::EYES.into(), col_type: ColumnType::Text },
    ]
}

/// A single field value used for equality lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribute {
    Id(u64),
    Name(String),
    Birth(NaiveDate),
    Eyes(EyeColor),
}

impl Attribute {
    pub(crate) fn to_predicate(&self) -> Predicate {
        match self {
            // Ids above i64::MAX are never assigned, so i64::MIN cannot match.
            Attribute::Id(id) => Predicate::Eq(
                columns::ID.into(),
                Value::Int(i64::try_from(*id).unwrap_or(i64::MIN)),
            ),
            Attribute::Name(name) => Predicate::Eq(columns::NAME.into(), Value::Text(name.clone())),
            Attribute::Birth(birth) => Predicate::Eq(columns::BIRTH.into(), Value::Date(*birth)),
            Attribute::Eyes(eyes) => {
                Predicate::Eq(columns::EYES.into(), Value::Text(eyes.as_str().to_string()))
            }
        }
    }
}
