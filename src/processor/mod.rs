use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helpers::text::contains_ignore_case;
use crate::processor::record::AccidentRecord;

pub mod dataset;
pub mod engine;
pub mod query_builder;
pub mod record;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Outcome of loading or normalizing a batch of raw rows.
#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub issues: Vec<MalformedRecord>,
}

impl ParseSummary {
    pub fn malformed_rows(&self) -> usize {
        let mut rows: Vec<usize> = self.issues.iter().map(|i| i.row).collect();
        rows.sort_unstable();
        rows.dedup();
        rows.len()
    }
}

/// A field that failed to parse. The row is kept; only this field is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    /// 1-based data row (header excluded)
    pub row: usize,
    /// Source column name, empty when the whole row was unreadable
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Record fields usable as group keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Year,
    /// Labelled `01`..`12`
    Month,
    /// Labelled `YYYY-MM-DD`
    CrashDate,
    Borough,
    ZipCode,
    OnStreetName,
    ContributingFactor,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Year => "year",
            Field::Month => "month",
            Field::CrashDate => "crash_date",
            Field::Borough => "borough",
            Field::ZipCode => "zip_code",
            Field::OnStreetName => "on_street_name",
            Field::ContributingFactor => "contributing_factor",
        }
    }

    /// Group-key label for `record`, `None` when the field is missing.
    pub fn key(&self, record: &AccidentRecord) -> Option<String> {
        match self {
            Field::Year => record.year.map(|y| y.to_string()),
            Field::Month => record.month.map(|m| format!("{m:02}")),
            Field::CrashDate => record.crash_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Field::Borough => record.borough.clone(),
            Field::ZipCode => record.zip_code.clone(),
            Field::OnStreetName => record.on_street_name.clone(),
            Field::ContributingFactor => record.contributing_factor.clone(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "year" => Ok(Field::Year),
            "month" => Ok(Field::Month),
            "date" | "crash_date" => Ok(Field::CrashDate),
            "borough" => Ok(Field::Borough),
            "zip" | "zip_code" => Ok(Field::ZipCode),
            "street" | "on_street_name" => Ok(Field::OnStreetName),
            "factor" | "contributing_factor" => Ok(Field::ContributingFactor),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

/// Aggregate computed per group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Number of records
    Count,
    /// Sum of persons killed, missing counts as 0
    SumPersonsKilled,
    /// Sum of persons injured, missing counts as 0
    SumPersonsInjured,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::SumPersonsKilled => "persons_killed",
            Statistic::SumPersonsInjured => "persons_injured",
        }
    }

    /// Contribution of a single record to its group.
    pub fn value(&self, record: &AccidentRecord) -> u64 {
        match self {
            Statistic::Count => 1,
            Statistic::SumPersonsKilled => record.killed(),
            Statistic::SumPersonsInjured => record.injured(),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "count" => Ok(Statistic::Count),
            "killed" | "deaths" | "persons_killed" => Ok(Statistic::SumPersonsKilled),
            "injured" | "injuries" | "persons_injured" => Ok(Statistic::SumPersonsInjured),
            other => Err(format!("unknown statistic '{other}'")),
        }
    }
}

/// Inclusive latitude/longitude box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    fn bits(&self) -> [u64; 4] {
        [
            self.min_lat.to_bits(),
            self.max_lat.to_bits(),
            self.min_lon.to_bits(),
            self.max_lon.to_bits(),
        ]
    }
}

impl PartialEq for GeoBounds {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for GeoBounds {}

impl Hash for GeoBounds {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Filter predicate over a record.
///
/// A record whose referenced field is missing never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterPredicate {
    /// Case-insensitive substring of the street name
    StreetContains(String),
    /// Exact match on a field's group-key label
    Equals(Field, String),
    ZipCodeIn(Vec<String>),
    /// Inclusive year range
    YearBetween(i32, i32),
    /// Inclusive date range
    DateBetween(NaiveDate, NaiveDate),
    WithinBounds(GeoBounds),
    /// At least one person killed
    Fatal,
    /// At least one person injured
    Injurious,
    All(Vec<FilterPredicate>),
}

impl FilterPredicate {
    pub fn street_contains(needle: impl Into<String>) -> Self {
        FilterPredicate::StreetContains(needle.into())
    }

    pub fn matches(&self, record: &AccidentRecord) -> bool {
        match self {
            FilterPredicate::StreetContains(needle) => record
                .on_street_name
                .as_deref()
                .is_some_and(|street| contains_ignore_case(street, needle)),
            FilterPredicate::Equals(field, expected) => {
                field.key(record).is_some_and(|k| &k == expected)
            }
            FilterPredicate::ZipCodeIn(zips) => record
                .zip_code
                .as_ref()
                .is_some_and(|zip| zips.contains(zip)),
            FilterPredicate::YearBetween(from, to) => {
                record.year.is_some_and(|y| y >= *from && y <= *to)
            }
            FilterPredicate::DateBetween(from, to) => {
                record.crash_date.is_some_and(|d| d >= *from && d <= *to)
            }
            FilterPredicate::WithinBounds(bounds) => record
                .location()
                .is_some_and(|(lat, lon)| bounds.contains(lat, lon)),
            FilterPredicate::Fatal => record.persons_killed.is_some_and(|k| k >= 1),
            FilterPredicate::Injurious => record.persons_injured.is_some_and(|i| i >= 1),
            FilterPredicate::All(predicates) => predicates.iter().all(|p| p.matches(record)),
        }
    }
}
