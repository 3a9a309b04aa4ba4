use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::helpers::text::{clean_text, normalize_label, parse_coordinate, parse_count};
use crate::processor::MalformedRecord;

/// Default textual format of the crash date column
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";

/// One row of the collision dataset as it arrives, before any typing.
///
/// Column names follow the published motor vehicle collisions export; columns
/// not listed here are ignored when reading CSV.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(rename = "CRASH DATE")]
    pub crash_date: Option<String>,
    #[serde(rename = "BOROUGH")]
    pub borough: Option<String>,
    #[serde(rename = "ZIP CODE")]
    pub zip_code: Option<String>,
    #[serde(rename = "LATITUDE")]
    pub latitude: Option<String>,
    #[serde(rename = "LONGITUDE")]
    pub longitude: Option<String>,
    #[serde(rename = "ON STREET NAME")]
    pub on_street_name: Option<String>,
    #[serde(rename = "NUMBER OF PERSONS INJURED")]
    pub persons_injured: Option<String>,
    #[serde(rename = "NUMBER OF PERSONS KILLED")]
    pub persons_killed: Option<String>,
    #[serde(rename = "CONTRIBUTING FACTOR VEHICLE 1")]
    pub contributing_factor: Option<String>,
}

/// One normalized accident report. Never mutated after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccidentRecord {
    pub crash_date: Option<NaiveDate>,
    /// Derived from `crash_date`
    pub year: Option<i32>,
    /// Derived from `crash_date`, 1-12
    pub month: Option<u32>,
    pub borough: Option<String>,
    /// Categorical label, never treated as a number
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Uppercase
    pub on_street_name: Option<String>,
    pub persons_injured: Option<u32>,
    pub persons_killed: Option<u32>,
    pub contributing_factor: Option<String>,
}

impl AccidentRecord {
    /// Record dated `date`, every other field missing.
    pub fn on(date: NaiveDate) -> Self {
        AccidentRecord {
            crash_date: Some(date),
            year: Some(date.year()),
            month: Some(date.month()),
            ..AccidentRecord::default()
        }
    }

    pub fn killed(&self) -> u64 {
        u64::from(self.persons_killed.unwrap_or(0))
    }

    pub fn injured(&self) -> u64 {
        u64::from(self.persons_injured.unwrap_or(0))
    }

    /// `(latitude, longitude)` when both are present
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Converts raw rows into [`AccidentRecord`]s. Never fails: a field that does
/// not parse becomes missing and is reported as a [`MalformedRecord`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    date_format: String,
}

impl Normalizer {
    pub fn new(date_format: impl Into<String>) -> Self {
        Normalizer {
            date_format: date_format.into(),
        }
    }

    /// Normalizes `raw`, the `row`-th data row (1-based), appending any field
    /// failures to `issues`.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        row: usize,
        issues: &mut Vec<MalformedRecord>,
    ) -> AccidentRecord {
        let mut malformed = |column: &str, value: &str, reason: String| {
            issues.push(MalformedRecord {
                row,
                column: column.to_string(),
                value: value.to_string(),
                reason,
            })
        };

        let crash_date = raw.crash_date.as_deref().and_then(|text| {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            match NaiveDate::parse_from_str(text, &self.date_format) {
                Ok(date) => Some(date),
                Err(e) => {
                    malformed("CRASH DATE", text, e.to_string());
                    None
                }
            }
        });

        let mut count = |column: &str, value: &Option<String>| {
            value.as_deref().and_then(|text| match parse_count(text) {
                Ok(v) => v,
                Err(reason) => {
                    malformed(column, text, reason);
                    None
                }
            })
        };
        let persons_injured = count("NUMBER OF PERSONS INJURED", &raw.persons_injured);
        let persons_killed = count("NUMBER OF PERSONS KILLED", &raw.persons_killed);

        let mut coordinate = |column: &str, value: &Option<String>| {
            value.as_deref().and_then(|text| match parse_coordinate(text) {
                Ok(v) => v,
                Err(reason) => {
                    malformed(column, text, reason);
                    None
                }
            })
        };
        let latitude = coordinate("LATITUDE", &raw.latitude);
        let longitude = coordinate("LONGITUDE", &raw.longitude);
        // The export uses 0,0 for "not geocoded"
        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat == 0.0 && lon == 0.0 => (None, None),
            other => other,
        };

        AccidentRecord {
            crash_date,
            year: crash_date.map(|d| d.year()),
            month: crash_date.map(|d| d.month()),
            borough: raw.borough.as_deref().and_then(normalize_label),
            zip_code: raw.zip_code.as_deref().and_then(clean_text),
            latitude,
            longitude,
            on_street_name: raw.on_street_name.as_deref().and_then(normalize_label),
            persons_injured,
            persons_killed,
            contributing_factor: raw.contributing_factor.as_deref().and_then(clean_text),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

/// Missing-value counts for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCompleteness {
    pub field: &'static str,
    pub missing: usize,
    pub share: f64,
}

/// How much of each field is missing across a record collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub total: usize,
    pub fields: Vec<FieldCompleteness>,
}

impl CompletenessReport {
    pub fn from_records(records: &[AccidentRecord]) -> Self {
        let checks: [(&'static str, fn(&AccidentRecord) -> bool); 8] = [
            ("crash_date", |r| r.crash_date.is_none()),
            ("borough", |r| r.borough.is_none()),
            ("zip_code", |r| r.zip_code.is_none()),
            ("location", |r| r.location().is_none()),
            ("on_street_name", |r| r.on_street_name.is_none()),
            ("persons_injured", |r| r.persons_injured.is_none()),
            ("persons_killed", |r| r.persons_killed.is_none()),
            ("contributing_factor", |r| r.contributing_factor.is_none()),
        ];
        let total = records.len();

        let fields = checks
            .iter()
            .map(|&(field, is_missing)| {
                let missing = records.iter().filter(|r| is_missing(r)).count();
                let share = if total == 0 {
                    0.0
                } else {
                    missing as f64 / total as f64
                };
                FieldCompleteness {
                    field,
                    missing,
                    share,
                }
            })
            .collect();

        CompletenessReport { total, fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldCompleteness> {
        self.fields.iter().find(|f| f.field == field)
    }

    /// Fields whose missing share is strictly above `threshold`
    pub fn over_threshold(&self, threshold: f64) -> impl Iterator<Item = &FieldCompleteness> {
        self.fields.iter().filter(move |f| f.share > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(date: &str) -> RawRecord {
        RawRecord {
            crash_date: Some(date.to_string()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn derives_year_and_month() {
        let mut issues = Vec::new();
        let record = Normalizer::default().normalize(&raw("07/14/2016"), 1, &mut issues);
        assert_eq!(record.year, Some(2016));
        assert_eq!(record.month, Some(7));
        assert!(issues.is_empty());
    }

    #[test]
    fn bad_date_is_missing_not_fatal() {
        let mut issues = Vec::new();
        let mut input = raw("2016-07-14");
        input.zip_code = Some("11236".into());
        let record = Normalizer::default().normalize(&input, 4, &mut issues);
        assert_eq!(record.crash_date, None);
        assert_eq!(record.year, None);
        assert_eq!(record.month, None);
        assert_eq!(record.zip_code.as_deref(), Some("11236"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].row, 4);
        assert_eq!(issues[0].column, "CRASH DATE");
    }

    #[test]
    fn custom_date_format() {
        let mut issues = Vec::new();
        let record = Normalizer::new("%Y-%m-%d").normalize(&raw("2016-07-14"), 1, &mut issues);
        assert_eq!(record.year, Some(2016));
    }

    #[test]
    fn counts_default_to_zero_in_sums() {
        let mut issues = Vec::new();
        let input = RawRecord {
            persons_killed: Some("-2".into()),
            persons_injured: None,
            ..RawRecord::default()
        };
        let record = Normalizer::default().normalize(&input, 1, &mut issues);
        assert_eq!(record.persons_killed, None);
        assert_eq!(record.killed(), 0);
        assert_eq!(record.injured(), 0);
        // absent is not malformed, negative is
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn street_is_uppercased_and_blank_is_missing() {
        let mut issues = Vec::new();
        let input = RawRecord {
            on_street_name: Some("rockaway  parkway ".into()),
            borough: Some("   ".into()),
            ..RawRecord::default()
        };
        let record = Normalizer::default().normalize(&input, 1, &mut issues);
        assert_eq!(record.on_street_name.as_deref(), Some("ROCKAWAY PARKWAY"));
        assert_eq!(record.borough, None);
    }

    #[test]
    fn zero_zero_location_is_missing() {
        let mut issues = Vec::new();
        let input = RawRecord {
            latitude: Some("0.0".into()),
            longitude: Some("0".into()),
            ..RawRecord::default()
        };
        let record = Normalizer::default().normalize(&input, 1, &mut issues);
        assert_eq!(record.location(), None);
        assert!(issues.is_empty());
    }

    #[test]
    fn completeness_counts_missing_fields() {
        let dated = AccidentRecord::on(NaiveDate::from_ymd_opt(2014, 1, 2).unwrap());
        let undated = AccidentRecord {
            zip_code: Some("11234".into()),
            ..AccidentRecord::default()
        };
        let report = CompletenessReport::from_records(&[dated, undated]);
        assert_eq!(report.total, 2);
        assert_eq!(report.get("crash_date").map(|f| f.missing), Some(1));
        assert_eq!(report.get("zip_code").map(|f| f.missing), Some(1));
        assert_eq!(report.get("borough").map(|f| f.share), Some(1.0));
        let over: Vec<&str> = report.over_threshold(0.5).map(|f| f.field).collect();
        assert!(over.contains(&"borough"));
        assert!(!over.contains(&"crash_date"));
    }
}
