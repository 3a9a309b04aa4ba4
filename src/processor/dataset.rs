use std::{
    fs::File,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use csv::{ByteRecord, StringRecord};
use log::{info, warn};
use memmap2::Mmap;
use rayon::prelude::*;
use serde::Serialize;

use crate::processor::{
    AnalysisError, FilterPredicate, MalformedRecord, ParseSummary,
    engine::{self, AggregationRequest, AggregationResult, YearPolicy},
    record::{AccidentRecord, CompletenessReport, Normalizer, RawRecord},
};

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

fn next_dataset_id() -> u64 {
    NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed)
}

/// A geocoded collision, for external density plotting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Read-only collection of normalized collision records
///
/// # Examples
///
/// ```rust,no_run
/// # use collision_analytics::{CollisionDataset, AggregationRequest, Field, Normalizer, Statistic};
/// let mut dataset = CollisionDataset::new();
/// dataset.load_csv("collisions.csv".as_ref(), &Normalizer::default()).unwrap();
/// let request = AggregationRequest::new(vec![Field::Year], Statistic::Count);
/// let by_year = dataset.aggregate(&request).unwrap();
/// println!("{:?}", by_year.to_table());
/// ```
#[derive(Debug)]
pub struct CollisionDataset {
    id: u64,
    records: Vec<AccidentRecord>,
    policy: YearPolicy,
}

impl Default for CollisionDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionDataset {
    /// Create an empty dataset with the default year policy
    pub fn new() -> Self {
        Self::from_records(Vec::new())
    }

    pub fn from_records(records: Vec<AccidentRecord>) -> Self {
        CollisionDataset {
            id: next_dataset_id(),
            records,
            policy: YearPolicy::default(),
        }
    }

    /// Normalizes already-materialized raw rows in parallel.
    ///
    /// Row numbers in the returned issues are 1-based positions in `rows`.
    pub fn from_raw_rows(rows: &[RawRecord], normalizer: &Normalizer) -> (Self, ParseSummary) {
        let (records, issues) = normalize_rows(rows, None, normalizer);
        let summary = ParseSummary {
            rows_processed: records.len(),
            issues,
        };
        (Self::from_records(records), summary)
    }

    pub fn with_year_policy(mut self, policy: YearPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn year_policy(&self) -> YearPolicy {
        self.policy
    }

    /// Loads a collision CSV export, replacing any records already held.
    ///
    /// The file is memory mapped and read with a header row; columns are
    /// matched by name and unknown columns ignored. Rows that cannot be read
    /// at all are skipped and reported; fields that fail to parse become
    /// missing and are reported.
    ///
    /// # Errors
    /// Returns an [`AnalysisError`] if the file cannot be opened or mapped,
    /// or the header row cannot be read.
    pub fn load_csv(
        &mut self,
        path: &Path,
        normalizer: &Normalizer,
    ) -> Result<ParseSummary, AnalysisError> {
        let start = Instant::now();
        let file = File::open(path)?;

        // reloaded contents get a fresh identity
        self.id = next_dataset_id();

        if file.metadata()?.len() == 0 {
            self.records = Vec::new();
            return Ok(ParseSummary::default());
        }

        // SAFETY: the mapping is only read during this call
        let mmap = unsafe { Mmap::map(&file)? };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(&mmap[..]);
        let headers = rdr.headers()?.clone();

        let mut raw_rows = Vec::new();
        let mut row_numbers = Vec::new();
        let mut read_issues = Vec::new();
        for (idx, result) in rdr.byte_records().enumerate() {
            let row = idx + 1;
            let decoded = result
                .map(|bytes| decode_fields(&bytes, &headers, row, &mut read_issues))
                .and_then(|fields| fields.deserialize::<RawRecord>(Some(&headers)));
            match decoded {
                Ok(raw) => {
                    raw_rows.push(raw);
                    row_numbers.push(row);
                }
                Err(e) => read_issues.push(MalformedRecord {
                    row,
                    column: String::new(),
                    value: String::new(),
                    reason: e.to_string(),
                }),
            }
        }

        let (records, mut issues) =
            normalize_rows(&raw_rows, Some(row_numbers.as_slice()), normalizer);
        issues.extend(read_issues);
        issues.sort_by_key(|i| i.row);

        self.records = records;

        let summary = ParseSummary {
            rows_processed: self.records.len(),
            issues,
        };
        info!(
            "Loaded {} records from {} in {:?} ({} rows with malformed fields)",
            summary.rows_processed,
            path.display(),
            start.elapsed(),
            summary.malformed_rows()
        );
        if summary.rows_processed == 0 {
            warn!("{} contained no data rows", path.display());
        }
        Ok(summary)
    }

    /// Opens and loads `path` into a new dataset with the default year policy
    pub fn open(
        path: &Path,
        normalizer: &Normalizer,
    ) -> Result<(Self, ParseSummary), AnalysisError> {
        let mut dataset = Self::new();
        let summary = dataset.load_csv(path, normalizer)?;
        Ok((dataset, summary))
    }

    /// Identity of the loaded contents; changes whenever records are replaced
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn records(&self) -> &[AccidentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Runs one aggregation request under this dataset's year policy
    pub fn aggregate(
        &self,
        request: &AggregationRequest,
    ) -> Result<AggregationResult, AnalysisError> {
        engine::execute(&self.records, request, self.policy)
    }

    /// Coordinates of records admitted by the year policy and `filter`
    pub fn located_points(&self, filter: Option<&FilterPredicate>) -> Vec<GeoPoint> {
        self.records
            .iter()
            .filter(|r| self.policy.admits(r))
            .filter(|r| filter.is_none_or(|f| f.matches(r)))
            .filter_map(|r| r.location())
            .map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            })
            .collect()
    }

    /// Missing-value counts over every loaded record
    pub fn completeness(&self) -> CompletenessReport {
        CompletenessReport::from_records(&self.records)
    }
}

/// Decodes one CSV row field by field. A field that is not valid UTF-8 is
/// reported under its column name and read as blank, so the rest of the row
/// survives.
fn decode_fields(
    bytes: &ByteRecord,
    headers: &StringRecord,
    row: usize,
    issues: &mut Vec<MalformedRecord>,
) -> StringRecord {
    bytes
        .iter()
        .enumerate()
        .map(|(col, field)| match std::str::from_utf8(field) {
            Ok(text) => text,
            Err(e) => {
                issues.push(MalformedRecord {
                    row,
                    column: headers.get(col).unwrap_or_default().to_string(),
                    value: String::from_utf8_lossy(field).into_owned(),
                    reason: e.to_string(),
                });
                ""
            }
        })
        .collect()
}

/// Normalizes in parallel, keeping input order. Rows are numbered by
/// `row_numbers` when given, else by 1-based position.
fn normalize_rows(
    rows: &[RawRecord],
    row_numbers: Option<&[usize]>,
    normalizer: &Normalizer,
) -> (Vec<AccidentRecord>, Vec<MalformedRecord>) {
    let results: Vec<(AccidentRecord, Vec<MalformedRecord>)> = rows
        .par_iter()
        .enumerate()
        .map(|(idx, raw)| {
            let mut issues = Vec::new();
            let row = row_numbers.map_or(idx + 1, |numbers| numbers[idx]);
            let record = normalizer.normalize(raw, row, &mut issues);
            (record, issues)
        })
        .collect();

    let mut records = Vec::with_capacity(results.len());
    let mut issues = Vec::new();
    for (record, record_issues) in results {
        records.push(record);
        issues.extend(record_issues);
    }
    (records, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Field, Statistic};

    fn make_dataset_from_str(csv: &str) -> (CollisionDataset, ParseSummary) {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{}", csv).unwrap();

        CollisionDataset::open(tmp.path(), &Normalizer::default()).unwrap()
    }

    const HEADER: &str = "CRASH DATE,CRASH TIME,BOROUGH,ZIP CODE,LATITUDE,LONGITUDE,ON STREET NAME,NUMBER OF PERSONS INJURED,NUMBER OF PERSONS KILLED,CONTRIBUTING FACTOR VEHICLE 1\n";

    #[test]
    fn test_row_count() {
        let csv = format!(
            "{HEADER}\
             09/11/2021,2:39,BROOKLYN,11236,40.64,-73.90,ROCKAWAY PARKWAY,2,0,Unspecified\n\
             03/26/2022,11:45,,,,,,1,0,Pavement Slippery\n"
        );
        let (dataset, summary) = make_dataset_from_str(&csv);
        assert_eq!(dataset.len(), 2);
        assert_eq!(summary.rows_processed, 2);
        assert!(summary.issues.is_empty());
    }

    #[test]
    fn test_quoted_fields_and_malformed_values() {
        let csv = format!(
            "{HEADER}\
             not a date,1:00,QUEENS,11434,,,\"ROCKAWAY BLVD, SERVICE RD\",x,0,Unspecified\n"
        );
        let (dataset, summary) = make_dataset_from_str(&csv);
        let record = &dataset.records()[0];
        assert_eq!(
            record.on_street_name.as_deref(),
            Some("ROCKAWAY BLVD, SERVICE RD")
        );
        assert_eq!(record.year, None);
        assert_eq!(record.persons_injured, None);
        assert_eq!(summary.issues.len(), 2);
        assert_eq!(summary.malformed_rows(), 1);
    }

    #[test]
    fn test_empty_file() {
        let (dataset, summary) = make_dataset_from_str("");
        assert!(dataset.is_empty());
        assert_eq!(summary.rows_processed, 0);
    }

    #[test]
    fn test_aggregate_uses_year_policy() {
        let csv = format!(
            "{HEADER}\
             07/01/2012,1:00,BROOKLYN,11236,,,,0,1,Unspecified\n\
             07/01/2013,1:00,BROOKLYN,11236,,,,0,1,Unspecified\n"
        );
        let (dataset, _) = make_dataset_from_str(&csv);
        let request = AggregationRequest::new(vec![Field::ZipCode], Statistic::SumPersonsKilled);

        let floored = dataset.aggregate(&request).unwrap();
        assert_eq!(floored.value_of(&["11236"]), Some(1));

        let dataset = dataset.with_year_policy(YearPolicy::disabled());
        assert_eq!(dataset.aggregate(&request).unwrap().value_of(&["11236"]), Some(2));
    }

    #[test]
    fn test_located_points() {
        let mut inside = AccidentRecord::on(chrono::NaiveDate::from_ymd_opt(2016, 5, 5).unwrap());
        inside.latitude = Some(40.65);
        inside.longitude = Some(-73.91);
        inside.zip_code = Some("11236".into());
        let mut other = inside.clone();
        other.zip_code = Some("10001".into());
        let unlocated = AccidentRecord {
            zip_code: Some("11236".into()),
            ..AccidentRecord::default()
        };

        let dataset = CollisionDataset::from_records(vec![inside, other, unlocated]);
        let filter = FilterPredicate::ZipCodeIn(vec!["11236".into()]);
        let points = dataset.located_points(Some(&filter));
        assert_eq!(
            points,
            vec![GeoPoint {
                latitude: 40.65,
                longitude: -73.91
            }]
        );
        assert_eq!(dataset.located_points(None).len(), 2);
    }

    #[test]
    fn test_invalid_utf8_field_keeps_row() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"CRASH DATE,ZIP CODE,CONTRIBUTING FACTOR VEHICLE 1\n")
            .unwrap();
        tmp.write_all(b"01/02/2015,11236,Unspecified\n").unwrap();
        tmp.write_all(b"01/03/2015,11236,Caf\xe9 sign\n").unwrap();

        let (dataset, summary) = CollisionDataset::open(tmp.path(), &Normalizer::default()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[1].year, Some(2015));
        assert_eq!(dataset.records()[1].contributing_factor, None);

        assert_eq!(summary.issues.len(), 1);
        assert_eq!(summary.issues[0].row, 2);
        assert_eq!(summary.issues[0].column, "CONTRIBUTING FACTOR VEHICLE 1");
        assert_eq!(summary.issues[0].value, "Caf\u{fffd} sign");

        let request = AggregationRequest::new(vec![Field::ZipCode], Statistic::Count);
        let by_zip = dataset.aggregate(&request).unwrap();
        assert_eq!(by_zip.to_table(), vec![("11236".to_string(), 2)]);
    }

    #[test]
    fn test_reload_changes_id() {
        let csv = format!("{HEADER}01/02/2015,1:00,BROOKLYN,11236,,,,0,0,Unspecified\n");
        let (mut dataset, _) = make_dataset_from_str(&csv);
        let other = CollisionDataset::new();
        assert_ne!(dataset.id(), other.id());

        let before = dataset.id();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, csv.as_bytes()).unwrap();
        dataset.load_csv(tmp.path(), &Normalizer::default()).unwrap();
        assert_ne!(dataset.id(), before);
    }

    #[test]
    fn test_from_raw_rows_numbers_issues() {
        let rows = vec![
            RawRecord {
                crash_date: Some("01/02/2015".into()),
                ..RawRecord::default()
            },
            RawRecord {
                crash_date: Some("13/45/2015".into()),
                ..RawRecord::default()
            },
        ];
        let (dataset, summary) = CollisionDataset::from_raw_rows(&rows, &Normalizer::default());
        assert_eq!(dataset.len(), 2);
        assert_eq!(summary.issues.len(), 1);
        assert_eq!(summary.issues[0].row, 2);
    }
}
