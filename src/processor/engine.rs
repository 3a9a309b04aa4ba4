use std::collections::HashMap;
use std::io;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::processor::record::AccidentRecord;
use crate::processor::{AnalysisError, Field, FilterPredicate, Statistic};

/// Inputs at or above this size are aggregated in parallel shards
pub const PARALLEL_THRESHOLD: usize = 64 * 1024;

/// Rows per shard on the parallel path
pub const SHARD_ROWS: usize = 16 * 1024;

/// Year below which reporting is known to be incomplete
pub const DEFAULT_YEAR_FLOOR: i32 = 2012;

/// Dataset-wide exclusion of early years, applied before any request filter.
///
/// Records with a known year `<= floor` are dropped. Records without a date
/// are kept; date-keyed requests drop them on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearPolicy {
    pub floor: Option<i32>,
}

impl YearPolicy {
    pub fn new(floor: Option<i32>) -> Self {
        YearPolicy { floor }
    }

    pub fn disabled() -> Self {
        YearPolicy { floor: None }
    }

    pub fn admits(&self, record: &AccidentRecord) -> bool {
        match (self.floor, record.year) {
            (Some(floor), Some(year)) => year > floor,
            _ => true,
        }
    }
}

impl Default for YearPolicy {
    fn default() -> Self {
        YearPolicy {
            floor: Some(DEFAULT_YEAR_FLOOR),
        }
    }
}

/// One query against a record collection.
///
/// # Example
/// ```rust
/// use collision_analytics::{AggregationRequest, Field, FilterPredicate, Statistic};
///
/// let request = AggregationRequest::new(vec![Field::Year], Statistic::Count)
///     .with_filter(FilterPredicate::street_contains("rockaway"))
///     .with_limit(10);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationRequest {
    pub group_by: Vec<Field>,
    pub filter: Option<FilterPredicate>,
    pub statistic: Statistic,
    pub limit: Option<usize>,
}

impl AggregationRequest {
    pub fn new(group_by: Vec<Field>, statistic: Statistic) -> Self {
        AggregationRequest {
            group_by,
            filter: None,
            statistic,
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.group_by.is_empty() {
            return Err(AnalysisError::InvalidRequest(
                "at least one group-by field is required".into(),
            ));
        }
        if self.limit == Some(0) {
            return Err(AnalysisError::InvalidRequest(
                "limit must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

/// A ranked group: its key labels (one per group-by field) and aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRow {
    pub key: Vec<String>,
    pub value: u64,
}

impl GroupRow {
    /// Key labels joined with `" / "`
    pub fn label(&self) -> String {
        self.key.join(" / ")
    }
}

/// Groups ranked by value descending, ties in first-encountered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    dimensions: Vec<Field>,
    statistic: Statistic,
    rows: Vec<GroupRow>,
}

impl AggregationResult {
    pub fn dimensions(&self) -> &[Field] {
        &self.dimensions
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    pub fn rows(&self) -> &[GroupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all group values
    pub fn total(&self) -> u64 {
        self.rows.iter().map(|r| r.value).sum()
    }

    /// Value of the group whose labels equal `key`
    pub fn value_of(&self, key: &[&str]) -> Option<u64> {
        self.rows
            .iter()
            .find(|r| r.key.iter().map(String::as_str).eq(key.iter().copied()))
            .map(|r| r.value)
    }

    /// Canonical two-column `(label, value)` form
    pub fn to_table(&self) -> Vec<(String, u64)> {
        self.rows.iter().map(|r| (r.label(), r.value)).collect()
    }

    /// Keeps the first `n` rows of each partition sharing the leading key.
    ///
    /// Row order is unchanged, so within a partition the kept rows are its
    /// top `n`.
    pub fn top_per_leading_key(&self, n: usize) -> AggregationResult {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                let lead = row.key.first().map(String::as_str).unwrap_or("");
                let taken = seen.entry(lead).or_insert(0);
                *taken += 1;
                *taken <= n
            })
            .cloned()
            .collect();

        AggregationResult {
            dimensions: self.dimensions.clone(),
            statistic: self.statistic,
            rows,
        }
    }

    /// Writes the `(label, value)` table as CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), AnalysisError> {
        let mut wtr = csv::Writer::from_writer(writer);
        let label_header = self
            .dimensions
            .iter()
            .map(Field::name)
            .collect::<Vec<_>>()
            .join("/");
        wtr.write_record([label_header.as_str(), self.statistic.name()])?;
        for row in &self.rows {
            wtr.write_record([row.label(), row.value.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Groups in first-encountered order with their running aggregate
#[derive(Debug, Default)]
struct Partial {
    index: HashMap<Vec<String>, usize>,
    groups: Vec<GroupRow>,
    kept: usize,
}

impl Partial {
    fn add(&mut self, key: Vec<String>, value: u64) {
        self.kept += 1;
        match self.index.get(&key) {
            Some(&pos) => self.groups[pos].value += value,
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push(GroupRow { key, value });
            }
        }
    }

    /// Folds a later shard into this one, keeping first-seen order
    fn merge(&mut self, later: Partial) {
        self.kept += later.kept;
        for row in later.groups {
            match self.index.get(&row.key) {
                Some(&pos) => self.groups[pos].value += row.value,
                None => {
                    self.index.insert(row.key.clone(), self.groups.len());
                    self.groups.push(row);
                }
            }
        }
    }
}

fn group_key(fields: &[Field], record: &AccidentRecord) -> Option<Vec<String>> {
    fields.iter().map(|f| f.key(record)).collect()
}

fn accumulate(
    records: &[AccidentRecord],
    request: &AggregationRequest,
    policy: YearPolicy,
) -> Partial {
    let mut partial = Partial::default();

    for record in records {
        if !policy.admits(record) {
            continue;
        }
        if let Some(filter) = &request.filter {
            if !filter.matches(record) {
                continue;
            }
        }
        let Some(key) = group_key(&request.group_by, record) else {
            continue;
        };
        partial.add(key, request.statistic.value(record));
    }

    partial
}

fn accumulate_sharded(
    records: &[AccidentRecord],
    request: &AggregationRequest,
    policy: YearPolicy,
    shard_rows: usize,
) -> Partial {
    // collect() keeps shard order, so merging left to right preserves the
    // sequential first-seen order
    let shards: Vec<Partial> = records
        .par_chunks(shard_rows.max(1))
        .map(|shard| accumulate(shard, request, policy))
        .collect();

    shards.into_iter().fold(Partial::default(), |mut acc, shard| {
        acc.merge(shard);
        acc
    })
}

fn rank(partial: Partial, request: &AggregationRequest) -> AggregationResult {
    let mut rows = partial.groups;
    // stable: equal values keep first-seen order
    rows.sort_by(|a, b| b.value.cmp(&a.value));
    if let Some(limit) = request.limit {
        rows.truncate(limit);
    }

    AggregationResult {
        dimensions: request.group_by.clone(),
        statistic: request.statistic,
        rows,
    }
}

/// Runs `request` over `records`.
///
/// Order of operations: year policy, request filter, missing group-key
/// exclusion, grouping, aggregation, stable descending rank, limit.
///
/// # Errors
/// [`AnalysisError::InvalidRequest`] for an empty group-by list or a zero
/// limit. An empty result is not an error.
pub fn execute(
    records: &[AccidentRecord],
    request: &AggregationRequest,
    policy: YearPolicy,
) -> Result<AggregationResult, AnalysisError> {
    if records.len() >= PARALLEL_THRESHOLD {
        execute_sharded(records, request, policy, SHARD_ROWS)
    } else {
        request.validate()?;
        let partial = accumulate(records, request, policy);
        debug!(
            "{:?} {} over {} records: kept {}, {} groups",
            request.group_by,
            request.statistic,
            records.len(),
            partial.kept,
            partial.groups.len()
        );
        Ok(rank(partial, request))
    }
}

/// [`execute`] forced onto the parallel path with the given shard size.
pub fn execute_sharded(
    records: &[AccidentRecord],
    request: &AggregationRequest,
    policy: YearPolicy,
    shard_rows: usize,
) -> Result<AggregationResult, AnalysisError> {
    request.validate()?;
    let partial = accumulate_sharded(records, request, policy, shard_rows);
    debug!(
        "{:?} {} over {} records in shards of {}: kept {}, {} groups",
        request.group_by,
        request.statistic,
        records.len(),
        shard_rows,
        partial.kept,
        partial.groups.len()
    );
    Ok(rank(partial, request))
}
