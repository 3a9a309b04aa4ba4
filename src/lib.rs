//! # collision-analytics
//!
//! Descriptive aggregation over municipal traffic-collision records. Raw CSV
//! rows are normalized once into [`AccidentRecord`]s and every question about
//! them is the same operation with different parameters:
//!
//! - drop records from years with known incomplete reporting (`<= 2012`)
//! - filter with a declarative [`FilterPredicate`]
//! - drop records missing any group-by field
//! - group, count or sum persons killed/injured
//! - rank descending (ties keep first-seen order) and cut to the top N
//!
//! Loading is memory mapped and normalization runs on Rayon; large inputs are
//! also aggregated in parallel shards with results identical to a sequential
//! run. Charting, maps and prose are left to whoever consumes the
//! `(label, value)` tables.
//!
//! # Example
//!
//! ```rust,no_run
//! use collision_analytics::{
//!     AggregationRequest, CollisionDataset, Field, FilterPredicate, Normalizer, Statistic,
//! };
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (dataset, summary) =
//!         CollisionDataset::open(Path::new("collisions.csv"), &Normalizer::default())?;
//!     println!("{} rows, {} malformed fields", summary.rows_processed, summary.issues.len());
//!
//!     // Deaths per year
//!     let deaths = dataset.aggregate(&AggregationRequest::new(
//!         vec![Field::Year],
//!         Statistic::SumPersonsKilled,
//!     ))?;
//!     for (year, killed) in deaths.to_table() {
//!         println!("{year}: {killed}");
//!     }
//!
//!     // Collisions per year on any Rockaway street
//!     let rockaway = dataset.aggregate(
//!         &AggregationRequest::new(vec![Field::Year], Statistic::Count)
//!             .with_filter(FilterPredicate::street_contains("rockaway")),
//!     )?;
//!     println!("{:?}", rockaway.to_table());
//!
//!     // Ten worst ZIP codes
//!     let zips = dataset.aggregate(
//!         &AggregationRequest::new(vec![Field::ZipCode], Statistic::Count).with_limit(10),
//!     )?;
//!     println!("{:?}", zips.to_table());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
mod helpers;
pub mod processor;
pub mod report;

pub use config::{Neighborhood, ReportConfig};
pub use processor::dataset::{CollisionDataset, GeoPoint};
pub use processor::engine::{
    AggregationRequest, AggregationResult, GroupRow, YearPolicy, execute,
};
pub use processor::query_builder::{QueryBuilder, QueryCache};
pub use processor::record::{AccidentRecord, CompletenessReport, Normalizer, RawRecord};
pub use processor::{
    AnalysisError, Field, FilterPredicate, GeoBounds, MalformedRecord, ParseSummary, Statistic,
};
