//! The standard collision report: a fixed battery of aggregations driven by
//! [`ReportConfig`], written out as two-column tables for external charting.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::config::ReportConfig;
use crate::helpers::text::slug;
use crate::processor::dataset::{CollisionDataset, GeoPoint};
use crate::processor::engine::{AggregationRequest, AggregationResult};
use crate::processor::record::CompletenessReport;
use crate::processor::{AnalysisError, Field, FilterPredicate, Statistic};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedResult {
    pub name: String,
    pub result: AggregationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodPoints {
    pub name: String,
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub tables: Vec<NamedResult>,
    pub neighborhoods: Vec<NeighborhoodPoints>,
    pub completeness: CompletenessReport,
}

impl Report {
    pub fn table(&self, name: &str) -> Option<&AggregationResult> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.result)
    }

    /// Writes `<name>.csv` per table, `points_<name>.csv` per neighborhood
    /// and the whole report as `report.json`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), AnalysisError> {
        fs::create_dir_all(dir)?;

        for table in &self.tables {
            let file = File::create(dir.join(format!("{}.csv", table.name)))?;
            table.result.write_csv(BufWriter::new(file))?;
        }

        let mut stems = HashSet::new();
        for area in &self.neighborhoods {
            let stem = unique_name(&mut stems, format!("points_{}", slug(&area.name)));
            let file = File::create(dir.join(format!("{stem}.csv")))?;
            let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
            for point in &area.points {
                wtr.serialize(point)?;
            }
            wtr.flush()?;
        }

        let file = File::create(dir.join("report.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;

        info!(
            "Wrote {} tables and {} point sets to {}",
            self.tables.len(),
            self.neighborhoods.len(),
            dir.display()
        );
        Ok(())
    }
}

/// `base`, or `base_2`, `base_3`, ... if already taken
fn unique_name(taken: &mut HashSet<String>, base: String) -> String {
    let mut name = base.clone();
    let mut n = 1;
    while !taken.insert(name.clone()) {
        n += 1;
        name = format!("{base}_{n}");
    }
    name
}

/// Runs the full battery against `dataset`.
///
/// The dataset's own year policy applies; set it from the config before
/// calling if the config should govern it.
pub fn run_report(
    dataset: &CollisionDataset,
    config: &ReportConfig,
) -> Result<Report, AnalysisError> {
    config.validate()?;
    let top_n = config.top_n;

    let completeness = dataset.completeness();
    for field in completeness.over_threshold(config.max_missing_share) {
        warn!(
            "{} is missing in {} of {} records ({:.1}%)",
            field.field,
            field.missing,
            completeness.total,
            field.share * 100.0
        );
    }

    let named =
        |name: String, request: AggregationRequest| -> Result<NamedResult, AnalysisError> {
            let result = dataset.aggregate(&request)?;
            Ok(NamedResult { name, result })
        };

    let mut tables = vec![
        named(
            "accidents_by_year".into(),
            AggregationRequest::new(vec![Field::Year], Statistic::Count),
        )?,
        named(
            "deaths_by_year".into(),
            AggregationRequest::new(vec![Field::Year], Statistic::SumPersonsKilled),
        )?,
        named(
            "injuries_by_year".into(),
            AggregationRequest::new(vec![Field::Year], Statistic::SumPersonsInjured),
        )?,
    ];

    // ranked within each year rather than overall
    let factors = named(
        "top_factors_by_year".into(),
        AggregationRequest::new(vec![Field::Year, Field::ContributingFactor], Statistic::Count),
    )?;
    tables.push(NamedResult {
        result: factors.result.top_per_leading_key(top_n),
        ..factors
    });

    tables.push(named(
        "top_streets".into(),
        AggregationRequest::new(vec![Field::OnStreetName], Statistic::Count).with_limit(top_n),
    )?);
    tables.push(named(
        "accidents_by_zip".into(),
        AggregationRequest::new(vec![Field::ZipCode], Statistic::Count).with_limit(top_n),
    )?);
    tables.push(named(
        "deaths_by_zip".into(),
        AggregationRequest::new(vec![Field::ZipCode], Statistic::SumPersonsKilled)
            .with_limit(top_n),
    )?);
    tables.push(named(
        "accidents_by_borough".into(),
        AggregationRequest::new(vec![Field::Borough], Statistic::Count),
    )?);

    let mut names: HashSet<String> = tables.iter().map(|t| t.name.clone()).collect();
    for street in &config.street_substrings {
        tables.push(named(
            unique_name(&mut names, format!("street_{}_by_year", slug(street))),
            AggregationRequest::new(vec![Field::Year], Statistic::Count)
                .with_filter(FilterPredicate::street_contains(street.as_str())),
        )?);
    }

    if !config.zip_codes.is_empty() {
        tables.push(named(
            "selected_zips_by_year".into(),
            AggregationRequest::new(vec![Field::ZipCode, Field::Year], Statistic::Count)
                .with_filter(FilterPredicate::ZipCodeIn(config.zip_codes.clone())),
        )?);
    }

    let neighborhoods = config
        .neighborhoods
        .iter()
        .map(|n| NeighborhoodPoints {
            name: n.name.clone(),
            points: dataset.located_points(Some(&FilterPredicate::WithinBounds(n.bounds))),
        })
        .collect();

    info!(
        "Report over {} records: {} tables",
        dataset.len(),
        tables.len()
    );

    Ok(Report {
        tables,
        neighborhoods,
        completeness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Neighborhood;
    use crate::processor::GeoBounds;
    use crate::processor::record::AccidentRecord;
    use chrono::NaiveDate;

    fn record(year: i32, street: &str, zip: &str, factor: &str, killed: u32) -> AccidentRecord {
        AccidentRecord {
            on_street_name: Some(street.into()),
            zip_code: Some(zip.into()),
            contributing_factor: Some(factor.into()),
            persons_killed: Some(killed),
            latitude: Some(40.64),
            longitude: Some(-73.90),
            ..AccidentRecord::on(NaiveDate::from_ymd_opt(year, 5, 1).unwrap())
        }
    }

    fn dataset() -> CollisionDataset {
        CollisionDataset::from_records(vec![
            record(2012, "ROCKAWAY PARKWAY", "11236", "Unspecified", 3),
            record(2014, "ROCKAWAY PARKWAY", "11236", "Unspecified", 0),
            record(2014, "ATLANTIC AVENUE", "11233", "Driver Inattention/Distraction", 1),
            record(2015, "ROCKAWAY AVENUE", "11212", "Unspecified", 0),
            record(2015, "ATLANTIC AVENUE", "11236", "Unspecified", 0),
        ])
    }

    fn config() -> ReportConfig {
        ReportConfig {
            top_n: 1,
            zip_codes: vec!["11236".into()],
            street_substrings: vec!["Rockaway".into(), "Atlantic Ave".into()],
            neighborhoods: vec![Neighborhood {
                name: "Canarsie".into(),
                bounds: GeoBounds {
                    min_lat: 40.62,
                    max_lat: 40.66,
                    min_lon: -73.93,
                    max_lon: -73.88,
                },
            }],
            ..ReportConfig::default()
        }
    }

    #[test]
    fn runs_every_table() {
        let report = run_report(&dataset(), &config()).unwrap();
        let names: Vec<&str> = report.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "accidents_by_year",
                "deaths_by_year",
                "injuries_by_year",
                "top_factors_by_year",
                "top_streets",
                "accidents_by_zip",
                "deaths_by_zip",
                "accidents_by_borough",
                "street_rockaway_by_year",
                "street_atlantic_ave_by_year",
                "selected_zips_by_year",
            ]
        );
    }

    #[test]
    fn respects_year_floor_and_top_n() {
        let report = run_report(&dataset(), &config()).unwrap();
        let deaths = report.table("deaths_by_year").unwrap();
        assert_eq!(deaths.value_of(&["2012"]), None);
        assert_eq!(deaths.total(), 1);

        let streets = report.table("top_streets").unwrap();
        assert_eq!(streets.len(), 1);

        let factors = report.table("top_factors_by_year").unwrap();
        assert_eq!(
            factors.to_table(),
            vec![
                ("2015 / Unspecified".to_string(), 2),
                ("2014 / Unspecified".to_string(), 1),
            ]
        );

        let rockaway = report.table("street_rockaway_by_year").unwrap();
        assert_eq!(rockaway.total(), 2);

        assert_eq!(report.neighborhoods[0].points.len(), 4);
    }

    #[test]
    fn writes_tables_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_report(&dataset(), &config()).unwrap();
        report.write_to_dir(dir.path()).unwrap();

        let by_year = fs::read_to_string(dir.path().join("accidents_by_year.csv")).unwrap();
        assert_eq!(by_year, "year,count\n2014,2\n2015,2\n");
        assert!(dir.path().join("points_canarsie.csv").exists());
        assert!(dir.path().join("report.json").exists());
    }

    #[test]
    fn colliding_street_names_get_distinct_tables() {
        let config = ReportConfig {
            street_substrings: vec!["Atlantic Ave".into(), "atlantic-ave".into()],
            ..config()
        };
        let report = run_report(&dataset(), &config).unwrap();
        assert_eq!(report.table("street_atlantic_ave_by_year").unwrap().total(), 2);
        assert!(report.table("street_atlantic_ave_by_year_2").unwrap().is_empty());

        let dir = tempfile::tempdir().unwrap();
        report.write_to_dir(dir.path()).unwrap();
        let first = fs::read_to_string(dir.path().join("street_atlantic_ave_by_year.csv")).unwrap();
        assert_eq!(first, "year,count\n2014,1\n2015,1\n");
        assert!(dir.path().join("street_atlantic_ave_by_year_2.csv").exists());
    }
}
