//! collision-report CLI
//!
//! Loads a collision CSV export and either runs the standard report, a single
//! ad-hoc aggregation, or a completeness check.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use collision_analytics::{
    AggregationRequest, CollisionDataset, Field, FilterPredicate, ParseSummary, ReportConfig,
    Statistic,
    report::run_report,
};
use env_logger::Env;
use log::info;

#[derive(Parser, Debug)]
#[command(name = "collision-report")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the standard report and write its tables to a directory
    Report {
        /// Collision CSV export
        #[arg(short, long)]
        data: PathBuf,

        /// JSON report configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "report")]
        out: PathBuf,

        /// Rows kept in ranked tables
        #[arg(long)]
        top_n: Option<usize>,

        /// ZIP code for the neighborhood tables (repeatable)
        #[arg(long = "zip")]
        zips: Vec<String>,

        /// Street-name substring to trend by year (repeatable)
        #[arg(long = "street")]
        streets: Vec<String>,

        /// Keep every year instead of dropping years up to the floor
        #[arg(long)]
        all_years: bool,
    },

    /// Run one aggregation and print the ranked table
    Query {
        #[arg(short, long)]
        data: PathBuf,

        /// JSON report configuration (date format, year floor)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Comma separated group-by fields (year, month, date, borough, zip, street, factor)
        #[arg(short, long, value_delimiter = ',', required = true)]
        group_by: Vec<Field>,

        /// count, killed or injured
        #[arg(short, long, default_value = "count")]
        statistic: Statistic,

        /// Case-insensitive street-name substring
        #[arg(long)]
        street_contains: Option<String>,

        /// Restrict to these ZIP codes (repeatable)
        #[arg(long = "zip")]
        zips: Vec<String>,

        #[arg(long)]
        from_year: Option<i32>,

        #[arg(long)]
        to_year: Option<i32>,

        /// Only collisions with at least one death
        #[arg(long)]
        fatal: bool,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Keep every year instead of dropping years up to the floor
        #[arg(long)]
        all_years: bool,

        /// Date format of the crash date column, overrides the config
        #[arg(long)]
        date_format: Option<String>,

        /// Print JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Report how many records miss each field
    Completeness {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        date_format: Option<String>,
    },
}

/// Config from `path` or the defaults, with the command-line overrides applied
fn load_config(
    path: Option<&Path>,
    date_format: Option<String>,
    all_years: bool,
) -> Result<ReportConfig> {
    let mut config = match path {
        Some(path) => ReportConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if let Some(format) = date_format {
        config.date_format = format;
    }
    if all_years {
        config.year_floor = None;
    }
    config.validate()?;
    Ok(config)
}

/// Loads `data` with the config's date format and year floor
fn load_dataset(data: &Path, config: &ReportConfig) -> Result<(CollisionDataset, ParseSummary)> {
    let (dataset, summary) = CollisionDataset::open(data, &config.normalizer())
        .with_context(|| format!("loading {}", data.display()))?;
    Ok((dataset.with_year_policy(config.year_policy()), summary))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Report {
            data,
            config,
            out,
            top_n,
            zips,
            streets,
            all_years,
        } => {
            let mut config = load_config(config.as_deref(), None, all_years)?;
            if let Some(n) = top_n {
                config.top_n = n;
            }
            config.zip_codes.extend(zips);
            config.street_substrings.extend(streets);
            config.validate()?;

            let (dataset, summary) = load_dataset(&data, &config)?;
            info!("{} malformed fields", summary.issues.len());

            let report = run_report(&dataset, &config)?;
            report.write_to_dir(&out)?;
            println!(
                "Wrote {} tables to {}",
                report.tables.len(),
                out.display()
            );
        }

        Commands::Query {
            data,
            config,
            group_by,
            statistic,
            street_contains,
            zips,
            from_year,
            to_year,
            fatal,
            limit,
            all_years,
            date_format,
            json,
        } => {
            let mut filters = Vec::new();
            if let Some(street) = street_contains {
                filters.push(FilterPredicate::StreetContains(street));
            }
            if !zips.is_empty() {
                filters.push(FilterPredicate::ZipCodeIn(zips));
            }
            if from_year.is_some() || to_year.is_some() {
                let from = from_year.unwrap_or(i32::MIN);
                let to = to_year.unwrap_or(i32::MAX);
                if from > to {
                    bail!("--from-year {from} is after --to-year {to}");
                }
                filters.push(FilterPredicate::YearBetween(from, to));
            }
            if fatal {
                filters.push(FilterPredicate::Fatal);
            }

            let mut request = AggregationRequest::new(group_by, statistic);
            request.filter = match filters.len() {
                0 => None,
                1 => filters.pop(),
                _ => Some(FilterPredicate::All(filters)),
            };
            request.limit = limit;

            let config = load_config(config.as_deref(), date_format, all_years)?;
            let (dataset, _) = load_dataset(&data, &config)?;
            let result = dataset.aggregate(&request)?;

            if json {
                serde_json::to_writer_pretty(io::stdout().lock(), &result)?;
                println!();
            } else {
                result.write_csv(io::stdout().lock())?;
            }
        }

        Commands::Completeness { data, date_format } => {
            let config = load_config(None, date_format, false)?;
            let (dataset, summary) = load_dataset(&data, &config)?;
            let report = dataset.completeness();

            println!("Records: {}", report.total);
            println!("Rows with malformed fields: {}", summary.malformed_rows());
            for field in &report.fields {
                println!(
                    "  {:<22} {:>10} missing ({:.1}%)",
                    field.field,
                    field.missing,
                    field.share * 100.0
                );
            }
        }
    }

    Ok(())
}
