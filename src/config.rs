//! Report configuration.
//!
//! Everything the collision report used to hard-code (ZIP codes, street
//! names, the year floor) is a field here. Loaded from JSON; every field has
//! a default so a partial file is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::processor::engine::{DEFAULT_YEAR_FLOOR, YearPolicy};
use crate::processor::record::{DEFAULT_DATE_FORMAT, Normalizer};
use crate::processor::{AnalysisError, GeoBounds};

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_MAX_MISSING_SHARE: f64 = 0.25;

/// Named area whose collision points are extracted for density plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub name: String,
    pub bounds: GeoBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// chrono format of the crash date column
    pub date_format: String,
    /// Records with a known year at or below this are excluded; `null` keeps all
    pub year_floor: Option<i32>,
    pub top_n: usize,
    pub zip_codes: Vec<String>,
    pub street_substrings: Vec<String>,
    pub neighborhoods: Vec<Neighborhood>,
    /// Fields missing in a larger share of records are logged as warnings
    pub max_missing_share: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            year_floor: Some(DEFAULT_YEAR_FLOOR),
            top_n: DEFAULT_TOP_N,
            zip_codes: Vec::new(),
            street_substrings: Vec::new(),
            neighborhoods: Vec::new(),
            max_missing_share: DEFAULT_MAX_MISSING_SHARE,
        }
    }
}

impl ReportConfig {
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        let config: ReportConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.top_n == 0 {
            return Err(AnalysisError::InvalidConfig(
                "top_n must be a positive integer".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_missing_share) {
            return Err(AnalysisError::InvalidConfig(format!(
                "max_missing_share must be within 0..=1, got {}",
                self.max_missing_share
            )));
        }
        if self.date_format.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("date_format is empty".into()));
        }
        for n in &self.neighborhoods {
            let b = &n.bounds;
            if b.min_lat > b.max_lat || b.min_lon > b.max_lon {
                return Err(AnalysisError::InvalidConfig(format!(
                    "neighborhood '{}' has inverted bounds",
                    n.name
                )));
            }
        }
        Ok(())
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.date_format.clone())
    }

    pub fn year_policy(&self) -> YearPolicy {
        YearPolicy::new(self.year_floor)
    }
}
