// crates/saie-core/src/schema.rs

use polars::prelude::DataFrame;

use crate::error::{PipelineError, Result};

pub const LSOA_CODE: &str = "lsoa_code";
pub const LAD_CODE: &str = "lad_code";
pub const COMPONENT: &str = "component";
pub const YEAR: &str = "year";
pub const VALUE: &str = "value";
pub const FLAG: &str = "flag";
pub const FLAG_REASON: &str = "flag_reason";
pub const ADJUST: &str = "adjust";
pub const ZSCORE: &str = "zscore";
pub const IQR_LOWER_BOUND: &str = "iqr_lower_bound";
pub const IQR_UPPER_BOUND: &str = "iqr_upper_bound";
pub const IMPUTED_VALUE: &str = "imputed_value";
pub const ADJUSTED_VALUE: &str = "adjusted_value";

/// Columns every value-record table must carry on ingestion.
pub const REQUIRED_COLUMNS: [&str; 5] = [LSOA_CODE, LAD_CODE, COMPONENT, YEAR, VALUE];

/// Additional columns the adjustment pipeline requires from the reviewed table.
pub const REVIEW_COLUMNS: [&str; 2] = [FLAG, ADJUST];

/// Preferred column ordering for persisted outputs. Columns absent from a
/// given table are skipped.
pub const OUTPUT_COLUMN_ORDER: [&str; 13] = [
    LSOA_CODE,
    LAD_CODE,
    COMPONENT,
    YEAR,
    VALUE,
    ZSCORE,
    IQR_LOWER_BOUND,
    IQR_UPPER_BOUND,
    FLAG,
    FLAG_REASON,
    ADJUST,
    IMPUTED_VALUE,
    ADJUSTED_VALUE,
];

/// Outlier state of a record. Unflagged records carry a null in the `flag`
/// column rather than a variant of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Pending,
    Confirmed,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Pending => "PENDING",
            Flag::Confirmed => "CONFIRMED",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Flag::Pending),
            "CONFIRMED" => Ok(Flag::Confirmed),
            _ => Err(PipelineError::Processing(format!(
                "invalid flag value '{}', expected PENDING or CONFIRMED",
                s
            ))),
        }
    }
}

pub fn ensure_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    let present: Vec<&str> = df
        .get_column_names()
        .iter()
        .map(|name| name.as_str())
        .collect();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !present.contains(name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Processing(format!(
            "table is missing required columns: {}",
            missing.join(", ")
        )))
    }
}
