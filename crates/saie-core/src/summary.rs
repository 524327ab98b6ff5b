use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use serde::Serialize;

use crate::aggregation::UnmappedCode;
use crate::error::Result;
use crate::estimator::EstimationFailure;
use crate::redistribution::RedistributionFailure;
use crate::schema;

#[derive(Debug, Clone, Serialize)]
pub struct FlagReasonCount {
    pub reason: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggingSummary {
    pub total_rows: usize,
    pub flagged_rows: usize,
    pub group_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_reasons: Vec<FlagReasonCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentSummary {
    pub total_rows: usize,
    pub confirmed_rows: usize,
    pub adjusted_rows: usize,
    pub group_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub estimation_failures: Vec<EstimationFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redistribution_failures: Vec<RedistributionFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmapped_codes: Vec<UnmappedCode>,
}

pub fn summarize_flagging(df: &DataFrame) -> Result<FlaggingSummary> {
    let flags = df.column(schema::FLAG)?.str()?;
    let reasons = df.column(schema::FLAG_REASON)?.str()?;

    let flagged_rows = (0..df.height())
        .filter(|&idx| flags.get(idx).is_some())
        .count();

    let mut reason_counts: HashMap<&str, usize> = HashMap::new();
    for idx in 0..df.height() {
        if let Some(joined) = reasons.get(idx) {
            for reason in joined.split('|').filter(|reason| !reason.is_empty()) {
                *reason_counts.entry(reason).or_insert(0) += 1;
            }
        }
    }

    let mut top_reasons: Vec<FlagReasonCount> = reason_counts
        .into_iter()
        .map(|(reason, rows)| FlagReasonCount {
            reason: reason.to_string(),
            rows,
        })
        .collect();
    top_reasons.sort_by(|a, b| b.rows.cmp(&a.rows).then_with(|| a.reason.cmp(&b.reason)));
    top_reasons.truncate(5);

    Ok(FlaggingSummary {
        total_rows: df.height(),
        flagged_rows,
        group_count: count_groups(df)?,
        top_reasons,
    })
}

pub fn count_groups(df: &DataFrame) -> Result<usize> {
    let lad_codes = df.column(schema::LAD_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;

    let mut keys: HashSet<(&str, i32, &str)> = HashSet::new();
    for idx in 0..df.height() {
        if let (Some(lad), Some(year), Some(component)) =
            (lad_codes.get(idx), years.get(idx), components.get(idx))
        {
            keys.insert((lad, year, component));
        }
    }
    Ok(keys.len())
}
