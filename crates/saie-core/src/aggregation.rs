use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::schema;

/// Lookup from child geographic code to parent geographic code, consumed
/// read-only by the rollup.
#[derive(Debug, Clone, Default)]
pub struct GeoMapping {
    parents: HashMap<String, String>,
}

impl GeoMapping {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let parents = pairs
            .into_iter()
            .map(|(child, parent)| (child.into(), parent.into()))
            .collect();
        Self { parents }
    }

    /// Loads a two-column CSV of (lsoa_code, lad_code) pairs.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut parents = HashMap::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let (Some(child), Some(parent)) = (record.get(0), record.get(1)) else {
                return Err(PipelineError::Processing(format!(
                    "{}:{}: mapping row needs two columns",
                    path.display(),
                    row + 2
                )));
            };
            parents.insert(child.to_string(), parent.to_string());
        }
        Ok(Self { parents })
    }

    pub fn parent(&self, child: &str) -> Option<&str> {
        self.parents.get(child).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// A child record whose code is absent from the geographic lookup. The
/// record is excluded from the parent sums and the affected aggregation is
/// partial, never silently complete.
#[derive(Debug, Clone, Serialize)]
pub struct UnmappedCode {
    pub lsoa_code: String,
    pub year: i32,
    pub component: String,
}

pub struct RollupOutcome {
    pub dataframe: DataFrame,
    pub unmapped: Vec<UnmappedCode>,
}

/// Rolls child-level adjusted values up to parent totals per (year,
/// component), for reporting and cross-checks only — nothing here feeds
/// back into the redistribution math. Records still lacking an adjusted
/// value (unresolved estimation failures) are left out of the sums.
pub fn rollup_to_parents(df: &DataFrame, mapping: &GeoMapping) -> Result<RollupOutcome> {
    let len = df.height();

    let lsoa_codes = df.column(schema::LSOA_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let adjusted = df.column(schema::ADJUSTED_VALUE)?.f64()?;

    let mut totals: HashMap<(String, i32, String), f64> = HashMap::new();
    let mut unmapped: Vec<UnmappedCode> = Vec::new();

    for idx in 0..len {
        let (Some(lsoa), Some(year), Some(component)) =
            (lsoa_codes.get(idx), years.get(idx), components.get(idx))
        else {
            continue;
        };

        let Some(parent) = mapping.parent(lsoa) else {
            unmapped.push(UnmappedCode {
                lsoa_code: lsoa.to_string(),
                year,
                component: component.to_string(),
            });
            continue;
        };

        if let Some(result) = adjusted.get(idx) {
            *totals
                .entry((parent.to_string(), year, component.to_string()))
                .or_insert(0.0) += result;
        }
    }

    let mut rows: Vec<((String, i32, String), f64)> = totals.into_iter().collect();
    rows.sort_by(|a, b| (&a.0 .0, a.0 .1, &a.0 .2).cmp(&(&b.0 .0, b.0 .1, &b.0 .2)));

    let lads: Vec<&str> = rows.iter().map(|((lad, _, _), _)| lad.as_str()).collect();
    let row_years: Vec<i32> = rows.iter().map(|((_, year, _), _)| *year).collect();
    let row_components: Vec<&str> = rows
        .iter()
        .map(|((_, _, component), _)| component.as_str())
        .collect();
    let sums: Vec<f64> = rows.iter().map(|(_, total)| *total).collect();

    let dataframe = DataFrame::new(vec![
        Series::new(schema::LAD_CODE.into(), lads).into(),
        Series::new(schema::YEAR.into(), row_years).into(),
        Series::new(schema::COMPONENT.into(), row_components).into(),
        Series::new(schema::ADJUSTED_VALUE.into(), sums).into(),
    ])?;

    Ok(RollupOutcome {
        dataframe,
        unmapped,
    })
}
