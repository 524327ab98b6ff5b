use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema::{self, Flag};

/// A confirmed record the estimator could not produce a replacement for.
/// Carried in the run summary; the record stays unresolved in the output.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationFailure {
    pub lsoa_code: String,
    pub component: String,
    pub year: i32,
    pub reason: String,
}

pub struct EstimationOutcome {
    pub dataframe: DataFrame,
    pub failures: Vec<EstimationFailure>,
}

/// Produces a candidate replacement value for every confirmed outlier by
/// interpolating or extrapolating the unit's own trusted years.
///
/// The trusted observations of a series are the years not confirmed as
/// outliers. A flagged year between two trusted years is interpolated
/// linearly; outside the trusted range it is extrapolated from the nearest
/// two trusted points on that side. Fewer than two trusted points is a
/// per-record failure, not a pipeline abort.
///
/// The group-total constraint is deliberately not enforced here; that is
/// the redistribution engine's job.
pub fn estimate_replacements(df: &DataFrame) -> Result<EstimationOutcome> {
    let len = df.height();

    let lsoa_codes = df.column(schema::LSOA_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let values = df.column(schema::VALUE)?.f64()?;
    let flags = df.column(schema::FLAG)?.str()?;

    let mut trusted_by_series: HashMap<(&str, &str), Vec<(i32, f64)>> = HashMap::new();
    let mut confirmed_rows: Vec<usize> = Vec::new();

    for idx in 0..len {
        let (Some(lsoa), Some(component), Some(year)) =
            (lsoa_codes.get(idx), components.get(idx), years.get(idx))
        else {
            continue;
        };

        if flags.get(idx) == Some(Flag::Confirmed.as_str()) {
            confirmed_rows.push(idx);
            continue;
        }

        if let Some(value) = values.get(idx) {
            trusted_by_series
                .entry((lsoa, component))
                .or_default()
                .push((year, value));
        }
    }

    for points in trusted_by_series.values_mut() {
        points.sort_by_key(|(year, _)| *year);
    }

    let mut imputed: Vec<Option<f64>> = vec![None; len];
    let mut failures: Vec<EstimationFailure> = Vec::new();

    for idx in confirmed_rows {
        let (Some(lsoa), Some(component), Some(year)) =
            (lsoa_codes.get(idx), components.get(idx), years.get(idx))
        else {
            continue;
        };

        let trusted = trusted_by_series
            .get(&(lsoa, component))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        match estimate_for_year(trusted, year) {
            Some(estimate) => imputed[idx] = Some(estimate),
            None => failures.push(EstimationFailure {
                lsoa_code: lsoa.to_string(),
                component: component.to_string(),
                year,
                reason: format!(
                    "{} trusted observation(s), at least two required for \
                     interpolation or extrapolation",
                    trusted.len()
                ),
            }),
        }
    }

    let mut output = df.clone();
    output.with_column(Series::new(schema::IMPUTED_VALUE.into(), imputed))?;

    Ok(EstimationOutcome {
        dataframe: output,
        failures,
    })
}

/// Linear estimate at `year` from trusted (year, value) points sorted by
/// year. Interpolates between the nearest straddling points; outside the
/// trusted range, continues the line through the nearest two points.
fn estimate_for_year(trusted: &[(i32, f64)], year: i32) -> Option<f64> {
    if trusted.len() < 2 {
        return None;
    }

    let first = trusted[0];
    let last = trusted[trusted.len() - 1];

    let (prev, next) = if year < first.0 {
        (trusted[0], trusted[1])
    } else if year > last.0 {
        (trusted[trusted.len() - 2], last)
    } else {
        let next_pos = trusted.iter().position(|(y, _)| *y > year)?;
        (trusted[next_pos - 1], trusted[next_pos])
    };

    let (prev_year, prev_value) = prev;
    let (next_year, next_value) = next;
    let slope = (next_value - prev_value) / f64::from(next_year - prev_year);
    Some(prev_value + slope * f64::from(year - prev_year))
}
