// crates/saie-core/src/validation.rs

use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema;

/// A group whose adjusted sum drifted from its control total.
#[derive(Debug, Clone, Serialize)]
pub struct GroupTotalMismatch {
    pub lad_code: String,
    pub year: i32,
    pub component: String,
    pub expected: f64,
    pub actual: f64,
}

/// Compares the adjusted sum of every group against its control total.
///
/// Groups containing a record with a null adjusted value are skipped: those
/// are the unresolved estimation failures, already enumerated elsewhere,
/// and their sums are not expected to match.
pub fn check_group_totals(df: &DataFrame, tolerance: f64) -> Result<Vec<GroupTotalMismatch>> {
    let len = df.height();

    let lad_codes = df.column(schema::LAD_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let values = df.column(schema::VALUE)?.f64()?;
    let adjusted = df.column(schema::ADJUSTED_VALUE)?.f64()?;

    struct GroupSums {
        expected: f64,
        actual: f64,
        complete: bool,
    }

    let mut groups: HashMap<(String, i32, String), GroupSums> = HashMap::new();

    for idx in 0..len {
        let (Some(lad), Some(year), Some(component), Some(value)) = (
            lad_codes.get(idx),
            years.get(idx),
            components.get(idx),
            values.get(idx),
        ) else {
            continue;
        };

        let entry = groups
            .entry((lad.to_string(), year, component.to_string()))
            .or_insert(GroupSums {
                expected: 0.0,
                actual: 0.0,
                complete: true,
            });
        entry.expected += value;
        match adjusted.get(idx) {
            Some(result) => entry.actual += result,
            None => entry.complete = false,
        }
    }

    let mut mismatches: Vec<GroupTotalMismatch> = Vec::new();
    for ((lad, year, component), sums) in groups {
        if !sums.complete {
            continue;
        }
        let scale = sums.expected.abs().max(1.0);
        if (sums.actual - sums.expected).abs() > tolerance * scale {
            mismatches.push(GroupTotalMismatch {
                lad_code: lad,
                year,
                component,
                expected: sums.expected,
                actual: sums.actual,
            });
        }
    }

    mismatches.sort_by(|a, b| {
        (&a.lad_code, a.year, &a.component).cmp(&(&b.lad_code, b.year, &b.component))
    });
    Ok(mismatches)
}
