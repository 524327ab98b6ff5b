use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::schema;

/// Reads a value-record CSV into the working table.
///
/// The raw export and the reviewed artifact share a schema apart from the
/// review columns, so one reader covers both: `require_review` demands the
/// `flag` and `adjust` columns the adjustment pipeline needs, while the
/// flagging pipeline accepts their absence.
pub fn read_records_csv(path: &Path, require_review: bool) -> Result<DataFrame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(pos, name)| (name, pos))
        .collect();

    let mut required: Vec<&str> = schema::REQUIRED_COLUMNS.to_vec();
    if require_review {
        required.extend(schema::REVIEW_COLUMNS);
    }
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !index.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Processing(format!(
            "{}: missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut lsoa_codes: Vec<String> = Vec::new();
    let mut lad_codes: Vec<String> = Vec::new();
    let mut components: Vec<String> = Vec::new();
    let mut years: Vec<i32> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    let mut flags: Vec<Option<String>> = Vec::new();
    let mut reasons: Vec<Option<String>> = Vec::new();
    let mut adjusts: Vec<Option<bool>> = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;

        lsoa_codes.push(require_field(&record, &index, schema::LSOA_CODE, path, line)?.to_string());
        lad_codes.push(require_field(&record, &index, schema::LAD_CODE, path, line)?.to_string());
        components.push(require_field(&record, &index, schema::COMPONENT, path, line)?.to_string());

        let year_raw = require_field(&record, &index, schema::YEAR, path, line)?;
        years.push(year_raw.parse::<i32>().map_err(|_| {
            PipelineError::Processing(format!(
                "{}:{}: year '{}' is not an integer",
                path.display(),
                line,
                year_raw
            ))
        })?);

        let value_raw = require_field(&record, &index, schema::VALUE, path, line)?;
        values.push(value_raw.parse::<f64>().map_err(|_| {
            PipelineError::Processing(format!(
                "{}:{}: value '{}' is not numeric",
                path.display(),
                line,
                value_raw
            ))
        })?);

        flags.push(optional_field(&record, &index, schema::FLAG).map(str::to_string));
        reasons.push(optional_field(&record, &index, schema::FLAG_REASON).map(str::to_string));
        adjusts.push(match optional_field(&record, &index, schema::ADJUST) {
            Some(raw) => Some(parse_adjust(raw, path, line)?),
            None => None,
        });
    }

    let mut columns: Vec<Column> = vec![
        Series::new(schema::LSOA_CODE.into(), lsoa_codes).into(),
        Series::new(schema::LAD_CODE.into(), lad_codes).into(),
        Series::new(schema::COMPONENT.into(), components).into(),
        Series::new(schema::YEAR.into(), years).into(),
        Series::new(schema::VALUE.into(), values).into(),
        Series::new(schema::FLAG.into(), flags).into(),
        Series::new(schema::FLAG_REASON.into(), reasons).into(),
    ];
    if require_review || index.contains_key(schema::ADJUST) {
        columns.push(Series::new(schema::ADJUST.into(), adjusts).into());
    }

    Ok(DataFrame::new(columns)?)
}

fn require_field<'a>(
    record: &'a csv::StringRecord,
    index: &HashMap<&str, usize>,
    column: &str,
    path: &Path,
    line: usize,
) -> Result<&'a str> {
    let value = index
        .get(column)
        .and_then(|&pos| record.get(pos))
        .unwrap_or("");
    if value.is_empty() {
        return Err(PipelineError::Processing(format!(
            "{}:{}: column '{}' is empty",
            path.display(),
            line,
            column
        )));
    }
    Ok(value)
}

fn optional_field<'a>(
    record: &'a csv::StringRecord,
    index: &HashMap<&str, usize>,
    column: &str,
) -> Option<&'a str> {
    index
        .get(column)
        .and_then(|&pos| record.get(pos))
        .filter(|value| !value.is_empty())
}

/// Reviewers fill the adjust column by hand, so accept the spellings that
/// show up in practice rather than strict booleans.
fn parse_adjust(raw: &str, path: &Path, line: usize) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" => Ok(false),
        _ => Err(PipelineError::Processing(format!(
            "{}:{}: adjust value '{}' is not a recognised yes/no",
            path.display(),
            line,
            raw
        ))),
    }
}
