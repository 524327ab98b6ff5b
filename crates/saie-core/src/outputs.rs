use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema;

/// Writes a table as CSV with columns in schema order; columns the table
/// does not carry are skipped, extras are appended in their existing order.
pub fn write_records_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let present: Vec<&str> = df
        .get_column_names()
        .iter()
        .map(|name| name.as_str())
        .collect();

    let mut ordered: Vec<&str> = schema::OUTPUT_COLUMN_ORDER
        .iter()
        .copied()
        .filter(|name| present.contains(name))
        .collect();
    for name in &present {
        if !ordered.contains(name) {
            ordered.push(*name);
        }
    }

    let mut output = df.select(ordered)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut output)?;
    Ok(())
}

/// Persists a run summary as pretty-printed JSON next to the main output.
pub fn write_summary_json<T: Serialize>(summary: &T, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(summary)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
