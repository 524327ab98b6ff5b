use polars::prelude::*;
use tracing::{info, warn};

use crate::aggregation::{self, GeoMapping};
use crate::config::RunConfig;
use crate::detector;
use crate::error::Result;
use crate::estimator;
use crate::redistribution::{self, SUM_TOLERANCE};
use crate::review;
use crate::schema;
use crate::summary::{self, AdjustmentSummary, FlaggingSummary};
use crate::validation;

pub struct FlaggingOutput {
    pub dataframe: DataFrame,
    pub summary: FlaggingSummary,
}

/// First pipeline: annotate the raw table with outlier flags for review.
pub fn run_flagging(df: &DataFrame, config: &RunConfig) -> Result<FlaggingOutput> {
    config.validate()?;
    schema::ensure_columns(df, &schema::REQUIRED_COLUMNS)?;

    let scoped = filter_run_scope(df, config)?;
    info!(
        rows = scoped.height(),
        excluded = df.height() - scoped.height(),
        "flagging scope selected"
    );

    let flagged = detector::flag_outliers(&scoped, config)?;
    let summary = summary::summarize_flagging(&flagged)?;
    info!(
        flagged = summary.flagged_rows,
        groups = summary.group_count,
        "outlier flagging complete"
    );

    Ok(FlaggingOutput {
        dataframe: flagged,
        summary,
    })
}

#[derive(Debug)]
pub struct AdjustmentOutput {
    pub dataframe: DataFrame,
    /// Parent-level totals, present when a geographic mapping was supplied.
    pub parent_totals: Option<DataFrame>,
    pub summary: AdjustmentSummary,
}

/// Second pipeline: turn reviewed flags into confirmed outliers, impute
/// replacements, redistribute the delta so group totals are preserved, and
/// optionally roll the result up to parent areas.
pub fn run_adjustment(
    df: &DataFrame,
    config: &RunConfig,
    mapping: Option<&GeoMapping>,
) -> Result<AdjustmentOutput> {
    config.validate()?;
    schema::ensure_columns(df, &schema::REQUIRED_COLUMNS)?;
    schema::ensure_columns(df, &schema::REVIEW_COLUMNS)?;

    let scoped = filter_run_scope(df, config)?;
    let reviewed = review::apply_review_decisions(&scoped)?;

    let confirmed_rows = {
        let flags = reviewed.column(schema::FLAG)?.str()?;
        (0..reviewed.height())
            .filter(|&idx| flags.get(idx).is_some())
            .count()
    };
    info!(confirmed = confirmed_rows, "review decisions reconciled");

    let estimation = estimator::estimate_replacements(&reviewed)?;
    if !estimation.failures.is_empty() {
        warn!(
            count = estimation.failures.len(),
            "records left unresolved: too few trusted observations"
        );
    }

    let redistribution =
        redistribution::redistribute(&estimation.dataframe, config.accept_negatives)?;
    if !redistribution.failures.is_empty() {
        warn!(
            count = redistribution.failures.len(),
            "groups could not absorb their delta without negative values"
        );
    }

    // The engine already reports its own infeasible groups; anything else
    // drifting past tolerance would be an internal inconsistency.
    let mismatches = validation::check_group_totals(&redistribution.dataframe, SUM_TOLERANCE)?;
    let unexplained = mismatches
        .iter()
        .filter(|mismatch| {
            !redistribution.failures.iter().any(|failure| {
                failure.lad_code == mismatch.lad_code
                    && failure.year == mismatch.year
                    && failure.component == mismatch.component
            })
        })
        .count();
    if unexplained > 0 {
        warn!(
            count = unexplained,
            "group totals drifted outside tolerance without a reported failure"
        );
    }

    let mut unmapped_codes = Vec::new();
    let parent_totals = match mapping {
        Some(mapping) => {
            let rollup = aggregation::rollup_to_parents(&redistribution.dataframe, mapping)?;
            if !rollup.unmapped.is_empty() {
                warn!(
                    count = rollup.unmapped.len(),
                    "records skipped by the rollup: code missing from mapping"
                );
            }
            unmapped_codes = rollup.unmapped;
            Some(rollup.dataframe)
        }
        None => None,
    };

    let adjusted_rows = {
        let adjusted = redistribution
            .dataframe
            .column(schema::ADJUSTED_VALUE)?
            .f64()?;
        (0..redistribution.dataframe.height())
            .filter(|&idx| adjusted.get(idx).is_some())
            .count()
    };

    let summary = AdjustmentSummary {
        total_rows: redistribution.dataframe.height(),
        confirmed_rows,
        adjusted_rows,
        group_count: summary::count_groups(&redistribution.dataframe)?,
        estimation_failures: estimation.failures,
        redistribution_failures: redistribution.failures,
        unmapped_codes,
    };

    Ok(AdjustmentOutput {
        dataframe: redistribution.dataframe,
        parent_totals,
        summary,
    })
}

/// Restricts the run to the configured year range and component set.
fn filter_run_scope(df: &DataFrame, config: &RunConfig) -> Result<DataFrame> {
    let years = df.column(schema::YEAR)?.i32()?;
    let components = df.column(schema::COMPONENT)?.str()?;

    let mut mask: Vec<bool> = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let year_ok = match (&config.years, years.get(idx)) {
            (Some(range), Some(year)) => year >= range.start && year <= range.end,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let component_ok = config.components.is_empty()
            || components
                .get(idx)
                .is_some_and(|component| config.components.iter().any(|c| c.as_str() == component));
        mask.push(year_ok && component_ok);
    }

    Ok(df.filter(&BooleanChunked::from_slice("mask".into(), &mask))?)
}
