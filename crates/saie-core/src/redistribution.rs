use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema::{self, Flag};

/// Relative tolerance for comparing group sums before and after adjustment.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// A group whose surplus/deficit could not be absorbed by its free members
/// without producing a negative value. The best-effort clamped values are
/// kept in the output and the group no longer satisfies the
/// total-preservation invariant.
#[derive(Debug, Clone, Serialize)]
pub struct RedistributionFailure {
    pub lad_code: String,
    pub year: i32,
    pub component: String,
    /// Portion of the delta left unabsorbed when the group was abandoned.
    pub residual: f64,
    pub reason: String,
}

pub struct RedistributionOutcome {
    pub dataframe: DataFrame,
    pub failures: Vec<RedistributionFailure>,
}

/// Restores each group's control total after the estimator has fixed the
/// confirmed outliers' replacement values.
///
/// Per (lad, year, component) group: confirmed records with an imputed
/// value are `Fixed` inputs; everyone else is `Free` and starts from its
/// observed value. The difference between the original group total and the
/// post-imputation sum is spread across the free members in proportion to
/// their value share of the free subtotal, falling back to an even split
/// when that subtotal is zero.
///
/// Negative results are disallowed unless `accept_negatives` is set: a
/// clamping loop pins negative members to zero, drops them from the free
/// set and re-spreads the residual over the members still standing. The
/// loop shrinks the free set every pass, so it runs at most group-size
/// iterations. If everyone ends up pinned while a residual remains, the
/// group is reported infeasible.
pub fn redistribute(df: &DataFrame, accept_negatives: bool) -> Result<RedistributionOutcome> {
    let len = df.height();

    let lad_codes = df.column(schema::LAD_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let values = df.column(schema::VALUE)?.f64()?;
    let flags = df.column(schema::FLAG)?.str()?;
    let imputed = df.column(schema::IMPUTED_VALUE)?.f64()?;

    let mut groups: HashMap<(String, i32, String), Vec<usize>> = HashMap::new();
    for idx in 0..len {
        let (Some(lad), Some(year), Some(component)) =
            (lad_codes.get(idx), years.get(idx), components.get(idx))
        else {
            continue;
        };
        groups
            .entry((lad.to_string(), year, component.to_string()))
            .or_default()
            .push(idx);
    }

    let mut adjusted: Vec<Option<f64>> = vec![None; len];
    let mut failures: Vec<RedistributionFailure> = Vec::new();

    for ((lad, year, component), indices) in &groups {
        let mut fixed: Vec<(usize, f64)> = Vec::new();
        let mut free: Vec<(usize, f64)> = Vec::new();
        let mut unresolved = false;
        let mut total = 0.0;

        for &idx in indices {
            let Some(value) = values.get(idx) else {
                continue;
            };
            total += value;
            if flags.get(idx) == Some(Flag::Confirmed.as_str()) {
                match imputed.get(idx) {
                    Some(replacement) => fixed.push((idx, replacement)),
                    // Estimation failed for this record; without a
                    // replacement the group cannot be balanced coherently,
                    // so it passes through unadjusted.
                    None => unresolved = true,
                }
            } else {
                free.push((idx, value));
            }
        }

        if unresolved {
            for &(idx, value) in &free {
                adjusted[idx] = Some(value);
            }
            continue;
        }

        if fixed.is_empty() {
            // Untouched group: identity, exactly.
            for &(idx, value) in &free {
                adjusted[idx] = Some(value);
            }
            continue;
        }

        for &(idx, replacement) in &fixed {
            adjusted[idx] = Some(replacement);
        }

        let fixed_sum: f64 = fixed.iter().map(|(_, replacement)| replacement).sum();
        let target = total - fixed_sum;

        if free.is_empty() {
            if !within_tolerance(target, 0.0) {
                failures.push(RedistributionFailure {
                    lad_code: lad.clone(),
                    year: *year,
                    component: component.clone(),
                    residual: target,
                    reason: "no unflagged members left to absorb the delta".to_string(),
                });
            }
            continue;
        }

        if let Some(residual) =
            spread_over_free(&free, target, accept_negatives, &mut adjusted)
        {
            failures.push(RedistributionFailure {
                lad_code: lad.clone(),
                year: *year,
                component: component.clone(),
                residual,
                reason: "every free member clamped to zero before the delta was absorbed"
                    .to_string(),
            });
        }
    }

    let mut output = df.clone();
    output.with_column(Series::new(schema::ADJUSTED_VALUE.into(), adjusted))?;

    Ok(RedistributionOutcome {
        dataframe: output,
        failures,
    })
}

/// Fixed-point clamping loop. Writes each free member's adjusted value and
/// returns the unabsorbed residual if the group turned out infeasible.
fn spread_over_free(
    free: &[(usize, f64)],
    target: f64,
    accept_negatives: bool,
    adjusted: &mut [Option<f64>],
) -> Option<f64> {
    let mut remaining: Vec<(usize, f64)> = free.to_vec();

    // Each pass either finishes or pins at least one member, so group size
    // bounds the iteration count.
    for _pass in 0..=free.len() {
        let base_sum: f64 = remaining.iter().map(|(_, value)| value).sum();
        let delta = target - base_sum;

        if base_sum == 0.0 {
            let share = delta / remaining.len() as f64;
            for &(idx, value) in &remaining {
                adjusted[idx] = Some(value + share);
            }
        } else {
            for &(idx, value) in &remaining {
                adjusted[idx] = Some(value + delta * value / base_sum);
            }
        }

        if accept_negatives {
            return None;
        }

        let mut still_free: Vec<(usize, f64)> = Vec::with_capacity(remaining.len());
        for &(idx, value) in &remaining {
            if adjusted[idx].is_some_and(|result| result < 0.0) {
                adjusted[idx] = Some(0.0);
            } else {
                still_free.push((idx, value));
            }
        }

        if still_free.len() == remaining.len() {
            return None;
        }
        if still_free.is_empty() {
            return Some(target);
        }
        remaining = still_free;
    }

    Some(target)
}

fn within_tolerance(actual: f64, expected: f64) -> bool {
    let scale = expected.abs().max(1.0);
    (actual - expected).abs() <= SUM_TOLERANCE * scale
}
