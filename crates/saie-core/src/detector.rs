use std::collections::HashMap;

use polars::prelude::*;

use crate::config::{IqrConfig, RunConfig, ZScoreConfig};
use crate::error::Result;
use crate::schema::{self, Flag};

const ZSCORE_BELOW_LOWER: &str = "zscore_below_lower_threshold";
const ZSCORE_ABOVE_UPPER: &str = "zscore_above_upper_threshold";
const VALUE_BELOW_IQR: &str = "value_below_iqr_lower_bound";
const VALUE_ABOVE_IQR: &str = "value_above_iqr_upper_bound";

/// Flags statistically implausible records within each (lad, year, component)
/// group. A record is flagged when any enabled method fires; the detector
/// only ever writes `PENDING` — confirmation is a downstream review decision.
///
/// Values are never modified here, only annotated.
pub fn flag_outliers(df: &DataFrame, config: &RunConfig) -> Result<DataFrame> {
    let len = df.height();

    let lad_codes = df.column(schema::LAD_CODE)?.str()?;
    let components = df.column(schema::COMPONENT)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let values = df.column(schema::VALUE)?.f64()?;

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

    let mut zscores: Vec<Option<f64>> = vec![None; len];
    let mut iqr_lower: Vec<Option<f64>> = vec![None; len];
    let mut iqr_upper: Vec<Option<f64>> = vec![None; len];
    let mut reasons: Vec<Vec<&'static str>> = vec![Vec::new(); len];

    for indices in groups.values() {
        let members: Vec<(usize, f64)> = indices
            .iter()
            .filter_map(|&idx| values.get(idx).map(|value| (idx, value)))
            .collect();

        if config.zscore.enabled {
            apply_zscore(&members, &config.zscore, &mut zscores, &mut reasons);
        }
        if config.iqr.enabled {
            apply_iqr(
                &members,
                &config.iqr,
                &mut iqr_lower,
                &mut iqr_upper,
                &mut reasons,
            );
        }
    }

    let mut flags: Vec<Option<&str>> = Vec::with_capacity(len);
    let mut reason_strings: Vec<Option<String>> = Vec::with_capacity(len);
    for row_reasons in &reasons {
        if row_reasons.is_empty() {
            flags.push(None);
            reason_strings.push(None);
        } else {
            flags.push(Some(Flag::Pending.as_str()));
            reason_strings.push(Some(row_reasons.join("|")));
        }
    }

    let mut output = df.clone();
    output.with_column(Series::new(schema::ZSCORE.into(), zscores))?;
    output.with_column(Series::new(schema::IQR_LOWER_BOUND.into(), iqr_lower))?;
    output.with_column(Series::new(schema::IQR_UPPER_BOUND.into(), iqr_upper))?;
    output.with_column(Series::new(schema::FLAG.into(), flags))?;
    output.with_column(Series::new(schema::FLAG_REASON.into(), reason_strings))?;

    Ok(output)
}

/// Sample statistics (ddof = 1). A group without dispersion cannot flag:
/// sigma = 0 or fewer than two members leaves every z-score null.
fn apply_zscore(
    members: &[(usize, f64)],
    config: &ZScoreConfig,
    zscores: &mut [Option<f64>],
    reasons: &mut [Vec<&'static str>],
) {
    let n = members.len();
    if n < 2 {
        return;
    }

    let mean = members.iter().map(|(_, value)| value).sum::<f64>() / n as f64;
    let variance = members
        .iter()
        .map(|(_, value)| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let sigma = variance.sqrt();
    if sigma == 0.0 {
        return;
    }

    for &(idx, value) in members {
        let z = (value - mean) / sigma;
        zscores[idx] = Some(z);
        if z < config.lower_threshold {
            reasons[idx].push(ZSCORE_BELOW_LOWER);
        } else if z > config.upper_threshold {
            reasons[idx].push(ZSCORE_ABOVE_UPPER);
        }
    }
}

/// Flags strictly outside [q_lo - m*IQR, q_hi + m*IQR]; a value exactly on a
/// bound is kept. With IQR = 0 the bounds collapse to a single point and
/// everything not equal to it is flagged, which is the same comparison.
fn apply_iqr(
    members: &[(usize, f64)],
    config: &IqrConfig,
    iqr_lower: &mut [Option<f64>],
    iqr_upper: &mut [Option<f64>],
    reasons: &mut [Vec<&'static str>],
) {
    if members.is_empty() {
        return;
    }

    let mut sorted: Vec<f64> = members.iter().map(|(_, value)| *value).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q_lo = quantile_linear(&sorted, config.lower_quantile);
    let q_hi = quantile_linear(&sorted, config.upper_quantile);
    let iqr = q_hi - q_lo;
    let lower_bound = q_lo - config.multiplier * iqr;
    let upper_bound = q_hi + config.multiplier * iqr;

    for &(idx, value) in members {
        iqr_lower[idx] = Some(lower_bound);
        iqr_upper[idx] = Some(upper_bound);
        if value < lower_bound {
            reasons[idx].push(VALUE_BELOW_IQR);
        } else if value > upper_bound {
            reasons[idx].push(VALUE_ABOVE_IQR);
        }
    }
}

/// Quantile by linear interpolation between order statistics, matching the
/// convention of the dataframe stacks this data has historically flowed
/// through.
fn quantile_linear(sorted: &[f64], quantile: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * quantile;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let fraction = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
}
