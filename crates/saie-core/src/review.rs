use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::schema::{self, Flag};

/// Folds the reviewer's adjust decisions into the flag column.
///
/// Pending flags the reviewer accepted become `CONFIRMED`; declined ones
/// revert to unflagged, so the estimator treats those years as trusted
/// again. An accept decision on a record the detector never flagged means
/// the reviewed artifact is out of sync with the flagged table, which is a
/// fatal input error rather than something to quietly absorb.
pub fn apply_review_decisions(df: &DataFrame) -> Result<DataFrame> {
    let len = df.height();

    let lsoa_codes = df.column(schema::LSOA_CODE)?.str()?;
    let years = df.column(schema::YEAR)?.i32()?;
    let flags = df.column(schema::FLAG)?.str()?;
    let adjusts = df.column(schema::ADJUST)?.bool()?;

    let mut reconciled: Vec<Option<&str>> = Vec::with_capacity(len);

    for idx in 0..len {
        let flag = match flags.get(idx) {
            Some(raw) => Some(Flag::from_str(raw)?),
            None => None,
        };
        let accepted = adjusts.get(idx).unwrap_or(false);

        let resolved = match (flag, accepted) {
            (Some(Flag::Pending), true) | (Some(Flag::Confirmed), _) => {
                Some(Flag::Confirmed.as_str())
            }
            (Some(Flag::Pending), false) => None,
            (None, true) => {
                return Err(PipelineError::Processing(format!(
                    "adjust decision on unflagged record {} year {}",
                    lsoa_codes.get(idx).unwrap_or("?"),
                    years.get(idx).map_or_else(|| "?".to_string(), |y| y.to_string()),
                )));
            }
            (None, false) => None,
        };
        reconciled.push(resolved);
    }

    let mut output = df.clone();
    output.with_column(Series::new(schema::FLAG.into(), reconciled))?;
    Ok(output)
}
