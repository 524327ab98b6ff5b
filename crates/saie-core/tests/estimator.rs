use polars::prelude::*;

use saie_core::estimator::estimate_replacements;
use saie_core::schema;

fn series_df(years: &[i32], values: &[f64], flags: &[Option<&str>]) -> DataFrame {
    df!(
        schema::LSOA_CODE => vec!["E01000001"; years.len()],
        schema::LAD_CODE => vec!["E08000001"; years.len()],
        schema::COMPONENT => vec!["wages"; years.len()],
        schema::YEAR => years.to_vec(),
        schema::VALUE => values.to_vec(),
        schema::FLAG => flags.to_vec(),
    )
    .unwrap()
}

#[test]
fn interpolates_between_straddling_trusted_years() {
    let df = series_df(
        &[2018, 2019, 2020],
        &[100.0, 900.0, 200.0],
        &[None, Some("CONFIRMED"), None],
    );

    let outcome = estimate_replacements(&df).unwrap();
    let imputed = outcome
        .dataframe
        .column(schema::IMPUTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(imputed.get(0), None);
    assert_eq!(imputed.get(1), Some(150.0));
    assert_eq!(imputed.get(2), None);
}

#[test]
fn extrapolates_forward_from_last_two_trusted_years() {
    let df = series_df(
        &[2018, 2019, 2020],
        &[100.0, 120.0, 900.0],
        &[None, None, Some("CONFIRMED")],
    );

    let outcome = estimate_replacements(&df).unwrap();
    let imputed = outcome
        .dataframe
        .column(schema::IMPUTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();

    assert_eq!(imputed.get(2), Some(140.0));
}

#[test]
fn extrapolates_backward_from_first_two_trusted_years() {
    let df = series_df(
        &[2019, 2020, 2021],
        &[900.0, 100.0, 120.0],
        &[Some("CONFIRMED"), None, None],
    );

    let outcome = estimate_replacements(&df).unwrap();
    let imputed = outcome
        .dataframe
        .column(schema::IMPUTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();

    assert_eq!(imputed.get(0), Some(80.0));
}

#[test]
fn fewer_than_two_trusted_points_is_a_recorded_failure() {
    let df = series_df(
        &[2019, 2020],
        &[900.0, 100.0],
        &[Some("CONFIRMED"), None],
    );

    let outcome = estimate_replacements(&df).unwrap();
    let imputed = outcome
        .dataframe
        .column(schema::IMPUTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();

    assert_eq!(imputed.get(0), None);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.lsoa_code, "E01000001");
    assert_eq!(failure.year, 2019);
    assert!(failure.reason.contains("trusted observation"));
}

#[test]
fn series_are_keyed_by_unit_and_component() {
    // The same unit carries two components; only the flagged component's own
    // series feeds its estimate.
    let df = df!(
        schema::LSOA_CODE => vec!["E01000001"; 6],
        schema::LAD_CODE => vec!["E08000001"; 6],
        schema::COMPONENT => ["wages", "wages", "wages", "rents", "rents", "rents"],
        schema::YEAR => [2018i32, 2019, 2020, 2018, 2019, 2020],
        schema::VALUE => [100.0, 900.0, 200.0, 10.0, 20.0, 30.0],
        schema::FLAG => [None, Some("CONFIRMED"), None, None, None, None],
    )
    .unwrap();

    let outcome = estimate_replacements(&df).unwrap();
    let imputed = outcome
        .dataframe
        .column(schema::IMPUTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();

    assert_eq!(imputed.get(1), Some(150.0));
    for idx in [0, 2, 3, 4, 5] {
        assert_eq!(imputed.get(idx), None);
    }
}
