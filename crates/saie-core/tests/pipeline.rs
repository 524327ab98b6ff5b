use polars::prelude::*;

use saie_core::config::{RunConfig, YearRange};
use saie_core::pipelines::{run_adjustment, run_flagging};
use saie_core::schema;

fn flagging_input() -> DataFrame {
    df!(
        schema::LSOA_CODE => ["E01000001", "E01000002", "E01000003", "E01000004", "E01000005"],
        schema::LAD_CODE => vec!["E08000001"; 5],
        schema::COMPONENT => vec!["wages"; 5],
        schema::YEAR => vec![2020i32; 5],
        schema::VALUE => [10.0, 11.0, 10.0, 11.0, 60.0],
    )
    .unwrap()
}

/// Three units, three years, one lad. Unit 1's 2019 value is the outlier
/// the reviewer accepted; unit 2's 2018 pending flag was declined.
fn reviewed_input() -> DataFrame {
    df!(
        schema::LSOA_CODE => ["E01000001", "E01000001", "E01000001",
                              "E01000002", "E01000002", "E01000002",
                              "E01000003", "E01000003", "E01000003"],
        schema::LAD_CODE => vec!["E08000001"; 9],
        schema::COMPONENT => vec!["wages"; 9],
        schema::YEAR => [2018i32, 2019, 2020, 2018, 2019, 2020, 2018, 2019, 2020],
        schema::VALUE => [100.0, 500.0, 200.0,
                          100.0, 100.0, 100.0,
                          150.0, 150.0, 150.0],
        schema::FLAG => [None, Some("PENDING"), None,
                         Some("PENDING"), None, None,
                         None, None, None],
        schema::ADJUST => [None, Some(true), None,
                           Some(false), None, None,
                           None, None, None],
    )
    .unwrap()
}

#[test]
fn flagging_annotates_outliers_as_pending() {
    let mut config = RunConfig::default();
    config.zscore.lower_threshold = -1.5;
    config.zscore.upper_threshold = 1.5;
    config.iqr.enabled = false;

    let output = run_flagging(&flagging_input(), &config).unwrap();
    let flags = output.dataframe.column(schema::FLAG).unwrap().str().unwrap();

    assert_eq!(flags.get(4), Some("PENDING"));
    for idx in 0..4 {
        assert!(flags.get(idx).is_none());
    }
    assert_eq!(output.summary.total_rows, 5);
    assert_eq!(output.summary.flagged_rows, 1);
    assert_eq!(output.summary.group_count, 1);

    // Values are annotated, never modified.
    let values = output.dataframe.column(schema::VALUE).unwrap().f64().unwrap();
    assert_eq!(values.get(4), Some(60.0));
}

#[test]
fn flagging_respects_year_and_component_scope() {
    let df = df!(
        schema::LSOA_CODE => vec!["E01000001"; 4],
        schema::LAD_CODE => vec!["E08000001"; 4],
        schema::COMPONENT => ["wages", "wages", "rents", "wages"],
        schema::YEAR => [2018i32, 2020, 2020, 2030],
        schema::VALUE => [1.0, 2.0, 3.0, 4.0],
    )
    .unwrap();

    let mut config = RunConfig::default();
    config.years = Some(YearRange {
        start: 2019,
        end: 2025,
    });
    config.components = vec!["wages".to_string()];

    let output = run_flagging(&df, &config).unwrap();
    assert_eq!(output.dataframe.height(), 1);

    let years = output.dataframe.column(schema::YEAR).unwrap().i32().unwrap();
    assert_eq!(years.get(0), Some(2020));
}

#[test]
fn invalid_config_aborts_before_processing() {
    let mut config = RunConfig::default();
    config.iqr.lower_quantile = 0.9;
    config.iqr.upper_quantile = 0.1;

    assert!(run_flagging(&flagging_input(), &config).is_err());
}

#[test]
fn adjustment_preserves_group_totals() {
    let mut config = RunConfig::default();
    config.zscore.enabled = false;
    config.iqr.enabled = false;

    let output = run_adjustment(&reviewed_input(), &config, None).unwrap();
    let summary = &output.summary;
    assert_eq!(summary.confirmed_rows, 1);
    assert!(summary.estimation_failures.is_empty());
    assert!(summary.redistribution_failures.is_empty());

    let df = &output.dataframe;
    let years = df.column(schema::YEAR).unwrap().i32().unwrap();
    let values = df.column(schema::VALUE).unwrap().f64().unwrap();
    let adjusted = df.column(schema::ADJUSTED_VALUE).unwrap().f64().unwrap();
    let imputed = df.column(schema::IMPUTED_VALUE).unwrap().f64().unwrap();

    // The accepted outlier is replaced by its interpolated estimate.
    assert_eq!(imputed.get(1), Some(150.0));
    assert_eq!(adjusted.get(1), Some(150.0));

    // Every yearly group still sums to its control total.
    for target_year in [2018, 2019, 2020] {
        let mut expected = 0.0;
        let mut actual = 0.0;
        for idx in 0..df.height() {
            if years.get(idx) == Some(target_year) {
                expected += values.get(idx).unwrap();
                actual += adjusted.get(idx).unwrap();
            }
        }
        assert!(
            (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0),
            "group total drifted for {target_year}: {actual} vs {expected}"
        );
    }

    // 2019: delta 350 spread over free values {100, 150}.
    assert!((adjusted.get(4).unwrap() - 240.0).abs() < 1e-9);
    assert!((adjusted.get(7).unwrap() - 360.0).abs() < 1e-9);
}

#[test]
fn declined_flags_revert_and_pass_through() {
    let mut config = RunConfig::default();
    config.zscore.enabled = false;
    config.iqr.enabled = false;

    let output = run_adjustment(&reviewed_input(), &config, None).unwrap();
    let df = &output.dataframe;

    let flags = df.column(schema::FLAG).unwrap().str().unwrap();
    let adjusted = df.column(schema::ADJUSTED_VALUE).unwrap().f64().unwrap();

    // Unit 2's declined 2018 flag reverted to unflagged and the record kept
    // its value through the untouched 2018 group.
    assert!(flags.get(3).is_none());
    assert_eq!(adjusted.get(3), Some(100.0));
}

#[test]
fn untouched_table_is_an_identity_transform() {
    let df = df!(
        schema::LSOA_CODE => ["E01000001", "E01000002"],
        schema::LAD_CODE => vec!["E08000001"; 2],
        schema::COMPONENT => vec!["wages"; 2],
        schema::YEAR => vec![2020i32; 2],
        schema::VALUE => [100.0, 200.0],
        schema::FLAG => [None::<&str>, None],
        schema::ADJUST => [None::<bool>, None],
    )
    .unwrap();

    let config = RunConfig::default();
    let output = run_adjustment(&df, &config, None).unwrap();

    let values = output.dataframe.column(schema::VALUE).unwrap().f64().unwrap();
    let adjusted = output
        .dataframe
        .column(schema::ADJUSTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();
    for idx in 0..output.dataframe.height() {
        assert_eq!(adjusted.get(idx), values.get(idx));
    }
}

#[test]
fn accept_decision_on_unflagged_record_is_fatal() {
    let df = df!(
        schema::LSOA_CODE => ["E01000001", "E01000002"],
        schema::LAD_CODE => vec!["E08000001"; 2],
        schema::COMPONENT => vec!["wages"; 2],
        schema::YEAR => vec![2020i32; 2],
        schema::VALUE => [100.0, 200.0],
        schema::FLAG => [None::<&str>, None],
        schema::ADJUST => [Some(true), None],
    )
    .unwrap();

    let config = RunConfig::default();
    let err = run_adjustment(&df, &config, None).unwrap_err();
    assert!(err.to_string().contains("unflagged"));
}

#[test]
fn estimation_failures_leave_records_unresolved_without_aborting() {
    // Unit 1 has a single trusted year, so its confirmed 2019 outlier can't
    // be estimated; unit 2's group in 2019 passes through while the run
    // completes and reports the failure.
    let df = df!(
        schema::LSOA_CODE => ["E01000001", "E01000001", "E01000002", "E01000002"],
        schema::LAD_CODE => vec!["E08000001"; 4],
        schema::COMPONENT => vec!["wages"; 4],
        schema::YEAR => [2018i32, 2019, 2018, 2019],
        schema::VALUE => [100.0, 900.0, 100.0, 100.0],
        schema::FLAG => [None, Some("PENDING"), None, None],
        schema::ADJUST => [None, Some(true), None, None],
    )
    .unwrap();

    let config = RunConfig::default();
    let output = run_adjustment(&df, &config, None).unwrap();

    assert_eq!(output.summary.estimation_failures.len(), 1);
    assert_eq!(output.summary.estimation_failures[0].lsoa_code, "E01000001");

    let adjusted = output
        .dataframe
        .column(schema::ADJUSTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();
    assert_eq!(adjusted.get(1), None);
    assert_eq!(adjusted.get(3), Some(100.0));
}

#[test]
fn rollup_is_attached_when_a_mapping_is_supplied() {
    use saie_core::aggregation::GeoMapping;

    let mut config = RunConfig::default();
    config.zscore.enabled = false;
    config.iqr.enabled = false;

    let mapping = GeoMapping::from_pairs([
        ("E01000001", "E08000001"),
        ("E01000002", "E08000001"),
    ]);

    let df = df!(
        schema::LSOA_CODE => ["E01000001", "E01000002", "E01000003"],
        schema::LAD_CODE => vec!["E08000001"; 3],
        schema::COMPONENT => vec!["wages"; 3],
        schema::YEAR => vec![2020i32; 3],
        schema::VALUE => [100.0, 200.0, 50.0],
        schema::FLAG => [None::<&str>, None, None],
        schema::ADJUST => [None::<bool>, None, None],
    )
    .unwrap();

    let output = run_adjustment(&df, &config, Some(&mapping)).unwrap();
    let parent_totals = output.parent_totals.expect("rollup present");

    let totals = parent_totals
        .column(schema::ADJUSTED_VALUE)
        .unwrap()
        .f64()
        .unwrap();
    assert!((totals.get(0).unwrap() - 300.0).abs() < 1e-9);

    assert_eq!(output.summary.unmapped_codes.len(), 1);
    assert_eq!(output.summary.unmapped_codes[0].lsoa_code, "E01000003");
}
