use std::io::Write;

use polars::prelude::*;

use saie_core::ingestion::read_records_csv;
use saie_core::outputs::write_records_csv;
use saie_core::schema;

fn write_temp_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write csv");
    file
}

#[test]
fn reads_raw_records_without_review_columns() {
    let file = write_temp_csv(
        "lsoa_code,lad_code,component,year,value\n\
         E01000001,E08000001,wages,2020,10.5\n\
         E01000002,E08000001,wages,2020,-3.25\n",
    );

    let df = read_records_csv(file.path(), false).unwrap();
    assert_eq!(df.height(), 2);

    let values = df.column(schema::VALUE).unwrap().f64().unwrap();
    assert_eq!(values.get(0), Some(10.5));
    assert_eq!(values.get(1), Some(-3.25));

    let flags = df.column(schema::FLAG).unwrap().str().unwrap();
    assert!(flags.get(0).is_none());
}

#[test]
fn reviewed_table_requires_flag_and_adjust_columns() {
    let file = write_temp_csv(
        "lsoa_code,lad_code,component,year,value\n\
         E01000001,E08000001,wages,2020,10.5\n",
    );

    let err = read_records_csv(file.path(), true).unwrap_err();
    assert!(err.to_string().contains("flag"));
}

#[test]
fn reviewer_spellings_of_adjust_are_accepted() {
    let file = write_temp_csv(
        "lsoa_code,lad_code,component,year,value,flag,adjust\n\
         E01000001,E08000001,wages,2020,10.5,PENDING,y\n\
         E01000002,E08000001,wages,2020,11.0,PENDING,N\n\
         E01000003,E08000001,wages,2020,12.0,,\n",
    );

    let df = read_records_csv(file.path(), true).unwrap();
    let adjusts = df.column(schema::ADJUST).unwrap().bool().unwrap();
    assert_eq!(adjusts.get(0), Some(true));
    assert_eq!(adjusts.get(1), Some(false));
    assert_eq!(adjusts.get(2), None);
}

#[test]
fn unparseable_year_is_a_clear_error() {
    let file = write_temp_csv(
        "lsoa_code,lad_code,component,year,value\n\
         E01000001,E08000001,wages,twenty20,10.5\n",
    );

    let err = read_records_csv(file.path(), false).unwrap_err();
    assert!(err.to_string().contains("year"));
}

#[test]
fn written_tables_read_back_identically() {
    let df = df!(
        schema::LSOA_CODE => ["E01000001", "E01000002"],
        schema::LAD_CODE => ["E08000001", "E08000001"],
        schema::COMPONENT => ["wages", "wages"],
        schema::YEAR => [2020i32, 2020],
        schema::VALUE => [10.5, 11.0],
        schema::FLAG => [Some("PENDING"), None],
        schema::FLAG_REASON => [Some("zscore_above_upper_threshold"), None],
    )
    .unwrap();

    let file = tempfile::NamedTempFile::new().expect("temp file");
    write_records_csv(&df, file.path()).unwrap();
    let read_back = read_records_csv(file.path(), false).unwrap();

    assert_eq!(read_back.height(), 2);
    let flags = read_back.column(schema::FLAG).unwrap().str().unwrap();
    assert_eq!(flags.get(0), Some("PENDING"));
    assert!(flags.get(1).is_none());

    let values = read_back.column(schema::VALUE).unwrap().f64().unwrap();
    assert_eq!(values.get(0), Some(10.5));
}
