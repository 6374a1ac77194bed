use school_econ_merge::ingestion::csv::{read_csv_from_path, read_csv_from_reader};
use school_econ_merge::ingestion::{read_source, ReadOptions, SourceFormat, SourceSpec};
use school_econ_merge::types::{DataType, Field, Schema, Value};
use school_econ_merge::PipelineError;

fn people_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("name", DataType::Utf8),
        Field::new("score", DataType::Float64),
        Field::new("active", DataType::Bool),
    ])
}

fn econ_schema() -> Schema {
    Schema::new(vec![
        Field::new("GEO_ID", DataType::Utf8),
        Field::new("DP03_0005E", DataType::Int64),
        Field::new("DP03_0003E", DataType::Int64),
    ])
}

fn reader(input: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes())
}

#[test]
fn read_csv_from_path_happy_path() {
    let ds = read_csv_from_path("tests/fixtures/people.csv", &people_schema(), &ReadOptions::default()).unwrap();

    assert_eq!(ds.row_count(), 2);
    assert_eq!(
        ds.rows[0],
        vec![
            Value::Int64(1),
            Value::Utf8("Ada".to_string()),
            Value::Float64(98.5),
            Value::Bool(true),
        ]
    );
}

#[test]
fn read_csv_allows_reordered_and_extra_columns() {
    let input = "name,extra,id,active,score\nAda,x,1,true,98.5\n";
    let ds = read_csv_from_reader(&mut reader(input), &people_schema(), &ReadOptions::default()).unwrap();

    assert_eq!(ds.row_count(), 1);
    assert_eq!(ds.schema, people_schema());
    assert_eq!(ds.rows[0][0], Value::Int64(1));
    assert_eq!(ds.rows[0][1], Value::Utf8("Ada".to_string()));
}

#[test]
fn read_csv_errors_on_missing_required_column() {
    let input = "id,name,score\n1,Ada,98.5\n";
    let err = read_csv_from_reader(&mut reader(input), &people_schema(), &ReadOptions::default()).unwrap_err();

    assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    assert!(err.to_string().contains("missing required column 'active'"));
}

#[test]
fn read_csv_errors_on_type_parse() {
    let input = "id,name,score,active\nnot_an_int,Ada,98.5,true\n";
    let err = read_csv_from_reader(&mut reader(input), &people_schema(), &ReadOptions::default()).unwrap_err();

    match err {
        PipelineError::ParseError { row, column, raw, .. } => {
            assert_eq!(row, 2);
            assert_eq!(column, "id");
            assert_eq!(raw, "not_an_int");
        }
        other => panic!("expected ParseError, got {other:?}"),
    }
}

#[test]
fn skip_rows_drops_the_census_label_row() {
    let options = ReadOptions {
        skip_rows: 1,
        coerce_invalid: true,
    };
    let ds = read_csv_from_path("tests/fixtures/econ_characteristics.csv", &econ_schema(), &options).unwrap();

    assert_eq!(ds.row_count(), 5);
    assert_eq!(ds.rows[0][0], Value::Utf8("8600000US60621".to_string()));
    assert_eq!(ds.rows[0][1], Value::Int64(3500));
}

#[test]
fn label_row_fails_to_parse_without_skip() {
    let err = read_csv_from_path(
        "tests/fixtures/econ_characteristics.csv",
        &econ_schema(),
        &ReadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::ParseError { row: 2, .. }));
}

#[test]
fn coerce_invalid_turns_junk_into_null() {
    let options = ReadOptions {
        skip_rows: 1,
        coerce_invalid: true,
    };
    let ds = read_csv_from_path("tests/fixtures/econ_characteristics.csv", &econ_schema(), &options).unwrap();

    // "(X)" in the 60614 row.
    assert_eq!(ds.rows[3][1], Value::Null);
    assert_eq!(ds.rows[3][2], Value::Int64(40000));
}

#[test]
fn empty_cells_read_as_null() {
    let input = "id,name,score,active\n1,,,\n";
    let ds = read_csv_from_reader(&mut reader(input), &people_schema(), &ReadOptions::default()).unwrap();
    assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Null, Value::Null, Value::Null]);
}

#[test]
fn read_source_reports_missing_file() {
    let spec = SourceSpec::new("tests/fixtures/does_not_exist.csv", people_schema());
    let err = read_source(&spec).unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound { .. }));
}

#[test]
fn read_source_rejects_duplicate_schema_columns() {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("id", DataType::Utf8),
    ]);
    let err = read_source(&SourceSpec::new("tests/fixtures/people.csv", schema)).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateColumn { column } if column == "id"));
}

#[test]
fn read_source_rejects_unknown_extension() {
    let spec = SourceSpec::new("Cargo.toml", people_schema());
    let err = read_source(&spec).unwrap_err();
    assert!(err.to_string().contains("cannot infer format"));
}

#[test]
fn text_cells_keep_their_whitespace() {
    let input = "id,name,score,active\n1, Chicago , 98.5 , true\n2,   ,,\n";
    let ds = read_csv_from_reader(&mut reader(input), &people_schema(), &ReadOptions::default()).unwrap();

    // Numbers and bools still parse through surrounding spaces.
    assert_eq!(
        ds.rows[0],
        vec![
            Value::Int64(1),
            Value::Utf8(" Chicago ".to_string()),
            Value::Float64(98.5),
            Value::Bool(true),
        ]
    );
    assert!(!ds.rows[0][1].matches(&Value::Utf8("Chicago".to_string())));
    // Whitespace-only text is still missing.
    assert_eq!(ds.rows[1][1], Value::Null);
}

#[test]
fn explicit_format_reads_files_without_a_csv_extension() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("school-econ-merge-people-{nanos}.txt"));
    std::fs::copy("tests/fixtures/people.csv", &path).unwrap();

    let inferred = read_source(&SourceSpec::new(&path, people_schema())).unwrap_err();
    assert!(inferred.to_string().contains("cannot infer format"));

    let ds = read_source(&SourceSpec::new(&path, people_schema()).with_format(SourceFormat::Csv)).unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[1][1], Value::Utf8("Grace".to_string()));
    let _ = std::fs::remove_file(&path);
}
