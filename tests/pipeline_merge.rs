use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use school_econ_merge::ingestion::SourceSpec;
use school_econ_merge::observability::Stage;
use school_econ_merge::pipeline::{JoinStep, Pipeline, PipelineConfig, PipelineOptions, SourceStep};
use school_econ_merge::processing::{JoinOptions, Predicate, Summary, SummaryKind};
use school_econ_merge::sink::SinkSpec;
use school_econ_merge::types::{DataType, Field, Schema, Value};
use school_econ_merge::PipelineError;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("school-econ-merge-{name}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_output(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let headers = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

fn proficiency_source(dir: &Path, name: &str, score: &str, body: &str) -> SourceStep {
    let path = dir.join(format!("{name}.csv"));
    std::fs::write(&path, format!("id,city,{score}\n{body}")).unwrap();
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("city", DataType::Utf8),
        Field::new(score, DataType::Int64),
    ]);
    SourceStep::new(name, SourceSpec::new(path, schema))
}

#[test]
fn left_join_on_two_keys_keeps_every_base_row() {
    let dir = tmp_dir("two-keys");
    let a = proficiency_source(&dir, "a", "ela", "1,Chicago,80\n2,Springfield,70\n");
    let b = proficiency_source(&dir, "b", "sci", "1,Chicago,90\n2,Chicago,65\n");
    let out = dir.join("merged.csv");

    let report = Pipeline::new(a, SinkSpec::csv(&out))
        .join(b, JoinStep::left("b", ["id", "city"]))
        .run()
        .unwrap();

    assert_eq!(report.output_rows, 2);
    assert_eq!(report.source_rows, vec![("a".to_string(), 2), ("b".to_string(), 2)]);

    let (headers, rows) = read_output(&out);
    assert_eq!(headers, ["id", "city", "ela", "sci"]);
    assert_eq!(rows[0], ["1", "Chicago", "80", "90"]);
    // (2, Springfield) has no partner: the right-side column holds the empty marker.
    assert_eq!(rows[1], ["2", "Springfield", "70", ""]);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn inner_join_drops_unmatched_rows() {
    let dir = tmp_dir("inner");
    let a = proficiency_source(&dir, "a", "ela", "1,Chicago,80\n2,Springfield,70\n");
    let b = proficiency_source(&dir, "b", "sci", "1,Chicago,90\n");
    let out = dir.join("merged.csv");

    let report = Pipeline::new(a, SinkSpec::csv(&out))
        .join(b, JoinStep::left("b", ["id", "city"]).with_options(JoinOptions::inner()))
        .run()
        .unwrap();

    assert_eq!(report.output_rows, 1);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn filter_on_missing_column_fails_before_writing() {
    let dir = tmp_dir("missing-column");
    let a = proficiency_source(&dir, "a", "ela", "1,Chicago,80\n")
        .filter(Predicate::equals("Level", Value::Utf8("School".to_string())));
    let out = dir.join("merged.csv");

    let err = Pipeline::new(a, SinkSpec::csv(&out)).run().unwrap_err();

    match &err {
        PipelineError::Stage {
            stage, source_name, ..
        } => {
            assert_eq!(*stage, Stage::Filter);
            assert_eq!(source_name.as_deref(), Some("a"));
        }
        other => panic!("expected stage error, got {other:?}"),
    }
    assert!(matches!(err.root(), PipelineError::ColumnNotFound { column, .. } if column == "Level"));
    assert!(err.to_string().contains("stage 'filter' (source 'a') failed"));
    assert!(!out.exists());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn missing_source_file_is_reported_from_the_read_stage() {
    let dir = tmp_dir("missing-source");
    let a = proficiency_source(&dir, "a", "ela", "1,Chicago,80\n");
    let schema = Schema::new(vec![Field::new("id", DataType::Int64)]);
    let b = SourceStep::new("b", SourceSpec::new(dir.join("nope.csv"), schema));
    let out = dir.join("merged.csv");

    let err = Pipeline::new(a, SinkSpec::csv(&out))
        .join(b, JoinStep::left("b", ["id"]))
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::Stage { stage: Stage::Read, .. }));
    assert!(matches!(err.root(), PipelineError::SourceNotFound { .. }));
    assert!(!out.exists());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn shared_non_key_column_is_a_schema_conflict() {
    let dir = tmp_dir("conflict");
    let a = proficiency_source(&dir, "a", "score", "1,Chicago,80\n");
    let b = proficiency_source(&dir, "b", "score", "1,Chicago,90\n");
    let out = dir.join("merged.csv");

    let err = Pipeline::new(a.clone(), SinkSpec::csv(&out))
        .join(b.clone(), JoinStep::left("b", ["id", "city"]))
        .run()
        .unwrap_err();
    assert!(matches!(err, PipelineError::Stage { stage: Stage::Join, .. }));
    assert!(matches!(err.root(), PipelineError::SchemaConflict { column, .. } if column == "score"));
    assert!(!out.exists());

    let report = Pipeline::new(a, SinkSpec::csv(&out))
        .join(b, JoinStep::left("b", ["id", "city"]).with_options(JoinOptions::left().with_suffix("_b")))
        .run()
        .unwrap();
    assert_eq!(report.output_rows, 1);
    let (headers, _) = read_output(&out);
    assert_eq!(headers, ["id", "city", "score", "score_b"]);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn invalid_wiring_is_rejected_before_reading() {
    let dir = tmp_dir("wiring");
    let schema = Schema::new(vec![Field::new("id", DataType::Int64)]);
    let a = SourceStep::new("a", SourceSpec::new(dir.join("a.csv"), schema.clone()));
    let b = SourceStep::new("b", SourceSpec::new(dir.join("b.csv"), schema));

    let err = Pipeline::new(a, SinkSpec::csv(dir.join("out.csv")))
        .join(b, JoinStep::left("c", ["id"]))
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::Stage { stage: Stage::Config, .. }));
    assert!(matches!(err.root(), PipelineError::InvalidConfig { .. }));
    let _ = std::fs::remove_dir_all(dir);
}

fn unemployment_rate(name: &str, source: Option<&str>) -> Summary {
    Summary {
        name: name.to_string(),
        source: source.map(str::to_string),
        kind: SummaryKind::RatioOfSums {
            numerator: "unemployed".to_string(),
            denominator: "workforce".to_string(),
            scale: 100.0,
        },
    }
}

#[test]
fn source_summary_counts_each_zip_once() {
    let dir = tmp_dir("zip-once");
    let schools = dir.join("schools.csv");
    std::fs::write(&schools, "id,zip_code\n1,60621\n2,60621\n3,60621\n4,60614\n").unwrap();
    let econ = dir.join("econ.csv");
    std::fs::write(&econ, "zip_code,unemployed,workforce\n60621,3000,10000\n60614,500,50000\n").unwrap();

    let schools = SourceStep::new(
        "schools",
        SourceSpec::new(
            schools,
            Schema::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("zip_code", DataType::Int64),
            ]),
        ),
    );
    let econ = SourceStep::new(
        "econ",
        SourceSpec::new(
            econ,
            Schema::new(vec![
                Field::new("zip_code", DataType::Int64),
                Field::new("unemployed", DataType::Int64),
                Field::new("workforce", DataType::Int64),
            ]),
        ),
    );

    let report = Pipeline::new(schools, SinkSpec::csv(dir.join("merged.csv")))
        .join(econ, JoinStep::left("econ", ["zip_code"]))
        .summary(unemployment_rate("per_school", None))
        .summary(unemployment_rate("per_zip", Some("econ")))
        .run()
        .unwrap();

    assert_eq!(report.output_rows, 4);
    // Three schools share 60621, so the merged table counts that ZIP three times.
    assert!(approx(&report.summaries[0].1, 9500.0 / 80000.0 * 100.0));
    assert!(approx(&report.summaries[1].1, 3500.0 / 60000.0 * 100.0));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn summary_over_unknown_source_is_rejected() {
    let dir = tmp_dir("summary-source");
    let a = proficiency_source(&dir, "a", "ela", "1,Chicago,80\n");
    let out = dir.join("merged.csv");

    let err = Pipeline::new(a, SinkSpec::csv(&out))
        .summary(unemployment_rate("rate", Some("econ")))
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::Stage { stage: Stage::Config, .. }));
    assert!(matches!(
        err.root(),
        PipelineError::InvalidConfig { message } if message.contains("references unknown source 'econ'")
    ));
    assert!(!out.exists());
    let _ = std::fs::remove_dir_all(dir);
}

const CHAIN_CONFIG: &str = r#"{
    "sources": [
        {
            "name": "ela_math",
            "path": "ela_math.csv",
            "columns": [
                {"name": "RCDTS", "type": "utf8"},
                {"name": "School Name", "type": "utf8"},
                {"name": "City", "type": "utf8"},
                {"name": "Level", "type": "utf8"},
                {"name": "% ELA Proficiency", "type": "float64"}
            ],
            "derive": [
                {"name": "RCDTS_clean", "normalize": {"source": "RCDTS", "steps": [{"remove_chars": "-"}]}}
            ],
            "filters": [
                {"column": "City", "equals": "Chicago"},
                {"column": "Level", "equals": "School"}
            ],
            "select": ["RCDTS", "School Name", "City", "% ELA Proficiency", "RCDTS_clean"]
        },
        {
            "name": "science",
            "path": "science.csv",
            "columns": [
                {"name": "RCDTS", "type": "utf8"},
                {"name": "School Name", "type": "utf8"},
                {"name": "City", "type": "utf8"},
                {"name": "% Science Proficiency", "type": "float64"}
            ],
            "coerce_invalid": true,
            "filters": [{"column": "City", "equals": "Chicago"}]
        },
        {
            "name": "directory",
            "path": "directory.csv",
            "columns": [
                {"name": "RCD", "type": "utf8"},
                {"name": "Type", "type": "utf8"},
                {"name": "School", "type": "utf8"},
                {"name": "Zip", "type": "utf8"}
            ],
            "derive": [
                {"name": "RCDTS_clean", "concat": {"columns": ["RCD", "Type", "School"]}},
                {"name": "zip_code", "normalize": {"source": "Zip", "steps": [{"leading_digits": 5}, "to_int64"]}}
            ],
            "select": ["RCDTS_clean", "zip_code"]
        },
        {
            "name": "econ",
            "path": "econ_characteristics.csv",
            "columns": [
                {"name": "GEO_ID", "type": "utf8"},
                {"name": "DP03_0005E", "type": "int64"},
                {"name": "DP03_0003E", "type": "int64"},
                {"name": "DP03_0119PE", "type": "float64"}
            ],
            "skip_rows": 1,
            "coerce_invalid": true,
            "rename": [
                {"from": "DP03_0005E", "to": "unemployed"},
                {"from": "DP03_0003E", "to": "workforce"},
                {"from": "DP03_0119PE", "to": "poverty_pct"}
            ],
            "derive": [
                {"name": "unemployment_pct", "percentage": {"numerator": "unemployed", "denominator": "workforce"}},
                {"name": "zip_code", "normalize": {"source": "GEO_ID", "steps": [{"after_token": "US"}, "to_int64"]}}
            ],
            "filters": [{"column": "zip_code", "in": [60621, 60636, 60647, 60614]}],
            "select": ["zip_code", "unemployed", "workforce", "unemployment_pct", "poverty_pct"]
        }
    ],
    "joins": [
        {"right": "science", "on": ["RCDTS", "School Name", "City"]},
        {"right": "directory", "on": ["RCDTS_clean"]},
        {"right": "econ", "on": ["zip_code"]}
    ],
    "output": {"path": "OUTPUT_PATH", "null_marker": "NA"},
    "summaries": [
        {"name": "unemployment_rate", "ratio_of_sums": {"numerator": "unemployed", "denominator": "workforce"}},
        {"name": "poverty_weighted", "weighted_mean": {"value": "poverty_pct", "weight": "workforce"}},
        {"name": "schools", "column": {"column": "RCDTS", "op": "count"}},
        {"name": "area_unemployment_rate", "source": "econ", "ratio_of_sums": {"numerator": "unemployed", "denominator": "workforce"}},
        {"name": "area_poverty_weighted", "source": "econ", "weighted_mean": {"value": "poverty_pct", "weight": "workforce"}}
    ]
}"#;

fn chain_pipeline(out: &Path, parallel: bool) -> Pipeline {
    let text = CHAIN_CONFIG.replace("OUTPUT_PATH", &out.display().to_string().replace('\\', "/"));
    let pipeline = PipelineConfig::from_json_str(&text, "tests/fixtures")
        .unwrap()
        .into_pipeline()
        .unwrap();
    let options = PipelineOptions {
        parallel_reads: parallel,
        ..pipeline.options.clone()
    };
    pipeline.with_options(options)
}

fn approx(value: &Value, expected: f64) -> bool {
    value.as_f64().is_some_and(|v| (v - expected).abs() < 1e-9)
}

#[test]
fn report_card_directory_and_census_chain() {
    let dir = tmp_dir("chain");
    let out = dir.join("out").join("merged.csv");

    let report = chain_pipeline(&out, false).run().unwrap();

    assert_eq!(
        report.source_rows,
        vec![
            ("ela_math".to_string(), 3),
            ("science".to_string(), 2),
            ("directory".to_string(), 4),
            ("econ".to_string(), 4),
        ]
    );
    assert_eq!(report.output_rows, 3);

    let (headers, rows) = read_output(&out);
    assert_eq!(
        headers,
        [
            "RCDTS",
            "School Name",
            "City",
            "% ELA Proficiency",
            "RCDTS_clean",
            "% Science Proficiency",
            "zip_code",
            "unemployed",
            "workforce",
            "unemployment_pct",
            "poverty_pct",
        ]
    );

    // Base row order survives every join.
    let names: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(names, ["Alpha Elementary", "Beta Academy", "Delta Middle"]);

    assert_eq!(rows[0][4], "150162990250001");
    assert_eq!(rows[0][5], "38.2");
    assert_eq!(rows[0][6], "60621");
    assert_eq!(rows[0][7], "3500");
    assert_eq!(rows[0][9], "25");
    // "*" in the science sheet was coerced to missing.
    assert_eq!(rows[1][5], "NA");
    assert_eq!(rows[1][6], "60636");
    // Delta has no ELA score and no science row, but its ZIP still brings census data.
    assert_eq!(rows[2][3], "NA");
    assert_eq!(rows[2][5], "NA");
    assert_eq!(rows[2][6], "60647");
    assert_eq!(rows[2][10], "10.5");

    let summary = |name: &str| {
        report
            .summaries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert!(approx(&summary("unemployment_rate"), 7000.0 / 74000.0 * 100.0));
    assert!(approx(
        &summary("poverty_weighted"),
        (40.2 * 14000.0 + 35.0 * 10000.0 + 10.5 * 50000.0) / 74000.0
    ));
    assert_eq!(summary("schools"), Value::Int64(3));
    // 60614 has no unemployed count, so only its poverty figure counts at the area level.
    assert!(approx(&summary("area_unemployment_rate"), 7000.0 / 74000.0 * 100.0));
    assert!(approx(
        &summary("area_poverty_weighted"),
        (40.2 * 14000.0 + 35.0 * 10000.0 + 10.5 * 50000.0 + 5.0 * 40000.0) / 114000.0
    ));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn parallel_reads_match_sequential_reads() {
    let dir = tmp_dir("parallel");
    let out = dir.join("merged.csv");

    let (sequential, seq_rows) = chain_pipeline(&out, false).build().unwrap();
    let (parallel, par_rows) = chain_pipeline(&out, true).build().unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(seq_rows, par_rows);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn bundled_config_is_well_formed() {
    let pipeline = PipelineConfig::from_path("config/chicago_schools.json")
        .unwrap()
        .into_pipeline()
        .unwrap();

    pipeline.validate().unwrap();
    assert_eq!(pipeline.sources.len(), 4);
    assert_eq!(pipeline.joins.len(), 3);
    assert!(pipeline.options.parallel_reads);
    assert!(pipeline.summaries.iter().all(|s| s.source.as_deref() == Some("econ")));
    assert_eq!(
        pipeline.sources[2].renames[0].to,
        "RCD",
        "directory header is renamed before keys are rebuilt"
    );
}
