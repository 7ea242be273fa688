//! End-to-end pipeline tests: CSV inputs -> matching -> reports.

mod common;

use probe_matcher::report::{MATCHED_POINTS_FILE, SLOPE_FILE, SUMMARY_FILE};
use probe_matcher::{run_pipeline, MatchConfig, ProbeMatchError, RmseDenominator};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_full_pipeline() {
    init_logging();
    let (paths, _tmp) = common::setup(false);

    let summary = run_pipeline(&paths, &MatchConfig::default()).expect("pipeline failed");

    assert_eq!(summary.link_rows.accepted, 2);
    assert_eq!(summary.link_rows.skipped, 1);
    assert_eq!(summary.probe_rows.accepted, 6);
    assert_eq!(summary.probe_rows.skipped, 1);

    assert_eq!(summary.engine.link_count, 2);
    assert_eq!(summary.engine.trip_count, 3);
    assert_eq!(summary.engine.matched_count, 2);
    assert_eq!(summary.engine.unmatchable_count, 1);
    assert_eq!(summary.engine.failed_count, 0);

    assert_eq!(summary.report.written_trips, 2);
    assert_eq!(summary.report.skipped_trips, 0);
    assert_eq!(summary.report.rows, 5);

    // Trip A: three fixes with derived slope 0 against link average 3
    assert_eq!(summary.accuracy.compared_fixes, 3);
    assert_eq!(summary.accuracy.total_fixes, 5);
    assert!((summary.accuracy.sum_of_squares - 27.0).abs() < 1e-9);
    assert!((summary.accuracy.rmse.unwrap() - 3.0).abs() < 1e-9);
}

#[test]
fn test_report_contents() {
    init_logging();
    let (paths, _tmp) = common::setup(false);
    run_pipeline(&paths, &MatchConfig::default()).expect("pipeline failed");

    let points = common::read_lines(paths.output_dir.join(MATCHED_POINTS_FILE));
    assert_eq!(points.len(), 6);
    assert_eq!(
        points[0],
        "sampleID,dateTime,sourceCode,latitude,longitude,altitude,speed,heading,linkPVID,distFromRef,distFromLink"
    );
    assert_eq!(points[1], "A,6/12/2009 6:12:49 AM,13,41.88,-87.63,181.0,23,339,100,0.0,0.0");
    // missing altitude stays empty
    assert_eq!(points[5], "B,6/12/2009 6:13:15 AM,13,41.9,-87.63,,11,91,200,0.0,0.0");
    assert!(!points.iter().any(|row| row.starts_with("C,")));

    let slopes = common::read_lines(paths.output_dir.join(SLOPE_FILE));
    assert_eq!(
        slopes[0],
        "sampleID,dateTime,latitude,longitude,altitude,probeSlope,linkSlope"
    );
    assert_eq!(slopes[1], "A,6/12/2009 6:12:49 AM,41.88,-87.63,181.0,0.0,3.0");
    // link 200 has no average slope
    assert_eq!(slopes[4], "B,6/12/2009 6:13:10 AM,41.9,-87.63,201.0,0.0,");

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(paths.output_dir.join(SUMMARY_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["engine"]["matched_count"], 2);
    assert_eq!(summary["accuracy"]["denominator"], "ComparedFixes");
}

#[test]
fn test_all_fixes_denominator() {
    let (paths, _tmp) = common::setup(false);
    let config = MatchConfig {
        rmse_denominator: RmseDenominator::AllFixes,
        ..MatchConfig::default()
    };

    let summary = run_pipeline(&paths, &config).expect("pipeline failed");
    let expected = (27.0f64 / 5.0).sqrt();
    assert!((summary.accuracy.rmse.unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_sequential_worker_count_matches() {
    let (paths, _tmp) = common::setup(false);
    let default = run_pipeline(&paths, &MatchConfig::default()).unwrap();

    let config = MatchConfig {
        worker_threads: Some(1),
        ..MatchConfig::default()
    };
    let single = run_pipeline(&paths, &config).unwrap();

    assert_eq!(single.engine, default.engine);
    assert_eq!(single.accuracy, default.accuracy);
    assert_eq!(single.report, default.report);
}

#[test]
fn test_missing_input_is_fatal() {
    let (mut paths, _tmp) = common::setup(false);
    paths.probe_file = paths.probe_file.with_file_name("absent.csv");

    let result = run_pipeline(&paths, &MatchConfig::default());
    assert!(matches!(result, Err(ProbeMatchError::Io { .. })));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (paths, _tmp) = common::setup(false);
    let config = MatchConfig {
        coarse_precision: 0,
        ..MatchConfig::default()
    };

    let result = run_pipeline(&paths, &config);
    assert!(matches!(result, Err(ProbeMatchError::ConfigError { .. })));
}
