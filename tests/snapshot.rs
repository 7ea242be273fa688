//! Snapshot cache integration tests.
//!
//! Run with: `cargo test --features persistence --test snapshot`

mod common;

use std::fs::OpenOptions;
use std::io::Write;

use probe_matcher::{run_pipeline, MatchConfig, PipelineSummary, SnapshotKind, SnapshotStore};

fn assert_same_run(a: &PipelineSummary, b: &PipelineSummary) {
    assert_eq!(a.link_rows, b.link_rows);
    assert_eq!(a.probe_rows, b.probe_rows);
    assert_eq!(a.engine, b.engine);
    assert_eq!(a.report, b.report);
    assert_eq!(a.accuracy, b.accuracy);
}

#[test]
fn test_cached_run_matches_fresh_run() {
    let (paths, _tmp) = common::setup(true);
    let config = MatchConfig::default();

    let fresh = run_pipeline(&paths, &config).expect("first run failed");
    let db = paths.snapshot_db.clone().unwrap();
    assert!(db.exists());

    let cached = run_pipeline(&paths, &config).expect("cached run failed");
    assert_same_run(&fresh, &cached);
}

#[test]
fn test_corrupt_snapshots_are_recomputed() {
    let (paths, _tmp) = common::setup(true);
    let config = MatchConfig::default();
    let fresh = run_pipeline(&paths, &config).expect("first run failed");

    let db = paths.snapshot_db.clone().unwrap();
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        let corrupted = conn
            .execute("UPDATE snapshots SET data = x'c1ff00'", [])
            .unwrap();
        assert_eq!(corrupted, 3);
    }

    let recovered = run_pipeline(&paths, &config).expect("run over corrupt cache failed");
    assert_same_run(&fresh, &recovered);

    // the recompute replaced the corrupt entries
    let store = SnapshotStore::open(&db).unwrap();
    let fingerprint = SnapshotStore::file_fingerprint(&paths.probe_file).unwrap();
    let probes: Option<probe_matcher::ProbeData> =
        store.load(SnapshotKind::Probes, &format!("{}|{}", fingerprint, config.timestamp_format));
    assert_eq!(probes.map(|p| p.traces.len()), Some(3));
}

#[test]
fn test_changed_input_invalidates_results() {
    let (paths, _tmp) = common::setup(true);
    let config = MatchConfig::default();
    let before = run_pipeline(&paths, &config).expect("first run failed");

    let mut probes = OpenOptions::new()
        .append(true)
        .open(&paths.probe_file)
        .unwrap();
    writeln!(probes, "D,6/12/2009 6:15:00 AM,13,41.88,-87.63,180,1,1").unwrap();
    drop(probes);

    let after = run_pipeline(&paths, &config).expect("second run failed");
    assert_eq!(after.engine.trip_count, before.engine.trip_count + 1);
    assert_eq!(after.engine.matched_count, before.engine.matched_count + 1);
    assert_eq!(after.link_rows, before.link_rows);
}

#[test]
fn test_unopenable_snapshot_db_is_not_fatal() {
    let (mut paths, tmp) = common::setup(true);
    // a directory cannot be opened as a database
    paths.snapshot_db = Some(tmp.path().to_path_buf());

    let summary = run_pipeline(&paths, &MatchConfig::default()).expect("run failed");
    assert_eq!(summary.engine.matched_count, 2);
}
