//! Synthetic link and probe files shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use probe_matcher::PipelinePaths;
use tempfile::TempDir;

/// One link row with the shape in field 14 and the slope pairs in field 16.
pub fn link_row(id: &str, shape: &str, slope: &str) -> String {
    let mut fields = vec![String::new(); 17];
    fields[0] = id.to_string();
    fields[1] = format!("{}0", id);
    fields[2] = format!("{}1", id);
    fields[5] = "B".to_string();
    fields[14] = shape.to_string();
    fields[16] = slope.to_string();
    fields.join(",")
}

/// Two valid links and one malformed row.
///
/// Link 100 has an average slope of 3.0, link 200 has none.
pub fn link_file() -> String {
    [
        link_row("100", "41.88/-87.63/180|41.881/-87.63/190", "0/2.0|50/4.0"),
        link_row("200", "41.9/-87.63/200|41.901/-87.63/205", ""),
        link_row("300", "41.95/-87.63/200", ""),
    ]
    .join("\n")
}

/// Three trips and one malformed row:
/// - `A`: three fixes on link 100's reference node
/// - `B`: two fixes on link 200's reference node, one without altitude
/// - `C`: far from every link
pub fn probe_file() -> String {
    "\
A,6/12/2009 6:12:49 AM,13,41.88,-87.63,181,23,339
A,6/12/2009 6:12:54 AM,13,41.88,-87.63,182,24,340
A,6/12/2009 6:12:59 AM,13,41.88,-87.63,183,25,341
B,6/12/2009 6:13:10 AM,13,41.9,-87.63,201,10,90
B,6/12/2009 6:13:15 AM,13,41.9,-87.63,,11,91
B,6/12/2009 6:13:20 AM,13
C,6/12/2009 6:14:00 AM,13,10.0,10.0,5,0,0
"
    .to_string()
}

/// Write the synthetic inputs into a fresh temp dir.
pub fn setup(snapshot: bool) -> (PipelinePaths, TempDir) {
    let tmp_dir = TempDir::new().expect("failed to create temp dir");
    let paths = paths_in(tmp_dir.path(), snapshot);
    std::fs::write(&paths.link_file, link_file()).expect("failed to write links");
    std::fs::write(&paths.probe_file, probe_file()).expect("failed to write probes");
    (paths, tmp_dir)
}

pub fn paths_in(dir: &Path, snapshot: bool) -> PipelinePaths {
    PipelinePaths {
        link_file: dir.join("links.csv"),
        probe_file: dir.join("probes.csv"),
        output_dir: dir.join("out"),
        snapshot_db: snapshot.then(|| dir.join("snapshots.db")),
    }
}

pub fn read_lines(path: PathBuf) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("failed to read report")
        .lines()
        .map(str::to_string)
        .collect()
}
