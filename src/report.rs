//! CSV report emission.
//!
//! Two per-fix reports are written for every matched trip, in trip order:
//!
//! - `MatchedPoints.csv`: the probe record plus the matched link and its
//!   distances.
//! - `MatchedPointsSlope.csv`: the derived slope next to the link's average
//!   slope.
//!
//! Unmatched trips produce no rows. A matched trip whose per-fix lists
//! disagree in length is skipped and logged; the rest are still written.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LinkTable, ProbeAuxiliary, ProbeMatchError, Result, Trip, TripMatch};

pub const MATCHED_POINTS_FILE: &str = "MatchedPoints.csv";
pub const SLOPE_FILE: &str = "MatchedPointsSlope.csv";
pub const SUMMARY_FILE: &str = "summary.json";

const MATCHED_POINTS_HEADER: [&str; 11] = [
    "sampleID",
    "dateTime",
    "sourceCode",
    "latitude",
    "longitude",
    "altitude",
    "speed",
    "heading",
    "linkPVID",
    "distFromRef",
    "distFromLink",
];

const SLOPE_HEADER: [&str; 7] = [
    "sampleID",
    "dateTime",
    "latitude",
    "longitude",
    "altitude",
    "probeSlope",
    "linkSlope",
];

/// Counts from one report run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    /// Matched trips written to both reports
    pub written_trips: usize,
    /// Matched trips skipped for inconsistent record lengths
    pub skipped_trips: usize,
    /// Rows per report, excluding the header
    pub rows: usize,
}

/// Shortest round-trip form, with `.0` kept on integral values (`41.0`, not `41`).
fn float_cell(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains(['.', 'e']) {
        format!("{}.0", text)
    } else {
        text
    }
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(float_cell).unwrap_or_default()
}

/// Check that every per-fix list of a matched trip has one entry per fix.
fn check_lengths(trip: &Trip, mapping: &TripMatch, auxiliary: Option<&ProbeAuxiliary>) -> Result<()> {
    let expected = trip.fixes.len();
    let aux_len = auxiliary.and_then(ProbeAuxiliary::consistent_len).unwrap_or(0);
    let lengths = [
        aux_len,
        mapping.dist_from_ref.len(),
        mapping.dist_from_link.len(),
        mapping.slopes.len(),
    ];
    match lengths.into_iter().find(|&len| len != expected) {
        Some(found) => Err(ProbeMatchError::RecordLengthMismatch {
            sample_id: trip.sample_id.clone(),
            expected,
            found,
        }),
        None => Ok(()),
    }
}

/// Write both per-fix reports.
///
/// `auxiliary` is aligned by index with `trips`.
pub fn write_reports<P: Write, S: Write>(
    points_out: P,
    slope_out: S,
    trips: &[Trip],
    auxiliary: &[ProbeAuxiliary],
    links: &LinkTable,
) -> Result<ReportStats> {
    let mut points = csv::Writer::from_writer(points_out);
    let mut slopes = csv::Writer::from_writer(slope_out);
    points.write_record(MATCHED_POINTS_HEADER)?;
    slopes.write_record(SLOPE_HEADER)?;

    let mut stats = ReportStats::default();

    for (idx, trip) in trips.iter().enumerate() {
        let Some(mapping) = &trip.mapping else {
            continue;
        };
        let aux = auxiliary.get(idx);
        if let Err(e) = check_lengths(trip, mapping, aux) {
            log::error!("[Report] Skipping trip {}: {}", trip.sample_id, e);
            stats.skipped_trips += 1;
            continue;
        }
        let Some(aux) = aux else {
            continue;
        };

        let link_slope = optional_cell(links.get(&mapping.link_id).and_then(|l| l.average_slope()));

        for (i, fix) in trip.fixes.iter().enumerate() {
            let latitude = float_cell(fix.latitude);
            let longitude = float_cell(fix.longitude);
            let altitude = optional_cell(fix.altitude);

            points.write_record([
                trip.sample_id.as_str(),
                aux.timestamps[i].as_str(),
                aux.source_codes[i].as_str(),
                latitude.as_str(),
                longitude.as_str(),
                altitude.as_str(),
                aux.speeds[i].as_str(),
                aux.headings[i].as_str(),
                mapping.link_id.as_str(),
                float_cell(mapping.dist_from_ref[i]).as_str(),
                float_cell(mapping.dist_from_link[i]).as_str(),
            ])?;
            slopes.write_record([
                trip.sample_id.as_str(),
                aux.timestamps[i].as_str(),
                latitude.as_str(),
                longitude.as_str(),
                altitude.as_str(),
                float_cell(mapping.slopes[i]).as_str(),
                link_slope.as_str(),
            ])?;
            stats.rows += 1;
        }
        stats.written_trips += 1;
    }

    points.flush()?;
    slopes.flush()?;
    Ok(stats)
}

/// Writes the reports into an output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn create(&self, name: &str) -> Result<File> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(name);
        File::create(&path).map_err(|e| ProbeMatchError::Io {
            message: format!("cannot create {}: {}", path.display(), e),
        })
    }

    /// Write `MatchedPoints.csv` and `MatchedPointsSlope.csv`.
    pub fn write(
        &self,
        trips: &[Trip],
        auxiliary: &[ProbeAuxiliary],
        links: &LinkTable,
    ) -> Result<ReportStats> {
        let start = std::time::Instant::now();
        let stats = write_reports(
            self.create(MATCHED_POINTS_FILE)?,
            self.create(SLOPE_FILE)?,
            trips,
            auxiliary,
            links,
        )?;
        log::info!(
            "[Report] Wrote {} rows for {} trips to {} in {:?} ({} skipped)",
            stats.rows,
            stats.written_trips,
            self.output_dir.display(),
            start.elapsed(),
            stats.skipped_trips
        );
        Ok(stats)
    }

    /// Write `summary.json`.
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let file = self.create(SUMMARY_FILE)?;
        serde_json::to_writer_pretty(file, summary).map_err(|e| ProbeMatchError::Io {
            message: format!("cannot write {}: {}", SUMMARY_FILE, e),
        })?;
        Ok(self.output_dir.join(SUMMARY_FILE))
    }
}
