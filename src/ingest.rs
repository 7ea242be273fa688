//! Link and probe record ingestion.
//!
//! Both inputs are header-less comma-separated files. Malformed rows are
//! skipped and counted, never fatal; only failing to open or read a file is
//! an error.
//!
//! ## Link rows
//!
//! | Field | Content |
//! |-------|---------|
//! | 0 | link id |
//! | 1 | reference node id |
//! | 2 | non-reference node id |
//! | 5 | direction-of-travel code |
//! | 14 | `lat/lon/alt` groups separated by `|`, first = reference node, last = non-reference node |
//! | 16 | optional `distance/slope` pairs separated by `|` |
//!
//! ## Probe rows
//!
//! Exactly 8 fields: sample id, timestamp, source code, latitude, longitude,
//! altitude, speed, heading. Contiguous rows with the same sample id form
//! one trace.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::{GeoPoint, Link, ProbeMatchError, ProbeTrace, Result, SlopeSample, TravelDirection};

const LINK_ID: usize = 0;
const REF_NODE_ID: usize = 1;
const NONREF_NODE_ID: usize = 2;
const DIRECTION: usize = 5;
const SHAPE_INFO: usize = 14;
const SLOPE_INFO: usize = 16;

const PROBE_FIELDS: usize = 8;

/// Row counts for one input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub skipped: u64,
}

/// Per-fix fields that are carried through to the reports untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeAuxiliary {
    pub timestamps: Vec<String>,
    pub source_codes: Vec<String>,
    pub speeds: Vec<String>,
    pub headings: Vec<String>,
}

impl ProbeAuxiliary {
    /// Number of records, or `None` if the lists disagree in length.
    pub fn consistent_len(&self) -> Option<usize> {
        let len = self.timestamps.len();
        (self.source_codes.len() == len && self.speeds.len() == len && self.headings.len() == len)
            .then_some(len)
    }
}

/// Probe traces with their auxiliary data, aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeData {
    pub traces: Vec<ProbeTrace>,
    pub auxiliary: Vec<ProbeAuxiliary>,
    pub stats: IngestStats,
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| ProbeMatchError::Io {
        message: format!("cannot open {}: {}", path.display(), e),
    })
}

fn record_line(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn invalid(record: &StringRecord, message: impl Into<String>) -> ProbeMatchError {
    ProbeMatchError::InvalidRecord {
        line: record_line(record),
        message: message.into(),
    }
}

// ============================================================================
// Links
// ============================================================================

/// Numeric values of a `/`-separated group. Empty and non-numeric tokens are dropped.
fn parse_group(group: &str) -> Vec<f64> {
    group
        .split('/')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .collect()
}

fn point_from_values(values: &[f64]) -> Option<GeoPoint> {
    match values {
        [lat, lon] => Some(GeoPoint::new(*lat, *lon)),
        [lat, lon, alt, ..] => Some(GeoPoint::with_altitude(*lat, *lon, *alt)),
        _ => None,
    }
}

fn parse_slope_info(field: &str) -> Option<Vec<SlopeSample>> {
    if field.trim().is_empty() {
        return None;
    }
    let samples: Vec<SlopeSample> = field
        .split('|')
        .map(parse_group)
        .filter(|values| values.len() >= 2)
        .map(|values| SlopeSample {
            distance: values[0],
            slope: values[1],
        })
        .collect();
    (!samples.is_empty()).then_some(samples)
}

/// Parse one link row.
pub fn parse_link_record(record: &StringRecord) -> Result<Link> {
    let field = |idx: usize| record.get(idx).unwrap_or("");

    if record.len() <= SHAPE_INFO {
        return Err(invalid(record, format!("expected at least {} fields, got {}", SHAPE_INFO + 1, record.len())));
    }

    let groups: Vec<&str> = field(SHAPE_INFO).split('|').collect();
    if groups.len() < 2 {
        return Err(invalid(record, "shape info needs at least two coordinate groups"));
    }

    let reference = point_from_values(&parse_group(groups[0]))
        .ok_or_else(|| invalid(record, "reference node lacks latitude/longitude"))?;
    let non_reference = point_from_values(&parse_group(groups[groups.len() - 1]))
        .ok_or_else(|| invalid(record, "non-reference node lacks latitude/longitude"))?;
    let shape_points: Vec<GeoPoint> = groups[1..groups.len() - 1]
        .iter()
        .filter_map(|group| point_from_values(&parse_group(group)))
        .collect();

    Ok(Link::new(
        field(LINK_ID).trim(),
        field(REF_NODE_ID).trim(),
        field(NONREF_NODE_ID).trim(),
        TravelDirection::from_code(field(DIRECTION)),
        reference,
        non_reference,
        shape_points,
        parse_slope_info(field(SLOPE_INFO)),
    ))
}

/// Read link rows, in file order.
pub fn read_links<R: Read>(input: R) -> Result<(Vec<Link>, IngestStats)> {
    let mut links = Vec::new();
    let mut stats = IngestStats::default();

    for result in reader(input).records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::debug!("[Ingest] Unreadable link row: {}", e);
                stats.skipped += 1;
                continue;
            }
        };
        match parse_link_record(&record) {
            Ok(link) => {
                links.push(link);
                stats.accepted += 1;
            }
            Err(e) => {
                log::debug!("[Ingest] Skipping link row: {}", e);
                stats.skipped += 1;
            }
        }
    }

    log::info!(
        "[Ingest] Loaded {} links ({} rows skipped)",
        stats.accepted,
        stats.skipped
    );
    Ok((links, stats))
}

/// Read the link file at `path`.
pub fn load_links(path: &Path) -> Result<(Vec<Link>, IngestStats)> {
    read_links(open(path)?)
}

// ============================================================================
// Probes
// ============================================================================

struct ProbeFix {
    sample_id: String,
    timestamp: String,
    source_code: String,
    point: GeoPoint,
    speed: String,
    heading: String,
}

fn parse_probe_record(record: &StringRecord) -> Result<ProbeFix> {
    if record.len() != PROBE_FIELDS {
        return Err(invalid(record, format!("expected {} fields, got {}", PROBE_FIELDS, record.len())));
    }
    let field = |idx: usize| record.get(idx).unwrap_or("").trim();

    let latitude: f64 = field(3)
        .parse()
        .map_err(|_| invalid(record, format!("bad latitude '{}'", field(3))))?;
    let longitude: f64 = field(4)
        .parse()
        .map_err(|_| invalid(record, format!("bad longitude '{}'", field(4))))?;
    let altitude: Option<f64> = field(5).parse().ok();

    Ok(ProbeFix {
        sample_id: field(0).to_string(),
        timestamp: field(1).to_string(),
        source_code: field(2).to_string(),
        point: GeoPoint {
            latitude,
            longitude,
            altitude,
        },
        speed: field(6).to_string(),
        heading: field(7).to_string(),
    })
}

/// Accumulates one contiguous run of fixes.
struct TraceBuilder {
    sample_id: String,
    fixes: Vec<GeoPoint>,
    auxiliary: ProbeAuxiliary,
}

impl TraceBuilder {
    fn new(sample_id: String) -> Self {
        Self {
            sample_id,
            fixes: Vec::new(),
            auxiliary: ProbeAuxiliary::default(),
        }
    }

    fn push(&mut self, fix: ProbeFix) {
        self.fixes.push(fix.point);
        self.auxiliary.timestamps.push(fix.timestamp);
        self.auxiliary.source_codes.push(fix.source_code);
        self.auxiliary.speeds.push(fix.speed);
        self.auxiliary.headings.push(fix.heading);
    }

    fn finish(self, timestamp_format: &str) -> (ProbeTrace, ProbeAuxiliary) {
        let duration = trace_duration(&self.auxiliary.timestamps, timestamp_format);
        (
            ProbeTrace::new(self.sample_id, duration, self.fixes),
            self.auxiliary,
        )
    }
}

/// Seconds between the first and last timestamp, if both parse.
pub fn trace_duration(timestamps: &[String], timestamp_format: &str) -> Option<f64> {
    let first = NaiveDateTime::parse_from_str(timestamps.first()?, timestamp_format).ok()?;
    let last = NaiveDateTime::parse_from_str(timestamps.last()?, timestamp_format).ok()?;
    Some((last - first).num_milliseconds() as f64 / 1000.0)
}

/// Read probe rows and group them into traces.
pub fn read_probes<R: Read>(input: R, timestamp_format: &str) -> Result<ProbeData> {
    let mut data = ProbeData::default();
    let mut current: Option<TraceBuilder> = None;

    for result in reader(input).records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::debug!("[Ingest] Unreadable probe row: {}", e);
                data.stats.skipped += 1;
                continue;
            }
        };
        let fix = match parse_probe_record(&record) {
            Ok(fix) => fix,
            Err(e) => {
                log::debug!("[Ingest] Skipping probe row: {}", e);
                data.stats.skipped += 1;
                continue;
            }
        };
        data.stats.accepted += 1;

        if current.as_ref().map_or(true, |b| b.sample_id != fix.sample_id) {
            if let Some(done) = current.take() {
                let (trace, aux) = done.finish(timestamp_format);
                data.traces.push(trace);
                data.auxiliary.push(aux);
            }
            current = Some(TraceBuilder::new(fix.sample_id.clone()));
        }
        if let Some(builder) = current.as_mut() {
            builder.push(fix);
        }
    }

    if let Some(done) = current.take() {
        let (trace, aux) = done.finish(timestamp_format);
        data.traces.push(trace);
        data.auxiliary.push(aux);
    }

    log::info!(
        "[Ingest] Loaded {} probe traces from {} fixes ({} rows skipped)",
        data.traces.len(),
        data.stats.accepted,
        data.stats.skipped
    );
    Ok(data)
}

/// Read the probe file at `path`.
pub fn load_probes(path: &Path, timestamp_format: &str) -> Result<ProbeData> {
    read_probes(open(path)?, timestamp_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

    fn link_row(id: &str, shape: &str, slope: &str) -> String {
        let mut fields = vec![String::new(); 17];
        fields[LINK_ID] = id.to_string();
        fields[REF_NODE_ID] = format!("{}0", id);
        fields[NONREF_NODE_ID] = format!("{}1", id);
        fields[DIRECTION] = "F".to_string();
        fields[SHAPE_INFO] = shape.to_string();
        fields[SLOPE_INFO] = slope.to_string();
        fields.join(",")
    }

    #[test]
    fn test_parse_link_rows() {
        let input = [
            link_row("100", "41.0/-87.0/180|41.0005/-87.0/|41.001/-87.0/185", "0/2.0|100/3.0"),
            link_row("101", "41.0/-87.0|41.001/-87.0", ""),
        ]
        .join("\n");

        let (links, stats) = read_links(input.as_bytes()).unwrap();
        assert_eq!(stats, IngestStats { accepted: 2, skipped: 0 });

        let first = &links[0];
        assert_eq!(first.id, "100");
        assert_eq!(first.ref_node_id, "1000");
        assert_eq!(first.direction, TravelDirection::FromReference);
        assert_eq!(first.reference, GeoPoint::with_altitude(41.0, -87.0, 180.0));
        assert_eq!(first.non_reference, GeoPoint::with_altitude(41.001, -87.0, 185.0));
        assert_eq!(first.shape_points, vec![GeoPoint::new(41.0005, -87.0)]);
        assert_eq!(first.average_slope(), Some(2.5));

        let second = &links[1];
        assert_eq!(second.reference.altitude, None);
        assert!(second.shape_points.is_empty());
        assert_eq!(second.slope_samples, None);
        assert_eq!(second.average_slope(), None);
    }

    #[test]
    fn test_skip_malformed_link_rows() {
        let input = [
            // single coordinate group
            link_row("1", "41.0/-87.0/180", ""),
            // reference node lacks longitude
            link_row("2", "41.0//|41.001/-87.0", ""),
            // non-reference node empty
            link_row("3", "41.0/-87.0|", ""),
            // too few fields
            "4,5,6".to_string(),
            link_row("5", "41.0/-87.0|41.001/-87.0", ""),
        ]
        .join("\n");

        let (links, stats) = read_links(input.as_bytes()).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, "5");
        assert_eq!(stats.skipped, 4);
    }

    #[test]
    fn test_short_row_without_slope_field() {
        let mut fields = vec![String::new(); 15];
        fields[LINK_ID] = "9".to_string();
        fields[SHAPE_INFO] = "41.0/-87.0|41.001/-87.0".to_string();
        let (links, _) = read_links(fields.join(",").as_bytes()).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].slope_samples, None);
    }

    #[test]
    fn test_group_probe_rows() {
        let input = "\
3496,6/12/2009 6:12:49 AM,13,51.4965,9.3862,200,23,339
3496,6/12/2009 6:12:54 AM,13,51.4966,9.3861,201,10,10
bad,row
3497,6/12/2009 6:13:00 AM,13,51.4970,9.3860,,5,90
3496,6/12/2009 6:14:00 AM,13,51.4980,9.3859,202,7,5
";
        let data = read_probes(input.as_bytes(), FORMAT).unwrap();
        assert_eq!(data.stats, IngestStats { accepted: 4, skipped: 1 });

        let ids: Vec<&str> = data.traces.iter().map(|t| t.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["3496", "3497", "3496"]);
        assert_eq!(data.auxiliary.len(), 3);

        let first = &data.traces[0];
        assert_eq!(first.fixes.len(), 2);
        assert_eq!(first.duration, Some(5.0));
        assert_eq!(data.auxiliary[0].speeds, vec!["23", "10"]);
        assert_eq!(data.auxiliary[0].consistent_len(), Some(2));

        // missing altitude
        assert_eq!(data.traces[1].fixes[0].altitude, None);
        assert_eq!(data.traces[1].duration, Some(0.0));

        // final run is kept
        assert_eq!(data.traces[2].fixes[0].latitude, 51.4980);
    }

    #[test]
    fn test_unparsable_timestamp_has_no_duration() {
        let input = "1,yesterday,13,51.0,9.0,100,1,1\n1,today,13,51.0,9.0,100,1,1\n";
        let data = read_probes(input.as_bytes(), FORMAT).unwrap();
        assert_eq!(data.traces.len(), 1);
        assert_eq!(data.traces[0].duration, None);
    }

    #[test]
    fn test_probe_rows_with_bad_coordinates() {
        let input = "1,6/12/2009 6:12:49 AM,13,north,9.0,100,1,1\n";
        let data = read_probes(input.as_bytes(), FORMAT).unwrap();
        assert!(data.traces.is_empty());
        assert_eq!(data.stats.skipped, 1);
    }

    #[test]
    fn test_missing_file() {
        let result = load_links(Path::new("/nonexistent/links.csv"));
        assert!(matches!(result, Err(ProbeMatchError::Io { .. })));
    }
}
