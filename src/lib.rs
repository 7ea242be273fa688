//! # Probe Matcher
//!
//! Offline map-matching of GPS probe traces onto a road-link network, with
//! road slope estimation and slope accuracy reporting.
//!
//! This library provides:
//! - Two-tier geohash candidate indexing of road links
//! - Spherical geometry (great-circle, cross-track and slope angles)
//! - Per-trip link matching by average distance to the reference node
//! - Parallel evaluation of all trips with order-preserving gather
//! - Slope RMSE against per-link surveyed slope
//!
//! ## Features
//!
//! - **`parallel`** - Match trips on a rayon worker pool (default)
//! - **`persistence`** - SQLite snapshot cache for parsed inputs and results
//! - **`cli`** - Build the `probe-match` command-line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use probe_matcher::{GeoPoint, Link, MatchConfig, MatchingEngine, ProbeTrace, TravelDirection};
//!
//! let link = Link::new(
//!     "51881672",
//!     "62007637",
//!     "62007648",
//!     TravelDirection::Both,
//!     GeoPoint::with_altitude(41.0, -87.0, 180.0),
//!     GeoPoint::with_altitude(41.001, -87.0, 185.0),
//!     vec![],
//!     None,
//! );
//!
//! let mut engine = MatchingEngine::from_links(vec![link], MatchConfig::default());
//! let trace = ProbeTrace::new("3496", None, vec![GeoPoint::with_altitude(41.0, -87.0, 180.0)]);
//! let trips = engine.prepare_trips(vec![trace]);
//! let outcome = engine.run(trips).unwrap();
//!
//! assert_eq!(outcome.trips[0].matched_link_id(), Some("51881672"));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, ProbeMatchError, Result};

// Spherical geometry kernel (distance, cross-track, slope)
pub mod geo_utils;

// Geohash-keyed link index at two precisions
pub mod spatial_index;
pub use spatial_index::{GeohashIndex, SpatialIndex};

// Candidate link selection for a trip
pub mod candidates;
pub use candidates::{most_frequent_geohash, select_candidates, CandidateSet};

// Per-trip link matching
pub mod matching;
pub use matching::{derive_slopes, match_trip};

// Fan-out of the matcher across all trips
pub mod evaluator;
pub use evaluator::{match_trips, EvaluationOutcome};
#[cfg(feature = "parallel")]
pub use evaluator::match_trips_parallel;

// Slope accuracy (RMSE) aggregation
pub mod accuracy;
pub use accuracy::{AccuracyAggregator, AccuracyReport};

// Link and probe record ingestion
pub mod ingest;
pub use ingest::{IngestStats, ProbeAuxiliary, ProbeData};

// CSV report emission
pub mod report;
pub use report::{ReportStats, ReportWriter};

// Algorithm toolbox - modular access to the geometry and indexing algorithms
pub mod algorithms;

// Stateful matching engine and full pipeline
pub mod engine;
pub use engine::{run_pipeline, EngineStats, MatchingEngine, PipelinePaths, PipelineSummary, RoadNetwork};

// Snapshot cache for precomputed structures
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::{SnapshotKind, SnapshotStore};

// ============================================================================
// Core Types
// ============================================================================

/// A geodetic coordinate with optional altitude.
///
/// # Example
/// ```
/// use probe_matcher::GeoPoint;
/// let point = GeoPoint::with_altitude(51.5074, -0.1278, 35.0);
/// assert_eq!(point.altitude, Some(35.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters, absent when the source record has none
    pub altitude: Option<f64>,
}

impl GeoPoint {
    /// Create a point without altitude.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Create a point with altitude.
    pub fn with_altitude(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: Some(altitude),
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Direction of travel allowed on a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelDirection {
    /// Travel allowed both ways (`B`)
    Both,
    /// Travel away from the reference node (`F`)
    FromReference,
    /// Travel towards the reference node (`T`)
    TowardsReference,
    /// Any other code, kept verbatim
    Other(String),
}

impl TravelDirection {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "B" => TravelDirection::Both,
            "F" => TravelDirection::FromReference,
            "T" => TravelDirection::TowardsReference,
            other => TravelDirection::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TravelDirection::Both => "B",
            TravelDirection::FromReference => "F",
            TravelDirection::TowardsReference => "T",
            TravelDirection::Other(code) => code,
        }
    }
}

/// A surveyed slope sample along a link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeSample {
    /// Distance from the reference node in meters
    pub distance: f64,
    /// Slope in percent
    pub slope: f64,
}

/// A directed road segment between a reference and a non-reference node.
///
/// Links are immutable once constructed; the average slope is derived at
/// construction time from the slope samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Link identifier (linkPVID)
    pub id: String,
    pub ref_node_id: String,
    pub nonref_node_id: String,
    pub direction: TravelDirection,
    /// Reference node coordinates (first shape group)
    pub reference: GeoPoint,
    /// Non-reference node coordinates (last shape group)
    pub non_reference: GeoPoint,
    /// Interior shape points, in order
    pub shape_points: Vec<GeoPoint>,
    /// Surveyed slope samples, if the link carries any
    pub slope_samples: Option<Vec<SlopeSample>>,
    average_slope: Option<f64>,
}

impl Link {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        ref_node_id: impl Into<String>,
        nonref_node_id: impl Into<String>,
        direction: TravelDirection,
        reference: GeoPoint,
        non_reference: GeoPoint,
        shape_points: Vec<GeoPoint>,
        slope_samples: Option<Vec<SlopeSample>>,
    ) -> Self {
        let average_slope = slope_samples.as_deref().and_then(mean_slope);
        Self {
            id: id.into(),
            ref_node_id: ref_node_id.into(),
            nonref_node_id: nonref_node_id.into(),
            direction,
            reference,
            non_reference,
            shape_points,
            slope_samples,
            average_slope,
        }
    }

    /// Arithmetic mean of the sample slopes, `None` when there are no samples.
    pub fn average_slope(&self) -> Option<f64> {
        self.average_slope
    }
}

fn mean_slope(samples: &[SlopeSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.slope).sum();
    Some(sum / samples.len() as f64)
}

/// Links keyed by identifier, shared read-only by all matching workers.
pub type LinkTable = HashMap<String, Link>;

/// A probe trace as read from the input: one device session, not yet indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeTrace {
    pub sample_id: String,
    /// Seconds between the first and last fix, when timestamps parse
    pub duration: Option<f64>,
    pub fixes: Vec<GeoPoint>,
}

impl ProbeTrace {
    pub fn new(sample_id: impl Into<String>, duration: Option<f64>, fixes: Vec<GeoPoint>) -> Self {
        Self {
            sample_id: sample_id.into(),
            duration,
            fixes,
        }
    }
}

/// The result of matching a trip onto a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMatch {
    /// The chosen link
    pub link_id: String,
    /// Great-circle distance of each fix from the link's reference node
    pub dist_from_ref: Vec<f64>,
    /// Cross-track distance of each fix from the link's end-to-end geodesic
    pub dist_from_link: Vec<f64>,
    /// Derived slope in degrees for each fix
    pub slopes: Vec<f64>,
}

/// A probe trace together with its candidate links and, once matched, the
/// match result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub sample_id: String,
    pub duration: Option<f64>,
    pub fixes: Vec<GeoPoint>,
    /// Geohash key the candidates were taken from; `None` when unmatchable
    pub geohash_tag: Option<String>,
    /// Candidate link identifiers in bucket order
    pub candidates: Vec<String>,
    /// Set exactly once by the matcher
    pub mapping: Option<TripMatch>,
}

impl Trip {
    /// Build a trip from a trace and the candidate set chosen for it.
    pub fn from_trace(trace: ProbeTrace, candidates: CandidateSet) -> Self {
        Self {
            sample_id: trace.sample_id,
            duration: trace.duration,
            fixes: trace.fixes,
            geohash_tag: candidates.geohash,
            candidates: candidates.link_ids,
            mapping: None,
        }
    }

    /// A trip with no candidates can never be matched.
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn is_matched(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn matched_link_id(&self) -> Option<&str> {
        self.mapping.as_ref().map(|m| m.link_id.as_str())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Denominator used when turning the slope sum of squares into an RMSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmseDenominator {
    /// Fixes whose link has an average slope (statistically sound)
    ComparedFixes,
    /// Every fix of every matched trip (reproduces historical figures)
    AllFixes,
}

impl RmseDenominator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RmseDenominator::ComparedFixes => "compared",
            RmseDenominator::AllFixes => "all",
        }
    }
}

impl std::str::FromStr for RmseDenominator {
    type Err = ProbeMatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compared" => Ok(RmseDenominator::ComparedFixes),
            "all" => Ok(RmseDenominator::AllFixes),
            other => Err(ProbeMatchError::ConfigError {
                message: format!("unknown RMSE denominator '{}' (expected compared|all)", other),
            }),
        }
    }
}

/// Configuration for candidate selection, matching and accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Geohash length of the fine index. Default: 8 (~38m x 19m cells)
    pub fine_precision: usize,

    /// Geohash length of the coarse index. Default: 7 (~153m cells)
    pub coarse_precision: usize,

    /// Minimum bucket size for the fine index to be accepted.
    /// Smaller buckets fall through to the coarse index. Default: 5
    pub min_fine_candidates: usize,

    /// Worker pool size. `None` uses the available parallelism.
    pub worker_threads: Option<usize>,

    /// RMSE denominator policy. Default: compared fixes
    pub rmse_denominator: RmseDenominator,

    /// chrono format of probe timestamps. Default: `%m/%d/%Y %I:%M:%S %p`
    pub timestamp_format: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fine_precision: 8,
            coarse_precision: 7,
            min_fine_candidates: 5,
            worker_threads: None,
            rmse_denominator: RmseDenominator::ComparedFixes,
            timestamp_format: "%m/%d/%Y %I:%M:%S %p".to_string(),
        }
    }
}

impl MatchConfig {
    /// Check the precisions are usable geohash lengths.
    pub fn validate(&self) -> Result<()> {
        for precision in [self.fine_precision, self.coarse_precision] {
            if precision == 0 || precision > spatial_index::MAX_PRECISION {
                return Err(ProbeMatchError::ConfigError {
                    message: format!("geohash precision {} out of range 1..=12", precision),
                });
            }
        }
        if self.worker_threads == Some(0) {
            return Err(ProbeMatchError::ConfigError {
                message: "worker_threads must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
