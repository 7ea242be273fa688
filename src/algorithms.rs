//! # Algorithm Toolbox
//!
//! Direct access to the individual matching algorithms, for use in other
//! systems without the engine or the file pipeline.
//!
//! ## Core Algorithms
//!
//! - **Candidate Selection**: Two-tier geohash lookup of nearby links
//! - **Link Matching**: Nearest reference node by average distance
//! - **Slope Accuracy**: RMSE of derived slopes against surveyed slopes
//!
//! ## Geographic Utilities
//!
//! - **Great-circle Distance**: Haversine distance between two points
//! - **Cross-track Distance**: Distance from a point to a link's geodesic
//! - **Slope**: Elevation angle between two points with altitude
//!
//! # Example
//!
//! ```rust
//! use probe_matcher::algorithms::{great_circle_distance, perpendicular_distance, GeoPoint};
//!
//! let a = GeoPoint::new(41.0, -87.0);
//! let b = GeoPoint::new(41.0, -86.99);
//! let p = GeoPoint::new(41.001, -86.995);
//!
//! let along = great_circle_distance(&a, &b);
//! let off = perpendicular_distance(&a, &b, &p);
//! assert!(off > 100.0 && off < along);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{GeoPoint, Link, LinkTable, MatchConfig, SlopeSample, Trip, TripMatch};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    average_distance_from_point, great_circle_distance, perpendicular_distance, slope_degrees,
    EARTH_RADIUS_M,
};

// =============================================================================
// Spatial Index and Candidate Selection
// =============================================================================

pub use crate::spatial_index::{encode_point, GeohashIndex, SpatialIndex};

pub use crate::candidates::{most_frequent_geohash, select_candidates, CandidateSet};

// =============================================================================
// Matching and Accuracy
// =============================================================================

pub use crate::matching::{derive_slopes, match_trip};

pub use crate::evaluator::{match_trips, EvaluationOutcome};

#[cfg(feature = "parallel")]
pub use crate::evaluator::match_trips_parallel;

pub use crate::accuracy::{aggregate, AccuracyAggregator, AccuracyReport};
