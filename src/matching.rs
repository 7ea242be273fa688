//! Per-trip link matching.
//!
//! A trip is committed to the candidate link whose reference node has the
//! smallest average great-circle distance to the trip's fixes. Ties go to
//! the candidate listed first. Distance to the reference node is the scoring
//! rule; cross-track distance is computed for the chosen link only and does
//! not influence the choice.
//!
//! Slopes are chained from the matched link's reference node: the first
//! fix's slope is taken against the reference node, each later fix against
//! the fix before it.

use crate::geo_utils::{
    average_distance_from_point, great_circle_distance, perpendicular_distance, slope_degrees,
};
use crate::{GeoPoint, Link, LinkTable, OptionExt, Result, Trip, TripMatch};

/// Match one trip against the link table.
///
/// Returns `Ok(None)` when the trip has no candidates or none of its
/// candidates yields a finite score. Fails if a candidate id is missing from
/// the link table or the trip has no fixes.
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use probe_matcher::{match_trip, CandidateSet, GeoPoint, Link, ProbeTrace, TravelDirection, Trip};
///
/// let link = Link::new(
///     "L1", "R1", "N1", TravelDirection::Both,
///     GeoPoint::with_altitude(41.0, -87.0, 180.0),
///     GeoPoint::with_altitude(41.001, -87.0, 185.0),
///     vec![], None,
/// );
/// let links = HashMap::from([(link.id.clone(), link)]);
///
/// let trace = ProbeTrace::new("t1", None, vec![GeoPoint::with_altitude(41.0, -87.0, 180.0)]);
/// let trip = Trip::from_trace(trace, CandidateSet { geohash: None, link_ids: vec!["L1".into()] });
///
/// let result = match_trip(&trip, &links).unwrap().unwrap();
/// assert_eq!(result.link_id, "L1");
/// assert_eq!(result.dist_from_ref, vec![0.0]);
/// ```
pub fn match_trip(trip: &Trip, links: &LinkTable) -> Result<Option<TripMatch>> {
    if !trip.has_candidates() {
        return Ok(None);
    }

    let mut best: Option<(&Link, f64)> = None;
    for candidate in &trip.candidates {
        let link = links
            .get(candidate)
            .ok_or_unknown_link(&trip.sample_id, candidate)?;
        let score = average_distance_from_point(&link.reference, &trip.fixes)
            .ok_or_empty(&format!("trip '{}'", trip.sample_id))?;
        if !score.is_finite() {
            continue;
        }
        // Strict comparison keeps the earliest candidate on ties
        if best.map_or(true, |(_, best_score)| score < best_score) {
            best = Some((link, score));
        }
    }

    let Some((link, _)) = best else {
        return Ok(None);
    };

    Ok(Some(TripMatch {
        link_id: link.id.clone(),
        dist_from_ref: trip
            .fixes
            .iter()
            .map(|fix| great_circle_distance(&link.reference, fix))
            .collect(),
        dist_from_link: trip
            .fixes
            .iter()
            .map(|fix| perpendicular_distance(&link.reference, &link.non_reference, fix))
            .collect(),
        slopes: derive_slopes(&link.reference, &trip.fixes),
    }))
}

/// Slope sequence of `fixes`, seeded from `anchor`.
pub fn derive_slopes(anchor: &GeoPoint, fixes: &[GeoPoint]) -> Vec<f64> {
    let mut previous = anchor;
    fixes
        .iter()
        .map(|fix| {
            let slope = slope_degrees(previous, fix);
            previous = fix;
            slope
        })
        .collect()
}
