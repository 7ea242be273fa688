//! Candidate link selection for a trip.
//!
//! A trip is assigned the links of a single geohash cell:
//! 1. The most common fine-precision cell among the trip's fixes, if that
//!    cell holds at least `min_fine_candidates` links.
//! 2. Otherwise the most common coarse-precision cell, if it holds any links.
//! 3. Otherwise nothing, and the trip is unmatchable.
//!
//! When several cells are equally common, the one first reached while walking
//! the fixes in order wins. The result therefore depends only on the fixes
//! and the index contents.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::spatial_index::{encode_point, GeohashIndex};
use crate::{GeoPoint, SpatialIndex};

/// The geohash cell chosen for a trip and the links filed under it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Cell key, `None` when no cell qualified
    pub geohash: Option<String>,
    /// Candidate link ids in bucket order
    pub link_ids: Vec<String>,
}

impl CandidateSet {
    /// The empty result for an unmatchable trip.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.link_ids.is_empty()
    }
}

/// Most common geohash among `points` at `precision`, first-seen on ties.
///
/// Points that cannot be encoded are ignored. Returns `None` if no point
/// could be encoded.
pub fn most_frequent_geohash(points: &[GeoPoint], precision: usize) -> Option<String> {
    // Counts in first-seen order; the map only locates a key's slot.
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for point in points {
        let Ok(hash) = encode_point(point, precision) else {
            continue;
        };
        match slots.get(&hash) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(hash.clone(), counts.len());
                counts.push((hash, 1));
            }
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (hash, count) in counts {
        if best.as_ref().map_or(true, |(_, best_count)| count > *best_count) {
            best = Some((hash, count));
        }
    }
    best.map(|(hash, _)| hash)
}

/// Choose the candidate links for a trip's fixes.
pub fn select_candidates(
    points: &[GeoPoint],
    index: &SpatialIndex,
    min_fine_candidates: usize,
) -> CandidateSet {
    if let Some(set) = lookup(points, &index.fine, min_fine_candidates.max(1)) {
        return set;
    }
    if let Some(set) = lookup(points, &index.coarse, 1) {
        return set;
    }
    CandidateSet::empty()
}

fn lookup(points: &[GeoPoint], index: &GeohashIndex, min_links: usize) -> Option<CandidateSet> {
    let hash = most_frequent_geohash(points, index.precision())?;
    let bucket = index.get(&hash)?;
    if bucket.len() < min_links {
        return None;
    }
    Some(CandidateSet {
        geohash: Some(hash),
        link_ids: bucket.to_vec(),
    })
}
