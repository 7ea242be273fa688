//! Geohash-keyed candidate index of road links.
//!
//! Each link is filed under the geohash of its reference node at two
//! precisions: a fine level (default 8, roughly 38m x 19m) and a coarse level
//! (default 7, roughly 153m). Buckets keep link-ingestion order and are not
//! deduplicated. The index is built once and only read afterwards, so it can
//! be shared across matching workers without locking.

use std::collections::HashMap;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{GeoPoint, Link, ProbeMatchError, Result};

/// Longest geohash the encoder supports.
pub const MAX_PRECISION: usize = 12;

/// Geohash-encode a point at the given precision.
///
/// Precisions outside `1..=12` are rejected before encoding.
pub fn encode_point(point: &GeoPoint, precision: usize) -> Result<String> {
    if !(1..=MAX_PRECISION).contains(&precision) {
        return Err(ProbeMatchError::ConfigError {
            message: format!("geohash precision {} out of range 1..={}", precision, MAX_PRECISION),
        });
    }
    let coord = Coord {
        x: point.longitude,
        y: point.latitude,
    };
    geohash::encode(coord, precision).map_err(|_| ProbeMatchError::InvalidCoordinate {
        latitude: point.latitude,
        longitude: point.longitude,
    })
}

/// Link identifiers bucketed by geohash at a single precision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeohashIndex {
    precision: usize,
    buckets: HashMap<String, Vec<String>>,
}

impl GeohashIndex {
    /// Create an empty index at `precision`.
    pub fn new(precision: usize) -> Self {
        Self {
            precision,
            buckets: HashMap::new(),
        }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    /// File a link id under the geohash of `point`.
    pub fn insert(&mut self, point: &GeoPoint, link_id: &str) -> Result<()> {
        let key = encode_point(point, self.precision)?;
        self.insert_key(key, link_id);
        Ok(())
    }

    fn insert_key(&mut self, key: String, link_id: &str) {
        self.buckets.entry(key).or_default().push(link_id.to_string());
    }

    /// Link ids anchored in the cell `geohash`, in ingestion order.
    pub fn get(&self, geohash: &str) -> Option<&[String]> {
        self.buckets.get(geohash).map(|ids| ids.as_slice())
    }

    /// Number of non-empty cells.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// The fine and coarse geohash indexes over a link set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialIndex {
    pub fine: GeohashIndex,
    pub coarse: GeohashIndex,
}

impl SpatialIndex {
    /// Build both indexes from links in ingestion order.
    ///
    /// Links whose reference node cannot be encoded are left out of the
    /// index (they remain in the link table but can never be a candidate).
    pub fn build(links: &[Link], fine_precision: usize, coarse_precision: usize) -> Self {
        let mut fine = GeohashIndex::new(fine_precision);
        let mut coarse = GeohashIndex::new(coarse_precision);
        let mut skipped = 0usize;

        for link in links {
            // Both keys are encoded before either tier is touched
            let keys = encode_point(&link.reference, fine_precision)
                .and_then(|f| encode_point(&link.reference, coarse_precision).map(|c| (f, c)));
            match keys {
                Ok((fine_key, coarse_key)) => {
                    fine.insert_key(fine_key, &link.id);
                    coarse.insert_key(coarse_key, &link.id);
                }
                Err(e) => {
                    log::debug!("[SpatialIndex] Skipping link {}: {}", link.id, e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            log::warn!("[SpatialIndex] {} links could not be indexed", skipped);
        }
        log::info!(
            "[SpatialIndex] Indexed {} links into {} fine / {} coarse cells",
            links.len() - skipped,
            fine.len(),
            coarse.len()
        );

        Self { fine, coarse }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TravelDirection;

    fn link_at(id: &str, lat: f64, lng: f64) -> Link {
        Link::new(
            id,
            format!("{}-ref", id),
            format!("{}-nref", id),
            TravelDirection::Both,
            GeoPoint::new(lat, lng),
            GeoPoint::new(lat + 0.001, lng),
            vec![],
            None,
        )
    }

    #[test]
    fn test_encode_known_cell() {
        // Reference value from the geohash crate documentation ("ww8p1r4t8")
        let point = GeoPoint::new(37.8324, 112.5584);
        assert_eq!(encode_point(&point, 7).unwrap(), "ww8p1r4");
        assert_eq!(encode_point(&point, 8).unwrap(), "ww8p1r4t");
    }

    #[test]
    fn test_encode_invalid_coordinate() {
        let result = encode_point(&GeoPoint::new(95.0, 0.0), 8);
        assert!(matches!(result, Err(ProbeMatchError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_build_preserves_ingestion_order() {
        let links = vec![
            link_at("a", 41.0, -87.0),
            link_at("b", 41.0, -87.0),
            link_at("c", 41.0, -87.0),
        ];
        let index = SpatialIndex::build(&links, 8, 7);

        let key8 = encode_point(&GeoPoint::new(41.0, -87.0), 8).unwrap();
        let key7 = encode_point(&GeoPoint::new(41.0, -87.0), 7).unwrap();
        assert_eq!(index.fine.get(&key8).unwrap(), ["a", "b", "c"]);
        assert_eq!(index.coarse.get(&key7).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_build_keeps_duplicates() {
        let links = vec![link_at("a", 41.0, -87.0), link_at("a", 41.0, -87.0)];
        let index = SpatialIndex::build(&links, 8, 7);
        let key8 = encode_point(&GeoPoint::new(41.0, -87.0), 8).unwrap();
        assert_eq!(index.fine.get(&key8).unwrap().len(), 2);
    }

    #[test]
    fn test_build_separates_cells() {
        // ~1km apart: different cells at both precisions
        let links = vec![link_at("a", 41.0, -87.0), link_at("b", 41.01, -87.0)];
        let index = SpatialIndex::build(&links, 8, 7);
        assert_eq!(index.fine.len(), 2);
        assert_eq!(index.coarse.len(), 2);
    }

    #[test]
    fn test_encode_rejects_bad_precision() {
        let point = GeoPoint::new(41.0, -87.0);
        assert!(matches!(encode_point(&point, 0), Err(ProbeMatchError::ConfigError { .. })));
        assert!(matches!(encode_point(&point, 13), Err(ProbeMatchError::ConfigError { .. })));
        assert_eq!(encode_point(&point, 12).unwrap().len(), 12);
    }

    #[test]
    fn test_build_keeps_tiers_consistent() {
        let links = vec![link_at("a", 41.0, -87.0), link_at("b", 41.01, -87.0)];
        let index = SpatialIndex::build(&links, 8, 13);
        assert!(index.fine.is_empty());
        assert!(index.coarse.is_empty());
    }

    #[test]
    fn test_build_skips_unencodable() {
        let links = vec![link_at("bad", 120.0, -87.0), link_at("ok", 41.0, -87.0)];
        let index = SpatialIndex::build(&links, 8, 7);
        assert_eq!(index.fine.len(), 1);
        assert_eq!(index.coarse.len(), 1);
    }
}
