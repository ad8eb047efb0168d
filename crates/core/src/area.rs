//! Field area in hectares, memoized by ring fingerprint.

use std::collections::{HashMap, VecDeque};

use geo::{Area, Coord, GeodesicArea, LineString, Polygon};

use crate::error::GeometryError;
use crate::feature::Feature;
use crate::geometry::Coordinate;
use crate::view;

pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Default bound of the area cache.
pub const AREA_CACHE_CAPACITY: usize = 100;

/// How the underlying primitive measures a projected ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaMethod {
    /// Shoelace area of the projected coordinates.
    #[default]
    Planar,
    /// Unproject from Web Mercator and measure on the ellipsoid.
    Geodesic,
}

/// Area of a closed ring in square meters.
pub fn ring_area_m2(ring: &[Coordinate], method: AreaMethod) -> Result<f64, GeometryError> {
    if ring.len() < 4 {
        return Err(GeometryError::TooFewVertices(ring.len().saturating_sub(1)));
    }
    if !ring.iter().all(Coordinate::is_finite) {
        return Err(GeometryError::NonFinite);
    }

    let coords: Vec<Coord<f64>> = match method {
        AreaMethod::Planar => ring.iter().map(|c| Coord { x: c.x, y: c.y }).collect(),
        AreaMethod::Geodesic => ring
            .iter()
            .map(|&c| {
                let (lon, lat) = view::mercator_to_lon_lat(c);
                Coord { x: lon, y: lat }
            })
            .collect(),
    };
    let polygon = Polygon::new(LineString::from(coords), vec![]);

    let area = match method {
        AreaMethod::Planar => polygon.unsigned_area(),
        AreaMethod::Geodesic => polygon.geodesic_area_unsigned(),
    };
    if area.is_finite() {
        Ok(area)
    } else {
        Err(GeometryError::NonFinite)
    }
}

/// Area of a closed ring in hectares. Failures are logged and measured as 0.
pub fn compute_area(ring: &[Coordinate], method: AreaMethod) -> f64 {
    match ring_area_m2(ring, method) {
        Ok(m2) => m2 / SQUARE_METERS_PER_HECTARE,
        Err(e) => {
            tracing::warn!(error = %e, points = ring.len(), "Area calculation failed");
            0.0
        }
    }
}

/// Stable serialization of a ring, used as the cache key.
pub fn fingerprint(ring: &[Coordinate]) -> String {
    serde_json::to_string(ring).unwrap_or_else(|_| format!("{ring:?}"))
}

/// Bounded fingerprint → hectares map. Evicts in insertion order (FIFO);
/// hits do not refresh an entry.
#[derive(Debug)]
pub struct AreaCache {
    capacity: usize,
    order: VecDeque<String>,
    values: HashMap<String, f64>,
}

impl AreaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity),
            values: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Insert a value, returning the evicted key if the bound was hit.
    pub fn insert(&mut self, key: String, value: f64) -> Option<String> {
        if let Some(existing) = self.values.get_mut(&key) {
            *existing = value;
            return None;
        }

        let evicted = if self.order.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(k) = &oldest {
                self.values.remove(k);
            }
            oldest
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.values.insert(key, value);
        evicted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AreaCache {
    fn default() -> Self {
        Self::new(AREA_CACHE_CAPACITY)
    }
}

/// Area primitive plus its cache.
#[derive(Debug, Default)]
pub struct AreaCalculator {
    method: AreaMethod,
    cache: AreaCache,
}

impl AreaCalculator {
    pub fn new(method: AreaMethod, capacity: usize) -> Self {
        Self {
            method,
            cache: AreaCache::new(capacity),
        }
    }

    pub fn method(&self) -> AreaMethod {
        self.method
    }

    /// Uncached measurement of a ring, in hectares.
    pub fn compute_area(&self, ring: &[Coordinate]) -> f64 {
        compute_area(ring, self.method)
    }

    /// Cached measurement of a polygon feature, in hectares. Non-polygon
    /// features measure 0.
    pub fn compute_feature_area(&mut self, feature: &Feature) -> f64 {
        let Some(ring) = feature.ring() else {
            tracing::debug!(feature = %feature.id, "Area requested for a non-polygon feature");
            return 0.0;
        };

        let key = fingerprint(ring);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let area = self.compute_area(ring);
        if let Some(evicted) = self.cache.insert(key, area) {
            tracing::trace!(evicted_len = evicted.len(), "Area cache evicted oldest entry");
        }
        area
    }

    pub fn cache(&self) -> &AreaCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureCollection, FeatureKind, Geometry};

    fn rect(w: f64, h: f64) -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(w, 0.0),
            Coordinate::new(w, h),
            Coordinate::new(0.0, h),
            Coordinate::new(0.0, 0.0),
        ]
    }

    fn feature_with(ring: Vec<Coordinate>) -> Feature {
        let mut fc = FeatureCollection::new();
        let id = fc.add(FeatureKind::Drawing, Geometry::Polygon(ring));
        fc.get(id).unwrap().clone()
    }

    #[test]
    fn test_450000_square_meters_is_45_hectares() {
        let ring = rect(900.0, 500.0);
        assert!((compute_area(&ring, AreaMethod::Planar) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_clockwise_ring_is_non_negative() {
        let mut ring = rect(100.0, 100.0);
        ring.reverse();
        assert!((compute_area(&ring, AreaMethod::Planar) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_ring_measures_zero() {
        let line = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(0.0, 0.0),
        ];
        assert_eq!(compute_area(&line, AreaMethod::Planar), 0.0);
        assert_eq!(
            ring_area_m2(&line, AreaMethod::Planar),
            Err(GeometryError::TooFewVertices(2))
        );
    }

    #[test]
    fn test_non_finite_ring_measures_zero() {
        let mut ring = rect(10.0, 10.0);
        ring[2].x = f64::NAN;
        assert_eq!(compute_area(&ring, AreaMethod::Planar), 0.0);
    }

    #[test]
    fn test_geodesic_is_smaller_than_mercator_away_from_equator() {
        // A 1 km square centered near Moscow; Mercator inflates it by
        // roughly 1 / cos²(lat).
        let center = view::lon_lat_to_mercator(37.6173, 55.7558);
        let ring = vec![
            Coordinate::new(center.x - 500.0, center.y - 500.0),
            Coordinate::new(center.x + 500.0, center.y - 500.0),
            Coordinate::new(center.x + 500.0, center.y + 500.0),
            Coordinate::new(center.x - 500.0, center.y + 500.0),
            Coordinate::new(center.x - 500.0, center.y - 500.0),
        ];
        let planar = compute_area(&ring, AreaMethod::Planar);
        let geodesic = compute_area(&ring, AreaMethod::Geodesic);
        assert!((planar - 100.0).abs() < 1e-3);
        assert!(geodesic > 25.0 && geodesic < 40.0, "got {geodesic}");
    }

    #[test]
    fn test_feature_area_is_idempotent_and_cached_once() {
        let mut calc = AreaCalculator::default();
        let f = feature_with(rect(900.0, 500.0));
        let first = calc.compute_feature_area(&f);
        let second = calc.compute_feature_area(&f);
        assert_eq!(first, second);
        assert_eq!(calc.cache().len(), 1);
    }

    #[test]
    fn test_feature_area_for_point_is_zero() {
        let mut fc = FeatureCollection::new();
        let id = fc.add(FeatureKind::Location, Geometry::Point(Coordinate::new(0.0, 0.0)));
        let mut calc = AreaCalculator::default();
        assert_eq!(calc.compute_feature_area(fc.get(id).unwrap()), 0.0);
        assert!(calc.cache().is_empty());
    }

    #[test]
    fn test_cache_never_exceeds_capacity_and_evicts_oldest() {
        let mut cache = AreaCache::new(AREA_CACHE_CAPACITY);
        for i in 0..AREA_CACHE_CAPACITY {
            cache.insert(format!("k{i}"), i as f64);
        }
        assert_eq!(cache.len(), 100);
        let evicted = cache.insert("k100".to_string(), 100.0);
        assert_eq!(evicted.as_deref(), Some("k0"));
        assert_eq!(cache.len(), 100);
        assert!(!cache.contains("k0"));
        assert!(cache.contains("k1"));
        assert!(cache.contains("k100"));
    }

    #[test]
    fn test_cache_hit_does_not_refresh_entry() {
        let mut cache = AreaCache::new(2);
        cache.insert("a".to_string(), 1.0);
        cache.insert("b".to_string(), 2.0);
        assert_eq!(cache.get("a"), Some(1.0));
        // FIFO, not LRU: "a" goes first even though it was just read
        assert_eq!(cache.insert("c".to_string(), 3.0).as_deref(), Some("a"));
    }

    #[test]
    fn test_calculator_cache_is_bounded() {
        let mut calc = AreaCalculator::new(AreaMethod::Planar, 100);
        for i in 0..150 {
            let f = feature_with(rect(10.0 + i as f64, 10.0));
            calc.compute_feature_area(&f);
        }
        assert_eq!(calc.cache().len(), 100);
        // The first ring was evicted; the last one is still cached
        assert!(!calc.cache().contains(&fingerprint(&rect(10.0, 10.0))));
        assert!(calc.cache().contains(&fingerprint(&rect(159.0, 10.0))));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(&rect(1.0, 2.0)), fingerprint(&rect(1.0, 2.0)));
        assert_ne!(fingerprint(&rect(1.0, 2.0)), fingerprint(&rect(2.0, 1.0)));
        assert_eq!(fingerprint(&[Coordinate::new(1.0, 2.0)]), "[[1.0,2.0]]");
    }
}
