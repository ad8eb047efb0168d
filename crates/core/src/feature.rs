use serde::{Deserialize, Serialize};

use crate::geometry::{close_ring, Coordinate, Extent};

/// Identity of a feature on the map surface. Stable for the feature's life
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(u64);

impl FeatureId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The `type` tag carried by every feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Loaded from the API.
    Field,
    /// Drawn in this session, not yet saved.
    Drawing,
    /// Geolocation accuracy circle or marker.
    Location,
    /// Temporary outline shown after focusing a field.
    Highlight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Closed ring once finished; an open sketch while drawing.
    Polygon(Vec<Coordinate>),
    Circle { center: Coordinate, radius: f64 },
    Point(Coordinate),
}

/// Render style selected by the core; the rendering surface maps it to
/// colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureStyle {
    Default,
    /// Tentative style for a self-intersecting outline.
    Invalid,
    Highlight,
    AccuracyCircle,
    LocationMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub kind: FeatureKind,
    pub geometry: Geometry,
    pub style: FeatureStyle,
    /// Persisted field id, `None` for unsaved drawings.
    pub field_id: Option<i64>,
    pub name: Option<String>,
    pub crop: Option<String>,
    /// Hectares.
    pub area: Option<f64>,
    pub temporary: bool,
}

impl Feature {
    /// Polygon coordinates, `None` for point and circle features.
    pub fn ring(&self) -> Option<&[Coordinate]> {
        match &self.geometry {
            Geometry::Polygon(ring) => Some(ring),
            _ => None,
        }
    }

    pub fn ring_mut(&mut self) -> Option<&mut Vec<Coordinate>> {
        match &mut self.geometry {
            Geometry::Polygon(ring) => Some(ring),
            _ => None,
        }
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self.geometry, Geometry::Polygon(_))
    }

    /// Fields and drawings take part in snapping and vertex editing.
    pub fn is_editable(&self) -> bool {
        self.is_polygon() && matches!(self.kind, FeatureKind::Field | FeatureKind::Drawing)
    }

    pub fn extent(&self) -> Option<Extent> {
        match &self.geometry {
            Geometry::Polygon(ring) => Extent::of(ring),
            Geometry::Circle { center, radius } => Some(Extent {
                min_x: center.x - radius,
                min_y: center.y - radius,
                max_x: center.x + radius,
                max_y: center.y + radius,
            }),
            Geometry::Point(c) => Extent::of(std::slice::from_ref(c)),
        }
    }
}

/// A field as delivered by the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub crop: String,
    #[serde(default)]
    pub area: f64,
    /// Boundary in EPSG:3857; empty for list-only records.
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
}

impl FieldRecord {
    /// Closed boundary ring, `None` when the record has too few points to
    /// enclose any area.
    pub fn ring(&self) -> Option<Vec<Coordinate>> {
        let ring = close_ring(&self.coordinates);
        (ring.len() >= 4).then_some(ring)
    }
}

/// The vector source: every feature currently on the map, in insertion
/// (draw) order.
#[derive(Debug, Default)]
pub struct FeatureCollection {
    features: Vec<Feature>,
    next_id: u64,
    revision: u64,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature with default attributes and return its id.
    pub fn add(&mut self, kind: FeatureKind, geometry: Geometry) -> FeatureId {
        self.next_id += 1;
        let id = FeatureId(self.next_id);
        let style = match kind {
            FeatureKind::Highlight => FeatureStyle::Highlight,
            _ => FeatureStyle::Default,
        };
        self.features.push(Feature {
            id,
            kind,
            geometry,
            style,
            field_id: None,
            name: None,
            crop: None,
            area: None,
            temporary: false,
        });
        self.revision += 1;
        id
    }

    pub fn remove(&mut self, id: FeatureId) -> Option<Feature> {
        let idx = self.features.iter().position(|f| f.id == id)?;
        self.revision += 1;
        Some(self.features.remove(idx))
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Mutable access; counts as a change for redraw purposes.
    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        let feature = self.features.iter_mut().find(|f| f.id == id)?;
        self.revision += 1;
        Some(feature)
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn ids_of_kind(&self, kind: FeatureKind) -> Vec<FeatureId> {
        self.features
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.id)
            .collect()
    }

    pub fn find_by_field_id(&self, field_id: i64) -> Option<&Feature> {
        self.features.iter().find(|f| f.field_id == Some(field_id))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bumped on every mutation; the renderer compares it to skip redraws.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(10.0, 10.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_ids_are_unique_and_not_reused() {
        let mut fc = FeatureCollection::new();
        let a = fc.add(FeatureKind::Field, Geometry::Polygon(square()));
        fc.remove(a);
        let b = fc.add(FeatureKind::Field, Geometry::Polygon(square()));
        assert_ne!(a, b);
        assert_eq!(fc.len(), 1);
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let mut fc = FeatureCollection::new();
        let r0 = fc.revision();
        let id = fc.add(FeatureKind::Drawing, Geometry::Polygon(square()));
        let r1 = fc.revision();
        assert!(r1 > r0);
        fc.get_mut(id).unwrap().temporary = true;
        assert!(fc.revision() > r1);
        let r2 = fc.revision();
        let _ = fc.get(id);
        assert_eq!(fc.revision(), r2);
    }

    #[test]
    fn test_ids_of_kind_filters() {
        let mut fc = FeatureCollection::new();
        fc.add(FeatureKind::Field, Geometry::Polygon(square()));
        fc.add(FeatureKind::Location, Geometry::Point(Coordinate::new(1.0, 1.0)));
        fc.add(FeatureKind::Field, Geometry::Polygon(square()));
        assert_eq!(fc.ids_of_kind(FeatureKind::Field).len(), 2);
        assert_eq!(fc.ids_of_kind(FeatureKind::Location).len(), 1);
        assert!(fc.ids_of_kind(FeatureKind::Highlight).is_empty());
    }

    #[test]
    fn test_highlight_gets_highlight_style() {
        let mut fc = FeatureCollection::new();
        let id = fc.add(FeatureKind::Highlight, Geometry::Polygon(square()));
        assert_eq!(fc.get(id).unwrap().style, FeatureStyle::Highlight);
    }

    #[test]
    fn test_circle_extent() {
        let mut fc = FeatureCollection::new();
        let id = fc.add(
            FeatureKind::Location,
            Geometry::Circle { center: Coordinate::new(100.0, 50.0), radius: 10.0 },
        );
        let e = fc.get(id).unwrap().extent().unwrap();
        assert_eq!(e.min_x, 90.0);
        assert_eq!(e.max_y, 60.0);
    }

    #[test]
    fn test_field_record_deserializes() {
        let json = r#"{"id":7,"name":"North","crop":"Barley","area":12.5,"coordinates":[[0,0],[10,0],[10,10],[0,10]]}"#;
        let rec: FieldRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, 7);
        assert_eq!(rec.coordinates.len(), 4);
        // Open rings from the API are closed on the way in
        assert_eq!(rec.ring().unwrap().len(), 5);
    }

    #[test]
    fn test_field_record_without_coordinates() {
        let json = r#"{"id":1,"name":"Field 1","area":45.2,"crop":"Winter wheat"}"#;
        let rec: FieldRecord = serde_json::from_str(json).unwrap();
        assert!(rec.coordinates.is_empty());
        assert!(rec.ring().is_none());
    }
}
