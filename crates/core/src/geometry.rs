use serde::{Deserialize, Serialize};

/// A point in the projected working reference system (EPSG:3857, meters).
///
/// Serializes as a two-element `[x, y]` array, the shape field records use
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y]
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Edges compared ahead of each edge by the windowed check.
pub const DEFAULT_INTERSECTION_WINDOW: usize = 3;

/// Counter-clockwise turn test for a → b → c.
///
/// Only the sign of the cross product matters; collinear points count as
/// "not counter-clockwise".
pub fn orientation(a: Coordinate, b: Coordinate, c: Coordinate) -> bool {
    (c.y - a.y) * (b.x - a.x) - (b.y - a.y) * (c.x - a.x) > 0.0
}

/// Proper crossing test for segments (a, b) and (c, d).
///
/// Collinear and endpoint-touching cases fall out of the orientation
/// comparison and are not handled separately.
pub fn segments_intersect(a: Coordinate, b: Coordinate, c: Coordinate, d: Coordinate) -> bool {
    orientation(a, c, d) != orientation(b, c, d) && orientation(a, b, c) != orientation(a, b, d)
}

/// Number of edges of a closed ring.
fn edge_count(ring: &[Coordinate]) -> usize {
    ring.len().saturating_sub(1)
}

/// Edges `i` and `j` (with `i < j`) share the closing vertex.
fn is_closing_pair(i: usize, j: usize, edges: usize) -> bool {
    i == 0 && j == edges - 1
}

/// Exhaustive self-intersection check over every pair of non-adjacent
/// edges of a closed ring. O(n²) in the edge count.
pub fn ring_has_self_intersection(ring: &[Coordinate]) -> bool {
    let n = edge_count(ring);
    if n < 3 {
        return false;
    }

    for i in 0..n {
        for j in (i + 2)..n {
            if is_closing_pair(i, j, n) {
                continue;
            }
            if segments_intersect(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return true;
            }
        }
    }
    false
}

/// Bounded variant of [`ring_has_self_intersection`]: each edge is only
/// compared with the next `window` non-adjacent edges.
///
/// Crossings between edges further apart than the window are missed. Cheap
/// enough to run on every pointer move while a vertex is being dragged.
pub fn ring_has_self_intersection_windowed(ring: &[Coordinate], window: usize) -> bool {
    let n = edge_count(ring);
    if n < 3 || window == 0 {
        return false;
    }

    for i in 0..n {
        let last = (i + 1 + window).min(n - 1);
        for j in (i + 2)..=last {
            if is_closing_pair(i, j, n) {
                continue;
            }
            if segments_intersect(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return true;
            }
        }
    }
    false
}

/// Whether the ring's last point repeats its first.
pub fn is_closed(ring: &[Coordinate]) -> bool {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => ring.len() > 1 && first == last,
        _ => false,
    }
}

/// Copy `vertices` into a closed ring, appending the first vertex if needed.
pub fn close_ring(vertices: &[Coordinate]) -> Vec<Coordinate> {
    let mut ring = vertices.to_vec();
    if let Some(&first) = vertices.first() {
        if !is_closed(vertices) {
            ring.push(first);
        }
    }
    ring
}

/// Distinct vertices of a closed ring (the closing duplicate excluded).
pub fn vertex_count(ring: &[Coordinate]) -> usize {
    if is_closed(ring) {
        ring.len() - 1
    } else {
        ring.len()
    }
}

pub fn squared_distance(a: Coordinate, b: Coordinate) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Bounding box of the given points, `None` when empty.
    pub fn of(coords: &[Coordinate]) -> Option<Self> {
        let first = coords.first()?;
        let mut extent = Extent {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for c in &coords[1..] {
            extent.min_x = extent.min_x.min(c.x);
            extent.min_y = extent.min_y.min(c.y);
            extent.max_x = extent.max_x.max(c.x);
            extent.max_y = extent.max_y.max(c.y);
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    /// Grow the box by `d` on every side.
    pub fn buffer(&self, d: f64) -> Self {
        Extent {
            min_x: self.min_x - d,
            min_y: self.min_y - d,
            max_x: self.max_x + d,
            max_y: self.max_y + d,
        }
    }
}
