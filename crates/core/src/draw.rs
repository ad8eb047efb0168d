//! Lifecycle of a single in-progress polygon draw.
//!
//! ```text
//! Idle ──start──▶ Drawing ──finish──▶ Committing ──▶ Idle
//!                    │
//!                    └────abort────▶ Aborting ───▶ Idle
//! ```
//!
//! The session only tracks vertices and validity. Creating and removing the
//! backing feature, forms, notifications and timers is the surface's job.

use crate::error::{GeometryError, SessionError};
use crate::feature::FeatureId;
use crate::geometry::{
    close_ring, ring_has_self_intersection, ring_has_self_intersection_windowed, Coordinate,
    DEFAULT_INTERSECTION_WINDOW,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawPhase {
    #[default]
    Idle,
    Drawing,
    Committing,
    Aborting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexDecision {
    Accept,
    Reject(GeometryError),
}

/// Consulted before every vertex is appended to the sketch.
pub trait VertexHook {
    fn vertex_will_be_added(&self, vertices: &[Coordinate], candidate: Coordinate) -> VertexDecision;
}

impl<F> VertexHook for F
where
    F: Fn(&[Coordinate], Coordinate) -> VertexDecision,
{
    fn vertex_will_be_added(&self, vertices: &[Coordinate], candidate: Coordinate) -> VertexDecision {
        self(vertices, candidate)
    }
}

/// Default guard: refuse a vertex that repeats an existing corner or whose
/// closed ring would be self-intersecting (exhaustive check).
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfIntersectionGuard;

impl VertexHook for SelfIntersectionGuard {
    fn vertex_will_be_added(&self, vertices: &[Coordinate], candidate: Coordinate) -> VertexDecision {
        if !candidate.is_finite() {
            return VertexDecision::Reject(GeometryError::NonFinite);
        }
        if vertices.contains(&candidate) {
            return VertexDecision::Reject(GeometryError::DuplicateVertex);
        }
        let mut ring = Vec::with_capacity(vertices.len() + 2);
        ring.extend_from_slice(vertices);
        ring.push(candidate);
        if ring_has_self_intersection(&close_ring(&ring)) {
            VertexDecision::Reject(GeometryError::SelfIntersection)
        } else {
            VertexDecision::Accept
        }
    }
}

/// Corners left once exact repeats are dropped.
fn distinct_vertices(vertices: &[Coordinate]) -> usize {
    vertices
        .iter()
        .enumerate()
        .filter(|(i, v)| !vertices[..*i].contains(v))
        .count()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// The closed ring passed validation.
    Committed {
        feature: FeatureId,
        ring: Vec<Coordinate>,
    },
    Rejected {
        feature: FeatureId,
        reason: GeometryError,
    },
}

#[derive(Debug)]
struct ActiveDraw {
    feature: FeatureId,
    vertices: Vec<Coordinate>,
    /// Floating vertex following the pointer.
    pointer: Option<Coordinate>,
    valid: bool,
}

pub struct DrawSession {
    phase: DrawPhase,
    active: Option<ActiveDraw>,
    hook: Box<dyn VertexHook>,
    window: usize,
}

impl std::fmt::Debug for DrawSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawSession")
            .field("phase", &self.phase)
            .field("active", &self.active)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Default for DrawSession {
    fn default() -> Self {
        Self::new(DEFAULT_INTERSECTION_WINDOW)
    }
}

impl DrawSession {
    pub fn new(window: usize) -> Self {
        Self::with_hook(window, Box::new(SelfIntersectionGuard))
    }

    pub fn with_hook(window: usize, hook: Box<dyn VertexHook>) -> Self {
        Self {
            phase: DrawPhase::Idle,
            active: None,
            hook,
            window,
        }
    }

    pub fn set_hook(&mut self, hook: Box<dyn VertexHook>) {
        self.hook = hook;
    }

    fn transition(&mut self, to: DrawPhase) {
        tracing::debug!(from = ?self.phase, to = ?to, "Draw session transition");
        self.phase = to;
    }

    pub fn phase(&self) -> DrawPhase {
        self.phase
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Feature backing the current draw.
    pub fn feature(&self) -> Option<FeatureId> {
        self.active.as_ref().map(|a| a.feature)
    }

    pub fn vertices(&self) -> &[Coordinate] {
        self.active.as_ref().map(|a| a.vertices.as_slice()).unwrap_or(&[])
    }

    /// Result of the last live validation; true when idle.
    pub fn is_valid(&self) -> bool {
        self.active.as_ref().map(|a| a.valid).unwrap_or(true)
    }

    /// Begin drawing into `feature`. Refused while another draw is active.
    pub fn start(&mut self, feature: FeatureId) -> Result<(), SessionError> {
        if let Some(active) = &self.active {
            tracing::warn!(active = %active.feature, requested = %feature, "Draw start refused");
            return Err(SessionError::AlreadyDrawing(active.feature));
        }
        self.active = Some(ActiveDraw {
            feature,
            vertices: Vec::new(),
            pointer: None,
            valid: true,
        });
        self.transition(DrawPhase::Drawing);
        Ok(())
    }

    /// Run the vertex hook on `candidate` and append it if accepted.
    pub fn propose_vertex(&mut self, candidate: Coordinate) -> Result<VertexDecision, SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NotDrawing)?;
        let decision = self.hook.vertex_will_be_added(&active.vertices, candidate);
        match decision {
            VertexDecision::Accept => {
                active.vertices.push(candidate);
                active.pointer = None;
                active.valid = true;
            }
            VertexDecision::Reject(reason) => {
                tracing::debug!(feature = %active.feature, %reason, "Vertex rejected");
            }
        }
        Ok(decision)
    }

    /// Move the floating vertex and re-run the windowed check. Returns the
    /// new validity; an invalid sketch can still be edited.
    pub fn update_pointer(&mut self, pointer: Coordinate) -> Result<bool, SessionError> {
        let window = self.window;
        let active = self.active.as_mut().ok_or(SessionError::NotDrawing)?;
        active.pointer = Some(pointer);
        let mut sketch = active.vertices.clone();
        sketch.push(pointer);
        active.valid = !ring_has_self_intersection_windowed(&close_ring(&sketch), window);
        Ok(active.valid)
    }

    /// Committed vertices plus the floating one, closed.
    pub fn sketch_ring(&self) -> Option<Vec<Coordinate>> {
        let active = self.active.as_ref()?;
        let mut sketch = active.vertices.clone();
        if let Some(p) = active.pointer {
            sketch.push(p);
        }
        Some(close_ring(&sketch))
    }

    /// Close the ring and validate it exhaustively. The session is idle
    /// afterwards whatever the outcome.
    pub fn finish(&mut self) -> Result<FinishOutcome, SessionError> {
        let active = self.active.take().ok_or(SessionError::NotDrawing)?;
        self.transition(DrawPhase::Committing);

        let count = distinct_vertices(&active.vertices);
        let ring = close_ring(&active.vertices);
        let outcome = if count < 3 {
            FinishOutcome::Rejected {
                feature: active.feature,
                reason: GeometryError::TooFewVertices(count),
            }
        } else if ring_has_self_intersection(&ring) {
            FinishOutcome::Rejected {
                feature: active.feature,
                reason: GeometryError::SelfIntersection,
            }
        } else {
            FinishOutcome::Committed {
                feature: active.feature,
                ring,
            }
        };

        self.transition(DrawPhase::Idle);
        Ok(outcome)
    }

    /// Drop the draw without validation; returns its feature.
    pub fn abort(&mut self) -> Result<FeatureId, SessionError> {
        let active = self.active.take().ok_or(SessionError::NotDrawing)?;
        self.transition(DrawPhase::Aborting);
        self.transition(DrawPhase::Idle);
        Ok(active.feature)
    }
}
