//! The map surface adapter.
//!
//! Owns the feature collection, the camera, the draw session and the
//! registries around them, and turns pointer gestures and bus events into
//! state changes plus outgoing events. Nothing here touches the DOM; the
//! host feeds gestures in world coordinates and renders [`MapSurface::features`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::area::AreaCalculator;
use crate::config::AppConfig;
use crate::draw::{DrawSession, FinishOutcome, VertexDecision, VertexHook};
use crate::error::LocationError;
use crate::event_bus::{AreaReply, EventBus, MapEvent, Notification, SubscriptionId, Topic};
use crate::feature::{Feature, FeatureCollection, FeatureId, FeatureKind, FeatureStyle, FieldRecord, Geometry};
use crate::forms::FieldFormRegistry;
use crate::geometry::{
    ring_has_self_intersection, ring_has_self_intersection_windowed, squared_distance, Coordinate,
    Extent,
};
use crate::location::{GeoPosition, Geolocator};
use crate::timers::{Clock, TimerQueue, TimerTask};
use crate::view::{self, View};

/// What a feature's geometry-change listener does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeListener {
    /// Sketch being drawn: windowed check on every change.
    LiveValidation,
    /// Finished polygon: republish its area once edits settle.
    DebouncedArea,
}

/// Which pointer interactions are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interactions {
    pub draw: bool,
    pub modify: bool,
    pub snap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VertexDrag {
    feature: FeatureId,
    index: usize,
}

pub struct MapSurface {
    config: AppConfig,
    bus: EventBus,
    clock: Rc<dyn Clock>,
    geolocator: Box<dyn Geolocator>,
    features: FeatureCollection,
    view: View,
    session: DrawSession,
    areas: AreaCalculator,
    forms: FieldFormRegistry,
    listeners: HashMap<FeatureId, ChangeListener>,
    timers: TimerQueue,
    interactions: Interactions,
    drag: Option<VertexDrag>,
    highlight: Option<FeatureId>,
}

impl std::fmt::Debug for MapSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSurface")
            .field("features", &self.features.len())
            .field("session", &self.session)
            .field("interactions", &self.interactions)
            .field("pending_timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl MapSurface {
    pub fn new(
        config: AppConfig,
        bus: EventBus,
        clock: Rc<dyn Clock>,
        geolocator: Box<dyn Geolocator>,
    ) -> Self {
        let [lon, lat] = config.map.default_center;
        let view = View::from_lon_lat(lon, lat, config.map.default_zoom);
        let session = DrawSession::new(config.draw.intersection_window);
        let areas = AreaCalculator::new(config.draw.area_method, config.draw.area_cache_capacity);
        Self {
            config,
            bus,
            clock,
            geolocator,
            features: FeatureCollection::new(),
            view,
            session,
            areas,
            forms: FieldFormRegistry::new(),
            listeners: HashMap::new(),
            timers: TimerQueue::new(),
            interactions: Interactions::default(),
            drag: None,
            highlight: None,
        }
    }

    /// Subscribe `surface` to the topics it consumes. Handlers hold a weak
    /// reference, so dropping the surface silences them.
    pub fn connect(surface: &Rc<RefCell<Self>>) -> Vec<SubscriptionId> {
        let bus = surface.borrow().bus.clone();
        let topics = [
            Topic::EnableDrawing,
            Topic::DisableDrawing,
            Topic::RenderFields,
            Topic::RemoveFeature,
            Topic::FocusField,
            Topic::RequestArea,
            Topic::LocateUser,
            Topic::LocationResolved,
        ];
        topics
            .into_iter()
            .map(|topic| {
                let weak: Weak<RefCell<Self>> = Rc::downgrade(surface);
                bus.subscribe(topic, move |event| {
                    let Some(surface) = weak.upgrade() else {
                        return;
                    };
                    match surface.try_borrow_mut() {
                        Ok(mut s) => s.handle(event),
                        Err(_) => {
                            tracing::warn!(topic = %event.topic(), "Map surface busy, event dropped")
                        }
                    };
                })
            })
            .collect()
    }

    /// Apply one consumed event.
    pub fn handle(&mut self, event: &MapEvent) {
        match event {
            MapEvent::EnableDrawing => self.enable_drawing_mode(),
            MapEvent::DisableDrawing => self.disable_drawing_mode(),
            MapEvent::RenderFields(records) => self.render_fields(records),
            MapEvent::RemoveFeature(id) => {
                self.remove_feature(*id);
            }
            MapEvent::FocusField(record) => self.focus_on_field(record),
            MapEvent::RequestArea { feature, reply } => self.request_area(*feature, reply),
            MapEvent::LocateUser => self.locate_user(),
            MapEvent::LocationResolved(result) => self.handle_location(*result),
            _ => {}
        }
    }

    fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    fn notify(&self, notification: Notification) {
        self.bus.publish(MapEvent::ShowNotification(notification));
    }

    // --- accessors ---

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    pub fn forms(&self) -> &FieldFormRegistry {
        &self.forms
    }

    pub fn interactions(&self) -> Interactions {
        self.interactions
    }

    pub fn area_calculator(&self) -> &AreaCalculator {
        &self.areas
    }

    pub fn listener(&self, feature: FeatureId) -> Option<ChangeListener> {
        self.listeners.get(&feature).copied()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn set_vertex_hook(&mut self, hook: Box<dyn VertexHook>) {
        self.session.set_hook(hook);
    }

    /// Earliest pending timer, for the host to arm its real timeout.
    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    // --- drawing mode ---

    pub fn enable_drawing_mode(&mut self) {
        if !self.config.draw.can_draw_fields {
            tracing::info!("Drawing is disabled for this map");
            return;
        }
        if self.interactions.draw {
            return;
        }
        self.interactions = Interactions {
            draw: true,
            modify: true,
            snap: true,
        };
        tracing::info!("Drawing mode enabled");
    }

    pub fn disable_drawing_mode(&mut self) {
        if self.interactions == Interactions::default() && !self.session.is_drawing() {
            return;
        }
        if self.session.is_drawing() {
            self.cancel_drawing();
        }
        self.drag = None;

        let temporary: Vec<FeatureId> = self
            .features
            .iter()
            .filter(|f| f.temporary)
            .map(|f| f.id)
            .collect();
        for id in &temporary {
            self.remove_feature(*id);
        }

        self.interactions = Interactions::default();
        tracing::info!(discarded = temporary.len(), "Drawing mode disabled");
    }

    // --- gestures ---

    fn snap_tolerance(&self) -> f64 {
        self.config.draw.snap_pixel_tolerance * self.view.state_at(self.now()).resolution()
    }

    /// Features the pointer can snap to or grab.
    fn is_interactive(&self, feature: &Feature) -> bool {
        feature.is_editable() && !self.timers.is_scheduled(TimerTask::DeferredRemoval(feature.id))
    }

    /// Vertices a feature exposes to snapping; the sketch's floating vertex
    /// is not one of them.
    fn snap_targets<'a>(&'a self, feature: &'a Feature) -> &'a [Coordinate] {
        if self.session.feature() == Some(feature.id) {
            self.session.vertices()
        } else {
            feature.ring().unwrap_or(&[])
        }
    }

    /// Nearest vertex within the snap tolerance, or `at` unchanged.
    fn snap(&self, at: Coordinate, exclude: Option<FeatureId>) -> Coordinate {
        if !self.interactions.snap {
            return at;
        }
        let tol = self.snap_tolerance();
        let mut best: Option<(f64, Coordinate)> = None;
        for feature in self.features.iter() {
            if Some(feature.id) == exclude || !self.is_interactive(feature) {
                continue;
            }
            for &v in self.snap_targets(feature) {
                let d = squared_distance(at, v);
                if d <= tol * tol && best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, v));
                }
            }
        }
        best.map(|(_, v)| v).unwrap_or(at)
    }

    fn start_drawing(&mut self) -> Option<FeatureId> {
        let id = self
            .features
            .add(FeatureKind::Drawing, Geometry::Polygon(Vec::new()));
        if let Err(e) = self.session.start(id) {
            tracing::warn!(error = %e, "Could not start drawing");
            self.features.remove(id);
            return None;
        }
        if let Some(feature) = self.features.get_mut(id) {
            feature.temporary = true;
        }
        self.listeners.insert(id, ChangeListener::LiveValidation);
        let slot = self.forms.register(id);

        if let Some(feature) = self.features.get(id) {
            self.bus.publish(MapEvent::DrawingStarted(feature.clone()));
        }
        self.bus.publish(MapEvent::NewFieldForm { feature: id, slot });
        tracing::info!(feature = %id, slot, "Drawing started");
        Some(id)
    }

    /// Copy the session's sketch into its feature.
    fn sync_sketch(&mut self) {
        let Some(id) = self.session.feature() else {
            return;
        };
        let sketch = self.session.sketch_ring().unwrap_or_default();
        let style = if self.session.is_valid() {
            FeatureStyle::Default
        } else {
            FeatureStyle::Invalid
        };
        if let Some(feature) = self.features.get_mut(id) {
            feature.geometry = Geometry::Polygon(sketch);
            feature.style = style;
        }
    }

    /// Click in draw mode: starts a draw, adds a vertex, or finishes when the
    /// first vertex is hit.
    pub fn pointer_click(&mut self, at: Coordinate) {
        if !self.interactions.draw {
            return;
        }
        let at = self.snap(at, None);
        if !self.session.is_drawing() && self.start_drawing().is_none() {
            return;
        }

        let tol2 = self.snap_tolerance().powi(2);
        let vertices = self.session.vertices();
        if vertices
            .first()
            .is_some_and(|&first| squared_distance(at, first) <= tol2)
        {
            // Closes the ring from 3 corners on; ignored before that
            if vertices.len() >= 3 {
                self.finish_drawing();
            }
            return;
        }
        if vertices
            .last()
            .is_some_and(|&last| squared_distance(at, last) <= tol2)
        {
            return;
        }

        match self.session.propose_vertex(at) {
            Ok(VertexDecision::Accept) => self.sketch_changed(),
            Ok(VertexDecision::Reject(reason)) => {
                self.notify(Notification::warning(format!("This corner cannot be added: {reason}.")));
            }
            Err(e) => tracing::warn!(error = %e, "Vertex without a drawing"),
        }
    }

    /// Pointer move in draw mode: moves the floating vertex and re-validates.
    pub fn pointer_move(&mut self, at: Coordinate) {
        if !self.session.is_drawing() {
            return;
        }
        let at = self.snap(at, None);
        if let Err(e) = self.session.update_pointer(at) {
            tracing::warn!(error = %e, "Pointer move without a drawing");
            return;
        }
        self.sketch_changed();
    }

    fn sketch_changed(&mut self) {
        if let Some(id) = self.session.feature() {
            self.geometry_changed(id);
        }
    }

    pub fn double_click(&mut self, _at: Coordinate) {
        if self.session.is_drawing() {
            self.finish_drawing();
        }
    }

    /// Close the current drawing and either commit or reject it.
    pub fn finish_drawing(&mut self) {
        let outcome = match self.session.finish() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(error = %e, "Nothing to finish");
                return;
            }
        };

        match outcome {
            FinishOutcome::Rejected { feature, reason } => {
                self.listeners.remove(&feature);
                self.timers.cancel_for(feature);
                self.timers.schedule(
                    TimerTask::DeferredRemoval(feature),
                    self.now() + self.config.draw.deferred_removal_ms,
                );
                if let Some(f) = self.features.get_mut(feature) {
                    f.style = FeatureStyle::Invalid;
                }
                if let Some(slot) = self.forms.remove(feature) {
                    self.bus.publish(MapEvent::RemoveFieldForm { feature, slot });
                }
                self.notify(Notification::error(format!("The field was not created: {reason}.")));
                tracing::warn!(feature = %feature, %reason, "Drawing rejected");
            }
            FinishOutcome::Committed { feature, ring } => {
                let Some(f) = self.features.get_mut(feature) else {
                    tracing::warn!(feature = %feature, "Committed drawing has no feature");
                    return;
                };
                f.geometry = Geometry::Polygon(ring);
                f.style = FeatureStyle::Default;

                let area = self.measure(feature);
                self.listeners.insert(feature, ChangeListener::DebouncedArea);
                if let Some(f) = self.features.get(feature) {
                    self.bus.publish(MapEvent::DrawingCompleted {
                        feature: f.clone(),
                        area,
                    });
                }
                self.bus.publish(MapEvent::AreaCalculated {
                    feature: Some(feature),
                    slot: self.forms.slot(feature),
                    hectares: area,
                });
                tracing::info!(feature = %feature, hectares = area, "Drawing completed");
            }
        }
    }

    /// Escape: drop the in-progress drawing and its form.
    pub fn cancel_drawing(&mut self) {
        match self.session.abort() {
            Ok(feature) => {
                self.discard(feature);
                tracing::info!(feature = %feature, "Drawing aborted");
            }
            Err(e) => tracing::debug!(error = %e, "Nothing to cancel"),
        }
    }

    /// Grab the vertex under the pointer. Returns whether a drag started.
    pub fn drag_vertex_start(&mut self, at: Coordinate) -> bool {
        if !self.interactions.modify || self.session.is_drawing() {
            return false;
        }
        let tol2 = self.snap_tolerance().powi(2);
        let mut best: Option<(f64, VertexDrag)> = None;
        for feature in self.features.iter().filter(|f| self.is_interactive(f)) {
            let Some(ring) = feature.ring() else {
                continue;
            };
            for (index, &v) in ring.iter().enumerate() {
                let d = squared_distance(at, v);
                if d <= tol2 && best.map_or(true, |(bd, _)| d < bd) {
                    // The closing vertex is the first one
                    let index = if index + 1 == ring.len() { 0 } else { index };
                    best = Some((
                        d,
                        VertexDrag {
                            feature: feature.id,
                            index,
                        },
                    ));
                }
            }
        }
        self.drag = best.map(|(_, drag)| drag);
        if let Some(drag) = self.drag {
            tracing::debug!(feature = %drag.feature, index = drag.index, "Vertex drag started");
        }
        self.drag.is_some()
    }

    /// Move the grabbed vertex. Only the windowed check runs here.
    pub fn drag_vertex_move(&mut self, at: Coordinate) {
        let Some(drag) = self.drag else {
            return;
        };
        let at = self.snap(at, Some(drag.feature));
        let window = self.config.draw.intersection_window;

        let Some(ring) = self.features.get_mut(drag.feature).and_then(Feature::ring_mut) else {
            self.drag = None;
            return;
        };
        if drag.index >= ring.len() {
            return;
        }
        ring[drag.index] = at;
        if drag.index == 0 {
            if let Some(last) = ring.last_mut() {
                *last = at;
            }
        }
        let valid = !ring_has_self_intersection_windowed(ring, window);
        self.set_validity_style(drag.feature, valid);
        self.geometry_changed(drag.feature);
    }

    /// Release the vertex and validate the whole ring. An invalid result is
    /// reported but kept, so the user can fix it.
    pub fn drag_vertex_end(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let Some(ring) = self.features.get(drag.feature).and_then(Feature::ring) else {
            return;
        };
        let valid = !ring_has_self_intersection(ring);
        self.set_validity_style(drag.feature, valid);
        if !valid {
            self.notify(Notification::warning(
                "The field boundary crosses itself. Move the corner to fix it.",
            ));
        }
        self.geometry_changed(drag.feature);
    }

    fn set_validity_style(&mut self, id: FeatureId, valid: bool) {
        if let Some(f) = self.features.get_mut(id) {
            f.style = if valid {
                FeatureStyle::Default
            } else {
                FeatureStyle::Invalid
            };
        }
    }

    /// Run the feature's change listener.
    fn geometry_changed(&mut self, id: FeatureId) {
        match self.listeners.get(&id).copied() {
            Some(ChangeListener::LiveValidation) => self.sync_sketch(),
            Some(ChangeListener::DebouncedArea) => self.timers.schedule(
                TimerTask::AreaRecalculation(id),
                self.now() + self.config.draw.area_debounce_ms,
            ),
            None => {}
        }
    }

    // --- timers ---

    /// Run every task whose deadline has passed. Returns how many ran.
    pub fn tick(&mut self) -> usize {
        let due = self.timers.take_due(self.now());
        for task in &due {
            match *task {
                TimerTask::AreaRecalculation(id) => {
                    if self.features.contains(id) {
                        let hectares = self.measure(id);
                        self.bus.publish(MapEvent::AreaCalculated {
                            feature: Some(id),
                            slot: self.forms.slot(id),
                            hectares,
                        });
                    }
                }
                TimerTask::DeferredRemoval(id) => {
                    self.features.remove(id);
                    tracing::debug!(feature = %id, "Rejected drawing removed");
                }
                TimerTask::HighlightExpiry(id) => {
                    self.features.remove(id);
                    if self.highlight == Some(id) {
                        self.highlight = None;
                    }
                }
            }
        }
        due.len()
    }

    /// Cached area of a feature, stored back on it.
    fn measure(&mut self, id: FeatureId) -> f64 {
        let Some(feature) = self.features.get(id) else {
            return 0.0;
        };
        let hectares = self.areas.compute_feature_area(feature);
        if let Some(f) = self.features.get_mut(id) {
            f.area = Some(hectares);
        }
        hectares
    }

    // --- features ---

    /// Replace every loaded field with `records`. Drawings are untouched.
    pub fn render_fields(&mut self, records: &[FieldRecord]) {
        for id in self.features.ids_of_kind(FeatureKind::Field) {
            self.remove_feature(id);
        }

        let mut rendered = 0;
        for record in records {
            let Some(ring) = record.ring() else {
                tracing::debug!(field = record.id, "Field has no boundary, skipped");
                continue;
            };
            let id = self.features.add(FeatureKind::Field, Geometry::Polygon(ring));
            if let Some(f) = self.features.get_mut(id) {
                f.field_id = Some(record.id);
                f.name = Some(record.name.clone());
                f.crop = (!record.crop.is_empty()).then(|| record.crop.clone());
                f.area = Some(record.area);
            }
            self.listeners.insert(id, ChangeListener::DebouncedArea);
            rendered += 1;
        }
        tracing::info!(records = records.len(), rendered, "Fields rendered");
    }

    /// Fit the view to a field and outline it for a few seconds.
    pub fn focus_on_field(&mut self, record: &FieldRecord) {
        let ring = record.ring().or_else(|| {
            self.features
                .find_by_field_id(record.id)
                .and_then(Feature::ring)
                .map(<[Coordinate]>::to_vec)
        });
        let Some((ring, extent)) = ring.and_then(|r| Extent::of(&r).map(|e| (r, e))) else {
            tracing::warn!(field = record.id, "Field has no boundary to focus on");
            return;
        };

        let now = self.now();
        self.view.fit(
            extent,
            self.config.map.focus_padding_px,
            self.config.map.focus_duration_ms,
            now,
        );

        if let Some(previous) = self.highlight.take() {
            self.timers.cancel_for(previous);
            self.features.remove(previous);
        }
        let id = self.features.add(FeatureKind::Highlight, Geometry::Polygon(ring));
        self.highlight = Some(id);
        self.timers.schedule(
            TimerTask::HighlightExpiry(id),
            now + self.config.draw.highlight_duration_ms,
        );
        tracing::info!(field = record.id, "Focused field");
    }

    /// Remove a feature with everything attached to it.
    pub fn remove_feature(&mut self, id: FeatureId) -> Option<Feature> {
        if self.session.feature() == Some(id) {
            let _ = self.session.abort();
        }
        self.discard(id)
    }

    fn discard(&mut self, id: FeatureId) -> Option<Feature> {
        if self.drag.is_some_and(|d| d.feature == id) {
            self.drag = None;
        }
        if self.highlight == Some(id) {
            self.highlight = None;
        }
        self.listeners.remove(&id);
        self.timers.cancel_for(id);
        if let Some(slot) = self.forms.remove(id) {
            self.bus.publish(MapEvent::RemoveFieldForm { feature: id, slot });
        }
        self.features.remove(id)
    }

    /// Answer a `field:requestArea` synchronously.
    pub fn request_area(&mut self, id: FeatureId, reply: &AreaReply) {
        let hectares = if self.features.contains(id) {
            self.measure(id)
        } else {
            tracing::warn!(feature = %id, "Area requested for an unknown feature");
            0.0
        };
        reply.send(hectares);
    }

    // --- geolocation ---

    /// Ask the platform for a single position fix. The reply comes back
    /// through the bus as `LocationResolved`.
    pub fn locate_user(&mut self) {
        if !self.geolocator.is_supported() {
            self.notify(Notification::warning(
                "Geolocation is not supported by your browser.",
            ));
            return;
        }
        self.bus.publish(MapEvent::LocationLoading(true));

        let bus = self.bus.clone();
        self.geolocator.request(
            self.config.map.position_options(),
            Box::new(move |result| {
                bus.publish(MapEvent::LocationResolved(result));
                bus.dispatch();
            }),
        );
    }

    pub fn handle_location(&mut self, result: Result<GeoPosition, LocationError>) {
        self.bus.publish(MapEvent::LocationLoading(false));
        match result {
            Ok(position) => {
                let center = view::lon_lat_to_mercator(position.longitude, position.latitude);
                let now = self.now();
                self.view.animate_to(
                    center,
                    self.config.map.locate_zoom,
                    self.config.map.locate_duration_ms,
                    now,
                );
                self.replace_location_marker(center, position.accuracy);
                self.notify(Notification::success(position.success_message()));
                tracing::info!(accuracy = position.accuracy, "Location found");
            }
            Err(e) => {
                self.notify(Notification::warning(e.user_message()));
                tracing::warn!(error = %e, "Location request failed");
            }
        }
    }

    fn replace_location_marker(&mut self, center: Coordinate, accuracy: f64) {
        for id in self.features.ids_of_kind(FeatureKind::Location) {
            self.features.remove(id);
        }
        let circle = self.features.add(
            FeatureKind::Location,
            Geometry::Circle {
                center,
                radius: accuracy,
            },
        );
        let marker = self
            .features
            .add(FeatureKind::Location, Geometry::Point(center));
        if let Some(f) = self.features.get_mut(circle) {
            f.style = FeatureStyle::AccuracyCircle;
        }
        if let Some(f) = self.features.get_mut(marker) {
            f.style = FeatureStyle::LocationMarker;
        }
    }
}
