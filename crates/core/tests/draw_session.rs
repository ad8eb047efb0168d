//! End-to-end drawing flows through the surface and the bus, driven by a
//! manual clock.

use std::cell::RefCell;
use std::rc::Rc;

use agrimap_core::config::AppConfig;
use agrimap_core::draw::{VertexDecision, VertexHook};
use agrimap_core::event_bus::AreaReply;
use agrimap_core::feature::FeatureStyle;
use agrimap_core::location::{GeoPosition, Geolocator, LocationReply, NoGeolocation, PositionOptions};
use agrimap_core::surface::ChangeListener;
use agrimap_core::view;
use agrimap_core::{
    Coordinate, EventBus, FeatureKind, FieldRecord, LocationError, ManualClock, MapEvent,
    MapSurface, NotificationKind, Topic,
};

#[derive(Clone, Default)]
struct DeferredGeolocator {
    pending: Rc<RefCell<Option<LocationReply>>>,
}

impl Geolocator for DeferredGeolocator {
    fn is_supported(&self) -> bool {
        true
    }

    fn request(&self, _options: PositionOptions, reply: LocationReply) {
        *self.pending.borrow_mut() = Some(reply);
    }
}

impl DeferredGeolocator {
    fn resolve(&self, result: Result<GeoPosition, LocationError>) {
        let reply = self.pending.borrow_mut().take().expect("no pending request");
        reply(result);
    }
}

struct Harness {
    surface: Rc<RefCell<MapSurface>>,
    bus: EventBus,
    clock: ManualClock,
    geo: DeferredGeolocator,
    events: Rc<RefCell<Vec<MapEvent>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_geolocator(AppConfig::default(), None)
    }

    fn with_geolocator(config: AppConfig, geolocator: Option<Box<dyn Geolocator>>) -> Self {
        let bus = EventBus::new();
        let clock = ManualClock::new(0.0);
        let geo = DeferredGeolocator::default();
        let geolocator =
            geolocator.unwrap_or_else(|| Box::new(geo.clone()) as Box<dyn Geolocator>);
        let surface = Rc::new(RefCell::new(MapSurface::new(
            config,
            bus.clone(),
            Rc::new(clock.clone()),
            geolocator,
        )));
        MapSurface::connect(&surface);

        // 1 m per pixel: the 10 px snap tolerance is 10 m
        surface.borrow_mut().view_mut().animate_to(
            Coordinate::new(0.0, 0.0),
            view::zoom_for_resolution(1.0),
            0.0,
            0.0,
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        for topic in [
            Topic::DrawingStarted,
            Topic::DrawingCompleted,
            Topic::NewFieldForm,
            Topic::RemoveFieldForm,
            Topic::AreaCalculated,
            Topic::ShowNotification,
            Topic::LocationLoading,
        ] {
            let sink = events.clone();
            bus.subscribe(topic, move |e| sink.borrow_mut().push(e.clone()));
        }

        Self {
            surface,
            bus,
            clock,
            geo,
            events,
        }
    }

    fn gesture(&self, f: impl FnOnce(&mut MapSurface)) {
        f(&mut self.surface.borrow_mut());
        self.bus.dispatch();
    }

    fn click(&self, x: f64, y: f64) {
        self.gesture(|s| s.pointer_click(Coordinate::new(x, y)));
    }

    fn advance(&self, ms: f64) -> usize {
        self.clock.advance(ms);
        let mut ran = 0;
        self.gesture(|s| ran = s.tick());
        ran
    }

    fn take_events(&self) -> Vec<MapEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    fn notifications(events: &[MapEvent], kind: NotificationKind) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                MapEvent::ShowNotification(n) if n.kind == kind => Some(n.message.clone()),
                _ => None,
            })
            .collect()
    }

    fn draw_square(&self) {
        self.bus.emit(MapEvent::EnableDrawing);
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)] {
            self.click(x, y);
        }
        // Near the first vertex: snaps onto it and closes the ring
        self.click(2.0, 1.0);
    }
}

fn permissive() -> Box<dyn VertexHook> {
    Box::new(|_: &[Coordinate], _: Coordinate| VertexDecision::Accept)
}

#[test]
fn square_draw_commits_with_area() {
    let h = Harness::new();
    h.draw_square();

    let events = h.take_events();
    let topics: Vec<Topic> = events.iter().map(MapEvent::topic).collect();
    assert_eq!(
        topics,
        vec![
            Topic::DrawingStarted,
            Topic::NewFieldForm,
            Topic::DrawingCompleted,
            Topic::AreaCalculated,
        ]
    );

    let MapEvent::DrawingCompleted { feature, area } = &events[2] else {
        panic!("expected completion");
    };
    assert!((area - 1.0).abs() < 1e-9);
    assert_eq!(feature.kind, FeatureKind::Drawing);
    assert!(feature.temporary);
    assert_eq!(feature.ring().unwrap().len(), 5);

    match &events[3] {
        MapEvent::AreaCalculated {
            feature: Some(id),
            slot: Some(0),
            hectares,
        } => {
            assert_eq!(*id, feature.id);
            assert!((hectares - 1.0).abs() < 1e-9);
        }
        other => panic!("unexpected {other:?}"),
    }

    let s = h.surface.borrow();
    assert!(!s.session().is_drawing());
    assert_eq!(s.forms().slot(feature.id), Some(0));
    assert_eq!(s.listener(feature.id), Some(ChangeListener::DebouncedArea));
}

#[test]
fn start_then_abort_leaves_no_trace() {
    let h = Harness::new();
    h.bus.emit(MapEvent::EnableDrawing);
    let before = h.surface.borrow().features().len();

    h.click(0.0, 0.0);
    h.click(50.0, 0.0);
    h.gesture(|s| s.cancel_drawing());

    let s = h.surface.borrow();
    assert_eq!(s.features().len(), before);
    assert!(s.forms().is_empty());
    assert!(!s.session().is_drawing());
    drop(s);

    let topics: Vec<Topic> = h.take_events().iter().map(MapEvent::topic).collect();
    assert_eq!(
        topics,
        vec![Topic::DrawingStarted, Topic::NewFieldForm, Topic::RemoveFieldForm]
    );
}

#[test]
fn self_intersecting_finish_is_rejected_and_cleaned_up() {
    let h = Harness::new();
    h.gesture(|s| s.set_vertex_hook(permissive()));
    h.bus.emit(MapEvent::EnableDrawing);
    let before = h.surface.borrow().features().len();

    for (x, y) in [(0.0, 0.0), (100.0, 100.0), (100.0, 0.0), (0.0, 100.0)] {
        h.click(x, y);
    }
    h.gesture(|s| s.double_click(Coordinate::new(0.0, 100.0)));

    let events = h.take_events();
    assert_eq!(Harness::notifications(&events, NotificationKind::Error).len(), 1);
    assert!(!events.iter().any(|e| e.topic() == Topic::DrawingCompleted));
    assert!(events.iter().any(|e| e.topic() == Topic::RemoveFieldForm));

    {
        let s = h.surface.borrow();
        assert!(!s.session().is_drawing());
        assert!(s.forms().is_empty());
        // Removal waits for the deferred timer
        assert_eq!(s.features().len(), before + 1);
        assert_eq!(s.next_deadline(), Some(10.0));
    }

    assert_eq!(h.advance(9.0), 0);
    assert_eq!(h.advance(1.0), 1);
    assert_eq!(h.surface.borrow().features().len(), before);
    assert!(h.take_events().is_empty());
}

#[test]
fn guard_refuses_crossing_vertex_and_sketch_turns_invalid() {
    let h = Harness::new();
    h.bus.emit(MapEvent::EnableDrawing);
    for (x, y) in [(0.0, 0.0), (100.0, 100.0), (100.0, 0.0)] {
        h.click(x, y);
    }

    h.gesture(|s| s.pointer_move(Coordinate::new(0.0, 100.0)));
    {
        let s = h.surface.borrow();
        let id = s.session().feature().unwrap();
        assert_eq!(s.features().get(id).unwrap().style, FeatureStyle::Invalid);
    }

    h.click(0.0, 100.0);
    let events = h.take_events();
    assert_eq!(Harness::notifications(&events, NotificationKind::Warning).len(), 1);
    assert_eq!(h.surface.borrow().session().vertices().len(), 3);

    // The triangle so far is still a valid field
    h.gesture(|s| s.double_click(Coordinate::new(0.0, 0.0)));
    let events = h.take_events();
    assert!(events.iter().any(|e| e.topic() == Topic::DrawingCompleted));
}

#[test]
fn two_vertices_cannot_make_a_field() {
    let h = Harness::new();
    h.bus.emit(MapEvent::EnableDrawing);
    h.click(0.0, 0.0);
    h.click(100.0, 0.0);
    h.gesture(|s| s.finish_drawing());

    let errors = Harness::notifications(&h.take_events(), NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("at least 3 corners"));
    h.advance(10.0);
    assert!(h.surface.borrow().features().is_empty());
}

#[test]
fn closing_on_the_first_corner_needs_three_corners() {
    let h = Harness::new();
    h.bus.emit(MapEvent::EnableDrawing);
    h.click(0.0, 0.0);
    h.click(100.0, 0.0);
    // Both snap back onto the first corner
    h.click(1.0, 1.0);
    h.click(1.0, 1.0);
    assert_eq!(h.surface.borrow().session().vertices().len(), 2);
    h.gesture(|s| s.double_click(Coordinate::new(1.0, 1.0)));

    let events = h.take_events();
    assert!(!events.iter().any(|e| e.topic() == Topic::DrawingCompleted));
    let errors = Harness::notifications(&events, NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("at least 3 corners"));
}

#[test]
fn vertex_drag_republishes_area_after_debounce() {
    let h = Harness::new();
    h.draw_square();
    h.take_events();

    h.gesture(|s| assert!(s.drag_vertex_start(Coordinate::new(101.0, 99.0))));
    h.gesture(|s| s.drag_vertex_move(Coordinate::new(200.0, 100.0)));
    assert_eq!(h.advance(50.0), 0);
    h.gesture(|s| s.drag_vertex_move(Coordinate::new(200.0, 200.0)));
    h.gesture(|s| s.drag_vertex_end());

    assert_eq!(h.advance(99.0), 0);
    assert!(h.take_events().is_empty());
    assert_eq!(h.advance(1.0), 1);

    let events = h.take_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        MapEvent::AreaCalculated {
            slot: Some(0),
            hectares,
            ..
        } => assert!((hectares - 2.0).abs() < 1e-9),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn dragging_into_a_crossing_warns_but_keeps_the_edit() {
    let h = Harness::new();
    h.draw_square();
    h.take_events();

    // Drag (100, 100) across the opposite edge
    h.gesture(|s| assert!(s.drag_vertex_start(Coordinate::new(100.0, 100.0))));
    h.gesture(|s| s.drag_vertex_move(Coordinate::new(-50.0, 50.0)));
    h.gesture(|s| s.drag_vertex_end());

    let warnings = Harness::notifications(&h.take_events(), NotificationKind::Warning);
    assert_eq!(warnings.len(), 1);
    let s = h.surface.borrow();
    let drawing = s.features().ids_of_kind(FeatureKind::Drawing)[0];
    let f = s.features().get(drawing).unwrap();
    assert_eq!(f.style, FeatureStyle::Invalid);
    assert_eq!(f.ring().unwrap()[2], Coordinate::new(-50.0, 50.0));
}

#[test]
fn disable_drawing_discards_temporary_features() {
    let h = Harness::new();
    h.bus.emit(MapEvent::RenderFields(vec![FieldRecord {
        id: 9,
        name: "North".into(),
        crop: String::new(),
        area: 3.0,
        coordinates: [[500.0, 500.0], [600.0, 500.0], [600.0, 600.0]]
            .into_iter()
            .map(Coordinate::from)
            .collect(),
    }]));
    h.draw_square();
    h.click(300.0, 300.0); // starts a second, unfinished drawing
    h.take_events();

    h.bus.emit(MapEvent::DisableDrawing);
    h.bus.emit(MapEvent::DisableDrawing);

    let removed = h
        .take_events()
        .iter()
        .filter(|e| e.topic() == Topic::RemoveFieldForm)
        .count();
    assert_eq!(removed, 2);

    let s = h.surface.borrow();
    assert_eq!(s.features().len(), 1);
    assert!(s.features().find_by_field_id(9).is_some());
    assert!(s.forms().is_empty());
    assert!(!s.interactions().draw);
}

#[test]
fn request_area_replies_synchronously() {
    let h = Harness::new();
    h.draw_square();
    let id = h.surface.borrow().features().ids_of_kind(FeatureKind::Drawing)[0];

    let got = Rc::new(RefCell::new(None));
    let sink = got.clone();
    h.bus.emit(MapEvent::RequestArea {
        feature: id,
        reply: AreaReply::new(move |ha| *sink.borrow_mut() = Some(ha)),
    });
    let area = got.borrow().expect("no reply");
    assert!((area - 1.0).abs() < 1e-9);
    // Repeated requests hit the cache
    assert_eq!(h.surface.borrow().area_calculator().cache().len(), 1);
}

#[test]
fn locate_user_success() {
    let h = Harness::new();
    h.bus.emit(MapEvent::LocateUser);
    assert!(matches!(h.take_events()[..], [MapEvent::LocationLoading(true)]));

    h.geo.resolve(Ok(GeoPosition {
        longitude: 37.6173,
        latitude: 55.7558,
        accuracy: 18.7,
    }));

    let events = h.take_events();
    assert!(matches!(events[0], MapEvent::LocationLoading(false)));
    assert_eq!(
        Harness::notifications(&events, NotificationKind::Success),
        vec!["Location found! Accuracy: 19 meters".to_string()]
    );
    let s = h.surface.borrow();
    assert_eq!(s.features().ids_of_kind(FeatureKind::Location).len(), 2);
    assert_eq!(s.view().target().zoom, 15.0);
}

#[test]
fn locate_user_failure_is_categorized() {
    let h = Harness::new();
    h.bus.emit(MapEvent::LocateUser);
    h.take_events();
    h.geo.resolve(Err(LocationError::from_code(1)));

    let events = h.take_events();
    assert!(matches!(events[0], MapEvent::LocationLoading(false)));
    let warnings = Harness::notifications(&events, NotificationKind::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("denied"));
    assert!(h.surface.borrow().features().is_empty());
}

#[test]
fn locate_user_without_geolocation_only_warns() {
    let h = Harness::with_geolocator(AppConfig::default(), Some(Box::new(NoGeolocation)));
    h.bus.emit(MapEvent::LocateUser);
    let events = h.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(Harness::notifications(&events, NotificationKind::Warning).len(), 1);
}

#[test]
fn focus_event_highlights_rendered_field() {
    let h = Harness::new();
    let record = FieldRecord {
        id: 4,
        name: "South".into(),
        crop: "Oats".into(),
        area: 1.0,
        coordinates: [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [0.0, 0.0]]
            .into_iter()
            .map(Coordinate::from)
            .collect(),
    };
    h.bus.emit(MapEvent::RenderFields(vec![record.clone()]));
    h.bus.emit(MapEvent::FocusField(FieldRecord {
        coordinates: Vec::new(),
        ..record
    }));
    assert_eq!(
        h.surface.borrow().features().ids_of_kind(FeatureKind::Highlight).len(),
        1
    );
    h.advance(3000.0);
    assert!(h
        .surface
        .borrow()
        .features()
        .ids_of_kind(FeatureKind::Highlight)
        .is_empty());
}
