//! Topic-based publish/subscribe between the map core and the UI.
//!
//! Events are queued by [`EventBus::publish`] and delivered by
//! [`EventBus::dispatch`] in FIFO order. A handler runs to completion before
//! the next event is delivered; events published from inside a handler are
//! appended to the queue and delivered in the same dispatch pass.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::LocationError;
use crate::feature::{Feature, FeatureId, FieldRecord};
use crate::location::GeoPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    EnableDrawing,
    DisableDrawing,
    RenderFields,
    RemoveFeature,
    FocusField,
    RequestArea,
    DrawingStarted,
    DrawingCompleted,
    NewFieldForm,
    RemoveFieldForm,
    AreaCalculated,
    ShowNotification,
    LocateUser,
    LocationLoading,
    LocationResolved,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::EnableDrawing => "map:enableDrawing",
            Topic::DisableDrawing => "map:disableDrawing",
            Topic::RenderFields => "map:renderFields",
            Topic::RemoveFeature => "map:removeFeature",
            Topic::FocusField => "field:focus",
            Topic::RequestArea => "field:requestArea",
            Topic::DrawingStarted => "map:drawingStarted",
            Topic::DrawingCompleted => "map:drawingCompleted",
            Topic::NewFieldForm => "fields:newFieldForm",
            Topic::RemoveFieldForm => "field:removeFieldForm",
            Topic::AreaCalculated => "map:areaCalculated",
            Topic::ShowNotification => "notification:show",
            Topic::LocateUser => "map:locateUser",
            Topic::LocationLoading => "ui:locationLoading",
            Topic::LocationResolved => "map:locationResolved",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationKind {
    #[default]
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }
}

/// Synchronous answer channel for `field:requestArea`.
#[derive(Clone)]
pub struct AreaReply(Rc<dyn Fn(f64)>);

impl AreaReply {
    pub fn new(f: impl Fn(f64) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn send(&self, hectares: f64) {
        (self.0)(hectares)
    }
}

impl fmt::Debug for AreaReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AreaReply(..)")
    }
}

#[derive(Debug, Clone)]
pub enum MapEvent {
    EnableDrawing,
    DisableDrawing,
    RenderFields(Vec<FieldRecord>),
    RemoveFeature(FeatureId),
    FocusField(FieldRecord),
    RequestArea {
        feature: FeatureId,
        reply: AreaReply,
    },
    DrawingStarted(Feature),
    DrawingCompleted {
        feature: Feature,
        area: f64,
    },
    NewFieldForm {
        feature: FeatureId,
        slot: usize,
    },
    RemoveFieldForm {
        feature: FeatureId,
        slot: usize,
    },
    /// Hectares, with the feature and form slot it belongs to when known.
    AreaCalculated {
        feature: Option<FeatureId>,
        slot: Option<usize>,
        hectares: f64,
    },
    ShowNotification(Notification),
    LocateUser,
    LocationLoading(bool),
    /// Geolocation reply, routed back through the bus so the surface
    /// handles it outside the platform callback.
    LocationResolved(Result<GeoPosition, LocationError>),
}

impl MapEvent {
    pub fn topic(&self) -> Topic {
        match self {
            MapEvent::EnableDrawing => Topic::EnableDrawing,
            MapEvent::DisableDrawing => Topic::DisableDrawing,
            MapEvent::RenderFields(_) => Topic::RenderFields,
            MapEvent::RemoveFeature(_) => Topic::RemoveFeature,
            MapEvent::FocusField(_) => Topic::FocusField,
            MapEvent::RequestArea { .. } => Topic::RequestArea,
            MapEvent::DrawingStarted(_) => Topic::DrawingStarted,
            MapEvent::DrawingCompleted { .. } => Topic::DrawingCompleted,
            MapEvent::NewFieldForm { .. } => Topic::NewFieldForm,
            MapEvent::RemoveFieldForm { .. } => Topic::RemoveFieldForm,
            MapEvent::AreaCalculated { .. } => Topic::AreaCalculated,
            MapEvent::ShowNotification(_) => Topic::ShowNotification,
            MapEvent::LocateUser => Topic::LocateUser,
            MapEvent::LocationLoading(_) => Topic::LocationLoading,
            MapEvent::LocationResolved(_) => Topic::LocationResolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&MapEvent)>;

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    queue: VecDeque<MapEvent>,
    next_id: u64,
    dispatching: bool,
}

/// Cloneable handle to a shared bus. Clones publish to and dispatch the same
/// queue.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBus")
            .field("subscriptions", &state.subscriptions.len())
            .field("pending", &state.queue.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, handler: impl Fn(&MapEvent) + 'static) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscriptions.push(Subscription {
            id,
            topic,
            handler: Rc::new(handler),
        });
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.subscriptions.len() != before
    }

    /// Queue an event for the next dispatch.
    pub fn publish(&self, event: MapEvent) {
        tracing::trace!(topic = %event.topic(), "Event queued");
        self.state.borrow_mut().queue.push_back(event);
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Deliver queued events until the queue is empty. Returns the number
    /// of events delivered; a call made from inside a handler returns 0 and
    /// leaves delivery to the outer pass.
    pub fn dispatch(&self) -> usize {
        {
            let mut state = self.state.borrow_mut();
            if state.dispatching {
                return 0;
            }
            state.dispatching = true;
        }

        let mut delivered = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                state.queue.pop_front().map(|event| {
                    let topic = event.topic();
                    let handlers: Vec<Handler> = state
                        .subscriptions
                        .iter()
                        .filter(|s| s.topic == topic)
                        .map(|s| s.handler.clone())
                        .collect();
                    (event, handlers)
                })
            };
            let Some((event, handlers)) = next else {
                break;
            };

            if handlers.is_empty() {
                tracing::trace!(topic = %event.topic(), "Event had no subscribers");
            }
            for handler in handlers {
                handler(&event);
            }
            delivered += 1;
        }

        self.state.borrow_mut().dispatching = false;
        delivered
    }

    /// Queue and immediately deliver.
    pub fn emit(&self, event: MapEvent) -> usize {
        self.publish(event);
        self.dispatch()
    }
}
