pub mod area;
pub mod config;
pub mod draw;
pub mod error;
pub mod event_bus;
pub mod feature;
pub mod forms;
pub mod geometry;
pub mod location;
pub mod surface;
pub mod timers;
pub mod view;

pub use area::{compute_area, AreaCalculator, AreaMethod};
pub use config::AppConfig;
pub use draw::{DrawPhase, DrawSession, VertexDecision, VertexHook};
pub use error::{GeometryError, LocationError, SessionError};
pub use event_bus::{EventBus, MapEvent, Notification, NotificationKind, Topic};
pub use feature::{Feature, FeatureId, FeatureKind, FieldRecord};
pub use geometry::Coordinate;
pub use surface::MapSurface;
pub use timers::{Clock, ManualClock};
