use thiserror::Error;

use crate::feature::FeatureId;

/// Reasons a polygon edit or a whole draw is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("a field needs at least 3 corners, got {0}")]
    TooFewVertices(usize),
    #[error("the corner repeats an existing one")]
    DuplicateVertex,
    #[error("the field boundary crosses itself")]
    SelfIntersection,
    #[error("the field boundary contains invalid coordinates")]
    NonFinite,
}

/// Misuse of the draw session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a drawing is already in progress ({0})")]
    AlreadyDrawing(FeatureId),
    #[error("no drawing is in progress")]
    NotDrawing,
}

/// Geolocation failures as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Access to geolocation was denied.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    PositionUnavailable,
    #[error("The location request timed out.")]
    Timeout,
    #[error("An unknown error occurred.")]
    Unknown,
}

impl LocationError {
    /// Map a W3C `GeolocationPositionError.code` to a category.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => LocationError::PermissionDenied,
            2 => LocationError::PositionUnavailable,
            3 => LocationError::Timeout,
            _ => LocationError::Unknown,
        }
    }

    /// Full sentence shown in the notification toast.
    pub fn user_message(&self) -> String {
        format!("Could not determine your location. {self}")
    }
}
