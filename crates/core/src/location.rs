use crate::error::LocationError;

/// Options for a single-shot position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u32,
    pub maximum_age_ms: u32,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 60_000,
        }
    }
}

/// A fix in WGS84 degrees; accuracy in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub longitude: f64,
    pub latitude: f64,
    pub accuracy: f64,
}

impl GeoPosition {
    pub fn success_message(&self) -> String {
        format!(
            "Location found! Accuracy: {} meters",
            self.accuracy.round() as i64
        )
    }
}

pub type LocationReply = Box<dyn FnOnce(Result<GeoPosition, LocationError>)>;

/// Platform geolocation. The reply is invoked at most once, possibly long
/// after `request` returns; there is no cancellation.
pub trait Geolocator {
    fn is_supported(&self) -> bool;
    fn request(&self, options: PositionOptions, reply: LocationReply);
}

/// Stand-in for hosts without geolocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGeolocation;

impl Geolocator for NoGeolocation {
    fn is_supported(&self) -> bool {
        false
    }

    fn request(&self, _options: PositionOptions, reply: LocationReply) {
        reply(Err(LocationError::PositionUnavailable));
    }
}
