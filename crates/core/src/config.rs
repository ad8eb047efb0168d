use serde::Deserialize;

use crate::area::{AreaMethod, AREA_CACHE_CAPACITY};
use crate::geometry::DEFAULT_INTERSECTION_WINDOW;
use crate::location::PositionOptions;

/// Base map and camera settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapConfig {
    pub satellite_url: String,
    pub labels_url: String,
    /// Opacity of the label overlay.
    pub labels_opacity: f64,
    /// `[lon, lat]` in degrees.
    pub default_center: [f64; 2],
    pub default_zoom: f64,
    pub locate_zoom: f64,
    pub locate_duration_ms: f64,
    pub focus_duration_ms: f64,
    /// Screen padding around a focused field.
    pub focus_padding_px: f64,
    pub notification_timeout_ms: u32,
    pub geolocation_timeout_ms: u32,
    pub geolocation_maximum_age_ms: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            satellite_url: "https://sat01.maps.yandex.net/tiles?l=sat&x={x}&y={y}&z={z}".into(),
            labels_url: "https://core-renderer-tiles.maps.yandex.net/tiles?l=skl&x={x}&y={y}&z={z}"
                .into(),
            labels_opacity: 0.8,
            default_center: [37.6173, 55.7558],
            default_zoom: 10.0,
            locate_zoom: 15.0,
            locate_duration_ms: 1000.0,
            focus_duration_ms: 500.0,
            focus_padding_px: 50.0,
            notification_timeout_ms: 5000,
            geolocation_timeout_ms: 10_000,
            geolocation_maximum_age_ms: 60_000,
        }
    }
}

impl MapConfig {
    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: true,
            timeout_ms: self.geolocation_timeout_ms,
            maximum_age_ms: self.geolocation_maximum_age_ms,
        }
    }
}

/// Drawing, validation and timing knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrawConfig {
    /// Off for read-only maps: no draw, modify or snap.
    pub can_draw_fields: bool,
    pub snap_pixel_tolerance: f64,
    pub intersection_window: usize,
    pub area_debounce_ms: f64,
    pub deferred_removal_ms: f64,
    pub highlight_duration_ms: f64,
    pub area_cache_capacity: usize,
    pub area_method: AreaMethod,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            can_draw_fields: true,
            snap_pixel_tolerance: 10.0,
            intersection_window: DEFAULT_INTERSECTION_WINDOW,
            area_debounce_ms: 100.0,
            deferred_removal_ms: 10.0,
            highlight_duration_ms: 3000.0,
            area_cache_capacity: AREA_CACHE_CAPACITY,
            area_method: AreaMethod::Planar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
    pub fields: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            fields: "/api/fields".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub map: MapConfig,
    pub draw: DrawConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Parse a (possibly partial) JSON override; missing keys keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
