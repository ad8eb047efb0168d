//! Web Mercator (EPSG:3857) view math.
//!
//! World coordinates are meters with the origin at lon/lat 0,0 and y pointing
//! north. Screen coordinates are container pixels with y pointing down.
//! Zoom level `z` shows the world as `256 * 2^z` pixels wide.

use crate::geometry::{Coordinate, Extent};

pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
pub const TILE_SIZE_PX: f64 = 256.0;

/// Meters per pixel at zoom 0 (2πR / 256).
pub const MAX_RESOLUTION: f64 = 156_543.033_928_040_97;

/// Half the width of the projected world.
pub const HALF_WORLD_M: f64 = std::f64::consts::PI * EARTH_RADIUS_M;

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 19.0;

/// Project WGS84 degrees to Web Mercator meters.
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> Coordinate {
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Coordinate::new(x, y)
}

/// Unproject Web Mercator meters to `(lon, lat)` degrees.
pub fn mercator_to_lon_lat(c: Coordinate) -> (f64, f64) {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

pub fn resolution_for_zoom(zoom: f64) -> f64 {
    MAX_RESOLUTION / 2f64.powf(zoom)
}

pub fn zoom_for_resolution(resolution: f64) -> f64 {
    (MAX_RESOLUTION / resolution).log2()
}

/// Pixel size of the map container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
        }
    }
}

/// A resolved camera position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub center: Coordinate,
    pub zoom: f64,
}

impl ViewState {
    pub fn resolution(&self) -> f64 {
        resolution_for_zoom(self.zoom)
    }

    pub fn world_to_screen(&self, c: Coordinate, viewport: Viewport) -> (f64, f64) {
        let res = self.resolution();
        (
            (c.x - self.center.x) / res + viewport.width / 2.0,
            (self.center.y - c.y) / res + viewport.height / 2.0,
        )
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64, viewport: Viewport) -> Coordinate {
        let res = self.resolution();
        Coordinate::new(
            self.center.x + (sx - viewport.width / 2.0) * res,
            self.center.y - (sy - viewport.height / 2.0) * res,
        )
    }

    /// World extent covered by the viewport.
    pub fn extent(&self, viewport: Viewport) -> Extent {
        let res = self.resolution();
        let hw = viewport.width / 2.0 * res;
        let hh = viewport.height / 2.0 * res;
        Extent {
            min_x: self.center.x - hw,
            min_y: self.center.y - hh,
            max_x: self.center.x + hw,
            max_y: self.center.y + hh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Animation {
    from: ViewState,
    to: ViewState,
    start_ms: f64,
    duration_ms: f64,
}

/// Ease-out curve used by view animations.
fn ease_out(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(2)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// The map camera: where it is, where it is going, and how big the
/// container is.
#[derive(Debug, Clone)]
pub struct View {
    state: ViewState,
    viewport: Viewport,
    animation: Option<Animation>,
}

impl View {
    pub fn new(center: Coordinate, zoom: f64) -> Self {
        Self {
            state: ViewState {
                center,
                zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            },
            viewport: Viewport::default(),
            animation: None,
        }
    }

    /// Camera centered on WGS84 degrees.
    pub fn from_lon_lat(lon: f64, lat: f64, zoom: f64) -> Self {
        Self::new(lon_lat_to_mercator(lon, lat), zoom)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.viewport = Viewport { width, height };
        }
    }

    /// Camera position at `now_ms`, interpolating any running animation.
    pub fn state_at(&self, now_ms: f64) -> ViewState {
        let Some(anim) = self.animation else {
            return self.state;
        };
        if anim.duration_ms <= 0.0 || now_ms >= anim.start_ms + anim.duration_ms {
            return anim.to;
        }
        let t = ease_out(((now_ms - anim.start_ms) / anim.duration_ms).clamp(0.0, 1.0));
        ViewState {
            center: Coordinate::new(
                lerp(anim.from.center.x, anim.to.center.x, t),
                lerp(anim.from.center.y, anim.to.center.y, t),
            ),
            zoom: lerp(anim.from.zoom, anim.to.zoom, t),
        }
    }

    /// Final position once any animation completes.
    pub fn target(&self) -> ViewState {
        self.animation.map(|a| a.to).unwrap_or(self.state)
    }

    pub fn is_animating(&self, now_ms: f64) -> bool {
        self.animation
            .map(|a| now_ms < a.start_ms + a.duration_ms)
            .unwrap_or(false)
    }

    /// Start an animation from wherever the camera is at `now_ms`. A second
    /// call replaces the first.
    pub fn animate_to(&mut self, center: Coordinate, zoom: f64, duration_ms: f64, now_ms: f64) {
        let from = self.state_at(now_ms);
        let to = ViewState {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        };
        self.state = to;
        self.animation = (duration_ms > 0.0).then_some(Animation {
            from,
            to,
            start_ms: now_ms,
            duration_ms,
        });
    }

    /// Animate so `extent` fills the viewport minus `padding_px` on each side.
    pub fn fit(&mut self, extent: Extent, padding_px: f64, duration_ms: f64, now_ms: f64) {
        let usable_w = (self.viewport.width - 2.0 * padding_px).max(1.0);
        let usable_h = (self.viewport.height - 2.0 * padding_px).max(1.0);
        let res = (extent.width() / usable_w).max(extent.height() / usable_h);
        let zoom = if res > 0.0 {
            zoom_for_resolution(res)
        } else {
            MAX_ZOOM
        };
        self.animate_to(extent.center(), zoom, duration_ms, now_ms);
    }

    /// Freeze the camera where it is at `now_ms`.
    fn settle(&mut self, now_ms: f64) -> ViewState {
        let current = self.state_at(now_ms);
        self.state = current;
        self.animation = None;
        current
    }

    /// Zoom by `delta` levels, keeping the world point under the cursor
    /// fixed on screen.
    pub fn zoom_at(&mut self, sx: f64, sy: f64, delta: f64, now_ms: f64) {
        let current = self.settle(now_ms);
        let anchor = current.screen_to_world(sx, sy, self.viewport);
        let new_zoom = (current.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        let res = resolution_for_zoom(new_zoom);
        self.state = ViewState {
            center: Coordinate::new(
                anchor.x - (sx - self.viewport.width / 2.0) * res,
                anchor.y + (sy - self.viewport.height / 2.0) * res,
            ),
            zoom: new_zoom,
        };
    }

    /// Drag the map by a screen delta.
    pub fn pan_by(&mut self, dx_px: f64, dy_px: f64, now_ms: f64) {
        let current = self.settle(now_ms);
        let res = current.resolution();
        self.state.center = Coordinate::new(
            current.center.x - dx_px * res,
            current.center.y + dy_px * res,
        );
    }
}

/// An XYZ tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

/// A tile and where it lands in the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub tile: TileCoord,
    pub left: f64,
    pub top: f64,
    pub size: f64,
}

/// Tiles covering the viewport at the nearest integer zoom. Columns wrap
/// around the antimeridian; rows outside the world are skipped.
pub fn visible_tiles(state: ViewState, viewport: Viewport) -> Vec<TilePlacement> {
    let z = state.zoom.round().clamp(MIN_ZOOM, MAX_ZOOM) as u32;
    let count = 1u64 << z;
    let tile_world = 2.0 * HALF_WORLD_M / count as f64;
    let size = tile_world / state.resolution();

    let extent = state.extent(viewport);
    let first_col = ((extent.min_x + HALF_WORLD_M) / tile_world).floor() as i64;
    let last_col = ((extent.max_x + HALF_WORLD_M) / tile_world).ceil() as i64 - 1;
    let first_row = ((HALF_WORLD_M - extent.max_y) / tile_world).floor().max(0.0) as i64;
    let last_row = (((HALF_WORLD_M - extent.min_y) / tile_world).ceil() - 1.0)
        .min(count as f64 - 1.0) as i64;

    let mut tiles = Vec::new();
    for row in first_row..=last_row {
        for col in first_col..=last_col {
            let world_x = -HALF_WORLD_M + col as f64 * tile_world;
            let world_y = HALF_WORLD_M - row as f64 * tile_world;
            let (left, top) = state.world_to_screen(Coordinate::new(world_x, world_y), viewport);
            tiles.push(TilePlacement {
                tile: TileCoord {
                    z,
                    x: col.rem_euclid(count as i64) as u32,
                    y: row as u32,
                },
                left,
                top,
                size,
            });
        }
    }
    tiles
}

/// Fill an XYZ URL template (`{x}`, `{y}`, `{z}`).
pub fn tile_url(template: &str, tile: TileCoord) -> String {
    template
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
        .replace("{z}", &tile.z.to_string())
}
