use std::cell::RefCell;
use std::rc::Rc;

use agrimap_core::location::{GeoPosition, Geolocator, LocationReply, PositionOptions};
use agrimap_core::{Clock, LocationError};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::js_sys;

/// Milliseconds from `performance.now()`, or wall-clock time when the
/// performance API is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

/// `navigator.geolocation` behind the core's [`Geolocator`] seam.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserGeolocator;

fn geolocation() -> Option<web_sys::Geolocation> {
    web_sys::window()?.navigator().geolocation().ok()
}

impl Geolocator for BrowserGeolocator {
    fn is_supported(&self) -> bool {
        geolocation().is_some()
    }

    fn request(&self, options: PositionOptions, reply: LocationReply) {
        let Some(geolocation) = geolocation() else {
            reply(Err(LocationError::PositionUnavailable));
            return;
        };

        // Success and error callbacks race for the one reply.
        let slot: Rc<RefCell<Option<LocationReply>>> = Rc::new(RefCell::new(Some(reply)));
        let resolve = {
            let slot = Rc::clone(&slot);
            move |result: Result<GeoPosition, LocationError>| {
                let reply = slot.borrow_mut().take();
                if let Some(reply) = reply {
                    reply(result);
                }
            }
        };

        let on_success = {
            let resolve = resolve.clone();
            Closure::once_into_js(move |position: web_sys::Position| {
                let coords = position.coords();
                resolve(Ok(GeoPosition {
                    longitude: coords.longitude(),
                    latitude: coords.latitude(),
                    accuracy: coords.accuracy(),
                }));
            })
        };
        let on_error = {
            let resolve = resolve.clone();
            Closure::once_into_js(move |error: web_sys::PositionError| {
                resolve(Err(LocationError::from_code(error.code())));
            })
        };

        let js_options = web_sys::PositionOptions::new();
        js_options.set_enable_high_accuracy(options.enable_high_accuracy);
        js_options.set_timeout(options.timeout_ms);
        js_options.set_maximum_age(options.maximum_age_ms);

        if let Err(e) = geolocation.get_current_position_with_error_callback_and_options(
            on_success.unchecked_ref(),
            Some(on_error.unchecked_ref()),
            &js_options,
        ) {
            tracing::error!(error = ?e, "getCurrentPosition threw");
            resolve(Err(LocationError::Unknown));
        }
    }
}

/// Convert client (viewport) coordinates to container-relative pixel coordinates.
pub fn client_to_container(
    client_x: f64,
    client_y: f64,
    rect_left: f64,
    rect_top: f64,
) -> (f64, f64) {
    (client_x - rect_left, client_y - rect_top)
}

/// Container size and offset of the element with `id`.
pub fn element_rect(id: &str) -> Option<web_sys::DomRect> {
    let document = web_sys::window()?.document()?;
    let element = document.get_element_by_id(id)?;
    Some(element.get_bounding_client_rect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_to_container_offsets() {
        let (x, y) = client_to_container(150.0, 220.0, 100.0, 200.0);
        assert!((x - 50.0).abs() < 1e-9);
        assert!((y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_client_to_container_at_origin() {
        let (x, y) = client_to_container(0.0, 0.0, 0.0, 0.0);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn test_client_to_container_left_of_container_is_negative() {
        let (x, _) = client_to_container(90.0, 300.0, 100.0, 200.0);
        assert!(x < 0.0);
    }
}
