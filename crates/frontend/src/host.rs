use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use agrimap_core::{AppConfig, Clock, EventBus, MapEvent, MapSurface, Topic};
use dioxus::prelude::*;
use gloo_timers::future::TimeoutFuture;

use crate::browser::{BrowserClock, BrowserGeolocator};

/// Frame interval while the camera animates.
const FRAME_MS: u32 = 16;

struct HostInner {
    surface: Rc<RefCell<MapSurface>>,
    bus: EventBus,
    clock: Rc<dyn Clock>,
    redraw: Signal<u64>,
    /// Bumped whenever the pending timer is re-armed; a timer that wakes
    /// with a stale generation does nothing.
    timer_generation: Cell<u64>,
    /// Deadline the pending timer was armed for.
    armed_deadline: Cell<Option<f64>>,
    animating: Cell<bool>,
}

/// Owns the map surface on the page and drives it: gestures go in through
/// [`MapHost::interact`], queued events are dispatched once the surface is
/// released, and a single browser timer is kept armed for the surface's
/// earliest deadline.
#[derive(Clone)]
pub struct MapHost(Rc<HostInner>);

impl PartialEq for MapHost {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl MapHost {
    pub fn new(config: AppConfig, redraw: Signal<u64>) -> Self {
        let bus = EventBus::new();
        let clock: Rc<dyn Clock> = Rc::new(BrowserClock);
        let surface = Rc::new(RefCell::new(MapSurface::new(
            config,
            bus.clone(),
            Rc::clone(&clock),
            Box::new(BrowserGeolocator),
        )));
        MapSurface::connect(&surface);

        let host = Self(Rc::new(HostInner {
            surface,
            bus,
            clock,
            redraw,
            timer_generation: Cell::new(0),
            armed_deadline: Cell::new(None),
            animating: Cell::new(false),
        }));

        // Location replies land from a browser callback, outside any gesture.
        let weak: Weak<HostInner> = Rc::downgrade(&host.0);
        host.0.bus.subscribe(Topic::LocationLoading, move |event| {
            if matches!(event, MapEvent::LocationLoading(false)) {
                if let Some(inner) = weak.upgrade() {
                    let host = MapHost(inner);
                    wasm_bindgen_futures::spawn_local(async move { host.settle() });
                }
            }
        });

        host
    }

    pub fn bus(&self) -> &EventBus {
        &self.0.bus
    }

    pub fn now(&self) -> f64 {
        self.0.clock.now_ms()
    }

    /// Read-side signal; components read it to re-render after changes.
    pub fn redraw(&self) -> Signal<u64> {
        self.0.redraw
    }

    /// Publish and deliver an event, then bring timers and the view up to date.
    pub fn emit(&self, event: MapEvent) {
        self.0.bus.publish(event);
        self.settle();
    }

    /// Run `f` against the surface, then settle. `None` when the surface is
    /// already borrowed further up the stack.
    pub fn interact<R>(&self, f: impl FnOnce(&mut MapSurface) -> R) -> Option<R> {
        let result = match self.0.surface.try_borrow_mut() {
            Ok(mut surface) => Some(f(&mut surface)),
            Err(_) => {
                tracing::warn!("Map surface busy, gesture dropped");
                None
            }
        };
        self.settle();
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&MapSurface) -> R) -> Option<R> {
        self.0.surface.try_borrow().ok().map(|surface| f(&surface))
    }

    fn settle(&self) {
        self.0.bus.dispatch();
        self.arm_timer();
        self.run_animation();
        let mut redraw = self.0.redraw;
        *redraw.write() += 1;
    }

    fn arm_timer(&self) {
        let Some(deadline) = self.read(MapSurface::next_deadline).flatten() else {
            return;
        };
        if !needs_rearm(self.0.armed_deadline.get(), deadline) {
            return;
        }
        self.0.armed_deadline.set(Some(deadline));
        let generation = self.0.timer_generation.get() + 1;
        self.0.timer_generation.set(generation);

        let delay = timer_delay(deadline, self.now());
        let host = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            TimeoutFuture::new(delay).await;
            if host.0.timer_generation.get() == generation {
                host.0.armed_deadline.set(None);
                host.interact(MapSurface::tick);
            }
        });
    }

    fn run_animation(&self) {
        let now = self.now();
        let animating = self
            .read(|s| s.view().is_animating(now))
            .unwrap_or(false);
        if !animating || self.0.animating.replace(true) {
            return;
        }

        let host = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            loop {
                TimeoutFuture::new(FRAME_MS).await;
                let mut redraw = host.0.redraw;
                *redraw.write() += 1;
                let now = host.now();
                let still = host.read(|s| s.view().is_animating(now)).unwrap_or(false);
                if !still {
                    break;
                }
            }
            host.0.animating.set(false);
        });
    }
}

/// A new timer is only spawned when the earliest deadline moved.
fn needs_rearm(armed: Option<f64>, deadline: f64) -> bool {
    armed != Some(deadline)
}

/// Whole milliseconds until `deadline`, never negative.
fn timer_delay(deadline_ms: f64, now_ms: f64) -> u32 {
    (deadline_ms - now_ms).ceil().clamp(0.0, u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_delay_rounds_up() {
        assert_eq!(timer_delay(110.2, 10.0), 101);
    }

    #[test]
    fn test_timer_delay_past_deadline_is_zero() {
        assert_eq!(timer_delay(5.0, 10.0), 0);
    }

    #[test]
    fn test_rearm_only_when_deadline_moves() {
        assert!(needs_rearm(None, 3000.0));
        assert!(!needs_rearm(Some(3000.0), 3000.0));
        assert!(needs_rearm(Some(3000.0), 500.0));
    }
}
