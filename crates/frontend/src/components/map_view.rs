use std::fmt::Write as _;

use agrimap_core::feature::{Feature, FeatureKind, FeatureStyle, Geometry};
use agrimap_core::view::{self, TilePlacement, ViewState, Viewport};
use agrimap_core::{Coordinate, MapSurface};
use dioxus::html::geometry::WheelDelta;
use dioxus::html::input_data::MouseButton;
use dioxus::prelude::*;

use crate::browser::{client_to_container, element_rect};
use crate::host::MapHost;

const MAP_CONTAINER_ID: &str = "agri-map-container";

/// Pointer travel, in pixels, below which a press counts as a click.
const DRAG_THRESHOLD: f64 = 3.0;

/// Zoom levels per wheel notch.
const ZOOM_STEP: f64 = 0.5;

/// Radius of vertex handles and the location marker, in screen pixels.
const HANDLE_RADIUS: f64 = 4.0;
const MARKER_RADIUS: f64 = 7.0;

struct StyleColors {
    stroke: &'static str,
    fill: &'static str,
    width: f64,
    dash: Option<&'static str>,
}

fn style_colors(style: FeatureStyle) -> StyleColors {
    match style {
        FeatureStyle::Default => StyleColors {
            stroke: "#ffcc33",
            fill: "rgba(255,255,255,0.2)",
            width: 2.0,
            dash: None,
        },
        FeatureStyle::Invalid => StyleColors {
            stroke: "#ff3860",
            fill: "rgba(255,56,96,0.15)",
            width: 2.0,
            dash: Some("6 4"),
        },
        FeatureStyle::Highlight => StyleColors {
            stroke: "#3273dc",
            fill: "rgba(50,115,220,0.1)",
            width: 4.0,
            dash: None,
        },
        FeatureStyle::AccuracyCircle => StyleColors {
            stroke: "rgba(50,115,220,0.6)",
            fill: "rgba(50,115,220,0.15)",
            width: 1.0,
            dash: None,
        },
        FeatureStyle::LocationMarker => StyleColors {
            stroke: "#ffffff",
            fill: "#3273dc",
            width: 2.0,
            dash: None,
        },
    }
}

fn style_attrs(colors: &StyleColors) -> String {
    let mut attrs = format!(
        r#"stroke="{}" fill="{}" stroke-width="{}""#,
        colors.stroke, colors.fill, colors.width
    );
    if let Some(dash) = colors.dash {
        let _ = write!(attrs, r#" stroke-dasharray="{}""#, dash);
    }
    attrs
}

/// SVG path data for a ring in screen space.
fn ring_path(ring: &[Coordinate], state: ViewState, viewport: Viewport) -> String {
    let mut d = String::new();
    for (i, c) in ring.iter().enumerate() {
        let (x, y) = state.world_to_screen(*c, viewport);
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{:.1} {:.1} ", cmd, x, y);
    }
    if !ring.is_empty() {
        d.push('Z');
    }
    d
}

fn build_feature(svg: &mut String, feature: &Feature, state: ViewState, viewport: Viewport) {
    let colors = style_colors(feature.style);
    let attrs = style_attrs(&colors);
    match &feature.geometry {
        Geometry::Polygon(ring) => {
            if ring.is_empty() {
                return;
            }
            let _ = write!(
                svg,
                r#"<path d="{}" {} stroke-linejoin="round"/>"#,
                ring_path(ring, state, viewport),
                attrs
            );
        }
        Geometry::Circle { center, radius } => {
            let (cx, cy) = state.world_to_screen(*center, viewport);
            let r = radius / state.resolution();
            let _ = write!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" {}/>"#,
                cx, cy, r, attrs
            );
        }
        Geometry::Point(at) => {
            let (cx, cy) = state.world_to_screen(*at, viewport);
            let _ = write!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{}" {}/>"#,
                cx, cy, MARKER_RADIUS, attrs
            );
        }
    }
}

/// Vertex handles for features the modify interaction can grab.
fn build_vertex_handles(svg: &mut String, feature: &Feature, state: ViewState, viewport: Viewport) {
    let Some(ring) = feature.ring() else { return };
    // The closing vertex repeats the first.
    let open = ring.len().saturating_sub(1);
    for c in &ring[..open] {
        let (x, y) = state.world_to_screen(*c, viewport);
        let _ = write!(
            svg,
            r##"<circle cx="{:.1}" cy="{:.1}" r="{}" fill="#ffffff" stroke="#ffcc33" stroke-width="2"/>"##,
            x, y, HANDLE_RADIUS
        );
    }
}

fn build_field_label(svg: &mut String, feature: &Feature, state: ViewState, viewport: Viewport) {
    if feature.kind != FeatureKind::Field {
        return;
    }
    let (Some(name), Some(extent)) = (&feature.name, feature.extent()) else {
        return;
    };
    let (x, y) = state.world_to_screen(extent.center(), viewport);
    let _ = write!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" class="field-label" text-anchor="middle">{}</text>"#,
        x,
        y,
        escape_text(name)
    );
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Overlay for every feature on the surface, drawn in insertion order.
fn build_svg_content<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    state: ViewState,
    viewport: Viewport,
    show_handles: bool,
) -> String {
    let mut svg = String::new();
    let mut labels = String::new();
    for feature in features {
        build_feature(&mut svg, feature, state, viewport);
        if show_handles && feature.is_editable() {
            build_vertex_handles(&mut svg, feature, state, viewport);
        }
        build_field_label(&mut labels, feature, state, viewport);
    }
    svg.push_str(&labels);
    svg
}

/// Convert a wheel delta (pixels / lines / pages) to a uniform pixel-like value.
fn wheel_delta_y(delta: WheelDelta) -> f64 {
    match delta {
        WheelDelta::Pixels(d) => d.y,
        WheelDelta::Lines(d) => d.y * 40.0,
        WheelDelta::Pages(d) => d.y * 400.0,
    }
}

/// Container-relative point plus the container's current size.
fn container_point(client_x: f64, client_y: f64) -> Option<(f64, f64, f64, f64)> {
    let rect = element_rect(MAP_CONTAINER_ID)?;
    let (x, y) = client_to_container(client_x, client_y, rect.left(), rect.top());
    Some((x, y, rect.width(), rect.height()))
}

/// Size the view to the container and resolve a screen point to the world.
fn locate(surface: &mut MapSurface, now: f64, point: (f64, f64, f64, f64)) -> Coordinate {
    let (x, y, w, h) = point;
    surface.view_mut().set_viewport(w, h);
    let view = surface.view();
    view.state_at(now).screen_to_world(x, y, view.viewport())
}

/// `(key, src, style)` for each tile image of one layer.
fn tile_images(tiles: &[TilePlacement], layer: &str, template: &str) -> Vec<(String, String, String)> {
    tiles
        .iter()
        .map(|p| {
            (
                format!("{}-{}-{}-{}-{:.0}", layer, p.tile.z, p.tile.x, p.tile.y, p.left),
                view::tile_url(template, p.tile),
                format!(
                    "left: {:.1}px; top: {:.1}px; width: {:.1}px; height: {:.1}px;",
                    p.left, p.top, p.size, p.size
                ),
            )
        })
        .collect()
}

struct Snapshot {
    state: ViewState,
    viewport: Viewport,
    svg: String,
    drawing_mode: bool,
}

#[component]
pub fn MapView(host: MapHost) -> Element {
    // Subscribe to surface changes.
    let _revision = *host.redraw().read();

    let mut pressed = use_signal(|| false);
    let mut did_drag = use_signal(|| false);
    let mut vertex_drag = use_signal(|| false);
    let mut drag_start = use_signal(|| (0.0_f64, 0.0_f64));
    let mut last_pointer = use_signal(|| (0.0_f64, 0.0_f64));

    let now = host.now();
    let snapshot = host.read(|s| {
        let view = s.view();
        let state = view.state_at(now);
        let viewport = view.viewport();
        let interactions = s.interactions();
        Snapshot {
            state,
            viewport,
            svg: build_svg_content(s.features().iter(), state, viewport, interactions.modify),
            drawing_mode: interactions.draw,
        }
    });
    let Some(snapshot) = snapshot else {
        return rsx! { div { id: MAP_CONTAINER_ID, class: "map-container" } };
    };

    let map_config = host.read(|s| s.config().map.clone()).unwrap_or_default();
    let tiles = view::visible_tiles(snapshot.state, snapshot.viewport);
    let overlay = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" style="position:absolute;top:0;left:0;pointer-events:none;z-index:5;">{}</svg>"#,
        snapshot.svg,
        w = snapshot.viewport.width,
        h = snapshot.viewport.height,
    );
    let labels_style = format!("opacity: {};", map_config.labels_opacity);
    let satellite = tile_images(&tiles, "sat", &map_config.satellite_url);
    let labels = tile_images(&tiles, "skl", &map_config.labels_url);

    let container_class = if *pressed.read() && *did_drag.read() {
        "map-container dragging"
    } else if snapshot.drawing_mode {
        "map-container draw-mode"
    } else {
        "map-container"
    };

    let h_mounted = host.clone();
    let h_wheel = host.clone();
    let h_down = host.clone();
    let h_move = host.clone();
    let h_up = host.clone();
    let h_dbl = host.clone();
    let h_key = host.clone();
    let h_leave = host.clone();

    rsx! {
        div {
            id: MAP_CONTAINER_ID,
            class: "{container_class}",
            tabindex: "0",

            onmounted: move |_| {
                if let Some(rect) = element_rect(MAP_CONTAINER_ID) {
                    h_mounted.interact(|s| s.view_mut().set_viewport(rect.width(), rect.height()));
                }
            },

            onwheel: move |evt: Event<WheelData>| {
                evt.prevent_default();
                let delta_y = wheel_delta_y(evt.data().delta());
                if delta_y == 0.0 {
                    return;
                }
                let client = evt.data().client_coordinates();
                let Some((x, y, w, h)) = container_point(client.x, client.y) else { return };
                let step = if delta_y < 0.0 { ZOOM_STEP } else { -ZOOM_STEP };
                let now = h_wheel.now();
                h_wheel.interact(|s| {
                    s.view_mut().set_viewport(w, h);
                    s.view_mut().zoom_at(x, y, step, now);
                });
            },

            onmousedown: move |evt: Event<MouseData>| {
                if evt.trigger_button() != Some(MouseButton::Primary) {
                    return;
                }
                let client = evt.client_coordinates();
                pressed.set(true);
                did_drag.set(false);
                drag_start.set((client.x, client.y));
                last_pointer.set((client.x, client.y));

                let Some(point) = container_point(client.x, client.y) else { return };
                let now = h_down.now();
                let grabbed = h_down
                    .interact(|s| {
                        let at = locate(s, now, point);
                        s.drag_vertex_start(at)
                    })
                    .unwrap_or(false);
                vertex_drag.set(grabbed);
            },

            onmousemove: move |evt: Event<MouseData>| {
                let client = evt.client_coordinates();
                let Some(point) = container_point(client.x, client.y) else { return };
                let now = h_move.now();

                if *vertex_drag.read() {
                    h_move.interact(|s| {
                        let at = locate(s, now, point);
                        s.drag_vertex_move(at);
                    });
                    return;
                }

                if *pressed.read() {
                    let (sx, sy) = *drag_start.read();
                    if !*did_drag.read()
                        && ((client.x - sx).abs() > DRAG_THRESHOLD || (client.y - sy).abs() > DRAG_THRESHOLD)
                    {
                        did_drag.set(true);
                    }
                    if *did_drag.read() {
                        let (lx, ly) = *last_pointer.read();
                        last_pointer.set((client.x, client.y));
                        h_move.interact(|s| s.view_mut().pan_by(client.x - lx, client.y - ly, now));
                    }
                    return;
                }

                let drawing = h_move.read(|s| s.session().is_drawing()).unwrap_or(false);
                if drawing {
                    h_move.interact(|s| {
                        let at = locate(s, now, point);
                        s.pointer_move(at);
                    });
                }
            },

            onmouseup: move |evt: Event<MouseData>| {
                let was_pressed = *pressed.read();
                let was_drag = *did_drag.read();
                pressed.set(false);

                if *vertex_drag.read() {
                    vertex_drag.set(false);
                    h_up.interact(|s| s.drag_vertex_end());
                    return;
                }

                // A mouseup without drag movement = a click
                if was_pressed && !was_drag {
                    let client = evt.client_coordinates();
                    let Some(point) = container_point(client.x, client.y) else { return };
                    let now = h_up.now();
                    h_up.interact(|s| {
                        let at = locate(s, now, point);
                        s.pointer_click(at);
                    });
                }
            },

            ondoubleclick: move |evt: Event<MouseData>| {
                evt.prevent_default();
                let client = evt.client_coordinates();
                let Some(point) = container_point(client.x, client.y) else { return };
                let now = h_dbl.now();
                h_dbl.interact(|s| {
                    let at = locate(s, now, point);
                    s.double_click(at);
                });
            },

            onmouseleave: move |_| {
                pressed.set(false);
                if *vertex_drag.read() {
                    vertex_drag.set(false);
                    h_leave.interact(|s| s.drag_vertex_end());
                }
            },

            onkeydown: move |evt: Event<KeyboardData>| {
                match evt.key() {
                    Key::Escape => {
                        h_key.interact(|s| s.cancel_drawing());
                    }
                    Key::Enter => {
                        h_key.interact(|s| s.finish_drawing());
                    }
                    _ => {}
                }
            },

            div { class: "tile-layer",
                for (key, src, style) in satellite {
                    img { key: "{key}", class: "map-tile", src: "{src}", draggable: "false", style: "{style}" }
                }
            }

            div { class: "tile-layer labels", style: "{labels_style}",
                for (key, src, style) in labels {
                    img { key: "{key}", class: "map-tile", src: "{src}", draggable: "false", style: "{style}" }
                }
            }

            div {
                dangerous_inner_html: "{overlay}",
                style: "position:absolute;top:0;left:0;width:100%;height:100%;pointer-events:none;",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimap_core::feature::FeatureCollection;

    /// 1 m per pixel, centered on the origin, 200x100 viewport.
    fn frame() -> (ViewState, Viewport) {
        (
            ViewState {
                center: Coordinate::new(0.0, 0.0),
                zoom: view::zoom_for_resolution(1.0),
            },
            Viewport {
                width: 200.0,
                height: 100.0,
            },
        )
    }

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(10.0, 10.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_ring_path_projects_to_screen() {
        let (state, vp) = frame();
        let d = ring_path(&square(), state, vp);
        assert!(d.starts_with("M100.0 50.0 L110.0 50.0 L110.0 40.0"));
        assert!(d.ends_with('Z'));
    }

    #[test]
    fn test_ring_path_empty() {
        let (state, vp) = frame();
        assert_eq!(ring_path(&[], state, vp), "");
    }

    #[test]
    fn test_invalid_style_is_dashed() {
        let attrs = style_attrs(&style_colors(FeatureStyle::Invalid));
        assert!(attrs.contains("stroke-dasharray"));
        let attrs = style_attrs(&style_colors(FeatureStyle::Default));
        assert!(!attrs.contains("stroke-dasharray"));
    }

    #[test]
    fn test_accuracy_circle_radius_scales_with_resolution() {
        let (state, vp) = frame();
        let mut features = FeatureCollection::new();
        let id = features.add(
            FeatureKind::Location,
            Geometry::Circle {
                center: Coordinate::new(0.0, 0.0),
                radius: 25.0,
            },
        );
        let mut svg = String::new();
        build_feature(&mut svg, features.get(id).unwrap(), state, vp);
        assert!(svg.contains(r#"r="25.0""#));
        assert!(svg.contains(r#"cx="100.0" cy="50.0""#));
    }

    #[test]
    fn test_handles_only_when_requested() {
        let (state, vp) = frame();
        let mut features = FeatureCollection::new();
        features.add(FeatureKind::Drawing, Geometry::Polygon(square()));

        let with = build_svg_content(features.iter(), state, vp, true);
        let without = build_svg_content(features.iter(), state, vp, false);
        assert_eq!(with.matches("<circle").count(), 4);
        assert_eq!(without.matches("<circle").count(), 0);
    }

    #[test]
    fn test_field_label_is_escaped() {
        let (state, vp) = frame();
        let mut features = FeatureCollection::new();
        let id = features.add(FeatureKind::Field, Geometry::Polygon(square()));
        features.get_mut(id).unwrap().name = Some("North <A&B>".to_string());

        let svg = build_svg_content(features.iter(), state, vp, false);
        assert!(svg.contains("North &lt;A&amp;B&gt;"));
        assert!(svg.contains(r#"x="105.0" y="45.0""#));
    }

    #[test]
    fn test_labels_drawn_above_shapes() {
        let (state, vp) = frame();
        let mut features = FeatureCollection::new();
        let id = features.add(FeatureKind::Field, Geometry::Polygon(square()));
        features.get_mut(id).unwrap().name = Some("A".to_string());
        features.add(FeatureKind::Drawing, Geometry::Polygon(square()));

        let svg = build_svg_content(features.iter(), state, vp, false);
        let last_path = svg.rfind("<path").unwrap();
        let label = svg.find("<text").unwrap();
        assert!(label > last_path);
    }

    #[test]
    fn test_tile_images_fill_template() {
        let tiles = vec![TilePlacement {
            tile: view::TileCoord { z: 3, x: 4, y: 2 },
            left: -28.0,
            top: 10.0,
            size: 256.0,
        }];
        let images = tile_images(&tiles, "sat", "https://t/{z}/{x}/{y}.png");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, "sat-3-4-2--28");
        assert_eq!(images[0].1, "https://t/3/4/2.png");
        assert!(images[0].2.starts_with("left: -28.0px; top: 10.0px;"));
    }

    #[test]
    fn test_escape_text_plain() {
        assert_eq!(escape_text("Field No. 1"), "Field No. 1");
    }
}
