use dioxus::prelude::*;

#[component]
pub fn HelpOverlay(show: Signal<bool>) -> Element {
    if !*show.read() {
        return rsx! {};
    }

    rsx! {
        div {
            class: "help-overlay-backdrop",
            onclick: move |_| show.set(false),

            div {
                class: "help-overlay",
                onclick: move |evt: Event<MouseData>| evt.stop_propagation(),

                h2 { "Help" }

                div { class: "shortcut-section",
                    h3 { "Drawing a field" }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", "Click" }
                        span { "Add a corner" }
                    }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", "Double-click" }
                        span { "Finish the outline" }
                    }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", kbd { "Enter" } }
                        span { "Finish the outline" }
                    }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", kbd { "Esc" } }
                        span { "Cancel the current outline" }
                    }
                }

                div { class: "shortcut-section",
                    h3 { "Map" }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", "Scroll" }
                        span { "Zoom at the cursor" }
                    }
                    div { class: "shortcut-row",
                        span { class: "shortcut-keys", "Drag" }
                        span { "Pan the map" }
                    }
                }

                div { class: "help-divider" }

                div { class: "help-info-section",
                    h3 { "Editing corners" }
                    p { "While drawing mode is on, drag any corner of a field to move it. Corners snap to nearby corners of other fields. A move that makes the boundary cross itself is flagged, and the area is recalculated once you stop dragging." }
                }

                div { class: "help-info-section",
                    h3 { "Area" }
                    p { "Areas are shown in hectares. An outline whose edges cross is rejected, and the field is not created." }
                }

                button {
                    class: "close-help",
                    onclick: move |_| show.set(false),
                    "Close"
                }
            }
        }
    }
}
