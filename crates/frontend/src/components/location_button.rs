use agrimap_core::MapEvent;
use dioxus::prelude::*;

use crate::host::MapHost;

#[component]
pub fn LocationButton(host: MapHost, loading: Signal<bool>) -> Element {
    let busy = *loading.read();

    rsx! {
        button {
            class: "location-button",
            title: "Find my location",
            disabled: busy,
            onclick: move |evt: Event<MouseData>| {
                evt.stop_propagation();
                host.emit(MapEvent::LocateUser);
            },
            "📍"
        }
        if busy {
            div { class: "location-loading", "Determining location..." }
        }
    }
}
