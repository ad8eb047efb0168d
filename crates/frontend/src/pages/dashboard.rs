use agrimap_core::{AppConfig, FieldRecord, MapEvent, Topic};
use dioxus::prelude::*;

use crate::api;
use crate::components::field_panel::{apply_form_event, FieldForm, FieldPanel};
use crate::components::help_overlay::HelpOverlay;
use crate::components::location_button::LocationButton;
use crate::components::map_view::MapView;
use crate::components::notification::{NotificationToast, Toast};
use crate::host::MapHost;

/// Topics the page listens to for its own state.
const FORM_TOPICS: [Topic; 4] = [
    Topic::NewFieldForm,
    Topic::RemoveFieldForm,
    Topic::AreaCalculated,
    Topic::DrawingCompleted,
];

#[component]
pub fn Dashboard() -> Element {
    let redraw = use_signal(|| 0u64);
    let host = use_hook(|| MapHost::new(AppConfig::default(), redraw));

    // UI state signals, fed from the bus
    let forms = use_signal(Vec::<FieldForm>::new);
    let toast = use_signal(|| None::<Toast>);
    let toast_seq = use_signal(|| 0u64);
    let locating = use_signal(|| false);
    let mut fields = use_signal(Vec::<FieldRecord>::new);
    let adding = use_signal(|| false);
    let mut show_help = use_signal(|| false);

    let bus = host.bus().clone();
    use_hook(move || {
        for topic in FORM_TOPICS {
            bus.subscribe(topic, move |event| {
                let mut forms = forms;
                apply_form_event(&mut forms.write(), event);
            });
        }
        bus.subscribe(Topic::ShowNotification, move |event| {
            if let MapEvent::ShowNotification(notification) = event {
                let (mut toast, mut toast_seq) = (toast, toast_seq);
                let next = Toast::next(&mut toast_seq.write(), notification.clone());
                toast.set(Some(next));
            }
        });
        bus.subscribe(Topic::LocationLoading, move |event| {
            if let MapEvent::LocationLoading(loading) = event {
                let mut locating = locating;
                locating.set(*loading);
            }
        });
    });

    // Load fields once and hand them to the map
    let api_path = host
        .read(|s| s.config().api.fields.clone())
        .unwrap_or_default();
    let fields_resource = use_resource(move || {
        let path = api_path.clone();
        async move { api::load_fields(&path).await }
    });

    let h_render = host.clone();
    use_effect(move || {
        if let Some(records) = &*fields_resource.read() {
            fields.set(records.clone());
            h_render.emit(MapEvent::RenderFields(records.clone()));
        }
    });

    let timeout_ms = host
        .read(|s| s.config().map.notification_timeout_ms)
        .unwrap_or(5000);

    rsx! {
        div { class: "app",
            // Header
            div { class: "header",
                h1 { "Field Map" }
                button {
                    class: "help-button",
                    title: "Help",
                    onclick: move |_| {
                        let visible = *show_help.read();
                        show_help.set(!visible);
                    },
                    "?"
                }
            }

            // Sidebar
            div { class: "sidebar",
                FieldPanel {
                    host: host.clone(),
                    fields: fields,
                    forms: forms,
                    adding: adding,
                }
            }

            // Map view
            div { class: "map-area",
                MapView { host: host.clone() }
                LocationButton { host: host.clone(), loading: locating }
            }

            NotificationToast { current: toast, timeout_ms: timeout_ms }
            HelpOverlay { show: show_help }
        }
    }
}
