use agrimap_core::event_bus::AreaReply;
use agrimap_core::{FeatureId, FieldRecord, MapEvent};
use dioxus::prelude::*;

use crate::api::format_hectares;
use crate::host::MapHost;

/// Form for one drawn, not yet saved field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldForm {
    pub feature: FeatureId,
    pub slot: usize,
    pub name: String,
    /// Hectares; `None` until the first measurement arrives.
    pub area: Option<f64>,
}

/// Fold a bus event into the open forms. Returns whether anything changed.
pub fn apply_form_event(forms: &mut Vec<FieldForm>, event: &MapEvent) -> bool {
    match event {
        MapEvent::NewFieldForm { feature, slot } => {
            if forms.iter().any(|f| f.feature == *feature) {
                return false;
            }
            forms.push(FieldForm {
                feature: *feature,
                slot: *slot,
                name: format!("New field {}", slot),
                area: None,
            });
            forms.sort_by_key(|f| f.slot);
            true
        }
        MapEvent::RemoveFieldForm { feature, .. } => {
            let before = forms.len();
            forms.retain(|f| f.feature != *feature);
            forms.len() != before
        }
        MapEvent::AreaCalculated {
            feature: Some(feature),
            hectares,
            ..
        } => set_area(forms, *feature, *hectares),
        MapEvent::DrawingCompleted { feature, area } => set_area(forms, feature.id, *area),
        _ => false,
    }
}

fn set_area(forms: &mut [FieldForm], feature: FeatureId, hectares: f64) -> bool {
    match forms.iter_mut().find(|f| f.feature == feature) {
        Some(form) => {
            form.area = Some(hectares);
            true
        }
        None => false,
    }
}

/// Font Awesome icon for a crop name, matched loosely in either direction.
pub fn crop_icon(crop: &str) -> &'static str {
    const ICONS: &[(&str, &str)] = &[
        ("winter wheat", "fas fa-wheat"),
        ("wheat", "fas fa-wheat"),
        ("corn", "fas fa-corn"),
        ("sunflower", "fas fa-sun"),
        ("barley", "fas fa-seedling"),
        ("rapeseed", "fas fa-leaf"),
        ("soy", "fas fa-seedling"),
        ("rye", "fas fa-wheat"),
        ("oats", "fas fa-seedling"),
        ("buckwheat", "fas fa-seedling"),
        ("flax", "fas fa-seedling"),
        ("potato", "fas fa-potato"),
        ("carrot", "fas fa-carrot"),
        ("beet", "fas fa-seedling"),
    ];
    let crop = crop.to_lowercase();
    if crop.is_empty() {
        return "fas fa-seedling";
    }
    ICONS
        .iter()
        .find(|(name, _)| crop.contains(name) || name.contains(crop.as_str()))
        .map(|(_, icon)| *icon)
        .unwrap_or("fas fa-seedling")
}

#[component]
pub fn FieldPanel(
    host: MapHost,
    fields: Signal<Vec<FieldRecord>>,
    forms: Signal<Vec<FieldForm>>,
    adding: Signal<bool>,
) -> Element {
    // Mutable binding for the mode switch (Signal is Copy)
    let mut adding = adding;
    let mut active = use_signal(|| None::<i64>);

    let current = *active.read();
    let items: Vec<(String, bool, FieldRecord)> = fields
        .read()
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let is_active = current.map_or(index == 0, |id| id == record.id);
            (record.id.to_string(), is_active, record.clone())
        })
        .collect();
    let cards: Vec<(String, FieldForm)> = forms
        .read()
        .iter()
        .map(|form| (form.slot.to_string(), form.clone()))
        .collect();
    let is_adding = *adding.read();

    let h_add = host.clone();
    let h_back = host.clone();

    if !is_adding {
        return rsx! {
            div { class: "fields-panel panel",
                div { class: "panel-heading is-flex is-justify-content-space-between",
                    span { "Fields" }
                    button {
                        class: "button is-small is-success add-field-btn",
                        onclick: move |_| {
                            adding.set(true);
                            h_add.emit(MapEvent::EnableDrawing);
                        },
                        "Add field"
                    }
                }
                div { class: "fields-list",
                    for (key, is_active, record) in items {
                        FieldItem {
                            key: "{key}",
                            host: host.clone(),
                            is_active,
                            record,
                            on_select: move |id: i64| active.set(Some(id)),
                        }
                    }
                }
            }
        };
    }

    rsx! {
        div { class: "fields-panel panel",
            div { class: "panel-heading is-flex is-justify-content-space-between",
                span { "New field" }
                button {
                    class: "button is-small back-btn",
                    onclick: move |_| {
                        adding.set(false);
                        h_back.emit(MapEvent::DisableDrawing);
                    },
                    "Back"
                }
            }
            div { class: "field-form",
                if cards.is_empty() {
                    p { class: "panel-block has-text-grey",
                        "Click on the map to start outlining a field."
                    }
                }
                for (key, form) in cards {
                    FieldFormCard {
                        key: "{key}",
                        host: host.clone(),
                        form,
                        forms,
                    }
                }
            }
        }
    }
}

#[component]
fn FieldItem(host: MapHost, record: FieldRecord, is_active: bool, on_select: EventHandler<i64>) -> Element {
    let class = if is_active {
        "panel-block field-item is-active"
    } else {
        "panel-block field-item"
    };
    let icon = crop_icon(&record.crop);
    let name = record.name.clone();
    let crop = record.crop.clone();
    let area = format_hectares(record.area);

    rsx! {
        a {
            class: "{class}",
            onclick: move |evt: Event<MouseData>| {
                evt.prevent_default();
                on_select.call(record.id);
                host.emit(MapEvent::FocusField(record.clone()));
            },
            div { class: "is-flex is-justify-content-space-between is-flex-grow-1 is-align-items-center",
                div {
                    span { class: "field-name has-text-weight-semibold", "{name}" }
                    br {}
                    small { class: "field-crop",
                        span { class: "icon is-small mr-1", i { class: "{icon}" } }
                        "{crop}"
                    }
                }
                span { class: "tag is-light is-success field-size", "{area}" }
            }
        }
    }
}

#[component]
fn FieldFormCard(host: MapHost, form: FieldForm, forms: Signal<Vec<FieldForm>>) -> Element {
    let mut forms = forms;
    let feature = form.feature;
    let area = form
        .area
        .map(format_hectares)
        .unwrap_or_else(|| "Calculating...".to_string());
    let title = format!("Field {}", form.slot);
    let name = form.name.clone();

    let h_measure = host.clone();
    let h_remove = host.clone();

    rsx! {
        div { class: "box field-form-card",
            h4 { class: "title is-6", "{title}" }
            input {
                class: "input is-small",
                r#type: "text",
                placeholder: "Field name...",
                value: "{name}",
                oninput: move |evt: Event<FormData>| {
                    let value = evt.value();
                    if let Some(f) = forms.write().iter_mut().find(|f| f.feature == feature) {
                        f.name = value;
                    }
                },
            }
            div { class: "is-flex is-justify-content-space-between is-align-items-center mt-2",
                span { class: "tag is-light is-success", "{area}" }
                div { class: "buttons are-small",
                    button {
                        class: "button",
                        onclick: move |_| {
                            let reply = AreaReply::new(move |hectares| {
                                let mut forms = forms;
                                set_area(&mut forms.write(), feature, hectares);
                            });
                            h_measure.emit(MapEvent::RequestArea { feature, reply });
                        },
                        "Measure"
                    }
                    button {
                        class: "button is-danger is-light",
                        onclick: move |_| h_remove.emit(MapEvent::RemoveFeature(feature)),
                        "Remove"
                    }
                }
            }
        }
    }
}
