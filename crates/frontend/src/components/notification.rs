use agrimap_core::{Notification, NotificationKind};
use dioxus::prelude::*;
use gloo_timers::future::TimeoutFuture;

/// The notification on screen; `seq` tells successive toasts apart so an
/// old dismiss timer leaves a newer toast alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub seq: u64,
    pub notification: Notification,
}

impl Toast {
    /// Next toast in the page's sequence. `last_seq` outlives dismissals so a
    /// stale timer never matches a later toast.
    pub fn next(last_seq: &mut u64, notification: Notification) -> Toast {
        *last_seq += 1;
        Toast {
            seq: *last_seq,
            notification,
        }
    }
}

fn icon_class(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Success => "fa-check-circle",
        NotificationKind::Info => "fa-info-circle",
        NotificationKind::Warning => "fa-exclamation-triangle",
        NotificationKind::Error => "fa-exclamation-circle",
    }
}

#[component]
pub fn NotificationToast(current: Signal<Option<Toast>>, timeout_ms: u32) -> Element {
    // Mutable binding for dismissal (Signal is Copy)
    let mut current = current;

    use_effect(move || {
        let Some(seq) = current.read().as_ref().map(|t| t.seq) else {
            return;
        };
        spawn(async move {
            TimeoutFuture::new(timeout_ms).await;
            let still_showing = current.peek().as_ref().map(|t| t.seq) == Some(seq);
            if still_showing {
                current.set(None);
            }
        });
    });

    let Some(toast) = current.read().clone() else {
        return rsx! {};
    };
    let kind = toast.notification.kind;
    let class = format!("agri-notification notification is-{} is-light", kind.as_str());
    let icon = format!("fas {}", icon_class(kind));
    let message = toast.notification.message;

    rsx! {
        div { class: "{class}",
            div { class: "notification-content",
                span { class: "icon is-small notification-icon",
                    i { class: "{icon}" }
                }
                div { class: "notification-text", "{message}" }
            }
            button {
                class: "delete",
                onclick: move |_| current.set(None),
            }
        }
    }
}
