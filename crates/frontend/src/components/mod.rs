pub mod field_panel;
pub mod help_overlay;
pub mod location_button;
pub mod map_view;
pub mod notification;
