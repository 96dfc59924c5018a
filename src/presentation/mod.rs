// Presentation layer - HTTP surface and HTML rendering
pub mod app_state;
pub mod charts;
pub mod handlers;
pub mod html;
pub mod routes;
