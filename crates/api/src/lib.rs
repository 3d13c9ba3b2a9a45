//! HTTP API: routing and request/response mapping for the reservation engine.

pub mod app;
