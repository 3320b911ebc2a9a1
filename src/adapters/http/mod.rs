//! HTTP adapters - axum routes exposing the billing API.

pub mod billing;
