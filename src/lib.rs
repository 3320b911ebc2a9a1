//! Subledger - Billing state reconciliation and access gating.
//!
//! This crate derives canonical subscription state from payment provider
//! webhook events and answers the question "may this user use the app
//! right now?" for the rest of the platform.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
