//! Kite Connect module - REST client and live execution surface

pub mod auth;
pub mod client;
pub mod messages;
pub mod rest;

pub use client::LiveSurface;
pub use rest::KiteRestClient;
